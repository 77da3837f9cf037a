pub mod cpf;
pub mod time_value;
