pub mod error;
pub mod time_value;
pub mod types;

#[cfg(feature = "cpf")]
pub mod cpf;

pub use error::CpfError;
pub use types::*;

/// Standard result type for all CPF pension operations
pub type CpfResult<T> = Result<T, CpfError>;
