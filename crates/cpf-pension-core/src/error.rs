use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CpfError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Incomplete retirement setup: retirement age {retirement_age} precedes the age-{transfer_age} transfer")]
    IncompleteRetirementSetup {
        retirement_age: u32,
        transfer_age: u32,
    },

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    ConvergenceFailure {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },
}

impl CpfError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        CpfError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
