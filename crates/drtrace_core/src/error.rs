//! Core error types for drtrace.

use std::fmt;

/// Core result type
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Invalid identifier text
    InvalidId {
        /// What was wrong with the input
        reason: String,
    },

    /// Value does not fit the field that carries it on the wire
    FieldOverflow {
        /// Field name
        field: &'static str,
        /// Value that was rejected
        value: u64,
    },
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidId { reason } => write!(f, "Invalid ID: {}", reason),
            Self::FieldOverflow { field, value } => {
                write!(f, "Value {} does not fit field {}", value, field)
            }
        }
    }
}

impl std::error::Error for CoreError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::InvalidId {
            reason: "empty".to_string(),
        };
        assert_eq!(format!("{}", err), "Invalid ID: empty");

        let err = CoreError::FieldOverflow {
            field: "total_length",
            value: 1 << 40,
        };
        let s = format!("{}", err);
        assert!(s.contains("total_length"));
        assert!(s.contains("1099511627776"));
    }

    #[test]
    fn test_error_equality() {
        let err1 = CoreError::InvalidId {
            reason: "x".to_string(),
        };
        let err2 = CoreError::InvalidId {
            reason: "x".to_string(),
        };
        assert_eq!(err1, err2);
    }
}
