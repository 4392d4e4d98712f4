use crate::error::TdfClientError;
use std::fmt;

/// Raw status code returned by a native TDF call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TdfStatus(pub i32);

impl TdfStatus {
    pub const SUCCESS: TdfStatus = TdfStatus(0);
    pub const FAILURE: TdfStatus = TdfStatus(1);
    pub const INVALID_PARAMS: TdfStatus = TdfStatus(2);

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Translate the status into a typed result for `operation`
    ///
    /// Purely informational: nothing is retried here.
    pub fn check(self, operation: &'static str) -> Result<(), TdfClientError> {
        match self {
            Self::SUCCESS => Ok(()),
            Self::INVALID_PARAMS => Err(TdfClientError::invalid(
                operation,
                "rejected by the native layer",
            )),
            TdfStatus(code) => Err(TdfClientError::OperationFailed { operation, code }),
        }
    }

    /// The error for a call that reported failure through this status
    ///
    /// A failed call carrying a success code is still reported as
    /// `OperationFailed`.
    pub fn into_error(self, operation: &'static str) -> TdfClientError {
        match self.check(operation) {
            Err(e) => e,
            Ok(()) => TdfClientError::OperationFailed { operation, code: 0 },
        }
    }
}

impl From<i32> for TdfStatus {
    fn from(code: i32) -> Self {
        TdfStatus(code)
    }
}

impl fmt::Display for TdfStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::SUCCESS => write!(f, "success"),
            Self::FAILURE => write!(f, "failure"),
            Self::INVALID_PARAMS => write!(f, "invalid parameters"),
            TdfStatus(code) => write!(f, "status {}", code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_ok() {
        assert!(TdfStatus::SUCCESS.check("TDFEncryptString").is_ok());
        assert!(TdfStatus::from(0).is_success());
    }

    #[test]
    fn test_invalid_params_classification() {
        let err = TdfStatus::INVALID_PARAMS
            .check("TDFAddDataAttribute")
            .unwrap_err();
        match err {
            TdfClientError::InvalidParameters { operation, .. } => {
                assert_eq!(operation, "TDFAddDataAttribute")
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_other_codes_carry_raw_value() {
        for code in [1, 3, -1, 42] {
            let err = TdfStatus(code).check("TDFDecryptString").unwrap_err();
            match err {
                TdfClientError::OperationFailed { operation, code: c } => {
                    assert_eq!(operation, "TDFDecryptString");
                    assert_eq!(c, code);
                }
                other => panic!("unexpected error: {:?}", other),
            }
        }
    }
}
