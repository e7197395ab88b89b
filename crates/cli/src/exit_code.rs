//! Exit code definitions for the vcp CLI
//!
//! This file is protected by CI. Any modifications require the Breaking Change process:
//! 1. Update version number
//! 2. Provide migration plan
//! 3. Update CHANGELOG
//! 4. Mark PR as BREAKING

use crate::config::ConfigError;

/// Exit codes for the vcp CLI application.
///
/// These codes follow a consistent convention to allow scripts and automation
/// to handle different error scenarios appropriately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// Operation completed successfully
    Success = 0,

    /// General/unspecified error
    GeneralError = 1,

    /// User input error: invalid arguments, malformed address, etc.
    UsageError = 2,

    /// Retryable network error: timeout, connection reset, 503, etc.
    NetworkError = 3,

    /// Resource not found: container or blob does not exist
    NotFound = 5,

    /// Transfer stopped part way: read stream or block staging failed
    TransferError = 8,

    /// Local cache could not be written or read back
    CacheError = 9,

    /// Operation was interrupted (e.g., Ctrl+C)
    Interrupted = 130,
}

impl ExitCode {
    /// Convert exit code to i32 for use with std::process::exit
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Create exit code from i32 value
    ///
    /// Returns None if the value doesn't correspond to a known exit code.
    pub const fn from_i32(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::GeneralError),
            2 => Some(Self::UsageError),
            3 => Some(Self::NetworkError),
            5 => Some(Self::NotFound),
            8 => Some(Self::TransferError),
            9 => Some(Self::CacheError),
            130 => Some(Self::Interrupted),
            _ => None,
        }
    }

    /// Exit code for a core error
    pub const fn from_error(err: &vcp_core::Error) -> Self {
        match Self::from_i32(err.exit_code()) {
            Some(code) => code,
            None => Self::GeneralError,
        }
    }

    /// Exit code for a configuration error
    pub const fn from_config_error(err: &ConfigError) -> Self {
        match err {
            ConfigError::AliasNotFound(_) => Self::NotFound,
            ConfigError::Invalid(_) | ConfigError::TomlParse(_) => Self::UsageError,
            ConfigError::Io { .. } | ConfigError::TomlSerialize(_) => Self::GeneralError,
        }
    }

    /// Get a human-readable description of the exit code
    pub const fn description(self) -> &'static str {
        match self {
            Self::Success => "Operation completed successfully",
            Self::GeneralError => "General error",
            Self::UsageError => "Invalid arguments or address format",
            Self::NetworkError => "Network error (retryable)",
            Self::NotFound => "Resource not found",
            Self::TransferError => "Transfer incomplete",
            Self::CacheError => "Local cache error",
            Self::Interrupted => "Operation interrupted",
        }
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.as_i32()
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.description(), self.as_i32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcp_core::Error;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::GeneralError.as_i32(), 1);
        assert_eq!(ExitCode::UsageError.as_i32(), 2);
        assert_eq!(ExitCode::NetworkError.as_i32(), 3);
        assert_eq!(ExitCode::NotFound.as_i32(), 5);
        assert_eq!(ExitCode::TransferError.as_i32(), 8);
        assert_eq!(ExitCode::CacheError.as_i32(), 9);
        assert_eq!(ExitCode::Interrupted.as_i32(), 130);
    }

    #[test]
    fn test_exit_code_from_i32() {
        assert_eq!(ExitCode::from_i32(0), Some(ExitCode::Success));
        assert_eq!(ExitCode::from_i32(8), Some(ExitCode::TransferError));
        assert_eq!(ExitCode::from_i32(130), Some(ExitCode::Interrupted));
        assert_eq!(ExitCode::from_i32(4), None);
        assert_eq!(ExitCode::from_i32(99), None);
    }

    #[test]
    fn test_exit_code_from_core_error() {
        let cases = [
            (Error::NotFound("x".into()), ExitCode::NotFound),
            (Error::MalformedAddress("x".into()), ExitCode::UsageError),
            (Error::BackendUnavailable("x".into()), ExitCode::NetworkError),
            (Error::PartialTransfer("x".into()), ExitCode::TransferError),
            (Error::CacheIo("x".into()), ExitCode::CacheError),
            (Error::NotCached("x".into()), ExitCode::CacheError),
            (Error::Cancelled, ExitCode::Interrupted),
            (Error::Config("x".into()), ExitCode::UsageError),
            (Error::General("x".into()), ExitCode::GeneralError),
        ];
        for (err, code) in cases {
            assert_eq!(ExitCode::from_error(&err), code, "{err}");
        }
    }

    #[test]
    fn test_exit_code_from_config_error() {
        assert_eq!(
            ExitCode::from_config_error(&ConfigError::AliasNotFound("a".into())),
            ExitCode::NotFound
        );
        assert_eq!(
            ExitCode::from_config_error(&ConfigError::Invalid("bad".into())),
            ExitCode::UsageError
        );
    }

    #[test]
    fn test_exit_code_display() {
        let display = format!("{}", ExitCode::Success);
        assert!(display.contains("0"));
        assert!(display.contains("successfully"));

        let display = format!("{}", ExitCode::NotFound);
        assert!(display.contains("5"));
        assert!(display.contains("not found"));
    }
}
