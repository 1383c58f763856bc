// src/protocol/codes.rs

use std::fmt;

/// Exit codes a patcher uses to answer a query.
///
/// Anything outside the known set is kept as `Other` so callers must decide
/// explicitly what an unrecognised code means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitCode {
    Success,
    Unsupported,
    OpensForSettings,
    AutogeneratedSettingsClass,
    NotRunnable,
    NotNeeded,
    Other(i32),
}

impl ExitCode {
    /// Decode a raw process exit code.
    ///
    /// Negative codes are reported modulo 256 on POSIX, so both forms map to
    /// the same variant.
    pub fn from_raw(code: i32) -> Self {
        match code {
            0 => ExitCode::Success,
            -1 | 255 => ExitCode::Unsupported,
            -2 | 254 => ExitCode::OpensForSettings,
            -3 | 253 => ExitCode::AutogeneratedSettingsClass,
            -4 | 252 => ExitCode::NotRunnable,
            -5 | 251 => ExitCode::NotNeeded,
            other => ExitCode::Other(other),
        }
    }

    /// Code a patcher exits with to send this answer.
    pub fn raw(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::Unsupported => -1,
            ExitCode::OpensForSettings => -2,
            ExitCode::AutogeneratedSettingsClass => -3,
            ExitCode::NotRunnable => -4,
            ExitCode::NotNeeded => -5,
            ExitCode::Other(code) => code,
        }
    }

    pub fn is_known(self) -> bool {
        !matches!(self, ExitCode::Other(_))
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode::from_raw(code)
    }
}

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitCode::Success => f.write_str("Success"),
            ExitCode::Unsupported => f.write_str("Unsupported"),
            ExitCode::OpensForSettings => f.write_str("OpensForSettings"),
            ExitCode::AutogeneratedSettingsClass => f.write_str("AutogeneratedSettingsClass"),
            ExitCode::NotRunnable => f.write_str("NotRunnable"),
            ExitCode::NotNeeded => f.write_str("NotNeeded"),
            ExitCode::Other(code) => write!(f, "exit code {code}"),
        }
    }
}
