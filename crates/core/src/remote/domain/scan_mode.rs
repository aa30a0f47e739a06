use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Whether a verified face clocks the person in or out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanMode {
    #[default]
    TimeIn,
    TimeOut,
}

impl ScanMode {
    /// Name used on the wire and in status text.
    pub fn wire_name(self) -> &'static str {
        match self {
            ScanMode::TimeIn => "time-in",
            ScanMode::TimeOut => "time-out",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown scan mode {0:?}, expected time-in or time-out")]
pub struct ParseScanModeError(pub String);

impl FromStr for ScanMode {
    type Err = ParseScanModeError;

    /// Lenient, case-insensitive: anything mentioning "in" is a time-in,
    /// otherwise anything mentioning "out" is a time-out.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        if lower.contains("in") {
            Ok(ScanMode::TimeIn)
        } else if lower.contains("out") {
            Ok(ScanMode::TimeOut)
        } else {
            Err(ParseScanModeError(s.to_string()))
        }
    }
}
