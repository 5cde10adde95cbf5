//! Risk tiers shared by path and permission findings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Coarse ordinal used to prioritise findings.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Raise the risk to `other` if it is higher. Never lowers it.
    #[must_use]
    pub fn escalate(self, other: RiskLevel) -> RiskLevel {
        self.max(other)
    }

    /// Severity used when a finding at this tier becomes an error.
    pub fn severity(&self) -> sen::Severity {
        match self {
            Self::Low => sen::Severity::Info,
            Self::Medium => sen::Severity::Warning,
            Self::High => sen::Severity::Error,
            Self::Critical => sen::Severity::Critical,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown risk level: {}", other)),
        }
    }
}
