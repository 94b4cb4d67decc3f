//! Core verdict and result types shared by every probe and the engine.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final classification for an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Valid,
    Invalid,
    Risky,
    Custom,
}

impl Verdict {
    pub const ALL: [Verdict; 4] = [
        Verdict::Valid,
        Verdict::Invalid,
        Verdict::Risky,
        Verdict::Custom,
    ];

    /// Lowercase key used for history files and statistics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Risky => "risky",
            Self::Custom => "custom",
        }
    }

    /// Capitalised stem of the per-category result file (`Valid.csv`, ...).
    pub fn file_stem(&self) -> &'static str {
        match self {
            Self::Valid => "Valid",
            Self::Invalid => "Invalid",
            Self::Risky => "Risky",
            Self::Custom => "Custom",
        }
    }

    pub fn is_definitive(&self) -> bool {
        matches!(self, Self::Valid | Self::Invalid)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "valid" => Ok(Self::Valid),
            "invalid" => Ok(Self::Invalid),
            "risky" => Ok(Self::Risky),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown verdict '{other}'")),
        }
    }
}

/// Verification method requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// Provider strategy decides the probe order.
    Auto,
    /// Login-form (browser) led verification.
    Login,
    /// SMTP dialogue only; bounce probe for bulk jobs.
    Smtp,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Login => "login",
            Self::Smtp => "smtp",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "login" => Ok(Self::Login),
            "smtp" => Ok(Self::Smtp),
            other => Err(format!("unknown method '{other}'")),
        }
    }
}

/// Immutable result of one verification. Two results compare equal when they
/// concern the same address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub address: String,
    pub verdict: Verdict,
    pub reason: String,
    pub provider: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl VerificationResult {
    pub fn new(
        address: impl Into<String>,
        verdict: Verdict,
        reason: impl Into<String>,
        provider: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            verdict,
            reason: reason.into(),
            provider: provider.into(),
            method: method.into(),
            details: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

impl PartialEq for VerificationResult {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for VerificationResult {}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({}) - {}",
            self.address, self.verdict, self.provider, self.reason
        )
    }
}

/// Intermediate signal produced by a single probe. The strategy merges these
/// into the final [`Verdict`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    DefinitiveValid { reason: String, evidence: Vec<String> },
    DefinitiveInvalid { reason: String, evidence: Vec<String> },
    Ambiguous { reason: String, evidence: Vec<String> },
    Custom { reason: String, evidence: Vec<String> },
    Error { reason: String },
}

impl ProbeOutcome {
    pub fn valid(reason: impl Into<String>) -> Self {
        Self::DefinitiveValid {
            reason: reason.into(),
            evidence: Vec::new(),
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::DefinitiveInvalid {
            reason: reason.into(),
            evidence: Vec::new(),
        }
    }

    pub fn ambiguous(reason: impl Into<String>) -> Self {
        Self::Ambiguous {
            reason: reason.into(),
            evidence: Vec::new(),
        }
    }

    pub fn custom(reason: impl Into<String>) -> Self {
        Self::Custom {
            reason: reason.into(),
            evidence: Vec::new(),
        }
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }

    pub fn with_evidence(mut self, item: impl Into<String>) -> Self {
        match &mut self {
            Self::DefinitiveValid { evidence, .. }
            | Self::DefinitiveInvalid { evidence, .. }
            | Self::Ambiguous { evidence, .. }
            | Self::Custom { evidence, .. } => evidence.push(item.into()),
            Self::Error { .. } => {}
        }
        self
    }

    pub fn is_definitive(&self) -> bool {
        matches!(
            self,
            Self::DefinitiveValid { .. } | Self::DefinitiveInvalid { .. }
        )
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::DefinitiveValid { reason, .. }
            | Self::DefinitiveInvalid { reason, .. }
            | Self::Ambiguous { reason, .. }
            | Self::Custom { reason, .. }
            | Self::Error { reason } => reason,
        }
    }

    pub fn evidence(&self) -> &[String] {
        match self {
            Self::DefinitiveValid { evidence, .. }
            | Self::DefinitiveInvalid { evidence, .. }
            | Self::Ambiguous { evidence, .. }
            | Self::Custom { evidence, .. } => evidence,
            Self::Error { .. } => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_round_trips_through_str() {
        for verdict in Verdict::ALL {
            assert_eq!(verdict.as_str().parse::<Verdict>(), Ok(verdict));
        }
    }

    #[test]
    fn result_equality_is_by_address() {
        let a = VerificationResult::new("a@example.com", Verdict::Valid, "r1", "p1", "smtp");
        let b = VerificationResult::new("a@example.com", Verdict::Invalid, "r2", "p2", "api");
        let c = VerificationResult::new("b@example.com", Verdict::Valid, "r1", "p1", "smtp");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn outcome_collects_evidence() {
        let outcome = ProbeOutcome::ambiguous("unclear")
            .with_evidence("rcpt 450")
            .with_evidence("greylisted");
        assert_eq!(outcome.evidence().len(), 2);
        assert!(!outcome.is_definitive());
    }

    #[test]
    fn error_outcome_has_no_evidence() {
        let outcome = ProbeOutcome::error("timeout").with_evidence("ignored");
        assert!(outcome.evidence().is_empty());
    }
}
