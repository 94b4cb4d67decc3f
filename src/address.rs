//! Address parsing and format validation.
//!
//! The engine accepts a deliberately simple syntax: a local part made of
//! `[A-Za-z0-9._%+-]`, an `@`, and a dotted domain with an alphabetic TLD of
//! at least two characters. Anything else is terminally invalid.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static FORMAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("address regex")
});

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid email format")]
    InvalidFormat,
    #[error("domain normalisation failed: {0}")]
    Idna(String),
}

/// A syntactically valid address split into its parts. The domain is
/// IDNA-normalized and lowercased so DNS and rate-limit keys are stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress {
    original: String,
    local: String,
    domain: String,
}

impl EmailAddress {
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let trimmed = input.trim();
        if !FORMAT.is_match(trimmed) {
            return Err(AddressError::InvalidFormat);
        }
        let (local, domain) = trimmed
            .rsplit_once('@')
            .ok_or(AddressError::InvalidFormat)?;
        let ascii_domain =
            idna::domain_to_ascii(domain).map_err(|err| AddressError::Idna(err.to_string()))?;
        Ok(Self {
            original: trimmed.to_string(),
            local: local.to_string(),
            domain: ascii_domain.to_ascii_lowercase(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    pub fn local(&self) -> &str {
        &self.local
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The same domain with a different local part, used for catch-all probes.
    pub fn with_local(&self, local: &str) -> String {
        format!("{local}@{}", self.domain)
    }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.original)
    }
}

/// Format check without constructing an [`EmailAddress`].
pub fn is_valid_format(input: &str) -> bool {
    FORMAT.is_match(input.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn accepts_plain_addresses() {
        let addr = EmailAddress::parse("Alice.Smith+tag@Example.COM").expect("parse");
        assert_eq!(addr.local(), "Alice.Smith+tag");
        assert_eq!(addr.domain(), "example.com");
    }

    #[test]
    fn rejects_missing_tld() {
        assert_eq!(
            EmailAddress::parse("foo@bar"),
            Err(AddressError::InvalidFormat)
        );
    }

    #[test]
    fn rejects_empty_local_and_double_at() {
        assert!(EmailAddress::parse("@example.com").is_err());
        assert!(EmailAddress::parse("a@@example.com").is_err());
        assert!(EmailAddress::parse("").is_err());
    }

    #[test]
    fn synthesized_address_keeps_domain() {
        let addr = EmailAddress::parse("user@example.com").expect("parse");
        assert_eq!(addr.with_local("zzz"), "zzz@example.com");
    }

    proptest! {
        #[test]
        fn parse_never_panics(input in ".*") {
            let _ = EmailAddress::parse(&input);
        }

        #[test]
        fn well_formed_inputs_parse(
            local in "[A-Za-z0-9._%+-]{1,16}",
            domain in "[a-z0-9]{1,12}",
            tld in "[a-z]{2,6}",
        ) {
            let input = format!("{local}@{domain}.{tld}");
            prop_assert!(EmailAddress::parse(&input).is_ok(), "{input}");
        }
    }
}
