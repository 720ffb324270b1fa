use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use thiserror::Error;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}$").expect("email pattern is valid")
});

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("invalid email: {0:?}")]
    Invalid(String),
}

/// Visitor email, the natural key of a quiz session.
///
/// Stored lower-cased so `Ann@Example.com` and `ann@example.com` share a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Validate and normalize a submitted email.
    ///
    /// # Errors
    ///
    /// Returns `EmailError::Invalid` if the address does not look like an email.
    pub fn parse(raw: &str) -> Result<Self, EmailError> {
        let trimmed = raw.trim();
        if !EMAIL_PATTERN.is_match(trimmed) {
            return Err(EmailError::Invalid(raw.to_owned()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Masks the address for public listings.
    ///
    /// The first and last character of the local part and of every domain label
    /// except the TLD are kept; everything in between becomes a dot.
    #[must_use]
    pub fn obfuscated(&self) -> String {
        let Some((local, domain)) = self.0.split_once('@') else {
            return self.0.clone();
        };

        let labels: Vec<&str> = domain.split('.').collect();
        let domain = if labels.len() < 2 {
            obfuscate_part(domain)
        } else {
            let last = labels.len() - 1;
            labels
                .iter()
                .enumerate()
                .map(|(i, label)| if i == last { (*label).to_owned() } else { obfuscate_part(label) })
                .collect::<Vec<_>>()
                .join(".")
        };

        format!("{}@{domain}", obfuscate_part(local))
    }
}

fn obfuscate_part(part: &str) -> String {
    let chars: Vec<char> = part.chars().collect();
    match chars.as_slice() {
        [first, middle @ .., last] if !middle.is_empty() => {
            format!("{first}{}{last}", ".".repeat(middle.len()))
        }
        _ => part.to_owned(),
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Email {
    type Err = EmailError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_common_addresses() {
        for raw in ["ann@example.com", "a.b+quiz@sub.example.org", "X_Y%z@host-1.io"] {
            assert!(Email::parse(raw).is_ok(), "{raw} should be valid");
        }
    }

    #[test]
    fn rejects_malformed_addresses() {
        for raw in ["", "ann", "ann@", "@example.com", "ann@example", "ann@example.c", "a b@x.com"] {
            assert!(Email::parse(raw).is_err(), "{raw} should be invalid");
        }
    }

    #[test]
    fn normalizes_case_and_whitespace() {
        let email = Email::parse("  Ann@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "ann@example.com");
    }

    #[test]
    fn obfuscates_local_part_and_domain_labels() {
        let email = Email::parse("johndoe@mail.example.com").unwrap();
        assert_eq!(email.obfuscated(), "j.....e@m..l.e.....e.com");
    }

    #[test]
    fn short_parts_stay_readable() {
        let email = Email::parse("jo@ab.io").unwrap();
        assert_eq!(email.obfuscated(), "jo@ab.io");
    }
}
