//! Bounce-message pattern tables and recipient extraction.
//!
//! Extraction runs three passes in priority order: direct DSN phrases, the
//! `To:` line of a forwarded-message block, then loose fallback patterns.
//! The first match wins so a quoted original cannot shadow the DSN verdict.

use once_cell::sync::Lazy;
use regex::Regex;

/// IMAP `SUBJECT` search terms that select delivery-status notifications.
pub const BOUNCE_SUBJECTS: &[&str] = &[
    "delivery failed",
    "delivery status notification",
    "undeliverable",
    "returned mail",
    "delivery failure",
    "mail delivery failed",
    "failure notice",
    "message not delivered",
];

const ADDRESS: &str = r"([A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,})";

static DIRECT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?is)Your message wasn't delivered to\s*<?{a}>?",
        r"(?is)address wasn't found:?\s*<?{a}>?",
        r"(?is)Delivery to the following recipient failed permanently:\s*<?{a}>?",
        r"(?is)The email account that you tried to reach does not exist.*?<?{a}>?",
        r"(?is)Address not found.*?<?{a}>?",
    ]
    .iter()
    .map(|pattern| Regex::new(&pattern.replace("{a}", ADDRESS)).expect("direct bounce pattern"))
    .collect()
});

static FORWARDED_TO: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)To:\s*<?{ADDRESS}>?")).expect("forwarded To pattern"));

static FALLBACK_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)Recipient:\s*<?{a}>?",
        r"(?i)Unknown address:\s*<?{a}>?",
        r"(?i)Invalid recipient:\s*<?{a}>?",
    ]
    .iter()
    .map(|pattern| Regex::new(&pattern.replace("{a}", ADDRESS)).expect("fallback bounce pattern"))
    .collect()
});

const FORWARDED_MARKER: &str = "---------- Forwarded message ----------";

/// Extract the failed recipient from a bounce body (and the raw message text
/// as a second source).
pub fn extract_failed_recipient(body: &str, raw: &str) -> Option<String> {
    for pattern in DIRECT_PATTERNS.iter() {
        for text in [body, raw] {
            if let Some(captures) = pattern.captures(text) {
                return Some(captures[1].to_string());
            }
        }
    }

    let forwarded_source = if body.contains(FORWARDED_MARKER) {
        Some(body)
    } else if raw.contains(FORWARDED_MARKER) {
        Some(raw)
    } else {
        None
    };
    if let Some(source) = forwarded_source {
        if let Some((_, forwarded)) = source.split_once(FORWARDED_MARKER) {
            if let Some(captures) = FORWARDED_TO.captures(forwarded) {
                return Some(captures[1].to_string());
            }
        }
    }

    for pattern in FALLBACK_PATTERNS.iter() {
        for text in [body, raw] {
            if let Some(captures) = pattern.captures(text) {
                return Some(captures[1].to_string());
            }
        }
    }

    None
}

/// Whether a message subject looks like a bounce at all.
pub fn is_bounce_subject(subject: &str) -> bool {
    let lower = subject.to_lowercase();
    BOUNCE_SUBJECTS.iter().any(|s| lower.contains(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_gmail_style_dsn() {
        let body = "Your message wasn't delivered to nobody@example.com because the address couldn't be found.";
        assert_eq!(
            extract_failed_recipient(body, ""),
            Some("nobody@example.com".to_string())
        );
    }

    #[test]
    fn permanent_failure_phrase() {
        let body = "Delivery to the following recipient failed permanently:\n\n    ghost@example.org\n";
        assert_eq!(
            extract_failed_recipient(body, ""),
            Some("ghost@example.org".to_string())
        );
    }

    #[test]
    fn forwarded_block_to_line() {
        let body = format!(
            "Delivery has failed.\n{FORWARDED_MARKER}\nFrom: sender@me.test\nTo: <lost@example.net>\nSubject: hi"
        );
        assert_eq!(
            extract_failed_recipient(&body, ""),
            Some("lost@example.net".to_string())
        );
    }

    #[test]
    fn direct_pattern_beats_forwarded_block() {
        let body = format!(
            "Your message wasn't delivered to real@example.com\n{FORWARDED_MARKER}\nTo: other@example.com"
        );
        assert_eq!(
            extract_failed_recipient(&body, ""),
            Some("real@example.com".to_string())
        );
    }

    #[test]
    fn fallback_patterns_apply_last() {
        assert_eq!(
            extract_failed_recipient("Unknown address: gone@example.io", ""),
            Some("gone@example.io".to_string())
        );
        assert_eq!(
            extract_failed_recipient("Recipient: <x@y.example>", ""),
            Some("x@y.example".to_string())
        );
    }

    #[test]
    fn raw_text_is_searched_when_body_is_empty() {
        assert_eq!(
            extract_failed_recipient("", "Invalid recipient: z@example.dev"),
            Some("z@example.dev".to_string())
        );
    }

    #[test]
    fn no_match_returns_none() {
        assert_eq!(extract_failed_recipient("all good here", "nothing"), None);
    }

    #[test]
    fn bounce_subject_detection() {
        assert!(is_bounce_subject("Undeliverable: hello"));
        assert!(is_bounce_subject("Mail Delivery Failed - returning message"));
        assert!(!is_bounce_subject("Re: lunch?"));
    }
}
