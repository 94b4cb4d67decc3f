//! Google login-flow signal interpretation.
//!
//! The URL after submitting the identifier carries most of the signal; the
//! inline error node disambiguates the rejected and identifier states.

use fantoccini::error::CmdError;

use super::selectors;
use super::session::BrowserSession;
use super::{REASON_CAPTCHA, REASON_NO_PROMPT};
use crate::types::ProbeOutcome;

/// Login-flow states encoded in the URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum UrlState {
    /// `/signin/challenge/pwd`: the account exists.
    PasswordChallenge,
    /// `/signin/rejected`: security measure, not necessarily a bad address.
    Rejected,
    /// CAPTCHA interstitial.
    Captcha,
    /// Any other `/signin/challenge` step implies an existing account.
    SecurityChallenge,
    /// Still on the identifier page.
    Identifier,
    Unknown,
}

pub(super) fn analyze_url(url: &str) -> UrlState {
    let lower = url.to_lowercase();
    if lower.contains("/signin/challenge/pwd") {
        UrlState::PasswordChallenge
    } else if lower.contains("/signin/rejected") {
        UrlState::Rejected
    } else if lower.contains("/challenge/ipp") || lower.contains("captcha") {
        UrlState::Captcha
    } else if lower.contains("/signin/challenge") {
        UrlState::SecurityChallenge
    } else if lower.contains("/signin/identifier") {
        UrlState::Identifier
    } else {
        UrlState::Unknown
    }
}

/// The known error node, with text confirming the account was not found.
async fn account_not_found(session: &BrowserSession) -> bool {
    if let Some(text) = session.visible_text(selectors::GOOGLE_ERROR_NODE).await {
        let lower = text.to_lowercase();
        return lower.contains("couldn't find") || lower.contains("try again with that email");
    }
    false
}

pub(super) async fn classify(session: &BrowserSession) -> Result<ProbeOutcome, CmdError> {
    let current_url = session.current_url().await?;

    if session.captcha_present().await {
        return Ok(ProbeOutcome::ambiguous(REASON_CAPTCHA).with_evidence(current_url));
    }

    if account_not_found(session).await {
        return Ok(
            ProbeOutcome::invalid("Email address does not exist (Google account not found)")
                .with_evidence(current_url),
        );
    }

    let outcome = match analyze_url(&current_url) {
        UrlState::PasswordChallenge => {
            ProbeOutcome::valid("Email address exists (URL changed to password challenge)")
        }
        UrlState::SecurityChallenge => {
            ProbeOutcome::valid("Email likely exists (security challenge)")
        }
        UrlState::Captcha => ProbeOutcome::ambiguous(REASON_CAPTCHA),
        UrlState::Rejected => {
            // The error node was already ruled out above; a visible password
            // prompt is the remaining positive signal.
            if session.visible_password_field().await {
                ProbeOutcome::valid("Email address exists (visible password field)")
            } else {
                ProbeOutcome::ambiguous("Rejected login but could not determine if email exists")
            }
        }
        UrlState::Identifier => ProbeOutcome::ambiguous(REASON_NO_PROMPT),
        UrlState::Unknown => {
            if session.visible_password_field().await {
                ProbeOutcome::valid("Email address exists (visible password field)")
            } else {
                ProbeOutcome::ambiguous(REASON_NO_PROMPT)
            }
        }
    };

    Ok(outcome.with_evidence(current_url))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_challenge_url() {
        assert_eq!(
            analyze_url("https://accounts.google.com/v3/signin/challenge/pwd?x=1"),
            UrlState::PasswordChallenge
        );
    }

    #[test]
    fn rejected_url() {
        assert_eq!(
            analyze_url("https://accounts.google.com/v3/signin/rejected?rrk=62"),
            UrlState::Rejected
        );
    }

    #[test]
    fn captcha_urls() {
        assert_eq!(
            analyze_url("https://accounts.google.com/v3/signin/v2/challenge/ipp"),
            UrlState::Captcha
        );
        assert_eq!(
            analyze_url("https://accounts.google.com/Captcha?x"),
            UrlState::Captcha
        );
    }

    #[test]
    fn other_challenges_mean_existing_account() {
        assert_eq!(
            analyze_url("https://accounts.google.com/v3/signin/challenge/selection"),
            UrlState::SecurityChallenge
        );
    }

    #[test]
    fn identifier_and_unknown() {
        assert_eq!(
            analyze_url("https://accounts.google.com/v3/signin/identifier?flowName=x"),
            UrlState::Identifier
        );
        assert_eq!(analyze_url("https://example.com/"), UrlState::Unknown);
    }
}
