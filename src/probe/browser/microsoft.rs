//! Microsoft login-flow signal interpretation.
//!
//! Microsoft accepts any identifier and only errors at the password stage, so
//! staying on the login page without an inline error counts as acceptance.
//! Tenant SSO redirects to an unrelated login host are reported as custom.

use fantoccini::error::CmdError;

use super::session::BrowserSession;
use super::{
    REASON_ACCEPTED_NO_REJECTION, REASON_CAPTCHA, REASON_CUSTOM_REDIRECT, REASON_MULTI_ACCOUNT,
    REASON_OTHER_REDIRECT, selectors,
};
use crate::types::ProbeOutcome;

/// The `#loginDescription` node carrying a known multi-account phrase, or the
/// disambiguation URL, both of which imply the address exists.
async fn multi_account(session: &BrowserSession, current_url: &str) -> bool {
    if current_url.contains("signin/shadowdisambiguate") {
        return true;
    }
    if let Some(text) = session
        .visible_text(selectors::MICROSOFT_LOGIN_DESCRIPTION)
        .await
    {
        let lower = text.to_lowercase();
        return selectors::MICROSOFT_MULTI_ACCOUNT_PHRASES
            .iter()
            .any(|phrase| lower.contains(phrase));
    }
    false
}

pub(super) async fn classify(
    session: &BrowserSession,
    login_url: &str,
) -> Result<ProbeOutcome, CmdError> {
    let current_url = session.current_url().await?;

    if multi_account(session, &current_url).await {
        return Ok(ProbeOutcome::valid(REASON_MULTI_ACCOUNT).with_evidence(current_url));
    }

    if session.captcha_present().await {
        return Ok(ProbeOutcome::ambiguous(REASON_CAPTCHA).with_evidence(current_url));
    }

    if session
        .visible_element(selectors::MICROSOFT_ERROR_NODE)
        .await
        .is_some()
    {
        return Ok(ProbeOutcome::invalid(
            "Email address does not exist (Microsoft account not found)",
        )
        .with_evidence(current_url));
    }

    if session.visible_password_field().await {
        return Ok(
            ProbeOutcome::valid("Email address exists (visible password field)")
                .with_evidence(current_url),
        );
    }

    let outcome = match super::redirect_kind(login_url, &current_url) {
        super::RedirectKind::SamePage => ProbeOutcome::valid(REASON_ACCEPTED_NO_REJECTION),
        super::RedirectKind::ForeignLogin => ProbeOutcome::custom(REASON_CUSTOM_REDIRECT),
        super::RedirectKind::Elsewhere => ProbeOutcome::custom(REASON_OTHER_REDIRECT),
    };
    Ok(outcome.with_evidence(current_url))
}
