//! Signal interpretation for providers without a dedicated classifier.

use fantoccini::error::CmdError;

use super::session::BrowserSession;
use super::{
    REASON_CAPTCHA, REASON_CUSTOM_REDIRECT, REASON_NO_PROMPT, REASON_OTHER_REDIRECT, selectors,
};
use crate::strategy::Provider;
use crate::types::ProbeOutcome;

pub(super) async fn classify(
    session: &BrowserSession,
    provider: &Provider,
    login_url: &str,
) -> Result<ProbeOutcome, CmdError> {
    let current_url = session.current_url().await?;

    if session.captcha_present().await {
        return Ok(ProbeOutcome::ambiguous(REASON_CAPTCHA).with_evidence(current_url));
    }

    let source = session.page_source_lower().await?;
    for phrase in selectors::not_found_phrases(provider) {
        if source.contains(phrase) {
            return Ok(ProbeOutcome::invalid("Email address does not exist")
                .with_evidence(format!("error phrase: {phrase}"))
                .with_evidence(current_url));
        }
    }

    if session.visible_password_field().await {
        return Ok(
            ProbeOutcome::valid("Email address exists (visible password field)")
                .with_evidence(current_url),
        );
    }

    let outcome = match super::redirect_kind(login_url, &current_url) {
        super::RedirectKind::SamePage => ProbeOutcome::ambiguous(REASON_NO_PROMPT),
        super::RedirectKind::ForeignLogin => ProbeOutcome::custom(REASON_CUSTOM_REDIRECT),
        super::RedirectKind::Elsewhere => ProbeOutcome::custom(REASON_OTHER_REDIRECT),
    };
    Ok(outcome.with_evidence(current_url))
}
