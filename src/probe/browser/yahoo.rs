//! Yahoo login-flow signal interpretation.

use fantoccini::error::CmdError;

use super::session::BrowserSession;
use super::{REASON_NO_PROMPT, selectors};
use crate::types::ProbeOutcome;

pub(super) async fn classify(session: &BrowserSession) -> Result<ProbeOutcome, CmdError> {
    let current_url = session.current_url().await?;

    if session
        .visible_element(selectors::YAHOO_ERROR_NODE)
        .await
        .is_some()
    {
        return Ok(
            ProbeOutcome::invalid("Email address does not exist (Yahoo account not found)")
                .with_evidence(current_url),
        );
    }

    if current_url.contains("account/challenge") {
        return Ok(
            ProbeOutcome::valid("Email address exists (redirected to challenge page)")
                .with_evidence(current_url),
        );
    }

    if session.visible_password_field().await {
        return Ok(
            ProbeOutcome::valid("Email address exists (visible password field)")
                .with_evidence(current_url),
        );
    }

    Ok(ProbeOutcome::ambiguous(REASON_NO_PROMPT).with_evidence(current_url))
}
