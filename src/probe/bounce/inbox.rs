//! IMAP inbox scanning for delivery-status notifications.

use mail_parser::MessageParser;
use tracing::{debug, warn};

use super::{BounceError, patterns};
use crate::settings::SmtpAccount;

/// Failed recipients found in one account's unread bounce messages. Matched
/// messages are flagged seen so the next poll does not count them again.
pub(super) fn scan_account(account: &SmtpAccount, batch_id: &str) -> Result<Vec<String>, BounceError> {
    let imap_err = |source| BounceError::Imap {
        account: account.address.clone(),
        source,
    };

    let client = imap::ClientBuilder::new(&account.imap_host, account.imap_port)
        .connect()
        .map_err(imap_err)?;
    let mut session = client
        .login(&account.address, &account.password)
        .map_err(|(source, _)| BounceError::Imap {
            account: account.address.clone(),
            source,
        })?;
    session.select("INBOX").map_err(imap_err)?;

    let mut failed = Vec::new();
    for subject in patterns::BOUNCE_SUBJECTS {
        let query = format!("UNSEEN SUBJECT \"{subject}\"");
        let ids = match session.search(&query) {
            Ok(ids) => ids,
            Err(err) => {
                warn!(target: "probe::bounce", %err, %subject, "IMAP search failed");
                continue;
            }
        };
        if ids.is_empty() {
            continue;
        }

        let sequence = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let fetches = session.fetch(&sequence, "RFC822").map_err(imap_err)?;

        for fetch in fetches.iter() {
            let Some(raw) = fetch.body() else { continue };
            if let Some(address) = failed_recipient(raw, batch_id) {
                debug!(target: "probe::bounce", %address, "bounce extracted");
                failed.push(address);
            }
        }

        session
            .store(&sequence, "+FLAGS (\\Seen)")
            .map_err(imap_err)?;
    }

    session.logout().ok();
    Ok(failed)
}

/// Parse one raw message and extract the failed recipient, requiring the
/// batch id to appear somewhere in the message.
pub(super) fn failed_recipient(raw: &[u8], batch_id: &str) -> Option<String> {
    let raw_text = String::from_utf8_lossy(raw);
    let parsed = MessageParser::default().parse(raw);

    let (subject, body) = match &parsed {
        Some(message) => (
            message.subject().unwrap_or_default().to_string(),
            message.body_text(0).unwrap_or_default().to_string(),
        ),
        None => (String::new(), String::new()),
    };

    if !subject.contains(batch_id) && !raw_text.contains(batch_id) {
        return None;
    }

    patterns::extract_failed_recipient(&body, &raw_text)
}
