//! Verification-message composition and SMTP submission.

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use rand::Rng;
use rand::distributions::Alphanumeric;

use super::BounceError;
use crate::settings::SmtpAccount;

pub(super) fn subject_for(batch_id: &str) -> String {
    format!("Email Verification - {batch_id}")
}

/// Send one verification message through the given account.
pub(super) fn send_verification(
    account: &SmtpAccount,
    to: &str,
    batch_id: &str,
) -> Result<(), BounceError> {
    let from = account
        .address
        .parse()
        .map_err(|err| BounceError::Address {
            address: account.address.clone(),
            reason: format!("{err}"),
        })?;
    let to_mailbox = to.parse().map_err(|err| BounceError::Address {
        address: to.to_string(),
        reason: format!("{err}"),
    })?;

    let marker: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    let body = format!(
        "This is an automated email verification message.\nVerification ID: {batch_id}-{marker}\n\nPlease ignore this message.\n"
    );

    let message = Message::builder()
        .from(from)
        .to(to_mailbox)
        .subject(subject_for(batch_id))
        .header(ContentType::TEXT_PLAIN)
        .body(body)
        .map_err(|err| BounceError::Address {
            address: to.to_string(),
            reason: format!("{err}"),
        })?;

    let transport = SmtpTransport::starttls_relay(&account.smtp_host)
        .map_err(|source| BounceError::Send {
            address: to.to_string(),
            account: account.address.clone(),
            source,
        })?
        .port(account.smtp_port)
        .credentials(Credentials::new(
            account.address.clone(),
            account.password.clone(),
        ))
        .build();

    transport.send(&message).map_err(|source| BounceError::Send {
        address: to.to_string(),
        account: account.address.clone(),
        source,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_embeds_batch_id() {
        assert_eq!(
            subject_for("batch_20250101_abc"),
            "Email Verification - batch_20250101_abc"
        );
    }
}
