//! SMTP RCPT probe with catch-all detection.
//!
//! For each MX host the probe runs a minimal dialogue (`EHLO`, opportunistic
//! `STARTTLS`, `MAIL FROM`, `RCPT TO`) and classifies the RCPT reply. A 250
//! is only definitive when the domain is not a catch-all; a 550 is treated as
//! ambiguous because many providers use it for greylisting and rate limits.

mod error;
mod session;

pub use error::SmtpProbeError;
pub use session::{SmtpReply, SmtpSession};

use std::sync::Arc;
use std::time::Duration;

use native_tls::TlsConnector;
use tracing::{debug, warn};

use crate::address::EmailAddress;
use crate::dns::MxResolver;
use crate::limiter::RateLimiter;
use crate::probe::{Probe, random_local_part, retry_backoff};
use crate::strategy::Provider;
use crate::types::ProbeOutcome;

pub const REASON_VERIFIED: &str = "Email verified via SMTP";
pub const REASON_CATCH_ALL: &str = "Domain has catch-all configuration";
pub const REASON_MAILBOX_UNAVAILABLE: &str = "Mailbox unavailable (may not indicate invalid email)";
pub const REASON_NO_MAIL_SERVERS: &str = "Domain has no mail servers";

/// Reply texts that make a 550 unambiguous when strict refusal is enabled.
const NONEXISTENT_RCPT_PHRASES: &[&str] = &[
    "does not exist",
    "no such user",
    "user unknown",
    "recipient not found",
    "unknown recipient",
];

#[derive(Debug, Clone)]
pub struct SmtpProbeOptions {
    pub mail_from: String,
    pub helo_domain: String,
    pub port: u16,
    pub timeout: Duration,
    pub max_retries: u32,
    pub catch_all_detection: bool,
    /// Map a 550 with clear nonexistence text to a definitive invalid on
    /// non-catch-all domains.
    pub strict_rcpt_refusal: bool,
}

impl Default for SmtpProbeOptions {
    fn default() -> Self {
        Self {
            mail_from: "verify@example.com".to_string(),
            helo_domain: "localhost".to_string(),
            port: 25,
            timeout: Duration::from_secs(10),
            max_retries: 3,
            catch_all_detection: true,
            strict_rcpt_refusal: false,
        }
    }
}

/// Result of one RCPT dialogue across the MX list.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RcptResult {
    Deliverable { mx: String },
    MailboxUnavailable { text: String },
    Failed { reason: String },
}

pub struct SmtpProbe {
    resolver: Arc<MxResolver>,
    limiter: Arc<RateLimiter>,
    options: SmtpProbeOptions,
}

impl SmtpProbe {
    pub fn new(
        resolver: Arc<MxResolver>,
        limiter: Arc<RateLimiter>,
        options: SmtpProbeOptions,
    ) -> Self {
        Self {
            resolver,
            limiter,
            options,
        }
    }

    /// Whether random local parts are accepted by the domain's servers.
    pub fn is_catch_all(&self, address: &EmailAddress, mx_hosts: &[String]) -> bool {
        if !self.options.catch_all_detection {
            return false;
        }
        let probe_address = address.with_local(&random_local_part(16));
        let Ok(synthesized) = EmailAddress::parse(&probe_address) else {
            return false;
        };
        matches!(
            self.rcpt_probe(&synthesized, mx_hosts),
            RcptResult::Deliverable { .. }
        )
    }

    fn rcpt_probe(&self, address: &EmailAddress, mx_hosts: &[String]) -> RcptResult {
        let mut last_failure =
            "All MX servers rejected connection or verification".to_string();

        for mx in mx_hosts {
            let mut attempt = 0u32;
            loop {
                match self.rcpt_once(address, mx) {
                    Ok(result) => return result,
                    Err(err) if err.is_transient() && attempt < self.options.max_retries => {
                        attempt += 1;
                        let wait = retry_backoff(attempt);
                        warn!(target: "probe::smtp", %mx, %err, ?wait, "network error, retrying");
                        std::thread::sleep(wait);
                    }
                    Err(err) => {
                        debug!(target: "probe::smtp", %mx, %err, "giving up on host");
                        last_failure = err.to_string();
                        break;
                    }
                }
            }
        }

        RcptResult::Failed {
            reason: last_failure,
        }
    }

    /// One full dialogue against one MX host. Every connection consumes a
    /// rate-limit slot for the domain, retries and catch-all probes included.
    /// Errors bubble so the caller can decide between retry and next host.
    fn rcpt_once(&self, address: &EmailAddress, mx: &str) -> Result<RcptResult, SmtpProbeError> {
        self.limiter.acquire(address.domain());

        let connector = TlsConnector::new().map_err(SmtpProbeError::tls)?;
        let mut session = SmtpSession::connect(mx, self.options.port, self.options.timeout)?;

        let outcome = self.dialogue(&mut session, address, mx, &connector);
        session.quit();
        outcome
    }

    fn dialogue(
        &self,
        session: &mut SmtpSession,
        address: &EmailAddress,
        mx: &str,
        connector: &TlsConnector,
    ) -> Result<RcptResult, SmtpProbeError> {
        let banner = session.read_banner()?;
        if !banner.is_positive_completion() {
            return Ok(RcptResult::Failed {
                reason: format!("SMTP Error: {} - {}", banner.code, banner.text()),
            });
        }

        let ehlo = format!("EHLO {}", self.options.helo_domain);
        let capabilities = session.send_command(&ehlo)?;

        if capabilities.has_capability("STARTTLS") {
            let reply = session.starttls(mx, connector)?;
            if reply.is_positive_completion() {
                session.send_command(&ehlo)?;
            }
        }

        let mail = session.send_command(&format!("MAIL FROM:<{}>", self.options.mail_from))?;
        if !mail.is_positive_completion() {
            return Ok(RcptResult::Failed {
                reason: format!("SMTP Error: {} - {}", mail.code, mail.text()),
            });
        }

        let rcpt = session.send_command(&format!("RCPT TO:<{}>", address.as_str()))?;
        match rcpt.code {
            250 => Ok(RcptResult::Deliverable { mx: mx.to_string() }),
            550 => Ok(RcptResult::MailboxUnavailable { text: rcpt.text() }),
            code => Ok(RcptResult::Failed {
                reason: format!("SMTP Error: {} - {}", code, rcpt.text()),
            }),
        }
    }
}

impl Probe for SmtpProbe {
    fn name(&self) -> &'static str {
        "smtp"
    }

    fn check(&self, address: &EmailAddress, _provider: &Provider) -> ProbeOutcome {
        let domain = address.domain();
        let mx_hosts = self.resolver.mx(domain);
        if mx_hosts.is_empty() {
            return ProbeOutcome::invalid(REASON_NO_MAIL_SERVERS);
        }

        let catch_all = self.is_catch_all(address, &mx_hosts);

        match self.rcpt_probe(address, &mx_hosts) {
            RcptResult::Deliverable { mx } => {
                if catch_all {
                    ProbeOutcome::ambiguous(REASON_CATCH_ALL).with_evidence(format!("mx {mx}"))
                } else {
                    ProbeOutcome::valid(REASON_VERIFIED).with_evidence(format!("rcpt 250 on {mx}"))
                }
            }
            RcptResult::MailboxUnavailable { text } => {
                let clear_refusal = NONEXISTENT_RCPT_PHRASES
                    .iter()
                    .any(|phrase| text.to_ascii_lowercase().contains(phrase));
                if self.options.strict_rcpt_refusal && clear_refusal && !catch_all {
                    ProbeOutcome::invalid("Email address does not exist")
                        .with_evidence(format!("rcpt 550 {text}"))
                } else {
                    ProbeOutcome::ambiguous(REASON_MAILBOX_UNAVAILABLE)
                        .with_evidence(format!("rcpt 550 {text}"))
                }
            }
            RcptResult::Failed { reason } => ProbeOutcome::error(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{LookupMx, MxRecord};
    use std::io::{BufRead, BufReader, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread;

    struct FixedMx(Vec<MxRecord>);

    impl LookupMx for FixedMx {
        fn lookup_mx(&self, _domain: &str) -> Result<Vec<MxRecord>, crate::dns::DnsError> {
            Ok(self.0.clone())
        }
    }

    fn probe_for(port: u16, mx_host: &str, catch_all_detection: bool) -> SmtpProbe {
        SmtpProbe::new(
            Arc::new(MxResolver::with_lookup(FixedMx(vec![MxRecord::new(10, mx_host)]))),
            Arc::new(RateLimiter::new(100, Duration::from_secs(60))),
            SmtpProbeOptions {
                port,
                timeout: Duration::from_secs(2),
                max_retries: 1,
                catch_all_detection,
                ..SmtpProbeOptions::default()
            },
        )
    }

    fn spawn_mock_server(script: Vec<(&'static str, &'static str)>) -> (u16, thread::JoinHandle<()>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let port = listener.local_addr().expect("addr").port();
        let (ready_tx, ready_rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            ready_tx.send(()).ok();
            while let Ok((mut stream, _)) = listener.accept() {
                if handle_session(&mut stream, &script).is_err() {
                    break;
                }
                break;
            }
        });
        ready_rx.recv().expect("server ready");
        (port, handle)
    }

    fn handle_session(
        stream: &mut TcpStream,
        script: &[(&'static str, &'static str)],
    ) -> std::io::Result<()> {
        let mut reader = BufReader::new(stream.try_clone()?);
        stream.write_all(b"220 mock.smtp.test ESMTP\r\n")?;
        stream.flush()?;
        for (expected, response) in script {
            let mut line = String::new();
            reader.read_line(&mut line)?;
            assert!(
                line.starts_with(expected),
                "expected command starting with '{expected}', got '{line}'"
            );
            stream.write_all(response.as_bytes())?;
            stream.flush()?;
        }
        Ok(())
    }

    fn address() -> EmailAddress {
        EmailAddress::parse("user@example.com").expect("address")
    }

    #[test]
    fn no_mx_is_definitively_invalid() {
        let probe = SmtpProbe::new(
            Arc::new(MxResolver::with_lookup(FixedMx(Vec::new()))),
            Arc::new(RateLimiter::new(100, Duration::from_secs(60))),
            SmtpProbeOptions::default(),
        );
        let outcome = probe.check(&address(), &Provider::Custom);
        assert_eq!(outcome, ProbeOutcome::invalid(REASON_NO_MAIL_SERVERS));
    }

    #[test]
    #[ignore = "requires loopback TCP binding"]
    fn rcpt_250_without_catch_all_is_valid() {
        let (port, handle) = spawn_mock_server(vec![
            ("EHLO", "250 mock.example\r\n"),
            ("MAIL FROM:", "250 2.1.0 Ok\r\n"),
            ("RCPT TO:", "250 2.1.5 Ok\r\n"),
            ("QUIT", "221 2.0.0 Bye\r\n"),
        ]);
        let probe = probe_for(port, "127.0.0.1", false);
        let outcome = probe.check(&address(), &Provider::Custom);
        assert!(matches!(outcome, ProbeOutcome::DefinitiveValid { .. }), "{outcome:?}");
        handle.join().expect("server thread");
    }

    #[test]
    #[ignore = "requires loopback TCP binding"]
    fn rcpt_550_is_ambiguous() {
        let (port, handle) = spawn_mock_server(vec![
            ("EHLO", "250 mock.example\r\n"),
            ("MAIL FROM:", "250 2.1.0 Ok\r\n"),
            ("RCPT TO:", "550 5.1.1 User unknown\r\n"),
            ("QUIT", "221 2.0.0 Bye\r\n"),
        ]);
        let probe = probe_for(port, "127.0.0.1", false);
        let outcome = probe.check(&address(), &Provider::Custom);
        match outcome {
            ProbeOutcome::Ambiguous { reason, .. } => {
                assert_eq!(reason, REASON_MAILBOX_UNAVAILABLE);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        handle.join().expect("server thread");
    }

    #[test]
    fn nonexistent_phrases_cover_common_wordings() {
        for text in ["User unknown", "recipient not found", "5.1.1 no such user here"] {
            let lowered = text.to_ascii_lowercase();
            assert!(
                NONEXISTENT_RCPT_PHRASES.iter().any(|p| lowered.contains(p)),
                "{text}"
            );
        }
    }
}
