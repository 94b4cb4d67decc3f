use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use native_tls::{HandshakeError, TlsConnector, TlsStream};

use super::SmtpProbeError;

/// A parsed SMTP reply: status code plus every line of the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl SmtpReply {
    pub fn is_positive_completion(&self) -> bool {
        self.code / 100 == 2
    }

    pub fn is_transient_failure(&self) -> bool {
        self.code / 100 == 4
    }

    pub fn is_permanent_failure(&self) -> bool {
        self.code / 100 == 5
    }

    pub fn text(&self) -> String {
        self.lines.join(" ")
    }

    /// EHLO keyword lookup, case-insensitive on the first token of each line.
    pub fn has_capability(&self, cap: &str) -> bool {
        self.lines.iter().any(|line| {
            line.split_whitespace()
                .next()
                .is_some_and(|keyword| keyword.eq_ignore_ascii_case(cap))
        })
    }
}

/// Split one raw reply line into its status code, continuation marker and
/// text. A `-` after the code announces more lines of the same reply.
fn split_reply_line(line: &str) -> Result<(u16, bool, String), SmtpProbeError> {
    let (digits, rest) = line
        .split_at_checked(3)
        .ok_or_else(|| SmtpProbeError::Protocol(format!("reply line too short: '{line}'")))?;
    let code: u16 = digits
        .parse()
        .map_err(|_| SmtpProbeError::Protocol(format!("malformed status code in '{line}'")))?;
    let more = rest.starts_with('-');
    let text = rest.get(1..).unwrap_or("").to_string();
    Ok((code, more, text))
}

/// Fold the collected `(code, text)` pairs of one reply, insisting that every
/// line carries the same status code.
fn assemble_reply(parts: Vec<(u16, String)>) -> Result<SmtpReply, SmtpProbeError> {
    let mut parts = parts.into_iter();
    let Some((code, first)) = parts.next() else {
        return Err(SmtpProbeError::Protocol("empty reply".to_string()));
    };
    let mut lines = vec![first];
    for (next_code, text) in parts {
        if next_code != code {
            return Err(SmtpProbeError::Protocol(format!(
                "mixed status codes in multiline reply ({code} then {next_code})"
            )));
        }
        lines.push(text);
    }
    Ok(SmtpReply { code, lines })
}

enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(stream) => stream.read(buf),
            Self::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(stream) => stream.write(buf),
            Self::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(stream) => stream.flush(),
            Self::Tls(stream) => stream.flush(),
        }
    }
}

/// One SMTP connection, upgradeable to TLS in place.
///
/// Incoming bytes are split into complete lines as they arrive; `carry` holds
/// the tail of a line still in flight and `lines` the parsed-but-unconsumed
/// remainder, so a read that delivers several reply lines at once loses
/// nothing.
pub struct SmtpSession {
    transport: Option<Transport>,
    lines: VecDeque<String>,
    carry: Vec<u8>,
}

impl SmtpSession {
    pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, SmtpProbeError> {
        let addrs: Vec<SocketAddr> = format!("{host}:{port}")
            .to_socket_addrs()
            .map_err(|source| SmtpProbeError::Connect {
                host: host.to_string(),
                source,
            })?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    // The deadlines live on the socket and survive the TLS
                    // upgrade, so they are set exactly once.
                    stream
                        .set_read_timeout(Some(timeout))
                        .map_err(|source| SmtpProbeError::Io { source })?;
                    stream
                        .set_write_timeout(Some(timeout))
                        .map_err(|source| SmtpProbeError::Io { source })?;
                    return Ok(Self {
                        transport: Some(Transport::Plain(stream)),
                        lines: VecDeque::new(),
                        carry: Vec::new(),
                    });
                }
                Err(err) => last_err = Some(err),
            }
        }

        Err(SmtpProbeError::Connect {
            host: host.to_string(),
            source: last_err.unwrap_or_else(|| {
                io::Error::new(io::ErrorKind::AddrNotAvailable, "no address resolved")
            }),
        })
    }

    pub fn read_banner(&mut self) -> Result<SmtpReply, SmtpProbeError> {
        self.read_reply()
    }

    pub fn send_command(&mut self, command: &str) -> Result<SmtpReply, SmtpProbeError> {
        let transport = self.transport_mut()?;
        transport
            .write_all(command.as_bytes())
            .and_then(|()| transport.write_all(b"\r\n"))
            .and_then(|()| transport.flush())
            .map_err(|source| SmtpProbeError::Io { source })?;
        self.read_reply()
    }

    /// Issue `STARTTLS` and, if accepted, switch the transport to TLS.
    pub fn starttls(
        &mut self,
        host: &str,
        connector: &TlsConnector,
    ) -> Result<SmtpReply, SmtpProbeError> {
        let reply = self.send_command("STARTTLS")?;
        if reply.is_positive_completion() {
            self.secure(host, connector)?;
        }
        Ok(reply)
    }

    pub fn quit(&mut self) {
        self.send_command("QUIT").ok();
    }

    fn secure(&mut self, host: &str, connector: &TlsConnector) -> Result<(), SmtpProbeError> {
        let plain = match self.transport.take() {
            Some(Transport::Plain(stream)) => stream,
            Some(tls @ Transport::Tls(_)) => {
                self.transport = Some(tls);
                return Ok(());
            }
            None => {
                return Err(SmtpProbeError::Protocol(
                    "connection already consumed".to_string(),
                ));
            }
        };

        let mut attempt = connector.connect(host, plain);
        let tls = loop {
            match attempt {
                Ok(tls) => break tls,
                Err(HandshakeError::WouldBlock(mid)) => attempt = mid.handshake(),
                Err(HandshakeError::Failure(err)) => return Err(SmtpProbeError::tls(err)),
            }
        };
        self.transport = Some(Transport::Tls(Box::new(tls)));
        Ok(())
    }

    fn read_reply(&mut self) -> Result<SmtpReply, SmtpProbeError> {
        let mut parts = Vec::new();
        loop {
            let line = self.next_line()?;
            let (code, more, text) = split_reply_line(&line)?;
            parts.push((code, text));
            if !more {
                break;
            }
        }
        assemble_reply(parts)
    }

    fn next_line(&mut self) -> Result<String, SmtpProbeError> {
        loop {
            if let Some(line) = self.lines.pop_front() {
                return Ok(line);
            }
            self.fill()?;
        }
    }

    /// Pull the next chunk off the wire and move every completed line from
    /// the carry buffer into the line queue.
    fn fill(&mut self) -> Result<(), SmtpProbeError> {
        let mut chunk = [0u8; 1024];
        let transport = self.transport_mut()?;
        let received = transport
            .read(&mut chunk)
            .map_err(|source| SmtpProbeError::Io { source })?;
        if received == 0 {
            return Err(SmtpProbeError::Io {
                source: io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "server closed the connection",
                ),
            });
        }
        self.carry.extend_from_slice(&chunk[..received]);

        while let Some(pos) = self.carry.iter().position(|byte| *byte == b'\n') {
            let mut line: Vec<u8> = self.carry.drain(..=pos).collect();
            while line.last().is_some_and(|b| *b == b'\n' || *b == b'\r') {
                line.pop();
            }
            self.lines
                .push_back(String::from_utf8_lossy(&line).into_owned());
        }
        Ok(())
    }

    fn transport_mut(&mut self) -> Result<&mut Transport, SmtpProbeError> {
        self.transport
            .as_mut()
            .ok_or_else(|| SmtpProbeError::Protocol("connection already consumed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(code: u16, lines: &[&str]) -> SmtpReply {
        SmtpReply {
            code,
            lines: lines.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn reply_classification() {
        assert!(reply(250, &["Ok"]).is_positive_completion());
        assert!(reply(450, &["later"]).is_transient_failure());
        assert!(reply(550, &["no"]).is_permanent_failure());
    }

    #[test]
    fn capability_lookup_is_case_insensitive() {
        let ehlo = reply(250, &["mock.example", "STARTTLS", "SIZE 1000"]);
        assert!(ehlo.has_capability("starttls"));
        assert!(ehlo.has_capability("SIZE"));
        assert!(!ehlo.has_capability("AUTH"));
    }

    #[test]
    fn text_joins_lines() {
        assert_eq!(reply(550, &["User", "unknown"]).text(), "User unknown");
    }

    #[test]
    fn splits_terminal_and_continuation_lines() {
        assert_eq!(
            split_reply_line("250 Ok").expect("parse"),
            (250, false, "Ok".to_string())
        );
        assert_eq!(
            split_reply_line("250-STARTTLS").expect("parse"),
            (250, true, "STARTTLS".to_string())
        );
        // A bare code is a complete reply with empty text.
        assert_eq!(
            split_reply_line("354").expect("parse"),
            (354, false, String::new())
        );
    }

    #[test]
    fn rejects_short_and_non_numeric_lines() {
        assert!(split_reply_line("25").is_err());
        assert!(split_reply_line("abc Ok").is_err());
    }

    #[test]
    fn multiline_reply_keeps_one_code() {
        let reply = assemble_reply(vec![
            (250, "mock.example".to_string()),
            (250, "STARTTLS".to_string()),
        ])
        .expect("assemble");
        assert_eq!(reply.code, 250);
        assert_eq!(reply.lines.len(), 2);
    }

    #[test]
    fn mixed_codes_are_a_protocol_error() {
        let err = assemble_reply(vec![(250, String::new()), (550, String::new())])
            .expect_err("mixed codes");
        assert!(matches!(err, SmtpProbeError::Protocol(_)));
    }

    #[test]
    fn empty_reply_is_rejected() {
        assert!(assemble_reply(Vec::new()).is_err());
    }
}
