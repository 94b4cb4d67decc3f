use thiserror::Error;

#[derive(Debug, Error)]
pub enum SmtpProbeError {
    #[error("connection to {host} failed: {source}")]
    Connect {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {source}")]
    Io {
        #[source]
        source: std::io::Error,
    },
    #[error("TLS handshake failed: {0}")]
    Tls(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl SmtpProbeError {
    pub(crate) fn tls<T: std::fmt::Display>(err: T) -> Self {
        Self::Tls(err.to_string())
    }

    /// Errors worth a retry with backoff: timeouts and refused connections.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connect { source, .. } | Self::Io { source } => matches!(
                source.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
            ),
            _ => false,
        }
    }
}
