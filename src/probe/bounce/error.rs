use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BounceError {
    #[error("no SMTP accounts configured for the bounce probe")]
    NoAccounts,
    #[error("failed to send to {address} via {account}: {source}")]
    Send {
        address: String,
        account: String,
        #[source]
        source: lettre::transport::smtp::Error,
    },
    #[error("invalid address {address}: {reason}")]
    Address { address: String, reason: String },
    #[error("IMAP error on {account}: {source}")]
    Imap {
        account: String,
        #[source]
        source: imap::Error,
    },
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("unknown batch {0}")]
    UnknownBatch(String),
}
