use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrowserProbeError {
    #[error("failed to start WebDriver session at {url}: {source}")]
    Session {
        url: String,
        #[source]
        source: fantoccini::error::NewSessionError,
    },
    #[error("WebDriver command failed: {0}")]
    Command(#[from] fantoccini::error::CmdError),
    #[error("failed to build async runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("no login page known for provider {0}")]
    NoLoginUrl(String),
}
