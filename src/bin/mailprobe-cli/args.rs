use clap::{Parser, Subcommand};
use mailprobe::{Method, Verdict};

#[derive(Parser)]
#[command(name = "mailprobe-cli", about = "Email verification engine CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Commands,

    /// path to the settings file
    #[arg(long, default_value = "settings.toml")]
    pub settings: String,

    /// output format: human|json
    #[arg(long, default_value = "human")]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Verify a single address
    Verify {
        email: String,
        /// method: auto|login|smtp
        #[arg(long, default_value = "auto")]
        method: String,
    },
    /// Verify every address listed in a file (one per line)
    Batch {
        file: String,
        /// method: auto|login|smtp
        #[arg(long, default_value = "auto")]
        method: String,
        /// poll interval while waiting, in seconds
        #[arg(long, default_value_t = 2)]
        poll_secs: u64,
    },
    /// Print counts per verdict from the persisted results
    Summary,
    /// Print verification history
    History {
        /// address to look up
        #[arg(long, conflicts_with = "category")]
        email: Option<String>,
        /// category to dump: valid|invalid|risky|custom
        #[arg(long)]
        category: Option<String>,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

pub fn method_from_str(s: &str) -> anyhow::Result<Method> {
    s.parse::<Method>().map_err(anyhow::Error::msg)
}

pub fn verdict_from_str(s: &str) -> anyhow::Result<Verdict> {
    s.parse::<Verdict>().map_err(anyhow::Error::msg)
}
