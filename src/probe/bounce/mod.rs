//! Send-and-wait bounce probe for bulk jobs.
//!
//! A verification message goes out to every address in the batch, rotating
//! across the configured accounts. After the wait window the inboxes are
//! polled for unread delivery-status notifications; every address with an
//! extracted bounce is invalid, the remainder valid.

mod batchfile;
mod error;
mod inbox;
mod outbox;
pub mod patterns;

pub use batchfile::{BatchFile, BatchRow};
pub use error::BounceError;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{info, warn};

use crate::address::is_valid_format;
use crate::settings::SmtpAccount;
use crate::types::ProbeOutcome;

pub const REASON_BOUNCED: &str = "Bounce-back received";
pub const REASON_NO_BOUNCE: &str = "No bounce-back received";

#[derive(Debug, Clone)]
pub struct BounceProbeOptions {
    pub batches_dir: PathBuf,
    /// How long to wait for DSNs before scanning the inboxes.
    pub wait: Duration,
}

impl Default for BounceProbeOptions {
    fn default() -> Self {
        Self {
            batches_dir: PathBuf::from("./batches"),
            wait: Duration::from_secs(120),
        }
    }
}

pub struct BounceProbe {
    accounts: Vec<SmtpAccount>,
    options: BounceProbeOptions,
}

impl BounceProbe {
    pub fn new(accounts: Vec<SmtpAccount>, options: BounceProbeOptions) -> Self {
        Self { accounts, options }
    }

    pub fn available(&self) -> bool {
        !self.accounts.is_empty()
    }

    /// Send the verification messages and return the batch id for polling.
    pub fn start(&self, addresses: &[String]) -> Result<String, BounceError> {
        if self.accounts.is_empty() {
            return Err(BounceError::NoAccounts);
        }

        let batch_id = format!(
            "batch_{}_{}",
            Utc::now().format("%Y%m%d%H%M%S"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );

        let well_formed: Vec<String> = addresses
            .iter()
            .filter(|address| is_valid_format(address))
            .cloned()
            .collect();
        let batch = BatchFile::create(&self.options.batches_dir, &batch_id, &well_formed)?;
        info!(
            target: "probe::bounce",
            %batch_id,
            total = well_formed.len(),
            "bounce verification started"
        );

        let mut rng = rand::thread_rng();
        for address in &well_formed {
            let account = self
                .accounts
                .choose(&mut rng)
                .ok_or(BounceError::NoAccounts)?;
            match outbox::send_verification(account, address, &batch_id) {
                Ok(()) => {
                    batch.set_sender(address, &account.address)?;
                }
                Err(err) => {
                    warn!(target: "probe::bounce", %address, %err, "send failed");
                }
            }
            let jitter = rng.gen_range(500..=1500);
            std::thread::sleep(Duration::from_millis(jitter));
        }

        Ok(batch_id)
    }

    /// Scan every account's inbox and fold the batch into outcomes.
    pub fn collect(&self, batch_id: &str) -> Result<HashMap<String, ProbeOutcome>, BounceError> {
        let batch = BatchFile::open(&self.options.batches_dir, batch_id)?;

        let mut bounced = Vec::new();
        for account in &self.accounts {
            match inbox::scan_account(account, batch_id) {
                Ok(addresses) => bounced.extend(addresses),
                Err(err) => {
                    warn!(target: "probe::bounce", account = %account.address, %err, "inbox scan failed");
                }
            }
        }

        let rows = batch.rows()?;
        let mut outcomes = HashMap::new();
        let mut valid = Vec::new();
        for row in &rows {
            if bounced.contains(&row.address) {
                outcomes.insert(
                    row.address.clone(),
                    ProbeOutcome::invalid(REASON_BOUNCED),
                );
            } else {
                outcomes.insert(
                    row.address.clone(),
                    ProbeOutcome::valid(REASON_NO_BOUNCE),
                );
                valid.push(row.address.clone());
            }
        }
        batch.set_statuses(&bounced, &valid)?;

        info!(
            target: "probe::bounce",
            %batch_id,
            invalid = bounced.len(),
            valid = valid.len(),
            "bounce responses processed"
        );
        Ok(outcomes)
    }

    /// Start, wait out the window, then collect.
    pub fn run(&self, addresses: &[String]) -> Result<HashMap<String, ProbeOutcome>, BounceError> {
        let batch_id = self.start(addresses)?;
        std::thread::sleep(self.options.wait);
        self.collect(&batch_id)
    }
}
