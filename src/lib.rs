#![forbid(unsafe_code)]
//! mailprobe: email verification engine.
//!
//! Decides whether an address is valid, invalid, risky or custom by
//! sequencing DNS/MX, SMTP RCPT, provider HTTPS API and browser login-form
//! probes per provider, with per-domain rate limiting, verdict caching and
//! durable result/history persistence. Batches run across a worker pool; the
//! bounce probe covers bulk jobs through send-and-wait DSN scanning.

pub mod address;
pub mod batch;
pub mod cache;
pub mod dns;
pub mod engine;
pub mod limiter;
pub mod probe;
pub mod settings;
pub mod store;
pub mod strategy;
pub mod types;

pub use address::{AddressError, EmailAddress};
pub use batch::{Orchestrator, TaskResults, TaskState, TaskStatus};
pub use engine::{Engine, EngineError};
pub use settings::{Config, Settings, SettingsError};
pub use strategy::{ProbeKind, Provider};
pub use types::{Method, ProbeOutcome, Verdict, VerificationResult};
