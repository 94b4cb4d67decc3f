//! Microsoft `GetCredentialType` probe.
//!
//! One authenticated-looking POST decides most consumer and tenant accounts:
//! `IfExistsResult` 0 means the account exists, 1 means it does not. A
//! throttled response sets a 60 second domain backoff and yields no decision.
//! Before trusting a positive answer the caller runs the API-level catch-all
//! check: when a random local part also "exists", the tenant answers 0 for
//! everything and the API is useless for that domain.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::address::EmailAddress;
use crate::limiter::RateLimiter;
use crate::probe::{Probe, random_local_part, random_user_agent, retry_backoff};
use crate::strategy::Provider;
use crate::types::ProbeOutcome;

const ENDPOINT: &str = "https://login.microsoftonline.com/common/GetCredentialType";
const ORIGIN: &str = "https://login.microsoftonline.com";

pub const REASON_EXISTS: &str = "Email address exists (Microsoft API)";
pub const REASON_NOT_EXISTS: &str = "Email address does not exist (Microsoft API)";
pub const REASON_THROTTLED: &str = "Microsoft API throttled";
pub const REASON_INCONCLUSIVE: &str = "Microsoft API inconclusive";

#[derive(Debug, Error)]
pub enum ApiProbeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone)]
pub struct ApiProbeOptions {
    pub enabled: bool,
    pub timeout: Duration,
    pub max_retries: u32,
    pub throttle_backoff: Duration,
    pub proxies: Vec<String>,
}

impl Default for ApiProbeOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_secs(10),
            max_retries: 3,
            throttle_backoff: Duration::from_secs(60),
            proxies: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CredentialType {
    #[serde(rename = "IfExistsResult")]
    if_exists_result: Option<i64>,
    #[serde(rename = "ThrottleStatus")]
    throttle_status: Option<i64>,
}

/// Pure classification of a response body, separated out for tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ApiSignal {
    Exists,
    NotExists,
    Throttled,
    Inconclusive,
}

fn classify(body: &CredentialType) -> ApiSignal {
    match body.if_exists_result {
        Some(0) => ApiSignal::Exists,
        Some(1) => ApiSignal::NotExists,
        _ => {
            if body.throttle_status == Some(1) {
                ApiSignal::Throttled
            } else {
                ApiSignal::Inconclusive
            }
        }
    }
}

fn request_payload(address: &str) -> serde_json::Value {
    json!({
        "Username": address,
        "isOtherIdpSupported": true,
        "checkPhones": false,
        "isRemoteNGCSupported": true,
        "isCookieBannerShown": false,
        "isFidoSupported": true,
        "originalRequest": "",
        "country": "US",
        "forceotclogin": false,
        "isExternalFederationDisallowed": false,
        "isRemoteConnectSupported": false,
        "federationFlags": 0,
        "isSignup": false,
        "flowToken": "",
        "isAccessPassSupported": true,
    })
}

pub struct MicrosoftApiProbe {
    limiter: Arc<RateLimiter>,
    options: ApiProbeOptions,
}

impl MicrosoftApiProbe {
    pub fn new(limiter: Arc<RateLimiter>, options: ApiProbeOptions) -> Self {
        Self { limiter, options }
    }

    pub fn enabled(&self) -> bool {
        self.options.enabled
    }

    /// True when the tenant reports existence for a random local part too,
    /// which makes every API answer for this domain worthless. The random
    /// probe is paired with an `admin@` control lookup so a tenant that
    /// answers "exists" for everything is told apart from one that happens
    /// to own the synthesized address.
    pub fn is_api_catch_all(&self, address: &EmailAddress) -> bool {
        let domain = address.domain();
        let control = format!("admin@{domain}");
        let synthesized = address.with_local(&random_local_part(16));

        let control_signal = self.query_signal(&control, domain);
        let random_signal = self.query_signal(&synthesized, domain);

        matches!(
            (control_signal, random_signal),
            (Ok(ApiSignal::Exists), Ok(ApiSignal::Exists))
        )
    }

    fn query_signal(&self, address: &str, domain: &str) -> Result<ApiSignal, ApiProbeError> {
        self.limiter.acquire(domain);

        let mut attempt = 0u32;
        let response = loop {
            match self.post(address) {
                Ok(response) => break response,
                Err(err) if attempt < self.options.max_retries => {
                    attempt += 1;
                    let wait = retry_backoff(attempt);
                    warn!(target: "probe::api", %err, ?wait, "network error, retrying");
                    std::thread::sleep(wait);
                }
                Err(err) => return Err(err.into()),
            }
        };

        if !response.status().is_success() {
            debug!(target: "probe::api", status = %response.status(), "non-200 response");
            return Ok(ApiSignal::Inconclusive);
        }

        let body: CredentialType = response.json().map_err(ApiProbeError::from)?;
        let signal = classify(&body);
        if signal == ApiSignal::Throttled {
            self.limiter.set_backoff(domain, self.options.throttle_backoff);
        }
        Ok(signal)
    }

    fn post(&self, address: &str) -> Result<reqwest::blocking::Response, reqwest::Error> {
        let mut builder = reqwest::blocking::Client::builder().timeout(self.options.timeout);
        if let Some(proxy) = self.options.proxies.choose(&mut rand::thread_rng()) {
            builder = builder.proxy(reqwest::Proxy::all(format!("http://{proxy}"))?);
        }
        let client = builder.build()?;

        client
            .post(ENDPOINT)
            .header("User-Agent", random_user_agent())
            .header("Accept", "application/json")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Referer", format!("{ORIGIN}/"))
            .header("Origin", ORIGIN)
            .json(&request_payload(address))
            .send()
    }
}

impl Probe for MicrosoftApiProbe {
    fn name(&self) -> &'static str {
        "api"
    }

    fn check(&self, address: &EmailAddress, _provider: &Provider) -> ProbeOutcome {
        if !self.options.enabled {
            return ProbeOutcome::ambiguous(REASON_INCONCLUSIVE);
        }

        match self.query_signal(address.as_str(), address.domain()) {
            Ok(ApiSignal::Exists) => ProbeOutcome::valid(REASON_EXISTS),
            Ok(ApiSignal::NotExists) => ProbeOutcome::invalid(REASON_NOT_EXISTS),
            Ok(ApiSignal::Throttled) => ProbeOutcome::ambiguous(REASON_THROTTLED),
            Ok(ApiSignal::Inconclusive) => ProbeOutcome::ambiguous(REASON_INCONCLUSIVE),
            Err(err) => ProbeOutcome::error(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(json: serde_json::Value) -> CredentialType {
        serde_json::from_value(json).expect("body")
    }

    #[test]
    fn if_exists_zero_means_exists() {
        let signal = classify(&body(json!({"IfExistsResult": 0})));
        assert_eq!(signal, ApiSignal::Exists);
    }

    #[test]
    fn if_exists_one_means_not_exists() {
        let signal = classify(&body(json!({"IfExistsResult": 1, "ThrottleStatus": 0})));
        assert_eq!(signal, ApiSignal::NotExists);
    }

    #[test]
    fn throttle_without_result_is_throttled() {
        let signal = classify(&body(json!({"ThrottleStatus": 1})));
        assert_eq!(signal, ApiSignal::Throttled);
    }

    #[test]
    fn unknown_bodies_are_inconclusive() {
        assert_eq!(classify(&body(json!({}))), ApiSignal::Inconclusive);
        assert_eq!(
            classify(&body(json!({"IfExistsResult": 5}))),
            ApiSignal::Inconclusive
        );
    }

    #[test]
    fn payload_carries_the_address() {
        let payload = request_payload("user@contoso.com");
        assert_eq!(payload["Username"], "user@contoso.com");
        assert_eq!(payload["isFidoSupported"], true);
    }
}
