//! Login-form probe driven through WebDriver.
//!
//! One session per address: navigate to the provider's login page, fill the
//! address, press Next, then read the provider-specific signal (URL
//! transition, DOM node, password prompt). The session is closed on every
//! exit path. The engine stays synchronous; this module owns a small
//! current-thread runtime to drive the async WebDriver client.

mod error;
mod generic;
mod google;
mod microsoft;
mod screenshot;
mod selectors;
mod session;
mod yahoo;

pub use error::BrowserProbeError;
pub use screenshot::{CaptureEvent, ScreenshotPolicy};

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::address::EmailAddress;
use crate::limiter::RateLimiter;
use crate::probe::{Probe, random_user_agent};
use crate::strategy::Provider;
use crate::types::ProbeOutcome;

use session::BrowserSession;

pub const REASON_NO_PROMPT: &str =
    "Could not determine if email exists (no password prompt or error)";
pub const REASON_CUSTOM_REDIRECT: &str = "Redirected to custom login page";
pub const REASON_OTHER_REDIRECT: &str = "Redirected to another page";
pub const REASON_NO_EMAIL_FIELD: &str = "Could not find email input field on login page";
pub const REASON_NO_NEXT_BUTTON: &str = "Could not find next/submit button on login page";
pub const REASON_CLICK_FAILED: &str = "Could not click next button after multiple attempts";
pub const REASON_ACCEPTED_NO_REJECTION: &str = "Email accepted (no rejection or error)";
pub const REASON_MULTI_ACCOUNT: &str = "Email exists (multiple Microsoft accounts)";
pub const REASON_CAPTCHA: &str = "CAPTCHA challenge encountered";

/// Where the page ended up relative to the login URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RedirectKind {
    SamePage,
    /// Different host whose URL still looks like a login page (tenant SSO).
    ForeignLogin,
    Elsewhere,
}

pub(crate) fn redirect_kind(login_url: &str, current_url: &str) -> RedirectKind {
    let original_host = url::Url::parse(login_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string));
    let current_host = url::Url::parse(current_url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string));

    match (original_host, current_host) {
        (Some(original), Some(current)) if original == current => RedirectKind::SamePage,
        (_, Some(_)) if current_url.to_lowercase().contains("login") => RedirectKind::ForeignLogin,
        _ => RedirectKind::Elsewhere,
    }
}

#[derive(Debug, Clone)]
pub struct BrowserProbeOptions {
    pub webdriver_url: String,
    pub browsers: Vec<String>,
    pub headless: bool,
    pub user_agent_rotation: bool,
    pub proxies: Vec<String>,
    /// Settle time after pressing Next before the signals are read.
    pub wait: Duration,
    pub screenshots: ScreenshotPolicy,
}

impl Default for BrowserProbeOptions {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:4444".to_string(),
            browsers: vec!["chrome".to_string()],
            headless: true,
            user_agent_rotation: true,
            proxies: Vec::new(),
            wait: Duration::from_secs(3),
            screenshots: ScreenshotPolicy::disabled(),
        }
    }
}

pub struct BrowserProbe {
    limiter: Arc<RateLimiter>,
    options: BrowserProbeOptions,
}

impl BrowserProbe {
    pub fn new(limiter: Arc<RateLimiter>, options: BrowserProbeOptions) -> Self {
        Self { limiter, options }
    }

    pub fn browsers(&self) -> &[String] {
        &self.options.browsers
    }

    /// One attempt with an explicit login URL and browser, used by the
    /// Microsoft `login.live.com` fallback.
    pub fn check_once(
        &self,
        address: &EmailAddress,
        provider: &Provider,
        login_url: &str,
        browser: &str,
    ) -> ProbeOutcome {
        self.limiter.acquire(address.domain());

        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => return ProbeOutcome::error(format!("Browser runtime error: {err}")),
        };

        info!(
            target: "probe::browser",
            address = %address, %browser, %login_url, "login verification started"
        );
        runtime.block_on(self.drive(address, provider, login_url, browser))
    }

    async fn drive(
        &self,
        address: &EmailAddress,
        provider: &Provider,
        login_url: &str,
        browser: &str,
    ) -> ProbeOutcome {
        let user_agent = self
            .options
            .user_agent_rotation
            .then(random_user_agent);
        let proxy = self
            .options
            .proxies
            .choose(&mut rand::thread_rng())
            .map(String::as_str);

        let session = match BrowserSession::create(
            &self.options.webdriver_url,
            browser,
            self.options.headless,
            user_agent,
            proxy,
        )
        .await
        {
            Ok(session) => session,
            Err(err) => {
                warn!(target: "probe::browser", %err, "could not start session");
                return ProbeOutcome::error(format!("Browser session failed: {err}"));
            }
        };

        let outcome = self.drive_session(&session, address, provider, login_url).await;

        if let ProbeOutcome::Ambiguous { .. } | ProbeOutcome::Error { .. } = outcome {
            self.capture(&session, address, "problem", CaptureEvent::Problem).await;
        }
        session.close().await;
        outcome
    }

    async fn drive_session(
        &self,
        session: &BrowserSession,
        address: &EmailAddress,
        provider: &Provider,
        login_url: &str,
    ) -> ProbeOutcome {
        if let Err(err) = session.navigate(login_url).await {
            return ProbeOutcome::ambiguous(format!("Browser error: {err}"));
        }

        let settle = rand::thread_rng().gen_range(2000..=4000);
        tokio::time::sleep(Duration::from_millis(settle)).await;
        if let Some(heading) = session.heading().await {
            debug!(target: "probe::browser", %heading, "landed on login page");
        }
        self.capture(session, address, "before_email", CaptureEvent::Step).await;

        let Some(field) = session.find_email_field().await else {
            return ProbeOutcome::custom(REASON_NO_EMAIL_FIELD);
        };

        if let Err(err) = session.human_type(&field, address.as_str()).await {
            return ProbeOutcome::ambiguous(format!("Browser error: {err}"));
        }
        let pause = rand::thread_rng().gen_range(500..=1500);
        tokio::time::sleep(Duration::from_millis(pause)).await;

        let Some(button) = session.find_next_button().await else {
            return ProbeOutcome::custom(REASON_NO_NEXT_BUTTON);
        };
        self.capture(session, address, "before_next", CaptureEvent::Step).await;

        if !session.human_click(&button).await {
            return ProbeOutcome::ambiguous(REASON_CLICK_FAILED);
        }

        tokio::time::sleep(self.options.wait).await;
        self.capture(session, address, "after_next", CaptureEvent::Step).await;

        let classified = match provider {
            Provider::Gmail | Provider::CustomGoogle => google::classify(session).await,
            Provider::Microsoft => microsoft::classify(session, login_url).await,
            Provider::Yahoo => yahoo::classify(session).await,
            other => generic::classify(session, other, login_url).await,
        };

        match classified {
            Ok(outcome) => {
                debug!(target: "probe::browser", address = %address, ?outcome, "classified");
                outcome.with_evidence(format!("browser {}", session.browser()))
            }
            Err(err) => ProbeOutcome::ambiguous(format!("Browser error: {err}")),
        }
    }

    async fn capture(
        &self,
        session: &BrowserSession,
        address: &EmailAddress,
        stage: &str,
        event: CaptureEvent,
    ) {
        if !self.options.screenshots.should_capture(event) {
            return;
        }
        if let Some(png) = session.screenshot().await {
            self.options.screenshots.save(address.as_str(), stage, &png);
        }
    }
}

impl Probe for BrowserProbe {
    fn name(&self) -> &'static str {
        "browser"
    }

    /// Walk the configured browser list until a definitive outcome appears.
    fn check(&self, address: &EmailAddress, provider: &Provider) -> ProbeOutcome {
        let Some(login_url) = provider.login_url() else {
            return ProbeOutcome::custom(format!(
                "No known login page for provider {}",
                provider.label()
            ));
        };

        let mut last = ProbeOutcome::error("no browser configured");
        for browser in &self.options.browsers {
            let outcome = self.check_once(address, provider, login_url, browser);
            if outcome.is_definitive() {
                return outcome;
            }
            last = outcome;
        }
        last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirects_to_same_host_are_same_page() {
        assert_eq!(
            redirect_kind(
                "https://login.yahoo.com",
                "https://login.yahoo.com/?done=x"
            ),
            RedirectKind::SamePage
        );
    }

    #[test]
    fn foreign_login_hosts_are_flagged() {
        assert_eq!(
            redirect_kind(
                "https://login.microsoftonline.com",
                "https://sso.contoso.com/login?redirect=x"
            ),
            RedirectKind::ForeignLogin
        );
    }

    #[test]
    fn other_redirects_are_elsewhere() {
        assert_eq!(
            redirect_kind(
                "https://login.microsoftonline.com",
                "https://www.contoso.com/home"
            ),
            RedirectKind::Elsewhere
        );
        assert_eq!(
            redirect_kind("https://login.live.com", "not a url"),
            RedirectKind::Elsewhere
        );
    }
}
