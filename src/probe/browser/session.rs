//! WebDriver session wrapper: connection, discovery and human-like input.

use std::time::Duration;

use fantoccini::actions::{InputSource, MOUSE_BUTTON_LEFT, MouseActions, PointerAction};
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use rand::Rng;
use serde_json::json;
use tracing::{debug, warn};

use super::BrowserProbeError;
use super::selectors;

pub(super) struct BrowserSession {
    client: Client,
    browser: String,
}

impl BrowserSession {
    pub(super) async fn create(
        webdriver_url: &str,
        browser: &str,
        headless: bool,
        user_agent: Option<&str>,
        proxy: Option<&str>,
    ) -> Result<Self, BrowserProbeError> {
        let caps = capabilities(browser, headless, user_agent, proxy);
        let mut builder = ClientBuilder::native();
        builder.capabilities(caps);
        let client = builder.connect(webdriver_url).await.map_err(|source| {
            BrowserProbeError::Session {
                url: webdriver_url.to_string(),
                source,
            }
        })?;
        Ok(Self {
            client,
            browser: browser.to_string(),
        })
    }

    pub(super) fn browser(&self) -> &str {
        &self.browser
    }

    pub(super) async fn navigate(&self, url: &str) -> Result<(), CmdError> {
        self.client.goto(url).await
    }

    pub(super) async fn current_url(&self) -> Result<String, CmdError> {
        Ok(self.client.current_url().await?.to_string())
    }

    pub(super) async fn page_source_lower(&self) -> Result<String, CmdError> {
        Ok(self.client.source().await?.to_lowercase())
    }

    /// Main page heading, used to detect sign-in → password transitions.
    pub(super) async fn heading(&self) -> Option<String> {
        for selector in ["h1#headingText", "div#loginHeader", "h1", "[role='heading']"] {
            if let Some(element) = self.visible_element(selector).await {
                if let Ok(text) = element.text().await {
                    let text = text.trim().to_string();
                    if !text.is_empty() {
                        return Some(text);
                    }
                }
            }
        }
        None
    }

    /// First visible element matching `css`, if any.
    pub(super) async fn visible_element(&self, css: &str) -> Option<Element> {
        let elements = self.client.find_all(Locator::Css(css)).await.ok()?;
        for element in elements {
            if element.is_displayed().await.unwrap_or(false) {
                return Some(element);
            }
        }
        None
    }

    /// Visible text of the first displayed element matching `css`.
    pub(super) async fn visible_text(&self, css: &str) -> Option<String> {
        let element = self.visible_element(css).await?;
        element.text().await.ok().map(|t| t.trim().to_string())
    }

    /// Ordered selector walk, then any visible text/email input.
    pub(super) async fn find_email_field(&self) -> Option<Element> {
        for selector in selectors::EMAIL_FIELD_SELECTORS {
            if let Some(element) = self.visible_element(selector).await {
                return Some(element);
            }
        }

        let inputs = self.client.find_all(Locator::Css("input")).await.ok()?;
        for input in inputs {
            if !input.is_displayed().await.unwrap_or(false) {
                continue;
            }
            match input.attr("type").await.ok().flatten().as_deref() {
                Some("text") | Some("email") | None => return Some(input),
                _ => continue,
            }
        }
        None
    }

    /// Caption match across languages, then known ids, then any enabled button.
    pub(super) async fn find_next_button(&self) -> Option<Element> {
        if let Ok(buttons) = self.client.find_all(Locator::Css("button")).await {
            for button in &buttons {
                let Ok(text) = button.text().await else { continue };
                let text = text.trim();
                if selectors::NEXT_BUTTON_TEXTS
                    .iter()
                    .any(|caption| text.eq_ignore_ascii_case(caption))
                {
                    return Some(button.clone());
                }
            }
        }

        for selector in selectors::NEXT_BUTTON_SELECTORS {
            if let Some(element) = self.visible_element(selector).await {
                return Some(element);
            }
        }

        let buttons = self.client.find_all(Locator::Css("button")).await.ok()?;
        for button in buttons {
            if button.is_displayed().await.unwrap_or(false)
                && button.is_enabled().await.unwrap_or(false)
            {
                return Some(button);
            }
        }
        None
    }

    /// Type with a 50-200 ms inter-key delay.
    pub(super) async fn human_type(&self, element: &Element, text: &str) -> Result<(), CmdError> {
        for ch in text.chars() {
            element.send_keys(&ch.to_string()).await?;
            let delay = rand::thread_rng().gen_range(50..=200);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(())
    }

    /// Cursor glide with jitter, then native click, then JavaScript click.
    pub(super) async fn human_click(&self, element: &Element) -> bool {
        if self.pointer_click(element).await.is_ok() {
            return true;
        }
        debug!(target: "probe::browser", "pointer click failed, trying native click");
        if element.click().await.is_ok() {
            return true;
        }
        debug!(target: "probe::browser", "native click failed, trying JavaScript click");
        match serde_json::to_value(element) {
            Ok(handle) => self
                .client
                .execute("arguments[0].click();", vec![handle])
                .await
                .is_ok(),
            Err(err) => {
                warn!(target: "probe::browser", %err, "could not serialize element for JS click");
                false
            }
        }
    }

    async fn pointer_click(&self, element: &Element) -> Result<(), CmdError> {
        let (rx, ry, jx, jy, pause) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(0..800),
                rng.gen_range(0..600),
                rng.gen_range(-5..=5),
                rng.gen_range(-5..=5),
                rng.gen_range(100..=300),
            )
        };

        let mouse = MouseActions::new("mouse".to_string())
            .then(PointerAction::MoveTo {
                duration: Some(Duration::from_millis(pause)),
                x: rx,
                y: ry,
            })
            .then(PointerAction::MoveToElement {
                element: element.clone(),
                duration: Some(Duration::from_millis(pause)),
                x: jx,
                y: jy,
            })
            .then(PointerAction::Down {
                button: MOUSE_BUTTON_LEFT,
            })
            .then(PointerAction::Up {
                button: MOUSE_BUTTON_LEFT,
            });
        self.client.perform_actions(mouse).await
    }

    /// A password input that is really shown to the user.
    pub(super) async fn visible_password_field(&self) -> bool {
        let Ok(fields) = self
            .client
            .find_all(Locator::Css("input[type='password']"))
            .await
        else {
            return false;
        };
        for field in fields {
            if !field.is_displayed().await.unwrap_or(false) {
                continue;
            }
            let class = field.attr("class").await.ok().flatten();
            let aria_hidden = field.attr("aria-hidden").await.ok().flatten();
            let tabindex = field.attr("tabindex").await.ok().flatten();
            if !selectors::is_hidden_password(
                class.as_deref(),
                aria_hidden.as_deref(),
                tabindex.as_deref(),
            ) {
                return true;
            }
        }
        false
    }

    pub(super) async fn captcha_present(&self) -> bool {
        for selector in selectors::CAPTCHA_SELECTORS {
            if self.visible_element(selector).await.is_some() {
                return true;
            }
        }
        match self.current_url().await {
            Ok(url) => {
                let lower = url.to_lowercase();
                lower.contains("captcha") || lower.contains("/challenge/ipp")
            }
            Err(_) => false,
        }
    }

    pub(super) async fn screenshot(&self) -> Option<Vec<u8>> {
        self.client.screenshot().await.ok()
    }

    pub(super) async fn close(self) {
        if let Err(err) = self.client.close().await {
            warn!(target: "probe::browser", %err, "failed to close WebDriver session");
        }
    }
}

fn capabilities(
    browser: &str,
    headless: bool,
    user_agent: Option<&str>,
    proxy: Option<&str>,
) -> serde_json::map::Map<String, serde_json::Value> {
    let mut caps = serde_json::map::Map::new();

    match browser {
        "firefox" => {
            let mut args = Vec::new();
            if headless {
                args.push("-headless".to_string());
            }
            let mut prefs = serde_json::map::Map::new();
            if let Some(agent) = user_agent {
                prefs.insert("general.useragent.override".to_string(), json!(agent));
            }
            caps.insert("browserName".to_string(), json!("firefox"));
            caps.insert(
                "moz:firefoxOptions".to_string(),
                json!({ "args": args, "prefs": prefs }),
            );
        }
        name => {
            let mut args = vec![
                "--incognito".to_string(),
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
                "--disable-gpu".to_string(),
                "--window-size=1024,768".to_string(),
            ];
            if headless {
                args.push("--headless=new".to_string());
            }
            if let Some(agent) = user_agent {
                args.push(format!("--user-agent={agent}"));
            }
            if let Some(proxy) = proxy {
                args.push(format!("--proxy-server={proxy}"));
            }
            let browser_name = if name == "edge" { "MicrosoftEdge" } else { "chrome" };
            let options_key = if name == "edge" {
                "ms:edgeOptions"
            } else {
                "goog:chromeOptions"
            };
            caps.insert("browserName".to_string(), json!(browser_name));
            caps.insert(options_key.to_string(), json!({ "args": args }));
        }
    }

    caps
}
