//! WebDriver-backed portal session (chromedriver or any W3C endpoint).

use super::traits::{PortalSession, SessionError, SessionProvider};
use crate::checkpoint::StatusValue;
use crate::config::{BrowserConfig, Config, PortalConfig};
use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::error::CmdError;
use fantoccini::key::Key;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::{json, Map, Value};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

pub struct WebDriverProvider {
    portal: PortalConfig,
    browser: BrowserConfig,
}

impl WebDriverProvider {
    pub fn new(config: &Config) -> Self {
        Self {
            portal: config.portal.clone(),
            browser: config.browser.clone(),
        }
    }

    /// Chrome capabilities: automation banner suppressed, fixed window size,
    /// optionally headless.
    fn capabilities(&self) -> Map<String, Value> {
        let mut args = vec![
            "--disable-blink-features=AutomationControlled".to_string(),
            format!(
                "--window-size={},{}",
                self.browser.window_width, self.browser.window_height
            ),
        ];
        if self.browser.headless {
            args.push("--headless".to_string());
        }

        let mut caps = Map::new();
        caps.insert("goog:chromeOptions".into(), json!({ "args": args }));
        caps
    }
}

#[async_trait]
impl SessionProvider for WebDriverProvider {
    fn name(&self) -> &str {
        "webdriver"
    }

    async fn acquire(&self) -> Result<Box<dyn PortalSession>, SessionError> {
        let mut builder =
            ClientBuilder::rustls().map_err(|e| SessionError::failure("session start", e))?;
        builder.capabilities(self.capabilities());

        let timeout = self.browser.page_load_timeout();
        let client = tokio::time::timeout(timeout, builder.connect(&self.browser.webdriver_url))
            .await
            .map_err(|_| SessionError::Timeout {
                step: "session start",
                timeout,
            })?
            .map_err(|e| SessionError::failure("session start", e))?;

        Ok(Box::new(WebDriverSession {
            client,
            portal: self.portal.clone(),
            wait_timeout: self.browser.wait_timeout(),
            command_timeout: timeout,
            zoom_percent: self.browser.zoom_percent,
        }))
    }
}

struct WebDriverSession {
    client: Client,
    portal: PortalConfig,
    wait_timeout: Duration,
    command_timeout: Duration,
    zoom_percent: u32,
}

impl WebDriverSession {
    fn classify(&self, step: &'static str, err: CmdError) -> SessionError {
        match err {
            CmdError::WaitTimeout => SessionError::Timeout {
                step,
                timeout: self.wait_timeout,
            },
            other => SessionError::failure(step, other),
        }
    }

    /// Run a browser command under the command timeout.
    async fn bounded<T, F>(&self, step: &'static str, fut: F) -> Result<T, SessionError>
    where
        F: Future<Output = Result<T, CmdError>>,
    {
        match tokio::time::timeout(self.command_timeout, fut).await {
            Ok(result) => result.map_err(|e| self.classify(step, e)),
            Err(_) => Err(SessionError::Timeout {
                step,
                timeout: self.command_timeout,
            }),
        }
    }

    /// Poll for an element. The poller only checks its deadline between
    /// requests, so a stalled find request is cut off here as well.
    async fn wait_for(
        &self,
        locator: Locator<'_>,
        step: &'static str,
    ) -> Result<Element, SessionError> {
        let wait = self
            .client
            .wait()
            .at_most(self.wait_timeout)
            .for_element(locator);
        match tokio::time::timeout(self.wait_timeout, wait).await {
            Ok(result) => result.map_err(|e| self.classify(step, e)),
            Err(_) => Err(SessionError::Timeout {
                step,
                timeout: self.wait_timeout,
            }),
        }
    }

    /// Shrinks the page so the status panel fits in one screenshot.
    async fn apply_zoom(&self) {
        if self.zoom_percent == 100 {
            return;
        }
        let script = format!("document.body.style.zoom='{}%'", self.zoom_percent);
        if let Err(e) = self
            .bounded("apply zoom", self.client.execute(&script, Vec::new()))
            .await
        {
            debug!("Page zoom not applied: {e}");
        }
    }
}

fn same_location(current: &str, expected: &str) -> bool {
    current.trim_end_matches('/') == expected.trim_end_matches('/')
}

#[async_trait]
impl PortalSession for WebDriverSession {
    async fn authenticate(&mut self) -> Result<(), SessionError> {
        info!(url = %self.portal.login_url, "Navigating to login page");
        self.bounded("open login page", self.client.goto(&self.portal.login_url))
            .await?;
        self.apply_zoom().await;

        info!("Signing in");
        let username = self
            .wait_for(Locator::Id(&self.portal.username_field), "username field")
            .await?;
        self.bounded("type username", username.send_keys(&self.portal.username))
            .await?;

        let password = self
            .wait_for(Locator::Id(&self.portal.password_field), "password field")
            .await?;
        self.bounded("type password", password.send_keys(&self.portal.password))
            .await?;
        let enter: char = Key::Enter.into();
        self.bounded("submit sign-in", password.send_keys(&enter.to_string()))
            .await?;

        tokio::time::sleep(Duration::from_secs(self.portal.post_login_delay_secs)).await;

        let current = self
            .bounded("read current URL", self.client.current_url())
            .await?;
        if same_location(current.as_str(), &self.portal.dashboard_url) {
            info!(url = %current, "Sign-in successful");
            Ok(())
        } else {
            Err(SessionError::Rejected {
                current_url: current.to_string(),
            })
        }
    }

    async fn read_status(&mut self) -> Result<StatusValue, SessionError> {
        self.apply_zoom().await;
        let field = self
            .wait_for(Locator::Css(&self.portal.status_selector), "status field")
            .await?;
        let text = self.bounded("read status text", field.text()).await?;
        Ok(StatusValue::new(text))
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, SessionError> {
        self.apply_zoom().await;
        self.bounded("screenshot", self.client.screenshot()).await
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.bounded("close session", self.client.clone().close())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
    const DASHBOARD: &str = "https://portal.example/en/dashboard";

    fn reply(value: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "value": value }))
    }

    async fn stub(server: &MockServer, verb: &str, route: &str, response: ResponseTemplate) {
        Mock::given(method(verb))
            .and(path(route))
            .respond_with(response)
            .mount(server)
            .await;
    }

    /// WebDriver endpoint that only knows how to open session `s1`.
    async fn webdriver_server() -> MockServer {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let server = MockServer::start().await;
        stub(
            &server,
            "POST",
            "/session",
            reply(json!({ "sessionId": "s1", "capabilities": {} })),
        )
        .await;
        server
    }

    /// Answers every command of a working portal; `landing` is the URL the
    /// browser reports after sign-in.
    async fn stub_portal(server: &MockServer, landing: &str) {
        stub(server, "POST", "/session/s1/url", reply(Value::Null)).await;
        stub(server, "GET", "/session/s1/url", reply(json!(landing))).await;
        stub(server, "POST", "/session/s1/execute/sync", reply(Value::Null)).await;
        stub(
            server,
            "POST",
            "/session/s1/element",
            reply(json!({ ELEMENT_KEY: "e1" })),
        )
        .await;
        stub(server, "POST", "/session/s1/element/e1/value", reply(Value::Null)).await;
        stub(
            server,
            "GET",
            "/session/s1/element/e1/text",
            reply(json!("  May 2, 2024 ")),
        )
        .await;
    }

    fn config_for(server: &MockServer) -> Config {
        let mut config = Config::default();
        config.browser.webdriver_url = server.uri();
        config.browser.wait_timeout_secs = 1;
        config.browser.page_load_timeout_secs = 1;
        config.portal.login_url = "https://portal.example/en/login".into();
        config.portal.dashboard_url = DASHBOARD.into();
        config.portal.username = "12345678".into();
        config.portal.password = "hunter2".into();
        config.portal.post_login_delay_secs = 0;
        config
    }

    async fn open(server: &MockServer) -> Box<dyn PortalSession> {
        WebDriverProvider::new(&config_for(server))
            .acquire()
            .await
            .unwrap()
    }

    /// Fails the test instead of hanging when a call is not bounded.
    async fn within<T>(fut: impl Future<Output = T>) -> T {
        tokio::time::timeout(Duration::from_secs(10), fut)
            .await
            .expect("browser call was not bounded")
    }

    #[tokio::test]
    async fn sign_in_reaching_dashboard_succeeds_and_reads_status() {
        let server = webdriver_server().await;
        stub_portal(&server, &format!("{DASHBOARD}/")).await;
        let mut session = open(&server).await;

        within(session.authenticate()).await.unwrap();
        let status = within(session.read_status()).await.unwrap();
        assert_eq!(status.as_str(), "May 2, 2024");
    }

    #[tokio::test]
    async fn sign_in_landing_elsewhere_is_rejected() {
        let server = webdriver_server().await;
        stub_portal(&server, "https://portal.example/en/login?error=1").await;
        let mut session = open(&server).await;

        let err = within(session.authenticate()).await.unwrap_err();
        match err {
            SessionError::Rejected { current_url } => {
                assert_eq!(current_url, "https://portal.example/en/login?error=1");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_status_element_times_out() {
        let server = webdriver_server().await;
        stub(&server, "POST", "/session/s1/execute/sync", reply(Value::Null)).await;
        stub(
            &server,
            "POST",
            "/session/s1/element",
            ResponseTemplate::new(404).set_body_json(json!({
                "value": {
                    "error": "no such element",
                    "message": "no such element: .date-text",
                    "stacktrace": ""
                }
            })),
        )
        .await;
        let mut session = open(&server).await;

        let err = within(session.read_status()).await.unwrap_err();
        match err {
            SessionError::Timeout { step, timeout } => {
                assert_eq!(step, "status field");
                assert_eq!(timeout, Duration::from_secs(1));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn stalled_element_lookup_is_cut_off() {
        let server = webdriver_server().await;
        stub(&server, "POST", "/session/s1/execute/sync", reply(Value::Null)).await;
        stub(
            &server,
            "POST",
            "/session/s1/element",
            reply(json!({ ELEMENT_KEY: "e1" })).set_delay(Duration::from_secs(3600)),
        )
        .await;
        let mut session = open(&server).await;

        let err = within(session.read_status()).await.unwrap_err();
        assert!(err.is_timeout(), "{err}");
    }

    #[tokio::test]
    async fn stalled_browser_cannot_block_screenshot() {
        let server = webdriver_server().await;
        Mock::given(path_regex("^/session/s1/.+"))
            .respond_with(reply(Value::Null).set_delay(Duration::from_secs(3600)))
            .mount(&server)
            .await;
        let mut session = open(&server).await;

        let err = within(session.screenshot()).await.unwrap_err();
        assert!(err.is_timeout(), "{err}");
    }

    #[test]
    fn capabilities_include_headless_and_window_size() {
        let mut config = Config::default();
        config.browser.window_width = 800;
        config.browser.window_height = 600;
        let caps = WebDriverProvider::new(&config).capabilities();

        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        let args: Vec<&str> = args.iter().filter_map(|a| a.as_str()).collect();
        assert!(args.contains(&"--headless"));
        assert!(args.contains(&"--window-size=800,600"));
        assert!(args.contains(&"--disable-blink-features=AutomationControlled"));
    }

    #[test]
    fn headed_mode_omits_headless_flag() {
        let mut config = Config::default();
        config.browser.headless = false;
        let caps = WebDriverProvider::new(&config).capabilities();
        assert!(!caps["goog:chromeOptions"].to_string().contains("--headless"));
    }

    #[test]
    fn dashboard_match_ignores_trailing_slash() {
        assert!(same_location(
            "https://portal.example/en/dashboard/",
            "https://portal.example/en/dashboard"
        ));
        assert!(!same_location(
            "https://portal.example/en/login",
            "https://portal.example/en/dashboard"
        ));
    }
}
