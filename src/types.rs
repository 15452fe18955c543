use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Duration;

//
// ---------- Error Types ----------
//
#[derive(Debug, Error)]
pub enum PilotError {
    #[error("WebDriver connection failed: {0}")]
    ConnectionError(String),

    #[error("Page operation failed: {0}")]
    OperationError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Failed to snapshot the page: {0}")]
    DomExtractionError(String),

    #[error("Chat transport failed: {0}")]
    TransportError(String),

    #[error("Serialization failed: {0}")]
    SerializationError(#[from] serde_json::Error),
}

//
// ---------- Conversation Types ----------
//
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Body of one `POST /chat` request.
#[derive(Debug, Serialize, Clone)]
pub struct ChatRequest {
    pub message: String,
    pub history: Vec<Message>,
    /// JSON-serialized list of [`ContextEntry`].
    pub ui_context: String,
}

//
// ---------- Directive Types ----------
//
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "lowercase")]
pub enum DirectiveKind {
    Click,
    Type,
    /// Any `type` the executor does not know; executed as a no-op.
    #[serde(other)]
    Unsupported,
}

/// One `[DOM_ACTION]` payload.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct Directive {
    #[serde(rename = "type")]
    pub kind: DirectiveKind,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

impl Directive {
    pub fn click(target: &str) -> Self {
        Self {
            kind: DirectiveKind::Click,
            target: target.to_string(),
            value: None,
        }
    }

    pub fn type_text(target: &str, value: &str) -> Self {
        Self {
            kind: DirectiveKind::Type,
            target: target.to_string(),
            value: Some(value.to_string()),
        }
    }
}

//
// ---------- Context Types ----------
//
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ContextEntry {
    pub label: String,
    pub selector: String,
    pub element_type: String,
    pub role: String,
}

//
// ---------- Configuration ----------
//

/// Pacing constants for simulated interaction.
#[derive(Debug, Clone, Serialize)]
pub struct Timings {
    /// Pause between two consecutively executed directives.
    pub settle: Duration,
    /// How long a resolved element stays highlighted.
    pub highlight: Duration,
    /// Delay between showing the cursor and starting its travel.
    pub cursor_lead_in: Duration,
    /// Cursor travel time from the page center to the target.
    pub cursor_travel: Duration,
    /// Dwell after the press before the cursor is removed.
    pub press_dwell: Duration,
    pub keystroke_min: Duration,
    pub keystroke_max: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(500),
            highlight: Duration::from_millis(2000),
            cursor_lead_in: Duration::from_millis(50),
            cursor_travel: Duration::from_millis(800),
            press_dwell: Duration::from_millis(650),
            keystroke_min: Duration::from_millis(50),
            keystroke_max: Duration::from_millis(100),
        }
    }
}

impl Timings {
    /// Wall-clock length of one click animation.
    pub fn click_total(&self) -> Duration {
        self.cursor_lead_in + self.cursor_travel + self.press_dwell
    }
}

/// Configuration options for a pilot session.
#[derive(Debug, Clone, Serialize)]
pub struct PilotOptions {
    /// Base URL of the chat back-end.
    pub api_url: String,
    /// WebDriver endpoint used by `BrowserClient`.
    pub webdriver_url: String,
    /// Whether the browser should run in headless mode.
    pub headless: bool,
    /// Optional window dimensions (width, height).
    pub window_size: Option<(u32, u32)>,
    /// Number of most recent messages sent along as history.
    pub history_window: usize,
    /// Maximum number of context entries per request.
    pub context_limit: usize,
    /// Assistant message the transcript starts with.
    pub greeting: Option<String>,
    pub timings: Timings,
}

impl Default for PilotOptions {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            webdriver_url: "http://localhost:4444".to_string(),
            headless: false,
            window_size: Some((1920, 1080)),
            history_window: 6,
            context_limit: 20,
            greeting: Some("Systems online. Ready for autonomous interaction.".to_string()),
            timings: Timings::default(),
        }
    }
}

impl PilotOptions {
    /// Creates options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, with `PILOT_API_URL` taking over the back-end URL when set.
    pub fn from_env() -> Self {
        let options = Self::default();
        match std::env::var("PILOT_API_URL") {
            Ok(url) if !url.trim().is_empty() => options.api_url(&url),
            _ => options,
        }
    }

    /// Sets the chat back-end base URL (trailing slashes dropped).
    pub fn api_url(mut self, url: &str) -> Self {
        self.api_url = url.trim_end_matches('/').to_string();
        self
    }

    /// Sets the WebDriver server URL.
    pub fn webdriver_url(mut self, url: &str) -> Self {
        self.webdriver_url = url.to_string();
        self
    }

    /// Sets headless mode (true = no UI).
    pub fn headless(mut self, enabled: bool) -> Self {
        self.headless = enabled;
        self
    }

    /// Sets the browser window size in pixels.
    pub fn window_size(mut self, width: u32, height: u32) -> Self {
        self.window_size = Some((width, height));
        self
    }

    /// Sets how many earlier messages travel with each request.
    pub fn history_window(mut self, messages: usize) -> Self {
        self.history_window = messages;
        self
    }

    /// Sets the maximum number of UI context entries per scan.
    pub fn context_limit(mut self, entries: usize) -> Self {
        self.context_limit = entries;
        self
    }

    /// Sets the opening assistant message, or `None` for an empty transcript.
    pub fn greeting(mut self, greeting: Option<&str>) -> Self {
        self.greeting = greeting.map(str::to_string);
        self
    }

    /// Sets the action timings.
    pub fn timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Checks that limits and timing ranges are usable.
    pub fn validate(&self) -> Result<(), PilotError> {
        if self.context_limit == 0 {
            return Err(PilotError::ConfigError(
                "context_limit must be at least 1".into(),
            ));
        }
        if self.timings.keystroke_min > self.timings.keystroke_max {
            return Err(PilotError::ConfigError(
                "keystroke_min must not exceed keystroke_max".into(),
            ));
        }
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(PilotError::ConfigError(format!(
                "api_url must be an http(s) URL, got '{}'",
                self.api_url
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directive_payload_uses_type_field() {
        let directive: Directive =
            serde_json::from_str(r##"{"type":"type","target":"#q","value":"rust"}"##).unwrap();
        assert_eq!(directive, Directive::type_text("#q", "rust"));

        let directive: Directive =
            serde_json::from_str(r#"{"type":"hover","target":"a"}"#).unwrap();
        assert_eq!(directive.kind, DirectiveKind::Unsupported);
    }

    #[test]
    fn context_entry_serializes_camel_case() {
        let entry = ContextEntry {
            label: "Save".into(),
            selector: "[data-testid=\"save\"]".into(),
            element_type: "button".into(),
            role: "button".into(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["elementType"], "button");
    }

    #[test]
    fn options_validation() {
        assert!(PilotOptions::new().validate().is_ok());
        assert!(PilotOptions::new().context_limit(0).validate().is_err());
        assert!(PilotOptions::new().api_url("localhost").validate().is_err());
        assert_eq!(
            PilotOptions::new().api_url("http://x:1/").api_url,
            "http://x:1"
        );
        assert_eq!(
            Timings::default().click_total(),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn setters_override_defaults() {
        let options = PilotOptions::new()
            .webdriver_url("http://localhost:9515")
            .headless(true)
            .window_size(800, 600)
            .history_window(2)
            .context_limit(5)
            .greeting(None);

        assert_eq!(options.webdriver_url, "http://localhost:9515");
        assert!(options.headless);
        assert_eq!(options.window_size, Some((800, 600)));
        assert_eq!(options.history_window, 2);
        assert_eq!(options.context_limit, 5);
        assert_eq!(options.greeting, None);
        assert!(options.validate().is_ok());
    }
}
