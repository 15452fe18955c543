use async_trait::async_trait;
use fantoccini::{
    Client, ClientBuilder, Locator,
    elements::Element,
    wd::Capabilities,
};
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::js;
use crate::page::{
    BoundingBox, CursorCommand, DomEvent, PagePort, PageSnapshot, SnapshotNode, Viewport,
};
use crate::types::{PilotError, PilotOptions};

/// High-level browser automation client powered by 'fantoccini'.
///
/// Clones share the same WebDriver session.
#[derive(Clone)]
pub struct BrowserClient {
    /// The underlying WebDriver client instance.
    pub client: Client,
    /// Configuration options used to initialize the browser.
    options: PilotOptions,
}

impl BrowserClient {
    /// Connects to the WebDriver server named in `options`.
    pub async fn connect(options: PilotOptions) -> Result<Self, PilotError> {
        let mut caps = Capabilities::new();

        let firefox_options = json!({
            "args": if options.headless {
                vec!["-headless"]
            } else {
                vec![]
            }
        });
        caps.insert("moz:firefoxOptions".to_string(), firefox_options);

        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&options.webdriver_url)
            .await
            .map_err(|e| PilotError::ConnectionError(e.to_string()))?;

        if let Some((width, height)) = options.window_size {
            client
                .set_window_size(width, height)
                .await
                .map_err(|e| PilotError::OperationError(e.to_string()))?;
        }

        info!("Connected to WebDriver at {}", options.webdriver_url);

        Ok(Self { client, options })
    }

    /// Navigates the current tab to the given URL.
    pub async fn navigate(&mut self, url: &str) -> Result<(), PilotError> {
        info!("Navigating to {}", url);
        self.client
            .goto(url)
            .await
            .map_err(|e| PilotError::OperationError(e.to_string()))
    }

    /// Injects the chat widget into the current page and waits for it to attach.
    pub async fn inject_widget(&mut self) -> Result<(), PilotError> {
        let greeting = json!(self.options.greeting);
        self.client
            .execute(&js::widget_ui(), vec![greeting])
            .await
            .map_err(|e| PilotError::OperationError(format!("Failed to inject widget: {}", e)))?;
        self.wait_for_selector("#pilot-widget").await
    }

    /// Takes the prompt the user submitted in the widget, if any.
    pub async fn poll_prompt(&self) -> Result<Option<String>, PilotError> {
        let res = self
            .client
            .execute(js::POLL_PROMPT, vec![])
            .await
            .map_err(|e| PilotError::OperationError(e.to_string()))?;
        Ok(res.as_str().map(str::to_string))
    }

    /// Writes the reply and the suggestion chips into the widget.
    pub async fn render_reply(&self, display: &str, suggestions: &[String]) -> Result<(), PilotError> {
        self.client
            .execute(js::RENDER_REPLY, vec![json!(display), json!(suggestions)])
            .await
            .map(|_| ())
            .map_err(|e| PilotError::OperationError(format!("Failed to render reply: {}", e)))
    }

    /// Waits for a specific CSS selector to be present in the current tab.
    pub async fn wait_for_selector(&mut self, wait_selector: &str) -> Result<(), PilotError> {
        self.client
            .wait()
            .for_element(Locator::Css(wait_selector))
            .await
            .map(|_| ())
            .map_err(|e| {
                PilotError::OperationError(format!(
                    "Page not ready (waiting for '{}'): {}",
                    wait_selector, e
                ))
            })
    }

    /// Page port over this session.
    pub fn page(&self) -> WebDriverPage {
        WebDriverPage {
            client: self.client.clone(),
        }
    }

    /// Shuts down the browser session and closes the webdriver.
    pub async fn shutdown(self) -> Result<(), PilotError> {
        self.client
            .close()
            .await
            .map_err(|e| PilotError::OperationError(e.to_string()))
    }
}

/// [`PagePort`] backed by script execution in a WebDriver session.
#[derive(Clone)]
pub struct WebDriverPage {
    client: Client,
}

impl WebDriverPage {
    async fn run(&self, script: &str, args: Vec<Value>) -> Result<Value, PilotError> {
        self.client
            .execute(script, args)
            .await
            .map_err(|e| PilotError::OperationError(e.to_string()))
    }

    async fn run_on(
        &self,
        element: &Element,
        script: &str,
        mut extra: Vec<Value>,
    ) -> Result<Value, PilotError> {
        let mut args = vec![serde_json::to_value(element)?];
        args.append(&mut extra);
        self.run(script, args).await
    }

    fn parse<T: DeserializeOwned>(value: Value) -> Result<T, PilotError> {
        Ok(serde_json::from_value(value)?)
    }
}

#[async_trait]
impl PagePort for WebDriverPage {
    type Handle = Element;

    async fn resolve(&self, selector: &str) -> Result<Option<Element>, PilotError> {
        let found = self
            .client
            .find_all(Locator::Css(selector))
            .await
            .map_err(|e| {
                PilotError::OperationError(format!("Failed to query '{}': {}", selector, e))
            })?;
        Ok(found.into_iter().next())
    }

    async fn bounding_box(&self, handle: &Element) -> Result<BoundingBox, PilotError> {
        let value = self.run_on(handle, js::BOUNDING_BOX, vec![]).await?;
        Self::parse(value)
    }

    async fn viewport(&self) -> Result<Viewport, PilotError> {
        let value = self.run(js::VIEWPORT, vec![]).await?;
        Self::parse(value)
    }

    async fn dispatch(&self, handle: &Element, event: DomEvent) -> Result<(), PilotError> {
        debug!("Dispatching {}", event.name());
        self.run_on(handle, js::DISPATCH, vec![json!(event.name())])
            .await
            .map(|_| ())
    }

    async fn value(&self, handle: &Element) -> Result<String, PilotError> {
        let value = self.run_on(handle, js::READ_VALUE, vec![]).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn set_value(&self, handle: &Element, value: &str) -> Result<(), PilotError> {
        self.run_on(handle, js::WRITE_VALUE, vec![json!(value)])
            .await
            .map(|_| ())
    }

    async fn set_highlight(&self, handle: &Element, on: bool) -> Result<(), PilotError> {
        self.run_on(handle, js::HIGHLIGHT, vec![json!(on)])
            .await
            .map(|_| ())
    }

    async fn cursor(&self, command: CursorCommand) -> Result<(), PilotError> {
        let args = match command {
            CursorCommand::Show(at) => vec![json!("show"), json!(at.x), json!(at.y)],
            CursorCommand::MoveTo { to, over } => vec![
                json!("move"),
                json!(to.x),
                json!(to.y),
                json!(over.as_millis() as u64),
            ],
            CursorCommand::Press => vec![json!("press")],
            CursorCommand::Remove => vec![json!("remove")],
        };
        self.run(js::CURSOR, args).await.map(|_| ())
    }

    async fn snapshot(&self) -> Result<PageSnapshot, PilotError> {
        let value = self
            .client
            .execute(js::SNAPSHOT, vec![])
            .await
            .map_err(|e| PilotError::DomExtractionError(e.to_string()))?;
        let nodes: Vec<SnapshotNode> = serde_json::from_value(value)
            .map_err(|e| PilotError::DomExtractionError(e.to_string()))?;
        Ok(PageSnapshot::new(nodes))
    }
}
