//! One conversation: transcript, suggestion set and the turn loop.

use std::sync::Arc;

use futures_util::StreamExt;
use log::{error, info, warn};

use crate::dom::ContextScraper;
use crate::executor::ActionExecutor;
use crate::extract::Effect;
use crate::page::PagePort;
use crate::sequencer::ActionSequencer;
use crate::stream::{ChunkUpdate, StreamAssembler};
use crate::transport::ChatTransport;
use crate::types::{ChatRequest, Message, PilotError, PilotOptions};

pub struct ChatSession<T: ChatTransport, P: PagePort + 'static> {
    transport: T,
    page: Arc<P>,
    scraper: ContextScraper,
    sequencer: ActionSequencer,
    history_window: usize,
    messages: Vec<Message>,
    suggestions: Vec<String>,
    streaming: bool,
}

impl<T: ChatTransport, P: PagePort + 'static> ChatSession<T, P> {
    /// Starts a session whose directives run against `page`. Needs a tokio runtime.
    pub fn new(transport: T, page: Arc<P>, options: &PilotOptions) -> Self {
        let executor = ActionExecutor::new(Arc::clone(&page), options.timings.clone());
        let messages = options
            .greeting
            .as_deref()
            .map(Message::assistant)
            .into_iter()
            .collect();

        Self {
            transport,
            page,
            scraper: ContextScraper::new(options.context_limit),
            sequencer: ActionSequencer::new(executor, options.timings.settle),
            history_window: options.history_window,
            messages,
            suggestions: Vec::new(),
            streaming: false,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Resolves once every directive received so far has run.
    pub async fn wait_for_actions(&self) {
        self.sequencer.wait_idle().await;
    }

    /// Runs one turn.
    ///
    /// `on_display` receives every new display projection while the reply streams. Returns
    /// the finished assistant message, or `None` when `text` is blank. Back-end failures end
    /// up as the assistant message content rather than as an error.
    pub async fn send_message(
        &mut self,
        text: &str,
        mut on_display: impl FnMut(&str),
    ) -> Option<&Message> {
        if text.trim().is_empty() {
            return None;
        }

        let start = self.messages.len().saturating_sub(self.history_window);
        let history = self.messages[start..].to_vec();
        self.messages.push(Message::user(text));
        self.suggestions.clear();

        let ui_context = self.ui_context().await;
        let request = ChatRequest {
            message: text.to_string(),
            history,
            ui_context,
        };

        let reply = self.messages.len();
        self.messages.push(Message::assistant(""));
        self.streaming = true;

        if let Err(e) = self.stream_reply(&request, reply, &mut on_display).await {
            error!("Turn failed: {}", e);
            self.messages[reply].content = format!("Error: {e}");
            on_display(&self.messages[reply].content);
        }

        self.streaming = false;
        self.messages.get(reply)
    }

    /// Sends the suggestion at `index` as the next user message.
    pub async fn send_suggestion(
        &mut self,
        index: usize,
        on_display: impl FnMut(&str),
    ) -> Option<&Message> {
        let text = self.suggestions.get(index)?.clone();
        self.send_message(&text, on_display).await
    }

    async fn ui_context(&self) -> String {
        let serialized = match self.scraper.scan(self.page.as_ref()).await {
            Ok(entries) => ContextScraper::to_ui_context(&entries),
            Err(e) => Err(e),
        };
        serialized.unwrap_or_else(|e| {
            warn!("Sending empty page context: {}", e);
            "[]".to_string()
        })
    }

    async fn stream_reply(
        &mut self,
        request: &ChatRequest,
        reply: usize,
        on_display: &mut impl FnMut(&str),
    ) -> Result<(), PilotError> {
        let mut chunks = self.transport.open(request).await?;
        let mut assembler = StreamAssembler::new();

        while let Some(chunk) = chunks.next().await {
            let update = assembler.append_chunk(&chunk?);
            self.publish(update, reply, &mut *on_display);
        }
        let update = assembler.finish();
        self.publish(update, reply, &mut *on_display);

        info!(
            "Reply complete: {} directives, {} rejected blocks",
            assembler.extractor().extracted(),
            assembler.extractor().rejected()
        );
        Ok(())
    }

    /// Applies the chunk's effects and forwards a changed display projection.
    fn publish(&mut self, update: ChunkUpdate, reply: usize, on_display: &mut impl FnMut(&str)) {
        self.apply(update.effects);
        let message = &mut self.messages[reply];
        if message.content != update.display {
            message.content = update.display;
            on_display(&message.content);
        }
    }

    fn apply(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Action(directive) => self.sequencer.enqueue(directive),
                Effect::Suggestions(items) => self.suggestions = items,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::DomEvent;
    use crate::page::memory::{ElementSpec, MemoryPage, PageEvent};
    use crate::transport::ChunkStream;
    use crate::types::{ContextEntry, Role};
    use async_trait::async_trait;
    use futures_util::stream;
    use parking_lot::Mutex;

    /// Replies with canned chunks and remembers every request.
    #[derive(Default)]
    struct ScriptedTransport {
        replies: Mutex<Vec<Vec<Result<Vec<u8>, PilotError>>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedTransport {
        fn reply(self, chunks: &[&str]) -> Self {
            self.replies
                .lock()
                .push(chunks.iter().map(|c| Ok(c.as_bytes().to_vec())).collect());
            self
        }
    }

    #[async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn open(&self, request: &ChatRequest) -> Result<ChunkStream, PilotError> {
            self.requests.lock().push(request.clone());
            let mut replies = self.replies.lock();
            if replies.is_empty() {
                return Err(PilotError::TransportError("HTTP error! status: 500".into()));
            }
            Ok(stream::iter(replies.remove(0)).boxed())
        }
    }

    fn page_with_settings() -> Arc<MemoryPage> {
        let page = MemoryPage::new();
        page.append(
            page.body(),
            ElementSpec::new("button").attr("id", "settings").text("Settings"),
        );
        Arc::new(page)
    }

    #[tokio::test(start_paused = true)]
    async fn turn_streams_display_and_runs_directives() {
        let transport = Arc::new(ScriptedTransport::default().reply(&[
            "Opening [DOM_ACT",
            "ION]{\"type\":\"click\",\"target\":\"#settings\"}[/DOM_ACTION]",
            "settings.[SUGGESTIONS][\"Change theme\",",
            "\"Log out\"][/SUGGESTIONS]",
        ]));
        let page = page_with_settings();
        let mut session = ChatSession::new(
            Arc::clone(&transport),
            Arc::clone(&page),
            &PilotOptions::default(),
        );

        let mut updates = Vec::new();
        let reply = session
            .send_message("Open settings", |d| updates.push(d.to_string()))
            .await
            .cloned()
            .unwrap();

        assert_eq!(reply, Message::assistant("Opening settings."));
        assert_eq!(updates.first().map(String::as_str), Some("Opening"));
        assert_eq!(updates.last().map(String::as_str), Some("Opening settings."));
        assert!(updates.iter().all(|u| !u.contains('[')));
        assert_eq!(session.suggestions(), ["Change theme", "Log out"]);
        assert!(!session.is_streaming());

        let roles: Vec<Role> = session.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::User, Role::Assistant]);

        let request = transport.requests.lock()[0].clone();
        assert_eq!(request.message, "Open settings");
        assert_eq!(
            request.history,
            vec![Message::assistant("Systems online. Ready for autonomous interaction.")]
        );
        let context: Vec<ContextEntry> = serde_json::from_str(&request.ui_context).unwrap();
        assert_eq!(context[0].label, "Settings");
        assert_eq!(context[0].selector, "#settings");

        session.wait_for_actions().await;
        assert!(page.events().contains(&PageEvent::Dispatched {
            node: 2,
            event: DomEvent::Click
        }));
    }

    #[tokio::test]
    async fn blank_input_is_ignored() {
        let transport = Arc::new(ScriptedTransport::default());
        let mut session =
            ChatSession::new(Arc::clone(&transport), page_with_settings(), &PilotOptions::default());

        assert!(session.send_message("   \n", |_| {}).await.is_none());
        assert_eq!(session.messages().len(), 1);
        assert!(transport.requests.lock().is_empty());
    }

    #[tokio::test]
    async fn transport_failure_becomes_the_reply() {
        let transport = Arc::new(ScriptedTransport::default());
        let options = PilotOptions::default().greeting(None);
        let mut session = ChatSession::new(Arc::clone(&transport), page_with_settings(), &options);

        let mut shown = Vec::new();
        let reply = session
            .send_message("hello", |d| shown.push(d.to_string()))
            .await
            .cloned()
            .unwrap();

        assert_eq!(
            reply.content,
            "Error: Chat transport failed: HTTP error! status: 500"
        );
        assert_eq!(shown, vec![reply.content.clone()]);
        assert!(!session.is_streaming());
        assert!(transport.requests.lock()[0].history.is_empty());
    }

    #[tokio::test]
    async fn broken_stream_keeps_nothing_but_the_error() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.replies.lock().push(vec![
            Ok(b"partial answ".to_vec()),
            Err(PilotError::TransportError("connection reset".into())),
        ]);
        let mut session =
            ChatSession::new(Arc::clone(&transport), page_with_settings(), &PilotOptions::default());

        let reply = session.send_message("hi", |_| {}).await.cloned().unwrap();
        assert_eq!(reply.content, "Error: Chat transport failed: connection reset");
    }

    #[tokio::test(start_paused = true)]
    async fn directives_before_a_broken_stream_still_run() {
        let transport = Arc::new(ScriptedTransport::default());
        transport.replies.lock().push(vec![
            Ok(br##"On it [DOM_ACTION]{"type":"click","target":"#settings"}[/DOM_ACTION]"##.to_vec()),
            Err(PilotError::TransportError("reset".into())),
        ]);
        let page = page_with_settings();
        let mut session = ChatSession::new(
            Arc::clone(&transport),
            Arc::clone(&page),
            &PilotOptions::default(),
        );

        let reply = session.send_message("open settings", |_| {}).await.cloned().unwrap();
        assert_eq!(reply.content, "Error: Chat transport failed: reset");

        session.wait_for_actions().await;
        assert!(page.events().contains(&PageEvent::Dispatched {
            node: 2,
            event: DomEvent::Click
        }));
    }

    #[tokio::test]
    async fn history_is_windowed_and_suggestions_reset() {
        let transport = Arc::new(
            ScriptedTransport::default()
                .reply(&["one [SUGGESTIONS][\"next\"][/SUGGESTIONS]"])
                .reply(&["two"])
                .reply(&["three"])
                .reply(&["four"]),
        );
        let mut session =
            ChatSession::new(Arc::clone(&transport), page_with_settings(), &PilotOptions::default());

        session.send_message("a", |_| {}).await;
        assert_eq!(session.suggestions(), ["next"]);
        session.send_suggestion(0, |_| {}).await;
        assert!(session.suggestions().is_empty());
        session.send_message("c", |_| {}).await;
        session.send_message("d", |_| {}).await;

        let requests = transport.requests.lock().clone();
        assert_eq!(requests[1].message, "next");
        let last = &requests[3];
        assert_eq!(last.history.len(), 6);
        assert_eq!(last.history.last(), Some(&Message::assistant("three")));
        assert_eq!(session.messages().len(), 9);
        assert!(session.send_suggestion(0, |_| {}).await.is_none());
    }
}
