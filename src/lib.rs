pub mod client;
pub mod dom;
pub mod executor;
pub mod extract;
pub mod js;
pub mod page;
pub mod selector;
pub mod sequencer;
pub mod session;
pub mod stream;
pub mod transport;
pub mod types;

pub use client::{BrowserClient, WebDriverPage};
pub use dom::ContextScraper;
pub use executor::{ActionExecutor, ActionRunner};
pub use extract::{DirectiveExtractor, Effect};
pub use page::PagePort;
pub use page::memory::MemoryPage;
pub use sequencer::ActionSequencer;
pub use session::ChatSession;
pub use stream::StreamAssembler;
pub use transport::{ChatTransport, HttpTransport};
pub use types::{
    ChatRequest, ContextEntry, Directive, DirectiveKind, Message, PilotError, PilotOptions, Role,
    Timings,
};
