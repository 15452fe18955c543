//! The page automation port.
//!
//! Everything the executor and the scraper need from a live page goes through [`PagePort`],
//! so both stay independent of the browser driver. [`client::WebDriverPage`] drives a real
//! browser; [`memory::MemoryPage`] is an in-memory document.
//!
//! [`client::WebDriverPage`]: crate::client::WebDriverPage

pub mod memory;

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use crate::selector::ElementTree;
use crate::types::PilotError;

/// Id of the chat widget's root element; its subtree is never offered to the agent.
pub const WIDGET_ROOT_ID: &str = "pilot-widget";

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn center(&self) -> Point {
        Point {
            x: self.x + self.width / 2.0,
            y: self.y + self.height / 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn center(&self) -> Point {
        Point {
            x: self.width / 2.0,
            y: self.height / 2.0,
        }
    }
}

/// Synthetic events the executor dispatches against an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomEvent {
    PointerDown,
    PointerUp,
    Click,
    Focus,
    Input,
    Change,
    Blur,
}

impl DomEvent {
    pub fn name(self) -> &'static str {
        match self {
            DomEvent::PointerDown => "pointerdown",
            DomEvent::PointerUp => "pointerup",
            DomEvent::Click => "click",
            DomEvent::Focus => "focus",
            DomEvent::Input => "input",
            DomEvent::Change => "change",
            DomEvent::Blur => "blur",
        }
    }
}

/// Operations on the synthetic pointer marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CursorCommand {
    Show(Point),
    MoveTo { to: Point, over: Duration },
    Press,
    Remove,
}

#[async_trait]
pub trait PagePort: Send + Sync {
    type Handle: Clone + Send + Sync + 'static;

    /// First element matching `selector`, if any.
    async fn resolve(&self, selector: &str) -> Result<Option<Self::Handle>, PilotError>;

    async fn bounding_box(&self, handle: &Self::Handle) -> Result<BoundingBox, PilotError>;

    async fn viewport(&self) -> Result<Viewport, PilotError>;

    async fn dispatch(&self, handle: &Self::Handle, event: DomEvent) -> Result<(), PilotError>;

    async fn value(&self, handle: &Self::Handle) -> Result<String, PilotError>;

    /// Sets the element's value without notifying listeners.
    async fn set_value(&self, handle: &Self::Handle, value: &str) -> Result<(), PilotError>;

    async fn set_highlight(&self, handle: &Self::Handle, on: bool) -> Result<(), PilotError>;

    async fn cursor(&self, command: CursorCommand) -> Result<(), PilotError>;

    /// Structural snapshot of the whole document.
    async fn snapshot(&self) -> Result<PageSnapshot, PilotError>;
}

/// One element as captured by a snapshot.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub tag: String,
    /// Index of the parent in the same snapshot.
    #[serde(default)]
    pub parent: Option<usize>,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    /// Rendered text of the element and its descendants.
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    /// Explicitly hidden (`display: none` on the element or an ancestor).
    #[serde(default)]
    pub hidden: bool,
}

/// Elements of a page in document order.
#[derive(Debug, Clone, Default)]
pub struct PageSnapshot {
    nodes: Vec<SnapshotNode>,
    nth_of_type: Vec<usize>,
    in_widget: Vec<bool>,
}

impl PageSnapshot {
    /// Builds a snapshot from nodes listed in document order.
    ///
    /// A parent index that does not point at an earlier node is dropped, so every parent
    /// chain terminates.
    pub fn new(mut nodes: Vec<SnapshotNode>) -> Self {
        let mut nth_of_type = Vec::with_capacity(nodes.len());
        let mut in_widget = Vec::with_capacity(nodes.len());
        let mut seen: HashMap<(Option<usize>, String), usize> = HashMap::new();

        for index in 0..nodes.len() {
            let node = &mut nodes[index];
            node.tag = node.tag.to_ascii_lowercase();
            if node.parent.is_some_and(|parent| parent >= index) {
                node.parent = None;
            }

            let counter = seen.entry((node.parent, node.tag.clone())).or_insert(0);
            *counter += 1;
            nth_of_type.push(*counter);

            let own = node.attrs.get("id").is_some_and(|id| id == WIDGET_ROOT_ID);
            let inherited = node.parent.is_some_and(|parent| in_widget[parent]);
            in_widget.push(own || inherited);
        }

        Self {
            nodes,
            nth_of_type,
            in_widget,
        }
    }

    pub fn nodes(&self) -> &[SnapshotNode] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &SnapshotNode {
        &self.nodes[index]
    }

    /// Whether the element belongs to the chat widget's own subtree.
    pub fn in_widget(&self, index: usize) -> bool {
        self.in_widget[index]
    }

    pub fn is_visible(&self, index: usize) -> bool {
        let node = &self.nodes[index];
        !node.hidden && node.width > 0.0 && node.height > 0.0
    }

    /// Parent chain, nearest first.
    pub fn ancestors(&self, index: usize) -> impl Iterator<Item = usize> + '_ {
        std::iter::successors(self.nodes[index].parent, |&i| self.nodes[i].parent)
    }
}

impl ElementTree for PageSnapshot {
    fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn tag(&self, node: usize) -> &str {
        &self.nodes[node].tag
    }

    fn attr(&self, node: usize, name: &str) -> Option<&str> {
        self.nodes[node].attrs.get(name).map(String::as_str)
    }

    fn parent(&self, node: usize) -> Option<usize> {
        self.nodes[node].parent
    }

    fn nth_of_type(&self, node: usize) -> usize {
        self.nth_of_type[node]
    }
}
