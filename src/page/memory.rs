//! In-memory document implementing [`PagePort`].
//!
//! Useful wherever a real browser is unavailable: every port call is applied to a small
//! element tree and recorded, with its virtual timestamp, in an event log.

use std::collections::BTreeMap;

use async_trait::async_trait;
use log::debug;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{
    BoundingBox, CursorCommand, DomEvent, PagePort, PageSnapshot, SnapshotNode, Viewport,
};
use crate::selector::Selector;
use crate::types::PilotError;

pub type NodeId = usize;

/// Something that happened to the page through the port.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    Dispatched { node: NodeId, event: DomEvent },
    ValueSet { node: NodeId, value: String },
    Highlight { node: NodeId, on: bool },
    Cursor(CursorCommand),
}

/// Description of an element to insert.
#[derive(Debug, Clone)]
pub struct ElementSpec {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    rect: BoundingBox,
    hidden: bool,
}

impl ElementSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            text: String::new(),
            rect: BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 100.0,
                height: 24.0,
            },
            hidden: false,
        }
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn rect(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.rect = BoundingBox {
            x,
            y,
            width,
            height,
        };
        self
    }

    /// `display: none`.
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }
}

#[derive(Debug)]
struct Node {
    spec: ElementSpec,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    value: String,
}

#[derive(Debug)]
struct Dom {
    nodes: Vec<Node>,
}

impl Dom {
    /// Snapshot plus the node id behind each snapshot index.
    fn snapshot(&self) -> (PageSnapshot, Vec<NodeId>) {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut snapshot_nodes = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(NodeId, Option<usize>, bool)> = vec![(ROOT, None, false)];

        while let Some((id, parent, parent_hidden)) = stack.pop() {
            let node = &self.nodes[id];
            let hidden = parent_hidden || node.spec.hidden;
            let index = snapshot_nodes.len();
            order.push(id);
            snapshot_nodes.push(SnapshotNode {
                tag: node.spec.tag.clone(),
                parent,
                attrs: node.spec.attrs.clone(),
                text: if hidden {
                    String::new()
                } else {
                    self.text_of(id)
                },
                width: if hidden { 0.0 } else { node.spec.rect.width },
                height: if hidden { 0.0 } else { node.spec.rect.height },
                hidden,
            });
            for &child in node.children.iter().rev() {
                stack.push((child, Some(index), hidden));
            }
        }

        (PageSnapshot::new(snapshot_nodes), order)
    }

    fn text_of(&self, id: NodeId) -> String {
        let mut parts = Vec::new();
        self.collect_text(id, &mut parts);
        parts.join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn collect_text<'a>(&'a self, id: NodeId, parts: &mut Vec<&'a str>) {
        let node = &self.nodes[id];
        if node.spec.hidden {
            return;
        }
        parts.push(&node.spec.text);
        for &child in &node.children {
            self.collect_text(child, parts);
        }
    }
}

const ROOT: NodeId = 0;
const BODY: NodeId = 1;

#[derive(Debug)]
pub struct MemoryPage {
    dom: Mutex<Dom>,
    events: Mutex<Vec<(Instant, PageEvent)>>,
    viewport: Viewport,
}

impl Default for MemoryPage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPage {
    /// An empty `html > body` document with a 1280x800 viewport.
    pub fn new() -> Self {
        let html = Node {
            spec: ElementSpec::new("html").rect(0.0, 0.0, 1280.0, 800.0),
            parent: None,
            children: vec![BODY],
            value: String::new(),
        };
        let body = Node {
            spec: ElementSpec::new("body").rect(0.0, 0.0, 1280.0, 800.0),
            parent: Some(ROOT),
            children: Vec::new(),
            value: String::new(),
        };
        Self {
            dom: Mutex::new(Dom {
                nodes: vec![html, body],
            }),
            events: Mutex::new(Vec::new()),
            viewport: Viewport {
                width: 1280.0,
                height: 800.0,
            },
        }
    }

    pub fn body(&self) -> NodeId {
        BODY
    }

    /// Appends a new last child to `parent`.
    pub fn append(&self, parent: NodeId, spec: ElementSpec) -> NodeId {
        let mut dom = self.dom.lock();
        let id = dom.nodes.len();
        let value = spec.attrs.get("value").cloned().unwrap_or_default();
        dom.nodes.push(Node {
            spec,
            parent: Some(parent),
            children: Vec::new(),
            value,
        });
        dom.nodes[parent].children.push(id);
        id
    }

    /// Current value of a form control.
    pub fn value_of(&self, node: NodeId) -> String {
        self.dom.lock().nodes[node].value.clone()
    }

    /// Every event recorded so far.
    pub fn events(&self) -> Vec<PageEvent> {
        self.events.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    /// Recorded events with the instant they happened.
    pub fn timeline(&self) -> Vec<(Instant, PageEvent)> {
        self.events.lock().clone()
    }

    /// Ids of every element `selector` matches, in document order.
    pub fn query_all(&self, selector: &str) -> Vec<NodeId> {
        let Some(selector) = Selector::parse(selector) else {
            return Vec::new();
        };
        let (snapshot, order) = self.dom.lock().snapshot();
        selector
            .query_all(&snapshot)
            .into_iter()
            .map(|index| order[index])
            .collect()
    }

    fn record(&self, event: PageEvent) {
        self.events.lock().push((Instant::now(), event));
    }

    fn check(&self, node: NodeId) -> Result<(), PilotError> {
        if node < self.dom.lock().nodes.len() {
            Ok(())
        } else {
            Err(PilotError::OperationError(format!("no node {node}")))
        }
    }
}

#[async_trait]
impl PagePort for MemoryPage {
    type Handle = NodeId;

    async fn resolve(&self, selector: &str) -> Result<Option<NodeId>, PilotError> {
        if Selector::parse(selector).is_none() {
            debug!("Unsupported selector '{}'", selector);
        }
        Ok(self.query_all(selector).first().copied())
    }

    async fn bounding_box(&self, handle: &NodeId) -> Result<BoundingBox, PilotError> {
        self.check(*handle)?;
        Ok(self.dom.lock().nodes[*handle].spec.rect)
    }

    async fn viewport(&self) -> Result<Viewport, PilotError> {
        Ok(self.viewport)
    }

    async fn dispatch(&self, handle: &NodeId, event: DomEvent) -> Result<(), PilotError> {
        self.check(*handle)?;
        self.record(PageEvent::Dispatched {
            node: *handle,
            event,
        });
        Ok(())
    }

    async fn value(&self, handle: &NodeId) -> Result<String, PilotError> {
        self.check(*handle)?;
        Ok(self.value_of(*handle))
    }

    async fn set_value(&self, handle: &NodeId, value: &str) -> Result<(), PilotError> {
        self.check(*handle)?;
        self.dom.lock().nodes[*handle].value = value.to_string();
        self.record(PageEvent::ValueSet {
            node: *handle,
            value: value.to_string(),
        });
        Ok(())
    }

    async fn set_highlight(&self, handle: &NodeId, on: bool) -> Result<(), PilotError> {
        self.check(*handle)?;
        self.record(PageEvent::Highlight { node: *handle, on });
        Ok(())
    }

    async fn cursor(&self, command: CursorCommand) -> Result<(), PilotError> {
        self.record(PageEvent::Cursor(command));
        Ok(())
    }

    async fn snapshot(&self) -> Result<PageSnapshot, PilotError> {
        Ok(self.dom.lock().snapshot().0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolves_in_document_order() {
        let page = MemoryPage::new();
        let form = page.append(page.body(), ElementSpec::new("form"));
        let first = page.append(form, ElementSpec::new("input").attr("name", "q"));
        let later = page.append(page.body(), ElementSpec::new("input").attr("name", "q"));

        assert_eq!(page.resolve("input[name=q]").await.unwrap(), Some(first));
        assert_eq!(page.query_all("input"), vec![first, later]);
        assert_eq!(page.resolve("body > input").await.unwrap(), Some(later));
        assert_eq!(page.resolve("a:hover").await.unwrap(), None);
    }

    #[tokio::test]
    async fn snapshot_text_and_visibility() {
        let page = MemoryPage::new();
        let menu = page.append(page.body(), ElementSpec::new("div").hidden());
        page.append(menu, ElementSpec::new("button").text("Hidden"));
        let button = page.append(page.body(), ElementSpec::new("button").text("  Save "));
        page.append(button, ElementSpec::new("span").text("\n draft"));

        let snapshot = page.snapshot().await.unwrap();
        let texts: Vec<&str> = snapshot.nodes().iter().map(|n| n.text.as_str()).collect();
        assert_eq!(texts, vec!["Save draft", "Save draft", "", "", "Save draft", "draft"]);
        assert!(!snapshot.is_visible(3));
        assert!(snapshot.is_visible(4));
    }

    #[tokio::test]
    async fn set_value_is_recorded() {
        let page = MemoryPage::new();
        let input = page.append(page.body(), ElementSpec::new("input").attr("value", "a"));
        assert_eq!(page.value(&input).await.unwrap(), "a");
        page.set_value(&input, "ab").await.unwrap();
        assert_eq!(page.value_of(input), "ab");
        assert_eq!(
            page.events(),
            vec![PageEvent::ValueSet {
                node: input,
                value: "ab".into()
            }]
        );
        assert!(page.dispatch(&99, DomEvent::Click).await.is_err());
    }
}
