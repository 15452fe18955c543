//! Context snapshot: the interactive surface of the page, as sent with each chat request.
//!
//! The page is captured once per scan and every selector is derived and checked for
//! uniqueness against that capture.

use std::collections::HashSet;

use log::debug;

use crate::page::{PagePort, PageSnapshot, SnapshotNode};
use crate::selector::{ElementTree, Selector, is_ident};
use crate::types::{ContextEntry, PilotError};

/// Test-identifier attributes, in order of preference.
pub const TEST_ID_ATTRIBUTES: [&str; 3] = ["data-testid", "data-test", "data-cy"];

const LABEL_MAX_CHARS: usize = 50;

/// Class names containing one of these describe a momentary state, not the element.
const TRANSIENT_CLASS_MARKERS: [&str; 3] = ["active", "hover", "focus"];

fn test_id(node: &SnapshotNode) -> Option<(&'static str, &str)> {
    TEST_ID_ATTRIBUTES.iter().find_map(|&name| {
        node.attrs
            .get(name)
            .filter(|v| !v.trim().is_empty())
            .map(|v| (name, v.as_str()))
    })
}

/// Trimmed value of a non-blank attribute.
fn non_empty<'a>(node: &'a SnapshotNode, name: &str) -> Option<&'a str> {
    raw_non_empty(node, name).map(str::trim)
}

/// Untrimmed value of a non-blank attribute; selectors must compare against this.
fn raw_non_empty<'a>(node: &'a SnapshotNode, name: &str) -> Option<&'a str> {
    node.attrs
        .get(name)
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
}

fn is_candidate(snapshot: &PageSnapshot, index: usize) -> bool {
    let node = snapshot.node(index);
    let tag = node.tag.as_str();

    if tag == "button" || test_id(node).is_some() {
        return true;
    }
    if matches!(non_empty(node, "role"), Some("button" | "tab")) {
        return true;
    }
    if tag != "a" {
        return false;
    }
    let internal = non_empty(node, "href").is_some_and(|h| h.starts_with('/') || h.starts_with('#'));
    internal
        || snapshot
            .ancestors(index)
            .any(|a| matches!(snapshot.tag(a), "nav" | "header"))
}

/// Visible text, then accessible label, then test id, then title; at most 50 characters.
fn derive_label(node: &SnapshotNode) -> String {
    let text = node.text.split_whitespace().collect::<Vec<_>>().join(" ");
    let raw = Some(text.as_str())
        .filter(|t| !t.is_empty())
        .or_else(|| non_empty(node, "aria-label"))
        .or_else(|| test_id(node).map(|(_, v)| v.trim()))
        .or_else(|| non_empty(node, "title"))
        .unwrap_or("");
    raw.chars()
        .take(LABEL_MAX_CHARS)
        .collect::<String>()
        .trim_end()
        .to_string()
}

fn stable_class(node: &SnapshotNode) -> Option<&str> {
    node.attrs.get("class")?.split_whitespace().find(|class| {
        is_ident(class)
            && !TRANSIENT_CLASS_MARKERS
                .iter()
                .any(|marker| class.to_ascii_lowercase().contains(marker))
    })
}

/// Preferred selector before the uniqueness check.
fn derive_selector(node: &SnapshotNode) -> Selector {
    let tag = node.tag.as_str();

    if let Some((name, value)) = test_id(node) {
        return Selector::attr(None, name, value);
    }
    if let Some(label) = raw_non_empty(node, "aria-label") {
        return Selector::attr(None, "aria-label", label);
    }
    if let Some(role) = raw_non_empty(node, "role") {
        return Selector::attr(Some(tag), "role", role);
    }
    if let Some(id) = raw_non_empty(node, "id") {
        return Selector::id(id);
    }
    if let Some(class) = stable_class(node) {
        return Selector::class(tag, class);
    }
    Selector::tag(tag)
}

/// `tag:nth-of-type(n)` chain from the document root down to `index`.
fn nth_path(snapshot: &PageSnapshot, index: usize) -> Selector {
    let mut chain: Vec<usize> = snapshot.ancestors(index).collect();
    chain.reverse();
    chain.push(index);
    Selector::nth_path(
        chain
            .iter()
            .map(|&i| (snapshot.tag(i), snapshot.nth_of_type(i))),
    )
}

fn implicit_role(node: &SnapshotNode) -> String {
    if let Some(role) = non_empty(node, "role") {
        return role.to_string();
    }
    match node.tag.as_str() {
        "a" => "link",
        "button" => "button",
        _ => "",
    }
    .to_string()
}

/// Keeps the first entry for every (label, selector) pair.
fn dedupe(entries: Vec<ContextEntry>) -> Vec<ContextEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert((e.label.clone(), e.selector.clone())))
        .collect()
}

#[derive(Debug, Clone)]
pub struct ContextScraper {
    limit: usize,
}

impl ContextScraper {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    /// Snapshots the live page and describes its interactive elements.
    pub async fn scan<P: PagePort + ?Sized>(
        &self,
        page: &P,
    ) -> Result<Vec<ContextEntry>, PilotError> {
        let snapshot = page.snapshot().await?;
        Ok(self.scan_snapshot(&snapshot))
    }

    pub fn scan_snapshot(&self, snapshot: &PageSnapshot) -> Vec<ContextEntry> {
        let mut entries = Vec::new();

        for index in 0..snapshot.node_count() {
            if !is_candidate(snapshot, index)
                || snapshot.in_widget(index)
                || !snapshot.is_visible(index)
            {
                continue;
            }

            let node = snapshot.node(index);
            let label = derive_label(node);
            if label.is_empty() {
                continue;
            }

            let mut selector = derive_selector(node);
            if selector.count(snapshot) != 1 {
                selector = nth_path(snapshot, index);
            }

            entries.push(ContextEntry {
                label,
                selector: selector.to_string(),
                element_type: node.tag.clone(),
                role: implicit_role(node),
            });
        }

        let mut entries = dedupe(entries);
        entries.truncate(self.limit);
        debug!("Context snapshot has {} entries", entries.len());
        entries
    }

    /// Serialized form sent as `ui_context`.
    pub fn to_ui_context(entries: &[ContextEntry]) -> Result<String, PilotError> {
        Ok(serde_json::to_string(entries)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::WIDGET_ROOT_ID;
    use crate::page::memory::{ElementSpec, MemoryPage};

    async fn scan(page: &MemoryPage) -> Vec<ContextEntry> {
        ContextScraper::new(20).scan(page).await.unwrap()
    }

    #[tokio::test]
    async fn identified_button_keeps_its_test_id_and_twin_gets_a_path() {
        let page = MemoryPage::new();
        let toolbar = page.append(page.body(), ElementSpec::new("div"));
        let save = page.append(
            toolbar,
            ElementSpec::new("button")
                .attr("class", "btn")
                .attr("data-testid", "save-button")
                .text("Save"),
        );
        let cancel = page.append(
            toolbar,
            ElementSpec::new("button").attr("class", "btn").text("Cancel"),
        );

        let entries = scan(&page).await;
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].label, "Save");
        assert_eq!(entries[0].selector, r#"[data-testid="save-button"]"#);
        assert_eq!(page.query_all(&entries[0].selector), vec![save]);

        assert_eq!(entries[1].label, "Cancel");
        assert_eq!(
            entries[1].selector,
            "html:nth-of-type(1) > body:nth-of-type(1) > div:nth-of-type(1) > button:nth-of-type(2)"
        );
        assert_eq!(page.query_all(&entries[1].selector), vec![cancel]);
        assert_eq!(entries[1].element_type, "button");
        assert_eq!(entries[1].role, "button");
    }

    #[tokio::test]
    async fn collects_links_tabs_and_role_buttons() {
        let page = MemoryPage::new();
        let nav = page.append(page.body(), ElementSpec::new("nav"));
        page.append(
            nav,
            ElementSpec::new("a")
                .attr("href", "https://elsewhere.example")
                .attr("class", "is-active nav-item")
                .text("Docs"),
        );
        page.append(
            page.body(),
            ElementSpec::new("a").attr("href", "/settings").attr("id", "settings-link").text("Settings"),
        );
        page.append(
            page.body(),
            ElementSpec::new("a").attr("href", "https://external.example").text("External"),
        );
        page.append(page.body(), ElementSpec::new("div").attr("role", "tab").text("Billing"));
        page.append(
            page.body(),
            ElementSpec::new("span").attr("role", "button").attr("aria-label", "Close"),
        );
        page.append(page.body(), ElementSpec::new("p").text("Just text"));

        let entries = scan(&page).await;
        let pairs: Vec<(&str, &str)> = entries
            .iter()
            .map(|e| (e.label.as_str(), e.selector.as_str()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("Docs", "a.nav-item"),
                ("Settings", "#settings-link"),
                ("Billing", r#"div[role="tab"]"#),
                ("Close", r#"[aria-label="Close"]"#),
            ]
        );
        assert_eq!(entries[2].role, "tab");
        assert_eq!(entries[0].role, "link");
    }

    #[tokio::test]
    async fn padded_attribute_values_still_resolve() {
        let page = MemoryPage::new();
        let close = page.append(
            page.body(),
            ElementSpec::new("button").attr("aria-label", " Close "),
        );
        let tab = page.append(
            page.body(),
            ElementSpec::new("div").attr("role", "tab ").text("Billing"),
        );
        let saved = page.append(
            page.body(),
            ElementSpec::new("a").attr("href", "/saved").attr("id", "saved ").text("Saved"),
        );

        let entries = scan(&page).await;
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].label, "Close");
        assert_eq!(entries[1].role, "tab");
        for (entry, node) in entries.iter().zip([close, tab, saved]) {
            assert_eq!(page.query_all(&entry.selector), vec![node], "{}", entry.selector);
        }
    }

    #[tokio::test]
    async fn skips_hidden_unlabelled_and_widget_elements() {
        let page = MemoryPage::new();
        let widget = page.append(page.body(), ElementSpec::new("div").attr("id", WIDGET_ROOT_ID));
        page.append(widget, ElementSpec::new("button").text("Send"));
        page.append(page.body(), ElementSpec::new("button").text("Ghost").hidden());
        page.append(
            page.body(),
            ElementSpec::new("button").text("Flat").rect(0.0, 0.0, 0.0, 10.0),
        );
        page.append(page.body(), ElementSpec::new("button").attr("class", "icon"));
        page.append(
            page.body(),
            ElementSpec::new("button").attr("title", "Refresh"),
        );

        let entries = scan(&page).await;
        let labels: Vec<&str> = entries.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["Refresh"]);
    }

    #[tokio::test]
    async fn labels_are_truncated_and_the_list_is_capped() {
        let page = MemoryPage::new();
        let long = "x".repeat(80);
        page.append(page.body(), ElementSpec::new("button").text(&long));
        for i in 0..30 {
            page.append(
                page.body(),
                ElementSpec::new("button").attr("data-cy", &format!("b{i}")).text("Go"),
            );
        }

        let entries = ContextScraper::new(20).scan(&page).await.unwrap();
        assert_eq!(entries.len(), 20);
        assert_eq!(entries[0].label.chars().count(), LABEL_MAX_CHARS);
        assert_eq!(entries[1].selector, r#"[data-cy="b0"]"#);
    }

    #[test]
    fn dedupe_keeps_first_occurrence() {
        let entry = |label: &str, selector: &str, tag: &str| ContextEntry {
            label: label.into(),
            selector: selector.into(),
            element_type: tag.into(),
            role: String::new(),
        };
        let kept = dedupe(vec![
            entry("Home", "#home", "a"),
            entry("Home", "#home", "button"),
            entry("Home", "#home-2", "a"),
        ]);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].element_type, "a");
    }

    #[test]
    fn ui_context_is_a_json_list() {
        let json = ContextScraper::to_ui_context(&[]).unwrap();
        assert_eq!(json, "[]");
    }
}
