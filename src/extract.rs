//! Directive extraction from the raw stream buffer.
//!
//! The agent embeds `[DOM_ACTION]{...}[/DOM_ACTION]` and `[SUGGESTIONS][...][/SUGGESTIONS]`
//! blocks in its prose. Every complete block is cut out of the buffer and turned into an
//! [`Effect`]; whatever is still waiting for its closing tag is hidden from the display
//! projection but kept in the buffer.

use log::{debug, warn};

use crate::types::Directive;

/// Prefix the back-end puts in front of answers served from its response cache.
pub const CACHE_MARKER: &str = "[Cached Answer]";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    DomAction,
    Suggestions,
}

impl TagKind {
    /// Extraction order. Within one kind, blocks are applied left to right.
    pub const ALL: [TagKind; 2] = [TagKind::DomAction, TagKind::Suggestions];

    pub fn open(self) -> &'static str {
        match self {
            TagKind::DomAction => "[DOM_ACTION]",
            TagKind::Suggestions => "[SUGGESTIONS]",
        }
    }

    pub fn close(self) -> &'static str {
        match self {
            TagKind::DomAction => "[/DOM_ACTION]",
            TagKind::Suggestions => "[/SUGGESTIONS]",
        }
    }

    fn parse(self, payload: &str) -> Result<Effect, serde_json::Error> {
        let payload = payload.trim();
        match self {
            TagKind::DomAction => serde_json::from_str::<Directive>(payload).map(Effect::Action),
            TagKind::Suggestions => {
                serde_json::from_str::<Vec<String>>(payload).map(Effect::Suggestions)
            }
        }
    }
}

/// What a parsed block asks the session to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Action(Directive),
    Suggestions(Vec<String>),
}

/// Location of one complete `[KIND]payload[/KIND]` block.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Block {
    start: usize,
    payload_start: usize,
    payload_end: usize,
    end: usize,
}

/// First complete block of `kind`, shortest match.
///
/// Only the first opening tag needs checking: if no closing tag follows it, none follows any
/// later opening tag either.
fn find_block(buffer: &str, kind: TagKind) -> Option<Block> {
    let start = buffer.find(kind.open())?;
    let payload_start = start + kind.open().len();
    let payload_end = payload_start + buffer[payload_start..].find(kind.close())?;
    Some(Block {
        start,
        payload_start,
        payload_end,
        end: payload_end + kind.close().len(),
    })
}

/// Start of a trailing fragment that could still grow into a tag or the cache marker.
fn partial_tag_start(text: &str) -> Option<usize> {
    let idx = text.rfind('[')?;
    let tail = &text[idx..];
    TagKind::ALL
        .iter()
        .map(|kind| kind.open())
        .chain(std::iter::once(CACHE_MARKER))
        .any(|token| token.len() > tail.len() && token.starts_with(tail))
        .then_some(idx)
}

#[derive(Debug, Default)]
pub struct DirectiveExtractor {
    extracted: usize,
    rejected: usize,
}

impl DirectiveExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks that parsed and produced an effect so far.
    pub fn extracted(&self) -> usize {
        self.extracted
    }

    /// Blocks that were removed but whose payload did not parse.
    pub fn rejected(&self) -> usize {
        self.rejected
    }

    /// Removes every complete block from `buffer` and returns the parsed effects.
    ///
    /// A matched span is removed whether or not its payload parses. The number of
    /// iterations per kind is bounded by the closing tags present when the pass starts.
    pub fn extract(&mut self, buffer: &mut String) -> Vec<Effect> {
        let mut effects = Vec::new();

        for kind in TagKind::ALL {
            let budget = buffer.matches(kind.close()).count();
            for _ in 0..budget {
                let Some(block) = find_block(buffer, kind) else {
                    break;
                };
                let parsed = kind.parse(&buffer[block.payload_start..block.payload_end]);
                match parsed {
                    Ok(effect) => {
                        debug!("Extracted {:?} block: {:?}", kind, effect);
                        self.extracted += 1;
                        effects.push(effect);
                    }
                    Err(e) => {
                        warn!(
                            "Discarding malformed {:?} payload {:?}: {}",
                            kind,
                            &buffer[block.payload_start..block.payload_end],
                            e
                        );
                        self.rejected += 1;
                    }
                }
                buffer.replace_range(block.start..block.end, "");
            }
        }

        effects
    }

    /// User-visible text for an already-extracted buffer.
    ///
    /// While the stream is live, a trailing fragment that may still become a tag is hidden
    /// too; once `finished`, only genuinely unterminated blocks are cut.
    pub fn project(&self, buffer: &str, finished: bool) -> String {
        let mut text = buffer.replace(CACHE_MARKER, "");

        for kind in TagKind::ALL {
            if let Some(start) = text.find(kind.open()) {
                text.truncate(start);
            }
        }

        if !finished {
            if let Some(start) = partial_tag_start(&text) {
                text.truncate(start);
            }
        }

        text.trim().to_string()
    }
}
