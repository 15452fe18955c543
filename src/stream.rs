//! Incremental assembly of the assistant's chunked response.

use crate::extract::{DirectiveExtractor, Effect};

/// UTF-8 decoder that carries an incomplete trailing sequence over to the next chunk.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes `chunk`; invalid sequences become U+FFFD, a truncated tail waits for more bytes.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);
        self.drain(false)
    }

    /// Flushes whatever is still buffered, replacing an unfinished sequence.
    pub fn finish(&mut self) -> String {
        self.drain(true)
    }

    fn drain(&mut self, last: bool) -> String {
        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;

        loop {
            match std::str::from_utf8(rest) {
                Ok(text) => {
                    out.push_str(text);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None if last => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &[];
                            break;
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        self.pending = rest.to_vec();
        out
    }
}

/// Result of feeding one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkUpdate {
    /// Current display projection, already trimmed.
    pub display: String,
    /// Effects of the blocks completed by this chunk, in buffer order.
    pub effects: Vec<Effect>,
}

/// Owns the raw buffer of one streamed response.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    decoder: Utf8Decoder,
    raw: String,
    display: String,
    extractor: DirectiveExtractor,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes and appends `bytes`, then runs one extraction pass.
    pub fn append_chunk(&mut self, bytes: &[u8]) -> ChunkUpdate {
        let text = self.decoder.decode(bytes);
        self.raw.push_str(&text);
        self.pass(false)
    }

    /// Ends the stream: flushes the decoder and runs a last pass.
    pub fn finish(&mut self) -> ChunkUpdate {
        let text = self.decoder.finish();
        self.raw.push_str(&text);
        self.pass(true)
    }

    pub fn raw_buffer(&self) -> &str {
        &self.raw
    }

    pub fn display_text(&self) -> &str {
        &self.display
    }

    pub fn extractor(&self) -> &DirectiveExtractor {
        &self.extractor
    }

    fn pass(&mut self, finished: bool) -> ChunkUpdate {
        let effects = self.extractor.extract(&mut self.raw);
        self.display = self.extractor.project(&self.raw, finished);
        ChunkUpdate {
            display: self.display.clone(),
            effects,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Directive;

    const RESPONSE: &str = concat!(
        "[Cached Answer]\nSure - I'll open the café settings. ",
        r##"[DOM_ACTION]{"type":"click","target":"[data-testid=\"settings\"]"}[/DOM_ACTION]"##,
        "Then I'll type your name ✓. ",
        r##"[DOM_ACTION]{"type":"type","target":"#name","value":"Zoë"}[/DOM_ACTION]"##,
        r#"[DOM_ACTION]{broken[/DOM_ACTION]"#,
        "All set.\n",
        r#"[SUGGESTIONS]["Save", "Cancel"][/SUGGESTIONS]"#,
    );

    const EXPECTED_DISPLAY: &str =
        "Sure - I'll open the café settings. Then I'll type your name ✓. All set.";

    fn expected_effects() -> Vec<Effect> {
        vec![
            Effect::Action(Directive::click("[data-testid=\"settings\"]")),
            Effect::Action(Directive::type_text("#name", "Zoë")),
            Effect::Suggestions(vec!["Save".into(), "Cancel".into()]),
        ]
    }

    fn feed(chunks: &[&[u8]]) -> (String, Vec<Effect>, Vec<String>) {
        let mut assembler = StreamAssembler::new();
        let mut effects = Vec::new();
        let mut displays = Vec::new();
        for chunk in chunks {
            let update = assembler.append_chunk(chunk);
            effects.extend(update.effects);
            displays.push(update.display);
        }
        let last = assembler.finish();
        effects.extend(last.effects);
        (last.display, effects, displays)
    }

    #[test]
    fn whole_response_in_one_chunk() {
        let (display, effects, _) = feed(&[RESPONSE.as_bytes()]);
        assert_eq!(display, EXPECTED_DISPLAY);
        assert_eq!(effects, expected_effects());
    }

    #[test]
    fn every_two_way_split_gives_the_same_result() {
        let bytes = RESPONSE.as_bytes();
        for at in 0..=bytes.len() {
            let (display, effects, _) = feed(&[&bytes[..at], &bytes[at..]]);
            assert_eq!(display, EXPECTED_DISPLAY, "split at byte {at}");
            assert_eq!(effects, expected_effects(), "split at byte {at}");
        }
    }

    #[test]
    fn every_fixed_chunk_size_gives_the_same_result() {
        let bytes = RESPONSE.as_bytes();
        for size in 1..=bytes.len() {
            let chunks: Vec<&[u8]> = bytes.chunks(size).collect();
            let (display, effects, displays) = feed(&chunks);
            assert_eq!(display, EXPECTED_DISPLAY, "chunk size {size}");
            assert_eq!(effects, expected_effects(), "chunk size {size}");
            for shown in displays {
                assert!(!shown.contains('\u{FFFD}'), "chunk size {size}: {shown:?}");
                assert!(!shown.contains("DOM_"), "chunk size {size}: {shown:?}");
                assert!(!shown.contains("[SUGG"), "chunk size {size}: {shown:?}");
                assert!(!shown.contains("Cached"), "chunk size {size}: {shown:?}");
                assert!(!shown.contains("\"type\""), "chunk size {size}: {shown:?}");
            }
        }
    }

    #[test]
    fn pending_block_never_leaks_into_display() {
        let mut assembler = StreamAssembler::new();
        let update = assembler.append_chunk(b"Opening it [DOM_ACTION]{\"type\":\"cli");
        assert_eq!(update.display, "Opening it");
        assert!(update.effects.is_empty());
        assert!(assembler.raw_buffer().contains("[DOM_ACTION]"));

        let update = assembler.append_chunk(b"ck\",\"target\":\"#go\"}[/DOM_ACTION] now.");
        assert_eq!(update.display, "Opening it  now.");
        assert_eq!(update.effects, vec![Effect::Action(Directive::click("#go"))]);
        assert_eq!(assembler.raw_buffer(), "Opening it  now.");
    }

    #[test]
    fn cache_marker_at_stream_start_leaves_no_artifact() {
        let (display, _, displays) =
            feed(&[b"[Cach", b"ed Answer]", b"\n", b"Four records."]);
        assert_eq!(display, "Four records.");
        assert!(displays.iter().all(|d| d.is_empty() || d == "Four records."));
    }

    #[test]
    fn decoder_keeps_split_multibyte_sequences() {
        let mut decoder = Utf8Decoder::new();
        let bytes = "é✓".as_bytes();
        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert_eq!(decoder.decode(&bytes[1..3]), "é");
        assert_eq!(decoder.decode(&bytes[3..]), "✓");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::new();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
        assert_eq!(decoder.decode(&[0xE2, 0x9C]), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }
}
