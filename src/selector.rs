//! A small CSS selector model.
//!
//! Covers what the context scraper emits and what agents usually send back: type, id, class,
//! attribute (`[a]`, `[a="v"]`, `[a^="v"]`) and `:nth-of-type(n)` compounds joined by
//! descendant or child combinators.

use std::fmt;

/// Read access to an element tree whose nodes are numbered in document order.
pub trait ElementTree {
    fn node_count(&self) -> usize;
    fn tag(&self, node: usize) -> &str;
    fn attr(&self, node: usize, name: &str) -> Option<&str>;
    fn parent(&self, node: usize) -> Option<usize>;
    /// 1-based position among siblings with the same tag.
    fn nth_of_type(&self, node: usize) -> usize;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrOp {
    Exists,
    Equals(String),
    Prefix(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrMatch {
    pub name: String,
    pub op: AttrOp,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    pub tag: Option<String>,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<AttrMatch>,
    pub nth_of_type: Option<usize>,
}

impl Compound {
    pub fn tag(tag: &str) -> Self {
        Self {
            tag: Some(tag.to_ascii_lowercase()),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.push(AttrMatch {
            name: name.to_ascii_lowercase(),
            op: AttrOp::Equals(value.to_string()),
        });
        self
    }

    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.id.is_none()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && self.nth_of_type.is_none()
    }

    fn matches<T: ElementTree + ?Sized>(&self, tree: &T, node: usize) -> bool {
        if let Some(tag) = &self.tag {
            if !tree.tag(node).eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if tree.attr(node, "id") != Some(id.as_str()) {
                return false;
            }
        }
        if !self.classes.is_empty() {
            let class_attr = tree.attr(node, "class").unwrap_or("");
            let has_all = self
                .classes
                .iter()
                .all(|wanted| class_attr.split_whitespace().any(|c| c == wanted));
            if !has_all {
                return false;
            }
        }
        for attr in &self.attrs {
            let actual = tree.attr(node, &attr.name);
            let ok = match (&attr.op, actual) {
                (_, None) => false,
                (AttrOp::Exists, Some(_)) => true,
                (AttrOp::Equals(v), Some(a)) => a == v,
                (AttrOp::Prefix(v), Some(a)) => !v.is_empty() && a.starts_with(v.as_str()),
            };
            if !ok {
                return false;
            }
        }
        match self.nth_of_type {
            Some(n) => tree.nth_of_type(node) == n,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    compounds: Vec<Compound>,
    /// `combinators[i]` joins `compounds[i]` and `compounds[i + 1]`.
    combinators: Vec<Combinator>,
}

impl From<Compound> for Selector {
    fn from(compound: Compound) -> Self {
        Self {
            compounds: vec![compound],
            combinators: Vec::new(),
        }
    }
}

impl Selector {
    /// `tag[name="value"]`, or `[name="value"]` without a tag.
    pub fn attr(tag: Option<&str>, name: &str, value: &str) -> Self {
        let compound = match tag {
            Some(tag) => Compound::tag(tag),
            None => Compound::default(),
        };
        compound.with_attr(name, value).into()
    }

    pub fn id(id: &str) -> Self {
        Compound {
            id: Some(id.to_string()),
            ..Compound::default()
        }
        .into()
    }

    pub fn class(tag: &str, class: &str) -> Self {
        Compound {
            classes: vec![class.to_string()],
            ..Compound::tag(tag)
        }
        .into()
    }

    pub fn tag(tag: &str) -> Self {
        Compound::tag(tag).into()
    }

    /// Child-combinator chain of `tag:nth-of-type(n)` steps, root first.
    pub fn nth_path<'a>(steps: impl IntoIterator<Item = (&'a str, usize)>) -> Self {
        let compounds: Vec<Compound> = steps
            .into_iter()
            .map(|(tag, n)| Compound {
                nth_of_type: Some(n),
                ..Compound::tag(tag)
            })
            .collect();
        let combinators = vec![Combinator::Child; compounds.len().saturating_sub(1)];
        Self {
            compounds,
            combinators,
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        Parser::new(input).selector()
    }

    pub fn matches<T: ElementTree + ?Sized>(&self, tree: &T, node: usize) -> bool {
        match self.compounds.len().checked_sub(1) {
            Some(last) => self.match_from(tree, last, node),
            None => false,
        }
    }

    fn match_from<T: ElementTree + ?Sized>(&self, tree: &T, index: usize, node: usize) -> bool {
        if !self.compounds[index].matches(tree, node) {
            return false;
        }
        if index == 0 {
            return true;
        }
        match self.combinators[index - 1] {
            Combinator::Child => tree
                .parent(node)
                .is_some_and(|parent| self.match_from(tree, index - 1, parent)),
            Combinator::Descendant => {
                let mut current = tree.parent(node);
                while let Some(ancestor) = current {
                    if self.match_from(tree, index - 1, ancestor) {
                        return true;
                    }
                    current = tree.parent(ancestor);
                }
                false
            }
        }
    }

    pub fn query_all<T: ElementTree + ?Sized>(&self, tree: &T) -> Vec<usize> {
        (0..tree.node_count())
            .filter(|&node| self.matches(tree, node))
            .collect()
    }

    pub fn count<T: ElementTree + ?Sized>(&self, tree: &T) -> usize {
        (0..tree.node_count())
            .filter(|&node| self.matches(tree, node))
            .count()
    }
}

/// Whether `s` can be written bare as a CSS identifier.
pub fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        None => false,
        Some(first) if first.is_ascii_digit() => false,
        Some('-') => {
            let rest = chars.as_str();
            !rest.is_empty()
                && !rest.starts_with(|c: char| c.is_ascii_digit())
                && rest.chars().all(is_ident_char)
        }
        Some(first) => is_ident_char(first) && chars.all(is_ident_char),
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

fn write_quoted(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in value.chars() {
        match c {
            '"' | '\\' => write!(f, "\\{c}")?,
            // Raw newlines and other control characters end a CSS string early.
            c if c.is_control() => write!(f, "\\{:x} ", u32::from(c))?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("\"")
}

impl fmt::Display for Compound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(tag) = &self.tag {
            f.write_str(tag)?;
        }
        if let Some(id) = &self.id {
            if is_ident(id) {
                write!(f, "#{id}")?;
            } else {
                f.write_str("[id=")?;
                write_quoted(f, id)?;
                f.write_str("]")?;
            }
        }
        for class in &self.classes {
            write!(f, ".{class}")?;
        }
        for attr in &self.attrs {
            write!(f, "[{}", attr.name)?;
            match &attr.op {
                AttrOp::Exists => {}
                AttrOp::Equals(v) => {
                    f.write_str("=")?;
                    write_quoted(f, v)?;
                }
                AttrOp::Prefix(v) => {
                    f.write_str("^=")?;
                    write_quoted(f, v)?;
                }
            }
            f.write_str("]")?;
        }
        if let Some(n) = self.nth_of_type {
            write!(f, ":nth-of-type({n})")?;
        }
        if self.is_empty() {
            f.write_str("*")?;
        }
        Ok(())
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, compound) in self.compounds.iter().enumerate() {
            if i > 0 {
                match self.combinators[i - 1] {
                    Combinator::Child => f.write_str(" > ")?,
                    Combinator::Descendant => f.write_str(" ")?,
                }
            }
            write!(f, "{compound}")?;
        }
        Ok(())
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn eat(&mut self, expected: char) -> Option<()> {
        (self.bump()? == expected).then_some(())
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
        self.pos > start
    }

    fn ident(&mut self) -> Option<String> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.bump();
        }
        (self.pos > start).then(|| self.input[start..self.pos].to_string())
    }

    fn string(&mut self) -> Option<String> {
        let quote = self.bump()?;
        let mut out = String::new();
        loop {
            match self.bump()? {
                '\\' => out.push(self.escape()?),
                c if c == quote => return Some(out),
                c => out.push(c),
            }
        }
    }

    /// Body of a backslash escape: up to six hex digits plus one optional space, or a
    /// literal character.
    fn escape(&mut self) -> Option<char> {
        let start = self.pos;
        while self.pos - start < 6 && self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
            self.bump();
        }
        if self.pos == start {
            return self.bump();
        }
        let code = u32::from_str_radix(&self.input[start..self.pos], 16).ok()?;
        if self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
        Some(char::from_u32(code).filter(|&c| c != '\0').unwrap_or('\u{FFFD}'))
    }

    fn number(&mut self) -> Option<usize> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        self.input[start..self.pos].parse().ok()
    }

    fn selector(&mut self) -> Option<Selector> {
        let mut compounds = Vec::new();
        let mut combinators = Vec::new();

        self.skip_ws();
        loop {
            compounds.push(self.compound()?);
            let spaced = self.skip_ws();
            match self.peek() {
                None => break,
                Some('>') => {
                    self.bump();
                    self.skip_ws();
                    combinators.push(Combinator::Child);
                }
                Some(_) if spaced => combinators.push(Combinator::Descendant),
                Some(_) => return None,
            }
        }

        Some(Selector {
            compounds,
            combinators,
        })
    }

    fn compound(&mut self) -> Option<Compound> {
        let mut compound = Compound::default();
        let mut universal = false;

        match self.peek()? {
            '*' => {
                self.bump();
                universal = true;
            }
            c if is_ident_char(c) => compound.tag = Some(self.ident()?.to_ascii_lowercase()),
            _ => {}
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.bump();
                    compound.id = Some(self.ident()?);
                }
                Some('.') => {
                    self.bump();
                    compound.classes.push(self.ident()?);
                }
                Some('[') => {
                    self.bump();
                    compound.attrs.push(self.attribute()?);
                }
                Some(':') => {
                    self.bump();
                    if self.ident()? != "nth-of-type" {
                        return None;
                    }
                    self.eat('(')?;
                    self.skip_ws();
                    compound.nth_of_type = Some(self.number()?);
                    self.skip_ws();
                    self.eat(')')?;
                }
                _ => break,
            }
        }

        (universal || !compound.is_empty()).then_some(compound)
    }

    fn attribute(&mut self) -> Option<AttrMatch> {
        self.skip_ws();
        let name = self.ident()?.to_ascii_lowercase();
        self.skip_ws();
        let op = match self.bump()? {
            ']' => return Some(AttrMatch { name, op: AttrOp::Exists }),
            '=' => AttrOp::Equals(self.attr_value()?),
            '^' => {
                self.eat('=')?;
                AttrOp::Prefix(self.attr_value()?)
            }
            _ => return None,
        };
        self.skip_ws();
        self.eat(']')?;
        Some(AttrMatch { name, op })
    }

    fn attr_value(&mut self) -> Option<String> {
        self.skip_ws();
        match self.peek()? {
            '"' | '\'' => self.string(),
            _ => self.ident(),
        }
    }
}
