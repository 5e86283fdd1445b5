//! Selector expressions: parsing and matching against a [`Document`].
//!
//! The grammar is the CSS subset storefront tests actually use, plus the two
//! Playwright extensions that make text-anchored scoping possible:
//! `:has-text("...")` and `text=`. Segments joined by `>>` resolve each inside
//! the matches of the previous one.

use std::collections::HashMap;
use std::fmt;

use crate::dom::{normalize_whitespace, Document, Element, NodeId};
use crate::result::{EnsayoError, EnsayoResult};

/// Attribute comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOp {
    /// `[a]`
    Exists,
    /// `[a=v]`
    Equals,
    /// `[a~=v]` whitespace-separated word
    Includes,
    /// `[a^=v]`
    Prefix,
    /// `[a$=v]`
    Suffix,
    /// `[a*=v]`
    Substring,
}

/// One attribute test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSelector {
    /// Attribute name
    pub name: String,
    /// Operator
    pub op: AttrOp,
    /// Operand (empty for `Exists`)
    pub value: String,
}

impl AttrSelector {
    fn matches(&self, el: &Element) -> bool {
        let Some(actual) = el.attr(&self.name) else {
            return false;
        };
        match self.op {
            AttrOp::Exists => true,
            AttrOp::Equals => actual == self.value,
            AttrOp::Includes => actual.split_whitespace().any(|w| w == self.value),
            AttrOp::Prefix => !self.value.is_empty() && actual.starts_with(&self.value),
            AttrOp::Suffix => !self.value.is_empty() && actual.ends_with(&self.value),
            AttrOp::Substring => !self.value.is_empty() && actual.contains(&self.value),
        }
    }
}

/// Tests applying to a single element
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    /// Lower-case tag; `None` for universal
    pub tag: Option<String>,
    /// `#id` parts
    pub ids: Vec<String>,
    /// `.class` parts
    pub classes: Vec<String>,
    /// `[attr]` parts
    pub attributes: Vec<AttrSelector>,
    /// `:has-text()` needles, already normalised and lower-cased
    pub has_text: Vec<String>,
    /// `:visible`
    pub visible: bool,
}

impl Compound {
    fn matches(&self, doc: &Document, node: NodeId, exclude: Option<NodeId>) -> bool {
        let Some(el) = doc.element(node) else {
            return false;
        };
        if self.tag.as_deref().is_some_and(|t| t != el.tag) {
            return false;
        }
        if !self.ids.iter().all(|id| el.id() == Some(id.as_str())) {
            return false;
        }
        if !self.classes.iter().all(|c| el.has_class(c)) {
            return false;
        }
        if !self.attributes.iter().all(|a| a.matches(el)) {
            return false;
        }
        if !self.has_text.is_empty() {
            let text = doc.normalized_text_excluding(node, exclude).to_lowercase();
            if !self.has_text.iter().all(|needle| text.contains(needle.as_str())) {
                return false;
            }
        }
        !self.visible || doc.is_visible(node)
    }

    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && self.ids.is_empty()
            && self.classes.is_empty()
            && self.attributes.is_empty()
            && self.has_text.is_empty()
            && !self.visible
    }
}

/// Where a match is evaluated: ancestors stay inside `boundary`, and the
/// subtree of `exclude` contributes no text
#[derive(Debug, Clone, Copy)]
struct Scope {
    boundary: NodeId,
    exclude: Option<NodeId>,
}

/// Relationship between adjacent compounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Whitespace
    Descendant,
    /// `>`
    Child,
}

/// Compounds joined by combinators; the last compound is the subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Complex {
    /// Left-most compound
    pub head: Compound,
    /// Following compounds with the combinator preceding each
    pub tail: Vec<(Combinator, Compound)>,
}

impl Complex {
    fn subject(&self) -> &Compound {
        self.tail.last().map_or(&self.head, |(_, c)| c)
    }

    /// Match with ancestors confined to the inclusive subtree of `boundary`
    fn matches(&self, doc: &Document, node: NodeId, scope: Scope) -> bool {
        if !self.subject().matches(doc, node, scope.exclude) {
            return false;
        }
        let combinators: Vec<Combinator> = self.tail.iter().map(|(c, _)| *c).collect();
        let mut compounds: Vec<&Compound> = std::iter::once(&self.head)
            .chain(self.tail.iter().map(|(_, c)| c))
            .collect();
        compounds.pop();
        match_left(doc, node, &compounds, &combinators, scope)
    }
}

fn match_left(
    doc: &Document,
    node: NodeId,
    compounds: &[&Compound],
    combinators: &[Combinator],
    scope: Scope,
) -> bool {
    let Some((last, rest)) = compounds.split_last() else {
        return true;
    };
    let Some((comb, rest_comb)) = combinators.split_last() else {
        return true;
    };
    let in_bounds = |n: NodeId| doc.is_inclusive_ancestor(scope.boundary, n);
    match comb {
        Combinator::Child => doc
            .ancestors(node)
            .next()
            .filter(|p| in_bounds(*p) && last.matches(doc, *p, scope.exclude))
            .is_some_and(|p| match_left(doc, p, rest, rest_comb, scope)),
        Combinator::Descendant => doc
            .ancestors(node)
            .take_while(|a| in_bounds(*a))
            .filter(|a| last.matches(doc, *a, scope.exclude))
            .any(|a| match_left(doc, a, rest, rest_comb, scope)),
    }
}

/// `text=` engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextMatch {
    /// Unquoted: case-insensitive substring, stored lower-cased
    Contains(String),
    /// Quoted: case-sensitive exact match on normalised text
    Exact(String),
}

impl TextMatch {
    fn matches_text(&self, text: &str) -> bool {
        match self {
            Self::Contains(needle) => text.to_lowercase().contains(needle.as_str()),
            Self::Exact(expected) => text == expected,
        }
    }

    /// Innermost elements whose text satisfies the match
    fn matches(&self, doc: &Document, node: NodeId, exclude: Option<NodeId>) -> bool {
        let Some(el) = doc.element(node) else {
            return false;
        };
        if matches!(el.tag.as_str(), "script" | "style" | "head") {
            return false;
        }
        if !self.matches_text(&doc.normalized_text_excluding(node, exclude)) {
            return false;
        }
        !doc
            .element_children(node)
            .filter(|child| exclude != Some(*child))
            .any(|child| self.matches_text(&doc.normalized_text_excluding(child, exclude)))
    }
}

/// One `>>`-separated segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Comma-separated CSS selector list
    Css(Vec<Complex>),
    /// `text=` selector
    Text(TextMatch),
}

impl Segment {
    fn matches(&self, doc: &Document, node: NodeId, scope: Scope) -> bool {
        match self {
            Self::Css(list) => list.iter().any(|c| c.matches(doc, node, scope)),
            Self::Text(t) => t.matches(doc, node, scope.exclude),
        }
    }
}

/// Parsed selector expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    segments: Vec<Segment>,
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl std::str::FromStr for Selector {
    type Err = EnsayoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Selector {
    /// Parse a selector expression
    pub fn parse(source: &str) -> EnsayoResult<Self> {
        let mut segments = Vec::new();
        for (offset, part) in split_chain(source) {
            let trimmed_start = part.len() - part.trim_start().len();
            let part_offset = offset + trimmed_start;
            let part = part.trim();
            if part.is_empty() {
                return Err(invalid(source, part_offset, "empty selector segment"));
            }
            let segment = if let Some(rest) = part.strip_prefix("text=") {
                Segment::Text(parse_text_engine(source, part_offset + 5, rest)?)
            } else {
                let mut parser = Parser {
                    source,
                    input: part,
                    base: part_offset,
                    pos: 0,
                };
                Segment::Css(parser.parse_list()?)
            };
            segments.push(segment);
        }
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// Source text
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parsed segments
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// All matches that are strict descendants of any of `roots`, in document
    /// order, skipping the subtree of `exclude` both as candidates and as text
    #[must_use]
    pub fn query(
        &self,
        doc: &Document,
        roots: &[NodeId],
        exclude: Option<NodeId>,
    ) -> Vec<NodeId> {
        let mut current: Vec<NodeId> = roots.to_vec();
        for segment in &self.segments {
            let mut found = Vec::new();
            for root in &current {
                for node in doc.descendants(*root) {
                    if exclude.is_some_and(|ex| doc.is_inclusive_ancestor(ex, node)) {
                        continue;
                    }
                    let scope = Scope {
                        boundary: *root,
                        exclude,
                    };
                    if segment.matches(doc, node, scope) {
                        found.push(node);
                    }
                }
            }
            current = in_document_order(doc, found);
            if current.is_empty() {
                break;
            }
        }
        current
    }
}

/// Dedupe and sort by pre-order position
fn in_document_order(doc: &Document, mut nodes: Vec<NodeId>) -> Vec<NodeId> {
    if nodes.len() < 2 {
        return nodes;
    }
    let order: HashMap<NodeId, usize> = doc
        .descendants(doc.root())
        .into_iter()
        .enumerate()
        .map(|(i, n)| (n, i))
        .collect();
    nodes.sort_by_key(|n| order.get(n).copied().unwrap_or(usize::MAX));
    nodes.dedup();
    nodes
}

fn invalid(source: &str, offset: usize, message: &str) -> EnsayoError {
    EnsayoError::InvalidSelector {
        selector: source.to_string(),
        offset,
        message: message.to_string(),
    }
}

/// Split on `>>` outside quotes, brackets, and parentheses
fn split_chain(source: &str) -> Vec<(usize, &str)> {
    let bytes = source.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'[' | b'(' => depth += 1,
                b']' | b')' => depth = depth.saturating_sub(1),
                b'>' if depth == 0 && bytes.get(i + 1) == Some(&b'>') => {
                    parts.push((start, &source[start..i]));
                    i += 2;
                    start = i;
                    continue;
                }
                _ => {}
            },
        }
        i += 1;
    }
    parts.push((start, &source[start..]));
    parts
}

fn parse_text_engine(source: &str, offset: usize, body: &str) -> EnsayoResult<TextMatch> {
    let body = body.trim();
    if body.is_empty() {
        return Err(invalid(source, offset, "text= needs a value"));
    }
    for q in ['"', '\''] {
        if let Some(inner) = body.strip_prefix(q) {
            let inner = inner
                .strip_suffix(q)
                .ok_or_else(|| invalid(source, offset, "unterminated quoted text"))?;
            return Ok(TextMatch::Exact(normalize_whitespace(inner)));
        }
    }
    Ok(TextMatch::Contains(normalize_whitespace(body).to_lowercase()))
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

struct Parser<'a> {
    source: &'a str,
    input: &'a str,
    base: usize,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn error(&self, message: &str) -> EnsayoError {
        invalid(self.source, self.base + self.pos, message)
    }

    fn skip_ws(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
        self.pos > start
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn ident(&mut self) -> EnsayoResult<String> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.bump();
        }
        if self.pos == start {
            return Err(self.error("expected identifier"));
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn quoted(&mut self, quote: char) -> EnsayoResult<String> {
        let start = self.pos;
        while let Some(c) = self.bump() {
            if c == quote {
                return Ok(self.input[start..self.pos - c.len_utf8()].to_string());
            }
        }
        Err(self.error("unterminated string"))
    }

    fn parse_list(&mut self) -> EnsayoResult<Vec<Complex>> {
        let mut list = Vec::new();
        loop {
            self.skip_ws();
            list.push(self.parse_complex()?);
            self.skip_ws();
            if self.eat(',') {
                continue;
            }
            if self.peek().is_none() {
                return Ok(list);
            }
            return Err(self.error("unexpected character"));
        }
    }

    fn parse_complex(&mut self) -> EnsayoResult<Complex> {
        let head = self.parse_compound()?;
        let mut tail = Vec::new();
        loop {
            let had_ws = self.skip_ws();
            let combinator = if self.eat('>') {
                self.skip_ws();
                Combinator::Child
            } else if had_ws && !matches!(self.peek(), None | Some(',')) {
                Combinator::Descendant
            } else {
                break;
            };
            tail.push((combinator, self.parse_compound()?));
        }
        Ok(Complex { head, tail })
    }

    fn parse_compound(&mut self) -> EnsayoResult<Compound> {
        let mut compound = Compound::default();
        let universal = self.eat('*');
        if !universal && self.peek().is_some_and(is_ident_char) {
            compound.tag = Some(self.ident()?.to_ascii_lowercase());
        }
        loop {
            match self.peek() {
                Some('#') => {
                    self.bump();
                    compound.ids.push(self.ident()?);
                }
                Some('.') => {
                    self.bump();
                    compound.classes.push(self.ident()?);
                }
                Some('[') => {
                    self.bump();
                    compound.attributes.push(self.parse_attr()?);
                }
                Some(':') => {
                    self.bump();
                    self.parse_pseudo(&mut compound)?;
                }
                _ => break,
            }
        }
        if compound.is_empty() && !universal {
            return Err(self.error("expected selector"));
        }
        Ok(compound)
    }

    fn parse_attr(&mut self) -> EnsayoResult<AttrSelector> {
        self.skip_ws();
        let name = self.ident()?;
        self.skip_ws();
        let op = match self.peek() {
            Some(']') => {
                self.bump();
                return Ok(AttrSelector {
                    name,
                    op: AttrOp::Exists,
                    value: String::new(),
                });
            }
            Some('=') => AttrOp::Equals,
            Some('~') => AttrOp::Includes,
            Some('^') => AttrOp::Prefix,
            Some('$') => AttrOp::Suffix,
            Some('*') => AttrOp::Substring,
            _ => return Err(self.error("expected attribute operator")),
        };
        self.bump();
        if op != AttrOp::Equals && !self.eat('=') {
            return Err(self.error("expected `=`"));
        }
        self.skip_ws();
        let value = match self.peek() {
            Some(q @ ('"' | '\'')) => {
                self.bump();
                self.quoted(q)?
            }
            _ => self.ident()?,
        };
        self.skip_ws();
        if !self.eat(']') {
            return Err(self.error("expected `]`"));
        }
        Ok(AttrSelector { name, op, value })
    }

    fn parse_pseudo(&mut self, compound: &mut Compound) -> EnsayoResult<()> {
        let start = self.pos;
        let name = self.ident()?;
        match name.as_str() {
            "visible" => {
                compound.visible = true;
                Ok(())
            }
            "has-text" => {
                if !self.eat('(') {
                    return Err(self.error("expected `(`"));
                }
                self.skip_ws();
                let text = match self.peek() {
                    Some(q @ ('"' | '\'')) => {
                        self.bump();
                        self.quoted(q)?
                    }
                    _ => {
                        let begin = self.pos;
                        while self.peek().is_some_and(|c| c != ')') {
                            self.bump();
                        }
                        self.input[begin..self.pos].to_string()
                    }
                };
                self.skip_ws();
                if !self.eat(')') {
                    return Err(self.error("expected `)`"));
                }
                compound
                    .has_text
                    .push(normalize_whitespace(&text).to_lowercase());
                Ok(())
            }
            _ => {
                self.pos = start;
                Err(self.error(&format!("unsupported pseudo-class `:{name}`")))
            }
        }
    }
}
