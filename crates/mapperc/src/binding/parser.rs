use std::sync::OnceLock;

use regex::Regex;

use super::{BindingKey, BindingKind, LikeKind, ParameterBinding, ParsedQuery, Piece, SYNTHETIC_PREFIX};
use crate::error::{CompileError, CompileResult};

/// Mapper tags recognized (and skipped) inside query text.
const TAGS: &[&str] = &[
    "if", "choose", "when", "otherwise", "foreach", "trim", "where", "set", "bind", "include",
];

fn like_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bI?LIKE\s*$").expect("invalid built-in LIKE regex"))
}

fn in_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bIN\s*(\()?\s*$").expect("invalid built-in IN regex"))
}

fn order_by_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bORDER\s+BY\b").expect("invalid built-in ORDER BY regex"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Style {
    Indexed,
    Named,
}

#[derive(Debug)]
enum PendingKey {
    Named(String),
    Position(usize),
    Expression,
}

#[derive(Debug)]
struct Pending {
    key: PendingKey,
    expression: Option<String>,
    kind: BindingKind,
}

/// Parse a declared query string.
///
/// Single-quoted and double-quoted text, `::` casts, already compiled `#{...}` / `${...}`
/// markers, mapper tags and comments are copied through untouched. An anonymous `?` is text.
pub fn parse(raw: &str) -> CompileResult<ParsedQuery> {
    Scanner::new(raw).run()
}

/// Whether `raw` sorts its outermost select: an ORDER BY outside parentheses and quoted text.
pub fn orders_at_top_level(raw: &str) -> bool {
    let mut masked = String::with_capacity(raw.len());
    let mut depth = 0usize;
    let mut quote = None;
    for c in raw.chars() {
        let keep = match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                false
            }
            (Some(_), _) => false,
            (None, '\'' | '"') => {
                quote = Some(c);
                false
            }
            (None, '(') => {
                depth += 1;
                false
            }
            (None, ')') => {
                depth = depth.saturating_sub(1);
                false
            }
            (None, _) => depth == 0,
        };
        masked.push(if keep { c } else { ' ' });
    }
    order_by_keyword().is_match(&masked)
}

/// Whether `text` contains a mapper tag or comment.
pub(crate) fn contains_markup(text: &str) -> bool {
    let bytes = text.as_bytes();
    (0..bytes.len()).any(|i| bytes[i] == b'<' && tag_len(text, i).is_some())
}

/// Escape every `<` that opens no mapper tag or comment.
pub(crate) fn escape_stray_lt(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pos = 0;
    while let Some(offset) = text[pos..].find('<') {
        let at = pos + offset;
        out.push_str(&text[pos..at]);
        match tag_len(text, at) {
            Some(len) => {
                out.push_str(&text[at..at + len]);
                pos = at + len;
            }
            None => {
                out.push_str("&lt;");
                pos = at + 1;
            }
        }
    }
    out.push_str(&text[pos..]);
    out
}

/// Length of the mapper tag or comment starting at `start`, if there is one.
fn tag_len(src: &str, start: usize) -> Option<usize> {
    let rest = &src[start..];
    if let Some(comment) = rest.strip_prefix("<!--") {
        let end = comment.find("-->").map(|i| i + 3).unwrap_or(comment.len());
        return Some(4 + end);
    }
    let name_start = if rest.starts_with("</") { 2 } else { 1 };
    let name: String = rest[name_start..]
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    if !TAGS.contains(&name.as_str()) {
        return None;
    }
    let after = rest.as_bytes().get(name_start + name.len()).copied();
    if !matches!(after, Some(b'>' | b'/' | b' ' | b'\t' | b'\n' | b'\r')) {
        return None;
    }
    let mut quoted = false;
    for (i, b) in rest.bytes().enumerate().skip(name_start + name.len()) {
        match b {
            b'"' => quoted = !quoted,
            b'>' if !quoted => return Some(i + 1),
            _ => {}
        }
    }
    Some(rest.len())
}

struct Scanner<'a> {
    src: &'a str,
    pos: usize,
    text: String,
    pieces: Vec<Piece>,
    pending: Vec<Pending>,
    style: Option<Style>,
    max_index: usize,
}

impl<'a> Scanner<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            text: String::new(),
            pieces: Vec::new(),
            pending: Vec::new(),
            style: None,
            max_index: 0,
        }
    }

    fn byte(&self, at: usize) -> Option<u8> {
        self.src.as_bytes().get(at).copied()
    }

    fn run(mut self) -> CompileResult<ParsedQuery> {
        while let Some(b) = self.byte(self.pos) {
            match b {
                b'\'' | b'"' => self.copy_quoted(b),
                b'#' | b'$' if self.byte(self.pos + 1) == Some(b'{') => {
                    let end = self.braced_end(self.pos + 1);
                    self.copy_to(end);
                }
                b'<' => match tag_len(self.src, self.pos) {
                    Some(len) => self.copy_to(self.pos + len),
                    None => self.copy_to(self.pos + 1),
                },
                b':' if self.byte(self.pos + 1) == Some(b':') => self.copy_to(self.pos + 2),
                b'%' if self.placeholder_at(self.pos + 1) && like_suffix().is_match(&self.text) => {
                    self.pos += 1;
                    self.placeholder(true)?;
                }
                b':' | b'?' if self.placeholder_at(self.pos) => self.placeholder(false)?,
                _ => {
                    let len = self.src[self.pos..].chars().next().map_or(1, char::len_utf8);
                    self.copy_to(self.pos + len);
                }
            }
        }
        self.finish()
    }

    fn copy_to(&mut self, end: usize) {
        let end = end.min(self.src.len());
        self.text.push_str(&self.src[self.pos..end]);
        self.pos = end;
    }

    fn copy_quoted(&mut self, quote: u8) {
        let close = self.src[self.pos + 1..]
            .bytes()
            .position(|b| b == quote)
            .map_or(self.src.len(), |i| self.pos + 1 + i + 1);
        self.copy_to(close);
    }

    /// Index just past the `}` matching the `{` at `open`.
    fn braced_end(&self, open: usize) -> usize {
        let mut depth = 0usize;
        for (i, b) in self.src.bytes().enumerate().skip(open) {
            match b {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return i + 1;
                    }
                }
                _ => {}
            }
        }
        self.src.len()
    }

    fn placeholder_at(&self, at: usize) -> bool {
        let next = self.byte(at + 1);
        let expression = next == Some(b'#') && self.byte(at + 2) == Some(b'{');
        match self.byte(at) {
            Some(b'?') => expression || next.is_some_and(|b| b.is_ascii_digit()),
            Some(b':') => expression || next.is_some_and(|b| b == b'_' || b.is_ascii_alphabetic()),
            _ => false,
        }
    }

    fn note_style(&mut self, style: Style) -> CompileResult<()> {
        match self.style {
            Some(seen) if seen != style => Err(CompileError::MixedParameterStyle {
                query: self.src.to_string(),
            }),
            _ => {
                self.style = Some(style);
                Ok(())
            }
        }
    }

    fn placeholder(&mut self, leading: bool) -> CompileResult<()> {
        let like = leading || like_suffix().is_match(&self.text);
        let in_paren = if like {
            None
        } else {
            in_suffix()
                .captures(&self.text)
                .map(|caps| caps.get(1).is_some())
        };

        let sigil = self.byte(self.pos);
        self.pos += 1;
        let (key, expression) = if self.byte(self.pos) == Some(b'#') {
            let start = self.pos + 2;
            let end = self.braced_end(self.pos + 1);
            let expr = self.src[start..end.saturating_sub(1).max(start)].trim().to_string();
            self.pos = end;
            (PendingKey::Expression, Some(expr))
        } else if sigil == Some(b'?') {
            let digits: String = self.src[self.pos..]
                .chars()
                .take_while(char::is_ascii_digit)
                .collect();
            self.pos += digits.len();
            let index: usize = digits.parse().unwrap_or(0);
            self.note_style(Style::Indexed)?;
            self.max_index = self.max_index.max(index);
            (PendingKey::Position(index), None)
        } else {
            let name: String = self.src[self.pos..]
                .chars()
                .take_while(|c| *c == '_' || *c == '$' || c.is_ascii_alphanumeric())
                .collect();
            self.pos += name.len();
            self.note_style(Style::Named)?;
            (PendingKey::Named(name), None)
        };

        let kind = if like {
            let trailing = self.byte(self.pos) == Some(b'%');
            if trailing {
                self.pos += 1;
            }
            BindingKind::Like(LikeKind::from_markers(leading, trailing))
        } else {
            match in_paren {
                Some(false) => BindingKind::In,
                Some(true) if self.closes_paren() => {
                    let open = self.text.rfind('(').unwrap_or(self.text.len());
                    self.text.truncate(open);
                    if !self.text.ends_with(char::is_whitespace) {
                        self.text.push(' ');
                    }
                    BindingKind::In
                }
                _ => BindingKind::Plain,
            }
        };

        if !self.text.is_empty() {
            self.pieces.push(Piece::Text(std::mem::take(&mut self.text)));
        }
        self.pieces.push(Piece::Binding(self.pending.len()));
        self.pending.push(Pending {
            key,
            expression,
            kind,
        });
        Ok(())
    }

    /// Consume optional whitespace and a `)` closing an `IN (` list, if present.
    fn closes_paren(&mut self) -> bool {
        let rest = &self.src[self.pos..];
        let trimmed = rest.trim_start();
        if trimmed.starts_with(')') {
            self.pos += rest.len() - trimmed.len() + 1;
            true
        } else {
            false
        }
    }

    fn finish(mut self) -> CompileResult<ParsedQuery> {
        if !self.text.is_empty() {
            self.pieces.push(Piece::Text(std::mem::take(&mut self.text)));
        }
        let indexed = self.style == Some(Style::Indexed);
        let mut next_index = self.max_index;
        let mut synthetic = 0usize;

        let bindings = self
            .pending
            .into_iter()
            .map(|p| {
                let key = match p.key {
                    PendingKey::Named(name) => BindingKey::Named(name),
                    PendingKey::Position(index) => BindingKey::Position(index),
                    PendingKey::Expression if indexed => {
                        next_index += 1;
                        BindingKey::Position(next_index)
                    }
                    PendingKey::Expression => {
                        let name = format!("{SYNTHETIC_PREFIX}{synthetic}");
                        synthetic += 1;
                        BindingKey::Named(name)
                    }
                };
                ParameterBinding {
                    key,
                    expression: p.expression,
                    kind: p.kind,
                }
            })
            .collect();

        Ok(ParsedQuery::new(bindings, self.pieces))
    }
}
