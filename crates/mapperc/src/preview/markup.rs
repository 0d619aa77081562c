//! Reader for pre-rendered template markup.
//!
//! Turns text such as `name = #{name} <if test="age != null">AND age = #{age}</if>` back
//! into fragments so verbatim template text can be previewed like compiled trees.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::error::{CompileError, CompileResult};
use crate::fragment::{Fragment, Placeholder, Repeat, Trim, xml};

#[derive(Debug)]
enum Node {
    /// Character data with references and CDATA already resolved.
    Text(String),
    Element {
        name: String,
        attrs: Vec<(String, String)>,
        children: Vec<Node>,
    },
}

/// Open element while its children are read.
struct Frame {
    name: String,
    attrs: Vec<(String, String)>,
    children: Vec<Node>,
}

/// Parse template markup into fragments.
///
/// The input is a sequence of text and mapper elements without a single root; comments are
/// dropped.
pub fn parse_markup(text: &str) -> CompileResult<Vec<Fragment>> {
    let nodes = read_nodes(text)?;
    nodes.iter().map(to_fragment).collect()
}

fn read_nodes(text: &str) -> CompileResult<Vec<Node>> {
    let mut reader = Reader::from_str(text);
    let mut stack: Vec<Frame> = Vec::new();
    let mut top = Vec::new();
    let mut pending = String::new();

    loop {
        let event = reader.read_event().map_err(|e| {
            CompileError::fragment(format!(
                "malformed markup at offset {}: {e}",
                reader.error_position()
            ))
        })?;
        match event {
            Event::Text(t) => pending.push_str(&xml::unescape(&String::from_utf8_lossy(&t))),
            Event::GeneralRef(r) => {
                let reference = format!("&{};", String::from_utf8_lossy(&r));
                pending.push_str(&xml::unescape(&reference));
            }
            Event::CData(c) => pending.push_str(&String::from_utf8_lossy(&c)),
            Event::Start(start) => {
                flush(&mut pending, sink(&mut stack, &mut top));
                stack.push(Frame {
                    name: element_name(&start),
                    attrs: attributes(&start)?,
                    children: Vec::new(),
                });
            }
            Event::Empty(start) => {
                flush(&mut pending, sink(&mut stack, &mut top));
                let node = Node::Element {
                    name: element_name(&start),
                    attrs: attributes(&start)?,
                    children: Vec::new(),
                };
                sink(&mut stack, &mut top).push(node);
            }
            Event::End(end) => {
                flush(&mut pending, sink(&mut stack, &mut top));
                let frame = stack.pop().ok_or_else(|| {
                    CompileError::fragment(format!(
                        "unexpected </{}>",
                        String::from_utf8_lossy(end.name().as_ref())
                    ))
                })?;
                let node = Node::Element {
                    name: frame.name,
                    attrs: frame.attrs,
                    children: frame.children,
                };
                sink(&mut stack, &mut top).push(node);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(CompileError::fragment(format!("missing </{}>", open.name)));
    }
    flush(&mut pending, &mut top);
    Ok(top)
}

/// Children list of the innermost open element, or the top level.
fn sink<'s>(stack: &'s mut [Frame], top: &'s mut Vec<Node>) -> &'s mut Vec<Node> {
    match stack.last_mut() {
        Some(frame) => &mut frame.children,
        None => top,
    }
}

fn flush(text: &mut String, nodes: &mut Vec<Node>) {
    if !text.trim().is_empty() {
        nodes.push(Node::Text(std::mem::take(text)));
    }
    text.clear();
}

fn element_name(start: &BytesStart) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn attributes(start: &BytesStart) -> CompileResult<Vec<(String, String)>> {
    start
        .attributes()
        .map(|attr| {
            let attr = attr.map_err(|e| {
                CompileError::fragment(format!("malformed attribute in <{}>: {e}", element_name(start)))
            })?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = xml::unescape(&String::from_utf8_lossy(&attr.value));
            Ok((key, value))
        })
        .collect()
}

fn attr<'n>(attrs: &'n [(String, String)], key: &str) -> Option<&'n str> {
    attrs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn required<'n>(attrs: &'n [(String, String)], tag: &str, key: &str) -> CompileResult<&'n str> {
    attr(attrs, key).ok_or_else(|| CompileError::fragment(format!("<{tag}> requires {key}")))
}

fn children(nodes: &[Node]) -> CompileResult<Vec<Fragment>> {
    nodes.iter().map(to_fragment).collect()
}

fn to_fragment(node: &Node) -> CompileResult<Fragment> {
    let (name, attrs, nodes) = match node {
        Node::Text(text) => return text_fragment(text),
        Node::Element {
            name,
            attrs,
            children,
        } => (name.as_str(), attrs.as_slice(), children.as_slice()),
    };
    match name {
        "if" => Fragment::if_(required(attrs, name, "test")?, children(nodes)?),
        "choose" => choose(nodes),
        "foreach" => {
            let mut repeat = Repeat::new(
                required(attrs, name, "collection")?,
                attr(attrs, "item").unwrap_or("item"),
                children(nodes)?,
            )?;
            if let Some(index) = attr(attrs, "index") {
                repeat = repeat.index(index);
            }
            if let Some(open) = attr(attrs, "open") {
                repeat = repeat.open(open);
            }
            if let Some(close) = attr(attrs, "close") {
                repeat = repeat.close(close);
            }
            if let Some(separator) = attr(attrs, "separator") {
                repeat = repeat.separator(separator);
            }
            Ok(Fragment::foreach(repeat))
        }
        "trim" => {
            let mut trim = Trim::new(children(nodes)?);
            trim.prefix = attr(attrs, "prefix").map(str::to_string);
            trim.prefix_overrides = attr(attrs, "prefixOverrides").map(str::to_string);
            trim.suffix = attr(attrs, "suffix").map(str::to_string);
            trim.suffix_overrides = attr(attrs, "suffixOverrides").map(str::to_string);
            Ok(Fragment::trim(trim))
        }
        "where" => Ok(Fragment::where_(children(nodes)?)),
        "set" => Ok(Fragment::set(children(nodes)?)),
        "bind" => Fragment::bind(required(attrs, name, "name")?, required(attrs, name, "value")?),
        "include" => Fragment::include(required(attrs, name, "refid")?),
        "when" | "otherwise" => Err(CompileError::fragment(format!("<{name}> outside <choose>"))),
        other => Err(CompileError::fragment(format!("unsupported element <{other}>"))),
    }
}

/// `<choose>` with any number of `<when>` branches folds into nested choices.
fn choose(nodes: &[Node]) -> CompileResult<Fragment> {
    let mut whens = Vec::new();
    let mut otherwise = Fragment::empty();
    for node in nodes {
        match node {
            Node::Element {
                name,
                attrs,
                children: body,
            } if name == "when" => {
                whens.push((required(attrs, "when", "test")?.to_string(), children(body)?));
            }
            Node::Element {
                name,
                children: body,
                ..
            } if name == "otherwise" => otherwise = Fragment::group(children(body)?),
            Node::Text(_) => {}
            _ => return Err(CompileError::fragment("<choose> only holds <when> and <otherwise>")),
        }
    }
    let mut result = otherwise;
    for (test, body) in whens.into_iter().rev() {
        result = Fragment::choose(test, Fragment::group(body), result)?;
    }
    Ok(result)
}

/// Split text on `#{...}` and `${...}` markers.
fn text_fragment(text: &str) -> CompileResult<Fragment> {
    let mut body = Vec::new();
    let mut rest = text;
    while let Some(start) = next_marker(rest) {
        let end = rest[start..]
            .find('}')
            .map(|e| start + e)
            .ok_or_else(|| CompileError::fragment(format!("unterminated marker in {text:?}")))?;
        let before = rest[..start].trim();
        if !before.is_empty() {
            body.push(Fragment::literal(before));
        }
        let inner = rest[start + 2..end].trim();
        if rest.as_bytes()[start] == b'#' {
            body.push(placeholder(inner)?);
        } else {
            body.push(Fragment::raw(inner)?);
        }
        rest = &rest[end + 1..];
    }
    let tail = rest.trim();
    if !tail.is_empty() {
        body.push(Fragment::literal(tail));
    }
    Ok(match body.len() {
        1 => body.remove(0),
        _ => Fragment::group(body),
    })
}

fn next_marker(text: &str) -> Option<usize> {
    text.char_indices()
        .find(|&(i, c)| (c == '#' || c == '$') && text[i + 1..].starts_with('{'))
        .map(|(i, _)| i)
}

/// `#{name,javaType=...,jdbcType=...,typeHandler=...}`
fn placeholder(inner: &str) -> CompileResult<Fragment> {
    let mut parts = inner.split(',').map(str::trim);
    let mut placeholder = Placeholder::new(parts.next().unwrap_or_default())?;
    for part in parts {
        match part.split_once('=') {
            Some(("javaType", v)) => placeholder = placeholder.with_java_type(Some(v)),
            Some(("jdbcType", v)) => placeholder = placeholder.with_jdbc_type(Some(v)),
            Some(("typeHandler", v)) => placeholder = placeholder.with_type_handler(Some(v)),
            _ => {}
        }
    }
    Ok(placeholder.into())
}
