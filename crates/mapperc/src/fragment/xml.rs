//! XML escaping for rendered templates.

use std::borrow::Cow;

use quick_xml::escape::{minimal_escape, partial_escape};

/// Escape character data (`&` and `<`).
///
/// `>` is left alone so comparison operators stay readable in the rendered SQL.
pub fn escape_text(text: &str) -> String {
    minimal_escape(text).into_owned()
}

/// Escape an attribute value for use inside double quotes.
pub fn escape_attr(value: &str) -> String {
    let escaped = partial_escape(value);
    if escaped.contains('"') {
        escaped.replace('"', "&quot;")
    } else {
        escaped.into_owned()
    }
}

/// Reverse [`escape_text`] / [`escape_attr`].
///
/// Text holding a bare `&` that starts no entity reference is returned as is.
pub fn unescape(value: &str) -> String {
    quick_xml::escape::unescape(value)
        .map(Cow::into_owned)
        .unwrap_or_else(|_| value.to_string())
}

/// Comment body that cannot close the comment early: no `--` and no trailing `-`.
pub fn comment_text(text: &str) -> String {
    let mut out = text.to_string();
    while out.contains("--") {
        out = out.replace("--", "- -");
    }
    if out.ends_with('-') {
        out.push(' ');
    }
    out
}

/// Render ` name="value"`, or nothing when the value is absent.
pub(crate) fn attr(out: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        out.push_str(&escape_attr(value));
        out.push('"');
    }
}
