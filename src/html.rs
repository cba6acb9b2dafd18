use indexmap::IndexMap;

use crate::dom::{Dom, Element, Namespace, NodeId, NodeType};
use crate::{Error, Result};

const RED_ZONE: usize = 64 * 1024;
const STACK_GROWTH: usize = 1024 * 1024;

pub(crate) fn parse_fragment(html: &str, context: Namespace) -> Result<Dom> {
    let mut dom = Dom::new();
    let mut stack = vec![dom.root()];
    let bytes = html.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() {
        if starts_with_at(bytes, i, b"<!--") {
            let Some(end) = find_subslice(bytes, i + 4, b"-->") else {
                return Err(Error::HtmlParse("unclosed HTML comment".into()));
            };
            let parent = current_parent(&stack)?;
            let body = html.get(i + 4..end).unwrap_or_default().to_string();
            dom.create_node(Some(parent), NodeType::Comment(body));
            i = end + 3;
            continue;
        }

        if bytes[i] == b'<' && is_tag_open(bytes, i) {
            if starts_with_at(bytes, i, b"</") {
                let (tag, next) = parse_end_tag(html, i)?;
                i = next;
                close_element(&dom, &mut stack, &tag);
                continue;
            }

            if starts_with_at(bytes, i, b"<!") {
                i = parse_declaration_tag(html, i)?;
                continue;
            }

            let (tag, attrs, self_closing, next) = parse_start_tag(html, i)?;
            i = next;

            let parent = current_parent(&stack)?;
            let namespace = namespace_for(&dom, parent, &tag, context);
            let node = dom.create_node(
                Some(parent),
                NodeType::Element(Element::new(tag.clone(), namespace, attrs)),
            );

            if is_raw_text_tag(&tag) && !self_closing {
                let close = find_case_insensitive_raw_end_tag(bytes, i, tag.as_bytes())
                    .ok_or_else(|| Error::HtmlParse(format!("unclosed <{tag}>")))?;
                if let Some(body) = html.get(i..close) {
                    if !body.is_empty() {
                        let text = if is_escapable_raw_text_tag(&tag) {
                            decode_character_references(body)
                        } else {
                            body.to_string()
                        };
                        dom.create_node(Some(node), NodeType::Text(text));
                    }
                }
                let (_, after_end) = parse_end_tag(html, close)?;
                i = after_end;
                continue;
            }

            if !self_closing && !is_void_tag(&tag) {
                stack.push(node);
            }
            continue;
        }

        let text_start = i;
        i += 1;
        while i < bytes.len() && !(bytes[i] == b'<' && is_tag_open(bytes, i)) {
            i += 1;
        }

        if let Some(text) = html.get(text_start..i) {
            let parent = current_parent(&stack)?;
            let decoded = decode_character_references(text);
            if !decoded.is_empty() {
                dom.create_node(Some(parent), NodeType::Text(decoded));
            }
        }
    }

    Ok(dom)
}

fn current_parent(stack: &[NodeId]) -> Result<NodeId> {
    stack
        .last()
        .copied()
        .ok_or_else(|| Error::HtmlParse("missing parent element".into()))
}

fn close_element(dom: &Dom, stack: &mut Vec<NodeId>, tag: &str) {
    // Stray end tags with no open counterpart are ignored.
    let Some(index) = (1..stack.len())
        .rev()
        .find(|index| dom.tag_name(stack[*index]) == Some(tag))
    else {
        return;
    };
    stack.truncate(index);
}

fn namespace_for(dom: &Dom, parent: NodeId, tag: &str, context: Namespace) -> Namespace {
    if tag == "svg" {
        return Namespace::Svg;
    }
    if parent == dom.root() {
        return context;
    }
    match dom.namespace(parent) {
        Some(Namespace::Svg) if dom.tag_name(parent) != Some("foreignobject") => Namespace::Svg,
        _ => Namespace::Html,
    }
}

fn is_tag_open(bytes: &[u8], at: usize) -> bool {
    match bytes.get(at + 1) {
        Some(b'/') | Some(b'!') => true,
        Some(next) => next.is_ascii_alphabetic(),
        None => false,
    }
}

fn parse_start_tag(html: &str, at: usize) -> Result<(String, IndexMap<String, String>, bool, usize)> {
    let bytes = html.as_bytes();
    let mut i = at;
    if bytes.get(i) != Some(&b'<') {
        return Err(Error::HtmlParse("expected '<'".into()));
    }
    i += 1;

    let tag_start = i;
    while i < bytes.len() && is_tag_char(bytes[i]) {
        i += 1;
    }

    let tag = html
        .get(tag_start..i)
        .ok_or_else(|| Error::HtmlParse("invalid tag name".into()))?
        .to_ascii_lowercase();

    if tag.is_empty() {
        return Err(Error::HtmlParse("empty tag name".into()));
    }

    let mut attrs = IndexMap::new();
    let mut self_closing = false;

    loop {
        skip_ws(bytes, &mut i);
        if i >= bytes.len() {
            return Err(Error::HtmlParse(format!("unclosed start tag <{tag}>")));
        }

        if bytes[i] == b'>' {
            i += 1;
            break;
        }

        if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'>') {
            self_closing = true;
            i += 2;
            break;
        }

        if !is_attr_name_char(bytes[i]) {
            // Skip junk such as stray quotes between attributes.
            while i < bytes.len()
                && !bytes[i].is_ascii_whitespace()
                && bytes[i] != b'>'
                && !(bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'>'))
            {
                i += 1;
            }
            continue;
        }

        let name_start = i;
        while i < bytes.len() && is_attr_name_char(bytes[i]) {
            i += 1;
        }

        let name = html
            .get(name_start..i)
            .ok_or_else(|| Error::HtmlParse("invalid attribute name".into()))?
            .to_ascii_lowercase();

        skip_ws(bytes, &mut i);

        let value = if bytes.get(i) == Some(&b'=') {
            i += 1;
            skip_ws(bytes, &mut i);
            parse_attr_value(html, bytes, &mut i)?
        } else {
            String::new()
        };

        // First occurrence wins, matching browser tokenizers.
        attrs.entry(name).or_insert(value);
    }

    Ok((tag, attrs, self_closing, i))
}

fn parse_declaration_tag(html: &str, at: usize) -> Result<usize> {
    let bytes = html.as_bytes();
    let mut i = at + 2;
    let mut quote: Option<u8> = None;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
        } else {
            match b {
                b'\'' | b'"' => quote = Some(b),
                b'>' => return Ok(i + 1),
                _ => {}
            }
        }
        i += 1;
    }

    Err(Error::HtmlParse("unclosed declaration tag".into()))
}

fn parse_end_tag(html: &str, at: usize) -> Result<(String, usize)> {
    let bytes = html.as_bytes();
    let mut i = at;

    if !(bytes.get(i) == Some(&b'<') && bytes.get(i + 1) == Some(&b'/')) {
        return Err(Error::HtmlParse("expected end tag".into()));
    }
    i += 2;
    skip_ws(bytes, &mut i);

    let tag_start = i;
    while i < bytes.len() && is_tag_char(bytes[i]) {
        i += 1;
    }

    let tag = html
        .get(tag_start..i)
        .ok_or_else(|| Error::HtmlParse("invalid end tag".into()))?
        .to_ascii_lowercase();

    while i < bytes.len() && bytes[i] != b'>' {
        i += 1;
    }
    if i >= bytes.len() {
        return Err(Error::HtmlParse("unclosed end tag".into()));
    }

    Ok((tag, i + 1))
}

fn parse_attr_value(html: &str, bytes: &[u8], i: &mut usize) -> Result<String> {
    if *i >= bytes.len() {
        return Err(Error::HtmlParse("missing attribute value".into()));
    }

    if bytes[*i] == b'\'' || bytes[*i] == b'"' {
        let quote = bytes[*i];
        *i += 1;
        let start = *i;
        while *i < bytes.len() && bytes[*i] != quote {
            *i += 1;
        }
        if *i >= bytes.len() {
            return Err(Error::HtmlParse("unclosed quoted attribute value".into()));
        }
        let value = html
            .get(start..*i)
            .ok_or_else(|| Error::HtmlParse("invalid attribute value".into()))?;
        *i += 1;
        return Ok(decode_character_references(value));
    }

    let start = *i;
    while *i < bytes.len() && !bytes[*i].is_ascii_whitespace() && bytes[*i] != b'>' {
        *i += 1;
    }

    let value = html
        .get(start..*i)
        .ok_or_else(|| Error::HtmlParse("invalid attribute value".into()))?;
    Ok(decode_character_references(value))
}

pub(crate) fn decode_character_references(src: &str) -> String {
    if !src.contains('&') {
        return src.to_string();
    }

    fn decode_numeric(value: &str) -> Option<char> {
        let codepoint =
            if let Some(hex) = value.strip_prefix('x').or_else(|| value.strip_prefix('X')) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                value.parse::<u32>().ok()?
            };
        char::from_u32(codepoint)
    }

    fn decode_named(value: &str) -> Option<char> {
        match value {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            "nbsp" => Some('\u{00A0}'),
            "copy" => Some('©'),
            "reg" => Some('®'),
            "trade" => Some('™'),
            "hellip" => Some('…'),
            "middot" => Some('·'),
            "laquo" => Some('«'),
            "raquo" => Some('»'),
            _ => None,
        }
    }

    let mut out = String::with_capacity(src.len());
    let mut rest = src;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp + 1..];
        let decoded = tail.find(';').and_then(|semicolon| {
            let raw = &tail[..semicolon];
            let ch = if let Some(numeric) = raw.strip_prefix('#') {
                decode_numeric(numeric)
            } else {
                decode_named(raw)
            };
            ch.map(|ch| (ch, semicolon + 1))
        });

        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &tail[consumed..];
            }
            None => {
                out.push('&');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decides what a filtered serialization leaves out.
pub(crate) struct SerializeFilter<'f> {
    pub(crate) skip_attr: &'f dyn Fn(&str) -> bool,
    /// Skipped elements are omitted together with their subtree.
    pub(crate) skip_element: &'f dyn Fn(NodeId) -> bool,
    /// Emit attributes by name instead of insertion order.
    pub(crate) sort_attrs: bool,
}

impl SerializeFilter<'static> {
    fn keep_all() -> Self {
        fn keep_attr(_: &str) -> bool {
            false
        }
        fn keep_element(_: NodeId) -> bool {
            false
        }
        SerializeFilter {
            skip_attr: &keep_attr,
            skip_element: &keep_element,
            sort_attrs: false,
        }
    }
}

pub(crate) fn serialize_children(dom: &Dom, node: NodeId, out: &mut String) {
    write_children(dom, node, &SerializeFilter::keep_all(), out);
}

/// Like [`serialize_children`], but leaves out whatever `filter` rejects.
pub(crate) fn serialize_children_filtered(
    dom: &Dom,
    node: NodeId,
    filter: &SerializeFilter<'_>,
    out: &mut String,
) {
    write_children(dom, node, filter, out);
}

pub(crate) fn serialize_node(dom: &Dom, node: NodeId, raw_text: bool, out: &mut String) {
    write_node(dom, node, raw_text, &SerializeFilter::keep_all(), out);
}

fn write_children(dom: &Dom, node: NodeId, filter: &SerializeFilter<'_>, out: &mut String) {
    let raw = dom.tag_name(node).is_some_and(is_unescaped_text_tag);
    for child in dom.children(node) {
        if dom.is_element(*child) && (filter.skip_element)(*child) {
            continue;
        }
        write_node(dom, *child, raw, filter, out);
    }
}

fn write_node(
    dom: &Dom,
    node: NodeId,
    raw_text: bool,
    filter: &SerializeFilter<'_>,
    out: &mut String,
) {
    stacker::maybe_grow(RED_ZONE, STACK_GROWTH, || match dom.node_type(node) {
        NodeType::Document => write_children(dom, node, filter, out),
        NodeType::Text(text) => {
            if raw_text {
                out.push_str(text);
            } else {
                escape_text(text, out);
            }
        }
        NodeType::Comment(text) => {
            out.push_str("<!--");
            out.push_str(text);
            out.push_str("-->");
        }
        NodeType::Element(element) => {
            out.push('<');
            out.push_str(&element.tag_name);
            let mut attrs: Vec<(&String, &String)> = element
                .attrs
                .iter()
                .filter(|(name, _)| !(filter.skip_attr)(name))
                .collect();
            if filter.sort_attrs {
                attrs.sort_by(|a, b| a.0.cmp(b.0));
            }
            for (name, value) in attrs {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                escape_attr(value, out);
                out.push('"');
            }
            out.push('>');
            if is_void_tag(&element.tag_name) {
                return;
            }
            write_children(dom, node, filter, out);
            out.push_str("</");
            out.push_str(&element.tag_name);
            out.push('>');
        }
    });
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{00A0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{00A0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

fn skip_ws(bytes: &[u8], i: &mut usize) {
    while *i < bytes.len() && bytes[*i].is_ascii_whitespace() {
        *i += 1;
    }
}

fn is_tag_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':'
}

fn is_attr_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':' || b == b'.'
}

pub(crate) fn is_void_tag(tag: &str) -> bool {
    matches!(
        tag,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

fn is_raw_text_tag(tag: &str) -> bool {
    matches!(tag, "script" | "style" | "textarea" | "title")
}

fn is_escapable_raw_text_tag(tag: &str) -> bool {
    matches!(tag, "textarea" | "title")
}

fn is_unescaped_text_tag(tag: &str) -> bool {
    matches!(tag, "script" | "style")
}

fn starts_with_at(bytes: &[u8], at: usize, needle: &[u8]) -> bool {
    bytes
        .get(at..at + needle.len())
        .is_some_and(|window| window == needle)
}

fn find_subslice(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || from > bytes.len() {
        return None;
    }
    bytes[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

fn find_case_insensitive_raw_end_tag(bytes: &[u8], from: usize, tag: &[u8]) -> Option<usize> {
    let mut i = from;
    while i < bytes.len() {
        if bytes[i] == b'<' && bytes.get(i + 1) == Some(&b'/') {
            let mut j = i + 2;
            while j < bytes.len() && bytes[j].is_ascii_whitespace() {
                j += 1;
            }
            let tag_end = j + tag.len();
            if tag_end <= bytes.len() && bytes[j..tag_end].eq_ignore_ascii_case(tag) {
                if tag_end >= bytes.len() || !bytes[tag_end].is_ascii_alphanumeric() {
                    return Some(i);
                }
            }
        }
        i += 1;
    }
    None
}
