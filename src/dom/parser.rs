//! Lenient HTML fragment parser.
//!
//! Mirrors what assigning `innerHTML` does for the markup the result server
//! produces: it never fails, closes whatever is still open at the end of
//! input and ignores stray end tags. When a marker class is given, every
//! element carrying it is turned into a [`BlockHandle`] as soon as it is
//! closed, so confirmation blocks come out of parsing already constructed.
//! A marker inside another marker becomes a block of its own, held by the
//! outer block as a `Node::Block` child.

use super::{is_void_tag, BlockHandle, Element, Node};

/// Elements whose content is raw text up to the matching end tag.
const RAW_TEXT_TAGS: &[&str] = &["script", "style", "textarea", "title"];

/// Raw text elements whose content still has character references decoded.
const ESCAPABLE_RAW_TEXT_TAGS: &[&str] = &["textarea", "title"];

/// Parses a whole page. No blocks are built.
pub fn parse_document(html: &str) -> Vec<Node> {
    parse_fragment(html, None)
}

pub fn parse_fragment(html: &str, marker: Option<&str>) -> Vec<Node> {
    let mut sink = TreeSink::new(marker);
    let bytes = html.as_bytes();
    let mut i = 0usize;

    while i < bytes.len() {
        if starts_with_at(bytes, i, b"<!--") {
            let (text, next) = match find_subslice(bytes, i + 4, b"-->") {
                Some(end) => (&html[i + 4..end], end + 3),
                None => (&html[i + 4..], bytes.len()),
            };
            sink.append(Node::Comment(text.to_string()));
            i = next;
            continue;
        }

        if bytes[i] == b'<' {
            match bytes.get(i + 1) {
                Some(b'/') => {
                    i = match bytes.get(i + 2) {
                        Some(c) if c.is_ascii_alphabetic() => {
                            let (tag, next) = parse_end_tag(html, i);
                            sink.close(&tag);
                            next
                        }
                        // `</>` and bogus end tags are dropped.
                        _ => skip_past(bytes, i, b'>'),
                    };
                    continue;
                }
                Some(b'!') | Some(b'?') => {
                    // Doctype and processing declarations.
                    i = skip_past(bytes, i, b'>');
                    continue;
                }
                Some(c) if c.is_ascii_alphabetic() => {
                    let Some(start) = parse_start_tag(html, i) else {
                        // Unterminated tag: the rest of the input is text.
                        sink.append_text(&decode_character_references(&html[i..]));
                        break;
                    };
                    i = start.next;
                    let mut element = Element::new(start.tag);
                    element.attrs = start.attrs;

                    if RAW_TEXT_TAGS.contains(&element.tag.as_str()) && !start.self_closing {
                        let close = find_end_tag(bytes, i, element.tag.as_bytes());
                        let body = &html[i..close.unwrap_or(bytes.len())];
                        if !body.is_empty() {
                            let text = if ESCAPABLE_RAW_TEXT_TAGS.contains(&element.tag.as_str()) {
                                decode_character_references(body)
                            } else {
                                body.to_string()
                            };
                            element.children.push(Node::Text(text));
                        }
                        sink.leaf(element);
                        i = match close {
                            Some(at) => parse_end_tag(html, at).1,
                            None => bytes.len(),
                        };
                        continue;
                    }

                    if start.self_closing || is_void_tag(&element.tag) {
                        sink.leaf(element);
                    } else {
                        sink.open(element);
                    }
                    continue;
                }
                _ => {}
            }
        }

        // Text run; a `<` that did not start markup is literal text.
        let start = i;
        i += 1;
        while i < bytes.len() && bytes[i] != b'<' {
            i += 1;
        }
        sink.append_text(&decode_character_references(&html[start..i]));
    }

    sink.finish()
}

struct Frame {
    element: Element,
    block: bool,
}

struct TreeSink<'m> {
    root: Vec<Node>,
    stack: Vec<Frame>,
    marker: Option<&'m str>,
}

impl<'m> TreeSink<'m> {
    fn new(marker: Option<&'m str>) -> Self {
        Self {
            root: Vec::new(),
            stack: Vec::new(),
            marker,
        }
    }

    fn children(&mut self) -> &mut Vec<Node> {
        match self.stack.last_mut() {
            Some(frame) => &mut frame.element.children,
            None => &mut self.root,
        }
    }

    fn append(&mut self, node: Node) {
        self.children().push(node);
    }

    fn append_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let children = self.children();
        match children.last_mut() {
            Some(Node::Text(prev)) => prev.push_str(text),
            _ => children.push(Node::text(text)),
        }
    }

    fn is_block(&self, element: &Element) -> bool {
        self.marker.map_or(false, |marker| element.has_class(marker))
    }

    fn open(&mut self, element: Element) {
        let block = self.is_block(&element);
        self.stack.push(Frame { element, block });
    }

    fn leaf(&mut self, element: Element) {
        let node = if self.is_block(&element) {
            Node::Block(BlockHandle::new(element))
        } else {
            Node::Element(element)
        };
        self.append(node);
    }

    fn close(&mut self, tag: &str) {
        if let Some(pos) = self.stack.iter().rposition(|f| f.element.is(tag)) {
            while self.stack.len() > pos {
                self.pop();
            }
        }
    }

    fn pop(&mut self) {
        if let Some(frame) = self.stack.pop() {
            let node = if frame.block {
                Node::Block(BlockHandle::new(frame.element))
            } else {
                Node::Element(frame.element)
            };
            self.append(node);
        }
    }

    fn finish(mut self) -> Vec<Node> {
        while !self.stack.is_empty() {
            self.pop();
        }
        self.root
    }
}

struct StartTag {
    tag: String,
    attrs: Vec<(String, String)>,
    self_closing: bool,
    next: usize,
}

/// `None` when the input ends before the tag does.
fn parse_start_tag(html: &str, at: usize) -> Option<StartTag> {
    let bytes = html.as_bytes();
    let mut i = at + 1;

    let tag_start = i;
    while i < bytes.len() && !is_tag_delimiter(bytes[i]) {
        i += 1;
    }
    let tag = html[tag_start..i].to_ascii_lowercase();

    let mut attrs: Vec<(String, String)> = Vec::new();
    let mut self_closing = false;

    loop {
        skip_ws(bytes, &mut i);
        match bytes.get(i)? {
            b'>' => {
                i += 1;
                break;
            }
            b'/' => {
                i += 1;
                if bytes.get(i) == Some(&b'>') {
                    self_closing = true;
                    i += 1;
                    break;
                }
                continue;
            }
            _ => {}
        }

        let name_start = i;
        while i < bytes.len() && !is_attr_name_delimiter(bytes[i]) {
            i += 1;
        }
        if i == name_start {
            // A lone `=` where a name was expected.
            i += 1;
        }
        let name = html[name_start..i].to_ascii_lowercase();

        skip_ws(bytes, &mut i);
        let value = if bytes.get(i) == Some(&b'=') {
            i += 1;
            skip_ws(bytes, &mut i);
            parse_attr_value(html, &mut i)?
        } else {
            String::new()
        };

        // The first occurrence of an attribute wins.
        if !attrs.iter().any(|(n, _)| *n == name) {
            attrs.push((name, value));
        }
    }

    Some(StartTag {
        tag,
        attrs,
        self_closing,
        next: i,
    })
}

fn parse_attr_value(html: &str, i: &mut usize) -> Option<String> {
    let bytes = html.as_bytes();
    match bytes.get(*i)? {
        quote @ (b'"' | b'\'') => {
            let quote = *quote;
            let start = *i + 1;
            let end = start + bytes[start..].iter().position(|b| *b == quote)?;
            *i = end + 1;
            Some(decode_character_references(&html[start..end]))
        }
        _ => {
            let start = *i;
            while *i < bytes.len() && !bytes[*i].is_ascii_whitespace() && bytes[*i] != b'>' {
                *i += 1;
            }
            Some(decode_character_references(&html[start..*i]))
        }
    }
}

/// Returns the lower-cased tag name and the index just past `>`.
fn parse_end_tag(html: &str, at: usize) -> (String, usize) {
    let bytes = html.as_bytes();
    let mut i = at + 2;
    let tag_start = i;
    while i < bytes.len() && !is_tag_delimiter(bytes[i]) {
        i += 1;
    }
    let tag = html[tag_start..i].to_ascii_lowercase();
    (tag, skip_past(bytes, i, b'>'))
}

fn find_end_tag(bytes: &[u8], from: usize, tag: &[u8]) -> Option<usize> {
    let mut i = from;
    while let Some(at) = find_subslice(bytes, i, b"</") {
        let name_end = at + 2 + tag.len();
        if name_end <= bytes.len()
            && bytes[at + 2..name_end].eq_ignore_ascii_case(tag)
            && bytes.get(name_end).map_or(true, |b| is_tag_delimiter(*b))
        {
            return Some(at);
        }
        i = at + 2;
    }
    None
}

fn is_tag_delimiter(b: u8) -> bool {
    b.is_ascii_whitespace() || b == b'/' || b == b'>'
}

fn is_attr_name_delimiter(b: u8) -> bool {
    is_tag_delimiter(b) || b == b'='
}

fn skip_ws(bytes: &[u8], i: &mut usize) {
    while *i < bytes.len() && bytes[*i].is_ascii_whitespace() {
        *i += 1;
    }
}

fn skip_past(bytes: &[u8], from: usize, needle: u8) -> usize {
    match bytes[from..].iter().position(|b| *b == needle) {
        Some(offset) => from + offset + 1,
        None => bytes.len(),
    }
}

fn starts_with_at(bytes: &[u8], at: usize, needle: &[u8]) -> bool {
    bytes.get(at..at + needle.len()) == Some(needle)
}

fn find_subslice(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    if from > bytes.len() {
        return None;
    }
    bytes[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|offset| from + offset)
}

pub fn decode_character_references(src: &str) -> String {
    if !src.contains('&') {
        return src.to_string();
    }

    let mut out = String::with_capacity(src.len());
    let mut rest = src;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let decoded = rest
            .get(1..)
            .and_then(|tail| tail.find(';').filter(|semi| *semi <= 32).map(|semi| (tail, semi)))
            .and_then(|(tail, semi)| decode_reference(&tail[..semi]).map(|ch| (ch, semi + 2)));
        match decoded {
            Some((ch, consumed)) => {
                out.push(ch);
                rest = &rest[consumed..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_reference(name: &str) -> Option<char> {
    if let Some(num) = name.strip_prefix('#') {
        let code = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => num.parse().ok()?,
        };
        return char::from_u32(code);
    }
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{00A0}'),
        "ndash" => Some('\u{2013}'),
        "mdash" => Some('\u{2014}'),
        "hellip" => Some('\u{2026}'),
        "laquo" => Some('\u{00AB}'),
        "raquo" => Some('\u{00BB}'),
        "copy" => Some('\u{00A9}'),
        _ => None,
    }
}
