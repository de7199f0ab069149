//! RSS/Atom item extraction.
//!
//! Both dialects are handled by one table: each [`Post`] field lists the
//! places it may be read from, in priority order, and the first non-empty
//! value wins. Adding a dialect means adding rows, not branches.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use quick_xml::escape::{resolve_predefined_entity, unescape_with};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use serde::Serialize;
use thiserror::Error;

/// One episode, independent of the feed dialect it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Post {
    pub title: String,
    pub description: String,
    /// `None` when the feed's date was missing or unparsable
    pub date: Option<DateTime<Utc>>,
    pub link: String,
    pub image: String,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("XML parse error: {0}")]
    Xml(String),
    #[error("Document ended inside an open element")]
    UnexpectedEof,
    #[error("Document has no root element")]
    NoRootElement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Description,
    Date,
    Link,
    Image,
}

/// Where a field value can come from, relative to the item element.
///
/// Element names without a prefix match on local name, so `link` also
/// matches `atom:link`. A prefixed name matches by namespace: `itunes:image`
/// is `image` in the iTunes namespace, whatever prefix the feed binds it to.
enum Source {
    /// Text content of the first element named any of these
    Text(&'static [&'static str]),
    /// Attribute of the first element with this name
    Attr {
        element: &'static str,
        attribute: &'static str,
    },
}

const ITEM_ELEMENTS: &[&str] = &["item", "entry"];

/// Prefixes usable in selectors, with the namespace each stands for.
const NAMESPACES: &[(&str, &[u8])] = &[(
    "itunes",
    b"http://www.itunes.com/dtds/podcast-1.0.dtd",
)];

const FIELDS: &[(Field, &[Source])] = &[
    (Field::Title, &[Source::Text(&["title"])]),
    (Field::Description, &[Source::Text(&["description", "content"])]),
    (Field::Date, &[Source::Text(&["pubDate", "updated"])]),
    (
        Field::Link,
        &[
            Source::Text(&["link"]),
            Source::Attr {
                element: "enclosure",
                attribute: "url",
            },
            // Atom keeps the link in an attribute
            Source::Attr {
                element: "link",
                attribute: "href",
            },
        ],
    ),
    (
        Field::Image,
        &[Source::Attr {
            element: "itunes:image",
            attribute: "href",
        }],
    ),
];

/// Parses a feed document into posts, in document order.
///
/// Sparse items never fail: missing fields fall back to empty strings and
/// a missing date to `None`. Only a document that is not well-formed XML
/// is an error.
pub fn parse(raw_text: &str) -> Result<Vec<Post>, ParseError> {
    let mut reader = NsReader::from_str(raw_text);
    let mut posts = Vec::new();
    let mut item: Option<ItemBuilder> = None;
    let mut depth = 0usize;
    let mut seen_element = false;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                return Err(ParseError::Xml(format!(
                    "{} at byte {}",
                    e,
                    reader.buffer_position()
                )))
            }
        };

        match event {
            Event::Start(e) => {
                seen_element = true;
                depth += 1;
                match item.as_mut() {
                    Some(builder) => builder.visit(&e, &reader, Some(depth)),
                    None if is_item(&e, &reader) => item = Some(ItemBuilder::new(depth)),
                    None => {}
                }
            }
            Event::Empty(e) => {
                seen_element = true;
                match item.as_mut() {
                    Some(builder) => builder.visit(&e, &reader, None),
                    None if is_item(&e, &reader) => posts.push(ItemBuilder::new(depth).finish()),
                    None => {}
                }
            }
            Event::Text(t) => {
                if let Some(builder) = item.as_mut() {
                    let text = match t.unescape() {
                        Ok(text) => text.into_owned(),
                        Err(_) => unescape_lenient(&String::from_utf8_lossy(&t)),
                    };
                    builder.text(&text);
                }
            }
            Event::CData(c) => {
                if let Some(builder) = item.as_mut() {
                    builder.text(&String::from_utf8_lossy(&c));
                }
            }
            Event::End(_) => {
                if let Some(mut builder) = item.take() {
                    if builder.depth == depth {
                        posts.push(builder.finish());
                    } else {
                        builder.close(depth);
                        item = Some(builder);
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if depth > 0 {
        return Err(ParseError::UnexpectedEof);
    }
    if !seen_element {
        return Err(ParseError::NoRootElement);
    }

    Ok(posts)
}

/// Parses a feed date: RFC 2822 (`pubDate`), RFC 3339 (`updated`) or a bare
/// `YYYY-MM-DD` taken as midnight UTC.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    DateTime::parse_from_rfc2822(value)
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| Utc.from_utc_datetime(&naive))
        })
}

fn element_matches(selector: &str, e: &BytesStart<'_>, reader: &NsReader<&[u8]>) -> bool {
    let Some((prefix, local)) = selector.split_once(':') else {
        return e.local_name().as_ref() == selector.as_bytes();
    };
    let Some(&(_, uri)) = NAMESPACES.iter().find(|(p, _)| *p == prefix) else {
        return e.name().as_ref() == selector.as_bytes();
    };

    match reader.resolve_element(e.name()) {
        (ResolveResult::Bound(Namespace(ns)), name) => {
            ns == uri && name.as_ref() == local.as_bytes()
        }
        // Undeclared prefix, compare it as written
        (ResolveResult::Unknown(_), _) => e.name().as_ref() == selector.as_bytes(),
        (ResolveResult::Unbound, _) => false,
    }
}

fn is_item(e: &BytesStart<'_>, reader: &NsReader<&[u8]>) -> bool {
    ITEM_ELEMENTS.iter().any(|name| element_matches(name, e, reader))
}

/// Unescapes entity by entity, keeping the ones XML does not define
/// (`&nbsp;` and friends) verbatim.
fn unescape_lenient(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest.find(';') else {
            break;
        };
        let reference = &rest[..=semi];
        if reference[1..].contains(|c: char| c == '&' || c.is_whitespace()) {
            out.push('&');
            rest = &rest[1..];
            continue;
        }
        match unescape_with(reference, resolve_predefined_entity) {
            Ok(decoded) => out.push_str(&decoded),
            Err(_) => out.push_str(reference),
        }
        rest = &rest[semi + 1..];
    }

    out.push_str(rest);
    out
}

fn attribute_value(e: &BytesStart<'_>, attribute: &str, reader: &NsReader<&[u8]>) -> String {
    match e.try_get_attribute(attribute) {
        Ok(Some(attr)) => attr
            .decode_and_unescape_value(reader.decoder())
            .map(|v| v.trim().to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

struct Capture {
    field: usize,
    source: usize,
    depth: usize,
    text: String,
}

/// Collects the first match of every source while inside one item.
struct ItemBuilder {
    depth: usize,
    /// `slots[field][source]`, `Some` once the first matching element was seen
    slots: Vec<Vec<Option<String>>>,
    captures: Vec<Capture>,
}

impl ItemBuilder {
    fn new(depth: usize) -> Self {
        Self {
            depth,
            slots: FIELDS
                .iter()
                .map(|(_, sources)| vec![None; sources.len()])
                .collect(),
            captures: Vec::new(),
        }
    }

    /// Records matches for an element opening inside the item.
    ///
    /// `depth` is `Some` for a start tag, whose text is captured until the
    /// matching end tag, and `None` for a self-closing tag.
    fn visit(&mut self, e: &BytesStart<'_>, reader: &NsReader<&[u8]>, depth: Option<usize>) {
        for (field, (_, sources)) in FIELDS.iter().enumerate() {
            for (source, kind) in sources.iter().enumerate() {
                if self.slots[field][source].is_some() {
                    continue;
                }
                match kind {
                    Source::Text(names) => {
                        let capturing = self
                            .captures
                            .iter()
                            .any(|c| c.field == field && c.source == source);
                        if capturing || !names.iter().any(|n| element_matches(n, e, reader)) {
                            continue;
                        }
                        match depth {
                            Some(depth) => self.captures.push(Capture {
                                field,
                                source,
                                depth,
                                text: String::new(),
                            }),
                            None => self.slots[field][source] = Some(String::new()),
                        }
                    }
                    Source::Attr { element, attribute } => {
                        if element_matches(element, e, reader) {
                            self.slots[field][source] = Some(attribute_value(e, attribute, reader));
                        }
                    }
                }
            }
        }
    }

    fn text(&mut self, text: &str) {
        for capture in &mut self.captures {
            capture.text.push_str(text);
        }
    }

    fn close(&mut self, depth: usize) {
        let (done, open): (Vec<_>, Vec<_>) = std::mem::take(&mut self.captures)
            .into_iter()
            .partition(|c| c.depth == depth);
        self.captures = open;
        for capture in done {
            self.slots[capture.field][capture.source] = Some(capture.text.trim().to_string());
        }
    }

    fn value(&self, field: Field) -> String {
        FIELDS
            .iter()
            .position(|(f, _)| *f == field)
            .and_then(|index| {
                self.slots[index]
                    .iter()
                    .flatten()
                    .find(|value| !value.is_empty())
                    .cloned()
            })
            .unwrap_or_default()
    }

    fn finish(self) -> Post {
        Post {
            title: self.value(Field::Title),
            description: self.value(Field::Description),
            date: parse_date(&self.value(Field::Date)),
            link: self.value(Field::Link),
            image: self.value(Field::Image),
        }
    }
}
