// Event-level XML scanning shared by the envelope decoder and the error normalizer.
//
// Everything here matches on local names so that namespace prefixes
// (`s:Envelope`, `vcloud:Error`, ...) never change the outcome.

use std::collections::HashMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// Attributes of an element keyed by local name, values unescaped.
pub(crate) fn attributes(element: &BytesStart<'_>) -> HashMap<String, String> {
    element
        .attributes()
        .filter_map(Result::ok)
        .map(|attr| {
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value().map_or_else(
                |_| String::from_utf8_lossy(&attr.value).into_owned(),
                std::borrow::Cow::into_owned,
            );
            (key, value)
        })
        .collect()
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

// ── Query result envelopes ───────────────────────────────────────────

/// A legacy `QueryResultRecords` document split into its root attributes
/// and the raw markup of each record element.
#[derive(Debug)]
pub(crate) struct QueryDocument {
    pub attributes: HashMap<String, String>,
    pub records: Vec<String>,
}

/// Split a query result document into root attributes and record fragments.
///
/// `Link` children are navigation, not records, and are dropped.
pub(crate) fn scan_query_document(xml: &str) -> Result<QueryDocument, String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let root = loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) => break e,
            Event::Empty(e) => {
                return Ok(QueryDocument {
                    attributes: attributes(&e),
                    records: Vec::new(),
                });
            }
            Event::Eof => return Err("document has no root element".into()),
            _ => {}
        }
    };

    let mut records = Vec::new();
    loop {
        let before = reader.buffer_position();
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) => {
                let end = e.to_end().into_owned();
                reader.read_to_end(end.name()).map_err(|e| e.to_string())?;
                if e.local_name().as_ref() != b"Link" {
                    records.push(fragment(xml, before, reader.buffer_position())?);
                }
            }
            Event::Empty(e) => {
                if e.local_name().as_ref() != b"Link" {
                    records.push(fragment(xml, before, reader.buffer_position())?);
                }
            }
            Event::End(_) => break,
            Event::Eof => return Err(format!("unterminated <{}> element", local_name(&root))),
            _ => {}
        }
    }

    Ok(QueryDocument {
        attributes: attributes(&root),
        records,
    })
}

fn fragment(xml: &str, start: usize, end: usize) -> Result<String, String> {
    xml.get(start..end)
        .map(|s| s.trim().to_owned())
        .ok_or_else(|| format!("record markup at {start}..{end} is not addressable"))
}

// ── Generic element/text scan ────────────────────────────────────────

/// Flattened view of a small XML document: the root element, its attributes,
/// every element path seen, and the text content under each path.
///
/// Paths are `/`-joined local names from the root, e.g.
/// `Envelope/Body/Fault/Reason/Text`.
#[derive(Debug, Default)]
pub(crate) struct XmlDocument {
    pub root: String,
    pub root_attributes: HashMap<String, String>,
    elements: Vec<String>,
    /// `(element index, path, text)`; one entry per element instance.
    texts: Vec<(usize, String, String)>,
}

impl XmlDocument {
    pub(crate) fn parse(xml: &str) -> Result<Self, String> {
        let mut reader = Reader::from_str(xml);
        reader.trim_text(true);

        let mut doc = Self::default();
        let mut path: Vec<String> = Vec::new();
        let mut open: Vec<usize> = Vec::new();
        let mut seen_root = false;

        loop {
            match reader.read_event().map_err(|e| e.to_string())? {
                Event::Start(e) => {
                    open.push(doc.enter(&e, &path, &mut seen_root));
                    path.push(local_name(&e));
                }
                Event::Empty(e) => {
                    doc.enter(&e, &path, &mut seen_root);
                }
                Event::End(_) => {
                    path.pop();
                    open.pop();
                }
                Event::Text(t) => {
                    let text = t
                        .unescape()
                        .map_or_else(|_| String::from_utf8_lossy(&t).into_owned(), |c| c.into_owned());
                    doc.push_text(open.last().copied(), &path, &text);
                }
                Event::CData(c) => {
                    let text = String::from_utf8_lossy(&c).into_owned();
                    doc.push_text(open.last().copied(), &path, &text);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if seen_root {
            Ok(doc)
        } else {
            Err("document has no root element".into())
        }
    }

    fn enter(&mut self, element: &BytesStart<'_>, parent: &[String], seen_root: &mut bool) -> usize {
        let name = local_name(element);
        if !*seen_root {
            *seen_root = true;
            self.root.clone_from(&name);
            self.root_attributes = attributes(element);
        }
        let mut full = parent.join("/");
        if !full.is_empty() {
            full.push('/');
        }
        full.push_str(&name);
        self.elements.push(full);
        self.elements.len() - 1
    }

    /// Split text and CDATA events of one element are joined; sibling
    /// elements on the same path keep separate entries.
    fn push_text(&mut self, element: Option<usize>, path: &[String], text: &str) {
        let Some(element) = element else {
            return;
        };
        if path.is_empty() || text.trim().is_empty() {
            return;
        }
        match self.texts.iter_mut().rev().find(|(index, _, _)| *index == element) {
            Some((_, _, existing)) => existing.push_str(text),
            None => self.texts.push((element, path.join("/"), text.to_owned())),
        }
    }

    /// Text of the first element whose path ends with `suffix`.
    pub(crate) fn text(&self, suffix: &str) -> Option<&str> {
        self.texts
            .iter()
            .find(|(_, p, _)| path_ends_with(p, suffix))
            .map(|(_, _, t)| t.as_str())
    }

    /// Concatenated text of every element below the first element matching `suffix`.
    pub(crate) fn text_below(&self, suffix: &str) -> Option<String> {
        let anchor = self.elements.iter().find(|p| path_ends_with(p, suffix))?;
        let prefix = format!("{anchor}/");
        let joined: Vec<&str> = self
            .texts
            .iter()
            .filter(|(_, p, _)| p == anchor || p.starts_with(&prefix))
            .map(|(_, _, t)| t.as_str())
            .collect();
        if joined.is_empty() {
            None
        } else {
            Some(joined.join(" "))
        }
    }

    pub(crate) fn has_element(&self, suffix: &str) -> bool {
        self.elements.iter().any(|p| path_ends_with(p, suffix))
    }
}

fn path_ends_with(path: &str, suffix: &str) -> bool {
    path == suffix
        || path
            .strip_suffix(suffix)
            .is_some_and(|head| head.ends_with('/'))
}
