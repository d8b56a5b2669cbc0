//! Location-tracking element scan over a policy document.
//!
//! Walks the document with quick-xml and records, for every start or
//! empty tag, the byte offset of its `<` and of each attribute name.
//! Offsets come from the reader itself, so repeated identical elements
//! each keep their own position.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::debug;

use crate::position;

/// One element occurrence with source offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementSpan {
    pub name: String,
    /// Byte offset of the opening `<`, when it could be confirmed.
    pub offset: Option<usize>,
    pub attributes: Vec<AttributeSpan>,
}

/// One attribute occurrence. `offset` is the byte offset of the name's
/// first character; `None` when the name could not be placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSpan {
    pub name: String,
    pub offset: Option<usize>,
}

/// Why the document could not be walked, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    pub offset: usize,
    pub reason: String,
}

/// Scan every element in document order.
pub fn scan_elements(text: &str) -> Result<Vec<ElementSpan>, ParseFailure> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().check_end_names = true;

    let mut elements = Vec::new();
    let mut open: Vec<String> = Vec::new();
    let mut root_seen = false;
    // Elements are found in order, so a fallback search never needs to
    // look before the previous element.
    let mut cursor = 0usize;

    loop {
        let event_start = reader.buffer_position() as usize;
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let end = reader.buffer_position() as usize;
                let element = element_span(text, &e, end, 2, cursor)?;
                check_single_root(&open, &mut root_seen, &element, cursor)?;
                if let Some(offset) = element.offset {
                    cursor = offset + 1;
                }
                open.push(element.name.clone());
                elements.push(element);
            }
            Ok(Event::Empty(e)) => {
                let end = reader.buffer_position() as usize;
                let element = element_span(text, &e, end, 3, cursor)?;
                check_single_root(&open, &mut root_seen, &element, cursor)?;
                if let Some(offset) = element.offset {
                    cursor = offset + 1;
                }
                elements.push(element);
            }
            Ok(Event::End(_)) => {
                open.pop();
            }
            Ok(Event::Text(t)) if open.is_empty() => {
                if !t.iter().all(u8::is_ascii_whitespace) {
                    let leading = t.iter().take_while(|b| b.is_ascii_whitespace()).count();
                    return Err(ParseFailure {
                        offset: event_start + leading,
                        reason: "text outside the root element".into(),
                    });
                }
            }
            Ok(Event::CData(_)) if open.is_empty() => {
                return Err(ParseFailure {
                    offset: event_start,
                    reason: "CDATA outside the root element".into(),
                });
            }
            Ok(Event::Eof) => {
                if let Some(name) = open.last() {
                    return Err(ParseFailure {
                        offset: text.len(),
                        reason: format!("unclosed element <{name}>"),
                    });
                }
                if !root_seen {
                    return Err(ParseFailure {
                        offset: 0,
                        reason: "no root element".into(),
                    });
                }
                break;
            }
            Ok(_) => {}
            Err(e) => {
                return Err(ParseFailure {
                    offset: reader.error_position() as usize,
                    reason: e.to_string(),
                });
            }
        }
    }

    debug!(elements = elements.len(), "scanned policy document");
    Ok(elements)
}

/// A top-level element is only allowed once.
fn check_single_root(
    open: &[String],
    root_seen: &mut bool,
    element: &ElementSpan,
    cursor: usize,
) -> Result<(), ParseFailure> {
    if !open.is_empty() {
        return Ok(());
    }
    if *root_seen {
        return Err(ParseFailure {
            offset: element.offset.unwrap_or(cursor),
            reason: format!("content after the root element: <{}>", element.name),
        });
    }
    *root_seen = true;
    Ok(())
}

/// Build the span for a tag whose `>` ends at `end`. `delimiters` is the
/// number of bytes around the tag content: `<` `>` for start tags, plus
/// `/` for empty ones.
fn element_span(
    text: &str,
    tag: &BytesStart<'_>,
    end: usize,
    delimiters: usize,
    cursor: usize,
) -> Result<ElementSpan, ParseFailure> {
    let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();

    let content_len = tag.len();
    let offset = end
        .checked_sub(content_len + delimiters)
        .filter(|&start| confirms_tag(text, start, &name))
        .or_else(|| fallback_offset(text, &name, cursor));

    let mut keys = Vec::new();
    for attr in tag.attributes() {
        match attr {
            Ok(attr) => keys.push(String::from_utf8_lossy(attr.key.as_ref()).into_owned()),
            Err(e) => {
                return Err(ParseFailure {
                    offset: offset.unwrap_or(cursor),
                    reason: e.to_string(),
                });
            }
        }
    }

    let attributes = match offset {
        Some(start) => {
            let content_start = start + 1;
            let content = &text[content_start..(content_start + content_len).min(text.len())];
            place_attributes(content, keys)
                .into_iter()
                .map(|a| AttributeSpan {
                    name: a.name,
                    offset: a.offset.map(|o| content_start + o),
                })
                .collect()
        }
        None => keys
            .into_iter()
            .map(|name| AttributeSpan { name, offset: None })
            .collect(),
    };

    Ok(ElementSpan {
        name,
        offset,
        attributes,
    })
}

fn confirms_tag(text: &str, start: usize, name: &str) -> bool {
    text.get(start..)
        .and_then(|rest| rest.strip_prefix('<'))
        .is_some_and(|rest| rest.starts_with(name))
}

fn fallback_offset(text: &str, name: &str, cursor: usize) -> Option<usize> {
    let anchor = format!("<{name}");
    let pos = position::locate(text, &anchor, cursor).ok()?;
    let index = position::LineIndex::new(text);
    debug!(element = %name, "tag offset not confirmed, fell back to text search");
    Some(index.offset(pos))
}

/// Match parsed attribute keys to their lexical positions inside the tag
/// content (the text between `<` and `>`). Offsets are relative to the
/// content start.
fn place_attributes(content: &str, keys: Vec<String>) -> Vec<AttributeSpan> {
    let lexical = lexical_attribute_names(content);
    let mut search_from = 0;
    keys.into_iter()
        .enumerate()
        .map(|(i, name)| {
            let offset = match lexical.get(i) {
                Some(&(lex_name, lex_offset)) if lex_name == name => Some(lex_offset),
                _ => content
                    .get(search_from..)
                    .and_then(|rest| rest.find(name.as_str()))
                    .map(|found| search_from + found),
            };
            if let Some(o) = offset {
                search_from = o + name.len();
            }
            AttributeSpan { name, offset }
        })
        .collect()
}

/// Attribute names and their offsets, in order, from raw tag content such
/// as `set-header name="X" bad='y'`.
fn lexical_attribute_names(content: &str) -> Vec<(&str, usize)> {
    let bytes = content.as_bytes();
    let len = bytes.len();
    let mut i = bytes
        .iter()
        .position(|b| b.is_ascii_whitespace())
        .unwrap_or(len);
    let mut names = Vec::new();

    loop {
        while i < len && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= len {
            break;
        }

        let start = i;
        while i < len && bytes[i] != b'=' && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        names.push((&content[start..i], start));

        while i < len && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i < len && bytes[i] == b'=' {
            i += 1;
            while i < len && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < len && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let quote = bytes[i];
                i += 1;
                while i < len && bytes[i] != quote {
                    i += 1;
                }
                i += 1;
            } else {
                while i < len && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
            }
        }
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offsets(text: &str) -> Vec<(String, Option<usize>, Vec<(String, Option<usize>)>)> {
        scan_elements(text)
            .unwrap()
            .into_iter()
            .map(|e| {
                let attrs = e.attributes.into_iter().map(|a| (a.name, a.offset)).collect();
                (e.name, e.offset, attrs)
            })
            .collect()
    }

    #[test]
    fn records_start_and_empty_tags() {
        let text = "<policies>\n  <set-header name=\"X\" />\n</policies>";
        let found = offsets(text);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0, "policies");
        assert_eq!(found[0].1, Some(0));
        assert_eq!(found[1].0, "set-header");
        assert_eq!(found[1].1, text.find("<set-header"));
        assert_eq!(found[1].2, vec![("name".to_string(), text.find("name"))]);
    }

    #[test]
    fn attribute_value_containing_name_does_not_confuse_offsets() {
        let text = r#"<set-header name="bad" bad="y"></set-header>"#;
        let found = offsets(text);
        let bad = found[0].2[1].1.unwrap();
        assert_eq!(&text[bad..bad + 3], "bad");
        assert_eq!(bad, text.find(" bad=").unwrap() + 1);
    }

    #[test]
    fn repeated_elements_keep_their_own_offsets() {
        let text = "<a>\n<x k=\"1\"/>\n<x k=\"1\"/>\n</a>";
        let found = offsets(text);
        assert_eq!(found[1].1, Some(4));
        assert_eq!(found[2].1, Some(15));
        assert_eq!(found[2].2[0].1, Some(18));
    }

    #[test]
    fn single_quotes_and_spacing() {
        let text = "<x  a = 'one two'\n   b=\"2\"/>";
        let found = offsets(text);
        let attrs = &found[0].2;
        assert_eq!(attrs[0], ("a".to_string(), Some(4)));
        assert_eq!(attrs[1].1, text.find("b=\""));
    }

    #[test]
    fn comments_and_text_are_skipped() {
        let text = "<!-- <quota calls=\"1\"/> -->\n<policies>text</policies>";
        let found = offsets(text);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0, "policies");
    }

    #[test]
    fn mismatched_end_tag_fails() {
        let err = scan_elements("<a><b></a>").unwrap_err();
        assert!(!err.reason.is_empty());
        assert!(err.offset <= 10);
    }

    #[test]
    fn unclosed_element_fails_at_end() {
        let text = "<policies><inbound>";
        let err = scan_elements(text).unwrap_err();
        assert_eq!(err.offset, text.len());
        assert!(err.reason.contains("inbound"));
    }

    #[test]
    fn duplicate_attribute_fails() {
        let err = scan_elements(r#"<a x="1" x="2"/>"#).unwrap_err();
        assert!(!err.reason.is_empty());
    }

    #[test]
    fn document_needs_a_root_element() {
        for text in ["", "  \n", "<!-- only a comment -->"] {
            let err = scan_elements(text).unwrap_err();
            assert_eq!(err.reason, "no root element", "for {text:?}");
            assert_eq!(err.offset, 0);
        }
    }

    #[test]
    fn text_outside_root_fails() {
        let err = scan_elements("just text").unwrap_err();
        assert_eq!(err.reason, "text outside the root element");
        assert_eq!(err.offset, 0);

        let err = scan_elements("<a/>\n  tail").unwrap_err();
        assert_eq!(err.offset, 7);
    }

    #[test]
    fn second_root_fails_at_its_tag() {
        let text = r#"<a/><set-header bad="1"/>"#;
        let err = scan_elements(text).unwrap_err();
        assert_eq!(err.offset, 4);
        assert!(err.reason.contains("set-header"));
    }

    #[test]
    fn unconfirmed_tag_offset_falls_back_to_text_search() {
        let text = r#"<policies><set-header name="n" bad="1"/></policies>"#;
        let tag = BytesStart::from_content(r#"set-header name="n" bad="1""#, "set-header".len());
        // an end position that cannot produce a matching `<set-header`
        let span = element_span(text, &tag, 0, 3, 0).unwrap();
        assert_eq!(span.offset, Some(10));
        assert_eq!(span.attributes[1].offset, text.find("bad="));
    }

    #[test]
    fn unlocatable_tag_leaves_offsets_empty() {
        let text = "<policies></policies>";
        let tag = BytesStart::from_content(r#"set-header bad="1""#, "set-header".len());
        let span = element_span(text, &tag, 0, 3, 0).unwrap();
        assert_eq!(span.offset, None);
        assert_eq!(span.attributes, vec![AttributeSpan { name: "bad".into(), offset: None }]);
    }

    #[test]
    fn lexical_names_in_order() {
        let names = lexical_attribute_names(r#"tag a="1" b='2' c = "3""#);
        assert_eq!(names, vec![("a", 4), ("b", 10), ("c", 16)]);
    }
}
