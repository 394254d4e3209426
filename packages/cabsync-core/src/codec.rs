use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::{Error, Result};
use crate::ids::NodeId;
use crate::time::{self, Timestamp};
use crate::tree::{Cabinet, Node, NodeKind};

const CABINET: &str = "Cabinet";
const FOLDER: &str = "Folder";
const CARD: &str = "Card";
const MULTI_LINE_ENTRY: &str = "MultiLineEntry";
const SINGLE_LINE_ENTRY: &str = "SingleLineEntry";

const ATTR_ID: &str = "Id";
const ATTR_CREATED: &str = "Created";
const ATTR_MODIFIED: &str = "Modified";
const ATTR_LABEL: &str = "Label";
const ATTR_PASSWORD: &str = "Password";

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

/// Encode a cabinet subtree into the tagged-element document.
pub fn encode(cabinet: &Cabinet) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(write_err)?;

    let mut start = BytesStart::new(CABINET);
    push_common(&mut start, cabinet.id(), cabinet.created(), cabinet.modified(), cabinet.label());
    if !cabinet.password().is_empty() {
        start.push_attribute((ATTR_PASSWORD, cabinet.password()));
    }
    if cabinet.children().is_empty() {
        writer.write_event(Event::Empty(start)).map_err(write_err)?;
    } else {
        writer.write_event(Event::Start(start)).map_err(write_err)?;
        for child in cabinet.children() {
            write_node(&mut writer, child)?;
        }
        writer
            .write_event(Event::End(BytesEnd::new(CABINET)))
            .map_err(write_err)?;
    }

    String::from_utf8(writer.into_inner())
        .map_err(|e| Error::Format(format!("encoded document is not valid UTF-8: {e}")))
}

fn push_common(start: &mut BytesStart<'_>, id: &NodeId, created: Timestamp, modified: Timestamp, label: &str) {
    start.push_attribute((ATTR_ID, id.as_str()));
    start.push_attribute((ATTR_CREATED, time::format(created).as_str()));
    start.push_attribute((ATTR_MODIFIED, time::format(modified).as_str()));
    start.push_attribute((ATTR_LABEL, label));
}

fn write_node(writer: &mut Writer<Vec<u8>>, node: &Node) -> Result<()> {
    let name = node.kind().kind_name();
    let mut start = BytesStart::new(name);
    push_common(&mut start, node.id(), node.created(), node.modified(), node.label());

    match node.kind() {
        NodeKind::Folder { children } | NodeKind::Card { children } => {
            if children.is_empty() {
                writer.write_event(Event::Empty(start)).map_err(write_err)?;
            } else {
                writer.write_event(Event::Start(start)).map_err(write_err)?;
                for child in children {
                    write_node(writer, child)?;
                }
                writer
                    .write_event(Event::End(BytesEnd::new(name)))
                    .map_err(write_err)?;
            }
        }
        NodeKind::SingleLineEntry { content } | NodeKind::MultiLineEntry { content } => {
            if content.is_empty() {
                writer.write_event(Event::Empty(start)).map_err(write_err)?;
            } else {
                writer.write_event(Event::Start(start)).map_err(write_err)?;
                writer
                    .write_event(Event::Text(BytesText::new(content)))
                    .map_err(write_err)?;
                writer
                    .write_event(Event::End(BytesEnd::new(name)))
                    .map_err(write_err)?;
            }
        }
    }
    Ok(())
}

fn write_err(e: std::io::Error) -> Error {
    Error::Format(format!("document write failed: {e}"))
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// Decode a tagged-element document back into a cabinet. Validation is
/// strict: an unrecognized element, a missing required attribute, an
/// unparsable timestamp, or a containment violation each fail with
/// [`Error::Format`] naming the offending element.
pub fn decode(text: &str) -> Result<Cabinet> {
    let mut reader = Reader::from_str(text);
    loop {
        match read_event(&mut reader)? {
            Event::Start(start) => return read_cabinet(&mut reader, &start, false),
            Event::Empty(start) => return read_cabinet(&mut reader, &start, true),
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => continue,
            Event::Text(t) => {
                if is_ignorable(&t)? {
                    continue;
                }
                return Err(Error::Format("unexpected text before the root element".into()));
            }
            Event::Eof => return Err(Error::Format("document is empty".into())),
            other => {
                return Err(Error::Format(format!(
                    "unexpected {} before the root element",
                    event_name(&other)
                )));
            }
        }
    }
}

struct CommonAttrs {
    id: NodeId,
    created: Timestamp,
    modified: Timestamp,
    label: String,
    password: Option<String>,
}

fn read_cabinet(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
    empty: bool,
) -> Result<Cabinet> {
    let name = element_name(start);
    if name != CABINET {
        return Err(Error::Format(format!(
            "unexpected element <{name}>, expected <{CABINET}>"
        )));
    }
    let attrs = read_attrs(start, CABINET)?;
    let mut cabinet = Cabinet::restore(
        attrs.id,
        attrs.created,
        attrs.modified,
        attrs.label,
        attrs.password.unwrap_or_default(),
    )
    .map_err(|e| Error::Format(format!("invalid <{CABINET}>: {e}")))?;

    if empty {
        return Ok(cabinet);
    }

    loop {
        match read_event(reader)? {
            Event::Start(child) => {
                let node = dispatch_child(reader, &child, false, CABINET, &[FOLDER])?;
                graft(&mut cabinet, node)?;
            }
            Event::Empty(child) => {
                let node = dispatch_child(reader, &child, true, CABINET, &[FOLDER])?;
                graft(&mut cabinet, node)?;
            }
            Event::Text(t) => {
                if is_ignorable(&t)? {
                    continue;
                }
                return Err(Error::Format(format!(
                    "unexpected text while parsing <{CABINET}>"
                )));
            }
            Event::End(_) => break,
            Event::Eof => {
                return Err(Error::Format(format!(
                    "document ended inside <{CABINET}>"
                )));
            }
            other => {
                return Err(Error::Format(format!(
                    "unexpected {} while parsing <{CABINET}>",
                    event_name(&other)
                )));
            }
        }
    }
    Ok(cabinet)
}

/// Parse one child element, enforcing the parent's containment rules by name
/// before descending.
fn dispatch_child(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
    empty: bool,
    parent: &str,
    allowed: &[&str],
) -> Result<Node> {
    let name = element_name(start);
    if !allowed.contains(&name.as_str()) {
        return Err(Error::Format(format!(
            "unexpected element <{name}> while parsing <{parent}>"
        )));
    }
    match name.as_str() {
        FOLDER => read_container(reader, start, empty, FOLDER, &[FOLDER, CARD]),
        CARD => read_container(reader, start, empty, CARD, &[MULTI_LINE_ENTRY, SINGLE_LINE_ENTRY]),
        MULTI_LINE_ENTRY => read_entry(reader, start, empty, MULTI_LINE_ENTRY),
        SINGLE_LINE_ENTRY => read_entry(reader, start, empty, SINGLE_LINE_ENTRY),
        _ => Err(Error::Format(format!("unexpected element <{name}>"))),
    }
}

fn read_container(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
    empty: bool,
    name: &str,
    allowed: &[&str],
) -> Result<Node> {
    let attrs = read_attrs(start, name)?;
    let mut node = match name {
        FOLDER => Node::restore_folder(attrs.id, attrs.created, attrs.modified, attrs.label),
        _ => Node::restore_card(attrs.id, attrs.created, attrs.modified, attrs.label),
    }
    .map_err(|e| Error::Format(format!("invalid <{name}>: {e}")))?;

    if empty {
        return Ok(node);
    }

    loop {
        match read_event(reader)? {
            Event::Start(child) => {
                let parsed = dispatch_child(reader, &child, false, name, allowed)?;
                node.graft_child(parsed)
                    .map_err(|e| Error::Format(format!("invalid <{name}>: {e}")))?;
            }
            Event::Empty(child) => {
                let parsed = dispatch_child(reader, &child, true, name, allowed)?;
                node.graft_child(parsed)
                    .map_err(|e| Error::Format(format!("invalid <{name}>: {e}")))?;
            }
            Event::Text(t) => {
                if is_ignorable(&t)? {
                    continue;
                }
                return Err(Error::Format(format!(
                    "unexpected text while parsing <{name}>"
                )));
            }
            Event::End(_) => break,
            Event::Eof => {
                return Err(Error::Format(format!("document ended inside <{name}>")));
            }
            other => {
                return Err(Error::Format(format!(
                    "unexpected {} while parsing <{name}>",
                    event_name(&other)
                )));
            }
        }
    }
    Ok(node)
}

fn read_entry(
    reader: &mut Reader<&[u8]>,
    start: &BytesStart<'_>,
    empty: bool,
    name: &str,
) -> Result<Node> {
    let attrs = read_attrs(start, name)?;
    let mut content = String::new();

    if !empty {
        loop {
            match read_event(reader)? {
                Event::Text(t) => {
                    let value = t
                        .unescape()
                        .map_err(|e| Error::Format(format!("bad text in <{name}>: {e}")))?;
                    if !value.trim().is_empty() {
                        content = value.into_owned();
                    }
                }
                Event::End(_) => break,
                Event::Eof => {
                    return Err(Error::Format(format!("document ended inside <{name}>")));
                }
                other => {
                    return Err(Error::Format(format!(
                        "unexpected {} while parsing <{name}>",
                        event_name(&other)
                    )));
                }
            }
        }
    }

    match name {
        MULTI_LINE_ENTRY => {
            Node::restore_multi_line(attrs.id, attrs.created, attrs.modified, attrs.label, content)
        }
        _ => Node::restore_single_line(attrs.id, attrs.created, attrs.modified, attrs.label, content),
    }
    .map_err(|e| Error::Format(format!("invalid <{name}>: {e}")))
}

fn read_attrs(start: &BytesStart<'_>, element: &str) -> Result<CommonAttrs> {
    let mut id = None;
    let mut created = None;
    let mut modified = None;
    let mut label = None;
    let mut password = None;

    for attr in start.attributes() {
        let attr: Attribute<'_> =
            attr.map_err(|e| Error::Format(format!("bad attribute on <{element}>: {e}")))?;
        let value = attr
            .unescape_value()
            .map_err(|e| Error::Format(format!("bad attribute value on <{element}>: {e}")))?
            .into_owned();
        match attr.key.as_ref() {
            b"Id" => id = Some(value),
            b"Created" => created = Some(value),
            b"Modified" => modified = Some(value),
            b"Label" => label = Some(value),
            b"Password" => password = Some(value),
            // unknown attributes are ignored, as the original reader did
            _ => {}
        }
    }

    let id = id
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Format(format!("{ATTR_ID} missing on <{element}>")))?;
    let created = created
        .ok_or_else(|| Error::Format(format!("{ATTR_CREATED} missing on <{element}>")))?;
    let modified = modified
        .ok_or_else(|| Error::Format(format!("{ATTR_MODIFIED} missing on <{element}>")))?;
    let label = label
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Format(format!("{ATTR_LABEL} missing on <{element}>")))?;
    if password.is_some() && element != CABINET {
        return Err(Error::Format(format!(
            "{ATTR_PASSWORD} is only allowed on <{CABINET}>, found on <{element}>"
        )));
    }

    let created = time::parse(&created)
        .map_err(|e| Error::Format(format!("bad {ATTR_CREATED} on <{element}>: {e}")))?;
    let modified = time::parse(&modified)
        .map_err(|e| Error::Format(format!("bad {ATTR_MODIFIED} on <{element}>: {e}")))?;

    Ok(CommonAttrs {
        id: NodeId::new(id),
        created,
        modified,
        label,
        password,
    })
}

fn graft(cabinet: &mut Cabinet, node: Node) -> Result<()> {
    cabinet
        .graft_child(node)
        .map_err(|e| Error::Format(format!("invalid <{CABINET}>: {e}")))
}

fn read_event<'a>(reader: &mut Reader<&'a [u8]>) -> Result<Event<'a>> {
    reader
        .read_event()
        .map_err(|e| Error::Format(format!("document parse failed: {e}")))
}

fn is_ignorable(t: &quick_xml::events::BytesText<'_>) -> Result<bool> {
    let value = t
        .unescape()
        .map_err(|e| Error::Format(format!("bad text node: {e}")))?;
    Ok(value.trim().is_empty())
}

fn element_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn event_name(event: &Event<'_>) -> &'static str {
    match event {
        Event::Start(_) | Event::Empty(_) => "element",
        Event::End(_) => "end tag",
        Event::Text(_) => "text",
        Event::CData(_) => "CDATA section",
        Event::Comment(_) => "comment",
        Event::Decl(_) => "declaration",
        Event::PI(_) => "processing instruction",
        Event::DocType(_) => "doctype",
        Event::Eof => "end of document",
        _ => "node",
    }
}
