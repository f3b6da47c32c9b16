// SPDX-FileCopyrightText: © 2024 The remotefn authors
// SPDX-License-Identifier: MIT

use remotefn_api::error::RemoteFnError;

/// A parsed XML element: tag name, attributes, child elements and the
/// concatenated character data directly below it.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First child element with the given tag name.
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }

    /// Serialize back to markup, without an XML declaration.
    pub fn to_markup(&self) -> String {
        let mut out = String::new();
        self.write_markup(&mut out);
        out
    }

    fn write_markup(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape_xml(value).replace('"', "&quot;"));
            out.push('"');
        }
        out.push('>');
        out.push_str(&escape_xml(&self.text));
        for child in &self.children {
            child.write_markup(out);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }
}

fn escape_xml(raw: &str) -> String {
    raw.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// Parse an XML document body into its document element.
pub fn parse_xml(bytes: &[u8]) -> anyhow::Result<XmlElement> {
    let mut reader = quick_xml::Reader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event()? {
            quick_xml::events::Event::Start(start) => {
                stack.push(element_from_start(&start)?);
            }
            quick_xml::events::Event::Empty(start) => {
                let element = element_from_start(&start)?;
                attach(&mut stack, &mut root, element)?;
            }
            quick_xml::events::Event::Text(text) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text.unescape()?);
                }
            }
            quick_xml::events::Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            quick_xml::events::Event::End(_) => {
                let element = stack.pop().ok_or_else(|| anyhow::anyhow!("unbalanced end tag"))?;
                attach(&mut stack, &mut root, element)?;
            }
            quick_xml::events::Event::Eof => {
                break;
            }
            _ => {}
        }
    }

    root.ok_or_else(|| anyhow::anyhow!("no document element"))
}

fn element_from_start(start: &quick_xml::events::BytesStart<'_>) -> anyhow::Result<XmlElement> {
    let mut element = XmlElement {
        name: String::from_utf8_lossy(start.name().as_ref()).to_string(),
        ..Default::default()
    };
    for attribute in start.attributes() {
        let attribute = attribute?;
        element.attributes.push((
            String::from_utf8_lossy(attribute.key.as_ref()).to_string(),
            attribute.unescape_value()?.to_string(),
        ));
    }
    Ok(element)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) -> anyhow::Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None => match root {
            Some(_) => Err(anyhow::anyhow!("multiple document elements")),
            None => {
                *root = Some(element);
                Ok(())
            }
        },
    }
}

/// The uniform result representation the demultiplexer and the type
/// conversion operate on, regardless of the wire format that produced it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ResultNode {
    Json(serde_json::Value),
    Xml(XmlElement),
    Text(String),
}

impl ResultNode {
    pub fn as_ref(&self) -> NodeRef<'_> {
        match self {
            ResultNode::Json(value) => NodeRef::Json(value),
            ResultNode::Xml(element) => NodeRef::Xml(element),
            ResultNode::Text(text) => NodeRef::Text(text),
        }
    }
}

/// A borrowed position inside a [ResultNode] tree.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Json(&'a serde_json::Value),
    Xml(&'a XmlElement),
    Text(&'a str),
}

impl<'a> NodeRef<'a> {
    /// Step one path segment down: a field name or collection index for
    /// JSON, an attribute name (checked first) or child tag name for XML.
    /// Scalar leaves cannot be stepped into.
    pub fn get(&self, segment: &str) -> Result<NodeRef<'a>, RemoteFnError> {
        let missing = || RemoteFnError::Traversal {
            segment: segment.to_string(),
        };
        match self {
            NodeRef::Json(serde_json::Value::Object(map)) => map.get(segment).map(NodeRef::Json).ok_or_else(missing),
            NodeRef::Json(serde_json::Value::Array(items)) => segment
                .parse::<usize>()
                .ok()
                .and_then(|index| items.get(index))
                .map(NodeRef::Json)
                .ok_or_else(missing),
            NodeRef::Json(_) => Err(missing()),
            NodeRef::Xml(element) => {
                if let Some(value) = element.attribute(segment) {
                    Ok(NodeRef::Text(value))
                } else {
                    element.child(segment).map(NodeRef::Xml).ok_or_else(missing)
                }
            }
            NodeRef::Text(_) => Err(missing()),
        }
    }

    /// Walk a dot path; empty segments (and an empty path) are skipped, so
    /// the root itself is addressable as `""`.
    pub fn traverse(&self, path: &str) -> Result<NodeRef<'a>, RemoteFnError> {
        let mut current = *self;
        for segment in path.split('.').filter(|segment| !segment.is_empty()) {
            current = current.get(segment)?;
        }
        Ok(current)
    }

    /// The elements of a collection-shaped node: JSON array items or XML
    /// child elements. `None` for anything that is not a collection.
    pub fn elements(&self) -> Option<Vec<NodeRef<'a>>> {
        match self {
            NodeRef::Json(serde_json::Value::Array(items)) => Some(items.iter().map(NodeRef::Json).collect()),
            NodeRef::Xml(element) => Some(element.children.iter().map(NodeRef::Xml).collect()),
            _ => None,
        }
    }

    pub fn index(&self, index: usize) -> Result<NodeRef<'a>, RemoteFnError> {
        self.elements()
            .and_then(|elements| elements.get(index).copied())
            .ok_or(RemoteFnError::Traversal {
                segment: index.to_string(),
            })
    }

    /// String representation: scalar JSON nodes render bare, composite JSON
    /// serializes, XML elements serialize to markup.
    pub fn to_text(&self) -> String {
        match self {
            NodeRef::Json(serde_json::Value::String(text)) => text.clone(),
            NodeRef::Json(serde_json::Value::Number(number)) => number.to_string(),
            NodeRef::Json(value) => value.to_string(),
            NodeRef::Xml(element) => element.to_markup(),
            NodeRef::Text(text) => (*text).to_string(),
        }
    }
}
