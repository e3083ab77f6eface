//! Decoding of SOAP RPC/encoded responses into plain JSON values.
//!
//! The Axis service behind Jira serializes beans out of line as `multiRef`
//! siblings of the response element and points at them with `href="#idN"`.
//! Decoding builds a small element tree, indexes the multiRefs by id and then
//! walks the return value, replacing every reference by its target.
//!
//! Text is kept as sent. Whitespace between elements only shows up on nodes
//! that have children, and those never decode to a scalar.

use std::collections::HashMap;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde_json::{Map, Number, Value};

use crate::error::{BridgeError, Result};

#[derive(Debug, Default)]
struct Node {
  name: String,
  attrs: Vec<(String, String)>,
  children: Vec<Node>,
  text: String,
}

impl Node {
  fn from_start(e: &BytesStart) -> Result<Self> {
    let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in e.attributes() {
      let attr = attr.map_err(|e| BridgeError::Protocol(format!("invalid attribute: {}", e)))?;
      if attr.key.as_ref().starts_with(b"xmlns") {
        continue;
      }
      let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
      let value = attr
        .unescape_value()
        .map_err(|e| BridgeError::Protocol(format!("invalid attribute value: {}", e)))?;
      attrs.push((key, value.into_owned()));
    }
    Ok(Node {
      name,
      attrs,
      ..Default::default()
    })
  }

  fn attr(&self, name: &str) -> Option<&str> {
    self
      .attrs
      .iter()
      .find(|(k, _)| k == name)
      .map(|(_, v)| v.as_str())
  }

  fn child(&self, name: &str) -> Option<&Node> {
    self.children.iter().find(|c| c.name == name)
  }

  /// Local part of the `xsi:type` attribute, e.g. `long` for `xsd:long`.
  fn xsi_type(&self) -> Option<&str> {
    self
      .attr("type")
      .map(|t| t.rsplit(':').next().unwrap_or(t))
  }

  fn is_nil(&self) -> bool {
    matches!(self.attr("nil"), Some("true") | Some("1"))
  }

  fn is_array(&self) -> bool {
    self.attr("arrayType").is_some() || self.xsi_type() == Some("Array")
  }
}

fn parse_tree(xml: &str) -> Result<Node> {
  let mut reader = Reader::from_str(xml);

  // The bottom of the stack is a synthetic document node.
  let mut stack: Vec<Node> = vec![Node::default()];

  loop {
    match reader.read_event() {
      Ok(Event::Start(ref e)) => stack.push(Node::from_start(e)?),
      Ok(Event::Empty(ref e)) => {
        let node = Node::from_start(e)?;
        if let Some(parent) = stack.last_mut() {
          parent.children.push(node);
        }
      }
      Ok(Event::End(_)) => {
        if stack.len() < 2 {
          return Err(BridgeError::Protocol("unbalanced end tag".to_string()));
        }
        if let (Some(node), Some(parent)) = (stack.pop(), stack.last_mut()) {
          parent.children.push(node);
        }
      }
      Ok(Event::Text(e)) => {
        let text = e
          .unescape()
          .map_err(|e| BridgeError::Protocol(format!("invalid text: {}", e)))?;
        if let Some(node) = stack.last_mut() {
          node.text.push_str(&text);
        }
      }
      Ok(Event::CData(e)) => {
        if let Some(node) = stack.last_mut() {
          node.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
        }
      }
      Ok(Event::Eof) => break,
      Err(e) => {
        return Err(BridgeError::Protocol(format!(
          "error at position {}: {}",
          reader.buffer_position(),
          e
        )))
      }
      _ => {}
    }
  }

  if stack.len() != 1 {
    return Err(BridgeError::Protocol("unexpected end of document".to_string()));
  }
  stack
    .pop()
    .ok_or_else(|| BridgeError::Protocol("empty document".to_string()))
}

/// Decode a response body.
///
/// Returns the decoded return value, `None` for operations without one, or
/// `BridgeError::Fault` when the body carries a SOAP fault.
pub fn response(xml: &str) -> Result<Option<Value>> {
  let document = parse_tree(xml)?;
  let body = document
    .child("Envelope")
    .and_then(|env| env.child("Body"))
    .ok_or_else(|| BridgeError::Protocol("missing SOAP body".to_string()))?;

  let refs: HashMap<&str, &Node> = body
    .children
    .iter()
    .filter_map(|n| n.attr("id").map(|id| (id, n)))
    .collect();

  let payload = body
    .children
    .iter()
    .find(|n| n.attr("id").is_none() && n.name != "multiRef")
    .ok_or_else(|| BridgeError::Protocol("empty SOAP body".to_string()))?;

  if payload.name == "Fault" {
    return Err(fault(payload));
  }

  let mut decoder = Decoder {
    refs,
    path: Vec::new(),
    resolved: HashMap::new(),
  };
  Ok(payload.children.first().map(|ret| decoder.decode(ret)))
}

fn fault(node: &Node) -> BridgeError {
  let text = |name: &str| {
    node
      .child(name)
      .map(|n| n.text.trim().to_string())
      .unwrap_or_default()
  };
  BridgeError::Fault {
    code: text("faultcode"),
    message: text("faultstring"),
  }
}

/// Walks a return value, resolving `href`s against the multiRef index.
///
/// A reference to a multiRef that is already being decoded further up the
/// path decodes to null. Each multiRef is decoded once and then reused.
struct Decoder<'a> {
  refs: HashMap<&'a str, &'a Node>,
  path: Vec<&'a str>,
  resolved: HashMap<&'a str, Value>,
}

impl<'a> Decoder<'a> {
  fn decode(&mut self, node: &'a Node) -> Value {
    if let Some(href) = node.attr("href") {
      return self.resolve(href.trim_start_matches('#'));
    }

    if node.is_nil() {
      return Value::Null;
    }

    if node.is_array() {
      return Value::Array(node.children.iter().map(|c| self.decode(c)).collect());
    }

    if !node.children.is_empty() {
      return self.decode_struct(node);
    }

    scalar(&node.text, node.xsi_type())
  }

  fn resolve(&mut self, id: &'a str) -> Value {
    if let Some(value) = self.resolved.get(id) {
      return value.clone();
    }
    if self.path.contains(&id) {
      return Value::Null;
    }
    let Some(&target) = self.refs.get(id) else {
      return Value::Null;
    };

    self.path.push(id);
    let value = self.decode(target);
    self.path.pop();

    self.resolved.insert(id, value.clone());
    value
  }

  /// Struct members become map entries; a member name that repeats is
  /// collected into an array in document order.
  fn decode_struct(&mut self, node: &'a Node) -> Value {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for child in &node.children {
      *counts.entry(child.name.as_str()).or_default() += 1;
    }

    let mut map = Map::new();
    for child in &node.children {
      let value = self.decode(child);
      if counts.get(child.name.as_str()).copied().unwrap_or(0) > 1 {
        let slot = map
          .entry(child.name.clone())
          .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(items) = slot {
          items.push(value);
        }
      } else {
        map.insert(child.name.clone(), value);
      }
    }
    Value::Object(map)
  }
}

fn scalar(text: &str, xsi_type: Option<&str>) -> Value {
  match xsi_type {
    Some("int" | "long" | "short" | "byte" | "integer") => text
      .trim()
      .parse::<i64>()
      .map(Value::from)
      .unwrap_or_else(|_| Value::String(text.to_string())),
    Some("boolean") => match text.trim() {
      "true" | "1" => Value::Bool(true),
      "false" | "0" => Value::Bool(false),
      other => Value::String(other.to_string()),
    },
    Some("double" | "float" | "decimal") => text
      .trim()
      .parse::<f64>()
      .ok()
      .and_then(Number::from_f64)
      .map(Value::Number)
      .unwrap_or_else(|| Value::String(text.to_string())),
    _ => Value::String(text.to_string()),
  }
}
