//! RPC/encoded request envelopes for the Jira SOAP service.

use quick_xml::escape::escape;

/// Namespace of the Jira RPC operations.
pub const SERVICE_NS: &str = "http://soap.rpc.jira.atlassian.com";
/// Namespace of the Jira remote beans (RemoteIssue, RemoteFieldValue, ...).
pub const BEANS_NS: &str = "http://beans.soap.rpc.jira.atlassian.com";

const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const ENCODING_NS: &str = "http://schemas.xmlsoap.org/soap/encoding/";

/// A single argument of a remote call.
#[derive(Debug, Clone, PartialEq)]
pub enum SoapValue {
  Str(String),
  Int(i64),
  Null,
  /// `item_type` is the qualified element type, e.g. `xsd:string`.
  Array {
    item_type: &'static str,
    items: Vec<SoapValue>,
  },
  /// `type_name` is the bean name, e.g. `RemoteIssue`.
  Struct {
    type_name: &'static str,
    fields: Vec<(String, SoapValue)>,
  },
}

impl SoapValue {
  pub fn str(value: impl Into<String>) -> Self {
    SoapValue::Str(value.into())
  }

  pub fn strings<I, S>(values: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    SoapValue::Array {
      item_type: "xsd:string",
      items: values.into_iter().map(|v| SoapValue::Str(v.into())).collect(),
    }
  }

  fn xsi_type(&self) -> String {
    match self {
      SoapValue::Str(_) => "xsd:string".to_string(),
      SoapValue::Int(_) => "xsd:long".to_string(),
      SoapValue::Null => "xsd:anyType".to_string(),
      SoapValue::Array { .. } => "soapenc:Array".to_string(),
      SoapValue::Struct { type_name, .. } => format!("beans:{}", type_name),
    }
  }
}

impl From<&str> for SoapValue {
  fn from(value: &str) -> Self {
    SoapValue::Str(value.to_string())
  }
}

impl From<String> for SoapValue {
  fn from(value: String) -> Self {
    SoapValue::Str(value)
  }
}

impl From<i64> for SoapValue {
  fn from(value: i64) -> Self {
    SoapValue::Int(value)
  }
}

/// Build the request envelope for `method` with positional arguments.
///
/// Arguments are named `in0`, `in1`, ... as the Axis service expects.
pub fn request(method: &str, args: &[SoapValue]) -> String {
  let mut out = String::with_capacity(512);
  out.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
  out.push_str(&format!(
    r#"<soapenv:Envelope xmlns:soapenv="{}" xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:soapenc="{}" xmlns:jira="{}" xmlns:beans="{}">"#,
    ENVELOPE_NS, ENCODING_NS, SERVICE_NS, BEANS_NS
  ));
  out.push_str("<soapenv:Body>");
  out.push_str(&format!(
    r#"<jira:{} soapenv:encodingStyle="{}">"#,
    method, ENCODING_NS
  ));
  for (i, arg) in args.iter().enumerate() {
    write_value(&mut out, &format!("in{}", i), arg);
  }
  out.push_str(&format!("</jira:{}>", method));
  out.push_str("</soapenv:Body></soapenv:Envelope>");
  out
}

fn write_value(out: &mut String, name: &str, value: &SoapValue) {
  match value {
    SoapValue::Null => {
      out.push_str(&format!(r#"<{} xsi:nil="true"/>"#, name));
    }
    SoapValue::Str(s) => {
      out.push_str(&format!(
        r#"<{n} xsi:type="{t}">{v}</{n}>"#,
        n = name,
        t = value.xsi_type(),
        v = escape(s.as_str())
      ));
    }
    SoapValue::Int(i) => {
      out.push_str(&format!(
        r#"<{n} xsi:type="{t}">{v}</{n}>"#,
        n = name,
        t = value.xsi_type(),
        v = i
      ));
    }
    SoapValue::Array { item_type, items } => {
      out.push_str(&format!(
        r#"<{} xsi:type="soapenc:Array" soapenc:arrayType="{}[{}]">"#,
        name,
        item_type,
        items.len()
      ));
      for item in items {
        write_value(out, "item", item);
      }
      out.push_str(&format!("</{}>", name));
    }
    SoapValue::Struct { fields, .. } => {
      out.push_str(&format!(r#"<{} xsi:type="{}">"#, name, value.xsi_type()));
      for (field, field_value) in fields {
        write_value(out, field, field_value);
      }
      out.push_str(&format!("</{}>", name));
    }
  }
}
