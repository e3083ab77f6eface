//! Plain key-value records produced from decoded remote objects.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{BridgeError, Result};

/// A flattened remote object (issue, project, filter, priority, ...).
pub type Record = Map<String, Value>;

/// Reference data keyed by name.
pub type RecordIndex = BTreeMap<String, Record>;

pub fn into_record(value: Value) -> Result<Record> {
  match value {
    Value::Object(map) => Ok(map),
    other => Err(BridgeError::Protocol(format!(
      "expected a remote object, got {}",
      other
    ))),
  }
}

/// Convert an array return value into records. A missing or nil return is an
/// empty list.
pub fn into_records(value: Option<Value>) -> Result<Vec<Record>> {
  match value {
    None | Some(Value::Null) => Ok(Vec::new()),
    Some(Value::Array(items)) => items.into_iter().map(into_record).collect(),
    Some(Value::Object(map)) => Ok(vec![map]),
    Some(other) => Err(BridgeError::Protocol(format!(
      "expected a list of remote objects, got {}",
      other
    ))),
  }
}

/// Index records by their `name` field. Records without a name are dropped.
pub fn index_by_name(records: Vec<Record>, lowercase: bool) -> RecordIndex {
  records
    .into_iter()
    .filter_map(|record| {
      let name = field(&record, "name")?;
      let name = if lowercase { name.to_lowercase() } else { name };
      Some((name, record))
    })
    .collect()
}

/// Read a scalar field as a string. Numeric ids are rendered as digits.
pub fn field(record: &Record, name: &str) -> Option<String> {
  match record.get(name)? {
    Value::String(s) => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    Value::Bool(b) => Some(b.to_string()),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn record(value: Value) -> Record {
    into_record(value).unwrap()
  }

  #[test]
  fn test_into_records_handles_nil_and_single() {
    assert!(into_records(None).unwrap().is_empty());
    assert!(into_records(Some(Value::Null)).unwrap().is_empty());
    assert_eq!(into_records(Some(json!({"id": "1"}))).unwrap().len(), 1);
    assert!(into_records(Some(json!("oops"))).is_err());
  }

  #[test]
  fn test_index_by_name() {
    let records = vec![
      record(json!({"id": "1", "name": "Blocker"})),
      record(json!({"id": "2"})),
      record(json!({"id": "4", "name": "Minor"})),
    ];
    let index = index_by_name(records.clone(), true);
    assert_eq!(index.keys().collect::<Vec<_>>(), vec!["blocker", "minor"]);

    let exact = index_by_name(records, false);
    assert!(exact.contains_key("Blocker"));
  }

  #[test]
  fn test_field_renders_numbers() {
    let r = record(json!({"id": 10010, "name": "Bug", "subTask": false}));
    assert_eq!(field(&r, "id").as_deref(), Some("10010"));
    assert_eq!(field(&r, "subTask").as_deref(), Some("false"));
    assert_eq!(field(&r, "missing"), None);
  }
}
