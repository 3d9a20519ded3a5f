//! Lookup and assignment over JSON-like attribute bags.

use crate::resolver::{DataPath, PathError, Segment};
use serde_json::{Map, Value};

/// How many nulls `set_value` will pad an array with to reach an index.
pub const MAX_INDEX_PADDING: usize = 1024;

/// Follow `path` through `data`. Any missing key, out-of-range index or
/// non-container along the way yields `None`.
pub fn lookup<'a>(data: &'a Value, path: &DataPath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(data, |current, segment| step(current, segment))
}

fn step<'a>(current: &'a Value, segment: &Segment) -> Option<&'a Value> {
    let object = current.as_object()?;
    match segment {
        Segment::Key(key) => object.get(key),
        Segment::Index { key, index } => object.get(key)?.as_array()?.get(*index),
    }
}

/// Assign `value` at `path`, creating missing intermediate objects and
/// padding arrays with nulls up to [`MAX_INDEX_PADDING`]. Existing non-container values are never
/// overwritten to make room; that is reported as a type mismatch.
pub fn set_value(data: &mut Value, path: &DataPath, value: Value) -> Result<(), PathError> {
    let (last, parents) = path.segments().split_last().ok_or(PathError::Empty)?;

    let mut current = data;
    for segment in parents {
        current = slot_mut(current, segment)?;
    }

    *slot_mut(current, last)? = value;
    Ok(())
}

fn slot_mut<'a>(current: &'a mut Value, segment: &Segment) -> Result<&'a mut Value, PathError> {
    let object = object_mut(current, segment)?;

    match segment {
        Segment::Key(key) => Ok(object.entry(key.clone()).or_insert(Value::Null)),
        Segment::Index { key, index } => {
            let entry = object
                .entry(key.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            if entry.is_null() {
                *entry = Value::Array(Vec::new());
            }

            let found = type_name(entry);
            let Value::Array(items) = entry else {
                return Err(PathError::TypeMismatch {
                    segment: segment.to_string(),
                    found,
                });
            };
            if items.len() <= *index {
                let len = index
                    .checked_add(1)
                    .filter(|len| len - items.len() <= MAX_INDEX_PADDING)
                    .ok_or_else(|| PathError::IndexTooLarge {
                        segment: segment.to_string(),
                    })?;
                items.resize(len, Value::Null);
            }
            Ok(&mut items[*index])
        }
    }
}

fn object_mut<'a>(
    current: &'a mut Value,
    segment: &Segment,
) -> Result<&'a mut Map<String, Value>, PathError> {
    if current.is_null() {
        *current = Value::Object(Map::new());
    }

    let found = type_name(current);
    match current {
        Value::Object(object) => Ok(object),
        _ => Err(PathError::TypeMismatch {
            segment: segment.to_string(),
            found,
        }),
    }
}

/// String form used in conditions and inventory lines. Null renders empty.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::String(_) => "string",
        Value::Number(_) => "number",
        Value::Bool(_) => "boolean",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
        Value::Null => "null",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn path(raw: &str) -> DataPath {
        DataPath::parse(raw).unwrap()
    }

    #[test]
    fn test_lookup_nested_keys() {
        let data = json!({"a": {"b": {"c": 5}}});
        assert_eq!(lookup(&data, &path("a/b/c")), Some(&json!(5)));
        assert_eq!(lookup(&data, &path("a/b")), Some(&json!({"c": 5})));
        assert_eq!(lookup(&data, &path("a/x/c")), None);
    }

    #[test]
    fn test_lookup_array_index() {
        let data = json!({"disks": [{"name": "sda"}, {"name": "sdb"}]});
        assert_eq!(lookup(&data, &path("disks[1]/name")), Some(&json!("sdb")));
        assert_eq!(lookup(&data, &path("disks[2]/name")), None);
    }

    #[test]
    fn test_lookup_through_scalar_is_absent() {
        let data = json!({"a": "text", "list": 3});
        assert_eq!(lookup(&data, &path("a/b")), None);
        assert_eq!(lookup(&data, &path("list[0]")), None);
    }

    #[test]
    fn test_set_creates_intermediates() {
        let mut data = json!({});
        set_value(&mut data, &path("rebar/ntp/servers[1]"), json!("10.0.0.1")).unwrap();
        assert_eq!(data, json!({"rebar": {"ntp": {"servers": [null, "10.0.0.1"]}}}));
    }

    #[test]
    fn test_set_overwrites_leaf() {
        let mut data = json!({"a": {"b": 1, "keep": true}});
        set_value(&mut data, &path("a/b"), json!([1, 2])).unwrap();
        assert_eq!(data, json!({"a": {"b": [1, 2], "keep": true}}));
    }

    #[test]
    fn test_set_refuses_to_clobber_scalars() {
        let mut data = json!({"a": "text"});
        let err = set_value(&mut data, &path("a/b"), json!(1)).unwrap_err();
        assert_eq!(
            err,
            PathError::TypeMismatch {
                segment: "b".to_string(),
                found: "string"
            }
        );
        assert_eq!(data, json!({"a": "text"}));
    }

    #[test]
    fn test_set_rejects_unreasonable_index() {
        let mut data = json!({"a": [1]});
        for raw in ["a[18446744073709551615]", "a[1000000000000]"] {
            let err = set_value(&mut data, &path(raw), json!(2)).unwrap_err();
            assert!(matches!(err, PathError::IndexTooLarge { .. }), "{raw}: {err}");
        }
        assert_eq!(data, json!({"a": [1]}));
    }

    #[test]
    fn test_set_pads_up_to_limit() {
        let mut data = json!({});
        let raw = format!("a[{}]", MAX_INDEX_PADDING - 1);
        set_value(&mut data, &path(&raw), json!(true)).unwrap();
        let items = data["a"].as_array().unwrap();
        assert_eq!(items.len(), MAX_INDEX_PADDING);
        assert_eq!(items[MAX_INDEX_PADDING - 1], json!(true));
    }

    #[test]
    fn test_value_to_string() {
        assert_eq!(value_to_string(&json!("x")), "x");
        assert_eq!(value_to_string(&json!(5)), "5");
        assert_eq!(value_to_string(&json!(true)), "true");
        assert_eq!(value_to_string(&Value::Null), "");
        assert_eq!(value_to_string(&json!(["a"])), "[\"a\"]");
    }
}
