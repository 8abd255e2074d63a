use serde_json::Value;

use crate::error::{MeshError, MeshResult};

/// Dot-path navigation and mutation over a nested JSON configuration
/// document.
///
/// Paths are split on `.`. Every intermediate segment must resolve to an
/// object; a missing or non-object intermediate fails with
/// [`MeshError::PathNotFound`] and never silently creates structure. The
/// caller re-serializes and persists the whole document as one atomic entity
/// update.
///
/// Writes preserve the JSON scalar kind of the value they replace: assigning
/// `"5"` over a number stores the number 5, over a string stores `"5"`. A
/// path whose terminal field does not exist yet stores the best-parse scalar
/// of the incoming text.

/// Reads the value at `path`, rendered in string form.
pub fn read_path(doc: &Value, path: &str) -> MeshResult<String> {
    let parent = descend(doc, path)?;
    let terminal = last_segment(path);
    match parent.get(terminal) {
        Some(value) => Ok(render_scalar(value)),
        None => Err(MeshError::PathNotFound(format!(
            "no value at '{}'",
            path
        ))),
    }
}

/// Replaces the value at `path` with `value`, preserving the scalar kind of
/// any existing value at that path.
pub fn write_path(doc: &mut Value, path: &str, value: &str) -> MeshResult<()> {
    // Immutable descent first so a failed traversal leaves the document
    // untouched.
    descend(doc, path)?;

    let terminal = last_segment(path).to_string();
    let parent = descend_mut(doc, path)?;
    let coerced = coerce(parent.get(&terminal), value);

    // Remove and re-insert rather than assign in place, matching the
    // full-field-replace persistence contract.
    let map = parent
        .as_object_mut()
        .ok_or_else(|| MeshError::PathNotFound(format!("'{}' is not an object", path)))?;
    map.remove(&terminal);
    map.insert(terminal, coerced);
    Ok(())
}

/// Walks all but the last path segment, returning the terminal's parent.
fn descend<'a>(doc: &'a Value, path: &str) -> MeshResult<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = doc;
    for segment in &segments[..segments.len() - 1] {
        let object = current.as_object().ok_or_else(|| {
            MeshError::PathNotFound(format!("'{}' is not an object in path '{}'", segment, path))
        })?;
        current = object.get(*segment).ok_or_else(|| {
            MeshError::PathNotFound(format!("missing segment '{}' in path '{}'", segment, path))
        })?;
    }
    if !current.is_object() {
        return Err(MeshError::PathNotFound(format!(
            "terminal parent of '{}' is not an object",
            path
        )));
    }
    Ok(current)
}

fn descend_mut<'a>(doc: &'a mut Value, path: &str) -> MeshResult<&'a mut Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = doc;
    for segment in &segments[..segments.len() - 1] {
        current = current
            .as_object_mut()
            .and_then(|object| object.get_mut(*segment))
            .ok_or_else(|| {
                MeshError::PathNotFound(format!(
                    "missing segment '{}' in path '{}'",
                    segment, path
                ))
            })?;
    }
    Ok(current)
}

fn last_segment(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}

/// Renders a value the way a caller reading a single property expects:
/// strings without quotes, other scalars and composites as JSON text.
fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parses the incoming text into the kind of the value it replaces, falling
/// back to a JSON string when the text does not parse as that kind.
fn coerce(existing: Option<&Value>, value: &str) -> Value {
    match existing {
        Some(Value::Number(_)) => parse_number(value)
            .unwrap_or_else(|| Value::String(value.to_string())),
        Some(Value::Bool(_)) => match value {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => Value::String(value.to_string()),
        },
        Some(Value::String(_)) => Value::String(value.to_string()),
        // Null and fresh fields take the best-parse scalar of the text.
        _ => best_parse(value),
    }
}

fn parse_number(value: &str) -> Option<Value> {
    if let Ok(n) = value.parse::<i64>() {
        return Some(Value::from(n));
    }
    if let Ok(n) = value.parse::<f64>() {
        return serde_json::Number::from_f64(n).map(Value::Number);
    }
    None
}

fn best_parse(value: &str) -> Value {
    match value {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" => return Value::Null,
        _ => {}
    }
    parse_number(value).unwrap_or_else(|| Value::String(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn read_nested_value() {
        let doc = json!({"a": {"b": {"c": 5}}});
        assert_eq!(read_path(&doc, "a.b.c").unwrap(), "5");
    }

    #[test]
    fn write_then_read_round_trips() {
        let mut doc = json!({"a": {"b": {"c": 1}}});
        write_path(&mut doc, "a.b.c", "5").unwrap();
        assert_eq!(read_path(&doc, "a.b.c").unwrap(), "5");
    }

    #[test]
    fn write_preserves_scalar_kind() {
        let mut doc = json!({"elements": 4, "learn": true, "label": "x"});
        write_path(&mut doc, "elements", "2").unwrap();
        write_path(&mut doc, "learn", "false").unwrap();
        write_path(&mut doc, "label", "7").unwrap();
        assert_eq!(doc["elements"], json!(2));
        assert_eq!(doc["learn"], json!(false));
        assert_eq!(doc["label"], json!("7"));
    }

    #[test]
    fn missing_intermediate_fails_without_mutation() {
        let mut doc = json!({"a": {"b": 1}});
        let before = doc.clone();
        let err = write_path(&mut doc, "missing.path", "1").unwrap_err();
        assert!(matches!(err, MeshError::PathNotFound(_)));
        assert_eq!(doc, before);
    }

    #[test]
    fn non_object_intermediate_fails() {
        let doc = json!({"a": 3});
        let err = read_path(&doc, "a.b.c").unwrap_err();
        assert!(matches!(err, MeshError::PathNotFound(_)));
    }

    #[test]
    fn missing_terminal_fails_on_read() {
        let doc = json!({"a": {"b": 1}});
        let err = read_path(&doc, "a.x").unwrap_err();
        assert!(matches!(err, MeshError::PathNotFound(_)));
    }

    #[test]
    fn single_segment_path() {
        let mut doc = json!({"elements": 1});
        write_path(&mut doc, "elements", "9").unwrap();
        assert_eq!(read_path(&doc, "elements").unwrap(), "9");
    }

    #[test]
    fn fresh_terminal_takes_best_parse() {
        let mut doc = json!({"a": {}});
        write_path(&mut doc, "a.rate", "0.5").unwrap();
        assert_eq!(doc["a"]["rate"], json!(0.5));
    }
}
