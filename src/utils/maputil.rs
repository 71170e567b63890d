//! Path-based access to nested value maps
//!
//! Values bound to tasks, configuration trees and cached task outputs are all
//! `serde_json::Value` trees keyed by strings. Path segments treat `-` and `_`
//! as the same character, so `foo-bar` and `foo_bar` address one entry.

use crate::error::{ConfigError, ConfigResult, ResolutionError};
use serde_json::{Map, Number, Value};

/// Canonical form of a path segment
pub fn normalize_key(key: &str) -> String {
    key.replace('-', "_")
}

/// Split a dotted path into its segments
pub fn split_path(path: &str) -> Vec<&str> {
    path.split('.').filter(|s| !s.is_empty()).collect()
}

fn find_key<'m>(map: &'m Map<String, Value>, key: &str) -> Option<(&'m String, &'m Value)> {
    if let Some(entry) = map.get_key_value(key) {
        return Some(entry);
    }
    let wanted = normalize_key(key);
    map.iter().find(|(k, _)| normalize_key(k) == wanted)
}

/// Look up the value at `path`, returning `None` when any prefix is absent
pub fn get_value_at_path<'v>(
    root: &'v Value,
    path: &[&str],
) -> Result<Option<&'v Value>, ResolutionError> {
    let mut current = root;
    for (depth, segment) in path.iter().enumerate() {
        let map = match current {
            Value::Object(map) => map,
            Value::Null => return Ok(None),
            _ => {
                return Err(ResolutionError::NotAMap {
                    path: path[..depth].join("."),
                })
            }
        };
        match find_key(map, segment) {
            Some((_, value)) => current = value,
            None => return Ok(None),
        }
    }
    Ok(Some(current))
}

/// Look up the value at `path` and render scalar leaves as strings
pub fn get_string_at_path(root: &Value, path: &[&str]) -> Result<Option<String>, ResolutionError> {
    match get_value_at_path(root, path)? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => scalar_to_string(value).map(Some).ok_or_else(|| {
            ResolutionError::InvalidValue {
                input: path.join("."),
                kind: "string".to_string(),
                value: value.to_string(),
            }
        }),
    }
}

/// Canonical string form of a scalar value
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Store `value` at `path`, creating intermediate maps as needed
pub fn set_value_at_path(
    root: &mut Map<String, Value>,
    path: &[&str],
    value: Value,
) -> Result<(), ResolutionError> {
    let (last, parents) = match path.split_last() {
        Some(split) => split,
        None => return Ok(()),
    };

    let mut current = root;
    for (depth, segment) in parents.iter().enumerate() {
        let key = find_key(current, segment)
            .map(|(k, _)| k.clone())
            .unwrap_or_else(|| segment.to_string());
        let entry = current
            .entry(key)
            .or_insert_with(|| Value::Object(Map::new()));
        if entry.is_null() {
            *entry = Value::Object(Map::new());
        }
        current = match entry {
            Value::Object(map) => map,
            _ => {
                return Err(ResolutionError::NotAMap {
                    path: path[..=depth].join("."),
                })
            }
        };
    }

    let key = find_key(current, last)
        .map(|(k, _)| k.clone())
        .unwrap_or_else(|| last.to_string());
    current.insert(key, value);
    Ok(())
}

/// Recursively merge `src` into `dst`; `src` wins on conflicts.
///
/// Nested maps are merged key by key. Sequences and scalars replace outright.
pub fn deep_merge(dst: &mut Value, src: Value) {
    match (dst, src) {
        (Value::Object(dst_map), Value::Object(src_map)) => {
            for (key, src_value) in src_map {
                let existing = find_key(dst_map, &key).map(|(k, _)| k.clone());
                match existing {
                    Some(k) => {
                        if let Some(dst_value) = dst_map.get_mut(&k) {
                            deep_merge(dst_value, src_value);
                        }
                    }
                    None => {
                        dst_map.insert(key, src_value);
                    }
                }
            }
        }
        (dst, src) => *dst = src,
    }
}

/// Convert a YAML tree into a string-keyed JSON tree.
///
/// Fails when a mapping key is not a string.
pub fn cast_keys_to_strings(value: serde_yaml::Value) -> ConfigResult<Value> {
    Ok(match value {
        serde_yaml::Value::Null => Value::Null,
        serde_yaml::Value::Bool(b) => Value::Bool(b),
        serde_yaml::Value::Number(n) => yaml_number(&n),
        serde_yaml::Value::String(s) => Value::String(s),
        serde_yaml::Value::Sequence(seq) => Value::Array(
            seq.into_iter()
                .map(cast_keys_to_strings)
                .collect::<ConfigResult<Vec<_>>>()?,
        ),
        serde_yaml::Value::Mapping(mapping) => {
            let mut map = Map::new();
            for (key, value) in mapping {
                let key = match key {
                    serde_yaml::Value::String(s) => s,
                    other => {
                        return Err(ConfigError::Invalid(format!(
                            "map key {:?} is not a string",
                            other
                        )))
                    }
                };
                map.insert(key, cast_keys_to_strings(value)?);
            }
            Value::Object(map)
        }
        serde_yaml::Value::Tagged(tagged) => cast_keys_to_strings(tagged.value)?,
    })
}

fn yaml_number(n: &serde_yaml::Number) -> Value {
    if let Some(i) = n.as_i64() {
        Value::Number(i.into())
    } else if let Some(u) = n.as_u64() {
        Value::Number(u.into())
    } else {
        n.as_f64()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}
