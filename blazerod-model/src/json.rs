//! Token-kind helpers over `serde_json::Value`
//!
//! The Bedrock formats are polymorphic per field (a vector may be a number, an
//! array or a Molang string, a UV may be an array or an object). Every field
//! reader dispatches on [`JsonKind`] and reports the kind it found on error.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use glam::{Vec2, Vec3};
use serde_json::{Map, Value};

use crate::error::{ModelLoadError, Result};

/// Kind of the next JSON token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    Null,
    Bool,
    Number,
    String,
    Array,
    Object,
}

impl JsonKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }
}

impl fmt::Display for JsonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "boolean",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        };
        f.write_str(name)
    }
}

fn unexpected(field: &'static str, expected: &'static str, value: &Value) -> ModelLoadError {
    ModelLoadError::UnexpectedToken {
        field,
        expected,
        found: JsonKind::of(value),
    }
}

/// Read and parse a JSON file, refusing files larger than `limit` bytes
pub(crate) fn read_json_file(path: &Path, limit: u64) -> Result<Value> {
    let bytes = read_limited(path, limit)?;
    serde_json::from_slice(&bytes).map_err(|source| ModelLoadError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a whole file, refusing files larger than `limit` bytes
pub(crate) fn read_limited(path: &Path, limit: u64) -> Result<Vec<u8>> {
    let io_error = |source| ModelLoadError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_error)?;
    let len = file.metadata().map_err(io_error)?.len();
    if len > limit {
        return Err(ModelLoadError::FileTooLarge {
            path: path.to_path_buf(),
            limit,
        });
    }
    let mut bytes = Vec::with_capacity(len as usize);
    BufReader::new(file)
        .take(limit + 1)
        .read_to_end(&mut bytes)
        .map_err(io_error)?;
    if bytes.len() as u64 > limit {
        return Err(ModelLoadError::FileTooLarge {
            path: path.to_path_buf(),
            limit,
        });
    }
    Ok(bytes)
}

pub(crate) fn object<'a>(value: &'a Value, field: &'static str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| unexpected(field, "object", value))
}

pub(crate) fn array<'a>(value: &'a Value, field: &'static str) -> Result<&'a [Value]> {
    value
        .as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| unexpected(field, "array", value))
}

pub(crate) fn string<'a>(value: &'a Value, field: &'static str) -> Result<&'a str> {
    value.as_str().ok_or_else(|| unexpected(field, "string", value))
}

pub(crate) fn float(value: &Value, field: &'static str) -> Result<f32> {
    value
        .as_f64()
        .map(|v| v as f32)
        .ok_or_else(|| unexpected(field, "number", value))
}

pub(crate) fn int(value: &Value, field: &'static str) -> Result<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|v| v as i64))
            .ok_or_else(|| unexpected(field, "integer", value)),
        _ => Err(unexpected(field, "integer", value)),
    }
}

pub(crate) fn boolean(value: &Value, field: &'static str) -> Result<bool> {
    value.as_bool().ok_or_else(|| unexpected(field, "boolean", value))
}

/// Read a numeric 3-array
pub(crate) fn vec3(value: &Value, field: &'static str) -> Result<Vec3> {
    let items = array(value, field)?;
    if items.len() != 3 {
        return Err(ModelLoadError::InvalidVector(items.len()));
    }
    Ok(Vec3::new(
        float(&items[0], field)?,
        float(&items[1], field)?,
        float(&items[2], field)?,
    ))
}

/// Read a numeric 2-array
pub(crate) fn vec2(value: &Value, field: &'static str) -> Result<Vec2> {
    let items = array(value, field)?;
    if items.len() != 2 {
        return Err(unexpected(field, "2-element array", value));
    }
    Ok(Vec2::new(float(&items[0], field)?, float(&items[1], field)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_of_every_token() {
        assert_eq!(JsonKind::of(&json!(null)), JsonKind::Null);
        assert_eq!(JsonKind::of(&json!(true)), JsonKind::Bool);
        assert_eq!(JsonKind::of(&json!(1.5)), JsonKind::Number);
        assert_eq!(JsonKind::of(&json!("x")), JsonKind::String);
        assert_eq!(JsonKind::of(&json!([])), JsonKind::Array);
        assert_eq!(JsonKind::of(&json!({})), JsonKind::Object);
    }

    #[test]
    fn test_vec3_requires_three_numbers() {
        assert_eq!(vec3(&json!([1, 2, 3]), "pivot").unwrap(), Vec3::new(1.0, 2.0, 3.0));
        assert!(matches!(
            vec3(&json!([1, 2]), "pivot"),
            Err(ModelLoadError::InvalidVector(2))
        ));
        assert!(matches!(
            vec3(&json!("1"), "pivot"),
            Err(ModelLoadError::UnexpectedToken { found: JsonKind::String, .. })
        ));
    }

    #[test]
    fn test_read_limited_rejects_large_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.json");
        std::fs::write(&path, vec![b' '; 64]).unwrap();
        assert!(matches!(
            read_limited(&path, 16),
            Err(ModelLoadError::FileTooLarge { limit: 16, .. })
        ));
        assert_eq!(read_limited(&path, 64).unwrap().len(), 64);
    }
}
