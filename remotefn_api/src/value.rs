// SPDX-FileCopyrightText: © 2024 The remotefn authors
// SPDX-License-Identifier: MIT

/// Lexical format of the `date` datatype.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Lexical format of the `dateTime` datatype (ISO-like, millisecond precision).
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

/// The closed set of datatypes a typed value can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataType {
    String,
    Int,
    Long,
    Double,
    Float,
    DateTime,
    Date,
    JsonObject,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Int => "int",
            DataType::Long => "long",
            DataType::Double => "double",
            DataType::Float => "float",
            DataType::DateTime => "dateTime",
            DataType::Date => "date",
            DataType::JsonObject => "jsonObject",
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed literal as read from and written to solution rows: a lexical form
/// plus its declared datatype.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TypedValue {
    pub lexical: String,
    pub data_type: DataType,
}

impl TypedValue {
    pub fn new(lexical: impl Into<String>, data_type: DataType) -> Self {
        Self {
            lexical: lexical.into(),
            data_type,
        }
    }

    pub fn string(lexical: impl Into<String>) -> Self {
        Self::new(lexical, DataType::String)
    }

    pub fn int(value: i32) -> Self {
        Self::new(value.to_string(), DataType::Int)
    }

    pub fn long(value: i64) -> Self {
        Self::new(value.to_string(), DataType::Long)
    }

    pub fn double(value: f64) -> Self {
        Self::new(value.to_string(), DataType::Double)
    }

    pub fn float(value: f32) -> Self {
        Self::new(value.to_string(), DataType::Float)
    }

    pub fn json_object(value: &serde_json::Value) -> Self {
        Self::new(value.to_string(), DataType::JsonObject)
    }
}

impl std::fmt::Display for TypedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{}\"^^{}", self.lexical, self.data_type)
    }
}

/// The host-side representation a typed value converts into before it is
/// rendered into a request or passed to a local function.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Str(String),
    Int(i32),
    Long(i64),
    Double(f64),
    Float(f32),
    Json(serde_json::Value),
}

/// Names one of the [HostValue] variants; used by conversion requests and by
/// local-function parameter declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum HostKind {
    Str,
    Int,
    Long,
    Double,
    Float,
    Json,
}

impl HostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostKind::Str => "string",
            HostKind::Int => "i32",
            HostKind::Long => "i64",
            HostKind::Double => "f64",
            HostKind::Float => "f32",
            HostKind::Json => "json",
        }
    }
}

impl std::fmt::Display for HostKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_config_names() {
        assert_eq!(
            serde_json::to_string(&DataType::DateTime).unwrap(),
            "\"dateTime\""
        );
        assert_eq!(
            serde_json::from_str::<DataType>("\"jsonObject\"").unwrap(),
            DataType::JsonObject
        );
        assert_eq!(serde_json::from_str::<DataType>("\"int\"").unwrap(), DataType::Int);
    }

    #[test]
    fn test_typed_value_constructors() {
        assert_eq!(TypedValue::int(42).lexical, "42");
        assert_eq!(TypedValue::int(42).data_type, DataType::Int);
        let json = serde_json::json!({"a": 1});
        assert_eq!(TypedValue::json_object(&json).lexical, "{\"a\":1}");
    }
}
