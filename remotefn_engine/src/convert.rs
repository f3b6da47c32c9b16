// SPDX-FileCopyrightText: © 2024 The remotefn authors
// SPDX-License-Identifier: MIT

use remotefn_api::error::RemoteFnError;
use remotefn_api::value::{DataType, HostKind, HostValue, TypedValue, DATE_FORMAT, DATE_TIME_FORMAT};
use remotefn_http::NodeRef;

/// Apply the strip marker: everything up to and including its last
/// occurrence is removed; a value without the marker passes unchanged.
pub fn strip_value(lexical: &str, strip: Option<&str>) -> String {
    match strip {
        Some(marker) => match lexical.rfind(marker) {
            Some(position) => lexical[position + marker.len()..].to_string(),
            None => lexical.to_string(),
        },
        None => lexical.to_string(),
    }
}

fn conversion_error(value: &str, target: &str, data_type: DataType) -> RemoteFnError {
    RemoteFnError::Conversion {
        value: value.to_string(),
        target: target.to_string(),
        data_type: data_type.as_str().to_string(),
    }
}

/// Convert a typed value into the host representation a request parameter or
/// local-function argument needs.
pub fn to_host(value: &TypedValue, kind: HostKind, strip: Option<&str>) -> Result<HostValue, RemoteFnError> {
    let lexical = strip_value(&value.lexical, strip);
    match kind {
        HostKind::Str => Ok(HostValue::Str(lexical)),
        HostKind::Int => lexical
            .parse::<i32>()
            .map(HostValue::Int)
            .map_err(|_| conversion_error(&lexical, "i32", value.data_type)),
        HostKind::Long => lexical
            .parse::<i64>()
            .map(HostValue::Long)
            .map_err(|_| conversion_error(&lexical, "i64", value.data_type)),
        HostKind::Double => lexical
            .parse::<f64>()
            .map(HostValue::Double)
            .map_err(|_| conversion_error(&lexical, "f64", value.data_type)),
        HostKind::Float => lexical
            .parse::<f32>()
            .map(HostValue::Float)
            .map_err(|_| conversion_error(&lexical, "f32", value.data_type)),
        HostKind::Json => to_json_literal(&lexical, value.data_type),
    }
}

/// Convert a typed value into the JSON node rendered into a request body.
pub fn to_json(value: &TypedValue, strip: Option<&str>) -> Result<serde_json::Value, RemoteFnError> {
    let lexical = strip_value(&value.lexical, strip);
    match to_json_literal(&lexical, value.data_type)? {
        HostValue::Json(json) => Ok(json),
        _ => unreachable!("to_json_literal always yields a json host value"),
    }
}

fn to_json_literal(lexical: &str, data_type: DataType) -> Result<HostValue, RemoteFnError> {
    let json = match data_type {
        DataType::String => serde_json::Value::String(lexical.to_string()),
        DataType::Int => serde_json::Value::from(
            lexical
                .parse::<i32>()
                .map_err(|_| conversion_error(lexical, "json number", data_type))?,
        ),
        DataType::Long => serde_json::Value::from(
            lexical
                .parse::<i64>()
                .map_err(|_| conversion_error(lexical, "json number", data_type))?,
        ),
        DataType::Double => serde_json::Number::from_f64(
            lexical
                .parse::<f64>()
                .map_err(|_| conversion_error(lexical, "json number", data_type))?,
        )
        .map(serde_json::Value::Number)
        .ok_or_else(|| conversion_error(lexical, "json number", data_type))?,
        DataType::Float => serde_json::Number::from_f64(
            lexical
                .parse::<f32>()
                .map_err(|_| conversion_error(lexical, "json number", data_type))? as f64,
        )
        .map(serde_json::Value::Number)
        .ok_or_else(|| conversion_error(lexical, "json number", data_type))?,
        DataType::DateTime => serde_json::Value::String(normalize_date_time(lexical, data_type)?),
        DataType::Date => serde_json::Value::String(normalize_date(lexical, data_type)?),
        DataType::JsonObject => {
            // Embedded literal line-feed escapes are stripped before parsing.
            let representation = lexical.replace("\\x0A", "");
            serde_json::from_str(&representation).map_err(|_| conversion_error(lexical, "json object", data_type))?
        }
    };
    Ok(HostValue::Json(json))
}

fn normalize_date_time(lexical: &str, data_type: DataType) -> Result<String, RemoteFnError> {
    chrono::DateTime::parse_from_rfc3339(lexical)
        .map(|parsed| parsed.format(DATE_TIME_FORMAT).to_string())
        .map_err(|_| conversion_error(lexical, "dateTime", data_type))
}

fn normalize_date(lexical: &str, data_type: DataType) -> Result<String, RemoteFnError> {
    chrono::NaiveDate::parse_from_str(lexical, DATE_FORMAT)
        .map(|parsed| parsed.format(DATE_FORMAT).to_string())
        .map_err(|_| conversion_error(lexical, "date", data_type))
}

/// Extract a typed output literal from a result node: traverse the configured
/// dot path, then coerce the reached node to the declared datatype.
pub fn node_to_value(node: NodeRef<'_>, path: Option<&str>, data_type: DataType) -> Result<TypedValue, RemoteFnError> {
    let reached = match path {
        Some(path) => node.traverse(path)?,
        None => node,
    };
    let text = reached.to_text();
    let value = match data_type {
        DataType::String => TypedValue::string(text),
        DataType::JsonObject => TypedValue::new(text, DataType::JsonObject),
        DataType::Int => TypedValue::int(
            text.parse::<i32>()
                .map_err(|_| conversion_error(&text, "i32", data_type))?,
        ),
        DataType::Long => TypedValue::long(
            text.parse::<i64>()
                .map_err(|_| conversion_error(&text, "i64", data_type))?,
        ),
        DataType::Double => TypedValue::double(
            text.parse::<f64>()
                .map_err(|_| conversion_error(&text, "f64", data_type))?,
        ),
        DataType::Float => TypedValue::float(
            text.parse::<f32>()
                .map_err(|_| conversion_error(&text, "f32", data_type))?,
        ),
        DataType::DateTime => TypedValue::new(normalize_date_time(&text, data_type)?, DataType::DateTime),
        DataType::Date => TypedValue::new(normalize_date(&text, data_type)?, DataType::Date),
    };
    Ok(value)
}
