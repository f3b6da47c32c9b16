// SPDX-FileCopyrightText: © 2024 The remotefn authors
// SPDX-License-Identifier: MIT

use crate::convert;
use crate::merge;
use remotefn_api::binding::{BindingHost, InputBinding, SolutionRow};
use remotefn_api::config::{ArgumentConfig, RestMethod, ServiceConfig, ServiceTarget};
use remotefn_api::error::RemoteFnError;
use remotefn_api::value::TypedValue;
use remotefn_http::{RenderedBody, RenderedRequest};

/// One batch rendered into a concrete request, together with the rows that
/// actually made it into the payload (in payload order) and any status
/// contribution from render-side conversion failures.
#[derive(Debug)]
pub struct RenderedBatch {
    pub request: RenderedRequest,
    pub usable_rows: Vec<usize>,
    pub status: u16,
}

/// The value of the input bound under `key` for `row`, if any.
pub(crate) fn resolve_value<'a>(
    inputs: &'a std::collections::HashMap<String, InputBinding>,
    key: &str,
    row: &'a SolutionRow,
) -> Option<&'a TypedValue> {
    inputs.get(key).and_then(|binding| binding.resolve(row))
}

/// String form of an input: row value (optionally stripped) or the
/// argument's configured default.
pub(crate) fn resolve_string(
    service: &ServiceConfig,
    inputs: &std::collections::HashMap<String, InputBinding>,
    key: &str,
    row: &SolutionRow,
    apply_strip: bool,
) -> Option<String> {
    let argument = service.argument(key);
    if let Some(value) = resolve_value(inputs, key, row) {
        let strip = if apply_strip {
            argument.and_then(|argument| argument.strip.as_deref())
        } else {
            None
        };
        return Some(convert::strip_value(&value.lexical, strip));
    }
    argument
        .and_then(|argument| argument.default_value.as_ref())
        .map(plain_string)
}

fn plain_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// JSON form of an argument for one row: converted row value, or the
/// configured default, or nothing.
fn resolve_json(
    inputs: &std::collections::HashMap<String, InputBinding>,
    argument: &ArgumentConfig,
    row: &SolutionRow,
) -> Result<Option<serde_json::Value>, RemoteFnError> {
    if let Some(value) = resolve_value(inputs, &argument.key, row) {
        return convert::to_json(value, argument.strip.as_deref()).map(Some);
    }
    Ok(argument.default_value.clone())
}

/// Substitute `{otherArgKey}` placeholders in an argument name with the
/// referenced arguments' resolved values (single pass).
fn substitute_argument_name(
    service: &ServiceConfig,
    inputs: &std::collections::HashMap<String, InputBinding>,
    argument: &ArgumentConfig,
    row: &SolutionRow,
) -> String {
    let pattern = regex::Regex::new(r"\{(?P<arg>[^\{\}]*)\}").unwrap();
    let name = &argument.argument_name;
    let mut result = String::new();
    let mut end = 0;
    for captures in pattern.captures_iter(name) {
        let whole = captures.get(0).unwrap();
        result.push_str(&name[end..whole.start()]);
        let referenced = captures.name("arg").unwrap().as_str();
        let substituted =
            resolve_string(service, inputs, referenced, row, true).unwrap_or_else(|| "null".to_string());
        result.push_str(&substituted);
        end = whole.end();
    }
    result.push_str(&name[end..]);
    result
}

/// Write `render` under every comma-separated dot path of `path_spec`,
/// creating intermediate objects and deep-merging on collisions. An empty
/// path merges into the root.
pub(crate) fn set_node(
    target: &mut serde_json::Value,
    path_spec: &str,
    render: &serde_json::Value,
) -> Result<(), RemoteFnError> {
    for path_name in path_spec.split(',') {
        let segments: Vec<&str> = path_name.split('.').filter(|segment| !segment.is_empty()).collect();
        match segments.split_last() {
            None => {
                if !render.is_object() {
                    return Err(RemoteFnError::Traversal {
                        segment: path_name.to_string(),
                    });
                }
                merge::merge_values(target, render);
            }
            Some((leaf, ancestors)) => {
                let mut current = &mut *target;
                for segment in ancestors {
                    current = descend(current, segment)?;
                }
                write_leaf(current, leaf, render)?;
            }
        }
    }
    Ok(())
}

fn occupied(segment: &str) -> RemoteFnError {
    RemoteFnError::Traversal {
        segment: segment.to_string(),
    }
}

fn descend<'a>(current: &'a mut serde_json::Value, segment: &str) -> Result<&'a mut serde_json::Value, RemoteFnError> {
    match current {
        serde_json::Value::Object(map) => {
            let entry = map
                .entry(segment.to_string())
                .or_insert_with(|| serde_json::json!({}));
            if !entry.is_object() && !entry.is_array() {
                return Err(occupied(segment));
            }
            Ok(entry)
        }
        serde_json::Value::Array(items) => {
            let index = segment.parse::<usize>().map_err(|_| occupied(segment))?;
            while items.len() <= index {
                items.push(serde_json::json!({}));
            }
            if !items[index].is_object() && !items[index].is_array() {
                return Err(occupied(segment));
            }
            Ok(&mut items[index])
        }
        _ => Err(occupied(segment)),
    }
}

fn write_leaf(current: &mut serde_json::Value, segment: &str, render: &serde_json::Value) -> Result<(), RemoteFnError> {
    match current {
        serde_json::Value::Object(map) => {
            match map.get_mut(segment) {
                Some(existing) if merge::mergeable(existing, render) => merge::merge_values(existing, render),
                Some(existing) => *existing = render.clone(),
                None => {
                    map.insert(segment.to_string(), render.clone());
                }
            }
            Ok(())
        }
        serde_json::Value::Array(items) => {
            let index = segment.parse::<usize>().map_err(|_| occupied(segment))?;
            while items.len() < index {
                items.push(serde_json::json!({}));
            }
            if items.len() == index {
                items.push(render.clone());
            } else if merge::mergeable(&items[index], render) {
                merge::merge_values(&mut items[index], render);
            } else {
                items[index] = render.clone();
            }
            Ok(())
        }
        _ => Err(occupied(segment)),
    }
}

fn rest_target(service: &ServiceConfig) -> Result<(String, RestMethod), RemoteFnError> {
    match &service.target {
        ServiceTarget::Rest { url, method } => Ok((url.clone(), *method)),
        ServiceTarget::Local { .. } => Err(RemoteFnError::Configuration(format!(
            "service '{}' has no REST target",
            service.name
        ))),
    }
}

fn base_headers(service: &ServiceConfig, with_accept: bool) -> Vec<(String, String)> {
    let mut headers = Vec::new();
    if with_accept {
        headers.push(("accept".to_string(), "application/json".to_string()));
    }
    if let Some(authentication) = &service.authentication {
        headers.push((authentication.auth_key.clone(), authentication.auth_code.clone()));
    }
    headers
}

/// Render one batch as a query-string GET request. Multi-row batches wrap
/// each row's parameter tuple in parentheses; single-row batches stay flat.
pub fn render_query_request(
    service: &ServiceConfig,
    inputs: &std::collections::HashMap<String, InputBinding>,
    host: &BindingHost,
    batch_rows: &[usize],
) -> Result<RenderedBatch, RemoteFnError> {
    let (url, _) = rest_target(service)?;

    let mut usable_rows = Vec::new();
    let mut row_parameters = Vec::new();
    for &row_index in batch_rows {
        let row = &host.rows()[row_index];
        let mut parameters = Vec::new();
        let mut complete = true;
        for argument in &service.arguments {
            match resolve_string(service, inputs, &argument.key, row, true) {
                Some(value) => parameters.push(format!("{}={}", argument.argument_name, value)),
                None => {
                    if argument.mandatory {
                        let err = RemoteFnError::Resolution {
                            argument: argument.key.clone(),
                        };
                        log::warn!("{}, leaving the whole tuple", err);
                        complete = false;
                        break;
                    }
                }
            }
        }
        if complete {
            usable_rows.push(row_index);
            row_parameters.push(parameters.join("&"));
        }
    }

    let query = match row_parameters.len() {
        0 => String::new(),
        1 => format!("?{}", row_parameters[0]),
        _ => format!("?({})", row_parameters.join(")&(")),
    };

    Ok(RenderedBatch {
        request: RenderedRequest {
            method: RestMethod::Get,
            url: format!("{}{}", url, query),
            body: RenderedBody::None,
            headers: base_headers(service, false),
        },
        usable_rows,
        status: 0,
    })
}

/// Render one batch as a JSON body (single entity or multipart). Rows whose
/// mandatory arguments cannot be resolved are excluded from the payload and
/// from output binding without failing the batch.
pub fn render_json_request(
    service: &ServiceConfig,
    inputs: &std::collections::HashMap<String, InputBinding>,
    host: &BindingHost,
    batch_rows: &[usize],
    invocation_id: &str,
    callback_address: Option<&str>,
) -> Result<RenderedBatch, RemoteFnError> {
    let (url, method) = rest_target(service)?;
    let batched = service.batch > 1;
    if batched && service.input_property.is_none() {
        return Err(RemoteFnError::Configuration(format!(
            "service '{}': cannot use batch mode without inputProperty",
            service.name
        )));
    }

    let mut status = 0;
    let mut usable_rows = Vec::new();
    let mut row_objects = Vec::new();
    for &row_index in batch_rows {
        let row = &host.rows()[row_index];
        let mut row_object = serde_json::json!({});
        let mut complete = true;
        for argument in &service.arguments {
            match resolve_json(inputs, argument, row) {
                Ok(Some(value)) => {
                    let path_spec = substitute_argument_name(service, inputs, argument, row);
                    if let Err(err) = set_node(&mut row_object, &path_spec, &value) {
                        log::warn!("Could not render argument '{}': {}", argument.key, err);
                        status = 500;
                        complete = false;
                        break;
                    }
                }
                Ok(None) => {
                    if argument.mandatory {
                        let err = RemoteFnError::Resolution {
                            argument: argument.key.clone(),
                        };
                        log::warn!("{}, leaving the whole tuple", err);
                        complete = false;
                        break;
                    }
                }
                Err(err) => {
                    log::warn!("Could not convert argument '{}': {}", argument.key, err);
                    status = 500;
                    complete = false;
                    break;
                }
            }
        }
        if complete {
            usable_rows.push(row_index);
            row_objects.push(row_object);
        }
    }

    let mut body = serde_json::json!({});
    {
        let mut leaf = &mut body;
        if let Some(path) = &service.input_property {
            for segment in path.split('.').filter(|segment| !segment.is_empty()) {
                leaf = descend(leaf, segment)?;
            }
            if batched {
                *leaf = serde_json::json!([]);
            }
        }
        for row_object in row_objects {
            if batched {
                match leaf.as_array_mut() {
                    Some(items) => items.push(row_object),
                    None => return Err(occupied("inputProperty")),
                }
            } else {
                merge::merge_values(leaf, &row_object);
            }
        }
    }

    if let Some(path) = &service.invocation_id_property {
        set_node(&mut body, path, &serde_json::json!(invocation_id))?;
    }
    if let Some(path) = &service.callback_property {
        if let Some(address) = callback_address {
            set_node(&mut body, path, &serde_json::json!(address))?;
        }
    }

    let rendered_body = match method {
        RestMethod::PostJson => RenderedBody::Json(body),
        RestMethod::PostJsonMultipart => match body {
            serde_json::Value::Object(map) => {
                RenderedBody::MultipartJson(map.into_iter().collect::<Vec<(String, serde_json::Value)>>())
            }
            _ => {
                return Err(RemoteFnError::Configuration(format!(
                    "service '{}': multipart bodies need a top-level object",
                    service.name
                )))
            }
        },
        RestMethod::Get => {
            return Err(RemoteFnError::Configuration(format!(
                "service '{}': GET cannot carry a JSON body",
                service.name
            )))
        }
    };

    Ok(RenderedBatch {
        request: RenderedRequest {
            method,
            url,
            body: rendered_body,
            headers: base_headers(service, true),
        },
        usable_rows,
        status,
    })
}
