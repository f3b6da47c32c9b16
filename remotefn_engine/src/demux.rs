// SPDX-FileCopyrightText: © 2024 The remotefn authors
// SPDX-License-Identifier: MIT

use crate::convert;
use crate::render;
use remotefn_api::binding::{BindingHost, InputBinding, SolutionRow};
use remotefn_api::config::ServiceConfig;
use remotefn_api::error::RemoteFnError;
use remotefn_api::value::{DataType, TypedValue};
use remotefn_http::{NodeRef, ResultNode};

/// Map one batch's parsed result onto its rows and bind the declared
/// outputs. Returns the status contribution of this step: 0 when clean, 500
/// when any row or output failed. Correlation misses are not failures: the
/// affected row simply stays unbound, which callers rely on for sparse
/// optional outputs.
pub fn bind_batch_outputs(
    service: &ServiceConfig,
    inputs: &std::collections::HashMap<String, InputBinding>,
    outputs: &[(String, String)],
    result: &ResultNode,
    host: &mut BindingHost,
    batch_rows: &[usize],
) -> u16 {
    let root = match &service.result.output_property {
        Some(path) => match result.as_ref().traverse(path) {
            Ok(node) => node,
            Err(err) => {
                log::warn!("Could not traverse output property '{}': {}", path, err);
                return 500;
            }
        },
        None => result.as_ref(),
    };

    let mut status = 0;
    let multi_row = batch_rows.len() > 1;
    for (position, &row_index) in batch_rows.iter().enumerate() {
        let element = if let Some(correlation) = &service.result.correlation_input {
            let key = render::resolve_string(service, inputs, correlation, &host.rows()[row_index], false);
            let key = match key {
                Some(key) => key,
                None => {
                    log::debug!("Row {} has no value for correlation input '{}', skipping", row_index, correlation);
                    continue;
                }
            };
            match select_by_key(service, root, &key) {
                Ok(Some(element)) => element,
                Ok(None) => {
                    log::debug!("No result element with key '{}', leaving row {} unbound", key, row_index);
                    continue;
                }
                Err(err) => {
                    log::warn!("Could not select result element for key '{}': {}", key, err);
                    status = 500;
                    continue;
                }
            }
        } else if multi_row {
            match root.index(position) {
                Ok(element) => element,
                Err(err) => {
                    log::warn!("Could not index result element {}: {}", position, err);
                    status = 500;
                    continue;
                }
            }
        } else {
            root
        };

        let row = &mut host.rows_mut()[row_index];
        status = status.max(bind_row_outputs(service, outputs, element, row));
    }
    status
}

/// Select the element of a collection-shaped result matching a correlation
/// key: by `resultIdProperty` equality when declared, by numeric index
/// otherwise. A non-collection result is used whole. `Ok(None)` is the
/// lenient id-lookup miss.
fn select_by_key<'a>(
    service: &ServiceConfig,
    root: NodeRef<'a>,
    key: &str,
) -> Result<Option<NodeRef<'a>>, RemoteFnError> {
    let elements = match root.elements() {
        Some(elements) => elements,
        None => return Ok(Some(root)),
    };
    match &service.result.result_id_property {
        Some(id_path) => {
            for element in elements {
                if let Ok(id_node) = element.traverse(id_path) {
                    if id_node.to_text() == key {
                        return Ok(Some(element));
                    }
                }
            }
            Ok(None)
        }
        None => {
            let index = key.parse::<usize>().map_err(|_| RemoteFnError::Conversion {
                value: key.to_string(),
                target: "collection index".to_string(),
                data_type: DataType::String.as_str().to_string(),
            })?;
            elements
                .get(index)
                .copied()
                .map(Some)
                .ok_or(RemoteFnError::Traversal {
                    segment: key.to_string(),
                })
        }
    }
}

fn bind_row_outputs(
    service: &ServiceConfig,
    outputs: &[(String, String)],
    element: NodeRef<'_>,
    row: &mut SolutionRow,
) -> u16 {
    let mut status = 0;
    for (variable, output_key) in outputs {
        let collective = service.result.result_name.as_deref() == Some(output_key.as_str());
        let converted = if collective {
            Ok(TypedValue::new(element.to_text(), DataType::JsonObject))
        } else {
            match service.result.outputs.get(output_key) {
                Some(output) => convert::node_to_value(element, output.path.as_deref(), output.data_type),
                None => Err(RemoteFnError::Configuration(format!(
                    "no output specification for '{}'",
                    output_key
                ))),
            }
        };
        match converted {
            Ok(value) => row.bind(variable.clone(), value),
            Err(err) => {
                log::warn!("Could not bind output '{}': {}", output_key, err);
                status = 500;
            }
        }
    }
    status
}
