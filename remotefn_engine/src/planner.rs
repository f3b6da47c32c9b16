// SPDX-FileCopyrightText: © 2024 The remotefn authors
// SPDX-License-Identifier: MIT

use crate::render;
use remotefn_api::binding::{BindingHost, InputBinding};
use remotefn_api::config::ServiceConfig;

/// Group the host's rows into batches, returned as row-index groups.
///
/// Batch-group arguments take precedence: rows with identical stripped
/// string values of all group arguments land in the same batch, preserving
/// encounter order within a group. Otherwise a batch size above 1 chunks the
/// rows sequentially, and a batch size of 1 yields singleton batches. Order
/// across groups is not significant; order within a group is, because the
/// demultiplexer may index results by in-batch position.
pub fn produce_batches(
    service: &ServiceConfig,
    inputs: &std::collections::HashMap<String, InputBinding>,
    host: &BindingHost,
) -> Vec<Vec<usize>> {
    let group_arguments = service.batch_group_arguments();

    if !group_arguments.is_empty() {
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut keys: std::collections::HashMap<Vec<Option<String>>, usize> = std::collections::HashMap::new();
        for (row_index, row) in host.rows().iter().enumerate() {
            let key: Vec<Option<String>> = group_arguments
                .iter()
                .map(|argument| render::resolve_string(service, inputs, &argument.key, row, true))
                .collect();
            match keys.get(&key) {
                Some(&group_index) => groups[group_index].push(row_index),
                None => {
                    keys.insert(key, groups.len());
                    groups.push(vec![row_index]);
                }
            }
        }
        return groups;
    }

    if service.batch > 1 {
        let size = service.batch as usize;
        let mut batches: Vec<Vec<usize>> = Vec::new();
        for row_index in 0..host.len() {
            if row_index % size == 0 {
                batches.push(Vec::new());
            }
            if let Some(batch) = batches.last_mut() {
                batch.push(row_index);
            }
        }
        return batches;
    }

    (0..host.len()).map(|row_index| vec![row_index]).collect()
}
