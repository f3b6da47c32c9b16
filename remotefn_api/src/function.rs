// SPDX-FileCopyrightText: © 2024 The remotefn authors
// SPDX-License-Identifier: MIT

use crate::value::{HostKind, HostValue};

/// One declared parameter of a local function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: HostKind,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, kind: HostKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// A local routine callable in place of a REST service. Implementations are
/// registered ahead of time under a `(class, method)` identifier pair; the
/// engine resolves the identifier once per invocation and calls `invoke`
/// once per row with the converted argument values in parameter order.
pub trait LocalFunction: Send + Sync {
    fn parameters(&self) -> &[ParameterSpec];
    fn invoke(&self, arguments: Vec<HostValue>) -> anyhow::Result<serde_json::Value>;
}

/// Lookup table from `(class, method)` identifiers to local functions,
/// populated at startup.
#[derive(Default)]
pub struct FunctionRegistry {
    functions: std::collections::HashMap<(String, String), std::sync::Arc<dyn LocalFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        class_name: impl Into<String>,
        method_name: impl Into<String>,
        function: std::sync::Arc<dyn LocalFunction>,
    ) {
        self.functions
            .insert((class_name.into(), method_name.into()), function);
    }

    pub fn resolve(&self, class_name: &str, method_name: &str) -> Option<std::sync::Arc<dyn LocalFunction>> {
        self.functions
            .get(&(class_name.to_string(), method_name.to_string()))
            .cloned()
    }
}
