// SPDX-FileCopyrightText: © 2024 The remotefn authors
// SPDX-License-Identifier: MIT

/// Failure classes of one invocation.
///
/// Only [RemoteFnError::Configuration] may abort a whole invocation. All the
/// other classes are scoped to a single row, output or batch: the engine logs
/// them, folds them into the aggregate status code and keeps going, so that
/// one broken row cannot prevent its siblings from being bound.
#[derive(Debug, thiserror::Error)]
pub enum RemoteFnError {
    #[error("invalid service configuration: {0}")]
    Configuration(String),
    #[error("mandatory argument '{argument}' has no binding for this row")]
    Resolution { argument: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("cannot convert '{value}' to {target} (declared datatype {data_type})")]
    Conversion {
        value: String,
        target: String,
        data_type: String,
    },
    #[error("no such path segment '{segment}' under the result node")]
    Traversal { segment: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_identify_the_failing_piece() {
        let err = RemoteFnError::Conversion {
            value: "abc".to_string(),
            target: "i32".to_string(),
            data_type: "int".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("abc"));
        assert!(msg.contains("i32"));
        assert!(msg.contains("int"));

        let err = RemoteFnError::Resolution {
            argument: "vin".to_string(),
        };
        assert!(err.to_string().contains("vin"));
    }
}
