// SPDX-FileCopyrightText: © 2024 The remotefn authors
// SPDX-License-Identifier: MIT

/// Aggregate outcome of one invocation as reported back to the query engine.
///
/// `status` is HTTP-style: 0 when no batch touched it, the worst status code
/// seen across batches otherwise, with 500 reserved for internal/exception
/// conditions.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationReport {
    pub status: u16,
    pub started: chrono::DateTime<chrono::Utc>,
    pub finished: chrono::DateTime<chrono::Utc>,
}

impl InvocationReport {
    /// Whether every dispatched batch completed in the 2xx range (or no
    /// batch was dispatched at all).
    pub fn is_success(&self) -> bool {
        self.status == 0 || (200..300).contains(&self.status)
    }

    pub fn duration(&self) -> chrono::Duration {
        self.finished - self.started
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_success() {
        let now = chrono::Utc::now();
        let report = |status| InvocationReport {
            status,
            started: now,
            finished: now,
        };
        assert!(report(0).is_success());
        assert!(report(200).is_success());
        assert!(!report(404).is_success());
        assert!(!report(500).is_success());
    }
}
