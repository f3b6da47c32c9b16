// SPDX-FileCopyrightText: © 2024 The remotefn authors
// SPDX-License-Identifier: MIT

pub mod receiver;

use remotefn_api::error::RemoteFnError;

/// Correlates one pending synchronous wait to a future asynchronous
/// delivery. Owning the token means owning the single right to consume the
/// delivered payload.
pub struct CallbackToken {
    key: (String, String),
    receiver: tokio::sync::oneshot::Receiver<serde_json::Value>,
}

impl CallbackToken {
    pub fn callback_property(&self) -> &str {
        &self.key.0
    }

    pub fn invocation_id(&self) -> &str {
        &self.key.1
    }
}

/// What happened to one inbound callback delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// A pending token matched and was fulfilled.
    Fulfilled { invocation_id: String },
    /// No pending token matched; late and stray deliveries end up here.
    Unknown,
}

/// Process-wide registry of pending callback tokens, keyed by
/// `(callbackProperty, invocationId)`.
///
/// Registration, fulfillment and revocation are atomic with respect to each
/// other: one lock guards the token map, and fulfillment consumes the
/// registered sender, so a token can be fulfilled at most once. A delivery
/// arriving after revocation finds no sender and is discarded.
#[derive(Default)]
pub struct CallbackRegistry {
    pending: tokio::sync::Mutex<std::collections::HashMap<(String, String), tokio::sync::oneshot::Sender<serde_json::Value>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in an asynchronous result before dispatching the
    /// request that will trigger it.
    pub async fn register(&self, callback_property: &str, invocation_id: &str) -> CallbackToken {
        let key = (callback_property.to_string(), invocation_id.to_string());
        let (sender, receiver) = tokio::sync::oneshot::channel();
        self.pending.lock().await.insert(key.clone(), sender);
        CallbackToken { key, receiver }
    }

    /// Block until the token is fulfilled or `timeout` elapses. On timeout
    /// the token is revoked, so a late delivery can never bind a result
    /// afterwards.
    pub async fn wait(&self, token: CallbackToken, timeout: std::time::Duration) -> Result<serde_json::Value, RemoteFnError> {
        match tokio::time::timeout(timeout, token.receiver).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_)) => Err(RemoteFnError::Transport(format!(
                "callback token for invocation '{}' was revoked",
                token.key.1
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&token.key);
                Err(RemoteFnError::Transport(format!(
                    "callback for invocation '{}' timed out after {:?}",
                    token.key.1, timeout
                )))
            }
        }
    }

    /// Drop a registration without waiting for it, e.g. when the triggering
    /// request itself failed.
    pub async fn revoke(&self, token: &CallbackToken) {
        self.pending.lock().await.remove(&token.key);
    }

    /// Fulfill the pending token registered under `(callback_property,
    /// invocation_id)`. Returns false when no such token is pending (never
    /// registered, already fulfilled, or revoked).
    pub async fn fulfill(&self, callback_property: &str, invocation_id: &str, payload: serde_json::Value) -> bool {
        let key = (callback_property.to_string(), invocation_id.to_string());
        let sender = self.pending.lock().await.remove(&key);
        match sender {
            Some(sender) => {
                if sender.send(payload).is_err() {
                    log::warn!("Discarding callback for invocation '{}': waiter is gone", invocation_id);
                    return false;
                }
                true
            }
            None => {
                log::warn!(
                    "Discarding callback for unknown or revoked invocation '{}'",
                    invocation_id
                );
                false
            }
        }
    }

    /// Route one inbound payload: extract a candidate invocation id at every
    /// callback property with pending tokens and fulfill the first match.
    pub async fn deliver(&self, payload: &serde_json::Value) -> DeliveryOutcome {
        let mut pending = self.pending.lock().await;
        let properties: std::collections::HashSet<String> =
            pending.keys().map(|(property, _)| property.clone()).collect();
        for property in properties {
            if let Some(invocation_id) = extract_id(payload, &property) {
                let key = (property, invocation_id.clone());
                if let Some(sender) = pending.remove(&key) {
                    if sender.send(payload.clone()).is_err() {
                        log::warn!("Discarding callback for invocation '{}': waiter is gone", invocation_id);
                        return DeliveryOutcome::Unknown;
                    }
                    return DeliveryOutcome::Fulfilled { invocation_id };
                }
            }
        }
        DeliveryOutcome::Unknown
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Revoke all pending tokens; waiting invocations observe the revocation
    /// as a transport failure. Called at service teardown.
    pub async fn shutdown(&self) {
        self.pending.lock().await.clear();
    }
}

/// Value at a dot path of the payload, stringified, to be matched against
/// pending invocation ids.
fn extract_id(payload: &serde_json::Value, path: &str) -> Option<String> {
    let mut current = payload;
    for segment in path.split('.').filter(|segment| !segment.is_empty()) {
        current = match current {
            serde_json::Value::Object(map) => map.get(segment)?,
            serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    match current {
        serde_json::Value::String(text) => Some(text.clone()),
        serde_json::Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}
