//! Inbound frame classification and routing.
//!
//! The dispatcher sits between the connection loop and the
//! [`NotificationStore`]: it turns one raw text frame into zero or more
//! `add` calls, and nothing else. It holds no state across frames.
//!
//! # Classification
//!
//! - Frames that fail to parse as JSON are dropped (foreign or malformed
//!   traffic, not a fatal condition).
//! - A JSON array is a batch: each element is an independent candidate,
//!   processed in list order. A single object is one candidate.
//! - Candidates with `type` of `pong` or `connection_ack` are control
//!   frames: consumed without side effects, except that the ack's
//!   `authenticated` flag is reported back to the caller for logging.
//! - Every other candidate is a data message. Data messages lacking a
//!   non-empty `message` field are dropped silently; valid ones are
//!   normalized (kind defaults to `info`, duration to the standard
//!   dismiss time) and forwarded to the store with `id`, `title` and
//!   `meta` preserved.

// Rust guideline compliant 2026-02

use serde_json::Value;

use crate::store::{NewNotification, NotificationKind, NotificationStore};

/// Result of dispatching a single frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Number of notifications forwarded to the store.
    pub delivered: usize,
    /// `authenticated` flag from a `connection_ack` control frame, if the
    /// frame carried one.
    pub ack: Option<bool>,
}

/// Routes raw inbound frames into the notification store.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    store: NotificationStore,
}

impl Dispatcher {
    /// Creates a dispatcher forwarding into `store`.
    pub fn new(store: NotificationStore) -> Self {
        Self { store }
    }

    /// Processes one raw text frame.
    ///
    /// Never fails: malformed input is logged at debug level and dropped.
    pub fn dispatch(&self, frame: &str) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        let Ok(json) = serde_json::from_str::<Value>(frame) else {
            log::debug!(
                "[push] Dropping unparseable frame: {}",
                &frame[..frame.len().min(100)]
            );
            return outcome;
        };

        match json {
            Value::Array(candidates) => {
                for candidate in candidates {
                    self.handle_candidate(candidate, &mut outcome);
                }
            }
            other => self.handle_candidate(other, &mut outcome),
        }

        outcome
    }

    /// Classifies and processes one candidate event.
    fn handle_candidate(&self, candidate: Value, outcome: &mut DispatchOutcome) {
        let Value::Object(fields) = candidate else {
            log::trace!("[push] Dropping non-object candidate");
            return;
        };

        match fields.get("type").and_then(Value::as_str) {
            Some("pong") => {
                // Heartbeat reply -- discarded
            }
            Some("connection_ack") => {
                outcome.ack = Some(
                    fields
                        .get("authenticated")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                );
            }
            _ => {
                // Data message. A non-empty `message` field is a hard
                // precondition of the store's contract.
                let Some(message) = fields
                    .get("message")
                    .and_then(Value::as_str)
                    .filter(|text| !text.is_empty())
                else {
                    log::debug!("[push] Dropping data frame without message field");
                    return;
                };

                let request = NewNotification {
                    id: fields
                        .get("id")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    title: fields
                        .get("title")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    message: message.to_string(),
                    kind: fields
                        .get("kind")
                        .and_then(Value::as_str)
                        .and_then(NotificationKind::from_wire),
                    duration_ms: fields.get("duration").and_then(Value::as_i64),
                    meta: fields.get("meta").and_then(Value::as_object).cloned(),
                };

                self.store.add(request);
                outcome.delivered += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_DISMISS_MS;

    fn dispatcher() -> (Dispatcher, NotificationStore) {
        let store = NotificationStore::new();
        (Dispatcher::new(store.clone()), store)
    }

    #[tokio::test]
    async fn test_single_object_delivered_with_defaults() {
        let (dispatcher, store) = dispatcher();

        let outcome = dispatcher.dispatch(r#"{"message":"price alert"}"#);
        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.ack, None);

        let items = store.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].message, "price alert");
        assert_eq!(items[0].kind, NotificationKind::Info);
        assert_eq!(items[0].duration_ms, DEFAULT_DISMISS_MS);
    }

    #[tokio::test]
    async fn test_supplied_fields_preserved() {
        let (dispatcher, store) = dispatcher();

        dispatcher.dispatch(
            r#"{"id":"n1","title":"Filled","message":"order filled","kind":"success","duration":1500,"meta":{"link":"https://example.com/orders/9"}}"#,
        );

        let items = store.items();
        assert_eq!(items[0].id, "n1");
        assert_eq!(items[0].title.as_deref(), Some("Filled"));
        assert_eq!(items[0].kind, NotificationKind::Success);
        assert_eq!(items[0].duration_ms, 1500);
        assert_eq!(items[0].link(), Some("https://example.com/orders/9"));
    }

    #[tokio::test]
    async fn test_missing_message_dropped() {
        let (dispatcher, store) = dispatcher();

        let outcome = dispatcher.dispatch(r#"{"title":"x"}"#);
        assert_eq!(outcome.delivered, 0);
        assert!(store.is_empty());

        let outcome = dispatcher.dispatch(r#"{"message":""}"#);
        assert_eq!(outcome.delivered, 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_control_frames_absorbed() {
        let (dispatcher, store) = dispatcher();

        let outcome = dispatcher.dispatch(r#"{"type":"pong"}"#);
        assert_eq!(outcome.delivered, 0);
        assert_eq!(outcome.ack, None);

        let outcome = dispatcher.dispatch(r#"{"type":"connection_ack","authenticated":true}"#);
        assert_eq!(outcome.delivered, 0);
        assert_eq!(outcome.ack, Some(true));

        // Ack without the flag reads as anonymous
        let outcome = dispatcher.dispatch(r#"{"type":"connection_ack"}"#);
        assert_eq!(outcome.ack, Some(false));

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_array_fan_out_preserves_order() {
        let (dispatcher, store) = dispatcher();

        let outcome = dispatcher.dispatch(r#"[{"message":"a"},{"message":"b"}]"#);
        assert_eq!(outcome.delivered, 2);

        let messages: Vec<String> = store.items().into_iter().map(|i| i.message).collect();
        assert_eq!(messages, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_array_mixes_control_data_and_garbage() {
        let (dispatcher, store) = dispatcher();

        let outcome = dispatcher.dispatch(
            r#"[{"type":"pong"},{"message":"kept"},{"title":"no body"},42,{"type":"connection_ack","authenticated":false}]"#,
        );
        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.ack, Some(false));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_frame_dropped() {
        let (dispatcher, store) = dispatcher();

        let outcome = dispatcher.dispatch("not json at all {{{");
        assert_eq!(outcome, DispatchOutcome::default());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_kind_falls_back_to_info() {
        let (dispatcher, store) = dispatcher();

        dispatcher.dispatch(r#"{"message":"x","kind":"catastrophic"}"#);
        assert_eq!(store.items()[0].kind, NotificationKind::Info);
    }

    #[tokio::test]
    async fn test_data_message_with_unrecognized_type_still_delivered() {
        // Only pong/connection_ack are control frames; any other type tag
        // rides along as a data message.
        let (dispatcher, store) = dispatcher();

        let outcome = dispatcher.dispatch(r#"{"type":"alert","message":"margin call"}"#);
        assert_eq!(outcome.delivered, 1);
        assert_eq!(store.items()[0].message, "margin call");
    }
}
