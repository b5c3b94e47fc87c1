//! In-memory queue of active user-facing notifications.
//!
//! The store owns the authoritative, ordered collection of notifications
//! currently awaiting or undergoing display, and the dismissal timing of
//! each one. It has no knowledge of the transport that produced an item;
//! the dispatcher and the presentation layer interact with it only through
//! [`NotificationStore::add`], [`NotificationStore::remove`] and
//! [`NotificationStore::clear`].
//!
//! # Lifecycle
//!
//! Items are created only via `add`, are immutable once created, and are
//! destroyed via explicit `remove(id)`, via expiry of their own one-shot
//! timer, or via `clear()`. Each positive-duration item owns a spawned
//! expiry task; its [`tokio::task::JoinHandle`] is stored alongside the
//! item and aborted on every removal path, so a manual dismiss racing
//! expiry never double-fires.
//!
//! The expiry timer is the single source of truth for an item's lifetime.
//! A presenter that wants to pause a countdown (e.g. on hover) must
//! `remove` and re-`add` the item; the store never suspends a timer.
//!
//! # Ordering and observation
//!
//! Insertion order is iteration order (newest last). Every mutation
//! notifies all current subscribers synchronously with a snapshot before
//! the mutating call returns, so an observer always sees a collection
//! consistent with the latest mutation.
//!
//! The collection is unbounded; flood control is left to the server and
//! the presentation layer.

// Rust guideline compliant 2026-02

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::constants::DEFAULT_DISMISS_MS;

/// Severity/intent classification for a notification.
///
/// Determines visual styling in the presentation layer; the store itself
/// treats all kinds identically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Neutral informational message.
    #[default]
    Info,
    /// Successful operation or positive outcome.
    Success,
    /// Non-critical issue the user should be aware of.
    Warning,
    /// Error or failure affecting functionality.
    Error,
}

impl NotificationKind {
    /// Returns the wire/display representation of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Info => "info",
            NotificationKind::Success => "success",
            NotificationKind::Warning => "warning",
            NotificationKind::Error => "error",
        }
    }

    /// Parses a wire `kind` value. Unknown values yield `None` and the
    /// caller falls back to the default rather than dropping the payload.
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "info" => Some(NotificationKind::Info),
            "success" => Some(NotificationKind::Success),
            "warning" => Some(NotificationKind::Warning),
            "error" => Some(NotificationKind::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single user-facing notification, immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct NotificationItem {
    /// Unique id within the store's lifetime (caller-supplied or generated).
    pub id: String,
    /// Optional short heading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Body text. Always non-empty; payloads lacking it never enter the store.
    pub message: String,
    /// Severity classification.
    pub kind: NotificationKind,
    /// Insertion timestamp, assigned by the store.
    pub created_at: DateTime<Utc>,
    /// Milliseconds until auto-dismiss; zero or below means the item is
    /// sticky until manually removed.
    pub duration_ms: i64,
    /// Free-form payload metadata. The only contractually recognized key
    /// is `link` (see [`NotificationItem::link`]).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<serde_json::Map<String, serde_json::Value>>,
}

impl NotificationItem {
    /// Returns the `link` metadata value, offered to the presentation
    /// layer as a "view details" action.
    pub fn link(&self) -> Option<&str> {
        self.meta
            .as_ref()
            .and_then(|meta| meta.get("link"))
            .and_then(|value| value.as_str())
    }
}

/// Insertion request for [`NotificationStore::add`].
///
/// Everything except `message` is optional; the store applies defaults and
/// assigns the timestamp.
#[derive(Debug, Clone, Default)]
pub struct NewNotification {
    /// Explicit id. Generated as `{unix-ms}_{sequence}` when absent.
    pub id: Option<String>,
    /// Optional short heading.
    pub title: Option<String>,
    /// Body text (required, non-empty).
    pub message: String,
    /// Severity; defaults to [`NotificationKind::Info`].
    pub kind: Option<NotificationKind>,
    /// Display lifetime in milliseconds; defaults to
    /// [`DEFAULT_DISMISS_MS`]. Zero or below disables auto-dismiss.
    pub duration_ms: Option<i64>,
    /// Free-form metadata, passed through untouched.
    pub meta: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Observer invoked synchronously with a snapshot after every mutation.
type Subscriber = Arc<dyn Fn(&[NotificationItem]) + Send + Sync>;

/// One stored notification plus its pending expiry task, if any.
struct Entry {
    item: NotificationItem,
    expiry: Option<tokio::task::JoinHandle<()>>,
}

struct StoreInner {
    entries: Mutex<Vec<Entry>>,
    subscribers: Mutex<Vec<Subscriber>>,
    seq: AtomicU64,
}

/// Handle to the shared notification queue.
///
/// Cheap to clone; all clones observe the same collection.
#[derive(Clone)]
pub struct NotificationStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for NotificationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationStore")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for NotificationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StoreInner {
                entries: Mutex::new(Vec::new()),
                subscribers: Mutex::new(Vec::new()),
                seq: AtomicU64::new(0),
            }),
        }
    }

    /// Inserts a notification, applying defaults, and returns its id.
    ///
    /// Assigns `created_at`, appends to the end of the collection, and --
    /// when the effective duration is positive -- schedules a one-shot
    /// expiry task that removes the item after that many milliseconds.
    ///
    /// Inserting with an id already present is unsupported; callers must
    /// `remove` the prior entry first (the store never replaces in place).
    ///
    /// Must be called from within a tokio runtime when the effective
    /// duration is positive (the expiry timer is a spawned task).
    pub fn add(&self, request: NewNotification) -> String {
        let id = request.id.unwrap_or_else(|| self.generate_id());
        let duration_ms = request.duration_ms.unwrap_or(DEFAULT_DISMISS_MS);
        let item = NotificationItem {
            id: id.clone(),
            title: request.title,
            message: request.message,
            kind: request.kind.unwrap_or_default(),
            created_at: Utc::now(),
            duration_ms,
            meta: request.meta,
        };

        {
            let mut entries = self
                .inner
                .entries
                .lock()
                .expect("notification entries mutex poisoned");

            // Spawned inside the critical section so the expiry task can
            // never observe the collection without its own entry present.
            // The task only holds a Weak reference; a dropped store cancels
            // nothing but also leaks nothing.
            let expiry = (duration_ms > 0).then(|| {
                let weak = Arc::downgrade(&self.inner);
                let timer_id = id.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(duration_ms as u64)).await;
                    if let Some(inner) = weak.upgrade() {
                        log::debug!("[store] Notification {} expired", timer_id);
                        StoreInner::remove_entry(&inner, &timer_id);
                    }
                })
            });

            entries.push(Entry { item, expiry });
        }

        log::debug!("[store] Added notification {} ({}ms)", id, duration_ms);
        self.inner.notify_subscribers();
        id
    }

    /// Removes the item with the given id, cancelling its pending expiry
    /// timer. No-op (and no subscriber notification) if the id is absent.
    pub fn remove(&self, id: &str) {
        StoreInner::remove_entry(&self.inner, id);
    }

    /// Removes all items and cancels every outstanding expiry timer.
    ///
    /// Used on full subsystem teardown (e.g. user sign-out).
    pub fn clear(&self) {
        let drained: Vec<Entry> = {
            let mut entries = self
                .inner
                .entries
                .lock()
                .expect("notification entries mutex poisoned");
            entries.drain(..).collect()
        };
        for entry in &drained {
            if let Some(handle) = &entry.expiry {
                handle.abort();
            }
        }
        log::debug!("[store] Cleared {} notification(s)", drained.len());
        self.inner.notify_subscribers();
    }

    /// Returns a snapshot of the current collection in insertion order.
    pub fn items(&self) -> Vec<NotificationItem> {
        self.inner.snapshot()
    }

    /// Number of active notifications.
    pub fn len(&self) -> usize {
        self.inner
            .entries
            .lock()
            .expect("notification entries mutex poisoned")
            .len()
    }

    /// Whether the store holds no notifications.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers an observer called synchronously with a snapshot after
    /// every mutation (add/remove/clear), before the mutating call returns.
    pub fn subscribe<F>(&self, observer: F)
    where
        F: Fn(&[NotificationItem]) + Send + Sync + 'static,
    {
        self.inner
            .subscribers
            .lock()
            .expect("notification subscribers mutex poisoned")
            .push(Arc::new(observer));
    }

    /// Generates a `{unix-ms}_{sequence}` id. The process-wide sequence
    /// counter keeps ids unique even for same-millisecond bursts.
    fn generate_id(&self) -> String {
        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        format!("{}_{}", Utc::now().timestamp_millis(), seq)
    }
}

impl StoreInner {
    /// Removes an entry by id, aborting its expiry task. Shared by manual
    /// remove and the expiry path itself (a task aborting its own handle
    /// here is fine: the cancellation lands after the removal completes).
    fn remove_entry(inner: &Arc<StoreInner>, id: &str) {
        let removed = {
            let mut entries = inner
                .entries
                .lock()
                .expect("notification entries mutex poisoned");
            entries
                .iter()
                .position(|entry| entry.item.id == id)
                .map(|index| entries.remove(index))
        };

        match removed {
            Some(entry) => {
                if let Some(handle) = entry.expiry {
                    handle.abort();
                }
                log::debug!("[store] Removed notification {}", id);
                inner.notify_subscribers();
            }
            None => {
                log::trace!("[store] remove({}) ignored -- not present", id);
            }
        }
    }

    fn snapshot(&self) -> Vec<NotificationItem> {
        self.entries
            .lock()
            .expect("notification entries mutex poisoned")
            .iter()
            .map(|entry| entry.item.clone())
            .collect()
    }

    /// Calls every subscriber with a fresh snapshot. Both locks are
    /// released before observers run, so an observer may re-enter the
    /// store (including mutating it) without deadlocking.
    fn notify_subscribers(&self) {
        let snapshot = self.snapshot();
        let observers: Vec<Subscriber> = self
            .subscribers
            .lock()
            .expect("notification subscribers mutex poisoned")
            .clone();
        for observer in observers {
            observer(&snapshot);
        }
    }
}
