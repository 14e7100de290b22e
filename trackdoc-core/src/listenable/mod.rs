//! Listenable containers
//!
//! Wrappers around an ordered sequence, an insertion-ordered set and an
//! insertion-ordered map that report every observable state change to a
//! registered listener, synchronously with the mutating call.
//!
//! # Notification contract
//!
//! - One notification per logical operation; bulk operations deliver a
//!   single batch notification.
//! - No notification, and no mutation, for operations that change nothing
//!   (adding a duplicate set member, clearing an empty container).
//! - `clear` delivers one [`Change::BeforeClear`] and never per-element
//!   removals.
//! - A listener error aborts the call and is returned to the caller.

mod lock;
mod map;
mod set;
mod vec;

pub use lock::{ChangeContext, ChangeGuard, ChangeLock, LockMode};
pub use map::ListenableMap;
pub use set::ListenableSet;
pub use vec::ListenableVec;

use crate::error::Result;
use parking_lot::RwLock;
use std::sync::Arc;

/// Structural change notification
///
/// `K` addresses the changed slot: the index for sequences and sets, the
/// key for maps.
#[derive(Debug, Clone, PartialEq)]
pub enum Change<K, V> {
    /// One element was added; `appended` is true when it landed at the tail
    AfterAdd { key: K, value: V, appended: bool },

    /// A batch insert added exactly these elements, in order
    AfterAddAll { entries: Vec<(K, V)> },

    /// A slot was written; `old` is `None` for a fresh key
    AfterPut { key: K, old: Option<V>, new: V },

    /// A batch put wrote these keys (each also reported by a nested put)
    AfterPutAll { keys: Vec<K> },

    /// One element was removed
    AfterRemove { key: K, value: V },

    /// A batch removal removed these elements (each also reported nested)
    AfterRemoveAll { entries: Vec<(K, V)> },

    /// The container is about to be emptied
    BeforeClear { entries: Vec<(K, V)> },
}

impl<K, V> Change<K, V> {
    pub fn kind(&self) -> &'static str {
        match self {
            Change::AfterAdd { .. } => "after_add",
            Change::AfterAddAll { .. } => "after_add_all",
            Change::AfterPut { .. } => "after_put",
            Change::AfterPutAll { .. } => "after_put_all",
            Change::AfterRemove { .. } => "after_remove",
            Change::AfterRemoveAll { .. } => "after_remove_all",
            Change::BeforeClear { .. } => "before_clear",
        }
    }
}

/// Receiver of container notifications
pub trait ChangeListener<K, V>: Send + Sync {
    fn on_change(&self, change: &Change<K, V>, cx: &ChangeContext) -> Result<()>;
}

impl<K, V, F> ChangeListener<K, V> for F
where
    F: Fn(&Change<K, V>, &ChangeContext) -> Result<()> + Send + Sync,
{
    fn on_change(&self, change: &Change<K, V>, cx: &ChangeContext) -> Result<()> {
        self(change, cx)
    }
}

/// Rewrites an incoming value before it is tested for insertion
///
/// Must be idempotent and side-effect free. Containers apply it exactly
/// once per candidate and reuse the result for both the duplicate test and
/// the insertion.
pub type Transform<V> = Arc<dyn Fn(V) -> V + Send + Sync>;

/// Listener registration shared by all containers
pub(crate) struct ListenerSlot<K, V> {
    listener: RwLock<Option<Arc<dyn ChangeListener<K, V>>>>,
}

impl<K, V> ListenerSlot<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            listener: RwLock::new(None),
        }
    }

    pub(crate) fn set(&self, listener: Arc<dyn ChangeListener<K, V>>) {
        *self.listener.write() = Some(listener);
    }

    pub(crate) fn clear(&self) {
        *self.listener.write() = None;
    }

    pub(crate) fn is_set(&self) -> bool {
        self.listener.read().is_some()
    }

    pub(crate) fn notify(&self, change: Change<K, V>, guard: &ChangeGuard<'_>) -> Result<()> {
        // Clone out so the registration lock is not held across the callback.
        let listener = self.listener.read().clone();
        match listener {
            Some(listener) => {
                tracing::trace!(kind = change.kind(), depth = guard.depth(), "container notification");
                listener.on_change(&change, &guard.context())
            }
            None => Ok(()),
        }
    }
}

pub(crate) fn apply_transform<V>(transform: &Option<Transform<V>>, value: V) -> V {
    match transform {
        Some(transform) => transform(value),
        None => value,
    }
}
