//! Listenable ordered sequence

use super::{apply_transform, Change, ChangeListener, ChangeLock, ListenerSlot, LockMode, Transform};
use crate::error::{Result, TrackError};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Ordered sequence that reports changes keyed by index
pub struct ListenableVec<T> {
    items: RwLock<Vec<T>>,
    lock: ChangeLock,
    listener: ListenerSlot<usize, T>,
    transform: Option<Transform<T>>,
}

impl<T> ListenableVec<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_mode(LockMode::default())
    }

    pub fn with_mode(mode: LockMode) -> Self {
        Self::from_vec(Vec::new(), mode)
    }

    /// Wrap existing items without notifying anyone
    pub fn from_vec(items: Vec<T>, mode: LockMode) -> Self {
        Self {
            items: RwLock::new(items),
            lock: ChangeLock::new(mode),
            listener: ListenerSlot::new(),
            transform: None,
        }
    }

    pub fn with_transform(mut self, transform: Transform<T>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn set_listener(&self, listener: Arc<dyn ChangeListener<usize, T>>) {
        self.listener.set(listener);
    }

    pub fn clear_listener(&self) {
        self.listener.clear();
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_set()
    }

    pub fn change_lock(&self) -> &ChangeLock {
        &self.lock
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.items.read().get(index).cloned()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.items.read().clone()
    }

    /// Run `f` against the current items under a read lock
    pub fn read<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(&self.items.read())
    }

    pub fn contains(&self, value: &T) -> bool
    where
        T: PartialEq,
    {
        self.items.read().contains(value)
    }

    pub fn push(&self, value: T) -> Result<()> {
        let guard = self.lock.enter();
        let value = apply_transform(&self.transform, value);
        let index = {
            let mut items = self.items.write();
            items.push(value.clone());
            items.len() - 1
        };
        self.listener.notify(
            Change::AfterAdd {
                key: index,
                value,
                appended: true,
            },
            &guard,
        )
    }

    pub fn insert(&self, index: usize, value: T) -> Result<()> {
        let guard = self.lock.enter();
        let value = apply_transform(&self.transform, value);
        let appended = {
            let mut items = self.items.write();
            let len = items.len();
            if index > len {
                return Err(TrackError::IndexOutOfBounds { index, len });
            }
            items.insert(index, value.clone());
            index == len
        };
        self.listener.notify(
            Change::AfterAdd {
                key: index,
                value,
                appended,
            },
            &guard,
        )
    }

    /// Replace the element at `index`, returning the old one
    pub fn set(&self, index: usize, value: T) -> Result<T> {
        let guard = self.lock.enter();
        let value = apply_transform(&self.transform, value);
        let old = {
            let mut items = self.items.write();
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or(TrackError::IndexOutOfBounds { index, len })?;
            std::mem::replace(slot, value.clone())
        };
        self.listener.notify(
            Change::AfterPut {
                key: index,
                old: Some(old.clone()),
                new: value,
            },
            &guard,
        )?;
        Ok(old)
    }

    pub fn remove(&self, index: usize) -> Result<T> {
        let guard = self.lock.enter();
        let removed = {
            let mut items = self.items.write();
            let len = items.len();
            if index >= len {
                return Err(TrackError::IndexOutOfBounds { index, len });
            }
            items.remove(index)
        };
        self.listener.notify(
            Change::AfterRemove {
                key: index,
                value: removed.clone(),
            },
            &guard,
        )?;
        Ok(removed)
    }

    pub fn pop(&self) -> Result<Option<T>> {
        let guard = self.lock.enter();
        let popped = {
            let mut items = self.items.write();
            items.pop().map(|value| (items.len(), value))
        };
        match popped {
            Some((index, value)) => {
                self.listener.notify(
                    Change::AfterRemove {
                        key: index,
                        value: value.clone(),
                    },
                    &guard,
                )?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Append every value; one batch notification, none if `values` is empty
    pub fn extend<I>(&self, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = T>,
    {
        let guard = self.lock.enter();
        let entries: Vec<(usize, T)> = {
            let mut items = self.items.write();
            let start = items.len();
            let added: Vec<T> = values
                .into_iter()
                .map(|value| apply_transform(&self.transform, value))
                .collect();
            items.extend(added.iter().cloned());
            added
                .into_iter()
                .enumerate()
                .map(|(offset, value)| (start + offset, value))
                .collect()
        };
        if entries.is_empty() {
            return Ok(0);
        }
        let count = entries.len();
        self.listener.notify(Change::AfterAddAll { entries }, &guard)?;
        Ok(count)
    }

    /// Remove every element for which `keep` returns false
    ///
    /// Each removal is reported as a nested [`Change::AfterRemove`], followed
    /// by one outermost [`Change::AfterRemoveAll`] listing the removed
    /// elements at their original indices.
    pub fn retain<F>(&self, mut keep: F) -> Result<usize>
    where
        F: FnMut(&T) -> bool,
    {
        let guard = self.lock.enter();
        let doomed: Vec<usize> = self.read(|items| {
            items
                .iter()
                .enumerate()
                .filter(|(_, item)| !keep(item))
                .map(|(index, _)| index)
                .collect()
        });
        if doomed.is_empty() {
            return Ok(0);
        }

        let mut entries = Vec::with_capacity(doomed.len());
        for &index in doomed.iter().rev() {
            let value = self.remove(index)?;
            entries.push((index, value));
        }
        entries.reverse();

        let count = entries.len();
        self.listener.notify(Change::AfterRemoveAll { entries }, &guard)?;
        Ok(count)
    }

    /// Empty the sequence after a single before-clear notification
    pub fn clear(&self) -> Result<()> {
        let guard = self.lock.enter();
        let entries: Vec<(usize, T)> = self.read(|items| items.iter().cloned().enumerate().collect());
        if entries.is_empty() {
            return Ok(());
        }
        self.listener.notify(Change::BeforeClear { entries }, &guard)?;
        self.items.write().clear();
        Ok(())
    }
}

impl<T> Default for ListenableVec<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for ListenableVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.items.read().iter()).finish()
    }
}
