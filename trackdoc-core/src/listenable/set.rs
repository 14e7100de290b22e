//! Listenable insertion-ordered set

use super::{apply_transform, Change, ChangeListener, ChangeLock, ListenerSlot, LockMode, Transform};
use crate::error::Result;
use indexmap::IndexSet;
use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Insertion-ordered set that reports changes keyed by position
///
/// Adding a member that is already present is not a change: the stored
/// instance is kept, the set is untouched and no listener runs.
pub struct ListenableSet<T> {
    items: RwLock<IndexSet<T>>,
    lock: ChangeLock,
    listener: ListenerSlot<usize, T>,
    transform: Option<Transform<T>>,
}

impl<T> ListenableSet<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::with_mode(LockMode::default())
    }

    pub fn with_mode(mode: LockMode) -> Self {
        Self {
            items: RwLock::new(IndexSet::new()),
            lock: ChangeLock::new(mode),
            listener: ListenerSlot::new(),
            transform: None,
        }
    }

    /// Wrap existing members without notifying anyone
    pub fn from_items<I>(items: I, mode: LockMode) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let set = Self::with_mode(mode);
        set.items.write().extend(items);
        set
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

    pub fn change_lock(&self) -> &ChangeLock {
        &self.lock
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }

    pub fn contains(&self, value: &T) -> bool {
        self.items.read().contains(value)
    }

    /// The stored instance equal to `value`
    pub fn get(&self, value: &T) -> Option<T> {
        self.items.read().get(value).cloned()
    }

    /// Members in insertion order
    pub fn to_vec(&self) -> Vec<T> {
        self.items.read().iter().cloned().collect()
    }

    pub fn read<R>(&self, f: impl FnOnce(&IndexSet<T>) -> R) -> R {
        f(&self.items.read())
    }

    /// Add `value`; returns false (and notifies nobody) for duplicates
    pub fn insert(&self, value: T) -> Result<bool> {
        let guard = self.lock.enter();
        let value = apply_transform(&self.transform, value);
        let (index, added) = self.items.write().insert_full(value.clone());
        if !added {
            return Ok(false);
        }
        self.listener.notify(
            Change::AfterAdd {
                key: index,
                value,
                appended: true,
            },
            &guard,
        )?;
        Ok(true)
    }

    /// Add every new member; returns the accepted ones in order
    ///
    /// The batch notification carries exactly the accepted subset. A value
    /// repeated inside `values` is accepted once.
    pub fn extend<I>(&self, values: I) -> Result<Vec<T>>
    where
        I: IntoIterator<Item = T>,
    {
        let guard = self.lock.enter();
        let entries: Vec<(usize, T)> = {
            let mut items = self.items.write();
            values
                .into_iter()
                .filter_map(|value| {
                    let value = apply_transform(&self.transform, value);
                    let (index, added) = items.insert_full(value.clone());
                    added.then_some((index, value))
                })
                .collect()
        };
        if entries.is_empty() {
            return Ok(Vec::new());
        }
        let accepted = entries.iter().map(|(_, value)| value.clone()).collect();
        self.listener.notify(Change::AfterAddAll { entries }, &guard)?;
        Ok(accepted)
    }

    pub fn remove(&self, value: &T) -> Result<bool> {
        Ok(self.remove_entry(value)?.is_some())
    }

    /// Remove every listed member; nested removals plus one batch
    pub fn remove_all<'a, I>(&self, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let guard = self.lock.enter();
        let mut entries = Vec::new();
        for value in values {
            if let Some(entry) = self.remove_entry(value)? {
                entries.push(entry);
            }
        }
        if entries.is_empty() {
            return Ok(0);
        }
        let count = entries.len();
        self.listener.notify(Change::AfterRemoveAll { entries }, &guard)?;
        Ok(count)
    }

    pub fn clear(&self) -> Result<()> {
        let guard = self.lock.enter();
        let entries: Vec<(usize, T)> =
            self.read(|items| items.iter().cloned().enumerate().collect());
        if entries.is_empty() {
            return Ok(());
        }
        self.listener.notify(Change::BeforeClear { entries }, &guard)?;
        self.items.write().clear();
        Ok(())
    }

    fn remove_entry(&self, value: &T) -> Result<Option<(usize, T)>> {
        let guard = self.lock.enter();
        let removed = self.items.write().shift_remove_full(value);
        match removed {
            Some((index, stored)) => {
                self.listener.notify(
                    Change::AfterRemove {
                        key: index,
                        value: stored.clone(),
                    },
                    &guard,
                )?;
                Ok(Some((index, stored)))
            }
            None => Ok(None),
        }
    }
}

impl<T> Default for ListenableSet<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Membership equality: same members, any order
impl<T> PartialEq for ListenableSet<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        // Snapshot one side so the two read locks are never held together.
        let mine = self.to_vec();
        other.read(|theirs| mine.len() == theirs.len() && mine.iter().all(|m| theirs.contains(m)))
    }
}

impl<T> Eq for ListenableSet<T> where T: Clone + Eq + Hash + Send + Sync + 'static {}

/// Order-independent, consistent with membership equality
impl<T> Hash for ListenableSet<T>
where
    T: Clone + Eq + Hash + Send + Sync + 'static,
{
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.read(|items| {
            let combined = items.iter().fold(0u64, |acc, item| {
                let mut hasher = DefaultHasher::new();
                item.hash(&mut hasher);
                acc.wrapping_add(hasher.finish())
            });
            items.len().hash(state);
            combined.hash(state);
        });
    }
}

impl<T: fmt::Debug> fmt::Debug for ListenableSet<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.items.read().iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listenable::test_support::Recorder;

    /// Equal by `id` only; `label` tells instances apart
    #[derive(Debug, Clone)]
    struct Tagged {
        id: u32,
        label: &'static str,
    }

    impl PartialEq for Tagged {
        fn eq(&self, other: &Self) -> bool {
            self.id == other.id
        }
    }

    impl Eq for Tagged {}

    impl Hash for Tagged {
        fn hash<H: Hasher>(&self, state: &mut H) {
            self.id.hash(state);
        }
    }

    #[test]
    fn test_duplicate_insert_is_silent() {
        let set = ListenableSet::new();
        let recorder = Recorder::new();
        set.set_listener(recorder.clone());

        assert!(set.insert("a").unwrap());
        assert!(!set.insert("a").unwrap());

        assert_eq!(recorder.len(), 1);
        assert_eq!(set.to_vec(), vec!["a"]);
    }

    #[test]
    fn test_batch_reports_accepted_subset_in_order() {
        let set = ListenableSet::new();
        let recorder = Recorder::new();
        set.set_listener(recorder.clone());

        let accepted = set.extend(vec!['a', 'b', 'a', 'c']).unwrap();
        assert_eq!(accepted, vec!['a', 'b', 'c']);

        let seen = recorder.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].0,
            Change::AfterAddAll {
                entries: vec![(0, 'a'), (1, 'b'), (2, 'c')]
            }
        );
    }

    #[test]
    fn test_existing_instance_is_retained() {
        let set = ListenableSet::new();
        set.insert(Tagged { id: 1, label: "first" }).unwrap();

        let accepted = set
            .extend(vec![
                Tagged { id: 1, label: "second" },
                Tagged { id: 2, label: "other" },
            ])
            .unwrap();

        assert_eq!(accepted.len(), 1);
        assert_eq!(accepted[0].label, "other");
        assert_eq!(set.get(&Tagged { id: 1, label: "" }).unwrap().label, "first");
    }

    #[test]
    fn test_transform_applies_before_duplicate_test() {
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = calls.clone();
        let set: ListenableSet<String> = ListenableSet::new().with_transform(Arc::new(move |s: String| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            s.trim().to_string()
        }));

        assert!(set.insert("x".to_string()).unwrap());
        assert!(!set.insert("  x ".to_string()).unwrap());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_membership_equality_ignores_order() {
        let a = ListenableSet::from_items(vec![1, 2, 3], LockMode::Synchronized);
        let b = ListenableSet::from_items(vec![3, 1, 2], LockMode::Unsynchronized);
        let c = ListenableSet::from_items(vec![1, 2], LockMode::Synchronized);

        assert_eq!(a, b);
        assert_ne!(a, c);

        let hash = |set: &ListenableSet<i32>| {
            let mut hasher = DefaultHasher::new();
            set.hash(&mut hasher);
            hasher.finish()
        };
        assert_eq!(hash(&a), hash(&b));
    }

    #[test]
    fn test_remove_all_nests_removals() {
        let set = ListenableSet::from_items(vec![1, 2, 3], LockMode::Synchronized);
        let recorder = Recorder::new();
        set.set_listener(recorder.clone());

        assert_eq!(set.remove_all(&[1, 3, 9]).unwrap(), 2);
        assert_eq!(recorder.kinds(), vec!["after_remove", "after_remove", "after_remove_all"]);
        let seen = recorder.seen.lock();
        assert!(!seen[0].1.outermost);
        assert!(seen[2].1.outermost);
        assert_eq!(set.to_vec(), vec![2]);
    }

    #[test]
    fn test_clear_empty_set_is_silent() {
        let set: ListenableSet<u8> = ListenableSet::new();
        let recorder = Recorder::new();
        set.set_listener(recorder.clone());
        set.clear().unwrap();
        assert_eq!(recorder.len(), 0);
    }
}
