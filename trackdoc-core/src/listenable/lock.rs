//! Change-lock coordination
//!
//! A [`ChangeLock`] couples a container mutation with the notification that
//! reports it. In synchronized mode the pair runs under a reentrant mutex, so
//! no other thread's mutation can be observed between a state change and its
//! notification. In both modes the lock tracks nesting depth, which lets a
//! listener tell the outermost mutating call apart from nested ones.

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

thread_local! {
    /// Nesting depth per unsynchronized lock, keyed by lock address
    static DEPTHS: RefCell<HashMap<usize, usize>> = RefCell::new(HashMap::new());
}

/// Cross-thread discipline for a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
    /// Mutation and notification are one atomic unit across threads
    #[default]
    Synchronized,

    /// Causal order only; no cross-thread exclusion
    Unsynchronized,
}

/// Per-container change lock
pub struct ChangeLock {
    mode: LockMode,
    gate: ReentrantMutex<Cell<usize>>,
    active: AtomicUsize,
}

impl ChangeLock {
    pub fn new(mode: LockMode) -> Self {
        Self {
            mode,
            gate: ReentrantMutex::new(Cell::new(0)),
            active: AtomicUsize::new(0),
        }
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Enter a mutating call; the returned guard must live until the
    /// notification has been delivered
    pub fn enter(&self) -> ChangeGuard<'_> {
        match self.mode {
            LockMode::Synchronized => {
                let guard = self.gate.lock();
                let depth = guard.get() + 1;
                guard.set(depth);
                ChangeGuard {
                    depth,
                    inner: GuardInner::Synchronized(guard),
                }
            }
            LockMode::Unsynchronized => {
                self.active.fetch_add(1, Ordering::AcqRel);
                let depth = DEPTHS.with(|depths| {
                    let mut depths = depths.borrow_mut();
                    let depth = depths.entry(self.address()).or_insert(0);
                    *depth += 1;
                    *depth
                });
                ChangeGuard {
                    depth,
                    inner: GuardInner::Unsynchronized(self),
                }
            }
        }
    }

    fn address(&self) -> usize {
        self as *const Self as usize
    }

    fn leave_unsynchronized(&self) {
        DEPTHS.with(|depths| {
            let mut depths = depths.borrow_mut();
            if let Some(depth) = depths.get_mut(&self.address()) {
                *depth -= 1;
                if *depth == 0 {
                    depths.remove(&self.address());
                }
            }
        });
        self.active.fetch_sub(1, Ordering::AcqRel);
    }

    /// True while any mutating call is in progress
    pub fn is_held(&self) -> bool {
        match self.mode {
            LockMode::Synchronized => self.gate.is_locked(),
            LockMode::Unsynchronized => self.active.load(Ordering::Acquire) > 0,
        }
    }
}

impl Default for ChangeLock {
    fn default() -> Self {
        Self::new(LockMode::default())
    }
}

impl fmt::Debug for ChangeLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeLock")
            .field("mode", &self.mode)
            .field("held", &self.is_held())
            .finish()
    }
}

enum GuardInner<'a> {
    Synchronized(ReentrantMutexGuard<'a, Cell<usize>>),
    Unsynchronized(&'a ChangeLock),
}

/// Proof of an in-progress mutating call
pub struct ChangeGuard<'a> {
    depth: usize,
    inner: GuardInner<'a>,
}

impl ChangeGuard<'_> {
    /// Nesting depth of this call, 1 for the outermost
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// The owning flag: only the outermost call records paths
    pub fn is_outermost(&self) -> bool {
        self.depth == 1
    }

    pub fn context(&self) -> ChangeContext {
        ChangeContext {
            depth: self.depth,
            outermost: self.is_outermost(),
        }
    }
}

impl Drop for ChangeGuard<'_> {
    fn drop(&mut self) {
        match &self.inner {
            GuardInner::Synchronized(guard) => guard.set(guard.get() - 1),
            GuardInner::Unsynchronized(lock) => lock.leave_unsynchronized(),
        }
    }
}

impl fmt::Debug for ChangeGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeGuard")
            .field("depth", &self.depth)
            .finish()
    }
}

/// Call-stack facts delivered with every notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeContext {
    pub depth: usize,
    pub outermost: bool,
}

impl ChangeContext {
    pub fn outermost() -> Self {
        Self {
            depth: 1,
            outermost: true,
        }
    }
}
