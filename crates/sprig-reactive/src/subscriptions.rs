#![forbid(unsafe_code)]

//! Variable-arity subscription sets.
//!
//! [`Subscriptions`] is the type-erased core: a list of upstream sources, the
//! version observed for each, and the dependent they are registered for.
//! [`DynamicDependencies<T>`] pairs it with typed read handles so a caller can
//! both track and read a runtime-sized list of signals.
//!
//! # Invariants
//!
//! 1. While bound, every entry is registered with the owner exactly once.
//! 2. `remove`, `truncate`, `clear`, `reset` and drop unregister what they
//!    discard. Nothing added is ever left registered after the set is gone.
//! 3. An entry that was never observed counts as stale.

use std::fmt;
use std::rc::Rc;

use crate::graph::{DependentRef, Tracked, Version};
use crate::pool::Poolable;
use crate::signal::{ReadSignal, Readable};

struct Entry {
    source: Rc<dyn Tracked>,
    seen: Option<Version>,
}

/// A set of upstream subscriptions for one dependent.
#[derive(Default)]
pub struct Subscriptions {
    owner: Option<DependentRef>,
    entries: Vec<Entry>,
}

impl fmt::Debug for Subscriptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriptions")
            .field("bound", &self.owner.is_some())
            .field("len", &self.entries.len())
            .finish()
    }
}

impl Subscriptions {
    /// Create an empty, unbound set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every entry (present and future) for `owner`.
    ///
    /// Rebinding first unregisters from the previous owner.
    pub fn bind(&mut self, owner: DependentRef) {
        self.unregister_all();
        for entry in &self.entries {
            entry.source.register_dependent(owner.clone());
        }
        self.owner = Some(owner);
    }

    /// Whether an owner is bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.owner.is_some()
    }

    /// Append a source.
    pub fn add(&mut self, source: Rc<dyn Tracked>) {
        if let Some(owner) = &self.owner {
            source.register_dependent(owner.clone());
        }
        self.entries.push(Entry { source, seen: None });
    }

    /// Remove the source at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn remove(&mut self, index: usize) {
        let entry = self.entries.remove(index);
        if let Some(owner) = &self.owner {
            entry.source.unregister_dependent(owner);
        }
    }

    /// Keep the first `len` sources, unregistering the rest.
    pub fn truncate(&mut self, len: usize) {
        while self.entries.len() > len {
            self.remove(self.entries.len() - 1);
        }
    }

    /// Drop every source. The binding is kept.
    pub fn clear(&mut self) {
        self.unregister_all();
        self.entries.clear();
    }

    /// Number of sources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no sources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether any source moved past the version observed for it.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.seen != Some(entry.source.version()))
    }

    /// Record the current version of every source.
    pub fn mark_observed(&mut self) {
        for entry in &mut self.entries {
            entry.seen = Some(entry.source.version());
        }
    }

    /// Record the current version of sources never observed before.
    pub fn mark_new_observed(&mut self) {
        for entry in self.entries.iter_mut().filter(|e| e.seen.is_none()) {
            entry.seen = Some(entry.source.version());
        }
    }

    fn unregister_all(&self) {
        if let Some(owner) = &self.owner {
            for entry in &self.entries {
                entry.source.unregister_dependent(owner);
            }
        }
    }
}

impl Drop for Subscriptions {
    fn drop(&mut self) {
        self.unregister_all();
    }
}

impl Poolable for Subscriptions {
    fn reset(&mut self) {
        self.clear();
        self.owner = None;
    }
}

/// A runtime-sized list of typed signals tracked for one dependent.
pub struct DynamicDependencies<T> {
    subscriptions: Subscriptions,
    signals: Vec<ReadSignal<T>>,
}

impl<T> Default for DynamicDependencies<T> {
    fn default() -> Self {
        Self {
            subscriptions: Subscriptions::default(),
            signals: Vec::new(),
        }
    }
}

impl<T> fmt::Debug for DynamicDependencies<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicDependencies")
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}

impl<T: 'static> DynamicDependencies<T> {
    /// Create an empty, unbound set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every signal (present and future) for `owner`.
    pub fn bind(&mut self, owner: DependentRef) {
        self.subscriptions.bind(owner);
    }

    /// Whether an owner is bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.subscriptions.is_bound()
    }

    /// Track another signal.
    pub fn add(&mut self, signal: impl Into<ReadSignal<T>>) {
        let signal = signal.into();
        self.subscriptions.add(signal.tracked());
        self.signals.push(signal);
    }

    /// Stop tracking the signal at `index` and return it.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn remove(&mut self, index: usize) -> ReadSignal<T> {
        self.subscriptions.remove(index);
        self.signals.remove(index)
    }

    /// Keep only the first `len` signals.
    pub fn truncate(&mut self, len: usize) {
        self.subscriptions.truncate(len);
        self.signals.truncate(len);
    }

    /// Stop tracking everything.
    pub fn clear(&mut self) {
        self.subscriptions.clear();
        self.signals.clear();
    }

    /// The tracked signal at `index`.
    #[must_use]
    pub fn signal(&self, index: usize) -> Option<&ReadSignal<T>> {
        self.signals.get(index)
    }

    /// Current value of every tracked signal, in order.
    #[must_use]
    pub fn values(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.signals.iter().map(ReadSignal::get).collect()
    }

    /// Number of tracked signals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Whether any tracked signal changed since it was last observed.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.subscriptions.is_stale()
    }

    /// Record the current version of every tracked signal.
    pub fn mark_observed(&mut self) {
        self.subscriptions.mark_observed();
    }

    /// Record versions for signals added since the last observation.
    pub fn mark_new_observed(&mut self) {
        self.subscriptions.mark_new_observed();
    }
}

impl<T: 'static> Poolable for DynamicDependencies<T> {
    fn reset(&mut self) {
        self.subscriptions.reset();
        self.signals.clear();
    }
}
