#![forbid(unsafe_code)]

//! Writable value cells.
//!
//! # Design
//!
//! [`Signal<T>`] is a cheap, clonable handle to shared storage holding the
//! value, a [`Version`] and the dependent list. Writes bump the version and
//! notify dependents synchronously, before the write returns. Nothing is
//! re-run from inside a write: dependents only record that they must be
//! looked at later.
//!
//! # Invariants
//!
//! 1. Every write (`set`, `update`, list mutation) changes the version exactly
//!    once, even if the new value equals the old one. Use
//!    [`Signal::set_if_changed`] to skip equal writes.
//! 2. The value borrow is released before dependents are notified, so a
//!    dependent may read the signal from inside its notification.
//! 3. Dependents are notified in registration order.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::computed::Computed;
use crate::graph::{DependentRef, Dependents, Tracked, Version, notify_all};

/// Read access shared by every reactive cell.
pub trait Readable<T> {
    /// Borrow the current value.
    fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R;

    /// Type-erased source handle for subscriptions.
    fn tracked(&self) -> Rc<dyn Tracked>;
}

pub(crate) struct SignalInner<T> {
    value: RefCell<T>,
    version: Cell<Version>,
    dependents: RefCell<Dependents>,
}

impl<T> Tracked for SignalInner<T> {
    fn version(&self) -> Version {
        self.version.get()
    }

    fn register_dependent(&self, dependent: DependentRef) {
        self.dependents.borrow_mut().register(dependent);
    }

    fn unregister_dependent(&self, dependent: &DependentRef) -> bool {
        self.dependents.borrow_mut().unregister(dependent)
    }

    fn dependent_count(&self) -> usize {
        self.dependents.borrow().len()
    }
}

/// A writable, version-tracked value cell.
///
/// Cloning a `Signal` creates a new handle to the **same** cell.
pub struct Signal<T> {
    inner: Rc<SignalInner<T>>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("value", &*self.inner.value.borrow())
            .field("version", &self.inner.version.get())
            .field("dependents", &self.inner.dependents.borrow().len())
            .finish()
    }
}

impl<T: 'static> Signal<T> {
    /// Create a signal holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                value: RefCell::new(value),
                version: Cell::new(Version::INITIAL),
                dependents: RefCell::new(Dependents::default()),
            }),
        }
    }

    /// Clone out the current value.
    #[must_use]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Borrow the current value.
    ///
    /// # Panics
    ///
    /// Panics if `f` writes to this same signal.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Replace the value, bump the version and notify dependents.
    pub fn set(&self, value: T) {
        *self.inner.value.borrow_mut() = value;
        self.touch();
    }

    /// Replace the value only if it differs. Returns whether a write happened.
    pub fn set_if_changed(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        if *self.inner.value.borrow() == value {
            return false;
        }
        self.set(value);
        true
    }

    /// Mutate the value in place, then bump and notify.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let out = f(&mut self.inner.value.borrow_mut());
        self.touch();
        out
    }

    /// Current version.
    #[must_use]
    pub fn version(&self) -> Version {
        self.inner.version.get()
    }

    /// Number of registered dependents.
    #[must_use]
    pub fn dependent_count(&self) -> usize {
        self.inner.dependents.borrow().len()
    }

    /// Whether two handles point at the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Read-only view of this signal.
    #[must_use]
    pub fn read_only(&self) -> ReadSignal<T> {
        ReadSignal::Signal(self.clone())
    }

    fn touch(&self) {
        let version = self.inner.version.get().next();
        self.inner.version.set(version);
        #[cfg(feature = "tracing")]
        tracing::trace!(
            version = version.raw(),
            dependents = self.inner.dependents.borrow().len(),
            "signal.write"
        );
        notify_all(&self.inner.dependents);
    }
}

impl<T: 'static> Readable<T> for Signal<T> {
    fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.with(f)
    }

    fn tracked(&self) -> Rc<dyn Tracked> {
        let inner: Rc<SignalInner<T>> = Rc::clone(&self.inner);
        inner
    }
}

impl<T: Default + 'static> Default for Signal<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Read-only handle over either a [`Signal`] or a [`Computed`].
///
/// This is what effects and control constructs take as input.
pub enum ReadSignal<T> {
    /// A writable cell viewed read-only.
    Signal(Signal<T>),
    /// A derived cell.
    Computed(Computed<T>),
}

impl<T> Clone for ReadSignal<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Signal(s) => Self::Signal(s.clone()),
            Self::Computed(c) => Self::Computed(c.clone()),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for ReadSignal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(s) => s.fmt(f),
            Self::Computed(c) => c.fmt(f),
        }
    }
}

impl<T: 'static> ReadSignal<T> {
    /// A read handle over a fresh signal that nobody else can write.
    pub fn constant(value: T) -> Self {
        Self::Signal(Signal::new(value))
    }

    /// Clone out the current value, recomputing if needed.
    #[must_use]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        match self {
            Self::Signal(s) => s.get(),
            Self::Computed(c) => c.get(),
        }
    }

    /// Borrow the current value, recomputing if needed.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        match self {
            Self::Signal(s) => s.with(f),
            Self::Computed(c) => c.with(f),
        }
    }

    /// Current version (refreshes computed values first).
    #[must_use]
    pub fn version(&self) -> Version {
        self.tracked().version()
    }
}

impl<T: 'static> Readable<T> for ReadSignal<T> {
    fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.with(f)
    }

    fn tracked(&self) -> Rc<dyn Tracked> {
        match self {
            Self::Signal(s) => s.tracked(),
            Self::Computed(c) => c.tracked(),
        }
    }
}

impl<T: 'static> From<Signal<T>> for ReadSignal<T> {
    fn from(signal: Signal<T>) -> Self {
        Self::Signal(signal)
    }
}

impl<T: 'static> From<&Signal<T>> for ReadSignal<T> {
    fn from(signal: &Signal<T>) -> Self {
        Self::Signal(signal.clone())
    }
}

impl<T: 'static> From<Computed<T>> for ReadSignal<T> {
    fn from(computed: Computed<T>) -> Self {
        Self::Computed(computed)
    }
}

impl<T: 'static> From<&Computed<T>> for ReadSignal<T> {
    fn from(computed: &Computed<T>) -> Self {
        Self::Computed(computed.clone())
    }
}

/// A signal over a `Vec<T>` with list-shaped mutations.
///
/// Every mutation bumps the version exactly once.
pub struct SignalList<T> {
    items: Signal<Vec<T>>,
}

impl<T> Clone for SignalList<T> {
    fn clone(&self) -> Self {
        Self {
            items: self.items.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for SignalList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SignalList").field(&self.items).finish()
    }
}

impl<T: 'static> SignalList<T> {
    /// Create a list signal.
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: Signal::new(items.into_iter().collect()),
        }
    }

    /// Number of items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.with(Vec::len)
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clone out the item at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<T>
    where
        T: Clone,
    {
        self.items.with(|items| items.get(index).cloned())
    }

    /// Clone out every item.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.items.get()
    }

    /// Append an item.
    pub fn push(&self, item: T) {
        self.items.update(|items| items.push(item));
    }

    /// Insert at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index > len`.
    pub fn insert(&self, index: usize, item: T) {
        self.items.update(|items| items.insert(index, item));
    }

    /// Remove and return the item at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn remove(&self, index: usize) -> T {
        self.items.update(|items| items.remove(index))
    }

    /// Keep only the items matching `keep`.
    pub fn retain(&self, keep: impl FnMut(&T) -> bool) {
        self.items.update(|items| items.retain(keep));
    }

    /// Move the item at `from` so that it ends up at `to`.
    pub fn move_item(&self, from: usize, to: usize) {
        self.items.update(|items| {
            let item = items.remove(from);
            items.insert(to, item);
        });
    }

    /// Replace the whole list.
    pub fn replace_all(&self, items: impl IntoIterator<Item = T>) {
        self.items.set(items.into_iter().collect());
    }

    /// Remove every item.
    pub fn clear(&self) {
        self.items.update(Vec::clear);
    }

    /// Current version.
    #[must_use]
    pub fn version(&self) -> Version {
        self.items.version()
    }

    /// The underlying signal.
    #[must_use]
    pub fn signal(&self) -> &Signal<Vec<T>> {
        &self.items
    }
}

impl<T: 'static> Readable<Vec<T>> for SignalList<T> {
    fn with_value<R>(&self, f: impl FnOnce(&Vec<T>) -> R) -> R {
        self.items.with(f)
    }

    fn tracked(&self) -> Rc<dyn Tracked> {
        self.items.tracked()
    }
}

impl<T: 'static> From<SignalList<T>> for ReadSignal<Vec<T>> {
    fn from(list: SignalList<T>) -> Self {
        Self::Signal(list.items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Dependent;
    use std::rc::Weak;

    struct Probe {
        hits: Cell<u32>,
    }

    impl Dependent for Probe {
        fn notify(&self) {
            self.hits.set(self.hits.get() + 1);
        }
    }

    fn probe() -> (Rc<Probe>, DependentRef) {
        let probe = Rc::new(Probe { hits: Cell::new(0) });
        let weak: Weak<Probe> = Rc::downgrade(&probe);
        (probe, weak)
    }

    #[test]
    fn set_bumps_version_and_notifies() {
        let signal = Signal::new(1);
        let (p, weak) = probe();
        signal.tracked().register_dependent(weak);

        let before = signal.version();
        signal.set(2);
        assert_ne!(signal.version(), before);
        assert_eq!(signal.get(), 2);
        assert_eq!(p.hits.get(), 1);
    }

    #[test]
    fn equal_write_still_bumps() {
        let signal = Signal::new(5);
        let before = signal.version();
        signal.set(5);
        assert_ne!(signal.version(), before);
    }

    #[test]
    fn set_if_changed_skips_equal() {
        let signal = Signal::new(5);
        let before = signal.version();
        assert!(!signal.set_if_changed(5));
        assert_eq!(signal.version(), before);
        assert!(signal.set_if_changed(6));
        assert_ne!(signal.version(), before);
    }

    #[test]
    fn dependent_may_read_during_notification() {
        struct Reader {
            signal: Signal<i32>,
            seen: Cell<i32>,
        }
        impl Dependent for Reader {
            fn notify(&self) {
                self.seen.set(self.signal.get());
            }
        }

        let signal = Signal::new(0);
        let reader = Rc::new(Reader {
            signal: signal.clone(),
            seen: Cell::new(-1),
        });
        let weak: Weak<Reader> = Rc::downgrade(&reader);
        signal.tracked().register_dependent(weak);
        signal.set(42);
        assert_eq!(reader.seen.get(), 42);
    }

    #[test]
    fn unregister_during_notification_is_safe() {
        struct SelfRemoving {
            signal: Signal<i32>,
            me: RefCell<Option<DependentRef>>,
            hits: Cell<u32>,
        }
        impl Dependent for SelfRemoving {
            fn notify(&self) {
                self.hits.set(self.hits.get() + 1);
                if let Some(me) = self.me.borrow_mut().take() {
                    self.signal.tracked().unregister_dependent(&me);
                }
            }
        }

        let signal = Signal::new(0);
        let dep = Rc::new(SelfRemoving {
            signal: signal.clone(),
            me: RefCell::new(None),
            hits: Cell::new(0),
        });
        let weak: Weak<SelfRemoving> = Rc::downgrade(&dep);
        let weak: DependentRef = weak;
        *dep.me.borrow_mut() = Some(weak.clone());
        signal.tracked().register_dependent(weak);
        let (p, other) = probe();
        signal.tracked().register_dependent(other);

        signal.set(1);
        signal.set(2);
        assert_eq!(dep.hits.get(), 1);
        assert_eq!(p.hits.get(), 2);
        assert_eq!(signal.dependent_count(), 1);
    }

    #[test]
    fn list_mutations_bump_once() {
        let list = SignalList::new([1, 2, 3]);
        let v0 = list.version();
        list.push(4);
        let v1 = list.version();
        assert_eq!(v1, v0.next());
        list.move_item(3, 0);
        assert_eq!(list.version(), v1.next());
        assert_eq!(list.to_vec(), vec![4, 1, 2, 3]);
        assert_eq!(list.remove(1), 1);
        list.retain(|v| *v != 2);
        assert_eq!(list.to_vec(), vec![4, 3]);
        list.clear();
        assert!(list.is_empty());
    }

    #[test]
    fn read_signal_views_share_state() {
        let signal = Signal::new("a".to_string());
        let read: ReadSignal<String> = signal.read_only();
        signal.set("b".into());
        assert_eq!(read.get(), "b");
        assert_eq!(read.version(), signal.version());
    }
}
