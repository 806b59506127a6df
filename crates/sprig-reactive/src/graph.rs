#![forbid(unsafe_code)]

//! Dependency-graph plumbing shared by every reactive cell.
//!
//! A *source* ([`Tracked`]) carries a wrapping [`Version`] and a list of
//! *dependents*. A dependent is anything implementing [`Dependent`]: a
//! computed value forwarding the notification, or a fiber hook that queues
//! itself for an update.
//!
//! # Invariants
//!
//! 1. Dependents are held as `Weak` references. A source never extends the
//!    lifetime of what observes it.
//! 2. A dependent registered twice is stored twice; each `unregister` removes
//!    one entry. Registration and removal stay symmetric.
//! 3. Notification walks a snapshot taken before the first callback, in
//!    registration order, so callbacks may register or unregister freely.
//! 4. The single-dependent case is stored inline without heap allocation.

use std::fmt;
use std::rc::Weak;

use smallvec::SmallVec;

/// Wrapping change counter.
///
/// Only equality is meaningful: a consumer compares the version it observed
/// last against the current one. Equal means "not dirty since then", never
/// "the value is the same".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Version(u32);

impl Version {
    /// Version of a freshly created cell.
    pub const INITIAL: Self = Self(0);

    /// The version following `self`, wrapping on overflow.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Raw counter value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Something that must hear about upstream writes.
pub trait Dependent {
    /// Called synchronously from the write path of a source.
    fn notify(&self);
}

/// Non-owning handle to a registered dependent.
pub type DependentRef = Weak<dyn Dependent>;

/// A versioned source that dependents can subscribe to.
///
/// Implemented by the shared interior of [`Signal`](crate::Signal) and
/// [`Computed`](crate::Computed), and used type-erased as `Rc<dyn Tracked>`
/// by dependency sets.
pub trait Tracked {
    /// Current version. Computed sources refresh themselves first.
    fn version(&self) -> Version;

    /// Add `dependent` to the notification list.
    fn register_dependent(&self, dependent: DependentRef);

    /// Remove one registration of `dependent`. Returns whether it was found.
    fn unregister_dependent(&self, dependent: &DependentRef) -> bool;

    /// Number of live registrations.
    fn dependent_count(&self) -> usize;
}

/// Inline-one list of dependents.
#[derive(Default)]
pub(crate) struct Dependents {
    slots: SmallVec<[DependentRef; 1]>,
}

impl Dependents {
    pub(crate) fn register(&mut self, dependent: DependentRef) {
        self.slots.push(dependent);
    }

    pub(crate) fn unregister(&mut self, dependent: &DependentRef) -> bool {
        match self
            .slots
            .iter()
            .position(|slot| Weak::ptr_eq(slot, dependent))
        {
            Some(pos) => {
                self.slots.remove(pos);
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the list has outgrown its inline slot.
    #[cfg(test)]
    pub(crate) fn spilled(&self) -> bool {
        self.slots.spilled()
    }

    fn snapshot(&self) -> SmallVec<[DependentRef; 1]> {
        self.slots.clone()
    }

    fn prune(&mut self) {
        self.slots.retain(|slot| slot.strong_count() > 0);
    }
}

/// Notify every dependent in `list`, depth-first, in registration order.
///
/// The list is borrowed only long enough to take a snapshot. Dead entries
/// are pruned afterwards.
pub(crate) fn notify_all(list: &std::cell::RefCell<Dependents>) {
    let snapshot = list.borrow().snapshot();
    let mut saw_dead = false;
    for slot in snapshot {
        match slot.upgrade() {
            Some(dependent) => dependent.notify(),
            None => saw_dead = true,
        }
    }
    if saw_dead {
        list.borrow_mut().prune();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    struct Counter(Cell<u32>);

    impl Dependent for Counter {
        fn notify(&self) {
            self.0.set(self.0.get() + 1);
        }
    }

    fn weak_of(rc: &Rc<Counter>) -> DependentRef {
        let weak: Weak<Counter> = Rc::downgrade(rc);
        weak
    }

    #[test]
    fn version_wraps() {
        let v = Version(u32::MAX);
        assert_eq!(v.next(), Version::INITIAL);
        assert_ne!(Version::INITIAL.next(), Version::INITIAL);
    }

    #[test]
    fn single_dependent_stays_inline() {
        let a = Rc::new(Counter(Cell::new(0)));
        let b = Rc::new(Counter(Cell::new(0)));
        let mut deps = Dependents::default();
        deps.register(weak_of(&a));
        assert!(!deps.spilled());
        deps.register(weak_of(&b));
        assert!(deps.spilled());
        assert_eq!(deps.len(), 2);
    }

    #[test]
    fn unregister_removes_one_registration() {
        let a = Rc::new(Counter(Cell::new(0)));
        let mut deps = Dependents::default();
        deps.register(weak_of(&a));
        deps.register(weak_of(&a));
        assert!(deps.unregister(&weak_of(&a)));
        assert_eq!(deps.len(), 1);
        assert!(deps.unregister(&weak_of(&a)));
        assert!(!deps.unregister(&weak_of(&a)));
    }

    #[test]
    fn dead_dependents_are_skipped_and_pruned() {
        let live = Rc::new(Counter(Cell::new(0)));
        let list = RefCell::new(Dependents::default());
        {
            let dead = Rc::new(Counter(Cell::new(0)));
            list.borrow_mut().register(weak_of(&dead));
        }
        list.borrow_mut().register(weak_of(&live));
        notify_all(&list);
        assert_eq!(live.0.get(), 1);
        assert_eq!(list.borrow().len(), 1);
    }
}
