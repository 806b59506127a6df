#![forbid(unsafe_code)]

//! Lazily recomputed values derived from other reactive cells.
//!
//! # Design
//!
//! [`Computed<T>`] owns its compute function, the cached result and one
//! version stamp per upstream source. It registers itself as a dependent of
//! every source at construction and forwards each notification to its own
//! dependents, so a fiber watching a computed value hears about writes to the
//! values underneath it.
//!
//! Staleness is decided from versions alone: the cache is stale when any
//! upstream version differs from the stamp taken at the last recompute.
//! Asking a computed value for its version refreshes it first, so chains of
//! computed values resolve from the bottom up no matter in which order
//! notifications arrived.
//!
//! # Invariants
//!
//! 1. `get()` never returns a value computed against older upstream versions.
//! 2. Two `get()` calls with no upstream write in between run the compute
//!    function at most once.
//! 3. The computed version changes exactly once per recompute.
//! 4. The cleanup hook sees every replaced value exactly once, and the last
//!    cached value when the computed is dropped.
//!
//! # Failure Modes
//!
//! - **Cycle**: a compute function that reads its own computed value panics
//!   with a descriptive message instead of recursing forever.
//! - **Source dropped**: sources are held strongly for the lifetime of the
//!   computed, so a handle can never observe a vanished source.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::graph::{Dependent, DependentRef, Dependents, Tracked, Version, notify_all};
use crate::signal::Readable;

type Cleanup<T> = Box<dyn FnMut(T)>;

/// Shared interior for [`Computed<T>`].
struct ComputedInner<T> {
    compute: Box<dyn Fn() -> T>,
    cleanup: RefCell<Option<Cleanup<T>>>,
    cached: RefCell<Option<T>>,
    sources: Vec<Rc<dyn Tracked>>,
    /// Upstream versions at the last recompute, parallel to `sources`.
    stamps: RefCell<Vec<Option<Version>>>,
    version: Cell<Version>,
    forced: Cell<bool>,
    computing: Cell<bool>,
    recomputes: Cell<u64>,
    dependents: RefCell<Dependents>,
    me: DependentRef,
}

/// Holds the re-entrancy flag for one recompute and clears it on exit,
/// including when the compute function unwinds.
struct ComputingGuard<'a>(&'a Cell<bool>);

impl<'a> ComputingGuard<'a> {
    fn enter(flag: &'a Cell<bool>) -> Self {
        flag.set(true);
        Self(flag)
    }
}

impl Drop for ComputingGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<T> ComputedInner<T> {
    fn is_stale(&self) -> bool {
        if self.forced.get() || self.cached.borrow().is_none() {
            return true;
        }
        let stamps = self.stamps.borrow();
        self.sources
            .iter()
            .zip(stamps.iter())
            .any(|(source, seen)| Some(source.version()) != *seen)
    }

    fn refresh(&self) {
        assert!(
            !self.computing.get(),
            "computed value read itself while recomputing (dependency cycle)"
        );
        if !self.is_stale() {
            return;
        }
        let versions: Vec<Option<Version>> =
            self.sources.iter().map(|s| Some(s.version())).collect();

        let value = {
            let _guard = ComputingGuard::enter(&self.computing);
            (self.compute)()
        };

        if let Some(previous) = self.cached.replace(Some(value)) {
            let mut cleanup = self.cleanup.borrow_mut();
            if let Some(cleanup) = cleanup.as_mut() {
                cleanup(previous);
            }
        }
        *self.stamps.borrow_mut() = versions;
        self.forced.set(false);
        self.version.set(self.version.get().next());
        self.recomputes.set(self.recomputes.get() + 1);
    }
}

impl<T> Dependent for ComputedInner<T> {
    fn notify(&self) {
        notify_all(&self.dependents);
    }
}

impl<T> Tracked for ComputedInner<T> {
    fn version(&self) -> Version {
        self.refresh();
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

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        for source in &self.sources {
            source.unregister_dependent(&self.me);
        }
        if let Some(last) = self.cached.get_mut().take()
            && let Some(cleanup) = self.cleanup.get_mut().as_mut()
        {
            cleanup(last);
        }
    }
}

/// A lazily-evaluated, memoized value derived from one or more sources.
///
/// Cloning a `Computed` creates a new handle to the **same** inner state.
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("cached", &*self.inner.cached.borrow())
            .field("version", &self.inner.version.get())
            .field("sources", &self.inner.sources.len())
            .finish()
    }
}

impl<T: 'static> Computed<T> {
    /// Create a computed value over an explicit source list.
    ///
    /// `compute` is expected to read exactly the values behind `sources`;
    /// any arity works, one per upstream.
    pub fn from_sources(sources: Vec<Rc<dyn Tracked>>, compute: impl Fn() -> T + 'static) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<ComputedInner<T>>| {
            let me: DependentRef = weak.clone();
            for source in &sources {
                source.register_dependent(me.clone());
            }
            let stamps = vec![None; sources.len()];
            ComputedInner {
                compute: Box::new(compute),
                cleanup: RefCell::new(None),
                cached: RefCell::new(None),
                sources,
                stamps: RefCell::new(stamps),
                version: Cell::new(Version::INITIAL),
                forced: Cell::new(false),
                computing: Cell::new(false),
                recomputes: Cell::new(0),
                dependents: RefCell::new(Dependents::default()),
                me,
            }
        });
        Self { inner }
    }

    /// Derive from a single source.
    pub fn map<S, R>(source: &R, map: impl Fn(&S) -> T + 'static) -> Self
    where
        R: Readable<S> + Clone + 'static,
    {
        let reader = source.clone();
        Self::from_sources(vec![source.tracked()], move || reader.with_value(&map))
    }

    /// Derive from two sources.
    pub fn map2<S1, S2, R1, R2>(s1: &R1, s2: &R2, map: impl Fn(&S1, &S2) -> T + 'static) -> Self
    where
        R1: Readable<S1> + Clone + 'static,
        R2: Readable<S2> + Clone + 'static,
    {
        let (r1, r2) = (s1.clone(), s2.clone());
        Self::from_sources(vec![s1.tracked(), s2.tracked()], move || {
            r1.with_value(|v1| r2.with_value(|v2| map(v1, v2)))
        })
    }

    /// Derive from three sources.
    pub fn map3<S1, S2, S3, R1, R2, R3>(
        s1: &R1,
        s2: &R2,
        s3: &R3,
        map: impl Fn(&S1, &S2, &S3) -> T + 'static,
    ) -> Self
    where
        R1: Readable<S1> + Clone + 'static,
        R2: Readable<S2> + Clone + 'static,
        R3: Readable<S3> + Clone + 'static,
    {
        let (r1, r2, r3) = (s1.clone(), s2.clone(), s3.clone());
        Self::from_sources(vec![s1.tracked(), s2.tracked(), s3.tracked()], move || {
            r1.with_value(|v1| r2.with_value(|v2| r3.with_value(|v3| map(v1, v2, v3))))
        })
    }

    /// Install a hook that receives each replaced value.
    #[must_use]
    pub fn with_cleanup(self, cleanup: impl FnMut(T) + 'static) -> Self {
        *self.inner.cleanup.borrow_mut() = Some(Box::new(cleanup));
        self
    }

    /// Current value, recomputing first if any source changed.
    #[must_use]
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Borrow the current value, recomputing first if needed.
    ///
    /// # Panics
    ///
    /// Panics if `f` reads this same computed value mutably through a
    /// recompute (a dependency cycle).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.refresh();
        let cached = self.inner.cached.borrow();
        match cached.as_ref() {
            Some(value) => f(value),
            None => unreachable!("refresh always fills the cache"),
        }
    }

    /// Whether the next read will recompute.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        self.inner.is_stale()
    }

    /// Force the next read to recompute.
    pub fn invalidate(&self) {
        self.inner.forced.set(true);
        notify_all(&self.inner.dependents);
    }

    /// Current version, refreshing first.
    #[must_use]
    pub fn version(&self) -> Version {
        self.inner.version()
    }

    /// How many times the compute function has run.
    #[must_use]
    pub fn recompute_count(&self) -> u64 {
        self.inner.recomputes.get()
    }

    /// Number of registered dependents.
    #[must_use]
    pub fn dependent_count(&self) -> usize {
        self.inner.dependents.borrow().len()
    }
}

impl<T: 'static> Readable<T> for Computed<T> {
    fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.with(f)
    }

    fn tracked(&self) -> Rc<dyn Tracked> {
        let inner: Rc<ComputedInner<T>> = Rc::clone(&self.inner);
        inner
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Signal;

    #[test]
    fn single_source() {
        let source = Signal::new(10);
        let doubled = Computed::map(&source, |v| v * 2);

        assert_eq!(doubled.get(), 20);
        source.set(5);
        assert!(doubled.is_stale());
        assert_eq!(doubled.get(), 10);
    }

    #[test]
    fn two_and_three_sources() {
        let w = Signal::new(10);
        let h = Signal::new(20);
        let d = Signal::new(2);
        let area = Computed::map2(&w, &h, |w, h| w * h);
        let volume = Computed::map3(&w, &h, &d, |w, h, d| w * h * d);

        assert_eq!(area.get(), 200);
        assert_eq!(volume.get(), 400);
        w.set(5);
        assert_eq!(area.get(), 100);
        assert_eq!(volume.get(), 200);
    }

    #[test]
    fn get_twice_computes_once() {
        let source = Signal::new(1);
        let c = Computed::map(&source, |v| v + 1);

        assert_eq!(c.recompute_count(), 0);
        let _ = c.get();
        let _ = c.get();
        assert_eq!(c.recompute_count(), 1);

        source.set(3);
        let _ = c.get();
        let _ = c.get();
        assert_eq!(c.recompute_count(), 2);
    }

    #[test]
    fn version_moves_once_per_recompute() {
        let source = Signal::new(0);
        let c = Computed::map(&source, |v| *v);
        let v1 = c.version();
        assert_eq!(c.version(), v1);
        source.set(1);
        assert_eq!(c.version(), v1.next());
    }

    #[test]
    fn chain_resolves_bottom_up() {
        let a = Signal::new(2);
        let b = Computed::map(&a, |v| v * 10);
        let c = Computed::map(&b, |v| v + 1);

        assert_eq!(c.get(), 21);
        a.set(3);
        assert!(c.is_stale());
        assert_eq!(c.get(), 31);
        assert_eq!(b.recompute_count(), 2);
        assert_eq!(c.recompute_count(), 2);
    }

    #[test]
    fn diamond_reads_consistent_values() {
        let a = Signal::new(10);
        let b = Computed::map(&a, |v| v + 1);
        let c = Computed::map(&a, |v| v * 2);
        let d = Computed::map2(&b, &c, |b, c| b + c);

        assert_eq!(d.get(), 31);
        a.set(5);
        assert_eq!(d.get(), 16);
        assert_eq!(d.recompute_count(), 2);
    }

    #[test]
    fn cleanup_sees_replaced_values() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let source = Signal::new(1);
        let c = Computed::map(&source, |v| *v).with_cleanup(move |old| sink.borrow_mut().push(old));

        let _ = c.get();
        source.set(2);
        let _ = c.get();
        source.set(3);
        let _ = c.get();
        assert_eq!(*seen.borrow(), vec![1, 2]);

        drop(c);
        assert_eq!(*seen.borrow(), vec![1, 2, 3]);
    }

    #[test]
    fn drop_unregisters_from_sources() {
        let source = Signal::new(1);
        let c = Computed::map(&source, |v| *v);
        assert_eq!(source.dependent_count(), 1);
        drop(c);
        assert_eq!(source.dependent_count(), 0);
    }

    #[test]
    fn invalidate_forces_recompute() {
        let source = Signal::new(5);
        let c = Computed::map(&source, |v| *v);
        let _ = c.get();
        c.invalidate();
        assert!(c.is_stale());
        let _ = c.get();
        assert_eq!(c.recompute_count(), 2);
    }

    #[test]
    fn notifications_forward_through_computed() {
        struct Probe(Cell<u32>);
        impl Dependent for Probe {
            fn notify(&self) {
                self.0.set(self.0.get() + 1);
            }
        }

        let source = Signal::new(1);
        let c = Computed::map(&source, |v| *v);
        let probe = Rc::new(Probe(Cell::new(0)));
        let weak: Weak<Probe> = Rc::downgrade(&probe);
        c.tracked().register_dependent(weak);

        source.set(2);
        source.set(3);
        assert_eq!(probe.0.get(), 2);
    }

    #[test]
    fn wide_source_list() {
        let signals: Vec<Signal<i32>> = (1..=7).map(Signal::new).collect();
        let readers = signals.clone();
        let sum = Computed::from_sources(
            signals.iter().map(|s| s.tracked()).collect(),
            move || readers.iter().map(Signal::get).sum::<i32>(),
        );
        assert_eq!(sum.get(), 28);
        signals[6].set(0);
        assert_eq!(sum.get(), 21);
    }

    #[test]
    #[should_panic(expected = "dependency cycle")]
    fn self_read_panics() {
        let slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));
        let inner_slot = Rc::clone(&slot);
        let c = Computed::from_sources(Vec::new(), move || {
            inner_slot.borrow().as_ref().map_or(0, |c| c.get())
        });
        *slot.borrow_mut() = Some(c.clone());
        let _ = c.get();
    }

    #[test]
    fn panicking_compute_does_not_poison_later_reads() {
        let source = Signal::new(-1);
        let checked = Computed::map(&source, |v: &i32| {
            assert!(*v >= 0, "negative input");
            *v * 10
        });

        let first = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| checked.get()));
        assert!(first.is_err());

        source.set(4);
        assert_eq!(checked.get(), 40);
        assert_eq!(checked.recompute_count(), 1);
    }
}
