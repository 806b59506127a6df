#![forbid(unsafe_code)]

//! Side-effect units driven by signal versions.
//!
//! An effect is inert until it is attached to an owner (in the runtime, the
//! fiber that created it). Writes to a tracked signal notify the owner; the
//! owner later calls [`EffectUnit::run_if_dirty`] from its update pass. A
//! write never runs an effect directly.
//!
//! # Invariants
//!
//! 1. `run_if_dirty` is a no-op on a clean effect.
//! 2. The cleanup returned by run N executes before run N+1 starts, or at
//!    disposal, and never twice.
//! 3. `has_run` turns true on the first run and never turns false again.
//! 4. After `dispose`, the effect holds no subscriptions and never runs.
//! 5. Versions are stamped before the body runs, so a write made from inside
//!    the body leaves the effect dirty for the next pass.

use std::fmt;

use crate::graph::DependentRef;
use crate::pool::PoolRegistry;
use crate::signal::{ReadSignal, Readable};
use crate::subscriptions::{DynamicDependencies, Subscriptions};

/// A deferred release step returned by an effect body.
#[derive(Default)]
pub struct Cleanup(Option<Box<dyn FnOnce()>>);

impl Cleanup {
    /// Wrap a release closure.
    pub fn new(f: impl FnOnce() + 'static) -> Self {
        Self(Some(Box::new(f)))
    }

    /// A cleanup that does nothing.
    #[must_use]
    pub fn none() -> Self {
        Self(None)
    }

    /// Whether there is anything to run.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    fn run(self) {
        if let Some(f) = self.0 {
            f();
        }
    }
}

impl fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Cleanup").field(&self.0.is_some()).finish()
    }
}

impl From<()> for Cleanup {
    fn from((): ()) -> Self {
        Self::none()
    }
}

impl From<Option<Cleanup>> for Cleanup {
    fn from(cleanup: Option<Cleanup>) -> Self {
        cleanup.unwrap_or_default()
    }
}

fn into_cleanup<C: Into<Cleanup>>(cleanup: C) -> Cleanup {
    cleanup.into()
}

/// Object-safe interface the runtime drives effects through.
pub trait EffectUnit {
    /// Bind tracked signals to `owner` so writes reach it.
    fn attach(&mut self, owner: DependentRef);

    /// Whether the next `run_if_dirty` would run the body.
    fn is_dirty(&self) -> bool;

    /// Run cleanup then body if dirty. Returns whether the body ran.
    fn run_if_dirty(&mut self) -> bool;

    /// Whether the body has run at least once.
    fn has_run(&self) -> bool;

    /// Run the pending cleanup and drop every subscription. Idempotent.
    fn dispose(&mut self);

    /// Hand pooled parts back after disposal.
    fn recycle(self: Box<Self>, _pools: &mut PoolRegistry) {}
}

/// Shared run bookkeeping.
#[derive(Default)]
struct RunState {
    cleanup: Option<Cleanup>,
    has_run: bool,
    disposed: bool,
}

impl RunState {
    fn release(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup.run();
        }
    }
}

/// An effect over a fixed set of zero to three signals.
///
/// With no signals it is a one-shot: it runs once after mount and its
/// cleanup runs at teardown. Bodies receive snapshots of the tracked values,
/// so they are free to write back to the signals they read.
pub struct Effect {
    deps: Subscriptions,
    body: Box<dyn FnMut() -> Cleanup>,
    state: RunState,
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("deps", &self.deps.len())
            .field("has_run", &self.state.has_run)
            .field("disposed", &self.state.disposed)
            .finish()
    }
}

impl Effect {
    /// A one-shot effect.
    pub fn new<C: Into<Cleanup>>(mut body: impl FnMut() -> C + 'static) -> Self {
        Self {
            deps: Subscriptions::new(),
            body: Box::new(move || into_cleanup(body())),
            state: RunState::default(),
        }
    }

    /// An effect re-run whenever `a` changes.
    pub fn on<A, RA, C>(a: &RA, mut body: impl FnMut(&A) -> C + 'static) -> Self
    where
        A: Clone,
        RA: Readable<A> + Clone + 'static,
        C: Into<Cleanup>,
    {
        let ra = a.clone();
        let mut deps = Subscriptions::new();
        deps.add(a.tracked());
        Self {
            deps,
            body: Box::new(move || {
                let va = ra.with_value(A::clone);
                into_cleanup(body(&va))
            }),
            state: RunState::default(),
        }
    }

    /// An effect re-run whenever `a` or `b` changes.
    pub fn on2<A, B, RA, RB, C>(a: &RA, b: &RB, mut body: impl FnMut(&A, &B) -> C + 'static) -> Self
    where
        A: Clone,
        B: Clone,
        RA: Readable<A> + Clone + 'static,
        RB: Readable<B> + Clone + 'static,
        C: Into<Cleanup>,
    {
        let (ra, rb) = (a.clone(), b.clone());
        let mut deps = Subscriptions::new();
        deps.add(a.tracked());
        deps.add(b.tracked());
        Self {
            deps,
            body: Box::new(move || {
                let va = ra.with_value(A::clone);
                let vb = rb.with_value(B::clone);
                into_cleanup(body(&va, &vb))
            }),
            state: RunState::default(),
        }
    }

    /// An effect re-run whenever `a`, `b` or `c` changes.
    pub fn on3<A, B, D, RA, RB, RD, C>(
        a: &RA,
        b: &RB,
        d: &RD,
        mut body: impl FnMut(&A, &B, &D) -> C + 'static,
    ) -> Self
    where
        A: Clone,
        B: Clone,
        D: Clone,
        RA: Readable<A> + Clone + 'static,
        RB: Readable<B> + Clone + 'static,
        RD: Readable<D> + Clone + 'static,
        C: Into<Cleanup>,
    {
        let (ra, rb, rd) = (a.clone(), b.clone(), d.clone());
        let mut deps = Subscriptions::new();
        deps.add(a.tracked());
        deps.add(b.tracked());
        deps.add(d.tracked());
        Self {
            deps,
            body: Box::new(move || {
                let va = ra.with_value(A::clone);
                let vb = rb.with_value(B::clone);
                let vd = rd.with_value(D::clone);
                into_cleanup(body(&va, &vb, &vd))
            }),
            state: RunState::default(),
        }
    }

    /// Number of tracked signals.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.deps.len()
    }
}

impl EffectUnit for Effect {
    fn attach(&mut self, owner: DependentRef) {
        self.deps.bind(owner);
    }

    fn is_dirty(&self) -> bool {
        !self.state.disposed && (!self.state.has_run || self.deps.is_stale())
    }

    fn run_if_dirty(&mut self) -> bool {
        if !self.is_dirty() {
            return false;
        }
        self.state.release();
        self.deps.mark_observed();
        self.state.cleanup = Some((self.body)());
        self.state.has_run = true;
        true
    }

    fn has_run(&self) -> bool {
        self.state.has_run
    }

    fn dispose(&mut self) {
        if self.state.disposed {
            return;
        }
        self.state.disposed = true;
        self.state.release();
        self.deps.clear();
    }
}

type DynamicBody<T> = Box<dyn FnMut(&mut DynamicDependencies<T>) -> Cleanup>;

/// An effect over a runtime-sized list of signals.
///
/// The body receives the dependency list mutably and may add or remove
/// signals; anything it removes is unregistered immediately.
pub struct DynamicEffect<T> {
    deps: DynamicDependencies<T>,
    body: DynamicBody<T>,
    state: RunState,
}

impl<T> fmt::Debug for DynamicEffect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicEffect")
            .field("deps", &self.deps)
            .field("has_run", &self.state.has_run)
            .finish()
    }
}

impl<T: 'static> DynamicEffect<T> {
    /// Create an effect tracking `initial`.
    pub fn new<C: Into<Cleanup>>(
        initial: impl IntoIterator<Item = ReadSignal<T>>,
        body: impl FnMut(&mut DynamicDependencies<T>) -> C + 'static,
    ) -> Self {
        Self::with_dependencies(DynamicDependencies::new(), initial, body)
    }

    /// Create an effect over a (typically pooled) dependency set.
    pub fn with_dependencies<C: Into<Cleanup>>(
        mut deps: DynamicDependencies<T>,
        initial: impl IntoIterator<Item = ReadSignal<T>>,
        mut body: impl FnMut(&mut DynamicDependencies<T>) -> C + 'static,
    ) -> Self {
        for signal in initial {
            deps.add(signal);
        }
        Self {
            deps,
            body: Box::new(move |deps: &mut DynamicDependencies<T>| into_cleanup(body(deps))),
            state: RunState::default(),
        }
    }

    /// The tracked signals.
    #[must_use]
    pub fn dependencies(&self) -> &DynamicDependencies<T> {
        &self.deps
    }
}

impl<T: 'static> EffectUnit for DynamicEffect<T> {
    fn attach(&mut self, owner: DependentRef) {
        self.deps.bind(owner);
    }

    fn is_dirty(&self) -> bool {
        !self.state.disposed && (!self.state.has_run || self.deps.is_stale())
    }

    fn run_if_dirty(&mut self) -> bool {
        if !self.is_dirty() {
            return false;
        }
        self.state.release();
        self.deps.mark_observed();
        self.state.cleanup = Some((self.body)(&mut self.deps));
        self.deps.mark_new_observed();
        self.state.has_run = true;
        true
    }

    fn has_run(&self) -> bool {
        self.state.has_run
    }

    fn dispose(&mut self) {
        if self.state.disposed {
            return;
        }
        self.state.disposed = true;
        self.state.release();
        self.deps.clear();
    }

    fn recycle(self: Box<Self>, pools: &mut PoolRegistry) {
        let this = *self;
        pools.release(this.deps);
    }
}
