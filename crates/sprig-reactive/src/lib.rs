#![forbid(unsafe_code)]

//! Fine-grained reactive primitives for the sprig UI runtime.
//!
//! - [`Signal`]: a writable, version-tracked cell.
//! - [`Computed`]: a lazily recomputed value over one or more sources.
//! - [`SignalList`]: a signal over a list with list-shaped mutations.
//! - [`Effect`] / [`DynamicEffect`]: side effects re-run from an owner's
//!   update pass when a tracked version moves.
//! - [`Subscriptions`] / [`DynamicDependencies`]: runtime-sized subscription
//!   sets that can grow and shrink between runs.
//! - [`Pool`] / [`PoolRegistry`]: free lists for recyclable dependency sets.
//! - [`StaticSignals`]: value-keyed memoization of constant signals.
//!
//! # Architecture
//!
//! Cells share state through `Rc`, so every type here is single-threaded.
//! Sources hold their dependents as `Weak` references in an inline-one list.
//! A write bumps the source version and notifies dependents depth-first
//! before returning; dependents decide staleness by comparing versions,
//! never by looking at values.
//!
//! # Invariants
//!
//! 1. A write changes the version exactly once.
//! 2. Notifications arrive in registration order.
//! 3. Whatever registers a dependent unregisters it; dropping a computed
//!    value or a subscription set releases its registrations.
//! 4. Writes never run effects. Owners run dirty effects when they choose.

pub mod computed;
pub mod effect;
pub mod graph;
pub mod pool;
pub mod signal;
pub mod static_signals;
pub mod subscriptions;

pub use computed::Computed;
pub use effect::{Cleanup, DynamicEffect, Effect, EffectUnit};
pub use graph::{Dependent, DependentRef, Tracked, Version};
pub use pool::{Pool, PoolRegistry, PoolStats, Poolable};
pub use signal::{ReadSignal, Readable, Signal, SignalList};
pub use static_signals::StaticSignals;
pub use subscriptions::{DynamicDependencies, Subscriptions};
