#![forbid(unsafe_code)]

//! Free lists for recyclable reactive objects.
//!
//! A [`Pool<T>`] hands out recycled instances after running their
//! [`Poolable::reset`] step, which is the re-entry point that must leave the
//! instance indistinguishable from a fresh `T::default()`. [`PoolRegistry`]
//! keeps one pool per concrete type.

use std::any::{Any, TypeId};
use std::fmt;

use ahash::AHashMap;

/// An object that can be returned to a [`Pool`] and handed out again.
pub trait Poolable: Default {
    /// Drop every piece of per-use state (subscriptions included).
    fn reset(&mut self);
}

/// Counters describing pool traffic.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Instances built with `Default`.
    pub created: u64,
    /// Instances handed out from the free list.
    pub reused: u64,
    /// Instances currently waiting in the free list.
    pub idle: usize,
}

/// A free list of `T`.
pub struct Pool<T> {
    free: Vec<T>,
    created: u64,
    reused: u64,
    capacity: usize,
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("idle", &self.free.len())
            .field("created", &self.created)
            .field("reused", &self.reused)
            .finish()
    }
}

/// Default upper bound on idle instances kept per pool.
pub const DEFAULT_POOL_CAPACITY: usize = 256;

impl<T: Poolable> Default for Pool<T> {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_POOL_CAPACITY)
    }
}

impl<T: Poolable> Pool<T> {
    /// Create a pool keeping at most `capacity` idle instances.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            free: Vec::new(),
            created: 0,
            reused: 0,
            capacity,
        }
    }

    /// Take an instance, recycling one if available.
    pub fn acquire(&mut self) -> T {
        match self.free.pop() {
            Some(mut item) => {
                item.reset();
                self.reused += 1;
                item
            }
            None => {
                self.created += 1;
                T::default()
            }
        }
    }

    /// Give an instance back. It is reset immediately.
    pub fn release(&mut self, mut item: T) {
        item.reset();
        if self.free.len() < self.capacity {
            self.free.push(item);
        }
    }

    /// Traffic counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            created: self.created,
            reused: self.reused,
            idle: self.free.len(),
        }
    }
}

/// One [`Pool`] per concrete type, created on first use.
#[derive(Default)]
pub struct PoolRegistry {
    pools: AHashMap<TypeId, Box<dyn Any>>,
}

impl fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("pools", &self.pools.len())
            .finish()
    }
}

impl PoolRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The pool for `T`.
    pub fn pool<T: Poolable + 'static>(&mut self) -> &mut Pool<T> {
        self.pools
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(Pool::<T>::default()))
            .downcast_mut::<Pool<T>>()
            .unwrap_or_else(|| unreachable!("pool registry is keyed by TypeId"))
    }

    /// Take a `T` from its pool.
    pub fn acquire<T: Poolable + 'static>(&mut self) -> T {
        let item = self.pool::<T>().acquire();
        #[cfg(feature = "tracing")]
        tracing::trace!(
            pool = std::any::type_name::<T>(),
            reused = self.pool::<T>().stats().reused,
            "pool.acquire"
        );
        item
    }

    /// Return a `T` to its pool.
    pub fn release<T: Poolable + 'static>(&mut self, item: T) {
        self.pool::<T>().release(item);
    }

    /// Counters for `T`'s pool, if one exists.
    #[must_use]
    pub fn stats<T: Poolable + 'static>(&self) -> Option<PoolStats> {
        self.pools
            .get(&TypeId::of::<T>())
            .and_then(|pool| pool.downcast_ref::<Pool<T>>())
            .map(Pool::stats)
    }
}
