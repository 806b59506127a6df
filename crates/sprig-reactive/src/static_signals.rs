#![forbid(unsafe_code)]

//! Value-keyed signal memoization.
//!
//! [`StaticSignals`] hands out one shared [`Signal<T>`] per distinct value of
//! `T` (compared with `Eq`/`Hash`). Components that only need a constant
//! signal (a fixed label, a `true` guard) can ask for it here instead of
//! allocating a fresh cell on every render. The registry is an ordinary owned
//! object: whoever creates it decides when it is cleared.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::Hash;

use ahash::AHashMap;

use crate::signal::Signal;

/// Caller-owned cache of constant signals keyed by value.
#[derive(Default)]
pub struct StaticSignals {
    by_type: AHashMap<TypeId, Box<dyn Any>>,
}

impl fmt::Debug for StaticSignals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticSignals")
            .field("types", &self.by_type.len())
            .finish()
    }
}

impl StaticSignals {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The shared signal for `value`, created on first request.
    pub fn get<T>(&mut self, value: T) -> Signal<T>
    where
        T: Hash + Eq + Clone + 'static,
    {
        self.by_type
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(AHashMap::<T, Signal<T>>::new()))
            .downcast_mut::<AHashMap<T, Signal<T>>>()
            .unwrap_or_else(|| unreachable!("static signal table is keyed by TypeId"))
            .entry(value.clone())
            .or_insert_with(|| Signal::new(value))
            .clone()
    }

    /// Number of memoized signals of type `T`.
    #[must_use]
    pub fn len_of<T: 'static>(&self) -> usize {
        self.by_type
            .get(&TypeId::of::<T>())
            .and_then(|table| table.downcast_ref::<AHashMap<T, Signal<T>>>())
            .map_or(0, |table| table.len())
    }

    /// Forget every memoized signal.
    pub fn clear(&mut self) {
        self.by_type.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_values_share_a_signal() {
        let mut statics = StaticSignals::new();
        let a = statics.get(true);
        let b = statics.get(true);
        let c = statics.get(false);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(statics.len_of::<bool>(), 2);
    }

    #[test]
    fn types_are_kept_apart() {
        let mut statics = StaticSignals::new();
        let _ = statics.get(1_u32);
        let _ = statics.get("x".to_string());
        assert_eq!(statics.len_of::<u32>(), 1);
        assert_eq!(statics.len_of::<String>(), 1);
        statics.clear();
        assert_eq!(statics.len_of::<u32>(), 0);
    }
}
