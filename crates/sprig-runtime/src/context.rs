#![forbid(unsafe_code)]

//! Component-facing render context.
//!
//! A [`RenderCx`] exists for the duration of one component's `render` call.
//! Effects created through it are attached to the component's fiber: they
//! run first when the fiber mounts, then from the update pass whenever a
//! tracked signal moves, and are disposed when the fiber unmounts.

use std::any::{Any, TypeId, type_name};
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

use ahash::AHashMap;
use sprig_reactive::{
    Cleanup, DynamicDependencies, DynamicEffect, EffectUnit, PoolRegistry, ReadSignal, Signal,
    StaticSignals,
};

use crate::error::{Error, Result, fatal};
use crate::fiber::{FiberId, FiberTree};

/// Type-keyed values registered once, when the renderer is built.
#[derive(Default)]
pub(crate) struct Globals {
    values: AHashMap<TypeId, Rc<dyn Any>>,
}

impl Globals {
    pub(crate) fn insert<T: 'static>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Rc::new(value));
    }

    pub(crate) fn get<T: 'static>(&self) -> Result<Rc<T>> {
        self.values
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|value| value.downcast::<T>().ok())
            .ok_or(Error::MissingGlobal {
                type_name: type_name::<T>(),
            })
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }
}

/// Handle given to [`Component::render`](crate::Component::render).
pub struct RenderCx<'a> {
    fiber: FiberId,
    tree: &'a FiberTree,
    globals: &'a Globals,
    statics: &'a mut StaticSignals,
    pools: &'a mut PoolRegistry,
    effects: Vec<Box<dyn EffectUnit>>,
}

impl fmt::Debug for RenderCx<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderCx")
            .field("fiber", &self.fiber)
            .field("effects", &self.effects.len())
            .finish()
    }
}

impl<'a> RenderCx<'a> {
    pub(crate) fn new(
        fiber: FiberId,
        tree: &'a FiberTree,
        globals: &'a Globals,
        statics: &'a mut StaticSignals,
        pools: &'a mut PoolRegistry,
    ) -> Self {
        Self {
            fiber,
            tree,
            globals,
            statics,
            pools,
            effects: Vec::new(),
        }
    }

    pub(crate) fn into_effects(self) -> Vec<Box<dyn EffectUnit>> {
        self.effects
    }

    /// The fiber being rendered.
    #[must_use]
    pub fn fiber(&self) -> FiberId {
        self.fiber
    }

    /// Attach an effect to this fiber.
    pub fn effect(&mut self, mut effect: impl EffectUnit + 'static) {
        if let Some(node) = self.tree.get(self.fiber) {
            effect.attach(node.dependent());
        }
        self.effects.push(Box::new(effect));
    }

    /// Attach an effect over a runtime-sized signal list. Its dependency set
    /// comes from the renderer's pool and returns there at unmount.
    pub fn dynamic_effect<T, C>(
        &mut self,
        initial: impl IntoIterator<Item = ReadSignal<T>>,
        body: impl FnMut(&mut DynamicDependencies<T>) -> C + 'static,
    ) where
        T: 'static,
        C: Into<Cleanup>,
    {
        let deps = self.pools.acquire::<DynamicDependencies<T>>();
        self.effect(DynamicEffect::with_dependencies(deps, initial, body));
    }

    /// Nearest provided value of type `T`, searching from this fiber up.
    pub fn try_context<T: 'static>(&self) -> Result<Rc<T>> {
        self.tree
            .ancestors_inclusive(self.fiber)
            .filter_map(|node| node.context.clone())
            .find_map(|value| value.downcast::<T>().ok())
            .ok_or(Error::MissingContext {
                type_name: type_name::<T>(),
            })
    }

    /// Like [`try_context`](Self::try_context), aborting when no provider
    /// exists.
    #[track_caller]
    #[must_use]
    pub fn context<T: 'static>(&self) -> Rc<T> {
        self.try_context().unwrap_or_else(|err| fatal(err))
    }

    pub fn try_global<T: 'static>(&self) -> Result<Rc<T>> {
        self.globals.get()
    }

    /// Global registered with the renderer builder, aborting when absent.
    #[track_caller]
    #[must_use]
    pub fn global<T: 'static>(&self) -> Rc<T> {
        self.try_global().unwrap_or_else(|err| fatal(err))
    }

    /// Shared constant signal for `value`.
    pub fn static_signal<T>(&mut self, value: T) -> Signal<T>
    where
        T: Hash + Eq + Clone + 'static,
    {
        self.statics.get(value)
    }

    /// The renderer's pools, for components managing their own dependency
    /// sets.
    pub fn pools(&mut self) -> &mut PoolRegistry {
        &mut *self.pools
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vnode::VirtualNode;

    struct Theme(&'static str);

    #[test]
    fn context_found_on_nearest_provider() {
        let mut tree = FiberTree::new();
        let outer = tree.insert(None, None, None);
        let inner = tree.insert(Some(outer), None, None);
        tree.append_child(outer, inner);
        let leaf = tree.insert(Some(inner), Some(VirtualNode::empty()), None);
        tree.append_child(inner, leaf);
        if let Some(node) = tree.get_mut(outer) {
            node.context = Some(Rc::new(Theme("dark")));
        }
        if let Some(node) = tree.get_mut(inner) {
            node.context = Some(Rc::new(Theme("light")));
        }

        let globals = Globals::default();
        let mut statics = StaticSignals::new();
        let mut pools = PoolRegistry::new();
        let cx = RenderCx::new(leaf, &tree, &globals, &mut statics, &mut pools);
        assert_eq!(cx.context::<Theme>().0, "light");
        assert!(matches!(
            cx.try_context::<u8>(),
            Err(Error::MissingContext { .. })
        ));
    }

    #[test]
    fn globals_by_type() {
        let mut globals = Globals::default();
        globals.insert(42_u32);
        assert_eq!(*globals.get::<u32>().ok().unwrap_or_default(), 42);
        assert!(matches!(
            globals.get::<i64>(),
            Err(Error::MissingGlobal { .. })
        ));
        assert_eq!(globals.len(), 1);
    }

    #[test]
    #[should_panic(expected = "no global of type")]
    fn missing_global_is_fatal() {
        let tree = FiberTree::new();
        let globals = Globals::default();
        let mut statics = StaticSignals::new();
        let mut pools = PoolRegistry::new();
        let cx = RenderCx::new(FiberId::default(), &tree, &globals, &mut statics, &mut pools);
        let _ = cx.global::<String>();
    }
}
