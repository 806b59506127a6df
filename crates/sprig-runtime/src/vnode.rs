#![forbid(unsafe_code)]

//! Declarative virtual nodes.
//!
//! A [`VirtualNode`] is an immutable description the reconciler expands into
//! fibers. The set of built-in constructs is closed; user code plugs in
//! through [`Component`] (a render capability) and [`VirtualNode::Native`]
//! (handed to a backend extension).
//!
//! Every variant clones in O(1): children live behind `Rc<[_]>`.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use sprig_reactive::{ReadSignal, Readable, Tracked};

use crate::context::RenderCx;
use crate::native::NativeElement;

/// Shared, immutable child list.
pub type Children = Rc<[VirtualNode]>;

fn children(items: impl IntoIterator<Item = VirtualNode>) -> Children {
    items.into_iter().collect::<Vec<_>>().into()
}

/// A custom component. `render` is called once, when its fiber is rendered.
pub trait Component {
    fn render(&self, cx: &mut RenderCx<'_>) -> VirtualNode;
}

impl<F> Component for F
where
    F: Fn(&mut RenderCx<'_>) -> VirtualNode,
{
    fn render(&self, cx: &mut RenderCx<'_>) -> VirtualNode {
        self(cx)
    }
}

/// Identity of an item in a keyed list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Str(Rc<str>),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<u32> for Key {
    fn from(n: u32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<usize> for Key {
    fn from(n: usize) -> Self {
        Self::Int(n as i64)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::Str(s.into())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::Str(s.into())
    }
}

impl From<Rc<str>> for Key {
    fn from(s: Rc<str>) -> Self {
        Self::Str(s)
    }
}

/// The list behind a `For` construct.
pub trait ListSource {
    /// Version source the `For` fiber subscribes to.
    fn tracked(&self) -> Rc<dyn Tracked>;

    /// Keys of the current snapshot, in order.
    fn keys(&self) -> Vec<Key>;

    /// Body for the item at `index` of the current snapshot.
    fn render_item(&self, index: usize) -> Option<VirtualNode>;
}

struct KeyedList<T, L> {
    list: L,
    key: Box<dyn Fn(&T) -> Key>,
    render: Box<dyn Fn(&T) -> VirtualNode>,
    _item: PhantomData<fn(&T)>,
}

impl<T, L> ListSource for KeyedList<T, L>
where
    T: Clone + 'static,
    L: Readable<Vec<T>>,
{
    fn tracked(&self) -> Rc<dyn Tracked> {
        self.list.tracked()
    }

    fn keys(&self) -> Vec<Key> {
        self.list
            .with_value(|items| items.iter().map(|item| (self.key)(item)).collect())
    }

    fn render_item(&self, index: usize) -> Option<VirtualNode> {
        let item = self.list.with_value(|items| items.get(index).cloned())?;
        Some((self.render)(&item))
    }
}

/// One guarded branch of a `Switch`.
#[derive(Clone)]
pub struct MatchArm {
    pub when: ReadSignal<bool>,
    pub children: Children,
}

/// Declarative description of a subtree.
#[derive(Clone)]
pub enum VirtualNode {
    /// User component.
    Component(Rc<dyn Component>),
    /// Publishes `value` to descendants looking up its type.
    Provider { value: Rc<dyn Any>, children: Children },
    Fragment(Children),
    /// Children are enabled while `when` is true.
    Enable { when: ReadSignal<bool>, children: Children },
    /// Children are visible while `when` is true.
    Visible { when: ReadSignal<bool>, children: Children },
    /// Enable and Visible at once.
    Active { when: ReadSignal<bool>, children: Children },
    /// Children exist only while `when` is true.
    Mount { when: ReadSignal<bool>, children: Children },
    /// Keyed list.
    For(Rc<dyn ListSource>),
    /// First `Match` child whose guard holds, else `fallback`.
    Switch { arms: Children, fallback: Children },
    Match(MatchArm),
    /// Relocates descendant natives into the destination named by
    /// `destination`, or leaves them in place when it is `None`.
    Portal {
        destination: ReadSignal<Option<String>>,
        children: Children,
    },
    /// Target for portals, registered under `id` while mounted.
    PortalDestination { id: Rc<str>, children: Children },
    /// Backend node.
    Native(NativeElement),
}

impl fmt::Debug for VirtualNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(element) => f.debug_tuple("Native").field(element).finish(),
            Self::PortalDestination { id, .. } => {
                f.debug_tuple("PortalDestination").field(id).finish()
            }
            other => f.write_str(other.kind()),
        }
    }
}

impl VirtualNode {
    /// Variant name, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Component(_) => "Component",
            Self::Provider { .. } => "Provider",
            Self::Fragment(_) => "Fragment",
            Self::Enable { .. } => "Enable",
            Self::Visible { .. } => "Visible",
            Self::Active { .. } => "Active",
            Self::Mount { .. } => "Mount",
            Self::For(_) => "For",
            Self::Switch { .. } => "Switch",
            Self::Match(_) => "Match",
            Self::Portal { .. } => "Portal",
            Self::PortalDestination { .. } => "PortalDestination",
            Self::Native(_) => "Native",
        }
    }

    /// A node that renders nothing.
    #[must_use]
    pub fn empty() -> Self {
        Self::Fragment(children([]))
    }

    pub fn component(render: impl Fn(&mut RenderCx<'_>) -> VirtualNode + 'static) -> Self {
        Self::Component(Rc::new(render))
    }

    pub fn from_component(component: impl Component + 'static) -> Self {
        Self::Component(Rc::new(component))
    }

    pub fn provider<T: 'static>(value: T, body: impl IntoIterator<Item = VirtualNode>) -> Self {
        Self::Provider {
            value: Rc::new(value),
            children: children(body),
        }
    }

    pub fn fragment(body: impl IntoIterator<Item = VirtualNode>) -> Self {
        Self::Fragment(children(body))
    }

    pub fn enable(
        when: impl Into<ReadSignal<bool>>,
        body: impl IntoIterator<Item = VirtualNode>,
    ) -> Self {
        Self::Enable {
            when: when.into(),
            children: children(body),
        }
    }

    pub fn visible(
        when: impl Into<ReadSignal<bool>>,
        body: impl IntoIterator<Item = VirtualNode>,
    ) -> Self {
        Self::Visible {
            when: when.into(),
            children: children(body),
        }
    }

    pub fn active(
        when: impl Into<ReadSignal<bool>>,
        body: impl IntoIterator<Item = VirtualNode>,
    ) -> Self {
        Self::Active {
            when: when.into(),
            children: children(body),
        }
    }

    pub fn mount(
        when: impl Into<ReadSignal<bool>>,
        body: impl IntoIterator<Item = VirtualNode>,
    ) -> Self {
        Self::Mount {
            when: when.into(),
            children: children(body),
        }
    }

    /// Keyed list over `list`. Items are cloned out of the list before
    /// `render` sees them, so `render` may write to the list.
    pub fn for_each<T, L, K>(
        list: L,
        key: impl Fn(&T) -> K + 'static,
        render: impl Fn(&T) -> VirtualNode + 'static,
    ) -> Self
    where
        T: Clone + 'static,
        L: Readable<Vec<T>> + 'static,
        K: Into<Key>,
    {
        Self::For(Rc::new(KeyedList {
            list,
            key: Box::new(move |item: &T| key(item).into()),
            render: Box::new(render),
            _item: PhantomData,
        }))
    }

    pub fn switch(
        arms: impl IntoIterator<Item = VirtualNode>,
        fallback: impl IntoIterator<Item = VirtualNode>,
    ) -> Self {
        Self::Switch {
            arms: children(arms),
            fallback: children(fallback),
        }
    }

    /// A `Switch` arm.
    pub fn matches(
        when: impl Into<ReadSignal<bool>>,
        body: impl IntoIterator<Item = VirtualNode>,
    ) -> Self {
        Self::Match(MatchArm {
            when: when.into(),
            children: children(body),
        })
    }

    pub fn portal(
        destination: impl Into<ReadSignal<Option<String>>>,
        body: impl IntoIterator<Item = VirtualNode>,
    ) -> Self {
        Self::Portal {
            destination: destination.into(),
            children: children(body),
        }
    }

    pub fn portal_destination(
        id: impl Into<Rc<str>>,
        body: impl IntoIterator<Item = VirtualNode>,
    ) -> Self {
        Self::PortalDestination {
            id: id.into(),
            children: children(body),
        }
    }

    pub fn native<P: 'static>(
        type_name: &'static str,
        props: P,
        body: impl IntoIterator<Item = VirtualNode>,
    ) -> Self {
        Self::Native(NativeElement {
            type_name,
            props: Rc::new(props),
            children: children(body),
        })
    }

    /// Direct children, for the variants that carry a static child list.
    #[must_use]
    pub fn children(&self) -> &[VirtualNode] {
        match self {
            Self::Provider { children, .. }
            | Self::Fragment(children)
            | Self::Enable { children, .. }
            | Self::Visible { children, .. }
            | Self::Active { children, .. }
            | Self::Mount { children, .. }
            | Self::Portal { children, .. }
            | Self::PortalDestination { children, .. } => children,
            Self::Match(arm) => &arm.children,
            Self::Native(element) => &element.children,
            Self::Component(_) | Self::For(_) | Self::Switch { .. } => &[],
        }
    }
}
