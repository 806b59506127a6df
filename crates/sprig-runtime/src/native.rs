#![forbid(unsafe_code)]

//! Backend contracts.
//!
//! The runtime never inspects backend state. It calls [`NativeNode`] methods
//! at commit time and during the update pass, and asks registered
//! [`RendererExtension`]s to build natives for [`NativeElement`] nodes.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::fiber::FiberView;
use crate::vnode::Children;

/// Shared handle to a backend node.
pub type NativeHandle = Rc<dyn NativeNode>;

/// A node in the backend's own tree.
///
/// Methods take `&self`; backends keep their mutable state behind interior
/// mutability, the same way signals do.
pub trait NativeNode {
    /// Insert `child` so that it ends up at `index`.
    fn add_child(&self, child: &NativeHandle, index: usize);

    /// Detach `child`. `destroy` is true when the child is going away for
    /// good, false when it is about to be reinserted elsewhere.
    fn remove_child(&self, child: &NativeHandle, destroy: bool);

    /// Move `child`, already a child of this node, so that it ends up at
    /// `index`.
    fn move_child(&self, child: &NativeHandle, index: usize);

    /// Per-frame update, called from the update pass while enabled.
    fn update(&self);

    /// Release backend resources. Called once, bottom-up, at unmount.
    fn cleanup(&self);

    fn set_visible(&self, visible: bool);

    /// Concrete backend type, for backends that need to recover their own
    /// node from a child handle.
    fn as_any(&self) -> &dyn Any;
}

/// Factory for native nodes. The first extension that claims an element
/// builds its native.
pub trait RendererExtension {
    fn owns_component_type(&self, element: &NativeElement) -> bool;

    /// Build the native for a claimed element. Returning `None` for a claimed
    /// element is a contract violation and aborts the render.
    fn create_native_node(&self, fiber: &FiberView<'_>) -> Option<NativeHandle>;
}

/// Description of a backend node: a type name, opaque props and children.
#[derive(Clone)]
pub struct NativeElement {
    pub type_name: &'static str,
    pub props: Rc<dyn Any>,
    pub children: Children,
}

impl NativeElement {
    /// Props downcast to `P`.
    #[must_use]
    pub fn props<P: 'static>(&self) -> Option<&P> {
        self.props.downcast_ref::<P>()
    }
}

impl fmt::Debug for NativeElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeElement")
            .field("type_name", &self.type_name)
            .field("children", &self.children.len())
            .finish()
    }
}
