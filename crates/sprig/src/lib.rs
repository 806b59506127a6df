#![forbid(unsafe_code)]

//! sprig public facade crate.
//!
//! Re-exports the reactive layer and, with the default `runtime` feature,
//! the renderer. Most applications only need the prelude.
//!
//! ```rust
//! use sprig::prelude::*;
//! use sprig_harness::{Harness, element};
//!
//! let items = SignalList::new(["a", "b"]);
//! let mut harness = Harness::new();
//! harness.mount(VirtualNode::for_each(
//!     items.clone(),
//!     |item: &&str| *item,
//!     |item: &&str| element(item, []),
//! ));
//! items.replace_all(["b", "a"]);
//! harness.flush();
//! assert_eq!(harness.root_labels(), vec!["b", "a"]);
//! ```

pub use sprig_reactive as reactive;
#[cfg(feature = "runtime")]
pub use sprig_runtime as runtime;

pub mod prelude {
    pub use sprig_reactive as reactive;
    pub use sprig_reactive::{
        Cleanup, Computed, DynamicDependencies, DynamicEffect, Effect, ReadSignal, Readable,
        Signal, SignalList,
    };

    #[cfg(feature = "runtime")]
    pub use sprig_runtime as runtime;
    #[cfg(feature = "runtime")]
    pub use sprig_runtime::{
        Component, Key, NativeElement, NativeHandle, NativeNode, RenderCx, Renderer,
        RendererConfig, RendererExtension, VirtualNode,
    };
}
