#![forbid(unsafe_code)]

//! Fiber tree, keyed reconciler and time-budgeted work loop.
//!
//! A [`Renderer`] turns a [`VirtualNode`] tree into fibers and keeps a
//! backend's native tree in step with it:
//!
//! 1. **Render** expands one fiber: components run, control constructs
//!    subscribe to their signals, natives are created by an extension.
//! 2. **Commit** applies queued [`Operation`]s to the native tree.
//! 3. **Update** handles fibers whose signals moved: control constructs
//!    reconcile, dirty effects re-run, natives get `update()`.
//!
//! [`Renderer::work_loop`] drains the three queues in strict priority order
//! within a time budget.
//!
//! # Example
//!
//! ```ignore
//! use sprig_runtime::{Renderer, RendererConfig, VirtualNode};
//!
//! let mut renderer = Renderer::builder()
//!     .config(RendererConfig::default())
//!     .extension(my_backend)
//!     .build();
//! renderer.render(VirtualNode::native("label", "hi", []), root_native);
//! renderer.work_loop(true);
//! ```

mod commit;
mod control;
mod reconcile;

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod fiber;
pub mod native;
pub mod operation;
pub mod renderer;
pub mod vnode;

pub use clock::{Clock, LabClock};
pub use config::{DEFAULT_FRAME_BUDGET, RendererConfig};
pub use context::RenderCx;
pub use error::{Error, Result};
pub use fiber::{FiberId, FiberView, Phase};
pub use native::{NativeElement, NativeHandle, NativeNode, RendererExtension};
pub use operation::Operation;
pub use renderer::{Pending, Renderer, RendererBuilder, WorkLoopStats};
pub use vnode::{Children, Component, Key, ListSource, MatchArm, VirtualNode};
