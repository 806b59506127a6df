#![forbid(unsafe_code)]

//! Test harness and reference backend for sprig renderers.
//!
//! - [`recording`]: an in-memory native tree that journals every backend
//!   call, plus the extension that creates its nodes.
//! - [`capture`]: a `tracing` layer collecting events and spans so tests can
//!   assert on warnings.
//! - [`fixture`]: a [`Harness`] wiring a renderer to a recording root on a
//!   lab clock.
//!
//! # Example
//!
//! ```rust
//! use sprig_harness::{Harness, element};
//!
//! let mut harness = Harness::new();
//! harness.mount(element("list", [element("a", []), element("b", [])]));
//! assert_eq!(harness.snapshot(), "root[list[a,b]]");
//! ```

pub mod capture;
pub mod fixture;
pub mod recording;

pub use capture::{CapturedEvent, CapturedSpan, TraceCapture};
pub use fixture::Harness;
pub use recording::{
    ELEMENT, Element, NativeCall, NativeTree, NodeId, RecordingExtension, RecordingNative,
    element,
};
