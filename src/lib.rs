#![warn(missing_docs)]
#![allow(clippy::upper_case_acronyms)]

//! `tf-import` lowers a neural-network model described in a channel-first
//! source IR (a Caffe-style layer list or an ONNX-style node list) into a
//! channel-last, `GraphDef`-shaped target IR. Each source node maps to one
//! or more target nodes; layout conversion, default-parameter resolution,
//! and shape-dependent literal synthesis happen along the way, with a
//! deferred fixup sweep for constants whose correct value is only known
//! once the whole graph exists.

#[macro_use]
extern crate derive_new;

/// Errors a translation run can abort with.
pub mod error;
/// The lowering pass and its helpers.
pub mod lower;
/// The normalized source IR and its adapter boundary.
pub mod source;
/// The channel-last target IR.
pub mod target;

mod logger;

pub use error::{Error, Result};
pub use lower::{Lowered, ModelGen};
