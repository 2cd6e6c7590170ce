/// The channel-last target intermediate representation.
pub mod ir;

pub use ir::{AttrValue, Dtype, TargetGraph, TargetNode, TensorLiteral};
