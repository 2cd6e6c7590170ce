/// The normalized source intermediate representation.
pub mod ir;
/// The adapter boundary: deserializes normalized models.
pub mod reader;

pub use ir::{
    AttributeValue, Attributes, Dialect, SourceGraph, SourceNode, SourceOp, SourcePlaceholder,
    SourceTensor,
};
pub use reader::parse_model;
