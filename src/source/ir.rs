use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::target::ir::Dtype;

/// Which source convention produced the node list.
///
/// The two adapters carry a handful of deliberately divergent defaults
/// (concat axis translation, LRN alpha); the lowering keeps them
/// distinguishable instead of unifying them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// Layer-based description: implicit NCHW layout, typed parameter bags.
    LayerBased,
    /// Node-based description: explicit typed attributes plus an
    /// initializer side table.
    NodeBased,
}

/// The operator tags the dispatcher recognizes.
///
/// Both source conventions are normalized onto this one set by the adapter;
/// aliases cover the node-based spellings. Anything else lands in
/// [`SourceOp::Custom`] and lowers to an identity passthrough.
#[derive(Debug, Hash, Eq, PartialEq, Clone, EnumString, Display)]
pub enum SourceOp {
    Input,
    #[strum(to_string = "BatchNorm", serialize = "BatchNormalization")]
    BatchNorm,
    Concat,
    #[strum(to_string = "Convolution", serialize = "Conv")]
    Convolution,
    Crop,
    #[strum(to_string = "Deconvolution", serialize = "ConvTranspose")]
    Deconvolution,
    Eltwise,
    Flatten,
    Gemm,
    InnerProduct,
    #[strum(to_string = "LRN", serialize = "Lrn")]
    Lrn,
    Pooling,
    MaxPool,
    AveragePool,
    PriorBox,
    #[strum(to_string = "ReLU", serialize = "Relu")]
    Relu,
    Reshape,
    Softmax,
    Identity,
    Add,
    Mul,
    Sum,
    Constant,
    GlobalAveragePool,
    Pad,
    Transpose,
    Upsample,
    #[strum(default)]
    Custom(String),
}

impl From<String> for SourceOp {
    fn from(tag: String) -> Self {
        // Cannot fail: unrecognized tags fall into the default variant.
        tag.parse().expect("SourceOp parsing is total")
    }
}

impl From<SourceOp> for String {
    fn from(op: SourceOp) -> Self {
        op.to_string()
    }
}

impl Serialize for SourceOp {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SourceOp {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(SourceOp::from(String::deserialize(deserializer)?))
    }
}

/// A named constant tensor from the node-based side table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, new)]
pub struct SourceTensor {
    pub name: String,
    pub dtype: Dtype,
    pub dims: Vec<i64>,
    #[serde(default)]
    pub data: Vec<u8>,
}

/// A true graph input of the node-based description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, new)]
pub struct SourcePlaceholder {
    pub name: String,
    pub dtype: Dtype,
    pub dims: Vec<i64>,
}

/// Typed values of the per-node parameter bag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Float32(f32),
    Int64(i64),
    String(String),
    Float32s(Vec<f32>),
    Int64s(Vec<i64>),
    Tensor(SourceTensor),
}

impl AttributeValue {
    pub fn into_f32(self) -> f32 {
        match self {
            AttributeValue::Float32(v) => v,
            v => panic!("expected a float attribute, got {v:?}"),
        }
    }

    pub fn into_i64(self) -> i64 {
        match self {
            AttributeValue::Int64(v) => v,
            v => panic!("expected an int attribute, got {v:?}"),
        }
    }

    pub fn into_i64s(self) -> Vec<i64> {
        match self {
            AttributeValue::Int64s(v) => v,
            v => panic!("expected an int list attribute, got {v:?}"),
        }
    }

    pub fn into_string(self) -> String {
        match self {
            AttributeValue::String(v) => v,
            v => panic!("expected a string attribute, got {v:?}"),
        }
    }

    pub fn into_tensor(self) -> SourceTensor {
        match self {
            AttributeValue::Tensor(v) => v,
            v => panic!("expected a tensor attribute, got {v:?}"),
        }
    }
}

pub type Attributes = HashMap<String, AttributeValue>;

/// A single node of the normalized source node list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceNode {
    pub op: SourceOp,
    /// May be empty in the node-based convention; the effective name is then
    /// derived from the first declared output.
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default)]
    pub attrs: Attributes,
}

impl SourceNode {
    pub fn new(op: SourceOp, name: impl Into<String>) -> Self {
        Self {
            op,
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            attrs: Attributes::new(),
        }
    }

    pub fn with_input(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(name.into());
        self
    }

    pub fn with_output(mut self, name: impl Into<String>) -> Self {
        self.outputs.push(name.into());
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&AttributeValue> {
        self.attrs.get(key)
    }

    /// The declared name, or the first output when the name is empty.
    pub fn effective_name(&self) -> Option<&str> {
        if !self.name.is_empty() {
            Some(&self.name)
        } else {
            self.outputs.first().map(String::as_str)
        }
    }
}

/// The normalized model handed over by the source graph adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceGraph {
    pub dialect: Dialect,
    pub nodes: Vec<SourceNode>,
    /// Node-based only: true graph inputs.
    #[serde(default)]
    pub placeholders: Vec<SourcePlaceholder>,
    /// Node-based only: pre-populated constant tensors.
    #[serde(default)]
    pub initializers: Vec<SourceTensor>,
}

impl SourceGraph {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            nodes: Vec::new(),
            placeholders: Vec::new(),
            initializers: Vec::new(),
        }
    }

    pub fn initializer(&self, name: &str) -> Option<&SourceTensor> {
        self.initializers.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_tags_parse_from_both_conventions() {
        assert_eq!("Convolution".parse::<SourceOp>().unwrap(), SourceOp::Convolution);
        assert_eq!("Conv".parse::<SourceOp>().unwrap(), SourceOp::Convolution);
        assert_eq!("ReLU".parse::<SourceOp>().unwrap(), SourceOp::Relu);
        assert_eq!("Relu".parse::<SourceOp>().unwrap(), SourceOp::Relu);
        assert_eq!(
            "BatchNormalization".parse::<SourceOp>().unwrap(),
            SourceOp::BatchNorm
        );
    }

    #[test]
    fn unrecognized_tags_are_preserved_verbatim() {
        let op = "Foo".parse::<SourceOp>().unwrap();
        assert_eq!(op, SourceOp::Custom("Foo".to_string()));
        assert_eq!(op.to_string(), "Foo");
    }

    #[test]
    fn effective_name_falls_back_to_the_first_output() {
        let named = SourceNode::new(SourceOp::Relu, "r1");
        assert_eq!(named.effective_name(), Some("r1"));

        let unnamed = SourceNode::new(SourceOp::Relu, "").with_output("act_out");
        assert_eq!(unnamed.effective_name(), Some("act_out"));

        let nameless = SourceNode::new(SourceOp::Relu, "");
        assert_eq!(nameless.effective_name(), None);
    }
}
