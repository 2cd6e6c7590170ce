use core::fmt;
use std::{
    collections::{BTreeMap, HashMap},
    fmt::Formatter,
};

use serde::Serialize;

use crate::error::{Error, Result};

/// Element types of the target framework, carrying its numeric type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, serde::Deserialize)]
pub enum Dtype {
    Float,
    Double,
    Int32,
    Uint8,
    Int16,
    Int8,
    String,
    Complex64,
    Int64,
    Bool,
    Float16,
    Uint16,
    Complex128,
    Uint32,
    Uint64,
}

impl Dtype {
    /// The target framework's wire code for this element type.
    pub fn code(&self) -> i64 {
        match self {
            Dtype::Float => 1,
            Dtype::Double => 2,
            Dtype::Int32 => 3,
            Dtype::Uint8 => 4,
            Dtype::Int16 => 5,
            Dtype::Int8 => 6,
            Dtype::String => 7,
            Dtype::Complex64 => 8,
            Dtype::Int64 => 9,
            Dtype::Bool => 10,
            Dtype::Float16 => 14,
            Dtype::Uint16 => 17,
            Dtype::Complex128 => 18,
            Dtype::Uint32 => 22,
            Dtype::Uint64 => 23,
        }
    }

    /// Maps a node-based source element-type code to the target type.
    pub fn from_node_based_code(code: i64) -> Option<Dtype> {
        let dtype = match code {
            1 => Dtype::Float,
            2 => Dtype::Uint8,
            3 => Dtype::Int8,
            4 => Dtype::Uint16,
            5 => Dtype::Int16,
            6 => Dtype::Int32,
            7 => Dtype::Int64,
            8 => Dtype::String,
            9 => Dtype::Bool,
            10 => Dtype::Float16,
            11 => Dtype::Double,
            12 => Dtype::Uint32,
            13 => Dtype::Uint64,
            14 => Dtype::Complex64,
            15 => Dtype::Complex128,
            _ => return None,
        };
        Some(dtype)
    }
}

/// A literal tensor payload: element type, declared shape, raw little-endian
/// bytes. A shape dimension of `-1` marks a size unknown at emission time.
#[derive(Debug, Clone, PartialEq, Serialize, new)]
pub struct TensorLiteral {
    pub dtype: Dtype,
    pub shape: Vec<i64>,
    pub content: Vec<u8>,
}

/// Attribute values a target node can carry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AttrValue {
    Int(i64),
    Float(f32),
    Bool(bool),
    Bytes(Vec<u8>),
    Ints(Vec<i64>),
    Type(Dtype),
    Shape(Vec<i64>),
    Tensor(TensorLiteral),
}

impl AttrValue {
    /// Byte-string attribute from a str, e.g. the padding policy.
    pub fn bytes(s: &str) -> AttrValue {
        AttrValue::Bytes(s.as_bytes().to_vec())
    }
}

/// A single node of the target graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetNode {
    pub op: String,
    pub name: String,
    pub inputs: Vec<String>,
    pub attrs: BTreeMap<String, AttrValue>,
}

impl TargetNode {
    pub fn new(op: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            op: op.into(),
            name: name.into(),
            inputs: Vec::new(),
            attrs: BTreeMap::new(),
        }
    }

    /// Appends an upstream reference by name.
    pub fn input(mut self, name: impl Into<String>) -> Self {
        self.inputs.push(name.into());
        self
    }

    pub fn attr(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    pub fn get_attr(&self, key: &str) -> Option<&AttrValue> {
        self.attrs.get(key)
    }

    /// The literal tensor stored under `value`, if this is a constant node.
    pub fn literal(&self) -> Option<&TensorLiteral> {
        match self.attrs.get("value") {
            Some(AttrValue::Tensor(literal)) => Some(literal),
            _ => None,
        }
    }
}

/// Append-only target graph, built in strict emission order.
///
/// Two invariants are enforced on every append: node names are unique, and
/// every input reference names a node that already exists earlier in the
/// sequence. Rules that synthesize helper constants must therefore append
/// the constant before its consumer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TargetGraph {
    nodes: Vec<TargetNode>,
    #[serde(skip)]
    index: HashMap<String, usize>,
}

impl TargetGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a node, checking the name-uniqueness and
    /// no-forward-reference invariants.
    pub fn push(&mut self, node: TargetNode) -> Result<()> {
        if self.index.contains_key(&node.name) {
            return Err(Error::DuplicateNodeName(node.name));
        }
        for input in &node.inputs {
            if !self.index.contains_key(input) {
                return Err(Error::ForwardReference {
                    node: node.name,
                    input: input.clone(),
                });
            }
        }
        self.index.insert(node.name.clone(), self.nodes.len());
        self.nodes.push(node);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TargetNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn nodes(&self) -> &[TargetNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl fmt::Display for TargetGraph {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for node in &self.nodes {
            writeln!(f, "{} = {}({})", node.name, node.op, node.inputs.join(", "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placeholder(name: &str) -> TargetNode {
        TargetNode::new("Placeholder", name).attr("dtype", AttrValue::Type(Dtype::Float))
    }

    #[test]
    fn push_rejects_duplicate_names() {
        let mut graph = TargetGraph::new();
        graph.push(placeholder("x")).unwrap();

        let err = graph.push(placeholder("x")).unwrap_err();
        assert!(matches!(err, Error::DuplicateNodeName(name) if name == "x"));
    }

    #[test]
    fn push_rejects_forward_references() {
        let mut graph = TargetGraph::new();
        graph.push(placeholder("x")).unwrap();

        let relu = TargetNode::new("Relu", "r").input("not_yet_there");
        let err = graph.push(relu).unwrap_err();
        assert!(matches!(err, Error::ForwardReference { input, .. } if input == "not_yet_there"));
    }

    #[test]
    fn push_accepts_backward_references() {
        let mut graph = TargetGraph::new();
        graph.push(placeholder("x")).unwrap();
        graph.push(TargetNode::new("Relu", "r").input("x")).unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.get("r").unwrap().inputs, vec!["x".to_string()]);
    }

    #[test]
    fn node_based_type_codes_round_through_the_documented_table() {
        assert_eq!(Dtype::from_node_based_code(1), Some(Dtype::Float));
        assert_eq!(Dtype::from_node_based_code(7), Some(Dtype::Int64));
        assert_eq!(Dtype::from_node_based_code(9), Some(Dtype::Bool));
        assert_eq!(Dtype::from_node_based_code(99), None);
        assert_eq!(Dtype::Int32.code(), 3);
    }
}
