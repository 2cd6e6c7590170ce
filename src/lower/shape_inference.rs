//! On-demand shape lookup over the partially built target graph.
//!
//! A persistent name→shape table is updated as each node is appended, so a
//! rule that needs an upstream shape asks the table instead of replaying
//! the graph. When a dimension cannot be resolved at emission time the rule
//! records a [`PendingFixup`] and emits the `-1` sentinel; the fixup sweep
//! re-resolves every entry against the completed graph and produces a
//! corrected copy of the affected constants.

use std::collections::HashMap;

use crate::target::ir::{AttrValue, TargetGraph, TargetNode};

use super::constant::unpack_i32;

/// A single output dimension; `None` when statically unknown.
pub type DimSize = Option<i64>;

/// The inferred shape of a node's primary output.
pub type Shape = Vec<DimSize>;

/// What a deferred constant is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixupRole {
    /// The kernel literal's third dimension is the input channel count of
    /// the dependency node.
    KernelChannels,
}

/// A constant emitted with a provisional value, to be patched once the
/// dependency's shape is fully known.
#[derive(new, Debug, Clone, PartialEq)]
pub struct PendingFixup {
    pub constant: String,
    pub dependency: String,
    pub role: FixupRole,
}

/// Incremental name→shape table over the graph built so far.
#[derive(Debug, Default)]
pub struct ShapeTable {
    shapes: HashMap<String, Shape>,
}

impl ShapeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Infers and stores the output shape of a freshly appended node.
    pub fn record(&mut self, node: &TargetNode, graph: &TargetGraph) {
        if let Some(shape) = self.infer(node, graph) {
            self.shapes.insert(node.name.clone(), shape);
        }
    }

    pub fn shape_of(&self, name: &str) -> Option<&Shape> {
        self.shapes.get(name)
    }

    fn input_shape(&self, node: &TargetNode, index: usize) -> Option<&Shape> {
        node.inputs.get(index).and_then(|name| self.shape_of(name))
    }

    fn infer(&self, node: &TargetNode, graph: &TargetGraph) -> Option<Shape> {
        match node.op.as_str() {
            "Placeholder" => match node.get_attr("shape") {
                Some(AttrValue::Shape(dims)) => Some(dims_to_shape(dims)),
                _ => None,
            },
            "Const" => node.literal().map(|lit| dims_to_shape(&lit.shape)),
            "Conv2D" => {
                let input = self.input_shape(node, 0)?.clone();
                let kernel = graph.get(node.inputs.get(1)?)?.literal()?;
                let (stride, same) = strided_attrs(node, "strides")?;
                let out_channels = dim(kernel.shape.get(3).copied()?);
                Some(vec![
                    *input.first()?,
                    conv_dim(*input.get(1)?, kernel.shape[0], stride[0], same),
                    conv_dim(*input.get(2)?, kernel.shape[1], stride[1], same),
                    out_channels,
                ])
            }
            "MaxPool" | "AvgPool" => {
                let input = self.input_shape(node, 0)?.clone();
                let ksize = int_list_attr(node, "ksize")?;
                let (stride, same) = strided_attrs(node, "strides")?;
                Some(vec![
                    *input.first()?,
                    conv_dim(*input.get(1)?, ksize[1], stride[0], same),
                    conv_dim(*input.get(2)?, ksize[2], stride[1], same),
                    *input.get(3)?,
                ])
            }
            "ConcatV2" => {
                let (data_inputs, axis_input) = node.inputs.split_at(node.inputs.len() - 1);
                let mut axis = *const_i64s(graph, &axis_input[0])?.first()?;
                let mut out = self.shape_of(data_inputs.first()?)?.clone();
                if axis < 0 {
                    axis += out.len() as i64;
                }
                let axis = axis as usize;
                let mut total = Some(0);
                for name in data_inputs {
                    let along = self.shape_of(name).and_then(|s| *s.get(axis)?);
                    total = match (total, along) {
                        (Some(acc), Some(d)) => Some(acc + d),
                        _ => None,
                    };
                }
                *out.get_mut(axis)? = total;
                Some(out)
            }
            "Reshape" => {
                let dims = const_i64s(graph, node.inputs.get(1)?)?;
                let mut out = dims_to_shape(&dims);
                // a single -1 is recoverable when everything else is known
                if let Some(wild) = out.iter().position(Option::is_none) {
                    if out.iter().filter(|d| d.is_none()).count() == 1 {
                        if let Some(total) = self
                            .input_shape(node, 0)
                            .and_then(|s| s.iter().copied().collect::<Option<Vec<i64>>>())
                            .map(|dims| dims.iter().product::<i64>())
                        {
                            let known: i64 = out.iter().flatten().product();
                            if known != 0 && total % known == 0 {
                                out[wild] = Some(total / known);
                            }
                        }
                    }
                }
                Some(out)
            }
            "ResizeBilinear" | "ResizeNearestNeighbor" => {
                let input = self.input_shape(node, 0)?.clone();
                let size = const_i64s(graph, node.inputs.get(1)?)?;
                Some(vec![
                    *input.first()?,
                    dim(*size.first()?),
                    dim(*size.get(1)?),
                    *input.get(3)?,
                ])
            }
            "MatMul" => {
                let a = self.input_shape(node, 0)?.clone();
                let b = self.input_shape(node, 1)?.clone();
                let trans_a = matches!(node.get_attr("transpose_a"), Some(AttrValue::Bool(true)));
                let trans_b = matches!(node.get_attr("transpose_b"), Some(AttrValue::Bool(true)));
                let rows = if trans_a { *a.get(1)? } else { *a.first()? };
                let cols = if trans_b { *b.first()? } else { *b.get(1)? };
                Some(vec![rows, cols])
            }
            "Mean" => {
                let mut out = self.input_shape(node, 0)?.clone();
                let indices = const_i64s(graph, node.inputs.get(1)?)?;
                if !matches!(node.get_attr("keep_dims"), Some(AttrValue::Bool(true))) {
                    return None;
                }
                for index in indices {
                    *out.get_mut(index as usize)? = Some(1);
                }
                Some(out)
            }
            "Conv2DBackpropInput" => {
                let input = self.input_shape(node, 0)?.clone();
                let kernel = graph.get(node.inputs.get(1)?)?.literal()?;
                let (stride, _) = strided_attrs(node, "strides")?;
                let up = |d: DimSize, k: i64, s: i64| d.map(|d| (d - 1) * s + k);
                Some(vec![
                    *input.first()?,
                    up(*input.get(1)?, kernel.shape[0], stride[0]),
                    up(*input.get(2)?, kernel.shape[1], stride[1]),
                    dim(kernel.shape.get(2).copied()?),
                ])
            }
            "Pad" | "MirrorPad" => {
                let input = self.input_shape(node, 0)?.clone();
                let pads = const_i64s(graph, node.inputs.get(1)?)?;
                Some(
                    input
                        .iter()
                        .enumerate()
                        .map(|(i, d)| d.map(|d| d + pads[2 * i] + pads[2 * i + 1]))
                        .collect(),
                )
            }
            "Transpose" => {
                let input = self.input_shape(node, 0)?.clone();
                let perm = const_i64s(graph, node.inputs.get(1)?)?;
                perm.iter()
                    .map(|&p| input.get(p as usize).copied())
                    .collect()
            }
            "Add" | "AddN" | "Mul" | "Max" | "Relu" | "Identity" | "Softmax" | "LRN"
            | "FusedBatchNorm" | "BiasAdd" => self.input_shape(node, 0).cloned(),
            _ => {
                log::warn!("No shape propagation rule for {} ({})", node.name, node.op);
                None
            }
        }
    }
}

/// Re-resolves every pending fixup against the completed graph and returns
/// a corrected copy. Dimensions that remain unknown keep the `-1` sentinel.
pub fn apply_fixups(graph: &TargetGraph, fixups: &[PendingFixup]) -> TargetGraph {
    let mut table = ShapeTable::new();
    for node in graph.nodes() {
        table.record(node, graph);
    }

    let mut patches: HashMap<&str, i64> = HashMap::new();
    for fixup in fixups {
        match fixup.role {
            FixupRole::KernelChannels => {
                let channels = table
                    .shape_of(&fixup.dependency)
                    .and_then(|shape| shape.get(3).copied().flatten());
                match channels {
                    Some(channels) => {
                        patches.insert(fixup.constant.as_str(), channels);
                    }
                    None => log::warn!(
                        "Fixup sweep could not resolve the channel count of `{}` for `{}`",
                        fixup.dependency,
                        fixup.constant
                    ),
                }
            }
        }
    }

    let mut fixed = TargetGraph::new();
    for node in graph.nodes() {
        let mut node = node.clone();
        if let Some(&channels) = patches.get(node.name.as_str()) {
            if let Some(AttrValue::Tensor(literal)) = node.attrs.get_mut("value") {
                literal.shape[2] = channels;
            }
        }
        fixed
            .push(node)
            .expect("fixup sweep preserves graph invariants");
    }
    fixed
}

fn dim(value: i64) -> DimSize {
    if value < 0 {
        None
    } else {
        Some(value)
    }
}

fn dims_to_shape(dims: &[i64]) -> Shape {
    dims.iter().map(|&d| dim(d)).collect()
}

fn conv_dim(input: DimSize, kernel: i64, stride: i64, same: bool) -> DimSize {
    input.map(|d| {
        if same {
            (d + stride - 1) / stride
        } else {
            (d - kernel) / stride + 1
        }
    })
}

fn int_list_attr(node: &TargetNode, key: &str) -> Option<Vec<i64>> {
    match node.get_attr(key) {
        Some(AttrValue::Ints(values)) => Some(values.clone()),
        _ => None,
    }
}

/// Spatial strides plus the padding policy of a strided window op.
fn strided_attrs(node: &TargetNode, key: &str) -> Option<([i64; 2], bool)> {
    let strides = int_list_attr(node, key)?;
    let same = matches!(node.get_attr("padding"), Some(AttrValue::Bytes(s)) if s == b"SAME");
    Some(([strides[1], strides[2]], same))
}

/// Reads the integer payload of an already-emitted constant node.
fn const_i64s(graph: &TargetGraph, name: &str) -> Option<Vec<i64>> {
    let node = graph.get(name)?;
    if node.op != "Const" {
        return None;
    }
    let literal = node.literal()?;
    Some(unpack_i32(&literal.content).iter().map(|&v| v as i64).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower::constant::{self, Role};
    use crate::target::ir::{AttrValue, Dtype, TargetNode};

    fn graph_with_input(shape: &[i64]) -> (TargetGraph, ShapeTable) {
        let mut graph = TargetGraph::new();
        let mut table = ShapeTable::new();
        let input = TargetNode::new("Placeholder", "x")
            .attr("dtype", AttrValue::Type(Dtype::Float))
            .attr("shape", AttrValue::Shape(shape.to_vec()));
        table.record(&input, &graph);
        graph.push(input).unwrap();
        (graph, table)
    }

    fn push(graph: &mut TargetGraph, table: &mut ShapeTable, node: TargetNode) {
        table.record(&node, graph);
        graph.push(node).unwrap();
    }

    #[test]
    fn conv_shape_with_valid_padding() {
        let (mut graph, mut table) = graph_with_input(&[1, 224, 224, 3]);
        push(
            &mut graph,
            &mut table,
            constant::shape_only("c1", Role::Kernel, &[3, 3, 3, 16]),
        );
        push(
            &mut graph,
            &mut table,
            TargetNode::new("Conv2D", "c1")
                .input("x")
                .input("c1/kernel")
                .attr("T", AttrValue::Type(Dtype::Float))
                .attr("strides", AttrValue::Ints(vec![1, 1, 1, 1]))
                .attr("padding", AttrValue::bytes("VALID")),
        );

        assert_eq!(
            table.shape_of("c1").unwrap(),
            &vec![Some(1), Some(222), Some(222), Some(16)]
        );
    }

    #[test]
    fn conv_shape_with_same_padding_and_stride() {
        let (mut graph, mut table) = graph_with_input(&[1, 224, 224, 3]);
        push(
            &mut graph,
            &mut table,
            constant::shape_only("c1", Role::Kernel, &[3, 3, 3, 8]),
        );
        push(
            &mut graph,
            &mut table,
            TargetNode::new("Conv2D", "c1")
                .input("x")
                .input("c1/kernel")
                .attr("strides", AttrValue::Ints(vec![1, 2, 2, 1]))
                .attr("padding", AttrValue::bytes("SAME")),
        );

        assert_eq!(
            table.shape_of("c1").unwrap(),
            &vec![Some(1), Some(112), Some(112), Some(8)]
        );
    }

    #[test]
    fn concat_sums_the_channel_axis() {
        let (mut graph, mut table) = graph_with_input(&[1, 14, 14, 32]);
        push(
            &mut graph,
            &mut table,
            TargetNode::new("Placeholder", "y")
                .attr("shape", AttrValue::Shape(vec![1, 14, 14, 64])),
        );
        push(
            &mut graph,
            &mut table,
            constant::int_scalar("cat", Role::Axis, -1),
        );
        push(
            &mut graph,
            &mut table,
            TargetNode::new("ConcatV2", "cat")
                .input("x")
                .input("y")
                .input("cat/axis")
                .attr("N", AttrValue::Int(2)),
        );

        assert_eq!(
            table.shape_of("cat").unwrap(),
            &vec![Some(1), Some(14), Some(14), Some(96)]
        );
    }

    #[test]
    fn reshape_resolves_a_single_wildcard() {
        let (mut graph, mut table) = graph_with_input(&[2, 7, 7, 64]);
        push(
            &mut graph,
            &mut table,
            constant::int_vector("flat", Role::Shape, &[-1, 3136]),
        );
        push(
            &mut graph,
            &mut table,
            TargetNode::new("Reshape", "flat")
                .input("x")
                .input("flat/shape"),
        );

        assert_eq!(table.shape_of("flat").unwrap(), &vec![Some(2), Some(3136)]);
    }

    #[test]
    fn unknown_dims_propagate_as_unknown() {
        let (mut graph, mut table) = graph_with_input(&[-1, 224, 224, 3]);
        push(
            &mut graph,
            &mut table,
            TargetNode::new("Relu", "r").input("x"),
        );

        assert_eq!(
            table.shape_of("r").unwrap(),
            &vec![None, Some(224), Some(224), Some(3)]
        );
    }

    #[test]
    fn fixup_sweep_patches_the_kernel_channel_dimension() {
        let (mut graph, mut table) = graph_with_input(&[1, 28, 28, 4]);
        push(
            &mut graph,
            &mut table,
            constant::shape_only("c1", Role::Kernel, &[5, 5, -1, 16]),
        );
        push(
            &mut graph,
            &mut table,
            TargetNode::new("Conv2D", "c1")
                .input("x")
                .input("c1/kernel")
                .attr("strides", AttrValue::Ints(vec![1, 1, 1, 1]))
                .attr("padding", AttrValue::bytes("VALID")),
        );

        let fixups = vec![PendingFixup::new(
            "c1/kernel".to_string(),
            "x".to_string(),
            FixupRole::KernelChannels,
        )];
        let fixed = apply_fixups(&graph, &fixups);

        let literal = fixed.get("c1/kernel").unwrap().literal().unwrap();
        assert_eq!(literal.shape, vec![5, 5, 4, 16]);
        // the original graph is untouched
        assert_eq!(
            graph.get("c1/kernel").unwrap().literal().unwrap().shape,
            vec![5, 5, -1, 16]
        );
    }

    #[test]
    fn fixup_sweep_keeps_the_sentinel_when_unresolvable() {
        let (mut graph, mut table) = graph_with_input(&[1, 28, 28, -1]);
        push(
            &mut graph,
            &mut table,
            constant::shape_only("c1", Role::Kernel, &[5, 5, -1, 16]),
        );

        let fixups = vec![PendingFixup::new(
            "c1/kernel".to_string(),
            "x".to_string(),
            FixupRole::KernelChannels,
        )];
        let fixed = apply_fixups(&graph, &fixups);

        let literal = fixed.get("c1/kernel").unwrap().literal().unwrap();
        assert_eq!(literal.shape, vec![5, 5, -1, 16]);
    }
}
