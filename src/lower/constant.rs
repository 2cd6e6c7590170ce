//! Synthesizes the literal constant nodes that target operators consume as
//! explicit graph inputs (axes, shapes, sizes, kernels).
//!
//! Names follow the `<owner>/<role>` scheme so every helper constant sits
//! next to its consumer in the graph; the append-time uniqueness check
//! guarantees no name is ever reused.

use core::fmt;

use crate::target::ir::{AttrValue, Dtype, TargetNode, TensorLiteral};

/// The role a synthesized constant plays for its owning node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Shape,
    Axis,
    Size,
    Kernel,
    Perm,
    Paddings,
    ReductionIndices,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Shape => "shape",
            Role::Axis => "axis",
            Role::Size => "size",
            Role::Kernel => "kernel",
            Role::Perm => "perm",
            Role::Paddings => "paddings",
            Role::ReductionIndices => "reduction_indices",
        };
        write!(f, "{name}")
    }
}

/// The deterministic name of a constant owned by `owner`.
pub fn const_name(owner: &str, role: Role) -> String {
    format!("{owner}/{role}")
}

/// Packs 32-bit integers into the target's little-endian representation.
pub fn pack_i32(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decodes a packed little-endian `i32` payload.
pub fn unpack_i32(content: &[u8]) -> Vec<i32> {
    content
        .chunks_exact(4)
        .map(|chunk| i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn int_const(owner: &str, role: Role, shape: Vec<i64>, values: &[i32]) -> TargetNode {
    TargetNode::new("Const", const_name(owner, role))
        .attr("dtype", AttrValue::Type(Dtype::Int32))
        .attr(
            "value",
            AttrValue::Tensor(TensorLiteral::new(Dtype::Int32, shape, pack_i32(values))),
        )
}

/// A rank-0 integer constant, e.g. a concat axis.
pub fn int_scalar(owner: &str, role: Role, value: i32) -> TargetNode {
    int_const(owner, role, vec![], &[value])
}

/// A rank-1 integer constant, e.g. a reshape target or a resize size.
pub fn int_vector(owner: &str, role: Role, values: &[i32]) -> TargetNode {
    int_const(owner, role, vec![values.len() as i64], values)
}

/// A rank-2 `[n, 2]` integer constant, e.g. padding row pairs.
pub fn int_matrix(owner: &str, role: Role, rows: &[[i32; 2]]) -> TargetNode {
    let values: Vec<i32> = rows.iter().flatten().copied().collect();
    int_const(owner, role, vec![rows.len() as i64, 2], &values)
}

/// A float constant declaring only its shape, e.g. a convolution kernel
/// whose payload lives outside the graph description. A `-1` dimension is
/// the provisional marker the fixup sweep patches.
pub fn shape_only(owner: &str, role: Role, dims: &[i64]) -> TargetNode {
    TargetNode::new("Const", const_name(owner, role))
        .attr("dtype", AttrValue::Type(Dtype::Float))
        .attr(
            "value",
            AttrValue::Tensor(TensorLiteral::new(Dtype::Float, dims.to_vec(), Vec::new())),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_the_owner_role_scheme() {
        assert_eq!(const_name("conv1", Role::Kernel), "conv1/kernel");
        assert_eq!(const_name("fc7", Role::Shape), "fc7/shape");
        assert_eq!(
            const_name("pool5", Role::ReductionIndices),
            "pool5/reduction_indices"
        );
    }

    #[test]
    fn payloads_are_packed_little_endian() {
        assert_eq!(pack_i32(&[1, -1]), vec![1, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]);
        assert_eq!(unpack_i32(&pack_i32(&[-1, 2, 300])), vec![-1, 2, 300]);
    }

    #[test]
    fn vector_constants_declare_rank_one() {
        let node = int_vector("r1", Role::Shape, &[-1, 1024]);
        assert_eq!(node.op, "Const");
        assert_eq!(node.name, "r1/shape");

        let literal = node.literal().unwrap();
        assert_eq!(literal.dtype, Dtype::Int32);
        assert_eq!(literal.shape, vec![2]);
        assert_eq!(unpack_i32(&literal.content), vec![-1, 1024]);
    }

    #[test]
    fn scalar_constants_declare_rank_zero() {
        let node = int_scalar("cat1", Role::Axis, 3);
        let literal = node.literal().unwrap();
        assert!(literal.shape.is_empty());
        assert_eq!(unpack_i32(&literal.content), vec![3]);
    }

    #[test]
    fn matrix_constants_declare_row_pairs() {
        let node = int_matrix("pad1", Role::Paddings, &[[0, 0], [1, 1], [2, 2], [0, 0]]);
        let literal = node.literal().unwrap();
        assert_eq!(literal.shape, vec![4, 2]);
        assert_eq!(unpack_i32(&literal.content), vec![0, 0, 1, 1, 2, 2, 0, 0]);
    }

    #[test]
    fn kernels_carry_shape_without_payload() {
        let node = shape_only("conv1", Role::Kernel, &[3, 3, -1, 16]);
        let literal = node.literal().unwrap();
        assert_eq!(literal.dtype, Dtype::Float);
        assert_eq!(literal.shape, vec![3, 3, -1, 16]);
        assert!(literal.content.is_empty());
    }
}
