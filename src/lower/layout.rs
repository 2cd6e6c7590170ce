//! Layout-convention translation between the channel-first source order
//! (batch, channel, height, width) and the channel-last target order
//! (batch, height, width, channel).
//!
//! All functions are pure and specialized for rank-4 tensors; anything else
//! passes through unchanged. Each declared shape or axis index must run
//! through here exactly once — the mapping is not self-inverse, so applying
//! it twice silently scrambles the layout.

use crate::source::ir::Dialect;

/// Reorders a declared shape from channel-first to channel-last.
pub fn to_nhwc_shape(shape: &[i64]) -> Vec<i64> {
    if shape.len() == 4 {
        vec![shape[0], shape[2], shape[3], shape[1]]
    } else {
        shape.to_vec()
    }
}

/// Translates a channel-first axis index into the channel-last equivalent.
pub fn to_nhwc_axis(axis: i64, rank: usize) -> i64 {
    if rank != 4 {
        return axis;
    }
    match axis {
        0 => 0,
        1 => 3,
        2 => 1,
        3 => 2,
        other => other,
    }
}

/// Reorders kernel dimensions from the source's (out, in, h, w) order to the
/// target's (h, w, in, out) order.
pub fn kernel_to_hwio(dims: &[i64]) -> Vec<i64> {
    if dims.len() == 4 {
        vec![dims[2], dims[3], dims[1], dims[0]]
    } else {
        dims.to_vec()
    }
}

/// Translates a transpose permutation given in channel-first indices.
pub fn remap_perm(perm: &[i64]) -> Vec<i64> {
    let rank = perm.len();
    perm.iter().map(|&axis| to_nhwc_axis(axis, rank)).collect()
}

/// Translates a concatenation axis.
///
/// The two source adapters agree that axis 0 stays the batch axis and that
/// the default axis 1 becomes the channel (last) axis, but they disagree on
/// every other axis: the layer-based adapter sends anything that is not the
/// channel default to the batch axis, while the node-based adapter sends
/// anything non-zero to the last axis. Both behaviors are kept as
/// documented; reconciling them is a product decision, not ours.
pub fn concat_axis(dialect: Dialect, axis: i64) -> i64 {
    match dialect {
        Dialect::LayerBased => {
            if axis == 1 {
                3
            } else {
                0
            }
        }
        Dialect::NodeBased => {
            if axis == 0 {
                0
            } else {
                -1
            }
        }
    }
}
