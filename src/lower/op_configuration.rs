//! Per-operator configuration extracted from the source parameter bag.
//!
//! Every optional source parameter is resolved here, once, against the
//! documented target-framework default. The rule implementations never
//! reach into the attribute map themselves.

use crate::{
    error::{Error, Result},
    source::ir::{Dialect, SourceNode},
};

use super::layout;

/// Configuration shared by convolution and deconvolution.
#[derive(new, Debug, Clone, PartialEq)]
pub struct Conv2dConfig {
    /// Kernel spatial dims (h, w).
    pub kernel: [i64; 2],
    /// Strides (h, w); the target attribute is `[1, h, w, 1]`.
    pub stride: [i64; 2],
    /// `false` maps to the no-pad (`VALID`) policy, `true` to `SAME`.
    pub pad_same: bool,
    /// Declared output channels; absent for node-based convolutions, which
    /// read the count from their weight tensor.
    pub num_output: Option<i64>,
}

/// Create a Conv2dConfig from the attributes of the node.
pub fn conv2d_config(node: &SourceNode) -> Conv2dConfig {
    let mut kernel = [1, 1];
    let mut stride = [1, 1];
    let mut pad_same = false;
    let mut num_output = None;

    for (key, value) in node.attrs.iter() {
        match key.as_str() {
            "kernel_size" => {
                let k = value.clone().into_i64();
                kernel = [k, k];
            }
            "kernel_shape" => {
                let ks = value.clone().into_i64s();
                kernel = [ks[0], ks[1]];
            }
            "stride" => {
                let s = value.clone().into_i64();
                stride = [s, s];
            }
            "strides" => {
                let ss = value.clone().into_i64s();
                stride = [ss[0], ss[1]];
            }
            // padding default is 0, which is the no-pad policy anyway
            "pad" => pad_same = value.clone().into_i64() != 0,
            "pads" => pad_same = value.clone().into_i64s().iter().any(|&p| p > 0),
            "num_output" => num_output = Some(value.clone().into_i64()),
            _ => {}
        }
    }

    Conv2dConfig::new(kernel, stride, pad_same, num_output)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    Max,
    Average,
}

#[derive(new, Debug, Clone, PartialEq)]
pub struct Pool2dConfig {
    pub kind: PoolKind,
    pub kernel: [i64; 2],
    pub stride: [i64; 2],
    pub pad_same: bool,
}

/// Create a Pool2dConfig from the attributes of the node.
///
/// `kind` is the fallback for the layer-based convention, whose pooling
/// layer carries the pool mode as an enumerated parameter (0 = max,
/// 1 = average); the node-based convention encodes it in the operator tag.
pub fn pool2d_config(node: &SourceNode, kind: PoolKind) -> Pool2dConfig {
    let mut kind = kind;
    let mut kernel = [1, 1];
    let mut stride = [1, 1];
    let mut pad_same = false;

    for (key, value) in node.attrs.iter() {
        match key.as_str() {
            "pool" => {
                kind = if value.clone().into_i64() == 1 {
                    PoolKind::Average
                } else {
                    PoolKind::Max
                };
            }
            "kernel_size" => {
                let k = value.clone().into_i64();
                kernel = [k, k];
            }
            "kernel_shape" => {
                let ks = value.clone().into_i64s();
                kernel = [ks[0], ks[1]];
            }
            "stride" => {
                let s = value.clone().into_i64();
                stride = [s, s];
            }
            "strides" => {
                let ss = value.clone().into_i64s();
                stride = [ss[0], ss[1]];
            }
            "pad" => pad_same = value.clone().into_i64() != 0,
            "pads" => pad_same = value.clone().into_i64s().iter().any(|&p| p > 0),
            _ => {}
        }
    }

    Pool2dConfig::new(kind, kernel, stride, pad_same)
}

#[derive(new, Debug, Clone, PartialEq)]
pub struct BatchNormConfig {
    pub momentum: f32,
    pub epsilon: f32,
    pub training: bool,
}

/// Create a BatchNormConfig from the attributes of the node.
pub fn batch_norm_config(node: &SourceNode) -> BatchNormConfig {
    let mut momentum = 0.99;
    let mut epsilon = 0.001;
    let mut training = false;

    for (key, value) in node.attrs.iter() {
        match key.as_str() {
            "moving_average_fraction" | "momentum" => momentum = value.clone().into_f32(),
            "eps" | "epsilon" => epsilon = value.clone().into_f32(),
            // layer-based: training unless the layer pins its global stats
            "use_global_stats" => training = value.clone().into_i64() != 1,
            // node-based: the inverse flag
            "is_test" => training = value.clone().into_i64() == 0,
            _ => {}
        }
    }

    BatchNormConfig::new(momentum, epsilon, training)
}

/// The element-wise combine modes, by enumerated source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EltwiseOp {
    Mul,
    Sum,
    Max,
}

/// Create the eltwise mode from the attributes of the node (default: sum).
pub fn eltwise_config(node: &SourceNode) -> EltwiseOp {
    let code = node
        .attr("operation")
        .map(|v| v.clone().into_i64())
        .unwrap_or(1);

    match code {
        0 => EltwiseOp::Mul,
        1 => EltwiseOp::Sum,
        2 => EltwiseOp::Max,
        other => panic!("Eltwise: unsupported operation code {other}"),
    }
}

/// Resolve the target concatenation axis (source default: axis 1).
pub fn concat_config(dialect: Dialect, node: &SourceNode) -> i64 {
    let axis = node.attr("axis").map(|v| v.clone().into_i64()).unwrap_or(1);
    layout::concat_axis(dialect, axis)
}

#[derive(new, Debug, Clone, PartialEq)]
pub struct LrnConfig {
    pub alpha: f32,
    pub beta: f32,
    pub depth_radius: i64,
    /// Only the node-based convention declares a bias term.
    pub bias: Option<f32>,
}

/// Create an LrnConfig from the attributes of the node.
///
/// The alpha default is one of the two documented adapter divergences:
/// 1.0 for the layer-based convention, 1e-4 for the node-based one.
pub fn lrn_config(dialect: Dialect, node: &SourceNode) -> LrnConfig {
    let mut alpha = match dialect {
        Dialect::LayerBased => 1.0,
        Dialect::NodeBased => 1e-4,
    };
    let mut beta = 0.5;
    let mut depth_radius = 5;
    let mut bias = match dialect {
        Dialect::LayerBased => None,
        Dialect::NodeBased => Some(1.0),
    };

    for (key, value) in node.attrs.iter() {
        match key.as_str() {
            "alpha" => alpha = value.clone().into_f32(),
            "beta" => beta = value.clone().into_f32(),
            "local_size" | "size" => depth_radius = value.clone().into_i64(),
            "bias" => bias = Some(value.clone().into_f32()),
            _ => {}
        }
    }

    LrnConfig::new(alpha, beta, depth_radius, bias)
}

/// Validate the flatten parameters.
///
/// Only the default pair (axis = 1, end_axis = -1) has a specified lowering;
/// anything else must be surfaced, never silently mistranslated.
pub fn flatten_config(node: &SourceNode) -> Result<()> {
    let axis = node.attr("axis").map(|v| v.clone().into_i64()).unwrap_or(1);
    let end_axis = node
        .attr("end_axis")
        .map(|v| v.clone().into_i64())
        .unwrap_or(-1);

    if axis == 1 && end_axis == -1 {
        Ok(())
    } else {
        Err(Error::Underspecified {
            node: node.effective_name().unwrap_or_default().to_string(),
            reason: format!(
                "flatten with axis={axis}, end_axis={end_axis} has no specified lowering"
            ),
        })
    }
}

/// The declared reshape target, still in source (channel-first) order.
pub fn reshape_config(node: &SourceNode) -> Vec<i64> {
    match node.attr("shape") {
        Some(value) => value.clone().into_i64s(),
        None => panic!("Reshape: a target shape must be declared"),
    }
}

/// Transpose flags of a general matrix multiply (defaults: untransposed).
pub fn gemm_config(node: &SourceNode) -> (bool, bool) {
    let trans_a = node
        .attr("transA")
        .map(|v| v.clone().into_i64() != 0)
        .unwrap_or(false);
    let trans_b = node
        .attr("transB")
        .map(|v| v.clone().into_i64() != 0)
        .unwrap_or(false);
    (trans_a, trans_b)
}

#[derive(new, Debug, Clone, PartialEq)]
pub struct UpsampleConfig {
    pub nearest: bool,
    pub height_scale: f32,
    pub width_scale: f32,
}

/// Create an UpsampleConfig from the attributes of the node.
pub fn upsample_config(node: &SourceNode) -> UpsampleConfig {
    let mut nearest = true;
    let mut height_scale = 2.0;
    let mut width_scale = 2.0;

    for (key, value) in node.attrs.iter() {
        match key.as_str() {
            "mode" => nearest = value.clone().into_string() == "nearest",
            "height_scale" => height_scale = value.clone().into_f32(),
            "width_scale" => width_scale = value.clone().into_f32(),
            _ => {}
        }
    }

    UpsampleConfig::new(nearest, height_scale, width_scale)
}

#[derive(new, Debug, Clone, PartialEq)]
pub struct PadConfig {
    pub reflect: bool,
    /// Source order: `[x1_begin, x2_begin, ..., x1_end, x2_end, ...]`.
    pub pads: Vec<i64>,
}

/// Create a PadConfig from the attributes of the node.
pub fn pad_config(node: &SourceNode) -> PadConfig {
    let mut reflect = false;
    let mut pads = Vec::new();

    for (key, value) in node.attrs.iter() {
        match key.as_str() {
            "mode" => reflect = value.clone().into_string() == "reflect",
            "pads" => pads = value.clone().into_i64s(),
            _ => {}
        }
    }

    PadConfig::new(reflect, pads)
}
