//! Canonical multi-node expansions for the layers the target framework
//! expresses as small subgraphs rather than single nodes.
//!
//! The dispatcher trusts the output of these builders and stitches an
//! identity node under the original source name, so downstream consumers
//! keep referencing the layer by its declared name.

use crate::target::ir::{AttrValue, Dtype, TargetNode, TensorLiteral};

use super::{
    op_configuration::{BatchNormConfig, Conv2dConfig},
    shape_inference::DimSize,
};

/// A pre-built subgraph plus the name of its final node.
#[derive(new, Debug, Clone)]
pub struct Expansion {
    pub nodes: Vec<TargetNode>,
    pub tail: String,
}

fn param_const(name: String, dims: Vec<i64>) -> TargetNode {
    TargetNode::new("Const", name)
        .attr("dtype", AttrValue::Type(Dtype::Float))
        .attr(
            "value",
            AttrValue::Tensor(TensorLiteral::new(Dtype::Float, dims, Vec::new())),
        )
}

fn channel_dim(channels: DimSize) -> i64 {
    channels.unwrap_or(-1)
}

/// The canonical batch-normalization subgraph: four per-channel parameter
/// constants feeding one fused normalization node.
pub fn batch_norm(
    scope: &str,
    input: &str,
    config: &BatchNormConfig,
    channels: DimSize,
) -> Expansion {
    let prefix = format!("{scope}/BatchNorm");
    let dims = vec![channel_dim(channels)];

    let gamma = param_const(format!("{prefix}/gamma"), dims.clone());
    let beta = param_const(format!("{prefix}/beta"), dims.clone());
    let mean = param_const(format!("{prefix}/moving_mean"), dims.clone());
    let variance = param_const(format!("{prefix}/moving_variance"), dims);

    let tail = format!("{prefix}/FusedBatchNorm");
    let fused = TargetNode::new("FusedBatchNorm", tail.clone())
        .input(input)
        .input(gamma.name.clone())
        .input(beta.name.clone())
        .input(mean.name.clone())
        .input(variance.name.clone())
        .attr("T", AttrValue::Type(Dtype::Float))
        .attr("epsilon", AttrValue::Float(config.epsilon))
        .attr("is_training", AttrValue::Bool(config.training));

    Expansion::new(vec![gamma, beta, mean, variance, fused], tail)
}

/// The canonical fully-connected subgraph: weight and bias constants, a
/// matrix multiply, and a bias add.
pub fn dense(scope: &str, input: &str, units: i64, in_features: DimSize) -> Expansion {
    let prefix = format!("{scope}/Dense");

    let weights = param_const(
        format!("{prefix}/weights"),
        vec![channel_dim(in_features), units],
    );
    let biases = param_const(format!("{prefix}/biases"), vec![units]);

    let matmul = TargetNode::new("MatMul", format!("{prefix}/MatMul"))
        .input(input)
        .input(weights.name.clone())
        .attr("T", AttrValue::Type(Dtype::Float));

    let tail = format!("{prefix}/BiasAdd");
    let bias_add = TargetNode::new("BiasAdd", tail.clone())
        .input(matmul.name.clone())
        .input(biases.name.clone())
        .attr("T", AttrValue::Type(Dtype::Float));

    Expansion::new(vec![weights, biases, matmul, bias_add], tail)
}

/// The canonical transposed-convolution subgraph: a kernel constant in
/// (h, w, out, in) order feeding the backprop-input convolution node.
pub fn conv2d_transpose(
    scope: &str,
    input: &str,
    config: &Conv2dConfig,
    in_channels: DimSize,
) -> Expansion {
    let prefix = format!("{scope}/Deconvolution");
    let num_output = config.num_output.unwrap_or(-1);

    let kernel = param_const(
        format!("{prefix}/kernel"),
        vec![
            config.kernel[0],
            config.kernel[1],
            num_output,
            channel_dim(in_channels),
        ],
    );

    let tail = format!("{prefix}/Conv2DBackpropInput");
    let conv = TargetNode::new("Conv2DBackpropInput", tail.clone())
        .input(input)
        .input(kernel.name.clone())
        .attr("T", AttrValue::Type(Dtype::Float))
        .attr(
            "strides",
            AttrValue::Ints(vec![1, config.stride[0], config.stride[1], 1]),
        )
        .attr("padding", AttrValue::bytes("VALID"));

    Expansion::new(vec![kernel, conv], tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_norm_expansion_ends_in_the_fused_node() {
        let config = BatchNormConfig::new(0.99, 0.001, false);
        let expansion = batch_norm("bn1", "x", &config, Some(64));

        assert_eq!(expansion.nodes.len(), 5);
        assert_eq!(expansion.tail, "bn1/BatchNorm/FusedBatchNorm");

        let fused = expansion.nodes.last().unwrap();
        assert_eq!(fused.inputs.len(), 5);
        assert_eq!(fused.inputs[0], "x");
        assert_eq!(
            expansion.nodes[0].literal().unwrap().shape,
            vec![64],
        );
    }

    #[test]
    fn dense_expansion_wires_matmul_into_bias_add() {
        let expansion = dense("fc1", "flat", 1000, Some(4096));

        let names: Vec<&str> = expansion.nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "fc1/Dense/weights",
                "fc1/Dense/biases",
                "fc1/Dense/MatMul",
                "fc1/Dense/BiasAdd"
            ]
        );
        assert_eq!(
            expansion.nodes[0].literal().unwrap().shape,
            vec![4096, 1000]
        );
        assert_eq!(expansion.tail, "fc1/Dense/BiasAdd");
    }

    #[test]
    fn conv_transpose_kernel_uses_unknown_channel_sentinel() {
        let config = Conv2dConfig::new([4, 4], [2, 2], false, Some(32));
        let expansion = conv2d_transpose("up1", "x", &config, None);

        assert_eq!(
            expansion.nodes[0].literal().unwrap().shape,
            vec![4, 4, 32, -1]
        );
    }
}
