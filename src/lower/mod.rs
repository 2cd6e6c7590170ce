//! The lowering pass: maps each source node onto one or more target nodes,
//! in source order, into a strictly growing target graph.
//!
//! Dispatch is pure pattern matching on the operator tag — one rule per
//! supported tag plus the identity default. Rules only ever append to the
//! graph, insert into the unsupported set, or register pending fixups;
//! nothing mutates an already-emitted node.

pub mod constant;
pub mod expand;
pub mod layout;
pub mod op_configuration;
pub mod shape_inference;

use std::{
    collections::BTreeSet,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    error::{Error, Result},
    logger::init_log,
    source::{
        ir::{Dialect, SourceGraph, SourceNode, SourceOp},
        reader::parse_model,
    },
    target::ir::{AttrValue, Dtype, TargetGraph, TargetNode, TensorLiteral},
};

use constant::Role;
use op_configuration::{
    batch_norm_config, concat_config, conv2d_config, eltwise_config, flatten_config, gemm_config,
    lrn_config, pad_config, pool2d_config, reshape_config, upsample_config, EltwiseOp, PoolKind,
};
use shape_inference::{DimSize, FixupRole, PendingFixup, ShapeTable};

const DEFAULT_OUTPUT: &str = "converted_model.json";

/// Converts a normalized source model into the channel-last target graph.
///
/// ```no_run
/// use tf_import::ModelGen;
///
/// ModelGen::new()
///     .model("model.json".as_ref())
///     .output("converted_model.json".as_ref())
///     .run_from_cli()
///     .unwrap();
/// ```
#[derive(Debug, Default)]
pub struct ModelGen {
    model: Option<PathBuf>,
    output: Option<PathBuf>,
}

impl ModelGen {
    /// Create a new `ModelGen`.
    pub fn new() -> Self {
        init_log().ok(); // Error when init multiple times are ignored.
        Self::default()
    }

    /// Set the input model file.
    pub fn model(&mut self, path: &Path) -> &mut Self {
        self.model = Some(path.into());
        self
    }

    /// Set the output file.
    pub fn output(&mut self, path: &Path) -> &mut Self {
        self.output = Some(path.into());
        self
    }

    /// Run the conversion and write the target graph.
    ///
    /// Byte-level encoding of the finished graph belongs to the downstream
    /// encoder; this writes the graph's deterministic JSON rendering.
    pub fn run_from_cli(&self) -> Result<()> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| Error::MalformedModel("no input model provided".to_string()))?;
        let output = self
            .output
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT));

        log::info!("Input model: {:?}", model);
        log::info!("Output: {:?}", output);

        let source = parse_model(model)?;
        let lowered = source.lower()?;

        fs::write(&output, serde_json::to_string_pretty(&lowered.graph)?)?;

        if lowered.unsupported.is_empty() {
            println!("All source operator types in this model are supported");
        } else {
            println!("Unsupported source ops: {:?}", lowered.unsupported);
        }
        log::info!("Finished converting {:?}", model);

        Ok(())
    }
}

/// The result of a translation run.
#[derive(Debug)]
pub struct Lowered {
    /// The finished target graph, fixup sweep already applied.
    pub graph: TargetGraph,
    /// Source operator tags that fell through to the identity default.
    pub unsupported: BTreeSet<String>,
    /// The deferred constants that were registered during the main pass.
    pub fixups: Vec<PendingFixup>,
}

impl SourceGraph {
    /// Lowers this source graph into the channel-last target graph.
    pub fn lower(&self) -> Result<Lowered> {
        let mut lowering = GraphLowering::new(self.dialect);

        if self.dialect == Dialect::NodeBased {
            lowering.emit_prelude(self)?;
        }
        for node in &self.nodes {
            lowering.dispatch(self, node)?;
        }

        let GraphLowering {
            graph,
            unsupported,
            fixups,
            ..
        } = lowering;

        // The sweep is a first-class part of every run: constants emitted
        // with provisional dimensions are re-resolved against the complete
        // graph before anything is handed to the encoder.
        let graph = shape_inference::apply_fixups(&graph, &fixups);

        Ok(Lowered {
            graph,
            unsupported,
            fixups,
        })
    }
}

struct GraphLowering {
    dialect: Dialect,
    graph: TargetGraph,
    shapes: ShapeTable,
    unsupported: BTreeSet<String>,
    fixups: Vec<PendingFixup>,
}

impl GraphLowering {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            graph: TargetGraph::new(),
            shapes: ShapeTable::new(),
            unsupported: BTreeSet::new(),
            fixups: Vec::new(),
        }
    }

    fn dispatch(&mut self, source: &SourceGraph, node: &SourceNode) -> Result<()> {
        log::debug!("Lowering {} ({})", node.name, node.op);

        match &node.op {
            SourceOp::Input => self.input_conversion(node),
            SourceOp::BatchNorm => self.batch_norm_conversion(node),
            SourceOp::Concat => self.concat_conversion(node),
            SourceOp::Convolution => self.conv_conversion(source, node),
            SourceOp::Crop => self.crop_conversion(node),
            SourceOp::Deconvolution => self.deconv_conversion(node),
            SourceOp::Eltwise => self.eltwise_conversion(node),
            SourceOp::Flatten => self.flatten_conversion(node),
            SourceOp::InnerProduct => self.dense_conversion(node),
            SourceOp::Lrn => self.lrn_conversion(node),
            SourceOp::Pooling => self.pooling_conversion(node, PoolKind::Max),
            SourceOp::MaxPool => self.pooling_conversion(node, PoolKind::Max),
            SourceOp::AveragePool => self.pooling_conversion(node, PoolKind::Average),
            SourceOp::PriorBox => self.prior_box_conversion(node),
            SourceOp::Relu => self.relu_conversion(node),
            SourceOp::Reshape => self.reshape_conversion(node),
            SourceOp::Softmax => self.softmax_conversion(node),
            SourceOp::Add => self.binary_conversion(node, "Add"),
            SourceOp::Mul => self.binary_conversion(node, "Mul"),
            SourceOp::Sum => self.sum_conversion(node),
            SourceOp::Constant => self.constant_conversion(node),
            SourceOp::GlobalAveragePool => self.global_avg_pool_conversion(node),
            SourceOp::Gemm => self.gemm_conversion(node),
            SourceOp::Pad => self.pad_conversion(node),
            SourceOp::Transpose => self.transpose_conversion(node),
            SourceOp::Upsample => self.upsample_conversion(node),
            SourceOp::Identity => self.identity_conversion(node),
            SourceOp::Custom(tag) => {
                log::warn!("Unsupported source operator `{tag}`; emitting identity passthrough");
                self.unsupported.insert(tag.clone());
                self.identity_conversion(node)
            }
        }
    }

    /// Node-based models start from their side tables: one placeholder per
    /// true graph input, one constant per initializer (rank-4 initializers
    /// are kernels and reorder to the channel-last kernel layout).
    fn emit_prelude(&mut self, source: &SourceGraph) -> Result<()> {
        for placeholder in &source.placeholders {
            self.push(
                TargetNode::new("Placeholder", &placeholder.name)
                    .attr("dtype", AttrValue::Type(placeholder.dtype))
                    .attr(
                        "shape",
                        AttrValue::Shape(layout::to_nhwc_shape(&placeholder.dims)),
                    ),
            )?;
        }
        for tensor in &source.initializers {
            self.push(
                TargetNode::new("Const", &tensor.name)
                    .attr("dtype", AttrValue::Type(tensor.dtype))
                    .attr(
                        "value",
                        AttrValue::Tensor(TensorLiteral::new(
                            tensor.dtype,
                            layout::kernel_to_hwio(&tensor.dims),
                            tensor.data.clone(),
                        )),
                    ),
            )?;
        }
        Ok(())
    }

    fn push(&mut self, node: TargetNode) -> Result<()> {
        self.graph.push(node)?;
        let node = self.graph.nodes().last().expect("node was just appended");
        self.shapes.record(node, &self.graph);
        Ok(())
    }

    fn node_name<'a>(&self, node: &'a SourceNode) -> Result<&'a str> {
        node.effective_name().ok_or_else(|| {
            Error::MalformedModel(format!("a {} node has neither name nor outputs", node.op))
        })
    }

    fn bottom<'a>(&self, node: &'a SourceNode, name: &str) -> Result<&'a str> {
        node.inputs.first().map(String::as_str).ok_or_else(|| {
            Error::MissingInput {
                node: name.to_string(),
                op: node.op.to_string(),
            }
        })
    }

    /// Channel (last) dimension of an already-emitted node, if known.
    fn channel_of(&self, name: &str) -> DimSize {
        self.shapes
            .shape_of(name)
            .and_then(|shape| shape.get(3).copied().flatten())
    }

    fn input_conversion(&mut self, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?;
        let dims = match node.attr("shape") {
            Some(value) => value.clone().into_i64s(),
            None => panic!("Input `{name}`: a declared shape is required"),
        };

        self.push(
            TargetNode::new("Placeholder", name)
                .attr("dtype", AttrValue::Type(Dtype::Float))
                .attr("shape", AttrValue::Shape(layout::to_nhwc_shape(&dims))),
        )
    }

    fn batch_norm_conversion(&mut self, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        let bottom = self.bottom(node, &name)?.to_string();
        let config = batch_norm_config(node);

        match self.dialect {
            Dialect::LayerBased => {
                let channels = self.channel_of(&bottom);
                let expansion = expand::batch_norm(&name, &bottom, &config, channels);
                for emitted in expansion.nodes {
                    self.push(emitted)?;
                }
                self.push(
                    TargetNode::new("Identity", name)
                        .input(expansion.tail)
                        .attr("T", AttrValue::Type(Dtype::Float)),
                )
            }
            Dialect::NodeBased => {
                // scale/offset/mean/variance already exist as constants
                let mut fused = TargetNode::new("FusedBatchNorm", name)
                    .attr("T", AttrValue::Type(Dtype::Float))
                    .attr("epsilon", AttrValue::Float(config.epsilon))
                    .attr("is_training", AttrValue::Bool(config.training));
                for input in &node.inputs {
                    fused = fused.input(input);
                }
                self.push(fused)
            }
        }
    }

    fn concat_conversion(&mut self, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        self.bottom(node, &name)?;
        let axis = concat_config(self.dialect, node);

        self.push(constant::int_scalar(&name, Role::Axis, axis as i32))?;

        let mut concat = TargetNode::new("ConcatV2", &name)
            .attr("T", AttrValue::Type(Dtype::Float))
            .attr("N", AttrValue::Int(node.inputs.len() as i64));
        for input in &node.inputs {
            concat = concat.input(input);
        }
        self.push(concat.input(constant::const_name(&name, Role::Axis)))
    }

    fn conv_conversion(&mut self, source: &SourceGraph, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        let bottom = self.bottom(node, &name)?.to_string();
        let config = conv2d_config(node);

        // node-based models declare the weight tensor as a second input
        let weight = node.inputs.get(1).and_then(|w| source.initializer(w));

        let num_output = match config.num_output.or_else(|| weight.map(|t| t.dims[0])) {
            Some(channels) => channels,
            None => panic!("Convolution `{name}`: output channels are not declared"),
        };

        // the kernel's 3rd dimension is the input channel count; prefer the
        // weight tensor, fall back to the oracle, defer when still unknown
        let kernel_name = constant::const_name(&name, Role::Kernel);
        let in_channels = weight
            .map(|t| t.dims[1])
            .or_else(|| self.channel_of(&bottom));
        let in_channels = match in_channels {
            Some(channels) => channels,
            None => {
                log::warn!(
                    "Convolution `{name}`: input channel count of `{bottom}` unknown at emission; deferring"
                );
                self.fixups.push(PendingFixup::new(
                    kernel_name.clone(),
                    bottom.clone(),
                    FixupRole::KernelChannels,
                ));
                -1
            }
        };

        self.push(constant::shape_only(
            &name,
            Role::Kernel,
            &[config.kernel[0], config.kernel[1], in_channels, num_output],
        ))?;

        self.push(
            TargetNode::new("Conv2D", &name)
                .input(&bottom)
                .input(&kernel_name)
                .attr("T", AttrValue::Type(Dtype::Float))
                .attr(
                    "strides",
                    AttrValue::Ints(vec![1, config.stride[0], config.stride[1], 1]),
                )
                .attr(
                    "padding",
                    AttrValue::bytes(if config.pad_same { "SAME" } else { "VALID" }),
                ),
        )
    }

    fn crop_conversion(&mut self, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        let bottom = self.bottom(node, &name)?.to_string();
        let reference = node
            .inputs
            .get(1)
            .ok_or_else(|| Error::MissingInput {
                node: name.clone(),
                op: node.op.to_string(),
            })?
            .clone();

        // target size is the reference input's spatial dims; -1 when unknown
        let (height, width) = match self.shapes.shape_of(&reference) {
            Some(shape) if shape.len() == 4 => (shape[1], shape[2]),
            _ => (None, None),
        };
        let size = [
            height.map(|d| d as i32).unwrap_or(-1),
            width.map(|d| d as i32).unwrap_or(-1),
        ];

        self.push(constant::int_vector(&name, Role::Size, &size))?;
        self.push(
            TargetNode::new("ResizeBilinear", &name)
                .input(&bottom)
                .input(constant::const_name(&name, Role::Size))
                .attr("T", AttrValue::Type(Dtype::Float))
                .attr("align_corners", AttrValue::Bool(false)),
        )
    }

    fn deconv_conversion(&mut self, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        let bottom = self.bottom(node, &name)?.to_string();
        let config = conv2d_config(node);
        if config.num_output.is_none() {
            panic!("Deconvolution `{name}`: output channels are not declared");
        }

        let in_channels = self.channel_of(&bottom);
        let expansion = expand::conv2d_transpose(&name, &bottom, &config, in_channels);
        for emitted in expansion.nodes {
            self.push(emitted)?;
        }
        self.push(
            TargetNode::new("Identity", name)
                .input(expansion.tail)
                .attr("T", AttrValue::Type(Dtype::Float)),
        )
    }

    fn eltwise_conversion(&mut self, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        self.bottom(node, &name)?;

        let mut combined = match eltwise_config(node) {
            EltwiseOp::Mul => TargetNode::new("Mul", &name),
            EltwiseOp::Sum => TargetNode::new("AddN", &name)
                .attr("N", AttrValue::Int(node.inputs.len() as i64)),
            EltwiseOp::Max => TargetNode::new("Max", &name),
        };
        combined = combined.attr("T", AttrValue::Type(Dtype::Float));
        for input in &node.inputs {
            combined = combined.input(input);
        }
        self.push(combined)
    }

    fn binary_conversion(&mut self, node: &SourceNode, op: &str) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        self.bottom(node, &name)?;

        let mut emitted = TargetNode::new(op, &name).attr("T", AttrValue::Type(Dtype::Float));
        for input in &node.inputs {
            emitted = emitted.input(input);
        }
        self.push(emitted)
    }

    fn sum_conversion(&mut self, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        self.bottom(node, &name)?;

        let mut sum = TargetNode::new("AddN", &name)
            .attr("T", AttrValue::Type(Dtype::Float))
            .attr("N", AttrValue::Int(node.inputs.len() as i64));
        for input in &node.inputs {
            sum = sum.input(input);
        }
        self.push(sum)
    }

    fn flatten_conversion(&mut self, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        let bottom = self.bottom(node, &name)?.to_string();
        flatten_config(node)?;

        // collapse everything behind the batch dim into one dimension
        let out_dim = match self.shapes.shape_of(&bottom) {
            Some(shape) => shape
                .get(1..)
                .unwrap_or(&[])
                .iter()
                .copied()
                .collect::<Option<Vec<i64>>>()
                .map(|dims| dims.iter().product::<i64>()),
            None => None,
        };
        let out_dim = match out_dim {
            Some(dim) => dim as i32,
            None => {
                log::warn!("Flatten `{name}`: input shape of `{bottom}` unknown; emitting wildcard");
                -1
            }
        };

        self.push(constant::int_vector(&name, Role::Shape, &[-1, out_dim]))?;
        self.push(
            TargetNode::new("Reshape", &name)
                .input(&bottom)
                .input(constant::const_name(&name, Role::Shape))
                .attr("T", AttrValue::Type(Dtype::Float))
                .attr("Tshape", AttrValue::Type(Dtype::Int32)),
        )
    }

    fn dense_conversion(&mut self, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        let bottom = self.bottom(node, &name)?.to_string();
        let units = match node.attr("num_output") {
            Some(value) => value.clone().into_i64(),
            None => panic!("InnerProduct `{name}`: num_output is required"),
        };

        let in_features = self
            .shapes
            .shape_of(&bottom)
            .and_then(|shape| shape.last().copied().flatten());
        let expansion = expand::dense(&name, &bottom, units, in_features);
        for emitted in expansion.nodes {
            self.push(emitted)?;
        }
        self.push(
            TargetNode::new("Identity", name)
                .input(expansion.tail)
                .attr("T", AttrValue::Type(Dtype::Float)),
        )
    }

    fn gemm_conversion(&mut self, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        self.bottom(node, &name)?;
        let rhs = node
            .inputs
            .get(1)
            .ok_or_else(|| Error::MissingInput {
                node: name.clone(),
                op: node.op.to_string(),
            })?
            .clone();
        let (trans_a, trans_b) = gemm_config(node);

        // the bias input, if any, is deliberately dropped
        let mut matmul = TargetNode::new("MatMul", &name)
            .input(&node.inputs[0])
            .input(rhs)
            .attr("T", AttrValue::Type(Dtype::Float));
        if trans_a {
            matmul = matmul.attr("transpose_a", AttrValue::Bool(true));
        }
        if trans_b {
            matmul = matmul.attr("transpose_b", AttrValue::Bool(true));
        }
        self.push(matmul)
    }

    fn global_avg_pool_conversion(&mut self, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        let bottom = self.bottom(node, &name)?.to_string();

        self.push(constant::int_vector(&name, Role::ReductionIndices, &[1, 2]))?;
        self.push(
            TargetNode::new("Mean", &name)
                .input(&bottom)
                .input(constant::const_name(&name, Role::ReductionIndices))
                .attr("T", AttrValue::Type(Dtype::Float))
                .attr("keep_dims", AttrValue::Bool(true)),
        )
    }

    fn lrn_conversion(&mut self, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        let bottom = self.bottom(node, &name)?.to_string();
        let config = lrn_config(self.dialect, node);

        let mut lrn = TargetNode::new("LRN", &name)
            .input(&bottom)
            .attr("T", AttrValue::Type(Dtype::Float))
            .attr("alpha", AttrValue::Float(config.alpha))
            .attr("beta", AttrValue::Float(config.beta))
            .attr("depth_radius", AttrValue::Int(config.depth_radius));
        if let Some(bias) = config.bias {
            lrn = lrn.attr("bias", AttrValue::Float(bias));
        }
        self.push(lrn)
    }

    fn pooling_conversion(&mut self, node: &SourceNode, kind: PoolKind) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        let bottom = self.bottom(node, &name)?.to_string();
        let config = pool2d_config(node, kind);

        let op = match config.kind {
            PoolKind::Max => "MaxPool",
            PoolKind::Average => "AvgPool",
        };
        self.push(
            TargetNode::new(op, &name)
                .input(&bottom)
                .attr("T", AttrValue::Type(Dtype::Float))
                .attr(
                    "ksize",
                    AttrValue::Ints(vec![1, config.kernel[0], config.kernel[1], 1]),
                )
                .attr(
                    "strides",
                    AttrValue::Ints(vec![1, config.stride[0], config.stride[1], 1]),
                )
                .attr(
                    "padding",
                    AttrValue::bytes(if config.pad_same { "SAME" } else { "VALID" }),
                ),
        )
    }

    fn pad_conversion(&mut self, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        let bottom = self.bottom(node, &name)?.to_string();
        let config = pad_config(node);

        // source order is [x1_begin, x2_begin, ..., x1_end, x2_end, ...]
        let rank = (config.pads.len() + 1) / 2;
        let mut rows: Vec<[i32; 2]> = (0..rank)
            .map(|i| [config.pads[i] as i32, config.pads[i + rank] as i32])
            .collect();
        if rank == 4 {
            rows = vec![rows[0], rows[2], rows[3], rows[1]];
        }

        self.push(constant::int_matrix(&name, Role::Paddings, &rows))?;

        let mut padded = if config.reflect {
            TargetNode::new("MirrorPad", &name).attr("mode", AttrValue::bytes("REFLECT"))
        } else {
            TargetNode::new("Pad", &name)
        };
        padded = padded
            .input(&bottom)
            .input(constant::const_name(&name, Role::Paddings))
            .attr("T", AttrValue::Type(Dtype::Float))
            .attr("Tpaddings", AttrValue::Type(Dtype::Int32));
        self.push(padded)
    }

    fn prior_box_conversion(&mut self, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        let bottom = self.bottom(node, &name)?.to_string();

        // one shared prior set per batch; two channels (means, variances).
        // The exact width is underspecified upstream, so it stays a
        // wildcard rather than a guessed formula.
        self.push(constant::int_vector(&name, Role::Shape, &[1, 2, -1]))?;
        self.push(
            TargetNode::new("Reshape", &name)
                .input(&bottom)
                .input(constant::const_name(&name, Role::Shape))
                .attr("T", AttrValue::Type(Dtype::Float))
                .attr("Tshape", AttrValue::Type(Dtype::Int32)),
        )
    }

    fn relu_conversion(&mut self, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        let bottom = self.bottom(node, &name)?.to_string();

        self.push(
            TargetNode::new("Relu", name)
                .input(bottom)
                .attr("T", AttrValue::Type(Dtype::Float)),
        )
    }

    fn reshape_conversion(&mut self, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        let bottom = self.bottom(node, &name)?.to_string();

        // node-based models may pass the shape as a graph tensor
        if self.dialect == Dialect::NodeBased && node.inputs.len() > 1 {
            let shape_ref = node.inputs[1].clone();
            return self.push(
                TargetNode::new("Reshape", name)
                    .input(bottom)
                    .input(shape_ref)
                    .attr("T", AttrValue::Type(Dtype::Float))
                    .attr("Tshape", AttrValue::Type(Dtype::Int32)),
            );
        }

        let declared = reshape_config(node);
        let mut converted = layout::to_nhwc_shape(&declared);

        // a declared 0 copies the corresponding (post-conversion) input dim
        let bottom_shape = self.shapes.shape_of(&bottom).cloned();
        for (i, dim) in converted.iter_mut().enumerate() {
            if *dim == 0 {
                *dim = bottom_shape
                    .as_ref()
                    .and_then(|shape| shape.get(i).copied().flatten())
                    .unwrap_or_else(|| {
                        log::warn!(
                            "Reshape `{name}`: dimension {i} of `{bottom}` unknown; emitting wildcard"
                        );
                        -1
                    });
            }
        }
        let as_i32: Vec<i32> = converted.iter().map(|&d| d as i32).collect();

        self.push(constant::int_vector(&name, Role::Shape, &as_i32))?;
        self.push(
            TargetNode::new("Reshape", &name)
                .input(&bottom)
                .input(constant::const_name(&name, Role::Shape))
                .attr("T", AttrValue::Type(Dtype::Float))
                .attr("Tshape", AttrValue::Type(Dtype::Int32)),
        )
    }

    fn softmax_conversion(&mut self, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        let bottom = self.bottom(node, &name)?.to_string();

        self.push(
            TargetNode::new("Softmax", name)
                .input(bottom)
                .attr("T", AttrValue::Type(Dtype::Float)),
        )
    }

    fn constant_conversion(&mut self, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        let tensor = match node.attr("value") {
            Some(value) => value.clone().into_tensor(),
            None => panic!("Constant `{name}`: a value tensor is required"),
        };

        self.push(
            TargetNode::new("Const", name)
                .attr("dtype", AttrValue::Type(tensor.dtype))
                .attr(
                    "value",
                    AttrValue::Tensor(TensorLiteral::new(tensor.dtype, tensor.dims, tensor.data)),
                ),
        )
    }

    fn transpose_conversion(&mut self, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        let bottom = self.bottom(node, &name)?.to_string();
        let perm = match node.attr("perm") {
            Some(value) => value.clone().into_i64s(),
            None => panic!("Transpose `{name}`: a permutation is required"),
        };

        let remapped: Vec<i32> = layout::remap_perm(&perm).iter().map(|&p| p as i32).collect();
        self.push(constant::int_vector(&name, Role::Perm, &remapped))?;
        self.push(
            TargetNode::new("Transpose", &name)
                .input(&bottom)
                .input(constant::const_name(&name, Role::Perm))
                .attr("T", AttrValue::Type(Dtype::Float))
                .attr("Tperm", AttrValue::Type(Dtype::Int32)),
        )
    }

    fn upsample_conversion(&mut self, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?.to_string();
        let bottom = self.bottom(node, &name)?.to_string();
        let config = upsample_config(node);

        let (height, width) = match self.shapes.shape_of(&bottom) {
            Some(shape) if shape.len() == 4 => (shape[1], shape[2]),
            _ => (None, None),
        };
        let size = [
            height
                .map(|d| (d as f32 * config.height_scale) as i32)
                .unwrap_or(-1),
            width
                .map(|d| (d as f32 * config.width_scale) as i32)
                .unwrap_or(-1),
        ];

        let op = if config.nearest {
            "ResizeNearestNeighbor"
        } else {
            "ResizeBilinear"
        };
        self.push(constant::int_vector(&name, Role::Size, &size))?;
        self.push(
            TargetNode::new(op, &name)
                .input(&bottom)
                .input(constant::const_name(&name, Role::Size))
                .attr("T", AttrValue::Type(Dtype::Float)),
        )
    }

    fn identity_conversion(&mut self, node: &SourceNode) -> Result<()> {
        let name = self.node_name(node)?.to_string();

        let mut identity =
            TargetNode::new("Identity", name).attr("T", AttrValue::Type(Dtype::Float));
        if let Some(input) = node.inputs.first() {
            identity = identity.input(input);
        }
        self.push(identity)
    }
}
