//! # `NASNet` Core Model
//!
//! [`NasNet`] is the core `NASNet-A` module.
//!
//! [`NasNetAbstractConfig`] implements [`Config`], and provides
//! a high-level configuration interface.
//! It provides [`NasNetAbstractConfig::try_to_structure`] to convert
//! to a [`NasNetConfig`], checking the cell stack as it goes.
//!
//! [`NasNetConfig`] implements [`Config`], and provides
//! [`NasNetConfig::init`] to initialize a [`NasNet`].
//!
//! [`NasNet`] implements [`Module`], and provides
//! [`NasNet::forward`] and friends.

use crate::compat::conv_shape::{maybe_valid_output_shape, same_output_shape};
use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use crate::layers::pad::PaddingMode;
use crate::models::nasnet::aux_head::{AuxHead, AuxHeadConfig};
use crate::models::nasnet::cell::{
    CellKind, CellOutput, NasNetCell, NasNetCellConfig, NasNetCellMeta,
};
use crate::models::nasnet::normal_cell::NormalCellConfig;
use crate::models::nasnet::reduction_cell::ReductionCellConfig;
use anyhow::bail;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::{Ignored, Module};
use burn::nn::pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig, Relu};
use burn::prelude::{Backend, Tensor};
use burn::tensor::activation::softmax;
use serde::{Deserialize, Serialize};

/// Stem conv kernel size.
pub const STEM_KERNEL_SIZE: usize = 3;

/// Stem conv stride.
pub const STEM_STRIDE: usize = 2;

/// Minimum cell filter width; the factorized reduction needs two non-empty paths.
pub const MIN_CELL_FILTERS: usize = 2;

/// High-level `NASNet-A` model configuration.
#[derive(Config, Debug)]
pub struct NasNetAbstractConfig {
    /// Stem conv width.
    pub stem_filters: usize,

    /// Normal cells per stack.
    pub normals: usize,

    /// Filter width of the first normal stack.
    pub filters: usize,

    /// Number of classification classes.
    pub num_classes: usize,

    /// Reduction cells hand their incoming ``p`` on, instead of their input.
    #[config(default = "false")]
    pub skip_reduction: bool,

    /// Build the auxiliary head.
    #[config(default = "true")]
    pub use_aux: bool,

    /// Filter scaling factor between reduction levels.
    #[config(default = "2")]
    pub scaling: usize,

    /// Number of input channels.
    #[config(default = "3")]
    pub in_channels: usize,

    /// Input ``[height, width]``.
    #[config(default = "[224, 224]")]
    pub input_resolution: [usize; 2],

    /// Head dropout probability.
    #[config(default = "0.5")]
    pub dropout: f64,
}

/// Tracks the tensors seen by the next cell while lifting a config.
#[derive(Debug, Clone, Copy)]
struct FeatureState {
    channels: usize,
    level: usize,
    resolution: [usize; 2],
}

/// Builds the cell stack; checking each cell's inputs.
struct CellStackBuilder {
    cells: Vec<NasNetCellConfig>,
    x: FeatureState,
    p: Option<FeatureState>,
}

impl CellStackBuilder {
    fn new(
        channels: usize,
        resolution: [usize; 2],
    ) -> Self {
        Self {
            cells: Vec::new(),
            x: FeatureState {
                channels,
                level: 0,
                resolution,
            },
            p: None,
        }
    }

    fn check_filters(
        &self,
        filters: usize,
    ) -> anyhow::Result<()> {
        if filters < MIN_CELL_FILTERS {
            bail!(
                "Cell {} filters ({filters}) must be at least {MIN_CELL_FILTERS}",
                self.cells.len()
            );
        }
        Ok(())
    }

    /// Whether ``p`` is one level above ``x``.
    fn prev_reduced(&self) -> anyhow::Result<bool> {
        let x = self.x;
        let p = match self.p {
            None => return Ok(false),
            Some(p) => p,
        };
        if p.level == x.level {
            return Ok(false);
        }
        if p.level + 1 == x.level && same_output_shape(p.resolution, [2, 2]) == x.resolution {
            return Ok(true);
        }
        bail!(
            "Cell {} previous input (level {}, {:?}) cannot be adjusted to its input (level {}, {:?})",
            self.cells.len(),
            p.level,
            p.resolution,
            x.level,
            x.resolution
        );
    }

    fn push_normal(
        &mut self,
        filters: usize,
    ) -> anyhow::Result<()> {
        self.check_filters(filters)?;
        let prev_reduced = self.prev_reduced()?;
        let p = match self.p {
            Some(p) => p,
            None => bail!("Normal cell {} requires a previous input", self.cells.len()),
        };

        let config = NormalCellConfig::new(self.x.channels, p.channels, filters)
            .with_prev_reduced(prev_reduced);

        self.p = Some(self.x);
        self.x = FeatureState {
            channels: config.out_channels(),
            ..self.x
        };
        self.cells.push(config.into());
        Ok(())
    }

    fn push_reduction(
        &mut self,
        filters: usize,
        keep_prev: bool,
    ) -> anyhow::Result<()> {
        self.check_filters(filters)?;
        let prev_reduced = self.prev_reduced()?;

        let config = ReductionCellConfig::new(self.x.channels, filters)
            .with_prev_channels(self.p.map(|p| p.channels))
            .with_prev_reduced(prev_reduced)
            .with_keep_prev(keep_prev);

        if !(keep_prev && self.p.is_some()) {
            self.p = Some(self.x);
        }
        self.x = FeatureState {
            channels: config.out_channels(),
            level: self.x.level + 1,
            resolution: config.output_resolution(self.x.resolution),
        };
        self.cells.push(config.into());
        Ok(())
    }
}

impl NasNetAbstractConfig {
    /// `NASNet-A` large; ``331x331`` inputs.
    pub fn nasnet_a_large(num_classes: usize) -> Self {
        Self::new(96, 6, 168, num_classes)
            .with_skip_reduction(true)
            .with_input_resolution([331, 331])
    }

    /// `NASNet-A` mobile; ``224x224`` inputs.
    pub fn nasnet_a_mobile(num_classes: usize) -> Self {
        Self::new(32, 4, 44, num_classes)
    }

    /// Set the stem conv width.
    pub fn with_stem_filters(
        mut self,
        stem_filters: usize,
    ) -> Self {
        self.stem_filters = stem_filters;
        self
    }

    /// Set the number of normal cells per level.
    pub fn with_normals(
        mut self,
        normals: usize,
    ) -> Self {
        self.normals = normals;
        self
    }

    /// Set the base cell filter width.
    pub fn with_filters(
        mut self,
        filters: usize,
    ) -> Self {
        self.filters = filters;
        self
    }

    /// Set the number of classes.
    pub fn with_num_classes(
        mut self,
        num_classes: usize,
    ) -> Self {
        self.num_classes = num_classes;
        self
    }

    /// Cell filter width at a scaling exponent: ``filters * scaling^exponent``.
    ///
    /// Fractional widths truncate toward zero.
    pub fn cell_filters(
        &self,
        exponent: i32,
    ) -> usize {
        (self.filters as f64 * (self.scaling as f64).powi(exponent)) as usize
    }

    /// The stem conv config.
    pub fn stem_config(&self) -> ConvNorm2dConfig {
        ConvNorm2dConfig::square(
            self.in_channels,
            self.stem_filters,
            STEM_KERNEL_SIZE,
            STEM_STRIDE,
        )
        .with_padding(PaddingMode::Valid)
    }

    /// Convert to a [`NasNetConfig`].
    ///
    /// # Errors
    ///
    /// If the cell stack cannot be built for the configured input.
    pub fn try_to_structure(self) -> anyhow::Result<NasNetConfig> {
        if self.num_classes == 0 {
            bail!("num_classes must be > 0");
        }
        if self.scaling == 0 {
            bail!("scaling must be > 0");
        }
        if !(0.0..=1.0).contains(&self.dropout) {
            bail!("dropout ({}) must be in [0, 1]", self.dropout);
        }

        let stem = self.stem_config();
        let stem_resolution = if self.input_resolution.contains(&0) {
            None
        } else {
            maybe_valid_output_shape(
                self.input_resolution,
                stem.kernel_size(),
                stem.stride(),
            )
        };
        let stem_resolution = match stem_resolution {
            Some(res) => res,
            None => bail!(
                "Input resolution {:?} is too small for the stem conv",
                self.input_resolution
            ),
        };

        let mut stack = CellStackBuilder::new(self.stem_filters, stem_resolution);
        stack.push_reduction(self.cell_filters(-2), false)?;
        stack.push_reduction(self.cell_filters(-1), false)?;

        let mut aux = None;
        for exponent in 0..3 {
            if exponent > 0 {
                stack.push_reduction(self.cell_filters(exponent), self.skip_reduction)?;
            }
            for _ in 0..self.normals {
                stack.push_normal(self.cell_filters(exponent))?;
            }
            if exponent == 1 && self.use_aux {
                let head =
                    AuxHeadConfig::new(stack.x.channels, self.num_classes, stack.x.resolution);
                head.try_pooled_resolution()?;
                aux = Some(AuxTapConfig::new(stack.cells.len() - 1, head));
            }
        }

        let config = NasNetConfig::new(
            stem,
            stack.cells,
            self.num_classes,
            self.input_resolution,
        )
        .with_aux(aux)
        .with_dropout(self.dropout);

        tracing::debug!(
            cells = config.cells.len(),
            feature_channels = config.feature_channels(),
            aux = config.aux.is_some(),
            "Lifted NASNet structure config"
        );

        Ok(config)
    }

    /// Convert to a [`NasNetConfig`].
    ///
    /// # Panics
    ///
    /// If the cell stack cannot be built for the configured input.
    pub fn to_structure(self) -> NasNetConfig {
        match self.try_to_structure() {
            Ok(config) => config,
            Err(e) => panic!("{}", e),
        }
    }
}

/// Where and how the auxiliary head taps the cell stack.
#[derive(Config, Debug)]
pub struct AuxTapConfig {
    /// Index of the cell whose output feeds the head.
    pub after_cell: usize,

    /// The head config.
    pub head: AuxHeadConfig,
}

/// Summary of one cell of a [`NasNetConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellPlan {
    /// Position in the stack.
    pub index: usize,

    /// Cell kind.
    pub kind: CellKind,

    /// Cell filter width.
    pub filters: usize,

    /// Channels of ``x``.
    pub in_channels: usize,

    /// Channels of ``p``, if any.
    pub prev_channels: Option<usize>,

    /// Output channels.
    pub out_channels: usize,

    /// Reduction level of the output.
    pub level: usize,

    /// Output ``[height, width]``.
    pub resolution: [usize; 2],

    /// The auxiliary head taps this cell's output.
    pub aux_tap: bool,
}

/// [`NasNet`] Structure Config.
///
/// This config defines the structure of a lifted `NASNet` model.
/// It does not check the validity of the internal sizes before or
/// during construction; see [`NasNetAbstractConfig::try_to_structure`].
#[derive(Config, Debug)]
pub struct NasNetConfig {
    /// The stem conv/norm.
    pub stem: ConvNorm2dConfig,

    /// The cell stack.
    pub cells: Vec<NasNetCellConfig>,

    /// The auxiliary head.
    #[config(default = "None")]
    pub aux: Option<AuxTapConfig>,

    /// Number of classes.
    pub num_classes: usize,

    /// Input ``[height, width]``.
    pub input_resolution: [usize; 2],

    /// Head dropout probability.
    #[config(default = "0.5")]
    pub dropout: f64,
}

impl NasNetConfig {
    /// Channels of the final feature map.
    pub fn feature_channels(&self) -> usize {
        match self.cells.last() {
            Some(cell) => cell.out_channels(),
            None => self.stem.out_channels(),
        }
    }

    /// Per-cell summary of the stack.
    pub fn cell_plan(&self) -> Vec<CellPlan> {
        let aux_tap = self.aux.as_ref().map(|a| a.after_cell);
        let mut resolution = self.stem.output_resolution(self.input_resolution);
        let mut level = 0;

        self.cells
            .iter()
            .enumerate()
            .map(|(index, cell)| {
                resolution = cell.output_resolution(resolution);
                if cell.kind() == CellKind::Reduction {
                    level += 1;
                }
                CellPlan {
                    index,
                    kind: cell.kind(),
                    filters: cell.filters(),
                    in_channels: cell.in_channels(),
                    prev_channels: cell.prev_channels(),
                    out_channels: cell.out_channels(),
                    level,
                    resolution,
                    aux_tap: aux_tap == Some(index),
                }
            })
            .collect()
    }

    /// Initialize a [`NasNet`] model.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> NasNet<B> {
        tracing::debug!(
            cells = self.cells.len(),
            num_classes = self.num_classes,
            "Initializing NASNet"
        );

        NasNet {
            stem: self.stem.clone().init(device),
            cells: self.cells.iter().map(|c| c.init(device)).collect(),
            aux: self.aux.as_ref().map(|a| a.head.init(device)),
            aux_tap: self.aux.as_ref().map_or(0, |a| a.after_cell),
            input_resolution: Ignored(self.input_resolution),
            act: Relu::new(),
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(self.dropout).init(),
            fc: LinearConfig::new(self.feature_channels(), self.num_classes).init(device),
        }
    }
}

/// [`NasNet`] classifier outputs.
#[derive(Debug, Clone)]
pub struct NasNetOutput<B: Backend> {
    /// Main head: ``[batch, num_classes]``.
    pub main: Tensor<B, 2>,

    /// Auxiliary head: ``[batch, num_classes]``; if present.
    pub aux: Option<Tensor<B, 2>>,
}

/// `NASNet-A` model.
#[derive(Module, Debug)]
pub struct NasNet<B: Backend> {
    /// Stem conv/norm.
    pub stem: ConvNorm2d<B>,

    /// Cells.
    pub cells: Vec<NasNetCell<B>>,

    /// Auxiliary head.
    pub aux: Option<AuxHead<B>>,

    /// Index of the cell feeding the auxiliary head.
    pub aux_tap: usize,

    /// Input ``[height, width]`` the auxiliary head was sized for.
    pub input_resolution: Ignored<[usize; 2]>,

    /// Head activation.
    pub act: Relu,

    /// Head pooling.
    pub pool: AdaptiveAvgPool2d,

    /// Head dropout.
    pub dropout: Dropout,

    /// Head classifier.
    pub fc: Linear<B>,
}

impl<B: Backend> NasNet<B> {
    /// Number of classes.
    pub fn num_classes(&self) -> usize {
        self.fc.weight.dims()[1]
    }

    /// Channels of the final feature map.
    pub fn feature_channels(&self) -> usize {
        self.fc.weight.dims()[0]
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// Class probabilities: ``[batch, num_classes]``.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let (features, _) = self.forward_trunk(input, false);
        softmax(self.head(features), 1)
    }

    /// Forward Pass, with auxiliary probabilities.
    ///
    /// # Panics
    ///
    /// If the model has an auxiliary head, and the input resolution is not
    /// the configured ``input_resolution``.
    pub fn forward_with_aux(
        &self,
        input: Tensor<B, 4>,
    ) -> NasNetOutput<B> {
        let NasNetOutput { main, aux } = self.forward_logits(input);
        NasNetOutput {
            main: softmax(main, 1),
            aux: aux.map(|a| softmax(a, 1)),
        }
    }

    /// Forward Pass, returning pre-softmax logits for both heads.
    ///
    /// # Panics
    ///
    /// If the model has an auxiliary head, and the input resolution is not
    /// the configured ``input_resolution``.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn forward_logits(
        &self,
        input: Tensor<B, 4>,
    ) -> NasNetOutput<B> {
        let (features, aux) = self.forward_trunk(input, true);
        NasNetOutput {
            main: self.head(features),
            aux,
        }
    }

    /// Forward Pass, returning the final cell output.
    ///
    /// # Returns
    ///
    /// ``[batch, feature_channels, height, width]``.
    pub fn forward_features(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        self.forward_trunk(input, false).0
    }

    fn forward_trunk(
        &self,
        input: Tensor<B, 4>,
        with_aux: bool,
    ) -> (Tensor<B, 4>, Option<Tensor<B, 2>>) {
        // The aux conv kernel is fixed by the configured resolution.
        let batch = if with_aux && self.aux.is_some() {
            let [height, width] = self.input_resolution.0;
            let [batch] = unpack_shape_contract!(
                ["batch", "in_channels", "height", "width"],
                &input,
                &["batch"],
                &[
                    ("in_channels", self.stem.in_channels()),
                    ("height", height),
                    ("width", width)
                ]
            );
            batch
        } else {
            let [batch] = unpack_shape_contract!(
                ["batch", "in_channels", "height", "width"],
                &input,
                &["batch"],
                &[("in_channels", self.stem.in_channels())]
            );
            batch
        };

        let mut x = self.stem.forward(input);
        let mut prev = None;
        let mut aux = None;

        for (idx, cell) in self.cells.iter().enumerate() {
            let CellOutput { out, prev: next } = cell.forward(x, prev);
            x = out;
            prev = Some(next);

            if with_aux && idx == self.aux_tap {
                if let Some(head) = &self.aux {
                    aux = Some(head.forward(x.clone()));
                }
            }
        }

        assert_shape_contract_periodically!(
            ["batch", "channels", "height", "width"],
            &x,
            &[("batch", batch), ("channels", self.feature_channels())]
        );

        (x, aux)
    }

    fn head(
        &self,
        features: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let x = self.act.forward(features);
        let x = self.pool.forward(x);
        // Reshape [B, C, 1, 1] -> [B, C]
        let x = x.flatten(1, 3);
        let x = self.dropout.forward(x);
        self.fc.forward(x)
    }

    /// Re-initialize the classifiers with the specified number of output classes.
    pub fn with_classes(
        mut self,
        num_classes: usize,
    ) -> Self {
        let [d_input, _d_output] = self.fc.weight.dims();
        self.fc = LinearConfig::new(d_input, num_classes).init(&self.fc.weight.device());
        self.aux = self.aux.map(|head| head.with_classes(num_classes));
        self
    }

    /// Drop the auxiliary head.
    pub fn without_aux(mut self) -> Self {
        self.aux = None;
        self
    }
}
