//! # Previous-Input Adjustment
//!
//! Every `NASNet` cell consumes two tensors: its primary input ``x``, and the
//! previous input ``p``. Before use, ``p`` is adjusted to ``filters``
//! channels at the resolution of ``x``.
//!
//! See [`AdjustMode`] for the cases.

use crate::layers::blocks::conv_norm::{
    ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta, nasnet_batch_norm_config,
};
use crate::layers::pad::shift_up_left;
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig};
use burn::nn::{BatchNorm, PaddingConfig2d, Relu};
use burn::prelude::{Backend, Tensor};
use serde::{Deserialize, Serialize};

/// How a cell adjusts its previous input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdjustMode {
    /// The cell has no previous input; ``x`` is used in its place.
    Passthrough,

    /// ``p`` already matches; used as-is.
    Identity,

    /// ``p`` matches resolution but not channels: ``relu -> 1x1 conv/norm``.
    Project,

    /// ``p`` is at twice the resolution of ``x``: factorized reduction.
    FactorizedReduce,
}

/// [`FactorizedReduce`] Config.
#[derive(Config, Debug)]
pub struct FactorizedReduceConfig {
    /// Input channels.
    pub in_channels: usize,

    /// Output channels; split across the two paths.
    pub out_channels: usize,
}

impl FactorizedReduceConfig {
    /// Output channels of each path.
    ///
    /// The first path takes ``out / 2``; the second the remainder,
    /// so odd widths still sum to ``out_channels``.
    pub fn path_channels(&self) -> [usize; 2] {
        let first = self.out_channels / 2;
        [first, self.out_channels - first]
    }

    /// Initialize a [`FactorizedReduce`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> FactorizedReduce<B> {
        let [c1, c2] = self.path_channels();
        let path_conv = |out_channels: usize| {
            Conv2dConfig::new([self.in_channels, out_channels], [1, 1])
                .with_padding(PaddingConfig2d::Valid)
                .with_bias(false)
                .init(device)
        };

        FactorizedReduce {
            act: Relu::new(),
            pool: AvgPool2dConfig::new([1, 1])
                .with_strides([2, 2])
                .with_padding(PaddingConfig2d::Valid)
                .init(),
            conv1: path_conv(c1),
            conv2: path_conv(c2),
            norm: nasnet_batch_norm_config(self.out_channels).init(device),
        }
    }
}

/// Factorized reduction.
///
/// Halves resolution without discarding odd pixels: one path samples even
/// pixels, the other samples odd pixels (via a one pixel shift); each path is
/// projected by a ``1x1`` conv and the results are concatenated and normalized.
#[derive(Module, Debug)]
pub struct FactorizedReduce<B: Backend> {
    /// Input activation.
    pub act: Relu,

    /// ``1x1`` stride 2 sampling pool.
    pub pool: AvgPool2d,

    /// Even-pixel path projection.
    pub conv1: Conv2d<B>,

    /// Odd-pixel path projection.
    pub conv2: Conv2d<B>,

    /// Post-concat norm.
    pub norm: BatchNorm<B, 2>,
}

impl<B: Backend> FactorizedReduce<B> {
    /// Number of input channels.
    pub fn in_channels(&self) -> usize {
        self.conv1.weight.shape().dims[1]
    }

    /// Number of output channels.
    pub fn out_channels(&self) -> usize {
        self.conv1.weight.shape().dims[0] + self.conv2.weight.shape().dims[0]
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, ceil(height / 2), ceil(width / 2)]``
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = self.act.forward(input);

        let x1 = self.conv1.forward(self.pool.forward(x.clone()));
        let x2 = self.conv2.forward(self.pool.forward(shift_up_left(x)));

        let x = Tensor::cat(vec![x1, x2], 1);
        self.norm.forward(x)
    }
}

/// [`PrevAdjust`] Config.
#[derive(Config, Debug)]
pub struct PrevAdjustConfig {
    /// Channels of the primary input ``x``.
    pub in_channels: usize,

    /// Channels of the previous input ``p``; `None` if the cell has none.
    #[config(default = "None")]
    pub prev_channels: Option<usize>,

    /// ``p`` is one reduction level above ``x``.
    #[config(default = false)]
    pub prev_reduced: bool,

    /// Target channels.
    pub filters: usize,
}

impl PrevAdjustConfig {
    /// The adjustment this config selects.
    pub fn mode(&self) -> AdjustMode {
        match self.prev_channels {
            None => AdjustMode::Passthrough,
            Some(_) if self.prev_reduced => AdjustMode::FactorizedReduce,
            Some(c) if c != self.filters => AdjustMode::Project,
            Some(_) => AdjustMode::Identity,
        }
    }

    /// Channels of the adjusted ``p``.
    pub fn out_channels(&self) -> usize {
        match self.mode() {
            AdjustMode::Passthrough => self.in_channels,
            _ => self.filters,
        }
    }

    /// Initialize a [`PrevAdjust`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> PrevAdjust<B> {
        let mut adjust = PrevAdjust {
            act: Relu::new(),
            project: None,
            reduce: None,
        };
        match (self.mode(), self.prev_channels) {
            (AdjustMode::Project, Some(c)) => {
                adjust.project = Some(ConvNorm2dConfig::square(c, self.filters, 1, 1).init(device));
            }
            (AdjustMode::FactorizedReduce, Some(c)) => {
                adjust.reduce = Some(FactorizedReduceConfig::new(c, self.filters).init(device));
            }
            _ => (),
        }
        adjust
    }
}

/// Previous-input adjustment.
#[derive(Module, Debug)]
pub struct PrevAdjust<B: Backend> {
    /// Activation for the projection path.
    pub act: Relu,

    /// Projection; present in [`AdjustMode::Project`].
    pub project: Option<ConvNorm2d<B>>,

    /// Reduction; present in [`AdjustMode::FactorizedReduce`].
    pub reduce: Option<FactorizedReduce<B>>,
}

impl<B: Backend> PrevAdjust<B> {
    /// The configured adjustment.
    ///
    /// Without a projection or reduction this reports [`AdjustMode::Identity`];
    /// whether it acts as [`AdjustMode::Passthrough`] depends on the
    /// previous input passed to [`PrevAdjust::forward`].
    pub fn mode(&self) -> AdjustMode {
        match (&self.project, &self.reduce) {
            (Some(_), _) => AdjustMode::Project,
            (_, Some(_)) => AdjustMode::FactorizedReduce,
            _ => AdjustMode::Identity,
        }
    }

    /// Output channels, if fixed by a projection or reduction.
    pub fn out_channels(&self) -> Option<usize> {
        match (&self.project, &self.reduce) {
            (Some(project), _) => Some(project.out_channels()),
            (_, Some(reduce)) => Some(reduce.out_channels()),
            _ => None,
        }
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `prev`: the previous input ``p``, if any.
    /// - `x`: the primary input; used in place of a missing ``p``.
    ///
    /// # Returns
    ///
    /// The adjusted ``p``, at the resolution of ``x``.
    pub fn forward(
        &self,
        prev: Option<Tensor<B, 4>>,
        x: &Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let p = match prev {
            None => return x.clone(),
            Some(p) => p,
        };
        if let Some(reduce) = &self.reduce {
            return reduce.forward(p);
        }
        if let Some(project) = &self.project {
            return project.forward(self.act.forward(p));
        }
        p
    }
}
