//! # `ConvNorm` Module
//!
//! A [`ConvNorm2d`] module is a [`Conv2d`] layer followed by a [`BatchNorm`] layer;
//! with TensorFlow-style `SAME` or `VALID` padding.

use crate::layers::pad::{PaddingMode, pad_same};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::{Ignored, Module};
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, BatchNormConfig, PaddingConfig2d};
use burn::prelude::{Backend, Tensor};

/// Batch norm epsilon.
pub const BATCH_NORM_EPSILON: f64 = 1e-3;

/// Batch norm moving-average decay.
pub const BATCH_NORM_DECAY: f64 = 0.9997;

/// Build a [`BatchNormConfig`] with the `NASNet` epsilon / decay.
///
/// ``burn`` expresses decay as ``momentum = 1 - decay``.
pub fn nasnet_batch_norm_config(num_features: usize) -> BatchNormConfig {
    BatchNormConfig::new(num_features)
        .with_epsilon(BATCH_NORM_EPSILON)
        .with_momentum(1.0 - BATCH_NORM_DECAY)
}

/// [`ConvNorm2d`] Meta.
pub trait ConvNorm2dMeta {
    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Number of groups.
    fn groups(&self) -> usize;

    /// Number of output channels.
    fn out_channels(&self) -> usize;

    /// Kernel size.
    fn kernel_size(&self) -> [usize; 2];

    /// Get the stride.
    fn stride(&self) -> [usize; 2];

    /// Get the dilation.
    fn dilation(&self) -> [usize; 2];

    /// Padding mode.
    fn padding_mode(&self) -> PaddingMode;

    /// Get the output resolution for a given input resolution.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        self.padding_mode().output_resolution(
            input_resolution,
            self.kernel_size(),
            self.stride(),
            self.dilation(),
        )
    }
}

/// [`ConvNorm2d`] Config.
#[derive(Config, Debug)]
pub struct ConvNorm2dConfig {
    /// The [`Conv2d`] config.
    ///
    /// The conv padding is ignored; see `padding`.
    pub conv: Conv2dConfig,

    /// Padding mode.
    #[config(default = "PaddingMode::Same")]
    pub padding: PaddingMode,

    /// The [`BatchNorm`] config.
    ///
    /// The feature size is replaced by the conv output channels.
    #[config(default = "nasnet_batch_norm_config(0)")]
    pub norm: BatchNormConfig,
}

impl ConvNorm2dMeta for ConvNorm2dConfig {
    fn in_channels(&self) -> usize {
        self.conv.channels[0]
    }

    fn groups(&self) -> usize {
        self.conv.groups
    }

    fn out_channels(&self) -> usize {
        self.conv.channels[1]
    }

    fn kernel_size(&self) -> [usize; 2] {
        self.conv.kernel_size
    }

    fn stride(&self) -> [usize; 2] {
        self.conv.stride
    }

    fn dilation(&self) -> [usize; 2] {
        self.conv.dilation
    }

    fn padding_mode(&self) -> PaddingMode {
        self.padding
    }
}

impl From<Conv2dConfig> for ConvNorm2dConfig {
    fn from(conv: Conv2dConfig) -> Self {
        Self::new(conv)
    }
}

impl ConvNorm2dConfig {
    /// Square, bias-free conv/norm config.
    pub fn square(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        stride: usize,
    ) -> Self {
        Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size])
            .with_stride([stride, stride])
            .with_bias(false)
            .into()
    }

    /// Initialize a [`ConvNorm2d`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> ConvNorm2d<B> {
        let out_channels = self.out_channels();
        ConvNorm2d {
            conv: self
                .conv
                .with_padding(PaddingConfig2d::Valid)
                .init(device),
            norm: BatchNormConfig {
                num_features: out_channels,
                ..self.norm
            }
            .init(device),
            padding: Ignored(self.padding),
        }
    }
}

/// [`Conv2d`] and [`BatchNorm`] layer.
///
/// Implements [`ConvNorm2dMeta`].
#[derive(Module, Debug)]
pub struct ConvNorm2d<B: Backend> {
    /// Internal Conv2d layer.
    pub conv: Conv2d<B>,

    /// Internal Norm Layer.
    pub norm: BatchNorm<B, 2>,

    /// Padding mode.
    pub padding: Ignored<PaddingMode>,
}

impl<B: Backend> ConvNorm2dMeta for ConvNorm2d<B> {
    fn in_channels(&self) -> usize {
        self.conv.weight.shape().dims[1] * self.groups()
    }

    fn groups(&self) -> usize {
        self.conv.groups
    }

    fn out_channels(&self) -> usize {
        self.conv.weight.shape().dims[0]
    }

    fn kernel_size(&self) -> [usize; 2] {
        self.conv.kernel_size
    }

    fn stride(&self) -> [usize; 2] {
        self.conv.stride
    }

    fn dilation(&self) -> [usize; 2] {
        self.conv.dilation
    }

    fn padding_mode(&self) -> PaddingMode {
        self.padding.0
    }
}

impl<B: Backend> ConvNorm2d<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_height, out_width]``;
    /// see [`ConvNorm2dMeta::output_resolution`].
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_channels", "in_height", "in_width"],
            &input,
            &["batch", "in_height", "in_width"],
            &[("in_channels", self.in_channels())]
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let x = match self.padding_mode() {
            PaddingMode::Same => pad_same(
                input,
                self.kernel_size(),
                self.stride(),
                self.dilation(),
                0.0,
            ),
            PaddingMode::Valid => input,
        };
        let x = self.conv.forward(x);
        let x = self.norm.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        x
    }
}
