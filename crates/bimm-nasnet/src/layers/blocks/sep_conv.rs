//! # Separable Convolution Blocks
//!
//! * [`SeparableConvNorm2d`] - depthwise conv, pointwise conv, batch norm.
//! * [`SeparableBranch`] - the `NASNet` separable branch:
//!   ``relu -> sep_conv_norm(stride) -> relu -> sep_conv_norm(1)``.
//!
//! All convolutions use `SAME` padding and no bias.

use crate::compat::conv_shape::same_output_shape;
use crate::layers::blocks::conv_norm::nasnet_batch_norm_config;
use crate::layers::pad::pad_same;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::{BatchNorm, PaddingConfig2d, Relu};
use burn::prelude::{Backend, Tensor};

/// [`SeparableConvNorm2d`] Meta.
pub trait SeparableConvNorm2dMeta {
    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Number of output channels.
    fn out_channels(&self) -> usize;

    /// Square kernel size.
    fn kernel_size(&self) -> usize;

    /// Square stride.
    fn stride(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        same_output_shape(input_resolution, [self.stride(), self.stride()])
    }
}

/// [`SeparableConvNorm2d`] Config.
#[derive(Config, Debug)]
pub struct SeparableConvNorm2dConfig {
    /// Number of input channels.
    pub in_channels: usize,

    /// Number of output channels.
    pub out_channels: usize,

    /// Square kernel size of the depthwise conv.
    pub kernel_size: usize,

    /// Stride of the depthwise conv.
    #[config(default = 1)]
    pub stride: usize,
}

impl SeparableConvNorm2dMeta for SeparableConvNorm2dConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn kernel_size(&self) -> usize {
        self.kernel_size
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl SeparableConvNorm2dConfig {
    /// Initialize a [`SeparableConvNorm2d`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> SeparableConvNorm2d<B> {
        let k = self.kernel_size;
        let s = self.stride;
        SeparableConvNorm2d {
            depthwise: Conv2dConfig::new([self.in_channels, self.in_channels], [k, k])
                .with_stride([s, s])
                .with_groups(self.in_channels)
                .with_padding(PaddingConfig2d::Valid)
                .with_bias(false)
                .init(device),
            pointwise: Conv2dConfig::new([self.in_channels, self.out_channels], [1, 1])
                .with_padding(PaddingConfig2d::Valid)
                .with_bias(false)
                .init(device),
            norm: nasnet_batch_norm_config(self.out_channels).init(device),
        }
    }
}

/// Depthwise-separable conv followed by batch norm.
///
/// Implements [`SeparableConvNorm2dMeta`].
#[derive(Module, Debug)]
pub struct SeparableConvNorm2d<B: Backend> {
    /// Depthwise ``k x k`` conv; one group per channel.
    pub depthwise: Conv2d<B>,

    /// Pointwise ``1 x 1`` conv.
    pub pointwise: Conv2d<B>,

    /// Batch norm.
    pub norm: BatchNorm<B, 2>,
}

impl<B: Backend> SeparableConvNorm2dMeta for SeparableConvNorm2d<B> {
    fn in_channels(&self) -> usize {
        self.depthwise.groups
    }

    fn out_channels(&self) -> usize {
        self.pointwise.weight.shape().dims[0]
    }

    fn kernel_size(&self) -> usize {
        self.depthwise.kernel_size[0]
    }

    fn stride(&self) -> usize {
        self.depthwise.stride[0]
    }
}

impl<B: Backend> SeparableConvNorm2d<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, ceil(in_height / stride), ceil(in_width / stride)]``
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

        let x = pad_same(
            input,
            self.depthwise.kernel_size,
            self.depthwise.stride,
            self.depthwise.dilation,
            0.0,
        );
        let x = self.depthwise.forward(x);
        let x = self.pointwise.forward(x);
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

/// [`SeparableBranch`] Config.
#[derive(Config, Debug)]
pub struct SeparableBranchConfig {
    /// Number of input channels.
    pub in_channels: usize,

    /// Number of output channels; also the width of the inner block.
    pub filters: usize,

    /// Square kernel size.
    pub kernel_size: usize,

    /// Stride of the first block.
    #[config(default = 1)]
    pub stride: usize,
}

impl SeparableBranchConfig {
    /// Get the output resolution for a given input resolution.
    pub fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        same_output_shape(input_resolution, [self.stride, self.stride])
    }

    /// Initialize a [`SeparableBranch`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> SeparableBranch<B> {
        SeparableBranch {
            act: Relu::new(),
            sep1: SeparableConvNorm2dConfig::new(self.in_channels, self.filters, self.kernel_size)
                .with_stride(self.stride)
                .init(device),
            sep2: SeparableConvNorm2dConfig::new(self.filters, self.filters, self.kernel_size)
                .init(device),
        }
    }
}

/// Separable branch.
///
/// ``relu -> sep1(stride) -> relu -> sep2``
#[derive(Module, Debug)]
pub struct SeparableBranch<B: Backend> {
    /// Shared activation.
    pub act: Relu,

    /// First separable block; carries the stride.
    pub sep1: SeparableConvNorm2d<B>,

    /// Second separable block.
    pub sep2: SeparableConvNorm2d<B>,
}

impl<B: Backend> SeparableBranch<B> {
    /// Number of input channels.
    pub fn in_channels(&self) -> usize {
        self.sep1.in_channels()
    }

    /// Number of output channels.
    pub fn out_channels(&self) -> usize {
        self.sep2.out_channels()
    }

    /// Stride of the branch.
    pub fn stride(&self) -> usize {
        self.sep1.stride()
    }

    /// Forward Pass.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let x = self.act.forward(input);
        let x = self.sep1.forward(x);
        let x = self.act.forward(x);
        self.sep2.forward(x)
    }
}
