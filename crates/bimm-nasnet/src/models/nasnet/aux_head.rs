//! # Auxiliary Classifier Head
//!
//! ```text
//! relu -> avg_pool(5, stride 3, VALID) -> convbn(128, 1x1) -> relu
//!      -> convbn(768, k x k, VALID) -> relu -> flatten -> fc
//! ```
//!
//! ``k`` is the pooled resolution, so the second conv reduces to ``1x1``.

use crate::compat::conv_shape::maybe_valid_output_shape;
use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use crate::layers::pad::PaddingMode;
use anyhow::bail;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::conv::Conv2dConfig;
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig};
use burn::nn::{Linear, LinearConfig, PaddingConfig2d, Relu};
use burn::prelude::{Backend, Tensor};

/// Aux pool window.
pub const AUX_POOL_SIZE: usize = 5;

/// Aux pool stride.
pub const AUX_POOL_STRIDE: usize = 3;

/// Aux projection width.
pub const AUX_PROJ_CHANNELS: usize = 128;

/// Aux feature width.
pub const AUX_FEATURE_CHANNELS: usize = 768;

/// [`AuxHead`] Config.
#[derive(Config, Debug)]
pub struct AuxHeadConfig {
    /// Input channels.
    pub in_channels: usize,

    /// Number of classes.
    pub num_classes: usize,

    /// Input ``[height, width]``.
    pub input_resolution: [usize; 2],
}

impl AuxHeadConfig {
    /// The resolution after the aux pool; `None` if the input is too small.
    pub fn pooled_resolution(&self) -> Option<[usize; 2]> {
        if self.input_resolution.contains(&0) {
            return None;
        }
        maybe_valid_output_shape(
            self.input_resolution,
            [AUX_POOL_SIZE, AUX_POOL_SIZE],
            [AUX_POOL_STRIDE, AUX_POOL_STRIDE],
        )
    }

    /// The resolution after the aux pool.
    pub fn try_pooled_resolution(&self) -> anyhow::Result<[usize; 2]> {
        match self.pooled_resolution() {
            Some(res) => Ok(res),
            None => bail!(
                "Aux head input resolution {:?} is smaller than the {AUX_POOL_SIZE}x{AUX_POOL_SIZE} pool",
                self.input_resolution
            ),
        }
    }

    /// Initialize an [`AuxHead`].
    ///
    /// # Panics
    ///
    /// If the input resolution is smaller than the aux pool.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> AuxHead<B> {
        let kernel_size = match self.try_pooled_resolution() {
            Ok(res) => res,
            Err(e) => panic!("{}", e),
        };

        AuxHead {
            act: Relu::new(),
            pool: AvgPool2dConfig::new([AUX_POOL_SIZE, AUX_POOL_SIZE])
                .with_strides([AUX_POOL_STRIDE, AUX_POOL_STRIDE])
                .with_padding(PaddingConfig2d::Valid)
                .init(),
            proj: ConvNorm2dConfig::square(self.in_channels, AUX_PROJ_CHANNELS, 1, 1)
                .init(device),
            conv: ConvNorm2dConfig::from(
                Conv2dConfig::new([AUX_PROJ_CHANNELS, AUX_FEATURE_CHANNELS], kernel_size)
                    .with_bias(false),
            )
            .with_padding(PaddingMode::Valid)
            .init(device),
            fc: LinearConfig::new(AUX_FEATURE_CHANNELS, self.num_classes).init(device),
        }
    }
}

/// Auxiliary classifier head.
#[derive(Module, Debug)]
pub struct AuxHead<B: Backend> {
    /// Shared activation.
    pub act: Relu,

    /// ``5x5`` stride 3 `VALID` pool.
    pub pool: AvgPool2d,

    /// ``1x1`` projection.
    pub proj: ConvNorm2d<B>,

    /// Full-resolution `VALID` conv.
    pub conv: ConvNorm2d<B>,

    /// Classifier.
    pub fc: Linear<B>,
}

impl<B: Backend> AuxHead<B> {
    /// Number of input channels.
    pub fn in_channels(&self) -> usize {
        self.proj.in_channels()
    }

    /// Number of classes.
    pub fn num_classes(&self) -> usize {
        self.fc.weight.dims()[1]
    }

    /// The full-resolution conv kernel.
    pub fn kernel_size(&self) -> [usize; 2] {
        self.conv.kernel_size()
    }

    /// Replace the classifier with a freshly initialized one.
    pub fn with_classes(
        mut self,
        num_classes: usize,
    ) -> Self {
        let [d_input, _d_output] = self.fc.weight.dims();
        self.fc = LinearConfig::new(d_input, num_classes).init(&self.fc.weight.device());
        self
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, in_channels, height, width]``.
    ///
    /// # Returns
    ///
    /// Logits: ``[batch, num_classes]``.
    pub fn forward(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &input,
            &["batch"],
            &[("in_channels", self.in_channels())]
        );

        let x = self.act.forward(input);
        let x = self.pool.forward(x);
        let x = self.proj.forward(x);
        let x = self.act.forward(x);
        let x = self.conv.forward(x);
        let x = self.act.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "channels", "height", "width"],
            &x,
            &[
                ("batch", batch),
                ("channels", AUX_FEATURE_CHANNELS),
                ("height", 1),
                ("width", 1)
            ]
        );

        // [B, C, 1, 1] -> [B, C]
        let x = x.flatten(1, 3);
        self.fc.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    #[test]
    fn test_aux_head_config() {
        assert_eq!(
            AuxHeadConfig::new(8, 10, [21, 21]).pooled_resolution(),
            Some([6, 6])
        );
        assert_eq!(
            AuxHeadConfig::new(8, 10, [14, 14]).pooled_resolution(),
            Some([4, 4])
        );
        assert_eq!(
            AuxHeadConfig::new(8, 10, [5, 7]).pooled_resolution(),
            Some([1, 1])
        );

        let config = AuxHeadConfig::new(8, 10, [4, 9]);
        assert_eq!(config.pooled_resolution(), None);
        let err = config.try_pooled_resolution().unwrap_err();
        assert!(err.to_string().contains("[4, 9]"));
    }

    #[test]
    #[should_panic(expected = "smaller than the 5x5 pool")]
    fn test_aux_head_init_too_small() {
        type B = NdArray<f32>;
        let device = Default::default();
        let _head: AuxHead<B> = AuxHeadConfig::new(8, 10, [3, 3]).init(&device);
    }

    #[test]
    fn test_aux_head_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let head: AuxHead<B> = AuxHeadConfig::new(8, 10, [11, 8]).init(&device);
        assert_eq!(head.in_channels(), 8);
        assert_eq!(head.num_classes(), 10);
        assert_eq!(head.kernel_size(), [3, 2]);

        let input = Tensor::random([2, 8, 11, 8], Distribution::Default, &device);
        let logits = head.forward(input);
        assert_eq!(logits.dims(), [2, 10]);

        let head = head.with_classes(3);
        assert_eq!(head.num_classes(), 3);
    }
}
