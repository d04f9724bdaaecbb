use crate::compat::conv_shape::same_output_shape;
use crate::layers::pad::same_padding;
use burn::config::Config;
use burn::module::Module;
use burn::nn::PaddingConfig2d;
use burn::nn::pool::{AvgPool2d, AvgPool2dConfig, MaxPool2d, MaxPool2dConfig};
use burn::prelude::{Backend, Tensor};

/// [`AvgPool2dSame`] Config.
#[derive(Config, Debug)]
pub struct AvgPool2dSameConfig {
    /// The size of the pooling window.
    pub kernel_size: [usize; 2],

    /// The stride of the pooling window.
    #[config(default = "[1, 1]")]
    pub stride: [usize; 2],
}

impl AvgPool2dSameConfig {
    /// Initialize an [`AvgPool2dSame`].
    pub fn init(&self) -> AvgPool2dSame {
        AvgPool2dSame {
            pool: AvgPool2dConfig::new(self.kernel_size)
                .with_strides(self.stride)
                .with_padding(PaddingConfig2d::Valid)
                .with_count_include_pad(true)
                .init(),
        }
    }
}

/// TensorFlow-like `SAME` average pooling.
///
/// Padded cells are excluded from each window's divisor;
/// so border windows average only the cells that overlap the input.
#[derive(Module, Clone, Debug)]
pub struct AvgPool2dSame {
    pool: AvgPool2d,
}

impl AvgPool2dSame {
    /// The pooling window.
    pub fn kernel_size(&self) -> [usize; 2] {
        self.pool.kernel_size
    }

    /// The pooling stride.
    pub fn stride(&self) -> [usize; 2] {
        self.pool.stride
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, channels, ceil(height / stride), ceil(width / stride)]``
    pub fn forward<B: Backend>(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [_, _, height, width] = input.dims();
        let padding = same_padding([height, width], self.kernel_size(), self.stride(), [1, 1]);
        if padding == (0, 0, 0, 0) {
            return self.pool.forward(input);
        }

        let mask: Tensor<B, 4> = Tensor::ones([1, 1, height, width], &input.device());
        let coverage = self.pool.forward(mask.pad(padding, 0.0));

        let x = self.pool.forward(input.pad(padding, 0.0));
        let x = x / coverage;

        debug_assert_eq!(
            [x.dims()[2], x.dims()[3]],
            same_output_shape([height, width], self.stride())
        );
        x
    }
}

/// [`MaxPool2dSame`] Config.
#[derive(Config, Debug)]
pub struct MaxPool2dSameConfig {
    /// The size of the pooling window.
    pub kernel_size: [usize; 2],

    /// The stride of the pooling window.
    #[config(default = "[1, 1]")]
    pub stride: [usize; 2],
}

impl MaxPool2dSameConfig {
    /// Initialize a [`MaxPool2dSame`].
    pub fn init(&self) -> MaxPool2dSame {
        MaxPool2dSame {
            pool: MaxPool2dConfig::new(self.kernel_size)
                .with_strides(self.stride)
                .with_padding(PaddingConfig2d::Valid)
                .init(),
        }
    }
}

/// TensorFlow-like `SAME` max pooling.
///
/// The input is padded with `-inf`, so padding is never selected.
#[derive(Module, Clone, Debug)]
pub struct MaxPool2dSame {
    pool: MaxPool2d,
}

impl MaxPool2dSame {
    /// The pooling window.
    pub fn kernel_size(&self) -> [usize; 2] {
        self.pool.kernel_size
    }

    /// The pooling stride.
    pub fn stride(&self) -> [usize; 2] {
        self.pool.stride
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: ``[batch, channels, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, channels, ceil(height / stride), ceil(width / stride)]``
    pub fn forward<B: Backend>(
        &self,
        input: Tensor<B, 4>,
    ) -> Tensor<B, 4> {
        let [_, _, height, width] = input.dims();
        let padding = same_padding([height, width], self.kernel_size(), self.stride(), [1, 1]);
        let x = if padding == (0, 0, 0, 0) {
            input
        } else {
            input.pad(padding, f32::NEG_INFINITY)
        };
        self.pool.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;
    use hamcrest::prelude::*;

    type B = NdArray<f32>;

    #[test]
    fn test_avg_pool_excludes_padding() {
        let device = Default::default();
        let pool = AvgPool2dSameConfig::new([3, 3]).init();

        let input: Tensor<B, 4> = Tensor::ones([2, 3, 5, 5], &device);
        let output = pool.forward(input);

        assert_eq!(output.dims(), [2, 3, 5, 5]);
        for v in output.into_data().to_vec::<f32>().unwrap() {
            assert_that!(v as f64, close_to(1.0, 1e-5));
        }
    }

    #[test]
    fn test_avg_pool_corner_value() {
        let device = Default::default();
        let pool = AvgPool2dSameConfig::new([3, 3]).init();

        let input: Tensor<B, 4> = Tensor::from_data(
            [[[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]]],
            &device,
        );
        let output = pool.forward(input);
        let values = output.into_data().to_vec::<f32>().unwrap();

        // top-left window covers [1, 2, 4, 5].
        assert_that!(values[0] as f64, close_to(3.0, 1e-5));
        // center window covers everything.
        assert_that!(values[4] as f64, close_to(5.0, 1e-5));
    }

    #[test]
    fn test_avg_pool_strided_shape() {
        let device = Default::default();
        let pool = AvgPool2dSameConfig::new([3, 3]).with_stride([2, 2]).init();

        let input: Tensor<B, 4> = Tensor::random([1, 4, 11, 10], Distribution::Default, &device);
        assert_eq!(pool.forward(input).dims(), [1, 4, 6, 5]);
    }

    #[test]
    fn test_max_pool_same() {
        let device = Default::default();
        let pool = MaxPool2dSameConfig::new([3, 3]).with_stride([2, 2]).init();

        let input: Tensor<B, 4> = Tensor::from_data(
            [[[
                [-1.0, -2.0, -3.0, -4.0],
                [-5.0, -6.0, -7.0, -8.0],
                [-9.0, -10.0, -11.0, -12.0],
                [-13.0, -14.0, -15.0, -16.0],
            ]]],
            &device,
        );
        let output = pool.forward(input);
        assert_eq!(output.dims(), [1, 1, 2, 2]);

        let expected: Tensor<B, 4> = Tensor::from_data([[[[-1.0, -3.0], [-9.0, -11.0]]]], &device);
        output.to_data().assert_eq(&expected.to_data(), true);
    }
}
