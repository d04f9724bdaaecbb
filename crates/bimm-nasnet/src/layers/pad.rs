//! # `SAME` Padding
//!
//! Dynamic, possibly asymmetric, padding for TensorFlow-style `SAME`
//! convolutions and pools.

use crate::compat::conv_shape::{
    expect_valid_output_size, same_output_size, same_padding_total, split_padding,
};
use burn::prelude::{Backend, Tensor};
use serde::{Deserialize, Serialize};

/// TensorFlow padding mode for convolutions and pools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaddingMode {
    /// Pad so that ``out = ceil(in / stride)``.
    #[default]
    Same,

    /// No padding.
    Valid,
}

impl PaddingMode {
    /// Output resolution of a window applied with this padding mode.
    ///
    /// # Panics
    ///
    /// For [`PaddingMode::Valid`], if the window does not fit in the input.
    pub fn output_resolution(
        &self,
        input_resolution: [usize; 2],
        kernel_size: [usize; 2],
        stride: [usize; 2],
        dilation: [usize; 2],
    ) -> [usize; 2] {
        match self {
            PaddingMode::Same => [
                same_output_size(input_resolution[0], stride[0]),
                same_output_size(input_resolution[1], stride[1]),
            ],
            PaddingMode::Valid => [
                expect_valid_output_size(
                    input_resolution[0],
                    kernel_size[0],
                    stride[0],
                    dilation[0],
                ),
                expect_valid_output_size(
                    input_resolution[1],
                    kernel_size[1],
                    stride[1],
                    dilation[1],
                ),
            ],
        }
    }
}

/// Compute the ``(left, right, top, bottom)`` `SAME` padding for an input resolution.
///
/// # Arguments
///
/// - `input_resolution`: ``[height, width]``.
/// - `kernel_size`: ``[kernel_height, kernel_width]``.
/// - `stride`: ``[height_stride, width_stride]``.
/// - `dilation`: ``[height_dilation, width_dilation]``.
pub fn same_padding(
    input_resolution: [usize; 2],
    kernel_size: [usize; 2],
    stride: [usize; 2],
    dilation: [usize; 2],
) -> (usize, usize, usize, usize) {
    let pad_h = same_padding_total(input_resolution[0], kernel_size[0], stride[0], dilation[0]);
    let pad_w = same_padding_total(input_resolution[1], kernel_size[1], stride[1], dilation[1]);
    let (top, bottom) = split_padding(pad_h);
    let (left, right) = split_padding(pad_w);
    (left, right, top, bottom)
}

/// Dynamically pad input x with `SAME` padding for a window with the specified args.
///
/// Returns the input untouched when no padding is needed.
pub fn pad_same<B: Backend>(
    input: Tensor<B, 4>,
    kernel_size: [usize; 2],
    stride: [usize; 2],
    dilation: [usize; 2],
    value: f32,
) -> Tensor<B, 4> {
    let [_, _, height, width] = input.dims();
    let padding = same_padding([height, width], kernel_size, stride, dilation);
    if padding == (0, 0, 0, 0) {
        return input;
    }
    input.pad(padding, value)
}

/// Shift a ``[batch, channels, height, width]`` tensor up and left by one pixel.
///
/// The vacated bottom row and right column are zero-filled.
pub fn shift_up_left<B: Backend>(input: Tensor<B, 4>) -> Tensor<B, 4> {
    let [batch, channels, height, width] = input.dims();
    input
        .pad((0, 1, 0, 1), 0.0)
        .slice([0..batch, 0..channels, 1..height + 1, 1..width + 1])
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type B = NdArray<f32>;

    #[test]
    fn test_padding_mode_output_resolution() {
        assert_eq!(PaddingMode::default(), PaddingMode::Same);
        assert_eq!(
            PaddingMode::Same.output_resolution([11, 10], [3, 3], [2, 2], [1, 1]),
            [6, 5]
        );
        assert_eq!(
            PaddingMode::Valid.output_resolution([11, 10], [3, 3], [2, 2], [1, 1]),
            [5, 4]
        );
    }

    #[test]
    fn test_same_padding() {
        assert_eq!(same_padding([10, 10], [1, 1], [1, 1], [1, 1]), (0, 0, 0, 0));
        assert_eq!(same_padding([10, 11], [3, 3], [2, 2], [1, 1]), (1, 1, 0, 1));
        assert_eq!(same_padding([8, 8], [5, 5], [1, 1], [1, 1]), (2, 2, 2, 2));
    }

    #[test]
    fn test_pad_same_shape() {
        let device = Default::default();
        let input: Tensor<B, 4> = Tensor::ones([1, 2, 10, 11], &device);

        let output = pad_same(input.clone(), [3, 3], [2, 2], [1, 1], 0.0);
        assert_eq!(output.dims(), [1, 2, 11, 13]);

        let output = pad_same(input, [1, 1], [2, 2], [1, 1], 0.0);
        assert_eq!(output.dims(), [1, 2, 10, 11]);
    }

    #[test]
    fn test_shift_up_left() {
        let device = Default::default();
        let input: Tensor<B, 4> = Tensor::from_data([[[[1.0, 2.0], [3.0, 4.0]]]], &device);

        let output = shift_up_left(input);
        let expected: Tensor<B, 4> = Tensor::from_data([[[[4.0, 0.0], [0.0, 0.0]]]], &device);
        output.to_data().assert_eq(&expected.to_data(), true);
    }
}
