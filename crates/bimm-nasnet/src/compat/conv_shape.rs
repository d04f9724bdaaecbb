//! # Convolution Shape Utilities
//!
//! Output-size arithmetic for the two TensorFlow padding modes:
//!
//! * `VALID` - no padding; windows must fit entirely inside the input.
//! * `SAME` - the input is padded so that ``out = ceil(in / stride)``.

/// Predict the output size of a 1D `VALID` convolution or pool.
///
/// ```text
/// out_size = floor( (in_size - dilation*(kernel_size-1) - 1) / stride ) + 1
/// ```
///
/// # Arguments
///
/// - `input_size`: The input dimension size, must be > 0.
/// - `kernel_size`: The kernel size, must be > 0.
/// - `stride`: The stride of the window, must be > 0.
/// - `dilation`: The dilation of the window, must be > 0.
///
/// # Returns
///
/// An `Option<usize>` representing the output size; or `None` if the
/// (dilated) kernel does not fit in the input.
pub fn maybe_valid_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    dilation: usize,
) -> Option<usize> {
    assert!(input_size > 0);
    assert!(kernel_size > 0);
    assert!(stride > 0);
    assert!(dilation > 0);

    let kernel_width = 1 + dilation * (kernel_size - 1);
    if input_size < kernel_width {
        return None;
    }
    Some((input_size - kernel_width) / stride + 1)
}

/// Predict the output size of a 1D `VALID` convolution or pool.
///
/// This is the ``panic``-ing variant of [`maybe_valid_output_size`].
///
/// # Panics
///
/// If the kernel does not fit in the input.
pub fn expect_valid_output_size(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    dilation: usize,
) -> usize {
    match maybe_valid_output_size(input_size, kernel_size, stride, dilation) {
        Some(x) => x,
        None => panic!(
            "No legal VALID output size with:\n input_size:{input_size}\n kernel_size:{kernel_size}\n stride:{stride}\n dilation:{dilation}",
        ),
    }
}

/// Predict the output shape of a 2D `VALID` convolution or pool.
///
/// The generalization of [`maybe_valid_output_size`] to ``[height, width]``.
pub fn maybe_valid_output_shape(
    input_shape: [usize; 2],
    kernel_shape: [usize; 2],
    stride: [usize; 2],
) -> Option<[usize; 2]> {
    Some([
        maybe_valid_output_size(input_shape[0], kernel_shape[0], stride[0], 1)?,
        maybe_valid_output_size(input_shape[1], kernel_shape[1], stride[1], 1)?,
    ])
}

/// Output size of a 1D `SAME` convolution or pool.
///
/// ```text
/// out_size = ceil(in_size / stride)
/// ```
///
/// The result is independent of the kernel size.
pub fn same_output_size(
    input_size: usize,
    stride: usize,
) -> usize {
    assert!(stride > 0);
    input_size.div_ceil(stride)
}

/// Output shape of a 2D `SAME` convolution or pool.
pub fn same_output_shape(
    input_shape: [usize; 2],
    stride: [usize; 2],
) -> [usize; 2] {
    [
        same_output_size(input_shape[0], stride[0]),
        same_output_size(input_shape[1], stride[1]),
    ]
}

/// Total `SAME` padding for one dimension.
///
/// ```text
/// pad = max((ceil(in / stride) - 1) * stride + (kernel - 1) * dilation + 1 - in, 0)
/// ```
pub fn same_padding_total(
    input_size: usize,
    kernel_size: usize,
    stride: usize,
    dilation: usize,
) -> usize {
    let out = same_output_size(input_size, stride);
    let covered = (out.max(1) - 1) * stride + (kernel_size - 1) * dilation + 1;
    covered.saturating_sub(input_size)
}

/// Split a total padding into ``(before, after)``.
///
/// Matches TensorFlow: the extra cell (if any) goes after.
pub fn split_padding(total: usize) -> (usize, usize) {
    let before = total / 2;
    (before, total - before)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_output_size() {
        fn reference(
            input_size: usize,
            kernel_size: usize,
            stride: usize,
            dilation: usize,
        ) -> Option<usize> {
            let kernel_width = 1.0 + dilation as f64 * (kernel_size as f64 - 1.0);
            let x = ((input_size as f64 - kernel_width) / stride as f64).floor() + 1.0;
            if x < 1.0 { None } else { Some(x as usize) }
        }

        for input_size in 1..12 {
            for kernel_size in 1..6 {
                for stride in 1..4 {
                    for dilation in 1..3 {
                        assert_eq!(
                            maybe_valid_output_size(input_size, kernel_size, stride, dilation),
                            reference(input_size, kernel_size, stride, dilation),
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn test_nasnet_landmark_sizes() {
        // Stem conv0.
        assert_eq!(expect_valid_output_size(331, 3, 2, 1), 165);
        assert_eq!(expect_valid_output_size(224, 3, 2, 1), 111);

        // Aux head pool.
        assert_eq!(expect_valid_output_size(21, 5, 3, 1), 6);
        assert_eq!(expect_valid_output_size(14, 5, 3, 1), 4);

        assert_eq!(maybe_valid_output_shape([4, 4], [5, 5], [3, 3]), None);
    }

    #[test]
    #[should_panic(expected = "No legal VALID output size")]
    fn test_expect_valid_output_size_panics() {
        expect_valid_output_size(3, 5, 1, 1);
    }

    #[test]
    fn test_same_output_size() {
        assert_eq!(same_output_size(165, 2), 83);
        assert_eq!(same_output_size(83, 2), 42);
        assert_eq!(same_output_size(42, 2), 21);
        assert_eq!(same_output_size(21, 2), 11);
        assert_eq!(same_output_size(10, 3), 4);
        assert_eq!(same_output_shape([7, 8], [1, 2]), [7, 4]);
    }

    #[test]
    fn test_same_padding_total() {
        assert_eq!(same_padding_total(10, 1, 1, 1), 0);
        assert_eq!(same_padding_total(10, 3, 1, 1), 2);
        assert_eq!(same_padding_total(10, 3, 2, 1), 1);
        assert_eq!(same_padding_total(11, 3, 2, 1), 2);
        assert_eq!(same_padding_total(10, 3, 2, 2), 3);
        assert_eq!(same_padding_total(10, 7, 2, 1), 5);

        assert_eq!(split_padding(0), (0, 0));
        assert_eq!(split_padding(1), (0, 1));
        assert_eq!(split_padding(5), (2, 3));
    }
}
