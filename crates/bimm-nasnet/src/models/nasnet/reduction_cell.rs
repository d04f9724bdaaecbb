//! # `NASNet-A` Reduction Cell
//!
//! A reduction cell halves resolution (rounding up) and produces
//! ``4 * filters`` channels:
//!
//! ```text
//! p  = adjust(p, x)
//! h  = convbn(relu(x), 1x1)
//! x1 = sep7/2(p) + sep5/2(h)
//! x2 = max3/2(h) + sep7/2(p)
//! x3 = avg3/2(h) + sep5/2(p)
//! x4 = max3/2(h) + sep3(x1)
//! x5 = avg3(x1) + x2
//! out = concat[x2, x3, x5, x4]
//! ```

use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use crate::layers::blocks::sep_conv::{SeparableBranch, SeparableBranchConfig};
use crate::layers::pool::{AvgPool2dSame, AvgPool2dSameConfig, MaxPool2dSame, MaxPool2dSameConfig};
use crate::models::nasnet::adjust::{PrevAdjust, PrevAdjustConfig};
use crate::models::nasnet::cell::{CellOutput, NasNetCellMeta};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::Relu;
use burn::prelude::{Backend, Tensor};

/// Number of filter-width blocks concatenated by a [`ReductionCell`].
pub const REDUCTION_CELL_BLOCKS: usize = 4;

/// Reduction stride.
pub const REDUCTION_STRIDE: usize = 2;

/// [`ReductionCell`] Config.
#[derive(Config, Debug)]
pub struct ReductionCellConfig {
    /// Channels of the primary input ``x``.
    pub in_channels: usize,

    /// Channels of the previous input ``p``; `None` for the first stem cell.
    #[config(default = "None")]
    pub prev_channels: Option<usize>,

    /// ``p`` is one reduction level above ``x``.
    #[config(default = false)]
    pub prev_reduced: bool,

    /// Cell filter width.
    pub filters: usize,

    /// Hand the incoming ``p`` on to the next cell, instead of ``x``.
    #[config(default = false)]
    pub keep_prev: bool,
}

impl NasNetCellMeta for ReductionCellConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn filters(&self) -> usize {
        self.filters
    }

    fn out_channels(&self) -> usize {
        REDUCTION_CELL_BLOCKS * self.filters
    }

    fn stride(&self) -> usize {
        REDUCTION_STRIDE
    }
}

impl ReductionCellConfig {
    /// The previous-input adjustment config.
    pub fn adjust_config(&self) -> PrevAdjustConfig {
        PrevAdjustConfig::new(self.in_channels, self.filters)
            .with_prev_channels(self.prev_channels)
            .with_prev_reduced(self.prev_reduced)
    }

    /// Initialize a [`ReductionCell`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ReductionCell<B> {
        let f = self.filters;
        let adjust = self.adjust_config();
        let p_channels = adjust.out_channels();

        let s = REDUCTION_STRIDE;
        let branch = |in_channels: usize, k: usize, stride: usize| {
            SeparableBranchConfig::new(in_channels, f, k)
                .with_stride(stride)
                .init(device)
        };

        ReductionCell {
            act: Relu::new(),
            adjust: adjust.init(device),
            conv_1x1: ConvNorm2dConfig::square(self.in_channels, f, 1, 1).init(device),
            left1: branch(p_channels, 7, s),
            right1: branch(f, 5, s),
            max_pool: MaxPool2dSameConfig::new([3, 3]).with_stride([s, s]).init(),
            right2: branch(p_channels, 7, s),
            avg_pool: AvgPool2dSameConfig::new([3, 3]).with_stride([s, s]).init(),
            right3: branch(p_channels, 5, s),
            right4: branch(f, 3, 1),
            avg_pool_1: AvgPool2dSameConfig::new([3, 3]).init(),
            keep_prev: self.keep_prev,
        }
    }
}

/// `NASNet-A` reduction cell.
///
/// Implements [`NasNetCellMeta`].
#[derive(Module, Debug)]
pub struct ReductionCell<B: Backend> {
    /// Input activation.
    pub act: Relu,

    /// Previous-input adjustment.
    pub adjust: PrevAdjust<B>,

    /// Input projection to ``filters``.
    pub conv_1x1: ConvNorm2d<B>,

    /// ``sep7/2(p)``.
    pub left1: SeparableBranch<B>,

    /// ``sep5/2(h)``.
    pub right1: SeparableBranch<B>,

    /// Shared ``3x3`` stride 2 max pool.
    pub max_pool: MaxPool2dSame,

    /// ``sep7/2(p)``.
    pub right2: SeparableBranch<B>,

    /// ``3x3`` stride 2 average pool.
    pub avg_pool: AvgPool2dSame,

    /// ``sep5/2(p)``.
    pub right3: SeparableBranch<B>,

    /// ``sep3(x1)``.
    pub right4: SeparableBranch<B>,

    /// ``3x3`` stride 1 average pool.
    pub avg_pool_1: AvgPool2dSame,

    /// Hand the incoming ``p`` on, instead of ``x``.
    pub keep_prev: bool,
}

impl<B: Backend> NasNetCellMeta for ReductionCell<B> {
    fn in_channels(&self) -> usize {
        self.conv_1x1.in_channels()
    }

    fn filters(&self) -> usize {
        self.conv_1x1.out_channels()
    }

    fn out_channels(&self) -> usize {
        REDUCTION_CELL_BLOCKS * self.filters()
    }

    fn stride(&self) -> usize {
        REDUCTION_STRIDE
    }
}

impl<B: Backend> ReductionCell<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `x`: ``[batch, in_channels, height, width]``.
    /// - `prev`: the previous input ``p``, if any.
    ///
    /// # Returns
    ///
    /// ``out: [batch, 4 * filters, ceil(height / 2), ceil(width / 2)]``;
    /// and the next ``p``: ``x``, or the incoming ``p`` when `keep_prev` is set.
    pub fn forward(
        &self,
        x: Tensor<B, 4>,
        prev: Option<Tensor<B, 4>>,
    ) -> CellOutput<B> {
        let [batch, in_height, in_width] = unpack_shape_contract!(
            ["batch", "in_channels", "in_height", "in_width"],
            &x,
            &["batch", "in_height", "in_width"],
            &[("in_channels", self.in_channels())]
        );
        let [out_height, out_width] = self.output_resolution([in_height, in_width]);

        let kept = match (self.keep_prev, &prev) {
            (true, Some(p)) => Some(p.clone()),
            _ => None,
        };

        let p = self.adjust.forward(prev, &x);
        let h = self.conv_1x1.forward(self.act.forward(x.clone()));

        let h_max = self.max_pool.forward(h.clone());

        let x1 = self.left1.forward(p.clone()) + self.right1.forward(h.clone());
        let x2 = h_max.clone() + self.right2.forward(p.clone());
        let x3 = self.avg_pool.forward(h) + self.right3.forward(p);
        let x4 = h_max + self.right4.forward(x1.clone());
        let x5 = self.avg_pool_1.forward(x1) + x2.clone();

        let out = Tensor::cat(vec![x2, x3, x5, x4], 1);

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_height", "out_width"],
            &out,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        CellOutput {
            out,
            prev: kept.unwrap_or(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::nasnet::adjust::AdjustMode;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::{Autodiff, NdArray};
    use burn::tensor::Distribution;
    use hamcrest::prelude::*;

    fn assert_tensor_close<B: Backend>(
        actual: Tensor<B, 4>,
        expected: Tensor<B, 4>,
    ) {
        assert_eq!(actual.dims(), expected.dims());
        let actual = actual.into_data().to_vec::<f32>().unwrap();
        let expected = expected.into_data().to_vec::<f32>().unwrap();
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert_that!(*a as f64, close_to(*e as f64, 1e-4));
        }
    }

    #[test]
    fn test_reduction_cell_config() {
        let config = ReductionCellConfig::new(24, 8);
        assert_eq!(config.out_channels(), 32);
        assert_eq!(config.stride(), 2);
        assert_eq!(config.output_resolution([11, 10]), [6, 5]);
        assert_eq!(config.adjust_config().mode(), AdjustMode::Passthrough);

        let config = config
            .with_prev_channels(Some(12))
            .with_keep_prev(true);
        assert_eq!(config.adjust_config().mode(), AdjustMode::Project);
    }

    #[test]
    fn test_reduction_cell_stem_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        // No previous input; the first sep branches see the raw ``x`` width.
        let cell: ReductionCell<B> = ReductionCellConfig::new(6, 4).init(&device);
        assert_eq!(cell.left1.in_channels(), 6);
        assert_eq!(cell.right1.in_channels(), 4);

        let x = Tensor::random([2, 6, 11, 11], Distribution::Default, &device);
        let output = cell.forward(x.clone(), None);

        assert_shape_contract!(
            ["batch", "out_channels", "out_height", "out_width"],
            &output.out,
            &[
                ("batch", 2),
                ("out_channels", 16),
                ("out_height", 6),
                ("out_width", 6)
            ],
        );
        output.prev.to_data().assert_eq(&x.to_data(), true);
    }

    #[test]
    fn test_reduction_cell_keep_prev() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let cell: ReductionCell<B> = ReductionCellConfig::new(12, 4)
            .with_prev_channels(Some(12))
            .with_keep_prev(true)
            .init(&device);

        let x = Tensor::random([1, 12, 8, 8], Distribution::Default, &device);
        let p = Tensor::random([1, 12, 8, 8], Distribution::Default, &device);
        let output = cell.forward(x, Some(p.clone()));

        assert_eq!(output.out.dims(), [1, 16, 4, 4]);
        output.prev.to_data().assert_eq(&p.to_data(), true);
    }

    #[test]
    fn test_reduction_cell_reduced_prev() {
        type B = NdArray<f32>;
        let device = Default::default();

        let cell: ReductionCell<B> = ReductionCellConfig::new(8, 4)
            .with_prev_channels(Some(3))
            .with_prev_reduced(true)
            .init(&device);
        assert_eq!(cell.adjust.mode(), AdjustMode::FactorizedReduce);

        let x = Tensor::random([1, 8, 7, 7], Distribution::Default, &device);
        let p = Tensor::random([1, 3, 13, 13], Distribution::Default, &device);
        let output = cell.forward(x, Some(p));

        assert_eq!(output.out.dims(), [1, 16, 4, 4]);
    }

    #[test]
    fn test_reduction_cell_block_order() {
        type B = NdArray<f32>;
        let device = Default::default();

        let f = 4;
        let cell: ReductionCell<B> = ReductionCellConfig::new(6, f).init(&device);

        let x = Tensor::random([2, 6, 9, 9], Distribution::Default, &device);
        let out = cell.forward(x.clone(), None).out;
        assert_eq!(out.dims(), [2, 4 * f, 5, 5]);
        let block = |i: usize| out.clone().narrow(1, i * f, f);

        let p = cell.adjust.forward(None, &x);
        let h = cell.conv_1x1.forward(cell.act.forward(x));
        let h_max = cell.max_pool.forward(h.clone());
        let x1 = cell.left1.forward(p.clone()) + cell.right1.forward(h.clone());

        // x5 = avg3(x1) + x2
        assert_tensor_close(
            block(2) - block(0),
            cell.avg_pool_1.forward(x1.clone()),
        );

        // x2 = max3(h) + sep7(p)
        assert_tensor_close(
            block(0),
            h_max.clone() + cell.right2.forward(p.clone()),
        );

        // x3 = avg3(h) + sep5(p)
        assert_tensor_close(
            block(1),
            cell.avg_pool.forward(h) + cell.right3.forward(p),
        );

        // x4 = max3(h) + sep3(x1)
        assert_tensor_close(block(3), h_max + cell.right4.forward(x1));
    }
}
