//! # `NASNet-A` Normal Cell
//!
//! A normal cell preserves resolution and produces ``6 * filters`` channels:
//!
//! ```text
//! p  = adjust(p, x)
//! h  = convbn(relu(x), 1x1)
//! x1 = sep3(h) + h
//! x2 = sep3(p) + sep5(h)
//! x3 = avg3(h) + p
//! x4 = avg3(p) + avg3(p)
//! x5 = sep5(p) + sep3(p)
//! out = concat[p, x2, x5, x3, x4, x1]
//! ```

use crate::layers::blocks::conv_norm::{ConvNorm2d, ConvNorm2dConfig, ConvNorm2dMeta};
use crate::layers::blocks::sep_conv::{SeparableBranch, SeparableBranchConfig};
use crate::layers::pool::{AvgPool2dSame, AvgPool2dSameConfig};
use crate::models::nasnet::adjust::{PrevAdjust, PrevAdjustConfig};
use crate::models::nasnet::cell::{CellOutput, NasNetCellMeta};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::config::Config;
use burn::module::Module;
use burn::nn::Relu;
use burn::prelude::{Backend, Tensor};

/// Number of filter-width blocks concatenated by a [`NormalCell`].
pub const NORMAL_CELL_BLOCKS: usize = 6;

/// [`NormalCell`] Config.
#[derive(Config, Debug)]
pub struct NormalCellConfig {
    /// Channels of the primary input ``x``.
    pub in_channels: usize,

    /// Channels of the previous input ``p``.
    pub prev_channels: usize,

    /// ``p`` is one reduction level above ``x``.
    #[config(default = false)]
    pub prev_reduced: bool,

    /// Cell filter width.
    pub filters: usize,
}

impl NasNetCellMeta for NormalCellConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn filters(&self) -> usize {
        self.filters
    }

    fn out_channels(&self) -> usize {
        NORMAL_CELL_BLOCKS * self.filters
    }

    fn stride(&self) -> usize {
        1
    }
}

impl NormalCellConfig {
    /// The previous-input adjustment config.
    pub fn adjust_config(&self) -> PrevAdjustConfig {
        PrevAdjustConfig::new(self.in_channels, self.filters)
            .with_prev_channels(Some(self.prev_channels))
            .with_prev_reduced(self.prev_reduced)
    }

    /// Initialize a [`NormalCell`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> NormalCell<B> {
        let f = self.filters;
        let branch = |k: usize| SeparableBranchConfig::new(f, f, k).init(device);

        NormalCell {
            act: Relu::new(),
            adjust: self.adjust_config().init(device),
            conv_1x1: ConvNorm2dConfig::square(self.in_channels, f, 1, 1).init(device),
            left1: branch(3),
            left2: branch(3),
            right2: branch(5),
            avg_pool: AvgPool2dSameConfig::new([3, 3]).init(),
            left5: branch(5),
            right5: branch(3),
        }
    }
}

/// `NASNet-A` normal cell.
///
/// Implements [`NasNetCellMeta`].
#[derive(Module, Debug)]
pub struct NormalCell<B: Backend> {
    /// Input activation.
    pub act: Relu,

    /// Previous-input adjustment.
    pub adjust: PrevAdjust<B>,

    /// Input projection to ``filters``.
    pub conv_1x1: ConvNorm2d<B>,

    /// ``sep3(h)``.
    pub left1: SeparableBranch<B>,

    /// ``sep3(p)``.
    pub left2: SeparableBranch<B>,

    /// ``sep5(h)``.
    pub right2: SeparableBranch<B>,

    /// Shared ``3x3`` stride 1 pool.
    pub avg_pool: AvgPool2dSame,

    /// ``sep5(p)``.
    pub left5: SeparableBranch<B>,

    /// ``sep3(p)``.
    pub right5: SeparableBranch<B>,
}

impl<B: Backend> NasNetCellMeta for NormalCell<B> {
    fn in_channels(&self) -> usize {
        self.conv_1x1.in_channels()
    }

    fn filters(&self) -> usize {
        self.conv_1x1.out_channels()
    }

    fn out_channels(&self) -> usize {
        NORMAL_CELL_BLOCKS * self.filters()
    }

    fn stride(&self) -> usize {
        1
    }
}

impl<B: Backend> NormalCell<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `x`: ``[batch, in_channels, height, width]``.
    /// - `prev`: the previous input ``p``.
    ///
    /// # Returns
    ///
    /// ``out: [batch, 6 * filters, height, width]``, and ``x`` as the next ``p``.
    pub fn forward(
        &self,
        x: Tensor<B, 4>,
        prev: Option<Tensor<B, 4>>,
    ) -> CellOutput<B> {
        let [batch, height, width] = unpack_shape_contract!(
            ["batch", "in_channels", "height", "width"],
            &x,
            &["batch", "height", "width"],
            &[("in_channels", self.in_channels())]
        );

        let p = self.adjust.forward(prev, &x);
        let h = self.conv_1x1.forward(self.act.forward(x.clone()));

        let x1 = self.left1.forward(h.clone()) + h.clone();
        let x2 = self.left2.forward(p.clone()) + self.right2.forward(h.clone());
        let x3 = self.avg_pool.forward(h) + p.clone();
        let pooled = self.avg_pool.forward(p.clone());
        let x4 = pooled.clone() + pooled;
        let x5 = self.left5.forward(p.clone()) + self.right5.forward(p.clone());

        let out = Tensor::cat(vec![p, x2, x5, x3, x4, x1], 1);

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "height", "width"],
            &out,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("height", height),
                ("width", width)
            ]
        );

        CellOutput { out, prev: x }
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
    fn test_normal_cell_config() {
        let config = NormalCellConfig::new(24, 16, 8);
        assert_eq!(config.in_channels(), 24);
        assert_eq!(config.filters(), 8);
        assert_eq!(config.out_channels(), 48);
        assert_eq!(config.output_resolution([7, 9]), [7, 9]);
        assert_eq!(config.adjust_config().mode(), AdjustMode::Project);

        let config = config.with_prev_reduced(true);
        assert_eq!(config.adjust_config().mode(), AdjustMode::FactorizedReduce);
    }

    #[test]
    fn test_normal_cell_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let cell: NormalCell<B> = NormalCellConfig::new(12, 8, 4).init(&device);
        assert_eq!(cell.in_channels(), 12);
        assert_eq!(cell.filters(), 4);
        assert_eq!(cell.out_channels(), 24);

        let x = Tensor::random([2, 12, 5, 5], Distribution::Default, &device);
        let p = Tensor::random([2, 8, 5, 5], Distribution::Default, &device);
        let output = cell.forward(x.clone(), Some(p));

        assert_shape_contract!(
            ["batch", "out_channels", "height", "width"],
            &output.out,
            &[
                ("batch", 2),
                ("out_channels", 24),
                ("height", 5),
                ("width", 5)
            ],
        );
        output.prev.to_data().assert_eq(&x.to_data(), true);
    }

    #[test]
    fn test_normal_cell_forward_reduced_prev() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let cell: NormalCell<B> = NormalCellConfig::new(8, 6, 4)
            .with_prev_reduced(true)
            .init(&device);

        let x = Tensor::random([1, 8, 4, 4], Distribution::Default, &device);
        let p = Tensor::random([1, 6, 7, 7], Distribution::Default, &device);
        let output = cell.forward(x, Some(p));

        assert_eq!(output.out.dims(), [1, 24, 4, 4]);
        assert_eq!(output.prev.dims(), [1, 8, 4, 4]);
    }

    #[test]
    fn test_normal_cell_block_order() {
        type B = NdArray<f32>;
        let device = Default::default();

        let f = 4;
        let cell: NormalCell<B> = NormalCellConfig::new(12, f, f).init(&device);
        assert_eq!(cell.adjust.mode(), AdjustMode::Identity);

        let x = Tensor::random([2, 12, 5, 5], Distribution::Default, &device);
        let p = Tensor::random([2, f, 5, 5], Distribution::Default, &device);
        let out = cell.forward(x.clone(), Some(p.clone())).out;
        let block = |i: usize| out.clone().narrow(1, i * f, f);

        // The identity-adjusted ``p`` leads the concat.
        assert_tensor_close(block(0), p.clone());

        // x4 = avg3(p) + avg3(p)
        let pooled = cell.avg_pool.forward(p.clone());
        assert_tensor_close(block(4), pooled.mul_scalar(2.0));

        let h = cell.conv_1x1.forward(cell.act.forward(x));

        // x2 = sep3(p) + sep5(h)
        assert_tensor_close(
            block(1),
            cell.left2.forward(p.clone()) + cell.right2.forward(h.clone()),
        );

        // x5 = sep5(p) + sep3(p)
        assert_tensor_close(
            block(2),
            cell.left5.forward(p.clone()) + cell.right5.forward(p.clone()),
        );

        // x3 = avg3(h) + p
        assert_tensor_close(block(3), cell.avg_pool.forward(h.clone()) + p);

        // x1 = sep3(h) + h
        assert_tensor_close(block(5), cell.left1.forward(h.clone()) + h);
    }
}
