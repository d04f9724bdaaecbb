//! # `NASNet` Cells
//!
//! [`NasNetCell`] wraps the two cell kinds so a network can hold
//! its cells in a single stack.

use crate::compat::conv_shape::same_output_shape;
use crate::models::nasnet::normal_cell::{NormalCell, NormalCellConfig};
use crate::models::nasnet::reduction_cell::{ReductionCell, ReductionCellConfig};
use burn::config::Config;
use burn::module::Module;
use burn::prelude::{Backend, Tensor};
use serde::{Deserialize, Serialize};

/// Cell Meta.
pub trait NasNetCellMeta {
    /// Channels of the primary input ``x``.
    fn in_channels(&self) -> usize;

    /// Cell filter width.
    fn filters(&self) -> usize;

    /// Output channels.
    fn out_channels(&self) -> usize;

    /// Spatial stride of the cell.
    fn stride(&self) -> usize;

    /// Get the output resolution for a given input resolution.
    fn output_resolution(
        &self,
        input_resolution: [usize; 2],
    ) -> [usize; 2] {
        same_output_shape(input_resolution, [self.stride(), self.stride()])
    }
}

/// The output of a cell.
#[derive(Debug, Clone)]
pub struct CellOutput<B: Backend> {
    /// The cell output; the next ``x``.
    pub out: Tensor<B, 4>,

    /// The next ``p``.
    pub prev: Tensor<B, 4>,
}

/// Cell kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellKind {
    /// [`NormalCell`].
    Normal,

    /// [`ReductionCell`].
    Reduction,
}

/// [`NasNetCell`] Config.
#[derive(Config, Debug)]
pub enum NasNetCellConfig {
    /// A [`NormalCell`].
    Normal(NormalCellConfig),

    /// A [`ReductionCell`].
    Reduction(ReductionCellConfig),
}

impl From<NormalCellConfig> for NasNetCellConfig {
    fn from(config: NormalCellConfig) -> Self {
        Self::Normal(config)
    }
}

impl From<ReductionCellConfig> for NasNetCellConfig {
    fn from(config: ReductionCellConfig) -> Self {
        Self::Reduction(config)
    }
}

impl NasNetCellMeta for NasNetCellConfig {
    fn in_channels(&self) -> usize {
        match self {
            Self::Normal(c) => c.in_channels(),
            Self::Reduction(c) => c.in_channels(),
        }
    }

    fn filters(&self) -> usize {
        match self {
            Self::Normal(c) => c.filters(),
            Self::Reduction(c) => c.filters(),
        }
    }

    fn out_channels(&self) -> usize {
        match self {
            Self::Normal(c) => c.out_channels(),
            Self::Reduction(c) => c.out_channels(),
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Normal(c) => c.stride(),
            Self::Reduction(c) => c.stride(),
        }
    }
}

impl NasNetCellConfig {
    /// The cell kind.
    pub fn kind(&self) -> CellKind {
        match self {
            Self::Normal(_) => CellKind::Normal,
            Self::Reduction(_) => CellKind::Reduction,
        }
    }

    /// Channels of the previous input ``p``, if any.
    pub fn prev_channels(&self) -> Option<usize> {
        match self {
            Self::Normal(c) => Some(c.prev_channels),
            Self::Reduction(c) => c.prev_channels,
        }
    }

    /// Initialize a [`NasNetCell`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> NasNetCell<B> {
        match self {
            Self::Normal(c) => NasNetCell::Normal(c.init(device)),
            Self::Reduction(c) => NasNetCell::Reduction(c.init(device)),
        }
    }
}

/// A `NASNet` cell.
#[derive(Module, Debug)]
pub enum NasNetCell<B: Backend> {
    /// A [`NormalCell`].
    Normal(NormalCell<B>),

    /// A [`ReductionCell`].
    Reduction(ReductionCell<B>),
}

impl<B: Backend> NasNetCellMeta for NasNetCell<B> {
    fn in_channels(&self) -> usize {
        match self {
            Self::Normal(c) => c.in_channels(),
            Self::Reduction(c) => c.in_channels(),
        }
    }

    fn filters(&self) -> usize {
        match self {
            Self::Normal(c) => c.filters(),
            Self::Reduction(c) => c.filters(),
        }
    }

    fn out_channels(&self) -> usize {
        match self {
            Self::Normal(c) => c.out_channels(),
            Self::Reduction(c) => c.out_channels(),
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Normal(c) => c.stride(),
            Self::Reduction(c) => c.stride(),
        }
    }
}

impl<B: Backend> NasNetCell<B> {
    /// The cell kind.
    pub fn kind(&self) -> CellKind {
        match self {
            Self::Normal(_) => CellKind::Normal,
            Self::Reduction(_) => CellKind::Reduction,
        }
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `x`: the primary input.
    /// - `prev`: the previous input ``p``, if any.
    pub fn forward(
        &self,
        x: Tensor<B, 4>,
        prev: Option<Tensor<B, 4>>,
    ) -> CellOutput<B> {
        match self {
            Self::Normal(c) => c.forward(x, prev),
            Self::Reduction(c) => c.forward(x, prev),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::Distribution;

    #[test]
    fn test_cell_config_dispatch() {
        let normal: NasNetCellConfig = NormalCellConfig::new(16, 8, 4).into();
        assert_eq!(normal.kind(), CellKind::Normal);
        assert_eq!(normal.out_channels(), 24);
        assert_eq!(normal.prev_channels(), Some(8));
        assert_eq!(normal.output_resolution([9, 9]), [9, 9]);

        let reduction: NasNetCellConfig = ReductionCellConfig::new(16, 4)
            .with_prev_channels(Some(8))
            .with_keep_prev(true)
            .into();
        assert_eq!(reduction.kind(), CellKind::Reduction);
        assert_eq!(reduction.out_channels(), 16);
        assert_eq!(reduction.prev_channels(), Some(8));
        assert_eq!(reduction.output_resolution([9, 9]), [5, 5]);
    }

    #[test]
    fn test_cell_forward_dispatch() {
        type B = NdArray<f32>;
        let device = Default::default();

        let config: NasNetCellConfig = ReductionCellConfig::new(5, 4).into();
        let cell: NasNetCell<B> = config.init(&device);
        assert_eq!(cell.kind(), CellKind::Reduction);
        assert_eq!(cell.filters(), 4);

        let x = Tensor::random([1, 5, 8, 8], Distribution::Default, &device);
        let output = cell.forward(x, None);
        assert_eq!(output.out.dims(), [1, 16, 4, 4]);
        assert_eq!(output.prev.dims(), [1, 5, 8, 8]);
    }
}
