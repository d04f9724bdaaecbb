//! # `NASNet-A` Image Classifiers
//!
//! Implements the `NASNet-A` family from
//! [Learning Transferable Architectures for Scalable Image Recognition](https://arxiv.org/abs/1707.07012).
//!
//! A network is a stem conv, two stem reduction cells, and three stacks of
//! normal cells separated by reduction cells; every cell consumes the current
//! tensor ``x`` and the previous cell's input ``p``.
//!
//! The configuration is split in two layers:
//! * [`nasnet_model::NasNetAbstractConfig`] - the high-level contract
//!   (stem width, cells per stack, filters, ...);
//! * [`nasnet_model::NasNetConfig`] - the lifted per-cell structure, which
//!   builds a [`nasnet_model::NasNet`].
//!
//! Well-known configurations are in [`prefabs`].

pub mod adjust;
pub mod aux_head;
pub mod cell;
pub mod nasnet_model;
pub mod normal_cell;
pub mod prefabs;
pub mod reduction_cell;

pub use nasnet_model::{NasNet, NasNetAbstractConfig, NasNetConfig, NasNetOutput};
