#![warn(missing_docs)]
//!# bimm-nasnet - NASNet-A Image Models for Burn
//!
//! ## Notable Components
//!
//! * [`cache`] - well-known config registries.
//!   * [`cache::prefabs`] - named config pre-fabs.
//! * [`compat`] - compat code, ported or planned for an upcoming release of ``burn``.
//!   * [`compat::conv_shape`] - `VALID` / `SAME` convolution shape arithmetic.
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::pad`] - TensorFlow-style `SAME` padding.
//!   * [`layers::pool`] - `SAME` padded pooling layers.
//!   * [`layers::blocks`] - miscellaneous blocks.
//!     * [`layers::blocks::conv_norm`] - ``Conv2d + BatchNorm2d`` block.
//!     * [`layers::blocks::sep_conv`] - separable conv/norm blocks.
//! * [`models`] - complete model families.
//!   * [`models::nasnet`] - `NASNet-A` (large and mobile).

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod cache;
pub mod compat;
pub mod layers;
pub mod models;
