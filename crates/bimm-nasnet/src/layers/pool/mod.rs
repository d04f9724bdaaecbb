//! # `SAME` Padded Pooling Layers
//!
//! TensorFlow-compatible pooling, where the output resolution is
//! ``ceil(in / stride)`` and padding never contributes to the result.

mod pool_2d_same;

pub use pool_2d_same::*;
