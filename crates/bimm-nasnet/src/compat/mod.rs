//! # Compat
//!
//! Code which is expected to move upstream into ``burn``.
pub mod conv_shape;
