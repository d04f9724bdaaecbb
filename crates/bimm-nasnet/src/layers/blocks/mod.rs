//! # Miscellaneous Blocks
pub mod conv_norm;
pub mod sep_conv;
