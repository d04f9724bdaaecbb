//! # Complete Model Families
pub mod nasnet;
