//! # Well-Known Config Registries
pub mod prefabs;
