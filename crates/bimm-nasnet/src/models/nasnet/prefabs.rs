//! # `NASNet` Pre-Fabs
//!
//! Named, well-known [`NasNetAbstractConfig`]s.

use crate::cache::prefabs::{PreFabConfig, StaticPreFabConfig, StaticPreFabMap};
use crate::models::nasnet::nasnet_model::{NasNetAbstractConfig, NasNetConfig};

/// Static builder for [`NasNetPreFabContractConfig`].
pub type StaticNasNetPreFabContractConfig = StaticPreFabConfig<NasNetAbstractConfig>;

/// A [`NasNetAbstractConfig`] Well-Known Pre-Fab.
pub type NasNetPreFabContractConfig = PreFabConfig<NasNetAbstractConfig>;

/// A [`NasNetConfig`] Well-Known Pre-Fab.
pub type NasNetPreFabStructureConfig = PreFabConfig<NasNetConfig>;

/// `NASNet-A` large; ``331x331`` `ImageNet` inputs.
pub static NASNET_A_LARGE_PREFAB: StaticNasNetPreFabContractConfig = StaticPreFabConfig {
    name: "nasnet_a_large",
    description: "NASNet-A large (6 @ 4032) for 331x331 ImageNet inputs",
    builder: || NasNetAbstractConfig::nasnet_a_large(1000),
};

/// `NASNet-A` mobile; ``224x224`` `ImageNet` inputs.
pub static NASNET_A_MOBILE_PREFAB: StaticNasNetPreFabContractConfig = StaticPreFabConfig {
    name: "nasnet_a_mobile",
    description: "NASNet-A mobile (4 @ 1056) for 224x224 ImageNet inputs",
    builder: || NasNetAbstractConfig::nasnet_a_mobile(1000),
};

/// Registry of the `NASNet` pre-fabs.
pub static PREFAB_NASNET_MAP: StaticPreFabMap<NasNetAbstractConfig> = StaticPreFabMap {
    items: &[&NASNET_A_LARGE_PREFAB, &NASNET_A_MOBILE_PREFAB],
};

impl NasNetPreFabContractConfig {
    /// Convert to a [`NasNetPreFabStructureConfig`].
    ///
    /// The structure builder panics if the contract cannot be lifted.
    pub fn to_structure_prefab(&self) -> NasNetPreFabStructureConfig {
        self.map(|config| config.to_structure())
    }
}

/// Lookup a `NASNet` pre-fab by name.
pub fn lookup_prefab(name: &str) -> Option<NasNetPreFabContractConfig> {
    PREFAB_NASNET_MAP.lookup(name)
}

/// Lookup a `NASNet` pre-fab by name.
pub fn try_lookup_prefab(name: &str) -> anyhow::Result<NasNetPreFabContractConfig> {
    PREFAB_NASNET_MAP.try_lookup(name)
}

/// Lookup a `NASNet` pre-fab by name.
///
/// # Panics
///
/// If the name is not registered.
pub fn expect_lookup_prefab(name: &str) -> NasNetPreFabContractConfig {
    PREFAB_NASNET_MAP.expect_lookup(name)
}
