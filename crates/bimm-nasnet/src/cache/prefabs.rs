//! # Config Prefabs for Well-Known Model Configurations
//!
//! A pre-fab is a named, described builder for a [`Config`].
//! Static pre-fabs can live in `static` items and are lifted to
//! owned [`PreFabConfig`]s; a [`PreFabMap`] indexes them by name.

use anyhow::bail;
use burn::config::Config;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Static builder for a [`PreFabConfig`].
pub struct StaticPreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Name of the model config pre-fab.
    pub name: &'static str,

    /// Description of the model config pre-fab.
    pub description: &'static str,

    /// Builder function for the config.
    pub builder: fn() -> C,
}

impl<C> StaticPreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Convert to a [`PreFabConfig<C>`].
    pub fn to_prefab(&self) -> PreFabConfig<C> {
        PreFabConfig {
            name: self.name.to_string(),
            description: self.description.to_string(),
            builder: Arc::new(self.builder),
        }
    }

    /// Build a new config.
    pub fn new_config(&self) -> C {
        (self.builder)()
    }
}

impl<C> Debug for StaticPreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        self.to_prefab().fmt(f)
    }
}

/// A [`Config`] Well-Known Pre-Fab.
#[derive(Clone)]
pub struct PreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Name of the model config pre-fab.
    pub name: String,

    /// Description of the model config pre-fab.
    pub description: String,

    /// Builder function for the config.
    pub builder: Arc<dyn Fn() -> C + Send + Sync>,
}

impl<C> Debug for PreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let pretty = f.alternate();
        let type_name = std::any::type_name::<C>();
        let mut handle = f.debug_struct(&format!("PreFabConfig<{type_name}>"));

        handle
            .field("name", &self.name)
            .field("description", &self.description);

        if pretty {
            handle.field("config", &self.new_config());
        }

        handle.finish()
    }
}

impl<C> PreFabConfig<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Build a new config.
    pub fn new_config(&self) -> C {
        (self.builder)()
    }

    /// Derive a pre-fab whose config is mapped through `f`.
    ///
    /// Used to lift a contract config pre-fab to a structure config pre-fab.
    pub fn map<D, F>(
        &self,
        f: F,
    ) -> PreFabConfig<D>
    where
        D: 'static + Config + Debug + Clone,
        F: Fn(C) -> D + Send + Sync + 'static,
    {
        let builder = self.builder.clone();
        PreFabConfig {
            name: self.name.clone(),
            description: self.description.clone(),
            builder: Arc::new(move || f(builder())),
        }
    }
}

/// Static [`PreFabMap`] builder.
pub struct StaticPreFabMap<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Registered static pre-fabs.
    pub items: &'static [&'static StaticPreFabConfig<C>],
}

impl<C> StaticPreFabMap<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Convert to a [`PreFabMap`].
    pub fn to_map(&self) -> PreFabMap<C> {
        PreFabMap {
            items: self
                .items
                .iter()
                .map(|p| (p.name.to_string(), p.to_prefab()))
                .collect(),
        }
    }

    /// Names of the registered pre-fabs, in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.items.iter().map(|p| p.name).collect()
    }

    /// Lookup a pre-fab by name.
    pub fn lookup(
        &self,
        name: &str,
    ) -> Option<PreFabConfig<C>> {
        self.items
            .iter()
            .find(|p| p.name == name)
            .map(|p| p.to_prefab())
    }

    /// Lookup a pre-fab by name.
    pub fn try_lookup(
        &self,
        name: &str,
    ) -> anyhow::Result<PreFabConfig<C>> {
        match self.lookup(name) {
            Some(p) => Ok(p),
            None => bail!(
                "Pre-fab not found: {name}; known pre-fabs: {:?}",
                self.names()
            ),
        }
    }

    /// Lookup a pre-fab by name.
    ///
    /// # Panics
    ///
    /// If the name is not registered.
    pub fn expect_lookup(
        &self,
        name: &str,
    ) -> PreFabConfig<C> {
        match self.try_lookup(name) {
            Ok(p) => p,
            Err(e) => panic!("{}", e),
        }
    }
}

impl<C> Debug for StaticPreFabMap<C>
where
    C: 'static + Config + Debug + Clone,
{
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("StaticPreFabMap")
            .field("names", &self.names())
            .finish()
    }
}

/// Directory of [`PreFabConfig`]s.
#[derive(Debug, Clone)]
pub struct PreFabMap<C>
where
    C: 'static + Config + Debug + Clone,
{
    /// Map of pre-fabs by name.
    pub items: BTreeMap<String, PreFabConfig<C>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Config, Debug)]
    struct ToyConfig {
        width: usize,
    }

    static TOY_SMALL: StaticPreFabConfig<ToyConfig> = StaticPreFabConfig {
        name: "toy_small",
        description: "a small toy",
        builder: || ToyConfig::new(2),
    };

    static TOY_LARGE: StaticPreFabConfig<ToyConfig> = StaticPreFabConfig {
        name: "toy_large",
        description: "a large toy",
        builder: || ToyConfig::new(64),
    };

    static TOYS: StaticPreFabMap<ToyConfig> = StaticPreFabMap {
        items: &[&TOY_SMALL, &TOY_LARGE],
    };

    #[test]
    fn test_static_prefab() {
        let prefab = TOY_SMALL.to_prefab();
        assert_eq!(prefab.name, "toy_small");
        assert_eq!(prefab.description, "a small toy");
        assert_eq!(prefab.new_config().width, 2);

        let doubled = prefab.map(|c| ToyConfig::new(c.width * 2));
        assert_eq!(doubled.name, "toy_small");
        assert_eq!(doubled.new_config().width, 4);

        let debug = format!("{:#?}", prefab);
        assert!(debug.contains("toy_small"));
        assert!(debug.contains("width"));
    }

    #[test]
    fn test_static_map_lookup() {
        assert_eq!(TOYS.names(), vec!["toy_small", "toy_large"]);
        assert_eq!(TOYS.expect_lookup("toy_large").new_config().width, 64);
        assert!(TOYS.lookup("toy_medium").is_none());

        let err = TOYS.try_lookup("toy_medium").unwrap_err();
        assert!(err.to_string().contains("toy_medium"));

        let map = TOYS.to_map();
        let names: Vec<&str> = map.items.keys().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["toy_large", "toy_small"]);
        assert_eq!(map.items["toy_small"].new_config().width, 2);
        assert_eq!(map.items["toy_large"].description, "a large toy");
    }

    #[test]
    #[should_panic(expected = "Pre-fab not found: nope")]
    fn test_expect_lookup_panics() {
        TOYS.expect_lookup("nope");
    }
}
