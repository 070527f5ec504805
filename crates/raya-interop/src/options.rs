//! Bridge configuration

use serde::Deserialize;

/// Options for creating a [`Bridge`](crate::Bridge)
///
/// Every field has a default, so a JSON document only needs the keys it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    /// Assembly of the default generation container
    pub default_assembly: String,

    /// Module of the default generation container
    pub default_module: String,

    /// Drain the finalization queue whenever a dispatch or construction holds
    /// the outermost interpreter lock
    pub drain_on_dispatch: bool,

    /// Maximum entries released per drain (None = unlimited)
    pub max_drain_batch: Option<usize>,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            default_assembly: "__RayaInteropDynamic".to_string(),
            default_module: "__RayaInteropDynamicModule".to_string(),
            drain_on_dispatch: true,
            max_drain_batch: None,
        }
    }
}

impl BridgeOptions {
    /// Set the default generation container
    pub fn with_container(mut self, assembly: impl Into<String>, module: impl Into<String>) -> Self {
        self.default_assembly = assembly.into();
        self.default_module = module.into();
        self
    }

    /// Enable or disable draining at dispatch and construction
    pub fn with_drain_on_dispatch(mut self, enabled: bool) -> Self {
        self.drain_on_dispatch = enabled;
        self
    }

    /// Bound the number of entries released per drain
    pub fn with_max_drain_batch(mut self, limit: usize) -> Self {
        self.max_drain_batch = Some(limit);
        self
    }

    /// Parse options from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = BridgeOptions::default();
        assert_eq!(options.default_assembly, "__RayaInteropDynamic");
        assert_eq!(options.default_module, "__RayaInteropDynamicModule");
        assert!(options.drain_on_dispatch);
        assert_eq!(options.max_drain_batch, None);
    }

    #[test]
    fn test_partial_json() {
        let options = BridgeOptions::from_json(r#"{ "max_drain_batch": 64 }"#).unwrap();
        assert_eq!(options.max_drain_batch, Some(64));
        assert!(options.drain_on_dispatch);
        assert_eq!(options.default_module, "__RayaInteropDynamicModule");
    }

    #[test]
    fn test_invalid_json() {
        assert!(BridgeOptions::from_json(r#"{ "drain_on_dispatch": "yes" }"#).is_err());
    }

    #[test]
    fn test_builders() {
        let options = BridgeOptions::default()
            .with_container("Plugins", "Main")
            .with_drain_on_dispatch(false)
            .with_max_drain_batch(8);
        assert_eq!(options.default_assembly, "Plugins");
        assert!(!options.drain_on_dispatch);
        assert_eq!(options.max_drain_batch, Some(8));
    }
}
