//! Suffix-keyed load/save codecs
//!
//! Maps lower-cased file suffixes to serializer/deserializer pairs. The
//! registry is built and injected by the caller; nothing here is global.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};

/// Load/save capability for one file format
pub trait FileCodec: Send + Sync {
    fn load(&self, path: &Path) -> Result<serde_json::Value>;
    fn save(&self, path: &Path, data: &serde_json::Value) -> Result<()>;
}

/// JSON files, pretty-printed on save
pub struct JsonCodec;

impl FileCodec for JsonCodec {
    fn load(&self, path: &Path) -> Result<serde_json::Value> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, path: &Path, data: &serde_json::Value) -> Result<()> {
        let content = serde_json::to_string_pretty(data)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// TOML files
pub struct TomlCodec;

impl FileCodec for TomlCodec {
    fn load(&self, path: &Path) -> Result<serde_json::Value> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    fn save(&self, path: &Path, data: &serde_json::Value) -> Result<()> {
        let content = toml::to_string_pretty(data)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Registry of codecs keyed by file suffix
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn FileCodec>>,
}

impl CodecRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in JSON and TOML codecs
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("json", Arc::new(JsonCodec));
        registry.register("toml", Arc::new(TomlCodec));
        registry
    }

    /// Register a codec for a suffix (stored lower-cased)
    pub fn register(&mut self, suffix: impl Into<String>, codec: Arc<dyn FileCodec>) {
        self.codecs.insert(suffix.into().to_lowercase(), codec);
    }

    /// The codec registered for a suffix
    pub fn get(&self, suffix: &str) -> Result<&dyn FileCodec> {
        self.codecs
            .get(&suffix.to_lowercase())
            .map(Arc::as_ref)
            .ok_or_else(|| Error::UnknownSuffix(suffix.to_string()))
    }

    /// The codec for a path, keyed by its extension
    pub fn for_path(&self, path: &Path) -> Result<&dyn FileCodec> {
        let suffix = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_string())
            .unwrap_or_default();
        self.get(&suffix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_json_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("data.json");

        let registry = CodecRegistry::with_defaults();
        let codec = registry.for_path(&path).unwrap();

        let data = json!({"a": 1, "b": ["x", "y"]});
        codec.save(&path, &data).unwrap();
        assert_eq!(codec.load(&path).unwrap(), data);
    }

    #[test]
    fn test_toml_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let registry = CodecRegistry::with_defaults();
        let codec = registry.for_path(&path).unwrap();

        let data = json!({"name": "mirror", "count": 3});
        codec.save(&path, &data).unwrap();
        assert_eq!(codec.load(&path).unwrap(), data);
    }

    #[test]
    fn test_unknown_suffix() {
        let registry = CodecRegistry::with_defaults();
        let result = registry.get("npy");
        assert!(matches!(result, Err(Error::UnknownSuffix(_))));
    }

    #[test]
    fn test_suffix_case_insensitive() {
        let registry = CodecRegistry::with_defaults();
        assert!(registry.get("JSON").is_ok());
        assert!(registry.for_path(Path::new("a/B.Json")).is_ok());
    }
}
