//! Configuration for the script runtime

use crate::error::{ScriptError, ScriptResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Search paths and engine limits for the embedded runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Directories searched, in order, when a module is imported
    pub search_paths: Vec<PathBuf>,
    /// File extension of script modules, without the dot
    pub extension: String,
    /// Maximum operations a single call may perform
    pub max_operations: u64,
    /// Maximum nested function call depth
    pub max_call_levels: usize,
    /// Maximum expression nesting depth at global level
    pub max_expr_depth: usize,
    /// Maximum expression nesting depth inside functions
    pub max_function_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            extension: "rhai".to_string(),
            max_operations: 100_000,
            max_call_levels: 50,
            max_expr_depth: 100,
            max_function_expr_depth: 100,
            max_string_size: 10_000,
            max_array_size: 10_000,
            max_map_size: 1_000,
        }
    }
}

impl ScriptConfig {
    /// Create a configuration searching the given directories
    pub fn new<I, P>(search_paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let config = Self {
            search_paths: search_paths.into_iter().map(Into::into).collect(),
            ..Self::default()
        };
        debug!(search_paths = ?config.search_paths, "Creating new ScriptConfig");
        config
    }

    /// Append a search path after the existing ones
    pub fn with_search_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.search_paths.push(path.into());
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn with_max_operations(mut self, max_operations: u64) -> Self {
        self.max_operations = max_operations;
        self
    }

    /// Load a configuration from a JSON file; missing fields keep their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> ScriptResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ScriptError::Config(format!("{}: {e}", path.display())))?;
        debug!(path = ?path, "Loaded script configuration");
        Ok(config)
    }

    /// Relative file path for a dotted module name
    ///
    /// `tests.update_test` becomes `tests/update_test.rhai`. Each segment must
    /// be a plain identifier, so names cannot escape the search paths.
    pub fn module_path(&self, module: &str) -> Result<PathBuf, String> {
        let mut path = PathBuf::new();
        for segment in module.split('.') {
            let valid = !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return Err(format!("invalid module name '{module}'"));
            }
            path.push(segment);
        }
        path.set_extension(&self.extension);
        Ok(path)
    }

    /// First file on the search path that provides `module`
    pub fn locate(&self, module: &str) -> Result<PathBuf, String> {
        let relative = self.module_path(module)?;
        self.search_paths
            .iter()
            .map(|root| root.join(&relative))
            .find(|candidate| candidate.is_file())
            .ok_or_else(|| {
                format!(
                    "module '{module}' not found in search paths {:?}",
                    self.search_paths
                )
            })
    }

    /// Check that every search path exists
    pub fn validate(&self) -> ScriptResult<()> {
        if self.extension.is_empty() || self.extension.contains('.') {
            return Err(ScriptError::Config(format!(
                "invalid script extension '{}'",
                self.extension
            )));
        }

        if self.search_paths.is_empty() {
            warn!("No script search paths configured; only registered API is available");
        }

        for path in &self.search_paths {
            if !path.is_dir() {
                return Err(ScriptError::Config(format!(
                    "script search path not found: {path:?}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_module_path() {
        let config = ScriptConfig::default();
        assert_eq!(
            config.module_path("tests.update_test").unwrap(),
            PathBuf::from("tests/update_test.rhai")
        );
        assert_eq!(
            config.module_path("single").unwrap(),
            PathBuf::from("single.rhai")
        );
    }

    #[test]
    fn test_module_path_rejects_traversal() {
        let config = ScriptConfig::default();
        assert!(config.module_path("../evil").is_err());
        assert!(config.module_path("some/path/evil").is_err());
        assert!(config.module_path("some\\path").is_err());
        assert!(config.module_path("tests..evil").is_err());
        assert!(config.module_path("").is_err());
    }

    #[test]
    fn test_locate_uses_first_matching_path() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::create_dir_all(second.path().join("pkg")).unwrap();
        fs::write(second.path().join("pkg/thing.rhai"), "").unwrap();

        let config = ScriptConfig::new([first.path(), second.path()]);
        assert_eq!(
            config.locate("pkg.thing").unwrap(),
            second.path().join("pkg/thing.rhai")
        );

        // Shadowed by the earlier path once it provides the module too
        fs::create_dir_all(first.path().join("pkg")).unwrap();
        fs::write(first.path().join("pkg/thing.rhai"), "").unwrap();
        assert_eq!(
            config.locate("pkg.thing").unwrap(),
            first.path().join("pkg/thing.rhai")
        );

        assert!(config.locate("pkg.other").is_err());
    }

    #[test]
    fn test_validate() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ScriptConfig::new([dir.path()]).validate().is_ok());
        assert!(ScriptConfig::new([dir.path().join("missing")])
            .validate()
            .is_err());
        assert!(ScriptConfig::new([dir.path()])
            .with_extension("")
            .validate()
            .is_err());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scripting.json");
        fs::write(
            &path,
            r#"{ "search_paths": ["scripts", "mods"], "max_operations": 500 }"#,
        )
        .unwrap();

        let config = ScriptConfig::from_json_file(&path).unwrap();
        assert_eq!(
            config.search_paths,
            vec![PathBuf::from("scripts"), PathBuf::from("mods")]
        );
        assert_eq!(config.max_operations, 500);
        assert_eq!(config.extension, "rhai");

        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            ScriptConfig::from_json_file(&path),
            Err(ScriptError::Config(_))
        ));
    }
}
