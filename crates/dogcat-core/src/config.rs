//! Configuration for dogcat.
//!
//! Stored in `.dogcats/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// dogcat project configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Primary namespace for new records in this project.
    pub namespace: String,

    /// Legacy key, migrated into `namespace` on read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue_prefix: Option<String>,

    /// If present, only these namespaces (plus `namespace`) are listed.
    /// Mutually exclusive with `hidden_namespaces`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_namespaces: Option<Vec<String>>,

    /// Namespaces hidden from listings. The primary namespace is always visible.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hidden_namespaces: Vec<String>,

    /// Hint for external git integration; the core ignores this.
    pub git_tracking: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: "dc".to_string(),
            issue_prefix: None,
            visible_namespaces: None,
            hidden_namespaces: Vec::new(),
            git_tracking: true,
        }
    }
}

impl Config {
    /// Load config from a TOML file, migrating `issue_prefix` if present.
    /// Missing file yields the default config.
    pub fn load(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let mut config: Config =
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))?;

        if let Some(prefix) = config.issue_prefix.take() {
            tracing::debug!(legacy_key = "issue_prefix", "migrating legacy config key to namespace");
            config.namespace = prefix;
        }

        if config.visible_namespaces.is_some() && !config.hidden_namespaces.is_empty() {
            tracing::warn!("config sets both visible_namespaces and hidden_namespaces; visible_namespaces takes precedence");
        }

        Ok(config)
    }

    /// Save config to a TOML file.
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Derive a namespace for a project root when no config is present:
    /// sanitize the directory name, falling back to `"dc"`.
    pub fn namespace_from_dir(root: &Path) -> String {
        root.file_name()
            .and_then(|n| n.to_str())
            .map(sanitize_namespace)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "dc".to_string())
    }

    /// Whether `namespace` should appear in listings under this config.
    pub fn namespace_visible(&self, namespace: &str) -> bool {
        if namespace == self.namespace {
            return true;
        }
        if let Some(visible) = &self.visible_namespaces {
            return visible.iter().any(|n| n == namespace);
        }
        !self.hidden_namespaces.iter().any(|n| n == namespace)
    }

    pub fn default_with_comments() -> String {
        r#"# dogcat configuration

# Primary namespace for new records in this project.
namespace = "dc"

# If set, only these namespaces (plus `namespace`) are shown in listings.
# visible_namespaces = ["dc", "shared"]

# Namespaces hidden from listings. The primary namespace is always visible.
hidden_namespaces = []

# Hint for external git integration; the core ignores this.
git_tracking = true
"#
        .to_string()
    }
}

fn sanitize_namespace(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.namespace, "dc");
    }

    #[test]
    fn legacy_issue_prefix_migrates_to_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "issue_prefix = \"legacy\"\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.namespace, "legacy");
        assert!(config.issue_prefix.is_none());
    }

    #[test]
    fn namespace_from_dir_sanitizes_and_lowercases() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("My Cool_Project!");
        std::fs::create_dir(&project).unwrap();
        assert_eq!(Config::namespace_from_dir(&project), "my-cool-project");
    }

    #[test]
    fn namespace_visibility_respects_hidden_list() {
        let mut config = Config::default();
        config.hidden_namespaces.push("secret".into());
        assert!(config.namespace_visible("dc"));
        assert!(!config.namespace_visible("secret"));
        assert!(config.namespace_visible("other"));
    }

    #[test]
    fn visible_namespaces_takes_precedence_over_hidden() {
        let mut config = Config::default();
        config.visible_namespaces = Some(vec!["alpha".into()]);
        config.hidden_namespaces.push("alpha".into());
        assert!(config.namespace_visible("alpha"));
        assert!(!config.namespace_visible("beta"));
    }
}
