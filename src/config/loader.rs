//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::RouterConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<RouterConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<RouterConfig, ConfigError> {
    let config: RouterConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    tracing::debug!(
        routes = config.routes.len(),
        basename = %config.basename,
        "Configuration loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.basename, "/");
        assert_eq!(config.max_redirects, 20);
        assert_eq!(config.history.initial_entries, vec!["/".to_string()]);
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_errors_are_reported() {
        assert!(matches!(parse_config("routes = 3"), Err(ConfigError::Parse(_))));

        let err = parse_config("basename = \"x\"").unwrap_err();
        assert_eq!(err.to_string(), "Validation failed: basename: must start with '/'");

        let missing = load_config(Path::new("/definitely/not/here.toml"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_route_tree_from_toml() {
        let config = parse_config(
            r#"
            basename = "/app"

            [[routes]]
            id = "root"
            path = "/"
            error_boundary = true
            handle = { title = "Home" }

            [[routes.children]]
            id = "todos"
            path = "todos"

            [[routes.children.children]]
            id = "todo"
            path = ":id"
            "#,
        )
        .unwrap();

        let root = &config.routes[0];
        assert_eq!(root.handle, Some(serde_json::json!({ "title": "Home" })));
        assert_eq!(root.children[0].children[0].path.as_deref(), Some(":id"));
    }
}
