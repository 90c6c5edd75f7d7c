//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check route ids are unique and route shapes are legal
//! - Check path patterns compile
//! - Validate value ranges (history index, log level)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RouterConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::{RouteConfig, RouterConfig};
use crate::routing::matcher::PathMatcher;
use crate::routing::route::tree_position;

/// A single semantic problem, located by a dotted field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Check a parsed config.
pub fn validate_config(config: &RouterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !config.basename.starts_with('/') {
        errors.push(ValidationError::new("basename", "must start with '/'"));
    }

    if config.max_redirects == 0 {
        errors.push(ValidationError::new("max_redirects", "must be greater than 0"));
    }

    let entries = config.history.initial_entries.len();
    if let Some(index) = config.history.initial_index {
        if index >= entries.max(1) {
            errors.push(ValidationError::new(
                "history.initial_index",
                format!("{index} is out of range for {entries} entries"),
            ));
        }
    }

    let level = config.observability.log_level.to_lowercase();
    if !LOG_LEVELS.contains(&level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level {:?}", config.observability.log_level),
        ));
    }

    let mut ids = HashSet::new();
    validate_routes(&config.routes, "routes", "", &mut ids, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_routes(
    routes: &[RouteConfig],
    field: &str,
    parent_position: &str,
    ids: &mut HashSet<String>,
    errors: &mut Vec<ValidationError>,
) {
    for (i, route) in routes.iter().enumerate() {
        let field = format!("{field}[{i}]");
        let position = tree_position(parent_position, i);
        let id = route.id.clone().unwrap_or_else(|| position.clone());

        if !ids.insert(id.clone()) {
            errors.push(ValidationError::new(
                format!("{field}.id"),
                format!("duplicate route id {id:?}"),
            ));
        }

        if route.index {
            if route.path.is_some() {
                errors.push(ValidationError::new(
                    format!("{field}.path"),
                    "index routes cannot have a path",
                ));
            }
            if !route.children.is_empty() {
                errors.push(ValidationError::new(
                    format!("{field}.children"),
                    "index routes cannot have children",
                ));
            }
        }

        if let Some(path) = &route.path {
            if let Err(error) = PathMatcher::compile(path, route.case_sensitive) {
                errors.push(ValidationError::new(format!("{field}.path"), error.to_string()));
            }
        }

        validate_routes(&route.children, &format!("{field}.children"), &position, ids, errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&RouterConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_every_error() {
        let config: RouterConfig = toml::from_str(
            r#"
            basename = "app"
            max_redirects = 0

            [history]
            initial_entries = ["/"]
            initial_index = 3

            [observability]
            log_level = "loud"

            [[routes]]
            id = "a"
            path = "/a/:x/:x"

            [[routes]]
            id = "a"
            index = true
            path = "/b"

            [[routes.children]]
            path = "c"
            "#,
        )
        .unwrap();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "basename",
                "max_redirects",
                "history.initial_index",
                "observability.log_level",
                "routes[0].path",
                "routes[1].id",
                "routes[1].path",
                "routes[1].children",
            ]
        );
    }
}
