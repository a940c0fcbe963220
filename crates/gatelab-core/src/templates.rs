// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Automation Gateway config template discovery and rendering.
//!
//! Templates are Jinja-style YAML files named `<name>.yaml.j2`. A small
//! built-in set ships with the crate so a fresh checkout works without any
//! data directory; files dropped into `templates/automation-gateway/` add
//! to (or shadow) the built-ins.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use minijinja::Environment;

use crate::error::{ConfigError, Result};

/// File suffix every sidecar config template carries.
pub const TEMPLATE_SUFFIX: &str = ".yaml.j2";

/// Built-in templates compiled into the crate: `(name, content)`.
pub const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    ("default", include_str!("../templates/default.yaml.j2")),
    ("telemetry", include_str!("../templates/telemetry.yaml.j2")),
];

/// Template name of the built-in default.
pub const DEFAULT_TEMPLATE: &str = "default";

/// Reject blank names and anything smelling of path traversal.
pub fn normalize_template_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ConfigError::Invalid("Template name cannot be blank.".into()));
    }
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(ConfigError::Invalid(
            "Template name cannot contain path separators or traversal sequences.".into(),
        ));
    }
    Ok(name.to_string())
}

fn template_file_name(name: &str) -> String {
    format!("{name}{TEMPLATE_SUFFIX}")
}

/// All discoverable template names: built-ins plus `.yaml.j2` files under
/// `templates_dir`.
pub fn available_templates(templates_dir: &Path) -> BTreeSet<String> {
    let mut names: BTreeSet<String> = BUILTIN_TEMPLATES
        .iter()
        .map(|(name, _)| (*name).to_string())
        .collect();

    if let Ok(entries) = std::fs::read_dir(templates_dir) {
        for entry in entries.flatten() {
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(stem) = file_name.strip_suffix(TEMPLATE_SUFFIX)
                && !stem.is_empty()
            {
                names.insert(stem.to_string());
            }
        }
    }
    names
}

/// Load a template's source: an on-disk file shadows a built-in of the
/// same name.
pub fn load_template(templates_dir: &Path, name: &str) -> Result<String> {
    let name = normalize_template_name(name)?;
    let path = templates_dir.join(template_file_name(&name));
    if path.is_file() {
        return Ok(std::fs::read_to_string(&path)?);
    }
    BUILTIN_TEMPLATES
        .iter()
        .find(|(builtin, _)| *builtin == name)
        .map(|(_, content)| (*content).to_string())
        .ok_or_else(|| ConfigError::NotFound {
            what: "Automation Gateway template",
            path,
        })
}

/// Render a template source against a JSON context.
pub fn render_template(source: &str, context: &serde_json::Value) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("tmpl", source)
        .map_err(|e| ConfigError::InvalidShape(format!("Template parse error: {e}")))?;
    let tmpl = env
        .get_template("tmpl")
        .map_err(|e| ConfigError::InvalidShape(format!("Template load error: {e}")))?;
    tmpl.render(context)
        .map_err(|e| ConfigError::InvalidShape(format!("Template render error: {e}")))
}

/// Metadata describing one discoverable template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateMetadata {
    /// Template name (file stem).
    pub name: String,
    /// Full file name, `<name>.yaml.j2`.
    pub filename: String,
    /// Whether a file for it exists on disk (built-ins may not).
    pub exists: bool,
    /// Description parsed from the leading comment block, if any.
    pub description: Option<String>,
    /// Whether this is the default template.
    pub is_default: bool,
}

/// Full template metadata plus contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDetail {
    /// Discovery metadata.
    pub metadata: TemplateMetadata,
    /// Raw template source.
    pub content: String,
}

/// Read-only catalog over the sidecar template directory.
///
/// Backs the template listing surface; rendering itself goes through
/// [`load_template`] / [`render_template`].
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    templates_dir: PathBuf,
}

impl TemplateCatalog {
    /// Create a catalog over `templates_dir`.
    pub fn new(templates_dir: impl Into<PathBuf>) -> Self {
        Self {
            templates_dir: templates_dir.into(),
        }
    }

    /// Metadata for every discoverable template, sorted by name.
    pub fn list(&self) -> Vec<TemplateMetadata> {
        available_templates(&self.templates_dir)
            .into_iter()
            .map(|name| self.metadata(&name))
            .collect()
    }

    /// Metadata and contents for one template.
    pub fn detail(&self, name: &str) -> Result<TemplateDetail> {
        let name = normalize_template_name(name)?;
        let available = available_templates(&self.templates_dir);
        if !available.contains(&name) {
            let choices: Vec<&str> = available.iter().map(String::as_str).collect();
            return Err(ConfigError::Invalid(format!(
                "Unsupported Automation Gateway config template '{name}'. \
                 Available templates: {}.",
                choices.join(", ")
            )));
        }
        let content = load_template(&self.templates_dir, &name)?;
        Ok(TemplateDetail {
            metadata: self.metadata(&name),
            content,
        })
    }

    fn metadata(&self, name: &str) -> TemplateMetadata {
        let filename = template_file_name(name);
        let path = self.templates_dir.join(&filename);
        let exists = path.is_file();
        let description = if exists {
            std::fs::read_to_string(&path)
                .ok()
                .and_then(|src| extract_description(&src))
        } else {
            BUILTIN_TEMPLATES
                .iter()
                .find(|(builtin, _)| *builtin == name)
                .and_then(|(_, content)| extract_description(content))
        };
        TemplateMetadata {
            name: name.to_string(),
            filename,
            exists,
            description,
            is_default: name == DEFAULT_TEMPLATE,
        }
    }
}

/// Join the leading `#` comment block of a template into one description.
fn extract_description(source: &str) -> Option<String> {
    let mut lines = Vec::new();
    for line in source.lines() {
        let stripped = line.trim();
        if stripped.is_empty() {
            if lines.is_empty() {
                continue;
            }
            break;
        }
        let Some(comment) = stripped.strip_prefix('#') else {
            break;
        };
        let comment = comment.trim();
        if !comment.is_empty() {
            lines.push(comment.to_string());
        }
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_builtins_always_available() {
        let tmp = TempDir::new().unwrap();
        let names = available_templates(tmp.path());
        assert!(names.contains("default"));
        assert!(names.contains("telemetry"));
    }

    #[test]
    fn test_disk_templates_extend_builtins() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("bridge.yaml.j2"), "Servers: {}\n").unwrap();

        let names = available_templates(tmp.path());
        assert!(names.contains("bridge"));
    }

    #[test]
    fn test_disk_template_shadows_builtin() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("default.yaml.j2"), "Custom: true\n").unwrap();

        let source = load_template(tmp.path(), "default").unwrap();
        assert_eq!(source, "Custom: true\n");
    }

    #[test]
    fn test_normalize_rejects_traversal() {
        assert!(normalize_template_name("../etc/passwd").is_err());
        assert!(normalize_template_name("a/b").is_err());
        assert!(normalize_template_name("  ").is_err());
        assert_eq!(normalize_template_name(" default ").unwrap(), "default");
    }

    #[test]
    fn test_render_substitutes_fields() {
        let source = load_template(Path::new("/nonexistent"), "default").unwrap();
        let rendered = render_template(
            &source,
            &json!({
                "graphql_port": 4001,
                "mqtt_port": 1883,
                "mqtt_ws_port": 1884,
                "opcua_port": 4841,
                "log_level": "INFO",
                "gateway_name": "qa-gateway",
                "ignition_endpoint": "http://ignition-dev:8088",
            }),
        )
        .unwrap();

        assert!(rendered.contains("GraphQL"));
        assert!(rendered.contains("Port: 4001"));
        assert!(rendered.contains("Url: http://ignition-dev:8088"));
        assert!(!rendered.contains("{{"));
    }

    #[test]
    fn test_catalog_detail_unknown_template() {
        let tmp = TempDir::new().unwrap();
        let catalog = TemplateCatalog::new(tmp.path());

        let err = catalog.detail("nonexistent").unwrap_err();
        assert!(err.to_string().contains("Unsupported Automation Gateway"));
        assert!(err.to_string().contains("default"));
    }

    #[test]
    fn test_catalog_lists_descriptions() {
        let tmp = TempDir::new().unwrap();
        let catalog = TemplateCatalog::new(tmp.path());

        let templates = catalog.list();
        let default = templates.iter().find(|t| t.name == "default").unwrap();
        assert!(default.is_default);
        assert!(!default.exists);
        assert!(
            default
                .description
                .as_deref()
                .unwrap()
                .contains("Default Automation Gateway")
        );
    }
}
