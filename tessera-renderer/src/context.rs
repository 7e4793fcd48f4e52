//! Template context: the serializable payload handed to every scaffold
//! template.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RenderError;

/// Group used for API scripts when none is given.
pub const DEFAULT_API_GROUP: &str = "default";

/// Flat rendering payload shared by all scaffold templates.
///
/// Templates only read the fields they need; unused fields are harmless.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateContext {
    /// Name as given (models are title-cased).
    pub name: String,
    pub name_lower: String,
    pub name_upper: String,
    /// API group directory under `api/`.
    pub group: String,
    /// Physical table backing a model.
    pub table_name: String,
    pub table_id: String,
    pub app_id: String,
    /// Repository URL written into a fresh `tessera.json`; empty when unknown.
    pub repo_url: String,
    pub description: String,
    /// RFC 3339 timestamp, second precision.
    pub created_at: String,
}

impl TemplateContext {
    pub fn new(name: &str) -> Self {
        let lower = name.to_lowercase();
        Self {
            name: name.to_string(),
            name_lower: lower.clone(),
            name_upper: name.to_uppercase(),
            group: DEFAULT_API_GROUP.to_string(),
            table_name: format!("platform_{lower}"),
            table_id: format!("tbl_{lower}"),
            app_id: String::new(),
            repo_url: String::new(),
            description: String::new(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Context for a model: the entity name gets a leading capital.
    pub fn for_model(name: &str) -> Self {
        let mut chars = name.chars();
        let entity = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
        Self::new(&entity)
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = app_id.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_repo_url(mut self, url: impl Into<String>) -> Self {
        self.repo_url = url.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = created_at.into();
        self
    }

    /// Convert to a `tera::Context` for rendering.
    pub fn to_tera_context(&self) -> Result<tera::Context, RenderError> {
        let value = serde_json::to_value(self)?;
        Ok(tera::Context::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_context_title_cases_entity() {
        let ctx = TemplateContext::for_model("order");
        assert_eq!(ctx.name, "Order");
        assert_eq!(ctx.table_name, "platform_order");
        assert_eq!(ctx.table_id, "tbl_order");
        assert_eq!(ctx.name_upper, "ORDER");
    }

    #[test]
    fn defaults_group_and_timestamp() {
        let ctx = TemplateContext::new("getList");
        assert_eq!(ctx.group, DEFAULT_API_GROUP);
        assert!(ctx.created_at.ends_with('Z'));
    }

    #[test]
    fn tera_context_exposes_fields() {
        let ctx = TemplateContext::new("x").with_app_id("A1");
        let tera_ctx = ctx.to_tera_context().expect("context");
        assert_eq!(
            tera_ctx.get("app_id").and_then(|v| v.as_str()),
            Some("A1")
        );
    }
}
