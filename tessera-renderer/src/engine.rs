//! Tera scaffold engine: [`ScaffoldKind`], [`ApiScriptKind`] and
//! [`TemplateEngine`].
//!
//! # Output mapping
//!
//! | Kind       | Output path(s), relative to the project root                  |
//! |------------|---------------------------------------------------------------|
//! | `init`     | `tessera.json`, `README.md`, `.gitignore`, `{meta,api,page,workflow}/.gitkeep` |
//! | `model`    | `meta/<N>/<N>.define.json`, `meta/<N>/<N>.columns.json`, `meta/<N>/<N>.view.sql` |
//! | `api`      | `api/<group>/<name>.api.<js\|py\|go>`                          |
//! | `page`     | `page/<name>/<name>.page.json`                                |
//! | `workflow` | `workflow/<name>/<name>.workflow.json`                        |

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tera::Tera;

use tessera_core::project::STATE_DIR;

use crate::context::TemplateContext;
use crate::error::RenderError;

// ---------------------------------------------------------------------------
// Embedded templates: baked into the binary at compile time via include_str!
// ---------------------------------------------------------------------------

const TPLS: &[(&str, &str)] = &[
    ("init/tessera.json.tera", include_str!("templates/init/tessera.json.tera")),
    ("init/readme.md.tera", include_str!("templates/init/readme.md.tera")),
    ("init/gitignore.tera", include_str!("templates/init/gitignore.tera")),
    ("init/gitkeep.tera", include_str!("templates/init/gitkeep.tera")),
    ("model/define.json.tera", include_str!("templates/model/define.json.tera")),
    ("model/columns.json.tera", include_str!("templates/model/columns.json.tera")),
    ("model/view.sql.tera", include_str!("templates/model/view.sql.tera")),
    ("api/api.js.tera", include_str!("templates/api/api.js.tera")),
    ("api/api.py.tera", include_str!("templates/api/api.py.tera")),
    ("api/api.go.tera", include_str!("templates/api/api.go.tera")),
    ("page/page.json.tera", include_str!("templates/page/page.json.tera")),
    (
        "workflow/workflow.json.tera",
        include_str!("templates/workflow/workflow.json.tera"),
    ),
];

/// Skeleton directories created by `init`.
pub const SKELETON_DIRS: &[&str] = &["meta", "api", "page", "workflow"];

// ---------------------------------------------------------------------------
// Template loading helpers
// ---------------------------------------------------------------------------

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io { path: path.into(), source }
}

fn normalize_template_name(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/").to_lowercase()
}

fn collect_template_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), RenderError> {
    let entries = std::fs::read_dir(dir).map_err(|e| io_err(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let path = entry.path();
        let meta = entry.metadata().map_err(|e| io_err(&path, e))?;
        if meta.is_dir() {
            collect_template_files(&path, out)?;
        } else if meta.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

fn load_user_templates(dir: &Path) -> Result<Vec<(String, String)>, RenderError> {
    if !dir.is_dir() {
        return Ok(vec![]);
    }
    let mut files = Vec::new();
    collect_template_files(dir, &mut files)?;
    let mut templates = Vec::new();
    for path in files {
        if path.extension().and_then(|s| s.to_str()) != Some("tera") {
            continue;
        }
        let rel = path.strip_prefix(dir).unwrap_or(path.as_path());
        let name = normalize_template_name(rel);
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        templates.push((name, contents));
    }
    Ok(templates)
}

fn build_tera(user_template_dir: Option<&Path>) -> Result<Tera, RenderError> {
    let mut templates: HashMap<String, String> = HashMap::new();
    for (name, content) in TPLS {
        templates.insert(normalize_template_name(Path::new(name)), (*content).to_string());
    }
    if let Some(dir) = user_template_dir {
        for (name, content) in load_user_templates(dir)? {
            templates.insert(name, content);
        }
    }

    let mut tera = Tera::default();
    tera.autoescape_on(vec![]);
    tera.add_raw_templates(templates.into_iter().collect::<Vec<_>>())?;
    Ok(tera)
}

/// Reject names that would escape their directory or produce odd paths.
pub fn validate_name(what: &'static str, value: &str) -> Result<(), RenderError> {
    let ok = !value.is_empty()
        && !value.starts_with('.')
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if ok {
        Ok(())
    } else {
        Err(RenderError::InvalidName {
            what,
            value: value.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// ApiScriptKind
// ---------------------------------------------------------------------------

/// Language of an API script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ApiScriptKind {
    #[default]
    Js,
    Python,
    Go,
}

impl ApiScriptKind {
    pub fn all() -> &'static [ApiScriptKind] {
        &[ApiScriptKind::Js, ApiScriptKind::Python, ApiScriptKind::Go]
    }

    pub fn template_name(&self) -> &'static str {
        match self {
            ApiScriptKind::Js => "api/api.js.tera",
            ApiScriptKind::Python => "api/api.py.tera",
            ApiScriptKind::Go => "api/api.go.tera",
        }
    }

    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ApiScriptKind::Js => "js",
            ApiScriptKind::Python => "py",
            ApiScriptKind::Go => "go",
        }
    }
}

impl FromStr for ApiScriptKind {
    type Err = RenderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "js" | "javascript" => Ok(ApiScriptKind::Js),
            "py" | "python" => Ok(ApiScriptKind::Python),
            "go" | "golang" => Ok(ApiScriptKind::Go),
            other => Err(RenderError::UnknownScriptKind(other.to_string())),
        }
    }
}

impl fmt::Display for ApiScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiScriptKind::Js => write!(f, "js"),
            ApiScriptKind::Python => write!(f, "python"),
            ApiScriptKind::Go => write!(f, "go"),
        }
    }
}

// ---------------------------------------------------------------------------
// ScaffoldKind
// ---------------------------------------------------------------------------

/// What to scaffold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScaffoldKind {
    Init,
    Model,
    Api(ApiScriptKind),
    Page,
    Workflow,
}

impl ScaffoldKind {
    /// `(template name, output path relative to the project root)` pairs.
    pub fn outputs(&self, ctx: &TemplateContext) -> Vec<(&'static str, PathBuf)> {
        let name = ctx.name.as_str();
        match self {
            ScaffoldKind::Init => {
                let mut out = vec![
                    ("init/tessera.json.tera", PathBuf::from("tessera.json")),
                    ("init/readme.md.tera", PathBuf::from("README.md")),
                    ("init/gitignore.tera", PathBuf::from(".gitignore")),
                ];
                out.extend(
                    SKELETON_DIRS
                        .iter()
                        .map(|dir| ("init/gitkeep.tera", Path::new(dir).join(".gitkeep"))),
                );
                out
            }
            ScaffoldKind::Model => {
                let dir = Path::new("meta").join(name);
                vec![
                    ("model/define.json.tera", dir.join(format!("{name}.define.json"))),
                    ("model/columns.json.tera", dir.join(format!("{name}.columns.json"))),
                    ("model/view.sql.tera", dir.join(format!("{name}.view.sql"))),
                ]
            }
            ScaffoldKind::Api(kind) => vec![(
                kind.template_name(),
                Path::new("api")
                    .join(&ctx.group)
                    .join(format!("{name}.api.{}", kind.extension())),
            )],
            ScaffoldKind::Page => vec![(
                "page/page.json.tera",
                Path::new("page").join(name).join(format!("{name}.page.json")),
            )],
            ScaffoldKind::Workflow => vec![(
                "workflow/workflow.json.tera",
                Path::new("workflow")
                    .join(name)
                    .join(format!("{name}.workflow.json")),
            )],
        }
    }
}

impl fmt::Display for ScaffoldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaffoldKind::Init => write!(f, "init"),
            ScaffoldKind::Model => write!(f, "model"),
            ScaffoldKind::Api(kind) => write!(f, "api ({kind})"),
            ScaffoldKind::Page => write!(f, "page"),
            ScaffoldKind::Workflow => write!(f, "workflow"),
        }
    }
}

// ---------------------------------------------------------------------------
// TemplateEngine
// ---------------------------------------------------------------------------

/// Tera-based engine for scaffold templates with optional user overrides.
///
/// `user_template_dir` may contain `.tera` files that override embedded
/// defaults under the same relative name (e.g. `api/api.js.tera`).
/// Template names are normalised to lowercase relative paths.
pub struct TemplateEngine {
    tera: Tera,
}

impl TemplateEngine {
    pub fn new(user_template_dir: Option<&Path>) -> Result<Self, RenderError> {
        let tera = build_tera(user_template_dir)?;
        Ok(TemplateEngine { tera })
    }

    /// Engine honouring overrides in `<root>/.tessera/templates/`.
    pub fn for_project(root: &Path) -> Result<Self, RenderError> {
        Self::new(Some(&root.join(STATE_DIR).join("templates")))
    }

    /// Render a single template by name.
    pub fn render_template(
        &self,
        name: &str,
        ctx: &TemplateContext,
    ) -> Result<String, RenderError> {
        let tera_ctx = ctx.to_tera_context()?;
        let content = self.tera.render(name, &tera_ctx)?;
        Ok(content.replace("\r\n", "\n"))
    }

    /// Render every output of `kind`.
    ///
    /// Returns `Vec<(relative_path, rendered_content)>` in a stable order.
    pub fn render(
        &self,
        ctx: &TemplateContext,
        kind: ScaffoldKind,
    ) -> Result<Vec<(PathBuf, String)>, RenderError> {
        validate_name("name", &ctx.name)?;
        if matches!(kind, ScaffoldKind::Api(_)) {
            validate_name("group", &ctx.group)?;
        }

        let tera_ctx = ctx.to_tera_context()?;
        let outputs = kind.outputs(ctx);
        let mut results = Vec::with_capacity(outputs.len());
        for (name, path) in outputs {
            let content = self.tera.render(name, &tera_ctx)?;
            results.push((path, content.replace("\r\n", "\n")));
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(name: &str) -> TemplateContext {
        TemplateContext::new(name)
            .with_app_id("app-1")
            .with_created_at("2024-01-01T00:00:00Z")
    }

    #[test]
    fn engine_new_succeeds() {
        TemplateEngine::new(None).expect("embedded templates should parse");
    }

    #[test]
    fn every_embedded_template_is_reachable() {
        let engine = TemplateEngine::new(None).unwrap();
        let mut used: Vec<&str> = Vec::new();
        let kinds = [
            ScaffoldKind::Init,
            ScaffoldKind::Model,
            ScaffoldKind::Page,
            ScaffoldKind::Workflow,
        ]
        .into_iter()
        .chain(ApiScriptKind::all().iter().map(|k| ScaffoldKind::Api(*k)));
        for kind in kinds {
            let c = ctx("Thing");
            engine.render(&c, kind).unwrap_or_else(|e| panic!("{kind}: {e}"));
            used.extend(kind.outputs(&c).into_iter().map(|(name, _)| name));
        }
        for (name, _) in TPLS {
            assert!(used.contains(name), "template {name} is never rendered");
        }
    }

    #[test]
    fn model_paths_follow_entity_name() {
        let c = TemplateContext::for_model("user");
        let paths: Vec<PathBuf> = ScaffoldKind::Model
            .outputs(&c)
            .into_iter()
            .map(|(_, p)| p)
            .collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("meta/User/User.define.json"),
                PathBuf::from("meta/User/User.columns.json"),
                PathBuf::from("meta/User/User.view.sql"),
            ]
        );
    }

    #[test]
    fn api_path_uses_group_and_extension() {
        let c = ctx("getList").with_group("user");
        let out = ScaffoldKind::Api(ApiScriptKind::Python).outputs(&c);
        assert_eq!(out[0].1, PathBuf::from("api/user/getList.api.py"));
    }

    #[test]
    fn json_outputs_are_valid_json() {
        let engine = TemplateEngine::new(None).unwrap();
        for kind in [
            ScaffoldKind::Init,
            ScaffoldKind::Model,
            ScaffoldKind::Page,
            ScaffoldKind::Workflow,
        ] {
            for (path, content) in engine.render(&ctx("Thing"), kind).unwrap() {
                if path.extension().and_then(|e| e.to_str()) == Some("json") {
                    serde_json::from_str::<serde_json::Value>(&content).unwrap_or_else(|e| {
                        panic!("{} is not valid JSON: {e}\n{content}", path.display())
                    });
                }
            }
        }
    }

    #[test]
    fn init_without_repo_omits_config_section() {
        let engine = TemplateEngine::new(None).unwrap();
        let out = engine.render(&ctx("crm"), ScaffoldKind::Init).unwrap();
        let json: serde_json::Value = serde_json::from_str(&out[0].1).unwrap();
        assert_eq!(json["meta"]["appCode"], "crm");
        assert!(json.get("config").is_none());
    }

    #[test]
    fn rejects_path_like_names() {
        let engine = TemplateEngine::new(None).unwrap();
        for bad in ["", "../x", "a/b", ".hidden"] {
            let err = engine.render(&ctx(bad), ScaffoldKind::Page).expect_err(bad);
            assert!(matches!(err, RenderError::InvalidName { .. }), "{bad}");
        }
        let err = engine
            .render(&ctx("ok").with_group("a/b"), ScaffoldKind::Api(ApiScriptKind::Js))
            .expect_err("group");
        assert!(matches!(err, RenderError::InvalidName { what: "group", .. }));
    }

    #[test]
    fn script_kind_parses_aliases() {
        assert_eq!("javascript".parse::<ApiScriptKind>().unwrap(), ApiScriptKind::Js);
        assert_eq!("PY".parse::<ApiScriptKind>().unwrap(), ApiScriptKind::Python);
        assert!("ruby".parse::<ApiScriptKind>().is_err());
    }
}
