use std::path::PathBuf;

use tempfile::TempDir;
use tessera_renderer::{ApiScriptKind, ScaffoldKind, TemplateContext, TemplateEngine};

fn fixed(ctx: TemplateContext) -> TemplateContext {
    ctx.with_created_at("2024-05-01T08:00:00Z")
}

#[test]
fn init_renders_repo_into_project_config() {
    let engine = TemplateEngine::new(None).expect("engine");
    let ctx = fixed(TemplateContext::new("crm").with_repo_url("http://localhost:8080/default/crm"));
    let out = engine.render(&ctx, ScaffoldKind::Init).expect("render");

    let paths: Vec<&PathBuf> = out.iter().map(|(p, _)| p).collect();
    assert!(paths.contains(&&PathBuf::from("tessera.json")));
    assert!(paths.contains(&&PathBuf::from("workflow/.gitkeep")));

    let json: serde_json::Value = serde_json::from_str(&out[0].1).expect("json");
    assert_eq!(json["config"]["repo"]["url"], "http://localhost:8080/default/crm");
    assert_eq!(json["meta"]["name"], "crm");
}

#[test]
fn model_files_reference_table_and_app() {
    let engine = TemplateEngine::new(None).expect("engine");
    let ctx = fixed(TemplateContext::for_model("product").with_app_id("A-9"));
    let out = engine.render(&ctx, ScaffoldKind::Model).expect("render");
    assert_eq!(out.len(), 3);

    let define: serde_json::Value = serde_json::from_str(&out[0].1).expect("define json");
    assert_eq!(define["table"]["entityName"], "Product");
    assert_eq!(define["table"]["tableName"], "platform_product");
    assert_eq!(define["meta"]["appId"], "A-9");

    let columns: serde_json::Value = serde_json::from_str(&out[1].1).expect("columns json");
    assert_eq!(columns["columns"][0]["isPrimaryKey"], true);

    assert!(out[2].1.contains("FROM platform_product"));
}

#[test]
fn api_scripts_carry_endpoint_header() {
    let engine = TemplateEngine::new(None).expect("engine");
    for kind in ApiScriptKind::all() {
        let ctx = fixed(TemplateContext::new("getDetail").with_group("user"));
        let out = engine.render(&ctx, ScaffoldKind::Api(*kind)).expect("render");
        assert_eq!(out.len(), 1, "{kind}");
        assert!(
            out[0].1.contains("@path /api/user/getDetail"),
            "{kind} script should carry its path:\n{}",
            out[0].1
        );
    }
}

#[test]
fn description_is_json_escaped() {
    let engine = TemplateEngine::new(None).expect("engine");
    let ctx = fixed(TemplateContext::new("approve").with_description("say \"hi\"\nthen go"));
    let out = engine.render(&ctx, ScaffoldKind::Workflow).expect("render");
    let json: serde_json::Value = serde_json::from_str(&out[0].1).expect("json");
    assert_eq!(json["workflow"]["description"], "say \"hi\"\nthen go");
}

#[test]
fn project_override_replaces_embedded_template() {
    let root = TempDir::new().expect("tempdir");
    let dir = root.path().join(".tessera/templates/API");
    std::fs::create_dir_all(&dir).expect("mkdir");
    std::fs::write(dir.join("api.js.tera"), "// custom {{ name }}\r\n").expect("write");

    let engine = TemplateEngine::for_project(root.path()).expect("engine");
    let ctx = fixed(TemplateContext::new("ping"));
    let out = engine
        .render(&ctx, ScaffoldKind::Api(ApiScriptKind::Js))
        .expect("render");
    assert_eq!(out[0].1, "// custom ping\n");

    // other kinds still use embedded templates
    let page = engine.render(&ctx, ScaffoldKind::Page).expect("page");
    assert!(page[0].1.contains("page_ping"));
}

#[test]
fn non_tera_files_in_override_dir_are_ignored() {
    let root = TempDir::new().expect("tempdir");
    let dir = root.path().join(".tessera/templates");
    std::fs::create_dir_all(&dir).expect("mkdir");
    std::fs::write(dir.join("notes.txt"), "{{ broken").expect("write");
    TemplateEngine::for_project(root.path()).expect("engine ignores non-.tera files");
}

#[test]
fn broken_override_reports_tera_error() {
    let root = TempDir::new().expect("tempdir");
    let dir = root.path().join(".tessera/templates/page");
    std::fs::create_dir_all(&dir).expect("mkdir");
    std::fs::write(dir.join("page.json.tera"), "{% if %}").expect("write");
    let err = TemplateEngine::for_project(root.path())
        .err()
        .expect("broken template must fail");
    assert!(matches!(err, tessera_renderer::RenderError::Tera(_)));
}

#[test]
fn no_crlf_in_any_rendered_output() {
    let engine = TemplateEngine::new(None).expect("engine");
    let ctx = fixed(TemplateContext::new("lineend"));
    for kind in [ScaffoldKind::Init, ScaffoldKind::Model, ScaffoldKind::Page] {
        for (path, content) in engine.render(&ctx, kind).expect("render") {
            assert!(!content.contains('\r'), "{} contains CR", path.display());
        }
    }
}
