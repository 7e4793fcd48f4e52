//! Structural checks for a project tree: required layout, parseable JSON
//! and well-formed workflow graphs.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;
use serde_json::Value;

use tessera_core::project::PROJECT_FILE;
use tessera_core::{Category, FileRecord};

use crate::error::{io_err, SyncError};
use crate::scanner::{ScanScope, Scanner, PROJECT_DIRS};

pub const WORKFLOW_SUFFIX: &str = ".workflow.json";

/// One thing wrong with one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Problem {
    pub path: String,
    pub message: String,
}

impl Problem {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub models: usize,
    pub apis: usize,
    pub pages: usize,
    pub workflows: usize,
    pub problems: Vec<Problem>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

/// A workflow definition found under `workflow/`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowSummary {
    /// The definition's `name`, or the file stem when it has none.
    pub name: String,
    pub path: String,
    pub nodes: usize,
    pub edges: usize,
    pub problems: Vec<String>,
}

/// Check the layout and every definition file under `root`.
///
/// Only an unreadable tree is an error; everything else lands in
/// [`ValidationReport::problems`].
pub fn validate_project(root: &Path) -> Result<ValidationReport, SyncError> {
    let mut report = ValidationReport::default();

    if !root.join(PROJECT_FILE).is_file() {
        report
            .problems
            .push(Problem::new(PROJECT_FILE, "project config missing"));
    }
    for dir in PROJECT_DIRS {
        if !root.join(dir).is_dir() {
            report
                .problems
                .push(Problem::new(format!("{dir}/"), "required directory missing"));
        }
    }

    for record in Scanner::new(root).scope(ScanScope::Project).scan()? {
        count(&mut report, &record);
        if !record.path.ends_with(".json") {
            continue;
        }
        let doc = match read_json(root, &record.path)? {
            Ok(doc) => doc,
            Err(message) => {
                report.problems.push(Problem::new(&record.path, message));
                continue;
            }
        };
        if record.path.ends_with(WORKFLOW_SUFFIX) {
            for message in check_workflow(&doc) {
                report.problems.push(Problem::new(&record.path, message));
            }
        }
    }

    tracing::debug!(
        "validated {}: {} model(s), {} api(s), {} page(s), {} workflow(s), {} problem(s)",
        root.display(),
        report.models,
        report.apis,
        report.pages,
        report.workflows,
        report.problems.len()
    );
    Ok(report)
}

fn count(report: &mut ValidationReport, record: &FileRecord) {
    let path = record.path.as_str();
    match record.category {
        Category::Model if path.ends_with(".define.json") => report.models += 1,
        Category::Api if [".api.js", ".api.py", ".api.go"].iter().any(|s| path.ends_with(s)) => {
            report.apis += 1
        }
        Category::Workflow
            if path.ends_with(WORKFLOW_SUFFIX) || path.ends_with(".bpmn") || path.ends_with(".xml") =>
        {
            report.workflows += 1
        }
        _ if path.starts_with("page/") && path.ends_with(".page.json") => report.pages += 1,
        _ => {}
    }
}

/// Every `*.workflow.json` under `workflow/`, sorted by path, each checked.
pub fn list_workflows(root: &Path) -> Result<Vec<WorkflowSummary>, SyncError> {
    let mut out = Vec::new();
    for record in Scanner::new(root).scope(ScanScope::Project).scan()? {
        if !(record.path.starts_with("workflow/") && record.path.ends_with(WORKFLOW_SUFFIX)) {
            continue;
        }
        let stem = record
            .path
            .rsplit('/')
            .next()
            .and_then(|file| file.strip_suffix(WORKFLOW_SUFFIX))
            .unwrap_or_default()
            .to_string();

        let summary = match read_json(root, &record.path)? {
            Ok(doc) => {
                let workflow = doc.get("workflow");
                let len = |key: &str| {
                    workflow
                        .and_then(|w| w.get(key))
                        .and_then(Value::as_array)
                        .map_or(0, Vec::len)
                };
                WorkflowSummary {
                    name: workflow
                        .and_then(|w| w.get("name"))
                        .and_then(Value::as_str)
                        .filter(|n| !n.trim().is_empty())
                        .map_or_else(|| stem.clone(), str::to_string),
                    path: record.path.clone(),
                    nodes: len("nodes"),
                    edges: len("edges"),
                    problems: check_workflow(&doc),
                }
            }
            Err(message) => WorkflowSummary {
                name: stem,
                path: record.path.clone(),
                nodes: 0,
                edges: 0,
                problems: vec![message],
            },
        };
        out.push(summary);
    }
    Ok(out)
}

/// Problems in one workflow document: a name, exactly one start node, at
/// least one end node, unique node ids and edges between known nodes.
pub fn check_workflow(doc: &Value) -> Vec<String> {
    let Some(workflow) = doc.get("workflow").filter(|w| w.is_object()) else {
        return vec!["missing \"workflow\" object".to_string()];
    };
    let mut problems = Vec::new();

    let named = workflow
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|n| !n.trim().is_empty());
    if !named {
        problems.push("workflow has no name".to_string());
    }

    let nodes = workflow
        .get("nodes")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let mut ids = BTreeSet::new();
    let mut starts = 0;
    let mut ends = 0;
    for node in nodes {
        match node.get("id").and_then(Value::as_str) {
            Some(id) if !ids.insert(id) => problems.push(format!("duplicate node id '{id}'")),
            Some(_) => {}
            None => problems.push("node without an id".to_string()),
        }
        match node.get("type").and_then(Value::as_str) {
            Some("start") => starts += 1,
            Some("end") => ends += 1,
            _ => {}
        }
    }
    match starts {
        0 => problems.push("no start node".to_string()),
        1 => {}
        n => problems.push(format!("{n} start nodes; expected one")),
    }
    if ends == 0 {
        problems.push("no end node".to_string());
    }

    let edges = workflow
        .get("edges")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for edge in edges {
        for end in ["from", "to"] {
            match edge.get(end).and_then(Value::as_str) {
                Some(id) if ids.contains(id) => {}
                Some(id) => problems.push(format!("edge {end} unknown node '{id}'")),
                None => problems.push(format!("edge without '{end}'")),
            }
        }
    }
    problems
}

/// Outer error: the file could not be read. Inner error: it is not JSON.
fn read_json(root: &Path, rel: &str) -> Result<Result<Value, String>, SyncError> {
    let path = root.join(rel);
    let text = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    Ok(serde_json::from_str(&text).map_err(|e| format!("invalid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    fn skeleton() -> TempDir {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), PROJECT_FILE, "{}");
        for dir in PROJECT_DIRS {
            std::fs::create_dir_all(tmp.path().join(dir)).unwrap();
        }
        tmp
    }

    fn good_workflow(name: &str) -> String {
        json!({
            "workflow": {
                "name": name,
                "nodes": [{ "id": "start", "type": "start" }, { "id": "end", "type": "end" }],
                "edges": [{ "from": "start", "to": "end" }]
            }
        })
        .to_string()
    }

    #[test]
    fn empty_skeleton_is_valid() {
        let tmp = skeleton();
        let report = validate_project(tmp.path()).unwrap();
        assert!(report.is_valid(), "{:?}", report.problems);
        assert_eq!(report, ValidationReport::default());
    }

    #[test]
    fn missing_layout_is_reported() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("meta")).unwrap();
        let report = validate_project(tmp.path()).unwrap();
        let paths: Vec<&str> = report.problems.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["tessera.json", "api/", "page/", "workflow/"]);
    }

    #[test]
    fn counts_definitions_not_every_file() {
        let tmp = skeleton();
        write(tmp.path(), "meta/User/User.define.json", "{}");
        write(tmp.path(), "meta/User/User.columns.json", "[]");
        write(tmp.path(), "meta/User/User.view.sql", "select 1");
        write(tmp.path(), "api/user/get.api.js", "x");
        write(tmp.path(), "api/user/list.api.py", "x");
        write(tmp.path(), "page/home/home.page.json", "{}");
        write(tmp.path(), "workflow/leave/leave.workflow.json", &good_workflow("leave"));
        write(tmp.path(), "workflow/legacy.bpmn", "<xml/>");

        let report = validate_project(tmp.path()).unwrap();
        assert!(report.is_valid(), "{:?}", report.problems);
        assert_eq!(
            (report.models, report.apis, report.pages, report.workflows),
            (1, 2, 1, 2)
        );
    }

    #[test]
    fn broken_json_and_workflows_are_problems() {
        let tmp = skeleton();
        write(tmp.path(), "meta/User/User.define.json", "{ nope");
        write(tmp.path(), "workflow/w/w.workflow.json", r#"{"workflow":{"name":""}}"#);

        let report = validate_project(tmp.path()).unwrap();
        assert!(report.problems[0].path.ends_with("User.define.json"));
        assert!(report.problems[0].message.starts_with("invalid JSON"));
        let wf: Vec<&str> = report.problems[1..].iter().map(|p| p.message.as_str()).collect();
        assert_eq!(wf, vec!["workflow has no name", "no start node", "no end node"]);
    }

    #[test]
    fn workflow_graph_checks() {
        let doc = json!({
            "workflow": {
                "name": "x",
                "nodes": [
                    { "id": "s", "type": "start" },
                    { "id": "s", "type": "start" },
                    { "id": "e", "type": "end" }
                ],
                "edges": [{ "from": "s", "to": "ghost" }, { "from": "e" }]
            }
        });
        assert_eq!(
            check_workflow(&doc),
            vec![
                "duplicate node id 's'",
                "2 start nodes; expected one",
                "edge to unknown node 'ghost'",
                "edge without 'to'",
            ]
        );
        assert_eq!(check_workflow(&json!([])), vec!["missing \"workflow\" object"]);
    }

    #[test]
    fn list_workflows_names_and_checks_each() {
        let tmp = skeleton();
        write(tmp.path(), "workflow/b/b.workflow.json", &good_workflow("Approve"));
        write(tmp.path(), "workflow/a/a.workflow.json", "not json");
        write(tmp.path(), "workflow/notes.json", "{}");

        let list = list_workflows(tmp.path()).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "a");
        assert!(list[0].problems[0].starts_with("invalid JSON"));
        assert_eq!(list[1].name, "Approve");
        assert_eq!((list[1].nodes, list[1].edges), (2, 1));
        assert!(list[1].problems.is_empty());
    }
}
