//! End-to-end planning scenarios against maps loaded from YAML

use deltaplan_config::{
    load_inventory_variables, EngineSettings, InventoryLoader, MapLoader, OperationMap,
};
use deltaplan_core::{AvailableVariables, Error, Result};
use deltaplan_plan::{
    ChangeSource, DeployPlanner, OperationGraph, PlanMode, PlanRequest, Resolver,
};
use std::fs;
use tempfile::TempDir;

fn load(text: &str) -> OperationMap {
    MapLoader::new().text("operation_map.yml", text).load().unwrap()
}

const NGINX_WITHOUT_TRIGGER: &str = r#"
- name: generate_nginx_conf
  watch_files: [templates/nginx.conf.j2]
  provides: [web_config]
- name: restart_nginx
  depends_on: [web_config]
"#;

const NGINX_WITH_TRIGGER: &str = r#"
- name: generate_nginx_conf
  watch_files: [templates/nginx.conf.j2]
  provides: [web_config]
  triggers: [restart_nginx]
- name: restart_nginx
  depends_on: [web_config]
"#;

#[test]
fn consumer_is_not_pulled_in_by_a_dependency_alone() {
    let planner = DeployPlanner::default();
    let request = PlanRequest::changes(["templates/nginx.conf.j2"]).unwrap();
    let outcome = planner
        .plan(&load(NGINX_WITHOUT_TRIGGER), &request, &AvailableVariables::new())
        .unwrap();
    assert_eq!(outcome.plan.selectors(), vec!["generate_nginx_conf"]);
}

#[test]
fn trigger_schedules_consumer_after_generator() {
    let planner = DeployPlanner::default();
    let request = PlanRequest::changes(["templates/nginx.conf.j2"]).unwrap();
    let outcome = planner
        .plan(&load(NGINX_WITH_TRIGGER), &request, &AvailableVariables::new())
        .unwrap();
    assert_eq!(
        outcome.plan.selectors(),
        vec!["generate_nginx_conf", "restart_nginx"]
    );
}

#[test]
fn manual_override_pulls_prerequisites() {
    let map = load(NGINX_WITHOUT_TRIGGER);
    let graph = OperationGraph::build(&map).unwrap();
    let plan = Resolver::new(&map, &graph).resolve(["restart_nginx"]).unwrap();
    assert_eq!(plan.selectors(), vec!["generate_nginx_conf", "restart_nginx"]);
}

#[test]
fn cyclic_map_never_yields_a_plan() {
    let map = load(
        r#"
- name: a
  provides: [la]
  depends_on: [lc]
- name: b
  provides: [lb]
  depends_on: [la]
- name: c
  provides: [lc]
  depends_on: [lb]
"#,
    );
    let planner = DeployPlanner::default();
    let err = planner
        .plan(&map, &PlanRequest::full(), &AvailableVariables::new())
        .unwrap_err();

    let path = err.cycle_path().unwrap();
    assert_eq!(path.len(), 4);
    assert_eq!(path.first(), path.last());
    assert!(err.is_structural());
}

#[test]
fn dangling_dependency_blocks_resolution() {
    let map = load("- name: app\n  depends_on: [database]\n");
    let err = DeployPlanner::default()
        .plan(&map, &PlanRequest::full(), &AvailableVariables::new())
        .unwrap_err();
    assert!(matches!(err, Error::DanglingDependency { ref label, .. } if label == "database"));
}

#[test]
fn empty_map_and_empty_change_set_mean_nothing_to_do() {
    let planner = DeployPlanner::default();
    let outcome = planner
        .plan(
            &MapLoader::new().load().unwrap(),
            &PlanRequest::full(),
            &AvailableVariables::new(),
        )
        .unwrap();
    assert!(outcome.plan.is_empty());

    let outcome = planner
        .plan(
            &load(NGINX_WITH_TRIGGER),
            &PlanRequest::changes(Vec::<String>::new()).unwrap(),
            &AvailableVariables::new(),
        )
        .unwrap();
    assert!(outcome.plan.is_empty());
    assert!(outcome.impacted.is_empty());
}

#[test]
fn inline_metadata_and_inventory_drive_a_full_run() {
    let repo = TempDir::new().unwrap();
    let playbooks = repo.path().join("playbooks");
    fs::create_dir_all(&playbooks).unwrap();
    fs::write(
        playbooks.join("web.yml"),
        r#"
- hosts: web
  tasks:
    # deltaplan: {name: render_site, provides: [site], watch_files: ["site/**"], requires_vars: [site_root]}
    - name: Render site
      template: {src: site.j2, dest: /srv/site}
    # deltaplan: {name: reload_web, depends_on: [site], mutation: conditional, requires_vars: [web_service]}
    - name: Reload web server
      service: {name: nginx, state: reloaded}
"#,
    )
    .unwrap();
    fs::write(
        repo.path().join("inventory.yml"),
        "all:\n  vars:\n    site_root: /srv/site\n    web_service: ~\n",
    )
    .unwrap();

    let map = MapLoader::new().inline_directory(&playbooks).load().unwrap();
    let vars = load_inventory_variables(&repo.path().join("inventory.yml")).unwrap();

    let outcome = DeployPlanner::default()
        .plan(
            &map,
            &PlanRequest::operations(["reload_web"]).with_mode(PlanMode::Analyze),
            &vars,
        )
        .unwrap();

    assert_eq!(outcome.plan.selectors(), vec!["render_site", "reload_web"]);
    assert_eq!(outcome.validation.pairs(), vec![("reload_web", "web_service")]);
}

#[test]
fn layered_inventory_satisfies_an_enforced_plan() {
    let repo = TempDir::new().unwrap();
    let write = |relative: &str, content: &str| {
        let path = repo.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    };
    write(
        "ansible/operation_map.yml",
        r#"
- name: render_site
  watch_files: ["site/**"]
  provides: [site]
  triggers: [reload_web]
  requires_vars: [site_root]
- name: reload_web
  depends_on: [site]
  requires_vars: [web_service]
"#,
    );
    write(
        "inventories/prod/hosts",
        "[web]\nweb1\n\n[all:vars]\nsite_root=/srv/site\n",
    );
    write("inventories/prod/group_vars/web.yml", "web_service: ~\n");
    write("inventories/prod/host_vars/web1.yml", "web_service: nginx\n");
    write("inventories/staging/group_vars/all.yml", "site_root: /tmp/staging\n");

    let map = MapLoader::from_settings(&EngineSettings::default(), repo.path())
        .unwrap()
        .load()
        .unwrap();
    let inventory = InventoryLoader::new()
        .inventory(repo.path().join("inventories/prod/hosts"))
        .discover(repo.path());
    assert_eq!(
        inventory.load().unwrap().get("site_root"),
        Some(&serde_json::json!("/srv/site"))
    );

    let request = PlanRequest::changes(["site/index.html"]).unwrap();
    let outcome = DeployPlanner::default()
        .plan(&map, &request, &inventory)
        .unwrap();
    assert_eq!(outcome.plan.selectors(), vec!["render_site", "reload_web"]);
    assert!(outcome.validation.is_ok());
}

struct FakeGit {
    expected_from: &'static str,
}

impl ChangeSource for FakeGit {
    fn changed_files(&self, from: &str, _to: &str) -> Result<Vec<String>> {
        if from == self.expected_from {
            Ok(vec!["templates\\nginx.conf.j2".to_string()])
        } else {
            Err(Error::configuration(format!("unknown revision {from}")))
        }
    }
}

#[test]
fn change_source_errors_propagate() {
    let planner = DeployPlanner::default();
    let map = load(NGINX_WITH_TRIGGER);
    let git = FakeGit {
        expected_from: "v1.2.0",
    };
    let vars = AvailableVariables::new();

    let outcome = planner
        .plan_from_source(&map, &git, "v1.2.0", "HEAD", PlanMode::Enforce, &vars)
        .unwrap();
    assert_eq!(outcome.plan.len(), 2);

    let err = planner
        .plan_from_source(&map, &git, "v0.9.0", "HEAD", PlanMode::Enforce, &vars)
        .unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
}

#[test]
fn outcome_serializes_for_an_orchestrator() {
    let planner = DeployPlanner::default();
    let request = PlanRequest::changes(["templates/nginx.conf.j2"]).unwrap();
    let outcome = planner
        .plan(&load(NGINX_WITH_TRIGGER), &request, &AvailableVariables::new())
        .unwrap();

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["plan"][0]["name"], "generate_nginx_conf");
    assert_eq!(json["plan"][1]["depends_on"][0], "web_config");
    assert!(json["escalation"].is_null());
    assert_eq!(json["fingerprint"].as_str().map(str::len), Some(64));
}
