mod common;

use std::fs;
use std::sync::Arc;

use serde_json::json;

use common::RecordingExecutor;
use serena_cli::config::Settings;
use serena_cli::environment::StaticProbe;
use serena_cli::installer::SerenaManager;
use serena_cli::mcp::ToolDispatchGateway;
use serena_cli::project::config_store::project_config_path;
use serena_cli::project::{ConfigManager, ConfigScope, FsProjectDetector, ProjectDetector, YamlConfigManager};
use serena_cli::tools::serena_registry;

#[test]
fn test_yaml_round_trip() {
    let home = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    let store = YamlConfigManager::with_global_dir(home.path().join(".serena-cli"));

    assert!(store.get_config(ConfigScope::Global, None).unwrap().is_none());

    let global = json!({ "serena": { "preferred_method": "pip" }, "mcp": { "enabled": false } });
    let path = store.save_config(ConfigScope::Global, None, &global).unwrap();
    assert_eq!(path, home.path().join(".serena-cli").join("config.yml"));
    assert_eq!(store.get_config(ConfigScope::Global, None).unwrap(), Some(global));

    let project_config = json!({ "serena": { "enabled": true, "context": "ide-assistant" } });
    let path = store
        .save_config(ConfigScope::Project, Some(project.path()), &project_config)
        .unwrap();
    assert_eq!(path, project_config_path(project.path()));
    assert!(fs::read_to_string(&path).unwrap().contains("enabled: true"));
    assert_eq!(
        store.get_config(ConfigScope::Project, Some(project.path())).unwrap(),
        Some(project_config)
    );
}

#[test]
fn test_project_scope_requires_path() {
    let home = tempfile::tempdir().unwrap();
    let store = YamlConfigManager::with_global_dir(home.path());
    tokio_test::assert_err!(store.config_path(ConfigScope::Project, None));
    tokio_test::assert_ok!(store.config_path(ConfigScope::Global, None));
}

#[test]
fn test_invalid_yaml_is_config_error() {
    let project = tempfile::tempdir().unwrap();
    let path = project_config_path(project.path());
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, "serena: [unclosed").unwrap();

    let store = YamlConfigManager::with_global_dir(project.path().join("home"));
    let err = store.get_config(ConfigScope::Project, Some(project.path())).unwrap_err();
    assert!(err.to_string().contains("configuration error"));
}

#[test]
fn test_detector_reads_real_project() {
    let project = tempfile::tempdir().unwrap();
    fs::write(project.path().join("pyproject.toml"), "[project]\nname = \"demo-app\"\n").unwrap();
    fs::create_dir_all(project.path().join("src")).unwrap();
    fs::write(project.path().join("src").join("main.py"), "print('hi')\n").unwrap();
    fs::create_dir_all(project.path().join(".serena")).unwrap();

    let detector = FsProjectDetector::starting_at(project.path().join("src"));
    let root = detector.detect_current_project().unwrap();
    assert_eq!(root, project.path().canonicalize().unwrap());

    let info = detector.get_project_info(&root).unwrap().unwrap();
    assert_eq!(info.name, "demo-app");
    assert_eq!(info.project_type, "python");
    assert!(info.languages.contains("python"));
    assert!(info.has_serena);
    assert!(!info.has_cli_config);
    assert_eq!(info.size.total_files, 2);

    let json = serde_json::to_value(&info).unwrap();
    assert_eq!(json["type"], "python");
}

#[tokio::test]
async fn test_enable_persists_project_config_on_disk() {
    let home = tempfile::tempdir().unwrap();
    let project = tempfile::tempdir().unwrap();
    fs::write(project.path().join("requirements.txt"), "requests\n").unwrap();

    let manager = Arc::new(SerenaManager::new(
        Settings::default(),
        Arc::new(StaticProbe(common::linux_snapshot("3.11.9"))),
        Arc::new(RecordingExecutor::succeeding(&["uv"])),
        Arc::new(FsProjectDetector::starting_at(project.path())),
        Arc::new(YamlConfigManager::with_global_dir(home.path())),
    ));
    let gateway = ToolDispatchGateway::with_registry(serena_registry(Arc::clone(&manager)).unwrap(), false).unwrap();

    let result = gateway
        .dispatch("serena_enable", json!({ "project_path": project.path() }))
        .await;
    assert!(result.is_success(), "{:?}", result.error);
    assert_eq!(result.payload["installed_with"], "uv");

    let status = gateway
        .dispatch("serena_status", json!({ "project_path": project.path() }))
        .await;
    assert_eq!(status.payload["serena_enabled"], json!(true));
    assert_eq!(status.payload["project"]["has_cli_config"], json!(true));

    let written = fs::read_to_string(project_config_path(project.path())).unwrap();
    assert!(written.contains("installed_with: uv"));
}
