use std::fs;
use std::path::Path;

use httptest::{matchers::*, responders::*, Expectation, Server};
use serde_json::{json, Value};
use tempfile::tempdir;

use repo_updater::commands::{run_sync, SyncOutcome, SyncReport};
use repo_updater::core::config::parse_annotations;
use repo_updater::data::Settings;
use repo_updater::downloader::{resolve_source, SourceUrl};

fn settings_in(dir: &Path) -> Settings {
    Settings {
        config_path: dir.join("origin_repo.ini"),
        output_path: dir.join("myrepo.json"),
        ..Settings::default()
    }
}

fn completed(outcome: SyncOutcome) -> SyncReport {
    match outcome {
        SyncOutcome::Completed(report) => report,
        other => panic!("Expected completed sync, got {:?}", other),
    }
}

fn catalog(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn sync_merges_selected_plugins_and_runs_downloads() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/repo/pluginmaster.json"))
            .times(1)
            .respond_with(status_code(200).body(
                r#"[
                    {"Name": "PluginA", "InternalName": "PluginA", "AssemblyVersion": "2.0.0.0"},
                    {"Name": "Plugin B", "InternalName": "PluginB", "AssemblyVersion": "1.1.0.0"},
                    {"Name": "Unwanted", "AssemblyVersion": "9.9.9.9"},
                ]"#,
            )),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/solo.json"))
            .respond_with(status_code(200).body(r#"{"Name": "Solo", "Description": "单独插件"}"#)),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/files/lib.dll"))
            .respond_with(status_code(200).body(vec![7u8; 64])),
    );

    let dir = tempdir().unwrap();
    let repo_url = server.url_str("/repo/pluginmaster.json");
    let libs = dir.path().join("libs");
    let config = format!(
        "# 插件名\n# PluginA, PluginB\n{repo}\n\n# Solo\n{solo}\n# Absent\n{repo}\n\
         # 从该路径下载 {dll} 到{libs}目录，并且重命名为 Renamed.dll\n",
        repo = repo_url,
        solo = server.url_str("/solo.json"),
        dll = server.url_str("/files/lib.dll"),
        libs = libs.display(),
    );
    let settings = settings_in(dir.path());
    fs::write(&settings.config_path, config).unwrap();
    fs::write(
        &settings.output_path,
        r#"[{"Name": "PluginA", "AssemblyVersion": "1.0.0.0"}, {"Name": "Keep"}]"#,
    )
    .unwrap();

    let report = completed(run_sync(&settings).unwrap());

    assert_eq!(report.found, vec!["PluginA", "PluginB", "Solo"]);
    assert_eq!(report.missing, vec!["Absent"]);
    assert!(report.saved);
    assert_eq!(report.catalog_len, 4);
    assert_eq!(report.downloads.len(), 1);
    assert!(report.downloads[0].is_completed());
    assert_eq!(fs::read(libs.join("Renamed.dll")).unwrap(), vec![7u8; 64]);

    assert_eq!(
        catalog(&settings.output_path),
        json!([
            {"Name": "PluginA", "InternalName": "PluginA", "AssemblyVersion": "2.0.0.0"},
            {"Name": "Keep"},
            {"Name": "Plugin B", "InternalName": "PluginB", "AssemblyVersion": "1.1.0.0"},
            {"Name": "Solo", "Description": "单独插件"}
        ])
    );
    let text = fs::read_to_string(&settings.output_path).unwrap();
    assert!(text.contains("单独插件"));
    assert!(text.starts_with("[\n    {\n        \"Name\""));
}

#[test]
fn sync_twice_is_stable() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/a.json"))
            .times(2)
            .respond_with(status_code(200).body(r#"[{"Name": "A", "v": 1}]"#)),
    );

    let dir = tempdir().unwrap();
    let settings = settings_in(dir.path());
    fs::write(&settings.config_path, format!("# A\n{}\n", server.url_str("/a.json"))).unwrap();

    completed(run_sync(&settings).unwrap());
    let first = fs::read_to_string(&settings.output_path).unwrap();
    completed(run_sync(&settings).unwrap());
    let second = fs::read_to_string(&settings.output_path).unwrap();
    assert_eq!(first, second);
}

#[test]
fn failing_sources_leave_existing_catalog_intact() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/down.json"))
            .respond_with(status_code(503).body("maintenance")),
    );

    let dir = tempdir().unwrap();
    let settings = settings_in(dir.path());
    fs::write(
        &settings.config_path,
        format!(
            "# Released\nhttps://github.com/owner/repo/releases\n# Down\n{}\n",
            server.url_str("/down.json")
        ),
    )
    .unwrap();
    fs::write(&settings.output_path, r#"[{"Name": "Existing"}]"#).unwrap();

    let report = completed(run_sync(&settings).unwrap());
    assert!(report.found.is_empty());
    assert_eq!(report.missing, vec!["Released", "Down"]);
    assert_eq!(catalog(&settings.output_path), json!([{"Name": "Existing"}]));
}

#[test]
fn corrupt_catalog_is_replaced() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/a.json"))
            .respond_with(status_code(200).body(r#"{"InternalName": "OnlyInternal"}"#)),
    );

    let dir = tempdir().unwrap();
    let settings = settings_in(dir.path());
    fs::write(&settings.config_path, format!("# OnlyInternal\n{}\n", server.url_str("/a.json"))).unwrap();
    fs::write(&settings.output_path, "[{\"Name\": ").unwrap();

    let report = completed(run_sync(&settings).unwrap());
    assert_eq!(report.catalog_len, 1);
    assert_eq!(catalog(&settings.output_path), json!([{"InternalName": "OnlyInternal"}]));
}

#[test]
fn downloads_run_once_unless_repeat_requested() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/a.json"))
            .times(2)
            .respond_with(status_code(200).body(r#"{"Name": "A"}"#)),
    );
    // One run without repeat, one with.
    server.expect(
        Expectation::matching(request::method_path("GET", "/f.bin"))
            .times(3)
            .respond_with(status_code(200).body("payload")),
    );

    let dir = tempdir().unwrap();
    let mut settings = settings_in(dir.path());
    let out = dir.path().join("out");
    fs::write(
        &settings.config_path,
        format!(
            "# A\n{}\n# 从该路径下载 {} 到{}目录，并且重命名为 f.bin\n",
            server.url_str("/a.json"),
            server.url_str("/f.bin"),
            out.display()
        ),
    )
    .unwrap();

    assert_eq!(completed(run_sync(&settings).unwrap()).downloads.len(), 1);
    settings.repeat_downloads = true;
    assert_eq!(completed(run_sync(&settings).unwrap()).downloads.len(), 2);
    assert_eq!(fs::read_to_string(out.join("f.bin")).unwrap(), "payload");
}

#[test]
fn structured_manifest_drives_the_same_sync() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/m.json"))
            .respond_with(status_code(200).body(r#"[{"Name": "X"}, {"Name": "Y"}]"#)),
    );

    let dir = tempdir().unwrap();
    let settings = Settings {
        config_path: dir.path().join("sources.toml"),
        ..settings_in(dir.path())
    };
    fs::write(
        &settings.config_path,
        format!("[[source]]\nurl = \"{}\"\nplugins = [\"Y\"]\n", server.url_str("/m.json")),
    )
    .unwrap();

    let report = completed(run_sync(&settings).unwrap());
    assert_eq!(report.found, vec!["Y"]);
    assert_eq!(catalog(&settings.output_path), json!([{"Name": "Y"}]));
}

#[test]
fn invalid_manifest_is_an_error() {
    let dir = tempdir().unwrap();
    let settings = Settings {
        config_path: dir.path().join("sources.toml"),
        ..settings_in(dir.path())
    };
    fs::write(&settings.config_path, "[[source]\n").unwrap();
    assert!(run_sync(&settings).is_err());
    assert!(!settings.output_path.exists());
}

#[test]
fn annotated_tree_link_resolves_to_raw_manifest() {
    let config = parse_annotations("# PluginA\nhttps://example.com/repo/tree/main\n# Trailing\n");
    assert_eq!(config.targets.len(), 1);
    let url = config.url_for("PluginA").unwrap();
    assert_eq!(
        resolve_source(url),
        SourceUrl::Fetch("https://example.com/repo/main/pluginmaster.json".to_string())
    );
}

#[test]
fn unwritable_catalog_still_completes() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("GET", "/a.json"))
            .respond_with(status_code(200).body(r#"{"Name": "A"}"#)),
    );
    server.expect(
        Expectation::matching(request::method_path("GET", "/f.bin"))
            .respond_with(status_code(200).body("payload")),
    );

    let dir = tempdir().unwrap();
    let settings = settings_in(dir.path());
    // A directory where the catalog file should be cannot be written over.
    fs::create_dir(&settings.output_path).unwrap();
    let out = dir.path().join("out");
    fs::write(
        &settings.config_path,
        format!(
            "# A\n{}\n# 从该路径下载 {} 到{}目录，并且重命名为 f.bin\n",
            server.url_str("/a.json"),
            server.url_str("/f.bin"),
            out.display()
        ),
    )
    .unwrap();

    let report = completed(run_sync(&settings).unwrap());
    assert!(!report.saved);
    assert_eq!(report.found, vec!["A"]);
    assert_eq!(report.downloads.len(), 1);
    assert!(report.downloads[0].is_completed());
    assert_eq!(fs::read_to_string(out.join("f.bin")).unwrap(), "payload");
    assert!(settings.output_path.is_dir());
}
