//! Integration tests for Skycache

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// Write a config that keeps all state inside `temp`
    fn write_config(temp: &TempDir, backend: &str) -> PathBuf {
        let root = temp.path().display().to_string().replace('\\', "/");
        let config = format!(
            r#"
[shared]
backend = "{backend}"
table_dir = "{root}/shared"
backoff_ms = 1

[local]
dir = "{root}/local"

[users]
dir = "{root}/users"
"#
        );
        let path = temp.path().join("config.toml");
        std::fs::write(&path, config).unwrap();
        path
    }

    fn skycache(config: &PathBuf) -> Command {
        let mut cmd = cargo_bin_cmd!("skycache");
        cmd.arg("--config").arg(config);
        cmd
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("skycache")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Versioned shared cache"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("skycache")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("skycache"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, "file");
        skycache(&config)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, "local");
        skycache(&config)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[shared]").and(predicate::str::contains("\"local\"")));
    }

    #[test]
    fn put_then_get_through_file_table() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, "file");

        skycache(&config)
            .args(["put", "location", "Boulder, Colorado", r#"{"lat": 40.01}"#])
            .assert()
            .success()
            .stdout(predicate::str::contains("location/boulder_ colorado"));

        skycache(&config)
            .args(["get", "location", "boulder, colorado"])
            .assert()
            .success()
            .stdout(predicate::str::contains("40.01"));

        let record = temp.path().join("shared").join("shared-cache.json");
        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(record).unwrap()).unwrap();
        assert_eq!(doc["version"], 1);
    }

    #[test]
    fn put_then_get_through_local_store() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, "local");

        skycache(&config)
            .args(["put", "station", "KBOU", r#"{"name": "Boulder"}"#, "--ttl", "600"])
            .assert()
            .success();

        skycache(&config)
            .args(["get", "station", "kbou"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Boulder"));

        assert!(temp.path().join("local").join("station").join("kbou.json").exists());
    }

    #[test]
    fn remove_then_get_reports_missing() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, "file");

        skycache(&config)
            .args(["put", "zone", "COZ040", "{}"])
            .assert()
            .success();
        skycache(&config)
            .args(["remove", "zone", "COZ040"])
            .assert()
            .success();
        skycache(&config)
            .args(["get", "zone", "COZ040"])
            .assert()
            .success()
            .stderr(predicate::str::contains("No cached entry"));
    }

    #[test]
    fn purge_runs() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, "file");
        skycache(&config)
            .arg("purge")
            .assert()
            .success()
            .stdout(predicate::str::contains("Purged 0 expired entries"));
    }

    #[test]
    fn put_rejects_non_object_payload() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, "file");
        skycache(&config)
            .args(["put", "location", "boulder", "[1, 2]"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("JSON object"));
    }

    #[test]
    fn user_set_and_get() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, "file");

        skycache(&config)
            .args(["user", "set", "user-1", "location", "boulder, colorado"])
            .assert()
            .success();
        skycache(&config)
            .args(["user", "get", "user-1", "location"])
            .assert()
            .success()
            .stdout(predicate::str::contains("boulder, colorado"));
    }

    #[test]
    fn user_set_rejects_wrong_type() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, "file");
        skycache(&config)
            .args(["user", "set", "user-1", "rate", "fast"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid value for user field rate"));
    }

    #[test]
    fn invalid_config_shows_hint() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[shared]\nbackend = \"redis\"\n").unwrap();
        skycache(&path)
            .arg("purge")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"))
            .stderr(predicate::str::contains("Hint:"));
    }
}
