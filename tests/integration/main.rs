//! Integration tests for art

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use serial_test::serial;
    use std::fs;
    use std::io::Write;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    /// A scratch working directory with its own cache and config path
    struct Workspace {
        temp: TempDir,
    }

    impl Workspace {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            fs::create_dir_all(temp.path().join("work")).unwrap();
            Self { temp }
        }

        fn work(&self) -> PathBuf {
            self.temp.path().join("work")
        }

        fn cache(&self) -> PathBuf {
            self.temp.path().join("cache")
        }

        fn config(&self) -> PathBuf {
            self.temp.path().join("config.toml")
        }

        /// `art` running in the work directory, isolated from the user's setup
        fn art(&self) -> Command {
            let mut cmd = cargo_bin_cmd!("art");
            cmd.current_dir(self.work())
                .env_remove("GITLAB_CI")
                .env_remove("ART_CONFIG")
                .env_remove("ART_CACHE_DIR")
                .arg("--config")
                .arg(self.config())
                .arg("--cache")
                .arg(self.cache());
            cmd
        }

        fn write(&self, relative: &str, contents: &[u8]) {
            let path = self.work().join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, contents).unwrap();
        }

        fn write_config(&self, contents: &str) {
            fs::write(self.config(), contents).unwrap();
        }

        fn cache_archive(&self, project: &str, name: &str, members: &[(&str, &[u8])]) -> PathBuf {
            let path = self.cache().join(project).join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            let mut zip = ZipWriter::new(fs::File::create(&path).unwrap());
            for (member, bytes) in members {
                let options = SimpleFileOptions::default().unix_permissions(0o644);
                zip.start_file(*member, options).unwrap();
                zip.write_all(bytes).unwrap();
            }
            zip.finish().unwrap();
            path
        }
    }

    const LOCK: &str = r#"
- project: group/proj
  ref: main
  job: build
  install:
    build/: out/
  job_id: 42
  files:
    build/a.txt: out/a.txt
    build/sub/b.txt: out/sub/b.txt
"#;

    const ARCHIVE: &[(&str, &[u8])] = &[("build/a.txt", b"alpha"), ("build/sub/b.txt", b"beta")];

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("art")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("install GitLab CI artifacts"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("art")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("art"));
    }

    #[test]
    fn completions_generate() {
        cargo_bin_cmd!("art")
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("_art"));
    }

    #[test]
    fn install_without_lock_suggests_update() {
        let ws = Workspace::new();
        ws.art()
            .arg("install")
            .assert()
            .failure()
            .stderr(predicate::str::contains("artifacts.lock.yml"))
            .stderr(predicate::str::contains("Run: art update"));
    }

    #[test]
    fn install_from_cache_works_offline() {
        let ws = Workspace::new();
        ws.write("artifacts.lock.yml", LOCK.as_bytes());
        ws.cache_archive("group/proj", "42.zip", ARCHIVE);

        // No config file exists, so any attempt to connect would fail
        ws.art().arg("install").assert().success();
        assert_eq!(fs::read(ws.work().join("out/a.txt")).unwrap(), b"alpha");
        assert_eq!(fs::read(ws.work().join("out/sub/b.txt")).unwrap(), b"beta");

        ws.art().arg("install").assert().success();
        assert_eq!(fs::read(ws.work().join("out/a.txt")).unwrap(), b"alpha");
    }

    #[test]
    fn install_json_emits_only_json() {
        let ws = Workspace::new();
        ws.write("artifacts.lock.yml", LOCK.as_bytes());
        ws.cache_archive("group/proj", "42.zip", ARCHIVE);

        let output = ws.art().args(["install", "--json"]).output().unwrap();
        assert!(output.status.success());
        let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(value[0]["project"], "group/proj");
        assert_eq!(value[0]["resolved_id"], "42");
        assert_eq!(value[0]["installed"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn download_skips_cached_archives() {
        let ws = Workspace::new();
        ws.write("artifacts.lock.yml", LOCK.as_bytes());
        ws.cache_archive("group/proj", "42.zip", ARCHIVE);

        ws.art()
            .arg("download")
            .assert()
            .success()
            .stdout(predicate::str::contains("present"));
    }

    #[test]
    fn download_miss_without_config_fails() {
        let ws = Workspace::new();
        ws.write("artifacts.lock.yml", LOCK.as_bytes());

        ws.art()
            .arg("download")
            .assert()
            .failure()
            .stderr(predicate::str::contains("No configuration found"))
            .stderr(predicate::str::contains("art configure"));
    }

    #[test]
    fn clean_dry_run_keeps_files() {
        let ws = Workspace::new();
        ws.write("artifacts.lock.yml", LOCK.as_bytes());
        ws.write("out/a.txt", b"alpha");
        ws.write("out/sub/b.txt", b"beta");

        ws.art().args(["clean", "--dry-run"]).assert().success();
        assert!(ws.work().join("out/a.txt").exists());
        assert!(ws.work().join("out/sub/b.txt").exists());

        ws.art().arg("clean").assert().success();
        assert!(!ws.work().join("out/a.txt").exists());
        assert!(!ws.work().join("out/sub/b.txt").exists());
    }

    #[test]
    fn cache_list_and_purge() {
        let ws = Workspace::new();
        let one = ws.cache_archive("group/one", "1.zip", &[("a", b"a")]);
        let two = ws.cache_archive("other/two", "2.zip", &[("b", b"b")]);

        ws.art()
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("group/one"))
            .stdout(predicate::str::contains("other/two"));

        ws.art()
            .args(["cache", "purge", "group/*", "--dry-run"])
            .assert()
            .success();
        assert!(one.exists());

        ws.art().args(["cache", "purge", "group/*"]).assert().success();
        assert!(!one.exists());
        assert!(two.exists());
    }

    #[test]
    fn cache_purge_unmatched_pattern_fails() {
        let ws = Workspace::new();
        let one = ws.cache_archive("group/one", "1.zip", &[("a", b"a")]);

        ws.art()
            .args(["cache", "purge", "group/*", "typo/*"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("typo/*"));
        assert!(one.exists());
    }

    #[test]
    fn configure_writes_config() {
        let ws = Workspace::new();
        ws.art()
            .args(["configure", "https://gitlab.example.com/", "secret"])
            .assert()
            .success();

        let written = fs::read_to_string(ws.config()).unwrap();
        assert!(written.contains("gitlab_url = \"https://gitlab.example.com/\""));
        assert!(written.contains("token_type = \"private\""));
        assert!(written.contains("token = \"secret\""));
    }

    #[test]
    fn configure_rejects_unknown_token_type() {
        let ws = Workspace::new();
        ws.art()
            .args(["configure", "https://gitlab.example.com/", "-t", "deploy", "x"])
            .assert()
            .failure();
        assert!(!ws.config().exists());
    }

    #[test]
    fn config_with_unknown_token_type_fails() {
        let ws = Workspace::new();
        ws.write_config(
            "gitlab_url = \"https://gitlab.example.com/\"\ntoken_type = \"deploy\"\ntoken = \"x\"\n",
        );
        ws.write("artifacts.lock.yml", LOCK.as_bytes());

        ws.art()
            .arg("download")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown token type: deploy"));
    }

    #[test]
    fn update_rejects_job_token() {
        let ws = Workspace::new();
        ws.write_config(
            "gitlab_url = \"https://gitlab.example.com/\"\ntoken_type = \"job\"\ntoken = \"x\"\n",
        );
        ws.write(
            "artifacts.yml",
            b"- project: group/proj\n  ref: main\n  job: build\n  install:\n    .: out/\n",
        );

        ws.art()
            .arg("update")
            .assert()
            .failure()
            .stderr(predicate::str::contains("job token"));
    }

    #[test]
    fn update_rejects_extraction_before_configuration() {
        let ws = Workspace::new();
        ws.write(
            "artifacts.yml",
            b"- project: group/proj\n  ref: main\n  job: build\n  extract: false\n  install:\n    x: y\n",
        );

        ws.art()
            .arg("update")
            .assert()
            .failure()
            .stderr(predicate::str::contains("requires extraction"));
        assert!(!ws.work().join("artifacts.lock.yml").exists());
    }

    #[test]
    #[serial]
    fn ci_environment_uses_local_cache() {
        let ws = Workspace::new();
        ws.write("artifacts.lock.yml", LOCK.as_bytes());
        let archive = ws.cache_archive("group/proj", "42.zip", ARCHIVE);
        let local = ws.work().join(".art-cache/group/proj");
        fs::create_dir_all(&local).unwrap();
        fs::copy(archive, local.join("42.zip")).unwrap();

        cargo_bin_cmd!("art")
            .current_dir(ws.work())
            .env_remove("ART_CACHE_DIR")
            .env("GITLAB_CI", "true")
            .env("CI_JOB_TOKEN", "x")
            .env("CI_PROJECT_URL", "https://gitlab.example.com/group/proj")
            .env("CI_PROJECT_PATH", "group/proj")
            .arg("--config")
            .arg(ws.config())
            .arg("download")
            .assert()
            .success()
            .stdout(predicate::str::contains("present"));
    }
}
