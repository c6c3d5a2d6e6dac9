//! Integration tests for stagecache

mod scenario_tests {
    use stagecache::cache::{CacheOptions, StageCache};
    use stagecache::store::{LocalStore, ObjectStore};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const STAGES: [&str; 3] = ["init", "build", "finish"];
    const BRANCH: &str = "org.test.App/x86_64/master";

    struct Run {
        hits: Vec<&'static str>,
        commits: usize,
    }

    fn open(dir: &Path, hardlinks: bool) -> StageCache {
        StageCache::open(&CacheOptions {
            store_dir: dir.join("cache"),
            app_dir: dir.join("app"),
            branch: BRANCH.to_string(),
            hardlinks,
        })
        .unwrap()
    }

    fn build(dir: &Path, stages: &[&'static str], inputs: &[&str]) -> Run {
        build_with(open(dir, false), stages, inputs)
    }

    /// One build: absorb each stage's input, look up, build and commit on miss
    fn build_with(mut cache: StageCache, stages: &[&'static str], inputs: &[&str]) -> Run {
        let mut run = Run {
            hits: Vec::new(),
            commits: 0,
        };

        for (stage, input) in stages.iter().zip(inputs) {
            cache.checksum_mut().absorb_str(Some(stage));
            cache.checksum_mut().absorb_str(Some(input));

            if cache.lookup(stage).unwrap().is_hit() {
                run.hits.push(stage);
                continue;
            }
            let app = cache.app_dir().to_path_buf();
            fs::create_dir_all(&app).unwrap();
            fs::write(app.join(stage), input).unwrap();
            cache.commit(&format!("stage {}", stage)).unwrap();
            assert!(cache.outstanding_changes().unwrap().is_empty());
            run.commits += 1;
        }

        cache.ensure_checked_out().unwrap();
        cache.collect().unwrap();
        run
    }

    #[test]
    fn rebuild_reuses_unchanged_prefix() {
        let dir = TempDir::new().unwrap();

        let first = build(dir.path(), &STAGES, &["a", "b", "c"]);
        assert!(first.hits.is_empty());
        assert_eq!(first.commits, 3);

        let second = build(dir.path(), &STAGES, &["a", "b", "c"]);
        assert_eq!(second.hits, STAGES.to_vec());
        assert_eq!(second.commits, 0);

        let third = build(dir.path(), &STAGES, &["a", "X", "c"]);
        assert_eq!(third.hits, vec!["init"]);
        assert_eq!(third.commits, 2);

        let app = dir.path().join("app");
        assert_eq!(fs::read_to_string(app.join("init")).unwrap(), "a");
        assert_eq!(fs::read_to_string(app.join("build")).unwrap(), "X");
        assert_eq!(fs::read_to_string(app.join("finish")).unwrap(), "c");
    }

    #[cfg(unix)]
    #[test]
    fn hardlinked_checkouts_share_store_objects() {
        use stagecache::fsutil::link_count;

        let dir = TempDir::new().unwrap();
        let app = dir.path().join("app");

        let first = build_with(open(dir.path(), true), &STAGES, &["a", "b", "c"]);
        assert_eq!(first.commits, 3);
        for stage in STAGES {
            let metadata = fs::metadata(app.join(stage)).unwrap();
            assert!(link_count(&metadata) > 1, "{} is not shared", stage);
        }

        let second = build_with(open(dir.path(), true), &STAGES, &["a", "b", "c"]);
        assert_eq!(second.hits, STAGES.to_vec());
        assert_eq!(second.commits, 0);

        let third = build_with(open(dir.path(), true), &STAGES, &["a", "X", "c"]);
        assert_eq!(third.hits, vec!["init"]);
        assert_eq!(third.commits, 2);
        assert_eq!(fs::read_to_string(app.join("init")).unwrap(), "a");
        assert_eq!(fs::read_to_string(app.join("build")).unwrap(), "X");
        assert_eq!(fs::read_to_string(app.join("finish")).unwrap(), "c");

        // Shared files must not have been rewritten in place
        let store = LocalStore::open(&dir.path().join("cache")).unwrap();
        let init = store.resolve(&format!("{}/init", BRANCH)).unwrap().unwrap();
        let out = dir.path().join("restored");
        store.checkout(&init, &out, Default::default()).unwrap();
        assert_eq!(fs::read_to_string(out.join("init")).unwrap(), "a");
    }

    #[test]
    fn fully_cached_build_restores_working_directory() {
        let dir = TempDir::new().unwrap();
        build(dir.path(), &STAGES, &["a", "b", "c"]);

        fs::remove_dir_all(dir.path().join("app")).unwrap();
        let again = build(dir.path(), &STAGES, &["a", "b", "c"]);
        assert_eq!(again.commits, 0);
        assert_eq!(
            fs::read_to_string(dir.path().join("app/finish")).unwrap(),
            "c"
        );
    }

    #[test]
    fn collect_drops_only_stages_not_looked_up() {
        let dir = TempDir::new().unwrap();
        build(dir.path(), &STAGES, &["a", "b", "c"]);
        build(dir.path(), &["init", "finish"], &["a", "c"]);

        let store = LocalStore::open(&dir.path().join("cache")).unwrap();
        let refs = store.list_refs(BRANCH).unwrap();
        assert!(refs.contains("init"));
        assert!(refs.contains("finish"));
        assert!(!refs.contains("build"));
    }

    #[test]
    fn branches_are_independent() {
        let dir = TempDir::new().unwrap();
        build(dir.path(), &STAGES, &["a", "b", "c"]);

        let mut other = StageCache::open(&CacheOptions {
            store_dir: dir.path().join("cache"),
            app_dir: dir.path().join("other-app"),
            branch: "org.test.Other/x86_64/master".to_string(),
            hardlinks: false,
        })
        .unwrap();
        other.checksum_mut().absorb_str(Some("init"));
        other.checksum_mut().absorb_str(Some("a"));
        assert!(!other.lookup("init").unwrap().is_hit());
        assert!(other.unused_stages().is_empty());
    }
}

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const PIPELINE: &str = r#"
branch = "org.test.Hello/x86_64/master"

[[stage]]
name = "init"
commands = ["mkdir -p files", "echo v1 > files/metadata"]

[[stage]]
name = "build"
commands = ["cp ../hello.txt files/hello.txt"]
inputs = ["hello.txt"]

[[stage]]
name = "finish"
commands = ["echo done > files/done"]
"#;

    fn stagecache(dir: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("stagecache");
        cmd.current_dir(dir)
            .env_remove("STAGECACHE_CACHE_DIR")
            .env("STAGECACHE_CONFIG", dir.join("config.toml"))
            .arg("--cache-dir")
            .arg(dir.join("cache"));
        cmd
    }

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("stagecache.toml"), PIPELINE).unwrap();
        fs::write(dir.path().join("hello.txt"), "hello\n").unwrap();
        dir
    }

    #[test]
    fn help_displays() {
        cargo_bin_cmd!("stagecache")
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("incremental stage build cache"));
    }

    #[test]
    fn version_displays() {
        cargo_bin_cmd!("stagecache")
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("stagecache"));
    }

    #[test]
    fn config_path() {
        let dir = TempDir::new().unwrap();
        stagecache(dir.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let dir = TempDir::new().unwrap();
        stagecache(dir.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"))
            .stdout(predicate::str::contains("shell = \"/bin/sh\""));
    }

    #[test]
    fn config_init_writes_file() {
        let dir = TempDir::new().unwrap();
        stagecache(dir.path())
            .args(["config", "init"])
            .assert()
            .success();
        assert!(dir.path().join("config.toml").exists());
    }

    #[test]
    fn build_then_rebuild_from_cache() {
        let dir = project();

        stagecache(dir.path())
            .arg("build")
            .assert()
            .success()
            .stdout(predicate::str::contains("0 cached, 3 built"));
        assert_eq!(
            fs::read_to_string(dir.path().join("app/files/hello.txt")).unwrap(),
            "hello\n"
        );

        stagecache(dir.path())
            .arg("build")
            .assert()
            .success()
            .stdout(predicate::str::contains("3 cached, 0 built"));

        fs::write(dir.path().join("hello.txt"), "bye\n").unwrap();
        stagecache(dir.path())
            .arg("build")
            .assert()
            .success()
            .stdout(predicate::str::contains("1 cached, 2 built"));
    }

    #[test]
    fn build_json_report() {
        let dir = project();
        let output = stagecache(dir.path())
            .args(["build", "--json"])
            .output()
            .unwrap();
        assert!(output.status.success());

        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["built"], serde_json::json!(["init", "build", "finish"]));
        assert_eq!(report["commits"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn failing_stage_reports_command() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("stagecache.toml"),
            "branch = \"b\"\n[[stage]]\nname = \"init\"\ncommands = [\"false\"]\n",
        )
        .unwrap();

        stagecache(dir.path())
            .arg("build")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Stage init failed"));
    }

    #[test]
    fn changes_between_stages() {
        let dir = project();
        stagecache(dir.path()).arg("build").assert().success();

        stagecache(dir.path())
            .args(["changes", "--json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("files/hello.txt"))
            .stdout(predicate::str::contains("files/done"));
    }

    #[test]
    fn changes_missing_stage() {
        let dir = project();
        stagecache(dir.path()).arg("build").assert().success();

        stagecache(dir.path())
            .args(["changes", "--to", "package"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Ref not found"));
    }

    #[test]
    fn refs_lists_stages() {
        let dir = project();
        stagecache(dir.path()).arg("build").assert().success();

        stagecache(dir.path())
            .arg("refs")
            .assert()
            .success()
            .stdout(predicate::str::contains("init"))
            .stdout(predicate::str::contains("finish"));
    }

    #[test]
    fn gc_prunes() {
        let dir = project();
        stagecache(dir.path())
            .args(["build", "--no-gc"])
            .assert()
            .success();

        stagecache(dir.path())
            .arg("gc")
            .assert()
            .success()
            .stdout(predicate::str::contains("Pruned"));
    }

    #[test]
    fn missing_pipeline() {
        let dir = TempDir::new().unwrap();
        stagecache(dir.path())
            .arg("build")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Pipeline file not found"));
    }

    #[test]
    fn gc_without_store() {
        let dir = TempDir::new().unwrap();
        stagecache(dir.path())
            .arg("gc")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Object store unavailable"));
    }
}
