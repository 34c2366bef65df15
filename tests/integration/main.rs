//! Integration tests for setup-rocq

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// Binary with the runner environment stripped and every directory
    /// redirected into `home`
    fn setup_rocq(home: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("setup-rocq");
        cmd.env("HOME", home.path())
            .env("XDG_CONFIG_HOME", home.path().join("config"))
            .env("XDG_STATE_HOME", home.path().join("state"))
            .env("XDG_CACHE_HOME", home.path().join("cache"))
            .env_remove("GITHUB_ACTIONS")
            .env_remove("GITHUB_ENV")
            .env_remove("GITHUB_PATH")
            .env_remove("GITHUB_STATE")
            .env_remove("RUNNER_TOOL_CACHE")
            .env_remove("SETUP_ROCQ_CONFIG")
            .env_remove("INPUT_ROCQ-VERSION")
            .env_remove("INPUT_OPAM-REPOSITORIES")
            .env_remove("INPUT_CACHE-DEPENDENCY-GLOB");
        cmd
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        setup_rocq(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Provision opam and the Rocq prover"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        setup_rocq(&home)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("setup-rocq"));
    }

    #[test]
    fn subcommand_help_lists_inputs() {
        let home = TempDir::new().unwrap();
        setup_rocq(&home)
            .args(["setup", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("--rocq-version"))
            .stdout(predicate::str::contains("--cache-dependency-glob"));
    }

    #[test]
    fn post_without_state_succeeds() {
        let home = TempDir::new().unwrap();
        setup_rocq(&home).arg("post").assert().success();
    }

    #[test]
    fn post_never_fails_on_bad_input() {
        let home = TempDir::new().unwrap();
        setup_rocq(&home)
            .args(["post", "--rocq-version", "a b"])
            .assert()
            .success();
    }

    #[test]
    fn invalid_version_fails_setup() {
        let home = TempDir::new().unwrap();
        setup_rocq(&home)
            .args(["setup", "--rocq-version", "a b"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid rocq-version"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn invalid_version_from_action_input() {
        let home = TempDir::new().unwrap();
        setup_rocq(&home)
            .arg("setup")
            .env("INPUT_ROCQ-VERSION", "8.20/1")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid rocq-version"));
    }

    #[test]
    fn failure_is_annotated_on_actions() {
        let home = TempDir::new().unwrap();
        setup_rocq(&home)
            .args(["setup", "--rocq-version", "a b"])
            .env("GITHUB_ACTIONS", "true")
            .assert()
            .failure()
            .stdout(predicate::str::contains("::error::Invalid rocq-version"));
    }

    #[test]
    fn malformed_config_fails() {
        let home = TempDir::new().unwrap();
        let config = home.path().join("bad.toml");
        std::fs::write(&config, "[rocq\nversion = ").unwrap();

        setup_rocq(&home)
            .args(["setup", "--config"])
            .arg(&config)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn unknown_subcommand_fails() {
        let home = TempDir::new().unwrap();
        setup_rocq(&home).arg("run").assert().failure();
    }
}
