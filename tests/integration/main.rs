//! Integration tests for lockstep

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    /// Command isolated from the user's config
    fn lockstep(dir: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("lockstep");
        cmd.current_dir(dir)
            .env("LOCKSTEP_CONFIG", dir.join("no-such-config.toml"))
            .env_remove("LOCKSTEP_DESCRIPTOR")
            .env_remove("RUST_LOG");
        cmd
    }

    fn host() -> String {
        let os = match std::env::consts::OS {
            "macos" => "darwin",
            other => other,
        };
        format!("{}-{}", std::env::consts::ARCH, os)
    }

    /// Project with two path inputs, one following the other
    fn project() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        std::fs::create_dir_all(root.join("base")).unwrap();
        std::fs::write(root.join("base/lib.txt"), "base v1").unwrap();
        std::fs::create_dir_all(root.join("tools")).unwrap();
        std::fs::write(root.join("tools/build.sh"), "echo build").unwrap();
        std::fs::create_dir_all(root.join("app/src")).unwrap();
        std::fs::write(
            root.join("app/Cargo.toml"),
            "[package]\nname = \"hello\"\nversion = \"0.1.0\"\n",
        )
        .unwrap();
        std::fs::write(root.join("app/src/main.rs"), "fn main() {}\n").unwrap();

        let descriptor = format!(
            r#"[project]
name = "hello"
source = "app"

[inputs.base]
url = "path:./base"

[inputs.tools]
url = "path:./tools"
follows = {{ base = "base" }}

[platforms]
systems = ["x86_64-linux", "aarch64-darwin", "{}"]

[outputs.package]
builder = "tools"
dependencies = ["base"]

[outputs.dev-shell]
tools = ["cargo", "rustc"]
env = {{ GREETING = "hi" }}
"#,
            host()
        );
        std::fs::write(root.join("lockstep.toml"), descriptor).unwrap();
        temp
    }

    fn read_lock(dir: &Path) -> String {
        std::fs::read_to_string(dir.join("lockstep.lock")).unwrap()
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        lockstep(temp.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("input-locked"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        lockstep(temp.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("lockstep"));
    }

    #[test]
    fn init_creates_descriptor() {
        let temp = TempDir::new().unwrap();
        lockstep(temp.path()).arg("init").assert().success();
        let content = std::fs::read_to_string(temp.path().join("lockstep.toml")).unwrap();
        assert!(content.contains("[inputs.nixpkgs]"));

        lockstep(temp.path())
            .arg("init")
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));
    }

    #[test]
    fn missing_descriptor_hints_init() {
        let temp = TempDir::new().unwrap();
        lockstep(temp.path())
            .arg("platforms")
            .assert()
            .failure()
            .code(1)
            .stderr(predicate::str::contains("lockstep init"));
    }

    #[test]
    fn resolve_is_idempotent() {
        let temp = project();
        lockstep(temp.path()).arg("resolve").assert().success();
        let first = read_lock(temp.path());
        assert!(first.contains("[inputs.base]"));
        assert!(first.contains("[inputs.tools.follows.base]"));

        lockstep(temp.path()).arg("resolve").assert().success();
        assert_eq!(read_lock(temp.path()), first);

        lockstep(temp.path())
            .args(["resolve", "--refresh"])
            .assert()
            .success();
        assert_eq!(read_lock(temp.path()), first);
    }

    #[test]
    fn changed_input_content_needs_update() {
        let temp = project();
        lockstep(temp.path()).arg("resolve").assert().success();
        let first = read_lock(temp.path());

        std::fs::write(temp.path().join("base/lib.txt"), "base v2").unwrap();
        lockstep(temp.path()).arg("resolve").assert().success();
        assert_eq!(read_lock(temp.path()), first);

        lockstep(temp.path())
            .args(["resolve", "--update", "base"])
            .assert()
            .success();
        assert_ne!(read_lock(temp.path()), first);
    }

    #[test]
    fn input_set_changes_lock() {
        let temp = project();
        std::fs::create_dir_all(temp.path().join("base2")).unwrap();
        std::fs::write(temp.path().join("base2/lib.txt"), "other base").unwrap();

        lockstep(temp.path()).arg("resolve").assert().success();
        let first = read_lock(temp.path());

        lockstep(temp.path())
            .args(["input", "set", "base", "path:./base2"])
            .assert()
            .success();
        let descriptor = std::fs::read_to_string(temp.path().join("lockstep.toml")).unwrap();
        assert!(descriptor.contains("path:./base2"));

        lockstep(temp.path())
            .args(["build", "--locked", "x86_64-linux"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("out of date"));

        lockstep(temp.path()).arg("resolve").assert().success();
        let second = read_lock(temp.path());
        assert_ne!(second, first);
        assert!(second.contains("path:./base2"));
    }

    #[test]
    fn input_set_rejects_bad_locator() {
        let temp = project();
        let before = std::fs::read_to_string(temp.path().join("lockstep.toml")).unwrap();
        lockstep(temp.path())
            .args(["input", "set", "base", "ftp://example.com/x"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid locator"));
        let after = std::fs::read_to_string(temp.path().join("lockstep.toml")).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn unresolvable_input_exits_2() {
        let temp = project();
        std::fs::remove_dir_all(temp.path().join("base")).unwrap();
        lockstep(temp.path())
            .arg("resolve")
            .assert()
            .failure()
            .code(2)
            .stderr(predicate::str::contains("Unable to resolve input 'base'"));
        assert!(!temp.path().join("lockstep.lock").exists());
    }

    #[test]
    fn failed_resolve_keeps_previous_lock() {
        let temp = project();
        lockstep(temp.path()).arg("resolve").assert().success();
        let first = read_lock(temp.path());

        std::fs::remove_dir_all(temp.path().join("base")).unwrap();
        lockstep(temp.path())
            .args(["resolve", "--refresh"])
            .assert()
            .failure()
            .code(2);
        assert_eq!(read_lock(temp.path()), first);
    }

    #[test]
    fn build_prints_store_path() {
        let temp = project();
        let output = lockstep(temp.path())
            .args(["build", "x86_64-linux"])
            .assert()
            .success()
            .stdout(predicate::str::starts_with("/lockstep/store/"))
            .stdout(predicate::str::contains("-hello-0.1.0"))
            .get_output()
            .stdout
            .clone();

        // Resolved on first use; second build reuses the lock
        assert!(temp.path().join("lockstep.lock").exists());
        lockstep(temp.path())
            .args(["build", "x86_64-linux", "--locked"])
            .assert()
            .success()
            .stdout(output);
    }

    #[test]
    fn build_differs_per_platform() {
        let temp = project();
        let linux = lockstep(temp.path())
            .args(["build", "x86_64-linux"])
            .output()
            .unwrap()
            .stdout;
        let darwin = lockstep(temp.path())
            .args(["build", "aarch64-darwin"])
            .output()
            .unwrap()
            .stdout;
        assert!(!linux.is_empty());
        assert_ne!(linux, darwin);
    }

    #[test]
    fn build_locked_without_lock_fails() {
        let temp = project();
        lockstep(temp.path())
            .args(["build", "--locked", "x86_64-linux"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("lockstep resolve"));
    }

    #[test]
    fn build_unknown_platform_fails() {
        let temp = project();
        lockstep(temp.path())
            .args(["build", "riscv64-linux"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("riscv64-linux"));
    }

    #[test]
    fn build_all_json() {
        let temp = project();
        let output = lockstep(temp.path())
            .args(["build", "--all", "--format", "json"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
        let built = json.as_object().unwrap();
        assert!(built.contains_key("x86_64-linux"));
        assert!(built.contains_key("aarch64-darwin"));
        assert_eq!(built["x86_64-linux"]["name"], "hello");
    }

    #[test]
    fn platforms_marks_host() {
        let temp = project();
        lockstep(temp.path())
            .args(["platforms", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("x86_64-linux"))
            .stdout(predicate::str::contains("aarch64-darwin"));

        lockstep(temp.path())
            .arg("platforms")
            .assert()
            .success()
            .stdout(predicate::str::contains(format!("{} (host)", host())));
    }

    #[test]
    fn show_json_reports_every_platform() {
        let temp = project();
        let output = lockstep(temp.path())
            .args(["show", "--format", "json"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        let json: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(json["project"], "hello");
        let linux = &json["platforms"]["x86_64-linux"];
        assert_eq!(linux["outputs"]["package"]["kind"], "package");
        assert_eq!(linux["outputs"]["dev-shell"]["kind"], "shell");
        assert!(linux["failures"].as_array().unwrap().is_empty());
    }

    #[test]
    fn show_reports_partial_failure() {
        let temp = project();
        let path = temp.path().join("lockstep.toml");
        let descriptor = std::fs::read_to_string(&path).unwrap();
        let mut descriptor =
            descriptor.replace(r#"tools = ["cargo", "rustc"]"#, r#"tools = ["cargo", "mold"]"#);
        descriptor.push_str("\n[catalog.mold]\nversion = \"2.34.1\"\nplatforms = [\"x86_64-linux\"]\n");
        std::fs::write(&path, descriptor).unwrap();

        lockstep(temp.path())
            .args(["show", "--format", "plain"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("x86_64-linux\tdev-shell"))
            .stderr(predicate::str::contains("'mold' is not available for aarch64-darwin"));
    }

    #[test]
    fn shell_print_exports_environment() {
        let temp = project();
        lockstep(temp.path())
            .args(["shell", "aarch64-darwin", "--print"])
            .assert()
            .success()
            .stdout(predicate::str::contains("export GREETING='hi'"))
            .stdout(predicate::str::contains("export LOCKSTEP_PLATFORM='aarch64-darwin'"))
            .stdout(predicate::str::contains("export PATH='/lockstep/store/"));
    }

    #[test]
    fn shell_runs_command_with_environment() {
        let temp = project();
        lockstep(temp.path())
            .args(["shell", "--", "sh", "-c", "printf '%s' \"$GREETING\""])
            .assert()
            .success()
            .stdout("hi");
    }

    #[test]
    fn shell_propagates_failure() {
        let temp = project();
        lockstep(temp.path())
            .args(["shell", "--", "sh", "-c", "exit 3"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("exited with"));
    }

    #[test]
    fn descriptor_flag_finds_project() {
        let temp = project();
        let elsewhere = TempDir::new().unwrap();
        lockstep(elsewhere.path())
            .args(["--descriptor"])
            .arg(temp.path())
            .args(["platforms", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("x86_64-linux"));
    }

    #[test]
    fn config_path_honors_env() {
        let temp = TempDir::new().unwrap();
        lockstep(temp.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("no-such-config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        lockstep(temp.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[resolve]"));
    }

    #[test]
    fn completions_generate() {
        let temp = TempDir::new().unwrap();
        lockstep(temp.path())
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("lockstep"));
    }
}
