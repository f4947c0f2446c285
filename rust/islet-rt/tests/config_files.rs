//! Loading `islet.toml` files and running with the loaded settings.

use islet_rt::{BusyPolicy, ConfigError, ErrorKind, Runtime, RuntimeConfig};
use std::fs;
use std::path::PathBuf;

struct TempDir(PathBuf);

impl TempDir {
    fn new(tag: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("islet-config-test-{}-{}", tag, std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        TempDir(dir)
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.0.join(name);
        fs::write(&path, content).unwrap();
        path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}

#[test]
fn loads_and_applies_file_config() {
    let dir = TempDir::new("apply");
    let path = dir.write(
        "islet.toml",
        r#"
max_interpreters = 1

[interpreter]
baseline_modules = ["math"]
allowed_modules = ["math"]
busy_policy = "fail-fast"

[interpreter.resource_limits]
max_call_depth = 10
"#,
    );
    let config = RuntimeConfig::load_from(&path).unwrap();
    assert_eq!(config.interpreter.busy_policy, BusyPolicy::FailFast);

    let rt = Runtime::new(config);
    let h = rt.create_interpreter(None).unwrap();
    assert_eq!(h.run_code("print(math.floor(2.5))").output(), "2\n");
    assert_eq!(h.run_code("import json").error_kind(), Some(ErrorKind::RuntimeFault));

    let deep = h.run_code("def down(n):\n    return down(n + 1)\ndown(0)");
    assert_eq!(deep.failure().unwrap().message, "maximum recursion depth exceeded");
    assert!(rt.create_interpreter(None).is_err());
}

#[test]
fn malformed_toml_reports_path() {
    let dir = TempDir::new("malformed");
    let path = dir.write("islet.toml", "max_interpreters = [\n");
    let err = RuntimeConfig::load_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("islet.toml"), "{}", err);
}

#[test]
fn wrong_types_are_parse_errors() {
    let dir = TempDir::new("types");
    let path = dir.write("islet.toml", "[interpreter]\nbusy_policy = \"sometimes\"\n");
    assert!(matches!(RuntimeConfig::load_from(&path), Err(ConfigError::Parse { .. })));
}

#[test]
fn invalid_values_are_rejected_after_parsing() {
    let dir = TempDir::new("invalid");
    let path = dir.write("islet.toml", "[interpreter]\nbaseline_modules = [\"socket\"]\n");
    let err = RuntimeConfig::load_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(ref m) if m.contains("socket")), "{}", err);
}

#[test]
fn empty_file_gives_defaults() {
    let dir = TempDir::new("empty");
    let path = dir.write("islet.toml", "");
    assert_eq!(RuntimeConfig::load_from(&path).unwrap(), RuntimeConfig::default());
}
