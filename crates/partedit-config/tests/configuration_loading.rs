//! Layered configuration loading through `ortho_config`.

use std::ffi::OsString;
use std::fs;
use std::time::Duration;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use ortho_config::OrthoConfig;
use partedit_config::{Config, LogFormat};

#[fixture]
fn temp_dir() -> TempDir {
    match TempDir::new() {
        Ok(dir) => dir,
        Err(error) => panic!("failed to create temporary directory: {error}"),
    }
}

fn load(args: &[&str]) -> Config {
    let args: Vec<OsString> = std::iter::once(OsString::from("partedit"))
        .chain(args.iter().map(OsString::from))
        .collect();
    match Config::load_from_iter(args) {
        Ok(config) => config,
        Err(error) => panic!("configuration failed to load: {error}"),
    }
}

#[rstest]
fn cli_flag_overrides_lock_timeout() {
    let config = load(&["--lock-timeout-ms", "750"]);
    assert_eq!(config.lock_timeout(), Duration::from_millis(750));
}

#[rstest]
fn configuration_file_overrides_defaults(temp_dir: TempDir) {
    let path = temp_dir.path().join("partedit.toml");
    if let Err(error) = fs::write(
        &path,
        "lock_timeout_ms = 1500\nlog_format = \"compact\"\nchunk_size = 4096\n",
    ) {
        panic!("failed to write configuration: {error}");
    }
    let path_arg = path.to_string_lossy().into_owned();
    let config = load(&["--config-path", path_arg.as_str()]);

    assert_eq!(config.lock_timeout(), Duration::from_millis(1500));
    assert_eq!(config.log_format(), LogFormat::Compact);
    assert_eq!(config.chunk_size(), 4096);
}

#[rstest]
fn cli_flag_wins_over_configuration_file(temp_dir: TempDir) {
    let path = temp_dir.path().join("partedit.toml");
    if let Err(error) = fs::write(&path, "lock_timeout_ms = 1500\n") {
        panic!("failed to write configuration: {error}");
    }
    let path_arg = path.to_string_lossy().into_owned();
    let config = load(&[
        "--config-path",
        path_arg.as_str(),
        "--lock-timeout-ms",
        "250",
    ]);

    assert_eq!(config.lock_timeout(), Duration::from_millis(250));
}
