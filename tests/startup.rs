//! Process-level startup tests for the `trickster` binary.

use std::process::Command;
use std::time::Duration;

use tempfile::NamedTempFile;

#[test]
fn test_cache_connect_failure_exits_before_listening() {
    // A regular file cannot be used as the cache directory.
    let blocker = NamedTempFile::new().unwrap();
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();

    let config = format!(
        r#"
[cache]
cache_type = "filesystem"

[cache.filesystem]
cache_path = "{}"

[proxy_server]
listen_address = "127.0.0.1"
listen_port = {port}

[metrics]
listen_address = "127.0.0.1"
listen_port = {metrics_port}
"#,
        blocker.path().join("cache").display(),
        metrics_port = port.wrapping_add(1).max(1),
    );
    let config_file = NamedTempFile::new().unwrap();
    std::fs::write(config_file.path(), config).unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_trickster"))
        .arg("--config")
        .arg(config_file.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(std::net::TcpStream::connect_timeout(
        &([127, 0, 0, 1], port).into(),
        Duration::from_millis(200)
    )
    .is_err());
}

#[test]
fn test_missing_explicit_config_fails() {
    let output = Command::new(env!("CARGO_BIN_EXE_trickster"))
        .arg("--config")
        .arg("/nonexistent/trickster.conf")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("could not load configuration"));
}
