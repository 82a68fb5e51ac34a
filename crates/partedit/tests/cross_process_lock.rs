//! Lock exclusion between processes.
//!
//! The test binary re-runs itself with a filter that selects only
//! [`lock_holder_child`]. The child takes the lock on the target named in
//! [`HOLDER_ENV`], signals readiness through a marker file, and keeps the
//! lock for [`HOLD`] before committing.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use partedit::safety::{self, FileTransaction, TransactionError, TransactionOptions};
use tempfile::TempDir;

const HOLDER_ENV: &str = "PARTEDIT_LOCK_HOLDER_TARGET";
const HOLD: Duration = Duration::from_millis(1500);
const STARTUP: Duration = Duration::from_secs(20);

fn ready_marker(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(".ready");
    PathBuf::from(name)
}

fn spawn_holder(target: &Path) -> Child {
    let exe = env::current_exe().expect("locate test binary");
    Command::new(exe)
        .args(["lock_holder_child", "--exact", "--nocapture", "--test-threads=1"])
        .env(HOLDER_ENV, target)
        .stdout(Stdio::null())
        .spawn()
        .expect("spawn lock holder")
}

fn wait_until_ready(child: &mut Child, marker: &Path) {
    let deadline = Instant::now() + STARTUP;
    while !marker.exists() {
        if let Some(status) = child.try_wait().expect("poll lock holder") {
            panic!("lock holder exited before taking the lock: {status}");
        }
        assert!(Instant::now() < deadline, "lock holder never became ready");
        thread::sleep(Duration::from_millis(10));
    }
}

/// Holds the lock when re-invoked by [`other_process_holding_lock_blocks_begin`].
#[test]
fn lock_holder_child() {
    let Some(target) = env::var_os(HOLDER_ENV).map(PathBuf::from) else {
        return;
    };
    let options = TransactionOptions::new().with_timeout(Duration::from_secs(10));
    safety::run(&target, options, |txn| {
        fs::write(ready_marker(&target), b"").expect("write ready marker");
        thread::sleep(HOLD);
        txn.write_staging(b"from child\n")?;
        txn.publish()
    })
    .expect("child transaction commits");
}

#[test]
fn other_process_holding_lock_blocks_begin() {
    let dir = TempDir::new().expect("create temp dir");
    let target = dir.path().join("shared.txt");
    fs::write(&target, "initial\n").expect("seed file");

    let mut child = spawn_holder(&target);
    wait_until_ready(&mut child, &ready_marker(&target));

    let started = Instant::now();
    let contended = FileTransaction::begin(
        &target,
        TransactionOptions::new().with_timeout(Duration::from_millis(200)),
    );
    let waited = started.elapsed();
    let error = contended.expect_err("lock is held by the other process");
    assert!(
        matches!(error, TransactionError::LockTimeout { .. }),
        "unexpected error: {error}"
    );
    assert!(waited < HOLD, "waited {waited:?} for a {HOLD:?} hold");

    let status = child.wait().expect("wait for lock holder");
    assert!(status.success(), "lock holder failed: {status}");

    let txn = FileTransaction::begin(
        &target,
        TransactionOptions::new().with_timeout(Duration::from_secs(1)),
    )
    .expect("lock is free once the holder exits");
    drop(txn.commit());
    assert_eq!(fs::read_to_string(&target).expect("read result"), "from child\n");
}
