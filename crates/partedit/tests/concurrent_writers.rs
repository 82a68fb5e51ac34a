//! Cross-thread tests for lock exclusion and timeouts.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use partedit::safety::{self, FileTransaction, TransactionError, TransactionOptions};
use partedit::{EditorOptions, FileEditor, RetryPolicy};
use tempfile::TempDir;

const WORK: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy)]
struct Interval {
    writer: usize,
    start: Instant,
    end: Instant,
}

fn seeded(dir: &TempDir) -> PathBuf {
    let path = dir.path().join("shared.txt");
    fs::write(&path, "initial\n").expect("seed file");
    path
}

fn write_exclusively(path: &Path, writer: usize, intervals: &Mutex<Vec<Interval>>) {
    let options = TransactionOptions::new().with_timeout(Duration::from_secs(10));
    safety::run(path, options, |txn| {
        let start = Instant::now();
        txn.write_staging(format!("writer {writer}\n").as_bytes())?;
        thread::sleep(WORK);
        txn.publish()?;
        let end = Instant::now();
        intervals
            .lock()
            .expect("intervals lock")
            .push(Interval { writer, start, end });
        Ok::<_, TransactionError>(())
    })
    .expect("transaction commits");
}

#[test]
fn lock_holders_never_overlap() {
    let dir = TempDir::new().expect("create temp dir");
    let path = seeded(&dir);
    let intervals = Arc::new(Mutex::new(Vec::new()));
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = (0..2)
        .map(|writer| {
            let path = path.clone();
            let intervals = Arc::clone(&intervals);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                write_exclusively(&path, writer, &intervals);
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread");
    }

    let mut recorded = intervals.lock().expect("intervals lock").clone();
    recorded.sort_by_key(|interval| interval.start);
    let [first, second] = recorded.as_slice() else {
        panic!("expected two intervals, got {recorded:?}");
    };
    assert!(
        first.end <= second.start,
        "critical sections overlapped: {first:?} and {second:?}"
    );

    let content = fs::read_to_string(&path).expect("read result");
    assert_eq!(content, format!("writer {}\n", second.writer));
}

#[test]
fn many_editors_serialise_line_appends() {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("log.txt");
    fs::write(&path, "").expect("seed file");
    let writers = 4;
    let per_writer = 5;

    let handles: Vec<_> = (0..writers)
        .map(|writer| {
            let path = path.clone();
            thread::spawn(move || {
                let editor = FileEditor::new(
                    EditorOptions::default().with_lock_timeout(Duration::from_secs(10)),
                );
                for entry in 0..per_writer {
                    editor
                        .safe_edit(&path, |reader, output| {
                            io::copy(reader, output)?;
                            writeln!(output, "{writer}:{entry}")
                        })
                        .expect("append");
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("writer thread");
    }

    let content = fs::read_to_string(&path).expect("read result");
    assert_eq!(content.lines().count(), writers * per_writer);
}

#[test]
fn waiting_transaction_gives_up_at_its_timeout() {
    let dir = TempDir::new().expect("create temp dir");
    let path = seeded(&dir);
    let hold = Duration::from_secs(2);
    let timeout = Duration::from_millis(500);
    let (locked, acquired) = mpsc::channel();

    let holder = {
        let path = path.clone();
        thread::spawn(move || {
            let txn = FileTransaction::begin(&path, TransactionOptions::new())
                .expect("holder acquires lock");
            locked.send(()).expect("signal lock held");
            thread::sleep(hold);
            drop(txn.commit());
        })
    };
    acquired.recv().expect("holder started");

    let started = Instant::now();
    let error = FileTransaction::begin(&path, TransactionOptions::new().with_timeout(timeout))
        .expect_err("lock is held");
    let waited = started.elapsed();

    assert!(matches!(error, TransactionError::LockTimeout { .. }), "{error}");
    assert!(error.is_transient());
    assert!(waited >= timeout, "gave up early after {waited:?}");
    assert!(waited < hold, "waited for the holder: {waited:?}");

    holder.join().expect("holder thread");
    assert_eq!(fs::read_to_string(&path).expect("read"), "initial\n");
}

#[test]
fn waiting_transaction_proceeds_once_released() {
    let dir = TempDir::new().expect("create temp dir");
    let path = seeded(&dir);
    let (locked, acquired) = mpsc::channel();

    let holder = {
        let path = path.clone();
        thread::spawn(move || {
            let txn = FileTransaction::begin(&path, TransactionOptions::new())
                .expect("holder acquires lock");
            locked.send(()).expect("signal lock held");
            thread::sleep(Duration::from_millis(200));
            drop(txn.commit());
        })
    };
    acquired.recv().expect("holder started");

    let editor = FileEditor::new(
        EditorOptions::default()
            .with_lock_timeout(Duration::from_secs(5))
            .with_retry(RetryPolicy::none()),
    );
    editor
        .replace_line(&path, 0, "after release")
        .expect("lock becomes available");

    holder.join().expect("holder thread");
    assert_eq!(fs::read_to_string(&path).expect("read"), "after release\n");
}
