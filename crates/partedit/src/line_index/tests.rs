//! Tests for the line index.

use std::fs;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;

struct Sample {
    _dir: TempDir,
    path: PathBuf,
}

impl Sample {
    fn with(content: &[u8]) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("sample.txt");
        fs::write(&path, content).expect("seed file");
        Self { _dir: dir, path }
    }

    fn read(&self) -> String {
        fs::read_to_string(&self.path).expect("read file")
    }
}

#[fixture]
fn abc() -> Sample {
    Sample::with(b"a\nbb\nccc\n")
}

#[rstest]
fn reads_single_and_ranged_lines(abc: Sample) {
    let index = LineIndex::build(&abc.path).expect("build");
    assert_eq!(index.line_count(), 3);
    assert_eq!(index.get_line(1).expect("line 1"), "bb");
    assert_eq!(index.get_lines(0, 2).expect("lines"), ["a", "bb"]);
    assert_eq!(index.offsets(), [0, 2, 5]);
}

#[rstest]
fn replace_line_rewrites_and_rebuilds(abc: Sample) {
    let mut index = LineIndex::build(&abc.path).expect("build");
    index.replace_line(1, "ZZZZZ").expect("replace");

    assert_eq!(index.get_lines(0, 3).expect("lines"), ["a", "ZZZZZ", "ccc"]);
    assert_eq!(abc.read(), "a\nZZZZZ\nccc\n");
    assert_eq!(index.offsets(), [0, 2, 8]);

    let fresh = LineIndex::build(&abc.path).expect("rebuild");
    assert_eq!(fresh, index);
}

#[rstest]
#[case::empty(b"".as_slice(), 0)]
#[case::single_terminated(b"x\n".as_slice(), 1)]
#[case::trailing_partial(b"x\ny".as_slice(), 2)]
#[case::blank_lines(b"\n\n\n".as_slice(), 3)]
fn counts_lines(#[case] content: &[u8], #[case] expected: usize) {
    let sample = Sample::with(content);
    let index = LineIndex::build(&sample.path).expect("build");
    assert_eq!(index.line_count(), expected);
}

#[rstest]
fn out_of_range_reads_are_rejected(abc: Sample) {
    let index = LineIndex::build(&abc.path).expect("build");
    let error = index.get_line(3).expect_err("past the end");
    assert!(matches!(
        error,
        LineIndexError::OutOfRange {
            line: 3,
            line_count: 3
        }
    ));
}

#[rstest]
#[case::past_end(1, 10, 2)]
#[case::inverted(2, 1, 0)]
#[case::start_past_end(7, 9, 0)]
fn ranged_reads_clip(
    abc: Sample,
    #[case] start: usize,
    #[case] end: usize,
    #[case] expected: usize,
) {
    let index = LineIndex::build(&abc.path).expect("build");
    assert_eq!(index.get_lines(start, end).expect("lines").len(), expected);
}

#[rstest]
fn iteration_is_restartable(abc: Sample) {
    let index = LineIndex::build(&abc.path).expect("build");
    let first: Vec<String> = index
        .iter_lines(1, None)
        .collect::<io::Result<_>>()
        .expect("first pass");
    let second: Vec<String> = index
        .iter_lines(1, None)
        .collect::<io::Result<_>>()
        .expect("second pass");
    assert_eq!(first, ["bb", "ccc"]);
    assert_eq!(first, second);
    assert_eq!(index.iter_lines(0, Some(2)).size_hint(), (2, Some(2)));
}

#[test]
fn missing_file_is_not_found() {
    let dir = TempDir::new().expect("create temp dir");
    let error = LineIndex::build(dir.path().join("absent.txt")).expect_err("missing");
    assert!(matches!(error, LineIndexError::NotFound { .. }));
}

#[test]
fn decodes_crlf_and_invalid_utf8() {
    let sample = Sample::with(b"one\r\ntw\xffo\r\n");
    let index = LineIndex::build(&sample.path).expect("build");
    assert_eq!(index.get_line(0).expect("line 0"), "one");
    assert_eq!(index.get_line(1).expect("line 1"), "tw\u{fffd}o");
}

#[rstest]
fn insert_and_delete_rebuild(abc: Sample) {
    let mut index = LineIndex::build(&abc.path).expect("build");
    index.insert_line(0, "start").expect("insert first");
    index.insert_line(index.line_count(), "end").expect("append");
    assert_eq!(abc.read(), "start\na\nbb\nccc\nend\n");

    index.delete_line(2).expect("delete");
    assert_eq!(abc.read(), "start\na\nccc\nend\n");
    assert_eq!(index.line_count(), 4);

    let error = index.insert_line(9, "nope").expect_err("out of range");
    assert!(matches!(error, LineIndexError::OutOfRange { .. }));
}

#[test]
fn append_after_unterminated_line_starts_new_line() {
    let sample = Sample::with(b"a\nb");
    let mut index = LineIndex::build(&sample.path).expect("build");
    index.insert_line(2, "c").expect("append");
    assert_eq!(sample.read(), "a\nb\nc\n");
}

#[test]
fn replacing_unterminated_last_line_keeps_it_unterminated() {
    let sample = Sample::with(b"a\nb");
    let mut index = LineIndex::build(&sample.path).expect("build");
    index.replace_line(1, "longer").expect("replace");
    assert_eq!(sample.read(), "a\nlonger");
    assert_eq!(index.get_line(1).expect("line 1"), "longer");
}

#[rstest]
fn replace_lines_swaps_a_range(abc: Sample) {
    let mut index = LineIndex::build(&abc.path).expect("build");
    index
        .replace_lines(0, 2, &["x", "y", "z"])
        .expect("replace range");
    assert_eq!(abc.read(), "x\ny\nz\nccc\n");
    assert_eq!(index.byte_range(3).expect("range"), 6..10);
}

#[rstest]
fn failed_mutation_leaves_file_untouched(abc: Sample) {
    let mut index = LineIndex::build(&abc.path).expect("build");
    assert!(index.replace_line(5, "nope").is_err());
    assert_eq!(abc.read(), "a\nbb\nccc\n");
}

#[test]
fn indexes_lines_longer_than_the_read_buffer() {
    let long = "x".repeat(1 << 20);
    let sample = Sample::with(format!("{long}\nshort\n{long}").as_bytes());

    let index = LineIndex::build(&sample.path).expect("build");
    assert_eq!(index.line_count(), 3);
    assert_eq!(index.offsets(), [0, (1 << 20) + 1, (1 << 20) + 7]);
    assert_eq!(index.get_line(1).expect("line 1"), "short");
    assert_eq!(index.get_line(2).expect("line 2").len(), 1 << 20);
}

#[test]
fn trailing_partial_line_is_extended_in_place() {
    let sample = Sample::with(b"one\ntwo");
    let mut index = LineIndex::build(&sample.path).expect("build");
    index.replace_line(0, "uno").expect("replace");
    assert_eq!(sample.read(), "uno\ntwo");
}

#[cfg(unix)]
#[rstest]
#[case::group_readable(0o640)]
#[case::executable(0o755)]
fn rewrite_keeps_file_mode(abc: Sample, #[case] mode: u32) {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(&abc.path, fs::Permissions::from_mode(mode)).expect("set mode");
    let mut index = LineIndex::build(&abc.path).expect("build");
    index.replace_line(1, "mode").expect("replace");

    let actual = fs::metadata(&abc.path).expect("metadata").permissions().mode();
    assert_eq!(actual & 0o777, mode);
    assert_eq!(abc.read(), "a\nmode\nccc\n");
}

mod properties {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn round_trips_line_sequence(
            lines in proptest::collection::vec("[^\r\n]{0,24}", 0..32),
            trailing_newline in any::<bool>(),
        ) {
            let mut content = lines.join("\n");
            if trailing_newline && !lines.is_empty() {
                content.push('\n');
            }
            let sample = Sample::with(content.as_bytes());
            let index = LineIndex::build(&sample.path).expect("build");

            let expected: Vec<&str> = if content.is_empty() {
                Vec::new()
            } else {
                content.strip_suffix('\n').unwrap_or(&content).split('\n').collect()
            };
            let actual = index.get_lines(0, index.line_count()).expect("lines");
            prop_assert_eq!(actual, expected);
        }

        #[test]
        fn replacement_keeps_offsets_consistent(
            original in proptest::collection::vec("[a-z]{0,12}", 1..16),
            replacement in "[a-z]{0,40}",
            pick in any::<prop::sample::Index>(),
        ) {
            let content = format!("{}\n", original.join("\n"));
            let sample = Sample::with(content.as_bytes());
            let mut index = LineIndex::build(&sample.path).expect("build");
            let line = pick.index(index.line_count());

            index.replace_line(line, &replacement).expect("replace");

            let size = fs::metadata(&sample.path).expect("metadata").len();
            let last = index.line_count() - 1;
            prop_assert_eq!(index.byte_range(last).expect("range").end, size);
            prop_assert_eq!(index.line_count(), original.len());
            prop_assert_eq!(index.get_line(line).expect("line"), replacement);
        }
    }
}
