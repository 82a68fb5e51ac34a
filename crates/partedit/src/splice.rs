//! Byte-range splicing shared by the line index and the editor facade.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::Path;

/// Writes `source` to `output` with the bytes in `range` replaced.
///
/// The prefix and suffix are streamed, so memory use does not grow with the
/// file size. `range` must lie within the file; callers validate it first.
pub(crate) fn copy_spliced<W: Write>(
    source: &Path,
    range: Range<u64>,
    replacement: &[u8],
    output: W,
) -> io::Result<()> {
    let mut input = File::open(source)?;
    let mut output = BufWriter::new(output);

    let copied = io::copy(&mut (&mut input).take(range.start), &mut output)?;
    if copied != range.start {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "file shrank while splicing",
        ));
    }
    output.write_all(replacement)?;
    input.seek(SeekFrom::Start(range.end))?;
    io::copy(&mut input, &mut output)?;
    output.flush()
}

/// Appends a newline unless `content` already ends with one.
pub(crate) fn terminated(content: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(content.len() + 1);
    bytes.extend_from_slice(content.as_bytes());
    if !content.ends_with('\n') {
        bytes.push(b'\n');
    }
    bytes
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    #[rstest]
    #[case::middle(2..4, b"XY".as_slice(), "abXYef")]
    #[case::grow(1..2, b"1234".as_slice(), "a1234cdef")]
    #[case::delete(0..3, b"".as_slice(), "def")]
    #[case::append(6..6, b"!".as_slice(), "abcdef!")]
    fn splices_range(
        #[case] range: Range<u64>,
        #[case] replacement: &[u8],
        #[case] expected: &str,
    ) {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("bytes.txt");
        fs::write(&path, "abcdef").expect("seed");

        let mut out = Vec::new();
        copy_spliced(&path, range, replacement, &mut out).expect("splice");
        assert_eq!(String::from_utf8(out).expect("utf-8"), expected);
    }

    #[rstest]
    #[case::bare("x", "x\n")]
    #[case::already("x\n", "x\n")]
    #[case::empty("", "\n")]
    fn terminates_lines(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(terminated(input), expected.as_bytes());
    }
}
