//! Sequential, memory-bounded processing of whole files.
//!
//! Everything here reads the file front to back through a fixed-size buffer,
//! so memory use depends on the chunk size and the longest line, not on the
//! file size. Transforms write to a caller-supplied writer; pair them with a
//! transaction's staging file to replace the source atomically.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::line_index::decode_line;

/// Chunk size used by [`StreamEditor::with_default_chunk_size`].
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Streaming reader and line transformer for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEditor {
    path: PathBuf,
    chunk_size: usize,
}

impl StreamEditor {
    /// Streams `path` in chunks of `chunk_size` bytes (at least one).
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            path: path.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    /// Streams `path` in [`DEFAULT_CHUNK_SIZE`] chunks.
    #[must_use]
    pub fn with_default_chunk_size(path: impl Into<PathBuf>) -> Self {
        Self::new(path, DEFAULT_CHUNK_SIZE)
    }

    /// File being streamed.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Bytes per chunk.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Lazily yields the file in chunks of at most `chunk_size` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened; read errors are
    /// yielded by the iterator.
    pub fn chunks(&self) -> io::Result<Chunks> {
        Ok(Chunks {
            file: File::open(&self.path)?,
            chunk_size: self.chunk_size,
            done: false,
        })
    }

    /// Lazily yields lines without terminators, decoded as lossy UTF-8.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn lines(&self) -> io::Result<Lines> {
        let file = File::open(&self.path)?;
        Ok(Lines {
            reader: BufReader::with_capacity(self.chunk_size, file),
            buffer: Vec::new(),
        })
    }

    /// Number of lines, counting an unterminated final line.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn count_lines(&self) -> io::Result<usize> {
        let mut count = 0;
        for line in self.lines()? {
            line?;
            count += 1;
        }
        Ok(count)
    }

    /// First `n` lines.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn head(&self, n: usize) -> io::Result<Vec<String>> {
        self.lines()?.take(n).collect()
    }

    /// Last `n` lines, keeping at most `n` in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn tail(&self, n: usize) -> io::Result<Vec<String>> {
        let mut window = VecDeque::with_capacity(n);
        if n == 0 {
            return Ok(Vec::new());
        }
        for line in self.lines()? {
            if window.len() == n {
                window.pop_front();
            }
            window.push_back(line?);
        }
        Ok(window.into())
    }

    /// Lines containing `pattern`, with 1-based line numbers.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn grep(&self, pattern: &str, case_sensitive: bool) -> io::Result<Vec<(usize, String)>> {
        let needle = if case_sensitive {
            pattern.to_owned()
        } else {
            pattern.to_lowercase()
        };
        let mut matches = Vec::new();
        for (number, line) in (1..).zip(self.lines()?) {
            let text = line?;
            let found = if case_sensitive {
                text.contains(&needle)
            } else {
                text.to_lowercase().contains(&needle)
            };
            if found {
                matches.push((number, text));
            }
        }
        Ok(matches)
    }

    /// Writes `transform(line)` for every line to `output`, dropping lines
    /// for which it returns `None`. Returns the number of lines written.
    ///
    /// Each written line is terminated with `\n`.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or writing fails.
    pub fn transform_lines<W, F>(&self, output: W, mut transform: F) -> io::Result<usize>
    where
        W: Write,
        F: FnMut(&str) -> Option<String>,
    {
        let mut writer = BufWriter::with_capacity(self.chunk_size, output);
        let mut written = 0;
        for line in self.lines()? {
            if let Some(replacement) = transform(&line?) {
                write_line(&mut writer, &replacement)?;
                written += 1;
            }
        }
        writer.flush()?;
        Ok(written)
    }

    /// Writes only the lines matching `predicate`. Returns how many were
    /// kept.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or writing fails.
    pub fn filter_lines<W, P>(&self, output: W, mut predicate: P) -> io::Result<usize>
    where
        W: Write,
        P: FnMut(&str) -> bool,
    {
        self.transform_lines(output, |line| predicate(line).then(|| line.to_owned()))
    }

    /// Rewrites the lines `condition` selects, letting both callbacks see
    /// the `context_lines` original lines before the current one. Returns
    /// how many lines were transformed.
    ///
    /// `transform` also receives what it produced for the earlier lines of
    /// the current run of consecutive matches; that run is held in memory
    /// until the next unmatched line. Unselected lines are copied as they
    /// are, and every written line is terminated with `\n`.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or writing fails.
    pub fn process_with_context<W, C, T>(
        &self,
        output: W,
        context_lines: usize,
        mut condition: C,
        mut transform: T,
    ) -> io::Result<usize>
    where
        W: Write,
        C: FnMut(&str, &VecDeque<String>) -> bool,
        T: FnMut(&str, &VecDeque<String>, &[String]) -> String,
    {
        let mut writer = BufWriter::with_capacity(self.chunk_size, output);
        let mut context = VecDeque::with_capacity(context_lines);
        let mut run: Vec<String> = Vec::new();
        let mut transformed = 0;
        for line in self.lines()? {
            let text = line?;
            if condition(&text, &context) {
                let replacement = transform(&text, &context, &run);
                run.push(replacement);
                transformed += 1;
            } else {
                for pending in run.drain(..) {
                    write_line(&mut writer, &pending)?;
                }
                write_line(&mut writer, &text)?;
            }
            if context_lines > 0 {
                if context.len() == context_lines {
                    context.pop_front();
                }
                context.push_back(text);
            }
        }
        for pending in run {
            write_line(&mut writer, &pending)?;
        }
        writer.flush()?;
        Ok(transformed)
    }
}

fn write_line(writer: &mut impl Write, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes())?;
    if line.ends_with('\n') {
        Ok(())
    } else {
        writer.write_all(b"\n")
    }
}

/// Iterator returned by [`StreamEditor::chunks`].
#[derive(Debug)]
pub struct Chunks {
    file: File,
    chunk_size: usize,
    done: bool,
}

impl Iterator for Chunks {
    type Item = io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut chunk = Vec::with_capacity(self.chunk_size);
        let limit = u64::try_from(self.chunk_size).unwrap_or(u64::MAX);
        match (&mut self.file).take(limit).read_to_end(&mut chunk) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(_) => Some(Ok(chunk)),
            Err(error) => {
                self.done = true;
                Some(Err(error))
            }
        }
    }
}

/// Iterator returned by [`StreamEditor::lines`].
#[derive(Debug)]
pub struct Lines {
    reader: BufReader<File>,
    buffer: Vec<u8>,
}

impl Iterator for Lines {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buffer.clear();
        match self.reader.read_until(b'\n', &mut self.buffer) {
            Ok(0) => None,
            Ok(_) => Some(Ok(decode_line(&self.buffer))),
            Err(error) => Some(Err(error)),
        }
    }
}

/// Copies `source` to `dest` in `chunk_size` chunks, passing each through
/// `transform`. Returns the number of bytes written.
///
/// # Errors
///
/// Returns an error if either file cannot be opened, read, or written.
pub fn copy_with_transform<F>(
    source: &Path,
    dest: &Path,
    chunk_size: usize,
    mut transform: F,
) -> io::Result<u64>
where
    F: FnMut(&[u8]) -> Vec<u8>,
{
    let editor = StreamEditor::new(source, chunk_size);
    let mut writer = BufWriter::new(File::create(dest)?);
    let mut written = 0_u64;
    for chunk in editor.chunks()? {
        let transformed = transform(&chunk?);
        writer.write_all(&transformed)?;
        written += u64::try_from(transformed.len()).unwrap_or(u64::MAX);
    }
    writer.flush()?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    use super::*;

    struct Sample {
        dir: TempDir,
        path: PathBuf,
    }

    #[fixture]
    fn sample() -> Sample {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("log.txt");
        fs::write(&path, "alpha\nBeta\ngamma\nbeta max\nepsilon").expect("seed file");
        Sample { dir, path }
    }

    #[rstest]
    fn counts_head_and_tail(sample: Sample) {
        let editor = StreamEditor::new(&sample.path, 4);
        assert_eq!(editor.count_lines().expect("count"), 5);
        assert_eq!(editor.head(2).expect("head"), ["alpha", "Beta"]);
        assert_eq!(editor.tail(2).expect("tail"), ["beta max", "epsilon"]);
        assert_eq!(editor.tail(10).expect("tail").len(), 5);
        assert!(editor.tail(0).expect("tail").is_empty());
    }

    #[rstest]
    #[case::sensitive(true, vec![(4, "beta max")])]
    #[case::insensitive(false, vec![(2, "Beta"), (4, "beta max")])]
    fn grep_reports_one_based_lines(
        sample: Sample,
        #[case] case_sensitive: bool,
        #[case] expected: Vec<(usize, &str)>,
    ) {
        let editor = StreamEditor::with_default_chunk_size(&sample.path);
        let found = editor.grep("beta", case_sensitive).expect("grep");
        let found: Vec<(usize, &str)> = found
            .iter()
            .map(|(number, line)| (*number, line.as_str()))
            .collect();
        assert_eq!(found, expected);
    }

    #[rstest]
    fn transform_drops_and_rewrites_lines(sample: Sample) {
        let editor = StreamEditor::new(&sample.path, 3);
        let mut output = Vec::new();
        let written = editor
            .transform_lines(&mut output, |line| {
                (!line.starts_with('g')).then(|| line.to_uppercase())
            })
            .expect("transform");

        assert_eq!(written, 4);
        assert_eq!(
            String::from_utf8(output).expect("utf-8"),
            "ALPHA\nBETA\nBETA MAX\nEPSILON\n"
        );
    }

    #[rstest]
    fn filter_keeps_matching_lines(sample: Sample) {
        let editor = StreamEditor::new(&sample.path, 16);
        let mut output = Vec::new();
        let kept = editor
            .filter_lines(&mut output, |line| line.contains('a'))
            .expect("filter");
        assert_eq!(kept, 4);
        assert_eq!(
            String::from_utf8(output).expect("utf-8"),
            "alpha\nBeta\ngamma\nbeta max\n"
        );
    }

    #[rstest]
    fn chunks_respect_chunk_size(sample: Sample) {
        let editor = StreamEditor::new(&sample.path, 8);
        let chunks: Vec<Vec<u8>> = editor
            .chunks()
            .expect("open")
            .collect::<io::Result<_>>()
            .expect("read chunks");
        assert!(chunks.iter().all(|chunk| chunk.len() <= 8));
        assert_eq!(chunks.concat(), fs::read(&sample.path).expect("read"));
    }

    #[rstest]
    fn copies_with_chunk_transform(sample: Sample) {
        let dest = sample.dir.path().join("upper.txt");
        let written = copy_with_transform(&sample.path, &dest, 5, <[u8]>::to_ascii_uppercase)
            .expect("copy");

        let copied = fs::read_to_string(&dest).expect("read copy");
        assert_eq!(copied, "ALPHA\nBETA\nGAMMA\nBETA MAX\nEPSILON");
        assert_eq!(written, u64::try_from(copied.len()).expect("length fits"));
    }

    #[rstest]
    fn context_transform_sees_preceding_lines_and_run(sample: Sample) {
        let editor = StreamEditor::new(&sample.path, 4);
        let mut output = Vec::new();
        let transformed = editor
            .process_with_context(
                &mut output,
                2,
                |line, _| line.contains("eta") || line.starts_with('g'),
                |line, context, run| {
                    let before: Vec<&str> = context.iter().map(String::as_str).collect();
                    format!("{line} [{}] #{}", before.join("|"), run.len())
                },
            )
            .expect("process");

        assert_eq!(transformed, 3);
        assert_eq!(
            String::from_utf8(output).expect("utf-8"),
            "alpha\nBeta [alpha] #0\ngamma [alpha|Beta] #1\n\
             beta max [Beta|gamma] #2\nepsilon\n"
        );
    }

    #[rstest]
    #[case::no_context(0, "[]")]
    #[case::wider_than_file(10, "[alpha|Beta|gamma|beta max]")]
    fn context_window_is_bounded(sample: Sample, #[case] width: usize, #[case] seen: &str) {
        let editor = StreamEditor::new(&sample.path, 8);
        let mut output = Vec::new();
        editor
            .process_with_context(
                &mut output,
                width,
                |line, _| line == "epsilon",
                |line, context, _| {
                    let before: Vec<&str> = context.iter().map(String::as_str).collect();
                    format!("{line} [{}]", before.join("|"))
                },
            )
            .expect("process");

        let written = String::from_utf8(output).expect("utf-8");
        assert_eq!(written.lines().last(), Some(format!("epsilon {seen}").as_str()));
    }

    #[rstest]
    fn context_transform_without_matches_copies_lines(sample: Sample) {
        let editor = StreamEditor::new(&sample.path, 8);
        let mut output = Vec::new();
        let transformed = editor
            .process_with_context(&mut output, 1, |_, _| false, |line, _, _| line.to_owned())
            .expect("process");
        assert_eq!(transformed, 0);
        assert_eq!(
            String::from_utf8(output).expect("utf-8"),
            "alpha\nBeta\ngamma\nbeta max\nepsilon\n"
        );
    }

    #[test]
    fn missing_file_fails_to_open() {
        let dir = TempDir::new().expect("create temp dir");
        let editor = StreamEditor::new(dir.path().join("absent"), 8);
        assert!(editor.lines().is_err());
        assert!(editor.chunks().is_err());
    }
}
