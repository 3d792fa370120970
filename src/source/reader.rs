use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("io error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SourceError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        SourceError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Reads a log file line by line until end of file.
pub struct FileReader {
    path: PathBuf,
    reader: BufReader<File>,
    buf: Vec<u8>,
    lines_read: u64,
}

impl FileReader {
    pub async fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path)
            .await
            .map_err(|e| SourceError::io(path, e))?;

        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            buf: Vec::with_capacity(1024),
            lines_read: 0,
        })
    }

    /// Read the next line, or `None` at end of file.
    /// A final line without a trailing newline is still returned.
    pub async fn next_line(&mut self) -> Result<Option<String>, SourceError> {
        self.buf.clear();
        let bytes_read = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .await
            .map_err(|e| SourceError::io(&self.path, e))?;

        if bytes_read == 0 {
            return Ok(None);
        }

        self.lines_read += 1;
        Ok(Some(decode_line(&self.buf)))
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }
}

/// Decode raw line bytes, dropping the terminator. Invalid UTF-8 is replaced.
pub(crate) fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(&['\n', '\r'][..])
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_reads_all_lines() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "first").unwrap();
        write!(temp_file, "second\r\n").unwrap();
        write!(temp_file, "third without newline").unwrap();
        temp_file.flush().unwrap();

        let mut reader = FileReader::open(temp_file.path()).await.unwrap();
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("first"));
        assert_eq!(reader.next_line().await.unwrap().as_deref(), Some("second"));
        assert_eq!(
            reader.next_line().await.unwrap().as_deref(),
            Some("third without newline")
        );
        assert_eq!(reader.next_line().await.unwrap(), None);
        assert_eq!(reader.lines_read(), 3);
    }

    #[tokio::test]
    async fn test_blank_lines_are_kept() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "a\n\nb\n").unwrap();
        temp_file.flush().unwrap();

        let mut reader = FileReader::open(temp_file.path()).await.unwrap();
        let mut lines = Vec::new();
        while let Some(line) = reader.next_line().await.unwrap() {
            lines.push(line);
        }
        assert_eq!(lines, vec!["a", "", "b"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"ok \xff\xfe end\n").unwrap();
        temp_file.flush().unwrap();

        let mut reader = FileReader::open(temp_file.path()).await.unwrap();
        let line = reader.next_line().await.unwrap().unwrap();
        assert!(line.starts_with("ok "));
        assert!(line.ends_with(" end"));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let result = FileReader::open(Path::new("/nonexistent/logsift/input.log")).await;
        match result {
            Err(SourceError::Io { path, .. }) => {
                assert_eq!(path, PathBuf::from("/nonexistent/logsift/input.log"))
            }
            Ok(_) => panic!("expected an error"),
        }
    }
}
