//! Interactive input
//!
//! Snippets span several lines, so a block ends with `Ctrl-]` (0x1D) instead of
//! a newline; the user then presses Enter. A block starting with `/` names a
//! snippet file to load instead of being a snippet itself.

use crate::cli::CliError;
use std::path::Path;
use timebox_core::Snippet;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// `Ctrl-]`, terminates an input block
pub const DELIMITER: u8 = 0x1D;

/// Read one block, without its delimiter and surrounding whitespace
///
/// Returns `None` at end of input. Trailing text without a delimiter still
/// counts as a final block.
pub async fn read_block<R>(reader: &mut R) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let read = reader.read_until(DELIMITER, &mut buf).await?;
    if read == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&DELIMITER) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(&buf).trim().to_string()))
}

/// Forward input blocks into a channel until end of input
///
/// The channel closes when the input ends or cannot be read.
pub fn spawn_reader<R>(input: R) -> mpsc::Receiver<String>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut reader = BufReader::new(input);
        loop {
            match read_block(&mut reader).await {
                Ok(Some(block)) => {
                    if tx.send(block).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("End of input");
                    break;
                }
                Err(e) => {
                    warn!("Failed to read input: {e}");
                    break;
                }
            }
        }
    });
    rx
}

/// Whether a block names a snippet file rather than containing one
#[must_use]
pub fn is_file_reference(block: &str) -> bool {
    block.starts_with('/')
}

/// Turn an input block into a snippet, loading it from disk when it is a path
pub fn resolve_snippet(block: &str) -> Result<Snippet, CliError> {
    if !is_file_reference(block) {
        return Ok(Snippet::new(block));
    }
    let path = Path::new(block);
    info!(path = %path.display(), "Reading snippet from file");
    std::fs::read_to_string(path)
        .map(Snippet::new)
        .map_err(|e| CliError::config(format!("cannot read {}: {e}", path.display())))
}

/// Parse an expected run time in milliseconds
pub fn parse_expected_millis(block: &str) -> Result<f64, CliError> {
    let millis: f64 = block
        .trim()
        .parse()
        .map_err(|_| CliError::config(format!("{block:?} is not a number of milliseconds")))?;
    if !millis.is_finite() || millis < 0.0 {
        return Err(CliError::config(format!(
            "expected time must be a non-negative number of milliseconds, got {block}"
        )));
    }
    Ok(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_blocks_are_split_on_ctrl_bracket() {
        let input: &[u8] = b"package main\nfunc main() {}\n\x1d\n250\x1d\n";
        let mut reader = BufReader::new(input);

        assert_eq!(
            read_block(&mut reader).await.unwrap().as_deref(),
            Some("package main\nfunc main() {}")
        );
        assert_eq!(read_block(&mut reader).await.unwrap().as_deref(), Some("250"));
        // The Enter after the last delimiter is a final empty block
        assert_eq!(read_block(&mut reader).await.unwrap().as_deref(), Some(""));
        assert_eq!(read_block(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unterminated_tail_is_a_block() {
        let input: &[u8] = b"echo tail";
        let mut reader = BufReader::new(input);
        assert_eq!(
            read_block(&mut reader).await.unwrap().as_deref(),
            Some("echo tail")
        );
        assert_eq!(read_block(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reader_channel_closes_at_eof() {
        let input: &[u8] = b"one\x1dtwo\x1d";
        let mut rx = spawn_reader(input);
        assert_eq!(rx.recv().await.as_deref(), Some("one"));
        assert_eq!(rx.recv().await.as_deref(), Some("two"));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_literal_snippet() {
        let snippet = resolve_snippet("fmt.Println(\"OK\")").unwrap();
        assert_eq!(snippet.as_str(), "fmt.Println(\"OK\")");
    }

    #[test]
    fn test_file_reference_is_loaded() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "package main\n").unwrap();
        let block = file.path().to_str().unwrap();
        assert!(is_file_reference(block));
        assert_eq!(resolve_snippet(block).unwrap().as_str(), "package main\n");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(resolve_snippet("/definitely/not/here.go").is_err());
    }

    #[test]
    fn test_expected_millis_parsing() {
        assert!((parse_expected_millis(" 1500.5 ").unwrap() - 1500.5).abs() < f64::EPSILON);
        assert!(parse_expected_millis("0").is_ok());
        assert!(parse_expected_millis("fast").is_err());
        assert!(parse_expected_millis("-1").is_err());
        assert!(parse_expected_millis("inf").is_err());
        assert!(parse_expected_millis("NaN").is_err());
    }
}
