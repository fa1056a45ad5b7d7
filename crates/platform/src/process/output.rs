//! Line readers for child stdout and stderr

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl OutputStream {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

/// Longest line kept from a child, in bytes; the rest of the line is dropped
pub const MAX_LINE_BYTES: usize = 16 * 1024;

/// One line of child output, without its terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

/// Forward every line of `reader` into `tx` until EOF.
///
/// The channel is bounded, so a slow consumer slows the reader down and
/// the child eventually blocks on a full pipe rather than growing memory.
/// Lines longer than [`MAX_LINE_BYTES`] are truncated. Invalid UTF-8 is
/// replaced, and of a carriage-return rewritten line only the last segment
/// is kept.
pub(crate) fn spawn_reader<R>(
    reader: R,
    stream: OutputStream,
    tx: mpsc::Sender<OutputLine>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut bytes = Vec::with_capacity(256);
        loop {
            match read_capped_line(&mut reader, &mut bytes, MAX_LINE_BYTES).await {
                Ok(true) => {
                    let raw = String::from_utf8_lossy(&bytes);
                    let text = raw
                        .rsplit('\r')
                        .find(|part| !part.is_empty())
                        .unwrap_or_default()
                        .to_string();
                    if tx.send(OutputLine { stream, text }).await.is_err() {
                        break;
                    }
                }
                Ok(false) => break,
                Err(err) => {
                    tracing::debug!(stream = stream.as_str(), error = %err, "output reader stopped");
                    break;
                }
            }
        }
    })
}

/// Read up to the next `\n` into `line`, keeping at most `limit` bytes.
///
/// Returns `false` at EOF with nothing read.
async fn read_capped_line<R>(reader: &mut R, line: &mut Vec<u8>, limit: usize) -> std::io::Result<bool>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();
    let mut read_any = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(read_any);
        }
        read_any = true;

        let newline = available.iter().position(|&b| b == b'\n');
        let chunk = match newline {
            Some(end) => &available[..end],
            None => available,
        };
        let room = limit.saturating_sub(line.len());
        line.extend_from_slice(&chunk[..chunk.len().min(room)]);

        let used = newline.map_or(available.len(), |end| end + 1);
        reader.consume(used);
        if newline.is_some() {
            return Ok(true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reader_splits_lines_and_handles_carriage_returns() {
        let input: &[u8] = b"first\nprogress 10%\rprogress 100%\nno newline";
        let (tx, mut rx) = mpsc::channel(4);
        let task = spawn_reader(input, OutputStream::Stdout, tx);

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line.text);
        }
        task.await.unwrap();

        assert_eq!(lines, ["first", "progress 100%", "no newline"]);
    }

    #[tokio::test]
    async fn overlong_lines_are_truncated() {
        let mut input = vec![b'x'; MAX_LINE_BYTES * 4];
        input.extend_from_slice(b"\nnext\n");
        let (tx, mut rx) = mpsc::channel(4);
        let task = spawn_reader(std::io::Cursor::new(input), OutputStream::Stdout, tx);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.text.len(), MAX_LINE_BYTES);
        assert_eq!(rx.recv().await.unwrap().text, "next");
        assert!(rx.recv().await.is_none());
        task.await.unwrap();
    }

    #[tokio::test]
    async fn reader_replaces_invalid_utf8() {
        let input: &[u8] = b"caf\xff\n";
        let (tx, mut rx) = mpsc::channel(1);
        spawn_reader(input, OutputStream::Stderr, tx);

        let line = rx.recv().await.unwrap();
        assert_eq!(line.stream, OutputStream::Stderr);
        assert!(line.text.starts_with("caf"));
    }
}
