// src/lsp/codec.rs - Content-Length framing for JSON-RPC over byte streams

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Upper bound on a single payload so a corrupt header can't make us allocate gigabytes.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

const CONTENT_LENGTH: &str = "content-length";

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
}

/// Reads `Content-Length` framed payloads from an async byte stream.
pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next payload.
    ///
    /// Lines before the `Content-Length` header (blank lines, `Content-Type`, junk left over
    /// from a desynchronized peer) are skipped. Returns `Ok(None)` when the stream ends
    /// cleanly between frames.
    pub async fn read_frame(&mut self) -> Result<Option<Vec<u8>>, FrameError> {
        let length = match self.read_headers().await? {
            Some(length) => length,
            None => return Ok(None),
        };

        if length > MAX_FRAME_BYTES {
            return Err(FrameError::MalformedFrame(format!(
                "Content-Length {} exceeds maximum {}",
                length, MAX_FRAME_BYTES
            )));
        }

        let mut payload = vec![0u8; length];
        self.reader
            .read_exact(&mut payload)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => FrameError::MalformedFrame(format!(
                    "stream closed before {} payload bytes arrived",
                    length
                )),
                _ => FrameError::Io(e),
            })?;
        Ok(Some(payload))
    }

    async fn read_headers(&mut self) -> Result<Option<usize>, FrameError> {
        let mut length: Option<usize> = None;
        let mut line = Vec::new();

        loop {
            line.clear();
            let read = self.reader.read_until(b'\n', &mut line).await?;
            if read == 0 {
                return match length {
                    None => Ok(None),
                    Some(_) => Err(FrameError::MalformedFrame(
                        "stream closed inside frame header".to_string(),
                    )),
                };
            }

            let text = String::from_utf8_lossy(&line);
            let text = text.trim();
            if text.is_empty() {
                if length.is_some() {
                    return Ok(length);
                }
                // Blank line before any header, e.g. the trailer of the previous frame.
                continue;
            }

            if let Some(value) = parse_content_length(text) {
                length = Some(value);
            }
        }
    }
}

/// Parse `Content-Length: <digits>`, ignoring header name case.
fn parse_content_length(line: &str) -> Option<usize> {
    let (name, value) = line.split_once(':')?;
    if !name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
        return None;
    }
    let value = value.trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Writes `Content-Length` framed payloads to an async byte stream.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write `Content-Length: <n>\r\n\r\n<payload>\r\n` and flush.
    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<(), FrameError> {
        let header = format!("Content-Length: {}\r\n\r\n", payload.len());
        self.writer.write_all(header.as_bytes()).await?;
        self.writer.write_all(payload).await?;
        self.writer.write_all(b"\r\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn write_json(&mut self, value: &serde_json::Value) -> Result<(), FrameError> {
        let payload = serde_json::to_vec(value)
            .map_err(|e| FrameError::MalformedFrame(format!("unserializable message: {}", e)))?;
        self.write_frame(&payload).await
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn roundtrip(payload: &[u8]) -> Vec<u8> {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_frame(payload).await.unwrap();
        let bytes = writer.into_inner();
        let mut reader = FrameReader::new(bytes.as_slice());
        reader.read_frame().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_write_frame_layout() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_frame(br#"{"id":1}"#).await.unwrap();
        assert_eq!(
            writer.into_inner(),
            b"Content-Length: 8\r\n\r\n{\"id\":1}\r\n".to_vec()
        );
    }

    #[tokio::test]
    async fn test_roundtrip_with_crlf_and_utf8() {
        let payload = "{\"text\":\"a\r\nb — ü\"}".as_bytes();
        assert_eq!(roundtrip(payload).await, payload);
    }

    #[tokio::test]
    async fn test_consecutive_frames() {
        let mut writer = FrameWriter::new(Vec::new());
        writer.write_frame(b"first").await.unwrap();
        writer.write_frame(b"second").await.unwrap();
        let bytes = writer.into_inner();

        let mut reader = FrameReader::new(bytes.as_slice());
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), b"first");
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), b"second");
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_extra_headers_in_any_order() {
        let input: &[u8] =
            b"Content-Type: application/vscode-jsonrpc\r\nContent-Length: 2\r\nX-Other: 1\r\n\r\n{}";
        let mut reader = FrameReader::new(input);
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), b"{}");
    }

    #[tokio::test]
    async fn test_leading_blank_lines_skipped() {
        let input: &[u8] = b"\r\n\r\ncontent-length: 2\r\n\r\n[]";
        let mut reader = FrameReader::new(input);
        assert_eq!(reader.read_frame().await.unwrap().unwrap(), b"[]");
    }

    #[tokio::test]
    async fn test_eof_mid_payload_is_malformed() {
        let input: &[u8] = b"Content-Length: 10\r\n\r\nabc";
        let mut reader = FrameReader::new(input);
        assert!(matches!(
            reader.read_frame().await,
            Err(FrameError::MalformedFrame(_))
        ));
    }

    #[tokio::test]
    async fn test_eof_mid_header_is_malformed() {
        let input: &[u8] = b"Content-Length: 10\r\n";
        let mut reader = FrameReader::new(input);
        assert!(matches!(
            reader.read_frame().await,
            Err(FrameError::MalformedFrame(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_stream_is_clean_eof() {
        let mut reader = FrameReader::new(&b""[..]);
        assert!(reader.read_frame().await.unwrap().is_none());
    }

    #[test]
    fn test_parse_content_length() {
        assert_eq!(parse_content_length("Content-Length: 42"), Some(42));
        assert_eq!(parse_content_length("CONTENT-LENGTH:7"), Some(7));
        assert_eq!(parse_content_length("Content-Length: -1"), None);
        assert_eq!(parse_content_length("Content-Type: 42"), None);
    }
}
