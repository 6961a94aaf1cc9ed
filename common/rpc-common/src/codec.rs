//! Line framing: one JSON value per newline-terminated line
//!
//! The codec only moves lines; decoding stays with the caller so that a
//! malformed line can be answered with a parse error instead of tearing
//! down the stream it arrived on.

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Read the next non-empty line, trimmed of its terminator.
///
/// Returns `None` at end of stream. Empty lines are skipped, not errors.
pub async fn read_line<R>(reader: &mut R) -> std::io::Result<Option<String>>
where
    R: AsyncBufReadExt + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            return Ok(Some(trimmed.to_string()));
        }
    }
}

/// Serialize one message, append the line terminator, and flush.
pub async fn write_line<W, T>(writer: &mut W, message: &T) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let encoded = serde_json::to_string(message)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    writer.write_all(encoded.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_write_then_read() {
        let (client, server) = tokio::io::duplex(1024);
        let mut writer = client;
        let mut reader = BufReader::new(server);

        write_line(&mut writer, &json!({"jsonrpc": "2.0", "id": 1}))
            .await
            .unwrap();
        drop(writer);

        let line = read_line(&mut reader).await.unwrap().unwrap();
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["id"], json!(1));

        assert!(read_line(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_lines_skipped() {
        let (mut client, server) = tokio::io::duplex(1024);
        let mut reader = BufReader::new(server);

        tokio::io::AsyncWriteExt::write_all(&mut client, b"\n\n{\"id\":2}\n")
            .await
            .unwrap();
        drop(client);

        let line = read_line(&mut reader).await.unwrap().unwrap();
        assert_eq!(line, "{\"id\":2}");
    }
}
