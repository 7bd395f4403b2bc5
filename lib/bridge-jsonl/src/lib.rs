//! JSON-lines endpoints
//!
//! Reference Backend and Integration implementations that exchange one JSON
//! document per line over any tokio reader/writer pair (stdio, files, pipes).

pub mod backend;
pub mod integration;

pub use backend::{BackendFeed, JsonLinesBackend};
pub use integration::{EventLine, IntegrationFeed, JsonLinesIntegration};

use bridge_core::EndpointError;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// Serializes values as newline-terminated JSON onto a shared writer
pub struct LineWriter<W> {
    inner: Mutex<W>,
}

impl<W> LineWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(writer),
        }
    }

    /// Write one line and flush it
    pub async fn write<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), EndpointError> {
        let mut line = serde_json::to_vec(value)?;
        line.push(b'\n');

        let mut writer = self.inner.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_lines_are_newline_terminated() {
        let (client, mut server) = tokio::io::duplex(1024);
        let writer = LineWriter::new(client);

        writer.write(&serde_json::json!({"a": 1})).await.unwrap();
        writer.write(&serde_json::json!({"b": 2})).await.unwrap();
        drop(writer);

        let mut output = String::new();
        server.read_to_string(&mut output).await.unwrap();
        assert_eq!(output, "{\"a\":1}\n{\"b\":2}\n");
    }
}
