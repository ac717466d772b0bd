//! # Line-Framed TCP Connection
//!
//! Wrapper around a TCP stream carrying the newline-terminated text
//! protocol. The server splits connections so reads and writes can run
//! concurrently; test clients use the combined wrapper directly.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// One control-plane connection with line framing on both directions.
pub struct LineConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl LineConnection {
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: BufReader::new(read_half),
            writer: write_half,
        }
    }

    /// Read one line, without its terminator.
    ///
    /// # Returns
    /// - `Ok(Some(line))`: a complete line arrived
    /// - `Ok(None)`: the peer closed the connection
    /// - `Err`: I/O error
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).await?;
        if n == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    /// Write one line, appending the newline terminator.
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Split into the buffered read half and the raw write half, so a
    /// session can run its read loop and its outbound writer as separate
    /// tasks.
    pub fn into_split(self) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
        (self.reader, self.writer)
    }
}
