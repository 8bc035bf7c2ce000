//! Message sources: one ordered stream per partition.
//!
//! Subscription and transport mechanics live outside the core; a source only
//! has to hand over messages in arrival order and accept offset commits.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// One raw message as delivered by the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub partition: u32,
    pub offset: u64,
    /// `None` for a tombstone / empty message.
    pub payload: Option<Vec<u8>>,
}

#[async_trait::async_trait]
pub trait MessageSource: Send {
    fn partition(&self) -> u32;

    /// Next message in arrival order; `None` once the stream has ended.
    async fn next_message(&mut self) -> Result<Option<InboundMessage>>;

    /// Record that everything up to and including `offset` was handled.
    async fn commit(&mut self, offset: u64) -> Result<()> {
        let _ = offset;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ChannelSource
// ---------------------------------------------------------------------------

/// Producer half of a [`ChannelSource`]. Assigns offsets in push order.
#[derive(Debug, Clone)]
pub struct PartitionSender {
    partition: u32,
    tx: mpsc::Sender<InboundMessage>,
    next_offset: Arc<AtomicU64>,
}

impl PartitionSender {
    pub fn partition(&self) -> u32 {
        self.partition
    }

    /// Enqueue a payload; waits while the queue is full. Returns the offset
    /// assigned to the message.
    pub async fn send(&self, payload: Option<Vec<u8>>) -> Result<u64> {
        // Reserve before numbering so offsets match queue order even with
        // concurrent senders.
        let permit = self
            .tx
            .reserve()
            .await
            .with_context(|| format!("partition {} worker has stopped", self.partition))?;
        let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
        permit.send(InboundMessage {
            partition: self.partition,
            offset,
            payload,
        });
        Ok(offset)
    }
}

/// In-process partition stream backed by a bounded tokio channel.
#[derive(Debug)]
pub struct ChannelSource {
    partition: u32,
    rx: mpsc::Receiver<InboundMessage>,
    committed: Option<u64>,
}

impl ChannelSource {
    pub fn new(partition: u32, capacity: usize) -> (PartitionSender, ChannelSource) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let sender = PartitionSender {
            partition,
            tx,
            next_offset: Default::default(),
        };
        (
            sender,
            ChannelSource {
                partition,
                rx,
                committed: None,
            },
        )
    }

    pub fn committed(&self) -> Option<u64> {
        self.committed
    }
}

#[async_trait::async_trait]
impl MessageSource for ChannelSource {
    fn partition(&self) -> u32 {
        self.partition
    }

    async fn next_message(&mut self) -> Result<Option<InboundMessage>> {
        Ok(self.rx.recv().await)
    }

    async fn commit(&mut self, offset: u64) -> Result<()> {
        self.committed = Some(offset);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JsonLinesSource
// ---------------------------------------------------------------------------

/// Replays a file holding one payload per line. Line number (0-based) is the
/// offset; blank lines are delivered as empty payloads. Lines are passed on as
/// raw bytes, so a line that is not UTF-8 reaches the decoder as a malformed
/// payload instead of ending the replay.
pub struct JsonLinesSource {
    path: PathBuf,
    partition: u32,
    reader: BufReader<File>,
    buf: Vec<u8>,
    next_offset: u64,
}

impl JsonLinesSource {
    pub async fn open(path: impl AsRef<Path>, partition: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .await
            .with_context(|| format!("failed to open replay file: {}", path.display()))?;
        Ok(Self {
            path,
            partition,
            reader: BufReader::new(file),
            buf: Vec::new(),
            next_offset: 0,
        })
    }
}

#[async_trait::async_trait]
impl MessageSource for JsonLinesSource {
    fn partition(&self) -> u32 {
        self.partition
    }

    async fn next_message(&mut self) -> Result<Option<InboundMessage>> {
        self.buf.clear();
        let n = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .await
            .with_context(|| format!("read failed: {}", self.path.display()))?;
        if n == 0 {
            return Ok(None);
        }
        let offset = self.next_offset;
        self.next_offset += 1;
        let trimmed = trim_ascii_whitespace(&self.buf);
        Ok(Some(InboundMessage {
            partition: self.partition,
            offset,
            payload: (!trimmed.is_empty()).then(|| trimmed.to_vec()),
        }))
    }
}

fn trim_ascii_whitespace(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn channel_assigns_offsets_in_push_order() {
        let (tx, mut src) = ChannelSource::new(3, 8);
        assert_eq!(tx.send(Some(b"a".to_vec())).await.unwrap(), 0);
        assert_eq!(tx.send(None).await.unwrap(), 1);
        drop(tx);

        let m0 = src.next_message().await.unwrap().unwrap();
        assert_eq!((m0.partition, m0.offset), (3, 0));
        assert_eq!(m0.payload.as_deref(), Some(&b"a"[..]));

        let m1 = src.next_message().await.unwrap().unwrap();
        assert_eq!(m1.payload, None);

        assert!(src.next_message().await.unwrap().is_none());
        src.commit(1).await.unwrap();
        assert_eq!(src.committed(), Some(1));
    }

    #[tokio::test]
    async fn json_lines_yields_one_message_per_line() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        writeln!(f, "{{\"type\":\"x\"}}").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "  {{\"type\":\"y\"}}  ").unwrap();

        let mut src = JsonLinesSource::open(f.path(), 0).await.unwrap();
        let a = src.next_message().await.unwrap().unwrap();
        let b = src.next_message().await.unwrap().unwrap();
        let c = src.next_message().await.unwrap().unwrap();
        assert!(src.next_message().await.unwrap().is_none());

        assert_eq!(a.payload.as_deref(), Some(&br#"{"type":"x"}"#[..]));
        assert_eq!((b.offset, b.payload), (1, None));
        assert_eq!(c.payload.as_deref(), Some(&br#"{"type":"y"}"#[..]));
    }

    #[tokio::test]
    async fn invalid_utf8_line_does_not_end_the_replay() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"\xff\xfe garbage\n{\"type\":\"x\"}\r\n").unwrap();
        f.flush().unwrap();

        let mut src = JsonLinesSource::open(f.path(), 0).await.unwrap();
        let bad = src.next_message().await.unwrap().unwrap();
        assert_eq!(bad.offset, 0);
        assert_eq!(bad.payload.as_deref(), Some(&b"\xff\xfe garbage"[..]));

        let good = src.next_message().await.unwrap().unwrap();
        assert_eq!(good.offset, 1);
        assert_eq!(good.payload.as_deref(), Some(&br#"{"type":"x"}"#[..]));
        assert!(src.next_message().await.unwrap().is_none());
    }
}
