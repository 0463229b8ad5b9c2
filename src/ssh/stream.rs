//! Duplex stream engine: pumps one channel's inbound bytes to a single
//! consumer slot (buffering while none is registered) and drains an
//! outbound queue to the channel, until either side finishes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("channel read failed: {0}")]
    Read(String),
    #[error("channel write failed: {0}")]
    Write(String),
}

/// Inbound side of a channel: yields chunks in arrival order, `None` on EOF.
pub(crate) trait ChunkSource: Send {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, StreamError>;
}

/// Outbound side of a channel.
pub(crate) trait ChunkSink: Send {
    async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StreamError>;
    /// Window-change request; failures are swallowed (resize is advisory).
    async fn resize_window(&mut self, columns: u16, rows: u16);
}

/// Items travelling through the outbound queue. Resize rides the same
/// queue so it is ordered with the writes around it.
#[derive(Debug)]
pub(crate) enum Outbound {
    Data(Vec<u8>),
    Resize(u16, u16),
}

pub(crate) type DataCallback = Box<dyn FnMut(&[u8]) + Send>;

/// Single-slot consumer registration plus the ordered buffer that holds
/// inbound chunks while no consumer is attached.
#[derive(Default)]
pub(crate) struct InboundSink {
    callback: Option<DataCallback>,
    buffered: VecDeque<Vec<u8>>,
}

impl InboundSink {
    pub(crate) fn deliver(&mut self, chunk: Vec<u8>) {
        match self.callback.as_mut() {
            Some(callback) => callback(&chunk),
            None => self.buffered.push_back(chunk),
        }
    }

    /// Replaces the consumer slot. Anything buffered while the slot was
    /// empty is flushed to the new callback first, in arrival order, so
    /// early output (a login banner, a prompt) is never lost.
    pub(crate) fn register(&mut self, mut callback: DataCallback) {
        for chunk in self.buffered.drain(..) {
            callback(&chunk);
        }
        self.callback = Some(callback);
    }

    pub(crate) fn clear_callback(&mut self) {
        self.callback = None;
    }

    pub(crate) fn clear_buffered(&mut self) {
        self.buffered.clear();
    }
}

/// Runs the two pump loops until one finishes, then drops the other.
///
/// The reader stops on EOF, read error, or cancellation; the writer
/// stops when the outbound queue closes or a write fails. A remote
/// close therefore halts outbound writing promptly, and a local
/// disconnect halts reading within one I/O step.
pub(crate) async fn relay<R, W>(
    mut source: R,
    mut sink: W,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    inbound: Arc<Mutex<InboundSink>>,
    cancel: CancellationToken,
) -> Result<(), StreamError>
where
    R: ChunkSource,
    W: ChunkSink,
{
    let reader = async {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                chunk = source.next_chunk() => match chunk? {
                    Some(bytes) => {
                        trace!(len = bytes.len(), "inbound chunk");
                        inbound.lock().unwrap().deliver(bytes);
                    }
                    None => return Ok(()),
                },
            }
        }
    };

    let writer = async {
        while let Some(item) = outbound.recv().await {
            match item {
                Outbound::Data(bytes) => sink.write_chunk(&bytes).await?,
                Outbound::Resize(columns, rows) => sink.resize_window(columns, rows).await,
            }
        }
        Ok(())
    };

    tokio::select! {
        result = reader => result,
        result = writer => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecSource(VecDeque<Vec<u8>>);

    impl ChunkSource for VecSource {
        async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
            Ok(self.0.pop_front())
        }
    }

    /// Never yields; stands in for a quiet remote.
    struct PendingSource;

    impl ChunkSource for PendingSource {
        async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
            std::future::pending().await
        }
    }

    #[derive(Clone, Default)]
    struct CollectSink {
        written: Arc<Mutex<Vec<Vec<u8>>>>,
        resizes: Arc<Mutex<Vec<(u16, u16)>>>,
    }

    impl ChunkSink for CollectSink {
        async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), StreamError> {
            self.written.lock().unwrap().push(chunk.to_vec());
            Ok(())
        }

        async fn resize_window(&mut self, columns: u16, rows: u16) {
            self.resizes.lock().unwrap().push((columns, rows));
        }
    }

    struct FailingSink;

    impl ChunkSink for FailingSink {
        async fn write_chunk(&mut self, _chunk: &[u8]) -> Result<(), StreamError> {
            Err(StreamError::Write("broken pipe".to_string()))
        }

        async fn resize_window(&mut self, _columns: u16, _rows: u16) {}
    }

    fn collected() -> (Arc<Mutex<Vec<Vec<u8>>>>, DataCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: DataCallback = Box::new(move |chunk: &[u8]| {
            sink.lock().unwrap().push(chunk.to_vec());
        });
        (seen, callback)
    }

    #[test]
    fn test_sink_buffers_without_consumer_and_flushes_in_order() {
        let mut sink = InboundSink::default();
        sink.deliver(b"banner".to_vec());
        sink.deliver(b"prompt".to_vec());

        let (seen, callback) = collected();
        sink.register(callback);
        sink.deliver(b"live".to_vec());

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, vec![b"banner".to_vec(), b"prompt".to_vec(), b"live".to_vec()]);
    }

    #[test]
    fn test_sink_registration_replaces_previous_consumer() {
        let mut sink = InboundSink::default();
        let (first_seen, first) = collected();
        let (second_seen, second) = collected();

        sink.register(first);
        sink.deliver(b"one".to_vec());
        sink.register(second);
        sink.deliver(b"two".to_vec());

        assert_eq!(*first_seen.lock().unwrap(), vec![b"one".to_vec()]);
        assert_eq!(*second_seen.lock().unwrap(), vec![b"two".to_vec()]);
    }

    #[test]
    fn test_sink_buffer_not_redelivered_after_flush() {
        let mut sink = InboundSink::default();
        sink.deliver(b"early".to_vec());

        let (first_seen, first) = collected();
        sink.register(first);
        let (second_seen, second) = collected();
        sink.register(second);

        assert_eq!(*first_seen.lock().unwrap(), vec![b"early".to_vec()]);
        assert!(second_seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_relay_writes_outbound_in_order() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = CollectSink::default();
        let written = Arc::clone(&sink.written);

        tx.send(Outbound::Data(b"ls".to_vec())).unwrap();
        tx.send(Outbound::Resize(120, 50)).unwrap();
        tx.send(Outbound::Data(b" -la\r".to_vec())).unwrap();
        drop(tx);

        let result = relay(
            PendingSource,
            sink,
            rx,
            Arc::new(Mutex::new(InboundSink::default())),
            CancellationToken::new(),
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(*written.lock().unwrap(), vec![b"ls".to_vec(), b" -la\r".to_vec()]);
    }

    #[tokio::test]
    async fn test_relay_issues_resize_between_writes() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = CollectSink::default();
        let resizes = Arc::clone(&sink.resizes);

        tx.send(Outbound::Resize(100, 40)).unwrap();
        drop(tx);

        relay(
            PendingSource,
            sink,
            rx,
            Arc::new(Mutex::new(InboundSink::default())),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(*resizes.lock().unwrap(), vec![(100, 40)]);
    }

    #[tokio::test]
    async fn test_relay_delivers_inbound_until_eof() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let inbound = Arc::new(Mutex::new(InboundSink::default()));
        let (seen, callback) = collected();
        inbound.lock().unwrap().register(callback);

        let source = VecSource(VecDeque::from(vec![b"a".to_vec(), b"b".to_vec()]));
        let result = relay(
            source,
            CollectSink::default(),
            rx,
            Arc::clone(&inbound),
            CancellationToken::new(),
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(*seen.lock().unwrap(), vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[tokio::test]
    async fn test_relay_stops_cleanly_on_cancellation() {
        let (_tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = relay(
            PendingSource,
            CollectSink::default(),
            rx,
            Arc::new(Mutex::new(InboundSink::default())),
            cancel,
        )
        .await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_relay_surfaces_write_failure() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(Outbound::Data(b"x".to_vec())).unwrap();

        let result = relay(
            PendingSource,
            FailingSink,
            rx,
            Arc::new(Mutex::new(InboundSink::default())),
            CancellationToken::new(),
        )
        .await;

        match result {
            Err(StreamError::Write(message)) => assert!(message.contains("broken pipe")),
            other => panic!("expected write failure, got {:?}", other),
        }
    }
}
