//! Endpoint stream contract and bounded-channel adapters.
//!
//! The session core consumes two seams: a [`ByteSource`] it pulls signals
//! from and a [`ByteSink`] it pushes chunks into. Backpressure is the pull
//! loop itself: the core does not read the next source signal while the
//! sink has not accepted the previous chunk.
//!
//! Front-ends that hold network bodies bridge them onto these traits with
//! [`source_channel`] and [`sink_channel`]: the returned handles expose the
//! peer-facing operations (push data, end, raise an error, close), while the
//! adapter halves implement the traits for the session.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// One observable signal from a producing byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSignal {
    /// A block of bytes.
    Data(Bytes),
    /// Clean end-of-stream; no more data will follow.
    End,
    /// The stream failed with the given message.
    Error(String),
    /// The stream closed without signalling end-of-stream.
    Closed,
}

/// Failure of a consuming byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkFault {
    /// The stream failed with the given message.
    Error(String),
    /// The stream closed before draining.
    Closed,
}

/// A producing byte stream, as observed by the session core.
#[async_trait]
pub trait ByteSource: Send + 'static {
    /// Wait for the next signal. Must be cancellation-safe: a cancelled
    /// `next` call loses no signal.
    async fn next(&mut self) -> SourceSignal;
}

/// A consuming byte stream, as driven by the session core.
#[async_trait]
pub trait ByteSink: Send + 'static {
    /// Deliver one chunk, suspending while the sink cannot accept more.
    /// Returns the number of bytes accepted.
    async fn accept(&mut self, chunk: Bytes) -> Result<usize, SinkFault>;

    /// Signal end of input and wait until the sink has drained everything
    /// it accepted.
    async fn finish(&mut self) -> Result<(), SinkFault>;

    /// Wait for an out-of-band failure. Must be cancellation-safe; used to
    /// observe sink death while no chunk is in flight.
    async fn fault(&mut self) -> SinkFault;
}

/// Peer-side acknowledgements and faults for a channel sink.
enum PeerSignal {
    Drained,
    Fault(SinkFault),
}

fn peer_fault(signal: Option<PeerSignal>) -> SinkFault {
    match signal {
        Some(PeerSignal::Fault(fault)) => fault,
        Some(PeerSignal::Drained) | None => SinkFault::Closed,
    }
}

/// Producer handle paired with a [`ChannelSource`].
pub struct SourceHandle {
    signals: mpsc::Sender<SourceSignal>,
}

impl SourceHandle {
    /// Push a block of bytes. Suspends while the source window is full.
    /// Returns false once the session stopped listening.
    pub async fn data(&self, chunk: impl Into<Bytes>) -> bool {
        self.signals
            .send(SourceSignal::Data(chunk.into()))
            .await
            .is_ok()
    }

    /// Signal clean end-of-stream and give up the handle.
    pub async fn end(self) {
        self.signals.send(SourceSignal::End).await.ok();
    }

    /// Raise a stream error and give up the handle.
    pub async fn error(self, message: impl Into<String>) {
        self.signals
            .send(SourceSignal::Error(message.into()))
            .await
            .ok();
    }

    /// Close the stream without end-of-stream.
    pub fn close(self) {}
}

/// [`ByteSource`] backed by a bounded signal channel.
pub struct ChannelSource {
    signals: mpsc::Receiver<SourceSignal>,
}

#[async_trait]
impl ByteSource for ChannelSource {
    async fn next(&mut self) -> SourceSignal {
        // A dropped handle without End is a premature close.
        self.signals.recv().await.unwrap_or(SourceSignal::Closed)
    }
}

/// Create a producer handle and its session-facing source half.
///
/// `capacity` bounds the number of in-flight signals; a full window
/// suspends [`SourceHandle::data`], which is how destination backpressure
/// reaches the producer.
pub fn source_channel(capacity: usize) -> (SourceHandle, ChannelSource) {
    let (signals_tx, signals_rx) = mpsc::channel(capacity);
    (
        SourceHandle { signals: signals_tx },
        ChannelSource { signals: signals_rx },
    )
}

/// Consumer handle paired with a [`ChannelSink`].
pub struct SinkHandle {
    data: mpsc::Receiver<Bytes>,
    signals: mpsc::Sender<PeerSignal>,
    drained: bool,
}

impl SinkHandle {
    /// Receive the next accepted chunk, or `None` after end of input.
    /// The first `None` acknowledges drain-complete to the session.
    pub async fn read(&mut self) -> Option<Bytes> {
        match self.data.recv().await {
            Some(chunk) => Some(chunk),
            None => {
                if !self.drained {
                    self.drained = true;
                    self.signals.send(PeerSignal::Drained).await.ok();
                }
                None
            }
        }
    }

    /// Drain every remaining chunk into one buffer, acknowledging
    /// drain-complete at the end.
    pub async fn read_to_end(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        while let Some(chunk) = self.read().await {
            out.extend_from_slice(&chunk);
        }
        out
    }

    /// Raise a stream error and give up the handle.
    pub async fn error(self, message: impl Into<String>) {
        self.signals
            .send(PeerSignal::Fault(SinkFault::Error(message.into())))
            .await
            .ok();
    }

    /// Close the stream before draining.
    pub fn close(self) {}
}

/// [`ByteSink`] backed by a bounded data channel.
pub struct ChannelSink {
    data: Option<mpsc::Sender<Bytes>>,
    signals: mpsc::Receiver<PeerSignal>,
}

#[async_trait]
impl ByteSink for ChannelSink {
    async fn accept(&mut self, chunk: Bytes) -> Result<usize, SinkFault> {
        let len = chunk.len();
        let data = match self.data.as_ref() {
            Some(data) => data,
            None => return Err(SinkFault::Closed),
        };
        tokio::select! {
            biased;
            signal = self.signals.recv() => Err(peer_fault(signal)),
            sent = data.send(chunk) => match sent {
                Ok(()) => Ok(len),
                Err(_) => Err(SinkFault::Closed),
            },
        }
    }

    async fn finish(&mut self) -> Result<(), SinkFault> {
        // Dropping the sender ends the consumer's data stream; the consumer
        // answers with Drained once it has read everything.
        self.data = None;
        match self.signals.recv().await {
            Some(PeerSignal::Drained) => Ok(()),
            Some(PeerSignal::Fault(fault)) => Err(fault),
            None => Err(SinkFault::Closed),
        }
    }

    async fn fault(&mut self) -> SinkFault {
        peer_fault(self.signals.recv().await)
    }
}

/// Create a consumer handle and its session-facing sink half.
///
/// `capacity` bounds the chunks buffered between the session and the
/// consumer; a full buffer suspends [`ByteSink::accept`].
pub fn sink_channel(capacity: usize) -> (SinkHandle, ChannelSink) {
    let (data_tx, data_rx) = mpsc::channel(capacity);
    let (signals_tx, signals_rx) = mpsc::channel(4);
    (
        SinkHandle {
            data: data_rx,
            signals: signals_tx,
            drained: false,
        },
        ChannelSink {
            data: Some(data_tx),
            signals: signals_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_source_signals_in_order() {
        let (handle, mut source) = source_channel(4);
        assert!(handle.data("abc").await);
        handle.end().await;

        assert_eq!(
            source.next().await,
            SourceSignal::Data(Bytes::from_static(b"abc"))
        );
        assert_eq!(source.next().await, SourceSignal::End);
    }

    #[tokio::test]
    async fn test_dropped_source_handle_is_premature_close() {
        let (handle, mut source) = source_channel(4);
        handle.close();
        assert_eq!(source.next().await, SourceSignal::Closed);
    }

    #[tokio::test]
    async fn test_sink_accept_and_drain() {
        let (mut handle, mut sink) = sink_channel(4);
        assert_eq!(sink.accept(Bytes::from_static(b"abc")).await, Ok(3));
        assert_eq!(sink.accept(Bytes::from_static(b"def")).await, Ok(3));

        let reader = tokio::spawn(async move { (handle.read_to_end().await, handle) });
        assert_eq!(sink.finish().await, Ok(()));

        let (body, _handle) = reader.await.unwrap();
        assert_eq!(body, b"abcdef");
    }

    #[tokio::test]
    async fn test_sink_error_interrupts_accept() {
        // Capacity 1 with no reader: the second accept suspends on
        // backpressure until the peer raises an error.
        let (handle, mut sink) = sink_channel(1);
        assert_eq!(sink.accept(Bytes::from_static(b"a")).await, Ok(1));

        let raise = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            handle.error("boom").await;
        });

        let fault = timeout(Duration::from_secs(1), sink.accept(Bytes::from_static(b"b")))
            .await
            .unwrap();
        assert_eq!(fault, Err(SinkFault::Error("boom".into())));
        raise.await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_sink_handle_is_close() {
        let (handle, mut sink) = sink_channel(4);
        handle.close();
        assert_eq!(sink.fault().await, SinkFault::Closed);
        assert_eq!(
            sink.accept(Bytes::from_static(b"a")).await,
            Err(SinkFault::Closed)
        );
    }
}
