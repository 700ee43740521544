//! The streaming loop that drives bytes from a source into a sink.

use crate::stream::{ByteSink, ByteSource, SinkFault, SourceSignal};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Classified end of a streaming phase. The first signal to arrive wins;
/// the session drops everything after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PipeOutcome {
    /// Source ended and the sink drained.
    Finished,
    /// Source raised an error before end-of-stream.
    SourceError(String),
    /// Sink raised an error.
    DestinationError(String),
    /// Source closed without end-of-stream.
    SourceDisconnected,
    /// Sink closed before draining.
    DestinationDisconnected,
}

fn sink_outcome(fault: SinkFault) -> PipeOutcome {
    match fault {
        SinkFault::Error(message) => PipeOutcome::DestinationError(message),
        SinkFault::Closed => PipeOutcome::DestinationDisconnected,
    }
}

/// Forward source chunks into the sink until either side terminates.
///
/// Backpressure: the loop pulls the next source signal only after the sink
/// accepted the previous chunk, so a slow sink pauses the source through its
/// bounded window. `transferred` advances by exactly the bytes the sink
/// accepted. While the source is idle, an out-of-band sink fault is observed
/// through [`ByteSink::fault`].
pub(crate) async fn run(
    mut source: Box<dyn ByteSource>,
    mut sink: Box<dyn ByteSink>,
    transferred: Arc<AtomicU64>,
) -> PipeOutcome {
    let outcome = loop {
        tokio::select! {
            signal = source.next() => match signal {
                SourceSignal::Data(chunk) => match sink.accept(chunk).await {
                    Ok(accepted) => {
                        transferred.fetch_add(accepted as u64, Ordering::SeqCst);
                        trace!(accepted, "chunk forwarded");
                    }
                    Err(fault) => break sink_outcome(fault),
                },
                SourceSignal::End => break match sink.finish().await {
                    Ok(()) => PipeOutcome::Finished,
                    Err(fault) => sink_outcome(fault),
                },
                SourceSignal::Error(message) => break PipeOutcome::SourceError(message),
                SourceSignal::Closed => break PipeOutcome::SourceDisconnected,
            },
            fault = sink.fault() => break sink_outcome(fault),
        }
    };
    debug!(?outcome, bytes = transferred.load(Ordering::SeqCst), "pipe ended");
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::{sink_channel, source_channel};
    use std::time::Duration;
    use tokio::time::timeout;

    async fn run_pipe(
        source: impl ByteSource,
        sink: impl ByteSink,
    ) -> (PipeOutcome, u64) {
        let transferred = Arc::new(AtomicU64::new(0));
        let outcome = timeout(
            Duration::from_secs(1),
            run(Box::new(source), Box::new(sink), Arc::clone(&transferred)),
        )
        .await
        .unwrap();
        (outcome, transferred.load(Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_clean_transfer() {
        let (producer, source) = source_channel(4);
        let (mut consumer, sink) = sink_channel(4);

        tokio::spawn(async move {
            producer.data("abc").await;
            producer.data("def").await;
            producer.end().await;
        });
        let reader = tokio::spawn(async move { consumer.read_to_end().await });

        let (outcome, bytes) = run_pipe(source, sink).await;
        assert_eq!(outcome, PipeOutcome::Finished);
        assert_eq!(bytes, 6);
        assert_eq!(reader.await.unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_backpressure_with_tiny_windows() {
        let (producer, source) = source_channel(1);
        let (mut consumer, sink) = sink_channel(1);

        tokio::spawn(async move {
            for _ in 0..16 {
                producer.data("xxxx").await;
            }
            producer.end().await;
        });
        let reader = tokio::spawn(async move { consumer.read_to_end().await });

        let (outcome, bytes) = run_pipe(source, sink).await;
        assert_eq!(outcome, PipeOutcome::Finished);
        assert_eq!(bytes, 64);
        assert_eq!(reader.await.unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_source_error_stops_pipe() {
        let (producer, source) = source_channel(4);
        let (consumer, sink) = sink_channel(4);

        tokio::spawn(async move {
            producer.data("abc").await;
            producer.error("blahdeblah").await;
        });

        let (outcome, bytes) = run_pipe(source, sink).await;
        assert_eq!(outcome, PipeOutcome::SourceError("blahdeblah".into()));
        assert_eq!(bytes, 3);
        drop(consumer);
    }

    #[tokio::test]
    async fn test_source_close_is_disconnect() {
        let (producer, source) = source_channel(4);
        let (consumer, sink) = sink_channel(4);

        producer.close();
        let (outcome, bytes) = run_pipe(source, sink).await;
        assert_eq!(outcome, PipeOutcome::SourceDisconnected);
        assert_eq!(bytes, 0);
        drop(consumer);
    }

    #[tokio::test]
    async fn test_idle_sink_close_is_disconnect() {
        // No source traffic at all: the fault must surface through the
        // out-of-band watch, not through a write.
        let (producer, source) = source_channel(4);
        let (consumer, sink) = sink_channel(4);

        consumer.close();
        let (outcome, _) = run_pipe(source, sink).await;
        assert_eq!(outcome, PipeOutcome::DestinationDisconnected);
        drop(producer);
    }

    #[tokio::test]
    async fn test_sink_error_during_transfer() {
        let (producer, source) = source_channel(1);
        let (consumer, sink) = sink_channel(1);

        tokio::spawn(async move {
            // Window of 1 with no reader: the second chunk suspends in
            // accept until the consumer raises the error.
            producer.data("aaaa").await;
            producer.data("bbbb").await;
            producer.end().await;
        });
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            consumer.error("disk full").await;
        });

        let (outcome, _) = run_pipe(source, sink).await;
        assert_eq!(outcome, PipeOutcome::DestinationError("disk full".into()));
    }
}
