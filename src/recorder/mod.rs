//! Exchange recording.
//!
//! The forwarder knows recorders only through the [`Recorder`] trait and
//! never waits on them: a [`RecordQueue`] runs every write on its own task,
//! and a failed write is logged, not returned to the caller. The server
//! drains the queue before it stops.
//!
//! # Recorders
//!
//! | Recorder | Destination |
//! |----------|-------------|
//! | [`YamlRecorder`] | one YAML file per exchange, secrets masked |
//! | [`ChannelRecorder`] | a `tokio::sync::mpsc` receiver (embedding, tests) |
//! | [`NullRecorder`] | nowhere (recording disabled) |

mod redact;
mod yaml;

pub use redact::{
    is_sensitive_header, mask_secret, obfuscate_headers, redact_url, redact_value, MASK,
    SENSITIVE_HEADERS, SENSITIVE_KEYS,
};
pub use yaml::{LogEntry, RequestEntry, ResponseEntry, StoredEntry, YamlRecorder};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Semaphore};
use tokio_util::task::TaskTracker;

use crate::error::{RelayError, Result};
use crate::exchange::Exchange;

/// Persists exchanges.
///
/// Implementations receive headers already stripped of hop-by-hop entries
/// but with credentials intact; masking them is the recorder's job.
pub trait Recorder: Send + Sync {
    /// Persist one exchange, returning where it went.
    fn record<'a>(
        &'a self,
        exchange: &'a Exchange,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

    /// Recorder name for logging.
    fn name(&self) -> &'static str;
}

/// Background writer in front of a [`Recorder`].
///
/// Every write runs on its own task, tracked so [`RecordQueue::drain`] can
/// wait for them at shutdown. At most `max_pending` writes are in flight;
/// beyond that an exchange is dropped with a warning.
#[derive(Clone)]
pub struct RecordQueue {
    recorder: Arc<dyn Recorder>,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
}

impl RecordQueue {
    /// Default bound on in-flight writes.
    pub const DEFAULT_MAX_PENDING: usize = 1024;

    /// Queue in front of `recorder` allowing `max_pending` concurrent writes.
    pub fn new(recorder: Arc<dyn Recorder>, max_pending: usize) -> Self {
        Self {
            recorder,
            tracker: TaskTracker::new(),
            permits: Arc::new(Semaphore::new(max_pending.max(1))),
        }
    }

    /// Recorder behind this queue.
    pub fn recorder(&self) -> &Arc<dyn Recorder> {
        &self.recorder
    }

    /// Writes started and not yet finished.
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Record `exchange` in the background.
    ///
    /// Outside a tokio runtime, or with the queue full, the exchange is
    /// dropped with a warning.
    pub fn submit(&self, exchange: Exchange) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(url = %exchange.request.url, "No runtime available, exchange not recorded");
            return;
        };

        let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
            tracing::warn!(
                recorder = self.recorder.name(),
                url = %exchange.request.url,
                pending = self.tracker.len(),
                "Record queue full, exchange not recorded"
            );
            return;
        };

        let recorder = Arc::clone(&self.recorder);
        self.tracker.spawn_on(
            async move {
                let _permit = permit;
                match recorder.record(&exchange).await {
                    Ok(location) => tracing::debug!(
                        recorder = recorder.name(),
                        location = %location,
                        status = exchange.response.status.as_u16(),
                        streaming = exchange.streaming,
                        "Exchange recorded"
                    ),
                    Err(e) => tracing::warn!(
                        recorder = recorder.name(),
                        url = %exchange.request.url,
                        error = %e,
                        "Failed to record exchange"
                    ),
                }
            },
            &handle,
        );
    }

    /// Wait up to `limit` for pending writes to finish.
    ///
    /// Returns false, after a warning, if some are still running when the
    /// limit expires.
    pub async fn drain(&self, limit: Duration) -> bool {
        self.tracker.close();
        let drained = tokio::time::timeout(limit, self.tracker.wait()).await.is_ok();
        self.tracker.reopen();

        if !drained {
            tracing::warn!(
                recorder = self.recorder.name(),
                pending = self.tracker.len(),
                "Exchanges still being recorded at shutdown, they may be lost"
            );
        }
        drained
    }
}

impl std::fmt::Debug for RecordQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordQueue")
            .field("recorder", &self.recorder.name())
            .field("pending", &self.tracker.len())
            .finish_non_exhaustive()
    }
}

/// Sends every exchange to an in-process channel.
#[derive(Debug, Clone)]
pub struct ChannelRecorder {
    tx: mpsc::UnboundedSender<Exchange>,
}

impl ChannelRecorder {
    /// Create a recorder and the receiver its exchanges arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Exchange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Recorder for ChannelRecorder {
    fn record<'a>(
        &'a self,
        exchange: &'a Exchange,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            self.tx
                .send(exchange.clone())
                .map_err(|_| RelayError::Recorder("receiver dropped".to_string()))?;
            Ok("channel".to_string())
        })
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// Discards every exchange.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullRecorder;

impl Recorder for NullRecorder {
    fn record<'a>(
        &'a self,
        _exchange: &'a Exchange,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async { Ok("discarded".to_string()) })
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use http::{HeaderMap, Method, StatusCode};
    use serde_json::json;

    use crate::exchange::{RecordedRequest, RecordedResponse};
    use crate::proxy::Payload;

    pub(crate) fn sample_exchange() -> Exchange {
        let mut request_headers = HeaderMap::new();
        request_headers.insert("authorization", "Bearer sk-1234567890abcdef".parse().unwrap());
        request_headers.insert("content-type", "application/json".parse().unwrap());

        Exchange {
            timestamp: Utc::now(),
            request: RecordedRequest {
                method: Method::POST,
                url: "https://api.example.com/v1/chat".to_string(),
                headers: request_headers,
                body: Payload::Json(json!({"message": "hello"})),
            },
            response: RecordedResponse {
                status: StatusCode::OK,
                headers: HeaderMap::new(),
                body: Payload::Json(json!({"reply": "world"})),
            },
            streaming: false,
            complete: true,
            duration: Duration::from_millis(12),
        }
    }

    #[tokio::test]
    async fn test_channel_recorder() {
        let (recorder, mut rx) = ChannelRecorder::new();
        let location = recorder.record(&sample_exchange()).await.unwrap();

        assert_eq!(location, "channel");
        let received = rx.recv().await.unwrap();
        assert_eq!(received.request.url, "https://api.example.com/v1/chat");
    }

    #[tokio::test]
    async fn test_channel_recorder_receiver_dropped() {
        let (recorder, rx) = ChannelRecorder::new();
        drop(rx);

        let result = recorder.record(&sample_exchange()).await;
        assert!(matches!(result, Err(RelayError::Recorder(_))));
    }

    /// Sleeps before counting each exchange.
    pub(crate) struct SlowRecorder {
        pub(crate) delay: Duration,
        pub(crate) recorded: Arc<AtomicUsize>,
    }

    impl SlowRecorder {
        pub(crate) fn new(delay: Duration) -> Self {
            Self {
                delay,
                recorded: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl Recorder for SlowRecorder {
        fn record<'a>(
            &'a self,
            _exchange: &'a Exchange,
        ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
            Box::pin(async move {
                tokio::time::sleep(self.delay).await;
                self.recorded.fetch_add(1, Ordering::SeqCst);
                Ok("slow".to_string())
            })
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_queue_records_in_background() {
        let (recorder, mut rx) = ChannelRecorder::new();
        let queue = RecordQueue::new(Arc::new(recorder), 8);
        queue.submit(sample_exchange());

        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_drain_waits_for_pending_writes() {
        let recorder = SlowRecorder::new(Duration::from_millis(50));
        let recorded = Arc::clone(&recorder.recorded);
        let queue = RecordQueue::new(Arc::new(recorder), 8);

        queue.submit(sample_exchange());
        queue.submit(sample_exchange());
        assert_eq!(recorded.load(Ordering::SeqCst), 0);

        assert!(queue.drain(Duration::from_secs(2)).await);
        assert_eq!(recorded.load(Ordering::SeqCst), 2);
        assert_eq!(queue.pending(), 0);

        // still usable after draining
        queue.submit(sample_exchange());
        assert!(queue.drain(Duration::from_secs(2)).await);
        assert_eq!(recorded.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_drain_gives_up_after_limit() {
        let queue = RecordQueue::new(Arc::new(SlowRecorder::new(Duration::from_secs(5))), 8);
        queue.submit(sample_exchange());

        assert!(!queue.drain(Duration::from_millis(20)).await);
        assert_eq!(queue.pending(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_drops_exchange() {
        let recorder = SlowRecorder::new(Duration::from_millis(50));
        let recorded = Arc::clone(&recorder.recorded);
        let queue = RecordQueue::new(Arc::new(recorder), 1);

        queue.submit(sample_exchange());
        queue.submit(sample_exchange());
        assert_eq!(queue.pending(), 1);

        assert!(queue.drain(Duration::from_secs(2)).await);
        assert_eq!(recorded.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_submit_outside_runtime_is_dropped() {
        let recorder = SlowRecorder::new(Duration::from_millis(1));
        let queue = RecordQueue::new(Arc::new(recorder), 1);
        queue.submit(sample_exchange());
        assert_eq!(queue.pending(), 0);
    }

    #[tokio::test]
    async fn test_null_recorder() {
        let location = NullRecorder.record(&sample_exchange()).await.unwrap();
        assert_eq!(location, "discarded");
    }
}
