//! Dispatcher: the single ordered path to the outbound channel.
//!
//! Any number of callers submit [`DispatchRequest`]s; a dedicated delivery
//! thread drains the queue and is the only code that touches the sink.
//! Requests reach the sink in submission order and the messages of one
//! request are never interleaved with another's.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use tempera_types::WireMessage;

use crate::error::DispatchError;
use crate::midi::sink::MessageSink;

/// An ordered batch of messages delivered as one unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchRequest {
    messages: Vec<WireMessage>,
}

impl DispatchRequest {
    pub fn new(messages: Vec<WireMessage>) -> Self {
        Self { messages }
    }

    pub fn push(&mut self, message: WireMessage) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = WireMessage>) {
        self.messages.extend(messages);
    }

    pub fn messages(&self) -> &[WireMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl From<WireMessage> for DispatchRequest {
    fn from(message: WireMessage) -> Self {
        Self {
            messages: vec![message],
        }
    }
}

impl From<Vec<WireMessage>> for DispatchRequest {
    fn from(messages: Vec<WireMessage>) -> Self {
        Self { messages }
    }
}

type DeliveryResult = Result<(), DispatchError>;

/// Receipt for a submitted request.
///
/// Dropping it is fine: delivery does not depend on anyone waiting. `wait`
/// reports the first send failure of the request, if any.
#[must_use = "drop the receipt explicitly if delivery confirmation is not needed"]
pub struct Delivery {
    rx: Receiver<DeliveryResult>,
}

impl Delivery {
    /// Block until the request has been written (or failed).
    pub fn wait(self) -> DeliveryResult {
        self.rx.recv().unwrap_or(Err(DispatchError::Closed))
    }

    /// `None` if the request is still pending after `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<DeliveryResult> {
        match self.rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(DispatchError::Closed)),
        }
    }

    /// Non-blocking check.
    pub fn try_result(&self) -> Option<DeliveryResult> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(DispatchError::Closed)),
        }
    }
}

struct Envelope {
    request: DispatchRequest,
    reply: Sender<DeliveryResult>,
}

enum Lifecycle {
    /// Created; submissions queue up until the delivery thread starts.
    Ready {
        sink: Box<dyn MessageSink>,
        rx: Receiver<Envelope>,
    },
    Running {
        worker: JoinHandle<Box<dyn MessageSink>>,
    },
    Closed,
}

pub struct Dispatcher {
    queue: RwLock<Option<Sender<Envelope>>>,
    lifecycle: Mutex<Lifecycle>,
}

impl Dispatcher {
    pub fn new(sink: Box<dyn MessageSink>) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            queue: RwLock::new(Some(tx)),
            lifecycle: Mutex::new(Lifecycle::Ready { sink, rx }),
        }
    }

    /// Run `body` against a started dispatcher and stop it afterwards.
    ///
    /// The dispatcher is stopped even if `body` panics or keeps a clone of
    /// the `Arc`; later submissions through such a clone fail with `Closed`.
    pub fn with_session<R>(
        sink: Box<dyn MessageSink>,
        body: impl FnOnce(&Arc<Dispatcher>) -> R,
    ) -> Result<R, DispatchError> {
        let dispatcher = Arc::new(Dispatcher::new(sink));
        dispatcher.start()?;
        let _session = StopOnDrop(&dispatcher);
        let result = body(&dispatcher);
        dispatcher.stop()?;
        Ok(result)
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the sink and launch the delivery thread.
    pub fn start(&self) -> Result<(), DispatchError> {
        let mut lifecycle = self.lifecycle();
        match std::mem::replace(&mut *lifecycle, Lifecycle::Closed) {
            Lifecycle::Ready { mut sink, rx } => {
                if let Err(e) = sink.open() {
                    log::error!(target: "dispatch", "could not open channel: {}", e);
                    *lifecycle = Lifecycle::Ready { sink, rx };
                    return Err(DispatchError::ChannelUnavailable(e.0));
                }
                let worker = thread::Builder::new()
                    .name("tempera-dispatch".into())
                    .spawn(move || {
                        delivery_loop(sink.as_mut(), rx);
                        sink
                    })
                    .map_err(|e| DispatchError::ChannelUnavailable(e.to_string()))?;
                *lifecycle = Lifecycle::Running { worker };
                log::info!(target: "dispatch", "dispatcher started");
                Ok(())
            }
            running @ Lifecycle::Running { .. } => {
                *lifecycle = running;
                Err(DispatchError::AlreadyStarted)
            }
            Lifecycle::Closed => Err(DispatchError::Closed),
        }
    }

    /// Queue a request. Never blocks on I/O.
    pub fn submit(&self, request: impl Into<DispatchRequest>) -> Result<Delivery, DispatchError> {
        let queue = self.queue.read().unwrap_or_else(PoisonError::into_inner);
        let tx = queue.as_ref().ok_or(DispatchError::Closed)?;
        let (reply, rx) = crossbeam_channel::bounded(1);
        tx.send(Envelope {
            request: request.into(),
            reply,
        })
        .map_err(|_| DispatchError::Closed)?;
        Ok(Delivery { rx })
    }

    /// Submit and block until delivered.
    pub fn submit_and_wait(&self, request: impl Into<DispatchRequest>) -> Result<(), DispatchError> {
        self.submit(request)?.wait()
    }

    /// Refuse new requests, deliver everything already queued, then close the
    /// sink. Calling `stop` again is a no-op.
    pub fn stop(&self) -> Result<(), DispatchError> {
        // Dropping the only sender lets the delivery loop run dry and exit.
        drop(
            self.queue
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let previous = std::mem::replace(&mut *self.lifecycle(), Lifecycle::Closed);
        match previous {
            Lifecycle::Running { worker } => {
                let mut sink = worker.join().map_err(|_| {
                    log::error!(target: "dispatch", "delivery thread panicked");
                    DispatchError::ChannelUnavailable("delivery thread panicked".to_string())
                })?;
                sink.close().map_err(|e| {
                    log::error!(target: "dispatch", "could not close channel: {}", e);
                    DispatchError::ChannelUnavailable(e.0)
                })?;
                log::info!(target: "dispatch", "dispatcher stopped");
                Ok(())
            }
            // Never started: queued receipts resolve to Closed when `rx` drops.
            Lifecycle::Ready { .. } | Lifecycle::Closed => Ok(()),
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle(), Lifecycle::Running { .. })
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(e) = self.stop() {
                log::warn!(target: "dispatch", "stop on drop failed: {}", e);
            }
        }
    }
}

/// Stops a session's dispatcher when the session scope unwinds.
struct StopOnDrop<'a>(&'a Dispatcher);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.0.stop() {
            log::warn!(target: "dispatch", "stop on session exit failed: {}", e);
        }
    }
}

fn delivery_loop(sink: &mut dyn MessageSink, rx: Receiver<Envelope>) {
    while let Ok(Envelope { request, reply }) = rx.recv() {
        let mut outcome = Ok(());
        for message in request.messages() {
            if let Err(e) = sink.send(message) {
                log::warn!(target: "dispatch", "send failed for {:02X?}: {}", message.as_bytes(), e);
                if outcome.is_ok() {
                    outcome = Err(DispatchError::SendFailure(e.0));
                }
            }
        }
        // The submitter may have dropped its receipt.
        let _ = reply.send(outcome);
    }
    log::debug!(target: "dispatch", "delivery queue drained");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::sink::RecordingSink;

    fn cc(value: u8) -> WireMessage {
        WireMessage::control_change(1, 20, value)
    }

    #[test]
    fn start_twice_is_a_usage_error() {
        let dispatcher = Dispatcher::new(Box::new(RecordingSink::new()));
        dispatcher.start().unwrap();
        assert_eq!(dispatcher.start(), Err(DispatchError::AlreadyStarted));
        dispatcher.stop().unwrap();
    }

    #[test]
    fn open_failure_is_channel_unavailable_and_retryable() {
        let sink = RecordingSink::new();
        sink.fail_open("port 'Tempera' not found");
        let dispatcher = Dispatcher::new(Box::new(sink.clone()));
        assert!(matches!(
            dispatcher.start(),
            Err(DispatchError::ChannelUnavailable(_))
        ));
        assert!(!dispatcher.is_running());
        dispatcher.start().unwrap();
        assert!(sink.is_open());
        dispatcher.stop().unwrap();
    }

    #[test]
    fn submissions_before_start_are_delivered_after_start() {
        let sink = RecordingSink::new();
        let dispatcher = Dispatcher::new(Box::new(sink.clone()));
        let receipt = dispatcher.submit(cc(1)).unwrap();
        assert!(receipt.try_result().is_none());
        dispatcher.start().unwrap();
        assert_eq!(receipt.wait(), Ok(()));
        dispatcher.stop().unwrap();
        assert_eq!(sink.messages(), vec![cc(1)]);
    }

    #[test]
    fn stop_drains_then_closes_and_rejects_new_work() {
        let sink = RecordingSink::new();
        sink.set_latency(Duration::from_millis(2));
        let dispatcher = Dispatcher::new(Box::new(sink.clone()));
        dispatcher.start().unwrap();
        for v in 0..20 {
            let _ = dispatcher.submit(cc(v)).unwrap();
        }
        dispatcher.stop().unwrap();
        assert_eq!(sink.messages(), (0..20).map(cc).collect::<Vec<_>>());
        assert!(!sink.is_open());
        assert_eq!(sink.close_count(), 1);
        assert!(matches!(dispatcher.submit(cc(99)), Err(DispatchError::Closed)));
        assert_eq!(dispatcher.start(), Err(DispatchError::Closed));
        assert_eq!(dispatcher.stop(), Ok(()));
    }

    #[test]
    fn send_failure_is_reported_and_does_not_wedge_the_loop() {
        let sink = RecordingSink::new();
        let dispatcher = Dispatcher::new(Box::new(sink.clone()));
        dispatcher.start().unwrap();
        sink.fail_after(1);
        let first = dispatcher.submit(vec![cc(1), cc(2), cc(3)]).unwrap();
        let second = dispatcher.submit(cc(4)).unwrap();
        assert!(matches!(first.wait(), Err(DispatchError::SendFailure(_))));
        assert_eq!(second.wait(), Ok(()));
        dispatcher.stop().unwrap();
        assert_eq!(sink.messages(), vec![cc(1), cc(3), cc(4)]);
    }

    #[test]
    fn never_started_dispatcher_resolves_receipts_as_closed() {
        let dispatcher = Dispatcher::new(Box::new(RecordingSink::new()));
        let receipt = dispatcher.submit(cc(1)).unwrap();
        dispatcher.stop().unwrap();
        assert_eq!(receipt.wait(), Err(DispatchError::Closed));
    }

    #[test]
    fn session_stops_the_dispatcher() {
        let sink = RecordingSink::new();
        let delivered = Dispatcher::with_session(Box::new(sink.clone()), |d| {
            d.submit_and_wait(cc(7)).is_ok()
        })
        .unwrap();
        assert!(delivered);
        assert!(!sink.is_open());
        assert_eq!(sink.messages(), vec![cc(7)]);
    }

    #[test]
    fn session_closes_the_sink_when_a_body_that_kept_a_clone_panics() {
        let sink = RecordingSink::new();
        let kept: Mutex<Option<Arc<Dispatcher>>> = Mutex::new(None);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            Dispatcher::with_session(Box::new(sink.clone()), |d| {
                *kept.lock().unwrap() = Some(Arc::clone(d));
                d.submit_and_wait(cc(9)).unwrap();
                panic!("body failed");
            })
        }));
        assert!(outcome.is_err());
        assert!(!sink.is_open());
        assert_eq!(sink.messages(), vec![cc(9)]);

        let survivor = kept.lock().unwrap().take().unwrap();
        assert!(!survivor.is_running());
        match survivor.submit(cc(10)) {
            Err(DispatchError::Closed) => {}
            other => panic!("Expected Closed, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn dropping_a_running_dispatcher_closes_the_sink() {
        let sink = RecordingSink::new();
        {
            let dispatcher = Dispatcher::new(Box::new(sink.clone()));
            dispatcher.start().unwrap();
            let _ = dispatcher.submit(cc(5)).unwrap();
        }
        assert!(!sink.is_open());
        assert_eq!(sink.messages(), vec![cc(5)]);
    }
}
