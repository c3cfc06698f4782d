//! Message sinks: the raw outbound channel.
//!
//! `MessageSink` captures what the dispatcher needs from a transport (open,
//! write one message, close) independently of how it is done. `MidiPortSink`
//! writes to a MIDI output port through `midir`; `RecordingSink` keeps every
//! message in memory for assertions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use midir::{MidiOutput, MidiOutputConnection};
use tempera_types::WireMessage;

use crate::config::MidiSettings;
use crate::error::SinkError;

/// Result type for sink operations.
pub type SinkResult<T = ()> = Result<T, SinkError>;

/// The outbound channel. Only the dispatcher's delivery thread calls these.
pub trait MessageSink: Send {
    fn open(&mut self) -> SinkResult;
    fn send(&mut self, message: &WireMessage) -> SinkResult;
    fn close(&mut self) -> SinkResult;
}

// ─── MidiPortSink ───────────────────────────────────────────────────

/// Names of the MIDI output ports currently visible to the host.
pub fn available_output_ports(client_name: &str) -> Vec<String> {
    match MidiOutput::new(client_name) {
        Ok(midi_out) => midi_out
            .ports()
            .iter()
            .filter_map(|p| midi_out.port_name(p).ok())
            .collect(),
        Err(e) => {
            log::warn!(target: "midi", "could not initialise MIDI output: {}", e);
            Vec::new()
        }
    }
}

/// Writes to a named MIDI output port.
///
/// The port is matched by exact name first, then by the first port whose name
/// contains the configured one (ALSA decorates names with client numbers).
pub struct MidiPortSink {
    client_name: String,
    port_name: String,
    virtual_port: bool,
    connection: Option<MidiOutputConnection>,
}

impl MidiPortSink {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self {
            client_name: "tempera".to_string(),
            port_name: port_name.into(),
            virtual_port: false,
            connection: None,
        }
    }

    pub fn from_settings(settings: &MidiSettings) -> Self {
        Self {
            client_name: settings.client_name.clone(),
            port_name: settings.port.clone(),
            virtual_port: settings.virtual_port,
            connection: None,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    #[cfg(unix)]
    fn open_virtual(&self, midi_out: MidiOutput) -> SinkResult<MidiOutputConnection> {
        use midir::os::unix::VirtualOutput;
        midi_out
            .create_virtual(&self.port_name)
            .map_err(|e| SinkError(format!("could not create virtual port '{}': {}", self.port_name, e)))
    }

    #[cfg(not(unix))]
    fn open_virtual(&self, _midi_out: MidiOutput) -> SinkResult<MidiOutputConnection> {
        Err(SinkError("virtual ports are not supported on this platform".to_string()))
    }
}

impl MessageSink for MidiPortSink {
    fn open(&mut self) -> SinkResult {
        if self.connection.is_some() {
            return Ok(());
        }
        let midi_out = MidiOutput::new(&self.client_name)
            .map_err(|e| SinkError(format!("failed to create MIDI output: {}", e)))?;

        if self.virtual_port {
            self.connection = Some(self.open_virtual(midi_out)?);
            log::info!(target: "midi", "opened virtual port '{}'", self.port_name);
            return Ok(());
        }

        let ports = midi_out.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|p| midi_out.port_name(p).unwrap_or_default())
            .collect();
        let index = names
            .iter()
            .position(|n| *n == self.port_name)
            .or_else(|| names.iter().position(|n| n.contains(&self.port_name)))
            .ok_or_else(|| {
                SinkError(format!(
                    "MIDI port '{}' not found (available: {})",
                    self.port_name,
                    names.join(", ")
                ))
            })?;

        let connection = midi_out
            .connect(&ports[index], &self.client_name)
            .map_err(|e| SinkError(format!("failed to connect to '{}': {}", names[index], e)))?;
        log::info!(target: "midi", "connected to '{}'", names[index]);
        self.connection = Some(connection);
        Ok(())
    }

    fn send(&mut self, message: &WireMessage) -> SinkResult {
        match self.connection.as_mut() {
            Some(conn) => conn
                .send(message.as_bytes())
                .map_err(|e| SinkError(e.to_string())),
            None => Err(SinkError("MIDI port is not open".to_string())),
        }
    }

    fn close(&mut self) -> SinkResult {
        if let Some(conn) = self.connection.take() {
            let _ = conn.close();
        }
        Ok(())
    }
}

// ─── RecordingSink ──────────────────────────────────────────────────

/// A message that reached a [`RecordingSink`], with its arrival time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentMessage {
    pub at: Instant,
    pub message: WireMessage,
}

#[derive(Default)]
struct Recording {
    sent: Vec<SentMessage>,
    open: bool,
    open_count: usize,
    close_count: usize,
    fail_open: Option<String>,
    /// Outcome queue for upcoming sends; `true` = fail. Empty = succeed.
    send_failures: VecDeque<bool>,
    latency: Duration,
}

/// A sink that records every message for assertions.
///
/// Clones share the same recording, so a test keeps one clone and hands the
/// other to the dispatcher.
#[derive(Clone, Default)]
pub struct RecordingSink {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recording> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make the next `open` fail with `reason`.
    pub fn fail_open(&self, reason: &str) {
        self.lock().fail_open = Some(reason.to_string());
    }

    /// Fail the next `count` sends. Failed messages are not recorded.
    pub fn fail_next_sends(&self, count: usize) {
        self.lock().send_failures.extend(std::iter::repeat(true).take(count));
    }

    /// Let `count` sends through, then fail the one after.
    pub fn fail_after(&self, count: usize) {
        let mut rec = self.lock();
        rec.send_failures.extend(std::iter::repeat(false).take(count));
        rec.send_failures.push_back(true);
    }

    /// Simulate a slow link: every send sleeps for `latency` first.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.lock().sent.clone()
    }

    pub fn messages(&self) -> Vec<WireMessage> {
        self.lock().sent.iter().map(|s| s.message).collect()
    }

    pub fn clear(&self) {
        self.lock().sent.clear();
    }

    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    pub fn open_count(&self) -> usize {
        self.lock().open_count
    }

    pub fn close_count(&self) -> usize {
        self.lock().close_count
    }
}

impl MessageSink for RecordingSink {
    fn open(&mut self) -> SinkResult {
        let mut rec = self.lock();
        if let Some(reason) = rec.fail_open.take() {
            return Err(SinkError(reason));
        }
        rec.open = true;
        rec.open_count += 1;
        Ok(())
    }

    fn send(&mut self, message: &WireMessage) -> SinkResult {
        let latency = self.lock().latency;
        if !latency.is_zero() {
            std::thread::sleep(latency);
        }
        let mut rec = self.lock();
        if !rec.open {
            return Err(SinkError("sink is not open".to_string()));
        }
        if rec.send_failures.pop_front().unwrap_or(false) {
            return Err(SinkError(format!("injected failure for {:?}", message.as_bytes())));
        }
        rec.sent.push(SentMessage {
            at: Instant::now(),
            message: *message,
        });
        Ok(())
    }

    fn close(&mut self) -> SinkResult {
        let mut rec = self.lock();
        rec.open = false;
        rec.close_count += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_records_while_open() {
        let mut sink = RecordingSink::new();
        let msg = WireMessage::control_change(1, 7, 64);
        assert!(sink.send(&msg).is_err());
        sink.open().unwrap();
        sink.send(&msg).unwrap();
        sink.close().unwrap();
        assert_eq!(sink.messages(), vec![msg]);
        assert_eq!(sink.close_count(), 1);
    }

    #[test]
    fn injected_failures_are_consumed_in_order() {
        let mut sink = RecordingSink::new();
        sink.open().unwrap();
        sink.fail_after(1);
        let a = WireMessage::control_change(1, 1, 1);
        let b = WireMessage::control_change(1, 1, 2);
        let c = WireMessage::control_change(1, 1, 3);
        assert!(sink.send(&a).is_ok());
        assert!(sink.send(&b).is_err());
        assert!(sink.send(&c).is_ok());
        assert_eq!(sink.messages(), vec![a, c]);
    }

    #[test]
    fn clones_share_the_recording() {
        let observer = RecordingSink::new();
        let mut sink = observer.clone();
        sink.open().unwrap();
        sink.send(&WireMessage::realtime(tempera_types::CLOCK)).unwrap();
        assert_eq!(observer.messages().len(), 1);
        assert!(observer.is_open());
    }

    #[test]
    fn failed_open_is_reported_once() {
        let mut sink = RecordingSink::new();
        sink.fail_open("no such port");
        assert_eq!(sink.open(), Err(SinkError("no such port".to_string())));
        assert!(sink.open().is_ok());
    }
}
