use std::time::{Duration, Instant};

use crate::frame::Frame;

/// Fraction of the negotiated send interval after which an alive byte is
/// considered due.
pub const DEFAULT_INTERVAL_USAGE: f32 = 0.65;

/// Multiple of the negotiated receive interval the server may stay silent
/// before [`ServerAliveObserver`] declares the connection dead.
pub const DEFAULT_ALIVE_FACTOR: f32 = 2.0;

/// Requests an observer can hand back to the connection after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverSignal {
    /// Emit a single heartbeat byte now.
    SendAlive,
    /// The server missed its alive deadline; fail the current operation.
    ConnectionDead,
}

/// Pluggable hooks invoked by the connection on I/O milestones.
///
/// Implementations must be non-blocking and side-effect-limited: they
/// observe, update their own bookkeeping, and communicate back solely
/// through [`ConnectionObserver::signal`], which the connection polls after
/// dispatching each event.
pub trait ConnectionObserver: Send {
    /// A complete frame was written to the wire.
    fn sent_frame(&mut self, _frame: &Frame) {}
    /// A complete frame was decoded from the wire.
    fn received_frame(&mut self, _frame: &Frame) {}
    /// A readiness poll or read produced no data.
    fn empty_read(&mut self) {}
    /// The parser holds no complete frame.
    fn empty_buffer(&mut self) {}
    /// A lone heartbeat byte arrived.
    fn empty_line_read(&mut self) {}
    /// Polled after each event; return a request for the connection.
    fn signal(&mut self) -> Option<ObserverSignal> {
        None
    }
}

#[derive(Clone, Copy)]
pub(crate) enum ObserverEvent<'a> {
    Sent(&'a Frame),
    Received(&'a Frame),
    EmptyRead,
    EmptyBuffer,
    EmptyLine,
}

pub(crate) fn dispatch(
    observers: &mut [Box<dyn ConnectionObserver>],
    event: ObserverEvent<'_>,
) -> Vec<ObserverSignal> {
    let mut signals = Vec::new();
    for observer in observers.iter_mut() {
        match event {
            ObserverEvent::Sent(frame) => observer.sent_frame(frame),
            ObserverEvent::Received(frame) => observer.received_frame(frame),
            ObserverEvent::EmptyRead => observer.empty_read(),
            ObserverEvent::EmptyBuffer => observer.empty_buffer(),
            ObserverEvent::EmptyLine => observer.empty_line_read(),
        }
        if let Some(signal) = observer.signal() {
            signals.push(signal);
        }
    }
    signals
}

/// Keeps the negotiated client-to-server heartbeat alive.
///
/// On every empty-read/empty-buffer tick it checks the time since the last
/// outbound traffic; once that exceeds the negotiated send interval scaled
/// by `interval_usage`, it asks the connection to emit an alive byte.
#[derive(Debug)]
pub struct HeartbeatEmitter {
    interval: Duration,
    interval_usage: f32,
    last_sent: Instant,
    due: bool,
}

impl HeartbeatEmitter {
    pub fn new(interval: Duration) -> Self {
        Self::with_usage(interval, DEFAULT_INTERVAL_USAGE)
    }

    /// `interval_usage` is clamped to `0.1..=1.0`.
    pub fn with_usage(interval: Duration, interval_usage: f32) -> Self {
        Self {
            interval,
            interval_usage: interval_usage.clamp(0.1, 1.0),
            last_sent: Instant::now(),
            due: false,
        }
    }

    fn check(&mut self) {
        if self.last_sent.elapsed() >= self.interval.mul_f32(self.interval_usage) {
            self.due = true;
        }
    }
}

impl ConnectionObserver for HeartbeatEmitter {
    fn sent_frame(&mut self, _frame: &Frame) {
        self.last_sent = Instant::now();
        self.due = false;
    }

    fn empty_read(&mut self) {
        self.check();
    }

    fn empty_buffer(&mut self) {
        self.check();
    }

    fn signal(&mut self) -> Option<ObserverSignal> {
        if self.due {
            self.due = false;
            self.last_sent = Instant::now();
            Some(ObserverSignal::SendAlive)
        } else {
            None
        }
    }
}

/// Watches the server-to-client heartbeat.
///
/// Tracks the time since the last inbound frame or heartbeat byte; once it
/// exceeds the negotiated receive interval times `factor`, the next signal
/// poll reports the connection dead and the pending read/write fails with a
/// heartbeat error.
#[derive(Debug)]
pub struct ServerAliveObserver {
    interval: Duration,
    factor: f32,
    last_seen: Instant,
    dead: bool,
    reported: bool,
}

impl ServerAliveObserver {
    pub fn new(interval: Duration) -> Self {
        Self::with_factor(interval, DEFAULT_ALIVE_FACTOR)
    }

    pub fn with_factor(interval: Duration, factor: f32) -> Self {
        Self {
            interval,
            factor: factor.max(1.0),
            last_seen: Instant::now(),
            dead: false,
            reported: false,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.dead
    }

    fn check(&mut self) {
        if self.last_seen.elapsed() > self.interval.mul_f32(self.factor) {
            self.dead = true;
        }
    }
}

impl ConnectionObserver for ServerAliveObserver {
    fn received_frame(&mut self, _frame: &Frame) {
        self.last_seen = Instant::now();
        self.dead = false;
    }

    fn empty_line_read(&mut self) {
        self.last_seen = Instant::now();
        self.dead = false;
    }

    fn empty_read(&mut self) {
        self.check();
    }

    fn empty_buffer(&mut self) {
        self.check();
    }

    fn signal(&mut self) -> Option<ObserverSignal> {
        if self.dead && !self.reported {
            self.reported = true;
            Some(ObserverSignal::ConnectionDead)
        } else {
            None
        }
    }
}
