//! The process-wide device record.
//!
//! One mutex guards the whole record. Readers take a copy through [`DeviceState::snapshot`]
//! and never see `connected`, `latest_reading` and `last_update` out of step with each
//! other. Only the acquisition session and the connect/disconnect commands write to it.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use contam_types::Reading;
use log::{info, warn};

use crate::types::DEFAULT_BAUD_RATE;

/// Hardware readings older than this are stale and replaced by synthetic data.
pub const STALENESS_THRESHOLD: Duration = Duration::from_secs(5);

/// Identifies one connect request. Bumped on every connect and disconnect, so a
/// superseded session can detect that it no longer owns the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct SessionId(pub u64);

/// A consistent copy of the device record.
#[derive(Debug, Clone)]
pub struct DeviceConnection {
    pub connected: bool,
    pub port: Option<String>,
    pub baud_rate: u32,
    pub last_error: Option<String>,
    /// Swapped as a whole on every update, never edited in place.
    pub latest_reading: Option<Arc<Reading>>,
    /// Monotonic time of the last accepted reading.
    pub last_update: Option<Instant>,
    /// Wall-clock time of the last accepted reading, for display.
    pub last_update_at: Option<DateTime<Local>>,
    pub session_id: SessionId,
}

impl Default for DeviceConnection {
    fn default() -> Self {
        Self {
            connected: false,
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            last_error: None,
            latest_reading: None,
            last_update: None,
            last_update_at: None,
            session_id: SessionId::default(),
        }
    }
}

impl DeviceConnection {
    /// Time since the last accepted reading, measured at `now`.
    pub fn age(&self, now: Instant) -> Option<Duration> {
        self.last_update
            .map(|last| now.saturating_duration_since(last))
    }

    /// True when a hardware reading exists and is younger than the staleness threshold.
    pub fn has_fresh_reading(&self, now: Instant) -> bool {
        self.connected
            && self.latest_reading.is_some()
            && self.age(now).is_some_and(|age| age < STALENESS_THRESHOLD)
    }

    /// True when connected but the last reading is older than the staleness threshold.
    pub fn is_stale(&self, now: Instant) -> bool {
        self.connected && self.age(now).is_some_and(|age| age > STALENESS_THRESHOLD)
    }
}

/// Shared handle to the device record. Cloning is cheap and every clone sees the same record.
#[derive(Debug, Clone, Default)]
pub struct DeviceState {
    inner: Arc<Mutex<DeviceConnection>>,
}

impl DeviceState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DeviceConnection> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            warn!("Device state lock was poisoned; recovering");
            poisoned.into_inner()
        })
    }

    /// Returns a copy of the whole record.
    pub fn snapshot(&self) -> DeviceConnection {
        self.lock().clone()
    }

    /// Starts a new session on `port`, superseding any running one.
    ///
    /// Returns immediately. The previous session notices the new id on its next
    /// loop turn and exits on its own.
    pub fn begin_connect(&self, port: &str, baud_rate: u32) -> SessionId {
        let mut conn = self.lock();
        if conn.connected {
            info!(
                "Superseding session {:?} on {:?} with a new connection to {}",
                conn.session_id, conn.port, port
            );
            conn.connected = false;
        }
        conn.session_id = SessionId(conn.session_id.0 + 1);
        conn.connected = true;
        conn.port = Some(port.to_string());
        conn.baud_rate = baud_rate;
        conn.last_error = None;
        conn.latest_reading = None;
        conn.last_update = None;
        conn.last_update_at = None;
        conn.session_id
    }

    /// Whether `session` still owns the record and should keep reading.
    pub fn should_continue(&self, session: SessionId) -> bool {
        let conn = self.lock();
        conn.connected && conn.session_id == session
    }

    /// Stores a freshly parsed reading.
    ///
    /// A no-op returning `false` when disconnected or when `session` has been superseded.
    pub fn record_reading(&self, session: SessionId, reading: Reading) -> bool {
        let mut conn = self.lock();
        if !conn.connected || conn.session_id != session {
            return false;
        }
        let now = Instant::now();
        conn.last_update = Some(conn.last_update.map_or(now, |prev| prev.max(now)));
        conn.last_update_at = Some(reading.timestamp);
        conn.latest_reading = Some(Arc::new(reading));
        true
    }

    /// Marks the link as failed. Ignored when `session` has been superseded.
    pub fn record_fatal_error(&self, session: SessionId, message: impl Into<String>) -> bool {
        let mut conn = self.lock();
        if conn.session_id != session {
            return false;
        }
        conn.connected = false;
        conn.last_error = Some(message.into());
        conn.latest_reading = None;
        true
    }

    /// Asks the running session, if any, to stop. Idempotent.
    ///
    /// Returns whether a session was connected. The device handle is closed by the
    /// session itself when it observes the flag.
    pub fn disconnect(&self) -> bool {
        let mut conn = self.lock();
        let was_connected = conn.connected;
        if was_connected {
            conn.session_id = SessionId(conn.session_id.0 + 1);
        }
        conn.connected = false;
        conn.latest_reading = None;
        conn.last_error = None;
        was_connected
    }
}
