//! One lifetime of a hardware link, from open to close.
//!
//! The session is an explicit state machine. [`AcquisitionSession::step`] advances it by
//! exactly one transition, and [`AcquisitionSession::run`] steps until `Terminated`.
//! Only the channel itself failing is fatal. Malformed lines and read timeouts are
//! absorbed and the loop carries on.

use std::sync::Arc;

use chrono::Local;
use contam_types::SensorError;
use log::{debug, error, info, trace, warn};

use super::link::{LineEvent, LineReader, LinkOpener};
use super::parser::parse_line;
use crate::device_state::{DeviceState, SessionId};
use crate::types::{DriverError, SerialSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opening,
    Reading,
    Closing,
    Terminated,
}

/// Counters kept for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub lines_accepted: u64,
    pub lines_discarded: u64,
    pub timeouts: u64,
}

pub struct AcquisitionSession {
    id: SessionId,
    settings: SerialSettings,
    device: DeviceState,
    opener: Arc<dyn LinkOpener>,
    link: Option<Box<dyn LineReader>>,
    phase: SessionState,
    stats: SessionStats,
}

impl AcquisitionSession {
    /// Creates a session for the connect request identified by `id`. Nothing is opened yet.
    pub fn new(
        id: SessionId,
        settings: SerialSettings,
        device: DeviceState,
        opener: Arc<dyn LinkOpener>,
    ) -> Self {
        Self {
            id,
            settings,
            device,
            opener,
            link: None,
            phase: SessionState::Opening,
            stats: SessionStats::default(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn phase(&self) -> SessionState {
        self.phase
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Runs the session to completion on the calling thread.
    pub fn run(mut self) -> SessionStats {
        while self.step() != SessionState::Terminated {}
        info!(
            "Session {:?} on {} finished: {} accepted, {} discarded, {} timeouts",
            self.id,
            self.settings.port,
            self.stats.lines_accepted,
            self.stats.lines_discarded,
            self.stats.timeouts
        );
        self.stats
    }

    /// Performs one transition and returns the new state.
    pub fn step(&mut self) -> SessionState {
        self.phase = match self.phase {
            SessionState::Opening => self.open(),
            SessionState::Reading => self.read_once(),
            SessionState::Closing => self.close(),
            SessionState::Terminated => SessionState::Terminated,
        };
        self.phase
    }

    fn open(&mut self) -> SessionState {
        if !self.device.should_continue(self.id) {
            debug!("Session {:?} cancelled before opening", self.id);
            return SessionState::Terminated;
        }

        match self.opener.open(&self.settings) {
            Ok(link) => {
                info!(
                    "Session {:?} reading from {} at {} baud",
                    self.id, self.settings.port, self.settings.baud_rate
                );
                self.link = Some(link);
                SessionState::Reading
            }
            Err(e) => {
                error!("Session {:?}: {}", self.id, e);
                self.device.record_fatal_error(self.id, e.to_string());
                SessionState::Terminated
            }
        }
    }

    fn read_once(&mut self) -> SessionState {
        if !self.device.should_continue(self.id) {
            info!("Session {:?} asked to stop", self.id);
            return SessionState::Closing;
        }

        let Some(link) = self.link.as_mut() else {
            return SessionState::Closing;
        };

        match link.next_line() {
            LineEvent::Line(line) => {
                if line.trim().is_empty() {
                    return SessionState::Reading;
                }
                match parse_line(&line, Local::now()) {
                    Ok(reading) => {
                        trace!("Session {:?} reading: {:?}", self.id, reading);
                        if !self.device.record_reading(self.id, reading) {
                            info!("Session {:?} superseded; dropping reading", self.id);
                            return SessionState::Closing;
                        }
                        self.stats.lines_accepted += 1;
                    }
                    Err(e) => {
                        debug!("Discarding line {:?}: {}", line, e);
                        self.stats.lines_discarded += 1;
                    }
                }
                SessionState::Reading
            }
            LineEvent::Timeout => {
                self.stats.timeouts += 1;
                SessionState::Reading
            }
            LineEvent::Partial => SessionState::Reading,
            LineEvent::Closed => {
                let err = SensorError::Disconnected("device closed the stream".to_string());
                error!("Session {:?} on {}: {}", self.id, self.settings.port, err);
                self.device.record_fatal_error(self.id, err.to_string());
                SessionState::Closing
            }
            LineEvent::Failed(io_err) => {
                let err = DriverError::from(io_err);
                error!("Session {:?} on {}: {}", self.id, self.settings.port, err);
                self.device.record_fatal_error(self.id, err.to_string());
                SessionState::Closing
            }
        }
    }

    fn close(&mut self) -> SessionState {
        if let Some(mut link) = self.link.take() {
            if let Err(e) = link.close() {
                warn!("Session {:?}: error while closing {}: {}", self.id, self.settings.port, e);
            }
        }
        info!("Session {:?} closed {}", self.id, self.settings.port);
        SessionState::Terminated
    }
}
