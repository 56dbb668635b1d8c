//! Owns the background acquisition thread.
//!
//! At most one session is started per connect request. A superseded session is
//! detached and exits on its own within one read timeout once it sees that it no
//! longer owns the device record.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use contam_sensor::{
    AcquisitionSession, DeviceState, DriverError, LinkOpener, SerialSettings, SessionId,
    SessionStats,
};

pub struct AcquisitionController {
    device: DeviceState,
    opener: Arc<dyn LinkOpener>,
    read_timeout: Duration,
    current: Mutex<Option<(SessionId, JoinHandle<SessionStats>)>>,
}

impl AcquisitionController {
    pub fn new(device: DeviceState, opener: Arc<dyn LinkOpener>, read_timeout: Duration) -> Self {
        Self {
            device,
            opener,
            read_timeout,
            current: Mutex::new(None),
        }
    }

    pub fn device(&self) -> &DeviceState {
        &self.device
    }

    /// Checks that serial links can be opened on this host.
    pub fn capability(&self) -> Result<(), DriverError> {
        self.opener.capability()
    }

    fn current(&self) -> MutexGuard<'_, Option<(SessionId, JoinHandle<SessionStats>)>> {
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts a session on `port` in the background and returns right away.
    ///
    /// Fails without touching the device record when the settings are invalid or
    /// serial links are unavailable. Whether the device actually opened is observed
    /// later through the device status.
    pub fn connect(&self, port: &str, baud_rate: u32) -> Result<SessionId, DriverError> {
        let settings =
            SerialSettings::new(port.trim(), baud_rate).with_read_timeout(self.read_timeout);
        settings.validate()?;
        self.capability()?;

        // Held until the handle is stored so the tracked thread always belongs to
        // the newest session.
        let mut current = self.current();

        let id = self.device.begin_connect(&settings.port, baud_rate);
        tracing::info!(
            "Starting session {:?} on {} at {} baud",
            id,
            settings.port,
            baud_rate
        );
        let session =
            AcquisitionSession::new(id, settings, self.device.clone(), self.opener.clone());

        let spawned = thread::Builder::new()
            .name("serial_acq".into())
            .spawn(move || session.run());

        match spawned {
            Ok(handle) => {
                if let Some((previous, handle)) = current.replace((id, handle)) {
                    if !handle.is_finished() {
                        tracing::debug!("Detaching acquisition thread of session {:?}", previous);
                    }
                }
                Ok(id)
            }
            Err(e) => {
                let err = DriverError::IoError(format!("failed to spawn acquisition thread: {}", e));
                tracing::error!("{}", err);
                self.device.record_fatal_error(id, err.to_string());
                Err(err)
            }
        }
    }

    /// Session whose thread `shutdown` would wait for.
    pub fn tracked_session(&self) -> Option<SessionId> {
        self.current().as_ref().map(|(id, _)| *id)
    }

    /// Signals the running session to stop. Safe to call when nothing is connected.
    pub fn disconnect(&self) -> bool {
        let was_connected = self.device.disconnect();
        if was_connected {
            tracing::info!("Disconnect requested");
        }
        was_connected
    }

    /// Disconnects and waits for the current session thread to exit.
    ///
    /// Blocks for at most about one read timeout.
    pub fn shutdown(&self) {
        self.disconnect();
        let tracked = self.current().take();
        if let Some((_, handle)) = tracked {
            match handle.join() {
                Ok(stats) => tracing::info!("Acquisition thread stopped: {:?}", stats),
                Err(_) => tracing::error!("Acquisition thread panicked"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contam_sensor::serial::{LineEvent, LineReader};
    use std::time::Instant;

    struct SteadyLink;

    impl LineReader for SteadyLink {
        fn next_line(&mut self) -> LineEvent {
            thread::sleep(Duration::from_millis(5));
            LineEvent::Line(r#"{"sensor_value": 1.0, "ph": 7.0, "temperature": 20.0}"#.into())
        }
    }

    struct SteadyOpener;

    impl LinkOpener for SteadyOpener {
        fn open(&self, _settings: &SerialSettings) -> Result<Box<dyn LineReader>, DriverError> {
            Ok(Box::new(SteadyLink))
        }
    }

    fn controller() -> AcquisitionController {
        AcquisitionController::new(
            DeviceState::new(),
            Arc::new(SteadyOpener),
            Duration::from_millis(20),
        )
    }

    fn wait_for_reading(device: &DeviceState) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if device.snapshot().latest_reading.is_some() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_connect_rejects_empty_port() {
        let controller = controller();
        assert!(matches!(
            controller.connect("   ", 9600),
            Err(DriverError::ConfigurationError(_))
        ));
        assert!(!controller.device().snapshot().connected);
    }

    #[test]
    fn test_connect_then_shutdown() {
        let controller = controller();
        controller.connect("/dev/ttyFAKE", 9600).unwrap();
        assert!(wait_for_reading(controller.device()));

        controller.shutdown();
        let snap = controller.device().snapshot();
        assert!(!snap.connected);
        assert!(snap.latest_reading.is_none());
    }

    #[test]
    fn test_reconnect_leaves_one_active_session() {
        let controller = controller();
        let first = controller.connect("/dev/ttyA", 9600).unwrap();
        let second = controller.connect("/dev/ttyB", 19200).unwrap();
        assert!(second > first);
        assert!(wait_for_reading(controller.device()));

        let snap = controller.device().snapshot();
        assert!(snap.connected);
        assert_eq!(snap.session_id, second);
        assert_eq!(snap.port.as_deref(), Some("/dev/ttyB"));

        controller.shutdown();
        assert!(!controller.device().snapshot().connected);
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let controller = controller();
        assert!(!controller.disconnect());
        assert!(!controller.disconnect());
        assert!(!controller.device().snapshot().connected);
    }

    #[test]
    fn test_concurrent_connects_track_the_newest_session() {
        for _ in 0..20 {
            let controller = Arc::new(controller());
            let workers: Vec<_> = (0..4)
                .map(|i| {
                    let controller = controller.clone();
                    thread::spawn(move || {
                        controller.connect(&format!("/dev/ttyC{}", i), 9600).unwrap()
                    })
                })
                .collect();
            for worker in workers {
                worker.join().unwrap();
            }

            let newest = controller.device().snapshot().session_id;
            assert_eq!(controller.tracked_session(), Some(newest));

            controller.shutdown();
            assert_eq!(controller.tracked_session(), None);
            assert!(!controller.device().snapshot().connected);
        }
    }
}
