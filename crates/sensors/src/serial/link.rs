use std::io::{ErrorKind, Read};

use log::{debug, info};
use serialport::{ClearBuffer, FlowControl, SerialPort};

use crate::types::{DriverError, SerialSettings};

/// Longest line kept while waiting for a newline. Anything longer is dropped.
const MAX_LINE_BYTES: usize = 4096;
const READ_CHUNK_BYTES: usize = 256;

/// Outcome of one bounded wait for input.
#[derive(Debug)]
pub enum LineEvent {
    /// A complete line, without its terminator.
    Line(String),
    /// No input arrived within the read timeout.
    Timeout,
    /// Input arrived but no line is complete yet.
    Partial,
    /// The other end closed the stream.
    Closed,
    /// The link failed.
    Failed(std::io::Error),
}

/// An open link that yields newline-delimited input.
pub trait LineReader: Send {
    /// Waits for the next line, bounded by the link's read timeout.
    fn next_line(&mut self) -> LineEvent;

    /// Releases the link. Errors are reported, never retried.
    fn close(&mut self) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Opens links for acquisition sessions.
pub trait LinkOpener: Send + Sync + 'static {
    /// Opens the link described by `settings`.
    ///
    /// Only reads are bounded by `settings.read_timeout`. How long the open itself
    /// may block is up to the implementation; [`SerialOpener`] inherits whatever the
    /// OS does for the device node, which has no timeout of its own.
    fn open(&self, settings: &SerialSettings) -> Result<Box<dyn LineReader>, DriverError>;

    /// Reports whether links can be opened on this host at all.
    fn capability(&self) -> Result<(), DriverError> {
        Ok(())
    }
}

/// Splits a byte stream into lines.
///
/// `\n`, `\r\n` and a bare `\r` all end a line, and empty lines are skipped.
/// Bytes received before a timeout are kept, so a line split across two read
/// windows is still delivered whole. Every call performs at most one read, so
/// a device that streams bytes without a terminator cannot hold the caller.
pub struct BufferedLineReader<R> {
    inner: R,
    pending: Vec<u8>,
}

impl<R: Read> BufferedLineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::new(),
        }
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    fn take_line(&mut self) -> Option<String> {
        loop {
            let end = self.pending.iter().position(|b| *b == b'\n' || *b == b'\r')?;
            let mut consumed = end + 1;
            if self.pending[end] == b'\r' && self.pending.get(end + 1) == Some(&b'\n') {
                consumed += 1;
            }
            let line: Vec<u8> = self.pending.drain(..consumed).take(end).collect();
            if !line.is_empty() {
                return Some(String::from_utf8_lossy(&line).into_owned());
            }
        }
    }

    pub fn read_next(&mut self) -> LineEvent {
        if let Some(line) = self.take_line() {
            return LineEvent::Line(line);
        }
        if self.pending.len() > MAX_LINE_BYTES {
            debug!("Dropping {} bytes without a line terminator", self.pending.len());
            self.pending.clear();
        }

        let mut chunk = [0u8; READ_CHUNK_BYTES];
        match self.inner.read(&mut chunk) {
            Ok(0) => LineEvent::Closed,
            Ok(n) => {
                self.pending.extend_from_slice(&chunk[..n]);
                match self.take_line() {
                    Some(line) => LineEvent::Line(line),
                    None => LineEvent::Partial,
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) =>
            {
                LineEvent::Timeout
            }
            Err(e) => LineEvent::Failed(e),
        }
    }
}

impl<R: Read + Send> LineReader for BufferedLineReader<R> {
    fn next_line(&mut self) -> LineEvent {
        self.read_next()
    }
}

/// A serial port wrapped for line reading.
pub struct SerialLink {
    name: String,
    reader: BufferedLineReader<Box<dyn SerialPort>>,
}

impl LineReader for SerialLink {
    fn next_line(&mut self) -> LineEvent {
        self.reader.read_next()
    }

    fn close(&mut self) -> Result<(), DriverError> {
        self.reader
            .get_mut()
            .clear(ClearBuffer::All)
            .map_err(|e| DriverError::IoError(format!("failed to flush {}: {}", self.name, e)))
    }
}

/// Opens real serial ports through the `serialport` crate.
///
/// `serialport` offers no open timeout, so a wedged driver can block `open`
/// indefinitely. Reads after that are bounded by the configured read timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialOpener;

impl LinkOpener for SerialOpener {
    fn open(&self, settings: &SerialSettings) -> Result<Box<dyn LineReader>, DriverError> {
        let port = serialport::new(&settings.port, settings.baud_rate)
            .timeout(settings.read_timeout)
            .flow_control(FlowControl::None)
            .open()
            .map_err(|e| DriverError::OpenError {
                port: settings.port.clone(),
                reason: e.to_string(),
            })?;

        info!(
            "Serial port {} opened at {} baud (read timeout {:?})",
            settings.port, settings.baud_rate, settings.read_timeout
        );

        Ok(Box::new(SerialLink {
            name: settings.port.clone(),
            reader: BufferedLineReader::new(port),
        }))
    }

    fn capability(&self) -> Result<(), DriverError> {
        crate::ports::serial_capability()
    }
}
