//! Serial acquisition: the link abstraction, the line parser and the session state machine.

pub mod link;
pub mod parser;
pub mod session;

pub use link::{BufferedLineReader, LineEvent, LineReader, LinkOpener, SerialOpener};
pub use parser::{parse_line, ParseError};
pub use session::{AcquisitionSession, SessionState, SessionStats};
