//! Core client components.
//!
//! - **term**: ANSI escape sequence parser producing styled text runs
//! - **telnet**: Telnet session over TCP with its own I/O worker
//!
//! # Architecture
//!
//! ```text
//! TelnetSession (worker thread)
//! ├── TcpStream
//! ├── IacDecoder ──> SessionEvent::Data(bytes)
//! └── CredentialResponder
//!
//! owner: bytes ──TextDecoder──> text ──EscapeSequenceParser──> StyledRun
//! ```

pub mod telnet;
pub mod term;
