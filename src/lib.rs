//! bbsterm - Telnet BBS client core
//!
//! Two independent pieces composed by the caller:
//!
//! - [`EscapeSequenceParser`] turns text containing ANSI escape sequences
//!   into styled runs, incrementally and without ever failing.
//! - [`TelnetSession`] connects to a host, strips and answers Telnet
//!   commands on a worker thread, and reports data through a channel.
//!
//! ```no_run
//! use std::time::Duration;
//! use bbsterm::{EscapeSequenceParser, SessionEvent, SessionParameters, TelnetSession, TextDecoder};
//!
//! let mut session = TelnetSession::new(SessionParameters::new("bbs.example.org"));
//! session.connect()?;
//!
//! let mut decoder = TextDecoder::new();
//! let mut parser = EscapeSequenceParser::new();
//! while let Ok(event) = session.events().recv() {
//!     match event {
//!         SessionEvent::Data(bytes) => {
//!             for run in parser.parse(&decoder.decode(&bytes)) {
//!                 print!("{}", run.text);
//!             }
//!         }
//!         SessionEvent::Closed | SessionEvent::Error(_) => break,
//!         SessionEvent::Established => {}
//!     }
//! }
//! session.join(Duration::from_secs(1));
//! # Ok::<(), bbsterm::SessionError>(())
//! ```

pub mod config;
pub mod core;
pub mod ui;

pub use crate::core::telnet::{
    ConnectionState, NegotiationPolicy, OutboundSender, PromptKeywords, SessionError,
    SessionEvent, SessionOptions, SessionParameters, TelnetSession,
};
pub use crate::core::term::{
    decode_lossy, AttrFlags, Color, EscapeSequenceParser, StyledRun, TextAttributes, TextDecoder,
};
