//! Telnet client session
//!
//! - **protocol**: command and option bytes
//! - **iac**: IAC de-interleaving and option negotiation
//! - **login**: automatic credential submission
//! - **session**: socket worker, lifecycle and events

pub mod iac;
pub mod login;
pub mod protocol;
pub mod session;

pub use iac::{IacDecoder, IacOutput, NegotiationPolicy};
pub use login::{CredentialResponder, LoginStage, PromptKeywords};
pub use session::{
    ConnectionState, OutboundSender, SessionError, SessionEvent, SessionOptions,
    SessionParameters, TelnetSession, DEFAULT_PORT,
};
