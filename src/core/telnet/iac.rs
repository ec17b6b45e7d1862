//! Telnet IAC de-interleaving
//!
//! Separates in-band commands from data bytes and produces the replies our
//! negotiation policy requires. The decoder is stateful, so a command split
//! across two socket reads is handled the same as one read whole.
//!
//! ```text
//! Data ──IAC──> SawIac ──WILL/WONT/DO/DONT──> SawCommand ──opt──> Data
//!                  │ ──IAC──> Data (literal 0xFF)
//!                  │ ──SB───> SawSb ──IAC──> SawSbIac ──SE──> Data
//!                  └ ──other─> Data (consumed)
//! ```

use std::collections::BTreeSet;

use super::protocol::{self, option, Verb, IAC, SB, SE, TTYPE_IS, TTYPE_SEND};

const MAX_SUBNEGOTIATION_LEN: usize = 4096;

/// Options we are willing to enable, on either side of the connection.
/// Everything else is refused, which keeps the stream in plain NVT mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NegotiationPolicy {
    /// Options the peer may enable (`WILL x` answered with `DO x`)
    pub accept_remote: BTreeSet<u8>,
    /// Options we enable when asked (`DO x` answered with `WILL x`)
    pub offer_local: BTreeSet<u8>,
    /// Reported in TTYPE subnegotiation
    pub terminal_type: String,
}

impl Default for NegotiationPolicy {
    fn default() -> Self {
        Self {
            accept_remote: BTreeSet::new(),
            offer_local: BTreeSet::new(),
            terminal_type: "ANSI".to_string(),
        }
    }
}

impl NegotiationPolicy {
    /// Refuse every option.
    pub fn refuse_all() -> Self {
        Self::default()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum IacState {
    #[default]
    Data,
    SawIac,
    SawCommand(Verb),
    SawSb,
    SawSbIac,
}

/// Result of decoding one chunk
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IacOutput {
    /// Data bytes with all commands removed
    pub data: Vec<u8>,
    /// Replies to transmit, in the order their triggers arrived
    pub replies: Vec<Vec<u8>>,
}

/// Stateful IAC decoder
#[derive(Debug, Default)]
pub struct IacDecoder {
    state: IacState,
    policy: NegotiationPolicy,
    local_enabled: BTreeSet<u8>,
    remote_enabled: BTreeSet<u8>,
    sb_buffer: Vec<u8>,
}

impl IacDecoder {
    pub fn new(policy: NegotiationPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// Whether we have agreed to perform `opt` ourselves
    pub fn local_enabled(&self, opt: u8) -> bool {
        self.local_enabled.contains(&opt)
    }

    /// Whether the peer has agreed to perform `opt`
    pub fn remote_enabled(&self, opt: u8) -> bool {
        self.remote_enabled.contains(&opt)
    }

    /// True when no command is partially received
    pub fn is_idle(&self) -> bool {
        self.state == IacState::Data
    }

    pub fn decode(&mut self, input: &[u8]) -> IacOutput {
        let mut out = IacOutput {
            data: Vec::with_capacity(input.len()),
            replies: Vec::new(),
        };

        for &byte in input {
            self.feed(byte, &mut out);
        }

        out
    }

    fn feed(&mut self, byte: u8, out: &mut IacOutput) {
        match self.state {
            IacState::Data => {
                if byte == IAC {
                    self.state = IacState::SawIac;
                } else {
                    out.data.push(byte);
                }
            }
            IacState::SawIac => self.command(byte, out),
            IacState::SawCommand(verb) => {
                self.negotiate(verb, byte, out);
                self.state = IacState::Data;
            }
            IacState::SawSb => {
                if byte == IAC {
                    self.state = IacState::SawSbIac;
                } else {
                    self.push_sb(byte);
                }
            }
            IacState::SawSbIac => match byte {
                SE => {
                    let payload = std::mem::take(&mut self.sb_buffer);
                    self.subnegotiation(&payload, out);
                    self.state = IacState::Data;
                }
                IAC => {
                    self.push_sb(IAC);
                    self.state = IacState::SawSb;
                }
                _ => {
                    // Missing SE: drop the block and read this as a command
                    tracing::debug!("Unterminated subnegotiation ({} bytes)", self.sb_buffer.len());
                    self.sb_buffer.clear();
                    self.command(byte, out);
                }
            },
        }
    }

    /// Byte following IAC
    fn command(&mut self, byte: u8, out: &mut IacOutput) {
        self.state = IacState::Data;

        if byte == IAC {
            out.data.push(IAC);
        } else if let Some(verb) = Verb::from_byte(byte) {
            self.state = IacState::SawCommand(verb);
        } else if byte == SB {
            self.sb_buffer.clear();
            self.state = IacState::SawSb;
        } else {
            // NOP, GA, AYT, stray SE and unknown codes carry no data
            tracing::trace!("Ignoring IAC {}", byte);
        }
    }

    fn push_sb(&mut self, byte: u8) {
        if self.sb_buffer.len() < MAX_SUBNEGOTIATION_LEN {
            self.sb_buffer.push(byte);
        }
    }

    fn negotiate(&mut self, verb: Verb, opt: u8, out: &mut IacOutput) {
        let reply = match verb {
            Verb::Do if self.policy.offer_local.contains(&opt) => {
                self.local_enabled.insert(opt).then_some(Verb::Will)
            }
            Verb::Do => Some(Verb::Wont),
            Verb::Will if self.policy.accept_remote.contains(&opt) => {
                self.remote_enabled.insert(opt).then_some(Verb::Do)
            }
            Verb::Will => Some(Verb::Dont),
            Verb::Dont => self.local_enabled.remove(&opt).then_some(Verb::Wont),
            Verb::Wont => self.remote_enabled.remove(&opt).then_some(Verb::Dont),
        };

        tracing::debug!("Received {:?} {}, replying {:?}", verb, opt, reply);

        if let Some(reply) = reply {
            out.replies.push(protocol::command(reply, opt));
        }
    }

    fn subnegotiation(&mut self, payload: &[u8], out: &mut IacOutput) {
        match payload {
            [option::TERMINAL_TYPE, TTYPE_SEND, ..] if self.local_enabled(option::TERMINAL_TYPE) => {
                let mut reply = vec![IAC, SB, option::TERMINAL_TYPE, TTYPE_IS];
                reply.extend(protocol::escape_iac(self.policy.terminal_type.as_bytes()));
                reply.extend([IAC, SE]);
                tracing::debug!("Sending terminal type {:?}", self.policy.terminal_type);
                out.replies.push(reply);
            }
            _ => {
                tracing::trace!("Ignoring subnegotiation {:?}", payload.first());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::telnet::protocol::{DO, DONT, GA, NOP, WILL, WONT};

    fn refusing() -> IacDecoder {
        IacDecoder::new(NegotiationPolicy::refuse_all())
    }

    #[test]
    fn test_plain_data_unchanged() {
        let out = refusing().decode(b"Hello, World!");
        assert_eq!(out.data, b"Hello, World!");
        assert!(out.replies.is_empty());
    }

    #[test]
    fn test_doubled_iac_is_literal() {
        let out = refusing().decode(&[b'a', IAC, IAC, b'b']);
        assert_eq!(out.data, vec![b'a', 0xFF, b'b']);
    }

    #[test]
    fn test_unsupported_options_refused() {
        let out = refusing().decode(&[b'A', IAC, DO, 24, b'B', IAC, WILL, 1, b'C']);

        assert_eq!(out.data, b"ABC");
        assert_eq!(out.replies, vec![vec![IAC, WONT, 24], vec![IAC, DONT, 1]]);
    }

    #[test]
    fn test_negative_commands_for_disabled_options_are_silent() {
        let out = refusing().decode(&[IAC, DONT, 1, IAC, WONT, 3]);
        assert!(out.data.is_empty());
        assert!(out.replies.is_empty());
    }

    #[test]
    fn test_subnegotiation_consumed() {
        let out = refusing().decode(&[b'x', IAC, SB, 31, 0, 80, IAC, IAC, 24, IAC, SE, b'y']);

        assert_eq!(out.data, b"xy");
        assert!(out.replies.is_empty());
    }

    #[test]
    fn test_simple_commands_consumed() {
        let out = refusing().decode(&[b'a', IAC, NOP, b'b', IAC, GA, b'c', IAC, 7, b'd']);
        assert_eq!(out.data, b"abcd");
    }

    #[test]
    fn test_command_split_across_chunks() {
        let mut decoder = refusing();

        let first = decoder.decode(&[b'a', IAC]);
        assert_eq!(first.data, b"a");
        assert!(!decoder.is_idle());

        let second = decoder.decode(&[DO]);
        assert!(second.data.is_empty() && second.replies.is_empty());

        let third = decoder.decode(&[1, b'b']);
        assert_eq!(third.data, b"b");
        assert_eq!(third.replies, vec![vec![IAC, WONT, 1]]);
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_supported_options_acknowledged_once() {
        let mut policy = NegotiationPolicy::default();
        policy.accept_remote.insert(option::ECHO);
        policy.offer_local.insert(option::SUPPRESS_GO_AHEAD);
        let mut decoder = IacDecoder::new(policy);

        let out = decoder.decode(&[IAC, WILL, option::ECHO, IAC, DO, option::SUPPRESS_GO_AHEAD]);
        assert_eq!(
            out.replies,
            vec![vec![IAC, DO, option::ECHO], vec![IAC, WILL, option::SUPPRESS_GO_AHEAD]]
        );
        assert!(decoder.remote_enabled(option::ECHO));
        assert!(decoder.local_enabled(option::SUPPRESS_GO_AHEAD));

        // Repeats are not answered, so a chatty peer cannot start a loop
        let again = decoder.decode(&[IAC, WILL, option::ECHO]);
        assert!(again.replies.is_empty());

        let off = decoder.decode(&[IAC, WONT, option::ECHO]);
        assert_eq!(off.replies, vec![vec![IAC, DONT, option::ECHO]]);
        assert!(!decoder.remote_enabled(option::ECHO));
    }

    #[test]
    fn test_terminal_type_subnegotiation() {
        let mut policy = NegotiationPolicy::default();
        policy.offer_local.insert(option::TERMINAL_TYPE);
        policy.terminal_type = "VT100".to_string();
        let mut decoder = IacDecoder::new(policy);

        decoder.decode(&[IAC, DO, option::TERMINAL_TYPE]);
        let out = decoder.decode(&[IAC, SB, option::TERMINAL_TYPE, TTYPE_SEND, IAC, SE]);

        let mut expected = vec![IAC, SB, option::TERMINAL_TYPE, TTYPE_IS];
        expected.extend(b"VT100");
        expected.extend([IAC, SE]);
        assert_eq!(out.replies, vec![expected]);
    }

    #[test]
    fn test_terminal_type_not_sent_unless_enabled() {
        let out = refusing().decode(&[IAC, SB, option::TERMINAL_TYPE, TTYPE_SEND, IAC, SE]);
        assert!(out.replies.is_empty());
    }

    #[test]
    fn test_unterminated_subnegotiation_recovers() {
        let mut decoder = refusing();
        let out = decoder.decode(&[IAC, SB, 24, 1, IAC, DO, 5, b'z']);

        assert_eq!(out.data, b"z");
        assert_eq!(out.replies, vec![vec![IAC, WONT, 5]]);
    }
}
