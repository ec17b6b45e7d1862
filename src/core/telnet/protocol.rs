//! Telnet command and option bytes (RFC 854, RFC 855)

/// Interpret As Command
pub const IAC: u8 = 255;
pub const DONT: u8 = 254;
pub const DO: u8 = 253;
pub const WONT: u8 = 252;
pub const WILL: u8 = 251;
/// Subnegotiation begin
pub const SB: u8 = 250;
pub const GA: u8 = 249;
pub const NOP: u8 = 241;
/// Subnegotiation end
pub const SE: u8 = 240;

/// Option codes
pub mod option {
    pub const BINARY: u8 = 0;
    pub const ECHO: u8 = 1;
    pub const SUPPRESS_GO_AHEAD: u8 = 3;
    pub const TERMINAL_TYPE: u8 = 24;
    pub const NAWS: u8 = 31;
}

/// TTYPE subnegotiation verbs (RFC 1091)
pub const TTYPE_IS: u8 = 0;
pub const TTYPE_SEND: u8 = 1;

/// Negotiation verbs that take an option byte
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    Will,
    Wont,
    Do,
    Dont,
}

impl Verb {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            WILL => Some(Verb::Will),
            WONT => Some(Verb::Wont),
            DO => Some(Verb::Do),
            DONT => Some(Verb::Dont),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            Verb::Will => WILL,
            Verb::Wont => WONT,
            Verb::Do => DO,
            Verb::Dont => DONT,
        }
    }
}

/// Build `IAC <verb> <option>`
pub fn command(verb: Verb, option: u8) -> Vec<u8> {
    vec![IAC, verb.to_byte(), option]
}

/// Double every IAC so data bytes are not read as commands.
pub fn escape_iac(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for &b in data {
        out.push(b);
        if b == IAC {
            out.push(IAC);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_iac() {
        assert_eq!(escape_iac(b"a\xffb"), vec![b'a', IAC, IAC, b'b']);
        assert_eq!(escape_iac(b"plain"), b"plain".to_vec());
    }

    #[test]
    fn test_verb_bytes() {
        for verb in [Verb::Will, Verb::Wont, Verb::Do, Verb::Dont] {
            assert_eq!(Verb::from_byte(verb.to_byte()), Some(verb));
        }
        assert_eq!(Verb::from_byte(SB), None);
    }
}
