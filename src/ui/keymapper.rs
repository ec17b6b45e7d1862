//! Key mapping for terminal input
//!
//! Converts key events to the byte sequences sent to the remote host.
//! [`KEY_TABLE`] is the single source of truth for special keys; any other
//! printable character is sent as its UTF-8 bytes.

use bitflags::bitflags;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        if mods.contains(KeyModifiers::SHIFT) {
            result |= Modifiers::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= Modifiers::CTRL;
        }
        if mods.contains(KeyModifiers::ALT) {
            result |= Modifiers::ALT;
        }
        result
    }
}

/// Keys with a fixed encoding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Right,
    Left,
    Enter,
    Backspace,
    Tab,
    Escape,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
}

/// Special key encodings
pub static KEY_TABLE: &[(Key, &[u8])] = &[
    (Key::Up, b"\x1b[A"),
    (Key::Down, b"\x1b[B"),
    (Key::Right, b"\x1b[C"),
    (Key::Left, b"\x1b[D"),
    (Key::Enter, b"\r"),
    (Key::Backspace, b"\x08"),
    (Key::Tab, b"\t"),
    (Key::Escape, b"\x1b"),
    (Key::Delete, b"\x1b[3~"),
    (Key::Insert, b"\x1b[2~"),
    (Key::Home, b"\x1b[H"),
    (Key::End, b"\x1b[F"),
    (Key::PageUp, b"\x1b[5~"),
    (Key::PageDown, b"\x1b[6~"),
    (Key::F(1), b"\x1bOP"),
    (Key::F(2), b"\x1bOQ"),
    (Key::F(3), b"\x1bOR"),
    (Key::F(4), b"\x1bOS"),
    (Key::F(5), b"\x1b[15~"),
    (Key::F(6), b"\x1b[17~"),
    (Key::F(7), b"\x1b[18~"),
    (Key::F(8), b"\x1b[19~"),
    (Key::F(9), b"\x1b[20~"),
    (Key::F(10), b"\x1b[21~"),
    (Key::F(11), b"\x1b[23~"),
    (Key::F(12), b"\x1b[24~"),
];

/// Key mapper for converting key events to bytes
pub struct KeyMapper;

impl KeyMapper {
    /// Encoding of a special key
    pub fn encode(key: Key) -> Option<&'static [u8]> {
        KEY_TABLE
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, bytes)| *bytes)
    }

    /// Map a crossterm KeyEvent to bytes. `None` for keys with no encoding.
    pub fn map(event: &KeyEvent) -> Option<Vec<u8>> {
        let mods = Modifiers::from(event.modifiers);

        let key = match event.code {
            KeyCode::Char(ch) => return Self::map_char(ch, mods),
            KeyCode::Up => Key::Up,
            KeyCode::Down => Key::Down,
            KeyCode::Right => Key::Right,
            KeyCode::Left => Key::Left,
            KeyCode::Enter => Key::Enter,
            KeyCode::Backspace => Key::Backspace,
            KeyCode::Tab => Key::Tab,
            KeyCode::Esc => Key::Escape,
            KeyCode::Delete => Key::Delete,
            KeyCode::Insert => Key::Insert,
            KeyCode::Home => Key::Home,
            KeyCode::End => Key::End,
            KeyCode::PageUp => Key::PageUp,
            KeyCode::PageDown => Key::PageDown,
            KeyCode::F(n) => Key::F(n),
            _ => return None,
        };

        Self::encode(key).map(<[u8]>::to_vec)
    }

    /// Map a character with modifiers
    fn map_char(ch: char, mods: Modifiers) -> Option<Vec<u8>> {
        // Ctrl + letter = control character
        if mods.contains(Modifiers::CTRL) {
            let ctrl = match ch {
                'a'..='z' => Some(ch as u8 - b'a' + 1),
                'A'..='Z' => Some(ch as u8 - b'A' + 1),
                '@' | ' ' => Some(0x00),
                '[' => Some(0x1B),
                '\\' => Some(0x1C),
                ']' => Some(0x1D),
                '^' => Some(0x1E),
                '_' => Some(0x1F),
                _ => None,
            };
            if let Some(code) = ctrl {
                return Some(if mods.contains(Modifiers::ALT) {
                    vec![0x1B, code]
                } else {
                    vec![code]
                });
            }
        }

        let mut bytes = Vec::with_capacity(5);
        // Alt + key = ESC + key
        if mods.contains(Modifiers::ALT) {
            bytes.push(0x1B);
        }
        let mut utf8 = [0u8; 4];
        bytes.extend_from_slice(ch.encode_utf8(&mut utf8).as_bytes());
        Some(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_event(code: KeyCode, mods: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, mods)
    }

    #[test]
    fn test_char_keys() {
        let event = key_event(KeyCode::Char('a'), KeyModifiers::NONE);
        assert_eq!(KeyMapper::map(&event), Some(b"a".to_vec()));

        let event = key_event(KeyCode::Char('é'), KeyModifiers::NONE);
        assert_eq!(KeyMapper::map(&event), Some("é".as_bytes().to_vec()));

        // Ctrl+C
        let event = key_event(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(KeyMapper::map(&event), Some(vec![0x03]));

        // Alt+x
        let event = key_event(KeyCode::Char('x'), KeyModifiers::ALT);
        assert_eq!(KeyMapper::map(&event), Some(vec![0x1B, b'x']));
    }

    #[test]
    fn test_special_keys() {
        let cases: &[(KeyCode, &[u8])] = &[
            (KeyCode::Up, b"\x1b[A"),
            (KeyCode::Down, b"\x1b[B"),
            (KeyCode::Right, b"\x1b[C"),
            (KeyCode::Left, b"\x1b[D"),
            (KeyCode::Enter, b"\r"),
            (KeyCode::Backspace, &[0x08]),
            (KeyCode::Tab, b"\t"),
            (KeyCode::Esc, &[0x1B]),
            (KeyCode::Delete, b"\x1b[3~"),
            (KeyCode::Home, b"\x1b[H"),
            (KeyCode::End, b"\x1b[F"),
            (KeyCode::PageUp, b"\x1b[5~"),
            (KeyCode::PageDown, b"\x1b[6~"),
        ];

        for (code, expected) in cases {
            let event = key_event(*code, KeyModifiers::NONE);
            assert_eq!(KeyMapper::map(&event).as_deref(), Some(*expected), "{:?}", code);
        }
    }

    #[test]
    fn test_function_keys() {
        assert_eq!(KeyMapper::encode(Key::F(1)), Some(&b"\x1bOP"[..]));
        assert_eq!(KeyMapper::encode(Key::F(12)), Some(&b"\x1b[24~"[..]));
        assert_eq!(KeyMapper::encode(Key::F(13)), None);
    }

    #[test]
    fn test_table_has_no_duplicates() {
        for (i, (key, _)) in KEY_TABLE.iter().enumerate() {
            assert!(
                KEY_TABLE[i + 1..].iter().all(|(other, _)| other != key),
                "{:?} listed twice",
                key
            );
        }
    }

    #[test]
    fn test_unmapped_keys() {
        let event = key_event(KeyCode::Null, KeyModifiers::NONE);
        assert_eq!(KeyMapper::map(&event), None);
    }
}
