//! Text attributes and styled runs
//!
//! This module defines the attribute snapshot attached to every run of
//! parsed text, and the run type itself.

use bitflags::bitflags;

/// Color definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Color {
    #[default]
    Default,
    /// One of the 16 ANSI colors (0-7 normal, 8-15 bright)
    Named(u8),
    /// 256-color palette index
    Indexed(u8),
    Rgb(u8, u8, u8),
}

impl Color {
    pub const BLACK: Color = Color::Named(0);
    pub const RED: Color = Color::Named(1);
    pub const GREEN: Color = Color::Named(2);
    pub const YELLOW: Color = Color::Named(3);
    pub const BLUE: Color = Color::Named(4);
    pub const MAGENTA: Color = Color::Named(5);
    pub const CYAN: Color = Color::Named(6);
    pub const WHITE: Color = Color::Named(7);

    /// Convert to crossterm color
    pub fn to_crossterm(&self) -> crossterm::style::Color {
        use crossterm::style::Color as C;

        match *self {
            Color::Default => C::Reset,
            Color::Named(n) => match n {
                0 => C::Black,
                1 => C::DarkRed,
                2 => C::DarkGreen,
                3 => C::DarkYellow,
                4 => C::DarkBlue,
                5 => C::DarkMagenta,
                6 => C::DarkCyan,
                7 => C::Grey,
                8 => C::DarkGrey,
                9 => C::Red,
                10 => C::Green,
                11 => C::Yellow,
                12 => C::Blue,
                13 => C::Magenta,
                14 => C::Cyan,
                _ => C::White,
            },
            Color::Indexed(n) => C::AnsiValue(n),
            Color::Rgb(r, g, b) => C::Rgb { r, g, b },
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct AttrFlags: u8 {
        const BOLD      = 0b0001;
        const UNDERLINE = 0b0010;
        const BLINK     = 0b0100;
        const REVERSE   = 0b1000;
    }
}

/// Immutable attribute snapshot. Every SGR change produces a new value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextAttributes {
    pub fg: Color,
    pub bg: Color,
    pub flags: AttrFlags,
}

impl TextAttributes {
    pub fn bold(&self) -> bool {
        self.flags.contains(AttrFlags::BOLD)
    }

    pub fn underline(&self) -> bool {
        self.flags.contains(AttrFlags::UNDERLINE)
    }

    pub fn blink(&self) -> bool {
        self.flags.contains(AttrFlags::BLINK)
    }

    pub fn reverse(&self) -> bool {
        self.flags.contains(AttrFlags::REVERSE)
    }

    pub fn with_fg(self, fg: Color) -> Self {
        Self { fg, ..self }
    }

    pub fn with_bg(self, bg: Color) -> Self {
        Self { bg, ..self }
    }

    pub fn with_flag(self, flag: AttrFlags, on: bool) -> Self {
        let mut flags = self.flags;
        flags.set(flag, on);
        Self { flags, ..self }
    }
}

/// A span of text sharing one attribute snapshot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StyledRun {
    pub text: String,
    pub attrs: TextAttributes,
}

impl StyledRun {
    pub fn new(text: impl Into<String>, attrs: TextAttributes) -> Self {
        Self {
            text: text.into(),
            attrs,
        }
    }
}

/// Append `run` to `runs`, merging it into the last run when the
/// attributes match. Empty runs are dropped.
pub fn push_run(runs: &mut Vec<StyledRun>, run: StyledRun) {
    if run.text.is_empty() {
        return;
    }
    match runs.last_mut() {
        Some(last) if last.attrs == run.attrs => last.text.push_str(&run.text),
        _ => runs.push(run),
    }
}

/// Merge adjacent runs with equal attributes.
pub fn merge_runs(runs: impl IntoIterator<Item = StyledRun>) -> Vec<StyledRun> {
    let mut merged = Vec::new();
    for run in runs {
        push_run(&mut merged, run);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_flag_is_a_new_snapshot() {
        let base = TextAttributes::default();
        let bold = base.with_flag(AttrFlags::BOLD, true);

        assert!(!base.bold());
        assert!(bold.bold());
        assert_eq!(bold.with_flag(AttrFlags::BOLD, false), base);
    }

    #[test]
    fn test_merge_runs() {
        let red = TextAttributes::default().with_fg(Color::RED);
        let runs = vec![
            StyledRun::new("a", red),
            StyledRun::new("b", red),
            StyledRun::new("", TextAttributes::default()),
            StyledRun::new("c", TextAttributes::default()),
        ];

        assert_eq!(
            merge_runs(runs),
            vec![
                StyledRun::new("ab", red),
                StyledRun::new("c", TextAttributes::default()),
            ]
        );
    }

    #[test]
    fn test_named_to_crossterm() {
        assert_eq!(Color::RED.to_crossterm(), crossterm::style::Color::DarkRed);
        assert_eq!(Color::Named(9).to_crossterm(), crossterm::style::Color::Red);
        assert_eq!(Color::Default.to_crossterm(), crossterm::style::Color::Reset);
    }
}
