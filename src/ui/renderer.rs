//! Styled run renderer using crossterm
//!
//! Writes parsed runs to a terminal (or any writer) as an append-only
//! stream.

use std::io::{self, Write};

use crossterm::{
    queue,
    style::{Attribute, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal,
};

use crate::core::term::{AttrFlags, StyledRun, TextAttributes};

/// Run renderer
pub struct Renderer<W: Write> {
    out: W,
    /// Attributes currently applied on the output, if known
    current: Option<TextAttributes>,
    /// Translate `\n` to `\r\n` for terminals in raw mode
    raw_newlines: bool,
}

impl Renderer<io::Stdout> {
    /// Renderer on stdout, for use with raw mode enabled
    pub fn stdout() -> Self {
        Self::new(io::stdout(), true)
    }

    /// Enter raw mode so keystrokes reach us unbuffered
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()
    }

    /// Restore the terminal
    pub fn cleanup(&mut self) -> io::Result<()> {
        self.reset()?;
        terminal::disable_raw_mode()
    }
}

impl<W: Write> Renderer<W> {
    pub fn new(out: W, raw_newlines: bool) -> Self {
        Self {
            out,
            current: None,
            raw_newlines,
        }
    }

    /// Write runs and flush
    pub fn render(&mut self, runs: &[StyledRun]) -> io::Result<()> {
        for run in runs {
            if self.current != Some(run.attrs) {
                self.apply_attrs(&run.attrs)?;
                self.current = Some(run.attrs);
            }
            if self.raw_newlines {
                queue!(self.out, Print(run.text.replace('\n', "\r\n")))?;
            } else {
                queue!(self.out, Print(&run.text))?;
            }
        }
        self.out.flush()
    }

    /// Print a status line in default attributes, e.g. "Connected"
    pub fn notice(&mut self, message: &str) -> io::Result<()> {
        self.reset()?;
        let newline = if self.raw_newlines { "\r\n" } else { "\n" };
        queue!(self.out, Print(format!("{}{}{}", newline, message, newline)))?;
        self.out.flush()
    }

    /// Set the window title (from OSC 0/1/2)
    pub fn set_title(&mut self, title: &str) -> io::Result<()> {
        queue!(self.out, terminal::SetTitle(title))?;
        self.out.flush()
    }

    /// Return the output to default attributes
    pub fn reset(&mut self) -> io::Result<()> {
        queue!(self.out, ResetColor, SetAttribute(Attribute::Reset))?;
        self.current = None;
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Apply text attributes
    fn apply_attrs(&mut self, attrs: &TextAttributes) -> io::Result<()> {
        // Reset first
        queue!(self.out, ResetColor, SetAttribute(Attribute::Reset))?;

        if attrs.flags.contains(AttrFlags::BOLD) {
            queue!(self.out, SetAttribute(Attribute::Bold))?;
        }
        if attrs.flags.contains(AttrFlags::UNDERLINE) {
            queue!(self.out, SetAttribute(Attribute::Underlined))?;
        }
        if attrs.flags.contains(AttrFlags::BLINK) {
            queue!(self.out, SetAttribute(Attribute::SlowBlink))?;
        }
        if attrs.flags.contains(AttrFlags::REVERSE) {
            queue!(self.out, SetAttribute(Attribute::Reverse))?;
        }

        let fg_color = attrs.fg.to_crossterm();
        if fg_color != crossterm::style::Color::Reset {
            queue!(self.out, SetForegroundColor(fg_color))?;
        }
        let bg_color = attrs.bg.to_crossterm();
        if bg_color != crossterm::style::Color::Reset {
            queue!(self.out, SetBackgroundColor(bg_color))?;
        }

        Ok(())
    }
}
