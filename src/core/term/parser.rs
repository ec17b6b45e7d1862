//! ANSI escape sequence parser
//!
//! Converts a text stream into styled runs. The parser is incremental:
//! every piece of state, including a half-received escape sequence, is
//! carried across calls to [`EscapeSequenceParser::parse`], so the input may
//! be split at any character boundary.

use super::style::{push_run, AttrFlags, Color, StyledRun, TextAttributes};

const ESC: char = '\x1b';
const BEL: char = '\x07';
const CAN: char = '\x18';
const SUB: char = '\x1a';
const DEL: char = '\x7f';

// C1 controls as they appear after decoding
const C1_DCS: char = '\u{90}';
const C1_SOS: char = '\u{98}';
const C1_CSI: char = '\u{9b}';
const C1_ST: char = '\u{9c}';
const C1_OSC: char = '\u{9d}';
const C1_PM: char = '\u{9e}';
const C1_APC: char = '\u{9f}';

/// CSI parameters beyond this count are dropped, so a final SGR code past
/// the 32nd has no effect.
const MAX_PARAMS: usize = 32;
const MAX_STRING_LEN: usize = 4096;

/// Parser state machine
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum ParserState {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    OscString,
    EscapeInOsc, // ESC received within OSC, waiting for backslash
    /// DCS, SOS, PM and APC strings. Consumed without effect.
    IgnoredString,
    EscapeInIgnoredString,
}

/// Incremental ANSI parser producing [`StyledRun`]s
#[derive(Debug, Default)]
pub struct EscapeSequenceParser {
    state: ParserState,
    attrs: TextAttributes,
    params: Vec<u16>,
    /// Parallel to `params`: introduced by `:` rather than `;`
    subparams: Vec<bool>,
    current_param: Option<u16>,
    /// The parameter being accumulated follows a `:`
    in_subparam: bool,
    /// Private marker (`?`, `>`, `=`, `!`) or intermediate byte seen in CSI
    private: bool,
    osc_string: String,
    /// Raw characters of the sequence currently open
    partial: String,
    title: Option<String>,
    text: String,
    runs: Vec<StyledRun>,
}

impl EscapeSequenceParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a chunk of text and return the runs it completes.
    ///
    /// Never fails. Text buffered before an unterminated escape sequence is
    /// returned; the sequence itself is kept and resumed on the next call.
    pub fn parse(&mut self, input: &str) -> Vec<StyledRun> {
        for ch in input.chars() {
            self.feed(ch);
        }
        self.flush_text();
        std::mem::take(&mut self.runs)
    }

    /// Current attribute snapshot
    pub fn attributes(&self) -> TextAttributes {
        self.attrs
    }

    /// The escape sequence prefix carried over to the next call, empty when
    /// the parser sits in ordinary text.
    pub fn partial_sequence(&self) -> &str {
        &self.partial
    }

    /// Last title set with OSC 0, 1 or 2
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Drop all state: default attributes, no open sequence, no title.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn feed(&mut self, ch: char) {
        let in_string = matches!(
            self.state,
            ParserState::OscString
                | ParserState::EscapeInOsc
                | ParserState::IgnoredString
                | ParserState::EscapeInIgnoredString
        );

        // C0 controls interrupt or execute inside escape and CSI sequences
        if !in_string && self.state != ParserState::Ground && ch < ' ' {
            match ch {
                ESC => self.enter_escape(),
                CAN | SUB => self.to_ground(),
                _ => self.execute_control(ch),
            }
            return;
        }

        match self.state {
            ParserState::Ground => self.ground(ch),
            ParserState::Escape => self.escape(ch),
            ParserState::EscapeIntermediate => self.escape_intermediate(ch),
            ParserState::CsiEntry => self.csi_entry(ch),
            ParserState::CsiParam => self.csi_param(ch),
            ParserState::CsiIntermediate => self.csi_intermediate(ch),
            ParserState::OscString => self.osc_string_state(ch),
            ParserState::EscapeInOsc => self.escape_in_osc(ch),
            ParserState::IgnoredString => self.ignored_string(ch),
            ParserState::EscapeInIgnoredString => self.escape_in_ignored_string(ch),
        }
    }

    fn ground(&mut self, ch: char) {
        match ch {
            ESC => self.enter_escape(),
            C1_CSI => {
                self.enter_escape();
                self.enter_csi(ch);
            }
            C1_OSC => {
                self.enter_escape();
                self.enter_osc(ch);
            }
            C1_DCS | C1_SOS | C1_PM | C1_APC => {
                self.enter_escape();
                self.enter_ignored_string(ch);
            }
            _ if ch < ' ' => self.execute_control(ch),
            DEL | '\u{80}'..='\u{9f}' => {}
            _ => self.text.push(ch),
        }
    }

    /// Append-only output keeps line feeds and tabs; other controls have no
    /// visible effect.
    fn execute_control(&mut self, ch: char) {
        if ch == '\n' || ch == '\t' {
            self.text.push(ch);
        }
    }

    fn enter_escape(&mut self) {
        self.state = ParserState::Escape;
        self.params.clear();
        self.subparams.clear();
        self.current_param = None;
        self.in_subparam = false;
        self.private = false;
        self.partial.clear();
        self.partial.push(ESC);
    }

    fn enter_csi(&mut self, ch: char) {
        self.state = ParserState::CsiEntry;
        self.params.clear();
        self.subparams.clear();
        self.current_param = None;
        self.in_subparam = false;
        self.private = false;
        self.record(ch);
    }

    fn enter_osc(&mut self, ch: char) {
        self.state = ParserState::OscString;
        self.osc_string.clear();
        self.record(ch);
    }

    fn enter_ignored_string(&mut self, ch: char) {
        self.state = ParserState::IgnoredString;
        self.record(ch);
    }

    fn to_ground(&mut self) {
        self.state = ParserState::Ground;
        self.partial.clear();
    }

    fn record(&mut self, ch: char) {
        if self.partial.len() < MAX_STRING_LEN {
            self.partial.push(ch);
        }
    }

    fn escape(&mut self, ch: char) {
        match ch {
            '[' => self.enter_csi(ch),
            ']' => self.enter_osc(ch),
            'P' | 'X' | '^' | '_' => self.enter_ignored_string(ch),
            ' '..='/' => {
                // Intermediate bytes, e.g. charset designation ESC ( B
                self.record(ch);
                self.state = ParserState::EscapeIntermediate;
            }
            _ => {
                // Single-character escapes (ESC 7, ESC M, ESC c, ...) and
                // anything unrecognized are consumed.
                tracing::trace!("Ignoring ESC {:?}", ch);
                self.to_ground();
            }
        }
    }

    fn escape_intermediate(&mut self, ch: char) {
        match ch {
            ' '..='/' => self.record(ch),
            _ => self.to_ground(),
        }
    }

    fn csi_entry(&mut self, ch: char) {
        match ch {
            '0'..='9' | ';' | ':' => {
                self.state = ParserState::CsiParam;
                self.csi_param(ch);
            }
            '?' | '>' | '=' | '!' | '<' => {
                self.private = true;
                self.record(ch);
            }
            ' '..='/' => {
                self.private = true;
                self.record(ch);
                self.state = ParserState::CsiIntermediate;
            }
            '@'..='~' => self.execute_csi(ch),
            _ => self.to_ground(),
        }
    }

    fn csi_param(&mut self, ch: char) {
        match ch {
            '0'..='9' => {
                let digit = ch as u16 - '0' as u16;
                self.current_param = Some(
                    self.current_param
                        .unwrap_or(0)
                        .saturating_mul(10)
                        .saturating_add(digit),
                );
                self.record(ch);
            }
            ';' | ':' => {
                self.push_param();
                self.in_subparam = ch == ':';
                self.record(ch);
            }
            ' '..='/' => {
                self.push_param();
                self.private = true;
                self.record(ch);
                self.state = ParserState::CsiIntermediate;
            }
            '@'..='~' => {
                if self.current_param.is_some() || !self.params.is_empty() {
                    self.push_param();
                }
                self.execute_csi(ch);
            }
            _ => self.to_ground(),
        }
    }

    fn push_param(&mut self) {
        let value = self.current_param.take().unwrap_or(0);
        if self.params.len() < MAX_PARAMS {
            self.params.push(value);
            self.subparams.push(self.in_subparam);
        }
    }

    fn csi_intermediate(&mut self, ch: char) {
        match ch {
            ' '..='/' => self.record(ch),
            '@'..='~' => self.execute_csi(ch),
            _ => self.to_ground(),
        }
    }

    fn osc_string_state(&mut self, ch: char) {
        match ch {
            BEL | C1_ST => {
                self.execute_osc();
                self.to_ground();
            }
            ESC => {
                self.record(ch);
                self.state = ParserState::EscapeInOsc;
            }
            _ if ch < ' ' => {}
            _ => {
                if self.osc_string.len() < MAX_STRING_LEN {
                    self.osc_string.push(ch);
                }
                self.record(ch);
            }
        }
    }

    /// Handle ESC received within OSC sequence
    fn escape_in_osc(&mut self, ch: char) {
        self.execute_osc();
        if ch == '\\' {
            self.to_ground();
        } else {
            // Not ST: the ESC opened a new sequence
            self.enter_escape();
            self.feed(ch);
        }
    }

    fn ignored_string(&mut self, ch: char) {
        match ch {
            BEL | C1_ST => self.to_ground(),
            ESC => {
                self.record(ch);
                self.state = ParserState::EscapeInIgnoredString;
            }
            _ => self.record(ch),
        }
    }

    fn escape_in_ignored_string(&mut self, ch: char) {
        if ch == '\\' {
            self.to_ground();
        } else {
            self.enter_escape();
            self.feed(ch);
        }
    }

    fn execute_csi(&mut self, final_char: char) {
        match (self.private, final_char) {
            (false, 'm') => self.execute_sgr(),
            _ => {
                // Cursor motion, erase and mode changes have no meaning for
                // an append-only text stream.
                tracing::trace!(
                    "Ignoring CSI: private={}, params={:?}, final={:?}",
                    self.private,
                    self.params,
                    final_char
                );
            }
        }
        self.to_ground();
    }

    fn execute_sgr(&mut self) {
        if self.params.is_empty() {
            self.set_attrs(TextAttributes::default());
            return;
        }

        let mut attrs = self.attrs;
        let mut i = 0;

        while i < self.params.len() {
            let param = self.params[i];
            // Colon sub-parameters belong to the code before them
            let mut end = i + 1;
            while end < self.params.len() && self.subparams[end] {
                end += 1;
            }
            let subs = &self.params[i + 1..end];

            attrs = match param {
                38 | 48 if !subs.is_empty() => with_extended(attrs, param, colon_color(subs)),
                38 | 48 => {
                    let (color, used) = extended_color(&self.params[end..]);
                    end += used;
                    with_extended(attrs, param, color)
                }
                4 if subs.first() == Some(&0) => attrs.with_flag(AttrFlags::UNDERLINE, false),
                _ => sgr_code(attrs, param),
            };
            i = end;
        }

        self.set_attrs(attrs);
    }

    fn execute_osc(&mut self) {
        // Parse OSC: "code;text"
        if let Some((code, text)) = self.osc_string.split_once(';') {
            if matches!(code, "0" | "1" | "2") {
                self.title = Some(text.to_string());
            }
        }
        self.osc_string.clear();
    }

    fn set_attrs(&mut self, attrs: TextAttributes) {
        if attrs != self.attrs {
            self.flush_text();
            self.attrs = attrs;
        }
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            let text = std::mem::take(&mut self.text);
            push_run(&mut self.runs, StyledRun::new(text, self.attrs));
        }
    }
}

/// Single SGR code without sub-parameters
fn sgr_code(attrs: TextAttributes, param: u16) -> TextAttributes {
    match param {
        0 => TextAttributes::default(),
        1 => attrs.with_flag(AttrFlags::BOLD, true),
        4 => attrs.with_flag(AttrFlags::UNDERLINE, true),
        5 => attrs.with_flag(AttrFlags::BLINK, true),
        7 => attrs.with_flag(AttrFlags::REVERSE, true),

        22 => attrs.with_flag(AttrFlags::BOLD, false),
        24 => attrs.with_flag(AttrFlags::UNDERLINE, false),
        25 => attrs.with_flag(AttrFlags::BLINK, false),
        27 => attrs.with_flag(AttrFlags::REVERSE, false),

        30..=37 => attrs.with_fg(Color::Named((param - 30) as u8)),
        39 => attrs.with_fg(Color::Default),

        40..=47 => attrs.with_bg(Color::Named((param - 40) as u8)),
        49 => attrs.with_bg(Color::Default),

        90..=97 => attrs.with_fg(Color::Named((param - 90 + 8) as u8)),
        100..=107 => attrs.with_bg(Color::Named((param - 100 + 8) as u8)),

        _ => attrs,
    }
}

fn with_extended(attrs: TextAttributes, param: u16, color: Option<Color>) -> TextAttributes {
    match (param, color) {
        (38, Some(color)) => attrs.with_fg(color),
        (_, Some(color)) => attrs.with_bg(color),
        (_, None) => attrs,
    }
}

fn rgb(r: u16, g: u16, b: u16) -> Option<Color> {
    Some(Color::Rgb(
        u8::try_from(r).ok()?,
        u8::try_from(g).ok()?,
        u8::try_from(b).ok()?,
    ))
}

/// Read the tail of an extended color (`5;n` or `2;r;g;b`) after 38 or 48.
/// Returns the color and how many parameters it used. Out-of-range or
/// missing components leave the color unchanged.
fn extended_color(args: &[u16]) -> (Option<Color>, usize) {
    match args.first() {
        Some(5) => {
            let color = args.get(1).and_then(|&n| u8::try_from(n).ok()).map(Color::Indexed);
            (color, args.len().min(2))
        }
        Some(2) => {
            let color = match args.get(1..4) {
                Some(&[r, g, b]) => rgb(r, g, b),
                _ => None,
            };
            (color, args.len().min(4))
        }
        Some(_) => (None, 1),
        None => (None, 0),
    }
}

/// Extended color in colon form: `5:n`, `2:r:g:b`, or the ITU
/// `2:colorspace:r:g:b` whose colorspace slot may be empty.
fn colon_color(subs: &[u16]) -> Option<Color> {
    match *subs {
        [5, n, ..] => u8::try_from(n).ok().map(Color::Indexed),
        [2, _, r, g, b, ..] => rgb(r, g, b),
        [2, r, g, b] => rgb(r, g, b),
        _ => None,
    }
}
