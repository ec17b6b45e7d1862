//! ANSI text parsing
//!
//! - **style**: colors, attribute snapshots, styled runs
//! - **parser**: incremental escape sequence parser
//! - **decode**: network bytes to text

pub mod decode;
pub mod parser;
pub mod style;

pub use decode::{decode_lossy, TextDecoder};
pub use parser::EscapeSequenceParser;
pub use style::{merge_runs, AttrFlags, Color, StyledRun, TextAttributes};
