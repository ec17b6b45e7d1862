//! User input and output for the terminal front end.
//!
//! - **keymapper**: keyboard input to byte sequence mapping
//! - **renderer**: styled runs to terminal output

pub mod keymapper;
pub mod renderer;

pub use keymapper::*;
pub use renderer::*;
