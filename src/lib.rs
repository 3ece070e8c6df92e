//! An interactive console whose terminals each evaluate on their own
//! worker thread.
//!
//! The [`engine`] runs commands; the [`router`] sends what evaluated code
//! prints back to the right [`terminal`]; the [`console`] hosts several
//! terminals in one line-oriented session. The language itself sits behind
//! the [`interpreter::Interpreter`] trait.

pub mod banner;
pub mod commands;
pub mod config;
pub mod console;
pub mod consts;
pub mod engine;
pub mod events;
pub mod interpreter;
pub mod logging;
pub mod router;
pub mod terminal;
