//! Client command interpreter
//!
//! While a host command runs, the device interrupts execution to request
//! data it cannot hold: preimages, leaf hashes with inclusion proofs, and
//! leaf positions. This module answers those requests from data registered
//! beforehand and collects the results the device yields.
//!
//! # Structure
//!
//! - `command`: Command codes and the opcode dispatch table
//! - `config`: Response size limits (InterpreterConfig)
//! - `handlers`: One implementation per command
//! - `state`: Registered data, yielded results, continuation queue (ClientCommandInterpreter)

mod command;
mod config;
mod handlers;
mod state;

pub use command::ClientCommandCode;
pub use config::InterpreterConfig;
pub use state::{ClientCommandInterpreter, ProgressCallback};
