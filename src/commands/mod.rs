//! CLI command implementations.
//!
//! Each submodule implements one codebox subcommand, with IO kept at the
//! edges so the core logic is testable.

pub(crate) mod describe;
pub(crate) mod image;
pub(crate) mod init;
pub(crate) mod run;
