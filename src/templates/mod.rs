//! Embedded templates for codebox files.

/// Default `codebox.toml` configuration.
pub(crate) const CODEBOX_TOML: &str = include_str!("codebox.toml");
