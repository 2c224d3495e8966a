// src/config/mod.rs

//! `Mkfile.toml` loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a file from disk (`loader.rs`).
//! - Validate it into a [`Mkfile`] (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_from_str};
pub use model::{ConfigSection, Mkfile, RawMkfile, TaskConfig};
