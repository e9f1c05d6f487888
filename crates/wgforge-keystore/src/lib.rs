//! File-backed key storage for wgforge.
//!
//! Implements the engine's [`wgforge_engine::KeyStore`] contract with a
//! single JSON file, an adjacent `.lock` file for cross-process safety, and
//! atomic writes. Any other backend (a secret manager, an HSM) can replace
//! this crate without touching the engine.

#![forbid(unsafe_code)]

pub mod error;
mod store;

pub use error::StoreError;
pub use store::{FileKeyStore, KeyInfo};
