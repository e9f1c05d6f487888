//! WireGuard primitives for the wgforge topology engine.
//!
//! Curve25519 key types, CIDR/endpoint parsing and predicates, and the
//! `[Interface]`/`[Peer]` config-file codec. Everything here is pure; no
//! kernel interfaces are touched.

#![forbid(unsafe_code)]

pub mod conf;
pub mod error;
mod keys;
mod types;

pub use error::WireGuardError;
pub use keys::{generate_keypair, KeyPair, PresharedKey, PrivateKey, PublicKey, KEY_SIZE};
pub use types::{canonicalize, AllowedIp, Endpoint, EndpointHost};
