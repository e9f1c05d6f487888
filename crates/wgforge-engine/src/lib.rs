//! Topology expansion, routing, and WireGuard configuration synthesis.
//!
//! The engine is a pure, deterministic pipeline: a validated document (nodes
//! plus either an explicit peer list or a group-relation document) goes in,
//! per-node configuration records come out. Group primitives expand to a flat
//! list of directional peer-intents; symbolic routes resolve late against the
//! node table; the only side effects live behind the [`KeyStore`] trait.
//!
//! Pipeline: document → group expansion → peer map → route resolution → key
//! binding → emission.

#![forbid(unsafe_code)]

pub mod bind;
pub mod builder;
pub mod document;
pub mod emit;
pub mod error;
pub mod expand;
pub mod model;
pub mod peermap;
pub mod routes;

pub use bind::{KeyStore, KeyStoreError};
pub use builder::{build, check, BuildOutput, CheckOutput};
pub use document::Document;
pub use emit::{NodeConfig, PeerRecord};
pub use error::{BuildFailure, Diagnostic, DiagnosticKind, EngineError};
pub use model::{Network, Node, NodeRole, Origin, PeerIntent};
