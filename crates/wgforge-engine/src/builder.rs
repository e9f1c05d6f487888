//! The single-shot build pipeline.
//!
//! `build` is a synchronous, deterministic function: document in, per-node
//! records out. Only the key store calls have side effects; aborting between
//! stages persists nothing beyond the store's own idempotent writes.

use std::collections::BTreeMap;

use tracing::info;

use crate::bind::{self, KeyStore};
use crate::document::Document;
use crate::emit::{self, NodeConfig};
use crate::error::{BuildFailure, Diagnostic};
use crate::model::Network;
use crate::peermap::PeerMap;
use crate::{expand, peermap, routes};

/// The engine's output: per-node records in name order, plus non-fatal
/// findings.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// One record per node.
    pub records: BTreeMap<String, NodeConfig>,
    /// Non-fatal findings, in pipeline order.
    pub diagnostics: Vec<Diagnostic>,
}

/// A dry-run result: the resolved peer map without key material.
#[derive(Debug, Clone)]
pub struct CheckOutput {
    /// The validated node and group tables.
    pub network: Network,
    /// The resolved per-node peer tables.
    pub peer_map: PeerMap,
    /// Non-fatal findings.
    pub diagnostics: Vec<Diagnostic>,
}

/// Validates and resolves a document without touching any key store.
///
/// # Errors
///
/// Returns the accumulated error report on any fatal problem.
pub fn check(document: &Document) -> Result<CheckOutput, BuildFailure> {
    let compiled = document.compile().map_err(BuildFailure::new)?;
    let expansion = expand::expand(&compiled).map_err(BuildFailure::new)?;
    let (mut peer_map, mut diagnostics) =
        peermap::build(&compiled.network, &expansion).map_err(BuildFailure::new)?;
    diagnostics.extend(
        routes::resolve(&compiled.network, &mut peer_map, &expansion.rules)
            .map_err(BuildFailure::new)?,
    );
    Ok(CheckOutput {
        network: compiled.network,
        peer_map,
        diagnostics,
    })
}

/// Builds the full per-node configuration records.
///
/// Output is a total function of the input document and the store's key
/// material; two runs against the same store are byte-identical.
///
/// # Errors
///
/// Returns the accumulated error report on any fatal problem; no output is
/// emitted in that case.
pub fn build(document: &Document, store: &dyn KeyStore) -> Result<BuildOutput, BuildFailure> {
    let compiled = document.compile().map_err(BuildFailure::new)?;
    let expansion = expand::expand(&compiled).map_err(BuildFailure::new)?;
    let (mut peer_map, mut diagnostics) =
        peermap::build(&compiled.network, &expansion).map_err(BuildFailure::new)?;
    diagnostics.extend(
        routes::resolve(&compiled.network, &mut peer_map, &expansion.rules)
            .map_err(BuildFailure::new)?,
    );
    let keys = bind::bind(&compiled.network, &peer_map, store).map_err(BuildFailure::new)?;
    let records = emit::emit(&compiled.network, &peer_map, &keys).map_err(BuildFailure::new)?;

    info!(
        nodes = records.len(),
        diagnostics = diagnostics.len(),
        "build complete"
    );
    Ok(BuildOutput {
        records,
        diagnostics,
    })
}
