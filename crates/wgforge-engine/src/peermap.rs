//! Peer map builder.
//!
//! Consumes the flat peer-intent list and produces, for every node, an
//! ordered list of preliminary peer entries (no key material, routes still
//! symbolic). Grouping by the dialing side — not the global list — is the
//! source of truth for "what peers does node X have".
//!
//! The builder never mirrors an edge: the only automatic reverse entry is the
//! passive one synthesised when the opposite intent is absent, which is what
//! lets NAT-side clients reach relays that cannot dial them back.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;
use wgforge_wireguard::{AllowedIp, Endpoint};

use crate::error::{Diagnostic, DiagnosticKind, EngineError};
use crate::expand::Expansion;
use crate::model::{EndpointRef, Network, Origin, PeerIntent, RouteToken};

/// A preliminary peer entry: endpoint resolved, routes still symbolic, no
/// key material yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerDraft {
    /// The target node.
    pub peer: String,
    /// The resolved endpoint; `None` means a passive entry.
    pub endpoint: Option<Endpoint>,
    /// Route tokens accumulated from intents and, later, routing rules.
    pub tokens: Vec<RouteToken>,
    /// Keepalive seconds.
    pub persistent_keepalive: Option<u16>,
    /// Provenance of the first contributing intent.
    pub origin: Origin,
    /// Synthesised answer-only entry.
    pub passive: bool,
    /// Both directions of a bridge carry this.
    pub is_bridge: bool,
    /// Whether any contributing intent carried explicit routes.
    pub had_explicit_routes: bool,
    /// Concrete routes; filled by the resolver.
    pub allowed_ips: Vec<AllowedIp>,
}

/// Per-node preliminary peer tables, keyed by node name.
#[derive(Debug, Clone, Default)]
pub struct PeerMap {
    /// One entry per node, including nodes with empty peer lists.
    pub entries: BTreeMap<String, Vec<PeerDraft>>,
}

/// Builds the per-node peer map from an expansion.
///
/// # Errors
///
/// Returns every failure found: self-peers, dangling intent references,
/// endpoints missing on their target.
pub fn build(
    network: &Network,
    expansion: &Expansion,
) -> Result<(PeerMap, Vec<Diagnostic>), Vec<EngineError>> {
    let mut errors = Vec::new();
    let mut diagnostics = Vec::new();

    // (from, to) -> merged draft, preserving first-seen order per node.
    let mut drafts: BTreeMap<String, Vec<PeerDraft>> = BTreeMap::new();
    for node in network.nodes() {
        drafts.insert(node.name.clone(), Vec::new());
    }
    let mut forward_edges: BTreeSet<(String, String)> = BTreeSet::new();

    for intent in &expansion.intents {
        if intent.from == intent.to {
            errors.push(EngineError::SelfPeer(intent.from.clone()));
            continue;
        }
        if network.node(&intent.from).is_none() {
            errors.push(EngineError::UnknownReference {
                kind: "node",
                name: intent.from.clone(),
                referrer: format!("peer {} -> {}", intent.from, intent.to),
            });
            continue;
        }
        let endpoint = match resolve_endpoint(network, intent) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };

        forward_edges.insert((intent.from.clone(), intent.to.clone()));
        let list = drafts.entry(intent.from.clone()).or_default();

        if let Some(existing) = list.iter_mut().find(|d| d.peer == intent.to) {
            // Duplicate (from, to): the later intent wins for endpoint and
            // keepalive; route tokens concatenate.
            diagnostics.push(Diagnostic {
                kind: DiagnosticKind::DuplicateIntent,
                node: intent.from.clone(),
                message: format!(
                    "duplicate peer {} -> {} ({} merged into {})",
                    intent.from, intent.to, intent.origin, existing.origin
                ),
            });
            if existing.origin.is_intra_group() != intent.origin.is_intra_group() {
                diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::MergedPolicies,
                    node: intent.from.clone(),
                    message: format!(
                        "intra-group and inter-group policy merged for {} -> {}; \
                         routes were concatenated, confirm this is intended",
                        intent.from, intent.to
                    ),
                });
            }
            existing.endpoint = endpoint;
            existing.persistent_keepalive = intent.persistent_keepalive;
            existing.tokens.extend(intent.allowed_ips.iter().cloned());
            existing.is_bridge |= intent.is_bridge;
            existing.had_explicit_routes |= !intent.allowed_ips.is_empty();
        } else {
            list.push(PeerDraft {
                peer: intent.to.clone(),
                endpoint,
                tokens: intent.allowed_ips.clone(),
                persistent_keepalive: intent.persistent_keepalive,
                origin: intent.origin,
                passive: false,
                is_bridge: intent.is_bridge,
                had_explicit_routes: !intent.allowed_ips.is_empty(),
                allowed_ips: Vec::new(),
            });
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    // Passive synthesis: f -> t without t -> f answers with a passive entry
    // on t. No endpoint, no keepalive; routes default to f's host route via
    // the resolver's injection.
    for (from, to) in &forward_edges {
        if forward_edges.contains(&(to.clone(), from.clone())) {
            continue;
        }
        let origin = drafts
            .get(from)
            .and_then(|list| list.iter().find(|d| &d.peer == to))
            .map_or(Origin::ExplicitTopology, |d| d.origin);
        if let Some(list) = drafts.get_mut(to) {
            if !list.iter().any(|d| &d.peer == from) {
                list.push(PeerDraft {
                    peer: from.clone(),
                    endpoint: None,
                    tokens: Vec::new(),
                    persistent_keepalive: None,
                    origin,
                    passive: true,
                    is_bridge: false,
                    had_explicit_routes: false,
                    allowed_ips: Vec::new(),
                });
            }
        }
    }

    // Fixed, observable order: intra-group first, star/gateway, explicit and
    // other inter-group, bridges; ties by peer name.
    for list in drafts.values_mut() {
        list.sort_by(|a, b| {
            (a.origin.ordering_class(), a.peer.as_str())
                .cmp(&(b.origin.ordering_class(), b.peer.as_str()))
        });
    }

    debug!(nodes = drafts.len(), "peer map built");
    Ok((PeerMap { entries: drafts }, diagnostics))
}

fn resolve_endpoint(
    network: &Network,
    intent: &PeerIntent,
) -> Result<Option<Endpoint>, EngineError> {
    let Some(target) = network.node(&intent.to) else {
        return Err(EngineError::UnknownReference {
            kind: "node",
            name: intent.to.clone(),
            referrer: format!("peer {} -> {}", intent.from, intent.to),
        });
    };

    match &intent.endpoint_ref {
        Some(EndpointRef::Literal(endpoint)) => Ok(Some(endpoint.clone())),
        Some(EndpointRef::Named(name)) => target.endpoints.get(name).cloned().map_or_else(
            || {
                Err(EngineError::EndpointNotFound {
                    endpoint: name.clone(),
                    node: intent.to.clone(),
                    from: intent.from.clone(),
                })
            },
            |ep| Ok(Some(ep)),
        ),
        None => Ok(target.default_endpoint().cloned()),
    }
}
