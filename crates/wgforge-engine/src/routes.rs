//! AllowedIPs resolver.
//!
//! Turns symbolic routing references into concrete CIDR sets, merges routing
//! rules, injects each peer's own host route, canonicalises, and enforces the
//! per-node non-overlap invariant that WireGuard's cryptokey routing demands.
//!
//! Resolution happens late, after group expansion, so a rule written against
//! a group stays correct when the group's membership changes.

use std::net::IpAddr;

use ipnet::IpNet;
use tracing::debug;
use wgforge_wireguard::{canonicalize, AllowedIp};

use crate::error::{Diagnostic, DiagnosticKind, EngineError};
use crate::model::{Network, RouteToken, RoutingRule};
use crate::peermap::{PeerDraft, PeerMap};

/// Resolves every draft's route tokens into concrete, canonical, non-empty,
/// non-overlapping CIDR lists.
///
/// # Errors
///
/// Returns every `BadRouteToken`, `UnknownReference`, and
/// `AllowedIpsOverlap` found across the whole map.
pub fn resolve(
    network: &Network,
    peer_map: &mut PeerMap,
    rules: &[RoutingRule],
) -> Result<Vec<Diagnostic>, Vec<EngineError>> {
    let mut errors = Vec::new();
    let mut diagnostics = Vec::new();

    for (node_name, drafts) in &mut peer_map.entries {
        for draft in drafts.iter_mut() {
            let mut tokens = draft.tokens.clone();
            let mut had_routes = draft.had_explicit_routes;
            for rule in rules {
                if rule.applies_to(node_name, &draft.peer, network) && !rule.routes.is_empty() {
                    tokens.extend(rule.routes.iter().cloned());
                    had_routes = true;
                }
            }

            let mut resolved = Vec::new();
            for token in &tokens {
                match expand_token(token, network) {
                    Ok(mut routes) => resolved.append(&mut routes),
                    Err(e) => errors.push(e),
                }
            }

            // The default-route warning looks at what the author wrote; a
            // broad route may swallow the rest during canonicalisation.
            if resolved.len() > 1 && resolved.iter().any(AllowedIp::is_default_route) {
                diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::DefaultRouteMix,
                    node: node_name.clone(),
                    message: format!(
                        "peer '{}' mixes a default route with other routes",
                        draft.peer
                    ),
                });
            }

            // The peer must always be directly addressable.
            if let Some(target) = network.node(&draft.peer) {
                let host = target.host_route();
                if !resolved.iter().any(|c| c.contains(&host)) {
                    resolved.push(host);
                }
            }

            draft.allowed_ips = canonicalize(&resolved);
            draft.had_explicit_routes = had_routes;
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    // Longest-prefix reconciliation, then the hard overlap check.
    for (node_name, drafts) in &mut peer_map.entries {
        reconcile_host_routes(network, drafts);
        errors.extend(check_overlaps(node_name, drafts));
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    for (node_name, drafts) in &peer_map.entries {
        for draft in drafts {
            collect_diagnostics(node_name, draft, &mut diagnostics);
        }
    }

    debug!(diagnostics = diagnostics.len(), "routes resolved");
    Ok(diagnostics)
}

fn expand_token(token: &RouteToken, network: &Network) -> Result<Vec<AllowedIp>, EngineError> {
    match token {
        RouteToken::Cidr(cidr) => Ok(vec![AllowedIp::new(cidr.network())]),
        RouteToken::Symbolic { name, attr } => {
            let Some(group) = network.group(name) else {
                if network.node(name).is_some() {
                    // `<node>.<endpoint-name>` — endpoints are not routes.
                    return Err(EngineError::BadRouteToken {
                        token: token.to_string(),
                        reason: format!("'{name}' is a node; endpoints are not routes"),
                    });
                }
                return Err(EngineError::UnknownReference {
                    kind: "group",
                    name: name.clone(),
                    referrer: format!("route token '{token}'"),
                });
            };
            match attr.as_str() {
                "subnet" => {
                    let addrs = member_addrs(network, &group.members);
                    Ok(smallest_cover(&addrs))
                }
                "nodes" => {
                    let mut members = group.members.clone();
                    members.sort();
                    Ok(members
                        .iter()
                        .filter_map(|m| network.node(m))
                        .map(crate::model::Node::host_route)
                        .collect())
                }
                _ => Err(EngineError::BadRouteToken {
                    token: token.to_string(),
                    reason: format!("unknown attribute '{attr}' (expected subnet or nodes)"),
                }),
            }
        }
    }
}

fn member_addrs(network: &Network, members: &[String]) -> Vec<IpAddr> {
    members
        .iter()
        .filter_map(|m| network.node(m))
        .map(crate::model::Node::overlay_addr)
        .collect()
}

/// The smallest CIDR covering every address, one per address family present.
fn smallest_cover(addrs: &[IpAddr]) -> Vec<AllowedIp> {
    let mut covers = Vec::new();
    for family_v4 in [true, false] {
        let family: Vec<IpAddr> = addrs
            .iter()
            .copied()
            .filter(|a| a.is_ipv4() == family_v4)
            .collect();
        let Some(first) = family.first() else {
            continue;
        };
        let max_prefix: u8 = if family_v4 { 32 } else { 128 };
        for prefix in (0..=max_prefix).rev() {
            if let Ok(net) = IpNet::new(*first, prefix) {
                let net = net.trunc();
                if family.iter().all(|a| net.contains(a)) {
                    covers.push(AllowedIp::new(net));
                    break;
                }
            }
        }
    }
    covers
}

/// Drops, from each peer's set, any CIDR that is exactly another peer's own
/// host route: the direct peer is the more specific owner and wins, matching
/// kernel longest-prefix route selection.
fn reconcile_host_routes(network: &Network, drafts: &mut [PeerDraft]) {
    let owned: Vec<(String, IpNet)> = drafts
        .iter()
        .filter_map(|d| {
            network
                .node(&d.peer)
                .map(|n| (d.peer.clone(), n.host_route().network()))
        })
        .collect();

    for draft in drafts.iter_mut() {
        draft.allowed_ips.retain(|cidr| {
            !owned
                .iter()
                .any(|(owner, host)| owner != &draft.peer && cidr.network() == *host)
        });
    }
}

fn check_overlaps(node_name: &str, drafts: &[PeerDraft]) -> Vec<EngineError> {
    let mut errors = Vec::new();
    for (i, p1) in drafts.iter().enumerate() {
        for p2 in drafts.iter().skip(i + 1) {
            for c1 in &p1.allowed_ips {
                for c2 in &p2.allowed_ips {
                    if c1.overlaps(c2) {
                        errors.push(EngineError::AllowedIpsOverlap {
                            node: node_name.to_string(),
                            peer_a: p1.peer.clone(),
                            peer_b: p2.peer.clone(),
                            cidr_a: c1.to_cidr(),
                            cidr_b: c2.to_cidr(),
                        });
                    }
                }
            }
        }
    }
    errors
}

fn collect_diagnostics(node_name: &str, draft: &PeerDraft, diagnostics: &mut Vec<Diagnostic>) {
    for cidr in &draft.allowed_ips {
        if !cidr.is_default_route() && cidr.prefix_len() < 16 {
            diagnostics.push(Diagnostic {
                kind: DiagnosticKind::WideRoute,
                node: node_name.to_string(),
                message: format!("peer '{}' routes {} (wider than /16)", draft.peer, cidr),
            });
        }
    }

    let only_host_route =
        draft.allowed_ips.len() == 1 && draft.allowed_ips[0].is_host_route();
    if only_host_route
        && !draft.had_explicit_routes
        && !draft.passive
        && !draft.origin.is_intra_group()
    {
        diagnostics.push(Diagnostic {
            kind: DiagnosticKind::HostRouteOnly,
            node: node_name.to_string(),
            message: format!(
                "peer '{}' carries only its own host route; a routing rule may be missing",
                draft.peer
            ),
        });
    }
}
