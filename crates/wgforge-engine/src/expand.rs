//! Group expander.
//!
//! Turns the group document (groups + connections + routing rules) into a
//! flat, ordered list of directional peer-intents plus routing rules.
//!
//! Determinism: groups are visited alphabetically, member sets iterate
//! alphabetically, chains keep their document order, and connections are
//! processed top to bottom. Expansion of one group or connection fails fast,
//! but failures accumulate across independent entries.

use std::collections::BTreeSet;

use tracing::debug;

use crate::document::{CompiledDocument, Document, NodeSpec, NodesSection, PeerSpec};
use crate::error::EngineError;
use crate::model::{
    Connection, ConnectionKind, EndpointRef, Group, GroupTopology, Network, Origin, PeerIntent,
    RoutingRule, RuleScope,
};

/// The expander's output: a flat edge list plus routing rules.
#[derive(Debug, Clone, Default)]
pub struct Expansion {
    /// Directional edges, in expansion order (significant for merging).
    pub intents: Vec<PeerIntent>,
    /// Connection-scoped and global routing rules.
    pub rules: Vec<RoutingRule>,
}

impl Expansion {
    /// Re-serialises this expansion as an equivalent traditional-form
    /// document. Expanding the result again yields the same peer map.
    #[must_use]
    pub fn to_traditional(&self, network: &Network) -> Document {
        let nodes = network
            .nodes()
            .map(|node| NodeSpec {
                name: node.name.clone(),
                role: node.role,
                wireguard_ip: node.wireguard_ip.clone(),
                listen_port: node.listen_port,
                endpoints: crate::document::EndpointsSpec::Map(
                    node.endpoints
                        .iter()
                        .map(|(name, ep)| (name.clone(), ep.to_string()))
                        .collect(),
                ),
                dns: node.dns.clone(),
                mtu: node.mtu,
                post_up: node.post_up.clone(),
                post_down: node.post_down.clone(),
                enable_ip_forward: node.enable_ip_forward,
            })
            .collect();

        // Routing rules are baked into each peer's route list so the
        // traditional form stands alone.
        let peers = self
            .intents
            .iter()
            .map(|intent| {
                let mut allowed_ips: Vec<String> =
                    intent.allowed_ips.iter().map(ToString::to_string).collect();
                for rule in &self.rules {
                    if rule.applies_to(&intent.from, &intent.to, network) {
                        allowed_ips.extend(rule.routes.iter().map(ToString::to_string));
                    }
                }
                PeerSpec {
                    from: intent.from.clone(),
                    to: intent.to.clone(),
                    endpoint: intent.endpoint_ref.as_ref().map(|r| match r {
                        EndpointRef::Literal(ep) => ep.to_string(),
                        EndpointRef::Named(name) => name.clone(),
                    }),
                    allowed_ips,
                    persistent_keepalive: intent.persistent_keepalive,
                }
            })
            .collect();

        Document {
            nodes: NodesSection::List(nodes),
            peers,
            groups: Vec::new(),
            connections: Vec::new(),
            routing: std::collections::BTreeMap::new(),
        }
    }
}

/// Expands a compiled document into intents and rules.
///
/// # Errors
///
/// Returns every expansion failure: dangling side references, bad gateway or
/// selective member lists, missing bridge mappings.
pub fn expand(compiled: &CompiledDocument) -> Result<Expansion, Vec<EngineError>> {
    let network = &compiled.network;
    let mut intents = Vec::new();
    let mut rules = Vec::new();
    let mut errors = Vec::new();

    for group in network.groups() {
        expand_group(group, &mut intents);
    }

    for connection in &compiled.connections {
        match expand_connection(connection, network) {
            Ok((mut conn_intents, mut conn_rules)) => {
                intents.append(&mut conn_intents);
                rules.append(&mut conn_rules);
            }
            Err(e) => errors.push(e),
        }
    }

    intents.extend(compiled.explicit_intents.iter().cloned());
    rules.extend(compiled.global_rules.iter().cloned());

    if errors.is_empty() {
        debug!(
            intents = intents.len(),
            rules = rules.len(),
            "expansion complete"
        );
        Ok(Expansion { intents, rules })
    } else {
        Err(errors)
    }
}

fn expand_group(group: &Group, intents: &mut Vec<PeerIntent>) {
    match group.topology {
        GroupTopology::Mesh => {
            let members = sorted_unique(&group.members);
            for a in &members {
                for b in &members {
                    if a == b {
                        continue;
                    }
                    let mut intent = PeerIntent::new(a.clone(), b.clone(), Origin::GroupMesh);
                    intent.endpoint_ref = group
                        .mesh_endpoint
                        .as_ref()
                        .map(|name| EndpointRef::Named(name.clone()));
                    intents.push(intent);
                }
            }
        }
        GroupTopology::Star => {
            // Arity validation guarantees the hub exists and is a member.
            let Some(hub) = group.hub.as_deref() else {
                return;
            };
            for member in sorted_unique(&group.members) {
                if member == hub {
                    continue;
                }
                intents.push(PeerIntent::new(member.clone(), hub, Origin::GroupStar));
                intents.push(PeerIntent::new(hub, member, Origin::GroupStar));
            }
        }
        GroupTopology::Chain => {
            for pair in group.members.windows(2) {
                intents.push(PeerIntent::new(
                    pair[0].clone(),
                    pair[1].clone(),
                    Origin::GroupChain,
                ));
                intents.push(PeerIntent::new(
                    pair[1].clone(),
                    pair[0].clone(),
                    Origin::GroupChain,
                ));
            }
        }
        GroupTopology::Single => {}
    }
}

type ConnectionOutput = (Vec<PeerIntent>, Vec<RoutingRule>);

fn expand_connection(
    connection: &Connection,
    network: &Network,
) -> Result<ConnectionOutput, EngineError> {
    let referrer = format!("connection '{}'", connection.display_name());
    let from_side = network.resolve_side(&connection.from, &referrer)?;
    let to_side = network.resolve_side(&connection.to, &referrer)?;

    let edges: Vec<(String, String)> = match connection.kind {
        ConnectionKind::OutboundOnly => cartesian(&from_side, &to_side),
        ConnectionKind::Bidirectional => {
            let mut edges = cartesian(&from_side, &to_side);
            edges.extend(cartesian(&to_side, &from_side));
            dedupe(edges)
        }
        ConnectionKind::FullMesh => {
            let mut edges = cartesian(&from_side, &to_side);
            edges.extend(cartesian(&to_side, &from_side));
            dedupe(edges)
        }
        ConnectionKind::Gateway => gateway_edges(connection, network, &from_side, &to_side)?,
        ConnectionKind::Selective => {
            selective_edges(connection, &referrer, &from_side, &to_side)?
        }
        ConnectionKind::Bridge => {
            return bridge_edges(connection, &from_side, &to_side);
        }
    };

    let origin = match connection.kind {
        ConnectionKind::OutboundOnly => Origin::GroupOutbound,
        ConnectionKind::Bidirectional => Origin::GroupBidirectional,
        ConnectionKind::Gateway => Origin::GroupGateway,
        ConnectionKind::Selective => Origin::GroupSelective,
        ConnectionKind::FullMesh => Origin::GroupFullmesh,
        ConnectionKind::Bridge => unreachable!("bridges returned above"),
    };

    let intents: Vec<PeerIntent> = edges
        .iter()
        .map(|(from, to)| {
            let mut intent = PeerIntent::new(from.clone(), to.clone(), origin);
            intent.endpoint_ref = connection
                .endpoint_selector
                .as_deref()
                .map(EndpointRef::parse);
            intent.persistent_keepalive = connection.persistent_keepalive;
            intent
        })
        .collect();

    Ok((intents, scoped_rules(connection, edges)))
}

fn gateway_edges(
    connection: &Connection,
    network: &Network,
    from_side: &[String],
    to_side: &[String],
) -> Result<Vec<(String, String)>, EngineError> {
    let referrer = format!("connection '{}'", connection.display_name());
    if connection.gateway_to.is_empty() {
        return Err(EngineError::InvalidDocument(format!(
            "{referrer}: gateway connection requires gateway_nodes.to"
        )));
    }
    for gw in connection.gateway_to.iter().chain(&connection.gateway_from) {
        if network.node(gw).is_none() {
            return Err(EngineError::UnknownReference {
                kind: "node",
                name: gw.clone(),
                referrer: referrer.clone(),
            });
        }
    }

    let to_gws = sorted_unique(&connection.gateway_to);
    let mut edges = Vec::new();
    for from in from_side {
        for gw in &to_gws {
            if from != gw {
                edges.push((from.clone(), gw.clone()));
            }
        }
    }
    if !connection.gateway_from.is_empty() {
        let from_gws = sorted_unique(&connection.gateway_from);
        for to in to_side {
            for gw in &from_gws {
                if to != gw {
                    edges.push((to.clone(), gw.clone()));
                }
            }
        }
    }
    Ok(dedupe(edges))
}

fn selective_edges(
    connection: &Connection,
    referrer: &str,
    from_side: &[String],
    to_side: &[String],
) -> Result<Vec<(String, String)>, EngineError> {
    if connection.nodes.is_empty() {
        return Err(EngineError::InvalidDocument(format!(
            "{referrer}: selective connection requires a nodes list"
        )));
    }
    let listed = sorted_unique(&connection.nodes);

    let (from, to): (Vec<String>, Vec<String>) =
        if listed.iter().all(|n| from_side.contains(n)) {
            (listed, to_side.to_vec())
        } else if listed.iter().all(|n| to_side.contains(n)) {
            (from_side.to_vec(), listed)
        } else {
            let stray = listed
                .iter()
                .find(|n| !from_side.contains(n) && !to_side.contains(n))
                .cloned()
                .unwrap_or_default();
            return Err(EngineError::UnknownReference {
                kind: "node",
                name: stray,
                referrer: referrer.to_string(),
            });
        };

    Ok(cartesian(&from, &to))
}

fn bridge_edges(
    connection: &Connection,
    from_side: &[String],
    to_side: &[String],
) -> Result<ConnectionOutput, EngineError> {
    let display = connection.display_name();
    let [a] = from_side else {
        return Err(EngineError::InvalidDocument(format!(
            "bridge connection '{display}': 'from' must resolve to exactly one node"
        )));
    };
    let [b] = to_side else {
        return Err(EngineError::InvalidDocument(format!(
            "bridge connection '{display}': 'to' must resolve to exactly one node"
        )));
    };
    if a == b {
        return Err(EngineError::SelfPeer(a.clone()));
    }

    let mut intents = Vec::new();
    for (from, to) in [(a, b), (b, a)] {
        let key = format!("{from}_to_{to}");
        let Some(raw) = connection.endpoint_mapping.get(&key) else {
            return Err(EngineError::BridgeMappingMissing {
                connection: display.clone(),
                key,
            });
        };
        let mut intent = PeerIntent::new(from.clone(), to.clone(), Origin::GroupBridge);
        // The mapping decides the endpoint for this direction; the target's
        // default endpoint is never consulted.
        intent.endpoint_ref = Some(EndpointRef::parse(raw));
        intent.persistent_keepalive = connection.persistent_keepalive;
        intent.is_bridge = true;
        intents.push(intent);
    }

    let edges = vec![(a.clone(), b.clone()), (b.clone(), a.clone())];
    Ok((intents, scoped_rules(connection, edges)))
}

fn scoped_rules(connection: &Connection, edges: Vec<(String, String)>) -> Vec<RoutingRule> {
    let mut rules = Vec::new();
    if !connection.routing.allowed_ips.is_empty() {
        rules.push(RoutingRule {
            side: None,
            routes: connection.routing.allowed_ips.clone(),
            scope: RuleScope::Edges(edges.clone()),
        });
    }
    for (side, routes) in &connection.routing.sided {
        rules.push(RoutingRule {
            side: Some(side.clone()),
            routes: routes.clone(),
            scope: RuleScope::Edges(edges.clone()),
        });
    }
    rules
}

fn sorted_unique(names: &[String]) -> Vec<String> {
    let set: BTreeSet<&String> = names.iter().collect();
    set.into_iter().cloned().collect()
}

fn cartesian(from: &[String], to: &[String]) -> Vec<(String, String)> {
    let mut edges = Vec::with_capacity(from.len() * to.len());
    for f in from {
        for t in to {
            if f != t {
                edges.push((f.clone(), t.clone()));
            }
        }
    }
    edges
}

fn dedupe(edges: Vec<(String, String)>) -> Vec<(String, String)> {
    let mut seen = BTreeSet::new();
    edges
        .into_iter()
        .filter(|edge| seen.insert(edge.clone()))
        .collect()
}
