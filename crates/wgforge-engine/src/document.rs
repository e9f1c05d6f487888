//! Input document forms.
//!
//! Two logical schemas are accepted: the traditional form (`nodes:` list plus
//! a flat `peers:` list) and the group form (`nodes:` keyed by group, plus
//! `groups:`/`connections:` and a `routing:` section). Both carry identical
//! semantics after group expansion.
//!
//! This module is the parsing collaborator's boundary: it deserialises,
//! validates shape, and hands the engine a frozen [`Network`] plus the raw
//! intents/connections/rules.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use wgforge_wireguard::{AllowedIp, Endpoint};

use crate::error::EngineError;
use crate::model::{
    Connection, ConnectionKind, EndpointRef, Group, GroupTopology, Network, Node, NodeRole,
    Origin, PeerIntent, RouteToken, RoutingRule, RoutingSpec, RuleScope,
};

/// A node as written in a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique node name.
    pub name: String,
    /// Role; defaults to client.
    #[serde(default)]
    pub role: NodeRole,
    /// Overlay address with prefix length.
    pub wireguard_ip: AllowedIp,
    /// Optional fixed listen port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_port: Option<u16>,
    /// Public endpoints: a map, a list (synthetic names `e0, e1, …`), or one
    /// bare `host:port`.
    #[serde(default, skip_serializing_if = "EndpointsSpec::is_empty")]
    pub endpoints: EndpointsSpec,
    /// Opaque DNS pass-through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<String>,
    /// Opaque MTU pass-through.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u16>,
    /// User PostUp commands.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_up: Vec<String>,
    /// User PostDown commands.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_down: Vec<String>,
    /// Forces forwarding side effects regardless of role.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub enable_ip_forward: bool,
}

/// The `endpoints` field in its three accepted shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EndpointsSpec {
    /// Named endpoints.
    Map(BTreeMap<String, String>),
    /// Unnamed endpoints; get synthetic names `e0, e1, …` in list order.
    List(Vec<String>),
    /// A single unnamed endpoint.
    Single(String),
}

impl Default for EndpointsSpec {
    fn default() -> Self {
        Self::List(Vec::new())
    }
}

impl EndpointsSpec {
    fn is_empty(&self) -> bool {
        match self {
            Self::Map(m) => m.is_empty(),
            Self::List(l) => l.is_empty(),
            Self::Single(_) => false,
        }
    }

    /// Resolves to the named endpoint table.
    fn compile(&self, node: &str) -> Result<BTreeMap<String, Endpoint>, Vec<EngineError>> {
        let entries: Vec<(String, &str)> = match self {
            Self::Map(m) => m
                .iter()
                .map(|(name, value)| (name.clone(), value.as_str()))
                .collect(),
            Self::List(l) => l
                .iter()
                .enumerate()
                .map(|(i, value)| (format!("e{i}"), value.as_str()))
                .collect(),
            Self::Single(value) => vec![("e0".to_string(), value.as_str())],
        };

        let mut table = BTreeMap::new();
        let mut errors = Vec::new();
        for (name, value) in entries {
            match value.parse::<Endpoint>() {
                Ok(endpoint) => {
                    table.insert(name, endpoint);
                }
                Err(e) => errors.push(EngineError::InvalidDocument(format!(
                    "node '{node}' endpoint '{name}': {e}"
                ))),
            }
        }
        if errors.is_empty() {
            Ok(table)
        } else {
            Err(errors)
        }
    }
}

/// One directional peer as written in the traditional form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerSpec {
    /// The dialing node.
    pub from: String,
    /// The dialed node.
    pub to: String,
    /// Literal `host:port` or an endpoint name on the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Routes (CIDRs or symbolic tokens).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_ips: Vec<String>,
    /// Keepalive seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persistent_keepalive: Option<u16>,
}

/// The `nodes:` section in either shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodesSection {
    /// Traditional flat list.
    List(Vec<NodeSpec>),
    /// Group form: members keyed by group name.
    Grouped(BTreeMap<String, Vec<NodeSpec>>),
}

/// Gateway member lists for gateway connections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewaySpec {
    /// Gateways on the `from` side (reverse direction).
    #[serde(default)]
    pub from: Vec<String>,
    /// Gateways on the `to` side.
    #[serde(default)]
    pub to: Vec<String>,
}

/// Special flags carried by a connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpecialFlags {
    /// Marks a bidirectional connection as a bridge.
    #[serde(default)]
    pub is_bridge: bool,
    /// Keepalive applied to the generated edges.
    #[serde(default)]
    pub persistent_keepalive: Option<u16>,
}

/// One `groups:`/`connections:` entry. Entries with a `topology` define a
/// group; entries with a `type` define a connection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupEntry {
    /// Group name, or a connection's display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Group members, or the participating subset of a selective connection.
    #[serde(default)]
    pub nodes: Vec<String>,
    /// Present on group definitions.
    #[serde(default)]
    pub topology: Option<GroupTopology>,
    /// Endpoint name used for intra-group edges.
    #[serde(default)]
    pub mesh_endpoint: Option<String>,
    /// Star hub (alias `hub_node` accepted).
    #[serde(default, alias = "hub_node")]
    pub hub: Option<String>,
    /// Present on connection definitions.
    #[serde(default, rename = "type")]
    pub kind: Option<ConnectionKind>,
    /// Connection source side.
    #[serde(default)]
    pub from: Option<String>,
    /// Connection target side.
    #[serde(default)]
    pub to: Option<String>,
    /// Endpoint selector for generated edges.
    #[serde(default)]
    pub endpoint_selector: Option<String>,
    /// Per-direction endpoint mapping (`<a>_to_<b>` keys).
    #[serde(default)]
    pub endpoint_mapping: BTreeMap<String, String>,
    /// Gateway members.
    #[serde(default)]
    pub gateway_nodes: GatewaySpec,
    /// Routing expressions: `allowed_ips` and `<name>_allowed_ips` keys.
    #[serde(default)]
    pub routing: BTreeMap<String, Vec<String>>,
    /// Special flags.
    #[serde(default)]
    pub special_flags: SpecialFlags,
    /// Keepalive shorthand, equivalent to the special flag.
    #[serde(default)]
    pub persistent_keepalive: Option<u16>,
}

/// A parsed but not yet validated document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Node definitions, flat or grouped.
    pub nodes: NodesSection,
    /// Traditional-form peers.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub peers: Vec<PeerSpec>,
    /// Group-form groups and inline connections.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<GroupEntry>,
    /// Group-form connections (also accepted inline in `groups`).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<GroupEntry>,
    /// Free-standing routing rules: `<name>_allowed_ips` keys.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub routing: BTreeMap<String, Vec<String>>,
}

/// A document compiled into the frozen model, ready for expansion.
#[derive(Debug, Clone)]
pub struct CompiledDocument {
    /// Validated node and group tables.
    pub network: Network,
    /// Traditional-form edges.
    pub explicit_intents: Vec<PeerIntent>,
    /// Group-form connections, in document order.
    pub connections: Vec<Connection>,
    /// Document-level routing rules (global scope).
    pub global_rules: Vec<RoutingRule>,
}

impl Document {
    /// Validates the document and compiles it into the engine model.
    ///
    /// # Errors
    ///
    /// Returns every problem found: shape errors, dangling references,
    /// duplicate names or addresses, arity violations, bad route tokens.
    pub fn compile(&self) -> Result<CompiledDocument, Vec<EngineError>> {
        let mut errors = Vec::new();

        let mut nodes = Vec::new();
        let mut implicit_groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
        match &self.nodes {
            NodesSection::List(specs) => {
                for spec in specs {
                    match compile_node(spec) {
                        Ok(node) => nodes.push(node),
                        Err(errs) => errors.extend(errs),
                    }
                }
            }
            NodesSection::Grouped(by_group) => {
                for (group_name, specs) in by_group {
                    let members = implicit_groups.entry(group_name.clone()).or_default();
                    for spec in specs {
                        members.push(spec.name.clone());
                        match compile_node(spec) {
                            Ok(node) => nodes.push(node),
                            Err(errs) => errors.extend(errs),
                        }
                    }
                }
            }
        }

        let mut groups = Vec::new();
        let mut connections = Vec::new();
        for entry in self.groups.iter().chain(self.connections.iter()) {
            match (entry.topology, entry.kind) {
                (Some(_), Some(_)) => errors.push(EngineError::InvalidDocument(format!(
                    "entry '{}' declares both a topology and a connection type",
                    entry.name.as_deref().unwrap_or("<unnamed>")
                ))),
                (Some(topology), None) => match compile_group(entry, topology, &implicit_groups) {
                    Ok(group) => groups.push(group),
                    Err(e) => errors.push(e),
                },
                (None, Some(kind)) => match compile_connection(entry, kind) {
                    Ok(conn) => connections.push(conn),
                    Err(errs) => errors.extend(errs),
                },
                (None, None) => errors.push(EngineError::InvalidDocument(format!(
                    "entry '{}' has neither a topology nor a connection type",
                    entry.name.as_deref().unwrap_or("<unnamed>")
                ))),
            }
        }

        // Groups that exist only as keys of the nodes mapping default to mesh
        // when they have 2+ members and single otherwise.
        for (name, members) in &implicit_groups {
            if groups.iter().any(|g: &Group| &g.name == name) {
                continue;
            }
            groups.push(Group {
                name: name.clone(),
                members: members.clone(),
                topology: if members.len() > 1 {
                    GroupTopology::Mesh
                } else {
                    GroupTopology::Single
                },
                mesh_endpoint: None,
                hub: None,
            });
        }

        let network = match Network::new(nodes, groups) {
            Ok(network) => network,
            Err(errs) => {
                errors.extend(errs);
                return Err(errors);
            }
        };

        let mut explicit_intents = Vec::new();
        for spec in &self.peers {
            match compile_peer(spec, &network) {
                Ok(intent) => explicit_intents.push(intent),
                Err(errs) => errors.extend(errs),
            }
        }

        let mut global_rules = Vec::new();
        for (key, tokens) in &self.routing {
            match compile_rule_key(key, tokens) {
                Ok((side, routes)) => global_rules.push(RoutingRule {
                    side: Some(side),
                    routes,
                    scope: RuleScope::Global,
                }),
                Err(errs) => errors.extend(errs),
            }
        }

        if errors.is_empty() {
            Ok(CompiledDocument {
                network,
                explicit_intents,
                connections,
                global_rules,
            })
        } else {
            Err(errors)
        }
    }
}

fn compile_node(spec: &NodeSpec) -> Result<Node, Vec<EngineError>> {
    let endpoints = spec.endpoints.compile(&spec.name)?;
    Ok(Node {
        name: spec.name.clone(),
        role: spec.role,
        wireguard_ip: spec.wireguard_ip.clone(),
        listen_port: spec.listen_port,
        endpoints,
        dns: spec.dns.clone(),
        mtu: spec.mtu,
        post_up: spec.post_up.clone(),
        post_down: spec.post_down.clone(),
        enable_ip_forward: spec.enable_ip_forward,
    })
}

fn compile_group(
    entry: &GroupEntry,
    topology: GroupTopology,
    implicit: &BTreeMap<String, Vec<String>>,
) -> Result<Group, EngineError> {
    let name = entry
        .name
        .clone()
        .ok_or_else(|| EngineError::InvalidDocument("group entry without a name".to_string()))?;
    let members = if entry.nodes.is_empty() {
        implicit.get(&name).cloned().unwrap_or_default()
    } else {
        entry.nodes.clone()
    };
    Ok(Group {
        name,
        members,
        topology,
        mesh_endpoint: entry.mesh_endpoint.clone(),
        hub: entry.hub.clone(),
    })
}

fn compile_connection(entry: &GroupEntry, kind: ConnectionKind) -> Result<Connection, Vec<EngineError>> {
    let mut errors = Vec::new();
    let display = entry
        .name
        .clone()
        .unwrap_or_else(|| "<unnamed connection>".to_string());

    let from = entry.from.clone().unwrap_or_else(|| {
        errors.push(EngineError::InvalidDocument(format!(
            "connection '{display}' is missing 'from'"
        )));
        String::new()
    });
    let to = entry.to.clone().unwrap_or_else(|| {
        errors.push(EngineError::InvalidDocument(format!(
            "connection '{display}' is missing 'to'"
        )));
        String::new()
    });

    let mut routing = RoutingSpec::default();
    for (key, tokens) in &entry.routing {
        if key == "allowed_ips" {
            match compile_tokens(tokens) {
                Ok(parsed) => routing.allowed_ips = parsed,
                Err(errs) => errors.extend(errs),
            }
        } else {
            match compile_rule_key(key, tokens) {
                Ok((side, routes)) => {
                    routing.sided.insert(side, routes);
                }
                Err(errs) => errors.extend(errs),
            }
        }
    }

    // A bidirectional connection flagged is_bridge is a bridge.
    let kind = if kind == ConnectionKind::Bidirectional && entry.special_flags.is_bridge {
        ConnectionKind::Bridge
    } else {
        kind
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(Connection {
        name: entry.name.clone(),
        from,
        to,
        kind,
        endpoint_selector: entry.endpoint_selector.clone(),
        endpoint_mapping: entry.endpoint_mapping.clone(),
        nodes: entry.nodes.clone(),
        gateway_to: entry.gateway_nodes.to.clone(),
        gateway_from: entry.gateway_nodes.from.clone(),
        routing,
        persistent_keepalive: entry
            .special_flags
            .persistent_keepalive
            .or(entry.persistent_keepalive),
    })
}

fn compile_peer(spec: &PeerSpec, network: &Network) -> Result<PeerIntent, Vec<EngineError>> {
    let mut errors = Vec::new();

    if spec.from == spec.to {
        errors.push(EngineError::SelfPeer(spec.from.clone()));
    }
    for name in [&spec.from, &spec.to] {
        if network.node(name).is_none() {
            errors.push(EngineError::UnknownReference {
                kind: "node",
                name: name.clone(),
                referrer: format!("peer {} -> {}", spec.from, spec.to),
            });
        }
    }

    let allowed_ips = match compile_tokens(&spec.allowed_ips) {
        Ok(tokens) => tokens,
        Err(errs) => {
            errors.extend(errs);
            Vec::new()
        }
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    Ok(PeerIntent {
        from: spec.from.clone(),
        to: spec.to.clone(),
        endpoint_ref: spec.endpoint.as_deref().map(EndpointRef::parse),
        allowed_ips,
        persistent_keepalive: spec.persistent_keepalive,
        origin: Origin::ExplicitTopology,
        is_bridge: false,
    })
}

fn compile_tokens(raw: &[String]) -> Result<Vec<RouteToken>, Vec<EngineError>> {
    let mut tokens = Vec::with_capacity(raw.len());
    let mut errors = Vec::new();
    for s in raw {
        match RouteToken::parse(s) {
            Ok(token) => tokens.push(token),
            Err(e) => errors.push(e),
        }
    }
    if errors.is_empty() {
        Ok(tokens)
    } else {
        Err(errors)
    }
}

fn compile_rule_key(
    key: &str,
    tokens: &[String],
) -> Result<(String, Vec<RouteToken>), Vec<EngineError>> {
    let Some(side) = key.strip_suffix("_allowed_ips") else {
        return Err(vec![EngineError::InvalidDocument(format!(
            "routing key '{key}' must end with '_allowed_ips'"
        ))]);
    };
    let routes = compile_tokens(tokens)?;
    Ok((side.to_string(), routes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traditional_form_parses() {
        let yaml = r"
nodes:
  - name: A
    wireguard_ip: 10.96.0.2/16
    endpoints:
      main: 1.1.1.1:51820
  - name: B
    wireguard_ip: 10.96.0.3/16
peers:
  - from: A
    to: B
    allowed_ips: [10.96.0.3/32]
";
        let doc: Document = serde_yaml::from_str(yaml).expect("valid yaml");
        let compiled = doc.compile().expect("compiles");
        assert_eq!(compiled.network.node_count(), 2);
        assert_eq!(compiled.explicit_intents.len(), 1);
        assert!(compiled.connections.is_empty());
    }

    #[test]
    fn grouped_form_parses() {
        let yaml = r"
nodes:
  office:
    - name: A
      wireguard_ip: 10.96.0.2/16
    - name: B
      wireguard_ip: 10.96.0.3/16
groups:
  - name: office
    topology: mesh
routing:
  A_allowed_ips: [office.subnet]
";
        let doc: Document = serde_yaml::from_str(yaml).expect("valid yaml");
        let compiled = doc.compile().expect("compiles");
        assert_eq!(compiled.network.node_count(), 2);
        let group = compiled.network.group("office").expect("group");
        assert_eq!(group.topology, GroupTopology::Mesh);
        assert_eq!(compiled.global_rules.len(), 1);
        assert_eq!(compiled.global_rules[0].side.as_deref(), Some("A"));
    }

    #[test]
    fn nodes_map_without_group_entry_defaults_to_mesh() {
        let yaml = r"
nodes:
  office:
    - name: A
      wireguard_ip: 10.96.0.2/16
    - name: B
      wireguard_ip: 10.96.0.3/16
";
        let doc: Document = serde_yaml::from_str(yaml).expect("valid yaml");
        let compiled = doc.compile().expect("compiles");
        assert_eq!(
            compiled.network.group("office").expect("group").topology,
            GroupTopology::Mesh
        );
    }

    #[test]
    fn endpoint_list_gets_synthetic_names() {
        let yaml = r#"
nodes:
  - name: A
    wireguard_ip: 10.96.0.2/16
    endpoints: ["1.1.1.1:51820", "2.2.2.2:443"]
"#;
        let doc: Document = serde_yaml::from_str(yaml).expect("valid yaml");
        let compiled = doc.compile().expect("compiles");
        let node = compiled.network.node("A").expect("node");
        assert!(node.endpoints.contains_key("e0"));
        assert!(node.endpoints.contains_key("e1"));
    }

    #[test]
    fn self_peer_rejected() {
        let yaml = r"
nodes:
  - name: A
    wireguard_ip: 10.96.0.2/16
peers:
  - from: A
    to: A
";
        let doc: Document = serde_yaml::from_str(yaml).expect("valid yaml");
        let errors = doc.compile().expect_err("should fail");
        assert!(errors
            .iter()
            .any(|e| matches!(e, EngineError::SelfPeer(n) if n == "A")));
    }

    #[test]
    fn unknown_peer_reference_rejected() {
        let yaml = r"
nodes:
  - name: A
    wireguard_ip: 10.96.0.2/16
peers:
  - from: A
    to: Z
";
        let doc: Document = serde_yaml::from_str(yaml).expect("valid yaml");
        let errors = doc.compile().expect_err("should fail");
        assert!(errors
            .iter()
            .any(|e| matches!(e, EngineError::UnknownReference { name, .. } if name == "Z")));
    }

    #[test]
    fn bad_endpoint_value_rejected() {
        let yaml = r"
nodes:
  - name: A
    wireguard_ip: 10.96.0.2/16
    endpoints:
      main: not-an-endpoint
";
        let doc: Document = serde_yaml::from_str(yaml).expect("valid yaml");
        assert!(doc.compile().is_err());
    }

    #[test]
    fn bad_routing_key_rejected() {
        let yaml = r"
nodes:
  - name: A
    wireguard_ip: 10.96.0.2/16
routing:
  A_routes: [10.0.0.0/8]
";
        let doc: Document = serde_yaml::from_str(yaml).expect("valid yaml");
        let errors = doc.compile().expect_err("should fail");
        assert!(errors
            .iter()
            .any(|e| matches!(e, EngineError::InvalidDocument(_))));
    }

    #[test]
    fn bidirectional_with_bridge_flag_becomes_bridge() {
        let yaml = r"
nodes:
  relay:
    - name: G
      wireguard_ip: 10.10.0.1/24
  over:
    - name: H
      wireguard_ip: 10.20.0.1/24
groups:
  - name: relay
    topology: single
  - name: over
    topology: single
  - from: relay.G
    to: over.H
    type: bidirectional
    endpoint_mapping:
      G_to_H: 172.16.1.1:33333
      H_to_G: 10.10.10.10:22222
    special_flags:
      is_bridge: true
      persistent_keepalive: 25
";
        let doc: Document = serde_yaml::from_str(yaml).expect("valid yaml");
        let compiled = doc.compile().expect("compiles");
        assert_eq!(compiled.connections.len(), 1);
        assert_eq!(compiled.connections[0].kind, ConnectionKind::Bridge);
        assert_eq!(compiled.connections[0].persistent_keepalive, Some(25));
    }

    #[test]
    fn errors_accumulate_across_sections() {
        let yaml = r"
nodes:
  - name: A
    wireguard_ip: 10.96.0.2/16
  - name: B
    wireguard_ip: 10.96.0.2/16
peers:
  - from: A
    to: Z
";
        let doc: Document = serde_yaml::from_str(yaml).expect("valid yaml");
        let errors = doc.compile().expect_err("should fail");
        // Duplicate IP is found even though the peer reference also fails.
        assert!(errors
            .iter()
            .any(|e| matches!(e, EngineError::DuplicateNodeIp { .. })));
    }
}
