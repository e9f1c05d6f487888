//! Entity model for the topology engine.
//!
//! Entities are constructed by the document layer, validated once, and never
//! mutated afterwards; every pipeline stage builds new derived structures.
//! The [`Network`] table exposes O(1) lookup by node and group name.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use wgforge_wireguard::{AllowedIp, Endpoint};

use crate::error::EngineError;

/// Role of a node in the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// An ordinary member; no forwarding side effects.
    #[default]
    Client,
    /// Forwards traffic for others; emission enables IP forwarding.
    Relay,
    /// A service host; no forwarding side effects.
    Server,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Relay => write!(f, "relay"),
            Self::Server => write!(f, "server"),
        }
    }
}

/// Identity in the overlay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique name, `[A-Za-z0-9_-]+`.
    pub name: String,
    /// Role; relay implies forwarding side effects in emission.
    pub role: NodeRole,
    /// The overlay interface address, with prefix length.
    pub wireguard_ip: AllowedIp,
    /// Optional fixed listen port.
    pub listen_port: Option<u16>,
    /// Named public endpoints. Lexicographic order decides the default.
    pub endpoints: BTreeMap<String, Endpoint>,
    /// Opaque DNS pass-through.
    pub dns: Option<String>,
    /// Opaque MTU pass-through.
    pub mtu: Option<u16>,
    /// User-supplied PostUp commands; suppress generated defaults.
    pub post_up: Vec<String>,
    /// User-supplied PostDown commands; suppress generated defaults.
    pub post_down: Vec<String>,
    /// Forces forwarding side effects regardless of role.
    pub enable_ip_forward: bool,
}

impl Node {
    /// The overlay address without its prefix.
    #[must_use]
    pub fn overlay_addr(&self) -> IpAddr {
        self.wireguard_ip.addr()
    }

    /// The host route (`/32` or `/128`) of the overlay address.
    #[must_use]
    pub fn host_route(&self) -> AllowedIp {
        AllowedIp::host_route(self.overlay_addr())
    }

    /// The lexicographically first endpoint, used when no selector is given.
    #[must_use]
    pub fn default_endpoint(&self) -> Option<&Endpoint> {
        self.endpoints.values().next()
    }

    /// Whether emission must enable IP forwarding for this node.
    #[must_use]
    pub fn forwards(&self) -> bool {
        self.enable_ip_forward || self.role == NodeRole::Relay
    }
}

/// Whether a node or group name is well-formed (`[A-Za-z0-9_-]+`).
#[must_use]
pub fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Intra-group wiring shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupTopology {
    /// Every ordered pair of members gets an edge.
    Mesh,
    /// Spokes dial the hub; the hub answers passively.
    Star,
    /// Consecutive members are wired both ways.
    Chain,
    /// Exactly one member, no intra-group edges.
    Single,
}

impl fmt::Display for GroupTopology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mesh => write!(f, "mesh"),
            Self::Star => write!(f, "star"),
            Self::Chain => write!(f, "chain"),
            Self::Single => write!(f, "single"),
        }
    }
}

/// A labelled set of nodes plus an internal topology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Unique group name.
    pub name: String,
    /// Members, in document order (significant for chains).
    pub members: Vec<String>,
    /// Internal wiring.
    pub topology: GroupTopology,
    /// Optional endpoint name used for intra-group edges.
    pub mesh_endpoint: Option<String>,
    /// Hub member; required for star.
    pub hub: Option<String>,
}

impl Group {
    /// Checks the arity and hub rules for this group's topology.
    pub(crate) fn check_arity(&self) -> Result<(), EngineError> {
        let arity = |requirement| EngineError::TopologyArity {
            group: self.name.clone(),
            topology: self.topology.to_string(),
            requirement,
            actual: self.members.len(),
        };
        match self.topology {
            GroupTopology::Mesh | GroupTopology::Chain => {
                if self.members.len() < 2 {
                    return Err(arity("at least 2 members"));
                }
            }
            GroupTopology::Star => {
                if self.members.len() < 2 {
                    return Err(arity("at least 2 members including the hub"));
                }
                match &self.hub {
                    Some(hub) if self.members.contains(hub) => {}
                    Some(hub) => {
                        return Err(EngineError::UnknownReference {
                            kind: "node",
                            name: hub.clone(),
                            referrer: format!("hub of group '{}'", self.name),
                        });
                    }
                    None => {
                        return Err(EngineError::InvalidDocument(format!(
                            "star group '{}' requires a hub",
                            self.name
                        )));
                    }
                }
            }
            GroupTopology::Single => {
                if self.members.len() != 1 {
                    return Err(arity("exactly 1 member"));
                }
            }
        }
        Ok(())
    }
}

/// Selector a peer-intent uses to name one of the target's endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndpointRef {
    /// A literal `host:port`, used verbatim.
    Literal(Endpoint),
    /// An endpoint name resolved on the target node.
    Named(String),
}

impl EndpointRef {
    /// Parses an endpoint reference as written in a document.
    ///
    /// A literal `host:port` wins; `node.name` selectors keep only the
    /// endpoint name (the node part is the target by construction); anything
    /// else is an endpoint name.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        if let Ok(endpoint) = s.parse::<Endpoint>() {
            return Self::Literal(endpoint);
        }
        match s.split_once('.') {
            Some((_, name)) => Self::Named(name.to_string()),
            None => Self::Named(s.to_string()),
        }
    }
}

/// Provenance tag on a peer-intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    /// From the traditional `peers:` list.
    ExplicitTopology,
    /// Intra-group mesh edge.
    GroupMesh,
    /// Intra-group star edge.
    GroupStar,
    /// Intra-group chain edge.
    GroupChain,
    /// Single-member group (no edges; kept for completeness).
    GroupSingle,
    /// Gateway connection edge.
    GroupGateway,
    /// Selective connection edge.
    GroupSelective,
    /// Inter-group full-mesh edge.
    GroupFullmesh,
    /// Bridge edge.
    GroupBridge,
    /// Outbound-only connection edge.
    GroupOutbound,
    /// Bidirectional connection edge.
    GroupBidirectional,
}

impl Origin {
    /// The tag as written in provenance comments.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ExplicitTopology => "explicit-topology",
            Self::GroupMesh => "group-mesh",
            Self::GroupStar => "group-star",
            Self::GroupChain => "group-chain",
            Self::GroupSingle => "group-single",
            Self::GroupGateway => "group-gateway",
            Self::GroupSelective => "group-selective",
            Self::GroupFullmesh => "group-fullmesh",
            Self::GroupBridge => "group-bridge",
            Self::GroupOutbound => "group-outbound",
            Self::GroupBidirectional => "group-bidirectional",
        }
    }

    /// Peer ordering class: intra-group edges first, then star/gateway, then
    /// explicit and remaining inter-group edges, bridges last.
    #[must_use]
    pub const fn ordering_class(self) -> u8 {
        match self {
            Self::GroupMesh | Self::GroupChain => 0,
            Self::GroupStar | Self::GroupGateway => 1,
            Self::ExplicitTopology
            | Self::GroupSingle
            | Self::GroupSelective
            | Self::GroupFullmesh
            | Self::GroupOutbound
            | Self::GroupBidirectional => 2,
            Self::GroupBridge => 3,
        }
    }

    /// Whether this origin is an intra-group edge.
    #[must_use]
    pub const fn is_intra_group(self) -> bool {
        matches!(self, Self::GroupMesh | Self::GroupStar | Self::GroupChain)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of an `allowed_ips` list before resolution: a literal CIDR or a
/// symbolic reference into the node/group model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RouteToken {
    /// A literal CIDR, used verbatim.
    Cidr(AllowedIp),
    /// `<name>.<attr>` — resolved against the group table.
    Symbolic {
        /// Group (or, erroneously, node) name.
        name: String,
        /// `subnet`, `nodes`, or an invalid attribute.
        attr: String,
    },
}

impl RouteToken {
    /// Parses a route token.
    ///
    /// # Errors
    ///
    /// Returns `BadRouteToken` when the string is neither a CIDR nor a
    /// `name.attr` reference.
    pub fn parse(s: &str) -> Result<Self, EngineError> {
        if let Ok(cidr) = AllowedIp::from_cidr(s) {
            return Ok(Self::Cidr(cidr));
        }
        if let Some((name, attr)) = s.split_once('.') {
            if valid_name(name) && !attr.is_empty() {
                return Ok(Self::Symbolic {
                    name: name.to_string(),
                    attr: attr.to_string(),
                });
            }
        }
        Err(EngineError::BadRouteToken {
            token: s.to_string(),
            reason: "not a CIDR or a <group>.<attr> reference".to_string(),
        })
    }

    /// The host route for a single address.
    #[must_use]
    pub fn host_route(addr: IpAddr) -> Self {
        Self::Cidr(AllowedIp::host_route(addr))
    }
}

impl fmt::Display for RouteToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cidr(cidr) => write!(f, "{cidr}"),
            Self::Symbolic { name, attr } => write!(f, "{name}.{attr}"),
        }
    }
}

impl TryFrom<String> for RouteToken {
    type Error = EngineError;

    fn try_from(s: String) -> Result<Self, EngineError> {
        Self::parse(&s)
    }
}

impl From<RouteToken> for String {
    fn from(token: RouteToken) -> Self {
        token.to_string()
    }
}

/// One directional edge: an author's intent before endpoint resolution and
/// key binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerIntent {
    /// The dialing node.
    pub from: String,
    /// The dialed node.
    pub to: String,
    /// How to pick the target endpoint; `None` may resolve passively.
    pub endpoint_ref: Option<EndpointRef>,
    /// Route tokens; an empty list means only the injected host route.
    pub allowed_ips: Vec<RouteToken>,
    /// Keepalive seconds; 0 disables.
    pub persistent_keepalive: Option<u16>,
    /// Where this edge came from.
    pub origin: Origin,
    /// Set on both directions of a bridge connection.
    pub is_bridge: bool,
}

impl PeerIntent {
    /// A plain edge with defaults for the optional fields.
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>, origin: Origin) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            endpoint_ref: None,
            allowed_ips: Vec::new(),
            persistent_keepalive: None,
            origin,
            is_bridge: false,
        }
    }
}

/// Relation kind between two groups (or a group and a node).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// Every `s -> t`, no reverse edges.
    OutboundOnly,
    /// Both directions, with per-side routing.
    Bidirectional,
    /// Clients connect only to listed gateway members.
    Gateway,
    /// Restrict one side to a listed subset, then outbound.
    Selective,
    /// Both directions across the full cartesian product; sides may coincide.
    FullMesh,
    /// Two nodes, both directions, per-direction endpoint mapping.
    Bridge,
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OutboundOnly => "outbound_only",
            Self::Bidirectional => "bidirectional",
            Self::Gateway => "gateway",
            Self::Selective => "selective",
            Self::FullMesh => "full_mesh",
            Self::Bridge => "bridge",
        };
        f.write_str(s)
    }
}

/// Routing expressions attached to a connection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RoutingSpec {
    /// Routes applied to every edge of the connection.
    #[serde(default)]
    pub allowed_ips: Vec<RouteToken>,
    /// `<name>_allowed_ips` entries, keyed by the bare name.
    #[serde(default)]
    pub sided: BTreeMap<String, Vec<RouteToken>>,
}

impl RoutingSpec {
    /// Whether no routing expressions were given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allowed_ips.is_empty() && self.sided.is_empty()
    }
}

/// A relation between two groups (or a group and a node).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Optional display name; falls back to `from->to`.
    pub name: Option<String>,
    /// One side: group name, node name, or `group.node`.
    pub from: String,
    /// The other side.
    pub to: String,
    /// Relation kind.
    pub kind: ConnectionKind,
    /// Endpoint selector for generated edges.
    pub endpoint_selector: Option<String>,
    /// Per-direction endpoint mapping (bridges): `<a>_to_<b>` keys.
    pub endpoint_mapping: BTreeMap<String, String>,
    /// Participating subset for selective connections.
    pub nodes: Vec<String>,
    /// Gateway members on the `to` side.
    pub gateway_to: Vec<String>,
    /// Gateway members on the `from` side (reverse gateways).
    pub gateway_from: Vec<String>,
    /// Routing expressions scoped to this connection's edges.
    pub routing: RoutingSpec,
    /// Keepalive applied to generated edges.
    pub persistent_keepalive: Option<u16>,
}

impl Connection {
    /// The display name used in errors.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{}->{}", self.from, self.to))
    }
}

/// A free-standing or connection-scoped routing rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingRule {
    /// Side filter: edges whose `from` is this node, or a member of this
    /// group. `None` applies to every edge in scope.
    pub side: Option<String>,
    /// The routes to merge in.
    pub routes: Vec<RouteToken>,
    /// Which edges the rule reaches.
    pub scope: RuleScope,
}

/// The reach of a routing rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleScope {
    /// The document-level `routing:` section; reaches every edge.
    Global,
    /// Only the `(from, to)` edges a connection generated.
    Edges(Vec<(String, String)>),
}

impl RoutingRule {
    /// Whether this rule contributes routes to the edge `from -> to`.
    #[must_use]
    pub fn applies_to(&self, from: &str, to: &str, network: &Network) -> bool {
        let in_scope = match &self.scope {
            RuleScope::Global => true,
            RuleScope::Edges(edges) => edges.iter().any(|(f, t)| f == from && t == to),
        };
        if !in_scope {
            return false;
        }
        match &self.side {
            None => true,
            Some(name) => {
                name == from
                    || network
                        .group(name)
                        .is_some_and(|g| g.members.iter().any(|m| m == from))
            }
        }
    }
}

/// The validated, frozen node and group tables.
///
/// Constructed once by the document layer; lookups are O(1) and nothing is
/// mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct Network {
    nodes: BTreeMap<String, Node>,
    groups: BTreeMap<String, Group>,
}

impl Network {
    /// Builds and validates the table.
    ///
    /// # Errors
    ///
    /// Returns every validation failure found: malformed or duplicate node
    /// names, duplicate overlay addresses, dangling group members, topology
    /// arity violations.
    pub fn new(nodes: Vec<Node>, groups: Vec<Group>) -> Result<Self, Vec<EngineError>> {
        let mut errors = Vec::new();
        let mut node_table: BTreeMap<String, Node> = BTreeMap::new();
        let mut by_ip: BTreeMap<IpAddr, Vec<String>> = BTreeMap::new();

        for node in nodes {
            if !valid_name(&node.name) {
                errors.push(EngineError::InvalidDocument(format!(
                    "node name '{}' must match [A-Za-z0-9_-]+",
                    node.name
                )));
                continue;
            }
            if node_table.contains_key(&node.name) {
                errors.push(EngineError::DuplicateNodeName(node.name));
                continue;
            }
            by_ip
                .entry(node.overlay_addr())
                .or_default()
                .push(node.name.clone());
            node_table.insert(node.name.clone(), node);
        }

        for (ip, names) in &by_ip {
            if names.len() > 1 {
                errors.push(EngineError::DuplicateNodeIp {
                    names: names.clone(),
                    ip: ip.to_string(),
                });
            }
        }

        let mut group_table: BTreeMap<String, Group> = BTreeMap::new();
        for group in groups {
            if !valid_name(&group.name) {
                errors.push(EngineError::InvalidDocument(format!(
                    "group name '{}' must match [A-Za-z0-9_-]+",
                    group.name
                )));
                continue;
            }
            for member in &group.members {
                if !node_table.contains_key(member) {
                    errors.push(EngineError::UnknownReference {
                        kind: "node",
                        name: member.clone(),
                        referrer: format!("group '{}'", group.name),
                    });
                }
            }
            if let Err(e) = group.check_arity() {
                errors.push(e);
            }
            if group_table.insert(group.name.clone(), group.clone()).is_some() {
                errors.push(EngineError::InvalidDocument(format!(
                    "duplicate group name: '{}'",
                    group.name
                )));
            }
        }

        if errors.is_empty() {
            Ok(Self {
                nodes: node_table,
                groups: group_table,
            })
        } else {
            Err(errors)
        }
    }

    /// Looks up a node by name.
    #[must_use]
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    /// Looks up a group by name.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.get(name)
    }

    /// All nodes in name order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// All groups in name order.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values()
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Resolves a connection side to its member nodes, alphabetically.
    ///
    /// Accepts a group name, a bare node name, or a `group.node` selector.
    ///
    /// # Errors
    ///
    /// Returns `UnknownReference` when nothing matches.
    pub fn resolve_side(&self, side: &str, referrer: &str) -> Result<Vec<String>, EngineError> {
        if let Some(group) = self.groups.get(side) {
            let mut members = group.members.clone();
            members.sort();
            return Ok(members);
        }
        if self.nodes.contains_key(side) {
            return Ok(vec![side.to_string()]);
        }
        // `group.node` selector, e.g. "china_relay.G".
        if let Some((group, node)) = side.split_once('.') {
            if self
                .groups
                .get(group)
                .is_some_and(|g| g.members.iter().any(|m| m == node))
            {
                return Ok(vec![node.to_string()]);
            }
        }
        Err(EngineError::UnknownReference {
            kind: "group",
            name: side.to_string(),
            referrer: referrer.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, ip: &str) -> Node {
        Node {
            name: name.to_string(),
            role: NodeRole::Client,
            wireguard_ip: AllowedIp::from_cidr(ip).expect("valid ip"),
            listen_port: None,
            endpoints: BTreeMap::new(),
            dns: None,
            mtu: None,
            post_up: Vec::new(),
            post_down: Vec::new(),
            enable_ip_forward: false,
        }
    }

    #[test]
    fn valid_name_rules() {
        assert!(valid_name("node-1_A"));
        assert!(!valid_name(""));
        assert!(!valid_name("node.1"));
        assert!(!valid_name("node 1"));
    }

    #[test]
    fn network_detects_duplicate_names() {
        let errors = Network::new(
            vec![node("A", "10.0.0.1/24"), node("A", "10.0.0.2/24")],
            vec![],
        )
        .expect_err("should fail");
        assert!(errors
            .iter()
            .any(|e| matches!(e, EngineError::DuplicateNodeName(n) if n == "A")));
    }

    #[test]
    fn network_detects_duplicate_ips() {
        let errors = Network::new(
            vec![node("A", "10.96.0.2/16"), node("B", "10.96.0.2/16")],
            vec![],
        )
        .expect_err("should fail");
        assert!(errors.iter().any(|e| matches!(
            e,
            EngineError::DuplicateNodeIp { names, ip }
                if names == &vec!["A".to_string(), "B".to_string()] && ip == "10.96.0.2"
        )));
    }

    #[test]
    fn network_accepts_same_subnet_distinct_hosts() {
        let net = Network::new(
            vec![node("A", "10.96.0.2/16"), node("B", "10.96.0.3/16")],
            vec![],
        );
        assert!(net.is_ok());
    }

    #[test]
    fn network_rejects_dangling_group_member() {
        let group = Group {
            name: "g".to_string(),
            members: vec!["A".to_string(), "Z".to_string()],
            topology: GroupTopology::Mesh,
            mesh_endpoint: None,
            hub: None,
        };
        let errors = Network::new(vec![node("A", "10.0.0.1/24")], vec![group])
            .expect_err("should fail");
        assert!(errors
            .iter()
            .any(|e| matches!(e, EngineError::UnknownReference { name, .. } if name == "Z")));
    }

    #[test]
    fn mesh_arity_requires_two_members() {
        let group = Group {
            name: "g".to_string(),
            members: vec!["A".to_string()],
            topology: GroupTopology::Mesh,
            mesh_endpoint: None,
            hub: None,
        };
        assert!(matches!(
            group.check_arity(),
            Err(EngineError::TopologyArity { .. })
        ));
    }

    #[test]
    fn star_requires_member_hub() {
        let mut group = Group {
            name: "g".to_string(),
            members: vec!["A".to_string(), "B".to_string()],
            topology: GroupTopology::Star,
            mesh_endpoint: None,
            hub: Some("C".to_string()),
        };
        assert!(group.check_arity().is_err());
        group.hub = Some("A".to_string());
        assert!(group.check_arity().is_ok());
    }

    #[test]
    fn single_requires_exactly_one() {
        let group = Group {
            name: "g".to_string(),
            members: vec!["A".to_string(), "B".to_string()],
            topology: GroupTopology::Single,
            mesh_endpoint: None,
            hub: None,
        };
        assert!(group.check_arity().is_err());
    }

    #[test]
    fn route_token_parses_cidr_and_symbolic() {
        assert!(matches!(
            RouteToken::parse("10.0.0.0/24").expect("cidr"),
            RouteToken::Cidr(_)
        ));
        assert!(matches!(
            RouteToken::parse("office.subnet").expect("symbolic"),
            RouteToken::Symbolic { name, attr } if name == "office" && attr == "subnet"
        ));
        assert!(RouteToken::parse("???").is_err());
    }

    #[test]
    fn endpoint_ref_parse_shapes() {
        assert!(matches!(
            EndpointRef::parse("1.2.3.4:51820"),
            EndpointRef::Literal(_)
        ));
        assert!(matches!(
            EndpointRef::parse("H.special"),
            EndpointRef::Named(n) if n == "special"
        ));
        assert!(matches!(
            EndpointRef::parse("special"),
            EndpointRef::Named(n) if n == "special"
        ));
    }

    #[test]
    fn default_endpoint_is_lexicographic() {
        let mut n = node("A", "10.0.0.1/24");
        n.endpoints.insert(
            "zeta".to_string(),
            "9.9.9.9:51820".parse().expect("endpoint"),
        );
        n.endpoints.insert(
            "alpha".to_string(),
            "1.1.1.1:51820".parse().expect("endpoint"),
        );
        assert_eq!(
            n.default_endpoint().expect("endpoint").to_string(),
            "1.1.1.1:51820"
        );
    }

    #[test]
    fn resolve_side_group_is_alphabetical() {
        let group = Group {
            name: "g".to_string(),
            members: vec!["B".to_string(), "A".to_string()],
            topology: GroupTopology::Mesh,
            mesh_endpoint: None,
            hub: None,
        };
        let net = Network::new(
            vec![node("A", "10.0.0.1/24"), node("B", "10.0.0.2/24")],
            vec![group],
        )
        .expect("valid");
        assert_eq!(
            net.resolve_side("g", "test").expect("side"),
            vec!["A".to_string(), "B".to_string()]
        );
    }

    #[test]
    fn resolve_side_group_dot_node() {
        let group = Group {
            name: "relay".to_string(),
            members: vec!["G".to_string()],
            topology: GroupTopology::Single,
            mesh_endpoint: None,
            hub: None,
        };
        let net = Network::new(vec![node("G", "10.10.0.1/24")], vec![group]).expect("valid");
        assert_eq!(
            net.resolve_side("relay.G", "test").expect("side"),
            vec!["G".to_string()]
        );
        assert!(net.resolve_side("relay.X", "test").is_err());
    }
}
