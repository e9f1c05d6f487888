//! Engine error taxonomy and diagnostics.
//!
//! Errors are values: the pipeline accumulates them across independent
//! subtrees and returns the whole batch, so a user sees every problem with
//! their document in one report. Diagnostics are non-fatal findings returned
//! alongside a successful build.

use std::fmt;

use thiserror::Error;

/// A fatal problem with the input document or the derived configuration.
///
/// Payloads carry the offending node names, peer names, and CIDRs so callers
/// can highlight them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The document is structurally invalid.
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// A group or node reference does not resolve.
    #[error("unknown reference: {kind} '{name}' referenced by {referrer}")]
    UnknownReference {
        /// "node" or "group".
        kind: &'static str,
        /// The dangling name.
        name: String,
        /// Where the reference appeared.
        referrer: String,
    },

    /// A group's member count violates its topology rule.
    #[error("group '{group}' with topology {topology} requires {requirement}, has {actual} member(s)")]
    TopologyArity {
        /// The offending group.
        group: String,
        /// Its declared topology.
        topology: String,
        /// Human description of the rule.
        requirement: &'static str,
        /// Actual member count.
        actual: usize,
    },

    /// A named endpoint was not found on the target node.
    #[error("endpoint '{endpoint}' not found on node '{node}' (peer {from} -> {node})")]
    EndpointNotFound {
        /// The missing endpoint name.
        endpoint: String,
        /// The target node.
        node: String,
        /// The dialing side.
        from: String,
    },

    /// A symbolic routing token that cannot denote a route.
    #[error("bad route token '{token}': {reason}")]
    BadRouteToken {
        /// The token as written.
        token: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Two peers of one node claim overlapping address space.
    #[error("allowed_ips overlap on node '{node}': peer '{peer_a}' ({cidr_a}) vs peer '{peer_b}' ({cidr_b})")]
    AllowedIpsOverlap {
        /// The node whose peer table conflicts.
        node: String,
        /// First conflicting peer.
        peer_a: String,
        /// Second conflicting peer.
        peer_b: String,
        /// CIDR claimed by the first peer.
        cidr_a: String,
        /// CIDR claimed by the second peer.
        cidr_b: String,
    },

    /// A bridge connection without a usable per-side endpoint mapping.
    #[error("bridge connection '{connection}' is missing endpoint mapping key '{key}'")]
    BridgeMappingMissing {
        /// The connection's display name.
        connection: String,
        /// The absent `<a>_to_<b>` key.
        key: String,
    },

    /// A peer-intent from a node to itself.
    #[error("node '{0}' cannot peer with itself")]
    SelfPeer(String),

    /// Two nodes share one name.
    #[error("duplicate node name: '{0}'")]
    DuplicateNodeName(String),

    /// Two nodes share one overlay address.
    #[error("duplicate node ip {ip} on nodes {}", .names.join(", "))]
    DuplicateNodeIp {
        /// All nodes claiming the address.
        names: Vec<String>,
        /// The contested address.
        ip: String,
    },

    /// The key store collaborator failed.
    #[error("key store: {0}")]
    KeyStore(String),
}

/// A non-fatal finding reported alongside a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// What kind of situation was noticed.
    pub kind: DiagnosticKind,
    /// The node whose peer table the finding concerns.
    pub node: String,
    /// Human-readable detail.
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.kind, self.node, self.message)
    }
}

/// Classification of diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A default route combined with other routes on one peer.
    DefaultRouteMix,
    /// A route wider than /16.
    WideRoute,
    /// An active non-group entry carrying only the injected host route.
    HostRouteOnly,
    /// Two intents for the same (from, to) pair were merged.
    DuplicateIntent,
    /// Intra-group and inter-group policy merged on one pair.
    MergedPolicies,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::DefaultRouteMix => "default-route-mix",
            Self::WideRoute => "wide-route",
            Self::HostRouteOnly => "host-route-only",
            Self::DuplicateIntent => "duplicate-intent",
            Self::MergedPolicies => "merged-policies",
        };
        f.write_str(s)
    }
}

/// The aggregated failure of a build: every error found, never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFailure {
    /// All errors, in pipeline order.
    pub errors: Vec<EngineError>,
}

impl BuildFailure {
    /// Wraps a non-empty error list.
    #[must_use]
    pub fn new(errors: Vec<EngineError>) -> Self {
        debug_assert!(!errors.is_empty());
        Self { errors }
    }
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "build failed with {} error(s):", self.errors.len())?;
        for err in &self.errors {
            writeln!(f, "  - {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BuildFailure {}

impl From<EngineError> for BuildFailure {
    fn from(err: EngineError) -> Self {
        Self { errors: vec![err] }
    }
}
