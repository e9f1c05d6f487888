//! Emission.
//!
//! Assembles the final per-node configuration records: interface block, key
//! material, ordered peer blocks with provenance comments, and the forwarding
//! side effects for relay nodes.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;
use wgforge_wireguard::conf::{self, InterfaceConfig, PeerConfig};

use crate::bind::BoundKeys;
use crate::error::EngineError;
use crate::model::{Network, Origin};
use crate::peermap::PeerMap;

/// Keepalive applied to bridge peers that do not set their own.
pub const BRIDGE_KEEPALIVE: u16 = 25;

/// One emitted peer block plus its provenance.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    /// The target node's name.
    pub name: String,
    /// Where the edge came from.
    pub origin: Origin,
    /// Whether this is a synthesised answer-only entry.
    pub passive: bool,
    /// The rendered block.
    pub entry: PeerConfig,
}

/// The engine's output for one node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// The node's name.
    pub name: String,
    /// The `[Interface]` block.
    pub interface: InterfaceConfig,
    /// Ordered peer blocks.
    pub peers: Vec<PeerRecord>,
}

impl NodeConfig {
    /// Renders this record as WireGuard `.conf` text.
    #[must_use]
    pub fn render(&self) -> String {
        let peers: Vec<PeerConfig> = self.peers.iter().map(|p| p.entry.clone()).collect();
        conf::render(&self.interface, &peers)
    }
}

/// Assembles the per-node records from the resolved peer map and bound keys.
///
/// # Errors
///
/// Returns `KeyStore` errors when bound material is missing for a node
/// (which indicates a store that violated its contract).
pub fn emit(
    network: &Network,
    peer_map: &PeerMap,
    keys: &BoundKeys,
) -> Result<BTreeMap<String, NodeConfig>, Vec<EngineError>> {
    let mut errors = Vec::new();
    let mut records = BTreeMap::new();

    for node in network.nodes() {
        let Some(keypair) = keys.keys.get(&node.name) else {
            errors.push(EngineError::KeyStore(format!(
                "no keypair bound for node '{}'",
                node.name
            )));
            continue;
        };

        let drafts = peer_map
            .entries
            .get(&node.name)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut interface = InterfaceConfig::new(
            keypair.private_key().clone(),
            node.wireguard_ip.clone(),
        );
        interface.listen_port = node.listen_port;
        interface.dns = node.dns.clone();
        interface.mtu = node.mtu;

        // User-supplied hooks win; generated forwarding defaults are skipped.
        if !node.post_up.is_empty() {
            interface.post_up = node.post_up.clone();
        } else if node.forwards() {
            interface.post_up = forwarding_up(node, drafts);
        }
        if !node.post_down.is_empty() {
            interface.post_down = node.post_down.clone();
        } else if node.forwards() {
            interface.post_down = forwarding_down(node, drafts);
        }

        let mut peers = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let Some(peer_keys) = keys.keys.get(&draft.peer) else {
                errors.push(EngineError::KeyStore(format!(
                    "no keypair bound for peer '{}'",
                    draft.peer
                )));
                continue;
            };

            let mut entry = PeerConfig::new(*peer_keys.public_key());
            entry.preshared_key = keys.psk(&node.name, &draft.peer).cloned();
            entry.allowed_ips = draft.allowed_ips.clone();
            entry.endpoint = draft.endpoint.clone();
            entry.persistent_keepalive = draft.persistent_keepalive;
            if draft.is_bridge && entry.persistent_keepalive.is_none() {
                entry.persistent_keepalive = Some(BRIDGE_KEEPALIVE);
            }
            entry.comment = Some(if draft.passive {
                format!("{} ({}, passive)", draft.peer, draft.origin)
            } else {
                format!("{} ({})", draft.peer, draft.origin)
            });

            peers.push(PeerRecord {
                name: draft.peer.clone(),
                origin: draft.origin,
                passive: draft.passive,
                entry,
            });
        }

        records.insert(
            node.name.clone(),
            NodeConfig {
                name: node.name.clone(),
                interface,
                peers,
            },
        );
    }

    if errors.is_empty() {
        debug!(records = records.len(), "emission complete");
        Ok(records)
    } else {
        Err(errors)
    }
}

fn forwarded_subnets(drafts: &[crate::peermap::PeerDraft]) -> BTreeSet<String> {
    drafts
        .iter()
        .flat_map(|d| d.allowed_ips.iter())
        .filter(|c| !c.is_host_route() && !c.is_default_route())
        .map(wgforge_wireguard::AllowedIp::to_cidr)
        .collect()
}

fn forwarding_up(node: &crate::model::Node, drafts: &[crate::peermap::PeerDraft]) -> Vec<String> {
    let mut commands = vec!["sysctl -w net.ipv4.ip_forward=1".to_string()];
    if !node.overlay_addr().is_ipv4() {
        commands.push("sysctl -w net.ipv6.conf.all.forwarding=1".to_string());
    }
    for subnet in forwarded_subnets(drafts) {
        commands.push(format!("ip route add {subnet} dev %i"));
    }
    commands
}

fn forwarding_down(node: &crate::model::Node, drafts: &[crate::peermap::PeerDraft]) -> Vec<String> {
    let mut commands = vec!["sysctl -w net.ipv4.ip_forward=0".to_string()];
    if !node.overlay_addr().is_ipv4() {
        commands.push("sysctl -w net.ipv6.conf.all.forwarding=0".to_string());
    }
    for subnet in forwarded_subnets(drafts) {
        commands.push(format!("ip route del {subnet} dev %i || true"));
    }
    commands
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::{self, test_store::MemoryKeyStore};
    use crate::document::Document;
    use crate::{expand, peermap, routes};

    fn records(yaml: &str) -> BTreeMap<String, NodeConfig> {
        let doc: Document = serde_yaml::from_str(yaml).expect("valid yaml");
        let compiled = doc.compile().expect("compiles");
        let expansion = expand::expand(&compiled).expect("expands");
        let (mut map, _) = peermap::build(&compiled.network, &expansion).expect("builds");
        routes::resolve(&compiled.network, &mut map, &expansion.rules).expect("resolves");
        let store = MemoryKeyStore::default();
        let keys = bind::bind(&compiled.network, &map, &store).expect("binds");
        emit(&compiled.network, &map, &keys).expect("emits")
    }

    const RELAY: &str = r"
nodes:
  - name: client
    wireguard_ip: 10.96.0.2/16
  - name: hub
    wireguard_ip: 10.96.0.1/16
    role: relay
    endpoints: {main: '5.5.5.5:51820'}
peers:
  - from: client
    to: hub
    allowed_ips: [10.97.0.0/24]
";

    #[test]
    fn relay_gets_forwarding_commands() {
        let records = records(RELAY);
        let hub = &records["hub"];
        assert!(hub
            .interface
            .post_up
            .contains(&"sysctl -w net.ipv4.ip_forward=1".to_string()));
        assert!(hub
            .interface
            .post_down
            .contains(&"sysctl -w net.ipv4.ip_forward=0".to_string()));
    }

    #[test]
    fn client_gets_no_forwarding_commands() {
        let records = records(RELAY);
        assert!(records["client"].interface.post_up.is_empty());
    }

    #[test]
    fn user_hooks_suppress_generated_defaults() {
        let yaml = r"
nodes:
  - name: hub
    wireguard_ip: 10.96.0.1/16
    role: relay
    post_up: ['echo custom-up']
  - name: client
    wireguard_ip: 10.96.0.2/16
peers:
  - from: client
    to: hub
";
        let records = records(yaml);
        let hub = &records["hub"];
        assert_eq!(hub.interface.post_up, vec!["echo custom-up".to_string()]);
        // post_down was not user-specified, so the default still applies.
        assert!(hub
            .interface
            .post_down
            .contains(&"sysctl -w net.ipv4.ip_forward=0".to_string()));
    }

    #[test]
    fn enable_ip_forward_flag_forces_forwarding() {
        let yaml = r"
nodes:
  site:
    - name: fw
      wireguard_ip: 10.96.0.1/16
      enable_ip_forward: true
    - name: c
      wireguard_ip: 10.96.0.2/16
groups:
  - name: site
    topology: mesh
";
        let records = records(yaml);
        assert!(!records["fw"].interface.post_up.is_empty());
        assert!(records["c"].interface.post_up.is_empty());
    }

    #[test]
    fn psk_matches_on_both_sides() {
        let records = records(RELAY);
        let client_entry = &records["client"].peers[0].entry;
        let hub_entry = &records["hub"].peers[0].entry;
        assert!(client_entry.preshared_key.is_some());
        assert_eq!(client_entry.preshared_key, hub_entry.preshared_key);
    }

    #[test]
    fn comment_carries_origin_and_passivity() {
        let records = records(RELAY);
        let hub_peer = &records["hub"].peers[0];
        assert!(hub_peer.passive);
        assert_eq!(
            hub_peer.entry.comment.as_deref(),
            Some("client (explicit-topology, passive)")
        );
    }

    #[test]
    fn rendered_config_is_complete() {
        let records = records(RELAY);
        let text = records["client"].render();
        assert!(text.contains("[Interface]"));
        assert!(text.contains("Address = 10.96.0.2/16"));
        assert!(text.contains("[Peer]"));
        assert!(text.contains("Endpoint = 5.5.5.5:51820"));
        assert!(text.contains("AllowedIPs = "));
    }
}
