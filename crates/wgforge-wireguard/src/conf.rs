//! WireGuard configuration file generation and parsing.
//!
//! This module handles the INI-style `[Interface]`/`[Peer]` format consumed
//! by `wg-quick`. Rendering is deterministic: the same record always produces
//! byte-identical text.

use std::fmt::Write as FmtWrite;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WireGuardError};
use crate::keys::{PresharedKey, PrivateKey, PublicKey};
use crate::types::{AllowedIp, Endpoint};

/// The `[Interface]` block of a node's config.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// The interface's private key.
    pub private_key: PrivateKey,
    /// The overlay address (with prefix) assigned to this interface.
    pub address: AllowedIp,
    /// Optional listen port.
    pub listen_port: Option<u16>,
    /// Optional DNS servers, passed through verbatim.
    pub dns: Option<String>,
    /// Optional MTU, passed through verbatim.
    pub mtu: Option<u16>,
    /// Commands run after the interface comes up.
    pub post_up: Vec<String>,
    /// Commands run after the interface goes down.
    pub post_down: Vec<String>,
}

impl InterfaceConfig {
    /// Creates a minimal interface config.
    #[must_use]
    pub fn new(private_key: PrivateKey, address: AllowedIp) -> Self {
        Self {
            private_key,
            address,
            listen_port: None,
            dns: None,
            mtu: None,
            post_up: Vec::new(),
            post_down: Vec::new(),
        }
    }
}

/// One `[Peer]` block.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PeerConfig {
    /// The peer's public key.
    pub public_key: PublicKey,
    /// Optional preshared key.
    pub preshared_key: Option<PresharedKey>,
    /// Allowed IPs for this peer; never empty in emitted configs.
    pub allowed_ips: Vec<AllowedIp>,
    /// Optional endpoint; absent for passive peers.
    pub endpoint: Option<Endpoint>,
    /// Optional persistent keepalive interval in seconds.
    pub persistent_keepalive: Option<u16>,
    /// Provenance comment, rendered above the block.
    pub comment: Option<String>,
}

impl PeerConfig {
    /// Creates a peer block with the given public key.
    #[must_use]
    pub fn new(public_key: PublicKey) -> Self {
        Self {
            public_key,
            preshared_key: None,
            allowed_ips: Vec::new(),
            endpoint: None,
            persistent_keepalive: None,
            comment: None,
        }
    }
}

/// Renders a WireGuard configuration file.
#[must_use]
pub fn render(interface: &InterfaceConfig, peers: &[PeerConfig]) -> String {
    let mut output = String::new();

    output.push_str("[Interface]\n");
    let _ = writeln!(output, "PrivateKey = {}", interface.private_key.to_base64());
    let _ = writeln!(output, "Address = {}", interface.address);

    if let Some(port) = interface.listen_port {
        let _ = writeln!(output, "ListenPort = {port}");
    }
    if let Some(ref dns) = interface.dns {
        let _ = writeln!(output, "DNS = {dns}");
    }
    if let Some(mtu) = interface.mtu {
        let _ = writeln!(output, "MTU = {mtu}");
    }
    for cmd in &interface.post_up {
        let _ = writeln!(output, "PostUp = {cmd}");
    }
    for cmd in &interface.post_down {
        let _ = writeln!(output, "PostDown = {cmd}");
    }

    for peer in peers {
        output.push('\n');
        if let Some(ref comment) = peer.comment {
            let _ = writeln!(output, "# {comment}");
        }
        output.push_str("[Peer]\n");
        let _ = writeln!(output, "PublicKey = {}", peer.public_key.to_base64());

        if let Some(ref psk) = peer.preshared_key {
            let _ = writeln!(output, "PresharedKey = {}", psk.to_base64());
        }

        if !peer.allowed_ips.is_empty() {
            let ips: Vec<String> = peer.allowed_ips.iter().map(AllowedIp::to_cidr).collect();
            let _ = writeln!(output, "AllowedIPs = {}", ips.join(", "));
        }

        if let Some(ref endpoint) = peer.endpoint {
            let _ = writeln!(output, "Endpoint = {endpoint}");
        }

        if let Some(keepalive) = peer.persistent_keepalive {
            let _ = writeln!(output, "PersistentKeepalive = {keepalive}");
        }
    }

    output
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    None,
    Interface,
    Peer,
}

/// Parses a WireGuard configuration file back into its blocks.
///
/// Used by round-trip tests and the `check` tooling; comments are ignored.
///
/// # Errors
///
/// Returns a `ParseError` naming the offending line.
pub fn parse(config_str: &str) -> Result<(InterfaceConfig, Vec<PeerConfig>)> {
    let mut section = Section::None;
    let mut private_key: Option<PrivateKey> = None;
    let mut address: Option<AllowedIp> = None;
    let mut listen_port: Option<u16> = None;
    let mut dns: Option<String> = None;
    let mut mtu: Option<u16> = None;
    let mut post_up: Vec<String> = Vec::new();
    let mut post_down: Vec<String> = Vec::new();
    let mut peers: Vec<PeerConfig> = Vec::new();
    let mut current_peer: Option<ParsedPeer> = None;

    for (line_num, raw) in config_str.lines().enumerate() {
        let line = raw.trim();
        let line_number = line_num + 1;

        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            if let Some(peer) = current_peer.take() {
                peers.push(peer.build(line_number)?);
            }

            let section_name = &line[1..line.len() - 1];
            section = match section_name {
                "Interface" => Section::Interface,
                "Peer" => {
                    current_peer = Some(ParsedPeer::default());
                    Section::Peer
                }
                _ => {
                    return Err(WireGuardError::ParseError {
                        line: line_number,
                        message: format!("unknown section: {section_name}"),
                    });
                }
            };
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            return Err(WireGuardError::ParseError {
                line: line_number,
                message: format!("invalid line format: {line}"),
            });
        };

        let key = key.trim();
        let value = value.trim();

        match section {
            Section::None => {
                return Err(WireGuardError::ParseError {
                    line: line_number,
                    message: "key-value pair outside of section".to_string(),
                });
            }
            Section::Interface => match key {
                "PrivateKey" => {
                    private_key = Some(PrivateKey::from_base64(value).map_err(|_| {
                        WireGuardError::ParseError {
                            line: line_number,
                            message: "invalid PrivateKey".to_string(),
                        }
                    })?);
                }
                "Address" => {
                    address = Some(AllowedIp::from_cidr(value).map_err(|_| {
                        WireGuardError::ParseError {
                            line: line_number,
                            message: format!("invalid Address: {value}"),
                        }
                    })?);
                }
                "ListenPort" => {
                    listen_port = Some(value.parse().map_err(|_| WireGuardError::ParseError {
                        line: line_number,
                        message: "invalid ListenPort".to_string(),
                    })?);
                }
                "DNS" => dns = Some(value.to_string()),
                "MTU" => {
                    mtu = Some(value.parse().map_err(|_| WireGuardError::ParseError {
                        line: line_number,
                        message: "invalid MTU".to_string(),
                    })?);
                }
                "PostUp" => post_up.push(value.to_string()),
                "PostDown" => post_down.push(value.to_string()),
                _ => {}
            },
            Section::Peer => {
                if let Some(ref mut peer) = current_peer {
                    peer.parse_key(key, value, line_number)?;
                }
            }
        }
    }

    if let Some(peer) = current_peer {
        let last_line = config_str.lines().count();
        peers.push(peer.build(last_line)?);
    }

    let private_key = private_key.ok_or_else(|| WireGuardError::ParseError {
        line: 0,
        message: "missing PrivateKey in [Interface] section".to_string(),
    })?;
    let address = address.ok_or_else(|| WireGuardError::ParseError {
        line: 0,
        message: "missing Address in [Interface] section".to_string(),
    })?;

    Ok((
        InterfaceConfig {
            private_key,
            address,
            listen_port,
            dns,
            mtu,
            post_up,
            post_down,
        },
        peers,
    ))
}

#[derive(Default)]
struct ParsedPeer {
    public_key: Option<PublicKey>,
    preshared_key: Option<PresharedKey>,
    allowed_ips: Vec<AllowedIp>,
    endpoint: Option<Endpoint>,
    persistent_keepalive: Option<u16>,
}

impl ParsedPeer {
    fn parse_key(&mut self, key: &str, value: &str, line_number: usize) -> Result<()> {
        match key {
            "PublicKey" => {
                self.public_key =
                    Some(PublicKey::from_base64(value).map_err(|_| WireGuardError::ParseError {
                        line: line_number,
                        message: "invalid PublicKey".to_string(),
                    })?);
            }
            "PresharedKey" => {
                self.preshared_key = Some(PresharedKey::from_base64(value).map_err(|_| {
                    WireGuardError::ParseError {
                        line: line_number,
                        message: "invalid PresharedKey".to_string(),
                    }
                })?);
            }
            "AllowedIPs" => {
                for ip in value.split(',') {
                    self.allowed_ips.push(AllowedIp::from_cidr(ip.trim()).map_err(|_| {
                        WireGuardError::ParseError {
                            line: line_number,
                            message: format!("invalid AllowedIPs: {ip}"),
                        }
                    })?);
                }
            }
            "Endpoint" => {
                self.endpoint = Some(value.parse().map_err(|_| WireGuardError::ParseError {
                    line: line_number,
                    message: format!("invalid Endpoint: {value}"),
                })?);
            }
            "PersistentKeepalive" => {
                self.persistent_keepalive =
                    Some(value.parse().map_err(|_| WireGuardError::ParseError {
                        line: line_number,
                        message: "invalid PersistentKeepalive".to_string(),
                    })?);
            }
            _ => {}
        }
        Ok(())
    }

    fn build(self, line_number: usize) -> Result<PeerConfig> {
        let public_key = self.public_key.ok_or_else(|| WireGuardError::ParseError {
            line: line_number,
            message: "missing PublicKey in [Peer] section".to_string(),
        })?;

        Ok(PeerConfig {
            public_key,
            preshared_key: self.preshared_key,
            allowed_ips: self.allowed_ips,
            endpoint: self.endpoint,
            persistent_keepalive: self.persistent_keepalive,
            comment: None,
        })
    }
}
