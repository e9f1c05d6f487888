//! Command implementations.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::{info, warn};
use wgforge_engine::{build, check, Document};
use wgforge_keystore::FileKeyStore;

use crate::cli::Format;
use crate::error::CliError;

/// Loads a document from YAML or JSON (the YAML parser accepts both).
pub fn load_document(path: &Path) -> Result<Document, CliError> {
    let text = fs::read_to_string(path)
        .map_err(|e| CliError::Document(format!("{}: {e}", path.display())))?;
    serde_yaml::from_str(&text)
        .map_err(|e| CliError::Document(format!("{}: {e}", path.display())))
}

/// `wgforge build`: generate one `.conf` per node.
pub fn run_build<W: Write>(
    out: &mut W,
    document_path: &Path,
    output_dir: &Path,
    db: &Path,
) -> Result<(), CliError> {
    let document = load_document(document_path)?;
    let store = FileKeyStore::new(db);

    let output = build(&document, &store)?;
    for diagnostic in &output.diagnostics {
        warn!(%diagnostic, "diagnostic");
    }

    fs::create_dir_all(output_dir)?;
    for (name, record) in &output.records {
        let path = output_dir.join(format!("{name}.conf"));
        fs::write(&path, record.render())?;
        info!(node = %name, path = %path.display(), "wrote config");
    }

    writeln!(
        out,
        "wrote {} config(s) to {}",
        output.records.len(),
        output_dir.display()
    )?;
    Ok(())
}

/// One row of `wgforge check` output.
#[derive(Debug, Serialize)]
struct PeerSummary {
    node: String,
    peer: String,
    endpoint: Option<String>,
    allowed_ips: Vec<String>,
    passive: bool,
}

/// `wgforge check`: validate and summarise without touching the key store.
pub fn run_check<W: Write>(
    out: &mut W,
    document_path: &Path,
    format: Format,
) -> Result<(), CliError> {
    let document = load_document(document_path)?;
    let output = check(&document)?;

    let mut rows = Vec::new();
    for (node, drafts) in &output.peer_map.entries {
        for draft in drafts {
            rows.push(PeerSummary {
                node: node.clone(),
                peer: draft.peer.clone(),
                endpoint: draft.endpoint.as_ref().map(ToString::to_string),
                allowed_ips: draft.allowed_ips.iter().map(|c| c.to_cidr()).collect(),
                passive: draft.passive,
            });
        }
    }

    match format {
        Format::Json => {
            serde_json::to_writer_pretty(&mut *out, &rows)
                .map_err(|e| CliError::Format(e.to_string()))?;
            writeln!(out)?;
        }
        Format::Table => {
            writeln!(out, "{:<12} {:<12} {:<24} ALLOWED", "NODE", "PEER", "ENDPOINT")?;
            for row in &rows {
                writeln!(
                    out,
                    "{:<12} {:<12} {:<24} {}{}",
                    row.node,
                    row.peer,
                    row.endpoint.as_deref().unwrap_or("-"),
                    row.allowed_ips.join(", "),
                    if row.passive { "  (passive)" } else { "" }
                )?;
            }
        }
    }

    for diagnostic in &output.diagnostics {
        writeln!(out, "note: {diagnostic}")?;
    }
    Ok(())
}

/// `wgforge keys list`.
pub fn run_keys_list<W: Write>(out: &mut W, db: &Path, format: Format) -> Result<(), CliError> {
    let store = FileKeyStore::new(db);
    let keys = store.list()?;

    match format {
        Format::Json => {
            serde_json::to_writer_pretty(&mut *out, &keys)
                .map_err(|e| CliError::Format(e.to_string()))?;
            writeln!(out)?;
        }
        Format::Table => {
            writeln!(out, "{:<16} {:<46} CREATED", "NODE", "PUBLIC KEY")?;
            for key in &keys {
                writeln!(
                    out,
                    "{:<16} {:<46} {}",
                    key.node_name, key.public_key, key.created_at
                )?;
            }
        }
    }
    Ok(())
}

/// `wgforge keys remove`.
pub fn run_keys_remove<W: Write>(out: &mut W, db: &Path, node: &str) -> Result<(), CliError> {
    let store = FileKeyStore::new(db);
    if store.remove(node)? {
        writeln!(out, "removed keys for '{node}'")?;
    } else {
        writeln!(out, "no keys stored for '{node}'")?;
    }
    Ok(())
}
