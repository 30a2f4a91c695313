//! Endpoint Registry Reader
//!
//! Each running IDE window drops a small JSON descriptor (`{"port": 23990, "pid": ...}`)
//! into a shared temp directory. The scan here is a best-effort snapshot: peers
//! may create or delete descriptors while it runs, and any file that cannot be
//! read or parsed is skipped. Stale entries are weeded out later by the
//! dispatcher's per-candidate attempts.

use crate::config::Config;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Accepted descriptor shapes.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PortDescriptor {
    Object { port: u16 },
    Bare(u16),
}

impl PortDescriptor {
    fn port(&self) -> u16 {
        match self {
            PortDescriptor::Object { port } | PortDescriptor::Bare(port) => *port,
        }
    }
}

/// Reads peer port descriptors from the filesystem.
#[derive(Debug, Clone)]
pub struct EndpointRegistry {
    dir: PathBuf,
    suffix: String,
    default_port: u16,
}

impl EndpointRegistry {
    pub fn new(dir: impl Into<PathBuf>, suffix: impl Into<String>, default_port: u16) -> Self {
        Self {
            dir: dir.into(),
            suffix: suffix.into(),
            default_port,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.port_dir.clone(),
            config.port_file_suffix.clone(),
            config.default_extension_port,
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Candidate ports in discovery order, without duplicates.
    ///
    /// Descriptors are visited in filename order. When the directory is absent
    /// or yields nothing usable, the default port is the only candidate.
    pub fn discover(&self) -> Vec<u16> {
        let mut ports = Vec::new();

        for path in self.descriptor_paths() {
            match read_descriptor(&path) {
                Some(port) if !ports.contains(&port) => ports.push(port),
                Some(_) => {}
                None => log::debug!("Skipping unreadable port descriptor: {:?}", path),
            }
        }

        if ports.is_empty() {
            ports.push(self.default_port);
        }
        ports
    }

    fn descriptor_paths(&self) -> Vec<PathBuf> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map_or(false, |name| name.ends_with(&self.suffix))
            })
            .collect();
        paths.sort();
        paths
    }
}

/// Parse one descriptor; `None` for anything unusable (including port 0).
fn read_descriptor(path: &Path) -> Option<u16> {
    let content = fs::read_to_string(path).ok()?;
    let descriptor: PortDescriptor = serde_json::from_str(content.trim()).ok()?;
    match descriptor.port() {
        0 => None,
        port => Some(port),
    }
}
