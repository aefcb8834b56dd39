// # Sysfs Link Reader
//
// Reads interface identity and operational state from the network class
// directory in sysfs (`/sys/class/net` on a live system).
//
// Layout consumed:
//
// ```text
// <root>/<name>/ifindex     decimal interface index
// <root>/<name>/operstate   "up", "down", "dormant", ...
// ```

use std::io;
use std::path::{Path, PathBuf};

use dnsguard_core::{Error, Result};

const LOOPBACK: &str = "lo";

/// One network link as described by sysfs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysfsLink {
    pub name: String,
    pub index: u32,
    pub up: bool,
}

/// Reader rooted at a sysfs network class directory
#[derive(Debug, Clone)]
pub struct SysfsReader {
    root: PathBuf,
}

impl SysfsReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Every non-loopback link, ordered by interface index
    pub async fn links(&self) -> Result<Vec<SysfsLink>> {
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            Error::enumeration(format!("cannot list {}: {}", self.root.display(), e))
        })?;

        let mut links = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == LOOPBACK {
                continue;
            }

            // Links can vanish between listing and reading
            if let Some(link) = self.link(&name).await? {
                links.push(link);
            }
        }

        links.sort_by_key(|link| link.index);
        Ok(links)
    }

    /// Read one link by name
    ///
    /// Returns `Ok(None)` if the link does not exist.
    pub async fn link(&self, name: &str) -> Result<Option<SysfsLink>> {
        let dir = self.root.join(name);

        let Some(ifindex) = read_attribute(&dir.join("ifindex")).await? else {
            return Ok(None);
        };
        let index = ifindex.parse::<u32>().map_err(|e| {
            Error::backend("resolved", format!("bad ifindex '{}' for {}: {}", ifindex, name, e))
        })?;

        let operstate = read_attribute(&dir.join("operstate")).await?.unwrap_or_default();

        Ok(Some(SysfsLink {
            name: name.to_string(),
            index,
            up: operstate == "up",
        }))
    }

    /// Find a link by interface index
    pub async fn link_by_index(&self, index: u32) -> Result<Option<SysfsLink>> {
        Ok(self
            .links()
            .await?
            .into_iter()
            .find(|link| link.index == index))
    }
}

async fn read_attribute(path: &Path) -> Result<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(value) => Ok(Some(value.trim().to_string())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
