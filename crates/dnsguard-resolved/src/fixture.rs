// Test fixtures: fake sysfs trees and fake resolvectl scripts

use std::fs;
use std::path::Path;

/// Create `<root>/<name>/{ifindex,operstate}`
pub fn add_link(root: &Path, name: &str, index: u32, operstate: &str) {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("ifindex"), format!("{}\n", index)).unwrap();
    fs::write(dir.join("operstate"), format!("{}\n", operstate)).unwrap();
}

/// Held while writing and running scripts
///
/// Writing a script while another test forks can make exec fail with ETXTBSY.
#[cfg(unix)]
pub static SCRIPT_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

/// Write an executable `resolvectl` shell script into `dir`
#[cfg(unix)]
pub fn write_resolvectl(dir: &Path, body: &str) -> String {
    use std::os::unix::fs::PermissionsExt;

    let script = dir.join("resolvectl");
    fs::write(&script, format!("#!/bin/sh\n{}", body)).unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
    script.display().to_string()
}
