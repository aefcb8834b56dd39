// # resolvectl Runner
//
// Thin wrapper over the `resolvectl` command of systemd-resolved.
//
// - `resolvectl dns <link>` prints `Link <index> (<name>): <server> ...`
// - `resolvectl dns <link> <server>...` replaces the link's servers
// - `resolvectl revert <link>` drops per-link settings (back to automatic)

use std::process::Output;

use tokio::process::Command;
use tracing::debug;

use dnsguard_core::{Error, Result};

const BACKEND: &str = "resolved";

#[derive(Debug, Clone)]
pub struct Resolvectl {
    program: String,
}

impl Resolvectl {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Current DNS servers of a link
    pub async fn dns(&self, link: &str) -> Result<Vec<String>> {
        let output = self.run(&["dns", link]).await?;
        Ok(parse_dns_output(&String::from_utf8_lossy(&output.stdout)))
    }

    /// Replace a link's DNS servers
    pub async fn set_dns(&self, link: &str, servers: &[String]) -> Result<()> {
        let mut args = vec!["dns", link];
        args.extend(servers.iter().map(String::as_str));
        self.run(&args).await.map(|_| ())
    }

    /// Return a link to its automatic configuration
    pub async fn revert(&self, link: &str) -> Result<()> {
        self.run(&["revert", link]).await.map(|_| ())
    }

    async fn run(&self, args: &[&str]) -> Result<Output> {
        debug!("Running {} {}", self.program, args.join(" "));

        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|e| Error::backend(BACKEND, format!("cannot run {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::backend(
                BACKEND,
                format!(
                    "{} {} failed ({}): {}",
                    self.program,
                    args.join(" "),
                    output.status,
                    stderr.trim()
                ),
            ));
        }

        Ok(output)
    }
}

/// Extract the server list from `resolvectl dns <link>` output
///
/// Only the first line carrying a `:` separator is read. A link with no
/// servers prints `Link 2 (eth0):` and yields an empty list.
pub fn parse_dns_output(output: &str) -> Vec<String> {
    let Some(line) = output.lines().find(|line| line.contains(':')) else {
        return Vec::new();
    };

    // IPv6 servers contain ':' too, so split after the "(name):" label
    let servers = match line.find("):") {
        Some(pos) => &line[pos + 2..],
        None => line.split_once(": ").map(|(_, rest)| rest).unwrap_or_default(),
    };

    servers.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_link_servers() {
        let output = "Link 2 (eth0): 192.168.1.1 2001:db8::1\n";
        assert_eq!(parse_dns_output(output), vec!["192.168.1.1", "2001:db8::1"]);
    }

    #[test]
    fn test_parse_link_without_servers() {
        assert!(parse_dns_output("Link 3 (wlan0):\n").is_empty());
        assert!(parse_dns_output("").is_empty());
    }

    #[test]
    fn test_parse_global_style_line() {
        assert_eq!(parse_dns_output("Global: 9.9.9.9\n"), vec!["9.9.9.9"]);
    }

    #[tokio::test]
    async fn test_missing_program_is_backend_error() {
        let ctl = Resolvectl::new("/nonexistent/resolvectl");

        let result = ctl.dns("eth0").await;
        assert!(matches!(result, Err(Error::Backend { .. })));
    }
}
