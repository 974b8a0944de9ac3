//! Base template and on-disk layout for the proxy's configuration.

use std::fs;
use std::path::Path;

use tracing::info;

use fleet_core::{FleetError, FleetResult};

use crate::fragments::write_atomic;

/// Global and defaults sections every merged config starts with.
///
/// The stats socket line is what the stats feed connects to.
pub fn base_template(stats_socket: &Path) -> String {
    format!(
        "\
global
  maxconn 64000
  ulimit-n 200000
  log 127.0.0.1 local0
  log 127.0.0.1 local1 notice
  spread-checks 5
  stats socket {socket}

defaults
  log global
  mode http
  balance roundrobin
  maxconn 64000
  option abortonclose
  option httpclose
  option redispatch
  retries 3
  timeout client 30000
  timeout connect 30000
  timeout server 30000
  timeout check 5000
  stats enable
  stats uri /haproxy?stats
  stats realm Haproxy\\ Statistics
  stats auth haproxy:stats
",
        socket = stats_socket.display()
    )
}

/// Create the fragment directory and write the base template.
///
/// An existing base file is kept unless `overwrite` is set. Returns
/// whether the base file was written.
pub fn initialize_layout(
    sites_dir: &Path,
    base_path: &Path,
    stats_socket: &Path,
    overwrite: bool,
) -> FleetResult<bool> {
    fs::create_dir_all(sites_dir).map_err(|e| FleetError::write(sites_dir, e))?;
    if let Some(parent) = base_path.parent() {
        fs::create_dir_all(parent).map_err(|e| FleetError::write(parent, e))?;
    }

    if base_path.exists() && !overwrite {
        return Ok(false);
    }
    write_atomic(base_path, base_template(stats_socket).as_bytes())?;
    info!(path = %base_path.display(), "base config written");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_binds_stats_socket() {
        let text = base_template(Path::new("/run/haproxy/stats"));
        assert!(text.starts_with("global\n"));
        assert!(text.contains("  stats socket /run/haproxy/stats\n"));
        assert!(text.contains("\ndefaults\n"));
        assert!(text.contains("stats realm Haproxy\\ Statistics"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn initialize_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let sites = dir.path().join("haproxy/sites-enabled");
        let base = dir.path().join("haproxy/base.cfg");

        let written = initialize_layout(&sites, &base, Path::new("/tmp/stats"), true).unwrap();
        assert!(written);
        assert!(sites.is_dir());
        assert!(fs::read_to_string(&base).unwrap().contains("stats socket /tmp/stats"));
    }

    #[test]
    fn initialize_keeps_existing_base_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let sites = dir.path().join("sites-enabled");
        let base = dir.path().join("base.cfg");
        fs::write(&base, "global\n  maxconn 10\n").unwrap();

        let written = initialize_layout(&sites, &base, Path::new("/tmp/stats"), false).unwrap();
        assert!(!written);
        assert_eq!(fs::read_to_string(&base).unwrap(), "global\n  maxconn 10\n");

        assert!(initialize_layout(&sites, &base, Path::new("/tmp/stats"), true).unwrap());
        assert!(fs::read_to_string(&base).unwrap().contains("maxconn 64000"));
    }
}
