//! Listener block builder: renders one `listen` section of proxy config.
//!
//! Output depends only on the builder's inputs, in order, so rebuilding a
//! block from an unchanged server list yields byte-identical text.

use std::fmt;

use fleet_core::config::HealthCheckConfig;
use fleet_core::Endpoint;

use crate::fragments::ConfigFragment;

/// Health-check options appended to every `server` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerOptions {
    /// Concurrent connections allowed per server.
    pub max_conn: u32,
    /// Health-check interval.
    pub check_inter_ms: u64,
    /// Health-check interval right after a state change.
    pub fast_inter_ms: u64,
    /// Failed checks before the server is marked down.
    pub fall: u32,
}

impl Default for ServerOptions {
    fn default() -> Self {
        HealthCheckConfig::default().into()
    }
}

impl From<HealthCheckConfig> for ServerOptions {
    fn from(c: HealthCheckConfig) -> Self {
        Self {
            max_conn: c.max_conn,
            check_inter_ms: c.inter_ms,
            fast_inter_ms: c.fast_inter_ms,
            fall: c.fall,
        }
    }
}

impl fmt::Display for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "maxconn {} check inter {} fastinter {} fall {}",
            self.max_conn, self.check_inter_ms, self.fast_inter_ms, self.fall
        )
    }
}

/// A `listen` section: a bind address plus an ordered server pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenBlock {
    owner: String,
    bind: Endpoint,
    servers: Vec<Endpoint>,
    options: ServerOptions,
}

impl ListenBlock {
    pub fn new(owner: impl Into<String>, address: impl Into<String>, port: u16) -> Self {
        Self {
            owner: owner.into(),
            bind: Endpoint::new(address, port),
            servers: Vec::new(),
            options: ServerOptions::default(),
        }
    }

    /// Append one backend server.
    pub fn server(mut self, host: impl Into<String>, port: u16) -> Self {
        self.servers.push(Endpoint::new(host, port));
        self
    }

    /// Append backend servers in order.
    pub fn servers(mut self, servers: impl IntoIterator<Item = Endpoint>) -> Self {
        self.servers.extend(servers);
        self
    }

    pub fn with_options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Label of the `index`-th server, e.g. `gae_shop-2`.
    pub fn server_label(&self, index: usize) -> String {
        format!("{}-{index}", self.owner)
    }

    pub fn render(&self) -> String {
        let mut out = format!(
            "# Load balancer for {owner}\nlisten {owner} {bind}\n",
            owner = self.owner,
            bind = self.bind
        );
        for (index, server) in self.servers.iter().enumerate() {
            out.push_str(&format!(
                "  server {} {} {}\n",
                self.server_label(index),
                server,
                self.options
            ));
        }
        out
    }

    pub fn into_fragment(self) -> ConfigFragment {
        let text = self.render();
        ConfigFragment::new(self.owner, text)
    }
}
