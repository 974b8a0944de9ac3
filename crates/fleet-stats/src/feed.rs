//! Stats feed: queries the proxy's unix control socket.
//!
//! A feed never fails: an unreachable socket yields no lines, which the
//! autoscaler treats as "no data this cycle".

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;
use tracing::{debug, warn};

use fleet_core::{FleetError, FleetResult};

/// Query sent to the stats socket: process info followed by the CSV table.
pub const STATS_QUERY: &str = "show info;show stat\n";

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Source of raw statistics lines, injected for testability.
pub trait StatsFeed: Send + Sync {
    /// Return every line of the current stats dump containing `filter_key`.
    ///
    /// Transport failures produce an empty vector.
    fn fetch<'a>(&'a self, filter_key: &'a str) -> BoxFuture<'a, Vec<String>>;
}

/// Reads statistics from the proxy's `stats socket`.
#[derive(Debug, Clone)]
pub struct SocketStatsFeed {
    socket_path: PathBuf,
}

impl SocketStatsFeed {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send the query and read the whole response.
    async fn query(&self) -> FleetResult<String> {
        let unavailable = |e: std::io::Error| {
            FleetError::TransportUnavailable(format!("{}: {e}", self.socket_path.display()))
        };

        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(unavailable)?;
        stream
            .write_all(STATS_QUERY.as_bytes())
            .await
            .map_err(unavailable)?;
        // The proxy closes the connection after a non-interactive command.
        let mut response = String::new();
        stream
            .read_to_string(&mut response)
            .await
            .map_err(unavailable)?;
        Ok(response)
    }
}

impl StatsFeed for SocketStatsFeed {
    fn fetch<'a>(&'a self, filter_key: &'a str) -> BoxFuture<'a, Vec<String>> {
        Box::pin(async move {
            match self.query().await {
                Ok(response) => {
                    let lines = filter_lines(&response, filter_key);
                    debug!(filter = filter_key, lines = lines.len(), "stats fetched");
                    lines
                }
                Err(e) => {
                    warn!(filter = filter_key, error = %e, "stats feed unavailable");
                    Vec::new()
                }
            }
        })
    }
}

/// Keep the lines that mention `filter_key` anywhere.
pub fn filter_lines(response: &str, filter_key: &str) -> Vec<String> {
    response
        .lines()
        .filter(|line| line.contains(filter_key))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::UnixListener;

    const DUMP: &str = "\
Name: HAProxy
Uptime_sec: 120
# pxname,svname,qcur
gae_guestbook,FRONTEND,0
gae_guestbook,gae_guestbook-0,0
gae_guestbook,BACKEND,3
gae_shop,FRONTEND,0
";

    #[test]
    fn filter_keeps_substring_matches() {
        let lines = filter_lines(DUMP, "guestbook");
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.starts_with("gae_guestbook")));
    }

    #[test]
    fn filter_without_matches_is_empty() {
        assert!(filter_lines(DUMP, "inventory").is_empty());
    }

    #[tokio::test]
    async fn missing_socket_yields_no_lines() {
        let dir = tempfile::tempdir().unwrap();
        let feed = SocketStatsFeed::new(dir.path().join("stats"));
        assert!(feed.fetch("guestbook").await.is_empty());
    }

    #[tokio::test]
    async fn reads_dump_from_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats");
        let listener = UnixListener::bind(&path).unwrap();

        let server = tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut query = vec![0u8; STATS_QUERY.len()];
            conn.read_exact(&mut query).await.unwrap();
            assert_eq!(query, STATS_QUERY.as_bytes());
            conn.write_all(DUMP.as_bytes()).await.unwrap();
            conn.shutdown().await.unwrap();
        });

        let feed = SocketStatsFeed::new(&path);
        let lines = feed.fetch("gae_shop").await;
        assert_eq!(lines, vec!["gae_shop,FRONTEND,0".to_string()]);
        server.await.unwrap();
    }
}
