//! Server Host
//!
//! Owns the listener and the single [`StorageEngine`] shared by every
//! connection, and supplies the identity/statistics fields merged into INFO.

use crate::commands::{CommandHandler, CommandTable};
use crate::config::Config;
use crate::connection::{handle_connection, ConnectionStats};
use crate::storage::{ServerInfo, StorageEngine};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Identity and connection statistics reported by INFO.
#[derive(Debug)]
pub struct ServerMetadata {
    started: Instant,
    stats: Arc<ConnectionStats>,
}

impl ServerMetadata {
    pub fn new(stats: Arc<ConnectionStats>) -> Self {
        Self {
            started: Instant::now(),
            stats,
        }
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }
}

impl Default for ServerMetadata {
    fn default() -> Self {
        Self::new(Arc::new(ConnectionStats::new()))
    }
}

impl ServerInfo for ServerMetadata {
    fn info(&self) -> Vec<(String, String)> {
        let stats = &self.stats;
        vec![
            ("version".to_string(), crate::VERSION.to_string()),
            ("os".to_string(), std::env::consts::OS.to_string()),
            (
                "uptime_in_seconds".to_string(),
                self.started.elapsed().as_secs().to_string(),
            ),
            (
                "connected_clients".to_string(),
                stats.active_connections.load(Ordering::Relaxed).to_string(),
            ),
            (
                "total_connections_received".to_string(),
                stats.connections_accepted.load(Ordering::Relaxed).to_string(),
            ),
            (
                "total_commands_processed".to_string(),
                stats.commands_processed.load(Ordering::Relaxed).to_string(),
            ),
        ]
    }
}

/// A bound server instance.
pub struct Server {
    listener: TcpListener,
    handler: CommandHandler,
    stats: Arc<ConnectionStats>,
    max_buffer: usize,
}

impl Server {
    /// Validates the command table, creates the engine and binds the listener.
    pub async fn bind(config: &Config) -> anyhow::Result<Self> {
        let table = Arc::new(CommandTable::builtin()?);
        info!(commands = table.len(), "Command table validated");

        let stats = Arc::new(ConnectionStats::new());
        let metadata = Arc::new(ServerMetadata::new(Arc::clone(&stats)));
        let storage = Arc::new(StorageEngine::new(metadata));
        info!("Storage engine initialized");

        let listener = TcpListener::bind(config.bind_address()).await?;
        info!(address = %listener.local_addr()?, "Listening");

        Ok(Self {
            listener,
            handler: CommandHandler::new(storage, table),
            stats,
            max_buffer: config.max_buffer,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    pub fn storage(&self) -> &Arc<StorageEngine> {
        self.handler.storage()
    }

    /// Accepts connections until the future is dropped.
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    tokio::spawn(handle_connection(
                        stream,
                        addr,
                        self.handler.clone(),
                        Arc::clone(&self.stats),
                        self.max_buffer,
                    ));
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    /// Runs until `shutdown` completes.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::select! {
            _ = self.run() => {}
            _ = shutdown => {
                info!("Shutdown signal received, stopping server...");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn info_map(info: &[(String, String)]) -> std::collections::HashMap<&str, &str> {
        info.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }

    #[test]
    fn test_metadata_fields() {
        let stats = Arc::new(ConnectionStats::new());
        stats.connection_opened();
        stats.record_commands(3);

        let metadata = ServerMetadata::new(Arc::clone(&stats));
        let info = metadata.info();
        let map = info_map(&info);

        assert_eq!(map["version"], crate::VERSION);
        assert_eq!(map["connected_clients"], "1");
        assert_eq!(map["total_connections_received"], "1");
        assert_eq!(map["total_commands_processed"], "3");
        assert!(map.contains_key("uptime_in_seconds"));
    }

    #[tokio::test]
    async fn test_server_end_to_end() {
        let config = Config {
            port: 0,
            ..Config::default()
        };
        let server = Server::bind(&config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let storage = Arc::clone(server.storage());

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let task = tokio::spawn(server.run_until(async {
            let _ = stop_rx.await;
        }));

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"SET a 1\r\nINFO\r\n").await.unwrap();

        let mut buf = vec![0u8; 4096];
        let mut total = 0;
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
        while tokio::time::Instant::now() < deadline {
            let n = tokio::time::timeout(
                std::time::Duration::from_millis(200),
                client.read(&mut buf[total..]),
            )
            .await;
            match n {
                Ok(Ok(n)) if n > 0 => total += n,
                _ => break,
            }
            if buf[..total].ends_with(b"expired_keys\r\n$1\r\n0\r\n") {
                break;
            }
        }

        let text = String::from_utf8_lossy(&buf[..total]);
        assert!(text.starts_with("+OK\r\n*"));
        assert!(text.contains("$4\r\nkeys\r\n$1\r\n1\r\n"));
        assert!(text.contains("$8\r\ntimeouts\r\n$1\r\n0\r\n"));
        assert_eq!(storage.len(), 1);

        stop_tx.send(()).unwrap();
        task.await.unwrap();
    }
}
