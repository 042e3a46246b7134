//! Connection management for MongoDB
//!
//! Besides owning the driver client, the manager publishes the identity of
//! the current connection on a `watch` channel. The export workflow uses it
//! two ways: a transition to `None` cancels in-flight work, and a change of
//! identity between the start and the end of an export suppresses the
//! completion broadcast.

use std::time::Duration;

use bson::doc;
use mongodb::{Client, options::ClientOptions};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::error::{ConnectionError, Result};

/// Identity of one established connection
///
/// A new id is issued on every successful `connect`, so two ids compare equal
/// only if they refer to the same client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    #[cfg(test)]
    pub(crate) fn from_raw(id: u64) -> Self {
        Self(id)
    }

    /// Raw numeric id
    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Receiver side of the connection signal
pub type ConnectionWatch = watch::Receiver<Option<ConnectionId>>;

/// MongoDB connection manager
pub struct ConnectionManager {
    /// MongoDB client instance
    client: Option<Client>,

    /// Connection configuration
    config: ConnectionConfig,

    /// Connection URI
    uri: String,

    /// Publishes the current connection id (`None` while disconnected)
    signal: watch::Sender<Option<ConnectionId>>,

    /// Next id to hand out
    next_id: u64,
}

impl ConnectionManager {
    /// Create a new connection manager
    ///
    /// # Arguments
    /// * `uri` - MongoDB connection URI
    /// * `config` - Connection configuration
    pub fn new(uri: String, config: ConnectionConfig) -> Self {
        let (signal, _) = watch::channel(None);
        Self {
            client: None,
            config,
            uri,
            signal,
            next_id: 1,
        }
    }

    /// Establish connection to MongoDB
    ///
    /// Parses the URI, applies the configured timeouts and application name,
    /// and pings the server before announcing the connection.
    pub async fn connect(&mut self) -> Result<ConnectionId> {
        let mut options = ClientOptions::parse(&self.uri)
            .await
            .map_err(|e| ConnectionError::InvalidUri(e.to_string()))?;

        let timeout = Duration::from_secs(self.config.timeout);
        options.connect_timeout = Some(timeout);
        options.server_selection_timeout = Some(timeout);
        if options.app_name.is_none() {
            options.app_name = Some(self.config.app_name.clone());
        }

        let client = Client::with_options(options)
            .map_err(|e| ConnectionError::ConnectionFailed(e.to_string()))?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| ConnectionError::PingFailed(e.to_string()))?;

        if let Some(previous) = self.client.replace(client) {
            debug!("Replacing previous client");
            previous.shutdown().await;
        }

        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        self.signal.send_replace(Some(id));

        info!("Connected to MongoDB (connection {})", id.get());
        Ok(id)
    }

    /// Disconnect from MongoDB
    ///
    /// Subscribers observe `None` before the client is shut down, so
    /// in-flight exports are cancelled first.
    pub async fn disconnect(&mut self) -> Result<()> {
        self.signal.send_replace(None);

        match self.client.take() {
            Some(client) => {
                client.shutdown().await;
                info!("Disconnected from MongoDB");
            }
            None => warn!("Disconnect requested while not connected"),
        }

        Ok(())
    }

    /// Get the client handle
    pub fn get_client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| ConnectionError::NotConnected.into())
    }

    /// Check whether a client is currently held
    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    /// Current connection id, if connected
    pub fn current(&self) -> Option<ConnectionId> {
        *self.signal.borrow()
    }

    /// Subscribe to connection changes
    pub fn subscribe(&self) -> ConnectionWatch {
        self.signal.subscribe()
    }

    /// Get MongoDB server version
    pub async fn get_server_version(&self) -> Result<String> {
        let client = self.get_client()?;
        let info = client
            .database("admin")
            .run_command(doc! { "buildInfo": 1 })
            .await?;

        Ok(info
            .get_str("version")
            .map(str::to_string)
            .unwrap_or_else(|_| "unknown".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_manager_is_disconnected() {
        let manager = ConnectionManager::new(
            "mongodb://localhost:27017".to_string(),
            ConnectionConfig::default(),
        );
        assert!(!manager.is_connected());
        assert!(manager.current().is_none());
        assert!(manager.get_client().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_publishes_none() {
        let mut manager = ConnectionManager::new(
            "mongodb://localhost:27017".to_string(),
            ConnectionConfig::default(),
        );
        manager.signal.send_replace(Some(ConnectionId(7)));
        let mut watch = manager.subscribe();
        assert_eq!(*watch.borrow_and_update(), Some(ConnectionId(7)));

        manager.disconnect().await.unwrap();
        watch.changed().await.unwrap();
        assert_eq!(*watch.borrow(), None);
    }

    #[tokio::test]
    async fn test_invalid_uri() {
        let mut manager =
            ConnectionManager::new("not-a-uri".to_string(), ConnectionConfig::default());
        let err = manager.connect().await.unwrap_err();
        assert!(err.to_string().contains("Invalid connection URI"));
    }
}
