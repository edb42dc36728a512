// src/lsp/manager.rs - Registry of running servers, one per (language, project root)

use super::client::{LspClient, LspError};
use super::events::ServerEvent;
use crate::buffer::Buffer;
use crate::config::QuillConfig;
use log::{info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Directories that mark a project root.
const ROOT_MARKERS: &[&str] = &[".git", ".hg", ".svn", ".bzr"];

pub type ConnectionKey = (String, PathBuf);

pub struct LspManager {
    clients: HashMap<ConnectionKey, LspClient>,
    config: QuillConfig,
    status_message: Option<String>,
}

impl Default for LspManager {
    fn default() -> Self {
        Self::new(QuillConfig::default())
    }
}

impl LspManager {
    pub fn new(config: QuillConfig) -> Self {
        Self {
            clients: HashMap::new(),
            config,
            status_message: None,
        }
    }

    /// The connection key for a buffer: its language and the nearest enclosing
    /// directory carrying a VCS marker (else the file's own directory).
    pub fn key_for(buffer: &Buffer) -> Option<ConnectionKey> {
        let language = buffer.language_id.clone()?;
        let path = buffer.file_path.as_ref()?;
        Some((language, find_root(path)))
    }

    /// The running client for this buffer's (language, root), starting one if needed.
    ///
    /// A failed start is reported through the status message and yields `None`; the
    /// next call tries again.
    pub async fn client_for(&mut self, buffer: &Buffer) -> Option<&mut LspClient> {
        let key = Self::key_for(buffer)?;

        let dead = self
            .clients
            .get_mut(&key)
            .map(|client| !client.is_running())
            .unwrap_or(false);
        if dead {
            warn!("{} server for {} exited; restarting", key.0, key.1.display());
            self.clients.remove(&key);
        }

        if !self.clients.contains_key(&key) {
            let command = match self.config.server_command(&key.0) {
                Some(command) => command,
                None => return None,
            };
            match LspClient::start(&key.0, &key.1, &command).await {
                Ok(client) => {
                    self.clients.insert(key.clone(), client);
                }
                Err(e) => {
                    warn!("{}", e);
                    self.status_message = Some(format!("{} language server failed: {}", key.0, e));
                    return None;
                }
            }
        }
        self.clients.get_mut(&key)
    }

    /// The client for this buffer if one is already running; never spawns.
    pub fn existing_client(&mut self, buffer: &Buffer) -> Option<&mut LspClient> {
        let key = Self::key_for(buffer)?;
        self.clients.get_mut(&key)
    }

    pub fn has_client(&self, key: &ConnectionKey) -> bool {
        self.clients.contains_key(key)
    }

    pub fn keys(&self) -> Vec<ConnectionKey> {
        let mut keys: Vec<_> = self.clients.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Insert an already-initialized client, e.g. one built over an in-memory transport.
    pub fn insert_client(&mut self, client: LspClient) {
        let key = (client.language_id().to_string(), client.root().to_path_buf());
        self.clients.insert(key, client);
    }

    /// Drop connections whose process has gone away so the next use respawns them.
    pub fn reap(&mut self) -> Vec<ConnectionKey> {
        let dead: Vec<ConnectionKey> = self
            .clients
            .iter_mut()
            .filter_map(|(key, client)| (!client.is_running()).then(|| key.clone()))
            .collect();
        for key in &dead {
            info!("{} server for {} is gone", key.0, key.1.display());
            self.clients.remove(key);
        }
        dead
    }

    /// Buffered server messages for the buffer's connection, oldest first.
    pub fn drain_events(&mut self, buffer: &Buffer) -> Vec<ServerEvent> {
        self.existing_client(buffer)
            .map(|client| client.drain_events())
            .unwrap_or_default()
    }

    /// Read what every connection has received so far and hand back the events,
    /// without waiting on any server.
    pub async fn poll_all(&mut self) -> Vec<(ConnectionKey, ServerEvent)> {
        let mut events = Vec::new();
        for key in self.keys() {
            if let Some(client) = self.clients.get_mut(&key) {
                if let Err(e) = client.poll().await {
                    warn!("Polling {} server failed: {}", key.0, e);
                }
                events.extend(client.drain_events().into_iter().map(|e| (key.clone(), e)));
            }
        }
        events
    }

    /// Stop one server. The registry entry goes away whatever the server answers.
    pub async fn stop(&mut self, key: &ConnectionKey) -> Result<(), LspError> {
        match self.clients.remove(key) {
            Some(mut client) => client.shutdown().await,
            None => Ok(()),
        }
    }

    pub async fn shutdown_all(&mut self) -> Result<(), LspError> {
        let mut first_error = None;
        for (key, mut client) in self.clients.drain() {
            if let Err(e) = client.shutdown().await {
                warn!("Stopping {} server failed: {}", key.0, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn set_status(&mut self, message: String) {
        self.status_message = Some(message);
    }

    pub fn take_status(&mut self) -> Option<String> {
        self.status_message.take()
    }

    /// Turn a feature request's outcome into "a result or nothing". Protocol errors are
    /// logged quietly; transport failures also land on the status line.
    pub fn degrade<T>(&mut self, feature: &str, result: Result<T, LspError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) if e.is_server_error() => {
                warn!("{} failed on the server: {}", feature, e);
                None
            }
            Err(e) => {
                warn!("{} failed: {}", feature, e);
                self.status_message = Some(format!("{}: {}", feature, e));
                None
            }
        }
    }
}

/// Nearest ancestor with a VCS marker, else the file's directory.
pub fn find_root(path: &Path) -> PathBuf {
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let start = if path.is_dir() {
        path.as_path()
    } else {
        path.parent().unwrap_or(path.as_path())
    };
    start
        .ancestors()
        .find(|dir| ROOT_MARKERS.iter().any(|marker| dir.join(marker).exists()))
        .unwrap_or(start)
        .to_path_buf()
}
