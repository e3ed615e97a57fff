use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    sync::{OwnedSemaphorePermit, Semaphore, watch},
    task::JoinSet,
};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use minesweeper_common::protocol::Response;

use crate::{
    config::{CapacityPolicy, ServerConfig},
    error::{Result, ServerError},
    logic::{Board, SharedBoard},
    routes::Session,
};

#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub peer: SocketAddr,
    pub connected_at: Instant,
}

/// Sessions currently playing, keyed by session id.
pub type Sessions = Arc<DashMap<Uuid, SessionInfo>>;

/// Stops a running server: no new sessions are accepted, open sessions are
/// closed, then the listener is released.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    fn new() -> Self {
        Self {
            sender: Arc::new(watch::channel(false).0),
        }
    }

    pub fn shutdown(&self) {
        if !self.sender.send_replace(true) {
            info!("Shutdown requested");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        *self.sender.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}

/// Resolves once shutdown has been requested.
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|&stop| stop).await;
}

/// Keeps a session registered and its slot taken. Dropping it (or calling
/// [`SessionGuard::release`]) deregisters the session and frees the slot.
pub struct SessionGuard {
    id: Uuid,
    sessions: Sessions,
    permit: Option<OwnedSemaphorePermit>,
    shutdown: ShutdownHandle,
    exit_when_idle: bool,
}

impl SessionGuard {
    pub fn release(&mut self) {
        let Some(permit) = self.permit.take() else {
            return;
        };

        // The session must be gone from the registry before its slot is reused.
        if let Some((id, info)) = self.sessions.remove(&self.id) {
            info!(
                "Session {} ({}) ended after {:?}, {} still playing",
                id,
                info.peer,
                info.connected_at.elapsed(),
                self.sessions.len()
            );
        }
        drop(permit);

        if self.exit_when_idle && self.sessions.is_empty() {
            info!("Last player left, shutting down");
            self.shutdown.shutdown();
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

pub struct MinesweeperServer {
    listener: TcpListener,
    board: SharedBoard,
    config: ServerConfig,
    sessions: Sessions,
    slots: Arc<Semaphore>,
    shutdown: ShutdownHandle,
}

impl MinesweeperServer {
    pub async fn bind(config: ServerConfig, board: Board) -> Result<Self> {
        let listener = TcpListener::bind(config.listen_addr()).await?;
        info!(
            "Listening on {} (max {} players, debug: {})",
            listener.local_addr()?,
            config.max_clients,
            config.debug
        );

        Ok(Self {
            listener,
            board: board.into_shared(),
            slots: Arc::new(Semaphore::new(config.max_clients)),
            config,
            sessions: Arc::new(DashMap::new()),
            shutdown: ShutdownHandle::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn board(&self) -> SharedBoard {
        self.board.clone()
    }

    pub fn sessions(&self) -> Sessions {
        self.sessions.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accepts and serves sessions until shut down.
    #[instrument(level = "trace", skip(self))]
    pub async fn run(self) -> Result<()> {
        let mut workers = JoinSet::new();
        let mut stop = self.shutdown.subscribe();

        loop {
            let permit = match self.config.capacity_policy {
                CapacityPolicy::Wait => {
                    if self.slots.available_permits() == 0 {
                        debug!(
                            "All {} slots taken, waiting for a player to leave",
                            self.config.max_clients
                        );
                    }
                    tokio::select! {
                        permit = self.slots.clone().acquire_owned() => match permit {
                            Ok(permit) => Some(permit),
                            Err(_) => break,
                        },
                        _ = stopped(&mut stop) => break,
                    }
                }
                CapacityPolicy::Reject => None,
            };

            let (stream, peer) = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                },
                _ = stopped(&mut stop) => break,
            };

            let permit = match permit {
                Some(permit) => permit,
                None => match self.slots.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => {
                        self.reject(stream, peer).await;
                        continue;
                    }
                },
            };

            self.spawn_session(&mut workers, stream, peer, permit);

            while let Some(finished) = workers.try_join_next() {
                if let Err(e) = finished {
                    error!("Session task failed: {}", e);
                }
            }
        }

        info!(
            "No longer accepting players, closing {} connections",
            workers.len()
        );
        self.shutdown.shutdown();
        while let Some(finished) = workers.join_next().await {
            if let Err(e) = finished {
                error!("Session task failed: {}", e);
            }
        }

        let addr = self.listener.local_addr()?;
        drop(self.listener);
        info!("Server on {} stopped", addr);
        Ok(())
    }

    fn spawn_session(
        &self,
        workers: &mut JoinSet<()>,
        stream: TcpStream,
        peer: SocketAddr,
        permit: OwnedSemaphorePermit,
    ) {
        let id = Uuid::new_v4();
        self.sessions.insert(
            id,
            SessionInfo {
                peer,
                connected_at: Instant::now(),
            },
        );
        let players = self.sessions.len();
        info!(
            "Player {} connected as {}, {}/{} playing",
            peer, id, players, self.config.max_clients
        );

        let guard = SessionGuard {
            id,
            sessions: self.sessions.clone(),
            permit: Some(permit),
            shutdown: self.shutdown.clone(),
            exit_when_idle: self.config.exit_when_idle,
        };
        let session = Session {
            id,
            peer,
            board: self.board.clone(),
            debug: self.config.debug,
        };
        let stop = self.shutdown.subscribe();

        workers.spawn(async move {
            if let Err(e) = session.run(stream, players, stop, guard).await {
                warn!("Session {} ({}) ended with error: {}", id, peer, e);
            }
        });
    }

    async fn reject(&self, mut stream: TcpStream, peer: SocketAddr) {
        let max_clients = self.config.max_clients;
        warn!(
            "Rejecting {}: {}",
            peer,
            ServerError::CapacityExceeded { max: max_clients }
        );

        let response = Response::Full { max_clients };
        if let Err(e) = stream.write_all(response.to_string().as_bytes()).await {
            debug!("Could not notify rejected client {}: {}", peer, e);
        }
        let _ = stream.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_handle() {
        let handle = ShutdownHandle::new();
        let other = handle.clone();
        assert!(!handle.is_shutdown());
        other.shutdown();
        assert!(handle.is_shutdown());
        handle.shutdown();
        assert!(handle.is_shutdown());
    }

    #[tokio::test]
    async fn test_guard_release_deregisters_once() {
        let sessions: Sessions = Arc::new(DashMap::new());
        let slots = Arc::new(Semaphore::new(1));
        let shutdown = ShutdownHandle::new();
        let id = Uuid::new_v4();
        sessions.insert(
            id,
            SessionInfo {
                peer: "127.0.0.1:1".parse().unwrap(),
                connected_at: Instant::now(),
            },
        );

        let mut guard = SessionGuard {
            id,
            sessions: sessions.clone(),
            permit: Some(slots.clone().try_acquire_owned().unwrap()),
            shutdown: shutdown.clone(),
            exit_when_idle: true,
        };
        assert_eq!(slots.available_permits(), 0);

        guard.release();
        assert!(sessions.is_empty());
        assert_eq!(slots.available_permits(), 1);
        assert!(shutdown.is_shutdown());

        drop(guard);
        assert_eq!(slots.available_permits(), 1);
    }
}
