//! Unix domain socket server for IPC
//!
//! Provides request-response access to the lifecycle manager and push
//! notifications of status changes to subscribed clients.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::process::{PrivilegeEscalator, ProcessRunner};
use crate::service::ServiceLifecycleManager;

use super::protocol::{DaemonStatus, MappingView, Notification, Request, Response, MAX_FRAME_LEN};

/// IPC Server handling client connections
pub struct Server<R, E> {
    socket_path: PathBuf,
    listener: UnixListener,
    manager: ServiceLifecycleManager<R, E>,
    start_time: Instant,
    shutdown_tx: broadcast::Sender<()>,
}

impl<R: ProcessRunner, E: PrivilegeEscalator> Server<R, E> {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, manager: ServiceLifecycleManager<R, E>) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))
                .context("failed to restrict socket permissions")?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            manager,
            start_time: Instant::now(),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let manager = self.manager.clone();
                    let start_time = self.start_time;
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = handle_client(stream, manager, start_time) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Handle a single client connection
async fn handle_client<R: ProcessRunner, E: PrivilegeEscalator>(
    mut stream: UnixStream,
    manager: ServiceLifecycleManager<R, E>,
    start_time: Instant,
) -> Result<()> {
    loop {
        let Some(frame) = read_frame(&mut stream).await? else {
            debug!("client disconnected");
            return Ok(());
        };

        let request: Request = match serde_json::from_slice(&frame) {
            Ok(request) => request,
            Err(e) => {
                warn!(?e, "invalid request");
                let response = Response::Error {
                    code: "invalid_request".to_string(),
                    message: e.to_string(),
                };
                send_message(&mut stream, &response).await?;
                continue;
            }
        };
        debug!(?request, "received request");

        let response = match request {
            Request::Ping => Response::Pong,

            Request::GetStatus => Response::Status(DaemonStatus {
                version: env!("CARGO_PKG_VERSION").to_string(),
                label: manager.config().label.clone(),
                mapping: MappingView::from(&manager.store().snapshot()),
                uptime_secs: start_time.elapsed().as_secs(),
            }),

            Request::EnableMapping => {
                info!("enable requested via IPC");
                Response::from_result(manager.enable().await)
            }

            Request::DisableMapping => {
                info!("disable requested via IPC");
                Response::from_result(manager.disable().await)
            }

            Request::Subscribe => {
                send_message(&mut stream, &Response::Subscribed).await?;
                debug!("client subscribed to notifications");
                return stream_notifications(stream, manager).await;
            }
        };

        send_message(&mut stream, &response).await?;
    }
}

/// Push the current status, then each later status, until the client goes
/// away. Changes landing between two sends are merged: the client always
/// receives the newest snapshot, not every intermediate one.
async fn stream_notifications<R: ProcessRunner, E: PrivilegeEscalator>(
    mut stream: UnixStream,
    manager: ServiceLifecycleManager<R, E>,
) -> Result<()> {
    let mut status_rx = manager.store().subscribe();
    loop {
        let view = MappingView::from(&*status_rx.borrow_and_update());
        send_message(&mut stream, &Notification::StatusChanged(view)).await?;

        if status_rx.changed().await.is_err() {
            return Ok(());
        }
    }
}

/// Read one length-prefixed frame; `None` on clean disconnect
async fn read_frame(stream: &mut UnixStream) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match stream.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        warn!(len, "message too large, disconnecting");
        return Ok(None);
    }

    let mut msg_buf = vec![0u8; len];
    stream.read_exact(&mut msg_buf).await?;

    Ok(Some(msg_buf))
}

/// Send a length-prefixed JSON message
async fn send_message<T: serde::Serialize>(stream: &mut UnixStream, msg: &T) -> Result<()> {
    let msg_bytes = serde_json::to_vec(msg)?;
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    stream.write_all(&msg_len).await?;
    stream.write_all(&msg_bytes).await?;

    Ok(())
}
