//! # Server
//!
//! Binds the two listeners (control plane and file-transfer data plane),
//! wires up the shared state, and runs both accept loops. Each accepted
//! connection gets its own task; the accept loops themselves never hold
//! any shared lock.

use anyhow::{Context, Result};
use log::{error, info};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::common::config::ServerConfig;
use crate::server::game::GameOrchestrator;
use crate::server::registry::Registry;
use crate::server::rendezvous::Rendezvous;
use crate::server::session::{run_session, SessionContext};

/// A bound but not yet running server. Binding is separate from serving so
/// callers (tests included) can learn the actual addresses when the
/// configuration asks for port 0.
pub struct Server {
    control: TcpListener,
    transfer: TcpListener,
    ctx: SessionContext,
    rendezvous: Arc<Rendezvous>,
}

impl Server {
    /// Bind both listeners and construct the shared state.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let control_addr = format!("{}:{}", config.server.host, config.server.port);
        let transfer_addr = format!("{}:{}", config.server.host, config.server.transfer_port);

        let control = TcpListener::bind(&control_addr)
            .await
            .with_context(|| format!("failed to bind control listener on {}", control_addr))?;
        let transfer = TcpListener::bind(&transfer_addr)
            .await
            .with_context(|| format!("failed to bind transfer listener on {}", transfer_addr))?;

        let registry = Arc::new(Registry::new());
        let game = Arc::new(GameOrchestrator::new(
            config.game.clone(),
            Arc::clone(&registry),
        ));
        let rendezvous = Arc::new(Rendezvous::new(config.rendezvous.clone()));
        let ctx = SessionContext {
            config: Arc::new(config),
            registry,
            game,
        };

        Ok(Self {
            control,
            transfer,
            ctx,
            rendezvous,
        })
    }

    /// Actual control-plane address (resolves port 0 to the bound port).
    pub fn control_addr(&self) -> Result<SocketAddr> {
        self.control.local_addr().context("control listener address")
    }

    /// Actual data-plane address.
    pub fn transfer_addr(&self) -> Result<SocketAddr> {
        self.transfer.local_addr().context("transfer listener address")
    }

    /// Run both accept loops forever. Accept failures are logged and the
    /// loop keeps going; a failed accept must never take the server down.
    pub async fn serve(self) -> Result<()> {
        info!("control plane listening on {}", self.control_addr()?);
        info!("file transfer plane listening on {}", self.transfer_addr()?);

        let transfer = self.transfer;
        let rendezvous = self.rendezvous;
        tokio::spawn(async move {
            loop {
                match transfer.accept().await {
                    Ok((stream, _)) => {
                        tokio::spawn(Arc::clone(&rendezvous).handle_connection(stream));
                    }
                    Err(e) => error!("transfer accept failed: {}", e),
                }
            }
        });

        let next_id = AtomicU64::new(1);
        loop {
            match self.control.accept().await {
                Ok((stream, _)) => {
                    let id = next_id.fetch_add(1, Ordering::Relaxed);
                    tokio::spawn(run_session(self.ctx.clone(), stream, id));
                }
                Err(e) => error!("control accept failed: {}", e),
            }
        }
    }
}
