//! # File-Transfer Rendezvous (data plane)
//!
//! Pairs the two data-plane connections of an accepted file transfer and
//! relays the payload between them. Each connection opens with a fixed
//! preamble:
//!
//! ```text
//! +------+----------------------+
//! | role | transfer identifier  |
//! | 1 B  | 36 B (UUID string)   |
//! +------+----------------------+
//! ```
//!
//! The role byte is `S` (sender) or `R` (receiver). Pairing is keyed by
//! the transfer identifier, never by arrival order, so interleaved legs of
//! concurrent transfers can never be cross-wired. Whichever leg arrives
//! first parks in a pending slot; the slot expires if its counterpart does
//! not show up in time.
//!
//! Once paired, everything the sender wrote after the preamble (extension,
//! checksum, raw file bytes) is relayed to the receiver verbatim.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::sleep;

use crate::common::config::RendezvousConfig;

/// Length of the transfer identifier in the preamble (UUID text form).
const TOKEN_LEN: usize = 36;

/// File extension field relayed ahead of the payload.
const EXT_LEN: usize = 3;
/// Hex-encoded MD5 checksum field relayed ahead of the payload.
const CHECKSUM_LEN: usize = 32;

/// One transfer waiting for its counterpart. The `id` ties the expiry
/// timer to this particular slot; a slot re-created under the same token
/// gets a fresh id and the old timer becomes a no-op.
struct PendingEntry {
    id: u64,
    sender: Option<TcpStream>,
    receiver: Option<TcpStream>,
}

/// Data-plane pairing table shared by every rendezvous connection task.
pub struct Rendezvous {
    pending_timeout: Duration,
    next_entry_id: AtomicU64,
    pending: Mutex<HashMap<String, PendingEntry>>,
}

impl Rendezvous {
    pub fn new(config: RendezvousConfig) -> Self {
        Self {
            pending_timeout: config.pending_timeout(),
            next_entry_id: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Drive one data-plane connection: read the preamble, park or pair.
    /// Invalid preambles close the connection without a reply.
    pub async fn handle_connection(self: Arc<Self>, mut stream: TcpStream) {
        let mut preamble = [0u8; 1 + TOKEN_LEN];
        if let Err(e) = stream.read_exact(&mut preamble).await {
            warn!("rendezvous: connection dropped before preamble: {}", e);
            return;
        }

        let role = preamble[0];
        if role != b'S' && role != b'R' {
            warn!("rendezvous: invalid role byte {:#04x}, closing", role);
            return;
        }
        let token = match std::str::from_utf8(&preamble[1..]) {
            Ok(token) if token.bytes().all(|b| b.is_ascii_graphic()) => token.to_string(),
            _ => {
                warn!("rendezvous: malformed transfer identifier, closing");
                return;
            }
        };

        let paired = {
            let mut pending = self.pending.lock().await;
            let entry = pending.entry(token.clone()).or_insert_with(|| {
                let id = self.next_entry_id.fetch_add(1, Ordering::Relaxed);
                debug!("rendezvous: new pending slot {} for {}", id, token);
                PendingEntry {
                    id,
                    sender: None,
                    receiver: None,
                }
            });
            let first_leg = entry.sender.is_none() && entry.receiver.is_none();

            let slot = match role {
                b'S' => &mut entry.sender,
                _ => &mut entry.receiver,
            };
            if slot.is_some() {
                // Same role twice for one token: the first claimant keeps
                // the slot, the newcomer is closed.
                warn!(
                    "rendezvous: duplicate {} leg for {}, rejecting newcomer",
                    role as char, token
                );
                return;
            }
            *slot = Some(stream);

            if entry.sender.is_some() && entry.receiver.is_some() {
                pending.remove(&token)
            } else {
                if first_leg {
                    self.spawn_expiry(token.clone(), entry.id);
                }
                None
            }
        };

        if let Some(entry) = paired {
            // Both options are filled by construction at this point.
            let (Some(sender), Some(receiver)) = (entry.sender, entry.receiver) else {
                return;
            };
            info!("rendezvous: paired transfer {}", token);
            if let Err(e) = relay(sender, receiver, &token).await {
                warn!("rendezvous: relay for {} failed: {}", token, e);
            }
        }
    }

    /// Arm the expiry timer for a half-open slot. Fires only if the slot
    /// with this exact id is still pending.
    fn spawn_expiry(self: &Arc<Self>, token: String, entry_id: u64) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            sleep(this.pending_timeout).await;
            let mut pending = this.pending.lock().await;
            let stale = pending
                .get(&token)
                .map(|entry| entry.id == entry_id)
                .unwrap_or(false);
            if stale {
                pending.remove(&token);
                info!(
                    "rendezvous: transfer {} expired, counterpart never arrived",
                    token
                );
            }
        });
    }
}

/// Pipe the sender's stream to the receiver: the fixed extension and
/// checksum fields first, then the raw payload until the sender closes.
async fn relay(mut sender: TcpStream, mut receiver: TcpStream, token: &str) -> anyhow::Result<()> {
    let mut header = [0u8; EXT_LEN + CHECKSUM_LEN];
    sender.read_exact(&mut header).await?;
    receiver.write_all(&header).await?;

    let bytes = tokio::io::copy(&mut sender, &mut receiver).await?;
    receiver.flush().await?;
    receiver.shutdown().await?;
    info!(
        "rendezvous: transfer {} complete, {} payload bytes relayed",
        token, bytes
    );
    Ok(())
}
