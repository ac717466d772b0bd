//! # Session & Heartbeat Monitor
//!
//! One [`Session`] per control-plane connection. The connection is split in
//! two: the read loop parses inbound lines and dispatches them, while a
//! writer task drains an unbounded outbound queue. Every other component
//! (registry, game orchestrator, peer sessions) talks to a session only
//! through its queue, so no lock is ever held across a network write and a
//! slow client can only ever stall itself.
//!
//! After a successful login a heartbeat monitor task probes the client with
//! PING at a fixed period and force-closes the connection when the PONG
//! acknowledgment does not arrive in time. The monitor is aborted on
//! teardown, so no probe or timeout can fire against a dead session.
//!
//! Disconnection (BYE, I/O failure, or heartbeat timeout) funnels into one
//! cleanup path: cancel the monitor, remove the session from the registry,
//! tell the remaining users, release the connection.

use log::{debug, error, info, warn};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout};

use crate::common::codes;
use crate::common::config::{HeartbeatConfig, ServerConfig};
use crate::common::connection::LineConnection;
use crate::common::protocol::{self as proto, LineError, Request};
use crate::server::game::GameOrchestrator;
use crate::server::registry::Registry;

/// In-queue sentinel telling the writer task to stop. Never produced by
/// [`Session::send`]: protocol lines always start with an ASCII header.
const WRITER_STOP: &str = "\u{0}";

/// Shared handle to one live control-plane connection.
///
/// The read loop owns the connection; everything else holds this handle,
/// which can only queue outbound lines, read the immutable username, and
/// request a shutdown.
pub struct Session {
    id: u64,
    peer: SocketAddr,
    outbound: mpsc::UnboundedSender<String>,
    /// Set exactly once, on successful login.
    username: OnceLock<String>,
    /// A PING was sent and its PONG is still missing.
    probe_outstanding: AtomicBool,
    probe_acked: Notify,
    shutdown: Notify,
}

impl Session {
    pub fn new(id: u64, peer: SocketAddr, outbound: mpsc::UnboundedSender<String>) -> Arc<Self> {
        Arc::new(Self {
            id,
            peer,
            outbound,
            username: OnceLock::new(),
            probe_outstanding: AtomicBool::new(false),
            probe_acked: Notify::new(),
            shutdown: Notify::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn username(&self) -> Option<&str> {
        self.username.get().map(|s| s.as_str())
    }

    pub(crate) fn bind_username(&self, name: String) {
        let _ = self.username.set(name);
    }

    /// Name used in log lines: the username once bound, the connection id
    /// before that.
    pub fn label(&self) -> String {
        match self.username() {
            Some(name) => name.to_string(),
            None => format!("conn#{}", self.id),
        }
    }

    /// Queue a header + JSON body line. Errors are swallowed: a closed
    /// queue means the session is already tearing down.
    pub fn send<T: Serialize>(&self, header: &str, body: &T) {
        match proto::encode(header, body) {
            Ok(line) => {
                let _ = self.outbound.send(line);
            }
            Err(e) => error!("failed to encode {} for {}: {}", header, self.label(), e),
        }
    }

    /// Queue a payload-less line (PING).
    pub fn send_bare(&self, header: &str) {
        let _ = self.outbound.send(header.to_string());
    }

    /// Ask the read loop to stop and run its cleanup.
    pub fn close(&self) {
        self.shutdown.notify_one();
    }

    /// Resolves when [`Session::close`] has been called.
    pub async fn wait_for_shutdown(&self) {
        self.shutdown.notified().await;
    }

    pub(crate) fn mark_probe_sent(&self) {
        self.probe_outstanding.store(true, Ordering::SeqCst);
    }

    /// Clear the outstanding-probe flag, returning whether a probe was
    /// actually pending.
    pub(crate) fn take_probe_outstanding(&self) -> bool {
        self.probe_outstanding.swap(false, Ordering::SeqCst)
    }

    pub(crate) fn ack_probe(&self) {
        self.probe_acked.notify_one();
    }
}

/// Everything a session needs besides its own connection. Cloned into each
/// connection task; no ambient statics.
#[derive(Clone)]
pub struct SessionContext {
    pub config: Arc<ServerConfig>,
    pub registry: Arc<Registry>,
    pub game: Arc<GameOrchestrator>,
}

/// Drive one control-plane connection to completion: welcome, read loop,
/// cleanup. Spawned once per accepted connection.
pub async fn run_session(ctx: SessionContext, stream: TcpStream, id: u64) {
    let peer = match stream.peer_addr() {
        Ok(peer) => peer,
        Err(e) => {
            warn!("dropping connection #{}: no peer address ({})", id, e);
            return;
        }
    };

    let (mut reader, mut write_half) = LineConnection::new(stream).into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let session = Session::new(id, peer, tx);

    // Writer task: drains the outbound queue in order. The queue is FIFO,
    // so everything queued before the stop sentinel (BYE_RESP included) is
    // flushed before the socket is released, even while the game still
    // holds a handle to this session.
    let writer = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if line == WRITER_STOP {
                break;
            }
            if write_half.write_all(line.as_bytes()).await.is_err() {
                break;
            }
            if write_half.write_all(b"\n").await.is_err() {
                break;
            }
            if write_half.flush().await.is_err() {
                break;
            }
        }
    });

    debug!("connection #{} accepted from {}", id, peer);
    session.send(
        proto::WELCOME,
        &proto::Welcome {
            message: format!("Welcome to the server {}", crate::VERSION),
        },
    );

    let mut runner = SessionRunner {
        ctx,
        session: Arc::clone(&session),
        heartbeat: None,
    };

    let mut line = String::new();
    loop {
        line.clear();
        tokio::select! {
            _ = session.wait_for_shutdown() => {
                debug!("{}: shutdown requested", session.label());
                break;
            }
            read = reader.read_line(&mut line) => {
                match read {
                    Ok(0) => {
                        debug!("{}: peer closed the connection", session.label());
                        break;
                    }
                    Ok(_) => runner.dispatch(line.trim_end_matches(['\r', '\n'])).await,
                    Err(e) => {
                        warn!("{}: read failed: {}", session.label(), e);
                        break;
                    }
                }
            }
        }
    }

    runner.cleanup().await;
    session.send_bare(WRITER_STOP);
    let _ = writer.await;
    debug!("connection #{} released", id);
}

/// Per-connection dispatcher. Owns the heartbeat monitor handle so the
/// monitor lives exactly as long as the connection.
struct SessionRunner {
    ctx: SessionContext,
    session: Arc<Session>,
    heartbeat: Option<JoinHandle<()>>,
}

impl SessionRunner {
    async fn dispatch(&mut self, line: &str) {
        let request = match proto::parse_line(line) {
            Ok(request) => request,
            Err(LineError::Malformed { header }) => {
                // A malformed guess is answered in game terms so it can
                // never disturb round bookkeeping.
                if header == proto::GUESS_NUMBER_REQ {
                    self.session.send(
                        proto::GUESS_NUMBER_RESP,
                        &proto::GuessResponse {
                            status: "OUT_OF_RANGE".into(),
                            code: Some(codes::NUMBER_OUT_OF_ALLOWED_RANGE),
                            result: None,
                        },
                    );
                } else {
                    debug!("{}: malformed {} payload", self.session.label(), header);
                    self.session.send(proto::PARSE_ERROR, &proto::Empty {});
                }
                return;
            }
            Err(LineError::UnknownHeader { header }) => {
                warn!("{}: unknown header {:?}, dropped", self.session.label(), header);
                return;
            }
        };

        match request {
            Request::Login(login) => self.handle_login(login).await,
            Request::Pong => self.handle_pong(),
            Request::Bye => self.handle_bye(),
            Request::Broadcast(req) => self.handle_broadcast(req).await,
            Request::ListUsers => self.handle_list_users().await,
            Request::PrivateMessage(req) => self.handle_private_message(req).await,
            Request::StartGame => self.ctx.game.start(&self.session).await,
            Request::JoinGame => self.ctx.game.join(&self.session).await,
            Request::Guess(req) => self.ctx.game.guess(&self.session, req.guess).await,
            Request::FileTransferRequest(req) => self.handle_file_transfer_request(req).await,
            Request::FileTransferResponse(resp) => self.handle_file_transfer_response(resp).await,
        }
    }

    // ========== LOGIN ==========

    async fn handle_login(&mut self, login: proto::LoginRequest) {
        let username = login.username;

        if self.session.username().is_some() {
            self.session.send(
                proto::LOGIN_RESP,
                &proto::Ack::error(codes::USER_CANNOT_LOGIN_TWICE),
            );
            return;
        }
        if !proto::is_valid_username(&username) {
            self.session.send(
                proto::LOGIN_RESP,
                &proto::Ack::error(codes::USERNAME_INVALID_FORMAT_OR_LENGTH),
            );
            return;
        }
        if !self.ctx.registry.try_add(&username, &self.session).await {
            self.session.send(
                proto::LOGIN_RESP,
                &proto::Ack::error(codes::USER_ALREADY_LOGGED_IN),
            );
            return;
        }

        info!("{} has joined", username);
        self.session.send(proto::LOGIN_RESP, &proto::Ack::ok());

        // Tell everyone else, outside any lock.
        let peers = self.ctx.registry.snapshot().await;
        for peer in peers {
            if !Arc::ptr_eq(&peer, &self.session) {
                peer.send(
                    proto::JOINED,
                    &proto::UserEvent {
                        username: username.clone(),
                    },
                );
            }
        }

        let monitor = tokio::spawn(heartbeat_monitor(
            Arc::clone(&self.session),
            self.ctx.config.heartbeat.clone(),
        ));
        self.heartbeat = Some(monitor);
    }

    // ========== HEARTBEAT ==========

    fn handle_pong(&mut self) {
        if !self.session.take_probe_outstanding() {
            // Protocol violation, not a liveness failure: report and carry on.
            self.session.send(
                proto::PONG_ERROR,
                &proto::Ack::error(codes::PONG_WITHOUT_PING),
            );
            return;
        }
        debug!("{} --> PONG", self.session.label());
        self.session.ack_probe();
    }

    // ========== DISCONNECT ==========

    fn handle_bye(&mut self) {
        self.session.send(proto::BYE_RESP, &proto::Ack::ok());
        self.session.close();
    }

    // ========== ONE-SHOT HANDLERS ==========

    async fn handle_broadcast(&mut self, req: proto::BroadcastRequest) {
        let sender = match self.session.username() {
            Some(name) => name.to_string(),
            None => {
                self.session.send(
                    proto::BROADCAST_RESP,
                    &proto::Ack::error(codes::USER_NOT_LOGGED_IN),
                );
                return;
            }
        };

        let peers = self.ctx.registry.snapshot().await;
        for peer in peers {
            if !Arc::ptr_eq(&peer, &self.session) {
                peer.send(
                    proto::BROADCAST,
                    &proto::BroadcastMessage {
                        username: sender.clone(),
                        message: req.message.clone(),
                    },
                );
            }
        }
        self.session.send(proto::BROADCAST_RESP, &proto::Ack::ok());
    }

    async fn handle_list_users(&mut self) {
        if self.session.username().is_none() {
            self.session.send(
                proto::LIST_USERS_RESP,
                &proto::ListUsersResponse {
                    status: "ERROR".into(),
                    code: Some(codes::USER_NOT_LOGGED_IN),
                    users: Vec::new(),
                },
            );
            return;
        }

        let users = self.ctx.registry.usernames().await;
        self.session.send(
            proto::LIST_USERS_RESP,
            &proto::ListUsersResponse {
                status: "OK".into(),
                code: None,
                users,
            },
        );
    }

    async fn handle_private_message(&mut self, req: proto::PrivateMessageRequest) {
        let sender = match self.session.username() {
            Some(name) => name.to_string(),
            None => {
                self.send_private_error(codes::USER_NOT_LOGGED_IN, "Not logged in");
                return;
            }
        };

        if req.receiver == sender {
            self.send_private_error(
                codes::SEND_TO_SELF_ERROR,
                "Sender is not allowed to send messages to themselves",
            );
            return;
        }
        if req.message.trim().is_empty() {
            self.send_private_error(
                codes::EMPTY_MESSAGE_BODY_ERROR,
                "Message body cannot be empty",
            );
            return;
        }

        match self.ctx.registry.lookup(&req.receiver).await {
            Some(receiver) => {
                receiver.send(
                    proto::PRIVATE_MESSAGE,
                    &proto::PrivateMessage {
                        sender: sender.clone(),
                        message: req.message.clone(),
                    },
                );
                debug!("{} -> {}: private message", sender, req.receiver);
                self.session.send(
                    proto::PRIVATE_MESSAGE_RESP,
                    &proto::PrivateMessageResponse {
                        status: "OK".into(),
                        code: codes::OK,
                        message: None,
                    },
                );
            }
            None => self.send_private_error(codes::RECIPIENT_NOT_FOUND, "Recipient not found"),
        }
    }

    fn send_private_error(&self, code: u32, message: &str) {
        self.session.send(
            proto::PRIVATE_MESSAGE_RESP,
            &proto::PrivateMessageResponse {
                status: "ERROR".into(),
                code,
                message: Some(message.to_string()),
            },
        );
    }

    // ========== FILE-TRANSFER HANDSHAKE (control plane) ==========

    async fn handle_file_transfer_request(&mut self, mut req: proto::FileTransferRequest) {
        let sender = match self.session.username() {
            Some(name) => name.to_string(),
            None => {
                self.send_transfer_error(codes::USER_NOT_LOGGED_IN);
                return;
            }
        };

        match self.ctx.registry.lookup(&req.receiver).await {
            Some(receiver) => {
                debug!(
                    "routing file transfer request of {:?} from {} to {}",
                    req.filename, sender, req.receiver
                );
                req.sender = Some(sender);
                receiver.send(proto::FILE_TRANSFER_REQUEST, &req);
            }
            None => self.send_transfer_error(codes::RECIPIENT_NOT_FOUND),
        }
    }

    /// Completes the handshake: routes the accept/reject back to the
    /// original sender and, on acceptance, mints the transfer identifier
    /// both data-plane connections must present to the rendezvous.
    async fn handle_file_transfer_response(&mut self, mut resp: proto::FileTransferResponse) {
        let me = match self.session.username() {
            Some(name) => name.to_string(),
            None => {
                self.send_transfer_error(codes::USER_NOT_LOGGED_IN);
                return;
            }
        };

        let original_sender = match self.ctx.registry.lookup(&resp.sender).await {
            Some(handler) => handler,
            None => {
                self.send_transfer_error(codes::RECIPIENT_NOT_FOUND);
                return;
            }
        };

        resp.receiver = Some(me.clone());
        if resp.status == "OK" {
            let transfer_id = uuid::Uuid::new_v4().to_string();
            info!(
                "file transfer {} -> {} accepted, transfer id {}",
                resp.sender, me, transfer_id
            );
            resp.uuid = Some(transfer_id);
            // Both endpoints need the identifier: the sender to open its
            // data connection, the receiver to claim the matching slot.
            original_sender.send(proto::FILE_TRANSFER_RESPONSE, &resp);
            self.session.send(proto::FILE_TRANSFER_RESPONSE, &resp);
        } else {
            original_sender.send(proto::FILE_TRANSFER_RESPONSE, &resp);
        }
    }

    fn send_transfer_error(&self, code: u32) {
        self.session.send(
            proto::FILE_TRANSFER_RESPONSE,
            &proto::FileTransferResponse {
                sender: self.session.label(),
                receiver: None,
                status: "ERROR".into(),
                code: Some(code),
                uuid: None,
            },
        );
    }

    // ========== CLEANUP ==========

    /// Single teardown path for BYE, transport failure, and heartbeat
    /// timeout. Idempotent with respect to the registry; cancels the
    /// heartbeat monitor so no stale probe can fire afterwards.
    async fn cleanup(&mut self) {
        if let Some(monitor) = self.heartbeat.take() {
            monitor.abort();
        }

        if let Some(username) = self.session.username().map(str::to_string) {
            if self.ctx.registry.remove(&username, &self.session).await {
                info!("{} has left", username);
                let peers = self.ctx.registry.snapshot().await;
                for peer in peers {
                    peer.send(
                        proto::LEFT,
                        &proto::UserEvent {
                            username: username.clone(),
                        },
                    );
                }
            }
        }
    }
}

/// Heartbeat monitor: after a warm-up delay, sends PING at a fixed period
/// and waits for each PONG acknowledgment. A missed acknowledgment closes
/// the connection; the client is presumed gone, so nothing is sent.
///
/// The task is aborted on session teardown, which makes every probe and
/// timeout cancellable as a unit.
async fn heartbeat_monitor(session: Arc<Session>, config: HeartbeatConfig) {
    sleep(config.warmup()).await;

    let mut ticker = interval(config.probe_interval());
    loop {
        ticker.tick().await;

        session.mark_probe_sent();
        session.send_bare(proto::PING);
        debug!("{} <-- PING", session.label());

        match timeout(config.ack_timeout(), session.probe_acked.notified()).await {
            Ok(()) => {}
            Err(_) => {
                warn!(
                    "{}: no PONG within {:?}, closing connection",
                    session.label(),
                    config.ack_timeout()
                );
                session.close();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout as tokio_timeout;

    fn test_session() -> (Arc<Session>, UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Session::new(7, "127.0.0.1:0".parse().unwrap(), tx), rx)
    }

    fn fast_config() -> HeartbeatConfig {
        HeartbeatConfig {
            warmup_ms: 10,
            probe_interval_ms: 40,
            ack_timeout_ms: 25,
        }
    }

    #[tokio::test]
    async fn missed_ack_closes_the_session() {
        let (session, mut rx) = test_session();
        let monitor = tokio::spawn(heartbeat_monitor(Arc::clone(&session), fast_config()));

        let probe = tokio_timeout(Duration::from_millis(500), rx.recv())
            .await
            .expect("probe expected")
            .unwrap();
        assert_eq!(probe, "PING");

        // Never acknowledge: the monitor must request a shutdown.
        tokio_timeout(Duration::from_millis(500), session.wait_for_shutdown())
            .await
            .expect("session should be closed after missed ack");
        let _ = monitor.await;
    }

    #[tokio::test]
    async fn acknowledged_probes_keep_the_session_alive() {
        let (session, mut rx) = test_session();
        let monitor = tokio::spawn(heartbeat_monitor(Arc::clone(&session), fast_config()));

        // Acknowledge three consecutive probes like a live client would.
        for _ in 0..3 {
            let probe = tokio_timeout(Duration::from_millis(500), rx.recv())
                .await
                .expect("probe expected")
                .unwrap();
            assert_eq!(probe, "PING");
            assert!(session.take_probe_outstanding());
            session.ack_probe();
        }

        // No shutdown must have been requested in the meantime.
        let shut = tokio_timeout(Duration::from_millis(30), session.wait_for_shutdown()).await;
        assert!(shut.is_err(), "session unexpectedly closed");
        monitor.abort();
    }

    #[tokio::test]
    async fn probe_flag_is_cleared_by_take() {
        let (session, _rx) = test_session();
        assert!(!session.take_probe_outstanding());
        session.mark_probe_sent();
        assert!(session.take_probe_outstanding());
        assert!(!session.take_probe_outstanding());
    }

    #[tokio::test]
    async fn username_binds_once() {
        let (session, _rx) = test_session();
        assert_eq!(session.username(), None);
        session.bind_username("alice".into());
        session.bind_username("mallory".into());
        assert_eq!(session.username(), Some("alice"));
    }
}
