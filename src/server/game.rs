//! # Game Orchestrator
//!
//! Single authoritative state machine for the number-guessing game:
//!
//! ```text
//! IDLE --start--> JOIN_WINDOW --window elapsed, >=2 players--> RUNNING
//! JOIN_WINDOW --window elapsed, <2 players--> IDLE (cancelled)
//! RUNNING --all guessed correctly OR round timer--> FINALIZING --> IDLE
//! ```
//!
//! One instance is constructed at process start and shared by every
//! session; there is no static state, so tests build isolated orchestrators
//! with short timers. All mutable fields sit behind one mutex, and every
//! timer task carries the generation it was armed for: a timer that fires
//! after the game moved on finds a different generation and becomes a
//! no-op. Messages to participants are queue pushes on their sessions, so
//! no network write ever happens while the lock is held.

use log::{debug, info};
use rand::Rng;
use serde_json::Map;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use crate::common::codes;
use crate::common::config::GameConfig;
use crate::common::protocol::{self as proto, GameNotification};
use crate::server::registry::Registry;
use crate::server::session::Session;

/// Lifecycle of the single game instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    Idle,
    JoinWindow,
    Running,
    Finalizing,
}

/// Why a round is being finalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FinalizeReason {
    AllGuessedCorrectly,
    Timeout,
}

struct GameInner {
    state: GameState,
    /// Bumped on every state transition; timers armed for an older
    /// generation are stale and must not act.
    generation: u64,
    target: i64,
    participants: Vec<Arc<Session>>,
    /// Username -> elapsed millis of the first correct guess.
    times: HashMap<String, u64>,
    round_started: Option<Instant>,
    round_timer: Option<JoinHandle<()>>,
}

impl GameInner {
    fn is_participant(&self, session: &Arc<Session>) -> bool {
        self.participants.iter().any(|p| Arc::ptr_eq(p, session))
    }
}

/// Coordinates the guessing game across all sessions. Owns the join-window
/// and round timers and the per-round leaderboard.
pub struct GameOrchestrator {
    config: GameConfig,
    registry: Arc<Registry>,
    inner: Mutex<GameInner>,
}

impl GameOrchestrator {
    pub fn new(config: GameConfig, registry: Arc<Registry>) -> Self {
        Self {
            config,
            registry,
            inner: Mutex::new(GameInner {
                state: GameState::Idle,
                generation: 0,
                target: 0,
                participants: Vec::new(),
                times: HashMap::new(),
                round_started: None,
                round_timer: None,
            }),
        }
    }

    pub async fn state(&self) -> GameState {
        self.inner.lock().await.state
    }

    #[cfg(test)]
    async fn generation(&self) -> u64 {
        self.inner.lock().await.generation
    }

    /// Propose a new game. The requester becomes the first participant and
    /// the join window opens; every other online user is invited.
    pub async fn start(self: &Arc<Self>, requester: &Arc<Session>) {
        let username = match requester.username() {
            Some(name) => name.to_string(),
            None => {
                requester.send(
                    proto::GAME_NOTIFICATION,
                    &GameNotification::error(codes::USER_NOT_LOGGED_IN),
                );
                return;
            }
        };

        let generation = {
            let mut inner = self.inner.lock().await;
            if inner.state != GameState::Idle {
                requester.send(
                    proto::GAME_NOTIFICATION,
                    &GameNotification::error(codes::GAME_HAS_ALREADY_STARTED_CANNOT_JOIN),
                );
                return;
            }
            inner.state = GameState::JoinWindow;
            inner.generation += 1;
            inner.participants.clear();
            inner.participants.push(Arc::clone(requester));
            inner.times.clear();
            inner.generation
        };

        info!("{} started a guessing game, join window open", username);
        requester.send(proto::START_GAME_RESP, &proto::Ack::ok());

        // Invite everyone else, outside the lock.
        let peers = self.registry.snapshot().await;
        for peer in peers {
            if !Arc::ptr_eq(&peer, requester) {
                peer.send(
                    proto::GAME_NOTIFICATION,
                    &GameNotification::info("A guessing game has been initiated. Join now!"),
                );
            }
        }

        let this = Arc::clone(self);
        let window = self.config.join_window();
        tokio::spawn(async move {
            sleep(window).await;
            this.join_window_elapsed(generation).await;
        });
    }

    /// Enroll a client in the pending game during the join window.
    pub async fn join(&self, client: &Arc<Session>) {
        let username = match client.username() {
            Some(name) => name.to_string(),
            None => {
                client.send(
                    proto::GAME_NOTIFICATION,
                    &GameNotification::error(codes::USER_NOT_LOGGED_IN),
                );
                return;
            }
        };

        let mut inner = self.inner.lock().await;
        match inner.state {
            GameState::JoinWindow => {}
            GameState::Running | GameState::Finalizing => {
                client.send(
                    proto::GAME_NOTIFICATION,
                    &GameNotification::error(codes::GAME_HAS_ALREADY_STARTED_CANNOT_JOIN),
                );
                return;
            }
            GameState::Idle => {
                client.send(
                    proto::GAME_NOTIFICATION,
                    &GameNotification::error(codes::NO_RUNNING_GAME),
                );
                return;
            }
        }
        if inner.is_participant(client) {
            client.send(
                proto::GAME_NOTIFICATION,
                &GameNotification::error(codes::USER_ALREADY_JOINED),
            );
            return;
        }

        inner.participants.push(Arc::clone(client));
        client.send(proto::JOIN_GAME_RESP, &proto::Ack::ok());
        info!("{} has joined the game", username);
    }

    /// Join-window timer callback. Stale fires (the generation moved on)
    /// are no-ops.
    async fn join_window_elapsed(self: &Arc<Self>, generation: u64) {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.state != GameState::JoinWindow {
            debug!("stale join-window timer ignored (generation {})", generation);
            return;
        }

        if inner.participants.len() >= 2 {
            self.begin_round(&mut inner);
        } else {
            // Not enough players: tell the initiator and go back to idle.
            let initiator = inner.participants.first().cloned();
            inner.state = GameState::Idle;
            inner.generation += 1;
            inner.participants.clear();
            inner.times.clear();
            info!("game cancelled, fewer than 2 players joined");
            if let Some(initiator) = initiator {
                initiator.send(
                    proto::GAME_NOTIFICATION,
                    &GameNotification::error(codes::INSUFFICIENT_PLAYERS_TO_START_THE_GAME),
                );
            }
        }
    }

    /// Transition JOIN_WINDOW -> RUNNING: draw the target, announce the
    /// roster and the playable range, arm the round timer.
    fn begin_round(self: &Arc<Self>, inner: &mut GameInner) {
        inner.state = GameState::Running;
        inner.generation += 1;
        inner.target = rand::thread_rng().gen_range(self.config.lower_bound..=self.config.upper_bound);
        inner.times.clear();
        inner.round_started = Some(Instant::now());

        let roster: Vec<String> = inner
            .participants
            .iter()
            .map(|p| p.username().unwrap_or_default().to_string())
            .collect();
        info!("game started with {} players: {:?}", roster.len(), roster);

        let mut announcement = String::from("The game has started with the following participants:\n");
        for player in &roster {
            announcement.push_str("- ");
            announcement.push_str(player);
            announcement.push('\n');
        }
        let range_notice = format!(
            "You can now make a guess between {} & {}. Good Luck!",
            self.config.lower_bound, self.config.upper_bound
        );
        for participant in &inner.participants {
            participant.send(
                proto::GAME_NOTIFICATION,
                &GameNotification::info(announcement.trim_end()),
            );
            participant.send(proto::GAME_NOTIFICATION, &GameNotification::info(&range_notice));
        }

        let generation = inner.generation;
        let this = Arc::clone(self);
        let round = self.config.round_timeout();
        inner.round_timer = Some(tokio::spawn(async move {
            sleep(round).await;
            this.round_timer_elapsed(generation).await;
        }));
    }

    /// Round timer callback; stale fires are no-ops.
    async fn round_timer_elapsed(self: Arc<Self>, generation: u64) {
        let mut inner = self.inner.lock().await;
        if inner.generation != generation || inner.state != GameState::Running {
            debug!("stale round timer ignored (generation {})", generation);
            return;
        }
        info!("round timer expired, publishing results");
        self.finalize(&mut inner, FinalizeReason::Timeout);
    }

    /// Evaluate one guess against the running round.
    pub async fn guess(&self, client: &Arc<Session>, value: i64) {
        let username = match client.username() {
            Some(name) => name.to_string(),
            None => {
                client.send(
                    proto::GAME_NOTIFICATION,
                    &GameNotification::error(codes::USER_NOT_LOGGED_IN),
                );
                return;
            }
        };

        let mut inner = self.inner.lock().await;
        if inner.state != GameState::Running {
            client.send(
                proto::GAME_NOTIFICATION,
                &GameNotification::error(codes::NO_RUNNING_GAME),
            );
            return;
        }
        if !inner.is_participant(client) {
            client.send(
                proto::GAME_NOTIFICATION,
                &GameNotification::error(codes::NOT_A_PARTICIPANT),
            );
            return;
        }
        if value < self.config.lower_bound || value > self.config.upper_bound {
            // Not counted as a guess attempt; round bookkeeping untouched.
            client.send(
                proto::GUESS_NUMBER_RESP,
                &proto::GuessResponse {
                    status: "OUT_OF_RANGE".into(),
                    code: Some(codes::NUMBER_OUT_OF_ALLOWED_RANGE),
                    result: None,
                },
            );
            return;
        }

        debug!("{} --> GUESS_NUMBER_REQ {{\"guess\": {}}}", username, value);
        let (status, result) = match value.cmp(&inner.target) {
            std::cmp::Ordering::Less => ("TOO_LOW", -1),
            std::cmp::Ordering::Greater => ("TOO_HIGH", 1),
            std::cmp::Ordering::Equal => ("CORRECT", 0),
        };
        client.send(
            proto::GUESS_NUMBER_RESP,
            &proto::GuessResponse {
                status: status.into(),
                code: None,
                result: Some(result),
            },
        );

        if result == 0 {
            // Only the first correct guess is recorded.
            if !inner.times.contains_key(&username) {
                let elapsed = inner
                    .round_started
                    .map(|t| t.elapsed().as_millis() as u64)
                    .unwrap_or(0);
                inner.times.insert(username.clone(), elapsed);
                info!("{} guessed correctly after {} ms", username, elapsed);
            }
            if inner.times.len() == inner.participants.len() {
                self.finalize(&mut inner, FinalizeReason::AllGuessedCorrectly);
            }
        }
    }

    /// Publish the leaderboard and reset to idle. Cancels the round timer;
    /// the generation bump turns any already-fired timer into a no-op.
    fn finalize(&self, inner: &mut GameInner, reason: FinalizeReason) {
        inner.state = GameState::Finalizing;
        if let Some(timer) = inner.round_timer.take() {
            timer.abort();
        }

        let mut entries: Vec<(String, Option<u64>)> = inner
            .participants
            .iter()
            .map(|p| {
                let name = p.username().unwrap_or_default().to_string();
                let time = inner.times.get(&name).copied();
                (name, time)
            })
            .collect();
        sort_leaderboard(&mut entries);

        let mut results = Map::new();
        for (name, time) in &entries {
            let value = match time {
                Some(ms) => format!("{} ms", ms),
                None => proto::TIMED_OUT_SENTINEL.to_string(),
            };
            results.insert(name.clone(), serde_json::Value::String(value));
        }
        info!("game over ({:?}): {:?}", reason, results);

        for participant in &inner.participants {
            if reason == FinalizeReason::Timeout {
                participant.send(
                    proto::GAME_NOTIFICATION,
                    &GameNotification::error(codes::GAME_TIMEOUT_WAS_REACHED),
                );
            }
            participant.send(
                proto::GAME_RESULTS,
                &proto::GameResults {
                    status: "OK".into(),
                    results: results.clone(),
                },
            );
        }

        inner.participants.clear();
        inner.times.clear();
        inner.target = 0;
        inner.round_started = None;
        inner.state = GameState::Idle;
        inner.generation += 1;
    }
}

/// Order the leaderboard: finishers by ascending elapsed time, timed-out
/// participants after all finishers, ties broken by username.
fn sort_leaderboard(entries: &mut [(String, Option<u64>)]) {
    entries.sort_by(|a, b| {
        a.1.is_none()
            .cmp(&b.1.is_none())
            .then_with(|| a.1.unwrap_or(u64::MAX).cmp(&b.1.unwrap_or(u64::MAX)))
            .then_with(|| a.0.cmp(&b.0))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn fast_config() -> GameConfig {
        GameConfig {
            join_window_ms: 50,
            round_timeout_ms: 30_000,
            // Degenerate range makes the target deterministic for tests.
            lower_bound: 1,
            upper_bound: 1,
        }
    }

    struct Player {
        session: Arc<Session>,
        rx: UnboundedReceiver<String>,
    }

    async fn player(registry: &Arc<Registry>, id: u64, name: &str) -> Player {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new(id, "127.0.0.1:0".parse().unwrap(), tx);
        assert!(registry.try_add(name, &session).await);
        Player { session, rx }
    }

    fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    /// First line with the given header, parsed as JSON.
    fn find_body(lines: &[String], header: &str) -> Option<serde_json::Value> {
        lines.iter().find_map(|line| {
            let (h, body) = line.split_once(' ')?;
            (h == header).then(|| serde_json::from_str(body).unwrap())
        })
    }

    fn setup(config: GameConfig) -> (Arc<Registry>, Arc<GameOrchestrator>) {
        let registry = Arc::new(Registry::new());
        let game = Arc::new(GameOrchestrator::new(config, Arc::clone(&registry)));
        (registry, game)
    }

    async fn wait_for_state(game: &GameOrchestrator, want: GameState) {
        for _ in 0..100 {
            if game.state().await == want {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("game never reached {:?}", want);
    }

    #[tokio::test]
    async fn start_requires_login() {
        let (_registry, game) = setup(fast_config());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let anon = Session::new(9, "127.0.0.1:0".parse().unwrap(), tx);
        game.start(&anon).await;
        let lines = drain(&mut rx);
        let body = find_body(&lines, proto::GAME_NOTIFICATION).unwrap();
        assert_eq!(body["code"], 6000);
        assert_eq!(game.state().await, GameState::Idle);
    }

    #[tokio::test]
    async fn start_opens_join_window_and_invites_others() {
        let (registry, game) = setup(fast_config());
        let mut alice = player(&registry, 1, "alice").await;
        let mut bob = player(&registry, 2, "bob").await;

        game.start(&alice.session).await;
        assert_eq!(game.state().await, GameState::JoinWindow);

        let alice_lines = drain(&mut alice.rx);
        assert!(find_body(&alice_lines, proto::START_GAME_RESP).is_some());
        let bob_lines = drain(&mut bob.rx);
        let invite = find_body(&bob_lines, proto::GAME_NOTIFICATION).unwrap();
        assert_eq!(invite["status"], "OK");
    }

    #[tokio::test]
    async fn second_start_while_pending_is_rejected() {
        let (registry, game) = setup(fast_config());
        let alice = player(&registry, 1, "alice").await;
        let mut bob = player(&registry, 2, "bob").await;

        game.start(&alice.session).await;
        drain(&mut bob.rx);
        game.start(&bob.session).await;
        let lines = drain(&mut bob.rx);
        let body = find_body(&lines, proto::GAME_NOTIFICATION).unwrap();
        assert_eq!(body["code"], 6003);
    }

    #[tokio::test]
    async fn insufficient_players_cancels_back_to_idle() {
        let (registry, game) = setup(fast_config());
        let mut alice = player(&registry, 1, "alice").await;

        game.start(&alice.session).await;
        wait_for_state(&game, GameState::Idle).await;

        let lines = drain(&mut alice.rx);
        let cancel = lines
            .iter()
            .filter_map(|l| {
                let (h, b) = l.split_once(' ')?;
                (h == proto::GAME_NOTIFICATION)
                    .then(|| serde_json::from_str::<serde_json::Value>(b).unwrap())
            })
            .find(|v| v["code"] == 6002);
        assert!(cancel.is_some(), "initiator not told about cancellation");
    }

    #[tokio::test]
    async fn duplicate_join_is_rejected() {
        let (registry, game) = setup(fast_config());
        let alice = player(&registry, 1, "alice").await;
        let mut bob = player(&registry, 2, "bob").await;

        game.start(&alice.session).await;
        game.join(&bob.session).await;
        drain(&mut bob.rx);
        game.join(&bob.session).await;
        let lines = drain(&mut bob.rx);
        let body = find_body(&lines, proto::GAME_NOTIFICATION).unwrap();
        assert_eq!(body["code"], 6004);
    }

    #[tokio::test]
    async fn join_with_no_pending_game_is_rejected() {
        let (registry, game) = setup(fast_config());
        let mut bob = player(&registry, 2, "bob").await;
        game.join(&bob.session).await;
        let lines = drain(&mut bob.rx);
        let body = find_body(&lines, proto::GAME_NOTIFICATION).unwrap();
        assert_eq!(body["code"], 6005);
    }

    #[tokio::test]
    async fn join_after_round_started_is_rejected() {
        let (registry, game) = setup(fast_config());
        let alice = player(&registry, 1, "alice").await;
        let bob = player(&registry, 2, "bob").await;
        let mut carol = player(&registry, 3, "carol").await;

        game.start(&alice.session).await;
        game.join(&bob.session).await;
        wait_for_state(&game, GameState::Running).await;

        drain(&mut carol.rx);
        game.join(&carol.session).await;
        let lines = drain(&mut carol.rx);
        let body = find_body(&lines, proto::GAME_NOTIFICATION).unwrap();
        assert_eq!(body["code"], 6003);
    }

    #[tokio::test]
    async fn full_round_with_correct_guesses_publishes_ordered_results() {
        let (registry, game) = setup(fast_config());
        let mut alice = player(&registry, 1, "alice").await;
        let mut bob = player(&registry, 2, "bob").await;

        game.start(&alice.session).await;
        game.join(&bob.session).await;
        wait_for_state(&game, GameState::Running).await;

        // Range announcement reaches both participants.
        let alice_lines = drain(&mut alice.rx);
        let range = find_body(&alice_lines, proto::GAME_NOTIFICATION).unwrap();
        assert_eq!(range["status"], "OK");

        // Target is forced to 1 by the degenerate range.
        game.guess(&alice.session, 1).await;
        let lines = drain(&mut alice.rx);
        let resp = find_body(&lines, proto::GUESS_NUMBER_RESP).unwrap();
        assert_eq!(resp["status"], "CORRECT");
        assert_eq!(resp["result"], 0);

        game.guess(&bob.session, 1).await;
        wait_for_state(&game, GameState::Idle).await;

        let bob_lines = drain(&mut bob.rx);
        let results = find_body(&bob_lines, proto::GAME_RESULTS).unwrap();
        assert_eq!(results["status"], "OK");
        let board = results["results"].as_object().unwrap();
        assert_eq!(board.len(), 2);
        // Alice finished first; preserve_order keeps the published ranking.
        let order: Vec<&String> = board.keys().collect();
        assert_eq!(order[0], "alice");
        assert!(board["alice"].as_str().unwrap().ends_with(" ms"));
    }

    #[tokio::test]
    async fn guess_below_lower_bound_is_out_of_range() {
        let config = GameConfig {
            join_window_ms: 50,
            round_timeout_ms: 30_000,
            lower_bound: 5,
            upper_bound: 5,
        };
        let (registry, game) = setup(config);
        let mut alice = player(&registry, 1, "alice").await;
        let bob = player(&registry, 2, "bob").await;

        game.start(&alice.session).await;
        game.join(&bob.session).await;
        wait_for_state(&game, GameState::Running).await;
        drain(&mut alice.rx);

        game.guess(&alice.session, 5 - 1).await;
        // Out-of-range below: lower bound is 5, so 4 is OUT_OF_RANGE here.
        let lines = drain(&mut alice.rx);
        let resp = find_body(&lines, proto::GUESS_NUMBER_RESP).unwrap();
        assert_eq!(resp["status"], "OUT_OF_RANGE");
        assert_eq!(resp["code"], 7007);
    }

    #[tokio::test]
    async fn directional_responses_with_wider_range() {
        let config = GameConfig {
            join_window_ms: 50,
            round_timeout_ms: 30_000,
            lower_bound: 1,
            upper_bound: 50,
        };
        let (registry, game) = setup(config);
        let mut alice = player(&registry, 1, "alice").await;
        let bob = player(&registry, 2, "bob").await;

        game.start(&alice.session).await;
        game.join(&bob.session).await;
        wait_for_state(&game, GameState::Running).await;
        drain(&mut alice.rx);

        // 1 and 50 bracket every possible target; at least one of the two
        // must come back directional unless it is an exact hit.
        game.guess(&alice.session, 1).await;
        game.guess(&alice.session, 50).await;
        let lines = drain(&mut alice.rx);
        let responses: Vec<serde_json::Value> = lines
            .iter()
            .filter_map(|l| {
                let (h, b) = l.split_once(' ')?;
                (h == proto::GUESS_NUMBER_RESP).then(|| serde_json::from_str(b).unwrap())
            })
            .collect();
        assert_eq!(responses.len(), 2);
        for resp in &responses {
            let status = resp["status"].as_str().unwrap();
            match status {
                "TOO_LOW" => assert_eq!(resp["result"], -1),
                "TOO_HIGH" => assert_eq!(resp["result"], 1),
                "CORRECT" => assert_eq!(resp["result"], 0),
                other => panic!("unexpected status {}", other),
            }
        }
    }

    #[tokio::test]
    async fn guess_from_non_participant_is_rejected() {
        let (registry, game) = setup(fast_config());
        let alice = player(&registry, 1, "alice").await;
        let bob = player(&registry, 2, "bob").await;
        let mut carol = player(&registry, 3, "carol").await;

        game.start(&alice.session).await;
        game.join(&bob.session).await;
        wait_for_state(&game, GameState::Running).await;

        drain(&mut carol.rx);
        game.guess(&carol.session, 1).await;
        let lines = drain(&mut carol.rx);
        let body = find_body(&lines, proto::GAME_NOTIFICATION).unwrap();
        assert_eq!(body["code"], 6006);
    }

    #[tokio::test]
    async fn out_of_range_guess_does_not_affect_round_completion() {
        let (registry, game) = setup(fast_config());
        let mut alice = player(&registry, 1, "alice").await;
        let mut bob = player(&registry, 2, "bob").await;

        game.start(&alice.session).await;
        game.join(&bob.session).await;
        wait_for_state(&game, GameState::Running).await;
        drain(&mut alice.rx);

        game.guess(&alice.session, 99).await;
        let lines = drain(&mut alice.rx);
        let resp = find_body(&lines, proto::GUESS_NUMBER_RESP).unwrap();
        assert_eq!(resp["status"], "OUT_OF_RANGE");
        assert_eq!(game.state().await, GameState::Running);

        // Round still completes normally afterwards.
        game.guess(&alice.session, 1).await;
        game.guess(&bob.session, 1).await;
        wait_for_state(&game, GameState::Idle).await;
        let bob_lines = drain(&mut bob.rx);
        assert!(find_body(&bob_lines, proto::GAME_RESULTS).is_some());
    }

    #[tokio::test]
    async fn round_timeout_publishes_sentinel_for_silent_players() {
        let config = GameConfig {
            join_window_ms: 50,
            round_timeout_ms: 150,
            lower_bound: 1,
            upper_bound: 1,
        };
        let (registry, game) = setup(config);
        let mut alice = player(&registry, 1, "alice").await;
        let mut bob = player(&registry, 2, "bob").await;

        game.start(&alice.session).await;
        game.join(&bob.session).await;
        wait_for_state(&game, GameState::Running).await;
        drain(&mut alice.rx);
        drain(&mut bob.rx);

        game.guess(&alice.session, 1).await;
        // Bob never guesses; round timer must finalize the game.
        wait_for_state(&game, GameState::Idle).await;

        let bob_lines = drain(&mut bob.rx);
        let timeout_note = find_body(&bob_lines, proto::GAME_NOTIFICATION).unwrap();
        assert_eq!(timeout_note["code"], 9000);
        let results = find_body(&bob_lines, proto::GAME_RESULTS).unwrap();
        let board = results["results"].as_object().unwrap();
        assert!(board["alice"].as_str().unwrap().ends_with(" ms"));
        assert_eq!(board["bob"], proto::TIMED_OUT_SENTINEL);
        // Finisher ranks above the timed-out participant.
        assert_eq!(board.keys().next().unwrap(), "alice");
    }

    #[tokio::test]
    async fn stale_join_window_timer_is_a_no_op() {
        let (registry, game) = setup(fast_config());
        let alice = player(&registry, 1, "alice").await;
        let bob = player(&registry, 2, "bob").await;

        game.start(&alice.session).await;
        let stale_generation = game.generation().await;
        game.join(&bob.session).await;
        wait_for_state(&game, GameState::Running).await;

        // Re-fire the join-window expiry with the old generation.
        game.join_window_elapsed(stale_generation).await;
        assert_eq!(game.state().await, GameState::Running);
    }

    #[tokio::test]
    async fn stale_round_timer_is_a_no_op() {
        let (registry, game) = setup(fast_config());
        let alice = player(&registry, 1, "alice").await;
        let bob = player(&registry, 2, "bob").await;

        game.start(&alice.session).await;
        game.join(&bob.session).await;
        wait_for_state(&game, GameState::Running).await;
        let stale_generation = game.generation().await;

        game.guess(&alice.session, 1).await;
        game.guess(&bob.session, 1).await;
        wait_for_state(&game, GameState::Idle).await;

        Arc::clone(&game).round_timer_elapsed(stale_generation).await;
        assert_eq!(game.state().await, GameState::Idle);
    }

    #[test]
    fn leaderboard_sorting() {
        let mut entries = vec![
            ("carol".to_string(), None),
            ("bob".to_string(), Some(1200)),
            ("dave".to_string(), None),
            ("alice".to_string(), Some(300)),
            ("erin".to_string(), Some(1200)),
        ];
        sort_leaderboard(&mut entries);
        let order: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
        // Finishers by time (tie on 1200 broken by name), timed out last by name.
        assert_eq!(order, vec!["alice", "bob", "erin", "carol", "dave"]);
    }
}
