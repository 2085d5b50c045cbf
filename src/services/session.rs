//! Poll scheduler and command loop for one viewed game.
//!
//! A single task owns the [`MatchState`]. Timers, user commands and network
//! results are multiplexed onto that task, and network calls run in spawned
//! tasks that post their results back tagged with the epoch they were issued
//! under. Nothing outside the task can touch the state.

use std::{collections::HashSet, future::Future, sync::Arc, time::Duration};

use tokio::{
    sync::{broadcast, mpsc, watch},
    task::JoinHandle,
    time::{Instant, Interval, MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::{
    api::{ApiError, ApiResult, GameAuthority, TerminalAction},
    config::ClientConfig,
    dto::{ClockSnapshot, GameDetails, GameId, MoveItem, UserId},
    error::SessionError,
    rules::{RulesEngine, Square},
    services::watchdog::TimeoutWatchdog,
    state::{Concern, DetailsMerge, GameEnded, MatchState, MatchView, MoveId, RequestEpoch, Submission},
};

const COMMAND_CAPACITY: usize = 16;
const EVENT_CAPACITY: usize = 4;

/// User commands accepted by a running session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Click on a board square.
    Click(Square),
    /// Play a move given by its squares.
    Move {
        /// Origin square.
        from: Square,
        /// Destination square.
        to: Square,
    },
    /// Resign or negotiate a draw.
    Action(TerminalAction),
    /// Stop polling and end the session.
    Shutdown,
}

/// Network results posted back to the session task.
enum Fetched {
    Details {
        epoch: RequestEpoch,
        forced: bool,
        result: ApiResult<GameDetails>,
    },
    Clock {
        epoch: RequestEpoch,
        result: ApiResult<ClockSnapshot>,
    },
    Moves {
        epoch: RequestEpoch,
        result: ApiResult<Vec<MoveItem>>,
    },
    Submitted {
        id: MoveId,
        result: ApiResult<()>,
    },
    Action {
        action: TerminalAction,
        result: ApiResult<()>,
    },
}

/// Handle to a running match session.
///
/// Dropping the handle stops the session; viewing another game means spawning
/// a new one.
pub struct SessionHandle {
    game_id: GameId,
    commands: mpsc::Sender<SessionCommand>,
    view: watch::Receiver<MatchView>,
    events: broadcast::Sender<GameEnded>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// Start polling `game_id` on behalf of `local_user`.
    pub fn spawn(
        config: &ClientConfig,
        game_id: GameId,
        local_user: Option<UserId>,
        authority: Arc<dyn GameAuthority>,
        position: Box<dyn RulesEngine>,
    ) -> Self {
        let now = Instant::now();
        let state = MatchState::new(game_id, local_user, position, now);
        let (view_tx, view_rx) = watch::channel(state.view(now));
        let (events_tx, _events_rx) = broadcast::channel(EVENT_CAPACITY);
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        let session = SessionLoop {
            state,
            authority,
            config: config.clone(),
            results: results_tx,
            view: view_tx,
            events: events_tx.clone(),
            watchdog: TimeoutWatchdog::new(config.watchdog_cooldown),
            halted: HashSet::new(),
            bootstrapped: false,
        };
        let task = tokio::spawn(session.run(command_rx, results_rx));
        info!(game_id, ?local_user, "match session started");

        Self {
            game_id,
            commands: command_tx,
            view: view_rx,
            events: events_tx,
            task,
        }
    }

    /// Game polled by this session.
    pub fn game_id(&self) -> GameId {
        self.game_id
    }

    /// Receiver notified whenever the rendered view changes.
    pub fn view(&self) -> watch::Receiver<MatchView> {
        self.view.clone()
    }

    /// Latest rendered view.
    pub fn current(&self) -> MatchView {
        self.view.borrow().clone()
    }

    /// Subscribe to end-of-game signals.
    pub fn subscribe(&self) -> broadcast::Receiver<GameEnded> {
        self.events.subscribe()
    }

    /// Queue a command for the session task.
    pub async fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Stop the session and wait for its task to finish.
    pub async fn shutdown(self) {
        let _ = self.commands.send(SessionCommand::Shutdown).await;
        if let Err(err) = self.task.await {
            warn!(game_id = self.game_id, error = %err, "match session task failed");
        }
    }
}

struct SessionLoop {
    state: MatchState,
    authority: Arc<dyn GameAuthority>,
    config: ClientConfig,
    results: mpsc::UnboundedSender<Fetched>,
    view: watch::Sender<MatchView>,
    events: broadcast::Sender<GameEnded>,
    watchdog: TimeoutWatchdog,
    halted: HashSet<Concern>,
    bootstrapped: bool,
}

fn ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

impl SessionLoop {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<SessionCommand>,
        mut results: mpsc::UnboundedReceiver<Fetched>,
    ) {
        let mut fast = ticker(self.config.fast_tick);
        let mut details = ticker(self.config.details_poll);
        let mut moves = ticker(self.config.moves_poll);
        let mut watchdog = ticker(self.config.watchdog_tick);

        loop {
            tokio::select! {
                _ = fast.tick() => self.publish(),
                _ = details.tick() => {
                    self.fetch_details(false);
                    self.fetch_clock();
                }
                _ = moves.tick() => self.fetch_moves(),
                _ = watchdog.tick() => self.check_watchdog(),
                command = commands.recv() => match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => {
                        self.handle_command(command);
                        self.publish();
                    }
                },
                Some(fetched) = results.recv() => {
                    self.handle_fetched(fetched);
                    self.publish();
                }
            }
        }

        info!(game_id = self.state.game_id(), "match session stopped");
    }

    fn publish(&self) {
        let next = self.state.view(Instant::now());
        self.view.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    fn spawn<F>(&self, work: F)
    where
        F: Future<Output = Fetched> + Send + 'static,
    {
        let results = self.results.clone();
        tokio::spawn(async move {
            // The session may have stopped meanwhile; the result is then moot.
            let _ = results.send(work.await);
        });
    }

    fn fetch_details(&mut self, forced: bool) {
        if self.halted.contains(&Concern::Details) {
            return;
        }
        let epoch = self.state.issue_epoch();
        let request = self.authority.details(self.state.game_id());
        self.spawn(async move {
            Fetched::Details {
                epoch,
                forced,
                result: request.await,
            }
        });
    }

    fn fetch_clock(&mut self) {
        if self.halted.contains(&Concern::Clock) {
            return;
        }
        let epoch = self.state.issue_epoch();
        let request = self.authority.clock(self.state.game_id());
        self.spawn(async move {
            Fetched::Clock {
                epoch,
                result: request.await,
            }
        });
    }

    fn fetch_moves(&mut self) {
        // The move list is only meaningful once the game itself is known.
        if self.halted.contains(&Concern::Moves) || self.state.merger().session().is_none() {
            return;
        }
        let epoch = self.state.issue_epoch();
        let request = self.authority.moves(self.state.game_id());
        self.spawn(async move {
            Fetched::Moves {
                epoch,
                result: request.await,
            }
        });
    }

    fn check_watchdog(&mut self) {
        if self.halted.contains(&Concern::Details) {
            return;
        }
        let now = Instant::now();
        let flag_down = self.state.flag_down(now);
        if self.watchdog.check(flag_down, now) {
            self.fetch_details(true);
        }
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Click(square) => {
                if let Some(submission) = self.state.click(square) {
                    self.submit(submission);
                }
            }
            SessionCommand::Move { from, to } => {
                if let Some(submission) = self.state.choose(from, to) {
                    self.submit(submission);
                }
            }
            SessionCommand::Action(action) => {
                if self.state.allow_action(action) {
                    debug!(game_id = self.state.game_id(), action = action.path(), "sending action");
                    let request = self.authority.perform(self.state.game_id(), action);
                    self.spawn(async move {
                        Fetched::Action {
                            action,
                            result: request.await,
                        }
                    });
                }
            }
            SessionCommand::Shutdown => {}
        }
    }

    fn submit(&self, submission: Submission) {
        let Submission { id, request } = submission;
        let request = self.authority.submit_move(self.state.game_id(), request);
        self.spawn(async move {
            Fetched::Submitted {
                id,
                result: request.await,
            }
        });
    }

    fn handle_fetched(&mut self, fetched: Fetched) {
        let now = Instant::now();
        match fetched {
            Fetched::Details {
                epoch,
                forced,
                result,
            } => {
                if forced {
                    self.watchdog.settled(now);
                }
                match result {
                    Ok(details) => self.merge_details(epoch, &details, now),
                    Err(err) => self.fetch_failed(Concern::Details, &err),
                }
            }
            Fetched::Clock { epoch, result } => match result {
                Ok(clock) => {
                    self.state.on_clock_only(epoch, &clock, now);
                }
                Err(err) => self.fetch_failed(Concern::Clock, &err),
            },
            Fetched::Moves { epoch, result } => match result {
                Ok(moves) => {
                    self.state.on_moves(epoch, moves);
                }
                Err(err) => self.fetch_failed(Concern::Moves, &err),
            },
            Fetched::Submitted { id, result } => {
                if self.state.on_submitted(id, result.as_ref().map(|_| ())) {
                    self.fetch_moves();
                    self.fetch_details(false);
                }
            }
            Fetched::Action { action, result } => match result {
                Ok(()) => {
                    info!(
                        game_id = self.state.game_id(),
                        action = action.path(),
                        "action accepted"
                    );
                    self.fetch_details(false);
                }
                Err(err) => self.state.on_action_failed(action, &err),
            },
        }
    }

    fn merge_details(&mut self, epoch: RequestEpoch, details: &GameDetails, now: Instant) {
        if let DetailsMerge::Merged { ended } = self.state.on_details(epoch, details, now) {
            if let Some(ended) = ended {
                // No subscriber is not an error; the view carries the status too.
                let _ = self.events.send(ended);
            }
            if !self.bootstrapped {
                self.bootstrapped = true;
                self.fetch_moves();
            }
        }
    }

    fn fetch_failed(&mut self, concern: Concern, err: &ApiError) {
        if err.is_forbidden() {
            if self.halted.insert(concern) {
                self.state.on_forbidden(concern);
            }
            return;
        }
        warn!(
            game_id = self.state.game_id(),
            ?concern,
            error = %err,
            "fetch failed; retrying on the next tick"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use futures::future::BoxFuture;
    use reqwest::StatusCode;
    use tokio::{sync::broadcast::error::TryRecvError, time::sleep};

    use super::*;
    use crate::{
        dto::{LifecycleStatus, PostMoveRequest},
        rules::BitboardEngine,
    };

    const START: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

    #[derive(Clone)]
    enum Reply<T> {
        Ok(T),
        Forbidden,
        Rejected(&'static str),
    }

    impl<T: Clone> Reply<T> {
        fn result(&self, path: &str) -> ApiResult<T> {
            match self {
                Reply::Ok(value) => Ok(value.clone()),
                Reply::Forbidden => Err(ApiError::Forbidden { path: path.into() }),
                Reply::Rejected(message) => Err(ApiError::Status {
                    path: path.into(),
                    status: StatusCode::BAD_REQUEST,
                    message: Some((*message).into()),
                }),
            }
        }
    }

    #[derive(Default)]
    struct Calls {
        details: AtomicUsize,
        clock: AtomicUsize,
        moves: AtomicUsize,
        submits: AtomicUsize,
        actions: AtomicUsize,
    }

    struct FakeAuthority {
        details: Mutex<Reply<GameDetails>>,
        details_delay: Mutex<Duration>,
        clock: Mutex<Reply<ClockSnapshot>>,
        moves: Mutex<Reply<Vec<MoveItem>>>,
        submit: Mutex<Reply<()>>,
        calls: Calls,
    }

    impl FakeAuthority {
        fn new(details: Reply<GameDetails>) -> Arc<Self> {
            Arc::new(Self {
                details: Mutex::new(details),
                details_delay: Mutex::new(Duration::ZERO),
                clock: Mutex::new(Reply::Rejected("clock unavailable")),
                moves: Mutex::new(Reply::Ok(Vec::new())),
                submit: Mutex::new(Reply::Ok(())),
                calls: Calls::default(),
            })
        }

        fn count(counter: &AtomicUsize) -> usize {
            counter.load(Ordering::SeqCst)
        }
    }

    fn answer<T: Send + 'static>(result: ApiResult<T>) -> BoxFuture<'static, ApiResult<T>> {
        Box::pin(std::future::ready(result))
    }

    impl GameAuthority for FakeAuthority {
        fn details(&self, _game: GameId) -> BoxFuture<'static, ApiResult<GameDetails>> {
            self.calls.details.fetch_add(1, Ordering::SeqCst);
            let delay = *self.details_delay.lock().unwrap();
            let result = self.details.lock().unwrap().result("details");
            if delay.is_zero() {
                return answer(result);
            }
            Box::pin(async move {
                sleep(delay).await;
                result
            })
        }

        fn clock(&self, _game: GameId) -> BoxFuture<'static, ApiResult<ClockSnapshot>> {
            self.calls.clock.fetch_add(1, Ordering::SeqCst);
            answer(self.clock.lock().unwrap().result("clock"))
        }

        fn moves(&self, _game: GameId) -> BoxFuture<'static, ApiResult<Vec<MoveItem>>> {
            self.calls.moves.fetch_add(1, Ordering::SeqCst);
            answer(self.moves.lock().unwrap().result("moves"))
        }

        fn submit_move(
            &self,
            _game: GameId,
            _body: PostMoveRequest,
        ) -> BoxFuture<'static, ApiResult<()>> {
            self.calls.submits.fetch_add(1, Ordering::SeqCst);
            answer(self.submit.lock().unwrap().result("move"))
        }

        fn perform(&self, _game: GameId, action: TerminalAction) -> BoxFuture<'static, ApiResult<()>> {
            self.calls.actions.fetch_add(1, Ordering::SeqCst);
            answer(Reply::Ok(()).result(action.path()))
        }
    }

    fn details(status: &str, white_ms: i64) -> GameDetails {
        serde_json::from_str(&format!(
            r#"{{"id":7,"whiteId":10,"blackId":20,"status":"{status}","whiteMs":{white_ms},
                "blackMs":60000,"running":true,"nextToMove":"WHITE"}}"#
        ))
        .unwrap()
    }

    fn spawn(authority: &Arc<FakeAuthority>) -> SessionHandle {
        SessionHandle::spawn(
            &ClientConfig::default(),
            7,
            Some(10),
            authority.clone(),
            Box::new(BitboardEngine::new()),
        )
    }

    fn sq(name: &str) -> Square {
        name.parse().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn moves_before_the_game_starts_never_reach_the_authority() {
        let authority = FakeAuthority::new(Reply::Ok(details("CREATED", 60_000)));
        let handle = spawn(&authority);
        sleep(Duration::from_millis(50)).await;

        handle
            .send(SessionCommand::Move {
                from: sq("e2"),
                to: sq("e4"),
            })
            .await
            .unwrap();
        sleep(Duration::from_millis(200)).await;

        assert_eq!(FakeAuthority::count(&authority.calls.submits), 0);
        assert_eq!(
            handle.current().info.as_deref(),
            Some("The game is not in progress.")
        );
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn a_finished_game_is_announced_exactly_once() {
        let authority = FakeAuthority::new(Reply::Ok(details("TIMEOUT", 0)));
        let handle = spawn(&authority);
        let mut events = handle.subscribe();

        sleep(Duration::from_millis(3_500)).await;
        assert!(FakeAuthority::count(&authority.calls.details) >= 3);

        let ended = events.try_recv().unwrap();
        assert_eq!(ended.status, LifecycleStatus::Timeout);
        assert_eq!(ended.reason, "Time expired");
        assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(handle.current().end_reason.as_deref(), Some("Time expired"));
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn forbidden_details_stop_details_polling_only() {
        let authority = FakeAuthority::new(Reply::Forbidden);
        let handle = spawn(&authority);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(FakeAuthority::count(&authority.calls.details), 1);
        assert!(FakeAuthority::count(&authority.calls.clock) > 1);
        assert_eq!(
            handle.current().error.as_deref(),
            Some("You do not have access to this game.")
        );
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn forbidden_moves_are_reported_and_not_retried() {
        let authority = FakeAuthority::new(Reply::Ok(details("ONGOING", 60_000)));
        *authority.moves.lock().unwrap() = Reply::Forbidden;
        let handle = spawn(&authority);

        sleep(Duration::from_millis(500)).await;
        let refused = FakeAuthority::count(&authority.calls.moves);
        assert!(refused >= 1);

        sleep(Duration::from_secs(5)).await;
        assert_eq!(FakeAuthority::count(&authority.calls.moves), refused);
        assert!(FakeAuthority::count(&authority.calls.details) > 1);
        assert_eq!(
            handle.current().error.as_deref(),
            Some("You are not permitted to view the moves of this game.")
        );
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn a_rejected_move_rolls_back() {
        let authority = FakeAuthority::new(Reply::Ok(details("ONGOING", 60_000)));
        *authority.submit.lock().unwrap() = Reply::Rejected("stale position");
        let handle = spawn(&authority);
        sleep(Duration::from_millis(50)).await;

        handle
            .send(SessionCommand::Move {
                from: sq("e2"),
                to: sq("e4"),
            })
            .await
            .unwrap();
        sleep(Duration::from_millis(50)).await;

        let view = handle.current();
        assert_eq!(FakeAuthority::count(&authority.calls.submits), 1);
        assert_eq!(view.fen, START);
        assert!(!view.submitting);
        assert_eq!(view.error.as_deref(), Some("stale position"));
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn an_accepted_move_refreshes_moves_and_details() {
        let authority = FakeAuthority::new(Reply::Ok(details("ONGOING", 60_000)));
        let handle = spawn(&authority);
        sleep(Duration::from_millis(50)).await;
        let moves_before = FakeAuthority::count(&authority.calls.moves);
        let details_before = FakeAuthority::count(&authority.calls.details);

        handle.send(SessionCommand::Click(sq("e2"))).await.unwrap();
        handle.send(SessionCommand::Click(sq("e4"))).await.unwrap();
        sleep(Duration::from_millis(50)).await;

        assert_eq!(FakeAuthority::count(&authority.calls.submits), 1);
        assert!(FakeAuthority::count(&authority.calls.moves) > moves_before);
        assert!(FakeAuthority::count(&authority.calls.details) > details_before);
        assert_eq!(handle.current().info.as_deref(), Some("Move sent."));
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn a_fallen_flag_forces_a_single_refresh() {
        let authority = FakeAuthority::new(Reply::Ok(details("ONGOING", 450)));
        let handle = spawn(&authority);

        // One regular poll at start plus one forced refresh once white hits zero.
        sleep(Duration::from_millis(950)).await;
        assert_eq!(FakeAuthority::count(&authority.calls.details), 2);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn a_slow_details_response_still_hands_the_clock_to_the_next_side() {
        let authority = FakeAuthority::new(Reply::Ok(details("ONGOING", 60_000)));
        *authority.clock.lock().unwrap() = Reply::Ok(ClockSnapshot {
            white_ms: Some(59_000),
            black_ms: Some(60_000),
            running: Some(true),
            status: None,
        });
        let handle = spawn(&authority);
        sleep(Duration::from_millis(50)).await;
        assert!(handle.current().white.to_move);

        // White has moved; the next details poll answers after the clock poll.
        let black_to_move: GameDetails = serde_json::from_str(
            r#"{"id":7,"whiteId":10,"blackId":20,"status":"ONGOING","whiteMs":59500,
                "blackMs":60000,"running":true,"nextToMove":"BLACK"}"#,
        )
        .unwrap();
        *authority.details.lock().unwrap() = Reply::Ok(black_to_move);
        *authority.details_delay.lock().unwrap() = Duration::from_millis(300);

        sleep(Duration::from_millis(1_750)).await;
        let view = handle.current();
        assert!(view.black.to_move);
        assert!(!view.white.to_move);
        assert_eq!(view.white.remaining_ms, 59_000);
        assert!(view.black.remaining_ms < 60_000);
        assert!(view.black.remaining_ms >= 59_200);
        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn draw_answers_without_an_offer_are_refused_locally() {
        let authority = FakeAuthority::new(Reply::Ok(details("ONGOING", 60_000)));
        let handle = spawn(&authority);
        sleep(Duration::from_millis(50)).await;

        handle
            .send(SessionCommand::Action(TerminalAction::AcceptDraw))
            .await
            .unwrap();
        handle
            .send(SessionCommand::Action(TerminalAction::Resign))
            .await
            .unwrap();
        sleep(Duration::from_millis(50)).await;

        assert_eq!(FakeAuthority::count(&authority.calls.actions), 1);
        handle.shutdown().await;
    }
}
