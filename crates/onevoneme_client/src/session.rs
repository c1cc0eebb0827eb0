//! Session runtime.
//!
//! One tokio task per session owns the state machine, the poll schedule,
//! the in-flight poll, the in-flight submission (with its retry backoff)
//! and the teardown deadline. Nothing else holds a timer for the session,
//! so when the task exits every timer goes with it.

use crate::api::GameApi;
use crate::config::ClientConfig;
use crate::error::{ClientError, ClientErrorKind};
use crate::machine::{
    IgnoreReason, Observation, Phase, PlayerMove, PollingMode, SessionEvent, SessionMachine,
    TeardownReason,
};
use crate::poller::{fetch_observation, PollSchedule};
use crate::submitter::MoveSubmitter;
use crate::view::SessionView;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, instrument, Instrument};

/// Result of a submission request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The server accepted the move.
    Accepted,
    /// A local precondition failed; nothing was sent.
    Ignored(IgnoreReason),
}

/// What a finished session task reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    /// Phase when the task exited.
    pub final_phase: Phase,
    /// True when no poll, submission or deadline was left scheduled.
    pub timers_cleared: bool,
    /// Polls the task issued.
    pub polls_issued: u64,
}

#[derive(Debug)]
enum Command {
    Submit {
        mv: PlayerMove,
        reply: oneshot::Sender<Result<SubmitOutcome, ClientError>>,
    },
    View {
        reply: oneshot::Sender<SessionView>,
    },
    Shutdown,
}

/// Owner's handle to a running session.
///
/// Dropping the handle aborts the task.
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<Command>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    task: Option<JoinHandle<SessionSummary>>,
}

impl SessionHandle {
    /// Spawns the session task for an already matched `machine`.
    #[instrument(skip_all, fields(username = %machine.identity(), phase = %machine.phase()))]
    pub fn spawn(api: Arc<dyn GameApi>, config: &ClientConfig, machine: SessionMachine) -> Self {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let span = tracing::info_span!("session", username = %machine.identity());
        let _ = event_tx.send(SessionEvent::ViewUpdated(machine.view()));

        let runtime = Runtime {
            submitter: MoveSubmitter::new(api.clone(), config.clone()),
            api,
            schedule: PollSchedule::new(config),
            teardown_delay: config.teardown_delay(),
            gone_grace: config.gone_grace(),
            machine,
            events: event_tx,
            next_seq: 1,
            polls_issued: 0,
            resolved_deadline: None,
            gone_deadline: None,
        };
        let task = tokio::spawn(runtime.run(command_rx).instrument(span));
        Self {
            commands: command_tx,
            events: event_rx,
            task: Some(task),
        }
    }

    /// Submits a move and waits for the server's answer.
    ///
    /// Local precondition failures come back as
    /// `Ok(SubmitOutcome::Ignored(_))` without any request being made.
    #[instrument(skip(self))]
    pub async fn submit(&self, mv: PlayerMove) -> Result<SubmitOutcome, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Submit { mv, reply })
            .map_err(|_| closed())?;
        rx.await.map_err(|_| closed())?
    }

    /// Current render-ready state.
    pub async fn view(&self) -> Result<SessionView, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::View { reply })
            .map_err(|_| closed())?;
        rx.await.map_err(|_| closed())
    }

    /// Next event. `None` once the session has ended and all events were read.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    /// Tears the session down and waits for the task to exit.
    #[instrument(skip(self))]
    pub async fn shutdown(mut self) -> Result<SessionSummary, ClientError> {
        let _ = self.commands.send(Command::Shutdown);
        self.join_task().await
    }

    /// Waits for the session to end on its own (teardown).
    pub async fn join(mut self) -> Result<SessionSummary, ClientError> {
        self.join_task().await
    }

    async fn join_task(&mut self) -> Result<SessionSummary, ClientError> {
        let task = self.task.take().ok_or_else(closed)?;
        task.await.map_err(|_| closed())
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[track_caller]
fn closed() -> ClientError {
    ClientError::new(ClientErrorKind::SessionClosed)
}

/// Awaits the future in `slot`, or never resolves if there is none.
async fn in_flight<F: Future + Unpin>(slot: &mut Option<F>) -> F::Output {
    match slot.as_mut() {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn at(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

type PollFuture = BoxFuture<'static, (u64, Observation)>;
type SubmitFuture = BoxFuture<'static, Result<(), ClientError>>;

struct Runtime {
    api: Arc<dyn GameApi>,
    submitter: MoveSubmitter,
    machine: SessionMachine,
    schedule: PollSchedule,
    events: mpsc::UnboundedSender<SessionEvent>,
    teardown_delay: Duration,
    gone_grace: Duration,
    next_seq: u64,
    polls_issued: u64,
    resolved_deadline: Option<Instant>,
    gone_deadline: Option<Instant>,
}

impl Runtime {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) -> SessionSummary {
        let mut poll: Option<PollFuture> = None;
        let mut submission: Option<SubmitFuture> = None;
        let mut reply: Option<oneshot::Sender<Result<SubmitOutcome, ClientError>>> = None;
        info!(phase = %self.machine.phase(), "Session started");
        self.after_transition(Instant::now(), &mut poll);

        while self.machine.phase() != Phase::TornDown {
            let poll_at = if poll.is_none() {
                self.schedule.next_at()
            } else {
                None
            };
            let teardown_at = self.teardown_at();

            tokio::select! {
                command = commands.recv() => match command {
                    None | Some(Command::Shutdown) => {
                        let events = self.machine.tear_down(TeardownReason::Shutdown);
                        self.emit(events);
                    }
                    Some(Command::View { reply: view_reply }) => {
                        let _ = view_reply.send(self.machine.view());
                    }
                    Some(Command::Submit { mv, reply: submit_reply }) => {
                        match self.machine.begin_submission(mv) {
                            Err(reason) => {
                                debug!(%mv, %reason, "Submission ignored");
                                let _ = submit_reply.send(Ok(SubmitOutcome::Ignored(reason)));
                            }
                            Ok(events) => {
                                self.emit(events);
                                submission = Some(self.start_submission(mv));
                                reply = Some(submit_reply);
                                self.after_transition(Instant::now(), &mut poll);
                            }
                        }
                    }
                },
                (seq, observation) = in_flight(&mut poll), if poll.is_some() => {
                    poll = None;
                    let now = Instant::now();
                    self.schedule.after_poll(now);
                    let events = self.machine.apply(seq, observation);
                    self.emit(events);
                    self.after_transition(now, &mut poll);
                }
                result = in_flight(&mut submission), if submission.is_some() => {
                    submission = None;
                    let now = Instant::now();
                    let accepted = result.is_ok();
                    let events = self.machine.finish_submission(result.clone(), self.next_seq);
                    if let Some(submit_reply) = reply.take() {
                        let _ = submit_reply.send(result.map(|()| SubmitOutcome::Accepted));
                    }
                    self.emit(events);
                    if accepted {
                        self.schedule.request_burst(now);
                    }
                    self.after_transition(now, &mut poll);
                }
                _ = at(poll_at), if poll_at.is_some() => {
                    poll = self.start_poll();
                    if poll.is_some() {
                        self.schedule.poll_started();
                    } else {
                        self.schedule.suspend();
                    }
                }
                _ = at(teardown_at), if teardown_at.is_some() => {
                    let reason = match (self.gone_deadline, self.resolved_deadline) {
                        (Some(gone), Some(resolved)) if resolved < gone => TeardownReason::Elapsed,
                        (Some(_), _) => self.machine.gone().unwrap_or(TeardownReason::Gone),
                        (None, _) => TeardownReason::Elapsed,
                    };
                    let events = self.machine.tear_down(reason);
                    self.emit(events);
                }
            }
        }

        drop(poll);
        drop(submission);
        drop(reply);
        self.schedule.suspend();
        self.resolved_deadline = None;
        self.gone_deadline = None;
        let summary = SessionSummary {
            final_phase: self.machine.phase(),
            timers_cleared: !self.schedule.is_active() && self.teardown_at().is_none(),
            polls_issued: self.polls_issued,
        };
        info!(?summary, "Session ended");
        summary
    }

    fn teardown_at(&self) -> Option<Instant> {
        match (self.resolved_deadline, self.gone_deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    fn emit(&self, events: Vec<SessionEvent>) {
        for event in events {
            let _ = self.events.send(event);
        }
    }

    /// Brings timers in line with the machine after any input.
    fn after_transition(&mut self, now: Instant, poll: &mut Option<PollFuture>) {
        match self.machine.polling_mode() {
            PollingMode::On => self.schedule.resume(now),
            PollingMode::Off => {
                if self.schedule.is_active() || poll.is_some() {
                    debug!(phase = %self.machine.phase(), "Polling suspended");
                }
                self.schedule.suspend();
                *poll = None;
            }
        }
        if self.machine.phase() == Phase::Resolved && self.resolved_deadline.is_none() {
            self.resolved_deadline = Some(now + self.teardown_delay);
        }
        if self.machine.gone().is_some() && self.gone_deadline.is_none() {
            self.gone_deadline = Some(now + self.gone_grace);
        }
    }

    fn start_poll(&mut self) -> Option<PollFuture> {
        let target = self.machine.poll_target()?;
        let game = self.machine.assignment()?.game_type();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.polls_issued += 1;
        debug!(seq, ?target, "Polling");
        let api = self.api.clone();
        Some(Box::pin(async move {
            let observation = fetch_observation(api.as_ref(), &target, game).await;
            (seq, observation)
        }))
    }

    fn start_submission(&self, mv: PlayerMove) -> SubmitFuture {
        let submitter = self.submitter.clone();
        let username = self.machine.identity().username().to_string();
        let game_id = self
            .machine
            .assignment()
            .map(|a| a.game_id().to_string())
            .unwrap_or_default();
        Box::pin(async move { submitter.submit(&game_id, &username, mv).await })
    }
}
