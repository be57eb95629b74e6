use crate::bot::BotState;
use chrono::{DateTime, Utc};
use quantor_book::snapshot::MarketSnapshot;
use quantor_execution::order::id::BotId;
use quantor_strategy::{
    error::StrategyError,
    signal::Signal,
    state::StrategyState,
    strategy::Strategy,
};
use std::{panic::AssertUnwindSafe, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::Instant,
};
use tracing::{error, info, warn};

/// Operator commands delivered to one supervisor.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SupervisorCommand {
    Pause,
    Resume,
    /// Force the bot into `Erroring` after a persistent downstream failure.
    Fail,
    Stop,
}

/// Everything a supervisor reports upward. Supervisors hold the orchestrator's inbox handle,
/// never the orchestrator itself.
#[derive(Debug, Clone, PartialEq)]
pub enum SupervisorOutput {
    /// A strategy signal awaiting risk approval and routing.
    Signal(Signal),
    StateChanged {
        bot: BotId,
        from: BotState,
        to: BotState,
    },
    /// Request to cancel the bot's resting orders and journal a final portfolio snapshot.
    Quiesce { bot: BotId },
}

/// Handle held by the orchestrator for one running supervisor.
#[derive(Debug)]
pub struct SupervisorHandle {
    pub bot: BotId,
    commands: mpsc::Sender<SupervisorCommand>,
    state: watch::Receiver<BotState>,
    pub join: JoinHandle<()>,
}

impl SupervisorHandle {
    pub fn current_state(&self) -> BotState {
        *self.state.borrow()
    }

    /// Watch receiver for awaiting state transitions.
    pub fn state_watch(&self) -> watch::Receiver<BotState> {
        self.state.clone()
    }

    pub async fn command(&self, command: SupervisorCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }
}

/// One supervisor per bot: owns the strategy instance and its persistent state, the cadence
/// timer, and the bounded (coalescing) snapshot inbox.
///
/// The cadence deadline is `max(last_eval + interval, now)`; an early snapshot never advances
/// it, but the strategy always sees the freshest snapshot because the inbox is a `watch`.
#[derive(Debug)]
pub struct BotSupervisor {
    bot: BotId,
    strategy: Box<dyn Strategy>,
    strategy_state: StrategyState,
    bot_state: BotState,
    interval: Duration,
    max_staleness: Duration,
    snapshots: Vec<watch::Receiver<MarketSnapshot>>,
    commands: mpsc::Receiver<SupervisorCommand>,
    outbox: mpsc::Sender<SupervisorOutput>,
    state_tx: watch::Sender<BotState>,
    /// Signals dropped because the risk inbox was full.
    signals_rejected: u64,
}

impl BotSupervisor {
    /// Spawn a supervisor for a bot that already passed the orchestrator's health checks. The
    /// bot starts evaluating immediately (`Idle → Running`).
    pub fn spawn(
        bot: BotId,
        strategy: Box<dyn Strategy>,
        interval: Duration,
        max_staleness: Duration,
        snapshots: Vec<watch::Receiver<MarketSnapshot>>,
        outbox: mpsc::Sender<SupervisorOutput>,
    ) -> SupervisorHandle {
        let (commands_tx, commands_rx) = mpsc::channel(16);
        let (state_tx, state_rx) = watch::channel(BotState::Idle);

        let strategy_state = strategy.initial_state();
        let supervisor = Self {
            bot: bot.clone(),
            strategy,
            strategy_state,
            bot_state: BotState::Idle,
            interval,
            max_staleness,
            snapshots,
            commands: commands_rx,
            outbox,
            state_tx,
            signals_rejected: 0,
        };

        let join = tokio::spawn(supervisor.run());

        SupervisorHandle {
            bot,
            commands: commands_tx,
            state: state_rx,
            join,
        }
    }

    async fn run(mut self) {
        info!(bot = %self.bot, "supervisor starting");
        self.transition(BotState::Running).await;
        // Backdate the first deadline so the strategy evaluates immediately on start.
        let mut last_eval = Instant::now()
            .checked_sub(self.interval)
            .unwrap_or_else(Instant::now);

        loop {
            let deadline = (last_eval + self.interval).max(Instant::now());

            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(SupervisorCommand::Pause) => {
                            if self.bot_state == BotState::Running {
                                self.quiesce().await;
                                self.transition(BotState::Paused).await;
                            }
                        }
                        Some(SupervisorCommand::Resume) => {
                            if matches!(self.bot_state, BotState::Paused | BotState::Erroring) {
                                self.transition(BotState::Running).await;
                            }
                        }
                        Some(SupervisorCommand::Fail) => {
                            if self.bot_state == BotState::Running {
                                self.transition(BotState::Erroring).await;
                            }
                        }
                        Some(SupervisorCommand::Stop) | None => {
                            // Deterministic shutdown: cancel resting orders, flush the final
                            // snapshot, release the strategy state.
                            self.quiesce().await;
                            self.transition(BotState::Stopped).await;
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep_until(deadline), if self.bot_state == BotState::Running => {
                    self.evaluate(Utc::now()).await;
                    last_eval = Instant::now();
                }
            }
        }
        info!(bot = %self.bot, "supervisor exited");
    }

    /// Evaluate the strategy against the freshest snapshot of every subscribed symbol.
    async fn evaluate(&mut self, now: DateTime<Utc>) {
        let snapshots = self
            .snapshots
            .iter_mut()
            .map(|receiver| receiver.borrow_and_update().clone())
            .collect::<Vec<_>>();

        for snapshot in snapshots {
            // No market data yet is not staleness - the bot simply waits.
            if snapshot.as_of == DateTime::<Utc>::MIN_UTC {
                continue;
            }
            let age = now - snapshot.as_of;
            if age
                > chrono::TimeDelta::from_std(self.max_staleness)
                    .unwrap_or(chrono::TimeDelta::MAX)
            {
                error!(
                    bot = %self.bot,
                    age_secs = age.num_seconds(),
                    "market data stale beyond limit"
                );
                self.transition(BotState::Erroring).await;
                return;
            }

            let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
                self.strategy.on_tick(&snapshot, &self.strategy_state)
            }))
            .unwrap_or_else(|panic| {
                Err(StrategyError::Panicked {
                    message: format!("{panic:?}"),
                })
            });

            match result {
                Ok(output) => {
                    if output.state.kind() != self.strategy_state.kind() {
                        // Inconsistent state is treated the same as a strategy failure.
                        error!(bot = %self.bot, "strategy returned mismatched state variant");
                        self.transition(BotState::Erroring).await;
                        return;
                    }
                    self.strategy_state = output.state;
                    for signal in output.signals {
                        // Signals never block the supervisor: a full risk inbox rejects with
                        // backpressure and the signal is dropped (the bot is throttled).
                        match self.outbox.try_send(SupervisorOutput::Signal(signal)) {
                            Ok(()) => {}
                            Err(mpsc::error::TrySendError::Full(_)) => {
                                self.signals_rejected += 1;
                                warn!(
                                    bot = %self.bot,
                                    rejected = self.signals_rejected,
                                    "risk inbox full - signal rejected with backpressure"
                                );
                            }
                            Err(mpsc::error::TrySendError::Closed(_)) => {
                                warn!(bot = %self.bot, "orchestrator inbox closed");
                                return;
                            }
                        }
                    }
                }
                Err(failure) => {
                    error!(bot = %self.bot, %failure, "strategy evaluation failed");
                    self.transition(BotState::Erroring).await;
                    return;
                }
            }
        }
    }

    /// Ask the orchestrator to cancel resting orders and journal the final portfolio state.
    async fn quiesce(&mut self) {
        let _ = self
            .outbox
            .send(SupervisorOutput::Quiesce {
                bot: self.bot.clone(),
            })
            .await;
    }

    async fn transition(&mut self, to: BotState) {
        let from = self.bot_state;
        if from == to {
            return;
        }
        if !from.can_transition(to) {
            warn!(bot = %self.bot, %from, %to, "refusing invalid state transition");
            return;
        }
        self.bot_state = to;
        self.state_tx.send_replace(to);
        let _ = self
            .outbox
            .send(SupervisorOutput::StateChanged {
                bot: self.bot.clone(),
                from,
                to,
            })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quantor_execution::order::id::BotId;
    use quantor_instrument::symbol::SymbolId;
    use quantor_strategy::dca::Dca;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn dca_strategy() -> Box<dyn Strategy> {
        Box::new(Dca {
            bot: BotId::new("b1"),
            symbol: SymbolId(0),
            investment: dec!(100),
            interval: Duration::from_secs(3600),
            max_deviation: dec!(0.05),
            quantity_scale: 8,
            signal_ttl: Duration::from_secs(5),
        })
    }

    fn live_snapshot(price: Decimal) -> MarketSnapshot {
        MarketSnapshot {
            last: Some(price),
            as_of: Utc::now(),
            ..MarketSnapshot::empty(SymbolId(0))
        }
    }

    #[tokio::test]
    async fn test_starts_evaluates_and_emits_signal() {
        let (snapshot_tx, snapshot_rx) = watch::channel(live_snapshot(dec!(20000)));
        let (outbox_tx, mut outbox_rx) = mpsc::channel(64);

        let handle = BotSupervisor::spawn(
            BotId::new("b1"),
            dca_strategy(),
            Duration::from_millis(10),
            Duration::from_secs(30),
            vec![snapshot_rx],
            outbox_tx,
        );

        // First output: Idle -> Running.
        let output = outbox_rx.recv().await.unwrap();
        assert_eq!(
            output,
            SupervisorOutput::StateChanged {
                bot: BotId::new("b1"),
                from: BotState::Idle,
                to: BotState::Running,
            }
        );

        // Then the DCA buy signal from the first evaluation.
        let output = outbox_rx.recv().await.unwrap();
        let SupervisorOutput::Signal(signal) = output else {
            panic!("expected signal, got {output:?}");
        };
        assert_eq!(signal.suggested_quantity, dec!(0.005));

        drop(snapshot_tx);
        handle.command(SupervisorCommand::Stop).await;
        handle.join.await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_quiesces_and_reaches_stopped() {
        let (_snapshot_tx, snapshot_rx) = watch::channel(MarketSnapshot::empty(SymbolId(0)));
        let (outbox_tx, mut outbox_rx) = mpsc::channel(64);

        let handle = BotSupervisor::spawn(
            BotId::new("b1"),
            dca_strategy(),
            Duration::from_secs(3600),
            Duration::from_secs(30),
            vec![snapshot_rx],
            outbox_tx,
        );

        assert!(handle.command(SupervisorCommand::Stop).await);
        let SupervisorHandle { join, state, .. } = handle;
        join.await.unwrap();

        let mut outputs = Vec::new();
        while let Ok(output) = outbox_rx.try_recv() {
            outputs.push(output);
        }

        assert!(outputs.contains(&SupervisorOutput::Quiesce {
            bot: BotId::new("b1")
        }));
        assert!(outputs.contains(&SupervisorOutput::StateChanged {
            bot: BotId::new("b1"),
            from: BotState::Running,
            to: BotState::Stopped,
        }));
        assert_eq!(*state.borrow(), BotState::Stopped);
    }

    #[tokio::test]
    async fn test_pause_preserves_strategy_and_resume_continues() {
        let (snapshot_tx, snapshot_rx) = watch::channel(live_snapshot(dec!(20000)));
        let (outbox_tx, mut outbox_rx) = mpsc::channel(64);

        let handle = BotSupervisor::spawn(
            BotId::new("b1"),
            dca_strategy(),
            Duration::from_millis(10),
            Duration::from_secs(30),
            vec![snapshot_rx],
            outbox_tx,
        );

        handle.command(SupervisorCommand::Pause).await;
        let mut state = handle.state_watch();
        state
            .wait_for(|state| *state == BotState::Paused)
            .await
            .unwrap();

        // While paused, the cadence timer is disabled - drain and verify no new signals.
        while outbox_rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(
            outbox_rx.try_recv().is_err(),
            "paused supervisor must not evaluate"
        );

        handle.command(SupervisorCommand::Resume).await;
        state
            .wait_for(|state| *state == BotState::Running)
            .await
            .unwrap();

        drop(snapshot_tx);
        handle.command(SupervisorCommand::Stop).await;
        handle.join.await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_market_data_escalates_to_erroring() {
        let stale = MarketSnapshot {
            last: Some(dec!(100)),
            as_of: Utc::now() - chrono::TimeDelta::seconds(120),
            ..MarketSnapshot::empty(SymbolId(0))
        };
        let (_snapshot_tx, snapshot_rx) = watch::channel(stale);
        let (outbox_tx, _outbox_rx) = mpsc::channel(64);

        let handle = BotSupervisor::spawn(
            BotId::new("b1"),
            dca_strategy(),
            Duration::from_millis(10),
            Duration::from_secs(30),
            vec![snapshot_rx],
            outbox_tx,
        );

        let mut state = handle.state_watch();
        state
            .wait_for(|state| *state == BotState::Erroring)
            .await
            .unwrap();

        handle.command(SupervisorCommand::Stop).await;
        handle.join.await.unwrap();
    }
}
