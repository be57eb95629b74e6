use crate::{
    bot::{BotConfig, BotState},
    config::SystemConfig,
    error::QuantorError,
    event::{EventStamper, MetricEvent, ProducerId},
    metrics::MetricsBus,
    store::{JournalRecord, StateStore, TradeJournal},
    supervisor::{BotSupervisor, SupervisorCommand, SupervisorHandle, SupervisorOutput},
};
use chrono::{TimeDelta, Utc};
use fnv::FnvHashMap;
use futures::StreamExt;
use quantor_book::snapshot::MarketSnapshot;
use quantor_execution::{
    VenueId,
    adapter::{ClientOrder, ExchangeAdapter, FillEvent},
    error::AdapterError,
    idempotency::{IdempotencyCache, Offer},
    order::id::{BotId, ClientOrderId, VenueOrderId},
    rate_limit::RateBudgets,
};
use quantor_instrument::{registry::SymbolRegistry, symbol::SymbolId};
use quantor_risk::guard::{RiskGuard, SizingLimits};
use quantor_strategy::{
    registry::{StrategyRegistry, StrategySpec},
    signal::Signal,
};
use smol_str::{SmolStr, format_smolstr};
use std::sync::Arc;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::Instant,
};
use tracing::{error, info, warn};

/// Operator surface. Wiring to HTTP/CLI is out of scope; callers hold an
/// [`OrchestratorHandle`].
#[derive(Debug)]
pub enum OperatorCommand {
    Register(Box<BotConfig>, oneshot::Sender<Result<BotId, QuantorError>>),
    Start(BotId, oneshot::Sender<Result<(), QuantorError>>),
    Pause(BotId, oneshot::Sender<Result<(), QuantorError>>),
    Resume(BotId, oneshot::Sender<Result<(), QuantorError>>),
    Stop(BotId, oneshot::Sender<Result<(), QuantorError>>),
    StartAll(oneshot::Sender<Vec<(BotId, Result<(), QuantorError>)>>),
    StopAll(oneshot::Sender<Vec<(BotId, BotState)>>),
    GetPortfolio(
        BotId,
        oneshot::Sender<Option<quantor_risk::portfolio::Portfolio>>,
    ),
    GetBotStatus(BotId, oneshot::Sender<Option<BotState>>),
}

/// Cloneable operator handle to a served [`Orchestrator`].
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    commands: mpsc::Sender<OperatorCommand>,
}

impl OrchestratorHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> OperatorCommand,
    ) -> Result<T, QuantorError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .await
            .map_err(|_| QuantorError::Backpressure {
                component: SmolStr::new_static("orchestrator"),
            })?;
        rx.await.map_err(|_| QuantorError::Backpressure {
            component: SmolStr::new_static("orchestrator"),
        })
    }

    pub async fn register(&self, config: BotConfig) -> Result<BotId, QuantorError> {
        self.request(|tx| OperatorCommand::Register(Box::new(config), tx))
            .await?
    }

    pub async fn start(&self, bot: BotId) -> Result<(), QuantorError> {
        self.request(|tx| OperatorCommand::Start(bot, tx)).await?
    }

    pub async fn pause(&self, bot: BotId) -> Result<(), QuantorError> {
        self.request(|tx| OperatorCommand::Pause(bot, tx)).await?
    }

    pub async fn resume(&self, bot: BotId) -> Result<(), QuantorError> {
        self.request(|tx| OperatorCommand::Resume(bot, tx)).await?
    }

    pub async fn stop(&self, bot: BotId) -> Result<(), QuantorError> {
        self.request(|tx| OperatorCommand::Stop(bot, tx)).await?
    }

    pub async fn start_all(&self) -> Result<Vec<(BotId, Result<(), QuantorError>)>, QuantorError> {
        self.request(OperatorCommand::StartAll).await
    }

    /// Supervised fan-out stop. Completes within the configured shutdown deadline; any
    /// supervisor missing it is force-terminated and recorded as `Erroring`.
    pub async fn stop_all(&self) -> Result<Vec<(BotId, BotState)>, QuantorError> {
        self.request(OperatorCommand::StopAll).await
    }

    pub async fn portfolio(
        &self,
        bot: BotId,
    ) -> Result<Option<quantor_risk::portfolio::Portfolio>, QuantorError> {
        self.request(|tx| OperatorCommand::GetPortfolio(bot, tx))
            .await
    }

    pub async fn bot_status(&self, bot: BotId) -> Result<Option<BotState>, QuantorError> {
        self.request(|tx| OperatorCommand::GetBotStatus(bot, tx))
            .await
    }
}

#[derive(Debug)]
struct BotEntry {
    config: BotConfig,
    symbol_ids: Vec<SymbolId>,
    state: BotState,
    supervisor: Option<SupervisorHandle>,
}

#[derive(Debug, Clone)]
struct OrderRecord {
    bot: BotId,
    venue: VenueId,
    venue_order: Option<VenueOrderId>,
}

/// Single entry point for bot lifecycle. Exclusively owns the bot registry, the venue routing
/// table and the [`RiskGuard`]; serialises every mutation through its run loop so no state is
/// shared under locks.
pub struct Orchestrator {
    config: SystemConfig,
    registry: Arc<SymbolRegistry>,
    strategies: StrategyRegistry,
    bots: FnvHashMap<BotId, BotEntry>,
    risk: RiskGuard,
    adapters: FnvHashMap<VenueId, Arc<dyn ExchangeAdapter>>,
    journal: Arc<dyn TradeJournal>,
    store: Arc<dyn StateStore>,
    metrics: MetricsBus,
    stamper: EventStamper,
    idempotency: IdempotencyCache,
    budgets: RateBudgets,
    markets: FnvHashMap<SymbolId, watch::Receiver<MarketSnapshot>>,
    /// Outbox handed to every spawned supervisor.
    outputs_tx: mpsc::Sender<SupervisorOutput>,
    outputs_rx: Option<mpsc::Receiver<SupervisorOutput>>,
    fills_tx: mpsc::Sender<(VenueId, FillEvent)>,
    fills_rx: Option<mpsc::Receiver<(VenueId, FillEvent)>>,
    markets_tx: mpsc::Sender<(SymbolId, MarketSnapshot)>,
    markets_rx: Option<mpsc::Receiver<(SymbolId, MarketSnapshot)>>,
    /// Client order records for fill attribution, keyed by idempotency key.
    orders: FnvHashMap<ClientOrderId, OrderRecord>,
    /// Resting-order mirror per bot.
    open_orders: FnvHashMap<BotId, Vec<ClientOrderId>>,
    next_client_order: u64,
    /// Set on an invariant violation; no further signals are routed until operator restart.
    halted: bool,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("bots", &self.bots.len())
            .field("halted", &self.halted)
            .finish()
    }
}

impl Orchestrator {
    pub fn new(
        config: SystemConfig,
        registry: Arc<SymbolRegistry>,
        journal: Arc<dyn TradeJournal>,
        store: Arc<dyn StateStore>,
        metrics: MetricsBus,
    ) -> Self {
        // The supervisor outbox doubles as the risk guard inbox: signals that find it full are
        // rejected with backpressure by the sender.
        let (outputs_tx, outputs_rx) = mpsc::channel(config.risk_inbox_capacity.max(1));
        let (fills_tx, fills_rx) = mpsc::channel(256);
        let (markets_tx, markets_rx) = mpsc::channel(256);
        let replay_window = TimeDelta::from_std(config.idempotency_replay_window)
            .unwrap_or_else(|_| TimeDelta::minutes(10));

        Self {
            risk: RiskGuard::new(config.mark_policy),
            config,
            registry,
            strategies: StrategyRegistry::default(),
            bots: FnvHashMap::default(),
            adapters: FnvHashMap::default(),
            journal,
            store,
            metrics,
            stamper: EventStamper::new(ProducerId::new("orchestrator")),
            idempotency: IdempotencyCache::new(replay_window),
            budgets: RateBudgets::new(),
            markets: FnvHashMap::default(),
            outputs_tx,
            outputs_rx: Some(outputs_rx),
            fills_tx,
            fills_rx: Some(fills_rx),
            markets_tx,
            markets_rx: Some(markets_rx),
            orders: FnvHashMap::default(),
            open_orders: FnvHashMap::default(),
            next_client_order: 0,
            halted: false,
        }
    }

    /// Install an execution venue and start forwarding its account fill stream.
    pub async fn attach_adapter(
        &mut self,
        adapter: Arc<dyn ExchangeAdapter>,
    ) -> Result<(), QuantorError> {
        let venue = adapter.venue();
        let mut fills = adapter.fills().await?;
        let tx = self.fills_tx.clone();
        let forward_venue = venue.clone();
        tokio::spawn(async move {
            while let Some(event) = fills.next().await {
                if tx.send((forward_venue.clone(), event)).await.is_err() {
                    break;
                }
            }
        });

        self.adapters.insert(venue, adapter);
        Ok(())
    }

    /// Install a rate budget for a `(venue, account)` pair.
    pub fn set_rate_budget(
        &mut self,
        venue: VenueId,
        account: quantor_execution::AccountId,
        capacity: u32,
        refill_per_second: f64,
    ) {
        self.budgets
            .insert(venue, account, capacity, refill_per_second, Utc::now());
    }

    /// Install a market snapshot feed for one symbol, used for risk marks, supervisor
    /// subscriptions and tick telemetry.
    pub fn attach_market(&mut self, symbol: SymbolId, feed: watch::Receiver<MarketSnapshot>) {
        let mut forward = feed.clone();
        let tx = self.markets_tx.clone();
        tokio::spawn(async move {
            while forward.changed().await.is_ok() {
                let snapshot = forward.borrow_and_update().clone();
                if tx.send((symbol, snapshot)).await.is_err() {
                    break;
                }
            }
        });
        self.markets.insert(symbol, feed);
    }

    /// Serve the orchestrator: spawn its run loop and return the operator handle.
    pub fn serve(mut self) -> (OrchestratorHandle, JoinHandle<Orchestrator>) {
        let (commands_tx, commands_rx) = mpsc::channel(64);
        let outputs = self.outputs_rx.take().expect("serve called once");
        let fills = self.fills_rx.take().expect("serve called once");
        let markets = self.markets_rx.take().expect("serve called once");

        let join = tokio::spawn(self.run(commands_rx, outputs, fills, markets));
        (OrchestratorHandle { commands: commands_tx }, join)
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<OperatorCommand>,
        mut outputs: mpsc::Receiver<SupervisorOutput>,
        mut fills: mpsc::Receiver<(VenueId, FillEvent)>,
        mut markets: mpsc::Receiver<(SymbolId, MarketSnapshot)>,
    ) -> Self {
        info!("orchestrator running");
        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(command) => self.process_command(command, &mut outputs).await,
                        None => {
                            // Operator handle dropped: shut the system down.
                            self.stop_all(&mut outputs).await;
                            break;
                        }
                    }
                }
                Some(output) = outputs.recv() => {
                    self.process_output(output).await;
                }
                Some((venue, event)) = fills.recv() => {
                    self.process_fill(venue, event).await;
                }
                Some((symbol, snapshot)) = markets.recv() => {
                    self.process_market(symbol, snapshot);
                }
            }
        }
        info!("orchestrator stopped");
        self
    }

    async fn process_command(
        &mut self,
        command: OperatorCommand,
        outputs: &mut mpsc::Receiver<SupervisorOutput>,
    ) {
        match command {
            OperatorCommand::Register(config, reply) => {
                let _ = reply.send(self.register(*config).await);
            }
            OperatorCommand::Start(bot, reply) => {
                let _ = reply.send(self.start(&bot).await);
            }
            OperatorCommand::Pause(bot, reply) => {
                let _ = reply.send(self.send_supervisor(&bot, SupervisorCommand::Pause).await);
            }
            OperatorCommand::Resume(bot, reply) => {
                let _ = reply.send(self.send_supervisor(&bot, SupervisorCommand::Resume).await);
            }
            OperatorCommand::Stop(bot, reply) => {
                let _ = reply.send(self.stop(&bot, outputs).await);
            }
            OperatorCommand::StartAll(reply) => {
                let ids = self
                    .bots
                    .iter()
                    .filter(|(_, entry)| entry.state == BotState::Idle)
                    .map(|(id, _)| id.clone())
                    .collect::<Vec<_>>();
                let mut results = Vec::with_capacity(ids.len());
                for id in ids {
                    let result = self.start(&id).await;
                    results.push((id, result));
                }
                let _ = reply.send(results);
            }
            OperatorCommand::StopAll(reply) => {
                let _ = reply.send(self.stop_all(outputs).await);
            }
            OperatorCommand::GetPortfolio(bot, reply) => {
                let _ = reply.send(self.risk.portfolio(&bot).cloned());
            }
            OperatorCommand::GetBotStatus(bot, reply) => {
                let _ = reply.send(self.bots.get(&bot).map(|entry| entry.state));
            }
        }
    }

    /// Validate a bot config against the venue, persist it, and create (but not start) its
    /// registry entry.
    async fn register(&mut self, config: BotConfig) -> Result<BotId, QuantorError> {
        if self.bots.contains_key(&config.id) {
            return Err(QuantorError::validation(
                "BOT_EXISTS",
                format!("bot {} already registered", config.id),
            ));
        }
        let Some(adapter) = self.adapters.get(&config.venue) else {
            return Err(QuantorError::validation(
                "UNKNOWN_VENUE",
                format!("no adapter for venue {}", config.venue),
            ));
        };
        if config.symbols.is_empty() {
            return Err(QuantorError::validation("NO_SYMBOLS", "bot lists no symbols"));
        }
        for symbol in &config.symbols {
            if !adapter.supports(symbol) {
                return Err(QuantorError::validation(
                    "UNSUPPORTED_SYMBOL",
                    format!("venue {} does not list {symbol}", config.venue),
                ));
            }
        }
        if config.allocation_ceiling <= rust_decimal::Decimal::ZERO {
            return Err(QuantorError::validation(
                "BAD_ALLOCATION",
                "allocation ceiling must be positive",
            ));
        }

        let symbol_ids = config
            .symbols
            .iter()
            .map(|symbol| self.registry.register(symbol.clone()))
            .collect::<Vec<_>>();

        self.risk.register_bot(
            config.id.clone(),
            config.risk_profile.clone(),
            config.allocation_ceiling,
        );
        self.store
            .put(
                &format!("bots/{}", config.id),
                serde_json::to_value(&config)
                    .map_err(|e| crate::store::StoreError::Serialization(e.to_string()))?,
            )
            .await?;

        let id = config.id.clone();
        self.bots.insert(
            id.clone(),
            BotEntry {
                config,
                symbol_ids,
                state: BotState::Idle,
                supervisor: None,
            },
        );
        info!(bot = %id, "bot registered");
        Ok(id)
    }

    /// Start an idle bot after health checks: adapter reachable, market feeds attached, risk
    /// capacity registered.
    async fn start(&mut self, bot: &BotId) -> Result<(), QuantorError> {
        let running = self
            .bots
            .values()
            .filter(|entry| entry.supervisor.is_some())
            .count();
        if running >= self.config.max_concurrent_bots {
            return Err(QuantorError::BotLimitReached {
                limit: self.config.max_concurrent_bots,
            });
        }

        let entry = self
            .bots
            .get(bot)
            .ok_or_else(|| QuantorError::UnknownBot(bot.clone()))?;
        if entry.state != BotState::Idle || entry.supervisor.is_some() {
            return Err(QuantorError::InvalidTransition {
                bot: bot.clone(),
                from: entry.state,
                to: BotState::Running,
            });
        }

        let adapter = self
            .adapters
            .get(&entry.config.venue)
            .ok_or_else(|| {
                QuantorError::validation("UNKNOWN_VENUE", format!("{}", entry.config.venue))
            })?;
        if !adapter.is_reachable().await {
            return Err(QuantorError::Adapter(AdapterError::transient(
                "EXCH_UNREACHABLE",
                format!("venue {} is unreachable", entry.config.venue),
            )));
        }
        if self.risk.portfolio(bot).is_none() {
            return Err(QuantorError::validation(
                "NO_RISK_CAPACITY",
                "bot has no registered portfolio",
            ));
        }

        let snapshots = entry
            .symbol_ids
            .iter()
            .map(|symbol| {
                self.markets.get(symbol).cloned().ok_or_else(|| {
                    QuantorError::validation(
                        "NO_MARKET_FEED",
                        format!("no market feed attached for symbol {symbol}"),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let spec = StrategySpec {
            bot: bot.clone(),
            symbols: &entry.symbol_ids,
            params: &entry.config.strategy_params,
            signal_ttl: self.config.signal_ttl,
        };
        let strategy = self
            .strategies
            .build(entry.config.strategy, &spec)
            .map_err(|failure| {
                QuantorError::validation("BAD_STRATEGY_PARAMS", failure.to_string())
            })?;

        let interval = entry
            .config
            .cadence_secs
            .map(std::time::Duration::from_secs)
            .unwrap_or_else(|| entry.config.strategy.default_interval());
        let handle = BotSupervisor::spawn(
            bot.clone(),
            strategy,
            interval,
            self.config.max_staleness,
            snapshots,
            self.outputs_tx.clone(),
        );

        let entry = self
            .bots
            .get_mut(bot)
            .expect("entry presence checked above");
        entry.supervisor = Some(handle);
        Ok(())
    }

    async fn send_supervisor(
        &mut self,
        bot: &BotId,
        command: SupervisorCommand,
    ) -> Result<(), QuantorError> {
        let entry = self
            .bots
            .get(bot)
            .ok_or_else(|| QuantorError::UnknownBot(bot.clone()))?;
        let Some(handle) = &entry.supervisor else {
            return Err(QuantorError::InvalidTransition {
                bot: bot.clone(),
                from: entry.state,
                to: BotState::Paused,
            });
        };
        if handle.command(command).await {
            Ok(())
        } else {
            Err(QuantorError::Backpressure {
                component: SmolStr::new_static("supervisor"),
            })
        }
    }

    /// Stop one bot within the shutdown deadline, force-terminating on a miss.
    async fn stop(
        &mut self,
        bot: &BotId,
        outputs: &mut mpsc::Receiver<SupervisorOutput>,
    ) -> Result<(), QuantorError> {
        if !self.bots.contains_key(bot) {
            return Err(QuantorError::UnknownBot(bot.clone()));
        }
        self.request_stop(bot).await;
        let deadline = Instant::now() + self.config.shutdown_deadline;
        self.drain_until_stopped(&[bot.clone()], deadline, outputs)
            .await;

        match self.bots.get(bot).map(|entry| entry.state) {
            Some(BotState::Stopped) => Ok(()),
            _ => Err(QuantorError::Deadline {
                operation: SmolStr::new_static("stop"),
            }),
        }
    }

    /// Supervised fan-out stop of every bot with a live supervisor.
    async fn stop_all(
        &mut self,
        outputs: &mut mpsc::Receiver<SupervisorOutput>,
    ) -> Vec<(BotId, BotState)> {
        let targets = self
            .bots
            .iter()
            .filter(|(_, entry)| entry.supervisor.is_some())
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();

        for bot in &targets {
            self.request_stop(bot).await;
        }
        let deadline = Instant::now() + self.config.shutdown_deadline;
        self.drain_until_stopped(&targets, deadline, outputs).await;

        self.bots
            .iter()
            .map(|(id, entry)| (id.clone(), entry.state))
            .collect()
    }

    async fn request_stop(&mut self, bot: &BotId) {
        let Some(entry) = self.bots.get_mut(bot) else {
            return;
        };
        match &entry.supervisor {
            Some(handle) => {
                let _ = handle.command(SupervisorCommand::Stop).await;
            }
            None if entry.state.can_transition(BotState::Stopped) => {
                // Never started: stop the registry entry directly.
                let from = entry.state;
                entry.state = BotState::Stopped;
                self.publish(MetricEvent::BotStateChange {
                    bot: bot.clone(),
                    from,
                    to: BotState::Stopped,
                });
            }
            None => {}
        }
    }

    /// Keep processing supervisor outputs until every target reaches `Stopped` or the deadline
    /// passes; stragglers are aborted and recorded `Erroring`.
    async fn drain_until_stopped(
        &mut self,
        targets: &[BotId],
        deadline: Instant,
        outputs: &mut mpsc::Receiver<SupervisorOutput>,
    ) {
        loop {
            let all_stopped = targets.iter().all(|bot| {
                self.bots
                    .get(bot)
                    .map(|entry| entry.state == BotState::Stopped)
                    .unwrap_or(true)
            });
            if all_stopped {
                break;
            }

            tokio::select! {
                Some(output) = outputs.recv() => {
                    self.process_output(output).await;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    for bot in targets {
                        let Some(entry) = self.bots.get_mut(bot) else {
                            continue;
                        };
                        if entry.state != BotState::Stopped
                            && let Some(handle) = entry.supervisor.take()
                        {
                            // Missed the grace period: force-terminate and record the failure.
                            handle.join.abort();
                            error!(%bot, "supervisor missed shutdown deadline - force-terminated");
                            let from = entry.state;
                            entry.state = BotState::Erroring;
                            self.publish(MetricEvent::BotStateChange {
                                bot: bot.clone(),
                                from,
                                to: BotState::Erroring,
                            });
                        }
                    }
                    break;
                }
            }
        }

        for bot in targets {
            if let Some(entry) = self.bots.get_mut(bot)
                && entry.state == BotState::Stopped
            {
                entry.supervisor = None;
            }
        }
    }

    async fn process_output(&mut self, output: SupervisorOutput) {
        match output {
            SupervisorOutput::Signal(signal) => self.route_signal(signal).await,
            SupervisorOutput::StateChanged { bot, from, to } => {
                if let Some(entry) = self.bots.get_mut(&bot) {
                    entry.state = to;
                }
                self.publish(MetricEvent::BotStateChange { bot, from, to });
            }
            SupervisorOutput::Quiesce { bot } => self.quiesce(&bot).await,
        }
    }

    /// Look up the bot, run the risk gate, and submit the sized order to its venue.
    async fn route_signal(&mut self, signal: Signal) {
        if self.halted {
            return;
        }
        let Some(entry) = self.bots.get(&signal.bot) else {
            warn!(bot = %signal.bot, "signal from unknown bot dropped");
            return;
        };
        let bot_running = entry.state == BotState::Running;
        let venue = entry.config.venue.clone();
        let account = entry.config.account.clone();
        let Some(adapter) = self.adapters.get(&venue).cloned() else {
            return;
        };

        let now = Utc::now();
        if !self.budgets.try_acquire(&venue, &account, now) {
            // Token bucket exhausted: the bot is throttled, not failed.
            warn!(bot = %signal.bot, "EXCH_RATE_LIMIT: rate budget exhausted - signal dropped");
            self.publish(MetricEvent::SystemHealth {
                component: SmolStr::new_static("rate-budget"),
                healthy: true,
                detail: format!("EXCH_RATE_LIMIT for {venue}"),
            });
            return;
        }

        let snapshot = self
            .markets
            .get(&signal.symbol)
            .map(|feed| feed.borrow().clone())
            .unwrap_or_else(|| MarketSnapshot::empty(signal.symbol));
        let limits = SizingLimits {
            min_lot: adapter.min_lot(&signal.symbol),
            tick_size: adapter.tick_size(&signal.symbol),
        };

        let approved = match self.risk.approve(signal, bot_running, &snapshot, &limits, now) {
            Ok(approved) => approved.into_item(),
            Err(refused) => {
                info!(
                    bot = %refused.item.bot,
                    code = %refused.code,
                    "signal refused by risk gate"
                );
                self.publish(MetricEvent::SystemHealth {
                    component: SmolStr::new_static("risk-guard"),
                    healthy: true,
                    detail: format!("rejected {}: {}", refused.code, refused.message),
                });
                return;
            }
        };

        let key = ClientOrderId::new(format_smolstr!(
            "{}-{}",
            approved.bot,
            self.next_client_order
        ));
        self.next_client_order += 1;

        let client_order = ClientOrder::new(
            key.clone(),
            approved.bot.clone(),
            approved.symbol,
            approved.side,
            approved.kind,
            approved.price,
            approved.quantity,
        );
        self.orders.insert(
            key.clone(),
            OrderRecord {
                bot: approved.bot.clone(),
                venue: venue.clone(),
                venue_order: None,
            },
        );

        match adapter.submit(client_order).await {
            Ok(ack) => {
                if let Some(record) = self.orders.get_mut(&key) {
                    record.venue_order = Some(ack.venue_order);
                }
                self.open_orders.entry(approved.bot.clone()).or_default().push(key);
                self.mirror_open_orders(&approved.bot).await;
            }
            Err(failure) => {
                self.orders.remove(&key);
                match &failure {
                    AdapterError::Permanent { .. } => {
                        // Permanent venue refusal: the bot enters Erroring and an alert fires.
                        error!(bot = %approved.bot, %failure, "permanent adapter failure");
                        let _ = self
                            .send_supervisor(&approved.bot, SupervisorCommand::Fail)
                            .await;
                        self.publish(MetricEvent::SystemHealth {
                            component: SmolStr::new_static("adapter"),
                            healthy: false,
                            detail: failure.to_string(),
                        });
                    }
                    AdapterError::Transient { .. } | AdapterError::RateLimited => {
                        warn!(bot = %approved.bot, %failure, "transient adapter failure");
                    }
                }
            }
        }
    }

    /// Exactly-once fill accounting: deduplicate by idempotency key within the replay window,
    /// journal the fill before the portfolio mutates, then publish telemetry.
    async fn process_fill(&mut self, venue: VenueId, event: FillEvent) {
        let now = Utc::now();
        if self.idempotency.offer(event.key.clone(), event.sequence, now) == Offer::Replay {
            info!(key = %event.key, sequence = event.sequence, "duplicate fill collapsed");
            return;
        }

        let Some(record) = self.orders.get(&event.key).cloned() else {
            warn!(key = %event.key, %venue, "fill for unknown order dropped");
            return;
        };
        let bot = record.bot;

        // Journal append happens-before portfolio visibility.
        if let Err(failure) = self
            .journal
            .append(&bot, JournalRecord::Fill(event.fill.clone()))
            .await
        {
            error!(%bot, %failure, "journal append failed - halting");
            self.halt(format!("journal append failed: {failure}")).await;
            return;
        }

        let applied = match self.risk.apply_fill(&bot, &event.fill) {
            Ok(applied) => applied,
            Err(failure) => {
                // Accounting invariants are fatal: halt all bots and demand operator restart.
                error!(%bot, %failure, "portfolio invariant violated - halting");
                self.halt(format!("invariant violation: {failure}")).await;
                return;
            }
        };

        self.publish(MetricEvent::Fill {
            bot: bot.clone(),
            fill: event.fill.clone(),
        });
        self.publish(MetricEvent::PositionUpdate {
            bot: bot.clone(),
            symbol: event.fill.symbol,
            quantity: self
                .risk
                .portfolio(&bot)
                .and_then(|portfolio| portfolio.positions.get(&event.fill.symbol))
                .map(|position| position.quantity)
                .unwrap_or_default(),
            equity: applied.equity,
        });

        if let Some(closed) = applied.closed {
            info!(%bot, symbol = %closed.symbol, realised = %closed.pnl_realised, "position closed");
        }

        // Circuit breakers: a crossed red threshold pauses the bot until operator resume.
        for breach in self.risk.breaches(now) {
            error!(bot = %breach.bot, kind = %breach.kind, "risk breach - pausing bot");
            self.publish(MetricEvent::RiskBreach(breach.clone()));
            let _ = self
                .journal
                .append(&breach.bot, JournalRecord::RiskBreach(breach.clone()))
                .await;
            let _ = self
                .send_supervisor(&breach.bot, SupervisorCommand::Pause)
                .await;
        }
    }

    fn process_market(&mut self, symbol: SymbolId, snapshot: MarketSnapshot) {
        if let Some(last) = snapshot.last {
            self.risk.set_mark(symbol, last);
            self.publish(MetricEvent::Tick {
                symbol,
                price: last,
                quantity: snapshot.last_quantity.unwrap_or_default(),
            });
        }
    }

    /// Cancel a bot's resting orders and journal its final portfolio snapshot.
    async fn quiesce(&mut self, bot: &BotId) {
        let keys = self.open_orders.remove(bot).unwrap_or_default();
        for key in keys {
            let Some(record) = self.orders.get(&key) else {
                continue;
            };
            let Some(adapter) = self.adapters.get(&record.venue) else {
                continue;
            };
            if let Some(venue_order) = record.venue_order.clone()
                && let Err(failure) = adapter.cancel(venue_order).await
            {
                warn!(%bot, %failure, "cancel during quiesce failed");
            }
        }
        self.mirror_open_orders(bot).await;

        if let Some(portfolio) = self.risk.portfolio(bot) {
            let _ = self
                .journal
                .append(bot, JournalRecord::PositionSnapshot(portfolio.clone()))
                .await;
        }
    }

    /// Persist the resting-order mirror under `orders/open/{botId}`.
    async fn mirror_open_orders(&mut self, bot: &BotId) {
        let keys = self
            .open_orders
            .get(bot)
            .map(|keys| keys.iter().map(|key| key.0.to_string()).collect::<Vec<_>>())
            .unwrap_or_default();
        if let Err(failure) = self
            .store
            .put(
                &format!("orders/open/{bot}"),
                serde_json::Value::from(keys),
            )
            .await
        {
            warn!(%bot, %failure, "open-order mirror update failed");
        }
    }

    /// Fatal halt: suppress routing, pause every running bot, dispatch a Critical health event.
    async fn halt(&mut self, detail: String) {
        self.halted = true;
        self.publish(MetricEvent::SystemHealth {
            component: SmolStr::new_static("orchestrator"),
            healthy: false,
            detail,
        });
        let bots = self.bots.keys().cloned().collect::<Vec<_>>();
        for bot in bots {
            let _ = self.send_supervisor(&bot, SupervisorCommand::Pause).await;
        }
    }

    fn publish(&mut self, event: MetricEvent) {
        let stamped = self.stamper.stamp(event, Utc::now());
        self.metrics.publish(&stamped);
    }
}
