use crate::{
    config::SystemConfig,
    error::QuantorError,
    metrics::MetricsBus,
    orchestrator::{Orchestrator, OrchestratorHandle},
    paper::PaperExchange,
    store::{InMemoryJournal, InMemoryStateStore},
};
use quantor_book::book::BookConfig;
use quantor_execution::{AccountId, VenueId, adapter::ExchangeAdapter};
use quantor_instrument::{
    registry::SymbolRegistry,
    symbol::{Symbol, SymbolId},
};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Builder assembling a full paper-trading system: symbol registry, paper venue with one book
/// per listed symbol, orchestrator with in-memory journal and store, metrics bus, and market
/// feed wiring.
///
/// Real deployments swap the venue and stores by constructing the
/// [`Orchestrator`] directly; the builder covers paper trading and tests.
#[derive(Debug)]
pub struct SystemBuilder {
    config: SystemConfig,
    symbols: Vec<Symbol>,
    venue: VenueId,
    account: AccountId,
    book_config: BookConfig,
    rate_budget: Option<(u32, f64)>,
}

impl SystemBuilder {
    pub fn new(config: SystemConfig) -> Self {
        Self {
            config,
            symbols: Vec::new(),
            venue: VenueId::new("paper"),
            account: AccountId::new("main"),
            book_config: BookConfig::default(),
            rate_budget: None,
        }
    }

    /// List a symbol on the paper venue.
    pub fn with_symbol(mut self, symbol: Symbol) -> Self {
        self.symbols.push(symbol);
        self
    }

    pub fn with_venue(mut self, venue: VenueId, account: AccountId) -> Self {
        self.venue = venue;
        self.account = account;
        self
    }

    pub fn with_book_config(mut self, book_config: BookConfig) -> Self {
        self.book_config = book_config;
        self
    }

    /// Token-bucket rate budget applied to the paper venue account.
    pub fn with_rate_budget(mut self, capacity: u32, refill_per_second: f64) -> Self {
        self.rate_budget = Some((capacity, refill_per_second));
        self
    }

    pub async fn build(mut self) -> Result<System, QuantorError> {
        if self.symbols.is_empty() {
            return Err(QuantorError::validation(
                "NO_SYMBOLS",
                "system lists no symbols",
            ));
        }
        self.book_config.depth_levels = self.config.book_depth_levels;

        let registry = Arc::new(SymbolRegistry::new());
        let paper = PaperExchange::new(
            self.venue.clone(),
            self.account.clone(),
            &registry,
            self.symbols.clone(),
            self.book_config,
        );

        let journal = Arc::new(InMemoryJournal::new());
        let store = Arc::new(InMemoryStateStore::new());
        let metrics = MetricsBus::new();

        let mut orchestrator = Orchestrator::new(
            self.config,
            Arc::clone(&registry),
            Arc::clone(&journal) as Arc<dyn crate::store::TradeJournal>,
            Arc::clone(&store) as Arc<dyn crate::store::StateStore>,
            metrics.clone(),
        );
        orchestrator
            .attach_adapter(Arc::clone(&paper) as Arc<dyn ExchangeAdapter>)
            .await?;
        for symbol in &self.symbols {
            let id = registry.register(symbol.clone());
            let feed = paper
                .snapshots(id)
                .expect("paper venue lists every builder symbol");
            orchestrator.attach_market(id, feed);
        }
        if let Some((capacity, refill_per_second)) = self.rate_budget {
            orchestrator.set_rate_budget(
                self.venue.clone(),
                self.account.clone(),
                capacity,
                refill_per_second,
            );
        }

        let (handle, join) = orchestrator.serve();

        Ok(System {
            handle,
            paper,
            registry,
            journal,
            store,
            metrics,
            join,
        })
    }
}

/// A running paper-trading system.
#[derive(Debug)]
pub struct System {
    pub handle: OrchestratorHandle,
    pub paper: Arc<PaperExchange>,
    pub registry: Arc<SymbolRegistry>,
    pub journal: Arc<InMemoryJournal>,
    pub store: Arc<InMemoryStateStore>,
    pub metrics: MetricsBus,
    join: JoinHandle<Orchestrator>,
}

impl System {
    pub fn symbol_id(&self, symbol: &Symbol) -> Option<SymbolId> {
        self.registry.id(symbol)
    }

    /// Graceful top-down shutdown: stop every bot within the configured deadline, then retire
    /// the orchestrator task and return it for inspection.
    pub async fn shutdown(self) -> Result<Orchestrator, QuantorError> {
        self.handle.stop_all().await?;
        drop(self.handle);
        Ok(self.join.await?)
    }
}
