use crate::symbol::{Symbol, SymbolId};
use fnv::FnvHashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Append-only registry assigning each [`Symbol`] a stable numeric [`SymbolId`].
///
/// Registration happens once, during system construction. After that the registry is effectively
/// immutable: readers resolve ids through cheaply cloneable [`Arc`] snapshots and are never
/// blocked by a registration in progress.
#[derive(Debug, Default)]
pub struct SymbolRegistry {
    inner: RwLock<Arc<SymbolIndex>>,
}

/// Immutable symbol index snapshot handed out by the [`SymbolRegistry`].
#[derive(Debug, Default, Clone)]
pub struct SymbolIndex {
    symbols: Vec<Symbol>,
    ids: FnvHashMap<Symbol, SymbolId>,
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum RegistryError {
    #[error("symbol not registered: {0}")]
    UnknownSymbol(Symbol),
    #[error("symbol id out of range: {0}")]
    UnknownSymbolId(SymbolId),
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a [`Symbol`], returning its stable [`SymbolId`].
    ///
    /// Registering the same `Symbol` twice returns the id assigned on first registration.
    /// Each registration publishes a new immutable [`SymbolIndex`] version; snapshots held by
    /// readers are unaffected.
    pub fn register(&self, symbol: Symbol) -> SymbolId {
        let mut guard = self.inner.write();

        if let Some(id) = guard.ids.get(&symbol) {
            return *id;
        }

        let mut next = SymbolIndex::clone(&guard);
        let id = SymbolId(next.symbols.len() as u32);
        next.symbols.push(symbol.clone());
        next.ids.insert(symbol.clone(), id);
        *guard = Arc::new(next);

        debug!(%symbol, %id, "registered symbol");
        id
    }

    /// Obtain the current immutable [`SymbolIndex`] snapshot.
    pub fn index(&self) -> Arc<SymbolIndex> {
        Arc::clone(&self.inner.read())
    }

    /// Resolve the [`SymbolId`] for a [`Symbol`], if registered.
    pub fn id(&self, symbol: &Symbol) -> Option<SymbolId> {
        self.inner.read().ids.get(symbol).copied()
    }
}

impl SymbolIndex {
    /// Resolve a [`SymbolId`] back to its [`Symbol`].
    pub fn symbol(&self, id: SymbolId) -> Result<&Symbol, RegistryError> {
        self.symbols
            .get(id.index())
            .ok_or(RegistryError::UnknownSymbolId(id))
    }

    /// Resolve the [`SymbolId`] for a [`Symbol`].
    pub fn id(&self, symbol: &Symbol) -> Result<SymbolId, RegistryError> {
        self.ids
            .get(symbol)
            .copied()
            .ok_or_else(|| RegistryError::UnknownSymbol(symbol.clone()))
    }

    /// Whether the provided [`Symbol`] is registered.
    pub fn contains(&self, symbol: &Symbol) -> bool {
        self.ids.contains_key(symbol)
    }

    /// Iterator over every registered `(SymbolId, Symbol)` pair, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(index, symbol)| (SymbolId(index as u32), symbol))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
