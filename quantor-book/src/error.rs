use derive_more::Display;
use quantor_execution::order::id::OrderId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Reason a submission was rejected by the book. Rejections are atomic: the book state is
/// unchanged.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum RejectReason {
    /// Price or quantity failed validation (must be > 0).
    #[display("BOOK_VALIDATION")]
    Validation,
    /// Market order submitted against an empty opposite side.
    #[display("BOOK_NO_LIQUIDITY")]
    NoLiquidity,
    /// Fill-or-kill order could not be filled in full.
    #[display("BOOK_CANNOT_FILL")]
    CannotFill,
    /// Submission would cross a resting order of the same bot.
    #[display("BOOK_SELF_TRADE")]
    SelfTrade,
}

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum BookError {
    #[error("order {id} rejected [{reason}]")]
    Rejected { id: OrderId, reason: RejectReason },

    #[error("order {id} submitted for symbol {submitted}, book holds {book}")]
    SymbolMismatch {
        id: OrderId,
        submitted: u32,
        book: u32,
    },
}
