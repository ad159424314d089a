//! Error taxonomy for the engine core.
//!
//! Construction-time errors halt setup before any order is submitted.
//! Reconciliation-time errors halt the current [`crate::driver::Trade`] after
//! settling any in-flight cancellation. `Multiple pending order` and
//! `unsettled order persist` are fatal invariant violations.

use thiserror::Error;

/// All fallible outcomes surfaced by the engine core.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("value not present: {class_name} field `{field}` must be one of {accepted:?}, got `{provided}`")]
    ValueNotPresent {
        class_name: &'static str,
        field: &'static str,
        provided: String,
        accepted: Vec<&'static str>,
    },

    #[error(
        "input parameter conflict in {class_name}: provided `{provided_input}` but `{unexpected_corresponding_input}` was also supplied (expected only one of {corresponding_input_types:?})"
    )]
    InputParameterConflict {
        class_name: &'static str,
        provided_input: &'static str,
        corresponding_input_types: (&'static str, &'static str),
        unexpected_corresponding_input: &'static str,
    },

    #[error("missing price: required `{price_type}` price was not present")]
    MissingPrice { price_type: &'static str },

    #[error("missing order attribute `{attribute}` on order {client_ref_id}")]
    MissingOrderAttribute {
        client_ref_id: String,
        attribute: &'static str,
    },

    #[error("order type error: expected {expected}, got {actual} for order {client_ref_id}")]
    OrderTypeError {
        client_ref_id: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("unmatched ticker: order symbol `{order_symbol}` does not match broker symbol `{broker_symbol}`")]
    UnmatchedTickerError {
        order_symbol: String,
        broker_symbol: String,
    },

    #[error("missing required trading element: `{element}` must be set before execute()")]
    MissingRequiredTradingElement { element: &'static str },

    #[error("ticker id not found for symbol `{symbol}`")]
    TickerIdNotFound { symbol: String },

    #[error("order placing error: {reason}")]
    OrderPlacingError { reason: String },

    #[error("pending order not in pending list: {broker_ref_id}")]
    PendingOrderNotInPendingList { broker_ref_id: String },

    #[error("multiple pending {order_kind} orders detected; at most one is allowed")]
    MultiplePendingOrderException { order_kind: &'static str },

    #[error("unsettled order {client_ref_id} persisted past cancellation attempts")]
    UnsettledOrderPersistError { client_ref_id: String },

    #[error("dependent signal conflict: `{leader}` and `{follower}` do not share buy/sell orientation")]
    DependentSignalConflict {
        leader: String,
        follower: String,
    },

    #[error("signal `{codename}` with sequence {sequence:?} must not have a leading dependent")]
    SignalNotRequiredException {
        codename: String,
        sequence: &'static str,
    },

    #[error("signal `{codename}` with sequence {sequence:?} requires a leading dependent")]
    MissingDependentSignalError {
        codename: String,
        sequence: &'static str,
    },
}
