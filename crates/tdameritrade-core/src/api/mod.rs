mod account;
mod client;
mod instrument;
mod models;
mod transaction;
mod watchlist;

pub(crate) use client::path_segment;
pub use account::{
    Account, Balance, CancelTime, Execution, ExecutionLeg, Order, OrderLeg, Position,
    SecuritiesAccount,
};
pub use client::{ApiError, ApiResult, TdAmeritradeClient, DEFAULT_BASE_URL};
pub use instrument::{
    CashEquivalent, Equity, FixedIncome, Instrument, MutualFund, OptionContract,
    OptionDeliverable, UnsupportedAssetType,
};
pub use models::{
    Candle, Hours, InstrumentInfo, Instruments, MarketHours, Mover, Period, PriceHistory, Quote,
    Quotes, SessionHours,
};
pub use transaction::{Transaction, TransactionFees, TransactionInstrument, TransactionItem};
pub use watchlist::{NewWatchlist, Watchlist, WatchlistInstrument, WatchlistItem, WatchlistUpdate};
