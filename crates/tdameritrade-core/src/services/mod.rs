//! Typed accessors for the TD Ameritrade REST resources, one service per resource family.

mod accounts;
mod hours;
mod instruments;
mod movers;
mod price_history;
mod quotes;
mod transactions;
mod watchlists;

pub use accounts::{AccountFields, AccountService, OrderQuery};
pub use hours::{Market, MarketHoursService};
pub use instruments::{InstrumentService, Projection};
pub use movers::{ChangeType, Direction, MoverOptions, MoverService};
pub use price_history::{FrequencyType, PeriodType, PriceHistoryOptions, PriceHistoryService};
pub use quotes::QuoteService;
pub use transactions::{TransactionQuery, TransactionService, TransactionType};
pub use watchlists::WatchlistService;
