use serde::{Deserialize, Serialize};

/// Watchlist as stored in an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Watchlist {
    pub name: String,
    pub watchlist_id: String,
    pub account_id: String,
    pub status: Option<String>,
    #[serde(default)]
    pub watchlist_items: Vec<WatchlistItem>,
}

/// Body for creating a watchlist or replacing one wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewWatchlist {
    pub name: String,
    pub watchlist_items: Vec<WatchlistItem>,
}

impl NewWatchlist {
    /// Watchlist of plain equity tickers.
    pub fn equities<I, S>(name: impl Into<String>, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            watchlist_items: symbols
                .into_iter()
                .map(|symbol| WatchlistItem::new(WatchlistInstrument::equity(symbol)))
                .collect(),
        }
    }
}

/// Partial update of an existing watchlist: rename it, add items, or edit items by
/// `sequence_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub watchlist_id: String,
    pub watchlist_items: Vec<WatchlistItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistItem {
    /// Assigned by the API; set it to target an existing item in an update.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_id: Option<i64>,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub average_price: f64,
    #[serde(default)]
    pub commission: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchased_date: Option<String>,
    pub instrument: WatchlistInstrument,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl WatchlistItem {
    pub fn new(instrument: WatchlistInstrument) -> Self {
        Self {
            sequence_id: None,
            quantity: 0.0,
            average_price: 0.0,
            commission: 0.0,
            purchased_date: None,
            instrument,
            status: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchlistInstrument {
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub asset_type: String,
}

impl WatchlistInstrument {
    pub fn equity(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            description: None,
            asset_type: "EQUITY".into(),
        }
    }
}
