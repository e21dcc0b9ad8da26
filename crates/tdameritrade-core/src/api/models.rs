use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Quotes keyed by symbol.
pub type Quotes = HashMap<String, Quote>;

/// Market snapshot for one symbol. The API omits fields that do not apply to an asset type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub asset_type: Option<String>,
    pub asset_main_type: Option<String>,
    pub asset_sub_type: Option<String>,
    pub cusip: Option<String>,
    pub symbol: String,
    pub description: Option<String>,
    pub bid_price: Option<f64>,
    pub bid_size: Option<f64>,
    pub ask_price: Option<f64>,
    pub ask_size: Option<f64>,
    pub last_price: Option<f64>,
    pub last_size: Option<f64>,
    pub open_price: Option<f64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
    pub close_price: Option<f64>,
    pub net_change: Option<f64>,
    pub net_percent_change_in_double: Option<f64>,
    pub total_volume: Option<f64>,
    pub quote_time_in_long: Option<i64>,
    pub trade_time_in_long: Option<i64>,
    pub mark: Option<f64>,
    pub exchange: Option<String>,
    pub exchange_name: Option<String>,
    pub marginable: Option<bool>,
    pub shortable: Option<bool>,
    pub volatility: Option<f64>,
    #[serde(rename = "52WkHigh")]
    pub week_52_high: Option<f64>,
    #[serde(rename = "52WkLow")]
    pub week_52_low: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub div_amount: Option<f64>,
    pub div_yield: Option<f64>,
    pub div_date: Option<String>,
    pub security_status: Option<String>,
    pub delayed: Option<bool>,
}

impl Quote {
    /// Time of the last trade, from `tradeTimeInLong` (epoch millis).
    pub fn trade_time(&self) -> Option<DateTime<Utc>> {
        self.trade_time_in_long
            .and_then(DateTime::<Utc>::from_timestamp_millis)
    }
}

/// Instrument search results keyed by symbol.
pub type Instruments = HashMap<String, InstrumentInfo>;

/// Reference data returned by the instruments endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentInfo {
    pub cusip: Option<String>,
    pub symbol: String,
    pub description: Option<String>,
    pub exchange: Option<String>,
    pub asset_type: Option<String>,
    /// Present only for the `fundamental` projection.
    pub fundamental: Option<serde_json::Value>,
}

/// Market hours keyed by market, then by product.
pub type MarketHours = HashMap<String, HashMap<String, Hours>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hours {
    pub category: Option<String>,
    pub date: String,
    pub exchange: Option<String>,
    pub is_open: bool,
    pub market_type: String,
    pub product: String,
    pub product_name: Option<String>,
    /// Absent on days the market is closed.
    pub session_hours: Option<SessionHours>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionHours {
    #[serde(default)]
    pub pre_market: Vec<Period>,
    #[serde(default)]
    pub regular_market: Vec<Period>,
    #[serde(default)]
    pub post_market: Vec<Period>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start: String,
    pub end: String,
}

/// One of the top movers of an index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mover {
    pub change: f64,
    pub description: Option<String>,
    pub direction: String,
    pub last: f64,
    pub total_volume: f64,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceHistory {
    #[serde(default)]
    pub candles: Vec<Candle>,
    #[serde(default)]
    pub empty: bool,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Epoch milliseconds.
    pub datetime: i64,
}

impl Candle {
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp_millis(self.datetime)
    }
}
