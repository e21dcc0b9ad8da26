use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Security referenced by a position or an order leg, discriminated by `assetType`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "assetType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Instrument {
    Equity(Equity),
    Option(OptionContract),
    MutualFund(MutualFund),
    CashEquivalent(CashEquivalent),
    FixedIncome(FixedIncome),
}

impl Instrument {
    /// Wire value of the `assetType` discriminator.
    pub fn asset_type(&self) -> &'static str {
        match self {
            Instrument::Equity(_) => "EQUITY",
            Instrument::Option(_) => "OPTION",
            Instrument::MutualFund(_) => "MUTUAL_FUND",
            Instrument::CashEquivalent(_) => "CASH_EQUIVALENT",
            Instrument::FixedIncome(_) => "FIXED_INCOME",
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Instrument::Equity(inner) => &inner.symbol,
            Instrument::Option(inner) => &inner.symbol,
            Instrument::MutualFund(inner) => &inner.symbol,
            Instrument::CashEquivalent(inner) => &inner.symbol,
            Instrument::FixedIncome(inner) => &inner.symbol,
        }
    }

    /// Shorthand for the common case of trading a stock by ticker.
    pub fn equity(symbol: impl Into<String>) -> Self {
        Instrument::Equity(Equity {
            cusip: None,
            symbol: symbol.into(),
            description: None,
        })
    }
}

/// Raised when an instrument carries an `assetType` this crate does not model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported asset type {0}")]
pub struct UnsupportedAssetType(pub String);

impl<'de> Deserialize<'de> for Instrument {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let asset_type = value
            .get("assetType")
            .and_then(Value::as_str)
            .ok_or_else(|| D::Error::missing_field("assetType"))?
            .to_owned();

        let decoded = match asset_type.as_str() {
            "EQUITY" => serde_json::from_value(value).map(Instrument::Equity),
            "OPTION" => serde_json::from_value(value).map(Instrument::Option),
            "MUTUAL_FUND" => serde_json::from_value(value).map(Instrument::MutualFund),
            "CASH_EQUIVALENT" => serde_json::from_value(value).map(Instrument::CashEquivalent),
            "FIXED_INCOME" => serde_json::from_value(value).map(Instrument::FixedIncome),
            _ => return Err(D::Error::custom(UnsupportedAssetType(asset_type))),
        };
        decoded.map_err(D::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Equity {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cusip: Option<String>,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionContract {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cusip: Option<String>,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `VANILLA`, `BINARY` or `BARRIER`.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub option_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub put_call: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub underlying_symbol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub option_multiplier: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub option_deliverables: Vec<OptionDeliverable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionDeliverable {
    pub symbol: String,
    pub deliverable_units: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutualFund {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cusip: Option<String>,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub fund_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashEquivalent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cusip: Option<String>,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// `SAVINGS` or `MONEY_MARKET_FUND`.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub cash_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixedIncome {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cusip: Option<String>,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maturity_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub factor: Option<f64>,
}
