use serde::{Deserialize, Serialize};

/// Entry of an account's transaction history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// `TRADE`, `DIVIDEND_OR_INTEREST`, `ACH_RECEIPT`, ...
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub transaction_id: i64,
    pub transaction_sub_type: Option<String>,
    pub description: Option<String>,
    pub transaction_date: Option<String>,
    pub settlement_date: Option<String>,
    pub order_date: Option<String>,
    /// Broker order reference, e.g. `T1234567890`.
    pub order_id: Option<String>,
    pub clearing_reference_number: Option<String>,
    pub sub_account: Option<String>,
    pub ach_status: Option<String>,
    #[serde(default)]
    pub net_amount: f64,
    #[serde(default)]
    pub sma: f64,
    #[serde(default)]
    pub requirement_reallocation_amount: f64,
    #[serde(default)]
    pub day_trade_buying_power_effect: f64,
    #[serde(default)]
    pub accrued_interest: f64,
    #[serde(default)]
    pub cash_balance_effect_flag: bool,
    #[serde(default)]
    pub fees: TransactionFees,
    pub transaction_item: Option<TransactionItem>,
}

impl Transaction {
    /// Sum of every fee charged on the transaction.
    pub fn total_fees(&self) -> f64 {
        let fees = &self.fees;
        fees.additional_fee
            + fees.cdsc_fee
            + fees.commission
            + fees.opt_reg_fee
            + fees.other_charges
            + fees.r_fee
            + fees.reg_fee
            + fees.sec_fee
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionFees {
    pub additional_fee: f64,
    pub cdsc_fee: f64,
    pub commission: f64,
    pub opt_reg_fee: f64,
    pub other_charges: f64,
    pub r_fee: f64,
    pub reg_fee: f64,
    pub sec_fee: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionItem {
    pub account_id: Option<i64>,
    pub amount: Option<f64>,
    pub price: Option<f64>,
    pub cost: Option<f64>,
    pub parent_order_key: Option<i64>,
    pub parent_child_indicator: Option<String>,
    pub instruction: Option<String>,
    pub position_effect: Option<String>,
    pub instrument: Option<TransactionInstrument>,
}

/// Instrument as reported in transaction history. Unlike positions, the API sends a flat record
/// here rather than an `assetType`-specific shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInstrument {
    pub symbol: Option<String>,
    pub underlying_symbol: Option<String>,
    pub option_expiration_date: Option<String>,
    pub option_strike_price: Option<f64>,
    pub put_call: Option<String>,
    pub cusip: Option<String>,
    pub description: Option<String>,
    pub asset_type: Option<String>,
    pub bond_maturity_date: Option<String>,
    pub bond_interest_rate: Option<f64>,
}
