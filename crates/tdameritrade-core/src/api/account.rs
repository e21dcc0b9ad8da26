use serde::{Deserialize, Serialize};

use super::Instrument;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub securities_account: SecuritiesAccount,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritiesAccount {
    /// `CASH` or `MARGIN`.
    #[serde(rename = "type")]
    pub account_type: String,
    pub account_id: String,
    #[serde(default)]
    pub round_trips: f64,
    #[serde(default)]
    pub is_day_trader: bool,
    #[serde(default)]
    pub is_closing_only_restricted: bool,
    /// Only populated when requested with `fields=positions`.
    #[serde(default)]
    pub positions: Vec<Position>,
    /// Only populated when requested with `fields=orders`.
    #[serde(default)]
    pub order_strategies: Vec<Order>,
    pub initial_balances: Option<Balance>,
    pub current_balances: Option<Balance>,
    pub projected_balances: Option<Balance>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    #[serde(default)]
    pub short_quantity: f64,
    #[serde(default)]
    pub average_price: f64,
    #[serde(default)]
    pub current_day_profit_loss: f64,
    #[serde(default)]
    pub current_day_profit_loss_percentage: f64,
    #[serde(default)]
    pub long_quantity: f64,
    pub settled_long_quantity: Option<f64>,
    pub settled_short_quantity: Option<f64>,
    pub aged_quantity: Option<f64>,
    pub instrument: Instrument,
    #[serde(default)]
    pub market_value: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balance {
    pub accrued_interest: Option<f64>,
    pub cash_balance: Option<f64>,
    pub cash_receipts: Option<f64>,
    pub long_option_market_value: Option<f64>,
    pub liquidation_value: Option<f64>,
    pub long_market_value: Option<f64>,
    pub money_market_fund: Option<f64>,
    pub savings: Option<f64>,
    pub short_market_value: Option<f64>,
    pub pending_deposits: Option<f64>,
    pub cash_available_for_trading: Option<f64>,
    pub cash_available_for_withdrawal: Option<f64>,
    pub cash_call: Option<f64>,
    pub long_non_marginable_market_value: Option<f64>,
    pub total_cash: Option<f64>,
    pub short_option_market_value: Option<f64>,
    pub mutual_fund_value: Option<f64>,
    pub bond_value: Option<f64>,
    pub cash_debit_call_value: Option<f64>,
    pub unsettled_cash: Option<f64>,
}

/// Order as placed, replaced or reported by the API.
///
/// Fields the API fills in (ids, status, fills) are optional so the same type can be used to
/// build a new order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_time: Option<CancelTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complex_order_strategy_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filled_quantity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_quantity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_destination: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activation_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_instruction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_lot_method: Option<String>,
    #[serde(default)]
    pub order_leg_collection: Vec<OrderLeg>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_strategy_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub editable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entered_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub close_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_activity_collection: Vec<Execution>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replacing_order_collection: Vec<Order>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_order_strategies: Vec<Order>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_description: Option<String>,
}

impl Order {
    /// Day limit order for a single instrument, e.g. `instruction = "BUY"`.
    pub fn limit(instrument: Instrument, instruction: &str, quantity: f64, price: f64) -> Self {
        Self {
            session: Some("NORMAL".into()),
            duration: Some("DAY".into()),
            order_type: Some("LIMIT".into()),
            price: Some(price),
            order_strategy_type: Some("SINGLE".into()),
            order_leg_collection: vec![OrderLeg {
                order_leg_type: None,
                leg_id: None,
                instrument,
                instruction: instruction.to_owned(),
                position_effect: None,
                quantity,
                quantity_type: None,
            }],
            ..Self::default()
        }
    }

    /// Day market order for a single instrument.
    pub fn market(instrument: Instrument, instruction: &str, quantity: f64) -> Self {
        Self {
            order_type: Some("MARKET".into()),
            price: None,
            ..Self::limit(instrument, instruction, quantity, 0.0)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default)]
    pub short_format: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLeg {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_leg_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leg_id: Option<i64>,
    pub instrument: Instrument,
    pub instruction: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_effect: Option<String>,
    pub quantity: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Execution {
    /// `EXECUTION` or `ORDER_ACTION`.
    pub activity_type: String,
    pub execution_type: Option<String>,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub order_remaining_quantity: f64,
    #[serde(default)]
    pub execution_legs: Vec<ExecutionLeg>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionLeg {
    pub leg_id: i64,
    pub quantity: f64,
    #[serde(default)]
    pub mismarked_quantity: f64,
    pub price: f64,
    pub time: String,
}
