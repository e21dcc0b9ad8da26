use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::api::{path_segment, ApiError, ApiResult, TdAmeritradeClient, Transaction};

#[derive(Clone)]
pub struct TransactionService {
    client: TdAmeritradeClient,
}

/// Category filter accepted by the transaction history endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    All,
    Trade,
    BuyOnly,
    SellOnly,
    CashInOrCashOut,
    Checking,
    Dividend,
    Interest,
    Other,
    AdvisorFees,
}

impl TransactionType {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionType::All => "ALL",
            TransactionType::Trade => "TRADE",
            TransactionType::BuyOnly => "BUY_ONLY",
            TransactionType::SellOnly => "SELL_ONLY",
            TransactionType::CashInOrCashOut => "CASH_IN_OR_CASH_OUT",
            TransactionType::Checking => "CHECKING",
            TransactionType::Dividend => "DIVIDEND",
            TransactionType::Interest => "INTEREST",
            TransactionType::Other => "OTHER",
            TransactionType::AdvisorFees => "ADVISOR_FEES",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "ALL" => Ok(TransactionType::All),
            "TRADE" => Ok(TransactionType::Trade),
            "BUY_ONLY" => Ok(TransactionType::BuyOnly),
            "SELL_ONLY" => Ok(TransactionType::SellOnly),
            "CASH_IN_OR_CASH_OUT" => Ok(TransactionType::CashInOrCashOut),
            "CHECKING" => Ok(TransactionType::Checking),
            "DIVIDEND" => Ok(TransactionType::Dividend),
            "INTEREST" => Ok(TransactionType::Interest),
            "OTHER" => Ok(TransactionType::Other),
            "ADVISOR_FEES" => Ok(TransactionType::AdvisorFees),
            other => Err(ApiError::InvalidArgument(format!(
                "invalid transaction type '{other}'"
            ))),
        }
    }
}

/// Filters for an account's transaction history. Dates are UTC calendar days.
#[derive(Debug, Clone, Default)]
pub struct TransactionQuery {
    pub transaction_type: Option<TransactionType>,
    pub symbol: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl TransactionQuery {
    fn into_query(self) -> ApiResult<Vec<(&'static str, String)>> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(ApiError::InvalidArgument(
                    "startDate is after endDate".into(),
                ));
            }
        }
        let mut query = Vec::new();
        if let Some(kind) = self.transaction_type {
            query.push(("type", kind.as_str().to_owned()));
        }
        if let Some(symbol) = self.symbol.filter(|symbol| !symbol.is_empty()) {
            query.push(("symbol", symbol));
        }
        if let Some(start) = self.start_date {
            query.push(("startDate", start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = self.end_date {
            query.push(("endDate", end.format("%Y-%m-%d").to_string()));
        }
        Ok(query)
    }
}

impl TransactionService {
    pub fn new(client: TdAmeritradeClient) -> Self {
        Self { client }
    }

    pub async fn get(&self, account_id: &str, transaction_id: i64) -> ApiResult<Transaction> {
        let account_id = path_segment("account id", account_id)?;
        self.client
            .get(
                &format!("accounts/{account_id}/transactions/{transaction_id}"),
                &[],
            )
            .await
    }

    pub async fn list(
        &self,
        account_id: &str,
        query: TransactionQuery,
    ) -> ApiResult<Vec<Transaction>> {
        let account_id = path_segment("account id", account_id)?;
        self.client
            .get(
                &format!("accounts/{account_id}/transactions"),
                &query.into_query()?,
            )
            .await
    }
}
