use chrono::NaiveDate;
use reqwest::header::LOCATION;
use reqwest::Method;

use crate::api::{path_segment, Account, ApiError, ApiResult, Order, TdAmeritradeClient};

#[derive(Clone)]
pub struct AccountService {
    client: TdAmeritradeClient,
}

/// Optional sections to include with account payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountFields {
    pub positions: bool,
    pub orders: bool,
}

impl AccountFields {
    fn into_query(self) -> Vec<(&'static str, String)> {
        let mut fields = Vec::new();
        if self.positions {
            fields.push("positions");
        }
        if self.orders {
            fields.push("orders");
        }
        if fields.is_empty() {
            Vec::new()
        } else {
            vec![("fields", fields.join(","))]
        }
    }
}

/// Filters for listing an account's orders.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    pub max_results: Option<u32>,
    pub from_entered_time: Option<NaiveDate>,
    pub to_entered_time: Option<NaiveDate>,
    /// Order status such as `WORKING` or `FILLED`.
    pub status: Option<String>,
}

impl OrderQuery {
    fn into_query(self) -> ApiResult<Vec<(&'static str, String)>> {
        if let (Some(from), Some(to)) = (self.from_entered_time, self.to_entered_time) {
            if from > to {
                return Err(ApiError::InvalidArgument(
                    "fromEnteredTime is after toEnteredTime".into(),
                ));
            }
        }
        let mut query = Vec::new();
        if let Some(max) = self.max_results {
            query.push(("maxResults", max.to_string()));
        }
        if let Some(from) = self.from_entered_time {
            query.push(("fromEnteredTime", from.format("%Y-%m-%d").to_string()));
        }
        if let Some(to) = self.to_entered_time {
            query.push(("toEnteredTime", to.format("%Y-%m-%d").to_string()));
        }
        if let Some(status) = self.status {
            query.push(("status", status.to_ascii_uppercase()));
        }
        Ok(query)
    }
}

impl AccountService {
    pub fn new(client: TdAmeritradeClient) -> Self {
        Self { client }
    }

    pub async fn list(&self, fields: AccountFields) -> ApiResult<Vec<Account>> {
        self.client.get("accounts", &fields.into_query()).await
    }

    pub async fn get(&self, account_id: &str, fields: AccountFields) -> ApiResult<Account> {
        let account_id = path_segment("account id", account_id)?;
        self.client
            .get(&format!("accounts/{account_id}"), &fields.into_query())
            .await
    }

    /// Place an order. Returns the new order id when the API reports it.
    pub async fn place_order(&self, account_id: &str, order: &Order) -> ApiResult<Option<i64>> {
        let account_id = path_segment("account id", account_id)?;
        let headers = self
            .client
            .send(
                Method::POST,
                &format!("accounts/{account_id}/orders"),
                Some(order),
            )
            .await?;
        Ok(headers
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|location| location.trim_end_matches('/').rsplit('/').next())
            .and_then(|id| id.parse().ok()))
    }

    pub async fn replace_order(&self, account_id: &str, order_id: i64, order: &Order) -> ApiResult<()> {
        let account_id = path_segment("account id", account_id)?;
        self.client
            .send(
                Method::PUT,
                &format!("accounts/{account_id}/orders/{order_id}"),
                Some(order),
            )
            .await?;
        Ok(())
    }

    pub async fn cancel_order(&self, account_id: &str, order_id: i64) -> ApiResult<()> {
        let account_id = path_segment("account id", account_id)?;
        self.client
            .send::<()>(
                Method::DELETE,
                &format!("accounts/{account_id}/orders/{order_id}"),
                None,
            )
            .await?;
        Ok(())
    }

    pub async fn get_order(&self, account_id: &str, order_id: i64) -> ApiResult<Order> {
        let account_id = path_segment("account id", account_id)?;
        self.client
            .get(&format!("accounts/{account_id}/orders/{order_id}"), &[])
            .await
    }

    pub async fn list_orders(&self, account_id: &str, query: OrderQuery) -> ApiResult<Vec<Order>> {
        let account_id = path_segment("account id", account_id)?;
        self.client
            .get(&format!("accounts/{account_id}/orders"), &query.into_query()?)
            .await
    }
}
