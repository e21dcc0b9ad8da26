use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

use crate::api::{ApiError, ApiResult, MarketHours, TdAmeritradeClient};

#[derive(Clone)]
pub struct MarketHoursService {
    client: TdAmeritradeClient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Market {
    Equity,
    Option,
    Future,
    Bond,
    Forex,
}

impl Market {
    pub fn as_str(self) -> &'static str {
        match self {
            Market::Equity => "EQUITY",
            Market::Option => "OPTION",
            Market::Future => "FUTURE",
            Market::Bond => "BOND",
            Market::Forex => "FOREX",
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Market {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "EQUITY" => Ok(Market::Equity),
            "OPTION" => Ok(Market::Option),
            "FUTURE" => Ok(Market::Future),
            "BOND" => Ok(Market::Bond),
            "FOREX" => Ok(Market::Forex),
            other => Err(ApiError::InvalidArgument(format!("invalid market '{other}'"))),
        }
    }
}

impl MarketHoursService {
    pub fn new(client: TdAmeritradeClient) -> Self {
        Self { client }
    }

    /// Hours for several markets on `date` (today when `None`).
    pub async fn get_multi(&self, markets: &[Market], date: Option<NaiveDate>) -> ApiResult<MarketHours> {
        if markets.is_empty() {
            return Err(ApiError::InvalidArgument("no markets present".into()));
        }
        let markets = markets
            .iter()
            .map(|market| market.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let mut query = vec![("markets", markets)];
        query.extend(date_param(date));
        self.client.get("marketdata/hours", &query).await
    }

    /// Hours for a single market on `date` (today when `None`).
    pub async fn get(&self, market: Market, date: Option<NaiveDate>) -> ApiResult<MarketHours> {
        let query: Vec<_> = date_param(date).into_iter().collect();
        self.client
            .get(&format!("marketdata/{}/hours", market.as_str()), &query)
            .await
    }
}

fn date_param(date: Option<NaiveDate>) -> Option<(&'static str, String)> {
    date.map(|date| ("date", date.format("%Y-%m-%d").to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credential;
    use httpmock::prelude::*;

    fn client(server: &MockServer) -> TdAmeritradeClient {
        let credential = Credential::new("token".into(), None, None);
        TdAmeritradeClient::with_base_url(&credential, &server.url("/v1/")).unwrap()
    }

    fn equity_hours() -> serde_json::Value {
        serde_json::json!({
            "equity": {
                "EQ": {
                    "category": "",
                    "date": "2024-07-01",
                    "exchange": "NULL",
                    "isOpen": true,
                    "marketType": "EQUITY",
                    "product": "EQ",
                    "productName": "equity",
                    "sessionHours": {
                        "regularMarket": [
                            { "start": "2024-07-01T09:30:00-04:00", "end": "2024-07-01T16:00:00-04:00" }
                        ]
                    }
                }
            }
        })
    }

    #[tokio::test]
    async fn hours_for_several_markets_on_a_date() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET)
                .path("/v1/marketdata/hours")
                .query_param("markets", "EQUITY,OPTION")
                .query_param("date", "2024-07-01");
            then.status(200).json_body_obj(&equity_hours());
        });

        let date = NaiveDate::from_ymd_opt(2024, 7, 1);
        let hours = client(&server)
            .market_hours()
            .get_multi(&[Market::Equity, Market::Option], date)
            .await
            .unwrap();
        mock.assert();
        let eq = &hours["equity"]["EQ"];
        assert!(eq.is_open);
        assert_eq!(eq.session_hours.as_ref().unwrap().regular_market.len(), 1);
    }

    #[tokio::test]
    async fn hours_for_one_market_today() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/v1/marketdata/EQUITY/hours");
            then.status(200).json_body_obj(&equity_hours());
        });

        let hours = client(&server)
            .market_hours()
            .get(Market::Equity, None)
            .await
            .unwrap();
        mock.assert();
        assert!(hours.contains_key("equity"));
    }

    #[tokio::test]
    async fn markets_are_required() {
        let server = MockServer::start();
        let err = client(&server)
            .market_hours()
            .get_multi(&[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidArgument(msg) if msg == "no markets present"));
        assert_eq!("forex".parse::<Market>().unwrap(), Market::Forex);
        assert!("crypto".parse::<Market>().is_err());
    }
}
