use chrono::{DateTime, Utc};
use tracing::debug;

use crate::api::{path_segment, ApiError, ApiResult, PriceHistory, TdAmeritradeClient};

#[derive(Clone)]
pub struct PriceHistoryService {
    client: TdAmeritradeClient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodType {
    Day,
    Month,
    Year,
    Ytd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrequencyType {
    Minute,
    Daily,
    Weekly,
    Monthly,
}

impl PeriodType {
    pub fn as_str(self) -> &'static str {
        match self {
            PeriodType::Day => "day",
            PeriodType::Month => "month",
            PeriodType::Year => "year",
            PeriodType::Ytd => "ytd",
        }
    }
}

impl FrequencyType {
    pub fn as_str(self) -> &'static str {
        match self {
            FrequencyType::Minute => "minute",
            FrequencyType::Daily => "daily",
            FrequencyType::Weekly => "weekly",
            FrequencyType::Monthly => "monthly",
        }
    }
}

/// Candle selection. Unset fields fall back to the API defaults (10 days of 1-minute bars).
#[derive(Debug, Clone, Default)]
pub struct PriceHistoryOptions {
    pub period_type: Option<PeriodType>,
    pub period: Option<u32>,
    pub frequency_type: Option<FrequencyType>,
    pub frequency: Option<u32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub need_extended_hours_data: Option<bool>,
}

impl PriceHistoryOptions {
    fn into_query(self) -> ApiResult<Vec<(&'static str, String)>> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(ApiError::InvalidArgument(
                    "start date is after end date".into(),
                ));
            }
        }

        let mut query = Vec::new();
        if let Some(period_type) = self.period_type {
            query.push(("periodType", period_type.as_str().to_owned()));
        }
        if let Some(period) = self.period {
            query.push(("period", period.to_string()));
        }
        if let Some(frequency_type) = self.frequency_type {
            query.push(("frequencyType", frequency_type.as_str().to_owned()));
        }
        if let Some(frequency) = self.frequency {
            query.push(("frequency", frequency.to_string()));
        }
        if let Some(start) = self.start_date {
            query.push(("startDate", start.timestamp_millis().to_string()));
        }
        if let Some(end) = self.end_date {
            query.push(("endDate", end.timestamp_millis().to_string()));
        }
        if let Some(extended) = self.need_extended_hours_data {
            query.push(("needExtendedHoursData", extended.to_string()));
        }
        Ok(query)
    }
}

impl PriceHistoryService {
    pub fn new(client: TdAmeritradeClient) -> Self {
        Self { client }
    }

    /// Candles for `symbol`. An empty result is reported as [`ApiError::NoData`].
    pub async fn get(&self, symbol: &str, options: PriceHistoryOptions) -> ApiResult<PriceHistory> {
        let symbol = path_segment("symbol", symbol)?;
        let query = options.into_query()?;
        let history: PriceHistory = self
            .client
            .get(&format!("marketdata/{symbol}/pricehistory"), &query)
            .await?;
        if history.empty {
            debug!(symbol, "price history is empty");
            return Err(ApiError::NoData(symbol.to_owned()));
        }
        Ok(history)
    }
}
