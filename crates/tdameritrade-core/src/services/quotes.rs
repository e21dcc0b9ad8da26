use crate::api::{ApiError, ApiResult, Quotes, TdAmeritradeClient};

#[derive(Clone)]
pub struct QuoteService {
    client: TdAmeritradeClient,
}

impl QuoteService {
    pub fn new(client: TdAmeritradeClient) -> Self {
        Self { client }
    }

    /// Latest quotes for one or more symbols, keyed by symbol.
    pub async fn get<S: AsRef<str>>(&self, symbols: &[S]) -> ApiResult<Quotes> {
        let symbols = join_symbols(symbols)?;
        self.client
            .get("marketdata/quotes", &[("symbol", symbols)])
            .await
    }
}

fn join_symbols<S: AsRef<str>>(symbols: &[S]) -> ApiResult<String> {
    let joined = symbols
        .iter()
        .map(|symbol| symbol.as_ref().trim())
        .filter(|symbol| !symbol.is_empty())
        .collect::<Vec<_>>()
        .join(",");
    if joined.is_empty() {
        return Err(ApiError::InvalidArgument("no symbols present".into()));
    }
    Ok(joined)
}
