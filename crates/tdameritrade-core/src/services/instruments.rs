use std::fmt;
use std::str::FromStr;

use crate::api::{path_segment, ApiError, ApiResult, InstrumentInfo, Instruments, TdAmeritradeClient};

#[derive(Clone)]
pub struct InstrumentService {
    client: TdAmeritradeClient,
}

/// How the instruments endpoint interprets the `symbol` argument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Projection {
    /// Exact symbol lookup.
    #[default]
    SymbolSearch,
    /// Regular expression over symbols, e.g. `XYZ.*`.
    SymbolRegex,
    /// Substring search over descriptions.
    DescSearch,
    /// Regular expression over descriptions.
    DescRegex,
    /// Symbol lookup including fundamental data.
    Fundamental,
}

impl Projection {
    pub fn as_str(self) -> &'static str {
        match self {
            Projection::SymbolSearch => "symbol-search",
            Projection::SymbolRegex => "symbol-regex",
            Projection::DescSearch => "desc-search",
            Projection::DescRegex => "desc-regex",
            Projection::Fundamental => "fundamental",
        }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Projection {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "symbol-search" => Ok(Projection::SymbolSearch),
            "symbol-regex" => Ok(Projection::SymbolRegex),
            "desc-search" => Ok(Projection::DescSearch),
            "desc-regex" => Ok(Projection::DescRegex),
            "fundamental" => Ok(Projection::Fundamental),
            other => Err(ApiError::InvalidArgument(format!(
                "invalid projection '{other}'"
            ))),
        }
    }
}

impl InstrumentService {
    pub fn new(client: TdAmeritradeClient) -> Self {
        Self { client }
    }

    /// Search instruments; results are keyed by symbol.
    pub async fn search(&self, symbol: &str, projection: Projection) -> ApiResult<Instruments> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(ApiError::InvalidArgument("no symbol present".into()));
        }
        self.client
            .get(
                "instruments",
                &[
                    ("symbol", symbol.to_owned()),
                    ("projection", projection.as_str().to_owned()),
                ],
            )
            .await
    }

    /// Look an instrument up by CUSIP.
    pub async fn get(&self, cusip: &str) -> ApiResult<Vec<InstrumentInfo>> {
        let cusip = path_segment("cusip", cusip)?;
        self.client.get(&format!("instruments/{cusip}"), &[]).await
    }
}
