use std::str::FromStr;

use crate::api::{path_segment, ApiError, ApiResult, Mover, TdAmeritradeClient};

#[derive(Clone)]
pub struct MoverService {
    client: TdAmeritradeClient,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChangeType {
    #[default]
    Percent,
    Value,
}

/// Which movers to return; defaults to the top gainers by percent.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoverOptions {
    pub direction: Direction,
    pub change: ChangeType,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl ChangeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeType::Percent => "percent",
            ChangeType::Value => "value",
        }
    }
}

impl FromStr for Direction {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(Direction::Up),
            "down" => Ok(Direction::Down),
            other => Err(ApiError::InvalidArgument(format!(
                "invalid direction '{other}', must be one of [up down]"
            ))),
        }
    }
}

impl FromStr for ChangeType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "percent" => Ok(ChangeType::Percent),
            "value" => Ok(ChangeType::Value),
            other => Err(ApiError::InvalidArgument(format!(
                "invalid change type '{other}', must be one of [value percent]"
            ))),
        }
    }
}

impl MoverOptions {
    fn into_query(self) -> Vec<(&'static str, String)> {
        vec![
            ("direction", self.direction.as_str().to_owned()),
            ("change", self.change.as_str().to_owned()),
        ]
    }
}

impl MoverService {
    pub fn new(client: TdAmeritradeClient) -> Self {
        Self { client }
    }

    /// Top movers of an index such as `$SPX.X`, `$COMPX` or `$DJI`.
    pub async fn get(&self, index: &str, options: MoverOptions) -> ApiResult<Vec<Mover>> {
        let index = path_segment("index", index)?;
        self.client
            .get(&format!("marketdata/{index}/movers"), &options.into_query())
            .await
    }
}
