//! Client library for the TD Ameritrade REST API: OAuth2 authorization-code login with
//! pluggable credential storage, and typed accessors for market data and accounts.

pub mod api;
pub mod auth;
pub mod config;
pub mod services;
