use std::env;

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tdameritrade_core::api::{
    Account, Hours, InstrumentInfo, MarketHours, Mover, Quotes, TdAmeritradeClient, Transaction,
    Watchlist,
};
use tdameritrade_core::auth::{
    run_loopback_flow, run_manual_flow, AuthError, AuthRequest, Authenticator, CredentialStore,
    FileCredentialStore, FlowPreference, LoginFlow, OAuthConfig,
};
use tdameritrade_core::services::{
    AccountFields, ChangeType, Direction, Market, MoverOptions, Projection, TransactionQuery,
    TransactionType,
};
use tokio::task;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use url::Url;

const DEFAULT_PROFILE: &str = "default";
const DEFAULT_REDIRECT_URI: &str = "https://127.0.0.1:8080/callback";

#[derive(Parser, Debug)]
#[command(author, version, about = "TD Ameritrade terminal CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Authentication related commands
    #[command(subcommand)]
    Auth(AuthCommand),
    /// Show quotes for one or more symbols
    Quote(QuoteArgs),
    /// Instrument reference data
    #[command(subcommand)]
    Instrument(InstrumentCommand),
    /// Market hours
    Hours(HoursArgs),
    /// Top movers of an index
    Movers(MoversArgs),
    /// Brokerage accounts
    #[command(subcommand)]
    Account(AccountCommand),
    /// Watchlists
    #[command(subcommand)]
    Watchlist(WatchlistCommand),
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// Log in to TD Ameritrade with the OAuth authorization-code flow
    Login(LoginArgs),
    /// Forget stored credentials for a profile
    Logout(ProfileArgs),
}

#[derive(Args, Debug)]
struct ProfileArgs {
    /// Profile name for stored credentials
    #[arg(long, default_value = DEFAULT_PROFILE)]
    profile: String,
}

#[derive(Args, Debug)]
struct LoginArgs {
    #[command(flatten)]
    profile: ProfileArgs,
    /// Paste the redirect URL instead of listening for the callback
    #[arg(long)]
    manual: bool,
}

#[derive(Args, Debug)]
struct QuoteArgs {
    /// Ticker symbols, e.g. AAPL MSFT
    #[arg(required = true)]
    symbols: Vec<String>,
    #[command(flatten)]
    profile: ProfileArgs,
    /// Output raw JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum InstrumentCommand {
    /// Search instruments by symbol or description
    Search(InstrumentSearchArgs),
}

#[derive(Args, Debug)]
struct InstrumentSearchArgs {
    /// Symbol, or a pattern for the regex/description projections
    symbol: String,
    /// symbol-search, symbol-regex, desc-search, desc-regex or fundamental
    #[arg(long, default_value = "symbol-search")]
    projection: Projection,
    #[command(flatten)]
    profile: ProfileArgs,
    /// Output raw JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct HoursArgs {
    /// Markets: EQUITY, OPTION, FUTURE, BOND, FOREX
    #[arg(required = true)]
    markets: Vec<Market>,
    /// Trading day (YYYY-MM-DD); defaults to today
    #[arg(long)]
    date: Option<NaiveDate>,
    #[command(flatten)]
    profile: ProfileArgs,
    /// Output raw JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct MoversArgs {
    /// Index symbol: $COMPX, $DJI or $SPX.X
    index: String,
    /// up or down
    #[arg(long, default_value = "up")]
    direction: Direction,
    /// percent or value
    #[arg(long, default_value = "percent")]
    change: ChangeType,
    #[command(flatten)]
    profile: ProfileArgs,
    /// Output raw JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum AccountCommand {
    /// List linked accounts with balances
    List(AccountListArgs),
    /// Transaction history of an account
    Transactions(TransactionArgs),
}

#[derive(Args, Debug)]
struct TransactionArgs {
    /// Account id
    account_id: String,
    /// all, trade, buy-only, sell-only, cash-in-or-cash-out, checking, dividend, interest,
    /// other or advisor-fees
    #[arg(long = "type")]
    transaction_type: Option<TransactionType>,
    /// Only transactions for this symbol
    #[arg(long)]
    symbol: Option<String>,
    /// First day (YYYY-MM-DD, UTC)
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Last day (YYYY-MM-DD, UTC)
    #[arg(long)]
    end: Option<NaiveDate>,
    #[command(flatten)]
    profile: ProfileArgs,
    /// Output raw JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum WatchlistCommand {
    /// List watchlists, for one account or all linked accounts
    List(WatchlistListArgs),
}

#[derive(Args, Debug)]
struct WatchlistListArgs {
    /// Account id; omit for every linked account
    account_id: Option<String>,
    #[command(flatten)]
    profile: ProfileArgs,
    /// Output raw JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct AccountListArgs {
    /// Include positions
    #[arg(long)]
    positions: bool,
    /// Include working and recent orders
    #[arg(long)]
    orders: bool,
    #[command(flatten)]
    profile: ProfileArgs,
    /// Output raw JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Auth(cmd) => match cmd {
            AuthCommand::Login(args) => auth_login(args).await?,
            AuthCommand::Logout(args) => auth_logout(args)?,
        },
        Commands::Quote(args) => quote(args).await?,
        Commands::Instrument(cmd) => match cmd {
            InstrumentCommand::Search(args) => instrument_search(args).await?,
        },
        Commands::Hours(args) => hours(args).await?,
        Commands::Movers(args) => movers(args).await?,
        Commands::Account(cmd) => match cmd {
            AccountCommand::List(args) => account_list(args).await?,
            AccountCommand::Transactions(args) => account_transactions(args).await?,
        },
        Commands::Watchlist(cmd) => match cmd {
            WatchlistCommand::List(args) => watchlist_list(args).await?,
        },
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn auth_login(args: LoginArgs) -> Result<()> {
    let profile = args.profile.profile;
    let store = FileCredentialStore::with_default_locator(&profile)
        .context("unable to initialise credential store")?;
    let mut authenticator =
        Authenticator::new(store, build_oauth_config()?).context("failed to build OAuth client")?;
    if let Some(base_url) = api_base_url()? {
        authenticator = authenticator.with_api_base_url(base_url);
    }

    let preference = FlowPreference::detect(&authenticator.config().redirect_uri);
    let flow = if args.manual {
        LoginFlow::Manual
    } else {
        preference.preferred()
    };

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let result = match flow {
        LoginFlow::Loopback => {
            match run_loopback_flow(
                &authenticator,
                &cancel,
                preference.browser_available(),
                print_authorization_url,
            )
            .await
            {
                Err(err) => match manual_fallback_reason(&err) {
                    Some(reason) => {
                        eprintln!("{reason}; falling back to manual copy/paste flow.");
                        manual_login(&authenticator, &cancel).await
                    }
                    None => Err(err),
                },
                ok => ok,
            }
        }
        LoginFlow::Manual => manual_login(&authenticator, &cancel).await,
    };
    interrupt.abort();
    let client = result.context("login failed")?;

    println!("Login succeeded. Credentials stored for profile '{}'.", profile);
    match client.accounts().list(AccountFields::default()).await {
        Ok(accounts) => {
            let ids = accounts
                .iter()
                .map(|account| account.securities_account.account_id.as_str())
                .collect::<Vec<_>>();
            if !ids.is_empty() {
                println!("Linked accounts: {}", ids.join(", "));
            }
        }
        Err(err) => eprintln!("Login succeeded but the accounts request failed: {err}"),
    }

    let stored = authenticator
        .store()
        .get_token(&AuthRequest::new(authenticator.config().redirect_uri.clone()))
        .context("failed to read stored credentials")?;
    if let Some(expiry) = stored.and_then(|credential| credential.expires_at) {
        println!("Token expires at {} (UTC).", expiry);
    }

    Ok(())
}

/// Loopback failures that happen before any callback could arrive, so retrying with the
/// manual flow is safe.
fn manual_fallback_reason(err: &AuthError) -> Option<String> {
    match err {
        AuthError::BrowserLaunch(reason) => Some(format!("Failed to launch browser ({reason})")),
        AuthError::UnsupportedFlow(reason) => Some(format!("Loopback login unavailable ({reason})")),
        AuthError::Bind(err) => Some(format!("Unable to listen on the redirect URI ({err})")),
        _ => None,
    }
}

async fn manual_login(
    authenticator: &Authenticator<FileCredentialStore>,
    cancel: &CancellationToken,
) -> Result<TdAmeritradeClient, AuthError> {
    run_manual_flow(
        authenticator,
        cancel,
        false,
        print_authorization_url,
        prompt_for_redirect,
    )
    .await
}

fn auth_logout(args: ProfileArgs) -> Result<()> {
    let store = FileCredentialStore::with_default_locator(&args.profile)
        .context("unable to initialise credential store")?;
    store
        .delete()
        .context("failed to remove stored credentials")?;
    println!("Deleted credentials for profile '{}'.", args.profile);
    Ok(())
}

fn build_oauth_config() -> Result<OAuthConfig> {
    let client_id = non_empty_env("TDAMERITRADE_CLIENT_ID").ok_or_else(|| {
        anyhow!("TDAMERITRADE_CLIENT_ID is not set; use the consumer key of your TD Ameritrade app")
    })?;

    let redirect = non_empty_env("TDAMERITRADE_REDIRECT_URI")
        .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_owned());
    let redirect_uri = Url::parse(&redirect).context("invalid TDAMERITRADE_REDIRECT_URI")?;

    let mut config = OAuthConfig::new(client_id, redirect_uri);
    if let Some(secret) = non_empty_env("TDAMERITRADE_CLIENT_SECRET") {
        config = config.with_secret(secret);
    }
    Ok(config)
}

fn api_base_url() -> Result<Option<Url>> {
    non_empty_env("TDAMERITRADE_API_URL")
        .map(|raw| Url::parse(&raw).context("invalid TDAMERITRADE_API_URL"))
        .transpose()
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

async fn prompt_for_redirect() -> Result<String, AuthError> {
    task::spawn_blocking(|| {
        use std::io::{self, Write};
        print!("Paste the full URL your browser was redirected to: ");
        io::stdout().flush().map_err(AuthError::Io)?;
        let mut input = String::new();
        io::stdin().read_line(&mut input).map_err(AuthError::Io)?;
        Ok(input.trim().to_owned())
    })
    .await
    .map_err(|_| AuthError::Cancelled)?
}

fn print_authorization_url(url: &Url) -> Result<(), AuthError> {
    println!("\nAuthorize the application by visiting:\n  {}\n", url);
    Ok(())
}

/// Build an API client from the credentials stored for `profile`.
fn load_client(profile: &str) -> Result<TdAmeritradeClient> {
    let store = FileCredentialStore::with_default_locator(profile)
        .context("unable to initialise credential store")?;
    let credential = store
        .get_token(&AuthRequest::from_target("/").context("invalid request target")?)
        .context("failed to read stored credentials")?
        .ok_or_else(|| {
            anyhow!(
                "no credentials stored for profile '{}'; run `tdameritrade auth login`",
                profile
            )
        })?;
    if credential.is_expired() {
        eprintln!(
            "Stored access token for profile '{}' has expired; run `tdameritrade auth login` if requests fail.",
            profile
        );
    }

    let client = match api_base_url()? {
        Some(base_url) => TdAmeritradeClient::with_base_url(&credential, base_url.as_str()),
        None => TdAmeritradeClient::from_credential(&credential),
    }
    .context("failed to build API client")?;
    Ok(client)
}

async fn quote(args: QuoteArgs) -> Result<()> {
    let client = load_client(&args.profile.profile)?;
    let quotes = client
        .quotes()
        .get(&args.symbols)
        .await
        .context("quote request failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&quotes)?);
    } else {
        render_quotes(&quotes);
    }
    Ok(())
}

async fn instrument_search(args: InstrumentSearchArgs) -> Result<()> {
    let client = load_client(&args.profile.profile)?;
    let instruments = client
        .instruments()
        .search(&args.symbol, args.projection)
        .await
        .context("instrument search failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&instruments)?);
    } else {
        let mut rows = instruments.values().collect::<Vec<_>>();
        rows.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        render_instruments(&rows);
    }
    Ok(())
}

async fn hours(args: HoursArgs) -> Result<()> {
    let client = load_client(&args.profile.profile)?;
    let hours = client
        .market_hours()
        .get_multi(&args.markets, args.date)
        .await
        .context("market hours request failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&hours)?);
    } else {
        render_hours(&hours);
    }
    Ok(())
}

async fn movers(args: MoversArgs) -> Result<()> {
    let client = load_client(&args.profile.profile)?;
    let options = MoverOptions {
        direction: args.direction,
        change: args.change,
    };
    let movers = client
        .movers()
        .get(&args.index, options)
        .await
        .context("movers request failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&movers)?);
    } else {
        render_movers(&movers, args.change);
    }
    Ok(())
}

async fn account_list(args: AccountListArgs) -> Result<()> {
    let client = load_client(&args.profile.profile)?;
    let fields = AccountFields {
        positions: args.positions,
        orders: args.orders,
    };
    let accounts = client
        .accounts()
        .list(fields)
        .await
        .context("accounts request failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&accounts)?);
    } else {
        render_accounts(&accounts);
    }
    Ok(())
}

async fn account_transactions(args: TransactionArgs) -> Result<()> {
    let client = load_client(&args.profile.profile)?;
    let query = TransactionQuery {
        transaction_type: args.transaction_type,
        symbol: args.symbol,
        start_date: args.start,
        end_date: args.end,
    };
    let transactions = client
        .transactions()
        .list(&args.account_id, query)
        .await
        .context("transaction history request failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&transactions)?);
    } else {
        render_transactions(&transactions);
    }
    Ok(())
}

async fn watchlist_list(args: WatchlistListArgs) -> Result<()> {
    let client = load_client(&args.profile.profile)?;
    let watchlists = match &args.account_id {
        Some(account_id) => client.watchlists().list(account_id).await,
        None => client.watchlists().list_all().await,
    }
    .context("watchlist request failed")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&watchlists)?);
    } else {
        render_watchlists(&watchlists);
    }
    Ok(())
}

fn render_quotes(quotes: &Quotes) {
    println!(
        "{:<10} {:>12} {:>12} {:>12} {:>10} {:>14}",
        "SYMBOL", "LAST", "BID", "ASK", "CHANGE", "VOLUME"
    );
    println!("{}", "-".repeat(75));
    let mut symbols = quotes.keys().collect::<Vec<_>>();
    symbols.sort();
    for symbol in symbols {
        let quote = &quotes[symbol];
        println!(
            "{:<10} {:>12} {:>12} {:>12} {:>10} {:>14}",
            truncate(symbol, 10),
            price(quote.last_price),
            price(quote.bid_price),
            price(quote.ask_price),
            price(quote.net_change),
            quote
                .total_volume
                .map_or("-".to_string(), |volume| format!("{volume:.0}"))
        );
    }
}

fn render_instruments(instruments: &[&InstrumentInfo]) {
    println!("{:<10} {:<12} {:<10} {:<40}", "SYMBOL", "CUSIP", "TYPE", "DESCRIPTION");
    println!("{}", "-".repeat(75));
    for info in instruments {
        println!(
            "{:<10} {:<12} {:<10} {:<40}",
            truncate(&info.symbol, 10),
            info.cusip.as_deref().unwrap_or("-"),
            info.asset_type.as_deref().unwrap_or("-"),
            truncate(info.description.as_deref().unwrap_or("-"), 40)
        );
    }
}

fn render_hours(hours: &MarketHours) {
    let mut rows: Vec<&Hours> = hours.values().flat_map(|products| products.values()).collect();
    rows.sort_by(|a, b| (&a.market_type, &a.product).cmp(&(&b.market_type, &b.product)));
    println!("{:<10} {:<8} {:<11} {:<6} {:<30}", "MARKET", "PRODUCT", "DATE", "OPEN", "REGULAR SESSION");
    println!("{}", "-".repeat(70));
    for entry in rows {
        let session = entry
            .session_hours
            .as_ref()
            .and_then(|sessions| sessions.regular_market.first())
            .map_or("-".to_string(), |period| {
                format!("{} - {}", clock_time(&period.start), clock_time(&period.end))
            });
        println!(
            "{:<10} {:<8} {:<11} {:<6} {:<30}",
            entry.market_type,
            truncate(&entry.product, 8),
            entry.date,
            if entry.is_open { "yes" } else { "no" },
            session
        );
    }
}

fn render_movers(movers: &[Mover], change: ChangeType) {
    println!("{:<8} {:>10} {:>10} {:>14} {:<30}", "SYMBOL", "LAST", "CHANGE", "VOLUME", "DESCRIPTION");
    println!("{}", "-".repeat(75));
    for mover in movers {
        let delta = match change {
            ChangeType::Percent => format!("{:+.2}%", mover.change * 100.0),
            ChangeType::Value => format!("{:+.2}", mover.change),
        };
        println!(
            "{:<8} {:>10.2} {:>10} {:>14.0} {:<30}",
            mover.symbol,
            mover.last,
            delta,
            mover.total_volume,
            truncate(mover.description.as_deref().unwrap_or("-"), 30)
        );
    }
}

fn render_accounts(accounts: &[Account]) {
    for account in accounts {
        let details = &account.securities_account;
        let balances = details.current_balances.clone().unwrap_or_default();
        println!("Account {} ({})", details.account_id, details.account_type);
        println!("  Liquidation value : {}", price(balances.liquidation_value));
        println!("  Cash balance      : {}", price(balances.cash_balance));
        println!(
            "  Available to trade: {}",
            price(balances.cash_available_for_trading)
        );

        if !details.positions.is_empty() {
            println!("  {:<12} {:<16} {:>10} {:>12}", "SYMBOL", "TYPE", "QTY", "VALUE");
            for position in &details.positions {
                let quantity = position.long_quantity - position.short_quantity;
                println!(
                    "  {:<12} {:<16} {:>10} {:>12.2}",
                    truncate(position.instrument.symbol(), 12),
                    position.instrument.asset_type(),
                    quantity,
                    position.market_value
                );
            }
        }

        if !details.order_strategies.is_empty() {
            println!("  {:<12} {:<10} {:<8} {:<12}", "ORDER", "STATUS", "TYPE", "SYMBOLS");
            for order in &details.order_strategies {
                let symbols = order
                    .order_leg_collection
                    .iter()
                    .map(|leg| format!("{} {}", leg.instruction, leg.instrument.symbol()))
                    .collect::<Vec<_>>()
                    .join(", ");
                println!(
                    "  {:<12} {:<10} {:<8} {:<12}",
                    order.order_id.map_or("-".to_string(), |id| id.to_string()),
                    order.status.as_deref().unwrap_or("-"),
                    order.order_type.as_deref().unwrap_or("-"),
                    symbols
                );
            }
        }
        println!();
    }
}

fn render_transactions(transactions: &[Transaction]) {
    println!(
        "{:<12} {:<22} {:<8} {:>12} {:<36}",
        "DATE", "TYPE", "SYMBOL", "AMOUNT", "DESCRIPTION"
    );
    println!("{}", "-".repeat(94));
    for txn in transactions {
        let symbol = txn
            .transaction_item
            .as_ref()
            .and_then(|item| item.instrument.as_ref())
            .and_then(|instrument| instrument.symbol.as_deref())
            .unwrap_or("-");
        let date = txn
            .transaction_date
            .as_deref()
            .map_or("-", |date| date.get(..10).unwrap_or(date));
        println!(
            "{:<12} {:<22} {:<8} {:>12.2} {:<36}",
            date,
            truncate(&txn.transaction_type, 22),
            truncate(symbol, 8),
            txn.net_amount,
            truncate(txn.description.as_deref().unwrap_or("-"), 36)
        );
    }
}

fn render_watchlists(watchlists: &[Watchlist]) {
    for watchlist in watchlists {
        println!(
            "{} ({}) account {}",
            watchlist.name, watchlist.watchlist_id, watchlist.account_id
        );
        let symbols = watchlist
            .watchlist_items
            .iter()
            .map(|item| item.instrument.symbol.as_str())
            .collect::<Vec<_>>();
        if symbols.is_empty() {
            println!("  (empty)");
        } else {
            println!("  {}", symbols.join(" "));
        }
    }
}

fn price(value: Option<f64>) -> String {
    value.map_or("-".to_string(), |value| format!("{value:.2}"))
}

/// `2024-07-01T09:30:00-04:00` -> `09:30`.
fn clock_time(timestamp: &str) -> &str {
    timestamp
        .split_once('T')
        .map(|(_, time)| time.get(..5).unwrap_or(time))
        .unwrap_or(timestamp)
}

fn truncate(value: &str, max_len: usize) -> String {
    let mut chars = value.chars();
    let mut collected = String::new();
    for _ in 0..max_len.saturating_sub(1) {
        match chars.next() {
            Some(ch) => collected.push(ch),
            None => return value.to_owned(),
        }
    }
    if chars.next().is_some() {
        collected.push('…');
        collected
    } else {
        value.to_owned()
    }
}
