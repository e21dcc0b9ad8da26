use reqwest::Method;

use crate::api::{path_segment, ApiResult, NewWatchlist, TdAmeritradeClient, Watchlist, WatchlistUpdate};

#[derive(Clone)]
pub struct WatchlistService {
    client: TdAmeritradeClient,
}

impl WatchlistService {
    pub fn new(client: TdAmeritradeClient) -> Self {
        Self { client }
    }

    /// Watchlists of every account linked to the login.
    pub async fn list_all(&self) -> ApiResult<Vec<Watchlist>> {
        self.client.get("accounts/watchlists", &[]).await
    }

    pub async fn list(&self, account_id: &str) -> ApiResult<Vec<Watchlist>> {
        let account_id = path_segment("account id", account_id)?;
        self.client
            .get(&format!("accounts/{account_id}/watchlists"), &[])
            .await
    }

    pub async fn get(&self, account_id: &str, watchlist_id: &str) -> ApiResult<Watchlist> {
        let path = watchlist_path(account_id, watchlist_id)?;
        self.client.get(&path, &[]).await
    }

    pub async fn create(&self, account_id: &str, watchlist: &NewWatchlist) -> ApiResult<()> {
        let account_id = path_segment("account id", account_id)?;
        self.client
            .send(
                Method::POST,
                &format!("accounts/{account_id}/watchlists"),
                Some(watchlist),
            )
            .await?;
        Ok(())
    }

    /// Replace the name and every item of a watchlist. Symbols are not validated by the API.
    pub async fn replace(
        &self,
        account_id: &str,
        watchlist_id: &str,
        watchlist: &NewWatchlist,
    ) -> ApiResult<()> {
        let path = watchlist_path(account_id, watchlist_id)?;
        self.client.send(Method::PUT, &path, Some(watchlist)).await?;
        Ok(())
    }

    /// Apply a partial update to the watchlist named by `update.watchlist_id`.
    pub async fn update(&self, account_id: &str, update: &WatchlistUpdate) -> ApiResult<()> {
        let path = watchlist_path(account_id, &update.watchlist_id)?;
        self.client.send(Method::PATCH, &path, Some(update)).await?;
        Ok(())
    }

    pub async fn delete(&self, account_id: &str, watchlist_id: &str) -> ApiResult<()> {
        let path = watchlist_path(account_id, watchlist_id)?;
        self.client.send::<()>(Method::DELETE, &path, None).await?;
        Ok(())
    }
}

fn watchlist_path(account_id: &str, watchlist_id: &str) -> ApiResult<String> {
    let account_id = path_segment("account id", account_id)?;
    let watchlist_id = path_segment("watchlist id", watchlist_id)?;
    Ok(format!("accounts/{account_id}/watchlists/{watchlist_id}"))
}
