//! Bridge context object
//!
//! One `Bridge` owns every configured account and one receiver launcher
//! per cast device, with a lifecycle tied to integration start and stop.
//! Service calls resolve their target account here (falling back to the
//! default account), get devices readied through the launcher when
//! needed, and fan out into the playback command sequence.

use parking_lot::Mutex;
use rand::Rng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::account::{Account, AccountError, AuthError, QueryError, SearchQuery, Session};
use crate::account::token::{OAuthRefresher, WebPlayerAuth};
use crate::api::{ApiError, SpotifyClient};
use crate::cast::{cast_device_id, CastTransport, LaunchError, ReceiverLauncher};
use crate::cast::DEFAULT_LAUNCH_TIMEOUT;
use crate::config::Config;
use crate::models::{Category, Device, MediaUri, PlaylistKind};
use crate::playback::{self, PlaybackError, PlayExtras, PlayOptions};

/// Attempts when looking up a device that should already be registered
const QUICK_LOOKUP_ATTEMPTS: u32 = 1;

/// Attempts when looking up a device right after launching its receiver
const POST_LAUNCH_LOOKUP_ATTEMPTS: u32 = 5;

/// Target resolution error types
#[derive(Error, Debug)]
pub enum TargetError {
    #[error("no account found for entry id `{0}`")]
    AccountNotFound(String),

    #[error("no default account is configured")]
    NoDefaultAccount,

    #[error("device `{0}` is not known to the music service")]
    DeviceNotFound(String),

    #[error("service call names neither a device id nor a cast device")]
    NoDeviceSpecified,

    #[error("category `{0}` has no playlists to pick from")]
    EmptyCategory(String),
}

/// Command layer error types
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error(transparent)]
    Target(#[from] TargetError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error("accounts `{0}` and `{1}` are both flagged as default")]
    DuplicateDefault(String, String),
}

/// A full play service call
#[derive(Debug, Clone, Default)]
pub struct PlayRequest {
    /// Target URI; empty means transfer the active session
    pub uri: Option<String>,
    /// Free-text search resolved to a URI when none is given
    pub search: Option<String>,
    /// Browse category resolved to a random playlist when no URI is given
    pub category: Option<String>,
    /// Explicit service device id, trusted as-is
    pub device_id: Option<String>,
    /// Force playback to resume on transfer
    pub force_playback: bool,
    /// Playback options
    pub options: PlayOptions,
    /// Best-effort follow-up settings
    pub extras: PlayExtras,
    /// Override for the receiver launch bound
    pub launch_timeout: Option<Duration>,
}

/// Integration context owning accounts and per-device launchers
#[derive(Default)]
pub struct Bridge {
    accounts: HashMap<String, Arc<Account>>,
    launchers: Mutex<HashMap<String, Arc<ReceiverLauncher>>>,
}

impl Bridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the bridge from persisted configuration
    pub fn from_config(config: &Config) -> Result<Self, BridgeError> {
        let mut bridge = Self::new();

        for (entry_id, entry) in &config.accounts {
            let internal = Session::new(Box::new(WebPlayerAuth::new(&entry.sp_dc, &entry.sp_key)));

            // Without OAuth material the web-player token backs both
            // sessions, like the original cookie-only setups.
            let external = match (&entry.refresh_token, &entry.client_id) {
                (Some(refresh_token), Some(client_id)) => {
                    Session::new(Box::new(OAuthRefresher::new(client_id, refresh_token)))
                }
                _ => Session::new(Box::new(WebPlayerAuth::new(&entry.sp_dc, &entry.sp_key))),
            };

            let account = Account::new(
                entry_id.clone(),
                entry.is_default,
                SpotifyClient::new(),
                external,
                internal,
            );
            bridge.add_account(account)?;
        }

        Ok(bridge)
    }

    /// Register an account. At most one account may hold the default
    /// flag across the whole bridge.
    pub fn add_account(&mut self, account: Account) -> Result<(), BridgeError> {
        if account.is_default() {
            if let Some(existing) = self.accounts.values().find(|a| a.is_default()) {
                return Err(BridgeError::DuplicateDefault(
                    existing.entry_id().to_string(),
                    account.entry_id().to_string(),
                ));
            }
        }

        debug!("adding account entry `{}`", account.entry_id());
        self.accounts
            .insert(account.entry_id().to_string(), Arc::new(account));
        Ok(())
    }

    /// Tear down an account at integration unload
    pub fn remove_account(&mut self, entry_id: &str) -> Option<Arc<Account>> {
        debug!("removing account entry `{}`", entry_id);
        self.accounts.remove(entry_id)
    }

    /// Entry ids of all registered accounts
    pub fn entry_ids(&self) -> Vec<String> {
        self.accounts.keys().cloned().collect()
    }

    /// Resolve an account by entry id, or the default account when none
    /// is named
    pub fn account(&self, entry_id: Option<&str>) -> Result<Arc<Account>, TargetError> {
        match entry_id {
            Some(entry_id) => self
                .accounts
                .get(entry_id)
                .cloned()
                .ok_or_else(|| TargetError::AccountNotFound(entry_id.to_string())),
            None => self
                .accounts
                .values()
                .find(|account| account.is_default())
                .cloned()
                .ok_or(TargetError::NoDefaultAccount),
        }
    }

    /// Launcher bound to the given cast device, created on first use
    pub fn launcher_for(&self, transport: Arc<dyn CastTransport>) -> Arc<ReceiverLauncher> {
        let mut launchers = self.launchers.lock();
        launchers
            .entry(transport.friendly_name().to_string())
            .or_insert_with(|| Arc::new(ReceiverLauncher::new(transport)))
            .clone()
    }

    // =========================================================================
    // Catalog surface
    // =========================================================================

    /// Raw playlist listing of the requested kind
    pub async fn get_playlists(
        &self,
        account_id: Option<&str>,
        kind: PlaylistKind,
        country: Option<&str>,
        locale: Option<&str>,
        limit: u64,
    ) -> Result<Value, BridgeError> {
        let account = self.account(account_id)?;
        let token = account.bearer().await?;
        let client = account.client();

        let response = match kind {
            PlaylistKind::User => client.current_user_playlists(&token, limit, 0).await?,
            PlaylistKind::Featured => {
                let response = client
                    .featured_playlists(&token, locale, country, limit)
                    .await?;
                response.get("playlists").cloned().unwrap_or(Value::Null)
            }
            PlaylistKind::MadeForX => {
                let response = client.view(&token, "made-for-x", locale, limit).await?;
                response.get("content").cloned().unwrap_or(Value::Null)
            }
            PlaylistKind::View(view) => {
                let response = client.view(&token, &view, locale, limit).await?;
                response.get("content").cloned().unwrap_or(Value::Null)
            }
        };

        Ok(response)
    }

    /// Connect devices of the account
    pub async fn get_devices(&self, account_id: Option<&str>) -> Result<Vec<Device>, BridgeError> {
        let account = self.account(account_id)?;
        Ok(account.devices(false).await?)
    }

    /// Browse categories of the account
    pub async fn get_categories(
        &self,
        account_id: Option<&str>,
        locale: Option<&str>,
        force: bool,
    ) -> Result<Vec<Category>, BridgeError> {
        let account = self.account(account_id)?;
        Ok(account.categories(force, locale).await?)
    }

    /// Liked-song URIs of the account
    pub async fn liked_songs(
        &self,
        account_id: Option<&str>,
        force: bool,
    ) -> Result<Vec<String>, BridgeError> {
        let account = self.account(account_id)?;
        Ok(account.liked_songs(force).await?)
    }

    /// Liked-song count of the account
    pub async fn liked_songs_count(&self, account_id: Option<&str>) -> Result<u64, BridgeError> {
        let account = self.account(account_id)?;
        Ok(account.liked_songs_count().await?)
    }

    // =========================================================================
    // Launch and playback
    // =========================================================================

    /// Launch the receiver application on a cast device and return the
    /// protocol device id it registered under
    pub async fn launch_receiver(
        &self,
        account: &Arc<Account>,
        transport: Arc<dyn CastTransport>,
        timeout: Duration,
    ) -> Result<String, BridgeError> {
        let token = account.device_token().await?;
        let launcher = self.launcher_for(transport);
        launcher
            .launch(&token.access_token, token.expires_at, timeout)
            .await?;

        Ok(launcher
            .device_id()
            .unwrap_or_else(|| cast_device_id(launcher.device_name())))
    }

    /// Run a full play service call: resolve the account and device,
    /// ready the receiver when needed, start or transfer playback, then
    /// apply the follow-up settings.
    pub async fn play_media(
        &self,
        account_id: Option<&str>,
        transport: Option<Arc<dyn CastTransport>>,
        request: PlayRequest,
    ) -> Result<(), BridgeError> {
        let account = self.account(account_id)?;
        let timeout = request.launch_timeout.unwrap_or(DEFAULT_LAUNCH_TIMEOUT);

        // A malformed target must abort before anything goes remote
        let target = match &request.uri {
            Some(raw) if !raw.trim().is_empty() => {
                let uri = MediaUri::parse(raw).map_err(PlaybackError::from)?;
                Some(uri.as_str().to_string())
            }
            _ => None,
        };

        let device_id = match &request.device_id {
            Some(device_id) => device_id.clone(),
            None => self.resolve_device(&account, transport, timeout).await?,
        };

        let token = account.bearer().await?;
        let client = account.client();

        let mut options = request.options.clone();
        if options.country.is_none() {
            options.country = account.country();
        }

        let uri = match target {
            Some(uri) => Some(uri),
            None => self.resolve_target(&account, &request).await?,
        };

        match uri {
            Some(uri) => {
                playback::play(client, &token, &device_id, &uri, &options).await?;
            }
            None => {
                playback::transfer(client, &token, &device_id, request.force_playback).await?;
            }
        }

        if !request.extras.is_empty() {
            playback::apply_extras(client, &token, &device_id, &request.extras).await;
        }

        Ok(())
    }

    /// Resolve a play target from a search text or browse category when
    /// the call carries no URI. None means transfer.
    async fn resolve_target(
        &self,
        account: &Arc<Account>,
        request: &PlayRequest,
    ) -> Result<Option<String>, BridgeError> {
        if let Some(category) = &request.category {
            let playlists = account.category_playlists(category).await?;
            if playlists.is_empty() {
                return Err(TargetError::EmptyCategory(category.clone()).into());
            }
            let pick = rand::rng().random_range(0..playlists.len());
            info!(
                "picked playlist `{}` from category `{}`",
                playlists[pick].name, category
            );
            return Ok(Some(playlists[pick].uri.clone()));
        }

        if let Some(search) = &request.search {
            let query = SearchQuery::plain(search.clone(), "track")?;
            let results = account.search(&query, 1).await?;
            let uri = results
                .first()
                .and_then(|item| item.get("uri"))
                .and_then(Value::as_str)
                .map(str::to_string);
            if let Some(uri) = &uri {
                info!("search `{}` resolved to `{}`", search, uri);
            }
            return Ok(uri);
        }

        Ok(None)
    }

    /// Find the service device id for a cast device, launching the
    /// receiver application when the device is not registered yet
    async fn resolve_device(
        &self,
        account: &Arc<Account>,
        transport: Option<Arc<dyn CastTransport>>,
        timeout: Duration,
    ) -> Result<String, BridgeError> {
        let transport = transport.ok_or(TargetError::NoDeviceSpecified)?;
        let name = transport.friendly_name().to_string();

        if let Some(device_id) = self
            .query_device_id(account, &name, &[], QUICK_LOOKUP_ATTEMPTS)
            .await?
        {
            debug!("device `{}` already registered as `{}`", name, device_id);
            return Ok(device_id);
        }

        info!("device `{}` not registered, launching receiver", name);
        let digest_id = self.launch_receiver(account, transport, timeout).await?;

        match self
            .query_device_id(
                account,
                &name,
                std::slice::from_ref(&digest_id),
                POST_LAUNCH_LOOKUP_ATTEMPTS,
            )
            .await?
        {
            Some(device_id) => Ok(device_id),
            None => {
                warn!("device `{}` never registered with the service", name);
                Err(TargetError::DeviceNotFound(name).into())
            }
        }
    }

    /// Look for a device by name or candidate id, refetching the device
    /// list with a growing backoff between attempts
    async fn query_device_id(
        &self,
        account: &Arc<Account>,
        device_name: &str,
        candidate_ids: &[String],
        max_attempts: u32,
    ) -> Result<Option<String>, AccountError> {
        let mut attempt = 0;

        loop {
            let devices = account.devices(true).await?;
            for device in devices {
                if let Some(id) = device.id {
                    if device.name == device_name || candidate_ids.contains(&id) {
                        return Ok(Some(id));
                    }
                }
            }

            attempt += 1;
            if attempt >= max_attempts {
                return Ok(None);
            }

            let backoff = rand::rng().random_range(1.5..1.8f64).powi(attempt as i32);
            debug!(
                "device `{}` not listed yet, retrying in {:.1}s",
                device_name, backoff
            );
            sleep(Duration::from_secs_f64(backoff)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::token::{SessionToken, TokenRefresher};
    use async_trait::async_trait;

    struct StubRefresher;

    #[async_trait]
    impl TokenRefresher for StubRefresher {
        async fn refresh(&self) -> Result<SessionToken, AuthError> {
            Ok(SessionToken::new("stub", u64::MAX))
        }
    }

    fn test_account(entry_id: &str, is_default: bool) -> Account {
        Account::new(
            entry_id,
            is_default,
            SpotifyClient::with_base_url("http://127.0.0.1:9"),
            Session::new(Box::new(StubRefresher)),
            Session::new(Box::new(StubRefresher)),
        )
    }

    #[test]
    fn test_account_resolution_by_id_and_default() {
        let mut bridge = Bridge::new();
        bridge.add_account(test_account("main", true)).unwrap();
        bridge.add_account(test_account("other", false)).unwrap();

        assert_eq!(bridge.account(None).unwrap().entry_id(), "main");
        assert_eq!(bridge.account(Some("other")).unwrap().entry_id(), "other");
    }

    #[test]
    fn test_unknown_account_is_distinct_from_missing_default() {
        let bridge = Bridge::new();
        assert!(matches!(
            bridge.account(Some("ghost")),
            Err(TargetError::AccountNotFound(_))
        ));
        assert!(matches!(
            bridge.account(None),
            Err(TargetError::NoDefaultAccount)
        ));
    }

    #[test]
    fn test_second_default_account_rejected() {
        let mut bridge = Bridge::new();
        bridge.add_account(test_account("first", true)).unwrap();
        let result = bridge.add_account(test_account("second", true));
        assert!(matches!(result, Err(BridgeError::DuplicateDefault(_, _))));
    }

    #[test]
    fn test_remove_account() {
        let mut bridge = Bridge::new();
        bridge.add_account(test_account("main", true)).unwrap();
        assert!(bridge.remove_account("main").is_some());
        assert!(bridge.remove_account("main").is_none());
        assert!(bridge.entry_ids().is_empty());
    }
}
