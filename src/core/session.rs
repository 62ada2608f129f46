// Session lifecycle: login chain, busy-flag guard and credential persistence

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::clients::transport::{Credentials, OAuthData, SessionCookies, SessionProvider};
use crate::error::TradeResult;

/// Flat-file JSON store for cookie/oauth blobs.
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> TradeResult<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    pub fn save<T: Serialize>(&self, name: &str, value: &T) -> TradeResult<()> {
        let content = serde_json::to_string(value)?;
        std::fs::write(self.dir.join(name), content)?;
        Ok(())
    }

    /// Missing or unreadable blobs read as None; a corrupt file is not worth
    /// failing a login over.
    pub fn read<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let content = std::fs::read_to_string(self.dir.join(name)).ok()?;
        serde_json::from_str(&content).ok()
    }
}

/// Wraps the external session provider with the login ordering and the
/// single-flight busy flag: at most one login sequence runs at a time, and a
/// request arriving while one is in flight is dropped, not queued.
pub struct SessionManager {
    provider: Arc<dyn SessionProvider>,
    credentials: Credentials,
    steam_id: u64,
    app_id: u32,
    context_id: u64,
    store: BlobStore,
    busy: AtomicBool,
}

impl SessionManager {
    pub fn new(
        provider: Arc<dyn SessionProvider>,
        credentials: Credentials,
        steam_id: u64,
        app_id: u32,
        context_id: u64,
        store: BlobStore,
    ) -> Self {
        Self {
            provider,
            credentials,
            steam_id,
            app_id,
            context_id,
            store,
            busy: AtomicBool::new(false),
        }
    }

    /// Establish a session at startup, preferring persisted cookies.
    pub async fn ensure_session(&self) {
        self.login_chain(true).await;
    }

    /// The live session died: re-login, skipping the (now stale) cookie blob.
    pub async fn handle_session_expired(&self) {
        self.login_chain(false).await;
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    async fn login_chain(&self, use_stored_cookies: bool) {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("login already in flight, dropping request");
            return;
        }

        let result = self.run_chain(use_stored_cookies).await;
        self.busy.store(false, Ordering::SeqCst);

        if let Err(e) = result {
            error!("re-authentication failed: {}", e);
        }
    }

    async fn run_chain(&self, use_stored_cookies: bool) -> TradeResult<()> {
        if use_stored_cookies {
            if let Some(cookies) = self.store.read::<SessionCookies>(&self.cookies_file()) {
                match self.provider.set_cookies(&cookies).await {
                    Ok(()) => {
                        info!("session restored from stored cookies");
                        return Ok(());
                    }
                    Err(e) => warn!("stored cookies rejected: {}", e),
                }
            }
        }

        if let Some(oauth) = self.store.read::<OAuthData>(&self.oauth_file()) {
            match self.provider.oauth_login(&oauth).await {
                Ok(cookies) => {
                    self.provider.set_cookies(&cookies).await?;
                    self.persist_cookies(&cookies);
                    info!("session restored via oauth login");
                    return Ok(());
                }
                Err(e) => warn!("oauth login failed, falling back to full login: {}", e),
            }
        }

        info!("logging in with account credentials");
        let outcome = self.provider.login(&self.credentials).await?;

        if let Some(oauth) = &outcome.oauth {
            if let Err(e) = self.store.save(&self.oauth_file(), oauth) {
                warn!("failed to persist oauth blob: {}", e);
            }
        }

        self.provider.set_cookies(&outcome.cookies).await?;
        self.persist_cookies(&outcome.cookies);
        info!("session established");
        Ok(())
    }

    fn persist_cookies(&self, cookies: &SessionCookies) {
        if let Err(e) = self.store.save(&self.cookies_file(), cookies) {
            warn!("failed to persist cookies: {}", e);
        }
    }

    fn cookies_file(&self) -> String {
        format!(
            "cookies_{}_{}_{}.json",
            self.steam_id, self.app_id, self.context_id
        )
    }

    fn oauth_file(&self) -> String {
        format!(
            "oauth_{}_{}_{}.json",
            self.steam_id, self.app_id, self.context_id
        )
    }
}
