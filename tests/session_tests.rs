// Session manager tests: login chain ordering, blob persistence and the
// single-flight busy flag.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use common::{MockSession, TEST_APP_ID, TEST_STEAM_ID};
use steam_trade_bot::clients::transport::{Credentials, OAuthData, SessionCookies};
use steam_trade_bot::core::session::{BlobStore, SessionManager};

const TEST_CONTEXT_ID: u64 = 2;

fn cookies_file() -> String {
    format!("cookies_{}_{}_{}.json", TEST_STEAM_ID, TEST_APP_ID, TEST_CONTEXT_ID)
}

fn oauth_file() -> String {
    format!("oauth_{}_{}_{}.json", TEST_STEAM_ID, TEST_APP_ID, TEST_CONTEXT_ID)
}

fn session_manager(provider: Arc<MockSession>, dir: &TempDir) -> SessionManager {
    SessionManager::new(
        provider,
        Credentials {
            account_name: "boxbot".to_string(),
            password: "hunter2".to_string(),
            shared_secret: "c2hhcmVk".to_string(),
        },
        TEST_STEAM_ID,
        TEST_APP_ID,
        TEST_CONTEXT_ID,
        BlobStore::new(dir.path()).unwrap(),
    )
}

#[tokio::test]
async fn test_stored_cookies_are_preferred_at_startup() {
    let dir = TempDir::new().unwrap();
    let store = BlobStore::new(dir.path()).unwrap();
    store
        .save(
            &cookies_file(),
            &SessionCookies {
                cookies: vec!["sessionid=stored".to_string()],
            },
        )
        .unwrap();

    let provider = Arc::new(MockSession::default());
    let manager = session_manager(Arc::clone(&provider), &dir);

    manager.ensure_session().await;

    let set = provider.cookies_set.lock().unwrap();
    assert_eq!(set.len(), 1);
    assert_eq!(set[0].cookies, vec!["sessionid=stored".to_string()]);
    assert_eq!(provider.logins.load(Ordering::SeqCst), 0);
    assert_eq!(provider.oauth_logins.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_session_expiry_skips_stored_cookies() {
    let dir = TempDir::new().unwrap();
    let store = BlobStore::new(dir.path()).unwrap();
    store
        .save(
            &cookies_file(),
            &SessionCookies {
                cookies: vec!["sessionid=stale".to_string()],
            },
        )
        .unwrap();

    let provider = Arc::new(MockSession::default());
    let manager = session_manager(Arc::clone(&provider), &dir);

    manager.handle_session_expired().await;

    // Stale cookies are never offered back; no oauth blob, so full login.
    assert_eq!(provider.logins.load(Ordering::SeqCst), 1);
    let set = provider.cookies_set.lock().unwrap();
    assert_eq!(set.len(), 1);
    assert_eq!(set[0].cookies, vec!["sessionid=fresh".to_string()]);
}

#[tokio::test]
async fn test_rejected_cookies_fall_back_to_login() {
    let dir = TempDir::new().unwrap();
    let store = BlobStore::new(dir.path()).unwrap();
    store
        .save(
            &cookies_file(),
            &SessionCookies {
                cookies: vec!["sessionid=stored".to_string()],
            },
        )
        .unwrap();

    let provider = Arc::new(MockSession::default());
    provider.script_set_cookies(Err("Not Logged In"));
    let manager = session_manager(Arc::clone(&provider), &dir);

    manager.ensure_session().await;

    assert_eq!(provider.logins.load(Ordering::SeqCst), 1);
    // Rejected stored cookies, then the fresh login cookies.
    assert_eq!(provider.cookies_set.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_oauth_blob_is_tried_before_credentials() {
    let dir = TempDir::new().unwrap();
    let store = BlobStore::new(dir.path()).unwrap();
    store
        .save(
            &oauth_file(),
            &OAuthData {
                oauth_token: "token".to_string(),
                steam_guard: "guard".to_string(),
            },
        )
        .unwrap();

    let provider = Arc::new(MockSession::default());
    let manager = session_manager(Arc::clone(&provider), &dir);

    manager.handle_session_expired().await;

    assert_eq!(provider.oauth_logins.load(Ordering::SeqCst), 1);
    assert_eq!(provider.logins.load(Ordering::SeqCst), 0);

    // The refreshed cookies get persisted for next time.
    let persisted: SessionCookies = store.read(&cookies_file()).unwrap();
    assert_eq!(persisted.cookies, vec!["sessionid=oauth".to_string()]);
}

#[tokio::test]
async fn test_failed_oauth_falls_back_to_credential_login() {
    let dir = TempDir::new().unwrap();
    let store = BlobStore::new(dir.path()).unwrap();
    store
        .save(
            &oauth_file(),
            &OAuthData {
                oauth_token: "expired".to_string(),
                steam_guard: "guard".to_string(),
            },
        )
        .unwrap();

    let provider = Arc::new(MockSession::default());
    provider.script_oauth(Err("token revoked"));
    let manager = session_manager(Arc::clone(&provider), &dir);

    manager.handle_session_expired().await;

    assert_eq!(provider.oauth_logins.load(Ordering::SeqCst), 1);
    assert_eq!(provider.logins.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_login_persists_cookies_and_oauth() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(MockSession::default());
    let manager = session_manager(Arc::clone(&provider), &dir);

    manager.ensure_session().await;

    let store = BlobStore::new(dir.path()).unwrap();
    let cookies: SessionCookies = store.read(&cookies_file()).unwrap();
    assert_eq!(cookies.cookies, vec!["sessionid=fresh".to_string()]);
    let oauth: OAuthData = store.read(&oauth_file()).unwrap();
    assert_eq!(oauth.oauth_token, "token");
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_login_is_dropped_not_queued() {
    let dir = TempDir::new().unwrap();
    let provider = Arc::new(MockSession::default());
    *provider.login_delay.lock().unwrap() = Duration::from_millis(200);

    let manager = Arc::new(session_manager(Arc::clone(&provider), &dir));

    let first = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.handle_session_expired().await }
    });

    // Let the first request reach the provider and park in its login delay.
    tokio::task::yield_now().await;
    assert!(manager.is_busy());

    // A second request while one is in flight returns immediately.
    manager.handle_session_expired().await;

    first.await.unwrap();
    assert_eq!(provider.logins.load(Ordering::SeqCst), 1);
    assert!(!manager.is_busy());
}
