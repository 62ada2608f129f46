// Common test utilities: scripted mocks for the Steam seams

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use steam_trade_bot::clients::transport::{
    Credentials, LoginOutcome, OAuthData, OfferSnapshot, OfferTransport, SessionCookies,
    SessionProvider,
};
use steam_trade_bot::config::{AccountConfig, RetriesConfig, RetryConfig};
use steam_trade_bot::core::classifier::ErrorClassifier;
use steam_trade_bot::core::events::TransportEvent;
use steam_trade_bot::core::types::{EscrowInfo, Identity, PartitionKey};
use steam_trade_bot::core::EventBus;
use steam_trade_bot::{Config, Item, Offer, OfferState, TradeError, TradeOrchestrator, TradeResult};

pub const TEST_STEAM_ID: u64 = 76561198000000001;
pub const TEST_APP_ID: u32 = 730;
pub const TEST_CONTEXT_ID: u64 = 2;

/// Create a test configuration with sensible defaults
pub fn create_test_config() -> Config {
    Config {
        account: AccountConfig {
            account_name: "boxbot".to_string(),
            password: "hunter2".to_string(),
            shared_secret: "c2hhcmVk".to_string(),
            identity_secret: "aWRlbnRpdHk=".to_string(),
            api_key: "0123456789ABCDEF".to_string(),
            steam_id: TEST_STEAM_ID,
        },
        ..Config::default()
    }
}

/// Retry budgets matching the production defaults.
pub fn test_retries() -> RetriesConfig {
    RetriesConfig {
        received_items: RetryConfig { delay_ms: 10_000, attempts: 10 },
        cancel: RetryConfig { delay_ms: 5_000, attempts: 5 },
        accept: RetryConfig { delay_ms: 5_000, attempts: 5 },
    }
}

pub fn test_item(asset_id: u64, app_id: u32) -> Item {
    Item {
        asset_id,
        app_id,
        context_id: TEST_CONTEXT_ID,
        class_id: 100 + asset_id,
        market_hash_name: format!("Case #{}", asset_id),
        marketable: true,
        owner: None,
    }
}

pub fn test_offer(id: u64, state: OfferState) -> Offer {
    let mut offer = Offer::new(76561198000000002);
    offer.id = Some(id);
    offer.state = state;
    offer
}

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Send,
    Cancel(u64),
    Accept(u64),
    UserDetails,
    ReceivedItems(u64),
    LoadInventory(PartitionKey),
    GetOffers,
}

type Scripted<T> = Mutex<VecDeque<Result<T, String>>>;

/// Offer transport with scripted responses. Empty scripts fall back to an Ok
/// default, or to a transport error when `fail_by_default` is set.
#[derive(Default)]
pub struct MockTransport {
    pub calls: Mutex<Vec<Call>>,
    pub fail_by_default: Mutex<Option<String>>,
    pub send_results: Scripted<u64>,
    pub cancel_results: Scripted<()>,
    pub accept_results: Scripted<()>,
    pub escrow_results: Scripted<EscrowInfo>,
    pub received_results: Scripted<Vec<Item>>,
    pub offers_results: Scripted<OfferSnapshot>,
    /// Per-app-id inventory scripts.
    pub inventory_results: Mutex<HashMap<u32, Result<Vec<Item>, String>>>,
}

impl MockTransport {
    pub fn failing(message: &str) -> Self {
        let transport = Self::default();
        *transport.fail_by_default.lock().unwrap() = Some(message.to_string());
        transport
    }

    pub fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    fn next<T>(&self, script: &Scripted<T>, default: T) -> TradeResult<T> {
        if let Some(result) = script.lock().unwrap().pop_front() {
            return result.map_err(TradeError::Transport);
        }
        if let Some(message) = self.fail_by_default.lock().unwrap().clone() {
            return Err(TradeError::Transport(message));
        }
        Ok(default)
    }

    pub fn script_send(&self, result: Result<u64, &str>) {
        self.send_results
            .lock()
            .unwrap()
            .push_back(result.map_err(String::from));
    }

    pub fn script_escrow(&self, their_escrow_days: u32) {
        self.escrow_results.lock().unwrap().push_back(Ok(EscrowInfo {
            my_escrow_days: 0,
            their_escrow_days,
        }));
    }

    pub fn script_received(&self, result: Result<Vec<Item>, &str>) {
        self.received_results
            .lock()
            .unwrap()
            .push_back(result.map_err(String::from));
    }

    pub fn script_offers(&self, result: Result<OfferSnapshot, &str>) {
        self.offers_results
            .lock()
            .unwrap()
            .push_back(result.map_err(String::from));
    }

    pub fn script_inventory(&self, app_id: u32, result: Result<Vec<Item>, &str>) {
        self.inventory_results
            .lock()
            .unwrap()
            .insert(app_id, result.map_err(String::from));
    }
}

#[async_trait]
impl OfferTransport for MockTransport {
    async fn send_offer(&self, _offer: &Offer) -> TradeResult<u64> {
        self.record(Call::Send);
        self.next(&self.send_results, 1000)
    }

    async fn cancel_offer(&self, offer_id: u64) -> TradeResult<()> {
        self.record(Call::Cancel(offer_id));
        self.next(&self.cancel_results, ())
    }

    async fn accept_offer(&self, offer_id: u64, _confirm: bool) -> TradeResult<()> {
        self.record(Call::Accept(offer_id));
        self.next(&self.accept_results, ())
    }

    async fn get_user_details(&self, _offer: &Offer) -> TradeResult<EscrowInfo> {
        self.record(Call::UserDetails);
        self.next(&self.escrow_results, EscrowInfo::default())
    }

    async fn get_received_items(&self, offer_id: u64) -> TradeResult<Vec<Item>> {
        self.record(Call::ReceivedItems(offer_id));
        self.next(&self.received_results, Vec::new())
    }

    async fn load_inventory(
        &self,
        key: PartitionKey,
        _tradable_only: bool,
    ) -> TradeResult<Vec<Item>> {
        self.record(Call::LoadInventory(key));
        if let Some(result) = self.inventory_results.lock().unwrap().get(&key.app_id) {
            return result.clone().map_err(TradeError::Transport);
        }
        if let Some(message) = self.fail_by_default.lock().unwrap().clone() {
            return Err(TradeError::Transport(message));
        }
        Ok(Vec::new())
    }

    async fn get_offers(&self) -> TradeResult<OfferSnapshot> {
        self.record(Call::GetOffers);
        self.next(&self.offers_results, OfferSnapshot::default())
    }
}

/// Session provider that records confirmations and logins.
#[derive(Default)]
pub struct MockSession {
    pub confirmations: Mutex<Vec<u64>>,
    pub confirm_results: Scripted<()>,
    pub logins: AtomicUsize,
    pub oauth_logins: AtomicUsize,
    pub oauth_results: Scripted<SessionCookies>,
    pub cookies_set: Mutex<Vec<SessionCookies>>,
    pub set_cookies_results: Scripted<()>,
    /// Artificial login latency, for exercising the busy flag.
    pub login_delay: Mutex<Duration>,
}

impl MockSession {
    pub fn script_confirm(&self, result: Result<(), &str>) {
        self.confirm_results
            .lock()
            .unwrap()
            .push_back(result.map_err(String::from));
    }

    pub fn script_oauth(&self, result: Result<SessionCookies, &str>) {
        self.oauth_results
            .lock()
            .unwrap()
            .push_back(result.map_err(String::from));
    }

    pub fn script_set_cookies(&self, result: Result<(), &str>) {
        self.set_cookies_results
            .lock()
            .unwrap()
            .push_back(result.map_err(String::from));
    }

    pub fn confirmation_count(&self) -> usize {
        self.confirmations.lock().unwrap().len()
    }
}

#[async_trait]
impl SessionProvider for MockSession {
    async fn login(&self, _credentials: &Credentials) -> TradeResult<LoginOutcome> {
        let delay = *self.login_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.logins.fetch_add(1, Ordering::SeqCst);
        Ok(LoginOutcome {
            cookies: SessionCookies {
                cookies: vec!["sessionid=fresh".to_string()],
            },
            oauth: Some(OAuthData {
                oauth_token: "token".to_string(),
                steam_guard: "guard".to_string(),
            }),
        })
    }

    async fn oauth_login(&self, _oauth: &OAuthData) -> TradeResult<SessionCookies> {
        self.oauth_logins.fetch_add(1, Ordering::SeqCst);
        if let Some(result) = self.oauth_results.lock().unwrap().pop_front() {
            return result.map_err(TradeError::Transport);
        }
        Ok(SessionCookies {
            cookies: vec!["sessionid=oauth".to_string()],
        })
    }

    async fn set_cookies(&self, cookies: &SessionCookies) -> TradeResult<()> {
        self.cookies_set.lock().unwrap().push(cookies.clone());
        if let Some(result) = self.set_cookies_results.lock().unwrap().pop_front() {
            return result.map_err(TradeError::Transport);
        }
        Ok(())
    }

    async fn confirm_offer(&self, _identity_secret: &str, offer_id: u64) -> TradeResult<()> {
        self.confirmations.lock().unwrap().push(offer_id);
        if let Some(result) = self.confirm_results.lock().unwrap().pop_front() {
            return result.map_err(TradeError::Transport);
        }
        Ok(())
    }
}

/// Everything needed to exercise the orchestrator directly.
pub struct Harness {
    pub transport: Arc<MockTransport>,
    pub session: Arc<MockSession>,
    pub bus: Arc<EventBus>,
    pub orchestrator: Arc<TradeOrchestrator>,
    pub events_rx: mpsc::UnboundedReceiver<TransportEvent>,
}

pub fn harness() -> Harness {
    harness_with(Arc::new(MockTransport::default()))
}

pub fn harness_with(transport: Arc<MockTransport>) -> Harness {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let session = Arc::new(MockSession::default());
    let bus = Arc::new(EventBus::new(64));

    let session_provider: Arc<dyn SessionProvider> = session.clone();
    let orchestrator = Arc::new(TradeOrchestrator::new(
        Arc::clone(&transport) as Arc<dyn OfferTransport>,
        session_provider,
        ErrorClassifier::new(events_tx),
        Arc::clone(&bus),
        Identity::new(TEST_STEAM_ID, "aWRlbnRpdHk="),
        TEST_APP_ID,
        test_retries(),
    ));

    Harness {
        transport,
        session,
        bus,
        orchestrator,
        events_rx,
    }
}
