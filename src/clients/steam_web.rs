// Steam Web API / community transport
//
// HTTP implementation of the offer transport and session provider seams.
// Offer inspection goes through IEconService with the API key; send/accept
// and mobile confirmations go through the community endpoints with the
// session cookies.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use reqwest::cookie::Jar;
use serde::Deserialize;
use serde_json::json;
use sha1::Sha1;
use tracing::debug;

use crate::clients::transport::{
    Credentials, LoginOutcome, OAuthData, OfferSnapshot, OfferTransport, SessionCookies,
    SessionProvider,
};
use crate::core::types::{EscrowInfo, Item, Offer, OfferState, PartitionKey};
use crate::error::{TradeError, TradeResult};

const API_BASE: &str = "https://api.steampowered.com";
const COMMUNITY_BASE: &str = "https://steamcommunity.com";

/// Offset between an individual account id and its SteamID64.
const STEAM_ID64_BASE: u64 = 76561197960265728;

pub fn account_id_to_steam_id(account_id: u32) -> u64 {
    STEAM_ID64_BASE + account_id as u64
}

pub fn steam_id_to_account_id(steam_id: u64) -> u32 {
    (steam_id - STEAM_ID64_BASE) as u32
}

pub struct SteamWebClient {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    community_base: String,
}

/// Build a transport + session pair sharing one cookie jar, so cookies
/// installed by the session authenticate the community calls of the
/// transport.
pub fn connected(
    api_key: impl Into<String>,
    steam_id: u64,
    device_id: impl Into<String>,
) -> TradeResult<(SteamWebClient, CommunitySession)> {
    let jar = Arc::new(Jar::default());
    let http = reqwest::Client::builder()
        .cookie_provider(Arc::clone(&jar))
        .build()
        .map_err(|e| TradeError::Config(format!("failed to build HTTP client: {}", e)))?;

    let transport = SteamWebClient {
        http: http.clone(),
        api_key: api_key.into(),
        api_base: API_BASE.to_string(),
        community_base: COMMUNITY_BASE.to_string(),
    };

    let session = CommunitySession {
        http,
        jar,
        steam_id,
        device_id: device_id.into(),
        api_base: API_BASE.to_string(),
        community_base: COMMUNITY_BASE.to_string(),
    };

    Ok((transport, session))
}

impl SteamWebClient {
    pub fn new(api_key: impl Into<String>) -> TradeResult<Self> {
        Self::with_base_urls(api_key, API_BASE, COMMUNITY_BASE)
    }

    /// Base URLs are injectable so tests can point at a local mock server.
    pub fn with_base_urls(
        api_key: impl Into<String>,
        api_base: impl Into<String>,
        community_base: impl Into<String>,
    ) -> TradeResult<Self> {
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|e| TradeError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            api_base: api_base.into(),
            community_base: community_base.into(),
        })
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> TradeResult<T> {
        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            // Marker text is what the classifier keys on.
            return Err(TradeError::Transport(format!("Not Logged In ({})", status)));
        }
        if !status.is_success() {
            return Err(TradeError::Transport(format!("HTTP error {}", status)));
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| TradeError::Transport(format!("Malformed response: {}", e)))
    }
}

// --- IEconService wire types ---

#[derive(Debug, Deserialize)]
struct GetTradeOffersResponse {
    response: TradeOffersPayload,
}

#[derive(Debug, Deserialize, Default)]
struct TradeOffersPayload {
    #[serde(default)]
    trade_offers_sent: Vec<WireOffer>,
    #[serde(default)]
    trade_offers_received: Vec<WireOffer>,
    #[serde(default)]
    descriptions: Vec<WireDescription>,
}

#[derive(Debug, Deserialize)]
struct GetTradeOfferResponse {
    response: TradeOfferPayload,
}

#[derive(Debug, Deserialize)]
struct TradeOfferPayload {
    offer: WireOffer,
    #[serde(default)]
    descriptions: Vec<WireDescription>,
}

#[derive(Debug, Deserialize)]
struct WireOffer {
    tradeofferid: String,
    accountid_other: u32,
    trade_offer_state: u8,
    #[serde(default)]
    message: String,
    #[serde(default)]
    items_to_give: Vec<WireAsset>,
    #[serde(default)]
    items_to_receive: Vec<WireAsset>,
    #[serde(default)]
    time_created: i64,
    #[serde(default)]
    time_updated: i64,
    #[serde(default)]
    is_our_offer: bool,
}

#[derive(Debug, Deserialize)]
struct WireAsset {
    appid: u32,
    contextid: String,
    assetid: String,
    classid: String,
}

#[derive(Debug, Deserialize)]
struct WireDescription {
    appid: u32,
    classid: String,
    #[serde(default)]
    market_hash_name: String,
    #[serde(default)]
    marketable: u8,
}

#[derive(Debug, Deserialize)]
struct SendOfferResponse {
    tradeofferid: String,
}

#[derive(Debug, Deserialize)]
struct InventoryResponse {
    #[serde(default)]
    assets: Vec<WireAsset>,
    #[serde(default)]
    descriptions: Vec<WireDescription>,
}

fn parse_u64(value: &str, what: &str) -> TradeResult<u64> {
    value
        .parse::<u64>()
        .map_err(|_| TradeError::Transport(format!("Malformed response: bad {}: {}", what, value)))
}

fn wire_timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

fn wire_asset_to_item(
    asset: &WireAsset,
    descriptions: &HashMap<(u32, String), (String, bool)>,
) -> TradeResult<Item> {
    let (market_hash_name, marketable) = descriptions
        .get(&(asset.appid, asset.classid.clone()))
        .cloned()
        .unwrap_or_default();

    Ok(Item {
        asset_id: parse_u64(&asset.assetid, "assetid")?,
        app_id: asset.appid,
        context_id: parse_u64(&asset.contextid, "contextid")?,
        class_id: parse_u64(&asset.classid, "classid")?,
        market_hash_name,
        marketable,
        owner: None,
    })
}

fn description_map(
    descriptions: &[WireDescription],
) -> HashMap<(u32, String), (String, bool)> {
    descriptions
        .iter()
        .map(|d| {
            (
                (d.appid, d.classid.clone()),
                (d.market_hash_name.clone(), d.marketable == 1),
            )
        })
        .collect()
}

fn wire_offer_to_offer(
    wire: &WireOffer,
    descriptions: &HashMap<(u32, String), (String, bool)>,
) -> TradeResult<Offer> {
    let state = OfferState::from_code(wire.trade_offer_state).ok_or_else(|| {
        TradeError::Transport(format!(
            "Malformed response: unknown offer state {}",
            wire.trade_offer_state
        ))
    })?;

    let items_to_give = wire
        .items_to_give
        .iter()
        .map(|a| wire_asset_to_item(a, descriptions))
        .collect::<TradeResult<Vec<_>>>()?;
    let items_to_receive = wire
        .items_to_receive
        .iter()
        .map(|a| wire_asset_to_item(a, descriptions))
        .collect::<TradeResult<Vec<_>>>()?;

    Ok(Offer {
        id: Some(parse_u64(&wire.tradeofferid, "tradeofferid")?),
        partner: account_id_to_steam_id(wire.accountid_other),
        token: None,
        message: wire.message.clone(),
        items_to_give,
        items_to_receive,
        state,
        is_our_offer: wire.is_our_offer,
        created_at: wire_timestamp(wire.time_created),
        updated_at: wire_timestamp(wire.time_updated),
    })
}

#[async_trait]
impl OfferTransport for SteamWebClient {
    async fn send_offer(&self, offer: &Offer) -> TradeResult<u64> {
        let json_tradeoffer = json!({
            "newversion": true,
            "version": 2,
            "me": {
                "assets": offer.items_to_give.iter().map(|i| json!({
                    "appid": i.app_id,
                    "contextid": i.context_id.to_string(),
                    "assetid": i.asset_id.to_string(),
                    "amount": 1,
                })).collect::<Vec<_>>(),
                "currency": [],
                "ready": false,
            },
            "them": {
                "assets": offer.items_to_receive.iter().map(|i| json!({
                    "appid": i.app_id,
                    "contextid": i.context_id.to_string(),
                    "assetid": i.asset_id.to_string(),
                    "amount": 1,
                })).collect::<Vec<_>>(),
                "currency": [],
                "ready": false,
            },
        });

        let access_token = json!({
            "trade_offer_access_token": offer.token.clone().unwrap_or_default(),
        });

        let form = [
            ("partner", offer.partner.to_string()),
            ("tradeoffermessage", offer.message.clone()),
            ("json_tradeoffer", json_tradeoffer.to_string()),
            ("trade_offer_create_params", access_token.to_string()),
        ];

        let response = self
            .http
            .post(format!("{}/tradeoffer/new/send", self.community_base))
            .header(
                "Referer",
                format!("{}/tradeoffer/new/", self.community_base),
            )
            .form(&form)
            .send()
            .await?;

        let sent: SendOfferResponse = Self::read_json(response).await?;
        parse_u64(&sent.tradeofferid, "tradeofferid")
    }

    async fn cancel_offer(&self, offer_id: u64) -> TradeResult<()> {
        let response = self
            .http
            .post(format!(
                "{}/IEconService/CancelTradeOffer/v1/",
                self.api_base
            ))
            .form(&[
                ("key", self.api_key.clone()),
                ("tradeofferid", offer_id.to_string()),
            ])
            .send()
            .await?;

        let _: serde_json::Value = Self::read_json(response).await?;
        Ok(())
    }

    async fn accept_offer(&self, offer_id: u64, _confirm: bool) -> TradeResult<()> {
        let form = [
            ("serverid", "1".to_string()),
            ("tradeofferid", offer_id.to_string()),
        ];

        let response = self
            .http
            .post(format!(
                "{}/tradeoffer/{}/accept",
                self.community_base, offer_id
            ))
            .header(
                "Referer",
                format!("{}/tradeoffer/{}/", self.community_base, offer_id),
            )
            .form(&form)
            .send()
            .await?;

        let _: serde_json::Value = Self::read_json(response).await?;
        Ok(())
    }

    async fn get_user_details(&self, offer: &Offer) -> TradeResult<EscrowInfo> {
        let mut url = format!(
            "{}/tradeoffer/new/?partner={}",
            self.community_base,
            steam_id_to_account_id(offer.partner)
        );
        if let Some(token) = &offer.token {
            url.push_str(&format!("&token={}", token));
        }

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TradeError::Transport(format!("HTTP error {}", status)));
        }

        let body = response.text().await?;
        Ok(EscrowInfo {
            my_escrow_days: scrape_escrow_days(&body, "g_daysMyEscrow")?,
            their_escrow_days: scrape_escrow_days(&body, "g_daysTheirEscrow")?,
        })
    }

    async fn get_received_items(&self, offer_id: u64) -> TradeResult<Vec<Item>> {
        let response = self
            .http
            .get(format!("{}/IEconService/GetTradeOffer/v1/", self.api_base))
            .query(&[
                ("key", self.api_key.clone()),
                ("tradeofferid", offer_id.to_string()),
                ("get_descriptions", "1".to_string()),
                ("language", "english".to_string()),
            ])
            .send()
            .await?;

        let payload: GetTradeOfferResponse = Self::read_json(response).await?;
        let descriptions = description_map(&payload.response.descriptions);

        payload
            .response
            .offer
            .items_to_receive
            .iter()
            .map(|a| wire_asset_to_item(a, &descriptions))
            .collect()
    }

    async fn load_inventory(
        &self,
        key: PartitionKey,
        tradable_only: bool,
    ) -> TradeResult<Vec<Item>> {
        let response = self
            .http
            .get(format!(
                "{}/inventory/{}/{}/{}",
                self.community_base, key.steam_id, key.app_id, key.context_id
            ))
            .query(&[("l", "english"), ("count", "2000")])
            .send()
            .await?;

        let payload: InventoryResponse = Self::read_json(response).await?;
        let descriptions = description_map(&payload.descriptions);

        let mut items = payload
            .assets
            .iter()
            .map(|a| wire_asset_to_item(a, &descriptions))
            .collect::<TradeResult<Vec<_>>>()?;

        if tradable_only {
            // The community endpoint has no server-side tradable filter.
            items.retain(|item| item.marketable);
        }

        debug!(
            steam_id = key.steam_id,
            app_id = key.app_id,
            count = items.len(),
            "loaded inventory partition"
        );
        Ok(items)
    }

    async fn get_offers(&self) -> TradeResult<OfferSnapshot> {
        let response = self
            .http
            .get(format!("{}/IEconService/GetTradeOffers/v1/", self.api_base))
            .query(&[
                ("key", self.api_key.clone()),
                ("get_sent_offers", "1".to_string()),
                ("get_received_offers", "1".to_string()),
                ("get_descriptions", "1".to_string()),
                ("active_only", "0".to_string()),
                ("language", "english".to_string()),
            ])
            .send()
            .await?;

        let payload: GetTradeOffersResponse = Self::read_json(response).await?;
        let descriptions = description_map(&payload.response.descriptions);

        let sent = payload
            .response
            .trade_offers_sent
            .iter()
            .map(|w| wire_offer_to_offer(w, &descriptions))
            .collect::<TradeResult<Vec<_>>>()?;
        let received = payload
            .response
            .trade_offers_received
            .iter()
            .map(|w| wire_offer_to_offer(w, &descriptions))
            .collect::<TradeResult<Vec<_>>>()?;

        Ok(OfferSnapshot { sent, received })
    }
}

fn scrape_escrow_days(body: &str, variable: &str) -> TradeResult<u32> {
    let start = body.find(variable).ok_or_else(|| {
        TradeError::Transport(format!("Malformed response: {} not present", variable))
    })?;
    let rest = &body[start + variable.len()..];
    let digits: String = rest
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();

    digits
        .parse::<u32>()
        .map_err(|_| TradeError::Transport(format!("Malformed response: bad {}", variable)))
}

// --- Session provider ---

#[derive(Debug, Deserialize)]
struct WgTokenResponse {
    response: WgTokenPayload,
}

#[derive(Debug, Deserialize)]
struct WgTokenPayload {
    token: String,
    token_secure: String,
}

#[derive(Debug, Deserialize)]
struct ConfirmationList {
    success: bool,
    #[serde(default)]
    conf: Vec<Confirmation>,
}

#[derive(Debug, Deserialize)]
struct Confirmation {
    id: String,
    nonce: String,
    creator_id: String,
}

#[derive(Debug, Deserialize)]
struct ConfirmationOpResponse {
    success: bool,
}

/// Session provider backed by the community/mobile endpoints. Two-factor
/// code generation lives outside this crate; a full credential login
/// therefore requires either persisted cookies or an oauth blob to be
/// available.
pub struct CommunitySession {
    http: reqwest::Client,
    jar: Arc<Jar>,
    steam_id: u64,
    device_id: String,
    api_base: String,
    community_base: String,
}

impl CommunitySession {
    pub fn new(steam_id: u64, device_id: impl Into<String>) -> TradeResult<Self> {
        Self::with_base_urls(steam_id, device_id, API_BASE, COMMUNITY_BASE)
    }

    pub fn with_base_urls(
        steam_id: u64,
        device_id: impl Into<String>,
        api_base: impl Into<String>,
        community_base: impl Into<String>,
    ) -> TradeResult<Self> {
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|e| TradeError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            jar,
            steam_id,
            device_id: device_id.into(),
            api_base: api_base.into(),
            community_base: community_base.into(),
        })
    }

    fn confirmation_query(
        &self,
        identity_secret: &str,
        tag: &str,
    ) -> TradeResult<Vec<(String, String)>> {
        let time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let key = confirmation_key(identity_secret, time, tag)?;

        Ok(vec![
            ("p".to_string(), self.device_id.clone()),
            ("a".to_string(), self.steam_id.to_string()),
            ("k".to_string(), key),
            ("t".to_string(), time.to_string()),
            ("m".to_string(), "react".to_string()),
            ("tag".to_string(), tag.to_string()),
        ])
    }
}

/// Mobile-confirmation proof: HMAC-SHA1 of the big-endian timestamp plus the
/// operation tag, keyed with the base64-decoded identity secret.
pub fn confirmation_key(identity_secret: &str, time: u64, tag: &str) -> TradeResult<String> {
    let secret = BASE64.decode(identity_secret).map_err(|e| {
        TradeError::Validation(format!("identity secret is not valid base64: {}", e))
    })?;

    let mut mac = Hmac::<Sha1>::new_from_slice(&secret)
        .map_err(|e| TradeError::Validation(format!("bad identity secret: {}", e)))?;

    let mut payload = time.to_be_bytes().to_vec();
    payload.extend_from_slice(tag.as_bytes());
    mac.update(&payload);

    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

#[async_trait]
impl SessionProvider for CommunitySession {
    async fn login(&self, credentials: &Credentials) -> TradeResult<LoginOutcome> {
        // TOTP generation is explicitly out of scope for this crate; without
        // a code the community login cannot complete.
        let _ = credentials;
        Err(TradeError::Session(
            "credential login needs a two-factor code from the authenticator service; \
             seed the cookie store or provide an oauth blob"
                .to_string(),
        ))
    }

    async fn oauth_login(&self, oauth: &OAuthData) -> TradeResult<SessionCookies> {
        let response = self
            .http
            .post(format!(
                "{}/IMobileAuthService/GetWGToken/v1/",
                self.api_base
            ))
            .form(&[("access_token", oauth.oauth_token.clone())])
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(TradeError::Session(format!(
                "oauth token rejected ({})",
                status
            )));
        }
        if !status.is_success() {
            return Err(TradeError::Transport(format!("HTTP error {}", status)));
        }

        let body = response.text().await?;
        let payload: WgTokenResponse = serde_json::from_str(&body)
            .map_err(|e| TradeError::Transport(format!("Malformed response: {}", e)))?;

        Ok(SessionCookies {
            cookies: vec![
                format!("steamLogin={}||{}", self.steam_id, payload.response.token),
                format!(
                    "steamLoginSecure={}||{}",
                    self.steam_id, payload.response.token_secure
                ),
                format!("steamMachineAuth{}={}", self.steam_id, oauth.steam_guard),
            ],
        })
    }

    async fn set_cookies(&self, cookies: &SessionCookies) -> TradeResult<()> {
        let url = self
            .community_base
            .parse()
            .map_err(|e| TradeError::Config(format!("bad community base URL: {}", e)))?;

        for cookie in &cookies.cookies {
            self.jar.add_cookie_str(cookie, &url);
        }
        Ok(())
    }

    async fn confirm_offer(&self, identity_secret: &str, offer_id: u64) -> TradeResult<()> {
        let list_query = self.confirmation_query(identity_secret, "conf")?;
        let response = self
            .http
            .get(format!("{}/mobileconf/getlist", self.community_base))
            .query(&list_query)
            .send()
            .await?;

        let list: ConfirmationList = SteamWebClient::read_json(response).await?;
        if !list.success {
            return Err(TradeError::Transport(
                "confirmation list request rejected".to_string(),
            ));
        }

        let confirmation = list
            .conf
            .iter()
            .find(|c| c.creator_id == offer_id.to_string())
            .ok_or_else(|| {
                TradeError::Transport(format!("no pending confirmation for offer {}", offer_id))
            })?;

        let mut accept_query = self.confirmation_query(identity_secret, "allow")?;
        accept_query.push(("op".to_string(), "allow".to_string()));
        accept_query.push(("cid".to_string(), confirmation.id.clone()));
        accept_query.push(("ck".to_string(), confirmation.nonce.clone()));

        let response = self
            .http
            .get(format!("{}/mobileconf/ajaxop", self.community_base))
            .query(&accept_query)
            .send()
            .await?;

        let op: ConfirmationOpResponse = SteamWebClient::read_json(response).await?;
        if !op.success {
            return Err(TradeError::Transport(format!(
                "confirmation for offer {} was rejected",
                offer_id
            )));
        }

        debug!(offer_id, "offer confirmed");
        Ok(())
    }
}
