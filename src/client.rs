/// Booking API client
/// Wraps the remote booking service and keeps its rotating access token valid
/// across calls: every response may carry a fresh token in a Set-Cookie
/// header, and a 401/403 is absorbed by one refresh-and-retry cycle.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, COOKIE, SET_COOKIE};
use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{CustomerInfo, Travel, ELIGIBLE_PRODUCT_TYPE};

/// Cookie carrying the rotating access token.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Secondary bot-protection cookie, rotated by the remote service the same
/// way the access token is.
pub const BOT_COOKIE: &str = "datadome";

const READ_CUSTOMER: &str = "/customer/read-customer";
const TRAVEL_CONSULTATION: &str = "/reservation/travel-consultation";
const TRAVEL_CONFIRM: &str = "/reservation/travel-confirm";
const AUTH_REFRESH: &str = "/auth/refresh";

#[derive(Debug)]
struct Session {
    access_token: String,
    bot_cookie: Option<String>,
}

/// Authenticated client for one credential. The session state is shared
/// behind a mutex so the proactive background refresh can rotate the token
/// without blocking the sequential call flow.
#[derive(Clone)]
pub struct BookingClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<Mutex<Session>>,
    proactive_refresh: bool,
}

impl BookingClient {
    pub fn new(base_url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            session: Arc::new(Mutex::new(Session {
                access_token: access_token.into(),
                bot_cookie: None,
            })),
            proactive_refresh: false,
        }
    }

    pub fn with_bot_cookie(mut self, cookie: impl Into<String>) -> Self {
        // Builder runs before the session is shared with any task.
        if let Some(session) = Arc::get_mut(&mut self.session) {
            session.get_mut().bot_cookie = Some(cookie.into());
        }
        self
    }

    /// Enable the best-effort background refresh fired after successful
    /// calls.
    pub fn with_proactive_refresh(mut self, enabled: bool) -> Self {
        self.proactive_refresh = enabled;
        self
    }

    /// Snapshot of the token currently held. Always the freshest one issued
    /// by the remote service, so it is safe to persist.
    pub async fn access_token(&self) -> String {
        self.session.lock().await.access_token.clone()
    }

    /// Fetch the customer profile and cards, filtered to the program's
    /// product type.
    pub async fn customer_info(&self) -> Result<CustomerInfo> {
        let body = json!({ "productTypeFilter": ELIGIBLE_PRODUCT_TYPE });
        let value = self.post_authenticated(READ_CUSTOMER, &body).await?;
        serde_json::from_value(value).map_err(|e| Error::MalformedResponse {
            endpoint: READ_CUSTOMER.to_string(),
            reason: e.to_string(),
        })
    }

    /// List travels for a card departing on or after `since`.
    pub async fn travels(&self, card_number: &str, since: DateTime<Utc>) -> Result<Vec<Travel>> {
        let body = json!({
            "cardNumber": card_number,
            "periodStartDate": since.to_rfc3339_opts(SecondsFormat::Secs, true),
        });
        let value = self.post_authenticated(TRAVEL_CONSULTATION, &body).await?;
        if !value.is_array() {
            return Err(Error::MalformedResponse {
                endpoint: TRAVEL_CONSULTATION.to_string(),
                reason: "expected a travel list".to_string(),
            });
        }
        serde_json::from_value(value).map_err(|e| Error::MalformedResponse {
            endpoint: TRAVEL_CONSULTATION.to_string(),
            reason: e.to_string(),
        })
    }

    /// Confirm one travel by its carrier reference.
    pub async fn confirm_travel(&self, travel: &Travel) -> Result<()> {
        let body = json!({
            "dvNumber": travel.dv_number,
            "trainNumber": travel.train_number,
            "departureDateTime": travel.departure_date_time,
        });
        self.post_authenticated(TRAVEL_CONFIRM, &body).await?;
        Ok(())
    }

    /// Ask the remote service for a fresh access token. The response must
    /// rotate the token; a refresh that hands back nothing (or the same
    /// token) means the credential is unusable and must not be silently
    /// reused.
    pub async fn refresh_session(&self) -> Result<()> {
        let url = format!("{}{}", self.base_url, AUTH_REFRESH);
        let response = self
            .http
            .post(&url)
            .header(COOKIE, self.cookie_header().await)
            .send()
            .await?;

        let rotated = self.adopt_rotated_cookies(response.headers()).await;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ApiRequest {
                endpoint: AUTH_REFRESH.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        if !rotated {
            return Err(Error::MalformedResponse {
                endpoint: AUTH_REFRESH.to_string(),
                reason: "refresh response did not carry a new access token".to_string(),
            });
        }
        Ok(())
    }

    /// Shared authenticated-request primitive. Absorbs exactly one token
    /// refresh on a 401/403; a second rejection fails the call.
    async fn post_authenticated(&self, endpoint: &str, body: &Value) -> Result<Value> {
        match self.attempt(endpoint, body, true).await {
            Err(Error::AuthExpired {
                endpoint: rejected,
                status,
            }) => {
                debug!(endpoint = %rejected, status, "access token rejected, refreshing session");
                if let Err(refresh_err) = self.refresh_session().await {
                    return Err(Error::RefreshFailed {
                        endpoint: rejected,
                        status,
                        reason: refresh_err.to_string(),
                    });
                }
                self.attempt(endpoint, body, false).await
            }
            other => other,
        }
    }

    async fn attempt(&self, endpoint: &str, body: &Value, first: bool) -> Result<Value> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = self
            .http
            .post(&url)
            .header(COOKIE, self.cookie_header().await)
            .json(body)
            .send()
            .await?;

        // The remote service may rotate the token on any response,
        // including failures.
        self.adopt_rotated_cookies(response.headers()).await;

        let status = response.status();
        if first && (status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN) {
            return Err(Error::AuthExpired {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(Error::ApiRequest {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body: body_text,
            });
        }

        // Confirmation responses may come back empty.
        let text = response.text().await?;
        let value = if text.is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| Error::MalformedResponse {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?
        };

        if self.proactive_refresh {
            self.spawn_proactive_refresh();
        }

        Ok(value)
    }

    async fn cookie_header(&self) -> String {
        let session = self.session.lock().await;
        match &session.bot_cookie {
            Some(bot) => format!(
                "{}={}; {}={}",
                ACCESS_TOKEN_COOKIE, session.access_token, BOT_COOKIE, bot
            ),
            None => format!("{}={}", ACCESS_TOKEN_COOKIE, session.access_token),
        }
    }

    /// Scan Set-Cookie headers for rotated tokens and adopt them. Returns
    /// whether the access token actually changed.
    async fn adopt_rotated_cookies(&self, headers: &HeaderMap) -> bool {
        let mut rotated = false;
        let mut session = self.session.lock().await;
        for header in headers.get_all(SET_COOKIE) {
            let Ok(raw) = header.to_str() else { continue };
            let Some((name, value)) = parse_cookie(raw) else {
                continue;
            };
            if name == ACCESS_TOKEN_COOKIE && value != session.access_token {
                debug!("adopting rotated access token");
                session.access_token = value.to_string();
                rotated = true;
            } else if name == BOT_COOKIE && session.bot_cookie.as_deref() != Some(value) {
                session.bot_cookie = Some(value.to_string());
            }
        }
        rotated
    }

    /// Fire a best-effort refresh for the next call. Never blocks the
    /// current one; a failure here is logged and the reactive path will
    /// handle the expiry when it actually bites.
    fn spawn_proactive_refresh(&self) {
        let client = self.clone();
        tokio::spawn(async move {
            if let Err(e) = client.refresh_session().await {
                warn!(error = %e, "proactive token refresh failed");
            }
        });
    }
}

fn parse_cookie(raw: &str) -> Option<(&str, &str)> {
    let pair = raw.split(';').next()?;
    let (name, value) = pair.split_once('=')?;
    Some((name.trim(), value.trim()))
}
