/// Batch orchestration
/// Iterates stored credentials, drives the booking client through
/// profile -> cards -> travels -> confirm for each one, and persists rotated
/// tokens. One bad credential, card or travel never aborts the batch.

use std::collections::HashMap;

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::client::BookingClient;
use crate::error::Result;
use crate::models::{Credential, TravelStatus};
use crate::store::{CredentialStore, SecretStore};

/// Runtime configuration, environment-driven with sensible defaults.
pub struct RunConfig {
    pub api_base_url: String,
    pub store_base_url: String,
    pub credentials_parameter: String,
    pub proactive_refresh: bool,
}

impl RunConfig {
    pub fn from_env() -> Self {
        let api_base_url = std::env::var("BOOKING_API_URL")
            .unwrap_or_else(|_| "https://www.maxjeune-tgvinoui.sncf/api/public".to_string());
        let store_base_url = std::env::var("SECRET_STORE_URL")
            .unwrap_or_else(|_| "http://localhost:2773".to_string());
        let credentials_parameter = std::env::var("CREDENTIALS_PARAMETER")
            .unwrap_or_else(|_| "max-confirm-credentials".to_string());
        let proactive_refresh = std::env::var("ENABLE_PROACTIVE_REFRESH")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(true);

        Self {
            api_base_url,
            store_base_url,
            credentials_parameter,
            proactive_refresh,
        }
    }
}

/// Wire-shaped result handed back to the hosting trigger.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub status_code: u16,
    pub body: String,
}

/// Entry point for the hosting trigger. Never returns an error: a failure to
/// obtain credentials is folded into the 500-shaped response, and anything
/// past that point is partial-batch loss reported as 204.
pub async fn handle(config: &RunConfig) -> RunResponse {
    match run(config).await {
        Ok(confirmed) => RunResponse {
            status_code: 204,
            body: json!({
                "message": "confirmation run completed",
                "confirmed": confirmed,
            })
            .to_string(),
        },
        Err(e) => {
            error!(error = %e, "confirmation run failed");
            RunResponse {
                status_code: 500,
                body: json!({ "message": e.to_string() }).to_string(),
            }
        }
    }
}

/// Process every stored credential in order and confirm what can be
/// confirmed. Returns card number -> number of travels confirmed during this
/// run.
pub async fn run(config: &RunConfig) -> Result<HashMap<String, u32>> {
    let store = CredentialStore::new(
        SecretStore::new(&config.store_base_url),
        &config.credentials_parameter,
    );
    let mut credentials = store.load().await?;

    let mut confirmed: HashMap<String, u32> = HashMap::new();
    for credential in credentials.iter_mut() {
        process_credential(config, credential, &mut confirmed).await;
    }

    info!(
        credentials = credentials.len(),
        confirmations = confirmed.values().sum::<u32>(),
        "run finished"
    );

    // One write for the whole batch, dispatched without waiting: the run
    // must not block on the store, and a lost write only costs a token
    // rotation the next run will redo.
    tokio::spawn(async move {
        store.save(&credentials).await;
    });

    Ok(confirmed)
}

async fn process_credential(
    config: &RunConfig,
    credential: &mut Credential,
    confirmed: &mut HashMap<String, u32>,
) {
    let label = credential
        .name
        .clone()
        .unwrap_or_else(|| "<unnamed>".to_string());
    let client = BookingClient::new(&config.api_base_url, &credential.access_token)
        .with_proactive_refresh(config.proactive_refresh);

    let customer = match client.customer_info().await {
        Ok(customer) => {
            credential.access_token = client.access_token().await;
            customer
        }
        Err(e) => {
            // A rotation may have happened before the call failed; keep it.
            credential.access_token = client.access_token().await;
            warn!(credential = %label, error = %e, "skipping credential, profile fetch failed");
            return;
        }
    };

    info!(
        credential = %label,
        customer = %format!("{} {}", customer.first_name, customer.last_name),
        cards = customer.cards.len(),
        "processing credential"
    );

    let since = Utc::now() - Duration::hours(24);
    for card in customer.cards.iter().filter(|c| c.is_eligible()) {
        let travels = match client.travels(&card.card_number, since).await {
            Ok(travels) => {
                credential.access_token = client.access_token().await;
                travels
            }
            Err(e) => {
                credential.access_token = client.access_token().await;
                warn!(card = %card.card_number, error = %e, "skipping card, travel lookup failed");
                continue;
            }
        };

        for travel in travels
            .iter()
            .filter(|t| t.travel_confirmed == TravelStatus::ToBeConfirmed)
        {
            match client.confirm_travel(travel).await {
                Ok(()) => {
                    credential.access_token = client.access_token().await;
                    *confirmed.entry(card.card_number.clone()).or_insert(0) += 1;
                    info!(
                        card = %card.card_number,
                        train = %travel.train_number,
                        departure = %travel.departure_date_time,
                        "travel confirmed"
                    );
                }
                Err(e) => {
                    credential.access_token = client.access_token().await;
                    warn!(
                        card = %card.card_number,
                        train = %travel.train_number,
                        error = %e,
                        "travel confirmation failed"
                    );
                }
            }
        }
    }
}
