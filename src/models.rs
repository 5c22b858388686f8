/// Data model shared between the booking API client, the credential store
/// and the orchestration loop. Wire names follow the remote service's
/// camelCase JSON contract.

use serde::{Deserialize, Serialize};

/// Contract status a card must carry to be processed.
pub const ELIGIBLE_CONTRACT_STATUS: &str = "VALIDE";

/// Product type of the loyalty program this batch confirms travels for.
pub const ELIGIBLE_PRODUCT_TYPE: &str = "TGV_MAX_JEUNE";

/// One stored end-user credential. Mutated in place as the remote service
/// rotates the access token, then persisted back as part of the collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub access_token: String,
}

/// Confirmation state of a travel as reported by the remote service.
/// Only `ToBeConfirmed` travels are acted on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TravelStatus {
    TooEarlyToConfirm,
    TooLateToConfirm,
    ToBeConfirmed,
    WillBeCanceled,
    Confirmed,
    /// A status this client does not know about. Never confirmed, but it
    /// must not fail deserialization of the whole travel list either.
    #[serde(other)]
    Unknown,
}

/// One remote travel record. Immutable within a run; the departure time is
/// passed back to the confirmation endpoint verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Travel {
    pub order_id: String,
    pub dv_number: String,
    pub departure_date_time: String,
    pub train_number: String,
    pub travel_confirmed: TravelStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub card_number: String,
    pub product_type: String,
    pub contract_status: String,
}

impl Card {
    /// Whether this card belongs to the program and is still active.
    /// Ineligible cards are never queried for travels.
    pub fn is_eligible(&self) -> bool {
        self.contract_status == ELIGIBLE_CONTRACT_STATUS
            && self.product_type == ELIGIBLE_PRODUCT_TYPE
    }
}

/// Customer profile, fetched once per credential per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub cards: Vec<Card>,
}
