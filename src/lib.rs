/// TGV Max auto-confirmation library
/// Exposes the booking API client, the credential store adapter and the
/// batch orchestration loop for reuse in the scheduled binary and in tests

pub mod client;
pub mod error;
pub mod models;
pub mod orchestration;
pub mod store;

pub use client::BookingClient;
pub use error::{Error, Result};
pub use models::{Card, Credential, CustomerInfo, Travel, TravelStatus};
pub use orchestration::{handle, run, RunConfig, RunResponse};
pub use store::{CredentialStore, SecretStore};
