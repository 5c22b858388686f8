/// Integration tests for the batch orchestration loop
/// Runs the full credential pipeline against a mock booking service and a
/// mock secret store, covering partial-failure isolation and token
/// persistence

use mockito::Matcher;
use serde_json::json;

use max_confirm::{handle, run, RunConfig};

fn config_for(api: &mockito::Server, store: &mockito::Server) -> RunConfig {
    RunConfig {
        api_base_url: api.url(),
        store_base_url: store.url(),
        credentials_parameter: "test-creds".to_string(),
        proactive_refresh: false,
    }
}

async fn wait_until_matched(mock: &mockito::Mock) {
    for _ in 0..50 {
        if mock.matched_async().await {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn missing_credentials_fail_the_run_without_api_calls() {
    let mut api = mockito::Server::new_async().await;
    let mut store = mockito::Server::new_async().await;

    let _creds = store
        .mock("GET", "/secrets/test-creds")
        .with_status(404)
        .create_async()
        .await;

    let untouched = api
        .mock("POST", "/customer/read-customer")
        .expect(0)
        .create_async()
        .await;

    let response = handle(&config_for(&api, &store)).await;
    assert_eq!(response.status_code, 500);
    assert!(response.body.contains("credential store"), "{}", response.body);

    untouched.assert_async().await;
}

#[tokio::test]
async fn malformed_credential_payload_fails_the_run_without_api_calls() {
    let mut api = mockito::Server::new_async().await;
    let mut store = mockito::Server::new_async().await;

    let _creds = store
        .mock("GET", "/secrets/test-creds")
        .with_status(200)
        .with_body(r#"{"not":"an array"}"#)
        .create_async()
        .await;

    let untouched = api
        .mock("POST", "/customer/read-customer")
        .expect(0)
        .create_async()
        .await;

    let response = handle(&config_for(&api, &store)).await;
    assert_eq!(response.status_code, 500);

    untouched.assert_async().await;
}

#[tokio::test]
async fn rotated_token_is_persisted_and_used_for_later_calls() {
    let mut api = mockito::Server::new_async().await;
    let mut store = mockito::Server::new_async().await;

    let _creds = store
        .mock("GET", "/secrets/test-creds")
        .with_status(200)
        .with_body(r#"[{"name":"alice","accessToken":"tok-1"}]"#)
        .create_async()
        .await;

    let _profile = api
        .mock("POST", "/customer/read-customer")
        .match_header("cookie", "access_token=tok-1")
        .with_status(200)
        .with_header("set-cookie", "access_token=tok-2; Path=/")
        .with_body(
            json!({
                "firstName": "Alice",
                "lastName": "Martin",
                "cards": [{
                    "cardNumber": "card-a",
                    "productType": "TGV_MAX_JEUNE",
                    "contractStatus": "VALIDE"
                }]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    // Travel lookup must ride on the rotated token.
    let travels = api
        .mock("POST", "/reservation/travel-consultation")
        .match_header("cookie", "access_token=tok-2")
        .with_status(200)
        .with_body("[]")
        .expect(1)
        .create_async()
        .await;

    let persisted = store
        .mock("PUT", "/secrets/test-creds")
        .match_body(Matcher::Json(json!([
            { "name": "alice", "accessToken": "tok-2" }
        ])))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let confirmed = run(&config_for(&api, &store)).await.unwrap();
    assert!(confirmed.is_empty());

    travels.assert_async().await;
    wait_until_matched(&persisted).await;
    persisted.assert_async().await;
}

#[tokio::test]
async fn one_failing_credential_does_not_abort_the_batch() {
    let mut api = mockito::Server::new_async().await;
    let mut store = mockito::Server::new_async().await;

    let _creds = store
        .mock("GET", "/secrets/test-creds")
        .with_status(200)
        .with_body(
            r#"[{"name":"alice","accessToken":"tok-a"},{"name":"bob","accessToken":"tok-b1"}]"#,
        )
        .create_async()
        .await;

    // Alice's profile fetch blows up; she is skipped, the batch continues.
    let _alice_profile = api
        .mock("POST", "/customer/read-customer")
        .match_header("cookie", "access_token=tok-a")
        .with_status(500)
        .with_body(r#"{"message":"boom"}"#)
        .expect(1)
        .create_async()
        .await;

    let _bob_profile = api
        .mock("POST", "/customer/read-customer")
        .match_header("cookie", "access_token=tok-b1")
        .with_status(200)
        .with_body(
            json!({
                "firstName": "Bob",
                "lastName": "Durand",
                "cards": [
                    {
                        "cardNumber": "card-b",
                        "productType": "TGV_MAX_JEUNE",
                        "contractStatus": "VALIDE"
                    },
                    {
                        "cardNumber": "card-x",
                        "productType": "TGV_MAX_JEUNE",
                        "contractStatus": "RESILIE"
                    }
                ]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let eligible_lookup = api
        .mock("POST", "/reservation/travel-consultation")
        .match_body(Matcher::PartialJson(json!({ "cardNumber": "card-b" })))
        .with_status(200)
        .with_body(
            json!([
                {
                    "orderId": "ORD-1", "dvNumber": "DV-1", "trainNumber": "6214",
                    "departureDateTime": "2026-08-28T09:12:00",
                    "travelConfirmed": "TO_BE_CONFIRMED"
                },
                {
                    "orderId": "ORD-2", "dvNumber": "DV-2", "trainNumber": "6216",
                    "departureDateTime": "2026-08-28T12:40:00",
                    "travelConfirmed": "TO_BE_CONFIRMED"
                },
                {
                    "orderId": "ORD-3", "dvNumber": "DV-3", "trainNumber": "6218",
                    "departureDateTime": "2026-08-28T15:02:00",
                    "travelConfirmed": "CONFIRMED"
                },
                {
                    "orderId": "ORD-4", "dvNumber": "DV-4", "trainNumber": "6220",
                    "departureDateTime": "2026-08-28T18:30:00",
                    "travelConfirmed": "TO_BE_CONFIRMED"
                }
            ])
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    // The expired card must never be queried.
    let ineligible_lookup = api
        .mock("POST", "/reservation/travel-consultation")
        .match_body(Matcher::PartialJson(json!({ "cardNumber": "card-x" })))
        .expect(0)
        .create_async()
        .await;

    // First confirmation succeeds and rotates Bob's token.
    let _confirm_first = api
        .mock("POST", "/reservation/travel-confirm")
        .match_body(Matcher::PartialJson(json!({ "dvNumber": "DV-1" })))
        .with_status(200)
        .with_header("set-cookie", "access_token=tok-b2; Path=/")
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;

    // Second one fails; the loop must carry on to the third.
    let _confirm_second = api
        .mock("POST", "/reservation/travel-confirm")
        .match_body(Matcher::PartialJson(json!({ "dvNumber": "DV-2" })))
        .with_status(500)
        .with_body(r#"{"message":"train left"}"#)
        .expect(1)
        .create_async()
        .await;

    let _confirm_third = api
        .mock("POST", "/reservation/travel-confirm")
        .match_body(Matcher::PartialJson(json!({ "dvNumber": "DV-4" })))
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;

    // The already-confirmed travel is never re-confirmed.
    let already_confirmed = api
        .mock("POST", "/reservation/travel-confirm")
        .match_body(Matcher::PartialJson(json!({ "dvNumber": "DV-3" })))
        .expect(0)
        .create_async()
        .await;

    // Both credentials come back, Bob's with the rotated token.
    let persisted = store
        .mock("PUT", "/secrets/test-creds")
        .match_body(Matcher::Json(json!([
            { "name": "alice", "accessToken": "tok-a" },
            { "name": "bob", "accessToken": "tok-b2" }
        ])))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let confirmed = run(&config_for(&api, &store)).await.unwrap();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed.get("card-b"), Some(&2));

    eligible_lookup.assert_async().await;
    ineligible_lookup.assert_async().await;
    already_confirmed.assert_async().await;
    wait_until_matched(&persisted).await;
    persisted.assert_async().await;
}

#[tokio::test]
async fn handle_reports_204_even_with_partial_failures() {
    let mut api = mockito::Server::new_async().await;
    let mut store = mockito::Server::new_async().await;

    let _creds = store
        .mock("GET", "/secrets/test-creds")
        .with_status(200)
        .with_body(r#"[{"name":"carol","accessToken":"tok-c"}]"#)
        .create_async()
        .await;

    // Profile fetch fails outright; the run still completes as 204 with an
    // empty confirmation map.
    let _profile = api
        .mock("POST", "/customer/read-customer")
        .with_status(500)
        .with_body(r#"{"message":"down"}"#)
        .create_async()
        .await;

    let _persisted = store
        .mock("PUT", "/secrets/test-creds")
        .with_status(200)
        .create_async()
        .await;

    let response = handle(&config_for(&api, &store)).await;
    assert_eq!(response.status_code, 204);

    let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
    assert_eq!(body["confirmed"], json!({}));
}
