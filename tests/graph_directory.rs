//! `GraphDirectory` against a wiremock stand-in for Microsoft Graph.

use serde_json::{json, Value};
use wiremock::matchers::{body_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use license_source::config::GraphConfig;
use license_source::directory::graph::GraphDirectory;
use license_source::directory::{Directory, DirectoryError};
use license_source::models::ProvisioningStatus;

const TENANT: &str = "contoso-tenant";
const E3_ID: &str = "6fd2c87f-b296-42f0-b197-1e91e994b900";
const EXCHANGE_ID: &str = "efb87545-963c-4e0d-99df-69c6916d9eb0";
const TEAMS_ID: &str = "57ff2da0-773e-42df-b2af-ffb7a2317929";

fn config(server: &MockServer) -> GraphConfig {
    GraphConfig {
        tenant_id: Some(TENANT.to_string()),
        client_id: Some("client".to_string()),
        client_secret: Some("secret".to_string()),
        endpoint: server.uri(),
        login_endpoint: server.uri(),
        api_version: "v1.0".to_string(),
    }
}

fn user_json(id: &str, upn: &str) -> Value {
    json!({
        "id": id,
        "userPrincipalName": upn,
        "displayName": "Alice",
        "assignedLicenses": [{"skuId": E3_ID, "disabledPlans": []}],
        "licenseAssignmentStates": [
            {"skuId": E3_ID, "assignedByGroup": null, "state": "Active"},
            {"skuId": E3_ID, "assignedByGroup": "g-sales", "state": "Active"}
        ]
    })
}

/// Token endpoint and `subscribedSkus`, which must be fetched exactly `sku_calls` times.
async fn mount_basics(server: &MockServer, sku_calls: u64) {
    Mock::given(method("POST"))
        .and(path(format!("/{}/oauth2/v2.0/token", TENANT)))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/subscribedSkus"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{
                "skuId": E3_ID,
                "skuPartNumber": "ENTERPRISEPACK",
                "servicePlans": [
                    {"servicePlanId": EXCHANGE_ID, "servicePlanName": "EXCHANGE_S_ENTERPRISE"},
                    {"servicePlanId": TEAMS_ID, "servicePlanName": "TEAMS1"}
                ]
            }]
        })))
        .expect(sku_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_get_user_maps_assigners_and_plan_status() {
    let server = MockServer::start().await;
    mount_basics(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users/alice@contoso.com"))
        .and(header("authorization", "Bearer test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json("u-alice", "alice@contoso.com")))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users/u-alice/licenseDetails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [{
                "skuId": E3_ID,
                "servicePlans": [
                    {"servicePlanName": "EXCHANGE_S_ENTERPRISE", "provisioningStatus": "Success"},
                    {"servicePlanName": "TEAMS1", "provisioningStatus": "PendingProvisioning"}
                ]
            }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/groups/g-sales"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "g-sales",
            "displayName": "Sales",
            "assignedLicenses": [{"skuId": E3_ID, "disabledPlans": [EXCHANGE_ID]}]
        })))
        .mount(&server)
        .await;

    let directory = GraphDirectory::new(config(&server)).unwrap();
    let user = directory.get_user("alice@contoso.com").await.unwrap();

    assert_eq!(user.id, "u-alice");
    assert_eq!(user.licenses.len(), 1);
    let license = &user.licenses[0];
    assert_eq!(license.sku, "ENTERPRISEPACK");
    assert_eq!(license.assigned_by, vec!["u-alice", "g-sales"]);
    assert_eq!(
        license.status_of("TEAMS1"),
        Some(&ProvisioningStatus::PendingProvisioning)
    );

    // Later calls reuse the cached SKU list.
    let group = directory.get_group("g-sales").await.unwrap();
    assert_eq!(group.licenses[0].disabled_plans, vec!["EXCHANGE_S_ENTERPRISE"]);

    let catalog = directory.sku_catalog().await.unwrap();
    assert_eq!(catalog[0].plans, vec!["EXCHANGE_S_ENTERPRISE", "TEAMS1"]);
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let server = MockServer::start().await;
    mount_basics(&server, 0).await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users/ghost@contoso.com"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error": {"code": "Request_ResourceNotFound", "message": "Resource does not exist"}
        })))
        .mount(&server)
        .await;

    let directory = GraphDirectory::new(config(&server)).unwrap();
    let err = directory.get_user("ghost@contoso.com").await.unwrap_err();
    assert!(err.is_not_found(), "{:?}", err);
}

#[tokio::test]
async fn test_list_users_follows_next_link() {
    let server = MockServer::start().await;
    mount_basics(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(query_param("$skiptoken", "page2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [user_json("u-bob", "bob@contoso.com")]
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users"))
        .and(query_param("$top", "999"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": [user_json("u-alice", "alice@contoso.com")],
            "@odata.nextLink": format!("{}/v1.0/users?$skiptoken=page2", server.uri())
        })))
        .mount(&server)
        .await;

    let directory = GraphDirectory::new(config(&server)).unwrap();
    let users = directory.list_users().await.unwrap();

    let upns: Vec<&str> = users.iter().map(|u| u.user_principal_name.as_str()).collect();
    assert_eq!(upns, vec!["alice@contoso.com", "bob@contoso.com"]);
    assert!(users[1].licenses[0].is_direct("u-bob"));
}

#[tokio::test]
async fn test_remove_license_posts_sku_guid() {
    let server = MockServer::start().await;
    mount_basics(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/v1.0/users/alice@contoso.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json("u-alice", "alice@contoso.com")))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1.0/users/u-alice/licenseDetails"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": []})))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1.0/users/u-alice/assignLicense"))
        .and(body_json(json!({"addLicenses": [], "removeLicenses": [E3_ID]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "u-alice"})))
        .expect(1)
        .mount(&server)
        .await;

    let directory = GraphDirectory::new(config(&server)).unwrap();
    let user = directory.get_user("alice@contoso.com").await.unwrap();
    directory.remove_license(&user, "ENTERPRISEPACK").await.unwrap();
}

#[tokio::test]
async fn test_graph_error_is_decoded() {
    let server = MockServer::start().await;
    mount_basics(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/v1.0/users/u-alice/assignLicense"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "code": "Request_BadRequest",
                "message": "User license is inherited from a group membership and it cannot be removed directly from the user."
            }
        })))
        .mount(&server)
        .await;

    let user = license_source::models::User {
        id: "u-alice".to_string(),
        user_principal_name: "alice@contoso.com".to_string(),
        display_name: None,
        licenses: Vec::new(),
    };

    let directory = GraphDirectory::new(config(&server)).unwrap();
    match directory.remove_license(&user, "ENTERPRISEPACK").await {
        Err(DirectoryError::Graph { code, message }) => {
            assert_eq!(code, "Request_BadRequest");
            assert!(message.contains("inherited"));
        }
        other => panic!("expected a Graph error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rejected_credentials_fail_connect() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(format!("/{}/oauth2/v2.0/token", TENANT)))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": "invalid_client",
            "error_description": "AADSTS7000215: Invalid client secret provided."
        })))
        .mount(&server)
        .await;

    let directory = GraphDirectory::new(config(&server)).unwrap();
    assert!(matches!(directory.connect().await, Err(DirectoryError::Auth(_))));
}
