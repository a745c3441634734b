//! Microsoft Graph implementation of [`Directory`].
//!
//! SKUs and service plans are identified by GUID on the wire. This client
//! translates them to `skuPartNumber` / `servicePlanName` through the tenant's
//! `subscribedSkus`, fetched at most once per run.

use log::debug;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;

use super::{Directory, DirectoryError, DirectoryResult};
use crate::config::GraphConfig;
use crate::models::{
    Group, GroupLicense, LicenseAssignment, ProvisioningStatus, ServiceStatus, SkuPlans, User,
};

const USER_SELECT: &str = "id,userPrincipalName,displayName,assignedLicenses,licenseAssignmentStates";
const GROUP_SELECT: &str = "id,displayName,assignedLicenses";

/// `OData` error response from Microsoft Graph.
#[derive(Debug, Deserialize)]
struct ODataError {
    error: ODataErrorBody,
}

#[derive(Debug, Deserialize)]
struct ODataErrorBody {
    code: String,
    message: String,
}

/// One page of a collection response.
#[derive(Debug, Deserialize)]
struct ODataResponse<T> {
    value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphAssignedLicense {
    sku_id: String,
    #[serde(default)]
    disabled_plans: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphLicenseState {
    sku_id: String,
    assigned_by_group: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphUser {
    id: String,
    user_principal_name: String,
    display_name: Option<String>,
    #[serde(default)]
    assigned_licenses: Vec<GraphAssignedLicense>,
    #[serde(default)]
    license_assignment_states: Vec<GraphLicenseState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphPlanStatus {
    service_plan_name: String,
    provisioning_status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphLicenseDetail {
    sku_id: String,
    #[serde(default)]
    service_plans: Vec<GraphPlanStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphGroup {
    id: String,
    display_name: Option<String>,
    #[serde(default)]
    assigned_licenses: Vec<GraphAssignedLicense>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphServicePlan {
    service_plan_id: String,
    service_plan_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphSubscribedSku {
    sku_id: String,
    sku_part_number: String,
    #[serde(default)]
    service_plans: Vec<GraphServicePlan>,
}

/// The tenant's subscribed SKUs, used for GUID ↔ name translation.
#[derive(Debug, Default)]
struct TenantSkus {
    skus: Vec<GraphSubscribedSku>,
}

impl TenantSkus {
    fn part_number(&self, sku_id: &str) -> String {
        self.skus
            .iter()
            .find(|s| s.sku_id.eq_ignore_ascii_case(sku_id))
            .map(|s| s.sku_part_number.clone())
            .unwrap_or_else(|| sku_id.to_string())
    }

    fn sku_id<'a>(&'a self, part_number: &'a str) -> &'a str {
        self.skus
            .iter()
            .find(|s| s.sku_part_number == part_number)
            .map(|s| s.sku_id.as_str())
            .unwrap_or(part_number)
    }

    fn plan_name(&self, plan_id: &str) -> String {
        self.skus
            .iter()
            .flat_map(|s| s.service_plans.iter())
            .find(|p| p.service_plan_id.eq_ignore_ascii_case(plan_id))
            .map(|p| p.service_plan_name.clone())
            .unwrap_or_else(|| plan_id.to_string())
    }

    fn catalog(&self) -> Vec<SkuPlans> {
        self.skus
            .iter()
            .map(|s| SkuPlans {
                sku: s.sku_part_number.clone(),
                plans: s
                    .service_plans
                    .iter()
                    .map(|p| p.service_plan_name.clone())
                    .collect(),
            })
            .collect()
    }
}

impl GraphUser {
    fn into_user(self, skus: &TenantSkus, details: &[GraphLicenseDetail]) -> User {
        let mut sku_ids: Vec<&str> = Vec::new();
        for id in self
            .assigned_licenses
            .iter()
            .map(|l| l.sku_id.as_str())
            .chain(self.license_assignment_states.iter().map(|s| s.sku_id.as_str()))
        {
            // SKU GUIDs compare case-insensitively.
            if !sku_ids.iter().any(|s| s.eq_ignore_ascii_case(id)) {
                sku_ids.push(id);
            }
        }

        let licenses = sku_ids
            .iter()
            .map(|sku_id| {
                // A state without `assignedByGroup` is the user's own direct assignment.
                let mut assigned_by: Vec<String> = Vec::new();
                for state in self
                    .license_assignment_states
                    .iter()
                    .filter(|s| s.sku_id.eq_ignore_ascii_case(sku_id))
                {
                    let assigner = state
                        .assigned_by_group
                        .clone()
                        .unwrap_or_else(|| self.id.clone());
                    if !assigned_by.contains(&assigner) {
                        assigned_by.push(assigner);
                    }
                }

                let service_status = details
                    .iter()
                    .find(|d| d.sku_id.eq_ignore_ascii_case(sku_id))
                    .map(|d| {
                        d.service_plans
                            .iter()
                            .map(|p| ServiceStatus {
                                plan: p.service_plan_name.clone(),
                                status: ProvisioningStatus::from(p.provisioning_status.clone()),
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                LicenseAssignment {
                    sku: skus.part_number(sku_id),
                    assigned_by,
                    service_status,
                }
            })
            .collect();

        User {
            id: self.id,
            user_principal_name: self.user_principal_name,
            display_name: self.display_name,
            licenses,
        }
    }
}

impl GraphGroup {
    fn into_group(self, skus: &TenantSkus) -> Group {
        Group {
            display_name: self.display_name.unwrap_or_else(|| self.id.clone()),
            id: self.id,
            licenses: self
                .assigned_licenses
                .iter()
                .map(|l| GroupLicense {
                    sku: skus.part_number(&l.sku_id),
                    disabled_plans: l.disabled_plans.iter().map(|p| skus.plan_name(p)).collect(),
                })
                .collect(),
        }
    }
}

/// Microsoft Graph client authenticated with the client-credentials flow.
pub struct GraphDirectory {
    http: Client,
    config: GraphConfig,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    token: OnceCell<String>,
    skus: OnceCell<TenantSkus>,
}

impl GraphDirectory {
    /// Creates a client. Fails when tenant, client id or secret are missing.
    pub fn new(config: GraphConfig) -> DirectoryResult<Self> {
        let require = |value: &Option<String>, name: &str| {
            value
                .clone()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| DirectoryError::Config(format!("missing graph.{}", name)))
        };

        let tenant_id = require(&config.tenant_id, "tenant_id")?;
        let client_id = require(&config.client_id, "client_id")?;
        let client_secret = require(&config.client_secret, "client_secret")?;

        let http = Client::builder()
            .user_agent(concat!("license-source/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            config,
            tenant_id,
            client_id,
            client_secret,
            token: OnceCell::new(),
            skus: OnceCell::new(),
        })
    }

    /// Acquire a token up front so bad credentials fail before any work starts.
    pub async fn connect(&self) -> DirectoryResult<()> {
        self.token().await.map(|_| ())
    }

    async fn token(&self) -> DirectoryResult<&str> {
        self.token
            .get_or_try_init(|| self.acquire_token())
            .await
            .map(String::as_str)
    }

    async fn acquire_token(&self) -> DirectoryResult<String> {
        let token_url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.config.login_endpoint.trim_end_matches('/'),
            self.tenant_id
        );
        let scope = format!("{}/.default", self.config.endpoint.trim_end_matches('/'));
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("scope", scope.as_str()),
        ];

        debug!("Requesting token from {}", token_url);
        let response = self
            .http
            .post(&token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| DirectoryError::Auth(format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Auth(format!(
                "Token request failed with status {}: {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| DirectoryError::Auth(format!("Failed to parse token response: {}", e)))?;

        Ok(token.access_token)
    }

    async fn tenant_skus(&self) -> DirectoryResult<&TenantSkus> {
        self.skus
            .get_or_try_init(|| async {
                let url = self.url(&["subscribedSkus"])?;
                let skus = self.get_paginated(url, "Subscribed SKUs").await?;
                debug!("Loaded {} subscribed SKUs", skus.len());
                Ok::<_, DirectoryError>(TenantSkus { skus })
            })
            .await
    }

    fn url(&self, segments: &[&str]) -> DirectoryResult<Url> {
        let base = format!(
            "{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.api_version
        );
        let mut url = Url::parse(&base)
            .map_err(|e| DirectoryError::Config(format!("invalid graph.endpoint {}: {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| DirectoryError::Config(format!("graph.endpoint {} has no path", base)))?
            .extend(segments);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> DirectoryResult<T> {
        let token = self.token().await?;
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let body = response.text().await.unwrap_or_default();
        if status == StatusCode::NOT_FOUND {
            return Err(DirectoryError::NotFound(what.to_string()));
        }
        if let Ok(odata) = serde_json::from_str::<ODataError>(&body) {
            return Err(DirectoryError::Graph {
                code: odata.error.code,
                message: odata.error.message,
            });
        }
        Err(DirectoryError::Graph {
            code: status.to_string(),
            message: body,
        })
    }

    async fn get<T: DeserializeOwned>(&self, url: Url, what: &str) -> DirectoryResult<T> {
        debug!("GET {}", url);
        self.send(self.http.get(url), what).await
    }

    async fn get_paginated<T: DeserializeOwned>(&self, url: Url, what: &str) -> DirectoryResult<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(url);

        while let Some(url) = next {
            let page: ODataResponse<T> = self.get(url, what).await?;
            items.extend(page.value);
            next = page
                .next_link
                .map(|link| Url::parse(&link))
                .transpose()
                .map_err(|e| DirectoryError::Config(format!("invalid @odata.nextLink: {}", e)))?;
        }

        Ok(items)
    }
}

impl Directory for GraphDirectory {
    async fn get_user(&self, user_principal_name: &str) -> DirectoryResult<User> {
        let what = format!("User {}", user_principal_name);
        let mut url = self.url(&["users", user_principal_name])?;
        url.query_pairs_mut().append_pair("$select", USER_SELECT);
        let raw: GraphUser = self.get(url, &what).await?;

        let details_url = self.url(&["users", raw.id.as_str(), "licenseDetails"])?;
        let details: Vec<GraphLicenseDetail> = self.get_paginated(details_url, &what).await?;

        let skus = self.tenant_skus().await?;
        Ok(raw.into_user(skus, &details))
    }

    async fn list_users(&self) -> DirectoryResult<Vec<User>> {
        let mut url = self.url(&["users"])?;
        url.query_pairs_mut()
            .append_pair("$select", USER_SELECT)
            .append_pair("$top", "999");
        let raw: Vec<GraphUser> = self.get_paginated(url, "Users").await?;

        let skus = self.tenant_skus().await?;
        Ok(raw.into_iter().map(|u| u.into_user(skus, &[])).collect())
    }

    async fn get_group(&self, group_id: &str) -> DirectoryResult<Group> {
        let mut url = self.url(&["groups", group_id])?;
        url.query_pairs_mut().append_pair("$select", GROUP_SELECT);
        let raw: GraphGroup = self.get(url, &format!("Group {}", group_id)).await?;

        let skus = self.tenant_skus().await?;
        Ok(raw.into_group(skus))
    }

    async fn sku_catalog(&self) -> DirectoryResult<Vec<SkuPlans>> {
        Ok(self.tenant_skus().await?.catalog())
    }

    async fn remove_license(&self, user: &User, sku: &str) -> DirectoryResult<()> {
        let skus = self.tenant_skus().await?;
        let body = json!({
            "addLicenses": [],
            "removeLicenses": [skus.sku_id(sku)],
        });
        let url = self.url(&["users", user.id.as_str(), "assignLicense"])?;
        debug!("POST {}", url);

        let _: serde_json::Value = self
            .send(self.http.post(url).json(&body), &format!("User {}", user.id))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantSkus {
        let json = r#"[{
            "skuId": "6fd2c87f-b296-42f0-b197-1e91e994b900",
            "skuPartNumber": "ENTERPRISEPACK",
            "servicePlans": [
                {"servicePlanId": "efb87545-963c-4e0d-99df-69c6916d9eb0", "servicePlanName": "EXCHANGE_S_ENTERPRISE"},
                {"servicePlanId": "57ff2da0-773e-42df-b2af-ffb7a2317929", "servicePlanName": "TEAMS1"}
            ]
        }]"#;
        TenantSkus {
            skus: serde_json::from_str(json).unwrap(),
        }
    }

    #[test]
    fn test_odata_error_parsing() {
        let json = r#"{
            "error": {
                "code": "Request_ResourceNotFound",
                "message": "Resource 'x' does not exist",
                "innerError": {"date": "2024-01-15"}
            }
        }"#;

        let error: ODataError = serde_json::from_str(json).unwrap();
        assert_eq!(error.error.code, "Request_ResourceNotFound");
    }

    #[test]
    fn test_user_mapping_direct_group_and_legacy() {
        let json = r#"{
            "id": "u1",
            "userPrincipalName": "alice@contoso.com",
            "displayName": "Alice",
            "assignedLicenses": [
                {"skuId": "6fd2c87f-b296-42f0-b197-1e91e994b900", "disabledPlans": []},
                {"skuId": "11111111-0000-0000-0000-000000000000", "disabledPlans": []}
            ],
            "licenseAssignmentStates": [
                {"skuId": "6fd2c87f-b296-42f0-b197-1e91e994b900", "assignedByGroup": null, "state": "Active"},
                {"skuId": "6fd2c87f-b296-42f0-b197-1e91e994b900", "assignedByGroup": "g1", "state": "Active"}
            ]
        }"#;
        let details_json = r#"[{
            "skuId": "6fd2c87f-b296-42f0-b197-1e91e994b900",
            "skuPartNumber": "ENTERPRISEPACK",
            "servicePlans": [
                {"servicePlanId": "efb87545-963c-4e0d-99df-69c6916d9eb0", "servicePlanName": "EXCHANGE_S_ENTERPRISE", "provisioningStatus": "Success", "appliesTo": "User"}
            ]
        }]"#;

        let raw: GraphUser = serde_json::from_str(json).unwrap();
        let details: Vec<GraphLicenseDetail> = serde_json::from_str(details_json).unwrap();
        let user = raw.into_user(&tenant(), &details);

        assert_eq!(user.licenses.len(), 2);
        assert_eq!(user.licenses[0].sku, "ENTERPRISEPACK");
        assert_eq!(user.licenses[0].assigned_by, vec!["u1", "g1"]);
        assert_eq!(
            user.licenses[0].status_of("EXCHANGE_S_ENTERPRISE"),
            Some(&ProvisioningStatus::Success)
        );

        // Unknown SKU keeps its GUID and, with no state entry, counts as legacy direct.
        assert_eq!(user.licenses[1].sku, "11111111-0000-0000-0000-000000000000");
        assert!(user.licenses[1].assigned_by.is_empty());
        assert!(user.licenses[1].is_direct("u1"));
    }

    #[test]
    fn test_user_mapping_ignores_sku_guid_case() {
        let json = r#"{
            "id": "u1",
            "userPrincipalName": "alice@contoso.com",
            "assignedLicenses": [
                {"skuId": "6fd2c87f-b296-42f0-b197-1e91e994b900", "disabledPlans": []}
            ],
            "licenseAssignmentStates": [
                {"skuId": "6FD2C87F-B296-42F0-B197-1E91E994B900", "assignedByGroup": null, "state": "Active"},
                {"skuId": "6FD2C87F-B296-42F0-B197-1E91E994B900", "assignedByGroup": "g1", "state": "Active"}
            ]
        }"#;
        let details_json = r#"[{
            "skuId": "6FD2C87F-B296-42F0-B197-1E91E994B900",
            "skuPartNumber": "ENTERPRISEPACK",
            "servicePlans": [
                {"servicePlanId": "efb87545-963c-4e0d-99df-69c6916d9eb0", "servicePlanName": "EXCHANGE_S_ENTERPRISE", "provisioningStatus": "Success", "appliesTo": "User"}
            ]
        }]"#;

        let raw: GraphUser = serde_json::from_str(json).unwrap();
        let details: Vec<GraphLicenseDetail> = serde_json::from_str(details_json).unwrap();
        let user = raw.into_user(&tenant(), &details);

        assert_eq!(user.licenses.len(), 1);
        assert_eq!(user.licenses[0].sku, "ENTERPRISEPACK");
        assert_eq!(user.licenses[0].assigned_by, vec!["u1", "g1"]);
        assert_eq!(
            user.licenses[0].status_of("EXCHANGE_S_ENTERPRISE"),
            Some(&ProvisioningStatus::Success)
        );
    }

    #[test]
    fn test_group_mapping_translates_disabled_plans() {
        let json = r#"{
            "id": "g1",
            "displayName": "Sales",
            "assignedLicenses": [{
                "skuId": "6fd2c87f-b296-42f0-b197-1e91e994b900",
                "disabledPlans": ["efb87545-963c-4e0d-99df-69c6916d9eb0"]
            }]
        }"#;

        let raw: GraphGroup = serde_json::from_str(json).unwrap();
        let group = raw.into_group(&tenant());
        assert_eq!(group.display_name, "Sales");
        assert_eq!(group.licenses[0].sku, "ENTERPRISEPACK");
        assert_eq!(group.licenses[0].disabled_plans, vec!["EXCHANGE_S_ENTERPRISE"]);
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let config = GraphConfig::default();
        assert!(matches!(
            GraphDirectory::new(config),
            Err(DirectoryError::Config(_))
        ));
    }

    #[test]
    fn test_sku_id_lookup_falls_back_to_input() {
        let skus = tenant();
        assert_eq!(skus.sku_id("ENTERPRISEPACK"), "6fd2c87f-b296-42f0-b197-1e91e994b900");
        assert_eq!(skus.sku_id("UNKNOWN"), "UNKNOWN");
    }
}
