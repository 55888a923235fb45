use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};

use super::{
    build_http_client, check_status, AccountingClient, Proposal, ProposalRequest, Wallet,
    API_KEY_HEADER, TENANT_HEADER,
};
use crate::errors::ServiceError;

#[derive(Debug, Deserialize)]
struct WalletList {
    #[serde(default)]
    items: Vec<Wallet>,
}

/// Wallets and transfer proposals on the accounting service.
#[derive(Debug, Clone)]
pub struct HttpAccountingClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpAccountingClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_http_client(timeout_secs)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        tenant_id: &str,
    ) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .request(method, format!("{}{}", self.base_url, path))
            .header(TENANT_HEADER, tenant_id);
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        builder
    }
}

#[async_trait]
impl AccountingClient for HttpAccountingClient {
    #[instrument(skip(self))]
    async fn get_wallet(&self, tenant_id: &str, wallet_id: &str) -> Result<Wallet, ServiceError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/wallets/{}", wallet_id),
                tenant_id,
            )
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ServiceError::NotFound(format!(
                "Wallet {} not found",
                wallet_id
            )));
        }
        let response = check_status("accounting", response).await?;
        Ok(response.json::<Wallet>().await?)
    }

    #[instrument(skip(self))]
    async fn user_wallets(
        &self,
        tenant_id: &str,
        user_id: &str,
    ) -> Result<Vec<Wallet>, ServiceError> {
        let response = self
            .request(reqwest::Method::GET, "/wallets", tenant_id)
            .query(&[("user_id", user_id)])
            .send()
            .await?;
        let response = check_status("accounting", response).await?;
        Ok(response.json::<WalletList>().await?.items)
    }

    #[instrument(skip(self))]
    async fn create_wallet(&self, tenant_id: &str, user_id: &str) -> Result<Wallet, ServiceError> {
        let response = self
            .request(reqwest::Method::POST, "/wallets", tenant_id)
            .json(&json!({ "user_id": user_id }))
            .send()
            .await?;
        let response = check_status("accounting", response).await?;
        let wallet = response.json::<Wallet>().await?;
        info!(wallet_id = %wallet.id, "created wallet for user");
        Ok(wallet)
    }

    #[instrument(skip(self, request), fields(amount = %request.amount))]
    async fn create_proposal(
        &self,
        tenant_id: &str,
        request: &ProposalRequest,
    ) -> Result<Proposal, ServiceError> {
        let response = self
            .request(reqwest::Method::POST, "/proposals", tenant_id)
            .json(request)
            .send()
            .await?;
        let response = check_status("accounting", response).await?;
        Ok(response.json::<Proposal>().await?)
    }
}
