use async_trait::async_trait;
use tracing::{info, instrument};

use super::{
    build_http_client, check_status, GatewayPurchase, GatewayPurchaseRequest, PaymentGateway,
    API_KEY_HEADER, TENANT_HEADER,
};
use crate::errors::ServiceError;

/// Gateways are reached through the core service at `{core_url}/api/{gateway}/v1/payments`.
#[derive(Debug, Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    core_url: String,
    api_key: Option<String>,
}

impl HttpPaymentGateway {
    pub fn new(
        core_url: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_http_client(timeout_secs)?,
            core_url: core_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn payments_url(&self, gateway: &str) -> String {
        format!("{}/api/{}/v1/payments", self.core_url, gateway)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder, tenant_id: &str) -> reqwest::RequestBuilder {
        let builder = builder.header(TENANT_HEADER, tenant_id);
        match &self.api_key {
            Some(key) => builder.header(API_KEY_HEADER, key),
            None => builder,
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    #[instrument(skip(self, request), fields(amount = %request.amount))]
    async fn create_purchase(
        &self,
        tenant_id: &str,
        gateway: &str,
        request: &GatewayPurchaseRequest,
    ) -> Result<GatewayPurchase, ServiceError> {
        let response = self
            .authorize(self.client.post(self.payments_url(gateway)), tenant_id)
            .json(request)
            .send()
            .await?;
        let response = check_status(gateway, response).await?;
        let purchase = response.json::<GatewayPurchase>().await?;
        info!(attempt_id = %purchase.id, "gateway purchase created");
        Ok(purchase)
    }

    #[instrument(skip(self))]
    async fn purchase_status(
        &self,
        tenant_id: &str,
        gateway: &str,
        attempt_id: &str,
    ) -> Result<GatewayPurchase, ServiceError> {
        let url = format!("{}/{}", self.payments_url(gateway), attempt_id);
        let response = self
            .authorize(self.client.get(url), tenant_id)
            .send()
            .await?;
        let response = check_status(gateway, response).await?;
        Ok(response.json::<GatewayPurchase>().await?)
    }

    fn start_url(&self, gateway: &str, attempt_id: &str) -> String {
        format!("{}/{}/start", self.payments_url(gateway), attempt_id)
    }
}
