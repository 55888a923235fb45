use async_trait::async_trait;
use reqwest::header::ACCEPT_ENCODING;
use tracing::{instrument, warn};

use super::{build_http_client, check_status, ProductCatalog, ProductDetail, ProductValidation};
use crate::errors::ServiceError;
use crate::models::BasketItem;

/// Fetches products and validation data straight from the URLs carried by items.
#[derive(Debug, Clone)]
pub struct HttpProductCatalog {
    client: reqwest::Client,
}

impl HttpProductCatalog {
    pub fn new(timeout_secs: u64) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_http_client(timeout_secs)?,
        })
    }
}

#[async_trait]
impl ProductCatalog for HttpProductCatalog {
    #[instrument(skip(self))]
    async fn get_product(&self, product_url: &str) -> Result<ProductDetail, ServiceError> {
        let response = self
            .client
            .get(product_url)
            .header(ACCEPT_ENCODING, "identity")
            .send()
            .await?;
        let response = check_status("product catalog", response).await?;
        Ok(response.json::<ProductDetail>().await?)
    }

    #[instrument(skip(self, item), fields(item_id = %item.id))]
    async fn validate_item(&self, item: &BasketItem) -> Result<bool, ServiceError> {
        let Some(url) = item.validation_url.as_deref() else {
            return Ok(true);
        };
        let response = self.client.get(url).send().await?;
        let response = check_status("product validation", response).await?;
        let validation = response.json::<ProductValidation>().await?;
        let accepted = validation.accepts(item);
        if !accepted {
            warn!(product_url = %item.product_url, "item failed validation");
        }
        Ok(accepted)
    }
}
