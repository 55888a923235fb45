use async_trait::async_trait;
use tracing::{info, instrument};

use super::{
    build_http_client, check_status, Enrollment, EnrollmentClient, EnrollmentRequest,
    API_KEY_HEADER, TENANT_HEADER,
};
use crate::errors::ServiceError;

#[derive(Debug, Clone)]
pub struct HttpEnrollmentClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpEnrollmentClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_http_client(timeout_secs)?,
            endpoint: endpoint.into(),
            api_key,
        })
    }
}

#[async_trait]
impl EnrollmentClient for HttpEnrollmentClient {
    #[instrument(skip(self, request), fields(user_id = %request.user_id))]
    async fn create_enrollment(
        &self,
        tenant_id: &str,
        request: &EnrollmentRequest,
    ) -> Result<Enrollment, ServiceError> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(TENANT_HEADER, tenant_id)
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.header(API_KEY_HEADER, key);
        }
        let response = check_status("enrollment", builder.send().await?).await?;
        let enrollment = response.json::<Enrollment>().await?;
        info!(enrollment_id = %enrollment.id, "enrollment created");
        Ok(enrollment)
    }
}
