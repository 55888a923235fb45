use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tenant record: which gateways a tenant accepts and which wallet receives its funds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub tenant_id: String,
    pub name: String,
    pub description: Option<String>,
    /// Payment gateways enabled for this tenant, in order of preference
    pub gateways: Vec<String>,
    /// Wallet that receives settled funds
    pub wallet_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn new(tenant_id: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            tenant_id: tenant_id.into(),
            name: name.into(),
            description: None,
            gateways: Vec::new(),
            wallet_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}
