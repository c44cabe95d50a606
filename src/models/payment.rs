use serde::{Deserialize, Serialize};

/// Processor status that triggers a renewal.
pub const PAYMENT_STATUS_APPROVED: &str = "approved";

/// Statuses a payment can only hold before approval. A lookup that reports
/// one of these for an already approved payment is older than the stored row.
const PRE_APPROVAL_STATUSES: [&str; 4] = ["pending", "authorized", "in_process", "rejected"];

pub fn is_pre_approval_status(status: &str) -> bool {
    PRE_APPROVAL_STATUSES.contains(&status)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// Identifier issued by the payment processor
    pub payment_id: String,
    pub license_key: String,
    pub amount: f64,
    /// Last status reported by the processor, mirrored verbatim
    pub status: String,
    /// Set exactly once, when the payment is first seen approved
    pub approved_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreatePayment {
    pub license_key: String,
    pub amount: f64,
    #[serde(default)]
    pub payer_email: Option<String>,
}
