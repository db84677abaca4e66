use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::fee_payment::{FinalFeePayment, lenient_amount};

/// Applicant identity section (`basic`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BasicInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub guardian_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Applicant contact section (`contact`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Account section (`account`): link to the Firebase user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountInfo {
    #[serde(default)]
    pub auth_id: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Admin-entered details (`application_details`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplicationDetails {
    #[serde(default)]
    pub course_name: Option<String>,
    #[serde(default)]
    pub batch: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub total_course_fees: Option<f64>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub discount: Option<f64>,
    #[serde(default)]
    pub application_submitted: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One applicant row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    pub id: String,
    pub basic: BasicInfo,
    pub contact: ContactInfo,
    pub account: AccountInfo,
    pub application_details: ApplicationDetails,
    pub final_fee_payment: FinalFeePayment,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Application {
    pub fn display_name(&self) -> &str {
        self.basic.name.as_deref().unwrap_or("Student")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateApplication {
    #[serde(default)]
    pub basic: BasicInfo,
    #[serde(default)]
    pub contact: ContactInfo,
    #[serde(default)]
    pub account: AccountInfo,
    #[serde(default)]
    pub application_details: ApplicationDetails,
    #[serde(default)]
    pub final_fee_payment: Option<FinalFeePayment>,
}
