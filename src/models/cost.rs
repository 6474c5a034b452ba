use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CostClassification {
    /// The user never had a subscription to the service.
    NoSubscription,
    /// Subscriptions exist but none was charged inside the period.
    NoOverlap,
    Ok,
}

impl std::fmt::Display for CostClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CostClassification::NoSubscription => write!(f, "no_subscription"),
            CostClassification::NoOverlap => write!(f, "no_overlap"),
            CostClassification::Ok => write!(f, "ok"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct CostSummary {
    pub total: i64,
    pub classification: CostClassification,
}

impl CostSummary {
    pub fn no_subscription() -> Self {
        Self {
            total: 0,
            classification: CostClassification::NoSubscription,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TotalCostRequest {
    /// MM-YYYY
    #[schema(example = "01-2025")]
    pub total_from: Option<String>,
    /// MM-YYYY, not later than the current month
    #[schema(example = "06-2025")]
    pub total_to: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TotalCostResponse {
    pub total: i64,
    pub classification: CostClassification,
    pub message: String,
}

impl TotalCostResponse {
    pub fn new(service_name: &str, summary: CostSummary) -> Self {
        let message = match summary.classification {
            CostClassification::NoSubscription => "No subscriptions found".to_string(),
            CostClassification::NoOverlap => {
                format!("Subscription {service_name} was not active in the selected period")
            }
            CostClassification::Ok => format!(
                "Total cost of subscription {service_name} for the period: {}",
                summary.total
            ),
        };
        Self {
            total: summary.total,
            classification: summary.classification,
            message,
        }
    }
}
