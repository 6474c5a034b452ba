use crate::entities::{subscription_entity as subs, subscription_price_entity as prices};
use crate::utils::{format_month_year, from_storage_end};
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// 订阅等级（固定价格档位）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PriceTier {
    Basic,
    Advanced,
    Premium,
}

impl PriceTier {
    pub fn amount(self) -> i32 {
        match self {
            PriceTier::Basic => 50,
            PriceTier::Advanced => 100,
            PriceTier::Premium => 200,
        }
    }
}

impl TryFrom<i32> for PriceTier {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            50 => Ok(PriceTier::Basic),
            100 => Ok(PriceTier::Advanced),
            200 => Ok(PriceTier::Premium),
            other => Err(other),
        }
    }
}

impl std::fmt::Display for PriceTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceTier::Basic => write!(f, "basic"),
            PriceTier::Advanced => write!(f, "advanced"),
            PriceTier::Premium => write!(f, "premium"),
        }
    }
}

/// A subscription as seen by the service layer. `end_date == None` means
/// open-ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: i64,
    pub user_id: Uuid,
    pub service_name: String,
    pub price: i32,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl Subscription {
    pub fn is_active_on(&self, day: NaiveDate) -> bool {
        self.end_date.is_none_or(|end| end >= day)
    }

    pub fn has_started_by(&self, day: NaiveDate) -> bool {
        self.start_date <= day
    }
}

impl From<subs::Model> for Subscription {
    fn from(m: subs::Model) -> Self {
        Self {
            id: m.id,
            user_id: m.user_id,
            service_name: m.service_name,
            price: m.price,
            start_date: m.start_date,
            end_date: from_storage_end(m.end_date),
        }
    }
}

/// One contiguous price-charging segment of a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceVersion {
    pub id: i64,
    pub subscription_id: i64,
    pub price: i32,
    pub previous_price: Option<i32>,
    pub valid_from: NaiveDate,
    pub valid_to: Option<NaiveDate>,
}

impl From<prices::Model> for PriceVersion {
    fn from(m: prices::Model) -> Self {
        Self {
            id: m.id,
            subscription_id: m.subscription_id,
            price: m.price,
            previous_price: m.previous_price,
            valid_from: m.valid_from,
            valid_to: from_storage_end(m.valid_to),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewSubscription {
    pub user_id: Uuid,
    pub service_name: String,
    pub price: PriceTier,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Active,
    Archived,
}

/// What an update asks for regarding the end date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndDateUpdate {
    Omitted,
    Set(NaiveDate),
    /// Make the subscription open-ended.
    Cleared,
}

impl EndDateUpdate {
    /// The requested end date, if the request names one.
    pub fn target(self) -> Option<Option<NaiveDate>> {
        match self {
            EndDateUpdate::Omitted => None,
            EndDateUpdate::Set(d) => Some(Some(d)),
            EndDateUpdate::Cleared => Some(None),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateRequest {
    pub new_price: Option<i32>,
    pub end_date: EndDateUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UpdateOperation {
    Upgrade,
    Downgrade,
    Rollback,
}

impl std::fmt::Display for UpdateOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateOperation::Upgrade => write!(f, "upgrade"),
            UpdateOperation::Downgrade => write!(f, "downgrade"),
            UpdateOperation::Rollback => write!(f, "rollback"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct UpdateOutcome {
    pub price_changed: bool,
    pub end_date_changed: bool,
    pub operation: Option<UpdateOperation>,
}

impl UpdateOutcome {
    pub fn is_noop(&self) -> bool {
        !self.price_changed && !self.end_date_changed && self.operation.is_none()
    }

    pub fn message(&self) -> String {
        if self.is_noop() {
            return "Subscription already matches the requested parameters".to_string();
        }
        let mut parts = Vec::new();
        match self.operation {
            Some(UpdateOperation::Upgrade) => {
                parts.push("Subscription tier raised and already in effect")
            }
            Some(UpdateOperation::Downgrade) => parts.push(
                "Subscription tier lowered, effective next month; the current tier applies until the end of this month",
            ),
            Some(UpdateOperation::Rollback) => parts.push("Previous subscription tier restored"),
            None => {}
        }
        if self.end_date_changed {
            parts.push("Subscription end date changed");
        }
        parts.join(". ")
    }
}

// ---------------------------------------------------------------------------
// HTTP request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreateSubscriptionRequest {
    #[schema(example = "60601fee-2bf1-4721-ae6f-7636e79a0cba")]
    pub user_id: String,
    #[schema(example = "Yandex Plus")]
    pub service_name: String,
    #[schema(example = 100)]
    pub price: i32,
    /// MM-YYYY
    #[schema(example = "07-2025")]
    pub start_date: String,
    /// MM-YYYY, omitted for an open-ended subscription
    #[schema(example = "12-2025")]
    pub end_date: Option<String>,
}

/// `new_end_date` absent keeps the end date, `null` or `""` clears it.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateSubscriptionRequest {
    #[schema(example = 200)]
    pub new_price: Option<i32>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>, example = "12-2025")]
    pub new_end_date: Option<Option<String>>,
}

fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeleteSubscriptionRequest {
    /// MM-YYYY
    #[schema(example = "07-2025")]
    pub start_date: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct SubscriptionListQuery {
    pub status: Option<SubscriptionStatus>,
    /// 页码 (默认1)
    pub page: Option<u32>,
    /// 每页数量 (默认5)
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionResponse {
    pub service_name: String,
    pub price: i32,
    /// MM-YYYY
    pub start_date: String,
    /// MM-YYYY, absent for open-ended subscriptions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

impl From<Subscription> for SubscriptionResponse {
    fn from(s: Subscription) -> Self {
        Self {
            service_name: s.service_name,
            price: s.price,
            start_date: format_month_year(s.start_date),
            end_date: s.end_date.map(format_month_year),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UpdateSubscriptionResponse {
    pub price_changed: bool,
    pub end_date_changed: bool,
    pub operation: Option<UpdateOperation>,
    pub message: String,
}

impl From<UpdateOutcome> for UpdateSubscriptionResponse {
    fn from(o: UpdateOutcome) -> Self {
        Self {
            price_changed: o.price_changed,
            end_date_changed: o.end_date_changed,
            operation: o.operation,
            message: o.message(),
        }
    }
}
