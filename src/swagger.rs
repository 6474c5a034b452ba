use actix_web::web;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers;
use crate::models::*;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::subscription::create_subscription,
        handlers::subscription::list_subscriptions,
        handlers::subscription::list_service_subscriptions,
        handlers::subscription::update_subscription,
        handlers::subscription::delete_subscription,
        handlers::subscription::total_cost,
    ),
    components(
        schemas(
            PriceTier,
            SubscriptionStatus,
            CreateSubscriptionRequest,
            UpdateSubscriptionRequest,
            DeleteSubscriptionRequest,
            SubscriptionListQuery,
            SubscriptionResponse,
            SubscriptionPage,
            UpdateOperation,
            UpdateSubscriptionResponse,
            TotalCostRequest,
            TotalCostResponse,
            CostClassification,
            ApiError,
        )
    ),
    tags(
        (name = "subscription", description = "Subscription tracking API"),
    ),
    info(
        title = "Subscription Tracker API",
        version = "1.0.0",
        description = "Per-user subscription, price history and period cost API"
    )
)]
pub struct ApiDoc;

pub fn swagger_config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()),
    )
    .route(
        "/swagger-ui",
        web::get().to(|| async {
            actix_web::HttpResponse::Found()
                .append_header(("Location", "/swagger-ui/"))
                .finish()
        }),
    );
}
