use actix_web::{HttpResponse, ResponseError, Result, web};
use chrono::{NaiveDate, Utc};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::models::pagination::PaginationParams;
use crate::models::*;
use crate::services::SubscriptionService;
use crate::utils::{
    month_end, month_start, parse_month_year, parse_user_id, validate_price,
    validate_service_name,
};

fn parse_create(req: CreateSubscriptionRequest) -> AppResult<NewSubscription> {
    let end_date = match req.end_date.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(parse_month_year(raw)?),
    };
    Ok(NewSubscription {
        user_id: parse_user_id(&req.user_id)?,
        service_name: validate_service_name(&req.service_name)?,
        price: validate_price(req.price)?,
        start_date: parse_month_year(&req.start_date)?,
        end_date,
    })
}

fn parse_update(req: UpdateSubscriptionRequest, today: NaiveDate) -> AppResult<UpdateRequest> {
    if req.new_price.is_none() && req.new_end_date.is_none() {
        return Err(AppError::ValidationError("No fields to update".into()));
    }
    if let Some(price) = req.new_price {
        validate_price(price)?;
    }

    let end_date = match req.new_end_date {
        None => EndDateUpdate::Omitted,
        Some(None) => EndDateUpdate::Cleared,
        Some(Some(raw)) if raw.trim().is_empty() => EndDateUpdate::Cleared,
        Some(Some(raw)) => {
            let end = month_end(parse_month_year(&raw)?);
            if end < month_start(today) {
                return Err(AppError::ValidationError(
                    "End date cannot be earlier than the current month".into(),
                ));
            }
            EndDateUpdate::Set(end)
        }
    };

    Ok(UpdateRequest {
        new_price: req.new_price,
        end_date,
    })
}

fn parse_period(req: &TotalCostRequest, today: NaiveDate) -> AppResult<(NaiveDate, NaiveDate)> {
    let (Some(raw_from), Some(raw_to)) = (
        req.total_from.as_deref().filter(|s| !s.trim().is_empty()),
        req.total_to.as_deref().filter(|s| !s.trim().is_empty()),
    ) else {
        return Err(AppError::ValidationError(
            "Period for the cost calculation is required".into(),
        ));
    };

    let from = parse_month_year(raw_from)?;
    let to = month_end(parse_month_year(raw_to)?);
    if to < from {
        return Err(AppError::ValidationError(
            "Period end cannot be earlier than its start".into(),
        ));
    }
    if to > month_end(today) {
        return Err(AppError::ValidationError(
            "Period end cannot be later than the current month".into(),
        ));
    }
    Ok((from, to))
}

#[utoipa::path(
    post,
    path = "/subscriptions",
    tag = "subscription",
    request_body = CreateSubscriptionRequest,
    responses(
        (status = 201, description = "Subscription created", body = SubscriptionResponse),
        (status = 400, description = "Invalid request parameters"),
        (status = 409, description = "Active or overlapping subscription exists")
    )
)]
pub async fn create_subscription(
    service: web::Data<SubscriptionService>,
    request: web::Json<CreateSubscriptionRequest>,
) -> Result<HttpResponse> {
    let new = match parse_create(request.into_inner()) {
        Ok(new) => new,
        Err(e) => return Ok(e.error_response()),
    };

    match service.create_subscription(new).await {
        Ok(sub) => Ok(HttpResponse::Created().json(ApiResponse::success_with_message(
            SubscriptionResponse::from(sub),
            "Subscription created",
        ))),
        Err(e) => Ok(e.error_response()),
    }
}

async fn list(
    service: &SubscriptionService,
    user_id: &str,
    service_name: Option<&str>,
    query: SubscriptionListQuery,
) -> AppResult<PaginatedResponse<SubscriptionResponse>> {
    let user_id = parse_user_id(user_id)?;
    let service_name = service_name.map(validate_service_name).transpose()?;
    let status = query.status.unwrap_or_default();
    let params = PaginationParams::new(query.page, query.per_page);

    let total = service
        .count_subscriptions(user_id, service_name.as_deref(), status)
        .await?;
    let items = service
        .get_subscriptions(
            user_id,
            service_name.as_deref(),
            status,
            params.get_limit(),
            params.get_offset(),
        )
        .await?
        .into_iter()
        .map(SubscriptionResponse::from)
        .collect();
    Ok(PaginatedResponse::new(items, &params, total))
}

#[utoipa::path(
    get,
    path = "/users/{user_id}/subscriptions",
    tag = "subscription",
    params(
        ("user_id" = String, Path, description = "User UUID"),
        SubscriptionListQuery
    ),
    responses(
        (status = 200, description = "Subscriptions of the user", body = SubscriptionPage),
        (status = 400, description = "Invalid request parameters")
    )
)]
pub async fn list_subscriptions(
    service: web::Data<SubscriptionService>,
    path: web::Path<String>,
    query: web::Query<SubscriptionListQuery>,
) -> Result<HttpResponse> {
    match list(&service, &path, None, query.into_inner()).await {
        Ok(page) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": page
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    get,
    path = "/users/{user_id}/subscriptions/{service_name}",
    tag = "subscription",
    params(
        ("user_id" = String, Path, description = "User UUID"),
        ("service_name" = String, Path, description = "Service name"),
        SubscriptionListQuery
    ),
    responses(
        (status = 200, description = "Subscriptions of the user to the service", body = SubscriptionPage),
        (status = 400, description = "Invalid request parameters")
    )
)]
pub async fn list_service_subscriptions(
    service: web::Data<SubscriptionService>,
    path: web::Path<(String, String)>,
    query: web::Query<SubscriptionListQuery>,
) -> Result<HttpResponse> {
    let (user_id, service_name) = path.into_inner();
    match list(&service, &user_id, Some(&service_name), query.into_inner()).await {
        Ok(page) => Ok(HttpResponse::Ok().json(json!({
            "success": true,
            "data": page
        }))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    put,
    path = "/users/{user_id}/subscriptions/{service_name}",
    tag = "subscription",
    params(
        ("user_id" = String, Path, description = "User UUID"),
        ("service_name" = String, Path, description = "Service name")
    ),
    request_body = UpdateSubscriptionRequest,
    responses(
        (status = 200, description = "Subscription updated", body = UpdateSubscriptionResponse),
        (status = 400, description = "Invalid request parameters"),
        (status = 404, description = "Active subscription not found"),
        (status = 409, description = "Transition not allowed")
    )
)]
pub async fn update_subscription(
    service: web::Data<SubscriptionService>,
    path: web::Path<(String, String)>,
    request: web::Json<UpdateSubscriptionRequest>,
) -> Result<HttpResponse> {
    let (user_id, service_name) = path.into_inner();
    let parsed = parse_user_id(&user_id).and_then(|user_id| {
        let service_name = validate_service_name(&service_name)?;
        let update = parse_update(request.into_inner(), Utc::now().date_naive())?;
        Ok((user_id, service_name, update))
    });
    let (user_id, service_name, update) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return Ok(e.error_response()),
    };

    match service
        .update_subscription(user_id, &service_name, update)
        .await
    {
        Ok(outcome) => {
            let body = UpdateSubscriptionResponse::from(outcome);
            let message = body.message.clone();
            Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(body, message)))
        }
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    delete,
    path = "/users/{user_id}/subscriptions/{service_name}",
    tag = "subscription",
    params(
        ("user_id" = String, Path, description = "User UUID"),
        ("service_name" = String, Path, description = "Service name")
    ),
    request_body = DeleteSubscriptionRequest,
    responses(
        (status = 200, description = "Subscription deleted"),
        (status = 400, description = "Invalid request parameters"),
        (status = 404, description = "Subscription not found")
    )
)]
pub async fn delete_subscription(
    service: web::Data<SubscriptionService>,
    path: web::Path<(String, String)>,
    request: web::Json<DeleteSubscriptionRequest>,
) -> Result<HttpResponse> {
    let (user_id, service_name) = path.into_inner();
    let parsed = parse_user_id(&user_id).and_then(|user_id| {
        Ok((
            user_id,
            validate_service_name(&service_name)?,
            parse_month_year(&request.start_date)?,
        ))
    });
    let (user_id, service_name, start_date) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return Ok(e.error_response()),
    };

    match service
        .delete_subscription(user_id, &service_name, start_date)
        .await
    {
        Ok(()) => Ok(HttpResponse::Ok().json(ApiResponse::message("Subscription deleted"))),
        Err(e) => Ok(e.error_response()),
    }
}

#[utoipa::path(
    post,
    path = "/users/{user_id}/subscriptions/{service_name}/total",
    tag = "subscription",
    params(
        ("user_id" = String, Path, description = "User UUID"),
        ("service_name" = String, Path, description = "Service name")
    ),
    request_body = TotalCostRequest,
    responses(
        (status = 200, description = "Total cost for the period", body = TotalCostResponse),
        (status = 400, description = "Invalid request parameters")
    )
)]
pub async fn total_cost(
    service: web::Data<SubscriptionService>,
    path: web::Path<(String, String)>,
    request: web::Json<TotalCostRequest>,
) -> Result<HttpResponse> {
    let (user_id, service_name) = path.into_inner();
    let parsed = parse_user_id(&user_id).and_then(|user_id| {
        let service_name = validate_service_name(&service_name)?;
        let (from, to) = parse_period(&request, Utc::now().date_naive())?;
        Ok((user_id, service_name, from, to))
    });
    let (user_id, service_name, from, to) = match parsed {
        Ok(parsed) => parsed,
        Err(e) => return Ok(e.error_response()),
    };

    match service
        .calculate_total_cost(user_id, &service_name, from, to)
        .await
    {
        Ok(summary) => {
            let body = TotalCostResponse::new(&service_name, summary);
            let message = body.message.clone();
            Ok(HttpResponse::Ok().json(ApiResponse::success_with_message(body, message)))
        }
        Err(e) => Ok(e.error_response()),
    }
}

pub fn subscription_config(cfg: &mut web::ServiceConfig) {
    cfg.route("/subscriptions", web::post().to(create_subscription))
        .service(
            web::scope("/users/{user_id}/subscriptions")
                .route("", web::get().to(list_subscriptions))
                .route("/{service_name}", web::get().to(list_service_subscriptions))
                .route("/{service_name}", web::put().to(update_subscription))
                .route("/{service_name}", web::delete().to(delete_subscription))
                .route("/{service_name}/total", web::post().to(total_cost)),
        );
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, http::StatusCode, test as actix_test};
    use sea_orm::{DatabaseBackend, MockDatabase};
    use std::sync::Arc;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_parse_create() {
        let new = parse_create(CreateSubscriptionRequest {
            user_id: "60601fee-2bf1-4721-ae6f-7636e79a0cba".into(),
            service_name: " Yandex Plus ".into(),
            price: 100,
            start_date: "07-2025".into(),
            end_date: Some("".into()),
        })
        .unwrap();
        assert_eq!(new.service_name, "Yandex Plus");
        assert_eq!(new.price, PriceTier::Advanced);
        assert_eq!(new.start_date, d(2025, 7, 1));
        assert_eq!(new.end_date, None);

        let bad_price = parse_create(CreateSubscriptionRequest {
            user_id: "60601fee-2bf1-4721-ae6f-7636e79a0cba".into(),
            service_name: "Netflix".into(),
            price: 75,
            start_date: "07-2025".into(),
            end_date: None,
        });
        assert!(matches!(bad_price, Err(AppError::ValidationError(_))));
    }

    #[test]
    fn test_parse_update() {
        let today = d(2025, 3, 14);
        let empty = parse_update(UpdateSubscriptionRequest::default(), today);
        assert!(matches!(empty, Err(AppError::ValidationError(_))));

        let cleared = parse_update(
            UpdateSubscriptionRequest {
                new_price: None,
                new_end_date: Some(Some(" ".into())),
            },
            today,
        )
        .unwrap();
        assert_eq!(cleared.end_date, EndDateUpdate::Cleared);

        let set = parse_update(
            UpdateSubscriptionRequest {
                new_price: Some(200),
                new_end_date: Some(Some("03-2025".into())),
            },
            today,
        )
        .unwrap();
        assert_eq!(set.end_date, EndDateUpdate::Set(d(2025, 3, 31)));
        assert_eq!(set.new_price, Some(200));

        let past = parse_update(
            UpdateSubscriptionRequest {
                new_price: None,
                new_end_date: Some(Some("02-2025".into())),
            },
            today,
        );
        assert!(past.is_err());

        let bad_tier = parse_update(
            UpdateSubscriptionRequest {
                new_price: Some(150),
                new_end_date: None,
            },
            today,
        );
        assert!(bad_tier.is_err());
    }

    #[test]
    fn test_parse_period() {
        let today = d(2025, 6, 10);
        let req = |from: Option<&str>, to: Option<&str>| TotalCostRequest {
            total_from: from.map(String::from),
            total_to: to.map(String::from),
        };

        assert_eq!(
            parse_period(&req(Some("01-2025"), Some("06-2025")), today).unwrap(),
            (d(2025, 1, 1), d(2025, 6, 30))
        );
        assert!(parse_period(&req(Some("05-2025"), Some("04-2025")), today).is_err());
        assert!(parse_period(&req(Some("01-2025"), Some("07-2025")), today).is_err());
        assert!(parse_period(&req(None, Some("06-2025")), today).is_err());
        assert!(parse_period(&req(Some(""), Some("06-2025")), today).is_err());
    }

    fn mock_service() -> SubscriptionService {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        SubscriptionService::new(Arc::new(db))
    }

    #[actix_web::test]
    async fn test_invalid_user_id_is_rejected_before_storage() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(mock_service()))
                .configure(subscription_config),
        )
        .await;

        let req = actix_test::TestRequest::get()
            .uri("/users/not-a-uuid/subscriptions")
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: serde_json::Value = actix_test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    }

    #[actix_web::test]
    async fn test_update_without_fields_is_rejected() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(mock_service()))
                .configure(subscription_config),
        )
        .await;

        let req = actix_test::TestRequest::put()
            .uri("/users/60601fee-2bf1-4721-ae6f-7636e79a0cba/subscriptions/Netflix")
            .set_json(json!({}))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_create_with_bad_month_is_rejected() {
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(mock_service()))
                .configure(subscription_config),
        )
        .await;

        let req = actix_test::TestRequest::post()
            .uri("/subscriptions")
            .set_json(json!({
                "user_id": "60601fee-2bf1-4721-ae6f-7636e79a0cba",
                "service_name": "Netflix",
                "price": 50,
                "start_date": "2025-07"
            }))
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
