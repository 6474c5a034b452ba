use crate::error::{AppError, AppResult};
use crate::models::PriceTier;
use regex::Regex;
use std::sync::LazyLock;
use uuid::Uuid;

static SERVICE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9 ]+$").expect("service name regex"));

/// 校验用户 UUID
pub fn parse_user_id(raw: &str) -> AppResult<Uuid> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AppError::ValidationError("User id is required".into()));
    }
    Uuid::parse_str(raw).map_err(|_| AppError::ValidationError("Invalid user id format".into()))
}

/// 服务名只允许字母、数字与空格，返回去除首尾空白后的名称
pub fn validate_service_name(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::ValidationError("Service name is required".into()));
    }
    if !SERVICE_NAME_RE.is_match(name) {
        return Err(AppError::ValidationError(
            "Invalid service name: only letters, digits and spaces are allowed".into(),
        ));
    }
    Ok(name.to_string())
}

pub fn validate_price(price: i32) -> AppResult<PriceTier> {
    PriceTier::try_from(price).map_err(|_| {
        AppError::ValidationError(
            "Choose a valid tier: Basic (50), Advanced (100), Premium (200)".into(),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_id() {
        assert!(parse_user_id("60601fee-2bf1-4721-ae6f-7636e79a0cba").is_ok());
        assert!(parse_user_id(" 60601fee-2bf1-4721-ae6f-7636e79a0cba ").is_ok());
        assert!(parse_user_id("not-a-uuid").is_err());
        assert!(parse_user_id("").is_err());
    }

    #[test]
    fn test_validate_service_name() {
        assert_eq!(validate_service_name("  Yandex Plus ").unwrap(), "Yandex Plus");
        assert!(validate_service_name("Netflix2").is_ok());
        assert!(validate_service_name("Spotify!").is_err());
        assert!(validate_service_name("Кинопоиск").is_err());
        assert!(validate_service_name("   ").is_err());
    }

    #[test]
    fn test_validate_price() {
        assert_eq!(validate_price(50).unwrap(), PriceTier::Basic);
        assert_eq!(validate_price(200).unwrap(), PriceTier::Premium);
        assert!(validate_price(150).is_err());
        assert!(validate_price(0).is_err());
    }
}
