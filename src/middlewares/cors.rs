use actix_cors::Cors;

use crate::config::CorsConfig;

pub fn create_cors(config: &CorsConfig) -> Cors {
    let cors = if config.allowed_origins.is_empty() {
        // 未配置来源时放开所有域名（本地开发）
        Cors::default().allow_any_origin()
    } else {
        config
            .allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
    };

    cors.allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allow_any_header()
        .max_age(3600)
}
