use actix_web::{App, HttpServer, middleware::Logger, web};
use chrono::Local; // timestamp in log lines
use env_logger::{Env, Target};
use std::io::Write; // for env_logger custom formatter
use std::sync::Arc;

use subscription_tracker::{
    config::Config,
    database::{create_pool, run_migrations},
    handlers,
    middlewares::create_cors,
    services::{SubscriptionService, SyncService},
    swagger::swagger_config,
    tasks::spawn_monthly_sync,
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // .env 仅用于本地开发，不存在时忽略
    dotenvy::dotenv().ok();

    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format(|buf, record| {
            let ts = Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z");
            let level = record.level().as_str().to_ascii_lowercase();
            let msg_json = serde_json::to_string(&format!("{}", record.args()))
                .unwrap_or_else(|_| "\"<invalid utf8>\"".to_string());
            writeln!(
                buf,
                "{{\"timestamp\":\"{}\",\"level\":\"{}\",\"message\":{},\"target\":\"{}\"}}",
                ts,
                level,
                msg_json,
                record.target(),
            )
        })
        .target(Target::Stdout)
        .init();

    // 加载配置
    let config = Config::from_toml().map_err(|e| {
        log::error!("Failed to load configuration: {e}");
        std::io::Error::other(e.to_string())
    })?;

    // 创建数据库连接池
    let pool = create_pool(&config.database).await.map_err(|e| {
        log::error!("Failed to create database connection pool: {e}");
        std::io::Error::other(e.to_string())
    })?;

    // 运行数据库迁移
    run_migrations(&pool).await.map_err(|e| {
        log::error!("Failed to run database migrations: {e}");
        std::io::Error::other(e.to_string())
    })?;

    let pool = Arc::new(pool);
    let subscription_service = web::Data::new(SubscriptionService::new(pool.clone()));
    let sync_handle = spawn_monthly_sync(SyncService::new(pool.clone()), &config.sync);

    log::info!(
        "Starting HTTP server at {}:{}",
        config.server.host,
        config.server.port
    );

    let cors_config = config.cors.clone();
    let server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(create_cors(&cors_config))
            .app_data(subscription_service.clone())
            .configure(swagger_config)
            .configure(handlers::subscription_config)
    })
    .bind((config.server.host.as_str(), config.server.port))?
    .run();

    let result = server.await;

    sync_handle.shutdown().await;
    match Arc::try_unwrap(pool) {
        Ok(pool) => {
            if let Err(e) = pool.close().await {
                log::warn!("Failed to close database pool: {e}");
            }
        }
        Err(_) => log::warn!("Database pool still shared at shutdown, dropping it"),
    }
    log::info!("Server stopped");
    result
}
