//! Server mode
//!
//! This module contains the HTTP server startup logic.
//! It configures and starts the HTTP server with all necessary routes.

use actix_cors::Cors;
use actix_web::{
    App, HttpServer,
    middleware::{Compress, DefaultHeaders},
    web,
};
use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

use crate::api::middleware::{AdminGate, CsrfGuard, RequestIdMiddleware, RequireAuth};
use crate::api::services::{
    AppStartTime, account_routes, admin_routes, auth, auth_routes, billing_public_routes,
    billing_routes, dashboard_routes, health_routes, image_routes, qr_public_routes, qr_routes,
    redirect_routes,
};
use crate::config::CorsConfig;
use crate::runtime::lifetime;
use crate::services::GeoIpProvider;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub server_host: String,
    pub server_port: u16,
    #[cfg(unix)]
    pub unix_socket_path: Option<String>,
}

/// Validate CORS configuration at startup (runs once)
fn validate_cors_config(cors_config: &CorsConfig) -> Result<()> {
    let is_any_origin = cors_config.allowed_origins.iter().any(|o| o == "*");
    if is_any_origin && cors_config.allow_credentials {
        // actix-cors 会把 * 回显成具体 Origin，浏览器照单全收，
        // 等于任何网站都能带 cookie 跨域调用 API
        anyhow::bail!(
            "CORS misconfiguration: wildcard origin together with allow_credentials \
             lets any website make authenticated cross-origin requests. \
             List origins explicitly or disable credentials."
        );
    }

    if cors_config.allowed_origins.is_empty() {
        warn!(
            "CORS allowed_origins is empty, cross-origin requests will be rejected. \
            Set cors.allowed_origins if a browser frontend lives on another origin."
        );
    }

    Ok(())
}

/// Build CORS middleware from configuration
fn build_cors_middleware(cors_config: &CorsConfig) -> Cors {
    let mut cors = Cors::default();

    let is_any_origin = cors_config.allowed_origins.iter().any(|o| o == "*");
    if is_any_origin {
        cors = cors.allow_any_origin();
    } else {
        for origin in &cors_config.allowed_origins {
            cors = cors.allowed_origin(origin);
        }
    }

    let methods: Vec<actix_web::http::Method> = cors_config
        .allowed_methods
        .iter()
        .filter_map(|m| m.to_string().parse().ok())
        .collect();
    if !methods.is_empty() {
        cors = cors.allowed_methods(methods);
    }

    for header in ["Content-Type", "Authorization", "Accept", "X-CSRF-Token"] {
        cors = cors.allowed_header(header);
    }

    cors = cors.max_age(3600);

    if cors_config.allow_credentials && !is_any_origin {
        cors = cors.supports_credentials();
    }

    cors
}

/// Run the HTTP server
///
/// This function:
/// 1. Records startup time
/// 2. Prepares server components (cache, storage, background tasks)
/// 3. Configures and starts the HTTP server
/// 4. Listens for graceful shutdown signals
///
/// **Note**: Logging system must be initialized before calling this function
pub async fn run_server() -> Result<()> {
    // Record application start time
    let app_start_time = AppStartTime {
        start_datetime: chrono::Utc::now(),
    };

    // Prepare server startup (cache, storage, flush tasks)
    let startup = lifetime::startup::prepare_server_startup()
        .await
        .map_err(|e| {
            tracing::error!("Server startup failed: {}", e);
            e
        })?;

    let cache = startup.cache.clone();
    let storage = startup.storage.clone();

    let config = crate::config::get_config();

    // Load server configuration
    let server_config = ServerConfig {
        server_host: config.server.host.clone(),
        server_port: config.server.port,
        #[cfg(unix)]
        unix_socket_path: config.server.unix_socket.clone(),
    };

    let cpu_count = config.server.cpu_count.min(32);
    warn!("Using {} CPU cores for the server", cpu_count);

    // GeoIP provider 只在启用时注册为 app_data，redirect 端用 Option 提取
    let geoip_provider = if config.analytics.enable_geoip {
        Some(Arc::new(GeoIpProvider::new(&config.analytics)))
    } else {
        None
    };
    if let Some(ref provider) = geoip_provider {
        warn!("GeoIP lookup enabled (provider: {})", provider.provider_name());
    }

    let cors_config = config.cors.clone();
    validate_cors_config(&cors_config)?;

    // Unix socket 模式下 peer_addr 失效，限流依赖代理写 X-Forwarded-For
    #[cfg(unix)]
    if let Some(ref socket_path) = config.server.unix_socket {
        warn!(
            "Unix Socket mode enabled: {}. \
             Rate limiting requires the reverse proxy to set X-Forwarded-For.",
            socket_path
        );
    }

    if config.auth.trusted_proxies.is_empty() {
        warn!(
            "Rate limiting: Auto-detect mode enabled. \
             Connections from private IPs will use X-Forwarded-For. \
             To disable, configure auth.trusted_proxies explicitly."
        );
    } else {
        warn!(
            "Rate limiting: Explicit trusted proxies configured: {:?}",
            config.auth.trusted_proxies
        );
    }

    // Clone db reference before storage moves into HttpServer closure
    let db_for_shutdown = storage.get_db().clone();

    // Configure HTTP server
    let server = HttpServer::new(move || {
        // Build CORS middleware
        let cors = build_cors_middleware(&cors_config);

        let mut app = App::new()
            .wrap(RequestIdMiddleware) // 最外层，为每个请求生成 request_id
            .wrap(cors)
            .wrap(Compress::default())
            .wrap(
                DefaultHeaders::new()
                    .add(("Connection", "keep-alive"))
                    .add(("Keep-Alive", "timeout=30, max=1000"))
                    .add(("Cache-Control", "no-cache, no-store, must-revalidate")),
            )
            .app_data(web::Data::new(cache.clone()))
            .app_data(web::Data::new(storage.clone()))
            .app_data(web::Data::new(app_start_time.clone()))
            .app_data(web::PayloadConfig::new(1024 * 1024));

        if let Some(ref provider) = geoip_provider {
            app = app.app_data(web::Data::new(provider.clone()));
        }

        app
            // 公开端点：精确 resource 必须排在同前缀的认证 scope 之前
            .service(health_routes())
            .service(image_routes())
            .service(qr_public_routes())
            .service(billing_public_routes())
            .service(
                web::resource("/api/auth/verify")
                    .wrap(RequireAuth)
                    .route(web::get().to(auth::verify)),
            )
            .service(auth_routes())
            // 认证端点：RequireAuth 在外，CsrfGuard 在内
            .service(qr_routes().wrap(CsrfGuard).wrap(RequireAuth))
            .service(account_routes().wrap(CsrfGuard).wrap(RequireAuth))
            .service(billing_routes().wrap(CsrfGuard).wrap(RequireAuth))
            .service(dashboard_routes().wrap(CsrfGuard).wrap(RequireAuth))
            .service(
                admin_routes()
                    .wrap(AdminGate)
                    .wrap(CsrfGuard)
                    .wrap(RequireAuth),
            )
            // 重定向热路径放最后，避免吞掉 /api 前缀
            .service(redirect_routes())
    })
    .keep_alive(std::time::Duration::from_secs(30))
    .client_request_timeout(std::time::Duration::from_millis(5000))
    .client_disconnect_timeout(std::time::Duration::from_millis(1000))
    .workers(cpu_count);

    // Bind to Unix socket or TCP address
    let server = {
        #[cfg(unix)]
        {
            if let Some(ref socket_path) = server_config.unix_socket_path {
                warn!("Starting server on Unix socket: {}", socket_path);
                if std::path::Path::new(socket_path).exists() {
                    std::fs::remove_file(socket_path)?;
                }
                server.bind_uds(socket_path)?
            } else {
                let bind_address = format!(
                    "{}:{}",
                    server_config.server_host, server_config.server_port
                );
                warn!("Starting server at http://{}", bind_address);
                server.bind(bind_address)?
            }
        }

        #[cfg(not(unix))]
        {
            let bind_address = format!(
                "{}:{}",
                server_config.server_host, server_config.server_port
            );
            warn!("Starting server at http://{}", bind_address);
            server.bind(bind_address)?
        }
    }
    .run();

    // Wait for server or shutdown signal
    tokio::select! {
        res = server => {
            res?;
        }
        _ = lifetime::shutdown::listen_for_shutdown(&db_for_shutdown) => {
            warn!("Graceful shutdown: all tasks completed");
        }
    }

    Ok(())
}
