use actix_web::dev::Server;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use kameo::actor::ActorRef;
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

use crate::actors::{GetSystemHealth, HealthMonitorActor, HealthStatus};
use crate::application::{OrdersService, ServiceError, StoreError};
use crate::domain::order::Order;
use crate::metrics::Metrics;

// ============================================================================
// HTTP Request Layer
// ============================================================================
//
//   GET  /orders/{order_uid}  - lookup (200 / 400 / 404 / 500)
//   POST /orders              - save (201 / 400 / 409 / 500)
//   GET  /metrics             - Prometheus text exposition
//   GET  /health              - aggregated component health (503 if unhealthy)
//
// ============================================================================

pub struct AppState {
    pub orders: Arc<OrdersService>,
    pub metrics: Arc<Metrics>,
    pub health_monitor: Option<ActorRef<HealthMonitorActor>>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/orders/{order_uid}", web::get().to(get_order_handler))
        .route("/orders", web::post().to(save_order_handler))
        .route("/metrics", web::get().to(metrics_handler))
        .route("/health", web::get().to(health_handler));
}

/// Bind the HTTP server. The returned `Server` must be polled (spawned) to run.
pub fn start_http_server(state: web::Data<AppState>, port: u16) -> std::io::Result<Server> {
    tracing::info!("🌐 Starting HTTP server on http://0.0.0.0:{}", port);

    let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
        .bind(("0.0.0.0", port))?
        .disable_signals()
        .run();

    Ok(server)
}

fn error_body(message: impl std::fmt::Display) -> serde_json::Value {
    serde_json::json!({ "error": message.to_string() })
}

fn service_error_response(err: &ServiceError) -> HttpResponse {
    match err {
        ServiceError::Validation(e) => HttpResponse::BadRequest().json(error_body(e)),
        ServiceError::Store(StoreError::DuplicateOrder(_)) => HttpResponse::Conflict().json(error_body(err)),
        ServiceError::Store(_) | ServiceError::Cache(_) => {
            tracing::error!(error = %err, "Request failed");
            HttpResponse::InternalServerError().json(error_body("internal error"))
        }
    }
}

async fn get_order_handler(path: web::Path<String>, state: web::Data<AppState>) -> impl Responder {
    let order_uid = path.into_inner();

    match state.orders.get_order(&order_uid).await {
        Ok(Some(order)) => HttpResponse::Ok().json(order),
        Ok(None) => HttpResponse::NotFound().json(error_body(format!("order {order_uid} not found"))),
        Err(e) => service_error_response(&e),
    }
}

async fn save_order_handler(order: web::Json<Order>, state: web::Data<AppState>) -> impl Responder {
    let order = order.into_inner();

    match state.orders.save_order(&order).await {
        Ok(()) => HttpResponse::Created().json(serde_json::json!({ "order_uid": order.order_uid })),
        Err(e) => service_error_response(&e),
    }
}

async fn metrics_handler(state: web::Data<AppState>) -> impl Responder {
    let encoder = TextEncoder::new();
    let metric_families = state.metrics.registry().gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return HttpResponse::InternalServerError().finish();
    }

    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(buffer)
}

async fn health_handler(state: web::Data<AppState>) -> impl Responder {
    let Some(ref health_monitor) = state.health_monitor else {
        return HttpResponse::Ok().json(serde_json::json!({ "overall_status": HealthStatus::Healthy }));
    };

    match health_monitor.ask(GetSystemHealth).await {
        Ok(health) if health.overall_status.is_unhealthy() => HttpResponse::ServiceUnavailable().json(health),
        Ok(health) => HttpResponse::Ok().json(health),
        Err(e) => {
            tracing::error!(error = ?e, "Failed to get system health");
            HttpResponse::ServiceUnavailable().json(error_body("health monitor unavailable"))
        }
    }
}
