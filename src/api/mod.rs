//! API endpoints for the traffic monitor.
//!
//! Thin HTTP layer over [`TrafficAnalyzer`]: dashboard data, monitoring
//! control, IP risk lookup and manual block management. Request input is
//! validated here and never reaches the core when malformed.

use std::net::IpAddr;
use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder, ResponseError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{BlockOutcome, TrafficAnalyzer, UnblockOutcome};

pub struct ApiState {
    pub analyzer: Arc<TrafficAnalyzer>,
}

/// Errors returned for malformed requests
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("IP address is required")]
    MissingIp,
    #[error("Invalid IP address: {0}")]
    InvalidIp(String),
    #[error("Invalid action. Use 'start' or 'stop'.")]
    InvalidAction,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            success: false,
            error: self.to_string(),
        })
    }
}

/// API configuration function for Actix-web
pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/v1/health").route(web::get().to(health_check)))
        .service(
            web::scope("/api")
                .route("/analyze_traffic", web::get().to(analyze_traffic))
                .route("/monitoring/status", web::get().to(monitoring_status))
                .route("/monitoring/control", web::post().to(control_monitoring))
                .route("/ip_risk", web::post().to(ip_risk))
                .route("/block_ip", web::post().to(block_ip))
                .route("/unblock_ip", web::post().to(unblock_ip))
                .route("/blocked_list", web::get().to(blocked_list)),
        );
}

/// Health check endpoint response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
}

/// Outcome of a control or block request
#[derive(Debug, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MonitoringStatusResponse {
    pub status: bool,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ControlRequest {
    pub action: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IpRequest {
    pub ip: Option<String>,
    pub reason: Option<String>,
}

fn validate_ip(ip: Option<&str>) -> Result<String, ApiError> {
    let ip = ip.map(str::trim).filter(|ip| !ip.is_empty()).ok_or(ApiError::MissingIp)?;
    ip.parse::<IpAddr>()
        .map(|addr| addr.to_string())
        .map_err(|_| ApiError::InvalidIp(ip.to_string()))
}

/// Health check endpoint
async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn analyze_traffic(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(state.analyzer.traffic_report().await)
}

async fn monitoring_status(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(MonitoringStatusResponse {
        status: state.analyzer.is_monitoring(),
    })
}

async fn control_monitoring(
    state: web::Data<ApiState>,
    req: web::Json<ControlRequest>,
) -> Result<HttpResponse, ApiError> {
    let message = match req.action.as_deref() {
        Some("start") => {
            state.analyzer.set_monitoring(true);
            "Monitoring Started."
        }
        Some("stop") => {
            state.analyzer.set_monitoring(false);
            "Monitoring Stopped. Live analysis paused."
        }
        _ => return Err(ApiError::InvalidAction),
    };

    Ok(HttpResponse::Ok().json(ActionResponse {
        success: true,
        message: message.to_string(),
    }))
}

async fn ip_risk(state: web::Data<ApiState>, req: web::Json<IpRequest>) -> Result<HttpResponse, ApiError> {
    let ip = validate_ip(req.ip.as_deref())?;
    Ok(HttpResponse::Ok().json(state.analyzer.ip_risk(&ip).await))
}

async fn block_ip(state: web::Data<ApiState>, req: web::Json<IpRequest>) -> Result<HttpResponse, ApiError> {
    let ip = validate_ip(req.ip.as_deref())?;
    let reason = req.reason.as_deref().unwrap_or("Manual Block by Admin");

    let response = match state.analyzer.block(&ip, reason).await {
        BlockOutcome::Blocked => ActionResponse {
            success: true,
            message: format!("IP {} blocked successfully.", ip),
        },
        BlockOutcome::AlreadyBlocked => ActionResponse {
            success: false,
            message: format!("IP {} is already blocked.", ip),
        },
    };
    Ok(HttpResponse::Ok().json(response))
}

async fn unblock_ip(state: web::Data<ApiState>, req: web::Json<IpRequest>) -> Result<HttpResponse, ApiError> {
    let ip = validate_ip(req.ip.as_deref())?;

    let response = match state.analyzer.unblock(&ip).await {
        UnblockOutcome::Unblocked => ActionResponse {
            success: true,
            message: format!("IP {} unblocked successfully.", ip),
        },
        UnblockOutcome::NotBlocked => ActionResponse {
            success: false,
            message: format!("IP {} is not currently blocked.", ip),
        },
    };
    Ok(HttpResponse::Ok().json(response))
}

async fn blocked_list(state: web::Data<ApiState>) -> impl Responder {
    HttpResponse::Ok().json(state.analyzer.list_blocked().await)
}
