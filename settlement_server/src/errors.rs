use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use log::error;
use settlement_engine::SettlementError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("No caller identity was supplied. Requests must carry the x-actor-id header.")]
    MissingIdentity,
    #[error("Invalid request header. {0}")]
    InvalidRequestHeader(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Insufficient Permissions. {0}")]
    InsufficientPermissions(String),
    #[error("{0}")]
    Settlement(#[from] SettlementError),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MissingIdentity => StatusCode::UNAUTHORIZED,
            Self::InvalidRequestHeader(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientPermissions(_) => StatusCode::FORBIDDEN,
            Self::Settlement(e) => settlement_status(e),
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            error!("💻️ Request failed with {status}. {self}");
        }
        HttpResponse::build(status)
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

/// Transient failures are reported as 503 so that the gateway, or the client, tries again.
fn settlement_status(e: &SettlementError) -> StatusCode {
    match e {
        SettlementError::NotFound(_) => StatusCode::NOT_FOUND,
        SettlementError::InvalidTransition { .. } => StatusCode::CONFLICT,
        SettlementError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        SettlementError::AmountMismatch(_) => StatusCode::BAD_REQUEST,
        SettlementError::StaleOrder { .. } => StatusCode::CONFLICT,
        SettlementError::ValidationError(_) => StatusCode::BAD_REQUEST,
        SettlementError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        SettlementError::BelowMinimum { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        SettlementError::GatewayUnavailable(_) |
        SettlementError::StorageConflict(_) |
        SettlementError::Storage(_) |
        SettlementError::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use settlement_engine::db_types::OrderStatusType;

    use super::*;

    #[test]
    fn settlement_errors_map_to_status_codes() {
        let status = |e: SettlementError| ServerError::from(e).status_code();
        assert_eq!(status(SettlementError::NotFound("Order 1".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(SettlementError::invalid_order_transition(OrderStatusType::Pending, OrderStatusType::Shipped)),
            StatusCode::CONFLICT
        );
        assert_eq!(status(SettlementError::StorageConflict("busy".into())), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status(SettlementError::Timeout(Duration::from_secs(5))), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ServerError::Unspecified("boom".into()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            status(SettlementError::InsufficientBalance { requested: "80.00 EUR".into(), available: "50.00 EUR".into() }),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn error_body_is_json() {
        let err = ServerError::from(SettlementError::PermissionDenied("Only the seller can mark this order as shipped".into()));
        let res = err.error_response();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(res.headers().get("content-type").unwrap(), "application/json");
    }
}
