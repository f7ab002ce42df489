use crate::market::{Market, MarketId};
use crate::queue::Admission;
use crate::webhook::signature::{self, SIGNATURE_HEADER};
use crate::webhook::types::{
    AckResponse, ChangeEvent, ChangeOp, HealthResponse, WebhookError,
};
use crate::webhook::WebhookState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use std::str::FromStr;
use tracing::{debug, info, warn};

const MARKET_ENTITY: &str = "Market";

/// What the ingress did with one change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Ignored(&'static str),
    NotEligible,
    Enqueued(Admission),
}

/// POST /webhook/market
pub async fn market_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AckResponse>, WebhookError> {
    if let Some(secret) = state.secret.as_deref() {
        let provided = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok());
        if let Err(e) = signature::verify(secret, &body, provided) {
            warn!(has_signature = provided.is_some(), "rejected webhook with bad signature");
            return Err(e);
        }
    }

    let event: ChangeEvent = serde_json::from_slice(&body)
        .map_err(|e| WebhookError::Processing(format!("invalid change event: {}", e)))?;

    debug!(
        webhook_id = event.webhook_id.as_deref().unwrap_or("-"),
        webhook_name = event.webhook_name.as_deref().unwrap_or("-"),
        op = %event.op,
        entity = %event.entity,
        "webhook received"
    );

    match handle_event(&state, event)? {
        Disposition::Ignored(reason) => debug!(reason, "change event ignored"),
        Disposition::NotEligible => debug!("market not eligible for resolution"),
        Disposition::Enqueued(admission) => debug!(?admission, "market handed to queue"),
    }

    Ok(Json(AckResponse::ok()))
}

pub(crate) fn handle_event(
    state: &WebhookState,
    event: ChangeEvent,
) -> Result<Disposition, WebhookError> {
    if event.entity != MARKET_ENTITY {
        return Ok(Disposition::Ignored("not a market entity"));
    }
    match ChangeOp::parse(&event.op) {
        Some(ChangeOp::Insert) | Some(ChangeOp::Update) => {}
        _ => return Ok(Disposition::Ignored("operation not insert or update")),
    }
    let Some(row) = event.data.new else {
        return Ok(Disposition::Ignored("no new row"));
    };

    // Upstream already accepted the event; a bad row is its problem, not a retry.
    let market: Market = match serde_json::from_value(row) {
        Ok(market) => market,
        Err(e) => {
            warn!(error = %e, "could not decode market row");
            return Ok(Disposition::Ignored("undecodable market row"));
        }
    };

    if !market.is_eligible(state.clock.now()) {
        return Ok(Disposition::NotEligible);
    }

    let admission = state
        .queue
        .submit(market.id)
        .map_err(|e| WebhookError::Processing(e.to_string()))?;
    info!(market = %market.id, ?admission, "eligible market received");
    Ok(Disposition::Enqueued(admission))
}

/// POST /resolve/:market_id
pub async fn manual_resolve(
    State(state): State<WebhookState>,
    Path(market_id): Path<String>,
) -> Result<Json<AckResponse>, WebhookError> {
    let market = MarketId::from_str(market_id.trim())
        .map_err(|_| WebhookError::InvalidMarketId(market_id.clone()))?;

    let admission = state
        .queue
        .submit(market)
        .map_err(|e| WebhookError::Processing(e.to_string()))?;
    info!(market = %market, ?admission, "manual resolution requested");

    Ok(Json(AckResponse::with_message("Resolution queued")))
}

/// GET /health
pub async fn health(State(state): State<WebhookState>) -> Json<HealthResponse> {
    let stats = state.queue.stats();
    Json(HealthResponse {
        status: "healthy",
        timestamp: chrono::Utc::now().to_rfc3339(),
        queue_size: stats.size,
        queue_pending: stats.pending,
    })
}
