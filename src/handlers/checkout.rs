use crate::{
    client::PaymentGateway,
    error::{CheckoutError, ReconcileError},
    models::{
        BeginCheckout, CheckoutOrder, CheckoutStarted, CreateOrderRequest, NewTransaction,
        PollResult, QrCodePage, TradeType,
    },
    routes::QRCODE_PATH,
    services::{make_qrcode, sessions, Reconciler, SessionStore, TransactionStore},
};
use axum::{
    body::Bytes,
    extract::{Form, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use chrono::{Duration as ChronoDuration, FixedOffset, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Acknowledgment WeChat Pay expects after a notification is handled.
pub const NOTIFY_ACK: &[u8] =
    b"<xml><return_code><![CDATA[SUCCESS]]></return_code><return_msg><![CDATA[OK]]></return_msg></xml>";

/// WeChat Pay interprets order times in China Standard Time.
const SHANGHAI_OFFSET_SECS: i32 = 8 * 3600;

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub notify_url: String,
    pub process_page_url: String,
    /// How long a QR order stays payable; also the session lifetime.
    pub order_lifetime: Duration,
}

#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<dyn PaymentGateway>,
    pub store: Arc<dyn TransactionStore>,
    pub reconciler: Arc<Reconciler>,
    pub sessions: Arc<SessionStore>,
    pub settings: Arc<CheckoutSettings>,
}

impl AppState {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        store: Arc<dyn TransactionStore>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            reconciler: Arc::new(Reconciler::new(gateway.clone(), store.clone())),
            sessions: Arc::new(SessionStore::new(settings.order_lifetime)),
            gateway,
            store,
            settings: Arc::new(settings),
        }
    }
}

/// Platform hand-off: records the draft transaction and opens a session.
pub async fn begin_checkout(
    State(state): State<AppState>,
    Json(request): Json<BeginCheckout>,
) -> Result<Response, CheckoutError> {
    let reference = request.reference.trim().to_string();
    if reference.is_empty() {
        return Err(CheckoutError::InvalidRequest("reference is empty".to_string()));
    }
    let order = CheckoutOrder {
        reference: reference.clone(),
        amount_total: request.amount,
    };
    match order.total_fee() {
        Some(fee) if fee > 0 => {}
        _ => {
            return Err(CheckoutError::InvalidRequest(format!(
                "amount must be a positive number of fen, got {}",
                request.amount
            )))
        }
    }

    let inserted = state
        .store
        .insert_new(NewTransaction::draft(reference.clone(), request.amount))
        .await?;
    if inserted.is_none() {
        return Err(CheckoutError::InvalidRequest(format!(
            "reference {} already exists",
            reference
        )));
    }
    let session_id = state.sessions.begin(order).await;

    tracing::info!(reference = %reference, amount = %request.amount, "Checkout started");

    let cookie = sessions::session_cookie(&session_id, state.settings.order_lifetime);
    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(CheckoutStarted {
            reference,
            action_url: QRCODE_PATH.to_string(),
        }),
    )
        .into_response())
}

/// Places the remote order and renders its QR code.
pub async fn qrcode_page(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<QrCodePage>, CheckoutError> {
    let order = state
        .sessions
        .order_for(&headers)
        .await
        .ok_or(CheckoutError::NoActiveOrder)?;

    let total_fee = order.total_fee().ok_or_else(|| {
        CheckoutError::InvalidRequest(format!("amount {} cannot be billed", order.amount_total))
    })?;
    let tz = FixedOffset::east_opt(SHANGHAI_OFFSET_SECS)
        .ok_or_else(|| CheckoutError::InternalError("invalid gateway timezone".to_string()))?;
    let time_start = Utc::now().with_timezone(&tz);
    let lifetime = ChronoDuration::from_std(state.settings.order_lifetime)
        .map_err(|e| CheckoutError::ConfigError(e.to_string()))?;

    let request = CreateOrderRequest {
        trade_type: TradeType::Native,
        body: order.reference.clone(),
        time_start,
        time_expire: time_start + lifetime,
        out_trade_no: order.reference.clone(),
        total_fee,
        notify_url: state.settings.notify_url.clone(),
    };

    let page = match state.gateway.create_order(&request).await {
        Ok(created) => match make_qrcode(&created.code_url) {
            Ok(qrcode) => QrCodePage::Ready {
                qrcode,
                order: order.reference,
                amount: order.amount_total,
            },
            Err(e) => {
                tracing::error!(reference = %order.reference, error = %e, "QR code rendering failed");
                QrCodePage::Failed {
                    error: e.to_string(),
                }
            }
        },
        Err(e) => {
            tracing::error!(reference = %order.reference, error = %e, "WeChat Pay order creation failed");
            QrCodePage::Failed {
                error: e.to_string(),
            }
        }
    };

    Ok(Json(page))
}

/// Polled by the QR page until the payment is confirmed.
pub async fn poll_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PollResult>, CheckoutError> {
    let order = state
        .sessions
        .order_for(&headers)
        .await
        .ok_or(CheckoutError::NoActiveOrder)?;

    let confirmed = match state.reconciler.reconcile_by_query(&order.reference).await {
        Ok(outcome) => {
            tracing::debug!(reference = %order.reference, outcome = ?outcome, "Payment polled");
            outcome.is_confirmed()
        }
        Err(ReconcileError::Validation(msg)) => return Err(CheckoutError::Validation(msg)),
        Err(e) => {
            tracing::warn!(reference = %order.reference, error = %e, "Payment poll failed");
            false
        }
    };

    Ok(Json(PollResult::new(confirmed, order.reference)))
}

/// Browser return from the payment page. Always ends on the processing page.
pub async fn payment_return(
    State(state): State<AppState>,
    form: Option<Form<HashMap<String, String>>>,
) -> Redirect {
    tracing::info!("Validating WeChat Pay return");

    let form = form.map(|Form(form)| form).unwrap_or_default();
    match state.reconciler.validate_return(&form).await {
        Ok(outcome) => tracing::info!(outcome = ?outcome, "WeChat Pay return validated"),
        Err(e) => tracing::error!(error = %e, "WeChat Pay return validation failed"),
    }

    Redirect::to(&state.settings.process_page_url)
}

/// Asynchronous notification from WeChat Pay. An empty body makes the
/// gateway deliver the notification again later.
pub async fn payment_notify(State(state): State<AppState>, body: Bytes) -> Response {
    tracing::debug!(payload = %String::from_utf8_lossy(&body), "WeChat Pay notification");

    match state.reconciler.reconcile_by_push(&body).await {
        Ok(outcome) if outcome.is_confirmed() => {
            tracing::debug!("Acknowledging WeChat Pay notification");
            ([(header::CONTENT_TYPE, "text/xml")], NOTIFY_ACK).into_response()
        }
        Ok(outcome) => {
            tracing::info!(outcome = ?outcome, "WeChat Pay notification not acknowledged");
            ().into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "WeChat Pay notification rejected");
            ().into_response()
        }
    }
}
