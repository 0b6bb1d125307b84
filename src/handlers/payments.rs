use super::common::{success_response, JsonBody};
use crate::{
    errors::{ErrorResponse, ServiceError},
    services::payments::{PaymentCallback, PaymentInitRequest, PaymentInitResponse},
    AppState,
};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode, Uri},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde_json::value::RawValue;
use std::collections::BTreeMap;
use tracing::debug;

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/init", post(init_payment))
        .route("/callback", get(payment_callback).post(payment_callback))
}

#[utoipa::path(
    post,
    path = "/api/payments/init",
    request_body = PaymentInitRequest,
    responses(
        (status = 200, description = "Signed payment URL", body = PaymentInitResponse),
        (status = 404, description = "Order not found", body = ErrorResponse),
        (status = 409, description = "Order already paid", body = ErrorResponse),
        (status = 500, description = "Gateway not configured", body = ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn init_payment(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<PaymentInitRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let response = state.services.payments.initiate(&payload.order_id).await?;
    Ok(success_response(response))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("application/json"))
}

/// Exact text of a scalar JSON field: strings unescaped, numbers and
/// booleans as written by the sender (`1500.00` stays `1500.00`).
fn json_scalar(raw: &RawValue) -> Option<String> {
    let text = raw.get().trim();
    match text.as_bytes().first()? {
        b'"' => serde_json::from_str::<String>(text).ok(),
        b'{' | b'[' | b'n' => None,
        _ => Some(text.to_string()),
    }
}

/// Collects callback fields from the query string and the body. Body fields
/// win over query fields with the same name.
pub fn callback_params(
    uri: &Uri,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Vec<(String, String)>, ServiceError> {
    let mut params: Vec<(String, String)> = uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    if body.is_empty() {
        return Ok(params);
    }

    if is_json(headers) {
        let fields: BTreeMap<String, Box<RawValue>> = serde_json::from_slice(body)
            .map_err(|e| ServiceError::BadRequest(format!("Invalid JSON body: {e}")))?;
        params.extend(
            fields
                .into_iter()
                .filter_map(|(k, v)| json_scalar(&v).map(|v| (k, v))),
        );
    } else {
        params.extend(url::form_urlencoded::parse(body).into_owned());
    }
    Ok(params)
}

/// Provider result URL. Answers `OK{InvId}` as plain text once the order is
/// marked paid; notifications continue in the background.
#[utoipa::path(
    post,
    path = "/api/payments/callback",
    request_body(content = String, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Acknowledged", body = String, content_type = "text/plain"),
        (status = 400, description = "Missing fields or invalid signature", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse),
        (status = 500, description = "Gateway not configured", body = ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn payment_callback(
    State(state): State<AppState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ServiceError> {
    let params = callback_params(&uri, &headers, &body)?;
    debug!(fields = params.len(), "Payment callback received");
    let callback = PaymentCallback::from_params(params)?;
    let outcome = state.services.payments.handle_callback(callback).await?;

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        outcome.acknowledgement,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_fields_follow_query_fields() {
        let uri: Uri = "/api/payments/callback?OutSum=1.00&InvId=1".parse().unwrap();
        let params = callback_params(&uri, &HeaderMap::new(), b"InvId=2&Shp_OrderId=o%201").unwrap();
        let callback = PaymentCallback::from_params(
            params
                .into_iter()
                .chain([("SignatureValue".to_string(), "x".to_string())]),
        )
        .unwrap();
        assert_eq!(callback.inv_id, "2");
        assert_eq!(callback.order_id(), Some("o 1"));
    }

    #[test]
    fn json_bodies_keep_scalar_fields() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        let uri: Uri = "/api/payments/callback".parse().unwrap();
        let params = callback_params(
            &uri,
            &headers,
            br#"{"OutSum":"10.00","InvId":7,"nested":{"a":1}}"#,
        )
        .unwrap();
        assert!(params.contains(&("InvId".to_string(), "7".to_string())));
        assert!(!params.iter().any(|(k, _)| k == "nested"));
    }

    #[test]
    fn json_numbers_keep_their_exact_text() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        let uri: Uri = "/api/payments/callback".parse().unwrap();
        let params = callback_params(
            &uri,
            &headers,
            br#"{"OutSum": 1500.00, "Shp_Note": "a\"b", "IsTest": null}"#,
        )
        .unwrap();
        assert!(params.contains(&("OutSum".to_string(), "1500.00".to_string())));
        assert!(params.contains(&("Shp_Note".to_string(), "a\"b".to_string())));
        assert!(!params.iter().any(|(k, _)| k == "IsTest"));
    }

    #[test]
    fn broken_json_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        let uri: Uri = "/".parse().unwrap();
        assert!(callback_params(&uri, &headers, b"{").is_err());
    }
}
