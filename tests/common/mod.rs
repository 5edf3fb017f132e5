#![allow(dead_code)]

use payout_gateway::config::{GatewayConfig, GatewaySettings, PaymentEndpoint};
use payout_gateway::domain::id::InvoiceCode;
use payout_gateway::domain::money::Amount;
use payout_gateway::domain::payment::PaymentItem;
use payout_gateway::infra::http::{HttpRequest, HttpResponse, MockTransport};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::str::FromStr;

pub const TOKEN: &str = "POST /ipg/Ibb/auth/token";
pub const PAYMENT: &str = "POST /ipg/Ibb/IoService/inBoundTransfer";
pub const WALLET_PAYMENT: &str = "POST /api/3rd/customer/transaction/payonbehalf";

pub fn settlement_key(code: &str) -> String {
    format!("GET /ipg/Ibb/IoService/trxLookUp/{code}")
}

/// Global defaults for one token-auth and one signature-auth endpoint.
pub fn settings() -> GatewaySettings {
    GatewaySettings::from_json_str(
        &json!({
            "ibb": {
                "payment_gateway_connector": "token_auth",
                "gateway_base_url": "https://ibb.test",
                "payment_gateway_basic_auth_username": "merankabandi",
                "payment_gateway_basic_auth_password": "s3cret",
                "partner_name": "MERANKABANDI",
                "partner_pin": "4321",
                "customer_lookup": false
            },
            "lumicash": {
                "payment_gateway_connector": "signature_auth",
                "gateway_base_url": "https://lumicash.test",
                "payment_gateway_api_key": "LUMIKEY",
                "partner_code": "MRKB0001"
            }
        })
        .to_string(),
    )
    .unwrap()
}

pub fn token_config() -> GatewayConfig {
    GatewayConfig::resolve(&PaymentEndpoint::new("ibb"), &settings()).unwrap()
}

/// Token-auth endpoint whose session starts with a basic-auth header.
pub fn token_config_with_basic_auth() -> GatewayConfig {
    let overrides = json!({ "payment_gateway_auth_type": "basic" })
        .as_object()
        .cloned()
        .unwrap();
    GatewayConfig::resolve(
        &PaymentEndpoint::new("ibb").with_overrides(overrides),
        &settings(),
    )
    .unwrap()
}

pub fn signature_config() -> GatewayConfig {
    GatewayConfig::resolve(&PaymentEndpoint::new("lumicash"), &settings()).unwrap()
}

pub fn item(code: &str, amount: &str) -> PaymentItem {
    PaymentItem::new(
        InvoiceCode::new(code).unwrap(),
        Amount::new(Decimal::from_str(amount).unwrap()).unwrap(),
        "+25779555000",
    )
}

pub fn accepted_item(code: &str, amount: &str) -> PaymentItem {
    let mut item = item(code, amount);
    item.record_acceptance(Some(format!("IBB-{code}")), json!({"statusCode": "200"}))
        .unwrap();
    item
}

pub fn token_ok(value: &str) -> Result<HttpResponse, payout_gateway::domain::error::GatewayError> {
    Ok(HttpResponse::json(200, json!({ "token": value })))
}

pub fn payment_ok(transaction_id: &str) -> HttpResponse {
    HttpResponse::json(
        200,
        json!({
            "statusCode": "200",
            "statusDesc": "Transfer successful",
            "ibbTransactionID": transaction_id
        }),
    )
}

pub fn payment_rejected(code: &str, message: &str) -> HttpResponse {
    HttpResponse::json(200, json!({ "statusCode": code, "statusDesc": message }))
}

pub fn session_expired() -> HttpResponse {
    HttpResponse::json(200, json!({ "statusCode": "401", "statusDesc": "Session expired" }))
}

pub fn settled(amount: Value, transaction_id: &str) -> HttpResponse {
    HttpResponse::json(
        200,
        json!({ "status": "200", "amount": amount, "ibbTransactionID": transaction_id }),
    )
}

/// `transactionID` of a token-auth payment request.
pub fn invoice_of(request: &HttpRequest) -> Option<String> {
    request
        .body
        .as_ref()?
        .get("transactionID")?
        .as_str()
        .map(str::to_string)
}

pub fn mock() -> MockTransport {
    MockTransport::new()
}
