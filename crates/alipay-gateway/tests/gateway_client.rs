//! Integration tests for GatewayClient.
//!
//! Uses wiremock as the gateway. Responses are signed with the fixture
//! gateway key. Tests cover plain-key and certificate mode, certificate
//! download, encrypted payloads, error_response mapping, status mapping
//! (429/5xx), retry behavior and notification handling.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use alipay_gateway::{
    notification_sign_content, parse_notification_body, parse_private_key, parse_public_key, sign,
    verify, ContentCipher, GatewayClient, GatewayConfig, GatewayError, HttpTransport,
    NotificationKind, RequestOptions, SignType, TradeCloseRequest, TradeQueryRequest,
    TradeRefundRequest,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use wiremock::matchers::{body_string_contains, header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const APP_KEY: &str = include_str!("fixtures/app.key");
const APP_PUBLIC: &str = include_str!("fixtures/app_public.pem");
const APP_CERT: &str = include_str!("fixtures/app_cert.pem");
const GATEWAY_KEY: &str = include_str!("fixtures/gateway.key");
const GATEWAY_PUBLIC: &str = include_str!("fixtures/gateway_public.pem");
const GATEWAY_CERT: &str = include_str!("fixtures/gateway_cert.pem");
const GATEWAY_CERT_ROTATED: &str = include_str!("fixtures/gateway_cert_rotated.pem");
const ROOT_BUNDLE: &str = include_str!("fixtures/root_bundle.pem");

const GATEWAY_SN: &str = "22f2e5859dcdae94ce34b64a7eec170c";
const ROTATED_SN: &str = "00ae0501de5c756d02e2f089c8c87d02";
const AES_KEY: &str = "3fj+6fTqw4xNl1Bvf91vAg==";

const QUERY_NODE: &str = r#"{"code":"10000","msg":"Success","trade_no":"2013112011001004330000121536","out_trade_no":"6823789339978248","buyer_logon_id":"159****5620","trade_status":"TRADE_SUCCESS","total_amount":"88.88","fund_bill_list":[{"fund_channel":"ALIPAYACCOUNT","amount":"88.88"}]}"#;

fn gateway_sign(content: &str) -> String {
    let key = parse_private_key(GATEWAY_KEY).unwrap();
    sign(content, Some(&key), SignType::Rsa2).unwrap()
}

fn signed_body(method: &str, node: &str, cert_sn: Option<&str>) -> String {
    let name = format!("{}_response", method.replace('.', "_"));
    let signature = gateway_sign(node);
    match cert_sn {
        Some(sn) => format!(
            r#"{{"{}":{},"alipay_cert_sn":"{}","sign":"{}"}}"#,
            name, node, sn, signature
        ),
        None => format!(r#"{{"{}":{},"sign":"{}"}}"#, name, node, signature),
    }
}

fn plain_config(mock_server: &MockServer) -> GatewayConfig {
    GatewayConfig::new("2014072300007148")
        .with_gateway_url(format!("{}/gateway.do", mock_server.uri()))
        .with_app_private_key(APP_KEY)
        .with_alipay_public_key(GATEWAY_PUBLIC)
}

fn cert_config(mock_server: &MockServer) -> GatewayConfig {
    GatewayConfig::new("2014072300007148")
        .with_gateway_url(format!("{}/gateway.do", mock_server.uri()))
        .with_app_private_key(APP_KEY)
        .with_app_public_cert(APP_CERT)
        .with_alipay_public_cert(GATEWAY_CERT)
        .with_alipay_root_cert(ROOT_BUNDLE)
}

/// The blocking client must not run on the async test runtime.
async fn blocking<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    tokio::task::spawn_blocking(f)
        .await
        .expect("blocking task panicked")
}

fn download_body(pem: &str, cert_sn: Option<&str>) -> String {
    let node = format!(
        r#"{{"code":"10000","msg":"Success","alipay_cert_content":"{}"}}"#,
        BASE64.encode(pem)
    );
    signed_body("alipay.open.app.alipaycert.download", &node, cert_sn)
}

// ==================== Plain-key mode ====================

#[tokio::test]
async fn test_trade_query_plain_mode() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(header(
            "content-type",
            "application/x-www-form-urlencoded;charset=utf-8",
        ))
        .and(body_string_contains("method=alipay.trade.query"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(signed_body("alipay.trade.query", QUERY_NODE, None)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = plain_config(&mock_server);
    let response = blocking(move || {
        let client = GatewayClient::new(config).expect("failed to create client");
        client.execute(
            &TradeQueryRequest::by_out_trade_no("6823789339978248"),
            &RequestOptions::new(),
        )
    })
    .await
    .expect("query failed");

    assert!(response.common.is_success());
    assert_eq!(response.trade_status, "TRADE_SUCCESS");
    assert_eq!(response.total_amount, "88.88");
    assert_eq!(response.fund_bill_list.len(), 1);
    assert_eq!(response.fund_bill_list[0].fund_channel, "ALIPAYACCOUNT");

    // The request arrived signed with the application key.
    let requests = mock_server.received_requests().await.unwrap();
    let fields = parse_notification_body(&String::from_utf8_lossy(&requests[0].body));
    assert_eq!(fields["app_id"], "2014072300007148");
    assert_eq!(fields["biz_content"], r#"{"out_trade_no":"6823789339978248"}"#);
    let content = alipay_gateway::canonicalize(fields.iter().filter(|(k, _)| *k != "sign"));
    let app_public = parse_public_key(APP_PUBLIC).unwrap();
    verify(&content, Some(&app_public), &fields["sign"], SignType::Rsa2).unwrap();
}

#[tokio::test]
async fn test_business_failure_is_returned_as_payload() {
    let mock_server = MockServer::start().await;

    let node = r#"{"code":"40004","msg":"Business Failed","sub_code":"ACQ.TRADE_HAS_FINISHED","sub_msg":"trade finished","out_trade_no":"6823789339978248"}"#;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(signed_body("alipay.trade.refund", node, None)),
        )
        .mount(&mock_server)
        .await;

    let config = plain_config(&mock_server);
    let response = blocking(move || {
        let client = GatewayClient::new(config).unwrap();
        let request = TradeRefundRequest {
            out_trade_no: Some("6823789339978248".to_string()),
            refund_amount: "88.88".to_string(),
            ..TradeRefundRequest::default()
        };
        client.execute(&request, &RequestOptions::new())
    })
    .await
    .expect("verified response expected");

    assert!(!response.common.is_success());
    assert_eq!(response.common.sub_code, "ACQ.TRADE_HAS_FINISHED");
}

#[tokio::test]
async fn test_error_response_maps_to_gateway_error() {
    let mock_server = MockServer::start().await;

    let node = r#"{"code":"40002","msg":"Invalid Arguments","sub_code":"isv.invalid-app-id","sub_msg":"invalid app_id"}"#;
    let body = format!(
        r#"{{"error_response":{},"sign":"{}"}}"#,
        node,
        gateway_sign(node)
    );
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&mock_server)
        .await;

    let config = plain_config(&mock_server);
    let result = blocking(move || {
        let client = GatewayClient::new(config).unwrap();
        client.execute(
            &TradeCloseRequest {
                trade_no: Some("2013112011001004330000121536".to_string()),
                ..TradeCloseRequest::default()
            },
            &RequestOptions::new(),
        )
    })
    .await;

    match result {
        Err(GatewayError::Gateway {
            code,
            sub_code,
            sub_msg,
            ..
        }) => {
            assert_eq!(code, "40002");
            assert_eq!(sub_code, "isv.invalid-app-id");
            assert_eq!(sub_msg, "invalid app_id");
        }
        other => panic!("expected Gateway error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_tampered_response_rejected() {
    let mock_server = MockServer::start().await;

    let signature = gateway_sign(QUERY_NODE);
    let tampered = QUERY_NODE.replace("88.88", "0.01");
    let body = format!(
        r#"{{"alipay_trade_query_response":{},"sign":"{}"}}"#,
        tampered, signature
    );
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&mock_server)
        .await;

    let config = plain_config(&mock_server);
    let result = blocking(move || {
        let client = GatewayClient::new(config).unwrap();
        client.execute(&TradeQueryRequest::by_trade_no("1"), &RequestOptions::new())
    })
    .await;

    assert!(matches!(result, Err(GatewayError::SignatureInvalid { .. })));
}

#[tokio::test]
async fn test_unsigned_response_rejected() {
    let mock_server = MockServer::start().await;

    let body = format!(r#"{{"alipay_trade_query_response":{}}}"#, QUERY_NODE);
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&mock_server)
        .await;

    let config = plain_config(&mock_server);
    let result = blocking(move || {
        let client = GatewayClient::new(config).unwrap();
        client.execute(&TradeQueryRequest::by_trade_no("1"), &RequestOptions::new())
    })
    .await;

    assert!(matches!(result, Err(GatewayError::MissingSignature { .. })));
}

// ==================== Encryption ====================

#[tokio::test]
async fn test_encrypted_request_and_response() {
    let mock_server = MockServer::start().await;

    let cipher = ContentCipher::new(AES_KEY).unwrap();
    let node = format!("\"{}\"", cipher.encrypt(QUERY_NODE).unwrap());
    Mock::given(method("POST"))
        .and(body_string_contains("encrypt_type=AES"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(signed_body("alipay.trade.query", &node, None)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = plain_config(&mock_server).with_encrypt_key(AES_KEY);
    let response = blocking(move || {
        let client = GatewayClient::new(config).unwrap();
        client.execute(
            &TradeQueryRequest::by_out_trade_no("6823789339978248"),
            &RequestOptions::new().encrypted(),
        )
    })
    .await
    .expect("encrypted query failed");

    assert_eq!(response.out_trade_no, "6823789339978248");
    assert_eq!(response.trade_status, "TRADE_SUCCESS");

    let requests = mock_server.received_requests().await.unwrap();
    let fields = parse_notification_body(&String::from_utf8_lossy(&requests[0].body));
    assert_eq!(
        cipher.decrypt(&fields["biz_content"]).unwrap(),
        r#"{"out_trade_no":"6823789339978248"}"#
    );
}

// ==================== Certificate mode ====================

#[tokio::test]
async fn test_cert_mode_sends_serial_numbers() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_string_contains("app_cert_sn=b21802f2e77f53674c9d7c777c28e1e9"))
        .and(body_string_contains(
            "alipay_root_cert_sn=9e98766ee309c445853b9d3b9d4cc5ef_822877d4b799a9f7111d8dd2287177eb",
        ))
        .respond_with(ResponseTemplate::new(200).set_body_string(signed_body(
            "alipay.trade.query",
            QUERY_NODE,
            Some(GATEWAY_SN),
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = cert_config(&mock_server);
    let (response, registry_len) = blocking(move || {
        let client = GatewayClient::new(config).unwrap();
        let response =
            client.execute(&TradeQueryRequest::by_trade_no("1"), &RequestOptions::new());
        (response, client.registry().len())
    })
    .await;

    assert!(response.unwrap().common.is_success());
    assert_eq!(registry_len, 1);
}

#[tokio::test]
async fn test_unknown_cert_sn_downloads_once() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_string_contains("method=alipay.open.app.alipaycert.download"))
        .and(body_string_contains(ROTATED_SN))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(download_body(GATEWAY_CERT_ROTATED, Some(ROTATED_SN))),
        )
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("method=alipay.trade.query"))
        .respond_with(ResponseTemplate::new(200).set_body_string(signed_body(
            "alipay.trade.query",
            QUERY_NODE,
            Some(ROTATED_SN),
        )))
        .expect(2)
        .mount(&mock_server)
        .await;

    let config = cert_config(&mock_server);
    let (first, second, sns) = blocking(move || {
        let client = GatewayClient::new(config).unwrap();
        let request = TradeQueryRequest::by_trade_no("1");
        let first = client.execute(&request, &RequestOptions::new());
        let second = client.execute(&request, &RequestOptions::new());
        (first, second, client.registry().list_sns())
    })
    .await;

    assert!(first.is_ok(), "first call failed: {first:?}");
    assert!(second.is_ok(), "second call failed: {second:?}");
    assert_eq!(sns, vec![ROTATED_SN.to_string(), GATEWAY_SN.to_string()]);
}

#[tokio::test]
async fn test_downloaded_certificate_sn_mismatch() {
    let mock_server = MockServer::start().await;

    // Serves the application certificate for the rotated serial number.
    Mock::given(method("POST"))
        .and(body_string_contains("method=alipay.open.app.alipaycert.download"))
        .respond_with(ResponseTemplate::new(200).set_body_string(download_body(APP_CERT, None)))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("method=alipay.trade.query"))
        .respond_with(ResponseTemplate::new(200).set_body_string(signed_body(
            "alipay.trade.query",
            QUERY_NODE,
            Some(ROTATED_SN),
        )))
        .mount(&mock_server)
        .await;

    let config = cert_config(&mock_server);
    let (result, registry_len) = blocking(move || {
        let client = GatewayClient::new(config).unwrap();
        let result = client.execute(&TradeQueryRequest::by_trade_no("1"), &RequestOptions::new());
        (result, client.registry().len())
    })
    .await;

    match result {
        Err(GatewayError::CertificateSnMismatch { requested, actual }) => {
            assert_eq!(requested, ROTATED_SN);
            assert_eq!(actual, "b21802f2e77f53674c9d7c777c28e1e9");
        }
        other => panic!("expected CertificateSnMismatch, got {other:?}"),
    }
    assert_eq!(registry_len, 1);
}

#[tokio::test]
async fn test_download_failure_is_reported_as_download_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_string_contains("method=alipay.open.app.alipaycert.download"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("method=alipay.trade.query"))
        .respond_with(ResponseTemplate::new(200).set_body_string(signed_body(
            "alipay.trade.query",
            QUERY_NODE,
            Some(ROTATED_SN),
        )))
        .mount(&mock_server)
        .await;

    let config = cert_config(&mock_server);
    let result = blocking(move || {
        let client = GatewayClient::new(config).unwrap();
        client.execute(&TradeQueryRequest::by_trade_no("1"), &RequestOptions::new())
    })
    .await;

    match result {
        Err(GatewayError::CertificateDownload { cert_sn, message }) => {
            assert_eq!(cert_sn, ROTATED_SN);
            assert!(message.contains("502"), "message: {message}");
        }
        other => panic!("expected CertificateDownload, got {other:?}"),
    }
}

#[tokio::test]
async fn test_download_certificate_directly() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(body_string_contains("method=alipay.open.app.alipaycert.download"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(download_body(GATEWAY_CERT_ROTATED, Some(ROTATED_SN))),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = cert_config(&mock_server);
    let (pem, registry_len) = blocking(move || {
        let client = GatewayClient::new(config).unwrap();
        (client.download_certificate(ROTATED_SN), client.registry().len())
    })
    .await;

    assert_eq!(pem.unwrap(), GATEWAY_CERT_ROTATED);
    assert_eq!(registry_len, 1);
}

// ==================== Status mapping and retry ====================

#[tokio::test]
async fn test_server_error_is_network_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = plain_config(&mock_server);
    let result = blocking(move || {
        let client = GatewayClient::new(config).unwrap();
        client.execute(&TradeQueryRequest::by_trade_no("1"), &RequestOptions::new())
    })
    .await;

    match result {
        Err(GatewayError::Network { message }) => {
            assert!(message.contains("HTTP 500"), "message: {message}");
            assert!(message.contains("internal error"));
        }
        other => panic!("expected Network error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rate_limited() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "60"))
        .mount(&mock_server)
        .await;

    let config = plain_config(&mock_server);
    let result = blocking(move || {
        let client = GatewayClient::new(config).unwrap();
        client.execute(&TradeQueryRequest::by_trade_no("1"), &RequestOptions::new())
    })
    .await;

    match result {
        Err(GatewayError::RateLimited { retry_after }) => {
            assert_eq!(retry_after, Some(Duration::from_secs(60)));
        }
        other => panic!("expected RateLimited, got {other:?}"),
    }
}

#[tokio::test]
async fn test_retry_on_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(signed_body("alipay.trade.query", QUERY_NODE, None)),
        )
        .mount(&mock_server)
        .await;

    let config = plain_config(&mock_server).with_max_retries(1);
    let result = blocking(move || {
        let client = GatewayClient::new(config).unwrap();
        client.execute(&TradeQueryRequest::by_trade_no("1"), &RequestOptions::new())
    })
    .await;

    assert!(result.is_ok(), "retry should succeed: {result:?}");
    assert_eq!(mock_server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_custom_transport() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(header("user-agent", concat!("alipay-gateway/", env!("CARGO_PKG_VERSION"))))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(signed_body("alipay.trade.query", QUERY_NODE, None)),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let config = plain_config(&mock_server);
    let result = blocking(move || {
        let transport = Arc::new(HttpTransport::new(5, 0).unwrap());
        let client = GatewayClient::with_transport(config, transport).unwrap();
        client.execute(&TradeQueryRequest::by_trade_no("1"), &RequestOptions::new())
    })
    .await;

    assert!(result.is_ok());
}

// ==================== Notifications ====================

fn notification_body(kind: NotificationKind, tamper: bool) -> String {
    let mut fields: BTreeMap<String, String> = [
        ("app_id", "2014072300007148"),
        ("notify_id", "ac05099524730693a8b330c5ecf72da9786"),
        ("notify_time", "2024-01-01 12:00:00"),
        ("notify_type", "trade_status_sync"),
        ("out_trade_no", "6823789339978248"),
        ("trade_no", "2013112011001004330000121536"),
        ("trade_status", "TRADE_SUCCESS"),
        ("total_amount", "88.88"),
        ("subject", "大乐透"),
        ("passback_params", "a=1&b=2"),
        ("sign_type", "RSA2"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let signature = gateway_sign(&notification_sign_content(&fields, kind));
    fields.insert("sign".to_string(), signature);
    if tamper {
        fields.insert("total_amount".to_string(), "0.01".to_string());
    }

    url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(fields.iter())
        .finish()
}

fn offline_client() -> GatewayClient {
    let config = GatewayConfig::new("2014072300007148")
        .with_app_private_key(APP_KEY)
        .with_alipay_public_key(GATEWAY_PUBLIC);
    GatewayClient::new(config).unwrap()
}

#[test]
fn test_handle_notification() {
    let client = offline_client();
    let notification = client
        .handle_notification(
            &notification_body(NotificationKind::Standard, false),
            NotificationKind::Standard,
        )
        .expect("notification should verify");

    assert!(notification.is_paid());
    assert_eq!(notification.subject, "大乐透");
    assert_eq!(notification.passback_params, "a=1&b=2");
    assert_eq!(notification.total_amount, "88.88");
}

#[test]
fn test_tampered_notification_rejected() {
    let client = offline_client();
    let raw = notification_body(NotificationKind::Standard, true);

    let result = client.handle_notification(&raw, NotificationKind::Standard);
    assert!(matches!(result, Err(GatewayError::SignatureInvalid { .. })));
    assert!(!client.is_trusted_notification(&parse_notification_body(&raw), NotificationKind::Standard));
}

#[test]
fn test_life_channel_notification() {
    let client = offline_client();
    let raw = notification_body(NotificationKind::LifeChannel, false);
    let fields = parse_notification_body(&raw);

    assert!(client.is_trusted_notification(&fields, NotificationKind::LifeChannel));
    assert!(!client.is_trusted_notification(&fields, NotificationKind::Standard));
}
