//! Protocol layer for the Alipay open platform gateway.
//!
//! This crate implements the signed request / verified response contract of
//! the gateway, providing:
//!
//! - Canonical parameter strings and RSA (SHA-1) / RSA2 (SHA-256) signatures
//! - AES-CBC `biz_content` encryption
//! - Certificate serial numbers and a registry that downloads unknown ones
//! - Byte-exact extraction of the signed response node
//! - Verification of synchronous responses and asynchronous notifications
//!
//! # Quick Start
//!
//! ```no_run
//! use alipay_gateway::{GatewayClient, GatewayConfig, RequestOptions, TradeQueryRequest};
//!
//! # fn example() -> alipay_gateway::GatewayResult<()> {
//! let config = GatewayConfig::new("2021000000000000")
//!     .with_app_private_key(std::fs::read_to_string("app.key").unwrap_or_default())
//!     .with_alipay_public_key(std::fs::read_to_string("alipay_public.pem").unwrap_or_default());
//! let client = GatewayClient::new(config)?;
//!
//! let query = TradeQueryRequest::by_out_trade_no("20150320010101001");
//! let response = client.execute(&query, &RequestOptions::new())?;
//! if response.common.is_success() {
//!     println!("trade status: {}", response.trade_status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Key modes
//!
//! - Plain-key mode: `alipay_public_key` verifies every response.
//! - Certificate mode: responses carry `alipay_cert_sn`; keys are looked up
//!   in the [`CertificateRegistry`] and downloaded on a miss.
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `ALIPAY_APP_ID` | Application id |
//! | `ALIPAY_SIGN_TYPE` | `RSA` or `RSA2` (default: `RSA2`) |
//! | `ALIPAY_PRODUCTION` | Use the production gateway (default: sandbox) |
//! | `ALIPAY_APP_PRIVATE_KEY` | Application private key |
//! | `ALIPAY_PUBLIC_KEY` | Alipay public key |
//! | `ALIPAY_ENCRYPT_KEY` | Base64 AES key |
//! | `ALIPAY_TIMEOUT` | Request timeout in seconds (default: 30) |
//! | `ALIPAY_MAX_RETRIES` | Max retries for transient failures (default: 0) |

pub mod api;
pub mod canonicalize;
pub mod cert;
pub mod cipher;
pub mod client;
pub mod error;
pub mod extract;
pub mod request;
pub mod sign;
pub mod trust;
pub mod types;
pub mod verify;

// Re-export main types
pub use api::{
    CertDownloadRequest, CertDownloadResponse, GoodsDetail, TradeAppPayRequest,
    TradeCancelRequest, TradeCancelResponse, TradeCloseRequest, TradeCloseResponse,
    TradeNotification, TradePagePayRequest, TradePrecreateRequest, TradePrecreateResponse,
    TradeQueryRequest, TradeQueryResponse, TradeRefundRequest, TradeRefundResponse,
};
pub use canonicalize::{canonicalize, notification_sign_content, NotificationKind};
pub use cert::{cert_sn, cert_sn_from_pem, root_cert_sn, CertificateIdentity};
pub use cipher::ContentCipher;
pub use client::{parse_notification_body, GatewayClient, HttpTransport, Transport};
pub use error::{GatewayError, GatewayResult};
pub use extract::{extract, ExtractedResponse};
pub use request::{GatewayRequest, RequestEnvelope, RequestOptions};
pub use sign::{parse_private_key, parse_public_key, sign, verify, Credential};
pub use trust::{CertificateRegistry, EntryMetadata, EntrySource};
pub use types::{CommonResponse, EncryptType, GatewayConfig, SignType};
pub use verify::{CertificateFetcher, VerifiedResponse, Verifier};
