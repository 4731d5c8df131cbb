//! Wire constants, algorithm selectors and client configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Production gateway endpoint.
pub const GATEWAY_PRODUCTION_URL: &str = "https://openapi.alipay.com/gateway.do";

/// Sandbox gateway endpoint.
pub const GATEWAY_SANDBOX_URL: &str = "https://openapi.alipaydev.com/gateway.do";

/// Content type of outbound requests.
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded;charset=utf-8";

/// Timestamp layout expected in the `timestamp` field (local time).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const FORMAT_JSON: &str = "JSON";
pub const CHARSET_UTF8: &str = "UTF-8";
pub const API_VERSION: &str = "1.0";

/// Gateway return code of a successful call.
pub const SUCCESS_CODE: &str = "10000";

// Field names shared by requests, responses and notifications.
pub const FIELD_APP_ID: &str = "app_id";
pub const FIELD_METHOD: &str = "method";
pub const FIELD_FORMAT: &str = "format";
pub const FIELD_CHARSET: &str = "charset";
pub const FIELD_SIGN_TYPE: &str = "sign_type";
pub const FIELD_SIGN: &str = "sign";
pub const FIELD_TIMESTAMP: &str = "timestamp";
pub const FIELD_VERSION: &str = "version";
pub const FIELD_APP_CERT_SN: &str = "app_cert_sn";
pub const FIELD_ALIPAY_ROOT_CERT_SN: &str = "alipay_root_cert_sn";
pub const FIELD_ALIPAY_CERT_SN: &str = "alipay_cert_sn";
pub const FIELD_NOTIFY_URL: &str = "notify_url";
pub const FIELD_RETURN_URL: &str = "return_url";
pub const FIELD_APP_AUTH_TOKEN: &str = "app_auth_token";
pub const FIELD_BIZ_CONTENT: &str = "biz_content";
pub const FIELD_ENCRYPT_TYPE: &str = "encrypt_type";

/// Suffix appended to the underscored method name to form the response node.
pub const RESPONSE_SUFFIX: &str = "_response";

/// Response node used by the gateway for gateway-level failures.
pub const ERROR_RESPONSE: &str = "error_response";

/// Signature algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SignType {
    /// RSA with SHA-1.
    #[serde(rename = "RSA")]
    Rsa,

    /// RSA with SHA-256.
    #[default]
    #[serde(rename = "RSA2")]
    Rsa2,
}

impl SignType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rsa => "RSA",
            Self::Rsa2 => "RSA2",
        }
    }
}

impl fmt::Display for SignType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignType {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RSA" => Ok(Self::Rsa),
            "RSA2" => Ok(Self::Rsa2),
            other => Err(GatewayError::Validation {
                message: format!("unsupported sign type: {other:?}"),
            }),
        }
    }
}

/// Symmetric cipher selector for `biz_content`.
///
/// The gateway only accepts AES today; the enum leaves room for more.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EncryptType {
    #[default]
    #[serde(rename = "AES")]
    Aes,
}

impl EncryptType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aes => "AES",
        }
    }
}

impl fmt::Display for EncryptType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncryptType {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AES" => Ok(Self::Aes),
            other => Err(GatewayError::Validation {
                message: format!("unsupported encrypt type {other:?}, only AES is accepted"),
            }),
        }
    }
}

/// Fields every response node carries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonResponse {
    /// Gateway return code.
    #[serde(default)]
    pub code: String,

    /// Gateway return message.
    #[serde(default)]
    pub msg: String,

    /// Business return code.
    #[serde(default)]
    pub sub_code: String,

    /// Business return message.
    #[serde(default)]
    pub sub_msg: String,
}

impl CommonResponse {
    /// Whether the gateway reported success (`10000`).
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

/// Client configuration.
///
/// Key and certificate fields hold text content (PEM or bare base64 body).
/// Loading them from disk is the caller's job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Application id assigned by the platform.
    pub app_id: String,

    /// Signature algorithm.
    #[serde(default)]
    pub sign_type: SignType,

    /// Request charset.
    #[serde(default = "default_charset")]
    pub charset: String,

    /// Use the production gateway instead of the sandbox.
    #[serde(default)]
    pub is_production: bool,

    /// Explicit gateway URL, overriding `is_production`.
    #[serde(default)]
    pub gateway_url: Option<String>,

    /// Application private key (PKCS#1 or PKCS#8).
    #[serde(default)]
    pub app_private_key: Option<String>,

    /// Alipay public key for plain-key mode (SPKI).
    #[serde(default)]
    pub alipay_public_key: Option<String>,

    /// Application public key certificate (certificate mode).
    #[serde(default)]
    pub app_public_cert: Option<String>,

    /// Alipay public key certificate (certificate mode).
    #[serde(default)]
    pub alipay_public_cert: Option<String>,

    /// Alipay root certificate bundle (certificate mode).
    #[serde(default)]
    pub alipay_root_cert: Option<String>,

    /// Base64 AES key for `biz_content` encryption.
    #[serde(default)]
    pub encrypt_key: Option<String>,

    /// Cipher used with `encrypt_key`.
    #[serde(default)]
    pub encrypt_type: Option<EncryptType>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient transport failures.
    #[serde(default)]
    pub max_retries: u32,
}

fn default_charset() -> String {
    CHARSET_UTF8.to_string()
}

fn default_timeout() -> u64 {
    30
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            sign_type: SignType::default(),
            charset: default_charset(),
            is_production: false,
            gateway_url: None,
            app_private_key: None,
            alipay_public_key: None,
            app_public_cert: None,
            alipay_public_cert: None,
            alipay_root_cert: None,
            encrypt_key: None,
            encrypt_type: None,
            timeout_secs: default_timeout(),
            max_retries: 0,
        }
    }
}

impl GatewayConfig {
    /// Create a config for an application id with default settings.
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            ..Self::default()
        }
    }

    /// Create config from environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `ALIPAY_APP_ID` | Application id |
    /// | `ALIPAY_SIGN_TYPE` | `RSA` or `RSA2` (default `RSA2`) |
    /// | `ALIPAY_PRODUCTION` | Use the production gateway |
    /// | `ALIPAY_GATEWAY_URL` | Explicit gateway URL |
    /// | `ALIPAY_APP_PRIVATE_KEY` | Application private key content |
    /// | `ALIPAY_PUBLIC_KEY` | Alipay public key content (plain-key mode) |
    /// | `ALIPAY_APP_CERT` | Application certificate content |
    /// | `ALIPAY_PUBLIC_CERT` | Alipay public key certificate content |
    /// | `ALIPAY_ROOT_CERT` | Alipay root certificate bundle content |
    /// | `ALIPAY_ENCRYPT_KEY` | Base64 AES key |
    /// | `ALIPAY_TIMEOUT` | Request timeout in seconds (default 30) |
    /// | `ALIPAY_MAX_RETRIES` | Transport retries (default 0) |
    pub fn from_env() -> GatewayResult<Self> {
        let sign_type = match non_empty_env("ALIPAY_SIGN_TYPE") {
            Some(value) => value.parse()?,
            None => SignType::default(),
        };
        let encrypt_key = non_empty_env("ALIPAY_ENCRYPT_KEY");

        Ok(Self {
            app_id: non_empty_env("ALIPAY_APP_ID").ok_or_else(|| GatewayError::Config {
                message: "ALIPAY_APP_ID is not set".to_string(),
            })?,
            sign_type,
            charset: default_charset(),
            is_production: std::env::var("ALIPAY_PRODUCTION")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            gateway_url: non_empty_env("ALIPAY_GATEWAY_URL"),
            app_private_key: non_empty_env("ALIPAY_APP_PRIVATE_KEY"),
            alipay_public_key: non_empty_env("ALIPAY_PUBLIC_KEY"),
            app_public_cert: non_empty_env("ALIPAY_APP_CERT"),
            alipay_public_cert: non_empty_env("ALIPAY_PUBLIC_CERT"),
            alipay_root_cert: non_empty_env("ALIPAY_ROOT_CERT"),
            encrypt_type: encrypt_key.as_ref().map(|_| EncryptType::Aes),
            encrypt_key,
            timeout_secs: std::env::var("ALIPAY_TIMEOUT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_timeout),
            max_retries: std::env::var("ALIPAY_MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        })
    }

    /// Effective gateway URL.
    pub fn gateway_url(&self) -> &str {
        match &self.gateway_url {
            Some(url) => url,
            None if self.is_production => GATEWAY_PRODUCTION_URL,
            None => GATEWAY_SANDBOX_URL,
        }
    }

    /// Whether the config selects certificate mode.
    pub fn is_cert_mode(&self) -> bool {
        self.alipay_public_cert.is_some() || self.app_public_cert.is_some()
    }

    /// Set the signature algorithm.
    pub fn with_sign_type(mut self, sign_type: SignType) -> Self {
        self.sign_type = sign_type;
        self
    }

    /// Select the production gateway.
    pub fn with_production(mut self, is_production: bool) -> Self {
        self.is_production = is_production;
        self
    }

    /// Set an explicit gateway URL.
    pub fn with_gateway_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_url = Some(url.into());
        self
    }

    /// Set the application private key.
    pub fn with_app_private_key(mut self, key: impl Into<String>) -> Self {
        self.app_private_key = Some(key.into());
        self
    }

    /// Set the Alipay public key (plain-key mode).
    pub fn with_alipay_public_key(mut self, key: impl Into<String>) -> Self {
        self.alipay_public_key = Some(key.into());
        self
    }

    /// Set the application public key certificate.
    pub fn with_app_public_cert(mut self, cert: impl Into<String>) -> Self {
        self.app_public_cert = Some(cert.into());
        self
    }

    /// Set the Alipay public key certificate.
    pub fn with_alipay_public_cert(mut self, cert: impl Into<String>) -> Self {
        self.alipay_public_cert = Some(cert.into());
        self
    }

    /// Set the Alipay root certificate bundle.
    pub fn with_alipay_root_cert(mut self, cert: impl Into<String>) -> Self {
        self.alipay_root_cert = Some(cert.into());
        self
    }

    /// Enable AES encryption of `biz_content` with a base64 key.
    pub fn with_encrypt_key(mut self, key: impl Into<String>) -> Self {
        self.encrypt_type = Some(EncryptType::Aes);
        self.encrypt_key = Some(key.into());
        self
    }

    /// Set the transport timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Set the transport retry budget.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
