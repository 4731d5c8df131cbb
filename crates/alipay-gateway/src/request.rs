//! Outbound request envelopes.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::canonicalize::canonicalize;
use crate::error::GatewayResult;
use crate::sign::Credential;
use crate::types::FIELD_SIGN;

/// A gateway endpoint: method name, business content and response payload.
///
/// The implementing type is serialized to JSON as `biz_content`.
pub trait GatewayRequest: Serialize {
    /// Gateway method, e.g. `alipay.trade.query`.
    const METHOD: &'static str;

    /// Payload of the `<method>_response` node.
    type Response: DeserializeOwned;
}

/// Per-call options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Asynchronous notification callback.
    pub notify_url: Option<String>,

    /// Browser return URL for page payments.
    pub return_url: Option<String>,

    /// Token when calling on behalf of another merchant.
    pub app_auth_token: Option<String>,

    /// Encrypt `biz_content` and decrypt the response node.
    pub need_encrypt: bool,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notify_url(mut self, url: impl Into<String>) -> Self {
        self.notify_url = Some(url.into());
        self
    }

    pub fn with_return_url(mut self, url: impl Into<String>) -> Self {
        self.return_url = Some(url.into());
        self
    }

    pub fn with_app_auth_token(mut self, token: impl Into<String>) -> Self {
        self.app_auth_token = Some(token.into());
        self
    }

    pub fn encrypted(mut self) -> Self {
        self.need_encrypt = true;
        self
    }
}

/// Wire fields of one outbound call, in emission order.
///
/// Built fresh per call. `sign` is appended last by [`RequestEnvelope::sign`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestEnvelope {
    fields: Vec<(String, String)>,
}

impl RequestEnvelope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field. Empty values are kept on the wire but never signed.
    pub fn push(&mut self, name: &str, value: impl Into<String>) {
        self.fields.push((name.to_string(), value.into()));
    }

    /// Append a field when a value is present.
    pub fn push_opt(&mut self, name: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.push(name, value);
        }
    }

    /// Value of a field.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// The canonical string that is signed.
    pub fn sign_content(&self) -> String {
        canonicalize(
            self.fields
                .iter()
                .filter(|(key, _)| key != FIELD_SIGN)
                .map(|(key, value)| (key.as_str(), value.as_str())),
        )
    }

    /// Sign the envelope and append `sign`.
    pub fn sign(mut self, credential: &Credential) -> GatewayResult<Self> {
        self.fields.retain(|(key, _)| key != FIELD_SIGN);
        let signature = credential.sign(&self.sign_content())?;
        self.push(FIELD_SIGN, signature);
        Ok(self)
    }

    /// `application/x-www-form-urlencoded` body.
    pub fn to_form_body(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.fields.iter())
            .finish()
    }
}
