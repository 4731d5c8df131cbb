//! Trade endpoints.
//!
//! Amounts are decimal strings in yuan with two fractional digits, the way
//! the gateway writes them.

use serde::{Deserialize, Serialize};

use crate::request::GatewayRequest;
use crate::types::CommonResponse;

// ==================== alipay.trade.query ====================

/// Query a trade by merchant order number or Alipay trade number.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TradeQueryRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_trade_no: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_no: Option<String>,

    /// Extra response sections, e.g. `fund_bill_list`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub query_options: Vec<String>,
}

impl TradeQueryRequest {
    pub fn by_out_trade_no(out_trade_no: impl Into<String>) -> Self {
        Self {
            out_trade_no: Some(out_trade_no.into()),
            ..Self::default()
        }
    }

    pub fn by_trade_no(trade_no: impl Into<String>) -> Self {
        Self {
            trade_no: Some(trade_no.into()),
            ..Self::default()
        }
    }
}

impl GatewayRequest for TradeQueryRequest {
    const METHOD: &'static str = "alipay.trade.query";
    type Response = TradeQueryResponse;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TradeQueryResponse {
    #[serde(flatten)]
    pub common: CommonResponse,
    pub trade_no: String,
    pub out_trade_no: String,
    pub buyer_logon_id: String,
    /// `WAIT_BUYER_PAY`, `TRADE_CLOSED`, `TRADE_SUCCESS` or `TRADE_FINISHED`.
    pub trade_status: String,
    pub total_amount: String,
    pub receipt_amount: String,
    pub buyer_pay_amount: String,
    pub send_pay_date: String,
    pub buyer_user_id: String,
    pub store_name: String,
    pub fund_bill_list: Vec<FundBill>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FundBill {
    pub fund_channel: String,
    pub amount: String,
    pub real_amount: String,
}

// ==================== alipay.trade.close ====================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TradeCloseRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_trade_no: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_no: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator_id: Option<String>,
}

impl GatewayRequest for TradeCloseRequest {
    const METHOD: &'static str = "alipay.trade.close";
    type Response = TradeCloseResponse;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TradeCloseResponse {
    #[serde(flatten)]
    pub common: CommonResponse,
    pub trade_no: String,
    pub out_trade_no: String,
}

// ==================== alipay.trade.cancel ====================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TradeCancelRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_trade_no: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_no: Option<String>,
}

impl GatewayRequest for TradeCancelRequest {
    const METHOD: &'static str = "alipay.trade.cancel";
    type Response = TradeCancelResponse;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TradeCancelResponse {
    #[serde(flatten)]
    pub common: CommonResponse,
    pub trade_no: String,
    pub out_trade_no: String,
    /// `Y` when the cancel should be retried.
    pub retry_flag: String,
    /// `close` or `refund`.
    pub action: String,
}

// ==================== alipay.trade.refund ====================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TradeRefundRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_trade_no: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_no: Option<String>,

    pub refund_amount: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_reason: Option<String>,

    /// Identifies a partial refund; required when refunding in several parts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub out_request_no: Option<String>,
}

impl GatewayRequest for TradeRefundRequest {
    const METHOD: &'static str = "alipay.trade.refund";
    type Response = TradeRefundResponse;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TradeRefundResponse {
    #[serde(flatten)]
    pub common: CommonResponse,
    pub trade_no: String,
    pub out_trade_no: String,
    pub buyer_logon_id: String,
    /// `Y` when this call moved funds.
    pub fund_change: String,
    pub refund_fee: String,
    pub send_back_fee: String,
}

// ==================== alipay.trade.precreate ====================

/// Create a trade and obtain a QR code for the buyer to scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TradePrecreateRequest {
    pub out_trade_no: String,
    pub total_amount: String,
    pub subject: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub goods_detail: Vec<GoodsDetail>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub store_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_express: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GoodsDetail {
    pub goods_id: String,
    pub goods_name: String,
    pub quantity: u32,
    pub price: String,
}

impl GatewayRequest for TradePrecreateRequest {
    const METHOD: &'static str = "alipay.trade.precreate";
    type Response = TradePrecreateResponse;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TradePrecreateResponse {
    #[serde(flatten)]
    pub common: CommonResponse,
    pub out_trade_no: String,
    pub qr_code: String,
}

// ==================== alipay.trade.app.pay ====================

/// Mobile app payment. Signed client-side into an order string, never
/// posted to the gateway by this crate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TradeAppPayRequest {
    pub out_trade_no: String,
    pub total_amount: String,
    pub subject: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_code: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_express: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub passback_params: Option<String>,
}

impl GatewayRequest for TradeAppPayRequest {
    const METHOD: &'static str = "alipay.trade.app.pay";
    type Response = CommonResponse;
}

// ==================== alipay.trade.page.pay ====================

/// Desktop web payment, delivered to the buyer as a redirect URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradePagePayRequest {
    pub out_trade_no: String,
    pub total_amount: String,
    pub subject: String,
    pub product_code: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_express: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_pay_mode: Option<String>,
}

impl TradePagePayRequest {
    pub fn new(
        out_trade_no: impl Into<String>,
        total_amount: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            out_trade_no: out_trade_no.into(),
            total_amount: total_amount.into(),
            subject: subject.into(),
            product_code: "FAST_INSTANT_TRADE_PAY".to_string(),
            body: None,
            timeout_express: None,
            qr_pay_mode: None,
        }
    }
}

impl GatewayRequest for TradePagePayRequest {
    const METHOD: &'static str = "alipay.trade.page.pay";
    type Response = CommonResponse;
}
