//! Asynchronous trade notifications.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Fields of a trade status notification.
///
/// Every field defaults to empty; which ones are present depends on the
/// notification type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradeNotification {
    pub notify_time: String,
    pub notify_type: String,
    pub notify_id: String,
    pub app_id: String,
    pub auth_app_id: String,
    pub charset: String,
    pub version: String,
    pub sign_type: String,
    pub sign: String,
    pub trade_no: String,
    pub out_trade_no: String,
    pub out_biz_no: String,
    pub buyer_id: String,
    pub buyer_logon_id: String,
    pub seller_id: String,
    pub seller_email: String,
    pub trade_status: String,
    pub total_amount: String,
    pub receipt_amount: String,
    pub invoice_amount: String,
    pub buyer_pay_amount: String,
    pub point_amount: String,
    pub refund_fee: String,
    pub subject: String,
    pub body: String,
    pub gmt_create: String,
    pub gmt_payment: String,
    pub gmt_refund: String,
    pub gmt_close: String,
    /// JSON array, as sent.
    pub fund_bill_list: String,
    pub passback_params: String,
    /// JSON array, as sent.
    pub voucher_detail_list: String,
    pub agreement_no: String,
    pub external_agreement_no: String,
}

impl TradeNotification {
    /// Decode URL-decoded notification fields. Unknown fields are ignored.
    pub fn from_fields(fields: &BTreeMap<String, String>) -> GatewayResult<Self> {
        let value = serde_json::to_value(fields).map_err(|e| GatewayError::InvalidResponse {
            message: format!("failed to encode notification fields: {}", e),
        })?;
        serde_json::from_value(value).map_err(|e| GatewayError::InvalidResponse {
            message: format!("failed to decode notification: {}", e),
        })
    }

    pub fn is_paid(&self) -> bool {
        matches!(self.trade_status.as_str(), "TRADE_SUCCESS" | "TRADE_FINISHED")
    }
}
