//! Endpoint definitions.
//!
//! Each request type serializes to the endpoint's `biz_content` and names
//! the payload type of its `<method>_response` node.

pub mod cert;
pub mod notify;
pub mod trade;

pub use cert::{CertDownloadRequest, CertDownloadResponse};
pub use notify::TradeNotification;
pub use trade::{
    GoodsDetail, TradeAppPayRequest, TradeCancelRequest, TradeCancelResponse, TradeCloseRequest,
    TradeCloseResponse, TradePagePayRequest, TradePrecreateRequest, TradePrecreateResponse,
    TradeQueryRequest, TradeQueryResponse, TradeRefundRequest, TradeRefundResponse,
};
