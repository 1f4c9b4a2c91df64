//! Weixin webhook adapter: signature validation, message decoding, handler dispatch,
//! and reply encoding, plus an HTTP gateway that hosts it.

pub mod adapter;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gateway;
pub mod message;
pub mod reply;
pub mod send;
pub mod signature;

pub use adapter::Weixin;
pub use error::WeixinError;
