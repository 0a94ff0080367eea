//! 证书真伪核验核心
//!
//! 两路独立证据：图像取证 (ELA) 与可信记录库比对，最后由仲裁器合成结论。
//! 每次核验的回执经 Ed25519 签名后追加进 MMR 账本，供事后审计。

pub mod api;
pub mod arbiter;
pub mod artifacts;
pub mod config;
pub mod ela;
pub mod error;
pub mod evidence;
pub mod extractor;
pub mod fingerprint;
pub mod ledger;
pub mod matcher;
pub mod pipeline;
pub mod record;
pub mod record_store;
pub mod regions;
pub mod signer;

pub use error::{Error, Result};
