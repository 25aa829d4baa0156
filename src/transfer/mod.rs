//! Cross-device profile transfer: short-lived codes backed by a SQLite table,
//! plus the client used from the device side.

pub mod client;
pub mod code;
pub mod repo;

pub use client::{TransferClient, TransferClientError};
pub use code::{generate_transfer_code, normalize_code};
pub use repo::{RedeemMark, TransferCodeRow, TransferRepository, TRANSFER_CODE_TTL_MINUTES};
