//! クライアント側セッション状態機械
//!
//! 権限要求 → 接続 → ストリーミング → 停止のライフサイクルを所有し、
//! 予期しない切断時のみ `Reconnecting` を経由して再接続する。
mod controller;
mod error;
mod state;

pub use controller::{SessionController, SessionOptions};
pub use error::SessionError;
pub use state::SessionState;
