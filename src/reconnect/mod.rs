//! 再接続ポリシー
//!
//! クライアントと中継サーバの双方が使う純粋な判定ロジック。
//! 待機時間はセッション生成時に固定され、試行ごとに再計算しない
//! （指数バックオフは行わない設計）。
use std::time::Duration;

/// 再接続するか諦めるかの判定結果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    Retry { after: Duration },
    GiveUp,
}

/// 固定待機・上限回数つきの再接続ポリシー
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// 切断時点の状態から再試行可否を判定
    ///
    /// 録音中の切断（`was_recording`）でなければ再試行しない。
    /// `current_attempt` が上限未満のときのみ固定待機つきで再試行する。
    pub fn decide(&self, current_attempt: u32, was_recording: bool) -> ReconnectDecision {
        if was_recording && current_attempt < self.max_attempts {
            ReconnectDecision::Retry { after: self.delay }
        } else {
            ReconnectDecision::GiveUp
        }
    }
}
