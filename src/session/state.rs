/// クライアントセッションのライフサイクル状態
///
/// `Reconnecting` は `Streaming` 中の予期しない切断からのみ到達し、
/// `Connecting` へ戻るか、試行上限で `Idle`（エラー通知）に終わる。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    RequestingPermission,
    Connecting,
    Streaming,
    Reconnecting,
    Stopping,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::RequestingPermission => "requesting_permission",
            Self::Connecting => "connecting",
            Self::Streaming => "streaming",
            Self::Reconnecting => "reconnecting",
            Self::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
