use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 中継WebSocketサーバのバインドアドレス（例: 127.0.0.1:3000）
    pub ws_bind_addr: String,
    /// 片側クローズ後にもう片側を閉じるまでの猶予（ミリ秒）
    pub teardown_grace_ms: u64,
}

impl ServerConfig {
    /// ペア解体の猶予時間
    pub fn teardown_grace(&self) -> Duration {
        Duration::from_millis(self.teardown_grace_ms)
    }
}
