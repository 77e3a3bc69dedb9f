//! 設定モジュール（YAML 読み込み + 環境変数オーバーライド）
//!
//! `ConfigSet` はルートディレクトリ配下の複数YAMLファイルを読み込み、
//! 実行時に必要な設定値を型安全に提供します。秘匿値（上流APIキー）と
//! 待受アドレスは環境変数が優先されます。
mod error;
mod server;
mod session;
mod upstream;

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

pub use error::ConfigError;
pub use server::ServerConfig;
pub use session::SessionRuntimeConfig;
pub use upstream::UpstreamConfig;

/// 設定ディレクトリを指す環境変数名
pub const CONFIG_DIR_ENV: &str = "ASR_RELAY_CONFIG_DIR";

/// 上流プロバイダ資格情報のオーバーライド用環境変数名
pub const UPSTREAM_KEY_ENV: &str = "ASR_RELAY_UPSTREAM_KEY";

/// 待受アドレスのオーバーライド用環境変数名
pub const LISTEN_ADDR_ENV: &str = "ASR_RELAY_LISTEN_ADDR";

/// すべての設定をひとまとめにした構造体
#[derive(Debug, Clone)]
pub struct ConfigSet {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub session: SessionRuntimeConfig,
    root: PathBuf,
}

impl ConfigSet {
    /// ルートディレクトリから各YAMLを読み込み
    pub fn load_from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, ConfigError> {
        let root = dir.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(ConfigError::MissingRoot(root));
        }

        let server = load_yaml(root.join("server.yaml"))?;
        let upstream = load_yaml(root.join("upstream.yaml"))?;
        let session = load_yaml(root.join("session.yaml"))?;

        let mut config = Self {
            server,
            upstream,
            session,
            root,
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 環境変数（未設定時は `config/`）から設定を読み込み
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let dir = std::env::var(CONFIG_DIR_ENV).unwrap_or_else(|_| "config".to_string());
        Self::load_from_dir(dir)
    }

    /// 設定ルートのパス（デバッグ等に利用）
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 値域の検証（チャンク周期は正の整数）
    fn validate(&self) -> Result<(), ConfigError> {
        if self.session.chunk_cadence_ms == 0 {
            return Err(ConfigError::Invalid {
                message: "chunk_cadence_ms must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// 秘匿値・待受アドレスは環境変数優先
    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var(UPSTREAM_KEY_ENV) {
            if !key.is_empty() {
                self.upstream.api_key = key;
            }
        }
        if let Ok(addr) = std::env::var(LISTEN_ADDR_ENV) {
            if !addr.is_empty() {
                self.server.ws_bind_addr = addr;
            }
        }
    }
}

/// YAMLファイルを読み込み、型 `T` へデシリアライズ
fn load_yaml<T>(path: PathBuf) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let data = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    serde_yaml::from_str(&data).map_err(|source| ConfigError::Parse { path, source })
}
