use std::fs;
use std::path::PathBuf;

use realtime_asr_relay::config::{ConfigSet, CONFIG_DIR_ENV, UPSTREAM_KEY_ENV};

fn copy_default_config_to(dest: &PathBuf) {
    fs::create_dir_all(dest).expect("create temp config dir");
    let src = PathBuf::from("config");
    for name in ["server.yaml", "upstream.yaml", "session.yaml"] {
        let from = src.join(name);
        let to = dest.join(name);
        fs::copy(&from, &to).unwrap_or_else(|e| panic!("copy {:?} -> {:?}: {}", from, to, e));
    }
}

#[test]
fn loads_config_from_env_dir() {
    let tmp = std::env::temp_dir().join(format!("asr_relay_cfg_{}", uuid::Uuid::new_v4()));
    copy_default_config_to(&tmp);
    std::env::set_var(CONFIG_DIR_ENV, &tmp);

    let cfg = ConfigSet::load_from_env().expect("load config from env");
    assert_eq!(cfg.root(), tmp.as_path());
    assert!(!cfg.server.ws_bind_addr.is_empty());
    assert!(!cfg.upstream.endpoint.is_empty());
    assert!(cfg.session.chunk_cadence_ms > 0);
}

#[test]
fn upstream_credential_prefers_environment() {
    let tmp = std::env::temp_dir().join(format!("asr_relay_cfg_{}", uuid::Uuid::new_v4()));
    copy_default_config_to(&tmp);

    std::env::set_var(UPSTREAM_KEY_ENV, "env-held-secret");
    let cfg = ConfigSet::load_from_dir(&tmp).expect("load config");
    std::env::remove_var(UPSTREAM_KEY_ENV);

    assert_eq!(cfg.upstream.api_key, "env-held-secret");
}

#[test]
fn missing_directory_is_reported() {
    let missing = std::env::temp_dir().join(format!("asr_relay_none_{}", uuid::Uuid::new_v4()));
    assert!(ConfigSet::load_from_dir(&missing).is_err());
}

#[test]
fn session_durations_match_yaml() {
    // 既定設定: cadence 250ms / reconnect delay 2000ms
    let cfg = ConfigSet::load_from_dir("config").expect("load default config");
    assert_eq!(cfg.session.chunk_cadence().as_millis(), 250);
    assert_eq!(cfg.session.reconnect_delay().as_millis(), 2000);
    assert_eq!(cfg.upstream.connect_timeout().as_millis(), 5000);
}
