//! キャプチャデバイスの抽象と組み込み実装
//!
//! 実マイクの代わりに差し替え可能なシーム。`ScriptedDevice` はテストと
//! デモ用にブロック列・権限拒否・途中喪失をスクリプトできます。
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use super::error::CaptureError;

/// 音声キャプチャデバイスの最小インタフェース
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    /// デバイスへのアクセス権限を要求（拒否時は `PermissionDenied`）
    async fn request_access(&self) -> Result<(), CaptureError>;

    /// 次の音声ブロックを読み出す（喪失時は `DeviceLost`）
    async fn read_block(&self) -> Result<Bytes, CaptureError>;

    /// デバイスを解放する（何度呼んでも安全）
    fn release(&self);
}

/// スクリプト可能なキャプチャデバイス
///
/// キューに積んだ読み出し結果を順に返し、空になったら無音ブロックを
/// 返し続ける。保持状態は `is_held` で観測できる。
pub struct ScriptedDevice {
    deny_permission: AtomicBool,
    reads: Mutex<VecDeque<Result<Bytes, CaptureError>>>,
    silence_block_len: usize,
    held: AtomicBool,
}

impl ScriptedDevice {
    pub fn new() -> Self {
        Self {
            deny_permission: AtomicBool::new(false),
            reads: Mutex::new(VecDeque::new()),
            silence_block_len: 3200,
            held: AtomicBool::new(false),
        }
    }

    /// 以後の `request_access` を拒否させる
    pub fn deny_permission(&self) {
        self.deny_permission.store(true, Ordering::SeqCst);
    }

    /// 次に返す音声ブロックを積む
    pub fn push_block(&self, data: impl Into<Bytes>) {
        self.reads.lock().push_back(Ok(data.into()));
    }

    /// 指定位置でデバイス喪失を発生させる
    pub fn push_loss(&self, message: impl Into<String>) {
        self.reads
            .lock()
            .push_back(Err(CaptureError::device_lost(message)));
    }

    /// 現在デバイスを保持しているか
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }
}

impl Default for ScriptedDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureDevice for ScriptedDevice {
    async fn request_access(&self) -> Result<(), CaptureError> {
        if self.deny_permission.load(Ordering::SeqCst) {
            return Err(CaptureError::PermissionDenied);
        }
        self.held.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn read_block(&self) -> Result<Bytes, CaptureError> {
        let scripted = self.reads.lock().pop_front();
        match scripted {
            Some(read) => read,
            None => Ok(Bytes::from(vec![0_u8; self.silence_block_len])),
        }
    }

    fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
    }
}

/// 固定長の無音ブロックを返し続けるデバイス（デモ用）
pub struct SilenceDevice {
    block_len: usize,
    held: AtomicBool,
}

impl SilenceDevice {
    pub fn new(block_len: usize) -> Self {
        Self {
            block_len,
            held: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl CaptureDevice for SilenceDevice {
    async fn request_access(&self) -> Result<(), CaptureError> {
        self.held.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn read_block(&self) -> Result<Bytes, CaptureError> {
        Ok(Bytes::from(vec![0_u8; self.block_len]))
    }

    fn release(&self) {
        self.held.store(false, Ordering::SeqCst);
    }
}
