use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::device::CaptureDevice;
use super::error::CaptureError;

/// 不透明な音声チャンク（到着順＝論理順、シーケンス番号は持たない）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub data: Bytes,
}

impl AudioChunk {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// キャプチャデバイスから一定周期で `AudioChunk` を産出するソース
///
/// - `start` はデバイスを排他的に確保する。二重起動は `AlreadyActive`
/// - デバイス喪失はチャンクストリーム経由で `DeviceLost` として届き、産出は停止する
/// - `stop` は冪等で、産出停止とデバイス解放を必ず行う
pub struct ChunkSource {
    device: Arc<dyn CaptureDevice>,
    active: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ChunkSource {
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        Self {
            device,
            active: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn device(&self) -> Arc<dyn CaptureDevice> {
        self.device.clone()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// 指定周期（ミリ秒）でチャンク産出を開始
    pub fn start(
        &mut self,
        cadence_ms: u64,
    ) -> Result<mpsc::Receiver<Result<AudioChunk, CaptureError>>, CaptureError> {
        if cadence_ms == 0 {
            return Err(CaptureError::InvalidCadence { cadence_ms });
        }
        if self.active.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::AlreadyActive);
        }

        let (tx, rx) = mpsc::channel(32);
        let device = self.device.clone();
        let active = self.active.clone();

        self.worker = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(cadence_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if !active.load(Ordering::SeqCst) {
                    break;
                }
                match device.read_block().await {
                    Ok(data) => {
                        if tx.send(Ok(AudioChunk::new(data))).await.is_err() {
                            // 受信側が閉じたら産出する意味がない
                            break;
                        }
                    }
                    Err(err) => {
                        debug!(error = %err, "capture device read failed");
                        active.store(false, Ordering::SeqCst);
                        device.release();
                        let _ = tx.send(Err(err)).await;
                        break;
                    }
                }
            }
        }));

        Ok(rx)
    }

    /// 産出を停止してデバイスを解放（二重呼び出しは何もしない）
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
        self.device.release();
    }
}

impl Drop for ChunkSource {
    fn drop(&mut self) {
        self.stop();
    }
}
