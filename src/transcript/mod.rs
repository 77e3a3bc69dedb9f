//! 認識イベントと転写のすり合わせ
//!
//! - `RecognitionEvent` は中継サーバがクライアントへ送る正規化イベント
//! - `TranscriptLine` は表示用の1行（末尾の非確定行のみ差し替え可能）
//! - `TranscriptReconciler` はイベント列を安定した行列へ統合します
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 上流ASRの認識結果を正規化したイベント
///
/// ワイヤ上は `{"transcript": "...", "isFinal": bool}` のJSONテキスト。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionEvent {
    pub transcript: String,
    #[serde(rename = "isFinal")]
    pub is_final: bool,
}

impl RecognitionEvent {
    pub fn interim(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: false,
        }
    }

    pub fn final_result(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: true,
        }
    }
}

/// 表示用の転写1行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranscriptLine {
    pub timestamp: DateTime<Utc>,
    pub text: String,
    pub is_final: bool,
}

impl TranscriptLine {
    fn from_event(event: &RecognitionEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            text: event.transcript.clone(),
            is_final: event.is_final,
        }
    }
}

/// 途中/最終イベント列を転写行列へ統合する
///
/// 不変条件: 非確定行は常に高々1行で、存在するなら末尾にある。
/// 最終イベントは必ず新しい行を追加する（既存の確定行へは統合しない）。
#[derive(Debug, Default)]
pub struct TranscriptReconciler {
    lines: Vec<TranscriptLine>,
}

impl TranscriptReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// イベントを1件適用し、生成/更新された行を返す
    ///
    /// 空文字列の認識結果は無視して `None` を返す。
    pub fn apply(&mut self, event: &RecognitionEvent) -> Option<TranscriptLine> {
        if event.transcript.is_empty() {
            return None;
        }

        if event.is_final {
            // 確定行は常に追記。直前の非確定行があればそれを置き換える。
            if matches!(self.lines.last(), Some(tail) if !tail.is_final) {
                self.lines.pop();
            }
            self.lines.push(TranscriptLine::from_event(event));
        } else {
            match self.lines.last_mut() {
                Some(tail) if !tail.is_final => {
                    tail.text = event.transcript.clone();
                    tail.timestamp = Utc::now();
                }
                _ => self.lines.push(TranscriptLine::from_event(event)),
            }
        }

        self.lines.last().cloned()
    }

    /// 現在の転写行列のスナップショット
    pub fn lines(&self) -> &[TranscriptLine] {
        &self.lines
    }

    /// 確定行の数
    pub fn final_count(&self) -> usize {
        self.lines.iter().filter(|line| line.is_final).count()
    }
}
