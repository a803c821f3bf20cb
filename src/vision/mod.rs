//! マルチモーダルモデルによる画像判定

mod client;
mod prompt;

use serde::{Deserialize, Serialize};

pub use client::{DEFAULT_API_URL, DEFAULT_MODEL, VisionClient, parse_validation};
pub use prompt::EVALUATION_PROMPT;

/// 考古学的特徴の判定結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    /// 考古学的特徴とみなせるか
    pub is_valid: bool,
    /// 確信度（0〜100）
    pub confidence: f64,
    pub analysis: String,
    pub features: Vec<String>,
}
