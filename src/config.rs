//! 設定 - 環境変数（.env 対応）からの読み込み

use std::path::PathBuf;
use std::time::Duration;

use crate::earthengine::{self, ServiceAccountKey, SubmissionStyle};
use crate::error::{AppError, Result};
use crate::vision;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Earth Engine 接続設定
#[derive(Debug, Clone, Default)]
pub struct EarthEngineConfig {
    pub client_email: Option<String>,
    pub private_key: Option<String>,
    /// サービスアカウント鍵ファイル（メール・鍵が未設定のときに使用）
    pub key_file: Option<PathBuf>,
    pub project: Option<String>,
    pub api_url: String,
    pub token_uri: Option<String>,
    pub submission: SubmissionStyle,
}

impl EarthEngineConfig {
    /// 認証情報を解決
    ///
    /// 明示指定のメール・鍵を優先し、どちらも無ければ鍵ファイルを使う。
    pub fn service_account_key(&self) -> Result<ServiceAccountKey> {
        let explicit = self.client_email.is_some() || self.private_key.is_some();
        let key = match (&self.key_file, explicit) {
            (Some(path), false) => ServiceAccountKey::from_file(path)?,
            _ => ServiceAccountKey::from_parts(
                self.client_email.as_deref(),
                self.private_key.as_deref(),
            )
            .map_err(|e| match e {
                AppError::Configuration(msg) if !explicit => AppError::Configuration(format!(
                    "Earth Engine credentials not configured ({})",
                    msg
                )),
                other => other,
            })?,
        };

        Ok(match &self.token_uri {
            Some(uri) => key.with_token_uri(uri.clone()),
            None => key,
        })
    }
}

/// 画像判定モデルの接続設定
#[derive(Debug, Clone, Default)]
pub struct VisionConfig {
    pub api_key: Option<String>,
    pub api_url: String,
    pub model: String,
}

/// アプリケーション設定
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub earth_engine: EarthEngineConfig,
    pub vision: VisionConfig,
    pub upstream_timeout: Duration,
    pub candidates_path: Option<PathBuf>,
    pub static_dir: Option<PathBuf>,
}

impl AppConfig {
    /// 環境変数から読み込む
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の参照関数から読み込む（テスト用）
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        // 空文字の変数は未設定として扱い、次の別名を見る
        let get = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| lookup(name).filter(|v| !v.trim().is_empty()))
        };

        let submission = match get(&["EARTH_ENGINE_SUBMISSION"]) {
            Some(style) => style.parse()?,
            None => SubmissionStyle::default(),
        };

        let upstream_timeout = match get(&["UPSTREAM_TIMEOUT_SECS"]) {
            Some(secs) => {
                let secs: u64 = secs.trim().parse().map_err(|_| {
                    AppError::Configuration(format!(
                        "UPSTREAM_TIMEOUT_SECS must be a whole number of seconds, got '{}'",
                        secs
                    ))
                })?;
                Duration::from_secs(secs.max(1))
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        Ok(Self {
            bind_addr: get(&["BIND_ADDR"]).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            earth_engine: EarthEngineConfig {
                client_email: get(&["EARTH_ENGINE_CLIENT_EMAIL", "GEE_SERVICE_ACCOUNT"]),
                private_key: get(&["EARTH_ENGINE_PRIVATE_KEY", "GEE_PRIVATE_KEY"]),
                key_file: get(&["GOOGLE_APPLICATION_CREDENTIALS"]).map(PathBuf::from),
                project: get(&["EARTH_ENGINE_PROJECT"]),
                api_url: get(&["EARTH_ENGINE_API_URL"])
                    .unwrap_or_else(|| earthengine::DEFAULT_API_URL.to_string()),
                token_uri: get(&["EARTH_ENGINE_TOKEN_URI"]),
                submission,
            },
            vision: VisionConfig {
                api_key: get(&["OPENAI_API_KEY"]),
                api_url: get(&["OPENAI_API_URL"])
                    .unwrap_or_else(|| vision::DEFAULT_API_URL.to_string()),
                model: get(&["OPENAI_MODEL"]).unwrap_or_else(|| vision::DEFAULT_MODEL.to_string()),
            },
            upstream_timeout,
            candidates_path: get(&["CANDIDATES_PATH"]).map(PathBuf::from),
            static_dir: get(&["STATIC_DIR"]).map(PathBuf::from),
        })
    }
}
