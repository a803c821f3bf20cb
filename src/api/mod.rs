//! HTTP API - 衛星画像取得・画像判定・候補地点一覧

mod handlers;
mod models;
mod routes;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;

use crate::config::AppConfig;
use crate::earthengine::{EarthEngineClient, ServiceAccountAuth, TokenCache};
use crate::error::{AppError, Result};
use crate::vision::VisionClient;

pub use handlers::DEFAULT_BUFFER_M;
pub use models::{Coordinates, SatelliteQuery, SatelliteResponse, ValidateRequest};
pub use routes::create_router;

/// ハンドラー共有の状態
pub struct AppState {
    /// 認証情報が無い場合は設定エラーの内容を保持する
    imagery: std::result::Result<EarthEngineClient, String>,
    pub vision: VisionClient,
    pub candidates_path: Option<PathBuf>,
    pub static_dir: Option<PathBuf>,
}

impl AppState {
    /// 設定からクライアントを組み立てる
    ///
    /// Earth Engine の認証情報が不正でも起動は続け、該当エンドポイントで設定エラーを返す。
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .build()
            .map_err(|e| AppError::Configuration(format!("cannot build HTTP client: {}", e)))?;

        let ee = &config.earth_engine;
        let imagery = ee
            .service_account_key()
            .and_then(|key| {
                let auth =
                    ServiceAccountAuth::new(key, http_client.clone(), Arc::new(TokenCache::new()));
                EarthEngineClient::new(
                    Arc::new(auth),
                    http_client.clone(),
                    ee.api_url.clone(),
                    ee.project.clone(),
                    ee.submission,
                )
            })
            .map_err(|e| {
                warn!(error = %e, "satellite imagery is unavailable");
                match e {
                    AppError::Configuration(msg) => msg,
                    other => other.to_string(),
                }
            });

        let vision = VisionClient::new(
            config.vision.api_key.clone(),
            config.vision.api_url.clone(),
            config.vision.model.clone(),
            http_client,
        );

        Ok(Self {
            imagery,
            vision,
            candidates_path: config.candidates_path.clone(),
            static_dir: config.static_dir.clone(),
        })
    }

    /// 画像クライアント（未設定なら設定エラー）
    pub fn imagery(&self) -> Result<&EarthEngineClient> {
        self.imagery
            .as_ref()
            .map_err(|msg| AppError::Configuration(msg.clone()))
    }
}
