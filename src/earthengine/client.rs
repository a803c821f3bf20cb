//! Earth Engine REST クライアント

use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::{debug, info};

use super::auth::ServiceAccountAuth;
use super::expression::PixelsRequest;
use crate::error::{AppError, Result};
use crate::imagery::ImageryRequest;

pub const DEFAULT_API_URL: &str = "https://earthengine.googleapis.com";
const SERVICE: &str = "Earth Engine";

/// リクエストの送り方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmissionStyle {
    /// `image:computePixels` で直接画素を受け取る
    #[default]
    ComputePixels,
    /// サムネイルを作成し、その名前で画素を取得する
    Thumbnail,
}

impl std::str::FromStr for SubmissionStyle {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compute_pixels" | "computepixels" | "compute" => Ok(Self::ComputePixels),
            "thumbnail" | "thumbnails" => Ok(Self::Thumbnail),
            other => Err(AppError::Configuration(format!(
                "unknown Earth Engine submission style '{}'",
                other
            ))),
        }
    }
}

/// `thumbnails` 作成レスポンス
#[derive(Debug, Deserialize)]
struct ThumbnailResponse {
    #[serde(default)]
    name: Option<String>,
}

/// Earth Engine APIクライアント
pub struct EarthEngineClient {
    auth: Arc<ServiceAccountAuth>,
    http_client: reqwest::Client,
    base_url: String,
    project: String,
    style: SubmissionStyle,
}

impl EarthEngineClient {
    /// 新しいクライアントを作成
    ///
    /// プロジェクトIDは明示指定がなければサービスアカウントから推定する。
    pub fn new(
        auth: Arc<ServiceAccountAuth>,
        http_client: reqwest::Client,
        base_url: impl Into<String>,
        project: Option<String>,
        style: SubmissionStyle,
    ) -> Result<Self> {
        let project = project
            .filter(|p| !p.trim().is_empty())
            .or_else(|| auth.key().project_id().map(str::to_string))
            .ok_or_else(|| {
                AppError::Configuration(
                    "Earth Engine project id is not set and cannot be derived \
                     from the service account"
                        .into(),
                )
            })?;

        Ok(Self {
            auth,
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            project,
            style,
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn style(&self) -> SubmissionStyle {
        self.style
    }

    /// 画像を取得してバイト列で返す
    pub async fn fetch_image(&self, request: &ImageryRequest) -> Result<Vec<u8>> {
        let token = self.auth.access_token().await?;
        let body = PixelsRequest::new(request);

        debug!(
            style = ?self.style,
            lat = request.region.center_lat,
            lon = request.region.center_lon,
            "submitting Earth Engine request"
        );

        let bytes = match self.style {
            SubmissionStyle::ComputePixels => self.compute_pixels(&token, &body).await?,
            SubmissionStyle::Thumbnail => self.thumbnail(&token, &body).await?,
        };

        info!(bytes = bytes.len(), "fetched satellite image");
        Ok(bytes)
    }

    async fn compute_pixels(&self, token: &str, body: &PixelsRequest) -> Result<Vec<u8>> {
        let url = format!(
            "{}/v1/projects/{}/image:computePixels",
            self.base_url, self.project
        );
        let response = self.send(self.http_client.post(url).bearer_auth(token).json(body)).await?;
        read_pixels(response).await
    }

    async fn thumbnail(&self, token: &str, body: &PixelsRequest) -> Result<Vec<u8>> {
        let url = format!("{}/v1/projects/{}/thumbnails", self.base_url, self.project);
        let response = self.send(self.http_client.post(url).bearer_auth(token).json(body)).await?;

        let thumbnail: ThumbnailResponse = response
            .json()
            .await
            .map_err(|e| AppError::data_shape(SERVICE, format!("thumbnail response: {}", e)))?;
        let name = thumbnail
            .name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| AppError::data_shape(SERVICE, "thumbnail response has no name"))?;

        let url = format!("{}/v1/{}:getPixels", self.base_url, name);
        let response = self.send(self.http_client.get(url).bearer_auth(token)).await?;
        read_pixels(response).await
    }

    /// 送信して成功以外のステータスをエラーにする
    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| AppError::from_transport(SERVICE, e))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            // 失効したトークンを次回のリクエストで使わない
            self.auth.invalidate().await;
        }
        if !response.status().is_success() {
            return Err(AppError::from_response(SERVICE, response).await);
        }
        Ok(response)
    }
}

async fn read_pixels(response: reqwest::Response) -> Result<Vec<u8>> {
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    let body = response
        .bytes()
        .await
        .map_err(|e| AppError::from_transport(SERVICE, e))?;

    decode_pixels(is_json, &body)
}

/// レスポンス本文を画像バイト列に正規化
///
/// 生のバイト列、または `data` / `bytes` にbase64を入れたJSONのどちらも受け付ける。
pub fn decode_pixels(is_json: bool, body: &[u8]) -> Result<Vec<u8>> {
    if body.is_empty() {
        return Err(AppError::NoData { service: SERVICE });
    }
    if !is_json {
        return Ok(body.to_vec());
    }

    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| AppError::data_shape(SERVICE, format!("pixel response is not JSON: {}", e)))?;
    let encoded = ["data", "bytes"]
        .iter()
        .find_map(|field| value.get(*field).and_then(|v| v.as_str()))
        .filter(|s| !s.is_empty())
        .ok_or(AppError::NoData { service: SERVICE })?;

    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| AppError::data_shape(SERVICE, format!("pixel payload is not base64: {}", e)))?;
    if bytes.is_empty() {
        return Err(AppError::NoData { service: SERVICE });
    }
    Ok(bytes)
}
