use serde::{Deserialize, Serialize};

/// `GET /satellite` のクエリ
///
/// 欠落・数値以外はハンドラーで400にするため文字列で受け取る。
#[derive(Debug, Default, Deserialize)]
pub struct SatelliteQuery {
    pub lat: Option<String>,
    pub lon: Option<String>,
    pub buffer: Option<String>,
    pub policy: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SatelliteResponse {
    /// `data:image/...;base64,...`
    pub image: String,
    pub coordinates: Coordinates,
    pub source: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ValidateRequest {
    #[serde(rename = "imageUrl", default)]
    pub image_url: Option<String>,
}
