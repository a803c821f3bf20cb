//! 衛星画像の範囲計算とリクエスト記述

mod region;
mod request;

use base64::{Engine, engine::general_purpose::STANDARD};

pub use region::{GeoError, ImageRegion, METERS_PER_DEGREE, POLE_EPSILON_DEG};
pub use request::{
    AffineTransform, DateRange, DisplayRange, ImageryRequest, ImageryRequestBuilder, PixelGrid,
    ReductionPolicy, RequestError,
};

/// 画像バイト列を `data:<mime>;base64,...` 形式にする
///
/// 形式が判別できない場合は PNG とみなす。
pub fn encode_data_uri(bytes: &[u8]) -> String {
    let mime = image::guess_format(bytes)
        .map(|format| format.to_mime_type())
        .unwrap_or("image/png");
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}
