//! Google Earth Engine 連携モジュール

mod auth;
mod client;
mod expression;

pub use auth::{
    AccessToken, DEFAULT_TOKEN_URI, EARTH_ENGINE_SCOPE, ServiceAccountAuth, ServiceAccountKey,
    TOKEN_REFRESH_MARGIN, TokenCache, normalize_private_key, project_from_email,
};
pub use client::{DEFAULT_API_URL, EarthEngineClient, SubmissionStyle, decode_pixels};
pub use expression::{PixelsRequest, image_expression};
