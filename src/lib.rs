//! ジオグリフ探索 - 衛星画像とマルチモーダルモデルによる候補地点の検証サーバー
//!
//! # 機能
//! - 緯度経度＋バッファからの撮影範囲とピクセルグリッドの計算
//! - サービスアカウント認証による Google Earth Engine からの画像取得
//! - マルチモーダルモデルによる考古学的特徴の判定（JSON）
//! - 候補地点CSVの読み込み

pub mod api;
pub mod candidates;
pub mod config;
pub mod earthengine;
pub mod error;
pub mod imagery;
pub mod vision;

pub use candidates::CandidatePoint;
pub use error::{AppError, Result};
pub use imagery::{ImageRegion, ImageryRequest};
pub use vision::ValidationResult;
