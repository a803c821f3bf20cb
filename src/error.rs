//! エラー型 - 全リクエスト共通のエラー分類とJSONエンベロープ

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::imagery::{GeoError, RequestError};

/// アプリケーション全体のResult型
pub type Result<T> = std::result::Result<T, AppError>;

/// エラー分類
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 認証情報や設定の欠落・不正（リトライしない）
    #[error("configuration error: {0}")]
    Configuration(String),

    /// 利用者入力の欠落・不正
    #[error("{0}")]
    Validation(String),

    /// 外部サービスが成功以外のステータスを返した
    #[error("{service} returned HTTP {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// 成功レスポンスだが中身が空、または想定した形ではない
    #[error("unexpected response from {service}: {reason}")]
    DataShape {
        service: &'static str,
        reason: String,
    },

    /// 成功レスポンスだが画像データが入っていない
    #[error("{service} returned no image data")]
    NoData { service: &'static str },

    /// 外部サービスの応答待ちがタイムアウトした
    #[error("{service} did not respond in time")]
    Timeout { service: &'static str },

    /// 接続失敗などの通信エラー
    #[error("request to {service} failed: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

impl AppError {
    pub fn data_shape(service: &'static str, reason: impl Into<String>) -> Self {
        Self::DataShape {
            service,
            reason: reason.into(),
        }
    }

    /// reqwestのエラーを分類（タイムアウトは別扱い）
    pub fn from_transport(service: &'static str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout { service }
        } else {
            Self::Transport { service, source }
        }
    }

    /// 上流の非成功レスポンスを本文付きでエラーにする
    pub async fn from_response(service: &'static str, response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Self::Upstream {
            service,
            status,
            body,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Transport { .. })
    }
}

impl From<GeoError> for AppError {
    fn from(err: GeoError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<RequestError> for AppError {
    fn from(err: RequestError) -> Self {
        Self::Validation(err.to_string())
    }
}

/// エラー時のレスポンス本文
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

/// 処理単位の見出しを付けたエラー
///
/// `error` に利用者向けの見出し、`details` に原因を入れる。
#[derive(Debug)]
pub struct ApiError {
    pub summary: &'static str,
    pub source: AppError,
    pub with_details: bool,
}

impl ApiError {
    pub fn new(summary: &'static str, source: AppError) -> Self {
        Self {
            summary,
            source,
            with_details: true,
        }
    }

    /// detailsを出さない（/validate は `{ error }` のみ返す）
    pub fn terse(summary: &'static str, source: AppError) -> Self {
        Self {
            summary,
            source,
            with_details: false,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.source.status_code();
        if status.is_server_error() {
            tracing::warn!(error = %self.source, "{}", self.summary);
        }

        // 入力エラーはメッセージそのものを見出しにする
        let (error, details) = match &self.source {
            AppError::Validation(msg) => (msg.clone(), None),
            AppError::Configuration(msg) if !self.with_details => (msg.clone(), None),
            other if self.with_details => (self.summary.to_string(), Some(other.to_string())),
            _ => (self.summary.to_string(), None),
        };

        let body = ErrorBody {
            error,
            details,
            retryable: self.source.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        ApiError::new("Request failed", self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            AppError::Validation("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Configuration("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AppError::Timeout { service: "Earth Engine" }.status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AppError::data_shape("OpenAI", "empty").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(AppError::Timeout { service: "OpenAI" }.is_retryable());
        assert!(!AppError::Configuration("missing key".into()).is_retryable());
        assert!(
            !AppError::Upstream {
                service: "OpenAI",
                status: 401,
                body: "bad key".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_upstream_display_carries_status_and_body() {
        let err = AppError::Upstream {
            service: "Earth Engine",
            status: 403,
            body: "permission denied".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("403"));
        assert!(msg.contains("permission denied"));
    }
}
