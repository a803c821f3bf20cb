//! Vision API クライアント - マルチモーダルモデルによる考古学的判定

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::prompt::EVALUATION_PROMPT;
use super::ValidationResult;
use crate::error::{AppError, Result};

pub const DEFAULT_API_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
const MAX_TOKENS: u32 = 1000;
const SERVICE: &str = "OpenAI";

/// Vision APIクライアント
pub struct VisionClient {
    api_key: Option<String>,
    api_url: String,
    model: String,
    http_client: reqwest::Client,
}

impl VisionClient {
    /// 新しいクライアントを作成
    ///
    /// APIキーが無くても作成でき、判定要求の時点で設定エラーになる。
    pub fn new(
        api_key: Option<String>,
        api_url: impl Into<String>,
        model: impl Into<String>,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            http_client,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// 画像（data URI またはURL）を判定
    pub async fn classify(&self, image_url: &str) -> Result<ValidationResult> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::Configuration("OpenAI API key not configured".into()))?;

        let request = ChatRequest {
            model: &self.model,
            messages: vec![Message {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: EVALUATION_PROMPT,
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image_url,
                            detail: "high",
                        },
                    },
                ],
            }],
            max_tokens: MAX_TOKENS,
            response_format: ResponseFormat {
                format_type: "json_object",
            },
        };

        debug!(model = %self.model, image_len = image_url.len(), "sending vision request");

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.api_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::from_transport(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(AppError::from_response(SERVICE, response).await);
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AppError::data_shape(SERVICE, format!("completion response: {}", e)))?;

        // 判定本文を取り出す
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| AppError::data_shape(SERVICE, "no content in model response"))?;

        let result = parse_validation(&content)?;
        info!(
            is_valid = result.is_valid,
            confidence = result.confidence,
            features = result.features.len(),
            "image classified"
        );
        Ok(result)
    }
}

/// モデル出力を `ValidationResult` として厳密に解釈
///
/// 欠落・型違いのフィールドを既定値で埋めることはしない。
pub fn parse_validation(content: &str) -> Result<ValidationResult> {
    let result: ValidationResult = serde_json::from_str(content.trim())
        .map_err(|e| AppError::data_shape(SERVICE, format!("invalid judgment JSON: {}", e)))?;

    if !result.confidence.is_finite() || !(0.0..=100.0).contains(&result.confidence) {
        return Err(AppError::data_shape(
            SERVICE,
            format!("confidence {} is outside 0-100", result.confidence),
        ));
    }
    Ok(result)
}

// Chat Completions リクエスト/レスポンス構造体

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'static str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
    detail: &'static str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    const IMAGE: &str = "data:image/png;base64,iVBORw0KGgo=";

    fn judgment() -> serde_json::Value {
        serde_json::json!({
            "isValid": true,
            "confidence": 72,
            "analysis": "A circular ditch with a causeway is visible in a cleared area.",
            "features": ["circular ditch", "causeway"]
        })
    }

    fn completion(content: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        })
    }

    fn client_for(server: &MockServer, api_key: Option<&str>) -> VisionClient {
        VisionClient::new(
            api_key.map(str::to_string),
            server.base_url(),
            DEFAULT_MODEL,
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_parse_validation() {
        let result = parse_validation(&judgment().to_string()).unwrap();
        assert!(result.is_valid);
        assert_eq!(result.confidence, 72.0);
        assert_eq!(result.features, vec!["circular ditch", "causeway"]);
    }

    #[test]
    fn test_missing_is_valid_is_rejected() {
        let mut value = judgment();
        value.as_object_mut().unwrap().remove("isValid");
        assert!(matches!(
            parse_validation(&value.to_string()),
            Err(AppError::DataShape { .. })
        ));
    }

    #[test]
    fn test_wrong_types_are_rejected() {
        for (field, bad) in [
            ("isValid", serde_json::json!("yes")),
            ("confidence", serde_json::json!("high")),
            ("analysis", serde_json::json!(null)),
            ("features", serde_json::json!("ditch")),
            ("features", serde_json::json!([1, 2])),
        ] {
            let mut value = judgment();
            value[field] = bad;
            assert!(
                parse_validation(&value.to_string()).is_err(),
                "{} should be rejected",
                field
            );
        }
    }

    #[test]
    fn test_confidence_range() {
        let mut value = judgment();
        value["confidence"] = serde_json::json!(140);
        assert!(parse_validation(&value.to_string()).is_err());
        value["confidence"] = serde_json::json!(0);
        assert!(parse_validation(&value.to_string()).is_ok());
    }

    #[test]
    fn test_non_json_content_is_rejected() {
        assert!(matches!(
            parse_validation("The image shows a geoglyph."),
            Err(AppError::DataShape { .. })
        ));
    }

    #[tokio::test]
    async fn test_classify_sends_prompt_and_image() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer sk-test")
                    .body_includes("\"model\":\"gpt-4o\"")
                    .body_includes("\"response_format\":{\"type\":\"json_object\"}")
                    .body_includes("\"detail\":\"high\"")
                    .body_includes(IMAGE);
                then.status(200)
                    .json_body(completion(serde_json::json!(judgment().to_string())));
            })
            .await;

        let result = client_for(&server, Some("sk-test"))
            .classify(IMAGE)
            .await
            .unwrap();
        assert!(result.is_valid);
        assert_eq!(result.features.len(), 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_before_sending() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.path("/chat/completions");
                then.status(200);
            })
            .await;

        let err = client_for(&server, None).classify(IMAGE).await.unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        mock.assert_calls_async(0).await;
    }

    #[tokio::test]
    async fn test_empty_content_is_data_shape_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200)
                    .json_body(completion(serde_json::Value::Null));
            })
            .await;

        let err = client_for(&server, Some("sk-test"))
            .classify(IMAGE)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no content"));
    }

    #[tokio::test]
    async fn test_upstream_failure_is_propagated() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(429).body("{\"error\":{\"message\":\"Rate limit reached\"}}");
            })
            .await;

        let err = client_for(&server, Some("sk-test"))
            .classify(IMAGE)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Upstream { status: 429, .. }));
    }
}
