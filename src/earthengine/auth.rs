//! Google Cloud 認証処理 - サービスアカウントJWTによるアクセストークン取得

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{AppError, Result};

/// Earth Engine 読み取り専用スコープ
pub const EARTH_ENGINE_SCOPE: &str = "https://www.googleapis.com/auth/earthengine.readonly";

pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// 残り時間がこれを切ったトークンは使わない
pub const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

const JWT_LIFETIME_SECS: i64 = 3600;
const SERVICE: &str = "Google OAuth";

/// サービスアカウントの鍵ファイル（JSON）
#[derive(Debug, Deserialize)]
struct KeyFile {
    client_email: String,
    private_key: String,
    #[serde(default)]
    token_uri: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
}

/// サービスアカウントの認証情報
#[derive(Clone)]
pub struct ServiceAccountKey {
    client_email: String,
    token_uri: String,
    project_id: Option<String>,
    encoding_key: EncodingKey,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    /// メールアドレスとPEM秘密鍵から作成
    ///
    /// どちらかが欠けている、または鍵が読めない場合はネットワークに出る前に失敗する。
    pub fn from_parts(client_email: Option<&str>, private_key: Option<&str>) -> Result<Self> {
        let client_email = client_email
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| {
                AppError::Configuration("Earth Engine service account email is not set".into())
            })?;
        let private_key = private_key
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                AppError::Configuration("Earth Engine private key is not set".into())
            })?;

        Self::build(client_email, private_key, None, None)
    }

    /// 鍵ファイルの中身（JSON）から作成
    pub fn from_json(json: &str) -> Result<Self> {
        let file: KeyFile = serde_json::from_str(json).map_err(|e| {
            AppError::Configuration(format!("service account key file is malformed: {}", e))
        })?;
        Self::build(
            &file.client_email,
            &file.private_key,
            file.token_uri,
            file.project_id,
        )
    }

    /// 鍵ファイルを読み込む
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            AppError::Configuration(format!(
                "cannot read service account key file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&json)
    }

    fn build(
        client_email: &str,
        private_key: &str,
        token_uri: Option<String>,
        project_id: Option<String>,
    ) -> Result<Self> {
        let pem = normalize_private_key(private_key);
        let encoding_key = EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| {
            AppError::Configuration(format!(
                "Earth Engine private key is not a valid RSA PEM: {}",
                e
            ))
        })?;

        Ok(Self {
            client_email: client_email.to_string(),
            token_uri: token_uri.unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string()),
            project_id,
            encoding_key,
        })
    }

    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = token_uri.into();
        self
    }

    pub fn client_email(&self) -> &str {
        &self.client_email
    }

    pub fn token_uri(&self) -> &str {
        &self.token_uri
    }

    /// プロジェクトID（鍵ファイル指定がなければメールアドレスから推定）
    pub fn project_id(&self) -> Option<&str> {
        self.project_id
            .as_deref()
            .or_else(|| project_from_email(&self.client_email))
    }

    /// 署名済みJWTアサーションを作成
    fn sign_assertion(&self, scope: &str) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            iss: &self.client_email,
            scope,
            aud: &self.token_uri,
            exp: now + JWT_LIFETIME_SECS,
            iat: now,
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| AppError::Configuration(format!("failed to sign JWT assertion: {}", e)))
    }
}

/// 環境変数に入った秘密鍵の `\n` を実際の改行に戻す
pub fn normalize_private_key(raw: &str) -> String {
    raw.trim()
        .trim_matches('"')
        .replace("\\r\\n", "\n")
        .replace("\\n", "\n")
}

/// `name@project.iam.gserviceaccount.com` からプロジェクトIDを取り出す
pub fn project_from_email(email: &str) -> Option<&str> {
    let (_, domain) = email.split_once('@')?;
    let project = domain.strip_suffix(".iam.gserviceaccount.com")?;
    (!project.is_empty()).then_some(project)
}

/// JWTクレーム
#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    exp: i64,
    iat: i64,
}

/// アクセストークンレスポンス
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// 有効期限付きのアクセストークン
#[derive(Debug, Clone)]
pub struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    /// 期限が `Instant` で表せないほど先なら `None`
    pub fn new(value: impl Into<String>, expires_in: Duration) -> Option<Self> {
        Some(Self {
            value: value.into(),
            expires_at: Instant::now().checked_add(expires_in)?,
        })
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// 余裕を持って有効かどうか
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        !self.value.is_empty() && self.expires_at > now + TOKEN_REFRESH_MARGIN
    }
}

/// アクセストークンのキャッシュ
///
/// 初回取得が同時に走った場合は両方がトークンを取得し、後勝ちで保存される。
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: RwLock<Option<AccessToken>>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 期限内のトークンがあれば返す
    pub async fn fresh(&self) -> Option<String> {
        let slot = self.slot.read().await;
        slot.as_ref()
            .filter(|t| t.is_fresh_at(Instant::now()))
            .map(|t| t.value.clone())
    }

    pub async fn store(&self, token: AccessToken) {
        let mut slot = self.slot.write().await;
        *slot = Some(token);
    }

    pub async fn clear(&self) {
        let mut slot = self.slot.write().await;
        *slot = None;
    }
}

/// サービスアカウントによるトークン発行
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    scope: String,
    cache: Arc<TokenCache>,
    http_client: reqwest::Client,
}

impl ServiceAccountAuth {
    pub fn new(
        key: ServiceAccountKey,
        http_client: reqwest::Client,
        cache: Arc<TokenCache>,
    ) -> Self {
        Self {
            key,
            scope: EARTH_ENGINE_SCOPE.to_string(),
            cache,
            http_client,
        }
    }

    pub fn key(&self) -> &ServiceAccountKey {
        &self.key
    }

    /// キャッシュ済みトークンを破棄（上流が401を返したとき）
    pub async fn invalidate(&self) {
        self.cache.clear().await;
    }

    /// アクセストークンを取得（キャッシュあり）
    pub async fn access_token(&self) -> Result<String> {
        // キャッシュされたトークンがあれば使用
        if let Some(token) = self.cache.fresh().await {
            return Ok(token);
        }

        // 新しいトークンを取得してキャッシュに保存
        let token = self.exchange().await?;
        let value = token.value().to_string();
        self.cache.store(token).await;

        Ok(value)
    }

    /// JWTをトークンエンドポイントでアクセストークンに交換
    async fn exchange(&self) -> Result<AccessToken> {
        let jwt = self.key.sign_assertion(&self.scope)?;
        debug!(client_email = %self.key.client_email, "requesting access token");

        let response = self
            .http_client
            .post(&self.key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::from_transport(SERVICE, e))?;

        if !response.status().is_success() {
            return Err(AppError::from_response(SERVICE, response).await);
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::data_shape(SERVICE, format!("token response: {}", e)))?;

        let access_token = token_response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::data_shape(SERVICE, "token response has no access_token"))?;
        let expires_in_secs = token_response.expires_in.unwrap_or(3600);
        let token = AccessToken::new(access_token, Duration::from_secs(expires_in_secs))
            .ok_or_else(|| {
                let reason = format!("expires_in {} out of range", expires_in_secs);
                AppError::data_shape(SERVICE, reason)
            })?;

        info!(expires_in_secs, "obtained access token");
        Ok(token)
    }
}
