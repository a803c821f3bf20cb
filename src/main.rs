//! ジオグリフ探索サーバー - メインエントリポイント

use std::sync::Arc;

use anyhow::{Context, Result};
use geoglyph_scout::api::{AppState, create_router};
use geoglyph_scout::config::AppConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 環境変数の読み込み
    dotenvy::dotenv().ok();

    // ロギング初期化
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().context("設定の読み込みに失敗")?;
    let state = AppState::from_config(&config).context("クライアントの初期化に失敗")?;
    let app = create_router(Arc::new(state));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("{} へのバインドに失敗", config.bind_addr))?;

    tracing::info!(addr = %config.bind_addr, "listening");
    tracing::info!("GET  /satellite?lat=<deg>&lon=<deg>&buffer=<meters>");
    tracing::info!("POST /validate {{ \"imageUrl\": <data-uri> }}");
    tracing::info!("GET  /candidates");

    axum::serve(listener, app).await.context("サーバーエラー")?;
    Ok(())
}
