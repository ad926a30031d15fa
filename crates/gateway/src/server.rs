//! Webhook HTTP server: Meta's subscription handshake and event intake,
//! plus the hosted reply audio the attachments point back at.

use std::sync::Arc;

use {
    axum::{
        Json, Router,
        body::Bytes,
        extract::{Path, Query, State},
        http::{HeaderMap, StatusCode, header},
        response::IntoResponse,
        routing::get,
    },
    secrecy::Secret,
    serde::Deserialize,
    sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    tokio::net::TcpListener,
    tracing::{error, info, warn},
};

use {
    garupa_agent::{LeadNotifier, NotifyOnceRegistrar, OpenAiAgent, SqliteLeadStore},
    garupa_coalesce::{SqliteTurnStore, TurnCoalescer},
    garupa_config::GarupaConfig,
    garupa_handoff::SqliteHandoffStore,
    garupa_instagram::{
        IngressRouter, InstagramClient, WebhookPayload, verify_signature,
        verify_webhook_subscription,
    },
    garupa_voice::{AudioReplyStore, OpenAiSynthesizer, WhisperTranscriber},
};

use crate::pipeline::TurnPipeline;

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub router: IngressRouter,
    /// Token echoed back during the subscription handshake.
    pub verify_token: String,
    /// App secret for payload signature checks; `None` skips them.
    pub app_secret: Option<String>,
    pub media: AudioReplyStore,
}

/// Build the webhook router (shared between production startup and tests).
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/webhook", get(verify_handler).post(webhook_handler))
        .route("/media/audio/{file}", get(media_handler))
        .with_state(state)
}

// ── Handlers ─────────────────────────────────────────────────────────────

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Query parameters of Meta's `GET /webhook` subscription handshake.
#[derive(Debug, Deserialize)]
struct VerifyParams {
    #[serde(default, rename = "hub.mode")]
    mode: String,
    #[serde(default, rename = "hub.verify_token")]
    verify_token: String,
    #[serde(default, rename = "hub.challenge")]
    challenge: String,
}

async fn verify_handler(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> impl IntoResponse {
    match verify_webhook_subscription(
        &params.mode,
        &params.verify_token,
        &params.challenge,
        &state.verify_token,
    ) {
        Some(challenge) => {
            info!("webhook subscription verified");
            (StatusCode::OK, challenge)
        },
        None => (StatusCode::FORBIDDEN, "Verification failed".to_string()),
    }
}

async fn webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Some(secret) = &state.app_secret {
        let signature = headers
            .get("x-hub-signature-256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(&body, signature, secret) {
            warn!("webhook signature check failed");
            return (StatusCode::FORBIDDEN, "Invalid signature");
        }
    }

    // Meta retries deliveries that do not return 200, so a payload this
    // server cannot parse is acknowledged and logged, not rejected.
    match serde_json::from_slice::<WebhookPayload>(&body) {
        Ok(payload) => state.router.process(payload).await,
        Err(e) => warn!(error = %e, "unparseable webhook payload acknowledged"),
    }
    (StatusCode::OK, "RECEIVED")
}

async fn media_handler(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> impl IntoResponse {
    let Some(path) = state.media.resolve(&file).await else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match tokio::fs::read(&path).await {
        Ok(audio) => ([(header::CONTENT_TYPE, "audio/mpeg")], audio).into_response(),
        Err(e) => {
            error!(error = %e, "failed to read reply audio");
            StatusCode::NOT_FOUND.into_response()
        },
    }
}

// ── Server startup ───────────────────────────────────────────────────────

/// Wire every component from config and serve until shutdown.
pub async fn run(config: GarupaConfig) -> anyhow::Result<()> {
    for warning in config.validate() {
        warn!("{warning}");
    }

    let pool = connect_pool(&config.storage.db_path).await?;
    SqliteTurnStore::init(&pool).await?;
    SqliteHandoffStore::init(&pool).await?;
    SqliteLeadStore::init(&pool).await?;

    let api_key = config.openai.api_key.clone().map(Secret::new);

    let mut agent = OpenAiAgent::new(api_key.clone()).with_model(config.agent.model.clone());
    let mut transcriber = WhisperTranscriber::new(api_key.clone());
    let mut synthesizer = OpenAiSynthesizer::new(api_key).with_voice(
        config.voice.reply_model.clone(),
        config.voice.reply_voice.clone(),
    );
    if let Some(base) = &config.openai.api_base {
        agent = agent.with_api_base(base);
        transcriber = transcriber.with_api_base(base);
        synthesizer = synthesizer.with_api_base(base);
    }

    let instagram = InstagramClient::new(Secret::new(config.instagram.access_token.clone()))
        .with_api_version(config.instagram.api_version.clone());

    let mut registrar = NotifyOnceRegistrar::new(Arc::new(SqliteLeadStore::new(pool.clone())));
    if let Some(url) = &config.lead.webhook_url {
        let token = config.lead.webhook_token.clone().map(Secret::new);
        registrar = registrar.with_notifier(LeadNotifier::new(url.clone(), token));
    }

    let handoff = Arc::new(SqliteHandoffStore::new(pool.clone(), config.handoff_ttl()));
    let media = AudioReplyStore::new(&config.storage.media_dir);

    let mut pipeline = TurnPipeline::new(
        Arc::new(agent),
        Arc::new(registrar),
        instagram,
        handoff.clone(),
        Arc::new(transcriber),
        Arc::new(synthesizer),
        media.clone(),
    );
    if config.voice.audio_replies_enabled {
        pipeline = pipeline.with_voice_replies(config.server.public_base_url.clone());
    }

    let coalescer = TurnCoalescer::new(
        Arc::new(SqliteTurnStore::new(pool)),
        Arc::new(pipeline),
        config.quiet_period(),
    );
    let resumed = coalescer.resume().await?;
    if resumed > 0 {
        info!(conversations = resumed, "re-armed interrupted turn buffers");
    }

    let state = AppState {
        router: IngressRouter::new(handoff, coalescer),
        verify_token: config.instagram.verify_token.clone(),
        app_secret: config.instagram.app_secret.clone(),
        media,
    };

    let listener = TcpListener::bind(&config.server.bind).await?;
    info!(addr = %config.server.bind, "gateway listening");
    axum::serve(listener, build_app(state)).await?;
    Ok(())
}

async fn connect_pool(db_path: &str) -> anyhow::Result<sqlx::SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true);
    Ok(SqlitePoolOptions::new().connect_with(options).await?)
}
