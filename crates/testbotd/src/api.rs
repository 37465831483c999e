use crate::service::{BotContext, Dispatch};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// HTTP surface of the daemon: a single push webhook endpoint.
///
/// The body size is uncapped so that every push, however large, reaches
/// [`BotContext::handle_push`] and is either run or answered with a rejection.
pub fn router(ctx: Arc<BotContext>) -> Router {
    Router::new()
        .route("/push", post(push_webhook))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Always answers 200; the outcome only ever reaches the chat channel.
pub async fn push_webhook(State(ctx): State<Arc<BotContext>>, body: Bytes) -> StatusCode {
    match ctx.handle_push(&body).await {
        Dispatch::Spawned(_) => debug!("run task spawned"),
        Dispatch::Ignored => debug!("push ignored"),
        Dispatch::Rejected => debug!("push rejected"),
    }
    StatusCode::OK
}
