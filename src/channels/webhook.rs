//! SMS webhook channel.
//!
//! Accepts the form posts a messaging provider sends for inbound texts
//! (`From`, `Body`) and answers with a TwiML `<Response>` document. An
//! empty `<Response />` tells the provider not to reply at all.

use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::State,
    http::header,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::dispatcher::Dispatcher;

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Inbound message form fields.
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Body")]
    pub body: String,
}

/// Handler state.
#[derive(Clone)]
pub struct WebhookState {
    pub dispatcher: Arc<Dispatcher>,
}

/// Build the webhook router (`POST /hook`, `GET /health`).
pub fn webhook_routes(dispatcher: Arc<Dispatcher>) -> Router {
    let state = WebhookState { dispatcher };

    Router::new()
        .route("/hook", post(hook))
        .route("/health", get(health))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

/// Bind `port` on all interfaces and serve the webhook until the process exits.
pub async fn serve(port: u16, dispatcher: Arc<Dispatcher>) -> crate::error::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "Webhook server started");
    axum::serve(listener, webhook_routes(dispatcher)).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "checkin-dispatch"
    }))
}

async fn hook(
    State(state): State<WebhookState>,
    Form(message): Form<InboundMessage>,
) -> impl IntoResponse {
    let reply = state.dispatcher.reply(&message.from, &message.body).await;
    (
        [(header::CONTENT_TYPE, "application/xml")],
        messaging_response(reply.as_deref()),
    )
}

/// Render a TwiML messaging response; `None` renders an empty response.
pub fn messaging_response(message: Option<&str>) -> String {
    match message {
        Some(text) => format!(
            "{XML_DECLARATION}<Response><Message>{}</Message></Response>",
            escape_xml(text)
        ),
        None => format!("{XML_DECLARATION}<Response />"),
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_message() {
        assert_eq!(
            messaging_response(Some("Check-in successful! Check-in ID: 0123456789ab")),
            r#"<?xml version="1.0" encoding="UTF-8"?><Response><Message>Check-in successful! Check-in ID: 0123456789ab</Message></Response>"#
        );
    }

    #[test]
    fn renders_empty_response_for_no_reply() {
        assert_eq!(
            messaging_response(None),
            r#"<?xml version="1.0" encoding="UTF-8"?><Response />"#
        );
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_xml(r#"<a & 'b' "c">"#),
            "&lt;a &amp; &apos;b&apos; &quot;c&quot;&gt;"
        );
    }
}
