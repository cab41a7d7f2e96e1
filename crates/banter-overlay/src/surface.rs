//! Capture surface served to broadcast software.
//!
//! | Route | Response |
//! |---|---|
//! | `GET /health` | `{status, uptime_secs, overlays}` |
//! | `GET /overlay?owner=<id>` | transparent HTML page |
//! | `GET /overlay/ws?owner=<id>` | WebSocket of [`RenderFrame`]s |
//!
//! A request without a non-blank `owner` is rejected with `400`.

use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json, Response};
use axum::routing::get;
use banter_core::ids::{ClientId, ItemId, OwnerId};
use banter_settings::Animation;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::hub::OverlayHub;
use crate::presentation::{DisplayWindow, Phase};

const PAGE: &str = include_str!("../assets/overlay.html");

/// One rendering instruction for the capture page.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderFrame {
    /// Presentation phase.
    pub phase: Phase,
    /// Card fully shown.
    pub visible: bool,
    /// Card text; absent when idle.
    pub text: Option<String>,
    /// Entry/exit animation.
    pub animation: Animation,
    /// Active item.
    pub item_id: Option<ItemId>,
}

impl RenderFrame {
    /// Build the frame for `window`.
    pub fn new(window: &DisplayWindow, animation: Animation) -> Self {
        Self {
            phase: window.phase,
            visible: window.visible(),
            text: window.text().map(str::to_owned),
            animation,
            item_id: window.item.as_ref().map(|item| item.id.clone()),
        }
    }
}

/// `/health` body.
#[derive(Clone, Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// Seconds since the surface started.
    pub uptime_secs: u64,
    /// Running overlays.
    pub overlays: usize,
}

#[derive(Clone)]
struct SurfaceState {
    hub: Arc<OverlayHub>,
    started: Instant,
}

#[derive(Debug, Deserialize)]
struct OwnerQuery {
    owner: Option<String>,
}

impl OwnerQuery {
    fn owner(&self) -> Result<OwnerId, Response> {
        self.owner
            .as_deref()
            .map(str::trim)
            .filter(|owner| !owner.is_empty())
            .map(OwnerId::from)
            .ok_or_else(|| (StatusCode::BAD_REQUEST, "missing owner query parameter").into_response())
    }
}

/// Build the surface router.
pub fn router(hub: Arc<OverlayHub>) -> Router {
    let state = SurfaceState {
        hub,
        started: Instant::now(),
    };
    Router::new()
        .route("/health", get(health_handler))
        .route("/overlay", get(page_handler))
        .route("/overlay/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the surface on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    hub: Arc<OverlayHub>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "capture surface listening");
    }
    axum::serve(listener, router(hub))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// GET /health
async fn health_handler(State(state): State<SurfaceState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started.elapsed().as_secs(),
        overlays: state.hub.len(),
    })
}

/// GET /overlay
async fn page_handler(Query(query): Query<OwnerQuery>) -> Response {
    match query.owner() {
        Ok(_) => Html(PAGE).into_response(),
        Err(rejection) => rejection,
    }
}

/// GET /overlay/ws
async fn ws_handler(
    State(state): State<SurfaceState>,
    Query(query): Query<OwnerQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let owner = match query.owner() {
        Ok(owner) => owner,
        Err(rejection) => return rejection,
    };
    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| stream_window(socket, state.hub, owner)),
        Err(rejection) => rejection.into_response(),
    }
}

/// Push render frames to one capture client until it goes away.
async fn stream_window(mut socket: WebSocket, hub: Arc<OverlayHub>, owner: OwnerId) {
    let client_id = ClientId::generate();
    let client = match hub.attach(&owner).await {
        Ok(client) => client,
        Err(error) => {
            warn!(owner = %owner, client = %client_id, error = %error, "cannot attach capture client");
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
    };
    info!(owner = %owner, client = %client_id, "capture client connected");

    let animation = client.overlay().settings().animation;
    let mut window = client.watch();
    loop {
        let frame = RenderFrame::new(&window.borrow_and_update(), animation);
        let Ok(text) = serde_json::to_string(&frame) else {
            break;
        };
        if socket.send(Message::Text(text.into())).await.is_err() {
            break;
        }

        tokio::select! {
            changed = window.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                None | Some(Err(_) | Ok(Message::Close(_))) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!(owner = %owner, client = %client_id, "capture client disconnected");
    drop(client);
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::tests::{Loopback, hub_with, prefs_api};
    use axum::body::Body;
    use axum::http::Request;
    use banter_api::OverlayPreferences;
    use banter_core::messages::DisplayableItem;
    use futures::StreamExt;
    use std::time::Duration;
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message as ClientMessage;
    use tower::ServiceExt;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn app() -> Router {
        let connector = Arc::new(Loopback::default());
        router(hub_with(prefs_api(OverlayPreferences::default(), 0), &connector))
    }

    async fn get(uri: &str) -> Response {
        app()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let resp = get("/health").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 10_000).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["overlays"], 0);
        assert!(parsed["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn page_requires_owner() {
        assert_eq!(get("/overlay").await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(get("/overlay?owner=%20").await.status(), StatusCode::BAD_REQUEST);

        let resp = get("/overlay?owner=o1").await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), 100_000).await.unwrap();
        let html = String::from_utf8(body.to_vec()).unwrap();
        assert!(html.contains("background: transparent"));
        assert!(html.contains("/overlay/ws?owner="));
    }

    #[tokio::test]
    async fn socket_requires_owner() {
        assert_eq!(get("/overlay/ws").await.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        assert_eq!(get("/nope").await.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn render_frame_shape() {
        let window = DisplayWindow {
            phase: Phase::Showing,
            item: Some(DisplayableItem::new("x1", "Hello!")),
        };
        let json = serde_json::to_value(RenderFrame::new(&window, Animation::Slide)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "phase": "showing",
                "visible": true,
                "text": "Hello!",
                "animation": "slide",
                "itemId": "x1"
            })
        );

        let idle = serde_json::to_value(RenderFrame::new(&DisplayWindow::default(), Animation::Fade)).unwrap();
        assert_eq!(idle["visible"], false);
        assert!(idle["text"].is_null());
    }

    async fn next_frame<S>(ws: &mut S) -> serde_json::Value
    where
        S: futures::Stream<Item = Result<ClientMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        loop {
            let msg = timeout(TIMEOUT, ws.next()).await.unwrap().unwrap().unwrap();
            if let ClientMessage::Text(text) = msg {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn streams_window_over_websocket() {
        let connector = Arc::new(Loopback::default());
        let hub = hub_with(prefs_api(OverlayPreferences::default(), 1), &connector);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve(listener, Arc::clone(&hub), shutdown.clone()));

        let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/overlay/ws?owner=o1"))
            .await
            .unwrap();
        let idle = next_frame(&mut ws).await;
        assert_eq!(idle["phase"], "idle");
        assert_eq!(idle["visible"], false);
        assert_eq!(hub.len(), 1);

        timeout(TIMEOUT, async {
            while connector.servers.lock().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        connector
            .push(r#"{"type":"new_item","data":{"id":"x1","banterText":"Hello!"}}"#)
            .await;

        let shown = next_frame(&mut ws).await;
        assert_eq!(shown["phase"], "showing");
        assert_eq!(shown["text"], "Hello!");
        assert_eq!(shown["itemId"], "x1");
        assert_eq!(shown["animation"], "fade");

        drop(ws);
        timeout(TIMEOUT, async {
            while !hub.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        shutdown.cancel();
        timeout(TIMEOUT, server).await.unwrap().unwrap().unwrap();
    }
}
