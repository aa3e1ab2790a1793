// Cartlink - Server Node
// Node link listener (line protocol) + budget-aware web view with Axum

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Json},
    routing::{get, post},
    Router,
};
use cartlink::{
    encode, load_catalog, CartView, Frame, LineBuffer, ServerNode, Settings, DEFAULT_CONFIG_FILE,
};
use clap::Parser;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "cartlink-server", version = cartlink::VERSION)]
#[command(about = "Server node: mirrors the scanner's cart and tracks the budget")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// CSV catalog with tag,name,price rows (overrides config)
    #[arg(long)]
    catalog: Option<PathBuf>,
}

/// Shared application state
#[derive(Clone)]
struct AppState {
    node: Arc<Mutex<ServerNode>>,
    /// Frames for whichever scanner is connected
    outbound: mpsc::UnboundedSender<Frame>,
}

impl AppState {
    fn node(&self) -> MutexGuard<'_, ServerNode> {
        self.node.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Deserialize)]
struct BudgetRequest {
    amount: Decimal,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/cart - Mirrored cart with budget status
async fn get_cart(State(state): State<AppState>) -> impl IntoResponse {
    let view = state.node().view();
    Json(ApiResponse::ok(view))
}

/// POST /api/budget - Replace the session budget
async fn set_budget(
    State(state): State<AppState>,
    Json(request): Json<BudgetRequest>,
) -> impl IntoResponse {
    let result = {
        let mut node = state.node();
        node.submit_budget(request.amount)
            .map(|frame| (frame, node.view()))
    };

    match result {
        Ok((frame, view)) => {
            // No scanner connected is fine: the budget still applies here
            let _ = state.outbound.send(frame);
            (StatusCode::OK, Json(ApiResponse::<CartView>::ok(view))).into_response()
        }
        Err(error) => {
            tracing::warn!(%error, "budget rejected");
            (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<CartView>::err(error.to_string())),
            )
                .into_response()
        }
    }
}

const INDEX_HTML: &str = include_str!("../web/index.html");

/// GET / - Serve index.html
async fn serve_index() -> impl IntoResponse {
    Html(INDEX_HTML)
}

// ============================================================================
// Node Link
// ============================================================================

async fn write_frame(writer: &mut OwnedWriteHalf, frame: &Frame) -> std::io::Result<()> {
    let line = encode(frame);
    tracing::debug!(frame = line.trim_end(), "send");
    writer.write_all(line.as_bytes()).await
}

/// Serve one scanner until it disconnects
async fn serve_scanner(
    stream: TcpStream,
    state: &AppState,
    outbound: &mut mpsc::UnboundedReceiver<Frame>,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut buffer = LineBuffer::new();
    let mut chunk = [0u8; 512];

    loop {
        tokio::select! {
            read = reader.read(&mut chunk) => {
                let read = match read {
                    Ok(0) => return,
                    Ok(read) => read,
                    Err(error) => {
                        tracing::warn!(%error, "link read failed");
                        return;
                    }
                };

                buffer.push(&chunk[..read]);
                let Some(line) = buffer.take_latest() else {
                    continue;
                };

                let replies = state.node().handle_line(&line);
                for frame in replies {
                    if let Err(error) = write_frame(&mut writer, &frame).await {
                        tracing::warn!(%error, "link write failed");
                        return;
                    }
                }
            }
            Some(frame) = outbound.recv() => {
                if let Err(error) = write_frame(&mut writer, &frame).await {
                    tracing::warn!(%error, "link write failed");
                    return;
                }
            }
        }
    }
}

async fn run_link(listener: TcpListener, state: AppState, mut outbound: mpsc::UnboundedReceiver<Frame>) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(error) => {
                tracing::warn!(%error, "link accept failed");
                continue;
            }
        };

        // Signals queued while no scanner was listening are stale
        while outbound.try_recv().is_ok() {}

        if let Err(error) = stream.set_nodelay(true) {
            tracing::debug!(%error, "set_nodelay failed");
        }
        tracing::info!(%peer, "scanner connected");
        serve_scanner(stream, &state, &mut outbound).await;
        tracing::info!(%peer, "scanner disconnected");
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cartlink=info,cartlink_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    println!("🌐 Cartlink - Server Node v{}", cartlink::VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut settings = Settings::load(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    if let Some(catalog) = cli.catalog {
        settings.server.catalog_path = Some(catalog);
    }
    let server = settings.server;

    let catalog = load_catalog(server.catalog_path.as_deref()).context("Failed to load catalog")?;
    println!("✓ Catalog loaded: {} items", catalog.len());

    let node = ServerNode::new(catalog).with_low_percent(server.low_budget_percent);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let state = AppState {
        node: Arc::new(Mutex::new(node)),
        outbound: outbound_tx,
    };

    // Node link
    let link_listener = TcpListener::bind(&server.link_addr)
        .await
        .with_context(|| format!("Failed to bind link address {}", server.link_addr))?;
    println!("✓ Scanner link listening on {}", server.link_addr);
    tokio::spawn(run_link(link_listener, state.clone(), outbound_rx));

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/cart", get(get_cart))
        .route("/budget", post(set_budget))
        .with_state(state);

    // Build main router
    let app = Router::new()
        .route("/", get(serve_index))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = TcpListener::bind(&server.http_addr)
        .await
        .with_context(|| format!("Failed to bind web address {}", server.http_addr))?;

    println!("\n🚀 Web view running on http://{}", server.http_addr);
    println!("   API: http://{}/api/cart", server.http_addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await.context("Web server failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_renders_link_text_as_text() {
        // Item names arrive unchecked from the scanner link
        assert!(!INDEX_HTML.contains("innerHTML"));
        assert!(INDEX_HTML.contains("textContent"));
    }
}
