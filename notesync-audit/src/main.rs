mod config;
mod errors;
mod handlers;

use axum::Router;
pub use config::config;
pub use errors::{Error, Result};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{self, TraceLayer},
};

fn add_tracing_layer(app: Router) -> Router {
    app.layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(trace::DefaultMakeSpan::new().include_headers(false))
                    .on_response(trace::DefaultOnResponse::new().include_headers(false))
                    .on_failure(trace::DefaultOnFailure::new()),
            ),
    )
}

#[tokio::main]
async fn main() -> errors::Result<()> {
    let config = config();

    notesync_core::logging::setup_tracing("notesync_audit=info,tower_http=info", config.log_json);

    let app = add_tracing_layer(handlers::router());

    let listener = TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;

    tracing::info!("audit function listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
