mod app;
mod config;
mod ctx;
mod errors;
mod extract;
mod notes;
mod state;

use std::net::SocketAddr;

use app::AppParams;
pub use config::config;
pub use errors::{Error, Result};
use state::AppState;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> errors::Result<()> {
    let config = config();

    notesync_core::logging::setup_tracing(
        "notesync_mock_api=debug,tower_http=debug,axum::rejection=trace",
        config.log_json,
    );

    let app = app::create(AppParams {
        state: AppState::seeded(),
        router: notes::router,
    });
    let app = app::add_tracing_layer(app);

    let port = config.port;
    let listener = TcpListener::bind(format!("0.0.0.0:{port}")).await?;

    tracing::info!("API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
