use tokio::net::TcpListener;

use chathub::config::Config;
use chathub::state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chathub=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env();
    print_banner(&config);

    let db = chathub::db::create_pool(&config.database_url)
        .await
        .expect("failed to create database pool");

    let state = AppState::new(db, &config);
    let app = chathub::routes::router(state);

    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .expect("failed to bind");

    let actual_port = listener
        .local_addr()
        .expect("failed to get local address")
        .port();
    tracing::info!("listening on 0.0.0.0:{actual_port}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    let limits = &config.limits;

    eprintln!();
    eprintln!("  \x1b[1;36mchathub\x1b[0m \x1b[2mv{version}\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mport\x1b[0m         {}", config.port);
    eprintln!("  \x1b[2mdatabase\x1b[0m     {}", config.database_url);
    eprintln!(
        "  \x1b[2mgateway\x1b[0m      frame {}B, queue {}, idle {}s, ping {}s",
        limits.max_frame_bytes,
        limits.outbound_queue,
        limits.read_timeout.as_secs(),
        limits.ping_interval.as_secs(),
    );
    eprintln!();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
