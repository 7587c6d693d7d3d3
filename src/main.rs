use lingua_trip_backend::config::Config;
use lingua_trip_backend::db::Database;
use lingua_trip_backend::logging;
use lingua_trip_backend::seed;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    let _log_guard = logging::init_tracing(&config);

    let db = match Database::from_env().await {
        Ok(db) => db,
        Err(err) => {
            tracing::error!(error = %err, "database initialization failed");
            std::process::exit(1);
        }
    };

    if let Err(err) = db.migrate().await {
        tracing::error!(error = %err, "schema migration failed");
        std::process::exit(1);
    }

    if let Err(err) = seed::seed_badge_definitions(db.pool()).await {
        tracing::warn!(error = %err, "badge definition seeding failed");
    }

    let seed_demo = std::env::var("SEED_DEMO_DATA")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);
    if seed_demo {
        if let Err(err) = seed::seed_demo_vocabulary(db.pool()).await {
            tracing::warn!(error = %err, "demo vocabulary seeding failed");
        }
    }

    let addr = config.bind_addr();
    let app = lingua_trip_backend::create_app(db, config);

    tracing::info!(%addr, "learning backend listening");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "failed to bind listener");
            std::process::exit(1);
        }
    };

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());

    if let Err(err) = server.await {
        tracing::error!(error = %err, "server error");
    }

    tracing::info!("HTTP server stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
