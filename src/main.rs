//! Order payments service entry point.

use std::sync::Arc;

use axum::http::{HeaderValue, Method};
use axum::Router;
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use order_payments::adapters::http::{payment_router, PaymentAppState};
use order_payments::adapters::notifications::TracingNotificationDispatcher;
use order_payments::adapters::paypal::PayPalGateway;
use order_payments::adapters::postgres::{
    PostgresOrderRepository, PostgresPaymentStore, PostgresUserDirectory,
};
use order_payments::adapters::stripe::StripeGateway;
use order_payments::application::{
    GatewayRegistry, OrderStatusSynchronizer, PaymentNotifier, ReconcileStalePaymentsCommand,
    ReconcileStalePaymentsHandler,
};
use order_payments::config::{AppConfig, ReconciliationConfig, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    init_tracing(&config.server);
    config.validate()?;

    tracing::info!(
        environment = ?config.server.environment,
        stripe_test_mode = config.payment.stripe.is_test_mode(),
        "Starting order payments service"
    );

    // 1. Database
    let pool = config.database.pool_options().connect(&config.database.url).await?;
    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Migrations applied");
    }

    // 2. Ports
    let state = build_state(&config, pool)?;

    // 3. Stale payment sweep
    if config.reconciliation.enabled {
        spawn_sweep(&config.reconciliation, &state);
    }

    // 4. HTTP
    let app = router(&config.server, state);
    let addr = config.server.socket_addr()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(server.log_level.as_str()));

    if server.json_logs() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .init();
    }
}

fn build_state(
    config: &AppConfig,
    pool: PgPool,
) -> Result<PaymentAppState, Box<dyn std::error::Error>> {
    let store = Arc::new(PostgresPaymentStore::new(pool.clone()));
    let orders = Arc::new(PostgresOrderRepository::new(pool.clone()));
    let users = Arc::new(PostgresUserDirectory::new(pool));

    let gateways = GatewayRegistry::new()
        .with_gateway(Arc::new(StripeGateway::new(config.payment.stripe_config())?))
        .with_gateway(Arc::new(PayPalGateway::new(config.payment.paypal_config())?));

    let notifier = PaymentNotifier::new(
        Arc::new(TracingNotificationDispatcher::new()),
        orders.clone(),
        users,
    )
    .with_timeout(config.payment.notification_timeout());

    let sync = OrderStatusSynchronizer::new(orders.clone(), store.clone())
        .with_gateways(gateways.clone());

    Ok(PaymentAppState {
        store,
        orders,
        gateways,
        sync: Arc::new(sync),
        notifier: Arc::new(notifier),
    })
}

fn spawn_sweep(config: &ReconciliationConfig, state: &PaymentAppState) {
    let handler = ReconcileStalePaymentsHandler::new(
        state.store.clone(),
        state.gateways.clone(),
        state.sync.clone(),
        state.notifier.clone(),
        config.policy(),
    );
    let period = config.interval();

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match handler.handle(ReconcileStalePaymentsCommand::default()).await {
                Ok(result) if result.examined > 0 => {
                    tracing::info!(
                        examined = result.examined,
                        completed = result.completed,
                        failed = result.failed,
                        cancelled = result.cancelled,
                        errors = result.errors,
                        "Stale payment sweep finished"
                    );
                }
                Ok(_) => tracing::debug!("Stale payment sweep found nothing"),
                Err(e) => tracing::error!(error = %e, "Stale payment sweep failed"),
            }
        }
    });
    tracing::info!(interval_secs = period.as_secs(), "Stale payment sweep scheduled");
}

fn router(server: &ServerConfig, state: PaymentAppState) -> Router {
    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();
    let cors = if origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(origins)
    }
    .allow_methods([Method::GET, Method::POST]);

    payment_router()
        .with_state(state)
        .layer(TimeoutLayer::new(server.request_timeout()))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
