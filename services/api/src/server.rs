use crate::cli::ServeArgs;
use crate::demo::{demo_users, seed_demo};
use crate::infra::{reference_data, AppState};
use crate::routes::{api_routes, with_operational_routes};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use chrono::Local;
use mvj::auth::UserDirectory;
use mvj::config::AppConfig;
use mvj::credit_integration::bureau_from_config;
use mvj::error::AppError;
use mvj::http::PageDefaults;
use mvj::store::MemoryStore;
use mvj::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(MemoryStore::new());
    let users = if config.api.seed_demo {
        let seed = seed_demo(&store, Local::now().date_naive())?;
        info!(lease = %seed.lease.identifier, invoices = seed.invoices.len(), "demo data seeded");
        demo_users()
    } else {
        store.seed(reference_data()?)?;
        UserDirectory::new()
    };

    let bureau = bureau_from_config(&config.credit_bureau)?;

    let app = with_operational_routes(api_routes(store, bureau))
        .layer(Extension(app_state))
        .layer(Extension(Arc::new(users)))
        .layer(Extension(PageDefaults(config.api.default_page_size)))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        credit_bureau_mock = config.credit_bureau.mock,
        "land lease service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
