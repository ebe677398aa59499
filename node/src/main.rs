use birthmark::certificate::{decode_roots, TrustedRoots};
use birthmark::keytable::{decode_tables, KeyTableStore};
use birthmark::types::TABLE_COUNT_PILOT;
use birthmark::Validator;
use birthmark_node::config::NodeConfig;
use birthmark_node::pipeline::Pipeline;
use birthmark_node::server::{build_router, AppState};
use birthmark_node::telemetry;
use birthmark_node::validator_backend::ValidatorBackend;
use birthmark_registry::HashRegistry;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() {
    telemetry::init_telemetry();

    let cfg = NodeConfig::from_env();
    tracing::info!("Initializing Birthmark node with config: {:?}", cfg);

    let registry = Arc::new(
        HashRegistry::open(&cfg.registry_dir).expect("failed to open registry directory"),
    );

    let validator = if cfg.remote_validator.is_none() {
        let store = match &cfg.key_table_path {
            Some(path) => {
                let bytes = std::fs::read(path).expect("failed to read key table file");
                let tables = decode_tables(&bytes).expect("failed to decode key table file");
                KeyTableStore::new(tables)
            }
            None => {
                tracing::warn!(
                    "No key table configured; generating an ephemeral pilot-scale table"
                );
                KeyTableStore::generate(TABLE_COUNT_PILOT)
            }
        };
        let roots = match &cfg.trusted_roots_path {
            Some(path) => {
                let bytes = std::fs::read(path).expect("failed to read trusted roots file");
                decode_roots(&bytes).expect("failed to decode trusted roots file")
            }
            None => {
                tracing::warn!("No trusted roots configured; every certificate will FAIL");
                TrustedRoots::new()
            }
        };
        Some(Arc::new(Validator::new(Arc::new(store), roots)))
    } else {
        None
    };

    let backend = match (&cfg.remote_validator, &validator) {
        (Some(url), _) => {
            tracing::info!(endpoint = %url, "using remote validator");
            ValidatorBackend::remote(url.clone(), cfg.validator_timeout)
        }
        (None, Some(v)) => ValidatorBackend::local(v.clone()),
        (None, None) => unreachable!("local validator constructed above"),
    };

    let pipeline = Arc::new(Pipeline::new(
        backend,
        registry.clone(),
        cfg.storage_retries,
        cfg.retry_backoff,
    ));

    let app = build_router(
        AppState {
            pipeline,
            registry,
            validator,
        },
        cfg.auth_token.clone(),
    );

    let addr = cfg.bind_addr;
    tracing::info!("Listening on {}", addr);
    let listener = TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}
