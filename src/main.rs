use order_payments::bus::redis_stream::RedisStreamPublisher;
use order_payments::config::AppConfig;
use order_payments::decision::random::RandomApproval;
use order_payments::http::handlers::ops::OpsState;
use order_payments::http::{ops_router, payments_router};
use order_payments::repo::payments_repo::PaymentsRepo;
use order_payments::service::lookup_service::PaymentLookup;
use order_payments::service::order_placed_consumer::OrderPlacedConsumer;
use order_payments::service::stream_worker::StreamWorker;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cfg = AppConfig::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(cfg.db_max_connections)
        .connect(&cfg.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let redis_client = redis::Client::open(cfg.redis_url.clone())?;
    let store = Arc::new(PaymentsRepo::new(pool.clone(), cfg.publish_lease()));

    let consumer = OrderPlacedConsumer::new(
        store.clone(),
        Arc::new(RedisStreamPublisher::new(
            redis_client.clone(),
            cfg.payment_processed_stream.clone(),
        )),
        Arc::new(RandomApproval {
            approval_percent: cfg.approval_percent,
        }),
    );

    if cfg.consumer_workers == 0 {
        tracing::warn!("CONSUMER_WORKERS=0, order placed consumer disabled");
    } else {
        for slot in 0..cfg.consumer_workers {
            let worker = StreamWorker::for_slot(&cfg, consumer.clone(), redis_client.clone(), slot);
            if slot == 0 {
                worker.ensure_group().await?;
            }
            tokio::spawn(worker.run());
        }
    }

    let app = payments_router(PaymentLookup::new(store)).merge(ops_router(OpsState {
        pool,
        redis_client,
    }));

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr).await?;
    tracing::info!("listening on {}", cfg.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
