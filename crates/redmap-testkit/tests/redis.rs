//! Conformance suite against a live server.
//!
//! Ignored by default. Point `REDMAP_HOST`/`REDMAP_PORT` at a disposable
//! server and run with `--features redis -- --ignored`.

#![cfg(feature = "redis")]

use redmap_core::{MapConfig, Store, redis::RedisStore};
use redmap_testkit as kit;

async fn connect() -> Store {
    let config = MapConfig::default()
        .with_env_overrides()
        .expect("invalid REDMAP_* environment");
    RedisStore::connect(&config)
        .await
        .expect("failed to connect to redis")
        .into()
}

#[tokio::test]
#[ignore = "needs a running redis server"]
async fn redis_conformance() {
    kit::init_tracing();
    let store = connect().await;
    kit::run_all(|| store.clone()).await;
}

#[tokio::test]
#[ignore = "needs a running redis server"]
async fn redis_last_release_deletes_many() {
    let store = connect().await;
    kit::run_last_release_deletes(store, 8).await;
}
