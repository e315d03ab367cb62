//! Shared map walkthrough.
//!
//! Opens two handles on one shared map, writes through one and reads through
//! the other, then releases both. The map is deleted with the last release.
//!
//! # Usage
//!
//! ```bash
//! # In-process store
//! shared-map --shared=sessions
//!
//! # Against a server, configured from a JSON file and REDMAP_* variables
//! REDMAP_HOST=10.0.0.7 shared-map --backend=redis --config=redmap.json
//! ```

use redmap::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    Mem,
    #[cfg(feature = "redis")]
    Redis,
}

#[derive(Debug)]
struct Args {
    backend: Backend,
    config: Option<String>,
    shared: Option<String>,
}

fn parse_args() -> Result<Args, MapError> {
    let mut args = Args {
        backend: Backend::Mem,
        config: None,
        shared: None,
    };

    for arg in std::env::args().skip(1) {
        if let Some(backend) = arg.strip_prefix("--backend=") {
            args.backend = match backend {
                "mem" => Backend::Mem,
                #[cfg(feature = "redis")]
                "redis" => Backend::Redis,
                other => return Err(MapError::Config(format!("unknown backend: {}", other))),
            };
        } else if let Some(path) = arg.strip_prefix("--config=") {
            args.config = Some(path.to_string());
        } else if let Some(name) = arg.strip_prefix("--shared=") {
            args.shared = Some(name.to_string());
        } else {
            return Err(MapError::Config(format!("unrecognized argument: {}", arg)));
        }
    }

    Ok(args)
}

fn load_config(args: &Args) -> Result<MapConfig, MapError> {
    let config = match &args.config {
        Some(path) => MapConfig::load(path)?,
        None => MapConfig::default(),
    };
    let mut config = config.with_env_overrides()?;
    if let Some(name) = &args.shared {
        config.shared_name = Some(name.clone());
    }
    if config.shared_name.is_none() {
        config.shared_name = Some("shared-map-demo".to_string());
    }
    Ok(config)
}

async fn open_store(backend: Backend, config: &MapConfig) -> Result<Store, MapError> {
    let store = match backend {
        Backend::Mem => Store::in_memory(),
        #[cfg(feature = "redis")]
        Backend::Redis => redmap::store::RedisStore::connect(config).await?.into(),
    };
    tracing::info!(?backend, target = %config.url(), "store ready");
    Ok(store)
}

#[tokio::main]
async fn main() -> Result<(), MapError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,redmap=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    let config = load_config(&args)?;
    let store = open_store(args.backend, &config).await?;

    let mut a = RemoteMap::open(store.clone(), &config).await?;
    a.put("one", "1").await?;
    a.put("two", "2").await?;

    let mut b = RemoteMap::open(store, &config).await?;
    tracing::info!(
        key = b.key(),
        holders = ?b.holders().await?,
        size = b.size().await?,
        "second handle opened"
    );

    b.put("one", "100").await?;
    tracing::info!(one = ?a.get("one").await?, "first handle sees the update");

    let snapshot = b.snapshot().await?;
    let mut entries: Vec<_> = snapshot.into_iter().collect();
    entries.sort();
    for (key, value) in &entries {
        println!("{} = {}", key, value);
    }

    a.release().await?;
    tracing::info!(holders = ?b.holders().await?, "first handle released");
    b.release().await?;
    tracing::info!("last handle released, map deleted");

    Ok(())
}
