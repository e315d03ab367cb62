use ::redis::aio::MultiplexedConnection;
use ::redis::{Client, cmd};

use crate::{MapConfig, MapError, ScanPage};

use super::StoreBackend;

/// Redis backend over a multiplexed tokio connection.
///
/// Commands are pipelined over one socket; each call clones the connection
/// handle, so the store itself needs no lock.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    target: String,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Connect to the server named by `config.host` and `config.port`.
    pub async fn connect(config: &MapConfig) -> Result<Self, MapError> {
        let target = config.url();
        tracing::debug!(%target, "connecting to redis");
        let client = Client::open(target.as_str())?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self { conn, target })
    }

    /// Wrap an already established connection.
    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        Self {
            conn,
            target: "<existing connection>".to_string(),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl StoreBackend for RedisStore {
    async fn hlen(&self, key: &str) -> Result<usize, MapError> {
        let mut conn = self.conn.clone();
        let len: usize = cmd("HLEN").arg(key).query_async(&mut conn).await?;
        Ok(len)
    }

    async fn hexists(&self, key: &str, field: &str) -> Result<bool, MapError> {
        let mut conn = self.conn.clone();
        let exists: bool = cmd("HEXISTS").arg(key).arg(field).query_async(&mut conn).await?;
        Ok(exists)
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, MapError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = cmd("HGET").arg(key).arg(field).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), MapError> {
        let mut conn = self.conn.clone();
        let _added: i64 = cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn hset_many(&self, key: &str, entries: &[(String, String)]) -> Result<(), MapError> {
        let mut conn = self.conn.clone();
        let mut command = cmd("HSET");
        command.arg(key);
        for (field, value) in entries {
            command.arg(field).arg(value);
        }
        let _added: i64 = command.query_async(&mut conn).await?;
        Ok(())
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool, MapError> {
        let mut conn = self.conn.clone();
        let removed: i64 = cmd("HDEL").arg(key).arg(field).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn del(&self, key: &str) -> Result<bool, MapError> {
        let mut conn = self.conn.clone();
        let removed: i64 = cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(removed > 0)
    }

    async fn hscan(&self, key: &str, cursor: &str, count: usize) -> Result<ScanPage, MapError> {
        let mut conn = self.conn.clone();
        // Reply: [next-cursor, [field, value, field, value, ...]]
        let (cursor, flat): (String, Vec<String>) = cmd("HSCAN")
            .arg(key)
            .arg(cursor)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        if flat.len() % 2 != 0 {
            return Err(MapError::communication(format!(
                "HSCAN returned an odd number of items ({})",
                flat.len()
            )));
        }

        let mut entries = Vec::with_capacity(flat.len() / 2);
        let mut items = flat.into_iter();
        while let (Some(field), Some(value)) = (items.next(), items.next()) {
            entries.push((field, value));
        }

        Ok(ScanPage { cursor, entries })
    }
}
