use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

use crate::store::{SeriesStore, StoreError, WriteRequest};

/// Opens a single `ConnectionManager` that auto-reconnects on failure.
///
/// `ConnectionManager` is cheaply cloneable — every clone shares the same
/// underlying multiplexed TCP connection, so one handle constructed at
/// startup serves the write path and every background retry.
pub async fn connect(url: &str) -> Result<ConnectionManager, StoreError> {
    let client = redis::Client::open(url)?;
    Ok(ConnectionManager::new(client).await?)
}

// ─── RedisStore ──────────────────────────────────────────────────

/// Redis rendition of the partitioned store: one hash per partition
/// (`{table}:{partition_id}`), one field per record member.
pub struct RedisStore {
    conn: ConnectionManager,
    table: String,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager, table: impl Into<String>) -> Self {
        Self {
            conn,
            table: table.into(),
        }
    }

    fn hash_key(&self, partition_id: &str) -> String {
        format!("{}:{}", self.table, partition_id)
    }

    /// Fallback for a capacity-limited pipeline: replay the batch one
    /// item at a time to learn which records the server will still take,
    /// and return the rejected remainder.
    async fn put_each(&self, reqs: &[WriteRequest]) -> Result<Vec<WriteRequest>, StoreError> {
        let mut unprocessed = Vec::new();
        for req in reqs {
            match self.put(req).await {
                Ok(()) => {}
                Err(StoreError::Request(ref e)) if is_capacity_error(e) => {
                    unprocessed.push(req.clone());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(unprocessed)
    }
}

#[async_trait]
impl SeriesStore for RedisStore {
    async fn put(&self, req: &WriteRequest) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("HSET")
            .arg(self.hash_key(&req.partition_id))
            .arg(&req.member)
            .arg(&req.payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn batch_put(&self, reqs: &[WriteRequest]) -> Result<Vec<WriteRequest>, StoreError> {
        let mut conn = self.conn.clone();

        let mut pipe = redis::pipe();
        for req in reqs {
            pipe.cmd("HSET")
                .arg(self.hash_key(&req.partition_id))
                .arg(&req.member)
                .arg(&req.payload)
                .ignore();
        }

        match pipe.query_async::<_, ()>(&mut conn).await {
            Ok(()) => Ok(Vec::new()),
            // Redis rejects whole pipelines under memory pressure; replay
            // per item to split accepted from rejected.
            Err(ref e) if is_capacity_error(e) => {
                debug!(items = reqs.len(), "pipeline hit capacity limit, replaying per item");
                let unprocessed = self.put_each(reqs).await?;
                warn!(
                    items = reqs.len(),
                    unprocessed = unprocessed.len(),
                    "backend accepted batch partially"
                );
                Ok(unprocessed)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Transient capacity conditions: the server is up but will not take
/// more data right now. Everything else is a hard failure.
fn is_capacity_error(e: &redis::RedisError) -> bool {
    e.code() == Some("OOM") || e.kind() == redis::ErrorKind::BusyLoadingError
}
