use bson::Uuid;
use log::{info, warn};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

/// Time-to-live of cache entries in seconds.
///
/// Safety net against any missed invalidation: staleness is bounded by this TTL.
pub const CACHE_TTL_SECONDS: u64 = 300;

/// Scope of a cached read, determining the key prefix used for bulk invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
    /// Review list views of a product.
    ProductReviews,
    /// Review list views of a user.
    UserReviews,
    /// The rating aggregate of a product.
    Rating,
}

impl CacheScope {
    pub fn prefix(&self) -> &'static str {
        match self {
            CacheScope::ProductReviews => "product-reviews",
            CacheScope::UserReviews => "user-reviews",
            CacheScope::Rating => "rating",
        }
    }
}

/// Builds the composite cache key: scope prefix, entity id, serialized view parameters.
fn cache_key(scope: CacheScope, id: Uuid, params: &str) -> String {
    format!("{}:{}:{}", scope.prefix(), id, params)
}

/// Coordinates the read-through cache and its invalidation.
///
/// The cache is never authoritative: every failure is logged and swallowed, and
/// a coordinator built without a reachable Redis simply serves misses.
#[derive(Clone)]
pub struct CacheCoordinator {
    connection: Option<ConnectionManager>,
}

impl CacheCoordinator {
    /// Connects to Redis, degrading to a disabled coordinator when unreachable.
    pub async fn connect(uri: &str) -> Self {
        let manager = match Client::open(uri) {
            Ok(client) => ConnectionManager::new(client).await,
            Err(err) => Err(err),
        };
        match manager {
            Ok(connection) => {
                info!("Connected to Redis cache.");
                Self {
                    connection: Some(connection),
                }
            }
            Err(err) => {
                warn!("Redis cache unreachable, serving without cache: {}", err);
                Self { connection: None }
            }
        }
    }

    /// A coordinator without a backing cache. Every read is a miss.
    pub fn disabled() -> Self {
        Self { connection: None }
    }

    /// Retrieves a cached entry, treating every failure as a miss.
    pub async fn get(&self, scope: CacheScope, id: Uuid, params: &str) -> Option<String> {
        let mut connection = self.connection.clone()?;
        let key = cache_key(scope, id, params);
        match connection.get::<_, Option<String>>(&key).await {
            Ok(value) => value,
            Err(err) => {
                warn!("Reading cache key `{}` failed: {}", key, err);
                None
            }
        }
    }

    /// Stores an entry with the bounded TTL. Failures are logged and swallowed.
    pub async fn put(&self, scope: CacheScope, id: Uuid, params: &str, value: &str) {
        let Some(mut connection) = self.connection.clone() else {
            return;
        };
        let key = cache_key(scope, id, params);
        if let Err(err) = connection
            .set_ex::<_, _, ()>(&key, value, CACHE_TTL_SECONDS)
            .await
        {
            warn!("Writing cache key `{}` failed: {}", key, err);
        }
    }

    /// Evicts every cached entry of the scope for the entity.
    ///
    /// Uses SCAN MATCH over `{prefix}:{id}:*` so list views with any filter/sort
    /// parameters are dropped together. Must never fail the triggering write, so
    /// all errors are logged and swallowed.
    pub async fn invalidate(&self, scope: CacheScope, id: Uuid) {
        let Some(mut connection) = self.connection.clone() else {
            return;
        };
        let pattern = format!("{}:{}:*", scope.prefix(), id);
        let mut cursor = 0u64;
        let mut keys_to_delete: Vec<String> = Vec::new();
        loop {
            let scanned: Result<(u64, Vec<String>), redis::RedisError> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut connection)
                .await;
            match scanned {
                Ok((next_cursor, keys)) => {
                    keys_to_delete.extend(keys);
                    cursor = next_cursor;
                    if cursor == 0 {
                        break;
                    }
                }
                Err(err) => {
                    warn!("Scanning cache pattern `{}` failed: {}", pattern, err);
                    return;
                }
            }
        }
        if keys_to_delete.is_empty() {
            return;
        }
        if let Err(err) = connection.del::<_, ()>(keys_to_delete).await {
            warn!("Invalidating cache pattern `{}` failed: {}", pattern, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_scope_id_params() {
        let id = Uuid::new();
        let key = cache_key(CacheScope::ProductReviews, id, "first=10:skip=0");
        assert_eq!(key, format!("product-reviews:{}:first=10:skip=0", id));
        let key = cache_key(CacheScope::Rating, id, "current");
        assert_eq!(key, format!("rating:{}:current", id));
    }

    #[tokio::test]
    async fn disabled_coordinator_serves_misses_and_swallows_writes() {
        let cache = CacheCoordinator::disabled();
        let id = Uuid::new();
        cache.put(CacheScope::Rating, id, "current", "{}").await;
        assert!(cache.get(CacheScope::Rating, id, "current").await.is_none());
        cache.invalidate(CacheScope::Rating, id).await;
    }
}
