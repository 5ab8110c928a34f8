//! Nonce and session Redis operations.
//!
//! Redis key patterns:
//! - `nonce:{wallet}`: pending sign-in nonce (JSON)
//! - `session:{token}`: session data (JSON)
//!
//! Values read back from Redis are wrapped in `Zeroizing` so the raw JSON
//! (which carries the nonce or token) is wiped once deserialized.

use crate::models::{StoredNonce, StoredSession, WalletAddress};
use redis::AsyncCommands;
use zeroize::Zeroizing;

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, redis::RedisError> {
    serde_json::to_string(value).map_err(|e| {
        redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "JSON serialize",
            e.to_string(),
        ))
    })
}

fn from_json<T: serde::de::DeserializeOwned>(data: String) -> Result<T, redis::RedisError> {
    let data = Zeroizing::new(data);
    serde_json::from_str(&data).map_err(|e| {
        redis::RedisError::from((
            redis::ErrorKind::TypeError,
            "JSON deserialize",
            e.to_string(),
        ))
    })
}

/// Store a nonce for `wallet` with TTL, replacing any pending one.
pub async fn store_nonce<C>(
    con: &mut C,
    wallet: &WalletAddress,
    nonce: &StoredNonce,
    ttl_secs: u64,
) -> Result<(), redis::RedisError>
where
    C: AsyncCommands,
{
    let key = format!("nonce:{}", wallet);
    con.set_ex::<_, _, ()>(&key, to_json(nonce)?, ttl_secs)
        .await?;
    Ok(())
}

/// Get and delete a nonce atomically (single-use).
///
/// Uses a Lua script so two concurrent verifies cannot both consume it.
pub async fn take_nonce<C>(
    con: &mut C,
    wallet: &WalletAddress,
) -> Result<Option<StoredNonce>, redis::RedisError>
where
    C: AsyncCommands,
{
    let key = format!("nonce:{}", wallet);

    let script = redis::Script::new(
        r"
        local val = redis.call('GET', KEYS[1])
        if val then
            redis.call('DEL', KEYS[1])
        end
        return val
        ",
    );

    let json: Option<String> = script.key(&key).invoke_async(con).await?;
    json.map(from_json).transpose()
}

/// Store a session in Redis with TTL.
pub async fn store_session<C>(
    con: &mut C,
    session: &StoredSession,
    ttl_secs: u64,
) -> Result<(), redis::RedisError>
where
    C: AsyncCommands,
{
    let key = format!("session:{}", session.token);
    con.set_ex::<_, _, ()>(&key, to_json(session)?, ttl_secs)
        .await?;
    Ok(())
}

/// Get a session by token.
pub async fn get_session<C>(
    con: &mut C,
    token: &str,
) -> Result<Option<StoredSession>, redis::RedisError>
where
    C: AsyncCommands,
{
    let key = format!("session:{}", token);
    let json: Option<String> = con.get(&key).await?;
    json.map(from_json).transpose()
}

/// Delete a session. Returns true if it existed.
pub async fn delete_session<C>(con: &mut C, token: &str) -> Result<bool, redis::RedisError>
where
    C: AsyncCommands,
{
    let key = format!("session:{}", token);
    let deleted: i32 = con.del(&key).await?;
    Ok(deleted > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::unix_now_secs;

    #[test]
    fn test_malformed_json_is_type_error() {
        let err = from_json::<StoredNonce>("{not json".to_string()).unwrap_err();
        assert_eq!(err.kind(), redis::ErrorKind::TypeError);
    }

    async fn test_connection() -> Option<redis::aio::MultiplexedConnection> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let client = redis::Client::open(redis_url).ok()?;
        client.get_multiplexed_async_connection().await.ok()
    }

    #[tokio::test]
    async fn test_nonce_is_single_use() {
        let Some(mut con) = test_connection().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let wallet = WalletAddress::new(format!("unit-{}", crate::auth::generate_session_token()));
        let nonce = StoredNonce {
            nonce: "abc".to_string(),
            created_at: unix_now_secs(),
        };
        store_nonce(&mut con, &wallet, &nonce, 30).await.unwrap();

        let taken = take_nonce(&mut con, &wallet).await.unwrap().unwrap();
        assert_eq!(taken.nonce, "abc");
        assert!(take_nonce(&mut con, &wallet).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_session_roundtrip_and_delete() {
        let Some(mut con) = test_connection().await else {
            eprintln!("Skipping test: Redis not available");
            return;
        };

        let session = StoredSession {
            token: crate::auth::generate_session_token(),
            wallet: WalletAddress::new("wallet-1"),
            created_at: unix_now_secs(),
        };
        store_session(&mut con, &session, 30).await.unwrap();

        let loaded = get_session(&mut con, &session.token).await.unwrap().unwrap();
        assert_eq!(loaded.wallet, session.wallet);

        assert!(delete_session(&mut con, &session.token).await.unwrap());
        assert!(!delete_session(&mut con, &session.token).await.unwrap());
        assert!(get_session(&mut con, &session.token).await.unwrap().is_none());
    }
}
