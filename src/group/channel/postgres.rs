//! PostgreSQL `LISTEN`/`NOTIFY` backed [`Channel`] (§4.6), for groups whose
//! members run as separate processes (the `sync-postgres` feature).
//!
//! `tokio_postgres`'s notification stream only delivers while its
//! `Connection` future is being driven, so this backend keeps one dedicated,
//! long-lived connection per instance solely for `LISTEN` and reconnects it
//! in the background; `NOTIFY` calls go through a pooled `deadpool_postgres`
//! client instead, since those are ordinary one-shot queries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use deadpool_postgres::{Config as PoolConfig, Pool, Runtime as PoolRuntime};
use tokio_postgres::{AsyncMessage, NoTls};
use tracing::warn;

use crate::error::{Result, ServiceUnavailableError};
use crate::group::payload::Payload;
use crate::group::channel::Channel;

/// A group channel backed by Postgres `LISTEN`/`NOTIFY`.
///
/// `publish` issues `SELECT pg_notify($1, $2)` through a connection pool;
/// delivery to this process's own subscribers follows the same at-most-once
/// contract as [`super::InProcessChannel`] (§4.6 "Delivery semantics").
pub struct PostgresChannel {
    name: String,
    pool: Pool,
    runtime: tokio::runtime::Handle,
    subscribers: Arc<Mutex<Vec<Sender<Payload>>>>,
    shutdown: Arc<AtomicBool>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl PostgresChannel {
    /// Connects to `connection_string` and starts listening on `name` in
    /// the background. `runtime` drives both the listener task and every
    /// `publish` call's pooled query.
    pub fn connect(
        name: impl Into<String>,
        connection_string: &str,
        runtime: tokio::runtime::Handle,
    ) -> Result<Self> {
        let name = name.into();

        let mut pool_config = PoolConfig::new();
        pool_config.url = Some(connection_string.to_string());
        let pool = pool_config
            .create_pool(Some(PoolRuntime::Tokio1), NoTls)
            .map_err(|err| ServiceUnavailableError::Channel(err.to_string()))?;

        let subscribers: Arc<Mutex<Vec<Sender<Payload>>>> = Arc::new(Mutex::new(Vec::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let listener = spawn_listener(
            runtime.clone(),
            connection_string.to_string(),
            name.clone(),
            Arc::clone(&subscribers),
            Arc::clone(&shutdown),
        );

        Ok(Self {
            name,
            pool,
            runtime,
            subscribers,
            shutdown,
            listener: Mutex::new(Some(listener)),
        })
    }
}

impl Channel for PostgresChannel {
    /// Blocks the calling thread on the `NOTIFY` query via `runtime`. Call
    /// this from a plain sync context (as [`crate::group::RobotGroup`]
    /// does); calling it from inside `runtime` itself panics, per
    /// [`tokio::runtime::Handle::block_on`].
    fn publish(&self, payload: Payload) -> Result<()> {
        let json = serde_json::to_string(&payload)
            .map_err(|err| ServiceUnavailableError::Channel(err.to_string()))?;
        let pool = self.pool.clone();
        let channel = self.name.clone();
        self.runtime.block_on(async move {
            let client = pool
                .get()
                .await
                .map_err(|err| ServiceUnavailableError::Channel(err.to_string()))?;
            client
                .execute("SELECT pg_notify($1, $2)", &[&channel, &json])
                .await
                .map_err(|err| ServiceUnavailableError::Channel(err.to_string()))?;
            Ok::<(), ServiceUnavailableError>(())
        })?;
        Ok(())
    }

    fn subscribe(&self) -> Receiver<Payload> {
        let (sender, receiver) = unbounded();
        self.subscribers
            .lock()
            .expect("postgres channel subscriber lock poisoned")
            .push(sender);
        receiver
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for PostgresChannel {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.listener.lock().expect("listener handle lock poisoned").take() {
            let _ = handle.join();
        }
    }
}

/// Runs the reconnect-and-listen loop on a dedicated thread, forwarding
/// every `Notification` on `channel_name` to `subscribers`. Reconnects on
/// any connection error; `shutdown` is checked between attempts, not
/// mid-connection, so a drop can take up to one reconnect delay to settle.
fn spawn_listener(
    runtime: tokio::runtime::Handle,
    connection_string: String,
    channel_name: String,
    subscribers: Arc<Mutex<Vec<Sender<Payload>>>>,
    shutdown: Arc<AtomicBool>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        runtime.block_on(async move {
            while !shutdown.load(Ordering::SeqCst) {
                if let Err(err) = listen_once(&connection_string, &channel_name, &subscribers, &shutdown).await {
                    warn!(channel = %channel_name, error = %err, "postgres listener reconnecting");
                }
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            }
        });
    })
}

async fn listen_once(
    connection_string: &str,
    channel_name: &str,
    subscribers: &Arc<Mutex<Vec<Sender<Payload>>>>,
    shutdown: &Arc<AtomicBool>,
) -> std::result::Result<(), tokio_postgres::Error> {
    let (client, mut connection) = tokio_postgres::connect(connection_string, NoTls).await?;
    client.batch_execute(&format!("LISTEN {channel_name}")).await?;

    while !shutdown.load(Ordering::SeqCst) {
        match std::future::poll_fn(|cx| connection.poll_message(cx)).await {
            Some(Ok(AsyncMessage::Notification(note))) => {
                if note.channel() != channel_name {
                    continue;
                }
                match serde_json::from_str::<Payload>(note.payload()) {
                    Ok(payload) => {
                        let mut subs = subscribers.lock().expect("postgres channel subscriber lock poisoned");
                        subs.retain(|sender| sender.send(payload).is_ok());
                    }
                    Err(err) => warn!(channel = %channel_name, error = %err, "dropping malformed notification payload"),
                }
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => return Err(err),
            None => return Ok(()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeId, RobotId};

    #[test]
    fn notification_payload_roundtrips_through_json() {
        let payload = Payload::added(NodeId::new(), RobotId::new());
        let json = serde_json::to_string(&payload).unwrap();
        let restored: Payload = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.node_id, payload.node_id);
        assert_eq!(restored.origin_robot_id, payload.origin_robot_id);
    }
}
