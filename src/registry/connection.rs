use crate::deadline::Deadline;
use crate::error::AppError;
use crate::store::{Backend, Connection};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Owns the one shared backend connection, opened on first use.
pub struct ConnectionManager {
    address: String,
    backend: Arc<dyn Backend>,
    connection: OnceCell<Arc<dyn Connection>>,
}

impl ConnectionManager {
    pub fn new(address: impl Into<String>, backend: Arc<dyn Backend>) -> Self {
        ConnectionManager {
            address: address.into(),
            backend,
            connection: OnceCell::new(),
        }
    }

    /// The shared connection. The first caller connects; concurrent callers wait for that
    /// attempt. A failed attempt is not cached.
    pub async fn get_connection(&self, deadline: &Deadline) -> Result<Arc<dyn Connection>, AppError> {
        if let Some(conn) = self.connection.get() {
            return Ok(conn.clone());
        }
        deadline
            .run("connect", async {
                self.connection
                    .get_or_try_init(|| async {
                        tracing::info!("opening shared backend connection");
                        self.backend.connect(&self.address).await
                    })
                    .await
                    .cloned()
            })
            .await
    }

    pub fn is_connected(&self) -> bool {
        self.connection.initialized()
    }
}
