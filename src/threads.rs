use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::db::{Query, SharedTables};

const THREADS_TABLE: &str = "conversation_threads";

/// Persists conversation history per chat id so that a thread survives
/// restarts and moves between instances.
///
/// Persistence is best effort: without a table client every call is a no-op,
/// and database failures are logged rather than returned.
#[derive(Clone)]
pub struct ThreadStore {
    tables: Option<SharedTables>,
}

impl ThreadStore {
    pub fn new(tables: Option<SharedTables>) -> Self {
        Self { tables }
    }

    pub fn is_enabled(&self) -> bool {
        self.tables.is_some()
    }

    pub async fn load<T: DeserializeOwned>(&self, chat_id: &str) -> Option<Vec<T>> {
        let tables = self.tables.as_ref()?;
        let rows = match tables
            .select(THREADS_TABLE, &Query::select("thread_data").eq("chat_id", chat_id))
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Could not load thread {} from database: {}", chat_id, e);
                return None;
            }
        };

        let data = rows.into_iter().next()?.get("thread_data").cloned()?;
        // older rows hold the history as a JSON-encoded string
        let data = match data {
            Value::String(raw) if !raw.is_empty() => match serde_json::from_str(&raw) {
                Ok(value) => value,
                Err(e) => {
                    warn!("Thread {} holds unreadable history: {}", chat_id, e);
                    return None;
                }
            },
            Value::Null => return None,
            other => other,
        };

        match serde_json::from_value::<Vec<T>>(data) {
            Ok(history) => {
                debug!("Loaded {} messages for thread {}", history.len(), chat_id);
                Some(history)
            }
            Err(e) => {
                warn!("Thread {} history does not match the message format: {}", chat_id, e);
                None
            }
        }
    }

    pub async fn save<T: Serialize>(&self, chat_id: &str, history: &[T]) -> bool {
        let Some(tables) = self.tables.as_ref() else {
            return false;
        };
        let thread_data = match serde_json::to_value(history) {
            Ok(value) => value,
            Err(e) => {
                warn!("Could not serialize thread {}: {}", chat_id, e);
                return false;
            }
        };

        let existing = match tables
            .select(THREADS_TABLE, &Query::select("id").eq("chat_id", chat_id))
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                warn!("Could not save thread {} to database: {}", chat_id, e);
                return false;
            }
        };

        let result = if existing.is_empty() {
            tables
                .insert(
                    THREADS_TABLE,
                    json!({ "chat_id": chat_id, "thread_data": thread_data }),
                )
                .await
        } else {
            tables
                .update(
                    THREADS_TABLE,
                    json!({
                        "thread_data": thread_data,
                        "updated_at": chrono::Utc::now().to_rfc3339(),
                    }),
                    &[("chat_id".to_string(), chat_id.to_string())],
                )
                .await
        };

        match result {
            Ok(_) => true,
            Err(e) => {
                warn!("Could not save thread {} to database: {}", chat_id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryTables;
    use std::sync::Arc;

    fn store_with(rows: Vec<Value>) -> (ThreadStore, Arc<MemoryTables>) {
        let tables = Arc::new(MemoryTables::new().with_table(
            THREADS_TABLE,
            &["id", "chat_id", "thread_data", "updated_at"],
            rows,
        ));
        (ThreadStore::new(Some(tables.clone())), tables)
    }

    #[tokio::test]
    async fn test_save_then_load_round_trip() {
        let (store, tables) = store_with(vec![]);
        let history = vec![json!({"role": "user", "content": "hola"})];

        assert!(store.save("chat-1", &history).await);
        assert!(store.save("chat-1", &history).await);
        assert_eq!(tables.rows(THREADS_TABLE).len(), 1);

        let loaded: Vec<Value> = store.load("chat-1").await.unwrap();
        assert_eq!(loaded, history);
    }

    #[tokio::test]
    async fn test_load_accepts_string_encoded_history() {
        let (store, _) = store_with(vec![json!({
            "id": "t1",
            "chat_id": "chat-2",
            "thread_data": "[{\"role\":\"assistant\",\"content\":\"hi\"}]"
        })]);
        let loaded: Vec<Value> = store.load("chat-2").await.unwrap();
        assert_eq!(loaded[0]["content"], "hi");
    }

    #[tokio::test]
    async fn test_disabled_store_is_silent() {
        let store = ThreadStore::new(None);
        assert!(!store.save("x", &[json!(1)]).await);
        assert!(store.load::<Value>("x").await.is_none());
    }

    #[tokio::test]
    async fn test_missing_table_reports_false() {
        let store = ThreadStore::new(Some(Arc::new(MemoryTables::new())));
        assert!(!store.save("x", &[json!(1)]).await);
        assert!(store.load::<Value>("x").await.is_none());
    }
}
