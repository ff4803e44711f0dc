pub mod rig_agent;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rig::message::Message;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::events::StreamEvent;
use crate::models::{ChatRequest, ChatResponse};
use crate::threads::ThreadStore;
use crate::tools::{ToolContext, ToolServices};

pub use rig_agent::RigMenuAgent;

pub const MENU_CREATOR_PREAMBLE: &str = r#"
You are MenuCreator, an assistant that turns a restaurant's web presence into a polished, mobile-friendly HTML menu.

Workflow:
1. Analyze the restaurant website with AnalyzeWebsiteStyles to learn its colors, fonts, imagery and layout.
2. Find the menu with FindMenuFiles. PDF menus are converted to page images for you.
3. Screenshot menu pages with TakeMenuScreenshots when the menu is a web page.
4. Look at the menu images with UploadMenuImages, and at candidate logos or photos with PreviewImageFromURL.
5. Design a Mustache template that matches the restaurant's style. Use {{restaurantName}} and the
   {{#categories}} section with {{categoryName}}, {{categoryDescription}} and {{#items}}
   ({{itemName}}, {{itemDescription}}, {{itemPrice}}, {{itemCurrency}}).
6. Save it with SaveHTMLFile. Refine it with ReadHTMLPart and UpdateHTMLFile.
7. Fill it with real data using PopulateMenuFromDB and review the screenshot you get back.
8. Store the final HTML with SaveMenuToDB.

Rules:
- Never invent prices or dishes. Data comes from the database.
- Keep the layout readable on phones. Saved HTML is made mobile-friendly automatically.
- When a tool returns a message starting with "Error", explain the problem or try another approach.
- Keep replies short and tell the user what you did and what comes next.
"#;

/// Produces the assistant's reply for one user message.
///
/// `history` holds the thread so far and is extended in place with this
/// turn's messages.
#[async_trait]
pub trait ChatAgent: Send + Sync {
    async fn respond(
        &self,
        history: &mut Vec<Message>,
        message: &str,
        ctx: ToolContext,
    ) -> anyhow::Result<String>;
}

#[derive(Default)]
struct ThreadSession {
    history: Vec<Message>,
    loaded: bool,
}

type SharedSession = Arc<tokio::sync::Mutex<ThreadSession>>;

/// Threads kept in memory before idle ones are dropped.
pub const DEFAULT_SESSION_CAPACITY: usize = 1000;

struct RegistryEntry {
    session: SharedSession,
    last_used: u64,
}

/// Conversation threads known to this process.
///
/// Holds at most `capacity` threads plus any still in use. Past that, the
/// least recently used idle threads are dropped; they reload from the thread
/// store on their next turn.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, RegistryEntry>>,
    clock: AtomicU64,
    capacity: usize,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SESSION_CAPACITY)
    }
}

impl SessionRegistry {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            clock: AtomicU64::new(0),
            capacity,
        }
    }

    fn session(&self, thread_id: &str) -> SharedSession {
        let mut sessions = match self.sessions.lock() {
            Ok(sessions) => sessions,
            Err(_) => {
                warn!("Session registry lock poisoned, thread {} runs unshared", thread_id);
                return SharedSession::default();
            }
        };
        let tick = self.clock.fetch_add(1, Ordering::Relaxed);
        let entry = sessions
            .entry(thread_id.to_string())
            .or_insert_with(|| RegistryEntry {
                session: SharedSession::default(),
                last_used: tick,
            });
        entry.last_used = tick;
        let session = entry.session.clone();

        if sessions.len() > self.capacity {
            Self::evict_idle(&mut sessions, self.capacity);
        }
        session
    }

    fn evict_idle(sessions: &mut HashMap<String, RegistryEntry>, capacity: usize) {
        let mut idle: Vec<(String, u64)> = sessions
            .iter()
            .filter(|(_, entry)| Arc::strong_count(&entry.session) == 1)
            .map(|(id, entry)| (id.clone(), entry.last_used))
            .collect();
        idle.sort_unstable_by_key(|(_, last_used)| *last_used);

        let excess = sessions.len().saturating_sub(capacity);
        for (id, _) in idle.into_iter().take(excess) {
            sessions.remove(&id);
            debug!("Dropped idle thread {} from memory", id);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, thread_id: &str) -> bool {
        self.sessions
            .lock()
            .map(|s| s.contains_key(thread_id))
            .unwrap_or_default()
    }
}

/// Runs chat turns against the agent, one at a time per thread.
pub struct ChatService {
    agent: Arc<dyn ChatAgent>,
    services: Arc<ToolServices>,
    threads: ThreadStore,
    sessions: SessionRegistry,
}

impl ChatService {
    pub fn new(agent: Arc<dyn ChatAgent>, services: Arc<ToolServices>, threads: ThreadStore) -> Self {
        Self {
            agent,
            services,
            threads,
            sessions: SessionRegistry::default(),
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub async fn run_turn(
        &self,
        request: &ChatRequest,
        events: Option<UnboundedSender<StreamEvent>>,
    ) -> anyhow::Result<ChatResponse> {
        let thread_id = request
            .thread_id()
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let session = self.sessions.session(&thread_id);
        let mut session = session.lock().await;
        if !session.loaded {
            if let Some(history) = self.threads.load::<Message>(&thread_id).await {
                info!("Loaded {} messages for thread {}", history.len(), thread_id);
                session.history = history;
            }
            session.loaded = true;
        }

        let ctx = ToolContext::new(self.services.clone(), request.menu_id(), events);
        let mut history = session.history.clone();
        let response = self
            .agent
            .respond(&mut history, &request.message, ctx)
            .await?;

        session.history = history;
        if self.threads.is_enabled() && !self.threads.save(&thread_id, &session.history).await {
            warn!("Thread {} was not persisted", thread_id);
        }

        Ok(ChatResponse {
            response,
            thread_id,
        })
    }
}


#[cfg(test)]
mod tests {
    use super::testing::EchoAgent;
    use super::*;
    use crate::db::memory::MemoryTables;
    use crate::db::SharedTables;

    fn request(message: &str, thread_id: Option<&str>) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            thread_id: thread_id.map(str::to_string),
            menu_id: Some("menu-1".to_string()),
        }
    }

    fn service(dir: &std::path::Path, tables: Option<SharedTables>) -> ChatService {
        let services = crate::tools::testing::services(dir, None);
        ChatService::new(Arc::new(EchoAgent), services, ThreadStore::new(tables))
    }

    #[tokio::test]
    async fn test_new_thread_gets_uuid_and_history_accumulates() {
        let dir = tempfile::tempdir().unwrap();
        let chat = service(dir.path(), None);

        let first = chat.run_turn(&request("hola", None), None).await.unwrap();
        assert!(uuid::Uuid::parse_str(&first.thread_id).is_ok());
        assert_eq!(first.response, "echo #1: hola");

        let second = chat
            .run_turn(&request("otra", Some(&first.thread_id)), None)
            .await
            .unwrap();
        assert_eq!(second.thread_id, first.thread_id);
        assert_eq!(second.response, "echo #2: otra");
        assert_eq!(chat.sessions().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_turn_leaves_history_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let chat = service(dir.path(), None);

        chat.run_turn(&request("uno", Some("t")), None).await.unwrap();
        assert!(chat.run_turn(&request("fail", Some("t")), None).await.is_err());
        let next = chat.run_turn(&request("dos", Some("t")), None).await.unwrap();
        assert_eq!(next.response, "echo #2: dos");
    }

    #[test]
    fn test_registry_drops_least_recently_used_idle_threads() {
        let registry = SessionRegistry::with_capacity(2);
        registry.session("a");
        registry.session("b");
        registry.session("a");
        registry.session("c");

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("a"));
        assert!(!registry.contains("b"));
        assert!(registry.contains("c"));
    }

    #[test]
    fn test_registry_keeps_threads_in_use() {
        let registry = SessionRegistry::with_capacity(1);
        let busy = registry.session("busy");
        registry.session("x");
        registry.session("y");

        assert!(registry.contains("busy"));
        assert!(registry.contains("y"));
        assert_eq!(registry.len(), 2);

        drop(busy);
        registry.session("z");
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("z"));
    }

    #[tokio::test]
    async fn test_evicted_thread_reloads_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let tables: SharedTables = Arc::new(MemoryTables::new().with_table(
            "conversation_threads",
            &["id", "chat_id", "thread_data", "updated_at"],
            vec![],
        ));
        let services = crate::tools::testing::services(dir.path(), None);
        let mut chat = ChatService::new(Arc::new(EchoAgent), services, ThreadStore::new(Some(tables)));
        chat.sessions = SessionRegistry::with_capacity(1);

        chat.run_turn(&request("uno", Some("first")), None).await.unwrap();
        chat.run_turn(&request("otro", Some("second")), None).await.unwrap();
        assert!(!chat.sessions().contains("first"));

        let reply = chat.run_turn(&request("dos", Some("first")), None).await.unwrap();
        assert_eq!(reply.response, "echo #2: dos");
    }

    #[tokio::test]
    async fn test_history_is_persisted_and_reloaded() {
        let dir = tempfile::tempdir().unwrap();
        let tables: SharedTables = Arc::new(MemoryTables::new().with_table(
            "conversation_threads",
            &["id", "chat_id", "thread_data", "updated_at"],
            vec![],
        ));

        let chat = service(dir.path(), Some(tables.clone()));
        chat.run_turn(&request("hola", Some("persisted")), None).await.unwrap();

        // a fresh process sees the saved history
        let restarted = service(dir.path(), Some(tables));
        let reply = restarted
            .run_turn(&request("sigo", Some("persisted")), None)
            .await
            .unwrap();
        assert_eq!(reply.response, "echo #2: sigo");
    }

    #[tokio::test]
    async fn test_menu_id_and_events_reach_the_agent() {
        let dir = tempfile::tempdir().unwrap();
        let chat = service(dir.path(), None);
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        chat.run_turn(&request("hola", None), Some(tx)).await.unwrap();
        match rx.recv().await {
            Some(StreamEvent::ToolCall { arguments, .. }) => assert_eq!(arguments["menu_id"], "menu-1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
