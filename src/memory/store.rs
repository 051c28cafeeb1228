//! 会话记忆存储：session id -> 记忆窗口
//!
//! - 同一会话的对话交换通过 `begin_exchange` 串行化（每会话一把异步互斥锁）
//! - 不同会话互不阻塞：全局表只在查找/插入时短暂持锁，从不跨 await 持有
//! - 一次交换结束时 `append_exchange` 在同一写锁内追加 user + assistant 两条，保证原子
//! - 空闲超过 TTL 且没有进行中交换的会话由 `evict_idle` 整体回收

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::memory::{Message, MessageWindow};

struct SessionState {
    window: MessageWindow,
    last_active: Instant,
}

struct SessionEntry {
    state: RwLock<SessionState>,
    /// 交换锁：持有期间同一会话的其他交换排队等待
    exchange: Arc<Mutex<()>>,
}

impl SessionEntry {
    fn new(capacity: usize) -> Self {
        Self {
            state: RwLock::new(SessionState {
                window: MessageWindow::new(capacity),
                last_active: Instant::now(),
            }),
            exchange: Arc::new(Mutex::new(())),
        }
    }
}

/// 进行中交换的凭证；drop 时释放该会话的交换锁
pub struct ExchangeGuard {
    session_id: String,
    _lock: OwnedMutexGuard<()>,
}

impl ExchangeGuard {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }
}

impl std::fmt::Debug for ExchangeGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeGuard")
            .field("session_id", &self.session_id)
            .finish()
    }
}

/// 会话记忆管理器（进程内，重启即丢失）
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, Arc<SessionEntry>>>,
    max_messages: usize,
}

impl MemoryStore {
    pub fn new(max_messages: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_messages,
        }
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    async fn entry(&self, session_id: &str) -> Arc<SessionEntry> {
        if let Some(entry) = self.sessions.read().await.get(session_id) {
            return entry.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(SessionEntry::new(self.max_messages)))
            .clone()
    }

    /// 读取会话历史；未知会话返回空，不会创建窗口
    pub async fn get(&self, session_id: &str) -> Vec<Message> {
        let entry = self.sessions.read().await.get(session_id).cloned();
        match entry {
            Some(entry) => entry.state.read().await.window.messages().to_vec(),
            None => Vec::new(),
        }
    }

    /// 追加单条消息（首次访问时创建窗口）
    pub async fn append(&self, session_id: &str, message: Message) {
        let entry = self.entry(session_id).await;
        let mut state = entry.state.write().await;
        state.window.push(message);
        state.last_active = Instant::now();
    }

    /// 原子追加一次完整交换（user + assistant）
    pub async fn append_exchange(&self, session_id: &str, user: Message, assistant: Message) {
        let entry = self.entry(session_id).await;
        let mut state = entry.state.write().await;
        state.window.push(user);
        state.window.push(assistant);
        state.last_active = Instant::now();
    }

    /// 获取会话交换锁；同一会话的交换按到达顺序串行执行
    pub async fn begin_exchange(&self, session_id: &str) -> ExchangeGuard {
        let entry = self.entry(session_id).await;
        let lock = entry.exchange.clone().lock_owned().await;
        entry.state.write().await.last_active = Instant::now();
        ExchangeGuard {
            session_id: session_id.to_string(),
            _lock: lock,
        }
    }

    pub async fn clear(&self, session_id: &str) {
        if let Some(entry) = self.sessions.read().await.get(session_id).cloned() {
            entry.state.write().await.window.clear();
        }
    }

    /// 回收空闲超过 idle_ttl 的会话；有进行中交换、正被写入或被他处引用的会话跳过
    pub async fn evict_idle(&self, idle_ttl: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, entry)| {
                let idle = entry
                    .state
                    .try_read()
                    .map(|s| s.last_active.elapsed() >= idle_ttl)
                    .unwrap_or(false);
                idle && Arc::strong_count(entry) == 1 && entry.exchange.try_lock().is_ok()
            })
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            sessions.remove(id);
        }
        if !expired.is_empty() {
            tracing::info!(evicted = expired.len(), remaining = sessions.len(), "idle sessions evicted");
        }
        expired.len()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_session_is_empty_and_not_created() {
        let store = MemoryStore::new(10);
        assert!(store.get("nobody").await.is_empty());
        assert_eq!(store.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_twelve_turns_keep_last_ten() {
        let store = MemoryStore::new(10);
        for i in 1..=12 {
            store.append("s1", Message::user(format!("turn {}", i))).await;
        }
        let history = store.get("s1").await;
        assert_eq!(history.len(), 10);
        assert_eq!(history.first().map(|m| m.content.as_str()), Some("turn 3"));
        assert_eq!(history.last().map(|m| m.content.as_str()), Some("turn 12"));
    }

    #[tokio::test]
    async fn test_sessions_are_isolated_under_concurrency() {
        let store = Arc::new(MemoryStore::new(100));
        let mut handles = Vec::new();
        for session in ["a", "b"] {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..50 {
                    store
                        .append_exchange(
                            session,
                            Message::user(format!("{}-q{}", session, i)),
                            Message::assistant(format!("{}-a{}", session, i)),
                        )
                        .await;
                    tokio::task::yield_now().await;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        let a = store.get("a").await;
        let b = store.get("b").await;
        assert_eq!(a.len(), 100);
        assert!(a.iter().all(|m| m.content.starts_with("a-")));
        assert!(b.iter().all(|m| m.content.starts_with("b-")));
        // 同一会话内 user / assistant 严格交替
        for pair in a.chunks(2) {
            assert_eq!(pair[0].content.replace("-q", "-a"), pair[1].content);
        }
    }

    #[tokio::test]
    async fn test_same_session_exchanges_are_serialized() {
        let store = Arc::new(MemoryStore::new(10));
        let first = store.begin_exchange("s").await;

        let blocked = tokio::time::timeout(Duration::from_millis(50), store.begin_exchange("s")).await;
        assert!(blocked.is_err(), "second exchange on same session must wait");

        let other = tokio::time::timeout(Duration::from_millis(50), store.begin_exchange("t")).await;
        assert!(other.is_ok(), "other sessions must not be blocked");

        drop(first);
        let second = tokio::time::timeout(Duration::from_millis(50), store.begin_exchange("s")).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_evict_idle_skips_active_exchange() {
        let store = MemoryStore::new(10);
        store.append("idle", Message::user("hi")).await;
        store.append("busy", Message::user("hi")).await;
        let _guard = store.begin_exchange("busy").await;

        let evicted = store.evict_idle(Duration::ZERO).await;
        assert_eq!(evicted, 1);
        assert!(store.get("idle").await.is_empty());
        assert_eq!(store.get("busy").await.len(), 1);
    }

    #[tokio::test]
    async fn test_recent_sessions_survive_eviction() {
        let store = MemoryStore::new(10);
        store.append("s", Message::user("hi")).await;
        assert_eq!(store.evict_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(store.session_count().await, 1);
    }
}
