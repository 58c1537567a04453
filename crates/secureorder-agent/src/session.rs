use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::OwnedMutexGuard;

use secureorder_core::types::SessionId;

type LockMap = HashMap<String, Arc<tokio::sync::Mutex<()>>>;

fn lock_map(map: &Mutex<LockMap>) -> MutexGuard<'_, LockMap> {
    map.lock().unwrap_or_else(|p| p.into_inner())
}

/// Per-session async locks. Holding the guard serialises every engine
/// invocation on that session; distinct sessions never contend.
///
/// An entry lives only while some invocation holds or waits for it.
pub struct SessionLocks {
    locks: Arc<Mutex<LockMap>>,
}

/// Exclusive access to one session. Dropping it releases the session and
/// removes its lock entry when no other invocation is waiting.
pub struct SessionGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<Mutex<LockMap>>,
    key: String,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wait for exclusive access to a session.
    pub async fn acquire(&self, session_id: &SessionId) -> SessionGuard {
        let key = session_id.to_string();
        let lock = lock_map(&self.locks)
            .entry(key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        SessionGuard {
            guard: Some(guard),
            locks: self.locks.clone(),
            key,
        }
    }

    /// Number of sessions with a lock entry.
    pub fn len(&self) -> usize {
        lock_map(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        // Release first so the map's Arc is the only one left when nobody waits.
        self.guard.take();
        let mut locks = lock_map(&self.locks);
        if locks
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_session_is_serialised() {
        let locks = SessionLocks::new();
        let id = SessionId::from("s1");

        let guard = locks.acquire(&id).await;
        let second = tokio::time::timeout(Duration::from_millis(20), locks.acquire(&id)).await;
        assert!(second.is_err());

        drop(guard);
        let again = tokio::time::timeout(Duration::from_millis(20), locks.acquire(&id)).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn distinct_sessions_do_not_contend() {
        let locks = SessionLocks::new();
        let a = locks.acquire(&SessionId::from("a")).await;
        let b = tokio::time::timeout(
            Duration::from_millis(20),
            locks.acquire(&SessionId::from("b")),
        )
        .await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);

        drop(b);
        drop(a);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn released_sessions_leave_no_entry() {
        let locks = SessionLocks::new();
        for i in 0..1000 {
            let _guard = locks.acquire(&SessionId::from(format!("s{}", i))).await;
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn entry_survives_while_another_invocation_waits() {
        let locks = Arc::new(SessionLocks::new());
        let id = SessionId::from("s");
        let first = locks.acquire(&id).await;

        let waiter = {
            let locks = locks.clone();
            let id = id.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&id).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        drop(first);
        assert_eq!(locks.len(), 1);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }
}
