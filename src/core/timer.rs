//! 可取消的定时任务：按 key 的单槽防抖定时器
//!
//! 同一 key 任意时刻至多一个待触发的定时器；再次 schedule 会取消旧的并重新计时（replace-on-reschedule）。
//! 用于版本快照的 500ms 防抖；cancel / cancel_all / Drop 会真正 abort 后台任务，而不是仅仅忽略其结果。

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

static NEXT_GENERATION: AtomicU64 = AtomicU64::new(0);

struct Slot {
    generation: u64,
    handle: JoinHandle<()>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// 按 key 的防抖定时器集合
pub struct DebounceTimers<K> {
    slots: Arc<Mutex<HashMap<K, Slot>>>,
}

impl<K> DebounceTimers<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// 在 delay 之后执行 task；若该 key 已有待触发定时器，先取消再重新计时
    ///
    /// 需要在 tokio 运行时内调用。
    pub fn schedule<F, Fut>(&self, key: K, delay: Duration, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = NEXT_GENERATION.fetch_add(1, Ordering::Relaxed);
        let mut slots = lock(&self.slots);
        if let Some(prev) = slots.remove(&key) {
            prev.handle.abort();
        }

        let shared = Arc::clone(&self.slots);
        let fire_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // 触发时先释放槽位（仅当仍是本代），任务体执行期间不再可被 abort
            {
                let mut slots = lock(&shared);
                match slots.get(&fire_key) {
                    Some(slot) if slot.generation == generation => {
                        slots.remove(&fire_key);
                    }
                    _ => return,
                }
            }
            task().await;
        });
        slots.insert(key, Slot { generation, handle });
    }

    /// 取消某个 key 的待触发定时器；返回是否确实取消了一个
    pub fn cancel(&self, key: &K) -> bool {
        match lock(&self.slots).remove(key) {
            Some(slot) => {
                slot.handle.abort();
                true
            }
            None => false,
        }
    }

    /// 取消全部待触发定时器
    pub fn cancel_all(&self) -> usize {
        let mut slots = lock(&self.slots);
        let n = slots.len();
        for (_, slot) in slots.drain() {
            slot.handle.abort();
        }
        n
    }

    pub fn is_pending(&self, key: &K) -> bool {
        lock(&self.slots).contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.slots).len()
    }
}

impl<K> Default for DebounceTimers<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Drop for DebounceTimers<K> {
    fn drop(&mut self) {
        let mut slots = lock(&self.slots);
        for (_, slot) in slots.drain() {
            slot.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_reschedule_coalesces() {
        let timers = DebounceTimers::new();
        let fired = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let fired = fired.clone();
            timers.schedule("msg-1", Duration::from_millis(40), move || async move {
                fired.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(timers.pending_count(), 1);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!timers.is_pending(&"msg-1"));
    }

    #[tokio::test]
    async fn test_cancel_clears_pending() {
        let timers = DebounceTimers::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        timers.schedule("a", Duration::from_millis(30), move || async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timers.cancel(&"a"));
        assert!(!timers.cancel(&"a"));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_independent_keys() {
        let timers = DebounceTimers::new();
        let fired = Arc::new(AtomicUsize::new(0));
        for key in ["a", "b"] {
            let f = fired.clone();
            timers.schedule(key, Duration::from_millis(20), move || async move {
                f.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(timers.pending_count(), 2);
        assert_eq!(timers.cancel_all(), 2);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
