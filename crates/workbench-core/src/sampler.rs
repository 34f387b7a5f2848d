//! Trailing-edge debounce keyed per call site
//!
//! The first call for a key opens a window; calls inside the window only
//! replace the pending argument. When the window closes the handler runs once
//! with the latest argument.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

type Handler<K, T> = Arc<dyn Fn(K, T) -> BoxFuture<'static, ()> + Send + Sync>;

struct Slot<T> {
    latest: T,
    timer: JoinHandle<()>,
}

pub struct Sampler<K, T> {
    window: Duration,
    slots: Arc<Mutex<HashMap<K, Slot<T>>>>,
    handler: Handler<K, T>,
}

impl<K, T> Sampler<K, T>
where
    K: Eq + Hash + Clone + Send + 'static,
    T: Send + 'static,
{
    pub fn new<F, Fut>(window: Duration, handler: F) -> Self
    where
        F: Fn(K, T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Handler<K, T> = Arc::new(move |key, value| Box::pin(handler(key, value)));
        Self {
            window,
            slots: Arc::new(Mutex::new(HashMap::new())),
            handler,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Record a call; the handler sees it unless a later call replaces it
    pub fn call(&self, key: K, value: T) {
        let Ok(mut slots) = self.slots.lock() else {
            return;
        };

        if let Some(slot) = slots.get_mut(&key) {
            slot.latest = value;
            return;
        }

        let window = self.window;
        let slots_ref = Arc::clone(&self.slots);
        let handler = Arc::clone(&self.handler);
        let timer_key = key.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let latest = slots_ref
                .lock()
                .ok()
                .and_then(|mut slots| slots.remove(&timer_key))
                .map(|slot| slot.latest);
            if let Some(value) = latest {
                handler(timer_key, value).await;
            }
        });

        slots.insert(key, Slot {
            latest: value,
            timer,
        });
    }

    /// Drop the pending call for `key` without running it
    pub fn cancel(&self, key: &K) -> bool {
        let slot = self.slots.lock().ok().and_then(|mut slots| slots.remove(key));
        match slot {
            Some(slot) => {
                slot.timer.abort();
                debug!("Cancelled pending sample");
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.slots
            .lock()
            .map(|slots| slots.contains_key(key))
            .unwrap_or(false)
    }

    /// Drop every pending call
    pub fn cancel_all(&self) {
        if let Ok(mut slots) = self.slots.lock() {
            for (_, slot) in slots.drain() {
                slot.timer.abort();
            }
        }
    }
}

impl<K, T> Drop for Sampler<K, T> {
    fn drop(&mut self) {
        if let Ok(mut slots) = self.slots.lock() {
            for (_, slot) in slots.drain() {
                slot.timer.abort();
            }
        }
    }
}
