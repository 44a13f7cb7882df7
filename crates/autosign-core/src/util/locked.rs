//! Lock-guarded value with scoped access.
//!
//! The guard never escapes [`Locked::with`], so the lock is released on every
//! exit path of the closure, including early returns and panics.

use std::sync::{Mutex, PoisonError};

#[derive(Debug, Default)]
pub struct Locked<T> {
    inner: Mutex<T>,
}

impl<T> Locked<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Run `f` with exclusive access to the value.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        // A panic in another closure leaves the value as it was at the panic
        // point; counters and clocks stay usable.
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    pub fn set(&self, value: T) {
        self.with(|v| *v = value);
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(|v| v.clone())
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_with_returns_value() {
        let locked = Locked::new(vec![1, 2]);
        let len = locked.with(|v| {
            v.push(3);
            v.len()
        });
        assert_eq!(len, 3);
        assert_eq!(locked.into_inner(), vec![1, 2, 3]);
    }

    #[test]
    fn test_released_after_panic() {
        let locked = Arc::new(Locked::new(0u32));
        let l2 = locked.clone();
        let result = std::thread::spawn(move || {
            l2.with(|v| {
                *v += 1;
                panic!("boom");
            })
        })
        .join();
        assert!(result.is_err());
        // Still usable: the guard was dropped while unwinding.
        locked.with(|v| *v += 1);
        assert_eq!(locked.get(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_increments() {
        let locked = Arc::new(Locked::new(0u64));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let l = locked.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..100 {
                    l.with(|v| *v += 1);
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(locked.get(), 800);
    }
}
