use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

pub type Atomic<T> = Arc<RwLock<T>>;

#[inline]
pub fn atomic<T>(t: T) -> Atomic<T> {
    Arc::new(RwLock::new(t))
}

pub trait ReadExecutor<T: ?Sized> {
    fn read_with<R>(&self, f: impl FnOnce(&T) -> R) -> R;
}

impl<T> ReadExecutor<T> for Atomic<T> {
    #[inline]
    fn read_with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let read_guard = self.read();
        f(&*read_guard)
    }
}

pub trait WriteExecutor<T: ?Sized> {
    fn write_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R;
}

impl<T> WriteExecutor<T> for Atomic<T> {
    #[inline]
    fn write_with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut write_guard = self.write();
        f(&mut *write_guard)
    }
}

/// Milliseconds elapsed since `start`, for response-time logging.
#[inline]
pub fn elapsed_millis(start: Instant) -> u128 {
    start.elapsed().as_millis()
}

/// True when the string is empty or only whitespace.
#[inline]
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic() {
        let atomic_value = atomic(5);
        assert_eq!(*atomic_value.read(), 5);
    }

    #[test]
    fn test_read_with() {
        let atomic_value = atomic(5);
        let result = atomic_value.read_with(|value| *value);
        assert_eq!(result, 5);
    }

    #[test]
    fn test_write_with() {
        let atomic_value = atomic(5);
        atomic_value.write_with(|value| *value = 10);
        assert_eq!(*atomic_value.read(), 10);
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(""));
        assert!(is_blank("  \t"));
        assert!(!is_blank(" admin "));
    }
}
