//! Side-channel error codes for calls whose return value is a count.
//!
//! Burst enqueue and link calls report partial success through their return
//! value. The reason for a short count is published in an [`Errno`] cell:
//! one per fast-path port (ports are owned by one thread at a time) and one
//! per device for control-path conditions.

use core::sync::atomic::{AtomicI32, Ordering};

use axerrno::LinuxError;

/// An atomically updated errno cell. Zero means "no error".
#[derive(Debug, Default)]
pub struct Errno(AtomicI32);

impl Errno {
    /// Creates a cleared cell.
    pub const fn new() -> Self {
        Self(AtomicI32::new(0))
    }

    /// Publishes `err`.
    #[inline]
    pub fn set(&self, err: LinuxError) {
        self.0.store(err as i32, Ordering::Release);
    }

    /// Resets the cell to zero.
    #[inline]
    pub fn clear(&self) {
        self.0.store(0, Ordering::Release);
    }

    /// Returns the raw code, `0` if none was published.
    #[inline]
    pub fn code(&self) -> i32 {
        self.0.load(Ordering::Acquire)
    }

    /// Returns `true` if the last published code is `err`.
    #[inline]
    pub fn is(&self, err: LinuxError) -> bool {
        self.code() == err as i32
    }

    /// Returns the raw code and clears the cell.
    #[inline]
    pub fn take(&self) -> i32 {
        self.0.swap(0, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_set_take() {
        let errno = Errno::new();
        assert_eq!(errno.code(), 0);

        errno.set(LinuxError::ENOSPC);
        assert!(errno.is(LinuxError::ENOSPC));
        assert!(!errno.is(LinuxError::EINVAL));

        assert_eq!(errno.take(), LinuxError::ENOSPC as i32);
        assert_eq!(errno.code(), 0);
    }
}
