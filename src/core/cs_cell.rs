//! Kernel-lock protected cell
//!
//! Kernel objects such as thread queues and reference cells are shared
//! through `&'static` references and mutated from both threads and ISRs.
//! They are only ever written while the kernel lock is held, so a plain
//! `UnsafeCell` with a `Sync` promise is all they need.

use core::cell::UnsafeCell;

/// A cell whose content is only accessed with the kernel locked.
#[repr(transparent)]
pub struct CsCell<T>(UnsafeCell<T>);

// Single core, every access happens inside the kernel critical zone.
unsafe impl<T> Sync for CsCell<T> {}

impl<T> CsCell<T> {
    /// Create a new CsCell
    #[inline(always)]
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// Replaces the content, returning the old value.
    #[inline(always)]
    pub(crate) fn replace(&self, value: T) -> T {
        unsafe { core::ptr::replace(self.0.get(), value) }
    }

    /// Overwrites the content.
    #[inline(always)]
    pub(crate) fn set(&self, value: T) {
        unsafe { *self.0.get() = value }
    }

    /// Mutable access for the duration of the closure.
    #[inline(always)]
    pub(crate) fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(unsafe { &mut *self.0.get() })
    }

    /// Mutable reference without any guard.
    ///
    /// # Safety
    /// The caller guarantees exclusive access, on ARM targets this means
    /// the kernel lock is held or the scheduler has not started yet.
    #[inline(always)]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_unchecked(&self) -> &mut T {
        unsafe { &mut *self.0.get() }
    }
}

impl<T: Copy> CsCell<T> {
    /// Copies the content out.
    #[inline(always)]
    pub fn get(&self) -> T {
        unsafe { *self.0.get() }
    }
}

impl<T: Default> CsCell<T> {
    /// Takes the content, leaving the default value.
    #[inline(always)]
    pub(crate) fn take(&self) -> T {
        self.replace(T::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_and_take() {
        let cell = CsCell::new(Some(3usize));
        assert_eq!(cell.replace(Some(4)), Some(3));
        assert_eq!(cell.take(), Some(4));
        assert_eq!(cell.get(), None);
        cell.with(|v| *v = Some(9));
        assert_eq!(cell.get(), Some(9));
    }
}
