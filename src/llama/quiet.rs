//! Process-wide silencing of llama.cpp diagnostics.
//!
//! llama.cpp and ggml log through global callbacks and write straight to
//! file descriptor 2. Both are process state, so a [`Quiet`] scope also holds
//! the single engine lock: every call into the engine happens inside one, and
//! two suppress/restore windows can never interleave.

use std::ffi::{c_char, c_void};
use std::sync::{Mutex, MutexGuard, PoisonError};

use llama_cpp_sys_2::ggml_log_level;

static ENGINE: Mutex<()> = Mutex::new(());

unsafe extern "C" fn discard_log(
    _level: ggml_log_level,
    _text: *const c_char,
    _data: *mut c_void,
) {
}

/// Guard that keeps engine diagnostics away from stderr while alive.
///
/// Dropping the guard (or calling [`Quiet::restore`]) puts stderr back and
/// releases the engine lock.
pub(crate) struct Quiet {
    saved: Option<fd::Saved>,
    _engine: MutexGuard<'static, ()>,
}

impl Quiet {
    /// Take the engine lock, install no-op log callbacks and point stderr at
    /// the null device.
    ///
    /// Failing to duplicate stderr is not an error: the scope then only
    /// silences the callbacks.
    pub(crate) fn enter() -> Self {
        let engine = ENGINE.lock().unwrap_or_else(PoisonError::into_inner);

        // SAFETY: the callback ignores its arguments and the engine lock is held.
        unsafe {
            llama_cpp_sys_2::llama_log_set(Some(discard_log), std::ptr::null_mut());
            llama_cpp_sys_2::ggml_log_set(Some(discard_log), std::ptr::null_mut());
        }

        Self {
            saved: fd::suppress(),
            _engine: engine,
        }
    }

    /// Whether stderr was actually redirected for this scope.
    #[cfg(test)]
    pub(crate) fn is_redirected(&self) -> bool {
        self.saved.is_some()
    }

    /// End the scope explicitly.
    pub(crate) fn restore(self) {
        drop(self);
    }
}

impl Drop for Quiet {
    fn drop(&mut self) {
        // Runs before `_engine` is dropped, so stderr is back before the
        // next caller can enter.
        if let Some(saved) = self.saved.take() {
            fd::restore(saved);
        }
    }
}

#[cfg(unix)]
mod fd {
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};

    /// Duplicate of the original stderr descriptor.
    pub(super) struct Saved(OwnedFd);

    fn flush() {
        let _ = std::io::stderr().flush();
        // SAFETY: fflush(NULL) flushes every open C stream.
        unsafe {
            libc::fflush(std::ptr::null_mut());
        }
    }

    pub(super) fn suppress() -> Option<Saved> {
        flush();

        // SAFETY: dup has no memory-safety preconditions.
        let raw = unsafe { libc::dup(libc::STDERR_FILENO) };
        if raw < 0 {
            return None;
        }
        // SAFETY: `raw` is a fresh descriptor owned by nobody else.
        let saved = unsafe { OwnedFd::from_raw_fd(raw) };

        let devnull = OpenOptions::new().write(true).open("/dev/null").ok()?;
        // SAFETY: both descriptors are open for the duration of the call.
        if unsafe { libc::dup2(devnull.as_raw_fd(), libc::STDERR_FILENO) } < 0 {
            return None;
        }
        Some(Saved(saved))
    }

    pub(super) fn restore(saved: Saved) {
        flush();
        // SAFETY: `saved` is an open descriptor; dup2 only replaces fd 2.
        unsafe {
            libc::dup2(saved.0.as_raw_fd(), libc::STDERR_FILENO);
        }
    }
}

#[cfg(not(unix))]
mod fd {
    pub(super) struct Saved;

    pub(super) fn suppress() -> Option<Saved> {
        None
    }

    pub(super) fn restore(_saved: Saved) {}
}

#[cfg(all(test, unix))]
mod tests {
    use std::os::unix::fs::MetadataExt;
    use std::sync::Mutex;

    use super::*;

    // fd 2 is shared by every test thread
    static FD_TESTS: Mutex<()> = Mutex::new(());

    fn stat_fd(fd: i32) -> (u64, u64, u64) {
        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        assert_eq!(unsafe { libc::fstat(fd, &mut st) }, 0);
        (st.st_dev as u64, st.st_ino as u64, st.st_rdev as u64)
    }

    fn stat_path(path: &str) -> (u64, u64, u64) {
        let meta = std::fs::metadata(path).unwrap();
        (meta.dev(), meta.ino(), meta.rdev())
    }

    #[test]
    fn test_quiet_redirects_and_restores() {
        let _serial = FD_TESTS.lock().unwrap_or_else(PoisonError::into_inner);
        let before = stat_fd(libc::STDERR_FILENO);

        let quiet = Quiet::enter();
        assert!(quiet.is_redirected());
        assert_eq!(stat_fd(libc::STDERR_FILENO), stat_path("/dev/null"));
        eprintln!("this line goes nowhere");
        quiet.restore();

        assert_eq!(stat_fd(libc::STDERR_FILENO), before);
    }

    #[test]
    fn test_quiet_restores_on_early_return() {
        let _serial = FD_TESTS.lock().unwrap_or_else(PoisonError::into_inner);
        let before = stat_fd(libc::STDERR_FILENO);

        fn stage(fail: bool) -> Result<(), String> {
            let _quiet = Quiet::enter();
            if fail {
                return Err("encode failed".to_string());
            }
            Ok(())
        }

        assert!(stage(true).is_err());
        assert_eq!(stat_fd(libc::STDERR_FILENO), before);
        assert!(stage(false).is_ok());
        assert_eq!(stat_fd(libc::STDERR_FILENO), before);
    }

    #[test]
    fn test_quiet_scopes_are_sequential() {
        let _serial = FD_TESTS.lock().unwrap_or_else(PoisonError::into_inner);
        let before = stat_fd(libc::STDERR_FILENO);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| {
                    for _ in 0..8 {
                        let _quiet = Quiet::enter();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(stat_fd(libc::STDERR_FILENO), before);
    }
}
