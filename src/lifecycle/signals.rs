// src/lifecycle/signals.rs

//! Scoped handlers for the signals that abort a job.
//!
//! [`SignalGuard::install`] records the current disposition of every signal
//! and routes deliveries into a tokio channel. Dropping the guard (or calling
//! [`SignalGuard::restore`]) puts the recorded dispositions back.
//!
//! The handler itself only writes the signal number to a pipe; a watcher
//! thread turns pipe bytes into channel messages.

use tokio::sync::mpsc;

use crate::errors::{JobsubError, Result};

/// Signals that abort a running job.
#[cfg(unix)]
pub fn fatal_signals() -> Vec<i32> {
    #[allow(unused_mut)]
    let mut signals = vec![
        libc::SIGINT,
        libc::SIGHUP,
        libc::SIGQUIT,
        libc::SIGILL,
        libc::SIGTRAP,
        libc::SIGABRT,
        libc::SIGBUS,
        libc::SIGFPE,
        libc::SIGUSR1,
        libc::SIGUSR2,
        libc::SIGPIPE,
        libc::SIGTERM,
        libc::SIGXCPU,
    ];
    #[cfg(any(target_os = "linux", target_os = "android"))]
    signals.push(libc::SIGPWR);
    signals
}

#[cfg(not(unix))]
pub fn fatal_signals() -> Vec<i32> {
    Vec::new()
}

#[cfg(unix)]
pub use unix::SignalGuard;

#[cfg(not(unix))]
pub use fallback::SignalGuard;

/// Re-deliver `signal` to this process.
#[cfg(unix)]
pub fn reraise(signal: i32) {
    // SAFETY: raise has no memory-safety preconditions.
    unsafe {
        libc::raise(signal);
    }
}

#[cfg(not(unix))]
pub fn reraise(_signal: i32) {}

#[cfg(unix)]
mod unix {
    use std::io;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::thread::JoinHandle;

    use tracing::{debug, warn};

    use super::*;

    /// Write end of the self-pipe, -1 when no guard is installed.
    static PIPE_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

    /// Byte that stops the watcher thread. No signal has number 0.
    const STOP: u8 = 0;

    extern "C" fn on_signal(signum: libc::c_int) {
        let fd = PIPE_WRITE_FD.load(Ordering::Relaxed);
        if fd >= 0 {
            let byte = signum as u8;
            // SAFETY: write(2) is async-signal-safe and `byte` outlives the call.
            unsafe {
                libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);
            }
        }
    }

    /// Only one guard can be installed at a time.
    pub struct SignalGuard {
        previous: Vec<(i32, libc::sigaction)>,
        read_fd: i32,
        write_fd: i32,
        watcher: Option<JoinHandle<()>>,
        restored: bool,
    }

    impl SignalGuard {
        pub fn install(signals: &[i32]) -> Result<(Self, mpsc::UnboundedReceiver<i32>)> {
            let (read_fd, write_fd) = open_pipe()?;
            if PIPE_WRITE_FD
                .compare_exchange(-1, write_fd, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                close_pipe(read_fd, write_fd);
                return Err(JobsubError::SessionActive);
            }

            let (tx, rx) = mpsc::unbounded_channel();
            let watcher = std::thread::Builder::new()
                .name("jobsub-signals".to_string())
                .spawn(move || watch(read_fd, tx))
                .inspect_err(|_| {
                    PIPE_WRITE_FD.store(-1, Ordering::SeqCst);
                    close_pipe(read_fd, write_fd);
                })?;

            let mut guard = SignalGuard {
                previous: Vec::with_capacity(signals.len()),
                read_fd,
                write_fd,
                watcher: Some(watcher),
                restored: false,
            };
            for &signal in signals {
                let old = install_handler(signal)?;
                guard.previous.push((signal, old));
            }
            debug!(count = signals.len(), "signal handlers installed");
            Ok((guard, rx))
        }

        /// Put back the dispositions recorded at install time.
        pub fn restore(&mut self) {
            if self.restored {
                return;
            }
            self.restored = true;

            for (signal, old) in self.previous.drain(..).rev() {
                // SAFETY: `old` was filled in by sigaction for this signal.
                let rc = unsafe { libc::sigaction(signal, &old, std::ptr::null_mut()) };
                if rc != 0 {
                    warn!(signal, error = %io::Error::last_os_error(), "failed to restore signal handler");
                }
            }
            PIPE_WRITE_FD.store(-1, Ordering::SeqCst);

            let stop = STOP;
            // SAFETY: write_fd is the open write end of our pipe.
            unsafe {
                libc::write(self.write_fd, &stop as *const u8 as *const libc::c_void, 1);
            }
            if let Some(watcher) = self.watcher.take() {
                let _ = watcher.join();
            }
            close_pipe(self.read_fd, self.write_fd);
            debug!("signal handlers restored");
        }
    }

    impl Drop for SignalGuard {
        fn drop(&mut self) {
            self.restore();
        }
    }

    fn install_handler(signal: i32) -> Result<libc::sigaction> {
        // SAFETY: both structs are plain data and fully initialised below or
        // by the kernel.
        unsafe {
            let mut action: libc::sigaction = std::mem::zeroed();
            action.sa_sigaction = on_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
            action.sa_flags = libc::SA_RESTART;
            libc::sigemptyset(&mut action.sa_mask);

            let mut old: libc::sigaction = std::mem::zeroed();
            if libc::sigaction(signal, &action, &mut old) != 0 {
                return Err(io::Error::last_os_error().into());
            }
            Ok(old)
        }
    }

    fn open_pipe() -> Result<(i32, i32)> {
        let mut fds = [0 as libc::c_int; 2];
        // SAFETY: fds has room for the two descriptors pipe(2) returns.
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error().into());
        }
        let (read_fd, write_fd) = (fds[0], fds[1]);
        for fd in fds {
            // SAFETY: fd was just returned by pipe(2).
            unsafe {
                libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC);
            }
        }
        // SAFETY: as above. A full pipe must never block the handler.
        unsafe {
            let flags = libc::fcntl(write_fd, libc::F_GETFL);
            libc::fcntl(write_fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
        }
        Ok((read_fd, write_fd))
    }

    fn close_pipe(read_fd: i32, write_fd: i32) {
        // SAFETY: both descriptors belong to this guard and are closed once.
        unsafe {
            libc::close(read_fd);
            libc::close(write_fd);
        }
    }

    fn watch(read_fd: i32, tx: mpsc::UnboundedSender<i32>) {
        loop {
            let mut byte = 0u8;
            // SAFETY: reading one byte into a local buffer.
            let n = unsafe { libc::read(read_fd, &mut byte as *mut u8 as *mut libc::c_void, 1) };
            match n {
                1 if byte == STOP => break,
                1 => {
                    if tx.send(i32::from(byte)).is_err() {
                        break;
                    }
                }
                0 => break,
                _ => {
                    if io::Error::last_os_error().kind() != io::ErrorKind::Interrupted {
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(not(unix))]
mod fallback {
    use super::*;

    /// No handlers are installed on this platform.
    pub struct SignalGuard {
        _tx: mpsc::UnboundedSender<i32>,
    }

    impl SignalGuard {
        pub fn install(_signals: &[i32]) -> Result<(Self, mpsc::UnboundedReceiver<i32>)> {
            let (tx, rx) = mpsc::unbounded_channel();
            Ok((SignalGuard { _tx: tx }, rx))
        }

        pub fn restore(&mut self) {}
    }
}
