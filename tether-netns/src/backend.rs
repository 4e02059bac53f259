//! Namespace backend trait for pluggable implementations

use nix::sched::{CloneFlags, setns};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::fs::File;
use std::os::unix::fs::MetadataExt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use tether_core::{Error, ProcessId, Result};

use crate::pin::ThreadPin;

/// Network namespace operations
///
/// This allows for different implementations:
/// - [`LinuxNamespaces`] - Production, `setns(2)` on `/proc` namespace files
/// - [`MockNamespaces`] - Testing without privileges
///
/// Operations that read or change the calling thread's namespace take the
/// [`ThreadPin`] as proof that the thread cannot be handed to other work.
/// Handles release their resources when dropped.
pub trait NamespaceBackend: Send + Sync + 'static {
    /// Handle to a network namespace
    type Handle: fmt::Debug;

    /// Capture the calling thread's current network namespace
    fn current(&self, pin: &ThreadPin) -> Result<Self::Handle>;

    /// Open the network namespace of a process
    fn open_pid(&self, pid: ProcessId) -> Result<Self::Handle>;

    /// Move the calling thread into `handle`'s namespace
    fn enter(&self, pin: &ThreadPin, handle: &Self::Handle) -> Result<()>;
}

/// Open file descriptor on a `/proc/.../ns/net` entry
#[derive(Debug)]
pub struct NetnsHandle {
    file: File,
    path: PathBuf,
}

impl NetnsHandle {
    fn open(path: PathBuf) -> Result<Self> {
        let file = File::open(&path).map_err(|e| {
            Error::namespace(format!("Failed to open {}: {e}", path.display()))
        })?;
        Ok(Self { file, path })
    }

    /// Inode number identifying the namespace
    pub fn inode(&self) -> Result<u64> {
        Ok(self.file.metadata()?.ino())
    }
}

impl fmt::Display for NetnsHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inode() {
            Ok(ino) => write!(f, "net:[{ino}]"),
            Err(_) => write!(f, "{}", self.path.display()),
        }
    }
}

/// Linux network namespaces via `setns(2)`
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxNamespaces;

impl NamespaceBackend for LinuxNamespaces {
    type Handle = NetnsHandle;

    fn current(&self, _pin: &ThreadPin) -> Result<NetnsHandle> {
        // thread-self, not self: other threads may sit in other namespaces
        NetnsHandle::open(PathBuf::from("/proc/thread-self/ns/net"))
    }

    fn open_pid(&self, pid: ProcessId) -> Result<NetnsHandle> {
        NetnsHandle::open(PathBuf::from(format!("/proc/{pid}/ns/net")))
    }

    fn enter(&self, _pin: &ThreadPin, handle: &NetnsHandle) -> Result<()> {
        setns(&handle.file, CloneFlags::CLONE_NEWNET).map_err(|e| {
            Error::namespace(format!("setns({}) failed: {e}", handle.path.display()))
        })
    }
}

/// Read the network namespace identifier of a process (e.g. `net:[4026531840]`)
pub fn net_namespace_id(pid: ProcessId) -> Result<String> {
    let path = format!("/proc/{pid}/ns/net");
    std::fs::read_link(&path)
        .map(|p| p.to_string_lossy().into_owned())
        .map_err(|e| Error::namespace(format!("Failed to read {path}: {e}")))
}

/// Mock backend for testing (no privileges, no kernel state)
///
/// Namespaces are plain numbers: threads start in [`MockNamespaces::HOST`],
/// and the namespace of PID `n` is `n`.
///
/// # Example
/// ```
/// use tether_netns::{MockNamespaces, NamespaceBackend, ProcessId, ThreadPin};
///
/// let backend = MockNamespaces::new();
/// let pin = ThreadPin::acquire().unwrap();
///
/// let target = backend.open_pid(ProcessId::from_raw(1234)).unwrap();
/// backend.enter(&pin, &target).unwrap();
/// assert_eq!(backend.namespace_of_current_thread(), 1234);
/// ```
#[derive(Clone, Default)]
pub struct MockNamespaces {
    state: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    threads: HashMap<ThreadId, u64>,
    enter_script: VecDeque<bool>,
    fail_current: bool,
    fail_open: bool,
    enter_calls: usize,
    open_handles: usize,
}

/// Handle produced by [`MockNamespaces`]
pub struct MockHandle {
    namespace: u64,
    state: Arc<Mutex<MockState>>,
}

impl MockNamespaces {
    /// Namespace every thread starts in
    pub const HOST: u64 = 4_026_531_840;

    /// Create a new mock backend
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make [`NamespaceBackend::current`] fail
    pub fn fail_current(&self, fail: bool) {
        self.lock().fail_current = fail;
    }

    /// Make [`NamespaceBackend::open_pid`] fail
    pub fn fail_open(&self, fail: bool) {
        self.lock().fail_open = fail;
    }

    /// Script the outcome of the next `enter` calls (`true` = fail).
    ///
    /// Calls beyond the script succeed.
    pub fn script_enters(&self, failures: impl IntoIterator<Item = bool>) {
        self.lock().enter_script = failures.into_iter().collect();
    }

    /// Number of `enter` calls made
    #[must_use]
    pub fn enter_calls(&self) -> usize {
        self.lock().enter_calls
    }

    /// Number of handles currently alive
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.lock().open_handles
    }

    /// Namespace the calling thread is in
    #[must_use]
    pub fn namespace_of_current_thread(&self) -> u64 {
        self.namespace_of(thread::current().id())
    }

    /// Namespace a given thread is in
    #[must_use]
    pub fn namespace_of(&self, thread: ThreadId) -> u64 {
        self.lock().threads.get(&thread).copied().unwrap_or(Self::HOST)
    }

    fn handle(&self, namespace: u64) -> MockHandle {
        self.lock().open_handles += 1;
        MockHandle {
            namespace,
            state: Arc::clone(&self.state),
        }
    }
}

impl fmt::Debug for MockNamespaces {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockNamespaces").finish_non_exhaustive()
    }
}

impl fmt::Debug for MockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockHandle")
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl Drop for MockHandle {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.open_handles -= 1;
    }
}

impl NamespaceBackend for MockNamespaces {
    type Handle = MockHandle;

    fn current(&self, pin: &ThreadPin) -> Result<MockHandle> {
        if self.lock().fail_current {
            return Err(Error::namespace("Mock: cannot capture current namespace"));
        }
        let namespace = self.namespace_of(pin.thread_id());
        Ok(self.handle(namespace))
    }

    fn open_pid(&self, pid: ProcessId) -> Result<MockHandle> {
        if self.lock().fail_open {
            return Err(Error::namespace(format!("Mock: cannot open namespace of {pid}")));
        }
        Ok(self.handle(u64::from(pid.as_raw().unsigned_abs())))
    }

    fn enter(&self, pin: &ThreadPin, handle: &MockHandle) -> Result<()> {
        let mut state = self.lock();
        state.enter_calls += 1;

        if state.enter_script.pop_front().unwrap_or(false) {
            tracing::debug!(namespace = handle.namespace, "Mock: enter failed");
            return Err(Error::namespace(format!(
                "Mock: cannot enter namespace {}",
                handle.namespace
            )));
        }

        state.threads.insert(pin.thread_id(), handle.namespace);
        tracing::trace!(namespace = handle.namespace, "Mock: entered namespace");
        Ok(())
    }
}
