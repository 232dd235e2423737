//! Debug session: the process-wide handle on the running executable's debug info.
//!
//! ## Lifecycle
//!
//! ```text
//! Uninitialized ──init()──► Open (debug info loaded, or skipped by config)
//!       │                     │
//!       └──open failed──► Unavailable        close() ──► Closed
//! ```
//!
//! Opening happens once. A failed open is terminal: the session stays
//! unavailable for the rest of the process and lookups short-circuit instead
//! of retrying. Every lookup runs under the session mutex, which also guards
//! the compile-unit cursor shared by all lookups.

use std::fs::File;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use tracing::{debug, warn};

use super::image::{DebugInfo, ExecutableImage};
use super::module::{executable_mapping, ExecutableMapping};
use super::navigator::{resolve_in_units, UnitCursor, UnitMatch};
use crate::config::{SymbolicationConfig, TraversalLimits};
use crate::error::Result;
use crate::types::Address;

/// Observable state of a [`DebugSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus
{
    /// Not opened yet; the first lookup or [`DebugSession::init`] opens it.
    Uninitialized,
    /// Debug info loaded; lookups resolve functions and lines.
    Ready,
    /// Opened with debug-info parsing switched off; lookups report modules only.
    Reduced,
    /// Opening failed. Permanent.
    Unavailable,
    /// Torn down by [`DebugSession::close`].
    Closed,
}

enum SessionState
{
    Uninitialized,
    Open(LoadedSession),
    Unavailable,
    Closed,
}

impl SessionState
{
    fn status(&self) -> SessionStatus
    {
        match self {
            SessionState::Uninitialized => SessionStatus::Uninitialized,
            SessionState::Open(loaded) if loaded.debug_info.is_some() => SessionStatus::Ready,
            SessionState::Open(_) => SessionStatus::Reduced,
            SessionState::Unavailable => SessionStatus::Unavailable,
            SessionState::Closed => SessionStatus::Closed,
        }
    }
}

/// Handles held by an open session.
///
/// Field order is teardown order: debug info, then the image, then the file.
pub(crate) struct LoadedSession
{
    debug_info: Option<DebugInfo>,
    image: ExecutableImage,
    file: File,
    cursor: UnitCursor,
    mapping: ExecutableMapping,
}

impl LoadedSession
{
    fn open(config: &SymbolicationConfig) -> Result<Self>
    {
        let mut file = File::open(&config.executable)?;
        let image = ExecutableImage::read(&mut file, &config.executable)?;
        let debug_info = if config.parse_debug_info {
            Some(image.load_debug_info()?)
        } else {
            None
        };

        Ok(Self {
            debug_info,
            image,
            file,
            cursor: UnitCursor::new(),
            mapping: executable_mapping(),
        })
    }

    pub(crate) fn has_debug_info(&self) -> bool
    {
        self.debug_info.is_some()
    }

    /// Resolve a runtime address against the loaded debug info.
    ///
    /// `Ok(None)` when debug info was skipped, when the address lies outside
    /// the executable's segments (a shared library, or garbage), or when no
    /// unit covers it.
    pub(crate) fn lookup(&mut self, address: Address, limits: &TraversalLimits) -> Result<Option<UnitMatch>>
    {
        let Some(debug_info) = &self.debug_info else {
            return Ok(None);
        };
        if !self.mapping.covers(address) {
            return Ok(None);
        }
        let Some(file_address) = address.checked_sub(self.mapping.load_bias) else {
            return Ok(None);
        };
        resolve_in_units(
            debug_info.dwarf(),
            debug_info.units(),
            &mut self.cursor,
            file_address.value(),
            limits,
        )
    }

    fn close(self)
    {
        let Self {
            debug_info,
            image,
            file,
            ..
        } = self;
        drop(debug_info);
        debug!("released debug info for {}", image.path().display());
        drop(image);
        drop(file);
    }
}

/// The lazily opened debug-info source for the running process.
pub struct DebugSession
{
    config: SymbolicationConfig,
    state: Mutex<SessionState>,
}

impl DebugSession
{
    /// Create a session. Nothing is opened until first use.
    ///
    /// ## Parameters
    ///
    /// - `config`: Which executable to read, whether to parse its DWARF, and
    ///   the traversal caps every lookup runs under
    ///
    /// ## Example
    ///
    /// ```rust
    /// use crashsym_core::{DebugSession, SessionStatus, SymbolicationConfig};
    ///
    /// let session = DebugSession::new(SymbolicationConfig::default());
    /// assert_eq!(session.status(), SessionStatus::Uninitialized);
    /// ```
    pub fn new(config: SymbolicationConfig) -> Self
    {
        Self {
            config,
            state: Mutex::new(SessionState::Uninitialized),
        }
    }

    pub fn config(&self) -> &SymbolicationConfig
    {
        &self.config
    }

    /// Open the session if that has not been attempted yet.
    ///
    /// Idempotent and safe to race: exactly one caller performs the open,
    /// every caller sees the same outcome. Blocks while another thread holds
    /// the session.
    ///
    /// ## Returns
    ///
    /// The status after the attempt. `Unavailable` and `Closed` are final.
    ///
    /// ## Example
    ///
    /// ```rust,no_run
    /// use crashsym_core::{DebugSession, SessionStatus, SymbolicationConfig};
    ///
    /// let session = DebugSession::new(SymbolicationConfig::default().with_debug_info(false));
    /// assert_eq!(session.init(), SessionStatus::Reduced);
    /// ```
    pub fn init(&self) -> SessionStatus
    {
        let mut state = self.lock();
        self.ensure_open(&mut state);
        state.status()
    }

    /// Current state, without opening anything.
    pub fn status(&self) -> SessionStatus
    {
        self.lock().status()
    }

    /// Tear the session down. Later lookups report it unavailable.
    ///
    /// Releases the parsed debug info, then the mapped image, then the file
    /// handle. Closing an unopened or already closed session only marks it
    /// `Closed`.
    pub fn close(&self)
    {
        let mut state = self.lock();
        if let SessionState::Open(loaded) = std::mem::replace(&mut *state, SessionState::Closed) {
            loaded.close();
            debug!("debug session closed");
        }
    }

    /// Run `f` on the open session, opening it first if needed.
    ///
    /// `None` when the session is unavailable or closed.
    pub(crate) fn with_open<R>(&self, f: impl FnOnce(&mut LoadedSession, &TraversalLimits) -> R) -> Option<R>
    {
        let mut state = self.lock();
        self.ensure_open(&mut state);
        match &mut *state {
            SessionState::Open(loaded) => Some(f(loaded, &self.config.limits)),
            _ => None,
        }
    }

    /// Like [`with_open`](Self::with_open), but never blocks and never opens.
    ///
    /// `None` when another lookup holds the session or it was not initialized
    /// ahead of time. Meant for crash context, where waiting on a lock the
    /// crashing thread may itself hold would deadlock.
    pub(crate) fn try_with_open<R>(&self, f: impl FnOnce(&mut LoadedSession, &TraversalLimits) -> R) -> Option<R>
    {
        let mut state = match self.state.try_lock() {
            Ok(state) => state,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };
        match &mut *state {
            SessionState::Open(loaded) => Some(f(loaded, &self.config.limits)),
            _ => None,
        }
    }

    // A panic inside a lookup leaves nothing half-written: the cursor is
    // rewound on unwind, so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, SessionState>
    {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self, state: &mut SessionState)
    {
        if !matches!(state, SessionState::Uninitialized) {
            return;
        }
        *state = match LoadedSession::open(&self.config) {
            Ok(loaded) => {
                debug!(
                    executable = %self.config.executable.display(),
                    debug_info = loaded.has_debug_info(),
                    load_bias = loaded.mapping.load_bias,
                    segments = loaded.mapping.segments.len(),
                    "debug session opened"
                );
                SessionState::Open(loaded)
            }
            Err(err) => {
                warn!("debug session unavailable: {err}");
                SessionState::Unavailable
            }
        };
    }
}

impl std::fmt::Debug for DebugSession
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result
    {
        f.debug_struct("DebugSession")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests
{
    use std::path::PathBuf;

    use super::*;

    fn missing_executable() -> SymbolicationConfig
    {
        SymbolicationConfig {
            executable: PathBuf::from("/nonexistent/crashsym-test-binary"),
            ..SymbolicationConfig::default()
        }
    }

    #[test]
    fn test_starts_uninitialized()
    {
        let session = DebugSession::new(missing_executable());
        assert_eq!(session.status(), SessionStatus::Uninitialized);
    }

    #[test]
    fn test_failed_open_is_terminal()
    {
        let session = DebugSession::new(missing_executable());
        assert_eq!(session.init(), SessionStatus::Unavailable);
        assert_eq!(session.init(), SessionStatus::Unavailable);
        assert!(session.with_open(|_, _| ()).is_none());
    }

    #[test]
    fn test_try_with_open_does_not_open()
    {
        let session = DebugSession::new(SymbolicationConfig::default());
        assert!(session.try_with_open(|_, _| ()).is_none());
        assert_eq!(session.status(), SessionStatus::Uninitialized);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_reduced_session_skips_debug_info()
    {
        let session = DebugSession::new(SymbolicationConfig::default().with_debug_info(false));
        assert_eq!(session.init(), SessionStatus::Reduced);
        let found = session.with_open(|loaded, limits| {
            assert!(!loaded.has_debug_info());
            loaded.lookup(Address::new(0x1000), limits).unwrap().is_none()
        });
        assert_eq!(found, Some(true));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_close_makes_session_unavailable()
    {
        let session = DebugSession::new(SymbolicationConfig::default().with_debug_info(false));
        session.init();
        session.close();
        assert_eq!(session.status(), SessionStatus::Closed);
        assert!(session.with_open(|_, _| ()).is_none());
        assert_eq!(session.init(), SessionStatus::Closed);
    }

    #[inline(never)]
    fn marker() -> u32
    {
        11
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_lookup_rewinds_cursor_even_on_cap()
    {
        let limits = TraversalLimits {
            max_compile_units: 0,
            ..TraversalLimits::default()
        };
        let session = DebugSession::new(SymbolicationConfig::default().with_limits(limits));
        assert_eq!(session.init(), SessionStatus::Ready);

        let rewound = session.with_open(|loaded, limits| {
            // The very first unit is already over the cap.
            assert!(loaded.lookup(Address::from(marker as usize), limits).is_err());
            loaded.cursor.is_at_start()
        });
        assert_eq!(rewound, Some(true));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_addresses_outside_executable_skip_debug_info()
    {
        let limits = TraversalLimits {
            max_compile_units: 0,
            ..TraversalLimits::default()
        };
        let session = DebugSession::new(SymbolicationConfig::default().with_limits(limits));
        session.init();

        // With no unit budget, anything that reached the walk would fail.
        let found = session.with_open(|loaded, limits| {
            [0, 1, u64::MAX, u64::MAX - 1]
                .into_iter()
                .all(|raw| matches!(loaded.lookup(Address::new(raw), limits), Ok(None)))
        });
        assert_eq!(found, Some(true));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_own_function_resolves()
    {
        let session = DebugSession::new(SymbolicationConfig::default());
        session.init();
        let name = session.with_open(|loaded, limits| {
            let found = loaded.lookup(Address::from(marker as usize), limits).unwrap();
            found.and_then(|found| found.function).map(|name| name.to_string())
        });
        let name = name.flatten().unwrap();
        assert!(name.ends_with("marker"), "{name}");
    }
}
