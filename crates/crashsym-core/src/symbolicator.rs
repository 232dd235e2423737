//! # Symbolicator
//!
//! The public face of the engine: address in, [`SymbolInfo`] out.
//!
//! ## Entry points
//!
//! | Method | Blocks | Allocates | For |
//! |---|---|---|---|
//! | [`get_info_for_address`](Symbolicator::get_info_for_address) | yes | yes | explicit backtraces |
//! | [`try_get_info_for_address`](Symbolicator::try_get_info_for_address) | no | yes | best-effort from a failing thread |
//! | [`write_frame_line`](Symbolicator::write_frame_line) | no | no | crash context |
//! | [`append_stack_line`](Symbolicator::append_stack_line) | no | no | crash context |
//!
//! None of them fail. Anything that goes wrong below this layer turns into
//! unset fields, and `success` is `false` only when the session is
//! unavailable or the lookup hit a hard failure such as an exhausted cap.

use std::fmt;

use once_cell::sync::Lazy;
use tracing::warn;

use crate::capture::StackCapture;
use crate::config::{SymbolicationConfig, TraversalLimits};
use crate::format::{FrameLine, MachineLine, StackTraceBuffer};
use crate::symbols::module::{module_path, with_module_path};
use crate::symbols::session::{LoadedSession, SessionStatus};
use crate::symbols::DebugSession;
use crate::types::{Address, SourceLocation, SymbolInfo, SymbolName};

static GLOBAL: Lazy<Symbolicator> = Lazy::new(|| Symbolicator::new(SymbolicationConfig::from_env()));

/// Resolves addresses of the running process through one [`DebugSession`].
#[derive(Debug)]
pub struct Symbolicator
{
    session: DebugSession,
}

impl Symbolicator
{
    /// Create a symbolicator over a fresh [`DebugSession`].
    ///
    /// Nothing is read from disk until [`init`](Self::init) or the first
    /// blocking lookup.
    ///
    /// ## Parameters
    ///
    /// - `config`: Debug-info toggle, executable path and traversal caps
    ///
    /// ## Example
    ///
    /// ```rust
    /// use crashsym_core::{SessionStatus, SymbolicationConfig, Symbolicator};
    ///
    /// let symbolicator = Symbolicator::new(SymbolicationConfig::default().with_debug_info(false));
    /// assert_eq!(symbolicator.session().status(), SessionStatus::Uninitialized);
    /// ```
    pub fn new(config: SymbolicationConfig) -> Self
    {
        Self {
            session: DebugSession::new(config),
        }
    }

    /// The process-wide instance, configured from the environment on first use.
    pub fn global() -> &'static Symbolicator
    {
        &GLOBAL
    }

    pub fn session(&self) -> &DebugSession
    {
        &self.session
    }

    /// Open the session now rather than on the first lookup.
    ///
    /// Crash handlers should call this at startup: the non-blocking entry
    /// points never open the session themselves. Safe to call from several
    /// threads at once; exactly one performs the open.
    ///
    /// ## Returns
    ///
    /// - `Ready`: debug info loaded
    /// - `Reduced`: opened with debug-info parsing switched off
    /// - `Unavailable`: the executable could not be opened or parsed; permanent
    /// - `Closed`: [`close`](Self::close) already ran
    ///
    /// ## Example
    ///
    /// ```rust,no_run
    /// use crashsym_core::{SessionStatus, Symbolicator};
    ///
    /// if Symbolicator::global().init() != SessionStatus::Ready {
    ///     eprintln!("crash reports will carry addresses only");
    /// }
    /// ```
    pub fn init(&self) -> SessionStatus
    {
        self.session.init()
    }

    /// Release the session. Later lookups report only the module.
    pub fn close(&self)
    {
        self.session.close();
    }

    /// Resolve `address` to module, function, file and line.
    ///
    /// Opens the session on first use and waits for any lookup in flight.
    /// Never fails: unresolved parts are left unset.
    ///
    /// ## Parameters
    ///
    /// - `address`: A runtime instruction address in this process
    ///
    /// ## Returns
    ///
    /// A [`SymbolInfo`] with `success == false` when the session is
    /// unavailable or the lookup aborted, for example on an exhausted cap.
    ///
    /// ## Example
    ///
    /// ```rust,no_run
    /// use crashsym_core::Symbolicator;
    ///
    /// #[inline(never)]
    /// fn handler() {}
    ///
    /// let info = Symbolicator::global().get_info_for_address(handler as usize);
    /// if let (Some(file), Some(line)) = (info.source_file(), info.line_number()) {
    ///     println!("{file}:{line}");
    /// }
    /// ```
    pub fn get_info_for_address(&self, address: impl Into<Address>) -> SymbolInfo
    {
        let address = address.into();
        let resolved = self.session.with_open(|session, limits| resolve_owned(session, address, limits));
        finish(address, resolved)
    }

    /// Like [`get_info_for_address`](Self::get_info_for_address), but gives up
    /// with `success == false` instead of waiting or opening the session.
    ///
    /// ## Parameters
    ///
    /// - `address`: A runtime instruction address in this process
    ///
    /// ## Returns
    ///
    /// The resolved [`SymbolInfo`], or one carrying only the module when the
    /// session is busy or was never initialized.
    pub fn try_get_info_for_address(&self, address: impl Into<Address>) -> SymbolInfo
    {
        let address = address.into();
        let resolved = self
            .session
            .try_with_open(|session, limits| resolve_owned(session, address, limits));
        finish(address, resolved)
    }

    /// Write the human-readable line for `address` without allocating or blocking.
    ///
    /// A busy or unopened session renders the frame as address only. C++
    /// names print mangled on this path; Rust names are demangled in place.
    ///
    /// ## Parameters
    ///
    /// - `out`: Any [`fmt::Write`] sink; a [`FrameBuffer`](crate::FrameBuffer) in crash context
    /// - `address`: A runtime instruction address in this process
    ///
    /// ## Errors
    ///
    /// Only what `out` itself reports.
    ///
    /// ## Example
    ///
    /// ```rust
    /// use crashsym_core::{FrameBuffer, SymbolicationConfig, Symbolicator};
    ///
    /// // Never initialized, so the frame renders as the bare address.
    /// let symbolicator = Symbolicator::new(SymbolicationConfig::default());
    /// let mut out = FrameBuffer::<256>::new();
    /// symbolicator.write_frame_line(&mut out, 0x10_u64)?;
    /// assert_eq!(out.as_str(), "0x0000000000000010 0x0000000000000010");
    /// # Ok::<(), std::fmt::Error>(())
    /// ```
    pub fn write_frame_line<W: fmt::Write>(&self, out: &mut W, address: impl Into<Address>) -> fmt::Result
    {
        let address = address.into();
        let written = self.session.try_with_open(|session, limits| {
            let debug_info = session.has_debug_info();
            let found = session.lookup(address, limits).ok().flatten();
            let function = found.as_ref().and_then(|found| found.function.as_ref());
            let location = found.as_ref().and_then(|found| found.location.as_ref());
            let line = FrameLine {
                address,
                function: function.map(|name| name as &dyn fmt::Display),
                file: location.map(|location| &location.file as &dyn fmt::Display),
                line: location.and_then(|location| location.line),
                debug_info,
            };
            write!(out, "{line}")
        });
        match written {
            Some(result) => result,
            None => write!(out, "{}", bare_frame(address)),
        }
    }

    /// Append the machine-oriented line for `address` to `buffer`.
    ///
    /// Same constraints as [`write_frame_line`](Self::write_frame_line).
    ///
    /// ## Returns
    ///
    /// `false` when the line did not fit; the buffer then stops accepting lines.
    ///
    /// ## Example
    ///
    /// ```rust,no_run
    /// use crashsym_core::{StackTraceBuffer, Symbolicator};
    ///
    /// let symbolicator = Symbolicator::global();
    /// symbolicator.init();
    ///
    /// let mut trace = StackTraceBuffer::<4096>::new();
    /// backtrace::trace(|frame| symbolicator.append_stack_line(&mut trace, frame.ip() as usize));
    /// eprint!("{trace}");
    /// ```
    pub fn append_stack_line<const N: usize>(&self, buffer: &mut StackTraceBuffer<N>, address: impl Into<Address>) -> bool
    {
        let address = address.into();
        with_module_path(address, |module| {
            let module = module.as_ref().map(|module| module as &dyn fmt::Display);
            let pushed = self.session.try_with_open(|session, limits| {
                let found = session.lookup(address, limits).ok().flatten();
                let function = found.as_ref().and_then(|found| found.function.as_ref());
                let location = found.as_ref().and_then(|found| found.location.as_ref());
                buffer.push_line(MachineLine {
                    module,
                    function: function.map(|name| name as &dyn fmt::Display),
                    file: location.map(|location| &location.file as &dyn fmt::Display),
                    line: location.and_then(|location| location.line),
                })
            });
            match pushed {
                Some(pushed) => pushed,
                None => buffer.push_line(MachineLine {
                    module,
                    function: None,
                    file: None,
                    line: None,
                }),
            }
        })
    }

    /// Capture the current stack with `capture` and resolve every frame.
    ///
    /// ## Parameters
    ///
    /// - `capture`: The stack walker, usually [`BacktraceCapture`](crate::BacktraceCapture)
    /// - `max_frames`: Upper bound on frames captured
    ///
    /// ## Returns
    ///
    /// One [`SymbolInfo`] per captured frame, innermost first.
    pub fn symbolicate_stack<C: StackCapture + ?Sized>(&self, capture: &C, max_frames: usize) -> Vec<SymbolInfo>
    {
        capture
            .capture(max_frames)
            .into_iter()
            .map(|address| self.get_info_for_address(address))
            .collect()
    }
}

/// What a successful walk produced, detached from the session's borrow.
struct Resolved
{
    debug_info: bool,
    success: bool,
    function: Option<SymbolName>,
    location: Option<SourceLocation>,
}

fn resolve_owned(session: &mut LoadedSession, address: Address, limits: &TraversalLimits) -> Resolved
{
    let debug_info = session.has_debug_info();
    match session.lookup(address, limits) {
        Ok(Some(found)) => {
            for err in [&found.line_error, &found.function_error].into_iter().flatten() {
                warn!("partial symbolication of {address}: {err}");
            }
            Resolved {
                debug_info,
                success: true,
                function: found.function.map(|name| name.to_symbol_name()),
                location: found.location.map(|location| SourceLocation {
                    file: location.file.to_string(),
                    line: location.line,
                }),
            }
        }
        Ok(None) => Resolved {
            debug_info,
            success: true,
            function: None,
            location: None,
        },
        Err(err) => {
            warn!("symbolication of {address} aborted: {err}");
            Resolved {
                debug_info,
                success: false,
                function: None,
                location: None,
            }
        }
    }
}

fn finish(address: Address, resolved: Option<Resolved>) -> SymbolInfo
{
    let mut info = SymbolInfo::unresolved(address, false);
    info.module = module_path(address);
    if let Some(resolved) = resolved {
        info.debug_info = resolved.debug_info;
        info.success = resolved.success;
        info.function = resolved.function;
        info.location = resolved.location;
    }
    info
}

fn bare_frame(address: Address) -> FrameLine<'static>
{
    FrameLine {
        address,
        function: None,
        file: None,
        line: None,
        debug_info: false,
    }
}

#[cfg(test)]
mod tests
{
    use std::path::PathBuf;
    use std::sync::Barrier;
    use std::thread;

    use super::*;
    use crate::format::FrameBuffer;

    fn unavailable() -> Symbolicator
    {
        Symbolicator::new(SymbolicationConfig {
            executable: PathBuf::from("/nonexistent/crashsym"),
            ..SymbolicationConfig::default()
        })
    }

    #[test]
    fn test_unavailable_session_reports_failure()
    {
        let symbolicator = unavailable();
        let info = symbolicator.get_info_for_address(0x1234_u64);
        assert!(!info.success);
        assert_eq!(info.function, None);
        assert_eq!(info.location, None);
        assert_eq!(symbolicator.init(), SessionStatus::Unavailable);
    }

    #[test]
    fn test_concurrent_failed_open_is_seen_by_all()
    {
        const THREADS: usize = 8;

        let symbolicator = unavailable();
        let barrier = Barrier::new(THREADS);
        let results: Vec<(SessionStatus, SymbolInfo)> = thread::scope(|scope| {
            let workers: Vec<_> = (0..THREADS)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        let status = symbolicator.init();
                        (status, symbolicator.get_info_for_address(0x1234_u64))
                    })
                })
                .collect();
            workers.into_iter().map(|worker| worker.join().unwrap()).collect()
        });

        let (_, first) = &results[0];
        assert!(!first.success);
        for (status, info) in &results {
            assert_eq!(*status, SessionStatus::Unavailable);
            assert_eq!(info, first);
        }
    }

    #[test]
    fn test_unopened_session_renders_address_only()
    {
        let symbolicator = Symbolicator::new(SymbolicationConfig::default());
        let mut out = FrameBuffer::<64>::new();
        symbolicator.write_frame_line(&mut out, 0x10_u64).unwrap();
        assert_eq!(out.as_str(), "0x0000000000000010 0x0000000000000010");
        assert_eq!(symbolicator.session().status(), SessionStatus::Uninitialized);
    }

    #[test]
    fn test_unknown_address_machine_line()
    {
        let symbolicator = unavailable();
        symbolicator.init();
        let mut buffer = StackTraceBuffer::<128>::new();
        assert!(symbolicator.append_stack_line(&mut buffer, 0x10_u64));
        assert_eq!(buffer.as_str(), "Unknown!UnknownFunction + some bytes [Unknown:0]\r\n");
    }
}
