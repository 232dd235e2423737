//! Module resolver.
//!
//! Maps a runtime address to the loaded image that contains it using the
//! dynamic loader's own bookkeeping (`dladdr`), independently of any debug
//! info. Also reports where the main executable was mapped: its load bias
//! turns runtime addresses into the link-time addresses DWARF speaks in, and
//! its segments tell executable code apart from everything else.

use std::ffi::CStr;
use std::ops::Range;

use crate::types::Address;

/// Call `f` with the path of the image containing `address`, as the loader
/// reports it. `None` when no loaded image claims the address.
///
/// The path is borrowed from loader-owned memory and is only handed out for
/// the duration of the call. Nothing is allocated.
#[cfg(unix)]
pub(crate) fn with_module_path<R>(address: Address, f: impl FnOnce(Option<&str>) -> R) -> R
{
    let Ok(raw) = usize::try_from(address.value()) else {
        return f(None);
    };
    // SAFETY: `Dl_info` is plain data and all-zero is a valid value for it.
    let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
    // SAFETY: `dladdr` only inspects the address value; it never dereferences it.
    let found = unsafe { libc::dladdr(raw as *const libc::c_void, &mut info) } != 0;
    if !found || info.dli_fname.is_null() {
        return f(None);
    }
    // SAFETY: on success `dli_fname` points to a NUL-terminated string owned by
    // the loader that stays valid while the image is loaded.
    let path = unsafe { CStr::from_ptr(info.dli_fname) };
    f(path.to_str().ok().filter(|path| !path.is_empty()))
}

#[cfg(not(unix))]
pub(crate) fn with_module_path<R>(_address: Address, f: impl FnOnce(Option<&str>) -> R) -> R
{
    f(None)
}

/// Owned variant of [`with_module_path`].
pub(crate) fn module_path(address: Address) -> Option<String>
{
    with_module_path(address, |path| path.map(str::to_owned))
}

/// Where the main executable sits in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ExecutableMapping
{
    /// Runtime address minus link-time address. Zero for non-PIE executables.
    pub load_bias: u64,
    /// Runtime ranges of the executable's loadable segments.
    pub segments: Vec<Range<u64>>,
}

impl ExecutableMapping
{
    /// Whether `address` falls inside the executable rather than a shared
    /// library or unmapped memory. An empty segment list filters nothing.
    pub(crate) fn covers(&self, address: Address) -> bool
    {
        self.segments.is_empty() || self.segments.iter().any(|segment| segment.contains(&address.value()))
    }
}

/// Ask the loader where the main executable was mapped.
///
/// Uses `dl_iterate_phdr`, which reports the main program first. Elsewhere the
/// bias is zero and no segments are known.
#[cfg(target_os = "linux")]
pub(crate) fn executable_mapping() -> ExecutableMapping
{
    unsafe extern "C" fn first_object(info: *mut libc::dl_phdr_info, _size: libc::size_t, data: *mut libc::c_void) -> libc::c_int
    {
        // SAFETY: the loader hands us a valid `dl_phdr_info`, and `data` is the
        // `ExecutableMapping` passed in below.
        let (info, mapping) = unsafe { (&*info, &mut *data.cast::<ExecutableMapping>()) };

        #[allow(clippy::useless_conversion)]
        let bias = u64::from(info.dlpi_addr);
        mapping.load_bias = bias;
        if !info.dlpi_phdr.is_null() {
            // SAFETY: the loader guarantees `dlpi_phnum` program headers at `dlpi_phdr`.
            let headers = unsafe { std::slice::from_raw_parts(info.dlpi_phdr, usize::from(info.dlpi_phnum)) };
            for header in headers.iter().filter(|header| header.p_type == libc::PT_LOAD) {
                #[allow(clippy::useless_conversion)]
                let start = bias.wrapping_add(u64::from(header.p_vaddr));
                #[allow(clippy::useless_conversion)]
                let end = start.saturating_add(u64::from(header.p_memsz));
                mapping.segments.push(start..end);
            }
        }
        // The main program is always reported first; stop there.
        1
    }

    let mut mapping = ExecutableMapping::default();
    // SAFETY: the callback only writes through `data`, which points at `mapping`.
    unsafe {
        libc::dl_iterate_phdr(Some(first_object), std::ptr::addr_of_mut!(mapping).cast());
    }
    mapping
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn executable_mapping() -> ExecutableMapping
{
    ExecutableMapping::default()
}
