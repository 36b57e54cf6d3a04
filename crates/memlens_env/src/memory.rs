// memory.rs
//! Cross-platform helpers to read the current and peak memory usage of this process.
//! Falls back to zero when the platform offers no reading.

use crate::allocator;
#[cfg(any(target_os = "linux", target_os = "android"))]
use std::sync::OnceLock;

/// Which figure a reading reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryMode {
    /// Total pages the OS has allocated to the process (resident set).
    Allocated,
    /// Bytes actually in use by the application, as seen by the allocator.
    #[default]
    Used,
}

impl MemoryMode {
    /// Maps the toolbar's "real usage" switch onto a mode.
    pub fn from_real_usage(real_usage: bool) -> Self {
        if real_usage {
            MemoryMode::Allocated
        } else {
            MemoryMode::Used
        }
    }

    pub fn is_real_usage(self) -> bool {
        matches!(self, MemoryMode::Allocated)
    }
}

/// Anything that can sample memory usage in bytes.
pub trait MemorySource {
    fn current(&self, mode: MemoryMode) -> u64;
    fn peak(&self, mode: MemoryMode) -> u64;
}

impl<S: MemorySource + ?Sized> MemorySource for Box<S> {
    fn current(&self, mode: MemoryMode) -> u64 {
        (**self).current(mode)
    }

    fn peak(&self, mode: MemoryMode) -> u64 {
        (**self).peak(mode)
    }
}

/// Reads the running process.
///
/// `Used` readings come from [`allocator::CountingAllocator`] when it is the
/// global allocator; otherwise they fall back to the resident set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessMemory;

impl MemorySource for ProcessMemory {
    fn current(&self, mode: MemoryMode) -> u64 {
        match mode {
            MemoryMode::Used => allocator::live_bytes().unwrap_or_else(|| resident_bytes().unwrap_or(0)),
            MemoryMode::Allocated => resident_bytes().unwrap_or(0),
        }
    }

    fn peak(&self, mode: MemoryMode) -> u64 {
        match mode {
            MemoryMode::Used => allocator::peak_bytes().unwrap_or_else(|| peak_resident_bytes().unwrap_or(0)),
            MemoryMode::Allocated => peak_resident_bytes().unwrap_or(0),
        }
    }
}

/* --------------------- Linux / Android --------------------- */

#[cfg(any(target_os = "linux", target_os = "android"))]
fn page_size() -> u64 {
    static PAGE_SIZE: OnceLock<u64> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| {
        let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if n > 0 { n as u64 } else { 4096 }
    })
}
#[cfg(any(target_os = "linux", target_os = "android"))]
fn resident_bytes() -> Option<u64> {
    // /proc/self/statm: "size resident shared text lib data dt", in pages
    let text = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = text.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * page_size())
}
#[cfg(any(target_os = "linux", target_os = "android"))]
fn peak_resident_bytes() -> Option<u64> {
    // /proc/self/status: "VmHWM:     12345 kB"
    let text = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix("VmHWM:") {
            let kb: u64 = rest.split_whitespace().next()?.parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

/* --------------------- macOS / iOS (Darwin) --------------------- */

#[cfg(target_os = "macos")]
fn resident_bytes() -> Option<u64> {
    let mut info: libc::proc_taskinfo = unsafe { std::mem::zeroed() };
    let size = std::mem::size_of::<libc::proc_taskinfo>() as libc::c_int;
    let rc = unsafe {
        libc::proc_pidinfo(
            libc::getpid(),
            libc::PROC_PIDTASKINFO,
            0,
            &mut info as *mut _ as *mut libc::c_void,
            size,
        )
    };
    if rc == size { Some(info.pti_resident_size) } else { None }
}
#[cfg(target_os = "ios")]
fn resident_bytes() -> Option<u64> { None }
#[cfg(any(target_os = "macos", target_os = "ios"))]
fn peak_resident_bytes() -> Option<u64> {
    // ru_maxrss is reported in bytes on Darwin
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
    if rc == 0 && usage.ru_maxrss > 0 { Some(usage.ru_maxrss as u64) } else { None }
}

/* -------------------------- Windows -------------------------- */

#[cfg(target_os = "windows")]
fn process_counters() -> Option<windows_sys::Win32::System::ProcessStatus::PROCESS_MEMORY_COUNTERS> {
    use windows_sys::Win32::System::ProcessStatus::{GetProcessMemoryInfo, PROCESS_MEMORY_COUNTERS};
    use windows_sys::Win32::System::Threading::GetCurrentProcess;
    unsafe {
        let mut counters: PROCESS_MEMORY_COUNTERS = std::mem::zeroed();
        counters.cb = std::mem::size_of::<PROCESS_MEMORY_COUNTERS>() as u32;
        if GetProcessMemoryInfo(GetCurrentProcess(), &mut counters, counters.cb) != 0 {
            Some(counters)
        } else {
            None
        }
    }
}
#[cfg(target_os = "windows")]
fn resident_bytes() -> Option<u64> {
    process_counters().map(|c| c.WorkingSetSize as u64)
}
#[cfg(target_os = "windows")]
fn peak_resident_bytes() -> Option<u64> {
    process_counters().map(|c| c.PeakWorkingSetSize as u64)
}

/* --------------------- Other / WASM / Fallbacks --------------------- */

#[cfg(not(any(
    target_os = "windows",
    target_os = "macos",
    target_os = "ios",
    target_os = "linux",
    target_os = "android"
)))]
fn resident_bytes() -> Option<u64> { None }
#[cfg(not(any(
    target_os = "windows",
    target_os = "macos",
    target_os = "ios",
    target_os = "linux",
    target_os = "android"
)))]
fn peak_resident_bytes() -> Option<u64> { None }
