//! Process RSS measurement.

/// Current resident set size in MiB.
///
/// Reads `VmRSS` from `/proc/self/status` on Linux; falls back to
/// `getrusage`'s `ru_maxrss` (peak, not current, but the closest portable
/// figure) anywhere else or if `/proc` isn't readable.
pub fn current_rss_mb() -> std::io::Result<u64> {
    #[cfg(target_os = "linux")]
    {
        if let Some(kb) = read_proc_status_vm_rss()? {
            return Ok(kb / 1024);
        }
    }

    getrusage_maxrss_mb()
}

#[cfg(target_os = "linux")]
fn read_proc_status_vm_rss() -> std::io::Result<Option<u64>> {
    let status = std::fs::read_to_string("/proc/self/status")?;
    for line in status.lines() {
        if let Some(rest) = line.strip_prefix("VmRSS:") {
            let kb: u64 = rest.trim().trim_end_matches(" kB").trim().parse().unwrap_or(0);
            return Ok(Some(kb));
        }
    }
    Ok(None)
}

fn getrusage_maxrss_mb() -> std::io::Result<u64> {
    // SAFETY: `usage` is zero-initialized and fully written by `getrusage`
    // before being read; `RUSAGE_SELF` requires no other preconditions.
    let maxrss_kb = unsafe {
        let mut usage: libc::rusage = std::mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut usage) != 0 {
            return Err(std::io::Error::last_os_error());
        }
        usage.ru_maxrss
    };

    // Linux reports ru_maxrss in KiB, macOS in bytes.
    #[cfg(target_os = "macos")]
    let mb = (maxrss_kb as u64) / (1024 * 1024);
    #[cfg(not(target_os = "macos"))]
    let mb = (maxrss_kb as u64) / 1024;

    Ok(mb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_rss_is_nonzero_for_a_live_process() {
        let rss = current_rss_mb().expect("RSS should be measurable in tests");
        assert!(rss > 0);
    }
}
