//! Process resource sampling around a job.

use crate::core::result::ResourceMetrics;

/// Cumulative usage of the current process at one instant.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UsageSample {
    /// User-mode CPU seconds since process start.
    pub user_seconds: f64,
    /// Kernel-mode CPU seconds since process start.
    pub system_seconds: f64,
    /// Peak resident set size so far.
    pub peak_rss_bytes: u64,
}

impl UsageSample {
    /// Read the current process's usage counters.
    ///
    /// Returns zeros where the platform offers no counters.
    #[must_use]
    pub fn now() -> Self {
        sample()
    }

    /// Metrics for the interval from `self` to `later`.
    ///
    /// CPU time is the difference between the samples; peak memory is the
    /// process high-water mark at `later`.
    #[must_use]
    pub fn until(&self, later: &Self) -> ResourceMetrics {
        ResourceMetrics::new(
            later.peak_rss_bytes,
            (later.user_seconds - self.user_seconds).max(0.0),
            (later.system_seconds - self.system_seconds).max(0.0),
        )
    }
}

#[cfg(unix)]
#[allow(unsafe_code, clippy::cast_precision_loss, clippy::cast_sign_loss)]
fn sample() -> UsageSample {
    // SAFETY: `rusage` is plain old data and getrusage only writes into it.
    let mut usage: libc::rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, &mut usage) };
    if rc != 0 {
        return UsageSample::default();
    }
    let seconds = |tv: libc::timeval| tv.tv_sec as f64 + tv.tv_usec as f64 / 1_000_000.0;
    let max_rss = usage.ru_maxrss.max(0) as u64;
    // Linux reports kilobytes, macOS reports bytes.
    let peak_rss_bytes = if cfg!(target_os = "macos") {
        max_rss
    } else {
        max_rss.saturating_mul(1024)
    };
    UsageSample {
        user_seconds: seconds(usage.ru_utime),
        system_seconds: seconds(usage.ru_stime),
        peak_rss_bytes,
    }
}

#[cfg(not(unix))]
fn sample() -> UsageSample {
    UsageSample::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_is_never_negative() {
        let before = UsageSample {
            user_seconds: 2.0,
            system_seconds: 1.0,
            peak_rss_bytes: 10,
        };
        let after = UsageSample {
            user_seconds: 1.5,
            system_seconds: 1.25,
            peak_rss_bytes: 20,
        };
        let m = before.until(&after);
        assert!(m.cpu_user_seconds.abs() < f64::EPSILON);
        assert!((m.cpu_system_seconds - 0.25).abs() < 1e-9);
        assert!((m.cpu_total_seconds - 0.25).abs() < 1e-9);
        assert_eq!(m.peak_memory_bytes, 20);
    }

    #[cfg(unix)]
    #[test]
    fn test_sample_reports_resident_memory() {
        assert!(UsageSample::now().peak_rss_bytes > 0);
    }
}
