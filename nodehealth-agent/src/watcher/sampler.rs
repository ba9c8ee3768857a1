//! CPU-time sampling from OS process accounting
//!
//! Linux reads `/proc/<pid>/stat`; other Unix systems ask `ps`.

use super::{CpuTimeSample, CpuTimeSource};
use crate::error::{HealthError, Result};
use chrono::Utc;

/// Samples user CPU time of live processes
pub struct ProcCpuTimes {
    #[cfg_attr(not(target_os = "linux"), allow(dead_code))]
    ticks_per_second: f64,
}

impl ProcCpuTimes {
    pub fn new() -> Self {
        Self {
            ticks_per_second: clock_ticks(),
        }
    }
}

impl Default for ProcCpuTimes {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuTimeSource for ProcCpuTimes {
    fn sample(&mut self, pid: u32) -> Result<CpuTimeSample> {
        let user_cpu_seconds = self.user_seconds(pid)?;
        Ok(CpuTimeSample {
            timestamp: Utc::now(),
            user_cpu_seconds,
        })
    }
}

fn gone(pid: u32, reason: impl Into<String>) -> HealthError {
    HealthError::ProcessIntrospection {
        pid,
        reason: reason.into(),
    }
}

#[cfg(unix)]
fn clock_ticks() -> f64 {
    use nix::unistd::{sysconf, SysconfVar};
    match sysconf(SysconfVar::CLK_TCK) {
        Ok(Some(ticks)) if ticks > 0 => ticks as f64,
        _ => 100.0,
    }
}

#[cfg(not(unix))]
fn clock_ticks() -> f64 {
    100.0
}

impl ProcCpuTimes {
    #[cfg(target_os = "linux")]
    fn user_seconds(&self, pid: u32) -> Result<f64> {
        let content = std::fs::read_to_string(format!("/proc/{}/stat", pid))
            .map_err(|e| gone(pid, e.to_string()))?;
        let (state, utime) = parse_proc_stat(&content)
            .ok_or_else(|| gone(pid, "unparseable /proc stat line"))?;

        // Zombies have exited; they only wait to be reaped
        if state == 'Z' || state == 'X' {
            return Err(gone(pid, "process has exited"));
        }
        Ok(utime as f64 / self.ticks_per_second)
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    fn user_seconds(&self, pid: u32) -> Result<f64> {
        let output = std::process::Command::new("ps")
            .args(["-o", "utime=", "-p", &pid.to_string()])
            .output()
            .map_err(|e| gone(pid, format!("failed to run ps: {}", e)))?;

        if !output.status.success() {
            return Err(gone(pid, "no such process"));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        parse_ps_time(text.trim()).ok_or_else(|| gone(pid, format!("unparseable ps time {:?}", text.trim())))
    }

    #[cfg(not(unix))]
    fn user_seconds(&self, pid: u32) -> Result<f64> {
        Err(gone(pid, "CPU time sampling is not supported on this platform"))
    }
}

/// Extract process state and utime (clock ticks) from a `/proc/<pid>/stat` line
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
pub(crate) fn parse_proc_stat(content: &str) -> Option<(char, u64)> {
    // comm may contain spaces and parentheses; fields resume after the last ')'
    let rest = &content[content.rfind(')')? + 1..];
    let mut fields = rest.split_whitespace();
    let state = fields.next()?.chars().next()?;
    // state is field 3, utime is field 14
    let utime = fields.nth(10)?.parse().ok()?;
    Some((state, utime))
}

/// Parse `ps` cumulative time: `[[dd-]hh:]mm:ss[.cc]`
#[cfg_attr(not(all(unix, not(target_os = "linux"))), allow(dead_code))]
pub(crate) fn parse_ps_time(text: &str) -> Option<f64> {
    let (days, clock) = match text.split_once('-') {
        Some((d, rest)) => (d.parse::<f64>().ok()?, rest),
        None => (0.0, text),
    };

    let mut seconds = 0.0;
    for part in clock.split(':') {
        seconds = seconds * 60.0 + part.parse::<f64>().ok()?;
    }
    Some(days * 86_400.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_proc_stat() {
        let line = "4242 (python3) S 1 4242 4242 0 -1 4194560 12034 0 0 0 1530 87 0 0 20 0 3 0 81234 0 0";
        assert_eq!(parse_proc_stat(line), Some(('S', 1530)));
    }

    #[test]
    fn test_parse_proc_stat_with_tricky_comm() {
        let line = "77 (my (odd) app) R 1 77 77 0 -1 0 0 0 0 0 250 3 0 0 20 0 1 0 1 0 0";
        assert_eq!(parse_proc_stat(line), Some(('R', 250)));
    }

    #[test]
    fn test_parse_proc_stat_truncated() {
        assert_eq!(parse_proc_stat("77 (app) R 1 2"), None);
        assert_eq!(parse_proc_stat("garbage"), None);
    }

    #[test]
    fn test_parse_ps_time() {
        assert_eq!(parse_ps_time("0:00.12"), Some(0.12));
        assert_eq!(parse_ps_time("2:05.50"), Some(125.5));
        assert_eq!(parse_ps_time("01:00:00"), Some(3600.0));
        assert_eq!(parse_ps_time("1-00:00:01"), Some(86_401.0));
        assert_eq!(parse_ps_time(""), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_samples_own_process() {
        let mut source = ProcCpuTimes::new();
        let sample = source.sample(std::process::id()).unwrap();
        assert!(sample.user_cpu_seconds >= 0.0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_missing_process_is_introspection_error() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id();
        child.wait().unwrap();

        let mut source = ProcCpuTimes::new();
        let err = source.sample(pid).unwrap_err();
        assert!(err.is_expected_exit());
    }
}
