//! OS-level process lookup and termination.

use crate::error::{LightningError, Result};
use tracing::{debug, warn};

/// Whether a process with the given PID exists.
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        // Signal 0 only checks that the process exists
        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            Err(nix::errno::Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(windows)]
    {
        windows_process_exists(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        warn!("Process alive check not implemented for this platform");
        true
    }
}

#[cfg(windows)]
#[allow(unsafe_code)]
fn windows_process_exists(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    // SAFETY: OpenProcess has no memory preconditions; a non-null handle is
    // closed exactly once before returning.
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle.is_null() {
            false
        } else {
            CloseHandle(handle);
            true
        }
    }
}

/// Terminate a process, gracefully first where the platform allows.
///
/// Unix sends SIGTERM, waits up to `timeout_ms`, then SIGKILL. Windows runs
/// `taskkill /F /T`. Returns `true` once the process is gone.
pub fn terminate_process(pid: u32, timeout_ms: u64) -> Result<bool> {
    if !is_process_alive(pid) {
        debug!("Process {} is not running", pid);
        return Ok(true);
    }

    #[cfg(unix)]
    {
        terminate_process_unix(pid, timeout_ms)
    }

    #[cfg(windows)]
    {
        let _ = timeout_ms;
        terminate_process_windows(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = timeout_ms;
        Err(LightningError::ProcessStopFailure {
            message: "process termination not implemented for this platform".into(),
        })
    }
}

#[cfg(unix)]
fn terminate_process_unix(pid: u32, timeout_ms: u64) -> Result<bool> {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::sys::wait::{waitpid, WaitPidFlag};
    use nix::unistd::Pid;
    use std::thread::sleep;
    use std::time::Duration;

    let raw = i32::try_from(pid).map_err(|_| LightningError::ProcessStopFailure {
        message: format!("invalid pid {}", pid),
    })?;
    let nix_pid = Pid::from_raw(raw);

    debug!("Sending SIGTERM to process {}", pid);
    if let Err(e) = kill(nix_pid, Signal::SIGTERM) {
        if e == Errno::ESRCH {
            return Ok(true);
        }
        warn!("Failed to send SIGTERM to {}: {}", pid, e);
    }

    let wait_interval = Duration::from_millis(100);
    for _ in 0..(timeout_ms / 100).max(1) {
        sleep(wait_interval);
        // Reap if it was our child
        let _ = waitpid(nix_pid, Some(WaitPidFlag::WNOHANG));
        if !is_process_alive(pid) {
            debug!("Process {} terminated gracefully", pid);
            return Ok(true);
        }
    }

    debug!("Process {} still running, sending SIGKILL", pid);
    if let Err(e) = kill(nix_pid, Signal::SIGKILL) {
        if e == Errno::ESRCH {
            return Ok(true);
        }
        return Err(LightningError::ProcessStopFailure {
            message: format!("failed to kill process {}: {}", pid, e),
        });
    }

    sleep(wait_interval);
    let _ = waitpid(nix_pid, Some(WaitPidFlag::WNOHANG));
    Ok(!is_process_alive(pid))
}

#[cfg(windows)]
fn terminate_process_windows(pid: u32) -> Result<bool> {
    use std::process::Command;

    debug!("Terminating process {} with taskkill", pid);
    let output = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F", "/T"])
        .output()
        .map_err(|e| LightningError::ProcessStopFailure {
            message: format!("failed to run taskkill: {}", e),
        })?;

    if output.status.success() {
        return Ok(true);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.contains("not found") || stderr.contains("not running") {
        Ok(true)
    } else {
        warn!("taskkill failed for {}: {}", pid, stderr);
        Ok(false)
    }
}

/// Processes running one of the given executables.
///
/// A name matches the full program path or its file name, so `stop` leaves
/// alone `tail -f lightning-search.log` and similar. Returns
/// `(pid, cmdline)` pairs. The current process is never included.
pub fn find_processes_by_executable(names: &[String]) -> Vec<(u32, String)> {
    let own = std::process::id();

    list_processes()
        .into_iter()
        .filter(|(pid, cmdline)| *pid != own && runs_executable(cmdline, names))
        .collect()
}

/// Interpreters whose first operand is the program actually being run.
const SCRIPT_HOSTS: &[&str] = &["sh", "bash", "dash", "zsh"];

/// Whether `cmdline` runs a program named in `names`.
pub fn runs_executable(cmdline: &str, names: &[String]) -> bool {
    let args = split_args(cmdline);
    let Some(first) = args.first() else {
        return false;
    };
    let program = if SCRIPT_HOSTS.contains(&file_name(first)) {
        match args.iter().skip(1).find(|a| !a.starts_with('-')) {
            Some(script) => *script,
            None => return false,
        }
    } else {
        *first
    };

    names
        .iter()
        .any(|name| program == name || file_name(program).eq_ignore_ascii_case(name))
}

fn file_name(path: &str) -> &str {
    path.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(path)
}

/// Split on whitespace, keeping double-quoted arguments whole.
fn split_args(cmdline: &str) -> Vec<&str> {
    let mut args = Vec::new();
    let mut rest = cmdline.trim();
    while !rest.is_empty() {
        if let Some(quoted) = rest.strip_prefix('"') {
            let end = quoted.find('"').unwrap_or(quoted.len());
            args.push(&quoted[..end]);
            rest = quoted.get(end + 1..).unwrap_or("").trim_start();
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            args.push(&rest[..end]);
            rest = rest[end..].trim_start();
        }
    }
    args
}

#[cfg(unix)]
fn list_processes() -> Vec<(u32, String)> {
    use std::process::Command;

    let output = match Command::new("ps").args(["-eo", "pid=,args="]).output() {
        Ok(o) if o.status.success() => o,
        Ok(_) => return vec![],
        Err(e) => {
            debug!("Failed to run ps: {}", e);
            return vec![];
        }
    };

    let own_ps = |cmdline: &str| cmdline.starts_with("ps -eo");
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| {
            let (pid, cmdline) = line.trim().split_once(char::is_whitespace)?;
            let pid: u32 = pid.trim().parse().ok()?;
            let cmdline = cmdline.trim();
            (!own_ps(cmdline)).then(|| (pid, cmdline.to_string()))
        })
        .collect()
}

#[cfg(windows)]
fn list_processes() -> Vec<(u32, String)> {
    use std::process::Command;

    let output = match Command::new("wmic")
        .args(["process", "get", "processid,commandline", "/format:csv"])
        .output()
    {
        Ok(o) if o.status.success() => o,
        Ok(_) => return vec![],
        Err(e) => {
            debug!("Failed to run wmic: {}", e);
            return vec![];
        }
    };

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .skip(1)
        .filter_map(|line| {
            // Node,CommandLine,ProcessId; the command line may itself contain commas
            let line = line.trim();
            let (rest, pid) = line.rsplit_once(',')?;
            let (_, cmdline) = rest.split_once(',')?;
            let pid: u32 = pid.trim().parse().ok()?;
            Some((pid, cmdline.to_string()))
        })
        .collect()
}

#[cfg(not(any(unix, windows)))]
fn list_processes() -> Vec<(u32, String)> {
    vec![]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_nonexistent_process() {
        assert!(!is_process_alive(4_000_000_000));
        assert!(terminate_process(4_000_000_000, 100).unwrap());
    }

    #[test]
    fn test_find_excludes_current_process() {
        let own = std::process::id();
        let exe = std::env::current_exe().unwrap();
        let name = exe.file_name().unwrap().to_string_lossy().to_string();
        let found = find_processes_by_executable(&[name]);
        assert!(found.iter().all(|(pid, _)| *pid != own));
    }

    #[test]
    fn test_matches_program_not_arguments() {
        let names = vec!["lightning-search".to_string(), "lightning-search.exe".to_string()];

        assert!(runs_executable("/opt/app/bin/lightning-search --port 0", &names));
        assert!(runs_executable("lightning-search seed 10", &names));
        assert!(runs_executable("/bin/sh /tmp/x/bin/lightning-search", &names));
        assert!(runs_executable(
            "\"C:\\Program Files\\app\\lightning-search.exe\" serve",
            &names
        ));

        assert!(!runs_executable("tail -f bin/lightning-search.log", &names));
        assert!(!runs_executable(
            "lightning --config lightning-search.json start",
            &names
        ));
        assert!(!runs_executable("grep lightning-search", &names));
        assert!(!runs_executable("", &names));
    }

    #[test]
    fn test_full_path_names_match_exactly() {
        let names = vec!["/tmp/a/bin/lightning-search".to_string()];
        assert!(runs_executable("/bin/sh /tmp/a/bin/lightning-search", &names));
        assert!(!runs_executable("/tmp/b/bin/lightning-search", &names));
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_spawned_process() {
        let mut child = std::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = child.id();
        assert!(terminate_process(pid, 500).unwrap());
        let _ = child.wait();
        assert!(!is_process_alive(pid));
    }
}
