//! Proxy core process coordination.
//!
//! [`ServiceCoordinator`] is the seam the binary swap talks to. It only
//! needs three bounded operations: query, stop and start. The default
//! implementation, [`PidFileService`], tracks the core through a pid file in
//! the run directory.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use thiserror::Error;
use wait_timeout::ChildExt;
use xh_schema::{CoreType, UnsupportedCoreType};

use crate::config::CoreSection;

const PID_FILE: &str = "core.pid";
const LOG_FILE: &str = "error.log";

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("kill -TERM {pid} failed")]
    Signal { pid: String },

    #[error("core (pid {pid}) did not exit within {timeout:?}")]
    StillRunning { pid: String, timeout: Duration },

    #[error("core exited right after start: {status}")]
    ExitedEarly { status: String },
}

/// Observed state of the core process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceState {
    pub running: bool,
    pub pid: Option<String>,
}

/// Query/stop/start access to the supervised core.
///
/// Implementations must never block indefinitely.
pub trait ServiceCoordinator: Send + Sync {
    fn is_running(&self) -> ServiceState;

    fn stop(&self) -> Result<(), ServiceError>;

    fn start(&self) -> Result<(), ServiceError>;
}

/// Tracks the core through `<run_dir>/core.pid`.
#[derive(Debug, Clone)]
pub struct PidFileService {
    core_path: PathBuf,
    args: Vec<String>,
    run_dir: PathBuf,
    stop_timeout: Duration,
    start_grace: Duration,
}

impl PidFileService {
    pub fn new(
        core_path: impl Into<PathBuf>,
        args: Vec<String>,
        run_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            core_path: core_path.into(),
            args,
            run_dir: run_dir.into(),
            stop_timeout: Duration::from_secs(3),
            start_grace: Duration::from_millis(500),
        }
    }

    /// Build from the `[core]` section, using per-core default arguments
    /// unless `args` is set.
    pub fn from_config(core: &CoreSection) -> Result<Self, UnsupportedCoreType> {
        let core_type = core.core_type()?;
        let args = core
            .args
            .clone()
            .unwrap_or_else(|| default_args(core_type, &core.config_path(), &core.data_dir));
        Ok(Self::new(core.core_path(core_type), args, &core.run_dir))
    }

    pub fn pid_file(&self) -> PathBuf {
        self.run_dir.join(PID_FILE)
    }

    fn read_pid(&self) -> Option<u32> {
        fs::read_to_string(self.pid_file())
            .ok()
            .and_then(|s| s.trim().parse().ok())
    }
}

/// Start arguments each core expects by default.
pub fn default_args(core: CoreType, config: &Path, data_dir: &Path) -> Vec<String> {
    match core {
        CoreType::Xray => vec![
            "run".to_string(),
            "-confdir".to_string(),
            config.display().to_string(),
        ],
        CoreType::SingBox => vec![
            "run".to_string(),
            "-D".to_string(),
            data_dir.display().to_string(),
            "-C".to_string(),
            config.display().to_string(),
        ],
    }
}

/// A pid is alive when `/proc/<pid>` exists and is not a zombie.
fn process_alive(pid: u32) -> bool {
    let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    // Format: `pid (comm) state ...`; comm may itself contain ')'.
    match stat.rfind(')').and_then(|i| stat[i + 1..].trim_start().chars().next()) {
        Some('Z' | 'X') | None => false,
        Some(_) => true,
    }
}

impl ServiceCoordinator for PidFileService {
    fn is_running(&self) -> ServiceState {
        match self.read_pid() {
            Some(pid) if process_alive(pid) => ServiceState {
                running: true,
                pid: Some(pid.to_string()),
            },
            _ => ServiceState::default(),
        }
    }

    fn stop(&self) -> Result<(), ServiceError> {
        let Some(pid) = self.is_running().pid else {
            fs::remove_file(self.pid_file()).ok();
            return Ok(());
        };

        tracing::debug!("Sending SIGTERM to core (pid {pid})");
        let status = Command::new("kill")
            .args(["-TERM", pid.as_str()])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;
        if !status.success() {
            return Err(ServiceError::Signal { pid });
        }

        let deadline = Instant::now() + self.stop_timeout;
        while self.is_running().running {
            if Instant::now() >= deadline {
                return Err(ServiceError::StillRunning {
                    pid,
                    timeout: self.stop_timeout,
                });
            }
            std::thread::sleep(Duration::from_millis(100));
        }

        fs::remove_file(self.pid_file()).ok();
        tracing::info!("Core (pid {pid}) stopped");
        Ok(())
    }

    fn start(&self) -> Result<(), ServiceError> {
        let state = self.is_running();
        if state.running {
            tracing::debug!("Core already running (pid {:?})", state.pid);
            return Ok(());
        }

        fs::create_dir_all(&self.run_dir)?;
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.run_dir.join(LOG_FILE))?;

        let mut child = Command::new(&self.core_path)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(log)
            .spawn()?;

        if let Some(status) = child.wait_timeout(self.start_grace)? {
            return Err(ServiceError::ExitedEarly {
                status: status.to_string(),
            });
        }

        fs::write(self.pid_file(), child.id().to_string())?;
        tracing::info!("Core started (pid {})", child.id());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_args() {
        let xray = default_args(CoreType::Xray, Path::new("/c"), Path::new("/d"));
        assert_eq!(xray, ["run", "-confdir", "/c"]);
        let sb = default_args(CoreType::SingBox, Path::new("/c.json"), Path::new("/d"));
        assert_eq!(sb, ["run", "-D", "/d", "-C", "/c.json"]);
    }

    #[test]
    fn test_no_pid_file_is_not_running() {
        let dir = tempdir().unwrap();
        let service = PidFileService::new("/bin/true", vec![], dir.path());
        assert_eq!(service.is_running(), ServiceState::default());
        // Stopping a stopped service is a no-op.
        service.stop().unwrap();
    }

    #[test]
    fn test_garbage_pid_file_is_not_running() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(PID_FILE), "not-a-pid").unwrap();
        let service = PidFileService::new("/bin/true", vec![], dir.path());
        assert!(!service.is_running().running);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_live_pid_is_running() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(PID_FILE), std::process::id().to_string()).unwrap();
        let service = PidFileService::new("/bin/true", vec![], dir.path());
        let state = service.is_running();
        assert!(state.running);
        assert_eq!(state.pid, Some(std::process::id().to_string()));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_start_then_stop() {
        let dir = tempdir().unwrap();
        let service = PidFileService::new(
            "/bin/sh",
            vec!["-c".to_string(), "exec sleep 30".to_string()],
            dir.path(),
        );

        service.start().unwrap();
        assert!(service.is_running().running);
        assert!(service.pid_file().exists());

        service.stop().unwrap();
        assert!(!service.is_running().running);
        assert!(!service.pid_file().exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_start_reports_early_exit() {
        let dir = tempdir().unwrap();
        let service = PidFileService::new(
            "/bin/sh",
            vec!["-c".to_string(), "exit 3".to_string()],
            dir.path(),
        );
        let err = service.start().unwrap_err();
        assert!(matches!(err, ServiceError::ExitedEarly { .. }));
        assert!(!service.pid_file().exists());
    }

    #[test]
    fn test_start_missing_binary() {
        let dir = tempdir().unwrap();
        let service = PidFileService::new(dir.path().join("nope"), vec![], dir.path());
        assert!(matches!(service.start(), Err(ServiceError::Io(_))));
    }
}
