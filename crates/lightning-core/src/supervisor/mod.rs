//! Engine process supervisor.
//!
//! Owns the lifecycle of the engine binary: compile it per platform target,
//! start it attached or detached, stop running instances, check health, and
//! stream child output through the [`OutputRenderer`].
//!
//! ```rust,ignore
//! let mut supervisor = EngineSupervisor::new(&config);
//! supervisor.compile(&[PlatformTarget::deployment()]).await?;
//! let outcome = supervisor.start(true).await?;
//! ```

mod env;
mod output;
pub mod platform;
mod target;

pub use env::{EngineEnvironment, ENGINE_ENV_VARS};
pub use output::{Channel, OutputRenderer, SharedBuffer};
pub use target::PlatformTarget;

use crate::config::{BuildConfig, EngineConfig, LightningConfig, NetworkConfig, ServiceConfig};
use crate::error::{LightningError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Lifecycle state of the engine process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessState {
    NotBuilt,
    Building,
    Built,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl ProcessState {
    pub fn can_transition_to(self, to: ProcessState) -> bool {
        use ProcessState::*;
        if to == NotBuilt {
            return true;
        }
        matches!(
            (self, to),
            (NotBuilt, Building)
                | (Building, Built)
                | (Built, Starting)
                | (Starting, Running)
                | (Running, Stopping)
                | (Stopping, Stopped)
                | (Building | Starting | Running, Failed)
                | (Stopped | Failed | Built, Building)
                | (Stopped | Failed, Starting)
                | (Running, Stopped)
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The supervised engine process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pub state: ProcessState,
    pub pid: Option<u32>,
}

impl ProcessHandle {
    fn transition(&mut self, to: ProcessState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(LightningError::InvalidTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        debug!("Engine state {} -> {}", self.state, to);
        self.state = to;
        Ok(())
    }
}

/// How `start` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// Attached run finished with this status.
    Exited(ExitStatus),
    /// Detached process is running with this PID.
    Detached { pid: u32 },
}

/// How `stop` ended. Both are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped { count: usize },
    NotRunning,
}

pub struct EngineSupervisor {
    handle: ProcessHandle,
    build: BuildConfig,
    service: ServiceConfig,
    environment: EngineEnvironment,
    toolchain: Vec<String>,
    host: Option<PlatformTarget>,
    process_names: Vec<String>,
    renderer: OutputRenderer,
}

impl EngineSupervisor {
    pub fn new(config: &LightningConfig) -> Self {
        let host = PlatformTarget::host();
        let build = config.build.clone();

        Self {
            handle: ProcessHandle {
                state: installed_state(&build, host),
                pid: None,
            },
            build,
            service: config.service.clone(),
            environment: EngineEnvironment::from_config(config),
            toolchain: default_toolchain(),
            host,
            process_names: PlatformTarget::ALL
                .iter()
                .map(|t| t.binary_name().to_string())
                .collect(),
            renderer: OutputRenderer::stdio(),
        }
    }

    /// Replace the build command (program followed by its arguments).
    pub fn with_toolchain(mut self, command: Vec<String>) -> Self {
        self.toolchain = command;
        self
    }

    pub fn with_renderer(mut self, renderer: OutputRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// Executables `stop` treats as engine instances: file names, or full
    /// paths to match one install only.
    pub fn with_process_names(mut self, names: Vec<String>) -> Self {
        self.process_names = names;
        self
    }

    pub fn with_host(mut self, host: Option<PlatformTarget>) -> Self {
        self.host = host;
        self.handle.state = installed_state(&self.build, host);
        self
    }

    pub fn handle(&self) -> &ProcessHandle {
        &self.handle
    }

    pub fn state(&self) -> ProcessState {
        self.handle.state
    }

    pub fn environment(&self) -> &EngineEnvironment {
        &self.environment
    }

    pub fn binary_path(&self, target: PlatformTarget) -> PathBuf {
        self.build.bin_dir.join(target.binary_name())
    }

    pub fn pid_file(&self) -> PathBuf {
        self.build.bin_dir.join(EngineConfig::PID_FILE_NAME)
    }

    pub fn log_file(&self) -> PathBuf {
        self.build.bin_dir.join(EngineConfig::LOG_FILE_NAME)
    }

    /// Installed binary for the host platform.
    pub fn host_binary(&self) -> Result<PathBuf> {
        let host = self.host.ok_or_else(|| LightningError::Config {
            message: "no engine build target matches this platform".into(),
        })?;
        let path = self.binary_path(host);
        if !path.is_file() {
            return Err(LightningError::BinaryNotFound { path });
        }
        Ok(path)
    }

    // ---------------------------------------------------------------------
    // Compile
    // ---------------------------------------------------------------------

    /// Build and install the engine for each target, in order.
    ///
    /// The first failing target aborts with `CompileFailure`; binaries
    /// installed for earlier targets are kept.
    pub async fn compile(&mut self, targets: &[PlatformTarget]) -> Result<Vec<PathBuf>> {
        let (program, args) = self.toolchain.split_first().ok_or_else(|| {
            LightningError::Config {
                message: "empty build toolchain command".into(),
            }
        })?;
        let (program, args) = (program.clone(), args.to_vec());

        std::fs::create_dir_all(&self.build.bin_dir)
            .map_err(|e| LightningError::io("create bin directory", &self.build.bin_dir, e))?;
        self.handle.transition(ProcessState::Building)?;

        let mut installed = Vec::with_capacity(targets.len());
        for target in targets {
            match self.compile_target(*target, &program, &args).await {
                Ok(path) => installed.push(path),
                Err(e) => {
                    self.handle.transition(ProcessState::Failed)?;
                    return Err(e);
                }
            }
        }

        self.handle.transition(ProcessState::Built)?;
        Ok(installed)
    }

    async fn compile_target(
        &mut self,
        target: PlatformTarget,
        program: &str,
        args: &[String],
    ) -> Result<PathBuf> {
        let failure = |message: String| LightningError::CompileFailure {
            target: target.to_string(),
            message,
        };

        info!("Compiling engine for {} ({})", target, target.triple());
        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.build.source_dir)
            .env("CARGO_BUILD_TARGET", target.triple())
            .env("CARGO_TARGET_DIR", &self.build.target_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        self.environment.apply_inherited(&mut cmd);

        let child = cmd
            .spawn()
            .map_err(|e| failure(format!("failed to run {}: {}", program, e)))?;
        let (status, last_diagnostic) = self.stream_child(child).await?;
        if !status.success() {
            let detail = last_diagnostic.unwrap_or_else(|| status.to_string());
            return Err(failure(detail));
        }

        let artifact = self
            .build
            .target_dir
            .join(target.triple())
            .join("release")
            .join(target.artifact_name());
        if !artifact.is_file() {
            return Err(failure(format!(
                "build succeeded but {} was not produced",
                artifact.display()
            )));
        }

        let dest = self.binary_path(target);
        std::fs::copy(&artifact, &dest)
            .map_err(|e| failure(format!("failed to install {}: {}", dest.display(), e)))?;
        mark_executable(&dest)?;
        info!("Installed engine for {} at {}", target, dest.display());
        Ok(dest)
    }

    // ---------------------------------------------------------------------
    // Start
    // ---------------------------------------------------------------------

    /// Start the host binary, attached (blocks until exit) or detached.
    pub async fn start(&mut self, daemon: bool) -> Result<StartOutcome> {
        let binary = self.host_binary()?;
        if self.handle.state == ProcessState::NotBuilt {
            // Installed by an earlier process
            self.handle.state = ProcessState::Built;
        }
        self.handle.transition(ProcessState::Starting)?;

        if daemon {
            match self.spawn_detached(&binary) {
                Ok(pid) => {
                    self.handle.pid = Some(pid);
                    self.handle.transition(ProcessState::Running)?;
                    Ok(StartOutcome::Detached { pid })
                }
                Err(e) => {
                    self.handle.transition(ProcessState::Failed)?;
                    Err(e)
                }
            }
        } else {
            let mut cmd = Command::new(&binary);
            self.environment.apply_isolated(&mut cmd);
            let child = match spawn_piped(&mut cmd) {
                Ok(child) => child,
                Err(e) => {
                    self.handle.transition(ProcessState::Failed)?;
                    return Err(e);
                }
            };
            self.handle.pid = child.id();
            self.handle.transition(ProcessState::Running)?;
            info!("Engine running attached (pid {:?})", self.handle.pid);

            let (status, _) = self.stream_child(child).await?;
            self.handle.pid = None;
            if status.success() {
                self.handle.transition(ProcessState::Stopped)?;
            } else {
                warn!("Engine exited with {}", status);
                self.handle.transition(ProcessState::Failed)?;
            }
            Ok(StartOutcome::Exited(status))
        }
    }

    fn spawn_detached(&self, binary: &Path) -> Result<u32> {
        let log_path = self.log_file();
        let log = std::fs::File::create(&log_path)
            .map_err(|e| LightningError::io("create log file", &log_path, e))?;
        let log_err = log
            .try_clone()
            .map_err(|e| LightningError::io("clone log file handle", &log_path, e))?;

        let mut cmd = std::process::Command::new(binary);
        cmd.env_clear()
            .envs(self.environment.isolated())
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));
        detach(&mut cmd);

        let child = cmd.spawn().map_err(|e| LightningError::LaunchFailed {
            message: format!("{}: {}", binary.display(), e),
        })?;
        let pid = child.id();

        let pid_file = self.pid_file();
        if let Err(e) = std::fs::write(&pid_file, pid.to_string()) {
            warn!("Failed to write PID file {}: {}", pid_file.display(), e);
        }
        info!(
            "Engine started in background (pid {}, log {})",
            pid,
            log_path.display()
        );
        Ok(pid)
    }

    /// Run the host binary attached with extra arguments, e.g. `seed 1000`.
    ///
    /// Does not touch the service state.
    pub async fn run_tool(&mut self, args: &[String]) -> Result<ExitStatus> {
        let binary = self.host_binary()?;
        let mut cmd = Command::new(&binary);
        cmd.args(args);
        self.environment.apply_isolated(&mut cmd);
        let child = spawn_piped(&mut cmd)?;
        let (status, _) = self.stream_child(child).await?;
        Ok(status)
    }

    // ---------------------------------------------------------------------
    // Stop
    // ---------------------------------------------------------------------

    /// Terminate every running engine instance. Idempotent.
    pub fn stop(&mut self) -> Result<StopOutcome> {
        let tracked = self.handle.state == ProcessState::Running;
        if tracked {
            self.handle.transition(ProcessState::Stopping)?;
        }

        let processes = platform::find_processes_by_executable(&self.process_names);
        let mut stopped = 0usize;
        let mut failures = Vec::new();
        for (pid, cmdline) in &processes {
            debug!("Stopping engine process {}: {}", pid, cmdline);
            match platform::terminate_process(*pid, EngineConfig::STOP_TIMEOUT_MS) {
                Ok(true) => stopped += 1,
                Ok(false) => failures.push(format!("process {} is still running", pid)),
                Err(e) => failures.push(e.to_string()),
            }
        }

        let pid_file = self.pid_file();
        if pid_file.exists() {
            if let Err(e) = std::fs::remove_file(&pid_file) {
                warn!("Failed to remove PID file {}: {}", pid_file.display(), e);
            }
        }

        if !failures.is_empty() {
            if tracked {
                self.handle.transition(ProcessState::Failed).ok();
            }
            return Err(LightningError::ProcessStopFailure {
                message: failures.join("; "),
            });
        }

        if tracked {
            self.handle.pid = None;
            self.handle.transition(ProcessState::Stopped)?;
        }

        if stopped == 0 {
            info!("Search engine is not running");
            Ok(StopOutcome::NotRunning)
        } else {
            info!("Stopped {} search engine process(es)", stopped);
            Ok(StopOutcome::Stopped { count: stopped })
        }
    }

    /// Stop the engine and remove installed binaries and runtime files.
    pub fn uninstall(&mut self) -> Result<StopOutcome> {
        let outcome = self.stop()?;

        let mut files: Vec<PathBuf> = PlatformTarget::ALL
            .iter()
            .map(|t| self.binary_path(*t))
            .collect();
        files.push(self.pid_file());
        files.push(self.log_file());

        for path in files {
            if path.exists() {
                std::fs::remove_file(&path)
                    .map_err(|e| LightningError::io("remove engine file", &path, e))?;
                debug!("Removed {}", path.display());
            }
        }

        self.handle.pid = None;
        self.handle.transition(ProcessState::NotBuilt)?;
        Ok(outcome)
    }

    // ---------------------------------------------------------------------
    // Health
    // ---------------------------------------------------------------------

    /// Whether the engine accepts TCP connections on its configured address.
    pub async fn health(&self) -> bool {
        let addr = format!("{}:{}", self.service.host, self.service.port);
        matches!(
            tokio::time::timeout(
                NetworkConfig::HEALTH_CHECK_TIMEOUT,
                tokio::net::TcpStream::connect(&addr)
            )
            .await,
            Ok(Ok(_))
        )
    }

    /// Poll `health` until it succeeds or `timeout` elapses.
    pub async fn wait_for_ready(&self, timeout: Duration) -> bool {
        let started = Instant::now();
        while started.elapsed() < timeout {
            if self.health().await {
                info!("Search engine is ready");
                return true;
            }
            tokio::time::sleep(NetworkConfig::READY_POLL_INTERVAL).await;
        }
        warn!("Search engine did not become ready within {:?}", timeout);
        false
    }

    // ---------------------------------------------------------------------
    // Output streaming
    // ---------------------------------------------------------------------

    /// Render both pipes of `child` until it exits.
    ///
    /// Returns the exit status and the last diagnostic line seen.
    async fn stream_child(&mut self, mut child: Child) -> Result<(ExitStatus, Option<String>)> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(stdout, Channel::Primary, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(stderr, Channel::Diagnostic, tx.clone()));
        }
        drop(tx);

        let mut last_diagnostic = None;
        while let Some((channel, line)) = rx.recv().await {
            self.renderer.line(channel, &line)?;
            if channel == Channel::Diagnostic {
                last_diagnostic = Some(line);
            }
        }
        self.renderer.finish()?;

        let status = child.wait().await?;
        Ok((status, last_diagnostic))
    }
}

/// `Built` when the host binary is already installed, else `NotBuilt`.
fn installed_state(build: &BuildConfig, host: Option<PlatformTarget>) -> ProcessState {
    let installed = host
        .map(|t| build.bin_dir.join(t.binary_name()).is_file())
        .unwrap_or(false);
    if installed {
        ProcessState::Built
    } else {
        ProcessState::NotBuilt
    }
}

fn default_toolchain() -> Vec<String> {
    ["cargo", "build", "--release", "-p", EngineConfig::PACKAGE_NAME]
        .into_iter()
        .map(String::from)
        .collect()
}

fn spawn_piped(cmd: &mut Command) -> Result<Child> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| LightningError::LaunchFailed {
            message: e.to_string(),
        })
}

async fn forward_lines<R>(reader: R, channel: Channel, tx: mpsc::UnboundedSender<(Channel, String)>)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send((channel, line)).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Error reading engine output: {}", e);
                break;
            }
        }
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn detach(cmd: &mut std::process::Command) {
    use std::os::unix::process::CommandExt;

    // SAFETY: setsid() is async-signal-safe and touches no parent memory.
    // The child becomes a session leader, detached from our terminal.
    unsafe {
        cmd.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

#[cfg(windows)]
fn detach(cmd: &mut std::process::Command) {
    use std::os::windows::process::CommandExt;

    const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NEW_PROCESS_GROUP | CREATE_NO_WINDOW);
}

#[cfg(not(any(unix, windows)))]
fn detach(_cmd: &mut std::process::Command) {}

#[cfg(unix)]
fn mark_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .map_err(|e| LightningError::io("set executable permission", path, e))
}

#[cfg(not(unix))]
fn mark_executable(_path: &Path) -> Result<()> {
    Ok(())
}
