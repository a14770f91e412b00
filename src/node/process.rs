use std::io;
use std::net::SocketAddr;
use std::process::ExitStatus;
use std::process::Stdio;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use nix::sys::signal::kill;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tokio::net::TcpSocket;
use tokio::process::Child;
use tokio::process::Command;
use tracing::debug;
use tracing::info;

use super::ClusterLayout;
use super::NodeConfig;
use crate::constants::CONFIG_PATH_ENV;
use crate::utils::file_io::open_file_for_append;
use crate::LaunchError;
use crate::NodeLaunchConfig;
use crate::Result;

/// Handle on one running node process.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodeProcess: Send {
    /// OS process id, `None` once the process has been reaped
    fn id(&self) -> Option<u32>;

    /// Non-blocking exit check
    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>>;

    /// Graceful termination request (SIGTERM)
    fn terminate(&mut self) -> io::Result<()>;

    /// Forceful termination (SIGKILL)
    fn kill(&mut self) -> io::Result<()>;

    /// Waits for the process to exit and reaps it
    async fn wait(&mut self) -> io::Result<ExitStatus>;
}

/// Starts node processes from their rendered config.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Launcher: Send + Sync {
    async fn launch(
        &self,
        config: &NodeConfig,
    ) -> Result<Box<dyn NodeProcess>>;
}

/// [`NodeProcess`] backed by a tokio child process.
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
}

impl ChildProcess {
    pub fn new(child: Child) -> Self {
        Self { child }
    }
}

#[async_trait]
impl NodeProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        self.child.try_wait()
    }

    fn terminate(&mut self) -> io::Result<()> {
        match self.child.id() {
            Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGTERM).map_err(io::Error::from),
            // already reaped
            None => Ok(()),
        }
    }

    fn kill(&mut self) -> io::Result<()> {
        self.child.start_kill()
    }

    async fn wait(&mut self) -> io::Result<ExitStatus> {
        self.child.wait().await
    }
}

/// Spawns the configured store executable, one OS process per node.
///
/// The node finds its config through `CONFIG_PATH`; stdout and stderr are
/// appended to `logs/node-<i>.stderr`. Children are killed when their handle
/// is dropped, so a leaked cluster does not leave processes behind.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    settings: NodeLaunchConfig,
    layout: ClusterLayout,
}

impl CommandLauncher {
    pub fn new(
        settings: NodeLaunchConfig,
        layout: ClusterLayout,
    ) -> Self {
        Self { settings, layout }
    }
}

#[async_trait]
impl Launcher for CommandLauncher {
    async fn launch(
        &self,
        config: &NodeConfig,
    ) -> Result<Box<dyn NodeProcess>> {
        let index = config.index;
        ensure_port_free(index, config.peer.listen_addr)?;
        ensure_port_free(index, config.client.listen_addr)?;

        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .map_err(|source| LaunchError::Prepare {
                index,
                path: config.data_dir.clone(),
                source,
            })?;
        let config_file = self.layout.config_file(index);
        if !config_file.exists() {
            config.write_to(&config_file)?;
        }

        let stderr_file = self.layout.stderr_file(index);
        let (stdout, stderr) = open_file_for_append(&stderr_file)
            .and_then(|stderr| Ok((stderr.try_clone()?, stderr)))
            .map_err(|source| LaunchError::Prepare {
                index,
                path: stderr_file.clone(),
                source,
            })?;

        let mut command = Command::new(&self.settings.program);
        command
            .args(&self.settings.args)
            .env(CONFIG_PATH_ENV, &config_file)
            .env("RUST_LOG", &self.settings.log_level)
            .envs(&self.settings.env)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);

        let child = command.spawn().map_err(|source| LaunchError::Spawn {
            index,
            program: self.settings.program.clone(),
            source,
        })?;

        info!(
            index,
            pid = child.id(),
            program = %self.settings.program.display(),
            "spawned node"
        );
        Ok(Box::new(ChildProcess::new(child)))
    }
}

/// Fails with [`LaunchError::PortInUse`] when another socket listens on
/// `addr`. `SO_REUSEADDR` keeps sockets lingering in TIME_WAIT from a
/// previous run of the same node from counting as busy.
pub(crate) fn ensure_port_free(
    index: usize,
    addr: SocketAddr,
) -> Result<()> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    match socket.bind(addr) {
        Ok(()) => {
            debug!(index, %addr, "port is free");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
            Err(LaunchError::PortInUse { index, addr }.into())
        }
        Err(e) => Err(e.into()),
    }
}
