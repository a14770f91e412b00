//! Lifecycle state machine of one store node.
//!
//! ```text
//! Unstarted --start--> Running --stop--> Stopped
//!                         ^                 |
//!                         +----restart------+
//! any --terminate--> Terminated
//! ```
//!
//! Every transition either completes or leaves the node in the state it was
//! in before the call, so a failed Restart still reports `Stopped`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio::time::timeout;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::Launcher;
use super::NodeConfig;
use super::NodeProcess;
use super::ReadinessProbe;
use crate::Error;
use crate::LaunchError;
use crate::LifecycleError;
use crate::LifecycleTimeouts;
use crate::Result;
use crate::ShutdownError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    Unstarted,
    Running,
    Stopped,
    Terminated,
}

impl fmt::Display for NodeState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            NodeState::Unstarted => "unstarted",
            NodeState::Running => "running",
            NodeState::Stopped => "stopped",
            NodeState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// How a running process came down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Exited after SIGTERM within the grace period
    Graceful,
    /// Ignored SIGTERM and was killed
    Killed,
    /// Had already exited on its own
    AlreadyExited,
}

pub struct Node {
    config: NodeConfig,
    state: NodeState,
    process: Option<Box<dyn NodeProcess>>,
    launcher: Arc<dyn Launcher>,
    probe: Arc<dyn ReadinessProbe>,
    timeouts: LifecycleTimeouts,
}

impl fmt::Debug for Node {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Node")
            .field("index", &self.config.index)
            .field("state", &self.state)
            .field("pid", &self.pid())
            .finish()
    }
}

impl Node {
    pub fn new(
        config: NodeConfig,
        launcher: Arc<dyn Launcher>,
        probe: Arc<dyn ReadinessProbe>,
        timeouts: LifecycleTimeouts,
    ) -> Self {
        Self {
            config,
            state: NodeState::Unstarted,
            process: None,
            launcher,
            probe,
            timeouts,
        }
    }

    pub fn index(&self) -> usize {
        self.config.index
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == NodeState::Running
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.id())
    }

    /// Unstarted -> Running. Returns once the process accepts connections.
    pub async fn start(&mut self) -> Result<()> {
        self.expect_state(NodeState::Unstarted, "start")?;
        self.launch().await
    }

    /// Running -> Stopped. The data directory is left untouched.
    ///
    /// If the process cannot be reaped even after SIGKILL the node stays
    /// `Running`, since its process may still own the data directory.
    pub async fn stop(&mut self) -> Result<StopOutcome> {
        self.expect_state(NodeState::Running, "stop")?;
        let outcome = self.bring_down().await?;
        self.state = NodeState::Stopped;
        info!(index = self.index(), ?outcome, "node stopped");
        Ok(outcome)
    }

    /// Stopped -> Running, reusing the same config, data and TLS identity.
    pub async fn restart(&mut self) -> Result<()> {
        self.expect_state(NodeState::Stopped, "restart")?;
        self.launch().await
    }

    /// Any -> Terminated. Calling it on a terminated node is a no-op.
    pub async fn terminate(&mut self) -> Result<()> {
        match self.state {
            NodeState::Terminated => return Ok(()),
            NodeState::Running => {
                let outcome = self.bring_down().await?;
                debug!(index = self.index(), ?outcome, "node process terminated");
            }
            NodeState::Unstarted | NodeState::Stopped => {}
        }
        self.state = NodeState::Terminated;
        Ok(())
    }

    fn expect_state(
        &self,
        expected: NodeState,
        operation: &'static str,
    ) -> Result<()> {
        if self.state == expected {
            return Ok(());
        }
        Err(LifecycleError::InvalidTransition {
            index: self.index(),
            operation,
            state: self.state,
        }
        .into())
    }

    async fn launch(&mut self) -> Result<()> {
        let index = self.index();
        let mut process = self.launcher.launch(&self.config).await?;

        if let Err(e) = self.await_listening(process.as_mut()).await {
            warn!(index, "node failed to come up: {}", e);
            discard(index, process.as_mut(), self.timeouts.kill_timeout()).await;
            return Err(e);
        }

        info!(index, pid = process.id(), "node is running");
        self.process = Some(process);
        self.state = NodeState::Running;
        Ok(())
    }

    /// Waits until the probe confirms the node while making sure the process
    /// is still alive.
    async fn await_listening(
        &self,
        process: &mut dyn NodeProcess,
    ) -> Result<()> {
        let index = self.index();
        let start_timeout = self.timeouts.start_timeout();
        let deadline = Instant::now() + start_timeout;

        loop {
            match process.try_wait() {
                Ok(Some(status)) => {
                    return Err(LaunchError::Exited {
                        index,
                        status: status.to_string(),
                    }
                    .into())
                }
                Ok(None) => {}
                Err(e) => return Err(e.into()),
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::ConvergenceTimeout {
                    index,
                    timeout: start_timeout,
                });
            }

            if let Ok(true) = timeout(remaining, self.probe.is_ready(&self.config)).await {
                return Ok(());
            }

            sleep(self.timeouts.probe_interval().min(remaining)).await;
        }
    }

    async fn bring_down(&mut self) -> Result<StopOutcome> {
        let index = self.index();
        let Some(mut process) = self.process.take() else {
            return Ok(StopOutcome::AlreadyExited);
        };

        match shutdown_process(index, process.as_mut(), &self.timeouts).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                error!(index, pid = process.id(), "node process could not be reaped: {}", e);
                self.process = Some(process);
                Err(e)
            }
        }
    }
}

/// SIGTERM, wait out the grace period, then SIGKILL.
async fn shutdown_process(
    index: usize,
    process: &mut dyn NodeProcess,
    timeouts: &LifecycleTimeouts,
) -> Result<StopOutcome> {
    let exited = process.try_wait().map_err(|source| ShutdownError::Wait { index, source })?;
    if let Some(status) = exited {
        debug!(index, %status, "node process had already exited");
        return Ok(StopOutcome::AlreadyExited);
    }

    match process.terminate() {
        Ok(()) => match timeout(timeouts.stop_grace_period(), process.wait()).await {
            Ok(Ok(status)) => {
                debug!(index, %status, "node process exited");
                return Ok(StopOutcome::Graceful);
            }
            Ok(Err(source)) => return Err(ShutdownError::Wait { index, source }.into()),
            Err(_) => warn!(
                index,
                "node ignored SIGTERM for {:?}, escalating to SIGKILL",
                timeouts.stop_grace_period()
            ),
        },
        Err(e) => warn!(index, "failed to deliver SIGTERM ({}), escalating to SIGKILL", e),
    }

    process.kill().map_err(|source| ShutdownError::Signal { index, source })?;
    let kill_timeout = timeouts.kill_timeout();
    match timeout(kill_timeout, process.wait()).await {
        Ok(Ok(_)) => Ok(StopOutcome::Killed),
        Ok(Err(source)) => Err(ShutdownError::Wait { index, source }.into()),
        Err(_) => Err(ShutdownError::NotReaped {
            index,
            timeout: kill_timeout,
        }
        .into()),
    }
}

/// Best effort teardown of a process that never made it to `Running`.
async fn discard(
    index: usize,
    process: &mut dyn NodeProcess,
    kill_timeout: Duration,
) {
    if let Ok(Some(_)) = process.try_wait() {
        return;
    }
    if let Err(e) = process.kill() {
        warn!(index, "failed to kill half-started node: {}", e);
    }
    if timeout(kill_timeout, process.wait()).await.is_err() {
        error!(index, pid = process.id(), "half-started node was not reaped");
    }
}
