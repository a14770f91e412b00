use std::io;
use std::process::ExitStatus;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use async_trait::async_trait;

use super::exit_status;
use super::killed_status;
use crate::MockNodeProcess;
use crate::MockReadinessProbe;
use crate::NodeProcess;

/// A process that starts fine and exits promptly on SIGTERM.
pub(crate) fn well_behaved_process(pid: u32) -> MockNodeProcess {
    let mut process = MockNodeProcess::new();
    process.expect_id().returning(move || Some(pid));
    process.expect_try_wait().returning(|| Ok(None));
    process.expect_terminate().returning(|| Ok(()));
    process.expect_kill().returning(|| Ok(()));
    process.expect_wait().returning(|| Ok(exit_status(0)));
    process
}

/// A process that dies during startup with exit code `code`.
pub(crate) fn crashing_process(code: i32) -> MockNodeProcess {
    let mut process = MockNodeProcess::new();
    process.expect_id().returning(|| None);
    process.expect_try_wait().returning(move || Ok(Some(exit_status(code))));
    process.expect_kill().never();
    process
}

pub(crate) fn ready_probe() -> MockReadinessProbe {
    let mut probe = MockReadinessProbe::new();
    probe.expect_is_ready().returning(|_| true);
    probe
}

pub(crate) fn never_ready_probe() -> MockReadinessProbe {
    let mut probe = MockReadinessProbe::new();
    probe.expect_is_ready().returning(|_| false);
    probe
}

/// Records which signals a [`StubbornProcess`] received.
#[derive(Debug, Default)]
pub(crate) struct SignalLog {
    pub terminated: AtomicUsize,
    pub killed: AtomicBool,
}

/// Hand written process for escalation paths: `wait` never resolves until
/// SIGKILL arrives, and never at all when `survives_kill` is set.
pub(crate) struct StubbornProcess {
    pub log: Arc<SignalLog>,
    pub survives_kill: bool,
}

impl StubbornProcess {
    pub(crate) fn new(survives_kill: bool) -> (Self, Arc<SignalLog>) {
        let log = Arc::new(SignalLog::default());
        (
            Self {
                log: log.clone(),
                survives_kill,
            },
            log,
        )
    }
}

#[async_trait]
impl NodeProcess for StubbornProcess {
    fn id(&self) -> Option<u32> {
        Some(4242)
    }

    fn try_wait(&mut self) -> io::Result<Option<ExitStatus>> {
        Ok(None)
    }

    fn terminate(&mut self) -> io::Result<()> {
        self.log.terminated.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn kill(&mut self) -> io::Result<()> {
        self.log.killed.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn wait(&mut self) -> io::Result<ExitStatus> {
        if self.log.killed.load(Ordering::SeqCst) && !self.survives_kill {
            return Ok(killed_status());
        }
        std::future::pending().await
    }
}
