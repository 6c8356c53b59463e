use std::io;
use std::sync::Arc;

use tokio::sync::{oneshot, watch};

use crate::command::RunState;
use crate::exit::{self, ExitError, ExitResult};

/// What the launcher reports once the OS has accepted or refused the command.
pub(crate) type LaunchOutcome = io::Result<u32>;

/// Spawn the launcher task. The first receiver resolves once start-up is
/// known. The second resolves when the process exits, and never if it failed
/// to start.
pub(crate) fn spawn_launcher(
	cmd: tokio::process::Command,
	run: Arc<watch::Sender<RunState>>,
) -> (oneshot::Receiver<LaunchOutcome>, oneshot::Receiver<ExitResult>) {
	let (started_tx, started_rx) = oneshot::channel();
	let (exited_tx, exited_rx) = oneshot::channel();

	tokio::spawn(start_process(cmd, run, started_tx, exited_tx));

	(started_rx, exited_rx)
}

async fn start_process(
	mut cmd: tokio::process::Command,
	run: Arc<watch::Sender<RunState>>,
	started: oneshot::Sender<LaunchOutcome>,
	exited: oneshot::Sender<ExitResult>,
) {
	let mut child = match cmd.spawn() {
		Ok(child) => child,
		Err(e) => {
			run.send_replace(RunState::NotStarted);
			let _ = started.send(Err(e));
			return;
		}
	};

	let Some(pid) = child.id() else {
		// Only possible if the child was already reaped, which nothing else can do.
		run.send_replace(RunState::Executed { status: None });
		let _ = started.send(Err(io::Error::new(
			io::ErrorKind::Other,
			"child exited before its pid was known",
		)));
		return;
	};

	run.send_replace(RunState::Executing { pid: Some(pid) });
	tracing::debug!("started process group {}", pid);
	let _ = started.send(Ok(pid));

	let result = match child.wait().await {
		Ok(status) => {
			tracing::debug!("process group {} leader exited: {}", pid, status);
			run.send_replace(RunState::Executed {
				status: Some(status),
			});
			exit::from_status(status)
		}
		Err(e) => {
			tracing::warn!("waiting on process group {} failed: {}", pid, e);
			run.send_replace(RunState::Executed { status: None });
			Err(ExitError::Wait(Arc::new(e)))
		}
	};

	let _ = exited.send(result);
}
