use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::Signal;
use nix::unistd::Pid;

use crate::command::{Command, RunState};
use crate::error::Error;
use crate::exit::{self, Delivery, ExitResult, ExitSubscriber};
use crate::launch;
use crate::platform::{self, PlatformPolicy};

/// A command running as the leader of its own process group, together with
/// everything it forks.
///
/// `terminate` and `wait` each read their own copy of the exit event, so one
/// task can terminate while another waits. Share it through an `Arc`.
#[derive(Debug)]
pub struct Group {
	pid: Option<u32>,
	policy: Arc<dyn PlatformPolicy>,
	on_exit_for_terminate: ExitSubscriber,
	on_exit_for_wait: ExitSubscriber,
}

impl Default for Group {
	/// An inert group: nothing to signal, nothing to terminate.
	fn default() -> Self {
		Self {
			pid: None,
			policy: platform::default_policy(),
			on_exit_for_terminate: ExitSubscriber::inert(),
			on_exit_for_wait: ExitSubscriber::inert(),
		}
	}
}

impl Group {
	/// Start `cmd` in the background as a new process group.
	///
	/// Returns once the OS has started or refused the command. The process
	/// attributes of `cmd` are replaced for the launch.
	pub async fn background(cmd: &Command) -> Result<Group, Error> {
		Self::background_with(cmd, platform::default_policy()).await
	}

	pub async fn background_with(
		cmd: &Command,
		policy: Arc<dyn PlatformPolicy>,
	) -> Result<Group, Error> {
		let attributes = policy.prepare_group_attributes(cmd.get_attributes())?;

		if let Err(state) = cmd.claim() {
			let program = cmd.get_program().to_path_buf();
			return Err(match state {
				RunState::Executed { .. } => Error::AlreadyExecuted { program },
				_ => Error::AlreadyExecuting { program },
			});
		}

		let (started, exited) = launch::spawn_launcher(cmd.to_tokio(attributes), cmd.run_state());
		let [on_exit_for_terminate, on_exit_for_wait] = exit::fan_out(exited);

		let pid = match started.await {
			Ok(Ok(pid)) => pid,
			Ok(Err(source)) => {
				return Err(Error::Launch {
					program: cmd.get_program().to_path_buf(),
					source,
				})
			}
			Err(_) => {
				tracing::warn!("launcher for {:?} stopped before reporting", cmd.get_program());
				return Err(Error::Launch {
					program: cmd.get_program().to_path_buf(),
					source: std::io::Error::new(
						std::io::ErrorKind::Other,
						"launcher stopped before reporting",
					),
				});
			}
		};

		Ok(Group {
			pid: Some(pid),
			policy,
			on_exit_for_terminate,
			on_exit_for_wait,
		})
	}

	/// The group id, equal to the leader's pid. `None` for an inert group.
	pub fn pid(&self) -> Option<u32> {
		self.pid
	}

	/// Send `signal` to every process in the group.
	///
	/// Fails with [`Error::NotFound`] on an inert group or once `terminate`
	/// has completed. Delivery failures carry the OS errno.
	pub fn signal(&self, signal: Signal) -> Result<(), Error> {
		let pid = match self.pid {
			Some(pid) if self.on_exit_for_terminate.delivery() != Delivery::Consumed => pid,
			_ => return Err(Error::NotFound),
		};

		// Resolved fresh on every call; nothing about the target is cached.
		let pgid = Pid::from_raw(pid as i32);
		self.policy
			.send_signal(pgid, signal)
			.map_err(|source| Error::Signal {
				pgid: pgid.as_raw(),
				signal,
				source,
			})
	}

	/// Ask the group to exit with the policy's soft signal, give it
	/// `patience` to comply, then SIGKILL it and wait for it to go.
	///
	/// Returns immediately if the exit has already been seen. A failed signal
	/// is returned as-is, including `ESRCH` when the group vanished through
	/// another path; see [`Error::is_no_such_process`].
	pub async fn terminate(&self, patience: Duration) -> Result<(), Error> {
		match self.on_exit_for_terminate.delivery() {
			Delivery::Consumed => return Ok(()),
			Delivery::Delivered => {
				self.on_exit_for_terminate.consume();
				return Ok(());
			}
			Delivery::Pending => {}
		}

		self.signal(self.policy.soft_signal())?;

		if tokio::time::timeout(patience, self.on_exit_for_terminate.take())
			.await
			.is_ok()
		{
			return Ok(());
		}

		tracing::info!(
			"process group {:?} still running after {:?}, sending SIGKILL",
			self.pid(),
			patience
		);
		self.signal(Signal::SIGKILL)?;

		let _ = self.on_exit_for_terminate.take().await;
		Ok(())
	}

	/// Block until the leader exits and return how it ended.
	///
	/// Independent of `terminate`, and repeatable: every call returns the same
	/// result.
	pub async fn wait(&self) -> ExitResult {
		self.on_exit_for_wait.recv().await
	}
}
