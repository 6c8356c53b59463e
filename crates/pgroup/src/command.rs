use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;

use tokio::sync::watch;

/// Process creation attributes a [`PlatformPolicy`](crate::PlatformPolicy)
/// may inspect and rewrite before launch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attributes {
	/// `setpgid` target for the child. `Some(0)` makes it the leader of a new group.
	pub process_group: Option<i32>,
	/// Run `setsid` in the child before exec.
	pub new_session: bool,
}

/// Where a child's standard stream goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Stdio {
	#[default]
	Inherit,
	Null,
}

impl Stdio {
	fn to_std(self) -> std::process::Stdio {
		match self {
			Stdio::Inherit => std::process::Stdio::inherit(),
			Stdio::Null => std::process::Stdio::null(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
	NotStarted,
	/// `pid` is `None` while the launch is still in flight.
	Executing { pid: Option<u32> },
	/// `status` is `None` when the OS could not report one.
	Executed { status: Option<ExitStatus> },
}

impl RunState {
	pub fn is_running(&self) -> bool {
		matches!(self, RunState::Executing { .. })
	}
}

/// A fully configured command, run at most once.
///
/// Clones share the same run state, so launching one clone marks all of
/// them as executing.
#[derive(Debug, Clone)]
pub struct Command {
	program: PathBuf,
	args: Vec<OsString>,
	envs: Vec<(OsString, OsString)>,
	env_clear: bool,
	current_dir: Option<PathBuf>,
	stdin: Stdio,
	stdout: Stdio,
	stderr: Stdio,
	attributes: Attributes,
	run: Arc<watch::Sender<RunState>>,
}

impl Command {
	pub fn new(program: impl AsRef<OsStr>) -> Self {
		let (run, _) = watch::channel(RunState::NotStarted);
		Self {
			program: PathBuf::from(program.as_ref()),
			args: Vec::new(),
			envs: Vec::new(),
			env_clear: false,
			current_dir: None,
			stdin: Stdio::Inherit,
			stdout: Stdio::Inherit,
			stderr: Stdio::Inherit,
			attributes: Attributes::default(),
			run: Arc::new(run),
		}
	}

	pub fn arg(&mut self, arg: impl AsRef<OsStr>) -> &mut Self {
		self.args.push(arg.as_ref().to_os_string());
		self
	}

	pub fn args<I, S>(&mut self, args: I) -> &mut Self
	where
		I: IntoIterator<Item = S>,
		S: AsRef<OsStr>,
	{
		for arg in args {
			self.arg(arg);
		}
		self
	}

	pub fn env(&mut self, key: impl AsRef<OsStr>, val: impl AsRef<OsStr>) -> &mut Self {
		self.envs
			.push((key.as_ref().to_os_string(), val.as_ref().to_os_string()));
		self
	}

	pub fn envs<I, K, V>(&mut self, vars: I) -> &mut Self
	where
		I: IntoIterator<Item = (K, V)>,
		K: AsRef<OsStr>,
		V: AsRef<OsStr>,
	{
		for (key, val) in vars {
			self.env(key, val);
		}
		self
	}

	/// Start the child with an empty environment plus anything set via [`env`](Self::env).
	pub fn env_clear(&mut self) -> &mut Self {
		self.env_clear = true;
		self.envs.clear();
		self
	}

	pub fn current_dir(&mut self, dir: impl AsRef<Path>) -> &mut Self {
		self.current_dir = Some(dir.as_ref().to_path_buf());
		self
	}

	pub fn stdin(&mut self, io: Stdio) -> &mut Self {
		self.stdin = io;
		self
	}

	pub fn stdout(&mut self, io: Stdio) -> &mut Self {
		self.stdout = io;
		self
	}

	pub fn stderr(&mut self, io: Stdio) -> &mut Self {
		self.stderr = io;
		self
	}

	/// Ask for the child to start its own session. The process group policy
	/// rejects this at launch, since a session leader cannot also be moved
	/// into a fresh group without a double fork.
	pub fn new_session(&mut self, on: bool) -> &mut Self {
		self.attributes.new_session = on;
		self
	}

	pub fn attributes(&mut self, attributes: Attributes) -> &mut Self {
		self.attributes = attributes;
		self
	}

	pub fn get_program(&self) -> &Path {
		&self.program
	}

	pub fn get_args(&self) -> impl Iterator<Item = &OsStr> {
		self.args.iter().map(OsString::as_os_str)
	}

	pub fn get_attributes(&self) -> Attributes {
		self.attributes
	}

	pub fn state(&self) -> RunState {
		*self.run.borrow()
	}

	/// Move `NotStarted` to `Executing { pid: None }` atomically.
	/// On failure returns the state that blocked the claim.
	pub(crate) fn claim(&self) -> Result<(), RunState> {
		let claimed = self.run.send_if_modified(|state| {
			if *state == RunState::NotStarted {
				*state = RunState::Executing { pid: None };
				true
			} else {
				false
			}
		});
		if claimed {
			Ok(())
		} else {
			Err(self.state())
		}
	}

	pub(crate) fn run_state(&self) -> Arc<watch::Sender<RunState>> {
		Arc::clone(&self.run)
	}

	/// Build the tokio command with `attributes` applied in place of our own.
	pub(crate) fn to_tokio(&self, attributes: Attributes) -> tokio::process::Command {
		let mut cmd = tokio::process::Command::new(&self.program);
		cmd.args(&self.args)
			.stdin(self.stdin.to_std())
			.stdout(self.stdout.to_std())
			.stderr(self.stderr.to_std());

		if self.env_clear {
			cmd.env_clear();
		}
		for (key, val) in &self.envs {
			cmd.env(key, val);
		}
		if let Some(dir) = &self.current_dir {
			cmd.current_dir(dir);
		}

		if let Some(pgid) = attributes.process_group {
			cmd.process_group(pgid);
		}
		if attributes.new_session {
			// SAFETY: setsid is async-signal-safe and the closure allocates nothing.
			unsafe {
				cmd.pre_exec(|| {
					nix::unistd::setsid().map(drop).map_err(io::Error::from)
				});
			}
		}
		cmd
	}
}
