use std::fmt::Debug;
use std::sync::Arc;

use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;

use crate::command::Attributes;
use crate::error::Error;

/// How a group is created and signaled on a given platform.
pub trait PlatformPolicy: Debug + Send + Sync {
	/// The signal `terminate` tries first.
	fn soft_signal(&self) -> Signal;

	/// Rewrite the caller's attributes so the child can be signaled as a unit.
	fn prepare_group_attributes(&self, existing: Attributes) -> Result<Attributes, Error>;

	/// Deliver `signal` to whatever this policy treats as the group led by `leader`.
	fn send_signal(&self, leader: Pid, signal: Signal) -> nix::Result<()>;
}

/// POSIX process groups: the child becomes leader of a new group and every
/// signal goes to the whole group.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessGroupPolicy;

impl PlatformPolicy for ProcessGroupPolicy {
	fn soft_signal(&self) -> Signal {
		Signal::SIGTERM
	}

	fn prepare_group_attributes(&self, existing: Attributes) -> Result<Attributes, Error> {
		if existing.new_session {
			return Err(Error::Config(
				"a new session and a new process group are mutually exclusive",
			));
		}
		Ok(Attributes {
			process_group: Some(0),
			..existing
		})
	}

	fn send_signal(&self, leader: Pid, signal: Signal) -> nix::Result<()> {
		killpg(leader, signal)
	}
}

/// For platforms without group signaling: attributes pass through untouched
/// and only the tracked process is signaled. Forked descendants are not
/// reached.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleProcessPolicy;

impl PlatformPolicy for SingleProcessPolicy {
	fn soft_signal(&self) -> Signal {
		Signal::SIGTERM
	}

	fn prepare_group_attributes(&self, existing: Attributes) -> Result<Attributes, Error> {
		Ok(existing)
	}

	fn send_signal(&self, leader: Pid, signal: Signal) -> nix::Result<()> {
		kill(leader, signal)
	}
}

/// The policy [`Group::background`](crate::Group::background) uses.
pub fn default_policy() -> Arc<dyn PlatformPolicy> {
	Arc::new(ProcessGroupPolicy)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn group_policy_requests_new_group() {
		let attrs = ProcessGroupPolicy
			.prepare_group_attributes(Attributes::default())
			.unwrap();
		assert_eq!(attrs.process_group, Some(0));
		assert!(!attrs.new_session);
	}

	#[test]
	fn group_policy_overrides_existing_group() {
		let attrs = ProcessGroupPolicy
			.prepare_group_attributes(Attributes {
				process_group: Some(4242),
				new_session: false,
			})
			.unwrap();
		assert_eq!(attrs.process_group, Some(0));
	}

	#[test]
	fn group_policy_rejects_new_session() {
		let err = ProcessGroupPolicy
			.prepare_group_attributes(Attributes {
				process_group: None,
				new_session: true,
			})
			.unwrap_err();
		assert!(matches!(err, Error::Config(_)), "got {:?}", err);
		assert_eq!(err.errno(), None);
	}

	#[test]
	fn single_policy_passes_attributes_through() {
		let existing = Attributes {
			process_group: None,
			new_session: true,
		};
		assert_eq!(
			SingleProcessPolicy.prepare_group_attributes(existing).unwrap(),
			existing
		);
	}

	#[test]
	fn soft_signal_is_sigterm() {
		assert_eq!(ProcessGroupPolicy.soft_signal(), Signal::SIGTERM);
		assert_eq!(SingleProcessPolicy.soft_signal(), Signal::SIGTERM);
		assert_eq!(default_policy().soft_signal(), Signal::SIGTERM);
	}

	#[test]
	fn default_policy_creates_a_group() {
		let policy = default_policy();
		let attrs = policy.prepare_group_attributes(Attributes::default()).unwrap();
		assert_eq!(attrs.process_group, Some(0));
		assert!(policy
			.prepare_group_attributes(Attributes {
				process_group: None,
				new_session: true,
			})
			.is_err());
	}
}
