use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::sys::signal::Signal;
use tokio::sync::{oneshot, watch};

/// How a process ended, when it did not end cleanly.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExitError {
	/// Non-zero exit or death by signal.
	#[error("{0}")]
	Status(ExitStatus),
	/// The OS could not report the exit status.
	#[error("waiting for process: {0}")]
	Wait(Arc<io::Error>),
	/// The exit event was never produced, e.g. on a group that was never launched.
	#[error("process exit was never observed")]
	NotObserved,
}

/// `Ok(())` for a clean exit.
pub type ExitResult = Result<(), ExitError>;

impl ExitError {
	pub fn status(&self) -> Option<ExitStatus> {
		match self {
			ExitError::Status(status) => Some(*status),
			_ => None,
		}
	}

	/// The exit code, if the process exited rather than being killed.
	pub fn code(&self) -> Option<i32> {
		self.status().and_then(|s| s.code())
	}

	/// The signal that killed the process, if any.
	pub fn signal(&self) -> Option<Signal> {
		self.status()
			.and_then(|s| s.signal())
			.and_then(|raw| Signal::try_from(raw).ok())
	}
}

/// Turn an exit status into an [`ExitResult`].
pub fn from_status(status: ExitStatus) -> ExitResult {
	if status.success() {
		Ok(())
	} else {
		Err(ExitError::Status(status))
	}
}

/// Collapse an [`ExitResult`] to a single code: 0 for a clean exit, the exit
/// code, `-2` when killed by a signal, `-1` when no status is known.
pub fn exit_code(result: &ExitResult) -> i32 {
	match result {
		Ok(()) => 0,
		Err(e) => match e.status() {
			Some(status) => status.code().unwrap_or(-2),
			None => -1,
		},
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
	Pending,
	Delivered,
	Consumed,
}

/// One reader's view of the single exit event.
#[derive(Debug)]
pub(crate) struct ExitSubscriber {
	rx: watch::Receiver<Option<ExitResult>>,
	consumed: AtomicBool,
}

impl ExitSubscriber {
	/// A subscriber that was never fed and is already consumed.
	pub(crate) fn inert() -> Self {
		let (_, rx) = watch::channel(None);
		Self {
			rx,
			consumed: AtomicBool::new(true),
		}
	}

	pub(crate) fn delivery(&self) -> Delivery {
		if self.consumed.load(Ordering::Acquire) {
			Delivery::Consumed
		} else if self.rx.borrow().is_some() {
			Delivery::Delivered
		} else {
			Delivery::Pending
		}
	}

	pub(crate) fn consume(&self) {
		self.consumed.store(true, Ordering::Release);
	}

	/// Wait for the event without consuming it. Every call returns the same
	/// value once it has arrived. If the broadcaster closed without
	/// delivering, returns [`ExitError::NotObserved`].
	pub(crate) async fn recv(&self) -> ExitResult {
		let mut rx = self.rx.clone();
		let event = match rx.wait_for(Option::is_some).await {
			Ok(event) => (*event).clone(),
			Err(_) => None,
		};
		event.unwrap_or(Err(ExitError::NotObserved))
	}

	/// Wait for the event and mark this subscriber consumed.
	pub(crate) async fn take(&self) -> ExitResult {
		let result = self.recv().await;
		self.consume();
		result
	}
}

/// Spawn the broadcaster: read at most one [`ExitResult`] from `source`, copy
/// it into each of `N` subscribers without blocking, then close them all.
pub(crate) fn fan_out<const N: usize>(
	source: oneshot::Receiver<ExitResult>,
) -> [ExitSubscriber; N] {
	let mut senders = Vec::with_capacity(N);
	let subscribers = std::array::from_fn(|_| {
		let (tx, rx) = watch::channel(None);
		senders.push(tx);
		ExitSubscriber {
			rx,
			consumed: AtomicBool::new(false),
		}
	});

	tokio::spawn(async move {
		match source.await {
			Ok(result) => {
				tracing::debug!("broadcasting exit to {} subscribers: {:?}", senders.len(), result);
				for tx in &senders {
					tx.send_if_modified(|slot| {
						if slot.is_some() {
							return false;
						}
						*slot = Some(result.clone());
						true
					});
				}
			}
			Err(_) => tracing::debug!("exit source closed without an event"),
		}
		drop(senders);
	});

	subscribers
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	fn status(raw: i32) -> ExitStatus {
		ExitStatus::from_raw(raw)
	}

	#[test]
	fn exit_code_for_each_disposition() {
		assert_eq!(exit_code(&Ok(())), 0);
		assert_eq!(exit_code(&from_status(status(3 << 8))), 3);
		assert_eq!(exit_code(&from_status(status(Signal::SIGKILL as i32))), -2);
		let wait = Err(ExitError::Wait(Arc::new(io::Error::from_raw_os_error(10))));
		assert_eq!(exit_code(&wait), -1);
		assert_eq!(exit_code(&Err(ExitError::NotObserved)), -1);
	}

	#[test]
	fn clean_status_is_ok() {
		assert!(from_status(status(0)).is_ok());
	}

	#[test]
	fn signal_is_extracted() {
		let err = from_status(status(Signal::SIGKILL as i32)).unwrap_err();
		assert_eq!(err.signal(), Some(Signal::SIGKILL));
		assert_eq!(err.code(), None);
	}

	#[tokio::test]
	async fn every_subscriber_sees_the_event() {
		let (tx, rx) = oneshot::channel();
		let [a, b, c] = fan_out::<3>(rx);
		assert_eq!(a.delivery(), Delivery::Pending);

		tx.send(from_status(status(7 << 8))).unwrap();

		for sub in [&a, &b, &c] {
			assert_eq!(exit_code(&sub.recv().await), 7);
			assert_eq!(sub.delivery(), Delivery::Delivered);
		}
	}

	#[tokio::test]
	async fn recv_is_repeatable_and_take_consumes() {
		let (tx, rx) = oneshot::channel();
		let [sub] = fan_out::<1>(rx);
		tx.send(Ok(())).unwrap();

		assert!(sub.recv().await.is_ok());
		assert!(sub.recv().await.is_ok());
		assert_eq!(sub.delivery(), Delivery::Delivered);

		assert!(sub.take().await.is_ok());
		assert_eq!(sub.delivery(), Delivery::Consumed);
		assert!(sub.recv().await.is_ok());
	}

	#[tokio::test]
	async fn closed_source_is_not_observed() {
		let (tx, rx) = oneshot::channel::<ExitResult>();
		let [sub] = fan_out::<1>(rx);
		drop(tx);

		let result = tokio::time::timeout(Duration::from_secs(1), sub.recv())
			.await
			.expect("closed subscriber must not block");
		assert!(matches!(result, Err(ExitError::NotObserved)));
		assert_eq!(sub.delivery(), Delivery::Pending);
	}

	#[tokio::test]
	async fn inert_subscriber_is_consumed() {
		let sub = ExitSubscriber::inert();
		assert_eq!(sub.delivery(), Delivery::Consumed);
		assert!(matches!(sub.recv().await, Err(ExitError::NotObserved)));
	}
}
