use core::cell::RefCell;
use core::time::Duration;
use std::io;
use std::os::fd::{AsRawFd, RawFd};

use libc::{poll, pollfd as Poll, POLLERR, POLLHUP, POLLIN, POLLNVAL};
use log::error;

mod logger;
mod rt;

pub use logger::Logger;
pub use rt::*;

fn as_raw<T: AsRawFd>(t: &T) -> RawFd {
	t.as_raw_fd()
}

use utils::error::*;

fn as_timeout(t: Option<Duration>) -> i32 {
	t.and_then(|d| d.as_millis().try_into().ok()).unwrap_or(-1)
}

thread_local! {
	static GLOBAL: RefCell<State> = const {
		RefCell::new(State {
			fds: Vec::new(),
			entries: Vec::new()
		})
	};
}

struct State {
	fds: Vec<Poll>,
	entries: Vec<Box<dyn FnMut()>>,
}

impl State {
	fn with<X, F: FnOnce(&mut Self) -> X>(f: F) -> X {
		GLOBAL.with(|x| f(&mut x.borrow_mut()))
	}

	fn idx_of<T: AsRawFd>(&mut self, socket: &T) -> usize {
		let raw = as_raw(socket);
		self.fds.iter().position(|f| f.fd == raw).expect("fd is registered")
	}

	/// Returns whether any more I/O is waiting.
	fn is_io(&self) -> bool {
		!self.fds.is_empty()
	}

	/// Log a summary of outstanding registrations at shutdown.
	fn log_stats(&self) {
		log::debug!("shutting down poll loop with {} fd(s) still registered", self.fds.len());
	}

	/// Poll the fds. Returns whether any file descriptors are ready for I/O.
	fn poll(&mut self, timeout: Option<Duration>) -> Result<bool> {
		let ret = unsafe {
			poll(
				self.fds.as_mut_ptr(),
				self.fds.len().try_into().expect("Fewer than u32::MAX fds"),
				as_timeout(timeout),
			)
		};

		let mut pending: u32 = ret.try_into().map_err(|_| error!("poll() failed: {}", io::Error::last_os_error()))?;

		if pending == 0 {
			return Ok(false);
		}

		for idx in 0..self.fds.len() {
			let Poll { revents, .. } = &mut self.fds[idx];

			if *revents == 0 {
				continue;
			}

			if *revents & POLLERR != 0 {
				panic!("fd error while polling");
			}

			if *revents & POLLHUP != 0 {
				panic!("fd hangup");
			}

			if *revents & POLLNVAL != 0 {
				panic!("fd invalid");
			}

			if *revents & POLLIN != 0 {
				(self.entries[idx])();
			}

			*revents = 0;

			pending -= 1;

			if pending == 0 {
				break;
			}
		}

		Ok(true)
	}
}

/// A file descriptor registered with the cooperative poll loop. Whenever `inner` becomes
/// readable, the callback supplied at construction is invoked once; it is responsible for
/// draining whatever is readable (a ring buffer, an eventfd, a socket).
pub struct Io<T: AsRawFd> {
	inner: T,
}

impl<T: AsRawFd> Io<T> {
	pub fn new(inner: T, on_readable: impl FnMut() + 'static) -> Self {
		State::with(|i| {
			i.fds.push(Poll { fd: as_raw(&inner), events: POLLIN, revents: 0 });
			i.entries.push(Box::new(on_readable));

			Self { inner }
		})
	}

	pub fn get_ref(&self) -> &T {
		&self.inner
	}
}

impl<T: AsRawFd> Drop for Io<T> {
	fn drop(&mut self) {
		State::with(|i| {
			let idx = i.idx_of(&self.inner);
			i.entries.swap_remove(idx);
			i.fds.swap_remove(idx);
		})
	}
}
