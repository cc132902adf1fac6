//! Domain Provider: owns the update channel and fans the static domain file
//! and the service watcher into it.

use log::{error, warn};
use stakker::Fwd;

use crate::config::{Config, DomainEntry};
use crate::watcher::{DisabledSource, ReadySignal, ServiceEventSource, ServiceWatcher};

/// A single add-or-delete update to the name table, in the control plane's
/// vocabulary. Mirrors the source material's `NetAddress`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetAddress {
	pub host: String,
	pub ip: String,
	pub svc: Option<String>,
	pub ns: Option<String>,
	pub is_delete: bool,
	/// Per-entry TTL override; only the static domain file ever sets this.
	/// Absent means the reconciler's configured default applies.
	pub ttl_secs: Option<u64>,
}

impl NetAddress {
	fn from_domain_entry(entry: &DomainEntry) -> Self {
		Self { host: entry.hostname.clone(), ip: entry.address.to_string(), svc: None, ns: None, is_delete: false, ttl_secs: entry.ttl_secs }
	}

	pub fn ttl_secs(&self) -> Option<u64> {
		self.ttl_secs
	}
}

/// Starts the static file loader and the service watcher against the shared
/// `updates` channel, returning the watcher's readiness signal (or `None` if
/// the watcher is disabled, in which case there's nothing to await).
pub fn start(config: &Config, domains: &[DomainEntry], updates: Fwd<NetAddress>, source: Option<Box<dyn ServiceEventSource>>) -> Option<ReadySignal> {
	load_static_domains(domains, &updates);

	if !config.kubernetes.enabled {
		crate::watcher::warn_disabled();
		let watcher = ServiceWatcher::new(updates);
		return Some(watcher.start(Box::new(DisabledSource)));
	}

	let Some(source) = source else {
		error!("kubernetes watcher enabled in config but no service event source was supplied");
		warn!("continuing with the static domain file only");
		return None;
	};

	let watcher = ServiceWatcher::new(updates);
	Some(watcher.start(source))
}

fn load_static_domains(domains: &[DomainEntry], updates: &Fwd<NetAddress>) {
	for entry in domains {
		updates.fwd(NetAddress::from_domain_entry(entry));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::cell::RefCell;
	use std::net::Ipv4Addr;
	use std::rc::Rc;

	#[test]
	fn static_domains_each_produce_one_add_delta() {
		let sink: Rc<RefCell<Vec<NetAddress>>> = Rc::new(RefCell::new(Vec::new()));
		let captured = sink.clone();
		let fwd = Fwd::new(move |addr: NetAddress| captured.borrow_mut().push(addr));

		let domains = vec![
			DomainEntry { hostname: "foo.svc".into(), address: Ipv4Addr::new(10, 0, 0, 5), ttl_secs: None },
			DomainEntry { hostname: "bar.svc".into(), address: Ipv4Addr::new(10, 0, 0, 6), ttl_secs: None },
		];

		load_static_domains(&domains, &fwd);

		let events = sink.borrow();
		assert_eq!(events.len(), 2);
		assert_eq!(events[0].host, "foo.svc");
		assert!(!events[0].is_delete);
	}
}
