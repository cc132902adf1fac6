//! Service Watcher: mirrors a cluster's live service set into `NetAddress`
//! deltas, deduplicated by resource version.
//!
//! The cluster API client itself is an external collaborator (see DESIGN.md);
//! only its contract is modeled here as [`ServiceEventSource`]. A production
//! deployment wires a real Kubernetes watch stream (e.g. via the `kube`
//! crate) behind this trait — that wiring lives outside this crate.

use std::collections::HashMap;

use log::{info, warn};
use stakker::Fwd;

use crate::provider::NetAddress;

/// A single notification about a cluster service's current state.
#[derive(Debug, Clone)]
pub enum ServiceEvent {
	AddOrUpdate { name: String, namespace: String, resource_version: String, cluster_ip: String },
	Delete { name: String, namespace: String },
}

/// The opaque contract for whatever feeds the watcher service events. Runs its
/// own task and calls back into the watcher; the watcher never reaches back
/// into the source, so there is no cycle between the two (see DESIGN.md's
/// note on the cyclic watcher/controller reference in the source material).
pub trait ServiceEventSource {
	/// Starts consuming upstream events, invoking `on_event` for each one.
	/// Returns once the first event (or a definite "caught up, no services
	/// yet" signal) has been delivered, so callers can await readiness without
	/// a process-wide latch.
	fn start(self: Box<Self>, on_event: Box<dyn FnMut(ServiceEvent)>) -> ReadySignal;
}

/// One-shot readiness notification returned by [`ServiceEventSource::start`].
/// Replaces the source material's process-wide "ready" latch with an explicit
/// value the main task can hold onto and await.
pub struct ReadySignal(std::sync::mpsc::Receiver<()>);

impl ReadySignal {
	pub fn fired() -> (std::sync::mpsc::SyncSender<()>, Self) {
		let (tx, rx) = std::sync::mpsc::sync_channel(1);
		(tx, Self(rx))
	}

	/// Non-blocking check; the main task polls this alongside the stakker loop
	/// rather than blocking on it.
	pub fn is_ready(&self) -> bool {
		matches!(self.0.try_recv(), Ok(()) | Err(std::sync::mpsc::TryRecvError::Disconnected))
	}
}

/// A source that never produces events, used when the watcher is disabled by
/// configuration. Fires ready immediately so startup never waits on it.
pub struct DisabledSource;

impl ServiceEventSource for DisabledSource {
	fn start(self: Box<Self>, _on_event: Box<dyn FnMut(ServiceEvent)>) -> ReadySignal {
		let (tx, signal) = ReadySignal::fired();
		let _ = tx.send(());
		signal
	}
}

#[derive(Debug, Clone, Default)]
struct ServiceInfo {
	resource_version: String,
	addresses: Vec<NetAddress>,
}

/// Owns the `Name.Namespace → ServiceInfo` dedup table. Constructed with the
/// output channel already bound, per the design note eliminating the source
/// material's controller→watcher back-pointer: this type owns nothing that
/// points back at whatever drives it.
pub struct ServiceWatcher {
	services: HashMap<String, ServiceInfo>,
	updates: Fwd<NetAddress>,
}

impl ServiceWatcher {
	pub fn new(updates: Fwd<NetAddress>) -> Self {
		Self { services: HashMap::new(), updates }
	}

	/// Wires `self` behind `source`, returning the readiness signal the caller
	/// should observe before treating the watcher as caught up.
	pub fn start(mut self, source: Box<dyn ServiceEventSource>) -> ReadySignal {
		source.start(Box::new(move |event| self.handle(event)))
	}

	fn handle(&mut self, event: ServiceEvent) {
		match event {
			ServiceEvent::AddOrUpdate { name, namespace, resource_version, cluster_ip } => self.add_or_update(name, namespace, resource_version, cluster_ip),
			ServiceEvent::Delete { name, namespace } => self.delete(name, namespace),
		}
	}

	fn add_or_update(&mut self, name: String, namespace: String, resource_version: String, cluster_ip: String) {
		let key = format!("{name}.{namespace}");

		if let Some(existing) = self.services.get(&key) {
			if existing.resource_version == resource_version {
				// Idempotent re-delivery: no-op.
				return;
			}
		}

		let previous = self.services.remove(&key);
		if let Some(previous) = previous {
			for addr in previous.addresses {
				self.emit(NetAddress { is_delete: true, ..addr });
			}
		}

		let host = key.clone();
		let addr = NetAddress { host, ip: cluster_ip, svc: Some(name.clone()), ns: Some(namespace.clone()), is_delete: false, ttl_secs: None };

		self.emit(addr.clone());
		self.services.insert(key, ServiceInfo { resource_version, addresses: vec![addr] });
	}

	fn delete(&mut self, name: String, namespace: String) {
		let key = format!("{name}.{namespace}");

		let Some(info) = self.services.remove(&key) else {
			return;
		};

		for addr in info.addresses {
			self.emit(NetAddress { is_delete: true, ..addr });
		}
	}

	fn emit(&self, addr: NetAddress) {
		info!("service watcher delta: {} -> {} (delete={})", addr.host, addr.ip, addr.is_delete);
		self.updates.fwd(addr);
	}
}

pub fn warn_disabled() {
	warn!("service watcher disabled by configuration; only the static domain file will be applied");
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::cell::RefCell;
	use std::rc::Rc;

	fn capture() -> (Fwd<NetAddress>, Rc<RefCell<Vec<NetAddress>>>) {
		let sink: Rc<RefCell<Vec<NetAddress>>> = Rc::new(RefCell::new(Vec::new()));
		let captured = sink.clone();
		(Fwd::new(move |addr: NetAddress| captured.borrow_mut().push(addr)), sink)
	}

	#[test]
	fn repeated_resource_version_is_idempotent() {
		let (fwd, sink) = capture();
		let mut watcher = ServiceWatcher::new(fwd);

		watcher.handle(ServiceEvent::AddOrUpdate { name: "web".into(), namespace: "prod".into(), resource_version: "1".into(), cluster_ip: "10.1.0.1".into() });
		watcher.handle(ServiceEvent::AddOrUpdate { name: "web".into(), namespace: "prod".into(), resource_version: "1".into(), cluster_ip: "10.1.0.1".into() });

		assert_eq!(sink.borrow().len(), 1);
	}

	#[test]
	fn update_emits_delete_then_add() {
		let (fwd, sink) = capture();
		let mut watcher = ServiceWatcher::new(fwd);

		watcher.handle(ServiceEvent::AddOrUpdate { name: "web".into(), namespace: "prod".into(), resource_version: "1".into(), cluster_ip: "10.1.0.1".into() });
		watcher.handle(ServiceEvent::AddOrUpdate { name: "web".into(), namespace: "prod".into(), resource_version: "2".into(), cluster_ip: "10.1.0.2".into() });

		let events = sink.borrow();
		assert_eq!(events.len(), 3);
		assert!(!events[0].is_delete && events[0].ip == "10.1.0.1");
		assert!(events[1].is_delete && events[1].ip == "10.1.0.1");
		assert!(!events[2].is_delete && events[2].ip == "10.1.0.2");
	}

	#[test]
	fn delete_removes_entry_and_emits_delete_deltas() {
		let (fwd, sink) = capture();
		let mut watcher = ServiceWatcher::new(fwd);

		watcher.handle(ServiceEvent::AddOrUpdate { name: "web".into(), namespace: "prod".into(), resource_version: "1".into(), cluster_ip: "10.1.0.1".into() });
		watcher.handle(ServiceEvent::Delete { name: "web".into(), namespace: "prod".into() });

		let events = sink.borrow();
		assert_eq!(events.len(), 2);
		assert!(events[1].is_delete);
		assert!(!watcher.services.contains_key("web.prod"));
	}

	#[test]
	fn delete_of_unknown_service_is_a_no_op() {
		let (fwd, sink) = capture();
		let mut watcher = ServiceWatcher::new(fwd);

		watcher.handle(ServiceEvent::Delete { name: "ghost".into(), namespace: "prod".into() });

		assert!(sink.borrow().is_empty());
	}
}
