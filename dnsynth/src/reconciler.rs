//! DNS Worker / Reconciler: the sole writer of the name table and the sole
//! reader of the telemetry ring. Owns the classifier's lifetime.

use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::os::fd::{AsRawFd, RawFd};
use std::rc::Rc;

use aya::maps::perf::{PerfEventArray, PerfEventArrayBuffer};
use aya::maps::MapData;
use bytes::BytesMut;
use log::{debug, error, warn};
use runtime::Io;
use utils::bytes::cast;

use crate::classifier::Classifier;
use crate::error::PreflightError;
use crate::maps::{DnsCaptureEvent, DnsQueryKey, DnsRecordValue};
use crate::provider::NetAddress;
use crate::wire::WireName;

const RING_PAGE_COUNT: usize = 8;
const RING_READ_BATCH: usize = 16;

/// Applies a single update to the name table. Unparseable IPs are logged and
/// dropped rather than propagated, per the transient-update error category.
pub fn apply_update(classifier: &mut Classifier, default_ttl_secs: u64, addr: NetAddress) {
	let name = match WireName::encode(&addr.host) {
		Ok(name) => name,
		Err(err) => {
			warn!("dropping update for {:?}: {err}", addr.host);
			return;
		}
	};

	let key = DnsQueryKey::for_hostname(&name);

	let Ok(mut map) = classifier.records_map() else {
		error!("name table map unavailable; dropping update for {:?}", addr.host);
		return;
	};

	if addr.is_delete {
		// A delete for a key that was never present is not an error.
		let _ = map.remove(&key);
		debug!("removed name table entry for {:?}", addr.host);
		return;
	}

	let ip: Ipv4Addr = match addr.ip.parse() {
		Ok(ip) => ip,
		Err(err) => {
			warn!("dropping update for {:?}: invalid IPv4 address {:?}: {err}", addr.host, addr.ip);
			return;
		}
	};

	let ttl = addr.ttl_secs().unwrap_or(default_ttl_secs) as u32;
	let value = DnsRecordValue::new(ip, ttl);

	if let Err(err) = map.insert(&key, &value, 0) {
		warn!("failed to write name table entry for {:?}: {err}", addr.host);
	} else {
		let origin = match (&addr.svc, &addr.ns) {
			(Some(svc), Some(ns)) => format!(" (service {svc}.{ns})"),
			_ => String::new(),
		};
		debug!("name table entry for {:?} -> {}{origin}", addr.host, ip);
	}
}

/// Owns one per-CPU buffer of the telemetry ring, each registered with the
/// cooperative poll loop ([`runtime::Io`]) so it drains as soon as the
/// reactor reports its perf-event fd readable, rather than on a timer.
pub struct RingReader {
	_buffers: Vec<Io<PerfBufferFd>>,
}

/// Thin `AsRawFd` forwarder so a perf buffer shared between an [`Io`]
/// registration and its own drain callback can satisfy `Io`'s bound without
/// `Io` itself needing to hand the callback a reference back to its owner.
pub struct PerfBufferFd(Rc<RefCell<PerfEventArrayBuffer<MapData>>>);

impl AsRawFd for PerfBufferFd {
	fn as_raw_fd(&self) -> RawFd {
		self.0.borrow().as_raw_fd()
	}
}

impl RingReader {
	pub fn open(classifier: &mut Classifier) -> Result<Self, PreflightError> {
		let map = classifier.take_events_map()?;
		let mut array: PerfEventArray<MapData> = PerfEventArray::try_from(map).map_err(|_| PreflightError::MapBindingNotFound("dns_capture_events".to_owned()))?;

		let cpus = aya::util::online_cpus().unwrap_or_else(|_| vec![0]);
		let mut buffers = Vec::with_capacity(cpus.len());
		for cpu_id in cpus {
			let buf = array.open(cpu_id, Some(RING_PAGE_COUNT)).map_err(|_| PreflightError::MapBindingNotFound("dns_capture_events".to_owned()))?;
			let buf = Rc::new(RefCell::new(buf));
			let drain_handle = buf.clone();
			buffers.push(Io::new(PerfBufferFd(buf), move || drain_buffer(&mut drain_handle.borrow_mut())));
		}

		Ok(Self { _buffers: buffers })
	}
}

/// Drains a single per-CPU buffer, logging a human-readable line per event and
/// counting (but not failing on) lost samples.
fn drain_buffer(buffer: &mut PerfEventArrayBuffer<MapData>) {
	let mut bufs = vec![BytesMut::with_capacity(std::mem::size_of::<DnsCaptureEvent>() + 4); RING_READ_BATCH];

	loop {
		let events = match buffer.read_events(&mut bufs) {
			Ok(events) => events,
			Err(err) => {
				warn!("perf ring read failed: {err}");
				break;
			}
		};

		if events.lost > 0 {
			warn!("lost {} telemetry samples from the kernel ring", events.lost);
		}

		for buf in bufs.iter().take(events.read) {
			log_event(buf);
		}

		if events.read == 0 {
			break;
		}
	}
}

fn log_event(buf: &BytesMut) {
	if buf.len() < std::mem::size_of::<DnsCaptureEvent>() {
		warn!("telemetry event shorter than expected ({} bytes)", buf.len());
		return;
	}

	let event: &DnsCaptureEvent = cast(&buf[..]);
	let name = WireName::from_bytes(event.name).decode();

	debug!(
		"dns synth: name={:?} type={} match={} ts={}",
		name,
		event.record_type,
		event.is_match != 0,
		event.ts.get()
	);
}
