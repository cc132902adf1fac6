//! Loads and attaches the pre-compiled egress classifier, and exposes typed
//! handles onto its two maps. The classifier itself lives at
//! `../ebpf/tc_dns.c`; see `build.rs` for how it gets compiled into
//! [`EBPF_OBJECT`].

use std::path::Path;

use aya::maps::{HashMap as BpfHashMap, MapData};
use aya::programs::tc::SchedClassifierLink;
use aya::programs::{tc, Link, SchedClassifier, TcAttachType};
use aya::{Btf, Ebpf, EbpfLoader};

use crate::error::PreflightError;
use crate::maps::{DnsQueryKey, DnsRecordValue};

static EBPF_OBJECT: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/tc_dns.o"));

const PROGRAM_NAME: &str = "tc_dns_func";
const RECORDS_MAP: &str = "dns_a_records";
const EVENTS_MAP: &str = "dns_capture_events";

/// Owns the loaded classifier object and its qdisc attachment. Detaches the
/// program when dropped; the clsact qdisc itself is left in place, since
/// other classifiers may share it (see [`Classifier::load_and_attach`]).
pub struct Classifier {
	ebpf: Ebpf,
	iface: String,
	link: Option<SchedClassifierLink>,
}

impl Classifier {
	/// Loads `EBPF_OBJECT`, attaches `tc_dns_func` to `iface`'s egress path
	/// (installing a clsact qdisc if one isn't already present), and returns a
	/// handle bundling the loaded object with a fixed interface name.
	///
	/// `ext_btf`, when set, relocates the classifier's typed field accesses
	/// against an externally supplied BTF blob instead of the host's own
	/// `/sys/kernel/btf/vmlinux` — useful on kernels shipped without BTF.
	pub fn load_and_attach(iface: &str, ext_btf: Option<&Path>) -> Result<Self, PreflightError> {
		let mut loader = EbpfLoader::new();

		let btf;
		if let Some(path) = ext_btf {
			btf = Btf::parse_file(path, aya::Endianness::default()).map_err(|source| PreflightError::ExternalBtfLoadFailed { path: path.to_owned(), source })?;
			loader.btf(Some(&btf));
		}

		let mut ebpf = loader.load(EBPF_OBJECT).map_err(PreflightError::ClassifierLoadFailed)?;

		// Ignore "already exists" — multiple classifiers on one interface share
		// a single clsact qdisc.
		let _ = tc::qdisc_add_clsact(iface);

		let program: &mut SchedClassifier = ebpf
			.program_mut(PROGRAM_NAME)
			.ok_or_else(|| PreflightError::MapBindingNotFound(PROGRAM_NAME.to_owned()))?
			.try_into()
			.map_err(|err: aya::programs::ProgramError| PreflightError::ClassifierAttachFailed {
				name: PROGRAM_NAME.to_owned(),
				iface: iface.to_owned(),
				source: anyhow::Error::new(err),
			})?;

		program.load().map_err(|err| PreflightError::ClassifierAttachFailed {
			name: PROGRAM_NAME.to_owned(),
			iface: iface.to_owned(),
			source: anyhow::Error::new(err),
		})?;

		let link_id = program
			.attach(iface, TcAttachType::Egress)
			.map_err(|err| PreflightError::ClassifierAttachFailed { name: PROGRAM_NAME.to_owned(), iface: iface.to_owned(), source: anyhow::Error::new(err) })?;

		// Detach the owned link handle from the program's link map so `Drop`
		// can tear it down explicitly rather than relying on `Ebpf`'s own drop
		// order, which does not unpin tc links.
		let link: SchedClassifierLink = program.take_link(link_id).map_err(|err| PreflightError::ClassifierAttachFailed {
			name: PROGRAM_NAME.to_owned(),
			iface: iface.to_owned(),
			source: anyhow::Error::new(err),
		})?;

		Ok(Self { ebpf, iface: iface.to_owned(), link: Some(link) })
	}

	/// Typed handle onto `dns_a_records`, the hash map the classifier looks
	/// questions up in.
	pub fn records_map(&mut self) -> Result<BpfHashMap<&mut MapData, DnsQueryKey, DnsRecordValue>, PreflightError> {
		let map = self.ebpf.map_mut(RECORDS_MAP).ok_or_else(|| PreflightError::MapBindingNotFound(RECORDS_MAP.to_owned()))?;
		BpfHashMap::try_from(map).map_err(|_| PreflightError::MapBindingNotFound(RECORDS_MAP.to_owned()))
	}

	/// Takes ownership of `dns_capture_events` out of the loaded object, for
	/// the reconciler's telemetry reader to open per-CPU buffers against. Can
	/// only be called once; the reader then owns the map for the process
	/// lifetime.
	pub fn take_events_map(&mut self) -> Result<aya::maps::Map, PreflightError> {
		self.ebpf.take_map(EVENTS_MAP).ok_or_else(|| PreflightError::MapBindingNotFound(EVENTS_MAP.to_owned()))
	}

	pub fn interface(&self) -> &str {
		&self.iface
	}
}

impl Drop for Classifier {
	/// Detaches `tc_dns_func` from the egress qdisc. Best-effort: a detach
	/// failure during shutdown is logged, not propagated — there is no
	/// fallible `Drop`.
	fn drop(&mut self) {
		if let Some(link) = self.link.take() {
			if let Err(err) = link.detach() {
				log::warn!("failed to detach classifier from {:?}: {err}", self.iface);
			}
		}
	}
}
