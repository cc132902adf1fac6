//! Process entry point: pre-flight checks, classifier attach, provider/reconciler
//! wiring, and signal-driven shutdown. Everything here is orchestration; the
//! actual logic lives in the library crate's modules.

use std::cell::RefCell;
use std::path::PathBuf;
use std::process::ExitCode;
use std::rc::Rc;

use dnsynth::classifier::Classifier;
use dnsynth::config::{self, Config};
use dnsynth::env::Probe;
use dnsynth::error::PreflightError;
use dnsynth::reconciler::{self, RingReader};
use dnsynth::{provider, watcher};
use log::{error, info, warn};
use stakker::Fwd;

fn main() -> ExitCode {
	log::set_boxed_logger(Box::new(runtime::Logger)).expect("logger installed exactly once");
	log::set_max_level(log::LevelFilter::Debug);

	match run() {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			error!("{err}");
			err.exit_code()
		}
	}
}

fn run() -> Result<(), PreflightError> {
	let config_path = std::env::args().nth(1).map(PathBuf::from).unwrap_or_else(|| PathBuf::from("config/config.yaml"));

	info!("loading configuration from {config_path:?}");
	let config = Config::load(&config_path)?;

	Probe::check_kernel_version()?;
	info!("kernel version check ok");

	Probe::raise_memlock_rlimit()?;
	info!("RLIMIT_MEMLOCK raised");

	let iface = Probe::resolve_interface(config.interface.as_deref())?;
	match Probe::local_ipv4() {
		Some(ip) => info!("local ip: {ip} on {iface:?}"),
		None => warn!("could not determine a local ipv4 address for {iface:?}"),
	}

	// A malformed static domain file is logged and skipped, not fatal — the
	// watcher source can still populate the name table.
	let domains = match config::load_domain_file(&config.domain_file) {
		Ok(domains) => domains,
		Err(err) => {
			warn!("failed to load static domain file {:?}: {err}; continuing without it", config.domain_file);
			Vec::new()
		}
	};
	info!("loaded {} static domain entries", domains.len());

	let mut classifier = Classifier::load_and_attach(&iface, config.ext_btf.as_deref())?;
	info!("classifier attached");

	let ring_reader = RingReader::open(&mut classifier)?;
	info!("telemetry ring reader started");

	let classifier = Rc::new(RefCell::new(classifier));
	let applier = classifier.clone();
	let default_ttl = config.default_ttl_secs;

	let updates: Fwd<provider::NetAddress> = Fwd::new(move |addr| {
		reconciler::apply_update(&mut applier.borrow_mut(), default_ttl, addr);
	});

	// The cluster API client is an external collaborator out of scope for this
	// crate (see DESIGN.md); a deployment that enables `kubernetes.enabled`
	// wires a concrete `ServiceEventSource` in here. Absent one, the watcher
	// stays inert and the static domain file is still applied.
	let source: Option<Box<dyn watcher::ServiceEventSource>> = None;
	let ready = provider::start(&config, &domains, updates, source);
	if let Some(ready) = ready {
		if ready.is_ready() {
			info!("service watcher caught up");
		}
	}

	let mut stakker = runtime::init();
	runtime::exec(&mut stakker, move || {
		info!("shutdown signal received, detaching classifier");
		drop(ring_reader);
		drop(classifier);
	})
	.map_err(|()| PreflightError::RuntimeExecFailed)?;

	info!("shutdown complete");
	Ok(())
}
