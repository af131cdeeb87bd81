// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Provisioning metrics.
//!
//! One [`ProvisioningMetrics`] is built at startup and handed to every
//! component that records anything. Prometheus series cover counts and
//! latency distributions; per-endpoint ring buffers back the admin stats view.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use prometheus::{
	CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, Opts, Registry, TextEncoder,
};
use serde::Serialize;
use tracing::error;

/// Samples retained per endpoint.
pub const LATENCY_WINDOW_CAPACITY: usize = 1000;

const NAMESPACE: &str = "tessera";
const SUBSYSTEM: &str = "provisioning";

pub struct ProvisioningMetrics {
	/// Counter with labels: operations by resource, operation and outcome
	operations_total: CounterVec,

	/// Histogram with labels: operation latency in seconds
	operation_latency_seconds: HistogramVec,

	/// Counter with labels: rejected tokens by internal reason
	auth_failures_total: CounterVec,

	/// Counter with labels: filters that failed open by reason
	filter_fail_open_total: CounterVec,

	/// Counter with labels: patch operations accepted as no-ops
	patch_ignored_total: CounterVec,

	/// Counter with labels: side effects that failed by kind
	side_effect_failures_total: CounterVec,

	/// Counter with labels: bulk sub-operations by outcome
	bulk_operations_total: CounterVec,

	rate_limited_total: IntCounter,

	endpoints: RwLock<HashMap<String, Arc<LatencyWindow>>>,

	registry: Arc<Registry>,
}

impl ProvisioningMetrics {
	/// # Errors
	/// Returns an error if metric registration fails.
	pub fn new() -> Result<Self, prometheus::Error> {
		let registry = Arc::new(Registry::new());

		let operations_total = CounterVec::new(
			Opts::new("operations_total", "Provisioning operations by resource and outcome")
				.namespace(NAMESPACE)
				.subsystem(SUBSYSTEM),
			&["resource", "operation", "outcome"],
		)?;
		registry.register(Box::new(operations_total.clone()))?;

		let operation_latency_seconds = HistogramVec::new(
			HistogramOpts::new("operation_latency_seconds", "Provisioning operation latency")
				.namespace(NAMESPACE)
				.subsystem(SUBSYSTEM)
				.buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
			&["resource", "operation"],
		)?;
		registry.register(Box::new(operation_latency_seconds.clone()))?;

		let auth_failures_total = CounterVec::new(
			Opts::new("auth_failures_total", "Rejected provisioning tokens by reason")
				.namespace(NAMESPACE)
				.subsystem(SUBSYSTEM),
			&["reason"],
		)?;
		registry.register(Box::new(auth_failures_total.clone()))?;

		let filter_fail_open_total = CounterVec::new(
			Opts::new(
				"filter_fail_open_total",
				"Filters that could not be parsed and matched everything",
			)
			.namespace(NAMESPACE)
			.subsystem(SUBSYSTEM),
			&["reason"],
		)?;
		registry.register(Box::new(filter_fail_open_total.clone()))?;

		let patch_ignored_total = CounterVec::new(
			Opts::new(
				"patch_ignored_total",
				"Patch operations with unsupported paths accepted as no-ops",
			)
			.namespace(NAMESPACE)
			.subsystem(SUBSYSTEM),
			&["resource", "op"],
		)?;
		registry.register(Box::new(patch_ignored_total.clone()))?;

		let side_effect_failures_total = CounterVec::new(
			Opts::new("side_effect_failures_total", "Failed webhook and audit side effects")
				.namespace(NAMESPACE)
				.subsystem(SUBSYSTEM),
			&["kind"],
		)?;
		registry.register(Box::new(side_effect_failures_total.clone()))?;

		let bulk_operations_total = CounterVec::new(
			Opts::new("bulk_operations_total", "Bulk sub-operations by outcome")
				.namespace(NAMESPACE)
				.subsystem(SUBSYSTEM),
			&["outcome"],
		)?;
		registry.register(Box::new(bulk_operations_total.clone()))?;

		let rate_limited_total = IntCounter::with_opts(
			Opts::new("rate_limited_total", "Requests rejected by the tenant rate limiter")
				.namespace(NAMESPACE)
				.subsystem(SUBSYSTEM),
		)?;
		registry.register(Box::new(rate_limited_total.clone()))?;

		Ok(Self {
			operations_total,
			operation_latency_seconds,
			auth_failures_total,
			filter_fail_open_total,
			patch_ignored_total,
			side_effect_failures_total,
			bulk_operations_total,
			rate_limited_total,
			endpoints: RwLock::new(HashMap::new()),
			registry,
		})
	}

	pub fn record_operation(&self, resource: &str, operation: &str, outcome: &str, latency: Duration) {
		self.operations_total
			.with_label_values(&[resource, operation, outcome])
			.inc();
		self.operation_latency_seconds
			.with_label_values(&[resource, operation])
			.observe(latency.as_secs_f64());
	}

	pub fn record_auth_failure(&self, reason: &str) {
		self.auth_failures_total.with_label_values(&[reason]).inc();
	}

	pub fn record_filter_fail_open(&self, reason: &str) {
		self.filter_fail_open_total.with_label_values(&[reason]).inc();
	}

	pub fn record_patch_ignored(&self, resource: &str, op: &str) {
		self.patch_ignored_total.with_label_values(&[resource, op]).inc();
	}

	pub fn record_side_effect_failure(&self, kind: &str) {
		self.side_effect_failures_total.with_label_values(&[kind]).inc();
	}

	pub fn record_bulk_operation(&self, outcome: &str) {
		self.bulk_operations_total.with_label_values(&[outcome]).inc();
	}

	pub fn record_rate_limited(&self) {
		self.rate_limited_total.inc();
	}

	/// Record one served request against the endpoint's ring buffer.
	pub fn record_request(&self, endpoint: &str, latency: Duration, success: bool) {
		self.window(endpoint).record(latency, success);
	}

	fn window(&self, endpoint: &str) -> Arc<LatencyWindow> {
		if let Some(window) = self.endpoints.read().get(endpoint) {
			return Arc::clone(window);
		}
		let mut endpoints = self.endpoints.write();
		Arc::clone(
			endpoints
				.entry(endpoint.to_string())
				.or_insert_with(|| Arc::new(LatencyWindow::new(LATENCY_WINDOW_CAPACITY))),
		)
	}

	/// Snapshot of every endpoint seen so far, sorted by endpoint.
	pub fn endpoint_stats(&self) -> Vec<EndpointStats> {
		let endpoints = self.endpoints.read();
		let mut stats: Vec<EndpointStats> = endpoints
			.iter()
			.map(|(name, window)| window.snapshot(name))
			.collect();
		stats.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
		stats
	}

	/// Prometheus text exposition of every registered series.
	pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
		let metrics = self.registry.gather();
		let encoder = TextEncoder::new();
		let mut buf = Vec::new();
		encoder.encode(&metrics, &mut buf).map_err(|e| {
			error!(error = %e, "failed to encode metrics");
			prometheus::Error::Msg(format!("Failed to encode metrics: {e}"))
		})?;
		Ok(String::from_utf8_lossy(&buf).to_string())
	}
}

/// Bounded window of recent request latencies for one endpoint.
pub struct LatencyWindow {
	capacity: usize,
	samples: RwLock<VecDeque<Duration>>,
	count: AtomicU64,
	errors: AtomicU64,
}

impl LatencyWindow {
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity: capacity.max(1),
			samples: RwLock::new(VecDeque::with_capacity(capacity.max(1))),
			count: AtomicU64::new(0),
			errors: AtomicU64::new(0),
		}
	}

	pub fn record(&self, latency: Duration, success: bool) {
		self.count.fetch_add(1, Ordering::Relaxed);
		if !success {
			self.errors.fetch_add(1, Ordering::Relaxed);
		}
		let mut samples = self.samples.write();
		if samples.len() == self.capacity {
			samples.pop_front();
		}
		samples.push_back(latency);
	}

	pub fn len(&self) -> usize {
		self.samples.read().len()
	}

	pub fn is_empty(&self) -> bool {
		self.samples.read().is_empty()
	}

	pub fn snapshot(&self, endpoint: &str) -> EndpointStats {
		let mut sorted: Vec<Duration> = self.samples.read().iter().copied().collect();
		sorted.sort_unstable();

		EndpointStats {
			endpoint: endpoint.to_string(),
			count: self.count.load(Ordering::Relaxed),
			errors: self.errors.load(Ordering::Relaxed),
			p50_ms: percentile_ms(&sorted, 0.50),
			p95_ms: percentile_ms(&sorted, 0.95),
			max_ms: sorted.last().map(duration_ms).unwrap_or(0.0),
		}
	}
}

/// Nearest-rank percentile over an ascending slice.
fn percentile_ms(sorted: &[Duration], p: f64) -> f64 {
	if sorted.is_empty() {
		return 0.0;
	}
	let rank = (p * sorted.len() as f64).ceil() as usize;
	let index = rank.clamp(1, sorted.len()) - 1;
	duration_ms(&sorted[index])
}

fn duration_ms(d: &Duration) -> f64 {
	d.as_micros() as f64 / 1000.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointStats {
	pub endpoint: String,
	/// Requests served since startup.
	pub count: u64,
	pub errors: u64,
	pub p50_ms: f64,
	pub p95_ms: f64,
	pub max_ms: f64,
}
