// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{instrument, warn};

use crate::event::AuditLogEntry;
use crate::sink::AuditSink;

pub struct AuditService {
	tx: mpsc::Sender<AuditLogEntry>,
	dropped: Arc<AtomicU64>,
}

impl AuditService {
	/// Spawns the fan-out task. Must be called inside a tokio runtime.
	pub fn new(queue_capacity: usize, sinks: Vec<Arc<dyn AuditSink>>) -> Self {
		let (tx, rx) = mpsc::channel(queue_capacity.max(1));

		tokio::spawn(Self::background_task(rx, sinks));

		Self {
			tx,
			dropped: Arc::new(AtomicU64::new(0)),
		}
	}

	async fn background_task(mut rx: mpsc::Receiver<AuditLogEntry>, sinks: Vec<Arc<dyn AuditSink>>) {
		while let Some(entry) = rx.recv().await {
			let entry = Arc::new(entry);

			for sink in &sinks {
				if !sink.filter().allows(&entry) {
					continue;
				}

				let sink = Arc::clone(sink);
				let entry = Arc::clone(&entry);

				tokio::spawn(async move {
					if let Err(e) = sink.publish(entry).await {
						warn!(sink = sink.name(), error = %e, "audit sink publish failed");
					}
				});
			}
		}
	}

	/// Queue an entry. Returns `false` when the queue is full and the entry was dropped.
	#[instrument(skip(self, entry), fields(event_type = %entry.event_type))]
	pub fn log(&self, entry: AuditLogEntry) -> bool {
		match self.tx.try_send(entry) {
			Ok(()) => true,
			Err(e) => {
				self.dropped.fetch_add(1, Ordering::Relaxed);
				warn!(error = %e, "audit entry dropped");
				false
			}
		}
	}

	pub fn dropped_count(&self) -> u64 {
		self.dropped.load(Ordering::Relaxed)
	}
}
