//! Tick Producer - the ledger's single mailbox
//!
//! Every tick drains the request queue, executes the requests in arrival
//! order at the current tick, advances the tick and broadcasts the result.
//! Nothing else mutates the ledger, so requests never interleave.

use crate::{
    persistence::{LedgerPersistence, PersistentStore},
    processor::{LedgerProcessor, RequestResult},
    request::SignedRequest,
    MAX_REQUESTS_PER_TICK, TICK_TIME_MS,
};
use crossbeam_channel::{bounded, Receiver, Sender};
use staking_program::{StakingEvent, Tick};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::sync::broadcast;

/// Tick update event sent to subscribers
#[derive(Clone, Debug)]
pub struct TickUpdate {
    /// Tick the requests executed at
    pub tick: Tick,
    /// Number of requests processed
    pub request_count: usize,
    /// Per-request results
    pub results: Vec<RequestResult>,
    /// Events from successful requests, in order
    pub events: Vec<StakingEvent>,
    /// Ledger state digest after this tick
    pub state_root: [u8; 32],
    /// Tick processing time in microseconds
    pub processing_time_us: u64,
}

/// Tick producer configuration
#[derive(Clone, Debug)]
pub struct TickProducerConfig {
    /// Tick time in milliseconds
    pub tick_time_ms: u64,
    /// Maximum requests executed per tick
    pub max_requests_per_tick: usize,
    /// Save state every N ticks (0 = only on shutdown)
    pub save_interval: u64,
    /// Log every tick
    pub verbose: bool,
}

impl Default for TickProducerConfig {
    fn default() -> Self {
        Self {
            tick_time_ms: TICK_TIME_MS,
            max_requests_per_tick: MAX_REQUESTS_PER_TICK,
            save_interval: 0,
            verbose: false,
        }
    }
}

/// Handle for submitting requests to the tick producer
#[derive(Clone)]
pub struct RequestSender {
    sender: Sender<SignedRequest>,
}

impl RequestSender {
    /// Queue a request for the next tick
    pub fn send(&self, request: SignedRequest) -> Result<(), String> {
        self.sender
            .try_send(request)
            .map_err(|e| format!("Failed to submit request: {}", e))
    }
}

pub struct TickProducer {
    processor: LedgerProcessor,
    request_receiver: Receiver<SignedRequest>,
    request_sender: Sender<SignedRequest>,
    update_sender: broadcast::Sender<TickUpdate>,
    config: TickProducerConfig,
    store: Option<Arc<PersistentStore>>,
    running: Arc<AtomicBool>,
}

impl TickProducer {
    /// Create a new tick producer
    pub fn new(processor: LedgerProcessor, config: TickProducerConfig) -> Self {
        let (request_sender, request_receiver) = bounded(1024);
        let (update_sender, _) = broadcast::channel(64);

        Self {
            processor,
            request_receiver,
            request_sender,
            update_sender,
            config,
            store: None,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Save to `store` every `save_interval` ticks and when the loop stops
    pub fn with_persistence(mut self, store: Arc<PersistentStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Get a sender for submitting requests
    pub fn request_sender(&self) -> RequestSender {
        RequestSender {
            sender: self.request_sender.clone(),
        }
    }

    /// Subscribe to tick updates
    pub fn subscribe(&self) -> broadcast::Receiver<TickUpdate> {
        self.update_sender.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the tick producer
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Flag that stops the loop after the current tick
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn current_tick(&self) -> Tick {
        self.processor.current_tick()
    }

    pub fn processor(&self) -> &LedgerProcessor {
        &self.processor
    }

    /// Execute one tick
    pub fn step(&mut self) -> TickUpdate {
        let tick_start = Instant::now();

        // Drain request queue; the producer holds a sender, so it never disconnects
        let mut pending = Vec::with_capacity(self.config.max_requests_per_tick);
        while pending.len() < self.config.max_requests_per_tick {
            match self.request_receiver.try_recv() {
                Ok(request) => pending.push(request),
                Err(_) => break,
            }
        }

        let tick = self.processor.current_tick();
        let results = self.processor.process_requests(&pending);
        let events: Vec<StakingEvent> = results
            .iter()
            .filter(|r| r.success)
            .flat_map(|r| r.events.iter().cloned())
            .collect();

        self.processor.advance_tick();

        let update = TickUpdate {
            tick,
            request_count: pending.len(),
            results,
            events,
            state_root: self.processor.state_root(),
            processing_time_us: tick_start.elapsed().as_micros() as u64,
        };

        // Ignore errors if there are no subscribers
        let _ = self.update_sender.send(update.clone());

        if self.config.verbose || update.request_count > 0 {
            tracing::debug!(
                "Tick {} | {} requests | {} events | {:.2}ms",
                tick,
                update.request_count,
                update.events.len(),
                update.processing_time_us as f64 / 1000.0
            );
        }

        update
    }

    fn save_state(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = self.processor.save_to_disk(store, chrono::Utc::now().timestamp()) {
            tracing::error!("Failed to save ledger at tick {}: {}", self.processor.current_tick(), e);
        }
    }

    /// Run the tick loop on tokio until stopped, then save once more
    pub async fn run_async(mut self) -> LedgerProcessor {
        self.running.store(true, Ordering::SeqCst);

        let tick_duration = Duration::from_millis(self.config.tick_time_ms);
        let mut interval = tokio::time::interval(tick_duration);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        tracing::info!(
            "Tick producer started at tick {} ({}ms ticks)",
            self.processor.current_tick(),
            self.config.tick_time_ms
        );

        while self.running.load(Ordering::SeqCst) {
            interval.tick().await;

            let update = self.step();

            // Warn if we're falling behind
            if update.processing_time_us > tick_duration.as_micros() as u64 {
                tracing::warn!(
                    "Tick {} took {:.2}ms (target: {}ms)",
                    update.tick,
                    update.processing_time_us as f64 / 1000.0,
                    self.config.tick_time_ms
                );
            }

            let next = self.processor.current_tick();
            if self.config.save_interval > 0 && next % self.config.save_interval == 0 {
                self.save_state();
            }
        }

        self.running.store(false, Ordering::SeqCst);
        tracing::info!("Tick producer stopped at tick {}", self.processor.current_tick());

        self.save_state();
        self.processor
    }
}
