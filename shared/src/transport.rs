//! Unreliable, unordered datagram transport abstraction.
//!
//! The protocol components never touch sockets. They hand encoded packets to
//! a [`Channel`] and drain whatever has arrived since the last frame, which
//! lets the same game loop run over UDP, over an in-process loopback, or
//! over a loopback with injected loss, duplication and delay.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

pub trait Channel {
    /// Fire-and-forget send. Delivery is not guaranteed.
    fn send(&mut self, bytes: &[u8]);

    /// Drains every datagram received since the previous call, oldest first.
    /// Never blocks.
    fn recv(&mut self) -> Vec<Vec<u8>>;
}

impl<C: Channel + ?Sized> Channel for Box<C> {
    fn send(&mut self, bytes: &[u8]) {
        (**self).send(bytes)
    }

    fn recv(&mut self) -> Vec<Vec<u8>> {
        (**self).recv()
    }
}

/// One end of an in-process channel pair.
#[derive(Debug)]
pub struct LoopbackChannel {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    sent: u64,
}

impl LoopbackChannel {
    /// Number of datagrams passed to `send` on this end.
    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// True once the other end has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Creates two connected ends; what one sends the other receives.
pub fn loopback_pair() -> (LoopbackChannel, LoopbackChannel) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        LoopbackChannel {
            tx: a_tx,
            rx: b_rx,
            sent: 0,
        },
        LoopbackChannel {
            tx: b_tx,
            rx: a_rx,
            sent: 0,
        },
    )
}

impl Channel for LoopbackChannel {
    fn send(&mut self, bytes: &[u8]) {
        self.sent += 1;
        // A closed peer behaves like a lossy link.
        let _ = self.tx.send(bytes.to_vec());
    }

    fn recv(&mut self) -> Vec<Vec<u8>> {
        let mut received = Vec::new();
        while let Ok(bytes) = self.rx.try_recv() {
            received.push(bytes);
        }
        received
    }
}

/// Link conditions applied by [`ImpairedChannel`] on the sending side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpairmentConfig {
    /// Probability in `[0, 1]` that a datagram is dropped.
    pub loss: f64,
    /// Probability in `[0, 1]` that a delivered datagram is sent twice.
    pub duplicate: f64,
    pub latency_ms: u64,
    /// Extra uniformly distributed delay in `[0, jitter_ms]`; reorders packets.
    pub jitter_ms: u64,
}

impl Default for ImpairmentConfig {
    fn default() -> Self {
        Self {
            loss: 0.0,
            duplicate: 0.0,
            latency_ms: 0,
            jitter_ms: 0,
        }
    }
}

impl ImpairmentConfig {
    pub fn is_clean(&self) -> bool {
        self.loss <= 0.0 && self.duplicate <= 0.0 && self.latency_ms == 0 && self.jitter_ms == 0
    }
}

/// Wraps a channel and degrades its outgoing traffic.
pub struct ImpairedChannel<C: Channel> {
    inner: C,
    config: ImpairmentConfig,
    rng: StdRng,
    in_flight: Vec<(Instant, Vec<u8>)>,
    dropped: u64,
}

impl<C: Channel> ImpairedChannel<C> {
    pub fn new(inner: C, config: ImpairmentConfig) -> Self {
        Self::with_rng(inner, config, StdRng::from_entropy())
    }

    pub fn with_seed(inner: C, config: ImpairmentConfig, seed: u64) -> Self {
        Self::with_rng(inner, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(inner: C, config: ImpairmentConfig, rng: StdRng) -> Self {
        Self {
            inner,
            config,
            rng,
            in_flight: Vec::new(),
            dropped: 0,
        }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut C {
        &mut self.inner
    }

    pub fn config(&self) -> &ImpairmentConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ImpairmentConfig) {
        self.config = config;
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Datagrams delayed but not yet handed to the inner channel.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn delay(&mut self) -> Duration {
        let jitter = if self.config.jitter_ms > 0 {
            self.rng.gen_range(0..=self.config.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(self.config.latency_ms + jitter)
    }

    fn flush_due(&mut self) {
        if self.in_flight.is_empty() {
            return;
        }
        let now = Instant::now();
        self.in_flight.sort_by_key(|(due, _)| *due);
        let ready = self.in_flight.partition_point(|(due, _)| *due <= now);
        for (_, bytes) in self.in_flight.drain(..ready) {
            self.inner.send(&bytes);
        }
    }
}

impl<C: Channel> Channel for ImpairedChannel<C> {
    fn send(&mut self, bytes: &[u8]) {
        self.flush_due();

        if self.config.loss > 0.0 && self.rng.gen_bool(self.config.loss.min(1.0)) {
            self.dropped += 1;
            return;
        }

        let copies = if self.config.duplicate > 0.0 && self.rng.gen_bool(self.config.duplicate.min(1.0)) {
            2
        } else {
            1
        };

        for _ in 0..copies {
            let delay = self.delay();
            if delay.is_zero() {
                self.inner.send(bytes);
            } else {
                self.in_flight.push((Instant::now() + delay, bytes.to_vec()));
            }
        }
    }

    fn recv(&mut self) -> Vec<Vec<u8>> {
        self.flush_due();
        self.inner.recv()
    }
}
