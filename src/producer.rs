//! The producer loop and the built-in demo backend.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::bridge::SnapshotSender;
use crate::snapshot::{
    Clock, Snapshot, HISTORY_SLOTS, REGISTER_A, REGISTER_BITS, REGISTER_COUNT, STACK_CELLS,
};

/// Default producer cadence. Slow demo modes go up to a second.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(100);

/// A tick's state query failed. Non-fatal: the producer skips that tick.
#[derive(Debug, Error)]
#[error("backend unavailable: {0}")]
pub struct BackendError(pub String);

/// Source of panel state, queried once per tick.
///
/// `sample` is synchronous and is not subject to a timeout; an adapter over
/// a remote or slow backend must bound its own query time or it will stall
/// the producer cadence.
pub trait Backend: Send {
    fn sample(&mut self) -> Result<Snapshot, BackendError>;
}

#[derive(Debug)]
struct Shared {
    cancel: CancellationToken,
    interval_ms: AtomicU64,
    ticks: AtomicU64,
    skipped: AtomicU64,
}

/// Control surface for a running [`Producer`].
#[derive(Debug, Clone)]
pub struct ProducerHandle {
    shared: Arc<Shared>,
}

impl ProducerHandle {
    /// Requests a stop; the loop observes it at the top of its next
    /// iteration and during the interval wait.
    pub fn stop(&self) {
        self.shared.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    /// Retunes the cadence; takes effect from the next iteration.
    pub fn set_interval(&self, interval: Duration) {
        let ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX).max(1);
        self.shared.interval_ms.store(ms, Ordering::Relaxed);
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.shared.interval_ms.load(Ordering::Relaxed))
    }

    /// Snapshots forwarded so far.
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.load(Ordering::Relaxed)
    }

    /// Ticks skipped because the backend query failed.
    pub fn skipped(&self) -> u64 {
        self.shared.skipped.load(Ordering::Relaxed)
    }
}

/// Periodic task that samples a backend and forwards each snapshot through
/// the bridge.
pub struct Producer<B> {
    backend: B,
    tx: SnapshotSender,
    shared: Arc<Shared>,
}

impl<B: Backend> Producer<B> {
    pub fn new(backend: B, tx: SnapshotSender, interval: Duration) -> (Self, ProducerHandle) {
        let ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX).max(1);
        let shared = Arc::new(Shared {
            cancel: CancellationToken::new(),
            interval_ms: AtomicU64::new(ms),
            ticks: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        });
        let handle = ProducerHandle {
            shared: Arc::clone(&shared),
        };
        (
            Self {
                backend,
                tx,
                shared,
            },
            handle,
        )
    }

    /// Runs until stopped or until the consumer side of the bridge is gone.
    ///
    /// Each iteration suspends cooperatively for the configured interval,
    /// samples the backend once, and forwards the snapshot. A failed sample
    /// is fatal to that iteration only — it is logged, counted, and the loop
    /// keeps the display live.
    pub async fn run(mut self) {
        loop {
            if self.shared.cancel.is_cancelled() {
                break;
            }
            let interval = Duration::from_millis(self.shared.interval_ms.load(Ordering::Relaxed));
            tokio::select! {
                _ = self.shared.cancel.cancelled() => break,
                _ = time::sleep(interval) => {}
            }
            match self.backend.sample() {
                Ok(snapshot) => {
                    if self.tx.send(snapshot).is_err() {
                        break;
                    }
                    self.shared.ticks.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    self.shared.skipped.fetch_add(1, Ordering::Relaxed);
                    warn!("tick skipped: {e}");
                }
            }
        }
    }
}

/// Where the demo clock comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockSource {
    /// Monotonic tick counter, rendered as elapsed minutes and seconds.
    #[default]
    Ticks,
    /// Host wall clock, UTC hours and minutes.
    WallClock,
}

const DEMO_PROGRAM: &str = include_str!("demo_program.asm");

/// Synthesizes panel state from internal counters; stands in for an
/// emulator in standalone/demo deployments.
///
/// Register A tracks the low bits of the tick counter; the other registers
/// and the stack gauge random-walk, and the command history cycles through
/// an embedded program listing. Deterministic for a fixed seed (in `Ticks`
/// clock mode).
pub struct DemoBackend {
    tick: u64,
    rng_state: u64,
    clock_source: ClockSource,
    registers: [[bool; REGISTER_BITS]; REGISTER_COUNT],
    stack: u8,
    history: VecDeque<&'static str>,
    program: Vec<&'static str>,
    program_pos: usize,
}

impl DemoBackend {
    pub fn new(seed: u64) -> Self {
        Self::with_clock_source(seed, ClockSource::default())
    }

    pub fn with_clock_source(seed: u64, clock_source: ClockSource) -> Self {
        let program: Vec<&'static str> = DEMO_PROGRAM
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();
        let history: VecDeque<&'static str> =
            program.iter().copied().take(HISTORY_SLOTS).collect();
        Self {
            tick: 0,
            // xorshift64* needs a nonzero state.
            rng_state: 0x9E37_79B9_7F4A_7C15u64 ^ seed,
            clock_source,
            registers: Default::default(),
            stack: 0,
            program_pos: history.len() % program.len(),
            history,
            program,
        }
    }

    #[inline]
    fn rng_next_u64(&mut self) -> u64 {
        // xorshift64* (fast, dependency-free; fine for panel noise)
        let mut x = self.rng_state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.rng_state = x;
        x.wrapping_mul(2685821657736338717)
    }

    #[inline]
    fn rng_below(&mut self, n: u64) -> u64 {
        self.rng_next_u64() % n
    }

    #[inline]
    fn rng_bool(&mut self) -> bool {
        self.rng_next_u64() & 1 == 1
    }

    fn advance_history(&mut self) {
        let skip = self.rng_below(6) as usize;
        self.program_pos = (self.program_pos + skip) % self.program.len();
        let line = self.program[self.program_pos];
        self.program_pos = (self.program_pos + 1) % self.program.len();
        self.history.push_front(line);
        self.history.pop_back();
    }

    fn advance_stack(&mut self) {
        if self.rng_below(4) != 0 {
            return;
        }
        match self.rng_below(3) {
            0 => self.stack = self.stack.saturating_sub(1),
            1 if usize::from(self.stack) < STACK_CELLS => self.stack += 1,
            _ => {}
        }
    }

    fn advance_registers(&mut self) {
        // Register A is deterministic: the low bits of the tick counter.
        let value = self.tick % (1u64 << REGISTER_BITS);
        for (bit, cell) in self.registers[REGISTER_A].iter_mut().enumerate() {
            *cell = (value >> bit) & 1 == 1;
        }

        // Half the remaining registers hold still each tick; the rest
        // scramble bitwise.
        for register in 1..REGISTER_COUNT {
            if self.rng_bool() {
                continue;
            }
            for bit in 0..REGISTER_BITS {
                if self.rng_bool() {
                    self.registers[register][bit] = !self.registers[register][bit];
                }
            }
        }
    }

    fn clock(&self) -> Clock {
        match self.clock_source {
            ClockSource::Ticks => Clock::Ticks(self.tick),
            ClockSource::WallClock => {
                let secs = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs();
                Clock::Pair {
                    hours: ((secs / 3600) % 24) as u8,
                    minutes: ((secs / 60) % 60) as u8,
                }
            }
        }
    }
}

impl Backend for DemoBackend {
    fn sample(&mut self) -> Result<Snapshot, BackendError> {
        self.tick += 1;
        self.advance_history();
        self.advance_stack();
        self.advance_registers();

        Ok(Snapshot {
            clock: self.clock(),
            registers: self.registers,
            stack: self.stack,
            history: self.history.iter().map(|line| line.to_string()).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge;

    /// Fails every other tick.
    struct FlakyBackend {
        inner: DemoBackend,
        calls: u64,
    }

    impl Backend for FlakyBackend {
        fn sample(&mut self) -> Result<Snapshot, BackendError> {
            self.calls += 1;
            if self.calls % 2 == 0 {
                Err(BackendError("connection refused".to_string()))
            } else {
                self.inner.sample()
            }
        }
    }

    #[test]
    fn demo_backend_is_deterministic_for_a_seed() {
        let mut a = DemoBackend::new(42);
        let mut b = DemoBackend::new(42);
        for _ in 0..50 {
            assert_eq!(a.sample().unwrap(), b.sample().unwrap());
        }
    }

    #[test]
    fn demo_register_a_tracks_the_tick_counter() {
        let mut backend = DemoBackend::new(7);
        let mut snapshot = Snapshot::default();
        for _ in 0..65 {
            snapshot = backend.sample().unwrap();
        }

        assert_eq!(snapshot.clock, Clock::Ticks(65));
        // 65 mod 64 = 1: only bit 0 lit.
        assert_eq!(
            snapshot.registers[REGISTER_A],
            [true, false, false, false, false, false]
        );
    }

    #[test]
    fn demo_snapshot_respects_the_panel_dimensions() {
        let mut backend = DemoBackend::new(1);
        for _ in 0..200 {
            let snapshot = backend.sample().unwrap();
            assert!(usize::from(snapshot.stack) <= STACK_CELLS);
            assert_eq!(snapshot.registers.len(), REGISTER_COUNT);
            assert_eq!(snapshot.history.len(), HISTORY_SLOTS);
            assert!(!snapshot.history[0].is_empty());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_one_snapshot_per_interval() {
        let (tx, mut rx) = bridge::channel();
        let (producer, handle) = Producer::new(DemoBackend::new(3), tx, DEFAULT_INTERVAL);
        let task = tokio::spawn(producer.run());

        time::sleep(Duration::from_millis(350)).await;
        assert_eq!(handle.ticks(), 3);
        assert_eq!(rx.latest().unwrap().clock, Clock::Ticks(3));

        handle.stop();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn backend_failure_skips_the_tick_but_keeps_the_loop_alive() {
        let backend = FlakyBackend {
            inner: DemoBackend::new(9),
            calls: 0,
        };
        let (tx, mut rx) = bridge::channel();
        let (producer, handle) = Producer::new(backend, tx, DEFAULT_INTERVAL);
        let task = tokio::spawn(producer.run());

        time::sleep(Duration::from_millis(450)).await;
        assert_eq!(handle.ticks(), 2);
        assert_eq!(handle.skipped(), 2);
        assert!(rx.latest().is_some());

        handle.stop();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_observed_at_the_next_iteration() {
        let (tx, _rx) = bridge::channel();
        let (producer, handle) = Producer::new(DemoBackend::new(5), tx, DEFAULT_INTERVAL);
        let task = tokio::spawn(producer.run());

        time::sleep(Duration::from_millis(150)).await;
        handle.stop();
        task.await.unwrap();

        let ticks = handle.ticks();
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(handle.ticks(), ticks);
        assert!(handle.is_stopped());
    }

    #[tokio::test(start_paused = true)]
    async fn interval_retune_takes_effect_next_iteration() {
        let (tx, _rx) = bridge::channel();
        let (producer, handle) = Producer::new(DemoBackend::new(5), tx, DEFAULT_INTERVAL);
        let task = tokio::spawn(producer.run());

        time::sleep(Duration::from_millis(350)).await;
        assert_eq!(handle.ticks(), 3);

        handle.set_interval(Duration::from_millis(1000));
        assert_eq!(handle.interval(), Duration::from_millis(1000));

        // One lagging 100 ms wait may still complete, then the new cadence
        // holds: at most one more tick in the next 900 ms.
        time::sleep(Duration::from_millis(900)).await;
        assert!(handle.ticks() <= 5);

        time::sleep(Duration::from_millis(2100)).await;
        assert!(handle.ticks() >= 5);

        handle.stop();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn producer_ends_when_the_consumer_is_gone() {
        let (tx, rx) = bridge::channel();
        let (producer, _handle) = Producer::new(DemoBackend::new(2), tx, DEFAULT_INTERVAL);
        drop(rx);
        // First send fails because no receiver is attached; run() returns.
        producer.run().await;
    }
}
