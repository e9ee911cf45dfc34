use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::net::IEstimator;
use crate::selfplay::slot::WorkerSlot;
use crate::util::format_duration;
use crate::util::metrics::RunningAverage;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Inference calls, one per served submission.
    pub calls: usize,
    pub calls_per_slot: Vec<usize>,
}

/// Single consumer of the ready queue, runs one inference per ready worker slot.
///
/// Each call evaluates one worker's full input buffer, requests of different workers are
/// never merged.
pub struct BatchDispatcher<'a> {
    slots: &'a [Arc<WorkerSlot>],
    ready_queue: &'a Receiver<usize>,
    completed: &'a AtomicUsize,
    poll_interval: Duration,
    progress: Option<Progress<'a>>,
}

impl<'a> BatchDispatcher<'a> {
    pub fn new(
        slots: &'a [Arc<WorkerSlot>],
        ready_queue: &'a Receiver<usize>,
        completed: &'a AtomicUsize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            slots,
            ready_queue,
            completed,
            poll_interval,
            progress: None,
        }
    }

    pub fn with_progress(mut self, games_played: &'a AtomicUsize, games_num: usize) -> Self {
        self.progress = Some(Progress::new(games_played, games_num));
        self
    }

    /// Serve submissions until every worker reported completion and the queue is empty.
    pub fn run(&mut self, net: &mut dyn IEstimator) -> Result<DispatchStats> {
        let dispatch_counter = metrics::counter!("selfplay.dispatches");
        let mut stats = DispatchStats {
            calls: 0,
            calls_per_slot: vec![0; self.slots.len()],
        };

        loop {
            match self.ready_queue.recv_timeout(self.poll_interval) {
                Ok(slot_id) => {
                    let slot = self
                        .slots
                        .get(slot_id)
                        .ok_or(Error::UnknownSlot { slot_id })?;
                    slot.serve(|input| net.infer(input))?;
                    stats.calls += 1;
                    stats.calls_per_slot[slot_id] += 1;
                    dispatch_counter.increment(1);
                }
                Err(RecvTimeoutError::Timeout) => {}
                /* every worker dropped its sender, nothing can arrive anymore */
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if let Some(progress) = &mut self.progress {
                progress.update();
            }

            if self.completed.load(Ordering::SeqCst) >= self.slots.len()
                && self.ready_queue.is_empty()
            {
                break;
            }
        }

        if let Some(progress) = &mut self.progress {
            progress.finish();
        }
        Ok(stats)
    }
}

const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Periodic "games done / elapsed / ETA" report of a self-play phase.
struct Progress<'a> {
    games_played: &'a AtomicUsize,
    games_num: usize,
    start: Instant,
    last_count: usize,
    last_time: Instant,
    last_log: Instant,
    sample_time: RunningAverage,
}

impl<'a> Progress<'a> {
    fn new(games_played: &'a AtomicUsize, games_num: usize) -> Self {
        let now = Instant::now();
        Self {
            games_played,
            games_num,
            start: now,
            last_count: 0,
            last_time: now,
            last_log: now,
            sample_time: RunningAverage::new(0.1, metrics::gauge!("selfplay.game_duration")),
        }
    }

    fn update(&mut self) {
        let count = self.games_played.load(Ordering::SeqCst);
        if count > self.last_count {
            let per_game = self.last_time.elapsed().as_secs_f64() / (count - self.last_count) as f64;
            self.sample_time
                .update(per_game, (count - self.last_count) as u64);
            self.last_count = count;
            self.last_time = Instant::now();
        }
        if self.last_log.elapsed() >= PROGRESS_LOG_INTERVAL {
            self.log(count);
            self.last_log = Instant::now();
        }
    }

    fn finish(&mut self) {
        let count = self.games_played.load(Ordering::SeqCst);
        self.log(count);
    }

    fn log(&self, count: usize) {
        let remaining = self.games_num.saturating_sub(count);
        let eta = Duration::from_secs_f64(self.sample_time.get().max(0.0) * remaining as f64);
        log::info!(
            "Generating samples ({}/{}) Sample Time: {:.3}s | Total: {} | ETA: {}",
            count,
            self.games_num,
            self.sample_time.get(),
            format_duration(self.start.elapsed()),
            format_duration(eta),
        );
    }
}
