use crossbeam_channel::{unbounded, Receiver, Sender};
use itertools::Itertools;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::game::common::GamesResults;
use crate::net::IEstimator;
use crate::selfplay::dispatcher::{BatchDispatcher, DispatchStats};
use crate::selfplay::samples::SampleRecord;
use crate::selfplay::simulator::{PhaseContext, Simulator};
use crate::selfplay::slot::{SlotClient, WorkerSlot};
use crate::util::Builder;

#[derive(Clone, Debug)]
pub struct PhaseConfig {
    pub workers: usize,
    /// Games per slot submission.
    pub capacity: usize,
    pub observation_len: usize,
    pub action_size: usize,
    /// Games of the whole phase, split across the workers.
    pub games_num: usize,
    pub warmup: bool,
    pub expert_value_weight: f32,
    pub poll_interval: Duration,
}

#[derive(Clone, Debug, Default)]
pub struct PhaseReport {
    pub results: GamesResults,
    pub dispatch: DispatchStats,
}

/// Bumps the completed-workers counter when the worker thread ends, errors and panics included.
struct CompletionGuard(Arc<AtomicUsize>);

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// One self-play phase: a worker thread per slot, all sharing the caller's estimator.
///
/// Counters and slots live only as long as the phase.
pub struct SelfPlayPhase {
    slots: Vec<Arc<WorkerSlot>>,
    handles: Vec<JoinHandle<Result<()>>>,
    ready_queue: Receiver<usize>,
    completed: Arc<AtomicUsize>,
    games_played: Arc<AtomicUsize>,
    results: Arc<Mutex<GamesResults>>,
    games_num: usize,
    poll_interval: Duration,
}

impl SelfPlayPhase {
    pub fn spawn(
        config: &PhaseConfig,
        simulators: &dyn Builder<Box<dyn Simulator>>,
        samples: &Sender<SampleRecord>,
    ) -> Result<Self> {
        if config.workers == 0 || config.capacity == 0 {
            return Err(Error::Config {
                reason: "self-play needs at least one worker and a non empty batch".to_string(),
            });
        }
        let (ready_tx, ready_rx) = unbounded();
        let completed = Arc::new(AtomicUsize::new(0));
        let games_played = Arc::new(AtomicUsize::new(0));
        let results = Arc::new(Mutex::new(GamesResults::default()));
        let slots = (0..config.workers)
            .map(|id| {
                Arc::new(WorkerSlot::new(
                    id,
                    config.capacity,
                    config.observation_len,
                    config.action_size,
                ))
            })
            .collect_vec();

        let job_builder = |worker_id: usize| {
            let games_num = config.games_num * (worker_id + 1) / config.workers
                - config.games_num * worker_id / config.workers;
            let ctx = PhaseContext {
                worker_id,
                games_num,
                warmup: config.warmup,
                expert_value_weight: config.expert_value_weight,
                samples: samples.clone(),
                games_played: Arc::clone(&games_played),
                results: Arc::clone(&results),
            };
            let mut client = SlotClient::new(Arc::clone(&slots[worker_id]), ready_tx.clone());
            let mut simulator = simulators.build();
            let guard = CompletionGuard(Arc::clone(&completed));

            move || {
                let _guard = guard;
                simulator.run(&mut client, &ctx)
            }
        };

        let mut handles = Vec::with_capacity(config.workers);
        for worker_id in 0..config.workers {
            let spawned = thread::Builder::new()
                .name(format!("self-play-{worker_id}"))
                .spawn(job_builder(worker_id));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    slots.iter().for_each(|slot| slot.abort());
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(err.into());
                }
            }
        }
        /* only the workers may keep the queue open */
        drop(ready_tx);

        Ok(Self {
            slots,
            handles,
            ready_queue: ready_rx,
            completed,
            games_played,
            results,
            games_num: config.games_num,
            poll_interval: config.poll_interval,
        })
    }

    /// Serve the workers' inference requests until all of them are done.
    ///
    /// On failure every slot is aborted so no simulator stays blocked.
    pub fn dispatch(&self, net: &mut dyn IEstimator) -> Result<DispatchStats> {
        let res = BatchDispatcher::new(
            &self.slots,
            &self.ready_queue,
            &self.completed,
            self.poll_interval,
        )
        .with_progress(&self.games_played, self.games_num)
        .run(net);
        if res.is_err() {
            self.abort();
        }
        res
    }

    pub fn abort(&self) {
        self.slots.iter().for_each(|slot| slot.abort());
    }

    /// Wait for every worker, report the first failure.
    pub fn join(self) -> Result<GamesResults> {
        let mut first_err = None;
        for (worker_id, handle) in self.handles.into_iter().enumerate() {
            let err = match handle.join() {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => match err {
                    Error::Worker { .. } => err,
                    err => Error::Worker {
                        worker_id,
                        reason: err.to_string(),
                    },
                },
                Err(_) => Error::WorkerPanicked { worker_id },
            };
            log::error!("{}", err);
            first_err.get_or_insert(err);
        }
        if let Some(err) = first_err {
            return Err(err);
        }
        let results = *self
            .results
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(results)
    }

    /// Dispatch, then join. A dispatch failure wins over the worker errors it causes.
    pub fn run(self, net: &mut dyn IEstimator) -> Result<PhaseReport> {
        let dispatch = self.dispatch(net);
        let joined = self.join();
        let dispatch = dispatch?;
        Ok(PhaseReport {
            results: joined?,
            dispatch,
        })
    }
}
