use crossbeam_channel::Sender;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut2};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use crate::error::{Error, Result};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum SlotState {
    /* The simulator owns the buffers, nothing is queued */
    Idle,
    /* The input was submitted and the slot id is on the ready queue */
    Pending,
    /* The dispatcher wrote the outputs, waiting for the simulator to collect them */
    Ready,
    /* The phase failed, every further access errors */
    Aborted,
}

struct SlotInner {
    state: SlotState,
    input: Array2<f32>,
    policy: Array2<f32>,
    value: Array1<f32>,
}

/// Handshake buffers shared by one simulator and the dispatcher.
///
/// The input buffer holds `capacity` observations, the outputs the matching policy rows and
/// values. Buffers are allocated once per self-play phase and never resized.
pub struct WorkerSlot {
    id: usize,
    inner: Mutex<SlotInner>,
    ready: Condvar,
}

impl WorkerSlot {
    pub fn new(id: usize, capacity: usize, observation_len: usize, action_size: usize) -> Self {
        Self {
            id,
            inner: Mutex::new(SlotInner {
                state: SlotState::Idle,
                input: Array2::zeros((capacity, observation_len)),
                policy: Array2::zeros((capacity, action_size)),
                value: Array1::zeros(capacity),
            }),
            ready: Condvar::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner> {
        /* a panicking simulator must not wedge the dispatcher */
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[cfg(test)]
    fn state(&self) -> SlotState {
        self.lock().state
    }

    /// Run inference on the pending input and hand the outputs back to the simulator.
    ///
    /// Called by the dispatcher once per slot id popped from the ready queue.
    pub fn serve<F>(&self, infer: F) -> Result<()>
    where
        F: FnOnce(ArrayView2<f32>) -> Result<(Array2<f32>, Array1<f32>)>,
    {
        let mut inner = self.lock();
        match inner.state {
            SlotState::Pending => {}
            SlotState::Aborted => return Err(Error::SlotAborted { slot_id: self.id }),
            SlotState::Idle | SlotState::Ready => {
                return Err(Error::SlotIdle { slot_id: self.id })
            }
        }

        let (policy, value) = infer(inner.input.view())?;
        if policy.dim() != inner.policy.dim() {
            return Err(Error::InferenceShape {
                expected: inner.policy.dim(),
                got: policy.dim(),
            });
        }
        if value.len() != inner.value.len() {
            return Err(Error::InferenceShape {
                expected: (inner.value.len(), 1),
                got: (value.len(), 1),
            });
        }
        inner.policy.assign(&policy);
        inner.value.assign(&value);
        inner.state = SlotState::Ready;
        drop(inner);
        self.ready.notify_all();
        Ok(())
    }

    /// Wake up the simulator with an error, used when the phase fails.
    pub fn abort(&self) {
        self.lock().state = SlotState::Aborted;
        self.ready.notify_all();
    }
}

/// Simulator side of a worker slot: fills the input, queues itself and waits for results.
pub struct SlotClient {
    slot: Arc<WorkerSlot>,
    ready_queue: Sender<usize>,
    submissions: usize,
}

impl SlotClient {
    pub fn new(slot: Arc<WorkerSlot>, ready_queue: Sender<usize>) -> Self {
        Self {
            slot,
            ready_queue,
            submissions: 0,
        }
    }

    pub fn slot_id(&self) -> usize {
        self.slot.id
    }

    pub fn capacity(&self) -> usize {
        self.slot.lock().input.nrows()
    }

    /// Number of buffers submitted through this client.
    pub fn submissions(&self) -> usize {
        self.submissions
    }

    /// Write a full batch of observations and push the slot id onto the ready queue.
    ///
    /// `fill` receives the whole `[capacity, observation_len]` input buffer.
    pub fn submit<F>(&mut self, fill: F) -> Result<()>
    where
        F: FnOnce(ArrayViewMut2<f32>),
    {
        {
            let mut inner = self.slot.lock();
            match inner.state {
                SlotState::Idle => {}
                /* previous submission still in flight or not collected */
                SlotState::Pending | SlotState::Ready => {
                    return Err(Error::SlotBusy { slot_id: self.slot.id })
                }
                SlotState::Aborted => return Err(Error::SlotAborted { slot_id: self.slot.id }),
            }
            fill(inner.input.view_mut());
            inner.state = SlotState::Pending;
        }
        self.ready_queue
            .send(self.slot.id)
            .map_err(|_| Error::QueueClosed { slot_id: self.slot.id })?;
        self.submissions += 1;
        Ok(())
    }

    /// Block until the dispatcher has served the pending submission, then read the outputs.
    pub fn collect<R, F>(&mut self, read: F) -> Result<R>
    where
        F: FnOnce(ArrayView2<f32>, ArrayView1<f32>) -> R,
    {
        let mut inner = self.slot.lock();
        if inner.state == SlotState::Idle {
            return Err(Error::SlotIdle { slot_id: self.slot.id });
        }
        while inner.state == SlotState::Pending {
            inner = self
                .slot
                .ready
                .wait(inner)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        if inner.state == SlotState::Aborted {
            return Err(Error::SlotAborted { slot_id: self.slot.id });
        }
        let res = read(inner.policy.view(), inner.value.view());
        inner.state = SlotState::Idle;
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::thread;

    #[test]
    fn submit_serve_collect() {
        let slot = Arc::new(WorkerSlot::new(3, 2, 4, 5));
        let (tx, rx) = unbounded();
        let mut client = SlotClient::new(slot.clone(), tx);
        assert_eq!(client.capacity(), 2);

        client.submit(|mut input| input.fill(1.0)).unwrap();
        assert_eq!(rx.try_recv().unwrap(), 3);
        assert_eq!(slot.state(), SlotState::Pending);

        slot.serve(|input| {
            assert_eq!(input.dim(), (2, 4));
            Ok((Array2::from_elem((2, 5), 0.2), input.sum_axis(ndarray::Axis(1))))
        })
        .unwrap();

        let values = client.collect(|policy, value| {
            assert_eq!(policy.dim(), (2, 5));
            value.to_vec()
        });
        assert_eq!(values.unwrap(), vec![4.0, 4.0]);
        assert_eq!(slot.state(), SlotState::Idle);
        assert_eq!(client.submissions(), 1);
    }

    #[test]
    fn protocol_violations() {
        let slot = Arc::new(WorkerSlot::new(0, 1, 1, 1));
        let (tx, _rx) = unbounded();
        let mut client = SlotClient::new(slot.clone(), tx);

        assert!(matches!(
            client.collect(|_, _| ()),
            Err(Error::SlotIdle { slot_id: 0 })
        ));
        assert!(matches!(
            slot.serve(|_| unreachable!()),
            Err(Error::SlotIdle { slot_id: 0 })
        ));

        client.submit(|_| {}).unwrap();
        assert!(matches!(
            client.submit(|_| {}),
            Err(Error::SlotBusy { slot_id: 0 })
        ));

        let err = slot
            .serve(|_| Ok((Array2::zeros((1, 2)), Array1::zeros(1))))
            .unwrap_err();
        assert!(matches!(err, Error::InferenceShape { .. }));
    }

    #[test]
    fn abort_wakes_waiting_simulator() {
        let slot = Arc::new(WorkerSlot::new(1, 1, 1, 1));
        let (tx, rx) = unbounded();
        let mut client = SlotClient::new(slot.clone(), tx);

        let waiter = thread::spawn(move || {
            client.submit(|_| {}).unwrap();
            client.collect(|_, _| ())
        });
        assert_eq!(rx.recv().unwrap(), 1);
        slot.abort();
        assert!(matches!(
            waiter.join().unwrap(),
            Err(Error::SlotAborted { slot_id: 1 })
        ));
    }

    #[test]
    fn closed_queue_is_reported() {
        let slot = Arc::new(WorkerSlot::new(2, 1, 1, 1));
        let (tx, rx) = unbounded();
        drop(rx);
        let mut client = SlotClient::new(slot, tx);
        assert!(matches!(
            client.submit(|_| {}),
            Err(Error::QueueClosed { slot_id: 2 })
        ));
    }
}
