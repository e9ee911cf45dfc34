use std::path::PathBuf;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum Error {
    #[display("i/o error: {_0}")]
    Io(std::io::Error),
    #[display("invalid configuration: {reason}")]
    Config { reason: String },
    #[display("failed to parse config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[display("missing checkpoint {}", path.display())]
    MissingCheckpoint { path: PathBuf },
    #[display("corrupted checkpoint {}: {reason}", path.display())]
    CorruptCheckpoint { path: PathBuf, reason: String },
    #[display("missing sample file {}", path.display())]
    MissingSamples { path: PathBuf },
    #[display("corrupted sample file {}: {reason}", path.display())]
    CorruptSamples { path: PathBuf, reason: String },
    #[display("inference returned {got:?}, expected {expected:?}")]
    InferenceShape {
        expected: (usize, usize),
        got: (usize, usize),
    },
    #[display("worker slot {slot_id} submitted twice without collecting")]
    SlotBusy { slot_id: usize },
    #[display("worker slot {slot_id} collected without a pending submission")]
    SlotIdle { slot_id: usize },
    #[display("ready queue named worker slot {slot_id}, which does not exist")]
    UnknownSlot { slot_id: usize },
    #[display("worker slot {slot_id} was aborted")]
    SlotAborted { slot_id: usize },
    #[display("ready queue closed while worker slot {slot_id} was submitting")]
    QueueClosed { slot_id: usize },
    #[display("self-play worker {worker_id} failed: {reason}")]
    Worker { worker_id: usize, reason: String },
    #[display("self-play worker {worker_id} panicked")]
    WorkerPanicked { worker_id: usize },
    #[display("sample pipeline thread panicked")]
    PipelinePanicked,
    #[display("arena match failed: {reason}")]
    Arena { reason: String },
    #[display("training failed: {reason}")]
    Training { reason: String },
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
