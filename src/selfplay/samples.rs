use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use itertools::Itertools;
use ndarray::{Array1, Array2};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::net::TrainingSet;

/// One recorded game position.
#[derive(Clone, Debug, PartialEq)]
pub struct SampleRecord {
    pub observation: Vec<f32>,
    pub policy: Vec<f32>,
    pub value: f32,
}

/// The three aligned sample files of one iteration.
///
/// Each file is a sequence of batches: `rows: u32`, `cols: u32`, then `rows * cols`
/// little endian `f32`. The value file has a single column.
#[derive(Clone, Debug)]
pub struct SampleFiles {
    pub observations: PathBuf,
    pub policies: PathBuf,
    pub values: PathBuf,
}

impl SampleFiles {
    pub fn new(dir: &Path, iteration: usize) -> Self {
        let stem = format!("iteration-{iteration:04}");
        Self {
            observations: dir.join(format!("{stem}-data.bin")),
            policies: dir.join(format!("{stem}-policy.bin")),
            values: dir.join(format!("{stem}-value.bin")),
        }
    }

    pub fn paths(&self) -> [&Path; 3] {
        [&self.observations, &self.policies, &self.values]
    }

    pub fn exists(&self) -> bool {
        self.paths().iter().all(|path| path.is_file())
    }

    /// Delete the files, missing ones are ignored.
    pub fn remove(&self) -> Result<()> {
        for path in self.paths() {
            match fs::remove_file(path) {
                Err(err) if err.kind() != ErrorKind::NotFound => return Err(err.into()),
                _ => {}
            }
        }
        Ok(())
    }

    /// Read every persisted batch back as one training set.
    pub fn load(&self, observation_len: usize, action_size: usize) -> Result<TrainingSet> {
        let observations = read_matrix(&self.observations, observation_len)?;
        let policies = read_matrix(&self.policies, action_size)?;
        let values = read_matrix(&self.values, 1)?;
        if observations.nrows() != policies.nrows() || observations.nrows() != values.nrows() {
            return Err(Error::CorruptSamples {
                path: self.observations.clone(),
                reason: format!(
                    "misaligned files: {} observations, {} policies, {} values",
                    observations.nrows(),
                    policies.nrows(),
                    values.nrows()
                ),
            });
        }
        let values: Array1<f32> = values.column(0).to_owned();
        TrainingSet::new(observations, policies, values)
    }
}

fn read_matrix(path: &Path, cols: usize) -> Result<Array2<f32>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(Error::MissingSamples {
                path: path.to_path_buf(),
            })
        }
        Err(err) => return Err(err.into()),
    };
    let corrupt = |reason: String| Error::CorruptSamples {
        path: path.to_path_buf(),
        reason,
    };
    let read_u32 = |offset: usize| -> Option<u32> {
        let chunk = bytes.get(offset..offset + 4)?;
        Some(u32::from_le_bytes(chunk.try_into().ok()?))
    };

    let mut data = Vec::new();
    let mut rows_total = 0;
    let mut offset = 0;
    while offset < bytes.len() {
        let (Some(rows), Some(batch_cols)) = (read_u32(offset), read_u32(offset + 4)) else {
            return Err(corrupt(format!("truncated batch header at byte {offset}")));
        };
        let (rows, batch_cols) = (rows as usize, batch_cols as usize);
        if batch_cols != cols {
            return Err(corrupt(format!(
                "batch at byte {offset} has {batch_cols} columns, expected {cols}"
            )));
        }
        offset += 8;
        let len = rows * cols * 4;
        let Some(payload) = bytes.get(offset..offset + len) else {
            return Err(corrupt(format!("truncated batch payload at byte {offset}")));
        };
        data.extend(
            payload
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])),
        );
        rows_total += rows;
        offset += len;
    }
    Array2::from_shape_vec((rows_total, cols), data).map_err(|err| corrupt(err.to_string()))
}

/// Append-mode writer over the three sample files.
///
/// A batch lands in all three files or in none: when one append fails, the files already
/// extended are truncated back to their previous length.
pub struct SampleWriter {
    files: SampleFiles,
    observations: File,
    policies: File,
    values: File,
    observation_len: usize,
    action_size: usize,
}

impl SampleWriter {
    pub fn open(files: &SampleFiles, observation_len: usize, action_size: usize) -> Result<Self> {
        let open = |path: &Path| -> Result<File> {
            if let Some(dir) = path.parent() {
                if !dir.as_os_str().is_empty() && !dir.is_dir() {
                    fs::create_dir_all(dir)?;
                }
            }
            Ok(OpenOptions::new().create(true).append(true).open(path)?)
        };
        Ok(Self {
            observations: open(&files.observations)?,
            policies: open(&files.policies)?,
            values: open(&files.values)?,
            files: files.clone(),
            observation_len,
            action_size,
        })
    }

    /// Stack `records` into one batch per file, append and flush them.
    pub fn write_batch(&mut self, records: &[SampleRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(bad) = records.iter().find(|r| {
            r.observation.len() != self.observation_len || r.policy.len() != self.action_size
        }) {
            return Err(Error::CorruptSamples {
                path: self.files.observations.clone(),
                reason: format!(
                    "record of shape ({}, {}) does not fit ({}, {})",
                    bad.observation.len(),
                    bad.policy.len(),
                    self.observation_len,
                    self.action_size
                ),
            });
        }

        let rows = records.len();
        let batches = [
            encode_matrix(
                rows,
                self.observation_len,
                records.iter().flat_map(|r| r.observation.iter().copied()),
            ),
            encode_matrix(
                rows,
                self.action_size,
                records.iter().flat_map(|r| r.policy.iter().copied()),
            ),
            encode_matrix(rows, 1, records.iter().map(|r| r.value)),
        ];

        let mut files = [&mut self.observations, &mut self.policies, &mut self.values];
        let lens = files
            .iter()
            .map(|file| Ok(file.metadata()?.len()))
            .collect::<Result<Vec<_>>>()?;
        let appended = files
            .iter_mut()
            .zip(&batches)
            .try_for_each(|(file, bytes)| {
                file.write_all(bytes)?;
                file.flush()
            });
        if let Err(err) = appended {
            self.rollback(&lens);
            return Err(err.into());
        }
        Ok(())
    }

    /* drop a partially appended batch so the files stay aligned */
    fn rollback(&self, lens: &[u64]) {
        let files = [&self.observations, &self.policies, &self.values];
        for ((file, len), path) in files.into_iter().zip(lens).zip(self.files.paths()) {
            let res = file.metadata().and_then(|meta| {
                if meta.len() == *len {
                    Ok(())
                } else {
                    file.set_len(*len)
                }
            });
            if let Err(err) = res {
                log::error!("Failed to roll back {}: {}", path.display(), err);
            }
        }
    }
}

fn encode_matrix(rows: usize, cols: usize, data: impl Iterator<Item = f32>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(8 + rows * cols * 4);
    bytes.extend((rows as u32).to_le_bytes());
    bytes.extend((cols as u32).to_le_bytes());
    bytes.extend(data.flat_map(|x| x.to_le_bytes()));
    bytes
}

/// Background thread persisting the sample queue of one iteration.
///
/// Every `interval` the records currently queued are drained and appended as one batch. On
/// [`SamplePipeline::stop`] the queue is drained one last time and the number of records
/// written is returned. Records still queued when the process dies are lost, batches already
/// flushed stay readable.
pub struct SamplePipeline {
    stop: Sender<()>,
    handle: JoinHandle<Result<usize>>,
}

impl SamplePipeline {
    pub fn spawn(
        files: &SampleFiles,
        queue: Receiver<SampleRecord>,
        interval: Duration,
        observation_len: usize,
        action_size: usize,
    ) -> Result<Self> {
        /* open before spawning so that I/O errors surface to the caller */
        let writer = SampleWriter::open(files, observation_len, action_size)?;
        let (stop, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("sample-saver".to_string())
            .spawn(move || run_saver(writer, queue, stop_rx, interval))?;
        Ok(Self { stop, handle })
    }

    pub fn stop(self) -> Result<usize> {
        let _ = self.stop.send(());
        self.handle.join().map_err(|_| Error::PipelinePanicked)?
    }
}

fn run_saver(
    mut writer: SampleWriter,
    queue: Receiver<SampleRecord>,
    stop: Receiver<()>,
    interval: Duration,
) -> Result<usize> {
    let saved_counter = metrics::counter!("samples.saved");
    let mut total = 0;
    loop {
        let saved = drain_queue(&queue, &mut writer)?;
        saved_counter.increment(saved as u64);
        total += saved;
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            /* stop requested or the pipeline handle was dropped */
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    let saved = drain_queue(&queue, &mut writer)?;
    saved_counter.increment(saved as u64);
    total += saved;
    log::debug!("Sample saver done, {} records", total);
    Ok(total)
}

/// Append every record queued at call time, never blocking on producers.
pub fn drain_queue(queue: &Receiver<SampleRecord>, writer: &mut SampleWriter) -> Result<usize> {
    let queued = queue.len();
    if queued == 0 {
        return Ok(0);
    }
    let records = (0..queued).map_while(|_| queue.try_recv().ok()).collect_vec();
    writer.write_batch(&records)?;
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(idx: usize) -> SampleRecord {
        SampleRecord {
            observation: vec![idx as f32, 1.0],
            policy: vec![0.5, 0.5],
            value: 1.0,
        }
    }

    #[test]
    fn failed_append_keeps_the_files_aligned() {
        let dir = tempfile::tempdir().unwrap();
        let files = SampleFiles::new(dir.path(), 1);
        let mut writer = SampleWriter::open(&files, 2, 2).unwrap();
        writer.write_batch(&[record(0), record(1)]).unwrap();

        /* the value file can no longer be written, the other two still can */
        writer.values = File::open(&files.values).unwrap();
        let err = writer.write_batch(&[record(2)]).unwrap_err();
        assert!(matches!(err, Error::Io(_)));

        let data = files.load(2, 2).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data.observations.column(0).to_vec(), vec![0.0, 1.0]);
    }
}
