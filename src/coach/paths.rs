use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::coach::config::CoachConfig;
use crate::error::Result;
use crate::selfplay::samples::SampleFiles;

const CHECKPOINT_EXT: &str = "ckpt";

/// On-disk layout of one run: checkpoints, samples and the scalar log.
#[derive(Clone, Debug)]
pub struct RunPaths {
    pub checkpoints: PathBuf,
    pub samples: PathBuf,
    pub summary: PathBuf,
}

impl RunPaths {
    pub fn new(config: &CoachConfig) -> Self {
        Self {
            checkpoints: config.checkpoint.join(&config.run_name),
            samples: config.data.join(&config.run_name),
            summary: config.runs.join(&config.run_name),
        }
    }

    pub fn checkpoint(&self, iteration: usize) -> PathBuf {
        self.checkpoints
            .join(format!("iteration-{iteration:04}.{CHECKPOINT_EXT}"))
    }

    pub fn samples(&self, iteration: usize) -> SampleFiles {
        SampleFiles::new(&self.samples, iteration)
    }

    /// Number of checkpoints already written for this run.
    pub fn count_checkpoints(&self) -> Result<usize> {
        let entries = match fs::read_dir(&self.checkpoints) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };
        let mut count = 0;
        for entry in entries {
            let path = entry?.path();
            if is_checkpoint(&path) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Delete every checkpoint, sample file and scalar of the run.
    pub fn clear(&self) -> Result<()> {
        for dir in [&self.checkpoints, &self.samples, &self.summary] {
            match fs::remove_dir_all(dir) {
                Err(err) if err.kind() != ErrorKind::NotFound => return Err(err.into()),
                _ => {}
            }
        }
        Ok(())
    }

    pub fn remove_checkpoint(&self, iteration: usize) -> Result<()> {
        match fs::remove_file(self.checkpoint(iteration)) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}

fn is_checkpoint(path: &Path) -> bool {
    path.is_file()
        && path.extension().is_some_and(|ext| ext == CHECKPOINT_EXT)
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with("iteration-"))
}
