use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Append-only scalar log, one JSON object per line: `{"tag": .., "value": .., "step": ..}`.
pub struct SummaryWriter {
    path: PathBuf,
    file: BufWriter<File>,
}

impl SummaryWriter {
    pub fn new(log_dir: &Path) -> std::io::Result<Self> {
        if !log_dir.is_dir() {
            fs::create_dir_all(log_dir)?;
        }
        let path = log_dir.join("scalars.jsonl");
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> std::io::Result<()> {
        let line = json::object! {
            tag: tag,
            value: value,
            step: step,
        }
        .dump();
        writeln!(self.file, "{line}")?;
        self.file.flush()
    }
}

/// Read back every `(tag, value, step)` triple of a scalar log.
pub fn read_scalars(path: &Path) -> std::io::Result<Vec<(String, f64, usize)>> {
    let content = fs::read_to_string(path)?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let obj = json::parse(line)
                .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
            let tag = obj["tag"].as_str().unwrap_or_default().to_string();
            let value = obj["value"].as_f64().unwrap_or(f64::NAN);
            let step = obj["step"].as_usize().unwrap_or_default();
            Ok((tag, value, step))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut writer = SummaryWriter::new(dir.path()).unwrap();
            writer.add_scalar("loss/policy", 1.5, 1).unwrap();
            writer.add_scalar("loss/value", 0.25, 1).unwrap();
        }
        {
            let mut writer = SummaryWriter::new(dir.path()).unwrap();
            writer.add_scalar("loss/policy", 1.0, 2).unwrap();
        }

        let scalars = read_scalars(&dir.path().join("scalars.jsonl")).unwrap();
        assert_eq!(
            scalars,
            vec![
                ("loss/policy".to_string(), 1.5, 1),
                ("loss/value".to_string(), 0.25, 1),
                ("loss/policy".to_string(), 1.0, 2),
            ]
        );
    }
}
