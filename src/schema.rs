use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BenchError;
use crate::runner::CorpusRun;
use crate::Engine;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMeta {
    pub schema_version: u32,
    pub bench_version: String,
    pub profile: String,
    pub seed: u64,
    pub timestamp_utc: String,
    pub git_sha: Option<String>,
    pub accelerator: String,
    pub timer: String,
    pub engines: Vec<Engine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusReport {
    pub name: String,
    #[serde(flatten)]
    pub run: CorpusRun,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchReport {
    pub run: RunMeta,
    pub corpora: Vec<CorpusReport>,
}

impl BenchReport {
    pub fn fault_count(&self) -> usize {
        self.corpora.iter().map(|c| c.run.faults.len()).sum()
    }

    pub fn to_json(&self) -> Result<String, BenchError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> Result<(), BenchError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
