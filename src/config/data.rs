//! Data directory configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the queue journal and the stores live
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Data directory for persistence
    pub data_dir: PathBuf,
}

impl DataConfig {
    pub fn queue_journal(&self) -> PathBuf {
        self.data_dir.join("queue.jsonl")
    }

    pub fn jobs_log(&self) -> PathBuf {
        self.data_dir.join("jobs.jsonl")
    }

    pub fn companies_log(&self) -> PathBuf {
        self.data_dir.join("companies.jsonl")
    }

    pub fn pending_batches_log(&self) -> PathBuf {
        self.data_dir.join("pending_batches.jsonl")
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_dir: directories::ProjectDirs::from("", "", "jobsift")
                .map(|d| d.data_dir().to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".jobsift")),
        }
    }
}
