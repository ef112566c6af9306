//! Append-only JSON-lines log
//!
//! Backs the queue journal and every file-backed store. Each entry is one
//! line, synced to disk before `append` returns. `open` replays the file and
//! `rewrite` compacts it atomically (temp file, sync, rename).

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

pub struct AppendLog<E> {
    path: PathBuf,
    file: File,
    _entry: PhantomData<fn(E)>,
}

impl<E> AppendLog<E>
where
    E: Serialize + DeserializeOwned,
{
    /// Open (creating if needed) and replay every entry in the log.
    ///
    /// Unparseable lines, typically a torn write from a crash, are skipped and
    /// the file is rewritten without them.
    pub fn open(path: impl AsRef<Path>) -> io::Result<(Self, Vec<E>)> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let mut entries = Vec::new();
        let mut skipped = 0usize;
        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for (lineno, line) in reader.lines().enumerate() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<E>(&line) {
                    Ok(entry) => entries.push(entry),
                    Err(e) => {
                        skipped += 1;
                        warn!(
                            "Skipping unreadable entry at {}:{}: {}",
                            path.display(),
                            lineno + 1,
                            e
                        );
                    }
                }
            }
        }

        let file = Self::open_append(&path)?;
        let mut log = Self {
            path,
            file,
            _entry: PhantomData,
        };
        if skipped > 0 {
            log.rewrite(&entries)?;
        }
        debug!("Replayed {} entries from {}", entries.len(), log.path.display());
        Ok((log, entries))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry and sync it to disk
    pub fn append(&mut self, entry: &E) -> io::Result<()> {
        let mut line = serde_json::to_vec(entry).map_err(io::Error::other)?;
        line.push(b'\n');
        self.file.write_all(&line)?;
        self.file.sync_data()
    }

    /// Append, reopening the file and trying once more if the first write fails
    pub fn append_or_reopen(&mut self, entry: &E) -> io::Result<()> {
        match self.append(entry) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Write to {} failed ({}), reopening", self.path.display(), e);
                self.reopen()?;
                self.append(entry)
            }
        }
    }

    /// Drop the current handle and open the file again
    pub fn reopen(&mut self) -> io::Result<()> {
        self.file = Self::open_append(&self.path)?;
        Ok(())
    }

    /// Atomically replace the log contents with `entries`
    pub fn rewrite(&mut self, entries: &[E]) -> io::Result<()> {
        let temp_path = self.path.with_extension("jsonl.tmp");
        {
            let mut temp = File::create(&temp_path)?;
            for entry in entries {
                let mut line = serde_json::to_vec(entry).map_err(io::Error::other)?;
                line.push(b'\n');
                temp.write_all(&line)?;
            }
            temp.sync_all()?;
        }
        fs::rename(&temp_path, &self.path)?;
        self.reopen()
    }

    fn open_append(path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }
}
