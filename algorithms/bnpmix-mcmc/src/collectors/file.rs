use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use bnpmix::error::{Error, Result};
use bnpmix::state::ChainState;
use bnpmix::traits::Collector;

/// On-disk chain collector.
///
/// Snapshots are written as length-prefixed frames: a little-endian
/// `u64` byte count followed by the JSON-encoded state. The file handle
/// opens in `start` and is released in `finish` (or on drop); each
/// append is flushed so the chain on disk always covers every emitted
/// snapshot.
#[derive(Debug)]
pub struct FileCollector {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    reader: Option<BufReader<File>>,
}

impl FileCollector {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        FileCollector {
            path: path.as_ref().to_path_buf(),
            writer: None,
            reader: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Collector for FileCollector {
    fn start(&mut self) -> Result<()> {
        self.reader = None;
        self.writer = Some(BufWriter::new(File::create(&self.path)?));
        Ok(())
    }

    fn append(&mut self, state: &ChainState) -> Result<()> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| Error::InvalidParameter("collector was not started".to_string()))?;
        let bytes =
            serde_json::to_vec(state).map_err(|e| Error::Serialization(e.to_string()))?;
        writer.write_all(&(bytes.len() as u64).to_le_bytes())?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        self.reader = None;
        Ok(())
    }

    fn begin_reading(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        self.reader = Some(BufReader::new(File::open(&self.path)?));
        Ok(())
    }

    fn next_state(&mut self) -> Result<Option<ChainState>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| Error::InvalidParameter("collector is not in reading mode".to_string()))?;
        let mut len_bytes = [0u8; 8];
        match reader.read_exact(&mut len_bytes) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let len = u64::from_le_bytes(len_bytes) as usize;
        let mut frame = vec![0u8; len];
        reader.read_exact(&mut frame)?;
        serde_json::from_slice(&frame)
            .map(Some)
            .map_err(|e| Error::Serialization(e.to_string()))
    }
}

impl Drop for FileCollector {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bnpmix::state::{ClusterParams, ClusterState, MixingState};

    fn dummy_state(iteration: usize) -> ChainState {
        ChainState {
            iteration,
            cluster_states: vec![ClusterState {
                cardinality: 2,
                params: ClusterParams::UniLs {
                    mean: iteration as f64,
                    var: 1.0,
                },
            }],
            allocations: vec![0, 0],
            mixing_state: MixingState::Dirichlet { total_mass: 1.0 },
        }
    }

    fn temp_chain_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("bnpmix-{}-{}.chain", tag, std::process::id()))
    }

    #[test]
    fn framed_roundtrip_preserves_every_record() {
        let path = temp_chain_path("roundtrip");
        let mut coll = FileCollector::new(&path);
        coll.start().unwrap();
        let states: Vec<_> = (0..4).map(dummy_state).collect();
        for state in &states {
            coll.append(state).unwrap();
        }
        coll.finish().unwrap();

        coll.begin_reading().unwrap();
        let mut replayed = Vec::new();
        while let Some(state) = coll.next_state().unwrap() {
            replayed.push(state);
        }
        assert_eq!(replayed, states);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn append_before_start_is_rejected() {
        let mut coll = FileCollector::new(temp_chain_path("unstarted"));
        assert!(coll.append(&dummy_state(0)).is_err());
    }
}
