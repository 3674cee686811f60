use crate::{Network, NetworkParams};
use containers::{Checkpoint, DecodeError, HeaderEntry};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("fastSync is enabled but no startTip was given")]
    MissingStartTip,
    #[error("startTip must hold exactly two entries, got {0}")]
    StartTipLength(usize),
    #[error("startTip entry {index}: {source}")]
    StartTip {
        index: usize,
        #[source]
        source: DecodeError,
    },
}

/// Startup configuration of a header node, consumed when the node opens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    pub network: Network,
    #[serde(default)]
    pub peers: Vec<String>,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub fast_sync: bool,
    /// Hex-encoded `[prev, tip]` header entries used as the fast-sync anchor.
    #[serde(default)]
    pub start_tip: Option<Vec<String>>,
    /// Replaces the network's default last checkpoint for this node only.
    #[serde(default)]
    pub checkpoint: Option<Checkpoint>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

impl NodeConfig {
    pub fn new(network: Network) -> Self {
        Self {
            network,
            peers: Vec::new(),
            data_dir: default_data_dir(),
            fast_sync: false,
            start_tip: None,
            checkpoint: None,
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_yaml::from_reader(reader)?;
        Ok(config)
    }

    /// Network parameters with this node's checkpoint override applied.
    pub fn network_params(&self) -> NetworkParams {
        let params = self.network.params();
        match self.checkpoint {
            Some(checkpoint) => params.with_checkpoint(Some(checkpoint)),
            None => params,
        }
    }

    /// Decoded `(prev, tip)` anchor pair, when fast sync is enabled.
    ///
    /// Only decoding happens here; linkage of the pair is checked when the
    /// chain index is initialized with it.
    pub fn fast_sync_anchor(&self) -> Result<Option<(HeaderEntry, HeaderEntry)>, ConfigError> {
        if !self.fast_sync {
            return Ok(None);
        }
        let raw = self.start_tip.as_ref().ok_or(ConfigError::MissingStartTip)?;
        if raw.len() != 2 {
            return Err(ConfigError::StartTipLength(raw.len()));
        }
        let decode = |index: usize| {
            HeaderEntry::from_hex(&raw[index])
                .map_err(|source| ConfigError::StartTip { index, source })
        };
        Ok(Some((decode(0)?, decode(1)?)))
    }
}
