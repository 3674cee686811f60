use containers::{
    compact_to_u256, BlockHeader, Bytes32, Checkpoint, CompactError, HeaderEntry, Height, U256,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Headers more than this many seconds ahead of the local clock are rejected.
pub const MAX_FUTURE_BLOCK_TIME: u32 = 2 * 60 * 60;
/// Number of ancestors whose median timestamp a new header must exceed.
pub const MEDIAN_TIME_SPAN: usize = 11;

const GENESIS_MERKLE_ROOT: [u8; 32] = [
    0x3b, 0xa3, 0xed, 0xfd, 0x7a, 0x7b, 0x12, 0xb2, 0x7a, 0xc7, 0x2c, 0x3e, 0x67, 0x76, 0x8f,
    0x61, 0x7f, 0xc8, 0x1b, 0xc3, 0x88, 0x8a, 0x51, 0x32, 0x3a, 0x9f, 0xb8, 0xaa, 0x4b, 0x1e,
    0x5e, 0x4a,
];

const MAIN_CHECKPOINT: (u64, &str) = (
    295_000,
    "00000000000000004d9b4ef50f0f9d686fd69db2e03af35a100370c64632a983",
);
const TESTNET_CHECKPOINT: (u64, &str) = (
    546,
    "000000002a936ca763904c3c35fce2f3556c559c0214345d31b1bcebf76acb70",
);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Main,
    Testnet,
    Regtest,
}

impl Network {
    pub fn params(self) -> NetworkParams {
        match self {
            Network::Main => NetworkParams {
                network: self,
                genesis: genesis_header(1231006505, 0x1d00ffff, 2083236893),
                pow_limit_bits: 0x1d00ffff,
                last_checkpoint: Some(checkpoint(MAIN_CHECKPOINT)),
                max_future_block_time: MAX_FUTURE_BLOCK_TIME,
                median_time_span: MEDIAN_TIME_SPAN,
                default_port: 8333,
            },
            Network::Testnet => NetworkParams {
                network: self,
                genesis: genesis_header(1296688602, 0x1d00ffff, 414098458),
                pow_limit_bits: 0x1d00ffff,
                last_checkpoint: Some(checkpoint(TESTNET_CHECKPOINT)),
                max_future_block_time: MAX_FUTURE_BLOCK_TIME,
                median_time_span: MEDIAN_TIME_SPAN,
                default_port: 18333,
            },
            Network::Regtest => NetworkParams {
                network: self,
                genesis: genesis_header(1296688602, 0x207fffff, 2),
                pow_limit_bits: 0x207fffff,
                last_checkpoint: None,
                max_future_block_time: MAX_FUTURE_BLOCK_TIME,
                median_time_span: MEDIAN_TIME_SPAN,
                default_port: 18444,
            },
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Main => "main",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
        };
        f.write_str(name)
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" | "mainnet" => Ok(Network::Main),
            "testnet" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            other => Err(format!("unknown network {other}")),
        }
    }
}

/// Consensus constants for one network.
///
/// A value of this type is owned by each node; nothing here is process-wide,
/// so two nodes in one process can run with different checkpoints.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkParams {
    pub network: Network,
    pub genesis: BlockHeader,
    pub pow_limit_bits: u32,
    pub last_checkpoint: Option<Checkpoint>,
    pub max_future_block_time: u32,
    pub median_time_span: usize,
    pub default_port: u16,
}

impl NetworkParams {
    pub fn pow_limit(&self) -> U256 {
        // Network constants are valid compact values.
        compact_to_u256(self.pow_limit_bits).unwrap_or_else(|_| U256::zero())
    }

    pub fn genesis_entry(&self) -> Result<HeaderEntry, CompactError> {
        HeaderEntry::genesis(self.genesis.clone())
    }

    pub fn with_checkpoint(mut self, checkpoint: Option<Checkpoint>) -> Self {
        self.last_checkpoint = checkpoint;
        self
    }
}

fn genesis_header(time: u32, bits: u32, nonce: u32) -> BlockHeader {
    BlockHeader {
        version: 1,
        prev_hash: Bytes32::zero(),
        merkle_root: Bytes32(GENESIS_MERKLE_ROOT),
        time,
        bits,
        nonce,
    }
}

/// Built-in checkpoint from a reversed-hex constant. A malformed constant
/// parses to the zero hash.
fn checkpoint((height, hash): (u64, &str)) -> Checkpoint {
    Checkpoint {
        height: Height(height),
        hash: hash.parse().unwrap_or_default(),
    }
}
