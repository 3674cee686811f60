use std::collections::VecDeque;

use chain::NetworkParams;
use containers::{compact_to_u256, hash_meets_target, BlockHeader, Bytes32, CompactError};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("bad compact target: {0}")]
    BadTarget(#[from] CompactError),
    #[error("target {bits:#010x} is easier than the network limit")]
    TargetAboveLimit { bits: u32 },
    #[error("hash does not meet target {bits:#010x}")]
    InsufficientWork { bits: u32 },
    #[error("time {time} is not after median time past {median}")]
    TimeTooOld { time: u32, median: u32 },
    #[error("time {time} is beyond the allowed limit {limit}")]
    TimeTooNew { time: u32, limit: u32 },
}

/// Sliding window over the most recent ancestor timestamps.
#[derive(Debug, Clone)]
pub struct MedianTimeWindow {
    span: usize,
    times: VecDeque<u32>,
}

impl MedianTimeWindow {
    pub fn new(span: usize) -> Self {
        Self {
            span,
            times: VecDeque::with_capacity(span),
        }
    }

    /// Window seeded with ancestor times ordered oldest first.
    pub fn from_times(span: usize, times: impl IntoIterator<Item = u32>) -> Self {
        let mut window = Self::new(span);
        for time in times {
            window.push(time);
        }
        window
    }

    pub fn push(&mut self, time: u32) {
        if self.span == 0 {
            return;
        }
        if self.times.len() == self.span {
            self.times.pop_front();
        }
        self.times.push_back(time);
    }

    /// Median of the window, or `None` when no ancestors are known.
    pub fn median(&self) -> Option<u32> {
        if self.times.is_empty() {
            return None;
        }
        let mut sorted: Vec<u32> = self.times.iter().copied().collect();
        sorted.sort_unstable();
        Some(sorted[sorted.len() / 2])
    }
}

/// Proof-of-work and timestamp sanity for a header about to extend the chain.
///
/// `window` holds the timestamps of the candidate's ancestors; `now` is the
/// local clock in unix seconds. Difficulty retargeting is not re-derived.
pub fn check_header(
    header: &BlockHeader,
    hash: &Bytes32,
    window: &MedianTimeWindow,
    params: &NetworkParams,
    now: u32,
) -> Result<(), HeaderError> {
    let target = compact_to_u256(header.bits)?;
    if target.is_zero() || target > params.pow_limit() {
        return Err(HeaderError::TargetAboveLimit { bits: header.bits });
    }
    if !hash_meets_target(hash, &target) {
        return Err(HeaderError::InsufficientWork { bits: header.bits });
    }

    if let Some(median) = window.median() {
        if header.time <= median {
            return Err(HeaderError::TimeTooOld {
                time: header.time,
                median,
            });
        }
    }

    let limit = now.saturating_add(params.max_future_block_time);
    if header.time > limit {
        return Err(HeaderError::TimeTooNew {
            time: header.time,
            limit,
        });
    }

    Ok(())
}
