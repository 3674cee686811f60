//! Sync coordinator driving the header chain forward.
//!
//! The coordinator is the single writer of the chain index:
//! - Opening: roots the index at genesis or at the fast-sync anchor and
//!   applies the checkpoint
//! - Syncing: requests headers by locator and applies each batch atomically
//! - Recovery: drops misbehaving peer sessions without touching the index

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use chain::{ConfigError, NetworkParams, NodeConfig};
use chain_index::{
    check_header, ChainError, ChainIndex, CheckpointPolicy, FastSyncAnchor, MedianTimeWindow,
};
use containers::{BlockHeader, Checkpoint, HeaderEntry, Height};
use metrics::SharedMetrics;
use storage::KeyValueStore;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::{
    config::{MAX_HEADERS_PER_BATCH, TIP_EVENT_CAPACITY},
    query::ChainQuery,
    states::SyncState,
};
use crate::types::{ConnectionState, PeerEvent, PeerSession, TipEvent};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Chain(#[from] ChainError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid sync state transition from {from:?} to {to:?}")]
    InvalidState { from: SyncState, to: SyncState },
    #[error("peer session: {0:#}")]
    Peer(anyhow::Error),
}

impl SyncError {
    /// Errors that must stop the node: the index can no longer be trusted to
    /// reflect what was acknowledged.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Chain(err) if err.is_fatal())
    }
}

/// Result of validating one header batch against the index.
struct BatchCheck {
    entries: Vec<HeaderEntry>,
    skipped: usize,
    fault: Option<ChainError>,
}

/// Sync coordinator owning one chain index.
///
/// All mutating operations take `&mut self`, so batches, resets and
/// checkpoint changes are applied strictly one after another. Readers use
/// [`ChainQuery`] handles and never block on the coordinator.
pub struct SyncCoordinator<S, P> {
    config: NodeConfig,
    params: NetworkParams,
    index: Arc<ChainIndex<S>>,
    policy: CheckpointPolicy,
    state: SyncState,
    peer: Option<P>,
    events: Option<mpsc::UnboundedReceiver<PeerEvent>>,
    tip_events: broadcast::Sender<TipEvent>,
    metrics: Option<SharedMetrics>,
    /// Bumped whenever the tip moves backwards; answers to requests issued
    /// under an older epoch no longer fit the index.
    request_epoch: u64,
    /// Epochs of outstanding requests, oldest first.
    in_flight: VecDeque<u64>,
    headers_accepted: u64,
    peer_faults: u64,
}

impl<S: KeyValueStore, P: PeerSession> SyncCoordinator<S, P> {
    /// Load the persisted index from `store`. The coordinator starts
    /// `Closed`; nothing is written until [`open`](Self::open).
    pub fn new(config: NodeConfig, store: S) -> Result<Self, SyncError> {
        let params = config.network_params();
        let policy = CheckpointPolicy::new(params.last_checkpoint);
        let index = Arc::new(ChainIndex::open(store)?);
        let (tip_events, _) = broadcast::channel(TIP_EVENT_CAPACITY);

        Ok(Self {
            config,
            params,
            index,
            policy,
            state: SyncState::default(),
            peer: None,
            events: None,
            tip_events,
            metrics: None,
            request_epoch: 0,
            in_flight: VecDeque::new(),
            headers_accepted: 0,
            peer_faults: 0,
        })
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        metrics.set_sync_state(self.state.code());
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn checkpoint_policy(&self) -> &CheckpointPolicy {
        &self.policy
    }

    pub fn connection_state(&self) -> ConnectionState {
        if self.peer.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Read handle over the index, usable in any state.
    pub fn query(&self) -> ChainQuery<S> {
        ChainQuery::new(Arc::clone(&self.index), self.tip_events.clone())
    }

    /// `Closed -> Opening`: root an empty index, activate the checkpoint and
    /// prune history below it.
    ///
    /// Reopening after a close resumes from the persisted tip.
    pub async fn open(&mut self) -> Result<(), SyncError> {
        if self.state != SyncState::Closed {
            return Err(SyncError::InvalidState {
                from: self.state,
                to: SyncState::Opening,
            });
        }
        self.transition(SyncState::Opening)?;
        if let Err(err) = self.initialize() {
            self.state = SyncState::Closed;
            self.report_state();
            return Err(err);
        }
        Ok(())
    }

    fn initialize(&mut self) -> Result<(), SyncError> {
        if self.index.is_empty() {
            match self.config.fast_sync_anchor()? {
                Some((prev, tip)) => {
                    let anchor = FastSyncAnchor::new(prev, tip)?;
                    self.index.init_with_anchor(&anchor)?;
                }
                None => {
                    let genesis = self.params.genesis_entry().map_err(|err| {
                        ChainError::InvalidAnchor(format!("network genesis: {err}"))
                    })?;
                    self.index.init_genesis(genesis)?;
                }
            }
        } else if self.config.fast_sync {
            debug!("Index already populated, fast-sync anchor ignored");
        }

        self.apply_checkpoint()?;

        let tip = self.index.tip().ok_or(ChainError::NotInitialized)?;
        info!(
            network = %self.params.network,
            tip = tip.height.0,
            hash = %tip.hash,
            "Sync coordinator opened"
        );
        self.report_chain();
        Ok(())
    }

    /// `Opening -> Connecting`: attach a peer session and the queue it
    /// delivers events on.
    pub fn connect(
        &mut self,
        peer: P,
        events: mpsc::UnboundedReceiver<PeerEvent>,
    ) -> Result<(), SyncError> {
        if self.state != SyncState::Opening {
            return Err(SyncError::InvalidState {
                from: self.state,
                to: SyncState::Connecting,
            });
        }
        self.transition(SyncState::Connecting)?;
        self.peer = Some(peer);
        self.events = Some(events);
        if let Some(metrics) = &self.metrics {
            metrics.inc_peer_session("connected");
        }
        info!("Peer session attached");
        Ok(())
    }

    /// `Connecting -> Syncing`: issue the first locator request.
    ///
    /// A failing request drops the session and returns the coordinator to
    /// `Opening`.
    pub async fn start_sync(&mut self) -> Result<(), SyncError> {
        self.transition(SyncState::Syncing)?;
        if let Err(err) = self.request_from_tip().await {
            self.drop_session("request_failed").await;
            return Err(SyncError::Peer(err));
        }
        Ok(())
    }

    /// Detach the peer session and return to `Closed`. Safe in any state;
    /// the index stays durable and intact.
    pub async fn close(&mut self) -> Result<(), SyncError> {
        if self.state == SyncState::Closed {
            return Ok(());
        }
        if let Some(peer) = self.peer.take() {
            peer.disconnect().await;
        }
        self.events = None;
        self.in_flight.clear();
        self.transition(SyncState::Closed)?;
        info!(
            tip = ?self.index.tip().map(|tip| tip.height.0),
            "Sync coordinator closed"
        );
        Ok(())
    }

    /// Process events until the peer side closes its queue, the session is
    /// dropped, or a fatal error occurs.
    pub async fn run(&mut self) -> Result<(), SyncError> {
        loop {
            let event = match self.events.as_mut() {
                Some(events) => events.recv().await,
                None => return Ok(()),
            };
            match event {
                Some(event) => self.handle_event(event).await?,
                None => {
                    self.handle_event(PeerEvent::Disconnected).await?;
                    return Ok(());
                }
            }
        }
    }

    /// Process only the events already queued. Returns how many were handled.
    pub async fn drain(&mut self) -> Result<usize, SyncError> {
        let mut handled = 0;
        loop {
            let event = match self.events.as_mut().map(|events| events.try_recv()) {
                Some(Ok(event)) => event,
                _ => return Ok(handled),
            };
            self.handle_event(event).await?;
            handled += 1;
        }
    }

    pub async fn handle_event(&mut self, event: PeerEvent) -> Result<(), SyncError> {
        match event {
            PeerEvent::Headers(headers) => {
                if self.answers_superseded_request() {
                    debug!(count = headers.len(), "Dropping answer to a superseded request");
                    return Ok(());
                }
                match self.state {
                    SyncState::Syncing => self.process_batch(headers).await,
                    SyncState::Idle if headers.is_empty() => Ok(()),
                    SyncState::Idle => {
                        self.transition(SyncState::Syncing)?;
                        self.process_batch(headers).await
                    }
                    state => {
                        debug!(?state, count = headers.len(), "Ignoring headers outside of sync");
                        Ok(())
                    }
                }
            }
            PeerEvent::Announced(hash) => {
                if self.state != SyncState::Idle {
                    debug!(%hash, state = ?self.state, "Announcement ignored");
                    return Ok(());
                }
                if self.index.entry_by_hash(&hash)?.is_some() {
                    return Ok(());
                }
                debug!(%hash, "Peer announced new header");
                self.transition(SyncState::Syncing)?;
                if let Err(err) = self.request_from_tip().await {
                    warn!(error = %err, "Header request failed");
                    self.drop_session("request_failed").await;
                }
                Ok(())
            }
            PeerEvent::Disconnected => {
                if self.state.has_session() {
                    info!("Peer session disconnected");
                    self.drop_session("disconnected").await;
                }
                Ok(())
            }
        }
    }

    /// Validate and apply one batch, then ask for the next one.
    ///
    /// Peer-data faults are recovered here: the valid prefix is kept, the
    /// session is dropped and `Ok` is returned. Storage faults propagate.
    async fn process_batch(&mut self, headers: Vec<BlockHeader>) -> Result<(), SyncError> {
        if headers.is_empty() {
            let tip = self.index.tip().map(|tip| tip.height.0);
            info!(?tip, "Peer has no further headers");
            return self.transition(SyncState::Idle);
        }
        if headers.len() > MAX_HEADERS_PER_BATCH {
            warn!(count = headers.len(), "Oversized header batch");
            self.record_fault("oversized");
            self.drop_session("peer_fault").await;
            return Ok(());
        }

        let started = Instant::now();
        let count = headers.len();
        let check = self.check_batch(headers)?;

        let accepted = if check.entries.is_empty() {
            0
        } else {
            match self.index.extend(&check.entries) {
                Ok(accepted) => accepted,
                Err(err) if err.is_peer_fault() => {
                    self.peer_fault(err).await;
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.observe_batch_processing_time(started.elapsed().as_secs_f64());
        }
        if accepted > 0 {
            self.headers_accepted += accepted as u64;
            if let Some(metrics) = &self.metrics {
                metrics.inc_headers_accepted(accepted as u64);
            }
            if let Some(tip) = self.index.tip() {
                debug!(
                    count,
                    accepted,
                    skipped = check.skipped,
                    tip = tip.height.0,
                    "Applied header batch"
                );
                self.notify(TipEvent::Connected(tip));
            }
            self.report_chain();
        }

        if let Some(fault) = check.fault {
            self.peer_fault(fault).await;
            return Ok(());
        }

        if let Err(err) = self.request_from_tip().await {
            warn!(error = %err, "Header request failed");
            self.drop_session("request_failed").await;
        }
        Ok(())
    }

    /// Turn a batch into entries on top of the current tip, stopping at the
    /// first header that fails linkage, network rules or the checkpoint.
    fn check_batch(&self, headers: Vec<BlockHeader>) -> Result<BatchCheck, ChainError> {
        let mut parent = self.index.tip().ok_or(ChainError::NotInitialized)?;
        let span = self.params.median_time_span;
        let mut window =
            MedianTimeWindow::from_times(span, self.index.ancestor_times(&parent, span)?);
        let mut check = BatchCheck {
            entries: Vec::new(),
            skipped: 0,
            fault: None,
        };
        let now = unix_now();

        for header in headers {
            let hash = header.hash();

            // Overlap with what is already persisted after a locator request.
            if check.entries.is_empty() && self.index.entry_by_hash(&hash)?.is_some() {
                check.skipped += 1;
                continue;
            }

            if header.prev_hash != parent.hash {
                let fork_parent = if check.entries.is_empty() {
                    self.index.entry_by_hash(&header.prev_hash)?
                } else {
                    None
                };
                check.fault = Some(match fork_parent {
                    Some(fork_parent) => {
                        let height = fork_parent.height.next();
                        let existing = self
                            .index
                            .entry_by_height(height)?
                            .map(|entry| entry.hash)
                            .unwrap_or_default();
                        ChainError::Duplicate {
                            height,
                            existing,
                            incoming: hash,
                        }
                    }
                    None => ChainError::Linkage {
                        height: parent.height.next(),
                        hash,
                        tip: parent.hash,
                    },
                });
                break;
            }

            let height = parent.height.next();
            if let Err(reason) = check_header(&header, &hash, &window, &self.params, now) {
                check.fault = Some(ChainError::InvalidHeader {
                    height,
                    hash,
                    reason,
                });
                break;
            }

            let entry = match parent.child(header) {
                Ok(entry) => entry,
                Err(reason) => {
                    check.fault = Some(ChainError::InvalidHeader {
                        height,
                        hash,
                        reason: reason.into(),
                    });
                    break;
                }
            };
            if let Err(err) = self.policy.validate(&entry) {
                check.fault = Some(err);
                break;
            }

            window.push(entry.time());
            parent = entry.clone();
            check.entries.push(entry);
        }

        Ok(check)
    }

    /// Stage a checkpoint. It replaces the previous one at the next
    /// [`resync`](Self::resync) or reopen.
    pub fn set_checkpoint(&mut self, checkpoint: Checkpoint) {
        info!(
            height = checkpoint.height.0,
            hash = %checkpoint.hash,
            "Checkpoint staged"
        );
        self.policy.stage(checkpoint);
    }

    /// Activate the staged checkpoint, prune below it and, with a session
    /// attached, sync again from the tip.
    pub async fn resync(&mut self) -> Result<(), SyncError> {
        if self.state == SyncState::Closed {
            return Err(SyncError::InvalidState {
                from: self.state,
                to: SyncState::Syncing,
            });
        }
        self.apply_checkpoint()?;
        self.supersede_requests();
        self.restart_requests().await
    }

    /// Truncate the index so that `height` becomes the tip, then sync again
    /// from there if a session is attached.
    pub async fn reset(&mut self, height: Height) -> Result<HeaderEntry, SyncError> {
        let tip = self.index.reset(height)?;
        self.supersede_requests();
        self.notify(TipEvent::Reset(tip.clone()));
        self.report_chain();
        self.restart_requests().await?;
        Ok(tip)
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            state: self.state,
            tip_height: self.index.tip().map(|tip| tip.height),
            root_height: self.index.root().map(|root| root.height),
            headers_accepted: self.headers_accepted,
            peer_faults: self.peer_faults,
        }
    }

    /// Bring the index in line with the active checkpoint: a conflicting
    /// branch at the checkpoint height is truncated, history below it pruned.
    fn apply_checkpoint(&mut self) -> Result<(), SyncError> {
        let Some(checkpoint) = self.policy.activate().copied() else {
            return Ok(());
        };

        if let Some(entry) = self.index.entry_by_height(checkpoint.height)? {
            if entry.hash != checkpoint.hash {
                let root = self.index.root().ok_or(ChainError::NotInitialized)?;
                let keep = match checkpoint.height.prev() {
                    Some(keep) if keep >= root.height => keep,
                    _ => {
                        return Err(ChainError::CheckpointViolation {
                            height: checkpoint.height,
                            expected: checkpoint.hash,
                            got: entry.hash,
                        }
                        .into());
                    }
                };
                warn!(
                    height = checkpoint.height.0,
                    expected = %checkpoint.hash,
                    got = %entry.hash,
                    "Local chain conflicts with checkpoint, truncating"
                );
                let tip = self.index.reset(keep)?;
                self.supersede_requests();
                self.notify(TipEvent::Reset(tip));
            }
        }

        let removed = self.policy.apply_retention(self.index.as_ref())?;
        if removed > 0 {
            if let Some(root) = self.index.root() {
                self.notify(TipEvent::Pruned(root));
            }
        }
        self.report_chain();
        Ok(())
    }

    async fn restart_requests(&mut self) -> Result<(), SyncError> {
        match self.state {
            SyncState::Syncing => {}
            SyncState::Idle => self.transition(SyncState::Syncing)?,
            _ => return Ok(()),
        }
        if let Err(err) = self.request_from_tip().await {
            self.drop_session("request_failed").await;
            return Err(SyncError::Peer(err));
        }
        Ok(())
    }

    async fn request_from_tip(&mut self) -> anyhow::Result<()> {
        let locator = self.index.locator()?;
        let Some(peer) = self.peer.as_ref() else {
            anyhow::bail!("no peer session attached");
        };
        debug!(
            tip = %locator.first().copied().unwrap_or_default(),
            hashes = locator.len(),
            "Requesting headers"
        );
        peer.request_headers(locator).await?;
        self.in_flight.push_back(self.request_epoch);
        Ok(())
    }

    /// Requests still outstanding will be answered relative to a tip that is
    /// gone. Their answers are dropped without blaming the peer.
    fn supersede_requests(&mut self) {
        self.request_epoch += 1;
    }

    /// Match a headers event to the oldest outstanding request. Unsolicited
    /// batches count as current.
    fn answers_superseded_request(&mut self) -> bool {
        match self.in_flight.pop_front() {
            Some(epoch) => epoch != self.request_epoch,
            None => false,
        }
    }

    async fn peer_fault(&mut self, err: ChainError) {
        warn!(error = %err, kind = err.kind(), "Discarding peer data");
        self.record_fault(err.kind());
        self.drop_session("peer_fault").await;
    }

    fn record_fault(&mut self, reason: &str) {
        self.peer_faults += 1;
        if let Some(metrics) = &self.metrics {
            metrics.inc_headers_rejected(reason);
        }
    }

    /// Release the peer session and fall back to `Opening`.
    async fn drop_session(&mut self, reason: &str) {
        if let Some(peer) = self.peer.take() {
            peer.disconnect().await;
        }
        self.events = None;
        self.in_flight.clear();
        if let Some(metrics) = &self.metrics {
            metrics.inc_peer_session(reason);
        }
        if self.state.has_session() {
            self.state = SyncState::Opening;
            self.report_state();
        }
    }

    fn transition(&mut self, target: SyncState) -> Result<(), SyncError> {
        if self.state == target {
            return Ok(());
        }
        if !self.state.can_transition_to(target) {
            warn!(
                from = ?self.state,
                to = ?target,
                "Invalid state transition attempted"
            );
            return Err(SyncError::InvalidState {
                from: self.state,
                to: target,
            });
        }
        debug!(from = ?self.state, to = ?target, "Sync state transition");
        self.state = target;
        self.report_state();
        Ok(())
    }

    fn notify(&self, event: TipEvent) {
        // No subscribers is fine.
        let _ = self.tip_events.send(event);
    }

    fn report_state(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.set_sync_state(self.state.code());
        }
    }

    fn report_chain(&self) {
        let Some(metrics) = &self.metrics else {
            return;
        };
        if let Some(tip) = self.index.tip() {
            metrics.set_tip_height(tip.height.0);
        }
        if let Some(root) = self.index.root() {
            metrics.set_root_height(root.height.0);
        }
    }
}

fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u32::try_from(elapsed.as_secs()).unwrap_or(u32::MAX))
        .unwrap_or(0)
}

/// Statistics about the sync coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    pub state: SyncState,
    pub tip_height: Option<Height>,
    pub root_height: Option<Height>,
    pub headers_accepted: u64,
    pub peer_faults: u64,
}
