//! Consensus-quorum node selection.
//!
//! The manager owns the run's node clients and is used from a single task;
//! it performs no locking of its own.

use crate::error::{ChainError, ChainResult};
use crate::node::NodeClient;
use fca_core::{ChainEpoch, GenesisTipset, TipsetKey};
use std::collections::HashSet;
use std::sync::Arc;

pub struct ConsensusManager {
    nodes: Vec<Arc<dyn NodeClient>>,
}

impl ConsensusManager {
    pub fn new(nodes: Vec<Arc<dyn NodeClient>>) -> Self {
        Self { nodes }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether every node that answered reports the same genesis tipset.
    /// Zero successful answers count as disagreement.
    pub async fn check_genesis(&self) -> bool {
        let mut keys: HashSet<TipsetKey> = HashSet::new();
        let mut answered = 0usize;

        for node in &self.nodes {
            match node.genesis().await {
                Ok(genesis) => {
                    answered += 1;
                    keys.insert(genesis.key);
                }
                Err(err) => {
                    tracing::error!(error = %err, "error checking genesis");
                }
            }
        }

        answered > 0 && keys.len() == 1
    }

    /// The first successful genesis answer; fails only when every node errors.
    pub async fn genesis(&self) -> ChainResult<GenesisTipset> {
        for node in &self.nodes {
            match node.genesis().await {
                Ok(genesis) => return Ok(genesis),
                Err(err) => {
                    tracing::error!(error = %err, "error getting genesis");
                }
            }
        }

        Err(ChainError::NoGenesis)
    }

    /// Plurality vote over the nodes' tipset keys at `height`. Ties resolve
    /// to the first-seen key so repeated runs pick deterministically.
    pub async fn tipset_at_height(&self, height: ChainEpoch) -> ChainResult<TipsetKey> {
        let mut tally: Vec<(TipsetKey, usize)> = Vec::new();

        for node in &self.nodes {
            match node.tipset_at_height(height).await {
                Ok(tipset) => {
                    match tally.iter_mut().find(|(key, _)| *key == tipset.key) {
                        Some((_, votes)) => *votes += 1,
                        None => tally.push((tipset.key, 1)),
                    }
                }
                Err(err) => {
                    tracing::error!(height, error = %err, "error checking tipset");
                }
            }
        }

        // Strictly-greater comparison keeps the first-seen key on ties.
        let mut pick: Option<(TipsetKey, usize)> = None;
        for (key, votes) in tally {
            if pick.as_ref().is_none_or(|(_, best)| votes > *best) {
                pick = Some((key, votes));
            }
        }

        pick.map(|(key, _)| key)
            .ok_or(ChainError::NoTipsetConsensus(height))
    }

    /// Rotate the node list left by `iteration mod n` so downstream selection
    /// prefers a different node per snapshot.
    pub fn shift_start_node(&mut self, iteration: usize) {
        if self.nodes.is_empty() {
            return;
        }
        let shift = iteration % self.nodes.len();
        self.nodes.rotate_left(shift);
    }

    /// The first node, in the current order, whose identity is not in
    /// `filter` and which serves the tipset `key`.
    pub async fn node_with_tipset(
        &self,
        key: &TipsetKey,
        filter: &[String],
    ) -> ChainResult<(Arc<dyn NodeClient>, String)> {
        let filter: HashSet<&str> = filter.iter().map(String::as_str).collect();

        for node in &self.nodes {
            let peer_id = match node.identity().await {
                Ok(peer_id) => peer_id,
                Err(err) => {
                    tracing::error!(error = %err, "error getting node identity");
                    continue;
                }
            };

            if filter.contains(peer_id.as_str()) {
                continue;
            }

            if let Err(err) = node.tipset_by_key(key).await {
                tracing::error!(peer_id = %peer_id, error = %err, "node does not serve tipset");
                continue;
            }

            return Ok((Arc::clone(node), peer_id));
        }

        Err(ChainError::NoEligibleNode)
    }
}
