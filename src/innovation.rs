//! Run-scoped innovation tracking for NEAT.
//!
//! Every structural edge `(source_id, target_id)` created by any genome in a
//! run is registered here exactly once. Later requests for the same pair get
//! the same innovation id back, which is what lets independently mutated
//! genomes line up gene-by-gene for compatibility scoring and crossover.
//!
//! The ledger is the only state shared between genomes. It is handed around
//! as a [`SharedLedger`]; `Genome::connect` performs lookup, registration and
//! archiving under a single lock so concurrent mutation cannot mint two ids
//! for one pair.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::gene::{Gene, FIRST_HIDDEN_LAYER};

/// Shared-ownership handle to the ledger of one evolutionary run.
pub type SharedLedger = Arc<Mutex<InnovationLedger>>;

/// Starting value of the hidden-layer ceiling.
pub const DEFAULT_LAYER_CEILING: u32 = FIRST_HIDDEN_LAYER;

/// One registered structural edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InnovationRecord {
    pub source: u32,
    pub target: u32,
    pub innovation: u64,
}

/// Historical record of every structural edge created in a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "LedgerState", into = "LedgerState")]
pub struct InnovationLedger {
    next_innovation: u64,
    layer_ceiling: u32,
    history: Vec<InnovationRecord>,
    /// Snapshot of each gene as it was when its id was minted.
    archive: Vec<Gene>,
    index: HashMap<(u32, u32), u64>,
}

impl Default for InnovationLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl InnovationLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::with_layer_ceiling(DEFAULT_LAYER_CEILING)
    }

    /// Start with a deeper hidden-layer ceiling. Values below the first
    /// hidden layer are raised to it.
    #[must_use]
    pub fn with_layer_ceiling(layer_ceiling: u32) -> Self {
        Self {
            next_innovation: 0,
            layer_ceiling: layer_ceiling.max(FIRST_HIDDEN_LAYER),
            history: Vec::new(),
            archive: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// A fresh ledger behind a shared handle.
    #[must_use]
    pub fn shared() -> SharedLedger {
        Self::new().into_shared()
    }

    #[must_use]
    pub fn into_shared(self) -> SharedLedger {
        Arc::new(Mutex::new(self))
    }

    /// Innovation id previously recorded for the directed pair, if any.
    #[must_use]
    pub fn lookup(&self, source: u32, target: u32) -> Option<u64> {
        self.index.get(&(source, target)).copied()
    }

    /// Return the id for the directed pair, minting one if it is new.
    ///
    /// This is the only way new innovation ids are minted.
    pub fn register(&mut self, source: u32, target: u32) -> u64 {
        if let Some(innovation) = self.lookup(source, target) {
            return innovation;
        }

        let innovation = self.next_innovation;
        self.next_innovation += 1;
        self.history.push(InnovationRecord {
            source,
            target,
            innovation,
        });
        self.index.insert((source, target), innovation);
        tracing::debug!(source, target, innovation, "minted innovation");
        innovation
    }

    /// Whether a gene carrying `innovation` for the pair could live in this
    /// ledger: the pair is either registered under that id, or unregistered
    /// with the id still unclaimed.
    #[must_use]
    pub fn agrees_with(&self, source: u32, target: u32, innovation: u64) -> bool {
        match self.lookup(source, target) {
            Some(known) => known == innovation,
            None => !self.history.iter().any(|r| r.innovation == innovation),
        }
    }

    /// Record an id minted by another ledger for an unregistered pair.
    ///
    /// Later mints start above it. Callers check [`Self::agrees_with`] first.
    pub(crate) fn adopt(&mut self, gene: &Gene) {
        if self.lookup(gene.source, gene.target).is_some() {
            return;
        }
        self.history.push(InnovationRecord {
            source: gene.source,
            target: gene.target,
            innovation: gene.innovation,
        });
        self.index.insert((gene.source, gene.target), gene.innovation);
        self.next_innovation = self.next_innovation.max(gene.innovation + 1);
        self.archive.push(gene.clone());
        tracing::debug!(
            source = gene.source,
            target = gene.target,
            innovation = gene.innovation,
            "adopted innovation"
        );
    }

    /// Raise the highest layer hidden nodes may be assigned. Returns the new
    /// ceiling.
    pub fn grow_layer_ceiling(&mut self) -> u32 {
        self.layer_ceiling += 1;
        tracing::debug!(layer_ceiling = self.layer_ceiling, "grew layer ceiling");
        self.layer_ceiling
    }

    #[must_use]
    pub const fn layer_ceiling(&self) -> u32 {
        self.layer_ceiling
    }

    /// The id the next new structural edge will receive.
    #[must_use]
    pub const fn next_innovation(&self) -> u64 {
        self.next_innovation
    }

    /// Registered edges in the order they were first created.
    #[must_use]
    pub fn history(&self) -> &[InnovationRecord] {
        &self.history
    }

    /// The first gene created for each innovation, in minting order.
    #[must_use]
    pub fn archive(&self) -> &[Gene] {
        &self.archive
    }

    pub(crate) fn archive_gene(&mut self, gene: Gene) {
        self.archive.push(gene);
    }
}

/// Serialized form of the ledger; the lookup index is rebuilt on load.
#[derive(Serialize, Deserialize)]
struct LedgerState {
    next_innovation: u64,
    layer_ceiling: u32,
    history: Vec<InnovationRecord>,
    archive: Vec<Gene>,
}

impl From<LedgerState> for InnovationLedger {
    fn from(state: LedgerState) -> Self {
        let index = state
            .history
            .iter()
            .map(|r| ((r.source, r.target), r.innovation))
            .collect();
        // Never hand out an id that is already in the history.
        let next_innovation = state
            .history
            .iter()
            .map(|r| r.innovation + 1)
            .fold(state.next_innovation, u64::max);

        Self {
            next_innovation,
            layer_ceiling: state.layer_ceiling.max(FIRST_HIDDEN_LAYER),
            history: state.history,
            archive: state.archive,
            index,
        }
    }
}

impl From<InnovationLedger> for LedgerState {
    fn from(ledger: InnovationLedger) -> Self {
        Self {
            next_innovation: ledger.next_innovation,
            layer_ceiling: ledger.layer_ceiling,
            history: ledger.history,
            archive: ledger.archive,
        }
    }
}
