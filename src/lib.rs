//! # Strata NEAT
//!
//! Layered NeuroEvolution of Augmenting Topologies (NEAT) genomes with a
//! run-wide innovation ledger.
//!
//! ## Features
//!
//! - **Shared Innovation Ledger**: every structural edge `(source, target)` is
//!   registered once per run, so identical mutations in different genomes get
//!   the same innovation id
//! - **Layered Topology**: nodes carry a layer (inputs 0, outputs 1, hidden
//!   2 and up) and edges always run from a lower to a higher layer, which
//!   keeps every network feed-forward without cycle checks
//! - **Arena-Graph Model**: nodes and genes live in `SlotMap` arenas; genes
//!   refer to nodes by id and are re-resolved by `reconnect`
//! - **Compatibility Distance**: excess, disjoint and weight terms for
//!   speciation by an external population manager
//!
//! ## Quick Start
//!
//! ```rust
//! use rand::SeedableRng;
//! use rand_chacha::ChaCha8Rng;
//! use strata_neat::{Genome, InnovationLedger};
//!
//! let ledger = InnovationLedger::shared();
//! let mut rng = ChaCha8Rng::seed_from_u64(42);
//!
//! let mut genome = Genome::new(&ledger, 2, 1);
//! genome.mutate(&mut rng).unwrap();
//!
//! let outputs = genome.evaluate(&[0.5, -0.5]).unwrap();
//! assert_eq!(outputs.len(), 1);
//!
//! let sibling = genome.clone();
//! assert_eq!(genome.compatibility(&sibling), 0.0);
//! ```
//!
//! ## Architecture
//!
//! ### Layer Ordering
//!
//! The output layer is numbered 1 but sorts after every hidden layer.
//! [`Genome::connect`] swaps its endpoints so the lower-ranked node is always
//! the source, and refuses two nodes on the same layer. Node insertion picks
//! a layer strictly between the split gene's endpoints, so evaluation can
//! simply walk hidden layers in ascending order and finish with the outputs.
//!
//! ### Concurrency
//!
//! The ledger is the only state shared between genomes. It lives behind a
//! [`SharedLedger`] (`Arc<Mutex<_>>`) and `connect` performs lookup,
//! registration and archiving under one lock, so genomes may be mutated from
//! several threads without minting duplicate ids.

pub mod activation;
pub mod error;
pub mod evaluator;
pub mod gene;
pub mod genome;
pub mod innovation;
pub mod layout;

// Re-exports for convenience
pub use activation::sigmoid;
pub use error::{NeatError, NeatResult};
pub use gene::{
    layer_rank, Gene, GeneKey, Node, NodeKey, NodeType, FIRST_HIDDEN_LAYER, INPUT_LAYER,
    OUTPUT_LAYER,
};
pub use genome::{Genome, GenomeSnapshot, NeatConfig};
pub use innovation::{InnovationLedger, InnovationRecord, SharedLedger, DEFAULT_LAYER_CEILING};
pub use layout::NodePosition;
