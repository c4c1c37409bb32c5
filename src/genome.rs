//! Layered NEAT genome with arena-allocated nodes and genes.
//!
//! A [`Genome`] owns its nodes and genes in `SlotMap` arenas. Genes name
//! their endpoints by node id; [`Genome::reconnect`] resolves those ids to
//! arena keys and rebuilds each node's incoming set, so clones and restored
//! snapshots never carry stale references.
//!
//! Every structural change goes through [`Genome::connect`], which consults
//! the run's [`SharedLedger`] so that the same edge gets the same innovation
//! id in every genome.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::error::{NeatError, NeatResult};
use crate::gene::{
    random_weight, Gene, GeneKey, Node, NodeKey, FIRST_HIDDEN_LAYER, INPUT_LAYER, OUTPUT_LAYER,
};
use crate::innovation::SharedLedger;

/// Configuration for genome mutation and compatibility scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NeatConfig {
    /// Number of input nodes.
    pub num_inputs: usize,
    /// Number of output nodes.
    pub num_outputs: usize,
    /// Probability of mutating every gene's weight during `mutate`.
    pub weight_mutation_prob: f32,
    /// Probability of an edge-addition mutation during `mutate`.
    pub add_edge_prob: f32,
    /// Probability of a node-insertion mutation during `mutate`.
    pub add_node_prob: f32,
    /// Probability that a node insertion raises the ledger's layer ceiling.
    pub layer_growth_prob: f32,
    /// Probability a weight mutation perturbs rather than replaces.
    pub weight_perturb_prob: f32,
    /// Half-width of the uniform weight perturbation.
    pub weight_perturb_power: f32,
    /// Range for initial and replaced weights: [-weight_range, weight_range].
    pub weight_range: f32,
    /// Coefficient for excess genes in compatibility distance.
    pub compatibility_excess_coeff: f32,
    /// Coefficient for disjoint genes in compatibility distance.
    pub compatibility_disjoint_coeff: f32,
    /// Coefficient for weight differences in compatibility distance.
    pub compatibility_weight_coeff: f32,
    /// Innovation spans below this are not normalized.
    pub compatibility_normalize_threshold: u64,
    /// Cap on resampling node pairs in the edge-addition mutation.
    pub max_resample_attempts: usize,
}

impl Default for NeatConfig {
    fn default() -> Self {
        Self {
            num_inputs: 2,
            num_outputs: 1,
            weight_mutation_prob: 0.8,
            add_edge_prob: 0.08,
            add_node_prob: 0.02,
            layer_growth_prob: 0.2,
            weight_perturb_prob: 0.9,
            weight_perturb_power: 0.5,
            weight_range: 1.0,
            compatibility_excess_coeff: 1.0,
            compatibility_disjoint_coeff: 1.0,
            compatibility_weight_coeff: 0.4,
            compatibility_normalize_threshold: 20,
            max_resample_attempts: 64,
        }
    }
}

impl NeatConfig {
    /// Default settings for a genome of the given shape.
    #[must_use]
    pub fn new(num_inputs: usize, num_outputs: usize) -> Self {
        Self {
            num_inputs,
            num_outputs,
            ..Default::default()
        }
    }

    /// Check that probabilities, ranges and caps are usable.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::InvalidConfig`] naming the first bad field.
    pub fn validate(&self) -> NeatResult<()> {
        let probabilities = [
            ("weight_mutation_prob", self.weight_mutation_prob),
            ("add_edge_prob", self.add_edge_prob),
            ("add_node_prob", self.add_node_prob),
            ("layer_growth_prob", self.layer_growth_prob),
            ("weight_perturb_prob", self.weight_perturb_prob),
        ];
        for (name, p) in probabilities {
            if !(0.0..=1.0).contains(&p) {
                return Err(NeatError::InvalidConfig(format!(
                    "{name} must be within [0, 1], got {p}"
                )));
            }
        }

        if !(self.weight_range.is_finite() && self.weight_range > 0.0) {
            return Err(NeatError::InvalidConfig(format!(
                "weight_range must be positive and finite, got {}",
                self.weight_range
            )));
        }
        if !(self.weight_perturb_power.is_finite() && self.weight_perturb_power >= 0.0) {
            return Err(NeatError::InvalidConfig(format!(
                "weight_perturb_power must be non-negative and finite, got {}",
                self.weight_perturb_power
            )));
        }

        let coefficients = [
            ("compatibility_excess_coeff", self.compatibility_excess_coeff),
            ("compatibility_disjoint_coeff", self.compatibility_disjoint_coeff),
            ("compatibility_weight_coeff", self.compatibility_weight_coeff),
        ];
        for (name, c) in coefficients {
            if !(c.is_finite() && c >= 0.0) {
                return Err(NeatError::InvalidConfig(format!(
                    "{name} must be non-negative and finite, got {c}"
                )));
            }
        }

        if self.max_resample_attempts == 0 {
            return Err(NeatError::InvalidConfig(
                "max_resample_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A candidate network: layered nodes, weighted genes, and a handle to the
/// run's innovation ledger.
///
/// Nodes are kept in creation order: inputs, then outputs, then hidden nodes.
#[derive(Debug, Clone)]
pub struct Genome {
    nodes: SlotMap<NodeKey, Node>,
    genes: SlotMap<GeneKey, Gene>,
    input_keys: Vec<NodeKey>,
    output_keys: Vec<NodeKey>,
    /// Next node id to assign.
    node_counter: u32,
    /// Largest innovation id among this genome's genes.
    highest_innovation: Option<u64>,
    /// `None` until the fitness harness scores the genome.
    fitness: Option<f32>,
    adjusted_fitness: f32,
    config: NeatConfig,
    ledger: SharedLedger,
}

impl Genome {
    /// Create a genome with `num_inputs` input and `num_outputs` output nodes
    /// and no genes, using default mutation settings.
    #[must_use]
    pub fn new(ledger: &SharedLedger, num_inputs: usize, num_outputs: usize) -> Self {
        Self::build(ledger, NeatConfig::new(num_inputs, num_outputs))
    }

    /// Create an unconnected genome shaped and tuned by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::InvalidConfig`] if the config fails validation.
    pub fn with_config(ledger: &SharedLedger, config: NeatConfig) -> NeatResult<Self> {
        config.validate()?;
        Ok(Self::build(ledger, config))
    }

    fn build(ledger: &SharedLedger, config: NeatConfig) -> Self {
        let mut nodes: SlotMap<NodeKey, Node> = SlotMap::with_key();
        let mut next_id = 0u32;
        let mut push = |layer: u32| {
            let key = nodes.insert(Node::new(next_id, layer));
            next_id += 1;
            key
        };

        let input_keys: Vec<NodeKey> = (0..config.num_inputs).map(|_| push(INPUT_LAYER)).collect();
        let output_keys: Vec<NodeKey> =
            (0..config.num_outputs).map(|_| push(OUTPUT_LAYER)).collect();

        Self {
            nodes,
            genes: SlotMap::with_key(),
            input_keys,
            output_keys,
            node_counter: next_id,
            highest_innovation: None,
            fitness: None,
            adjusted_fitness: 0.0,
            config,
            ledger: Arc::clone(ledger),
        }
    }

    /// Resolve every gene's endpoint ids to arena keys and rebuild each
    /// node's incoming set, ordered by innovation id.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::UnknownNode`] if a gene names a node this genome
    /// does not have.
    pub fn reconnect(&mut self) -> NeatResult<()> {
        let keys: HashMap<u32, NodeKey> = self.nodes.iter().map(|(k, n)| (n.id, k)).collect();

        for node in self.nodes.values_mut() {
            node.incoming.clear();
        }

        let mut feeds: Vec<(u64, GeneKey, NodeKey)> = Vec::with_capacity(self.genes.len());
        for (gene_key, gene) in &mut self.genes {
            let source = *keys
                .get(&gene.source)
                .ok_or(NeatError::UnknownNode(gene.source))?;
            let target = *keys
                .get(&gene.target)
                .ok_or(NeatError::UnknownNode(gene.target))?;
            gene.link = Some((source, target));
            feeds.push((gene.innovation, gene_key, target));
        }

        feeds.sort_unstable_by_key(|&(innovation, _, _)| innovation);
        for (_, gene_key, target) in feeds {
            self.nodes[target].incoming.push(gene_key);
        }
        Ok(())
    }

    /// Create (or reuse) the structural edge between two nodes.
    ///
    /// The endpoints are ordered so the lower-ranked layer is the source.
    /// The innovation id comes from the ledger; if this genome already holds
    /// a gene with that id nothing is added. Returns the innovation id.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::UnknownNode`] for an id not in this genome and
    /// [`NeatError::InvalidConnection`] if both nodes share a layer.
    pub fn connect<R: Rng>(&mut self, a: u32, b: u32, rng: &mut R) -> NeatResult<u64> {
        let a_key = self.node_key(a).ok_or(NeatError::UnknownNode(a))?;
        let b_key = self.node_key(b).ok_or(NeatError::UnknownNode(b))?;
        let a_rank = self.nodes[a_key].rank();
        let b_rank = self.nodes[b_key].rank();

        if a_rank == b_rank {
            return Err(NeatError::InvalidConnection { from: a, to: b });
        }
        let (source, source_key, target, target_key) = if a_rank < b_rank {
            (a, a_key, b, b_key)
        } else {
            (b, b_key, a, a_key)
        };

        let ledger = Arc::clone(&self.ledger);
        let mut ledger = ledger.lock();
        let fresh = ledger.lookup(source, target).is_none();
        let innovation = ledger.register(source, target);

        if !fresh && self.contains_innovation(innovation) {
            tracing::trace!(source, target, innovation, "dropped duplicate edge");
            return Ok(innovation);
        }

        let weight = random_weight(rng, self.config.weight_range);
        let mut gene = Gene::new(innovation, source, target, weight);
        gene.link = Some((source_key, target_key));
        if fresh {
            ledger.archive_gene(gene.clone());
        } else {
            tracing::trace!(source, target, innovation, "reused innovation");
        }
        drop(ledger);

        self.genes.insert(gene);
        self.highest_innovation = Some(
            self.highest_innovation
                .map_or(innovation, |highest| highest.max(innovation)),
        );
        Ok(innovation)
    }

    /// Connect two randomly chosen nodes on different layers.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::UnsatisfiableMutation`] if every node shares one
    /// layer or no cross-layer pair turns up within the resample cap.
    pub fn add_edge_mutation<R: Rng>(&mut self, rng: &mut R) -> NeatResult<u64> {
        let keys: Vec<NodeKey> = self.nodes.keys().collect();
        let mut ranks = keys.iter().map(|&k| self.nodes[k].rank());
        let crosses_layers = match ranks.next() {
            Some(first) => ranks.any(|rank| rank != first),
            None => false,
        };
        if !crosses_layers {
            tracing::warn!("edge mutation skipped: every node shares one layer");
            return Err(NeatError::UnsatisfiableMutation(
                "every node shares one layer",
            ));
        }

        for _ in 0..self.config.max_resample_attempts {
            let a = &self.nodes[keys[rng.random_range(0..keys.len())]];
            let b = &self.nodes[keys[rng.random_range(0..keys.len())]];
            if a.rank() != b.rank() {
                let (a, b) = (a.id, b.id);
                return self.connect(a, b, rng);
            }
        }

        tracing::warn!(
            attempts = self.config.max_resample_attempts,
            "edge mutation gave up resampling"
        );
        Err(NeatError::UnsatisfiableMutation(
            "no cross-layer node pair sampled",
        ))
    }

    /// Split an enabled gene by inserting a new hidden node.
    ///
    /// The new node's layer is drawn from `[2, layer_ceiling]` and the split
    /// gene is chosen among the *enabled* genes whose endpoints strictly
    /// bracket it. Disabled genes are never split again. The
    /// split gene is disabled; `source -> new` gets weight 1.0 and
    /// `new -> target` inherits the old weight. Returns the new node's id.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::UnsatisfiableMutation`] if no enabled gene can
    /// bracket the sampled layer.
    pub fn add_node_mutation<R: Rng>(&mut self, rng: &mut R) -> NeatResult<u32> {
        if self.genes.is_empty() {
            self.add_edge_mutation(rng)?;
        }

        let layer = {
            let mut ledger = self.ledger.lock();
            if rng.random::<f32>() < self.config.layer_growth_prob {
                ledger.grow_layer_ceiling();
            }
            rng.random_range(FIRST_HIDDEN_LAYER..=ledger.layer_ceiling())
        };

        let ranks: HashMap<u32, u32> = self.nodes.values().map(|n| (n.id, n.rank())).collect();
        let brackets = |gene: &Gene| match (ranks.get(&gene.source), ranks.get(&gene.target)) {
            (Some(&low), Some(&high)) => low < layer && layer < high,
            _ => false,
        };
        let candidates: Vec<GeneKey> = self
            .genes
            .iter()
            .filter(|(_, g)| g.enabled && brackets(*g))
            .map(|(k, _)| k)
            .collect();

        if candidates.is_empty() {
            tracing::warn!(layer, "node mutation found no gene to split");
            return Err(NeatError::UnsatisfiableMutation(
                "no enabled gene brackets the sampled layer",
            ));
        }

        let split = candidates[rng.random_range(0..candidates.len())];
        let (source, target, weight) = {
            let gene = &self.genes[split];
            (gene.source, gene.target, gene.weight)
        };

        let id = self.node_counter;
        self.node_counter += 1;
        self.nodes.insert(Node::new(id, layer));

        let into = self.connect(source, id, rng)?;
        let out_of = self.connect(id, target, rng)?;
        self.gene_by_innovation_mut(into)?.weight = 1.0;
        self.gene_by_innovation_mut(out_of)?.weight = weight;
        self.genes[split].enabled = false;

        tracing::debug!(node = id, layer, source, target, "split gene");
        Ok(id)
    }

    /// Apply one round of mutation.
    ///
    /// A genome without genes first gets a bootstrap edge. Then, each with an
    /// independent roll: every gene's weight is mutated, an edge is added,
    /// and a node is inserted. A failed edge step does not stop the node
    /// step from rolling.
    ///
    /// # Errors
    ///
    /// Returns the bootstrap error at once. Otherwise runs every step and
    /// returns the first structural error afterwards.
    pub fn mutate<R: Rng>(&mut self, rng: &mut R) -> NeatResult<()> {
        if self.genes.is_empty() {
            self.add_edge_mutation(rng)?;
        }

        if rng.random::<f32>() < self.config.weight_mutation_prob {
            let config = &self.config;
            for gene in self.genes.values_mut() {
                gene.mutate(rng, config);
            }
        }

        let mut first_error = None;
        if rng.random::<f32>() < self.config.add_edge_prob {
            if let Err(err) = self.add_edge_mutation(rng) {
                first_error.get_or_insert(err);
            }
        }
        if rng.random::<f32>() < self.config.add_node_prob {
            if let Err(err) = self.add_node_mutation(rng) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Genetic distance to another genome from the same ledger.
    ///
    /// Matching genes are those sharing an innovation id. Ids up to the
    /// highest match that are not shared count as disjoint, everything above
    /// it up to the larger genome's highest id counts as excess. Both are
    /// normalized by the innovation span once it reaches
    /// `compatibility_normalize_threshold`.
    #[must_use]
    pub fn compatibility(&self, other: &Genome) -> f32 {
        let span = self.innovation_span().max(other.innovation_span());

        let theirs: HashMap<u64, f32> = other
            .genes
            .values()
            .map(|g| (g.innovation, g.weight))
            .collect();
        let mut matches: Vec<(u64, f32)> = self
            .genes
            .values()
            .filter_map(|g| {
                theirs
                    .get(&g.innovation)
                    .map(|&w| (g.innovation, (g.weight - w).abs()))
            })
            .collect();
        // Fixed summation order.
        matches.sort_unstable_by_key(|&(innovation, _)| innovation);

        let matching = matches.len() as u64;
        let matched_through = matches.last().map_or(0, |&(innovation, _)| innovation + 1);
        let weight_diff: f32 = matches.iter().map(|&(_, diff)| diff).sum();

        let disjoint = matched_through - matching;
        let excess = span - matched_through;
        let avg_weight_diff = weight_diff / matching.max(1) as f32;
        let n = if span < self.config.compatibility_normalize_threshold {
            1.0
        } else {
            span as f32
        };

        (self.config.compatibility_excess_coeff * excess as f32 / n)
            + (self.config.compatibility_disjoint_coeff * disjoint as f32 / n)
            + (self.config.compatibility_weight_coeff * avg_weight_diff)
    }

    /// Whether this genome carries a gene with the given innovation id.
    #[must_use]
    pub fn contains_innovation(&self, innovation: u64) -> bool {
        self.genes.values().any(|g| g.innovation == innovation)
    }

    /// # Errors
    ///
    /// Returns [`NeatError::UnknownInnovation`] if no gene has this id.
    pub fn gene_by_innovation(&self, innovation: u64) -> NeatResult<&Gene> {
        self.genes
            .values()
            .find(|g| g.innovation == innovation)
            .ok_or(NeatError::UnknownInnovation(innovation))
    }

    /// # Errors
    ///
    /// Returns [`NeatError::UnknownInnovation`] if no gene has this id.
    pub fn gene_by_innovation_mut(&mut self, innovation: u64) -> NeatResult<&mut Gene> {
        self.genes
            .values_mut()
            .find(|g| g.innovation == innovation)
            .ok_or(NeatError::UnknownInnovation(innovation))
    }

    /// Weight of the gene with this innovation id, enabled or not.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::UnknownInnovation`] if no gene has this id.
    pub fn weight_of(&self, innovation: u64) -> NeatResult<f32> {
        self.gene_by_innovation(innovation).map(|g| g.weight)
    }

    #[must_use]
    pub fn node_by_id(&self, id: u32) -> Option<&Node> {
        self.node_key(id).map(|k| &self.nodes[k])
    }

    pub(crate) fn node_key(&self, id: u32) -> Option<NodeKey> {
        self.nodes
            .iter()
            .find(|(_, n)| n.id == id)
            .map(|(k, _)| k)
    }

    /// Nodes in creation order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Genes in creation order.
    pub fn genes(&self) -> impl Iterator<Item = &Gene> {
        self.genes.values()
    }

    /// Look up a gene by the arena key stored in a node's incoming set.
    #[must_use]
    pub fn gene(&self, key: GeneKey) -> Option<&Gene> {
        self.genes.get(key)
    }

    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn num_genes(&self) -> usize {
        self.genes.len()
    }

    #[must_use]
    pub fn num_enabled_genes(&self) -> usize {
        self.genes.values().filter(|g| g.enabled).count()
    }

    #[must_use]
    pub fn hidden_count(&self) -> usize {
        self.nodes.len() - self.input_keys.len() - self.output_keys.len()
    }

    #[must_use]
    pub fn n_inputs(&self) -> usize {
        self.input_keys.len()
    }

    #[must_use]
    pub fn n_outputs(&self) -> usize {
        self.output_keys.len()
    }

    pub(crate) fn input_keys(&self) -> &[NodeKey] {
        &self.input_keys
    }

    pub(crate) fn output_keys(&self) -> &[NodeKey] {
        &self.output_keys
    }

    pub(crate) fn node_arena(&self) -> &SlotMap<NodeKey, Node> {
        &self.nodes
    }

    pub(crate) fn node_arena_mut(&mut self) -> &mut SlotMap<NodeKey, Node> {
        &mut self.nodes
    }

    pub(crate) fn gene_arena(&self) -> &SlotMap<GeneKey, Gene> {
        &self.genes
    }

    /// Largest innovation id among this genome's genes.
    #[must_use]
    pub const fn highest_innovation(&self) -> Option<u64> {
        self.highest_innovation
    }

    /// One past the largest innovation id, or 0 without genes.
    fn innovation_span(&self) -> u64 {
        self.highest_innovation.map_or(0, |h| h + 1)
    }

    /// The id the next inserted node will receive.
    #[must_use]
    pub const fn node_counter(&self) -> u32 {
        self.node_counter
    }

    /// Score supplied by the fitness harness, `None` while unscored.
    #[must_use]
    pub const fn fitness(&self) -> Option<f32> {
        self.fitness
    }

    pub fn set_fitness(&mut self, fitness: f32) {
        self.fitness = Some(fitness);
    }

    #[must_use]
    pub const fn adjusted_fitness(&self) -> f32 {
        self.adjusted_fitness
    }

    pub fn set_adjusted_fitness(&mut self, adjusted_fitness: f32) {
        self.adjusted_fitness = adjusted_fitness;
    }

    #[must_use]
    pub const fn config(&self) -> &NeatConfig {
        &self.config
    }

    #[must_use]
    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    /// Serializable copy of this genome without ledger or resolved links.
    #[must_use]
    pub fn snapshot(&self) -> GenomeSnapshot {
        GenomeSnapshot {
            nodes: self.nodes.values().cloned().collect(),
            genes: self.genes.values().cloned().collect(),
            node_counter: self.node_counter,
            fitness: self.fitness,
            adjusted_fitness: self.adjusted_fitness,
            config: self.config.clone(),
        }
    }

    /// Rebuild a genome from a snapshot against `ledger`, then reconnect it.
    ///
    /// Edges the ledger has never seen are adopted under the snapshot's ids,
    /// so later mints cannot collide with them.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::InvalidSnapshot`] if the node layout or genes
    /// break the genome invariants, or if a gene disagrees with the ledger
    /// about its pair's id. Returns [`NeatError::InvalidConfig`] for a bad
    /// config.
    pub fn restore(snapshot: GenomeSnapshot, ledger: &SharedLedger) -> NeatResult<Self> {
        let GenomeSnapshot {
            nodes: node_list,
            genes: gene_list,
            node_counter,
            fitness,
            adjusted_fitness,
            config,
        } = snapshot;
        config.validate()?;

        let (n_in, n_out) = (config.num_inputs, config.num_outputs);
        if node_list.len() < n_in + n_out {
            return Err(NeatError::InvalidSnapshot(format!(
                "expected at least {} nodes, found {}",
                n_in + n_out,
                node_list.len()
            )));
        }

        let mut nodes: SlotMap<NodeKey, Node> = SlotMap::with_key();
        let mut input_keys = Vec::with_capacity(n_in);
        let mut output_keys = Vec::with_capacity(n_out);
        let mut ids = HashSet::with_capacity(node_list.len());
        let mut ranks = HashMap::with_capacity(node_list.len());
        let mut max_id = None;

        for (position, node) in node_list.into_iter().enumerate() {
            let expected_ok = if position < n_in {
                node.layer == INPUT_LAYER
            } else if position < n_in + n_out {
                node.layer == OUTPUT_LAYER
            } else {
                node.layer >= FIRST_HIDDEN_LAYER
            };
            if !expected_ok {
                return Err(NeatError::InvalidSnapshot(format!(
                    "node {} at position {position} has unexpected layer {}",
                    node.id, node.layer
                )));
            }
            if !ids.insert(node.id) {
                return Err(NeatError::InvalidSnapshot(format!(
                    "duplicate node id {}",
                    node.id
                )));
            }
            ranks.insert(node.id, node.rank());
            max_id = max_id.max(Some(node.id));

            let key = nodes.insert(Node::new(node.id, node.layer));
            if position < n_in {
                input_keys.push(key);
            } else if position < n_in + n_out {
                output_keys.push(key);
            }
        }

        let mut genes: SlotMap<GeneKey, Gene> = SlotMap::with_key();
        let mut innovations = HashSet::with_capacity(gene_list.len());
        let mut pairs = HashSet::with_capacity(gene_list.len());
        let mut highest_innovation = None;
        for mut gene in gene_list {
            if !innovations.insert(gene.innovation) {
                return Err(NeatError::InvalidSnapshot(format!(
                    "duplicate innovation {}",
                    gene.innovation
                )));
            }
            if !pairs.insert((gene.source, gene.target)) {
                return Err(NeatError::InvalidSnapshot(format!(
                    "duplicate edge {} -> {}",
                    gene.source, gene.target
                )));
            }
            match (ranks.get(&gene.source), ranks.get(&gene.target)) {
                (Some(low), Some(high)) if low < high => {}
                _ => {
                    return Err(NeatError::InvalidSnapshot(format!(
                        "gene {} does not connect {} to a higher layer node {}",
                        gene.innovation, gene.source, gene.target
                    )));
                }
            }
            highest_innovation = highest_innovation.max(Some(gene.innovation));
            gene.link = None;
            genes.insert(gene);
        }

        // Check every gene before adopting any, so a rejected snapshot
        // leaves the ledger untouched.
        {
            let mut ledger = ledger.lock();
            if let Some(gene) = genes
                .values()
                .find(|g| !ledger.agrees_with(g.source, g.target, g.innovation))
            {
                return Err(NeatError::InvalidSnapshot(format!(
                    "gene {} ({} -> {}) conflicts with the ledger",
                    gene.innovation, gene.source, gene.target
                )));
            }
            for gene in genes.values() {
                ledger.adopt(gene);
            }
        }

        let mut genome = Self {
            nodes,
            genes,
            input_keys,
            output_keys,
            node_counter: node_counter.max(max_id.map_or(0, |id| id + 1)),
            highest_innovation,
            fitness,
            adjusted_fitness,
            config,
            ledger: Arc::clone(ledger),
        };
        genome.reconnect()?;
        Ok(genome)
    }
}

impl fmt::Display for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Genome -----------------------")?;
        for gene in self.genes.values() {
            writeln!(
                f,
                "  [{:>4}] {:>3} -> {:<3} weight {:>8.4} {}",
                gene.innovation,
                gene.source,
                gene.target,
                gene.weight,
                if gene.enabled { "enabled" } else { "disabled" }
            )?;
        }
        write!(f, "------------------------------")
    }
}

/// Serializable form of a [`Genome`].
///
/// Nodes are listed inputs first, then outputs, then hidden nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenomeSnapshot {
    pub nodes: Vec<Node>,
    pub genes: Vec<Gene>,
    pub node_counter: u32,
    pub fitness: Option<f32>,
    pub adjusted_fitness: f32,
    #[serde(default)]
    pub config: NeatConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::innovation::{InnovationLedger, DEFAULT_LAYER_CEILING};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(42)
    }

    #[test]
    fn test_new_genome() {
        let ledger = InnovationLedger::shared();
        let genome = Genome::new(&ledger, 3, 2);

        assert_eq!(genome.n_inputs(), 3);
        assert_eq!(genome.n_outputs(), 2);
        assert_eq!(genome.num_nodes(), 5);
        assert_eq!(genome.num_genes(), 0);
        assert_eq!(genome.node_counter(), 5);
        assert_eq!(genome.highest_innovation(), None);
        assert_eq!(genome.fitness(), None);

        let layers: Vec<u32> = genome.nodes().map(|n| n.layer).collect();
        assert_eq!(layers, vec![0, 0, 0, 1, 1]);
        let ids: Vec<u32> = genome.nodes().map(|n| n.id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_with_config_rejects_bad_probability() {
        let ledger = InnovationLedger::shared();
        let config = NeatConfig {
            add_node_prob: 1.5,
            ..NeatConfig::new(2, 1)
        };
        let err = Genome::with_config(&ledger, config).unwrap_err();
        assert!(matches!(err, NeatError::InvalidConfig(_)));
    }

    #[test]
    fn test_config_validation() {
        assert!(NeatConfig::default().validate().is_ok());
        let zero_attempts = NeatConfig {
            max_resample_attempts: 0,
            ..NeatConfig::default()
        };
        assert!(zero_attempts.validate().is_err());
        let negative_range = NeatConfig {
            weight_range: -1.0,
            ..NeatConfig::default()
        };
        assert!(negative_range.validate().is_err());
    }

    #[test]
    fn test_connect_orders_by_layer() {
        let ledger = InnovationLedger::shared();
        let mut genome = Genome::new(&ledger, 2, 1);
        let mut rng = test_rng();

        // Output first: endpoints are swapped so the input is the source.
        let innovation = genome.connect(2, 0, &mut rng).unwrap();
        let gene = genome.gene_by_innovation(innovation).unwrap();
        assert_eq!((gene.source, gene.target), (0, 2));
        assert_eq!(ledger.lock().lookup(0, 2), Some(innovation));
        assert_eq!(ledger.lock().lookup(2, 0), None);
    }

    #[test]
    fn test_connect_rejects_same_layer() {
        let ledger = InnovationLedger::shared();
        let mut genome = Genome::new(&ledger, 2, 1);
        let mut rng = test_rng();

        let err = genome.connect(0, 1, &mut rng).unwrap_err();
        assert_eq!(err, NeatError::InvalidConnection { from: 0, to: 1 });
        assert_eq!(genome.num_genes(), 0);
        assert_eq!(ledger.lock().next_innovation(), 0);
    }

    #[test]
    fn test_connect_unknown_node() {
        let ledger = InnovationLedger::shared();
        let mut genome = Genome::new(&ledger, 2, 1);
        let err = genome.connect(0, 9, &mut test_rng()).unwrap_err();
        assert_eq!(err, NeatError::UnknownNode(9));
    }

    #[test]
    fn test_connect_drops_duplicates() {
        let ledger = InnovationLedger::shared();
        let mut genome = Genome::new(&ledger, 2, 1);
        let mut rng = test_rng();

        let first = genome.connect(0, 2, &mut rng).unwrap();
        let second = genome.connect(2, 0, &mut rng).unwrap();

        assert_eq!(first, second);
        assert_eq!(genome.num_genes(), 1);
        assert_eq!(ledger.lock().next_innovation(), 1);
    }

    #[test]
    fn test_connect_archives_fresh_genes_only() {
        let ledger = InnovationLedger::shared();
        let mut a = Genome::new(&ledger, 2, 1);
        let mut b = Genome::new(&ledger, 2, 1);
        let mut rng = test_rng();

        a.connect(0, 2, &mut rng).unwrap();
        b.connect(0, 2, &mut rng).unwrap();
        b.connect(1, 2, &mut rng).unwrap();

        let ledger = ledger.lock();
        let archived: Vec<u64> = ledger.archive().iter().map(|g| g.innovation).collect();
        assert_eq!(archived, vec![0, 1]);
    }

    #[test]
    fn test_shared_innovations_across_genomes() {
        let ledger = InnovationLedger::shared();
        let mut a = Genome::new(&ledger, 2, 1);
        let mut b = Genome::new(&ledger, 2, 1);
        let mut rng = test_rng();

        let from_a = a.connect(1, 2, &mut rng).unwrap();
        let from_b = b.connect(1, 2, &mut rng).unwrap();

        assert_eq!(from_a, from_b);
        assert_eq!(ledger.lock().next_innovation(), 1);
        assert_eq!(b.highest_innovation(), Some(from_b));
    }

    #[test]
    fn test_add_edge_mutation_crosses_layers() {
        let ledger = InnovationLedger::shared();
        let mut genome = Genome::new(&ledger, 3, 2);
        let mut rng = test_rng();

        for _ in 0..20 {
            genome.add_edge_mutation(&mut rng).unwrap();
        }
        for gene in genome.genes() {
            let source = genome.node_by_id(gene.source).unwrap();
            let target = genome.node_by_id(gene.target).unwrap();
            assert_eq!(source.layer, INPUT_LAYER);
            assert_eq!(target.layer, OUTPUT_LAYER);
        }
        // Only 3 * 2 distinct edges exist.
        assert!(genome.num_genes() <= 6);
    }

    #[test]
    fn test_add_edge_mutation_single_layer() {
        let ledger = InnovationLedger::shared();
        let mut genome = Genome::new(&ledger, 3, 0);
        let err = genome.add_edge_mutation(&mut test_rng()).unwrap_err();
        assert!(matches!(err, NeatError::UnsatisfiableMutation(_)));
    }

    #[test]
    fn test_add_node_mutation_splits_gene() {
        let ledger = InnovationLedger::shared();
        let mut genome = Genome::new(&ledger, 1, 1);
        let mut rng = test_rng();

        let original = genome.connect(0, 1, &mut rng).unwrap();
        genome.gene_by_innovation_mut(original).unwrap().weight = 0.75;

        let id = genome.add_node_mutation(&mut rng).unwrap();

        assert_eq!(genome.num_nodes(), 3);
        assert_eq!(genome.num_genes(), 3);
        assert_eq!(genome.hidden_count(), 1);
        assert!(!genome.gene_by_innovation(original).unwrap().enabled);

        let node = genome.node_by_id(id).unwrap();
        assert!(node.layer >= FIRST_HIDDEN_LAYER);
        assert!(node.layer <= ledger.lock().layer_ceiling());

        let into = genome.genes().find(|g| g.target == id).unwrap();
        let out_of = genome.genes().find(|g| g.source == id).unwrap();
        assert_eq!((into.source, into.weight), (0, 1.0));
        assert_eq!((out_of.target, out_of.weight), (1, 0.75));
        assert!(into.enabled && out_of.enabled);
    }

    #[test]
    fn test_add_node_mutation_bootstraps_edge() {
        let ledger = InnovationLedger::shared();
        let mut genome = Genome::new(&ledger, 2, 2);
        genome.add_node_mutation(&mut test_rng()).unwrap();

        assert_eq!(genome.num_genes(), 3);
        assert_eq!(genome.num_enabled_genes(), 2);
    }

    #[test]
    fn test_add_node_mutation_unsatisfiable() {
        let ledger = InnovationLedger::shared();
        let config = NeatConfig {
            layer_growth_prob: 0.0,
            ..NeatConfig::new(1, 1)
        };
        let mut genome = Genome::with_config(&ledger, config).unwrap();
        let mut rng = test_rng();

        genome.connect(0, 1, &mut rng).unwrap();
        // Ceiling stays at 2, so the only hidden layer is 2.
        genome.add_node_mutation(&mut rng).unwrap();
        let before = genome.num_genes();

        // Remaining enabled genes are 0 -> h(2) and h(2) -> 1; neither
        // strictly brackets layer 2.
        let err = genome.add_node_mutation(&mut rng).unwrap_err();
        assert!(matches!(err, NeatError::UnsatisfiableMutation(_)));
        assert_eq!(genome.num_genes(), before);
        assert_eq!(genome.num_nodes(), 3);
    }

    #[test]
    fn test_add_node_mutation_grows_layer_ceiling() {
        let ledger = InnovationLedger::shared();
        let config = NeatConfig {
            layer_growth_prob: 1.0,
            ..NeatConfig::new(1, 1)
        };
        let mut genome = Genome::with_config(&ledger, config).unwrap();
        let mut rng = test_rng();
        genome.connect(0, 1, &mut rng).unwrap();

        // Input to output brackets every hidden layer, so the split succeeds.
        let hidden = genome.add_node_mutation(&mut rng).unwrap();

        assert_eq!(ledger.lock().layer_ceiling(), DEFAULT_LAYER_CEILING + 1);
        let layer = genome.node_by_id(hidden).unwrap().layer;
        assert!((FIRST_HIDDEN_LAYER..=DEFAULT_LAYER_CEILING + 1).contains(&layer));
    }

    #[test]
    fn test_mutate_node_step_runs_after_failed_edge_step() {
        let mut failures = 0;
        for seed in 0..32 {
            let ledger = InnovationLedger::shared();
            let config = NeatConfig {
                add_edge_prob: 1.0,
                add_node_prob: 1.0,
                layer_growth_prob: 0.0,
                max_resample_attempts: 1,
                ..NeatConfig::new(1, 1)
            };
            let mut genome = Genome::with_config(&ledger, config).unwrap();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            genome.connect(0, 1, &mut rng).unwrap();

            // One resample attempt fails half the time; the split never does.
            if let Err(err) = genome.mutate(&mut rng) {
                assert!(matches!(err, NeatError::UnsatisfiableMutation(_)));
                failures += 1;
            }
            assert_eq!(genome.num_nodes(), 3);
            assert_eq!(genome.hidden_count(), 1);
        }
        assert!(failures > 0);
    }

    #[test]
    fn test_mutate_bootstraps_edge() {
        let ledger = InnovationLedger::shared();
        let mut genome = Genome::new(&ledger, 2, 1);
        genome.mutate(&mut test_rng()).unwrap();
        assert!(genome.num_genes() >= 1);
    }

    #[test]
    fn test_mutate_with_certain_rolls() {
        let ledger = InnovationLedger::shared();
        let config = NeatConfig {
            weight_mutation_prob: 1.0,
            add_edge_prob: 1.0,
            add_node_prob: 1.0,
            ..NeatConfig::new(3, 1)
        };
        let mut genome = Genome::with_config(&ledger, config).unwrap();
        let mut rng = test_rng();

        genome.mutate(&mut rng).unwrap();
        assert_eq!(genome.hidden_count(), 1);
        assert!(genome.num_genes() >= 3);
    }

    #[test]
    fn test_compatibility_identical() {
        let ledger = InnovationLedger::shared();
        let a = Genome::new(&ledger, 2, 1);
        let b = Genome::new(&ledger, 2, 1);
        assert_eq!(a.compatibility(&b), 0.0);

        let mut c = Genome::new(&ledger, 2, 1);
        let mut rng = test_rng();
        c.connect(0, 2, &mut rng).unwrap();
        c.connect(1, 2, &mut rng).unwrap();
        let d = c.clone();
        assert_eq!(c.compatibility(&d), 0.0);
    }

    #[test]
    fn test_compatibility_excess_and_weights() {
        let ledger = InnovationLedger::shared();
        let mut a = Genome::new(&ledger, 2, 1);
        let mut b = Genome::new(&ledger, 2, 1);
        let mut rng = test_rng();

        a.connect(0, 2, &mut rng).unwrap();
        a.connect(1, 2, &mut rng).unwrap();
        b.connect(0, 2, &mut rng).unwrap();
        a.gene_by_innovation_mut(0).unwrap().weight = 0.5;
        a.gene_by_innovation_mut(1).unwrap().weight = 0.25;
        b.gene_by_innovation_mut(0).unwrap().weight = 0.0;

        // One match (diff 0.5), id 1 is excess.
        let expected = 1.0 + 0.4 * 0.5;
        assert!((a.compatibility(&b) - expected).abs() < 1e-6);
        assert!((b.compatibility(&a) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_compatibility_disjoint() {
        let ledger = InnovationLedger::shared();
        let mut a = Genome::new(&ledger, 2, 1);
        let mut b = Genome::new(&ledger, 2, 1);
        let mut rng = test_rng();

        a.connect(0, 2, &mut rng).unwrap();
        a.connect(1, 2, &mut rng).unwrap();
        b.connect(1, 2, &mut rng).unwrap();
        let w = a.weight_of(1).unwrap();
        b.gene_by_innovation_mut(1).unwrap().weight = w;

        // Id 0 sits below the last match, so it is disjoint.
        assert!((a.compatibility(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_compatibility_normalizes_large_spans() {
        let ledger = InnovationLedger::shared();
        let mut rng = test_rng();
        // Burn 24 ids in the ledger so the next gene gets id 24.
        for target in 0..24 {
            ledger.lock().register(100, 200 + target);
        }

        let mut a = Genome::new(&ledger, 1, 1);
        a.connect(0, 1, &mut rng).unwrap();
        let b = Genome::new(&ledger, 1, 1);

        // span 25, no matches: 25 excess / 25.
        assert!((a.compatibility(&b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_unknown_innovation() {
        let ledger = InnovationLedger::shared();
        let genome = Genome::new(&ledger, 2, 1);
        assert_eq!(
            genome.weight_of(3).unwrap_err(),
            NeatError::UnknownInnovation(3)
        );
        assert!(!genome.contains_innovation(3));
    }

    #[test]
    fn test_clone_is_independent() {
        let ledger = InnovationLedger::shared();
        let mut genome = Genome::new(&ledger, 2, 1);
        let mut rng = test_rng();
        let innovation = genome.connect(0, 2, &mut rng).unwrap();
        genome.set_fitness(3.0);

        let mut copy = genome.clone();
        copy.gene_by_innovation_mut(innovation).unwrap().weight = 9.0;

        assert_ne!(genome.weight_of(innovation).unwrap(), 9.0);
        assert_eq!(copy.fitness(), Some(3.0));
        assert_eq!(copy.node_counter(), genome.node_counter());
        assert!(Arc::ptr_eq(copy.ledger(), genome.ledger()));
    }

    #[test]
    fn test_reconnect_rebuilds_incoming() {
        let ledger = InnovationLedger::shared();
        let mut genome = Genome::new(&ledger, 2, 1);
        let mut rng = test_rng();
        genome.connect(1, 2, &mut rng).unwrap();
        genome.connect(0, 2, &mut rng).unwrap();

        genome.reconnect().unwrap();
        genome.reconnect().unwrap();

        let output = genome.node_by_id(2).unwrap();
        let feeding: Vec<u64> = output
            .incoming()
            .iter()
            .filter_map(|&k| genome.gene(k))
            .map(|g| g.innovation)
            .collect();
        assert_eq!(feeding, vec![0, 1]);
        assert!(genome.node_by_id(0).unwrap().incoming().is_empty());
    }

    #[test]
    fn test_snapshot_restore() {
        let ledger = InnovationLedger::shared();
        let mut genome = Genome::new(&ledger, 2, 1);
        let mut rng = test_rng();
        genome.connect(0, 2, &mut rng).unwrap();
        genome.add_node_mutation(&mut rng).unwrap();
        genome.set_fitness(1.5);

        let json = serde_json::to_string(&genome.snapshot()).expect("Serialization failed");
        let snapshot: GenomeSnapshot = serde_json::from_str(&json).expect("Deserialization failed");
        let restored = Genome::restore(snapshot, &ledger).unwrap();

        assert_eq!(restored.num_nodes(), genome.num_nodes());
        assert_eq!(restored.num_genes(), genome.num_genes());
        assert_eq!(restored.node_counter(), genome.node_counter());
        assert_eq!(restored.highest_innovation(), genome.highest_innovation());
        assert_eq!(restored.fitness(), Some(1.5));
        assert_eq!(restored.compatibility(&genome), 0.0);
    }

    #[test]
    fn test_restore_rejects_bad_layout() {
        let ledger = InnovationLedger::shared();
        let genome = Genome::new(&ledger, 2, 1);
        let mut snapshot = genome.snapshot();
        snapshot.nodes.swap(0, 2);

        let err = Genome::restore(snapshot, &ledger).unwrap_err();
        assert!(matches!(err, NeatError::InvalidSnapshot(_)));
    }

    #[test]
    fn test_restore_rejects_backward_gene() {
        let ledger = InnovationLedger::shared();
        let genome = Genome::new(&ledger, 2, 1);
        let mut snapshot = genome.snapshot();
        snapshot.genes.push(Gene::new(0, 2, 0, 1.0));

        let err = Genome::restore(snapshot, &ledger).unwrap_err();
        assert!(matches!(err, NeatError::InvalidSnapshot(_)));
    }

    #[test]
    fn test_restore_into_fresh_ledger_adopts_ids() {
        let ledger = InnovationLedger::shared();
        let mut rng = test_rng();
        let mut genome = Genome::new(&ledger, 2, 1);
        let kept = genome.connect(0, 2, &mut rng).unwrap();

        let fresh = InnovationLedger::shared();
        let mut restored = Genome::restore(genome.snapshot(), &fresh).unwrap();
        assert_eq!(fresh.lock().lookup(0, 2), Some(kept));
        assert_eq!(fresh.lock().next_innovation(), kept + 1);

        let added = restored.connect(1, 2, &mut rng).unwrap();
        assert_ne!(added, kept);
        let ids: HashSet<u64> = restored.genes().map(|g| g.innovation).collect();
        assert_eq!(ids.len(), restored.num_genes());
    }

    #[test]
    fn test_restore_rejects_ledger_conflict() {
        let ledger = InnovationLedger::shared();
        let mut genome = Genome::new(&ledger, 2, 1);
        genome.connect(0, 2, &mut test_rng()).unwrap();

        // Another run gave id 0 to a different edge.
        let other = InnovationLedger::shared();
        other.lock().register(1, 2);

        let err = Genome::restore(genome.snapshot(), &other).unwrap_err();
        assert!(matches!(err, NeatError::InvalidSnapshot(_)));
        assert_eq!(other.lock().lookup(0, 2), None);
        assert_eq!(other.lock().history().len(), 1);
    }

    #[test]
    fn test_display_lists_genes() {
        let ledger = InnovationLedger::shared();
        let mut genome = Genome::new(&ledger, 2, 1);
        genome.connect(0, 2, &mut test_rng()).unwrap();

        let text = genome.to_string();
        assert!(text.starts_with("Genome"));
        assert!(text.contains("0 -> 2"));
        assert!(text.contains("enabled"));
    }
}
