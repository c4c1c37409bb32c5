//! Node and gene types for layered NEAT genomes.
//!
//! This module defines the two building blocks a [`Genome`](crate::Genome) owns:
//! - [`Node`]: a vertex with a genome-local id and a layer
//! - [`Gene`]: a directed, weighted edge between two nodes, identified across
//!   genomes by its innovation id
//!
//! Genes refer to their endpoints by node *id*. The arena keys used during
//! evaluation are resolved by [`Genome::reconnect`](crate::Genome::reconnect)
//! and are never serialized.

use rand::Rng;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

use crate::activation::sigmoid;
use crate::genome::NeatConfig;

new_key_type! {
    /// Arena slot of a node within one genome.
    pub struct NodeKey;

    /// Arena slot of a gene within one genome.
    pub struct GeneKey;
}

/// Layer of every input node.
pub const INPUT_LAYER: u32 = 0;
/// Layer of every output node. Sorts after all hidden layers.
pub const OUTPUT_LAYER: u32 = 1;
/// Lowest layer a hidden node may occupy.
pub const FIRST_HIDDEN_LAYER: u32 = 2;

/// Position of `layer` in evaluation order.
///
/// Layers order numerically except the output layer, which ranks after
/// every hidden layer.
#[inline]
#[must_use]
pub const fn layer_rank(layer: u32) -> u32 {
    if layer == OUTPUT_LAYER {
        u32::MAX
    } else {
        layer
    }
}

/// The role of a node, derived from its layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    /// Receives an external value; no activation applied.
    Input,
    /// Produces a network output.
    Output,
    /// Added by a node-insertion mutation.
    Hidden,
}

/// A vertex in the network graph.
#[derive(Debug, Serialize, Deserialize)]
pub struct Node {
    /// Unique within the owning genome, not across genomes.
    pub id: u32,
    /// 0 = input, 1 = output, 2.. = hidden.
    pub layer: u32,
    /// Cached activation, valid after the node's layer has been evaluated.
    #[serde(skip)]
    pub output: f32,
    /// Genes targeting this node, rebuilt by `Genome::reconnect`.
    #[serde(skip)]
    pub(crate) incoming: Vec<GeneKey>,
}

impl Node {
    #[must_use]
    pub fn new(id: u32, layer: u32) -> Self {
        Self {
            id,
            layer,
            output: 0.0,
            incoming: Vec::new(),
        }
    }

    #[must_use]
    pub const fn node_type(&self) -> NodeType {
        match self.layer {
            INPUT_LAYER => NodeType::Input,
            OUTPUT_LAYER => NodeType::Output,
            _ => NodeType::Hidden,
        }
    }

    /// See [`layer_rank`].
    #[inline]
    #[must_use]
    pub const fn rank(&self) -> u32 {
        layer_rank(self.layer)
    }

    /// Keys of the genes feeding this node as of the last reconnect.
    #[must_use]
    pub fn incoming(&self) -> &[GeneKey] {
        &self.incoming
    }

    /// Apply the activation to a weighted input sum and cache the result.
    ///
    /// Input nodes ignore `net_input` and return their injected value.
    pub fn activate(&mut self, net_input: f32) -> f32 {
        if self.layer != INPUT_LAYER {
            self.output = sigmoid(net_input);
        }
        self.output
    }
}

impl Clone for Node {
    /// Copies id, layer and cached output. The incoming set is left empty
    /// until the owning genome reconnects.
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            layer: self.layer,
            output: self.output,
            incoming: Vec::new(),
        }
    }
}

/// A directed, weighted edge between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gene {
    /// Identity shared by every genome holding the same structural edge.
    pub innovation: u64,
    /// Id of the source node (the lower-ranked endpoint).
    pub source: u32,
    /// Id of the target node.
    pub target: u32,
    pub weight: f32,
    /// Disabled genes are skipped during evaluation but keep their history.
    pub enabled: bool,
    /// Arena keys of `(source, target)`, resolved by `Genome::reconnect`.
    #[serde(skip)]
    pub(crate) link: Option<(NodeKey, NodeKey)>,
}

impl Gene {
    /// Create a new enabled gene with unresolved endpoints.
    #[must_use]
    pub fn new(innovation: u64, source: u32, target: u32, weight: f32) -> Self {
        Self {
            innovation,
            source,
            target,
            weight,
            enabled: true,
            link: None,
        }
    }

    /// Mutate the weight: perturb it with bounded uniform noise, or
    /// (less often) replace it with a fresh value from the weight range.
    pub fn mutate<R: Rng>(&mut self, rng: &mut R, config: &NeatConfig) {
        if rng.random::<f32>() < config.weight_perturb_prob {
            self.weight += (rng.random::<f32>() * 2.0 - 1.0) * config.weight_perturb_power;
        } else {
            self.weight = random_weight(rng, config.weight_range);
        }
    }
}

/// Uniform sample from `[-range, range)`.
pub(crate) fn random_weight<R: Rng>(rng: &mut R, range: f32) -> f32 {
    rng.random::<f32>() * 2.0 * range - range
}
