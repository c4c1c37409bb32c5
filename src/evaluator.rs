//! Layer-wise feed-forward evaluation of a genome.
//!
//! Inputs are written straight into the input nodes, hidden nodes are
//! activated layer by layer in ascending order, and output nodes are
//! activated last. Mutation never connects two nodes on the same layer, so
//! the order of nodes within a layer does not matter.

use crate::error::{NeatError, NeatResult};
use crate::gene::{NodeKey, NodeType};
use crate::genome::Genome;

impl Genome {
    /// Run the network on `inputs` and return one value per output node.
    ///
    /// Reconnects the genome first, so it is safe to call on fresh clones and
    /// restored snapshots.
    ///
    /// # Errors
    ///
    /// Returns [`NeatError::InvalidInputShape`] without touching any node if
    /// `inputs.len()` differs from the number of input nodes.
    pub fn evaluate(&mut self, inputs: &[f32]) -> NeatResult<Vec<f32>> {
        if inputs.len() != self.n_inputs() {
            return Err(NeatError::InvalidInputShape {
                expected: self.n_inputs(),
                actual: inputs.len(),
            });
        }

        self.reconnect()?;

        let input_keys = self.input_keys().to_vec();
        let nodes = self.node_arena_mut();
        for (&key, &value) in input_keys.iter().zip(inputs) {
            nodes[key].output = value;
        }

        let mut hidden: Vec<(u32, NodeKey)> = self
            .node_arena()
            .iter()
            .filter(|(_, n)| n.node_type() == NodeType::Hidden)
            .map(|(k, n)| (n.layer, k))
            .collect();
        hidden.sort_by_key(|&(layer, _)| layer);
        for (_, key) in hidden {
            self.activate(key);
        }

        let output_keys = self.output_keys().to_vec();
        Ok(output_keys.into_iter().map(|key| self.activate(key)).collect())
    }

    fn activate(&mut self, key: NodeKey) -> f32 {
        let net_input = self.net_input(key);
        self.node_arena_mut()[key].activate(net_input)
    }

    /// Weighted sum over the node's enabled incoming genes, in innovation order.
    fn net_input(&self, key: NodeKey) -> f32 {
        let nodes = self.node_arena();
        let genes = self.gene_arena();
        nodes[key]
            .incoming()
            .iter()
            .filter_map(|&gene_key| genes.get(gene_key))
            .filter(|gene| gene.enabled)
            .filter_map(|gene| {
                gene.link
                    .map(|(source, _)| gene.weight * nodes[source].output)
            })
            .sum()
    }
}
