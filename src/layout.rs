//! Display positions for rendering a genome.
//!
//! No drawing happens here. [`Genome::layout`] places input nodes in a
//! column along the left edge, outputs along the right edge, and one column
//! per hidden layer in between, so a renderer only has to draw circles and
//! lines.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::gene::{layer_rank, INPUT_LAYER, OUTPUT_LAYER};
use crate::genome::Genome;

/// Distance of the input and output columns from the canvas edges.
const EDGE_MARGIN: f32 = 30.0;

/// Where a node should be drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    /// Id of the node within its genome.
    pub id: u32,
    pub x: f32,
    pub y: f32,
}

impl Genome {
    /// Assign a position on a `width` x `height` canvas to every node.
    ///
    /// Positions are returned in node creation order. Nodes in a column are
    /// spaced evenly in creation order.
    #[must_use]
    pub fn layout(&self, width: f32, height: f32) -> Vec<NodePosition> {
        let margin = EDGE_MARGIN.min(width / 4.0);
        let input_rank = layer_rank(INPUT_LAYER);
        let output_rank = layer_rank(OUTPUT_LAYER);

        let mut column_sizes: HashMap<u32, usize> = HashMap::new();
        for node in self.nodes() {
            *column_sizes.entry(node.rank()).or_default() += 1;
        }
        let hidden_ranks: Vec<u32> = column_sizes
            .keys()
            .copied()
            .filter(|&rank| rank != input_rank && rank != output_rank)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let inner_width = width - 2.0 * margin;
        let column_x = |rank: u32| {
            if rank == input_rank {
                margin
            } else if rank == output_rank {
                width - margin
            } else {
                let column = hidden_ranks.binary_search(&rank).unwrap_or_else(|i| i);
                margin + (column + 1) as f32 * inner_width / (hidden_ranks.len() + 1) as f32
            }
        };

        let mut placed: HashMap<u32, usize> = HashMap::new();
        self.nodes()
            .map(|node| {
                let rank = node.rank();
                let size = column_sizes.get(&rank).copied().unwrap_or(1);
                let slot = placed.entry(rank).or_default();
                *slot += 1;
                let gap = height / (size + 1) as f32;
                NodePosition {
                    id: node.id,
                    x: column_x(rank),
                    y: *slot as f32 * gap,
                }
            })
            .collect()
    }
}
