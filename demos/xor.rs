//! XOR demo for strata-neat.
//!
//! Evolves layered networks toward XOR with a minimal population loop:
//! score every genome, group them into species by compatibility distance,
//! share fitness within each species, and refill the population with
//! mutated clones of the best genomes. Crossover is left out.
//!
//! Run with: `cargo run --example xor`
//! Set `RUST_LOG=strata_neat=debug` to watch innovations being minted.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use strata_neat::{Genome, InnovationLedger, NeatConfig};
use tracing_subscriber::EnvFilter;

const CASES: [([f32; 2], f32); 4] = [
    ([0.0, 0.0], 0.0),
    ([0.0, 1.0], 1.0),
    ([1.0, 0.0], 1.0),
    ([1.0, 1.0], 0.0),
];

/// Fitness is 4.0 minus the squared error over the truth table.
fn xor_fitness(genome: &mut Genome) -> f32 {
    let mut total_error = 0.0;
    for (inputs, expected) in &CASES {
        let output = genome.evaluate(inputs).expect("two inputs")[0];
        total_error += (output - expected).powi(2);
    }
    4.0 - total_error
}

/// Assign each genome to the first species whose representative is close
/// enough. Returns species as lists of population indices.
fn speciate(population: &[Genome], threshold: f32) -> Vec<Vec<usize>> {
    let mut species: Vec<Vec<usize>> = Vec::new();
    for (i, genome) in population.iter().enumerate() {
        let home = species
            .iter_mut()
            .find(|members| population[members[0]].compatibility(genome) < threshold);
        match home {
            Some(members) => members.push(i),
            None => species.push(vec![i]),
        }
    }
    species
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("NEAT XOR Example");
    println!("================\n");

    let config = NeatConfig {
        add_edge_prob: 0.3,
        add_node_prob: 0.1,
        ..NeatConfig::new(2, 1)
    };
    let population_size = 150;
    let generations = 100;
    let elite_count = 5;
    let compatibility_threshold = 3.0;

    let ledger = InnovationLedger::shared();
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut population: Vec<Genome> = (0..population_size)
        .map(|_| Genome::with_config(&ledger, config.clone()).expect("valid config"))
        .collect();

    println!("Population: {}", population_size);
    println!("Generations: {}", generations);
    println!("Elite count: {}", elite_count);
    println!();

    let mut solution_generation = None;

    for gen in 0..generations {
        for genome in &mut population {
            if let Err(err) = genome.mutate(&mut rng) {
                tracing::debug!(%err, "mutation skipped");
            }
            let fitness = xor_fitness(genome);
            genome.set_fitness(fitness);
        }

        let species = speciate(&population, compatibility_threshold);
        for members in &species {
            let share = members.len() as f32;
            for &i in members {
                let raw = population[i].fitness().unwrap_or(0.0);
                population[i].set_adjusted_fitness(raw / share);
            }
        }

        population.sort_by(|a, b| {
            b.fitness()
                .unwrap_or(f32::MIN)
                .total_cmp(&a.fitness().unwrap_or(f32::MIN))
        });
        let best = population[0].fitness().unwrap_or(0.0);

        if best >= 3.9 && solution_generation.is_none() {
            solution_generation = Some(gen);
        }

        if gen % 10 == 0 || gen == generations - 1 {
            let avg = population
                .iter()
                .filter_map(Genome::fitness)
                .sum::<f32>()
                / population.len() as f32;
            println!(
                "Gen {:3}: best={:.4}, avg={:.4}, species={}, nodes={}, genes={}",
                gen,
                best,
                avg,
                species.len(),
                population[0].num_nodes(),
                population[0].num_enabled_genes()
            );
        }

        if gen + 1 == generations {
            break;
        }

        // Elites survive untouched; the rest are clones of parents drawn
        // from the top half, weighted toward higher shared fitness.
        let parents = population.len() / 2;
        let mut by_shared: Vec<usize> = (0..parents).collect();
        by_shared.sort_by(|&a, &b| {
            population[b]
                .adjusted_fitness()
                .total_cmp(&population[a].adjusted_fitness())
        });
        let mut next: Vec<Genome> = population[..elite_count].to_vec();
        while next.len() < population_size {
            let pick = rng.random_range(0..parents).min(rng.random_range(0..parents));
            next.push(population[by_shared[pick]].clone());
        }
        population = next;
    }

    println!();
    let champion = &mut population[0];
    println!("Evolution Complete!");
    println!("==================");
    println!("Best fitness: {:.4}", champion.fitness().unwrap_or(0.0));
    println!("Nodes: {}", champion.num_nodes());
    println!("Hidden nodes: {}", champion.hidden_count());
    println!("Enabled genes: {}", champion.num_enabled_genes());
    println!("Innovations minted: {}", ledger.lock().next_innovation());
    println!("Layer ceiling: {}", ledger.lock().layer_ceiling());

    if let Some(gen) = solution_generation {
        println!("Solution found at generation: {}", gen);
    }

    println!("\n{champion}");

    println!("\nChampion XOR outputs:");
    for (inputs, expected) in &CASES {
        let output = champion.evaluate(inputs).expect("two inputs")[0];
        let rounded = if output > 0.5 { 1.0 } else { 0.0 };
        let status = if (rounded - expected).abs() < 0.1 {
            "✓"
        } else {
            "✗"
        };
        println!(
            "  {} XOR {} = {:.4} (expected {}) {}",
            inputs[0] as i32, inputs[1] as i32, output, *expected as i32, status
        );
    }

    println!("\nLayout on a 400x300 canvas:");
    for p in champion.layout(400.0, 300.0) {
        println!("  node {:>3} at ({:>6.1}, {:>6.1})", p.id, p.x, p.y);
    }
}
