//! Bounded-depth relation traversal.

use std::collections::HashSet;

use tracing::{debug, trace};

use crate::model::{Contact, ContactId, NetworkEntry, Population};

/// Discover the network reachable from `seeds` through `Relations`.
///
/// Depth-first, iterative. Each contact is emitted once, at the depth of its
/// first discovery; contacts at `max_depth` are emitted but not expanded.
/// Relation IDs missing from `population` are skipped.
pub fn discover(
    seeds: &[&Contact],
    population: &Population<'_>,
    max_depth: usize,
) -> Vec<NetworkEntry> {
    let mut visited: HashSet<ContactId> = HashSet::new();
    let mut network = Vec::new();

    for seed in seeds {
        let mut stack: Vec<(&Contact, usize)> = vec![(*seed, 0)];

        while let Some((contact, depth)) = stack.pop() {
            if !visited.insert(contact.id) {
                continue;
            }
            trace!(id = %contact.id, depth, "discovered");
            network.push(NetworkEntry {
                contact: contact.clone(),
                depth,
            });

            if depth >= max_depth {
                continue;
            }

            // Reverse push keeps pop order equal to the Relations order.
            for rel in contact.relations.iter().rev() {
                match population.get(*rel) {
                    Some(next) if !visited.contains(&next.id) => stack.push((next, depth + 1)),
                    Some(_) => {}
                    None => debug!(from = %contact.id, to = %rel, "relation not in population"),
                }
            }
        }
    }

    debug!(seeds = seeds.len(), found = network.len(), max_depth, "network discovered");
    network
}
