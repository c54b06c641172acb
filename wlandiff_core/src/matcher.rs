use std::collections::BTreeMap;
use tracing::{debug, warn};
use wlandiff_common::{EquipmentSnapshot, MatchMethod, MatchStrategy, Position};

/// Distances closer than this are treated as ties
const TIE_TOLERANCE: f64 = 1e-9;

/// An entity admitted to matching on one floor
#[derive(Debug, Clone, Copy)]
pub struct FloorEntity<'a> {
    /// Index in the owning snapshot's equipment list
    pub index: usize,
    pub position: Position,
    pub entity: &'a EquipmentSnapshot,
}

impl<'a> FloorEntity<'a> {
    pub fn name(&self) -> &'a str {
        &self.entity.name
    }
}

/// An old/new correspondence and the phase that produced it
#[derive(Debug, Clone, Copy)]
pub struct MatchedPair<'a> {
    pub old: FloorEntity<'a>,
    pub new: FloorEntity<'a>,
    pub method: MatchMethod,
}

/// Outcome of matching one floor. Every input entity lands in exactly one field.
#[derive(Debug, Default)]
pub struct FloorMatch<'a> {
    pub pairs: Vec<MatchedPair<'a>>,
    pub unmatched_old: Vec<FloorEntity<'a>>,
    pub unmatched_new: Vec<FloorEntity<'a>>,
}

/// Correlates old and new entities of a single floor
#[derive(Debug, Clone, Copy, Default)]
pub struct Matcher {
    strategy: MatchStrategy,
}

impl Matcher {
    pub fn new(strategy: MatchStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> MatchStrategy {
        self.strategy
    }

    /// Match `old` against `new`.
    ///
    /// `identity_radius` is in plan units; `None` disables the coordinate phase.
    pub fn match_floor<'a>(
        &self,
        floor: &str,
        old: &[FloorEntity<'a>],
        new: &[FloorEntity<'a>],
        identity_radius: Option<f64>,
    ) -> FloorMatch<'a> {
        let mut state = MatchState::new(old, new);

        match self.strategy {
            MatchStrategy::Name => state.match_by_name(floor),
            MatchStrategy::Coordinates => state.match_by_coordinates(floor, identity_radius),
            MatchStrategy::Combined => {
                state.match_by_name(floor);
                state.match_by_coordinates(floor, identity_radius);
            }
        }

        let result = state.finish();
        debug!(
            "Floor '{}': {} pairs, {} unmatched old, {} unmatched new",
            floor,
            result.pairs.len(),
            result.unmatched_old.len(),
            result.unmatched_new.len()
        );
        result
    }
}

struct MatchState<'s, 'a> {
    old: &'s [FloorEntity<'a>],
    new: &'s [FloorEntity<'a>],
    old_used: Vec<bool>,
    new_used: Vec<bool>,
    pairs: Vec<MatchedPair<'a>>,
}

impl<'s, 'a> MatchState<'s, 'a> {
    fn new(old: &'s [FloorEntity<'a>], new: &'s [FloorEntity<'a>]) -> Self {
        Self {
            old,
            new,
            old_used: vec![false; old.len()],
            new_used: vec![false; new.len()],
            pairs: Vec::new(),
        }
    }

    fn accept(&mut self, oi: usize, ni: usize, method: MatchMethod) {
        self.old_used[oi] = true;
        self.new_used[ni] = true;
        self.pairs.push(MatchedPair {
            old: self.old[oi],
            new: self.new[ni],
            method,
        });
    }

    /// Pair each old entity with an unconsumed new entity of identical name.
    /// Several candidates are resolved by distance, then snapshot index.
    fn match_by_name(&mut self, floor: &str) {
        let mut by_name: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (ni, entity) in self.new.iter().enumerate() {
            by_name.entry(entity.name()).or_default().push(ni);
        }

        for oi in 0..self.old.len() {
            if self.old_used[oi] {
                continue;
            }
            let old = self.old[oi];

            let candidates: Vec<usize> = by_name
                .get(old.name())
                .into_iter()
                .flatten()
                .copied()
                .filter(|&ni| !self.new_used[ni])
                .collect();

            let chosen = match candidates.as_slice() {
                [] => continue,
                [only] => *only,
                _ => {
                    let chosen = nearest_candidate(&old, self.new, &candidates);
                    warn!(
                        "Floor '{}': {} candidates named '{}' for old index {}, pairing nearest (new index {})",
                        floor,
                        candidates.len(),
                        old.name(),
                        old.index,
                        self.new[chosen].index
                    );
                    chosen
                }
            };

            self.accept(oi, chosen, MatchMethod::Name);
        }
    }

    /// Greedy nearest-neighbour pairing of the leftovers within `identity_radius`.
    fn match_by_coordinates(&mut self, floor: &str, identity_radius: Option<f64>) {
        let Some(radius) = identity_radius else {
            debug!("Floor '{}': no identity radius, skipping coordinate matching", floor);
            return;
        };

        let mut candidates: Vec<(f64, usize, usize)> = Vec::new();
        for (oi, old) in self.old.iter().enumerate() {
            if self.old_used[oi] {
                continue;
            }
            for (ni, new) in self.new.iter().enumerate() {
                if self.new_used[ni] {
                    continue;
                }
                let distance = old.position.distance_to(&new.position);
                if distance <= radius {
                    candidates.push((distance, oi, ni));
                }
            }
        }

        candidates.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then(self.old[a.1].index.cmp(&self.old[b.1].index))
                .then(self.new[a.2].index.cmp(&self.new[b.2].index))
        });

        for (k, &(distance, oi, ni)) in candidates.iter().enumerate() {
            if self.old_used[oi] || self.new_used[ni] {
                continue;
            }

            let contested = candidates[k + 1..]
                .iter()
                .take_while(|c| c.0 - distance <= TIE_TOLERANCE)
                .any(|&(_, o, n)| {
                    (o == oi && !self.new_used[n] && n != ni)
                        || (n == ni && !self.old_used[o] && o != oi)
                });
            if contested {
                warn!(
                    "Floor '{}': equally close candidates for '{}' (old index {}), pairing with '{}' (new index {})",
                    floor,
                    self.old[oi].name(),
                    self.old[oi].index,
                    self.new[ni].name(),
                    self.new[ni].index
                );
            }

            self.accept(oi, ni, MatchMethod::Coordinates);
        }
    }

    fn finish(self) -> FloorMatch<'a> {
        let unmatched_old = self
            .old
            .iter()
            .zip(&self.old_used)
            .filter(|(_, used)| !**used)
            .map(|(entity, _)| *entity)
            .collect();
        let unmatched_new = self
            .new
            .iter()
            .zip(&self.new_used)
            .filter(|(_, used)| !**used)
            .map(|(entity, _)| *entity)
            .collect();

        FloorMatch {
            pairs: self.pairs,
            unmatched_old,
            unmatched_new,
        }
    }
}

fn nearest_candidate(old: &FloorEntity<'_>, new: &[FloorEntity<'_>], candidates: &[usize]) -> usize {
    let mut best = candidates[0];
    let mut best_distance = old.position.distance_to(&new[best].position);

    for &ni in &candidates[1..] {
        let distance = old.position.distance_to(&new[ni].position);
        let closer = distance < best_distance - TIE_TOLERANCE;
        let tied_earlier =
            (distance - best_distance).abs() <= TIE_TOLERANCE && new[ni].index < new[best].index;
        if closer || tied_earlier {
            best = ni;
            best_distance = distance;
        }
    }

    best
}
