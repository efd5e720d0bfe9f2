use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use fixedbitset::FixedBitSet;

use crate::ecs::{
    query::Rule,
    storage::{Archetype, Archetypes, SparseMask, archetype},
};

/// A compiled query: its rules, sparse masks and the archetypes currently matching them.
#[derive(Debug)]
pub(crate) struct QueryState {
    rules: Vec<Rule>,
    include: SparseMask,
    exclude: SparseMask,
    archetypes: Vec<archetype::Id>,
    members: FixedBitSet,
}

impl QueryState {
    fn new(rules: Vec<Rule>) -> Self {
        let mut include = SparseMask::EMPTY;
        let mut exclude = SparseMask::EMPTY;
        for rule in &rules {
            match rule {
                Rule::WithSparse(bit) => include.insert(*bit),
                Rule::WithoutSparse(bit) => exclude.insert(*bit),
                _ => {}
            }
        }
        Self {
            rules,
            include,
            exclude,
            archetypes: Vec::new(),
            members: FixedBitSet::new(),
        }
    }

    /// Whether every archetype-level rule accepts `archetype`.
    pub fn accepts(&self, archetype: &Archetype) -> bool {
        self.rules.iter().all(|rule| rule.accepts(archetype))
    }

    /// Record `archetype` if it matches and is not already recorded.
    pub fn offer(&mut self, archetype: &Archetype) {
        let index = archetype.id().index();
        if self.contains(archetype.id()) || !self.accepts(archetype) {
            return;
        }
        self.members.grow(index + 1);
        self.members.insert(index);
        self.archetypes.push(archetype.id());
    }

    /// The matching archetypes, in the order they were found.
    #[inline]
    pub fn archetypes(&self) -> &[archetype::Id] {
        &self.archetypes
    }

    #[inline]
    pub fn contains(&self, archetype: archetype::Id) -> bool {
        self.members.contains(archetype.index())
    }

    #[inline]
    pub fn include(&self) -> &SparseMask {
        &self.include
    }

    #[inline]
    pub fn exclude(&self) -> &SparseMask {
        &self.exclude
    }

    /// Whether the sparse rules are trivially satisfied.
    #[inline]
    pub fn is_dense(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Whether an entity with sparse mask `mask` in a matching archetype is a result.
    #[inline]
    pub fn admits(&self, mask: &SparseMask) -> bool {
        mask.matches(&self.include, &self.exclude)
    }
}

/// Every query compiled against one world, keyed by a hash of its rule list.
#[derive(Debug, Default)]
pub(crate) struct QueryCache {
    states: Vec<QueryState>,
    by_rules: HashMap<u64, Vec<usize>>,
}

impl QueryCache {
    /// Find the query compiled from `rules`, compiling it if needed. Returns its index and
    /// whether it was compiled now.
    pub fn get_or_insert(&mut self, rules: Vec<Rule>, archetypes: &Archetypes) -> (usize, bool) {
        let hash = rules_hash(&rules);
        let candidates = self.by_rules.entry(hash).or_default();
        if let Some(&index) = candidates.iter().find(|&&index| self.states[index].rules == rules) {
            return (index, false);
        }

        let mut state = QueryState::new(rules);
        for archetype in archetypes.iter() {
            state.offer(archetype);
        }
        let index = self.states.len();
        candidates.push(index);
        self.states.push(state);
        (index, true)
    }

    /// Offer a newly created archetype to every compiled query.
    pub fn offer(&mut self, archetype: &Archetype) {
        for state in &mut self.states {
            state.offer(archetype);
        }
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&QueryState> {
        self.states.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryState> {
        self.states.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.states.len()
    }
}

fn rules_hash(rules: &[Rule]) -> u64 {
    let mut hasher = DefaultHasher::new();
    rules.hash(&mut hasher);
    hasher.finish()
}
