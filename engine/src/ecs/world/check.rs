use crate::ecs::{
    error::{Error, Result},
    storage::Location,
    world::World,
};

impl World {
    /// Verify the world's cross-structure invariants, returning the first violation found.
    ///
    /// - every live entity's location names a row holding that entity, and every row's entity
    ///   (staged rows included) resolves back to that row;
    /// - every archetype's columns, entities and masks have equal lengths;
    /// - an entity's sparse mask bits match the sparse sets holding a value for it;
    /// - every compiled query lists exactly the archetypes its rules accept.
    ///
    /// This walks the whole world and is meant for tests and debugging.
    pub fn check_invariants(&self) -> Result<()> {
        let corrupt = |message: String| Err(Error::InvalidState(message));

        let mut rows = 0;
        for archetype in self.graph.iter() {
            if let Err(message) = archetype.check() {
                return corrupt(message);
            }
            rows += archetype.len() + archetype.staged_len();
            let main = archetype
                .entities()
                .iter()
                .enumerate()
                .map(|(slot, entity)| (entity, Location::new(archetype.id(), slot)));
            let staged = archetype
                .staged_entities()
                .iter()
                .enumerate()
                .map(|(slot, entity)| (entity, Location::pending(archetype.id(), slot)));
            for (entity, expected) in main.chain(staged) {
                match self.entities.resolve(*entity) {
                    Ok(location) if location == expected => {}
                    other => {
                        return corrupt(format!(
                            "{entity} is stored at {expected:?} but resolves to {other:?}"
                        ));
                    }
                }
                let mask = archetype.sparse_mask(expected.slot(), expected.is_pending());
                for bit in mask.iter() {
                    if !self.sparse.erased(bit).is_some_and(|set| set.contains(entity.index())) {
                        return corrupt(format!(
                            "{entity} is marked with sparse bit {} but holds no value",
                            bit.index()
                        ));
                    }
                }
            }
        }
        if rows != self.entities.len() {
            return corrupt(format!(
                "{rows} rows stored for {} live entities",
                self.entities.len()
            ));
        }

        for (bit, set) in self.sparse.iter() {
            for entity in set.entities() {
                let location = self.entities.resolve(*entity)?;
                let mask = self
                    .archetype_ref(location.archetype())?
                    .sparse_mask(location.slot(), location.is_pending());
                if !mask.contains(bit) {
                    return corrupt(format!(
                        "{entity} holds a {} value without its mask bit",
                        set.type_name()
                    ));
                }
            }
        }

        for (index, state) in self.queries.iter().enumerate() {
            for archetype in self.graph.iter() {
                if state.accepts(archetype) != state.contains(archetype.id()) {
                    return corrupt(format!(
                        "query {index} disagrees with its rules about {}",
                        archetype.id()
                    ));
                }
            }
        }
        Ok(())
    }
}
