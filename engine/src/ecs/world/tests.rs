use std::any::{Any, type_name};
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::ecs::{
    Component, Entity, Error, QueryBuilder, Tag, Update, World, WorldConfig,
    component::TypeRegistry,
    query::Predicate,
    storage::archetype,
};

#[derive(Component, Debug, Clone, Copy, PartialEq)]
struct Position {
    x: f32,
    y: f32,
}

#[derive(Component, Debug, Clone, Copy, PartialEq)]
struct Velocity {
    dx: f32,
    dy: f32,
}

#[derive(Component, Debug, Clone, Copy, PartialEq)]
struct Health(u32);

#[derive(Component, Debug, Clone, Copy, PartialEq)]
struct Regen(u32);

#[derive(Component, Debug, Clone, Copy, PartialEq)]
struct Echo(u32);

#[derive(Component, Debug, Clone, Copy, PartialEq)]
struct Decay(u32);

#[derive(Component, Debug, Clone, Copy, PartialEq)]
#[component(sparse)]
struct Burning(u32);

#[derive(Component, Debug, Clone, Copy, PartialEq)]
#[component(sparse)]
struct Shield(u32);

#[derive(Tag)]
struct Enemy;

#[derive(Tag)]
struct Frozen;

struct Tick {
    dt: f32,
}

impl Update for Position {
    type Args = (Velocity,);
    type Uniform = Tick;

    fn update(&mut self, _: Entity, (velocity,): (&Velocity,), tick: &Tick) {
        self.x += velocity.dx * tick.dt;
        self.y += velocity.dy * tick.dt;
    }
}

impl Update for Health {
    type Args = Regen;
    type Uniform = ();

    fn update(&mut self, _: Entity, regen: &Regen, _: &()) {
        self.0 += regen.0;
    }
}

impl Update for Echo {
    type Args = Echo;
    type Uniform = ();

    fn update(&mut self, _: Entity, other: &Echo, _: &()) {
        self.0 = other.0;
    }
}

impl Update for Decay {
    type Args = ();
    type Uniform = ();

    fn update(&mut self, _: Entity, _: (), _: &()) {
        self.0 = self.0.saturating_sub(1);
    }
}

impl Update for Burning {
    type Args = (Health,);
    type Uniform = ();

    fn update(&mut self, _: Entity, (health,): (&Health,), _: &()) {
        self.0 = self.0.saturating_sub(1) + health.0;
    }
}

fn position(x: f32) -> Position {
    Position { x, y: 0.0 }
}

fn velocity(dx: f32) -> Velocity {
    Velocity { dx, dy: 1.0 }
}

fn sorted(mut entities: Vec<Entity>) -> Vec<Entity> {
    entities.sort();
    entities
}

fn parallel_config() -> WorldConfig {
    WorldConfig::default().with_workers(4).with_min_chunk_len(8)
}

#[test]
fn spawn_and_read_components() {
    // Given
    let mut world = World::new();

    // When
    let entity = world.spawn((position(1.0), velocity(2.0))).unwrap();

    // Then
    assert!(world.is_alive(entity));
    assert_eq!(world.len(), 1);
    assert_eq!(world.get::<Position>(entity), Ok(&position(1.0)));
    assert_eq!(world.get::<Velocity>(entity), Ok(&velocity(2.0)));
    assert!(world.has::<Position>(entity));
    assert!(!world.has::<Health>(entity));
    assert_eq!(world.try_get::<Health>(entity), None);
    assert!(matches!(
        world.get::<Health>(entity),
        Err(Error::ComponentNotFound { component, .. }) if component == type_name::<Health>()
    ));
}

#[test]
fn spawning_a_duplicate_type_is_rejected() {
    let mut world = World::new();
    let result = world.spawn((Health(1), Health(2)));
    assert!(matches!(result, Err(Error::InvalidState(_))));
    assert!(world.is_empty());
}

#[test]
fn despawn_makes_the_handle_stale() {
    // Given
    let mut world = World::new();
    let entity = world.spawn(Health(3)).unwrap();

    // When
    world.despawn(entity).unwrap();

    // Then
    assert!(!world.is_alive(entity));
    assert_eq!(world.get::<Health>(entity), Err(Error::StaleOrInvalidEntity(entity)));
    assert_eq!(world.despawn(entity), Err(Error::StaleOrInvalidEntity(entity)));
    assert_eq!(world.add(entity, Regen(1)), Err(Error::StaleOrInvalidEntity(entity)));

    let reused = world.spawn(Health(4)).unwrap();
    assert_eq!(reused.id(), entity.id());
    assert_ne!(reused.generation(), entity.generation());
    assert_eq!(world.get::<Health>(entity), Err(Error::StaleOrInvalidEntity(entity)));
    assert_eq!(world.get::<Health>(reused), Ok(&Health(4)));
}

#[test]
fn despawn_moves_the_last_row_into_the_hole() {
    // Given
    let mut world = World::new();
    let entities = world.spawn_many((0..3).map(Health)).unwrap();

    // When
    world.despawn(entities[0]).unwrap();

    // Then
    assert_eq!(world.location(entities[2]).unwrap().slot(), 0);
    assert_eq!(world.get::<Health>(entities[2]), Ok(&Health(2)));
    assert_eq!(world.get::<Health>(entities[1]), Ok(&Health(1)));
    world.check_invariants().unwrap();
}

#[test]
fn adding_and_removing_components_migrates_the_entity() {
    // Given
    let mut world = World::new();
    let entity = world.spawn(position(1.0)).unwrap();
    let other = world.spawn(position(2.0)).unwrap();
    let origin = world.location(entity).unwrap().archetype();

    // When
    world.add(entity, velocity(3.0)).unwrap();

    // Then
    let moved = world.location(entity).unwrap().archetype();
    assert_ne!(moved, origin);
    assert_eq!(world.get::<Position>(entity), Ok(&position(1.0)));
    assert_eq!(world.get::<Velocity>(entity), Ok(&velocity(3.0)));
    assert_eq!(world.get::<Position>(other), Ok(&position(2.0)));
    assert!(matches!(
        world.add(entity, velocity(4.0)),
        Err(Error::ComponentAlreadyPresent { .. })
    ));

    // When
    let removed = world.remove::<Velocity>(entity).unwrap();

    // Then
    assert_eq!(removed, velocity(3.0));
    assert_eq!(world.location(entity).unwrap().archetype(), origin);
    assert!(matches!(
        world.remove::<Velocity>(entity),
        Err(Error::ComponentNotFound { .. })
    ));
    assert_eq!(world.get::<Position>(entity), Ok(&position(1.0)));
    world.check_invariants().unwrap();
}

#[test]
fn repeated_transitions_reuse_archetypes() {
    // Given
    let mut world = World::new();
    let first = world.spawn(Health(1)).unwrap();
    let second = world.spawn(Health(2)).unwrap();

    // When
    world.add(first, Regen(1)).unwrap();
    let archetypes = world.archetypes().len();
    world.add(second, Regen(2)).unwrap();

    // Then
    assert_eq!(world.archetypes().len(), archetypes);
    assert_eq!(
        world.location(first).unwrap().archetype(),
        world.location(second).unwrap().archetype()
    );
}

#[test]
fn sparse_components_never_migrate() {
    // Given
    let mut world = World::new();
    let entity = world.spawn(Health(10)).unwrap();
    let location = world.location(entity).unwrap();

    // When
    world.add(entity, Burning(3)).unwrap();

    // Then
    assert_eq!(world.location(entity).unwrap(), location);
    assert_eq!(world.get::<Burning>(entity), Ok(&Burning(3)));
    assert!(matches!(
        world.add(entity, Burning(4)),
        Err(Error::ComponentAlreadyPresent { .. })
    ));
    world.get_mut::<Burning>(entity).unwrap().0 = 7;
    assert_eq!(world.remove::<Burning>(entity), Ok(Burning(7)));
    assert_eq!(world.location(entity).unwrap(), location);
    assert!(matches!(
        world.remove::<Burning>(entity),
        Err(Error::ComponentNotFound { .. })
    ));
    world.check_invariants().unwrap();
}

#[test]
fn sparse_values_are_dropped_on_despawn() {
    // Given
    let mut world = World::new();
    let entity = world.spawn((Health(1), Burning(2))).unwrap();
    let survivor = world.spawn((Health(2), Burning(5))).unwrap();

    // When
    world.despawn(entity).unwrap();

    // Then
    assert_eq!(world.get::<Burning>(survivor), Ok(&Burning(5)));
    let reused = world.spawn(Health(3)).unwrap();
    assert_eq!(reused.index(), entity.index());
    assert!(!world.has::<Burning>(reused));
    world.check_invariants().unwrap();
}

#[test]
fn tags_move_entities_between_archetypes() {
    // Given
    let mut world = World::new();
    let entity = world.spawn(Health(1)).unwrap();
    let untagged = world.location(entity).unwrap().archetype();

    // When
    world.add_tag::<Enemy>(entity).unwrap();

    // Then
    assert!(world.has_tag::<Enemy>(entity));
    assert!(!world.has_tag::<Frozen>(entity));
    assert_ne!(world.location(entity).unwrap().archetype(), untagged);
    assert_eq!(world.get::<Health>(entity), Ok(&Health(1)));
    assert!(matches!(
        world.add_tag::<Enemy>(entity),
        Err(Error::TagAlreadyPresent { .. })
    ));
    let enemy = TypeRegistry::global().register_tag::<Enemy>().unwrap().id;
    assert_eq!(world.tags_of(entity).unwrap(), &[enemy]);

    world.remove_tag::<Enemy>(entity).unwrap();
    assert!(!world.has_tag::<Enemy>(entity));
    assert_eq!(world.location(entity).unwrap().archetype(), untagged);
    assert!(matches!(
        world.remove_tag::<Enemy>(entity),
        Err(Error::TagNotFound { .. })
    ));
}

#[test]
fn set_inserts_or_overwrites() {
    // Given
    let mut world = World::new();
    let entity = world.spawn_empty().unwrap();

    // When
    world.set(entity, Health(1)).unwrap();
    world.set(entity, Health(2)).unwrap();
    world.set(entity, Shield(9)).unwrap();
    world.set(entity, Shield(8)).unwrap();

    // Then
    assert_eq!(world.get::<Health>(entity), Ok(&Health(2)));
    assert_eq!(world.get::<Shield>(entity), Ok(&Shield(8)));
}

#[test]
fn detach_strips_everything_but_keeps_the_entity() {
    // Given
    let mut world = World::new();
    let entity = world.spawn((Health(1), position(0.0), Burning(4))).unwrap();
    world.add_tag::<Enemy>(entity).unwrap();

    // When
    world.detach(entity).unwrap();

    // Then
    assert!(world.is_alive(entity));
    assert_eq!(world.location(entity).unwrap().archetype(), archetype::Id::EMPTY);
    assert!(!world.has::<Health>(entity));
    assert!(!world.has::<Burning>(entity));
    assert!(!world.has_tag::<Enemy>(entity));
    world.check_invariants().unwrap();
}

#[test]
fn queries_filter_on_components_and_tags() {
    // Given
    let mut world = World::new();
    let mover = world.spawn((position(0.0), velocity(1.0))).unwrap();
    let statue = world.spawn(position(5.0)).unwrap();
    let enemy = world.spawn((position(2.0), velocity(1.0))).unwrap();
    world.add_tag::<Enemy>(enemy).unwrap();
    world.spawn(Health(1)).unwrap();

    // When
    let positioned = QueryBuilder::new().with::<Position>().build(&mut world).unwrap();
    let moving = QueryBuilder::new()
        .with::<Position>()
        .with::<Velocity>()
        .build(&mut world)
        .unwrap();
    let still = QueryBuilder::new()
        .with::<Position>()
        .without::<Velocity>()
        .build(&mut world)
        .unwrap();
    let friendly_movers = QueryBuilder::new()
        .with::<Velocity>()
        .untagged::<Enemy>()
        .build(&mut world)
        .unwrap();
    let enemies = QueryBuilder::new().tagged::<Enemy>().build(&mut world).unwrap();

    // Then
    assert_eq!(
        sorted(world.query_entities(&positioned).unwrap()),
        sorted(vec![mover, statue, enemy])
    );
    assert_eq!(sorted(world.query_entities(&moving).unwrap()), sorted(vec![mover, enemy]));
    assert_eq!(world.query_entities(&still).unwrap(), vec![statue]);
    assert_eq!(world.query_entities(&friendly_movers).unwrap(), vec![mover]);
    assert_eq!(world.query_entities(&enemies).unwrap(), vec![enemy]);
    assert_eq!(world.query_len(&positioned), Ok(3));
    assert_eq!(world.matches(&moving, statue), Ok(false));
    assert_eq!(world.matches(&moving, enemy), Ok(true));
}

#[test]
fn identical_rules_share_one_compiled_query() {
    // Given
    let mut world = World::new();

    // When
    let first = QueryBuilder::new().with::<Health>().without::<Regen>().build(&mut world);
    let second = QueryBuilder::new().with::<Health>().without::<Regen>().build(&mut world);
    let other = QueryBuilder::new().with::<Health>().build(&mut world);

    // Then
    assert_eq!(first, second);
    assert_ne!(first, other);
}

#[test]
fn compiled_queries_see_archetypes_created_later() {
    // Given
    let mut world = World::new();
    let query = QueryBuilder::new().with::<Health>().build(&mut world).unwrap();
    assert_eq!(world.query_len(&query), Ok(0));

    // When
    let plain = world.spawn(Health(1)).unwrap();
    let regenerating = world.spawn((Health(2), Regen(1))).unwrap();
    let moved = world.spawn(Health(3)).unwrap();
    world.add_tag::<Frozen>(moved).unwrap();

    // Then
    assert_eq!(
        sorted(world.query_entities(&query).unwrap()),
        sorted(vec![plain, regenerating, moved])
    );
    world.check_invariants().unwrap();
}

#[test]
fn sparse_rules_filter_per_entity() {
    // Given
    let mut world = World::new();
    let entities = world.spawn_many((0..4).map(Health)).unwrap();
    world.add(entities[1], Burning(1)).unwrap();
    world.add(entities[2], Burning(1)).unwrap();
    world.add(entities[2], Shield(1)).unwrap();
    world.add(entities[3], Shield(1)).unwrap();

    // When
    let burning = QueryBuilder::new()
        .with::<Health>()
        .with::<Burning>()
        .without::<Shield>()
        .build(&mut world)
        .unwrap();
    let unburnt = QueryBuilder::new().without::<Burning>().build(&mut world).unwrap();

    // Then
    assert_eq!(world.query_entities(&burning).unwrap(), vec![entities[1]]);
    assert_eq!(world.query_len(&burning), Ok(1));
    assert_eq!(world.matches(&burning, entities[2]), Ok(false));
    assert_eq!(
        sorted(world.query_entities(&unburnt).unwrap()),
        sorted(vec![entities[0], entities[3]])
    );
}

#[test]
fn predicates_and_combined_builders() {
    // Given
    let mut world = World::new();
    let wide = world.spawn((Health(1), Regen(1), position(0.0))).unwrap();
    world.spawn(Health(1)).unwrap();
    let predicate = Predicate::new(|archetype| archetype.components().len() >= 3);

    // When
    let query = QueryBuilder::new()
        .with::<Health>()
        .and(QueryBuilder::new().matching(predicate.clone()))
        .build(&mut world)
        .unwrap();
    let again = QueryBuilder::new()
        .with::<Health>()
        .matching(predicate)
        .build(&mut world)
        .unwrap();

    // Then
    assert_eq!(world.query_entities(&query).unwrap(), vec![wide]);
    assert_eq!(query, again);
}

#[test]
fn unsatisfiable_queries_are_empty() {
    let mut world = World::new();
    world.spawn(Health(1)).unwrap();
    let query = QueryBuilder::new()
        .with::<Health>()
        .without::<Health>()
        .build(&mut world)
        .unwrap();
    assert_eq!(world.query_len(&query), Ok(0));
}

#[test]
fn queries_belong_to_one_world() {
    // Given
    let mut first = World::new();
    let mut second = World::new();
    let query = QueryBuilder::new().with::<Health>().build(&mut first).unwrap();

    // Then
    assert_ne!(first.id(), second.id());
    assert_eq!(second.query_len(&query), Err(Error::ForeignQuery));
    assert!(matches!(second.cursor(&query), Err(Error::ForeignQuery)));
    assert_eq!(
        second.for_each::<Health>(&query, |_| {}),
        Err(Error::ForeignQuery)
    );
}

#[test]
fn cursor_stages_spawns_until_iteration_ends() {
    // Given
    let mut world = World::new();
    let entities = world.spawn_many((0..3).map(Health)).unwrap();
    let query = QueryBuilder::new().with::<Health>().build(&mut world).unwrap();
    let mut visited = 0;
    let mut spawned = Vec::new();

    // When
    {
        let mut cursor = world.cursor(&query).unwrap();
        assert_eq!(cursor.entity(), None);
        while cursor.advance() {
            visited += 1;
            cursor.get_mut::<Health>().unwrap().0 += 10;
            let child = cursor.spawn(Health(100)).unwrap();
            assert_eq!(cursor.world().get::<Health>(child), Ok(&Health(100)));
            assert!(cursor.world().location(child).unwrap().is_pending());
            spawned.push(child);
        }
        assert_eq!(cursor.entity(), None);
        assert!(matches!(cursor.get::<Health>(), Err(Error::InvalidState(_))));

        let world = cursor.world_mut();
        assert!(world.is_iterating());
        assert!(matches!(
            world.despawn(entities[0]),
            Err(Error::IterationInProgress { .. })
        ));
        assert!(matches!(
            world.add(entities[0], Regen(1)),
            Err(Error::IterationInProgress { .. })
        ));
        assert!(matches!(
            world.add_tag::<Enemy>(entities[0]),
            Err(Error::IterationInProgress { .. })
        ));
        world.add(spawned[0], Burning(1)).unwrap();
        world.add(entities[1], Shield(2)).unwrap();
    }

    // Then
    assert_eq!(visited, 3);
    assert!(!world.is_iterating());
    assert_eq!(world.len(), 6);
    assert_eq!(world.query_len(&query), Ok(6));
    assert_eq!(world.get::<Health>(entities[0]), Ok(&Health(10)));
    assert_eq!(world.get::<Burning>(spawned[0]), Ok(&Burning(1)));
    assert_eq!(world.get::<Shield>(entities[1]), Ok(&Shield(2)));
    for child in &spawned {
        assert!(!world.location(*child).unwrap().is_pending());
    }
    world.check_invariants().unwrap();
    world.despawn(entities[0]).unwrap();
}

#[test]
fn staged_entities_are_not_results_until_iteration_ends() {
    // Given
    let mut world = World::new();
    world.spawn(Health(1)).unwrap();
    let query = QueryBuilder::new().with::<Health>().build(&mut world).unwrap();
    let mut staged = Vec::new();

    // When
    {
        let mut cursor = world.cursor(&query).unwrap();
        while cursor.advance() {
            let child = cursor.spawn(Health(2)).unwrap();
            let world = cursor.world();
            assert_eq!(world.matches(&query, child), Ok(false));
            assert_eq!(world.query_len(&query), Ok(1));
            assert_eq!(world.query_entities(&query).unwrap().len(), 1);
            staged.push(child);
        }
    }

    // Then
    assert_eq!(world.matches(&query, staged[0]), Ok(true));
    assert_eq!(world.query_len(&query), Ok(2));
    world.check_invariants().unwrap();
}

#[test]
fn update_passes_are_rejected_while_iterating() {
    // Given
    let mut world = World::new();
    world.spawn((Health(10), Regen(5))).unwrap();
    let query = QueryBuilder::new().with::<Health>().build(&mut world).unwrap();

    // When
    let staged = {
        let mut cursor = world.cursor(&query).unwrap();
        assert!(cursor.advance());
        let child = cursor.spawn((Health(10), Regen(5))).unwrap();
        let world = cursor.world_mut();
        assert!(matches!(
            world.update::<Health>(),
            Err(Error::IterationInProgress { .. })
        ));
        assert!(matches!(
            world.par_update::<Burning>(),
            Err(Error::IterationInProgress { .. })
        ));
        child
    };
    world.update::<Health>().unwrap();

    // Then
    assert_eq!(world.get::<Health>(staged), Ok(&Health(15)));
    assert_eq!(world.query_len(&query), Ok(2));
    world.check_invariants().unwrap();
}

#[test]
fn cursor_skips_rows_rejected_by_sparse_rules() {
    // Given
    let mut world = World::new();
    let entities = world.spawn_many((0..4).map(Health)).unwrap();
    world.add(entities[0], Shield(1)).unwrap();
    world.add(entities[2], Shield(1)).unwrap();
    let query = QueryBuilder::new()
        .with::<Health>()
        .without::<Shield>()
        .build(&mut world)
        .unwrap();

    // When
    let mut seen = Vec::new();
    let mut cursor = world.cursor(&query).unwrap();
    while cursor.advance() {
        seen.push(cursor.entity().unwrap());
        assert!(cursor.has::<Health>());
        assert!(!cursor.has::<Shield>());
    }
    drop(cursor);

    // Then
    assert_eq!(seen, vec![entities[1], entities[3]]);
}

#[test]
fn for_each_visits_matching_values() {
    // Given
    let mut world = World::new();
    let entities = world.spawn_many((1..=4).map(Health)).unwrap();
    world.add(entities[3], Burning(1)).unwrap();
    let query = QueryBuilder::new()
        .with::<Health>()
        .without::<Burning>()
        .build(&mut world)
        .unwrap();

    // When
    world.for_each::<Health>(&query, |health| health.0 *= 10).unwrap();

    // Then
    let values: Vec<_> = entities.iter().map(|e| world.get::<Health>(*e).unwrap().0).collect();
    assert_eq!(values, vec![10, 20, 30, 4]);
}

#[test]
fn for_each_entity_over_sparse_values() {
    // Given
    let mut world = World::new();
    let a = world.spawn((Health(1), Burning(1))).unwrap();
    let b = world.spawn((position(0.0), Burning(2))).unwrap();
    let c = world.spawn((Health(1), Burning(3), Shield(1))).unwrap();
    let query = QueryBuilder::new()
        .with::<Health>()
        .without::<Shield>()
        .build(&mut world)
        .unwrap();

    // When
    let mut visited = Vec::new();
    world
        .for_each_entity::<Burning>(&query, |entity, burning| {
            burning.0 += 100;
            visited.push(entity);
        })
        .unwrap();

    // Then
    assert_eq!(visited, vec![a]);
    assert_eq!(world.get::<Burning>(a), Ok(&Burning(101)));
    assert_eq!(world.get::<Burning>(b), Ok(&Burning(2)));
    assert_eq!(world.get::<Burning>(c), Ok(&Burning(3)));
}

#[test]
fn chunks_are_contiguous_matching_runs() {
    // Given
    let mut world = World::new();
    let entities = world.spawn_many((0..10).map(Health)).unwrap();
    world.add(entities[3], Burning(1)).unwrap();
    world.add(entities[7], Burning(1)).unwrap();
    let query = QueryBuilder::new()
        .with::<Health>()
        .without::<Burning>()
        .build(&mut world)
        .unwrap();

    // When
    let mut chunks = Vec::new();
    world
        .for_each_chunk::<Health>(&query, 4, |entities, values| {
            chunks.push(entities.to_vec());
            values.iter_mut().for_each(|health| health.0 += 1000);
        })
        .unwrap();

    // Then
    assert_eq!(
        chunks,
        vec![
            entities[0..3].to_vec(),
            entities[4..7].to_vec(),
            entities[8..10].to_vec()
        ]
    );
    assert_eq!(world.get::<Health>(entities[3]), Ok(&Health(3)));
    assert_eq!(world.get::<Health>(entities[9]), Ok(&Health(1009)));
}

#[test]
fn parallel_iteration_matches_sequential_at_chunk_boundaries() {
    // Four workers with a minimum of eight rows: 32 rows is one full chunk per worker.
    for len in [0u32, 1, 31, 32, 33, 257] {
        // Given
        let mut sequential = World::with_config(parallel_config());
        let mut parallel = World::with_config(parallel_config());
        let expected = sequential.spawn_many((0..len).map(Health)).unwrap();
        let actual = parallel.spawn_many((0..len).map(Health)).unwrap();
        let sequential_query = QueryBuilder::new().with::<Health>().build(&mut sequential).unwrap();
        let parallel_query = QueryBuilder::new().with::<Health>().build(&mut parallel).unwrap();
        let calls = AtomicUsize::new(0);

        // When
        sequential
            .for_each_entity::<Health>(&sequential_query, |entity, health| {
                health.0 = health.0 * 3 + entity.index() as u32;
            })
            .unwrap();
        parallel
            .par_for_each_entity::<Health>(&parallel_query, |entity, health| {
                calls.fetch_add(1, Ordering::Relaxed);
                health.0 = health.0 * 3 + entity.index() as u32;
            })
            .unwrap();

        // Then
        assert_eq!(calls.load(Ordering::Relaxed), len as usize, "len {len}");
        for (expected, actual) in expected.iter().zip(&actual) {
            assert_eq!(
                sequential.get::<Health>(*expected),
                parallel.get::<Health>(*actual),
                "len {len}"
            );
        }
    }
}

#[test]
fn parallel_iteration_respects_sparse_filters() {
    // Given
    let mut world = World::with_config(parallel_config());
    let entities = world.spawn_many((0..100).map(Health)).unwrap();
    for entity in entities.iter().step_by(3) {
        world.add(*entity, Shield(1)).unwrap();
    }
    let query = QueryBuilder::new()
        .with::<Health>()
        .without::<Shield>()
        .build(&mut world)
        .unwrap();

    // When
    world.par_for_each::<Health>(&query, |health| health.0 += 1000).unwrap();

    // Then
    for (index, entity) in entities.iter().enumerate() {
        let health = world.get::<Health>(*entity).unwrap().0;
        if index % 3 == 0 {
            assert_eq!(health, index as u32);
        } else {
            assert_eq!(health, index as u32 + 1000);
        }
    }
}

#[test]
fn parallel_iteration_over_sparse_components() {
    // Given
    let mut world = World::with_config(parallel_config());
    let entities = world.spawn_many((0..50).map(Health)).unwrap();
    for entity in &entities {
        world.add(*entity, Burning(1)).unwrap();
    }
    world.add_tag::<Frozen>(entities[0]).unwrap();
    let query = QueryBuilder::new().untagged::<Frozen>().build(&mut world).unwrap();

    // When
    world.par_for_each::<Burning>(&query, |burning| burning.0 = 2).unwrap();

    // Then
    assert_eq!(world.get::<Burning>(entities[0]), Ok(&Burning(1)));
    assert!(entities[1..].iter().all(|entity| world.get::<Burning>(*entity) == Ok(&Burning(2))));
}

#[test]
fn update_reads_arguments_and_uniform() {
    // Given
    let mut world = World::new();
    let mover = world.spawn((position(1.0), velocity(2.0))).unwrap();
    let statue = world.spawn(position(5.0)).unwrap();
    world.add(statue, velocity(0.0)).unwrap();
    world.set_uniform(Tick { dt: 0.5 });

    // When
    world.update::<Position>().unwrap();

    // Then
    assert_eq!(world.get::<Position>(mover), Ok(&Position { x: 2.0, y: 0.5 }));
    assert_eq!(world.get::<Position>(statue), Ok(&Position { x: 5.0, y: 0.5 }));
    world.check_invariants().unwrap();
}

#[test]
fn update_without_arguments_or_uniform() {
    // Given
    let mut world = World::with_config(parallel_config());
    let entities = world.spawn_many((0..40).map(Decay)).unwrap();

    // When
    world.update::<Decay>().unwrap();
    world.par_update::<Decay>().unwrap();

    // Then
    assert_eq!(world.get::<Decay>(entities[0]), Ok(&Decay(0)));
    assert_eq!(world.get::<Decay>(entities[39]), Ok(&Decay(37)));
    world.check_invariants().unwrap();
}

#[test]
fn update_requires_its_uniform() {
    let mut world = World::new();
    world.spawn((position(1.0), velocity(2.0))).unwrap();
    assert_eq!(
        world.update::<Position>(),
        Err(Error::UniformNotFound {
            uniform: type_name::<Tick>()
        })
    );
}

#[test]
fn update_reports_missing_arguments() {
    // Given
    let mut world = World::new();
    world.spawn((Health(1), Regen(2))).unwrap();
    let lonely = world.spawn(Health(5)).unwrap();

    // When
    let result = world.update::<Health>();

    // Then
    assert_eq!(
        result,
        Err(Error::MissingDependencyAtUpdateTime {
            entity: lonely,
            component: type_name::<Health>(),
            missing: type_name::<Regen>(),
        })
    );
    assert_eq!(world.get::<Health>(lonely), Ok(&Health(5)));
    world.check_invariants().unwrap();
}

#[test]
fn update_cannot_read_itself() {
    let mut world = World::new();
    world.spawn(Echo(1)).unwrap();
    assert!(matches!(world.update::<Echo>(), Err(Error::InvalidState(_))));
}

#[test]
fn update_of_sparse_components() {
    // Given
    let mut world = World::new();
    let burning = world.spawn((Health(10), Burning(3))).unwrap();
    let unhealthy = world.spawn(position(0.0)).unwrap();

    // When
    world.par_update::<Burning>().unwrap();

    // Then
    assert_eq!(world.get::<Burning>(burning), Ok(&Burning(12)));

    // When
    world.add(unhealthy, Burning(1)).unwrap();
    let result = world.update::<Burning>();

    // Then
    assert!(matches!(
        result,
        Err(Error::MissingDependencyAtUpdateTime { entity, .. }) if entity == unhealthy
    ));
    assert!(world.has::<Burning>(unhealthy));
    world.check_invariants().unwrap();
}

#[test]
fn parallel_update_matches_sequential() {
    for len in [0u32, 1, 31, 32, 33, 300] {
        // Given
        let mut sequential = World::with_config(parallel_config());
        let mut parallel = World::with_config(parallel_config());
        let spawn = |world: &mut World| {
            world.set_uniform(Tick { dt: 0.25 });
            world
                .spawn_many((0..len).map(|i| (position(i as f32), velocity(i as f32 * 2.0))))
                .unwrap()
        };
        let expected = spawn(&mut sequential);
        let actual = spawn(&mut parallel);

        // When
        sequential.update::<Position>().unwrap();
        parallel.par_update::<Position>().unwrap();

        // Then
        for (expected, actual) in expected.iter().zip(&actual) {
            assert_eq!(
                sequential.get::<Position>(*expected),
                parallel.get::<Position>(*actual),
                "len {len}"
            );
        }
    }
}

#[test]
fn type_erased_spawn_round_trips() {
    // Given
    let mut world = World::new();
    let registry = TypeRegistry::global();
    let health = registry.register_component::<Health>().unwrap().id;
    let burning = registry.register_component::<Burning>().unwrap().id;
    let enemy = registry.register_tag::<Enemy>().unwrap().id;

    // When
    let entity = world
        .spawn_dynamic(
            vec![
                (health, Box::new(Health(4)) as Box<dyn Any + Send>),
                (burning, Box::new(Burning(2)) as Box<dyn Any + Send>),
            ],
            &[enemy],
        )
        .unwrap();

    // Then
    assert_eq!(world.get::<Health>(entity), Ok(&Health(4)));
    assert_eq!(world.get::<Burning>(entity), Ok(&Burning(2)));
    assert!(world.has_tag::<Enemy>(entity));

    let components = world.components_any(entity).unwrap();
    assert_eq!(components.len(), 1);
    assert_eq!(components[0].0, health);
    assert_eq!(components[0].1.downcast_ref::<Health>(), Some(&Health(4)));

    let sparse = world.sparse_components(entity).unwrap();
    assert_eq!(sparse.len(), 1);
    assert_eq!(sparse[0].0, burning);
    assert_eq!(sparse[0].1.downcast_ref::<Burning>(), Some(&Burning(2)));
    world.check_invariants().unwrap();
}

#[test]
fn type_erased_spawn_validates_before_writing() {
    // Given
    let mut world = World::new();
    let registry = TypeRegistry::global();
    let health = registry.register_component::<Health>().unwrap().id;
    let regen = registry.register_component::<Regen>().unwrap().id;

    // When
    let result = world.spawn_dynamic(
        vec![
            (health, Box::new(Health(4)) as Box<dyn Any + Send>),
            (regen, Box::new(Health(1)) as Box<dyn Any + Send>),
        ],
        &[],
    );

    // Then
    assert_eq!(
        result,
        Err(Error::TypeMismatch {
            expected: type_name::<Regen>()
        })
    );
    assert!(world.is_empty());
    world.check_invariants().unwrap();
}

#[test]
fn random_operations_preserve_invariants() {
    let _ = env_logger::builder().is_test(true).try_init();

    // Given
    let mut rng = StdRng::seed_from_u64(0x5eed_ec5);
    let mut world = World::with_config(WorldConfig::default().with_initial_capacity(2));
    let mut alive: Vec<Entity> = Vec::new();
    let healthy = QueryBuilder::new().with::<Health>().build(&mut world).unwrap();

    // When
    for step in 0..3000u32 {
        let target = (!alive.is_empty()).then(|| alive[rng.gen_range(0..alive.len())]);
        match (rng.gen_range(0..10), target) {
            (0 | 1, _) | (_, None) => alive.push(world.spawn(Health(step)).unwrap()),
            (2, Some(entity)) => {
                world.despawn(entity).unwrap();
                alive.retain(|other| *other != entity);
            }
            (3, Some(entity)) => {
                let result = world.add(entity, Regen(step));
                assert!(matches!(result, Ok(()) | Err(Error::ComponentAlreadyPresent { .. })));
            }
            (4, Some(entity)) => {
                let result = world.remove::<Regen>(entity);
                assert!(matches!(result, Ok(_) | Err(Error::ComponentNotFound { .. })));
            }
            (5, Some(entity)) => {
                if world.has::<Burning>(entity) {
                    world.remove::<Burning>(entity).unwrap();
                } else {
                    world.add(entity, Burning(step)).unwrap();
                }
            }
            (6, Some(entity)) => {
                if world.has_tag::<Frozen>(entity) {
                    world.remove_tag::<Frozen>(entity).unwrap();
                } else {
                    world.add_tag::<Frozen>(entity).unwrap();
                }
            }
            (7, Some(entity)) => world.set(entity, Health(step)).unwrap(),
            (8, Some(_)) => {
                let mut cursor = world.cursor(&healthy).unwrap();
                let mut visits = rng.gen_range(0..4);
                while visits > 0 && cursor.advance() {
                    visits -= 1;
                    let current = cursor.entity().unwrap();
                    assert!(matches!(
                        cursor.world_mut().despawn(current),
                        Err(Error::IterationInProgress { .. })
                    ));
                    let child = cursor.spawn(Health(step)).unwrap();
                    if rng.gen_bool(0.5) {
                        cursor.world_mut().add(child, Burning(step)).unwrap();
                    }
                    assert_eq!(cursor.world().matches(&healthy, child), Ok(false));
                    cursor.world().check_invariants().unwrap();
                    alive.push(child);
                }
            }
            (_, Some(entity)) => {
                if rng.gen_bool(0.1) {
                    world.detach(entity).unwrap();
                }
            }
        }
        assert!(!world.is_iterating());
        world.check_invariants().unwrap();
    }

    // Then
    world.check_invariants().unwrap();
    assert_eq!(world.len(), alive.len());
    let query = QueryBuilder::new()
        .with::<Health>()
        .without::<Burning>()
        .untagged::<Frozen>()
        .build(&mut world)
        .unwrap();
    let expected = alive
        .iter()
        .filter(|entity| {
            world.has::<Health>(**entity)
                && !world.has::<Burning>(**entity)
                && !world.has_tag::<Frozen>(**entity)
        })
        .count();
    assert_eq!(world.query_len(&query), Ok(expected));
}
