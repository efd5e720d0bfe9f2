use crate::{
    ecs::entity::Entity,
    tasks::{Executor, ScopedTask},
};

/// Run `f` over `values` in chunks of `chunk_len` rows on `executor`.
///
/// Every chunk but the last becomes a pool task; the last one runs on the calling thread while
/// the others are in flight. `f` receives the slot offset of its chunk together with the chunk's
/// entities and values. Returns once every chunk has finished.
pub(crate) fn run_chunks<T, F>(
    executor: &Executor,
    entities: &[Entity],
    values: &mut [T],
    chunk_len: usize,
    f: F,
) where
    T: Send,
    F: Fn(usize, &[Entity], &mut [T]) + Sync,
{
    debug_assert_eq!(entities.len(), values.len());
    let f = &f;
    let chunk_len = chunk_len.max(1);
    if values.is_empty() {
        return;
    }
    if values.len() <= chunk_len {
        f(0, entities, values);
        return;
    }

    let mut chunks: Vec<_> = entities
        .chunks(chunk_len)
        .zip(values.chunks_mut(chunk_len))
        .enumerate()
        .map(|(index, (entities, values))| (index * chunk_len, entities, values))
        .collect();
    let Some((offset, last_entities, last_values)) = chunks.pop() else {
        return;
    };

    let tasks: Vec<ScopedTask<'_>> = chunks
        .into_iter()
        .map(|(offset, entities, values)| {
            Box::new(move || f(offset, entities, values)) as ScopedTask<'_>
        })
        .collect();

    log::trace!("running {} chunks of {chunk_len} rows", tasks.len() + 1);
    executor.batch(tasks, || f(offset, last_entities, last_values));
}
