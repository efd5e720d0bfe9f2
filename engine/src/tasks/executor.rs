use crossbeam::channel::{Receiver, Sender, unbounded};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crate::tasks::Countdown;

type Task = Box<dyn FnOnce() + Send + 'static>;

/// A scoped task borrowing data from the submitting stack frame.
pub type ScopedTask<'env> = Box<dyn FnOnce() + Send + 'env>;

/// A fixed size pool of worker threads fed through a shared channel.
///
/// Work is submitted in batches of tasks that borrow the caller's data and are guaranteed to
/// finish before the batch call returns. Batches share one reusable [`Countdown`], so only one
/// batch runs at a time; concurrent batch calls from different threads are serialised and
/// batches must not be nested from inside a task.
pub struct Executor {
    sender: Sender<Message>,
    workers: Vec<Worker>,
    completion: Arc<Countdown>,
    panicked: Arc<AtomicBool>,
    batch_lock: Mutex<()>,
}

enum Message {
    Task(Task),
    Shutdown,
}

struct Worker {
    id: usize,
    handle: Option<thread::JoinHandle<()>>,
}

impl Executor {
    /// Start a pool of `size` worker threads.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "Thread pool size must be greater than 0");

        let (sender, receiver) = unbounded();
        let workers = (0..size)
            .map(|id| Worker::new(id, receiver.clone()))
            .collect();
        log::debug!("started executor with {size} workers");

        Executor {
            sender,
            workers,
            completion: Arc::new(Countdown::new(0)),
            panicked: Arc::new(AtomicBool::new(false)),
            batch_lock: Mutex::new(()),
        }
    }

    /// Run a batch of borrowed tasks on the pool while `inline` runs on the calling thread.
    ///
    /// The completion counter is reset to the number of queued tasks, every task counts it down
    /// when it finishes (or panics), and the call blocks until it reaches zero. If any task
    /// panicked the panic is re-raised here once every task has finished.
    pub fn batch<'env, R>(
        &'env self,
        tasks: Vec<ScopedTask<'env>>,
        inline: impl FnOnce() -> R,
    ) -> R {
        let _guard = self.batch_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.panicked.store(false, Ordering::Release);
        self.completion.reset(tasks.len());

        let join = Join { executor: self };
        for task in tasks {
            self.submit(task);
        }
        let result = inline();
        drop(join);

        if self.panicked.swap(false, Ordering::AcqRel) {
            panic!("a task submitted to the executor panicked");
        }
        result
    }

    fn submit<'env>(&'env self, task: ScopedTask<'env>) {
        let completion = TaskCompletion {
            countdown: Arc::clone(&self.completion),
            panicked: Arc::clone(&self.panicked),
        };
        let task: ScopedTask<'env> = Box::new(move || {
            let _completion = completion;
            task();
        });
        // Safety: the task only borrows data that outlives 'env. `batch` holds a `Join` which
        // blocks until the completion counter reaches zero, including while unwinding, so the
        // task has finished before any borrowed data can be released.
        let task: Task = unsafe { std::mem::transmute::<ScopedTask<'env>, Task>(task) };
        // Workers only exit on `Shutdown`, which is sent from `Drop`, so the channel is open. A
        // rejected task is dropped unrun, which still counts it down.
        if self.sender.send(Message::Task(task)).is_err() {
            log::error!("executor channel closed, task dropped");
        }
    }
}

/// Blocks until the current batch has drained. Held on the stack so the wait also happens when
/// the calling thread unwinds.
struct Join<'a> {
    executor: &'a Executor,
}

impl Drop for Join<'_> {
    fn drop(&mut self) {
        self.executor.completion.wait();
    }
}

/// Counts a task down when dropped, recording whether it unwound.
struct TaskCompletion {
    countdown: Arc<Countdown>,
    panicked: Arc<AtomicBool>,
}

impl Drop for TaskCompletion {
    fn drop(&mut self) {
        if thread::panicking() {
            self.panicked.store(true, Ordering::Release);
        }
        self.countdown.count_down();
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        for _ in &self.workers {
            let _ = self.sender.send(Message::Shutdown);
        }

        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take()
                && handle.join().is_err()
            {
                log::error!("executor worker {} exited abnormally", worker.id);
            }
        }
    }
}

impl Worker {
    fn new(id: usize, receiver: Receiver<Message>) -> Self {
        let handle = thread::spawn(move || {
            while let Ok(Message::Task(task)) = receiver.recv() {
                if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
                    log::error!("task panicked on executor worker {id}");
                }
            }
        });

        Worker {
            id,
            handle: Some(handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[test]
    fn batch_runs_queued_and_inline_work() {
        // Given
        let executor = Executor::new(3);
        let mut chunks = vec![vec![1u32; 8], vec![2u32; 8], vec![3u32; 8], vec![4u32; 8]];
        let (last, queued) = chunks.split_last_mut().unwrap();

        // When
        let tasks: Vec<ScopedTask<'_>> = queued
            .iter_mut()
            .map(|chunk| {
                Box::new(move || chunk.iter_mut().for_each(|v| *v *= 10)) as ScopedTask<'_>
            })
            .collect();
        let inline_len = executor.batch(tasks, || {
            last.iter_mut().for_each(|v| *v *= 10);
            last.len()
        });

        // Then
        assert_eq!(inline_len, 8);
        assert_eq!(chunks[0], vec![10; 8]);
        assert_eq!(chunks[3], vec![40; 8]);
    }

    #[test]
    fn batch_waits_for_slow_tasks() {
        // Given
        let executor = Executor::new(1);
        let finished = AtomicUsize::new(0);

        // When
        let tasks: Vec<ScopedTask<'_>> = (0..5)
            .map(|_| {
                Box::new(|| {
                    thread::sleep(Duration::from_millis(5));
                    finished.fetch_add(1, Ordering::Relaxed);
                }) as ScopedTask<'_>
            })
            .collect();
        executor.batch(tasks, || ());

        // Then
        assert_eq!(finished.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn batch_counter_is_reusable() {
        // Given
        let executor = Executor::new(2);
        let counter = AtomicUsize::new(0);

        // When
        for _ in 0..10 {
            let tasks: Vec<ScopedTask<'_>> = (0..4)
                .map(|_| {
                    Box::new(|| {
                        counter.fetch_add(1, Ordering::Relaxed);
                    }) as ScopedTask<'_>
                })
                .collect();
            executor.batch(tasks, || ());
        }

        // Then
        assert_eq!(counter.load(Ordering::Relaxed), 40);
        assert_eq!(executor.completion.remaining(), 0);
    }

    #[test]
    fn batch_reraises_task_panics_after_join() {
        // Given
        fn explode() {
            panic!("boom");
        }
        let executor = Executor::new(2);
        let finished = AtomicUsize::new(0);

        // When
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let tasks: Vec<ScopedTask<'_>> = vec![
                Box::new(explode),
                Box::new(|| {
                    thread::sleep(Duration::from_millis(20));
                    finished.fetch_add(1, Ordering::Relaxed);
                }),
            ];
            executor.batch(tasks, || ());
        }));

        // Then
        assert!(result.is_err());
        assert_eq!(finished.load(Ordering::Relaxed), 1);

        // The pool survives the panic.
        let after = AtomicUsize::new(0);
        let tasks: Vec<ScopedTask<'_>> = vec![Box::new(|| {
            after.fetch_add(1, Ordering::Relaxed);
        })];
        executor.batch(tasks, || ());
        assert_eq!(after.load(Ordering::Relaxed), 1);
    }
}
