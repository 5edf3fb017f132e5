use {
    std::{collections::HashMap, future::Future, sync::Arc},
    tokio::{
        sync::Semaphore,
        task::{self, JoinSet},
    },
};

/// A task that panicked, with the input it was started from.
#[derive(Debug)]
pub struct WorkerPanic<I> {
    pub input: I,
    pub message: String,
}

/// Runs `task` once per input with at most `workers` tasks in flight and
/// waits for every one of them. Nothing is cancelled when a task fails or
/// panics.
///
/// Outcomes come back in input order. A panicking task is reported as
/// [`WorkerPanic`] carrying a copy of its input taken before the spawn.
pub async fn run_bounded<I, O, F, Fut>(
    inputs: Vec<I>,
    workers: usize,
    task: F,
) -> Vec<Result<O, WorkerPanic<I>>>
where
    I: Clone + Send + 'static,
    O: Send + 'static,
    F: Fn(I) -> Fut,
    Fut: Future<Output = O> + Send + 'static,
{
    let total = inputs.len();
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut set = JoinSet::new();
    let mut snapshots: HashMap<task::Id, (usize, I)> = HashMap::with_capacity(total);

    for (index, input) in inputs.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let work = task(input.clone());
        let handle = set.spawn(async move {
            // The semaphore is never closed; a failed acquire only drops the bound.
            let _permit = semaphore.acquire_owned().await.ok();
            (index, work.await)
        });
        snapshots.insert(handle.id(), (index, input));
    }

    let mut slots: Vec<Option<Result<O, WorkerPanic<I>>>> = (0..total).map(|_| None).collect();
    while let Some(joined) = set.join_next_with_id().await {
        match joined {
            Ok((id, (index, output))) => {
                snapshots.remove(&id);
                slots[index] = Some(Ok(output));
            }
            Err(err) => {
                let Some((index, input)) = snapshots.remove(&err.id()) else {
                    tracing::error!(error = %err, "worker task failed with no recorded input");
                    continue;
                };
                tracing::error!(index, error = %err, "worker task panicked");
                slots[index] = Some(Err(WorkerPanic {
                    input,
                    message: err.to_string(),
                }));
            }
        }
    }

    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{
            sync::atomic::{AtomicUsize, Ordering},
            time::Duration,
        },
    };

    #[tokio::test(start_paused = true)]
    async fn respects_the_worker_bound() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let outcomes = run_bounded((0..12).collect(), 3, |n: u32| {
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                n * 2
            }
        })
        .await;

        let doubled: Vec<u32> = outcomes.into_iter().map(|o| o.unwrap()).collect();
        assert_eq!(doubled, (0..12).map(|n| n * 2).collect::<Vec<_>>());
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn panics_are_contained() {
        let outcomes = run_bounded(vec!["a", "boom", "c"], 2, |s: &'static str| async move {
            if s == "boom" {
                panic!("worker exploded");
            }
            s.to_uppercase()
        })
        .await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].as_ref().unwrap(), "A");
        let panic = outcomes[1].as_ref().unwrap_err();
        assert_eq!(panic.input, "boom");
        assert_eq!(outcomes[2].as_ref().unwrap(), "C");
    }

    #[tokio::test]
    async fn empty_input() {
        let outcomes = run_bounded(Vec::<u8>::new(), 4, |n| async move { n }).await;
        assert!(outcomes.is_empty());
    }
}
