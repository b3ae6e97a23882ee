use crate::ProcessGroup;
use std::panic;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;

const PEER_PANIC: &str = "another rank of the process group panicked";

struct BarrierState {
    arrived: usize,
    generation: usize,
    /// Rank that panicked first. Once set, the barrier releases every waiting rank.
    failed_rank: Option<usize>,
}

/// Barrier of the ranks of one group. Unlike `std::sync::Barrier` it does not
/// block forever if a rank panics, the waiting ranks panic as well.
struct RankBarrier {
    n_ranks: usize,
    state: Mutex<BarrierState>,
    condvar: Condvar,
}

impl RankBarrier {
    fn new(n_ranks: usize) -> Self {
        Self {
            n_ranks,
            state: Mutex::new(BarrierState {
                arrived: 0,
                generation: 0,
                failed_rank: None,
            }),
            condvar: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait(&self) {
        let mut state = self.lock();
        if state.failed_rank.is_some() {
            drop(state);
            panic!("{}", PEER_PANIC);
        }
        state.arrived += 1;
        if state.arrived == self.n_ranks {
            state.arrived = 0;
            state.generation += 1;
            self.condvar.notify_all();
            return;
        }
        let generation: usize = state.generation;
        while state.generation == generation && state.failed_rank.is_none() {
            state = self
                .condvar
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.generation == generation {
            drop(state);
            panic!("{}", PEER_PANIC);
        }
    }

    fn fail(&self, rank: usize) {
        let mut state = self.lock();
        if state.failed_rank.is_none() {
            state.failed_rank = Some(rank);
        }
        self.condvar.notify_all();
    }

    fn failed_rank(&self) -> Option<usize> {
        self.lock().failed_rank
    }
}

/// Marks the barrier as failed if the rank unwinds.
struct FailureGuard<'a> {
    rank: usize,
    barrier: &'a RankBarrier,
}

impl Drop for FailureGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.barrier.fail(self.rank);
        }
    }
}

/// Accumulator that is shared by all ranks of a [ThreadGroup].
struct Reduction {
    buffer: Mutex<Vec<f64>>,
    barrier: RankBarrier,
}

impl Reduction {
    fn buffer(&self) -> MutexGuard<'_, Vec<f64>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One rank of a group of threads that work on the same calculation in SPMD style.
pub struct ThreadGroup<'a> {
    rank: usize,
    size: usize,
    reduction: &'a Reduction,
}

impl ProcessGroup for ThreadGroup<'_> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn sum(&self, data: &mut [f64]) {
        if self.size == 1 {
            return;
        }
        // the accumulator is reset only after every rank copied the previous result
        self.reduction.barrier.wait();
        if self.rank == 0 {
            let mut buffer = self.reduction.buffer();
            buffer.clear();
            buffer.resize(data.len(), 0.0);
        }
        self.reduction.barrier.wait();
        {
            let mut buffer = self.reduction.buffer();
            for (total, value) in buffer.iter_mut().zip(data.iter()) {
                *total += *value;
            }
        }
        self.reduction.barrier.wait();
        let buffer = self.reduction.buffer();
        data.copy_from_slice(&buffer[..data.len()]);
    }
}

/// Runs `f` on `n_ranks` threads that form one [ThreadGroup] and returns the
/// results ordered by rank. If a rank panics, the ranks that wait in a
/// collective are released and the first panic is resumed in the caller.
pub fn run_spmd<T, F>(n_ranks: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(&ThreadGroup) -> T + Sync,
{
    let n_ranks: usize = n_ranks.max(1);
    let reduction = Reduction {
        buffer: Mutex::new(Vec::new()),
        barrier: RankBarrier::new(n_ranks),
    };
    let results: Vec<thread::Result<T>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..n_ranks)
            .map(|rank| {
                let reduction: &Reduction = &reduction;
                let f = &f;
                scope.spawn(move || {
                    let _guard = FailureGuard {
                        rank,
                        barrier: &reduction.barrier,
                    };
                    let group = ThreadGroup {
                        rank,
                        size: n_ranks,
                        reduction,
                    };
                    f(&group)
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join()).collect()
    });

    if let Some(rank) = reduction.barrier.failed_rank() {
        if let Some(Err(payload)) = results.into_iter().nth(rank) {
            panic::resume_unwind(payload);
        }
        panic!("rank {} of the process group panicked", rank);
    }
    results
        .into_iter()
        .map(|result| result.unwrap_or_else(|payload| panic::resume_unwind(payload)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sum_over_four_ranks() {
        let results: Vec<Vec<f64>> = run_spmd(4, |group| {
            let mut data: Vec<f64> = vec![group.rank() as f64, 1.0];
            group.sum(&mut data);
            data
        });
        for data in results {
            assert_eq!(data, vec![6.0, 4.0]);
        }
    }

    #[test]
    fn repeated_collectives_stay_in_order() {
        let results: Vec<f64> = run_spmd(3, |group| {
            let mut total: f64 = 0.0;
            for step in 0..20 {
                total += group.sum_scalar((group.rank() * step) as f64);
            }
            total
        });
        // sum over steps of step * (0 + 1 + 2)
        let expected: f64 = 3.0 * (0..20).sum::<usize>() as f64;
        for total in results {
            assert_eq!(total, expected);
        }
    }

    #[test]
    fn single_rank_is_serial() {
        let results: Vec<f64> = run_spmd(1, |group| group.sum_scalar(3.0));
        assert_eq!(results, vec![3.0]);
    }

    #[test]
    fn panic_of_one_rank_releases_the_others() {
        let result = panic::catch_unwind(|| {
            run_spmd(3, |group| {
                if group.rank() == 1 {
                    panic!("rank 1 failed");
                }
                // the remaining ranks would wait for rank 1 in every collective
                group.sum_scalar(1.0) + group.sum_scalar(2.0)
            })
        });
        let payload = result.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"rank 1 failed"));
    }

    #[test]
    fn group_is_usable_after_many_barriers() {
        let barrier = RankBarrier::new(2);
        thread::scope(|scope| {
            for _ in 0..2 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        barrier.wait();
                    }
                });
            }
        });
        assert_eq!(barrier.failed_rank(), None);
        assert_eq!(barrier.lock().generation, 100);
    }
}
