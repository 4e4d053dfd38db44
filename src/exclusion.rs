//! Pluggable mutual exclusion used to serialize output delivery.
//!
//! Output of both streams is read concurrently, but must be delivered one chunk at a time.
//! Everything that happens during delivery (observer callbacks, accumulation, passthrough writes)
//! runs inside [`Exclusive::exclusive`].

use std::sync::{Condvar, Mutex, PoisonError};

/// Grants exclusive, blocking access to a value of type `T`.
///
/// Implementations must guarantee mutual exclusion: no two closures passed to
/// [`Exclusive::exclusive`] may run at the same time. FIFO fairness is not required, but callers
/// should not starve under normal load.
pub trait Exclusive<T>: Send + Sync + 'static {
    fn new(value: T) -> Self
    where
        Self: Sized;

    /// Runs `f` with exclusive access to the guarded value, blocking until access is granted.
    fn exclusive<R>(&self, f: impl FnOnce(&mut T) -> R) -> R;
}

// A panic inside a delivery callback must not render all captured output inaccessible.
fn recover<G>(result: Result<G, PoisonError<G>>) -> G {
    result.unwrap_or_else(|poisoned| {
        tracing::warn!("A previous output delivery panicked. Continuing with its state.");
        poisoned.into_inner()
    })
}

/// Exclusion based on a plain `std::sync::Mutex`. This is the default.
///
/// Critical sections are short and never span an `.await`, which makes a blocking mutex the
/// appropriate choice even inside async tasks.
#[derive(Debug)]
pub struct MutexExclusive<T> {
    inner: Mutex<T>,
}

impl<T: Send + 'static> Exclusive<T> for MutexExclusive<T> {
    fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    fn exclusive<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = recover(self.inner.lock());
        f(&mut guard)
    }
}

/// A ticket lock, granting access strictly in the order in which it was requested.
///
/// Behaves like a serial queue: whoever asks first, runs first.
#[derive(Debug)]
pub struct FairExclusive<T> {
    tickets: Mutex<Tickets>,
    turn_changed: Condvar,
    value: Mutex<T>,
}

#[derive(Debug, Default)]
struct Tickets {
    next_ticket: u64,
    now_serving: u64,
}

/// Hands the turn to the next ticket when dropped, even if the exclusive closure panicked.
struct Turn<'a> {
    tickets: &'a Mutex<Tickets>,
    turn_changed: &'a Condvar,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        recover(self.tickets.lock()).now_serving += 1;
        self.turn_changed.notify_all();
    }
}

impl<T> FairExclusive<T> {
    fn wait_for_turn(&self) -> Turn<'_> {
        let mut tickets = recover(self.tickets.lock());
        let ticket = tickets.next_ticket;
        tickets.next_ticket += 1;
        while tickets.now_serving != ticket {
            tickets = recover(self.turn_changed.wait(tickets));
        }
        Turn {
            tickets: &self.tickets,
            turn_changed: &self.turn_changed,
        }
    }
}

impl<T: Send + 'static> Exclusive<T> for FairExclusive<T> {
    fn new(value: T) -> Self {
        Self {
            tickets: Mutex::new(Tickets::default()),
            turn_changed: Condvar::new(),
            value: Mutex::new(value),
        }
    }

    fn exclusive<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let _turn = self.wait_for_turn();
        // Only the holder of the current turn ever locks `value`, so this never contends.
        let mut value = recover(self.value.lock());
        f(&mut value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assertr::prelude::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn never_overlaps<X: Exclusive<Vec<usize>>>() {
        let exclusion = Arc::new(X::new(Vec::new()));
        let inside = Arc::new(AtomicUsize::new(0));

        let threads: Vec<_> = (0..8)
            .map(|id| {
                let exclusion = exclusion.clone();
                let inside = inside.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        exclusion.exclusive(|seen| {
                            let concurrent = inside.fetch_add(1, Ordering::SeqCst);
                            assert_eq!(concurrent, 0, "two closures ran at the same time");
                            seen.push(id);
                            std::thread::yield_now();
                            inside.fetch_sub(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        let seen = exclusion.exclusive(std::mem::take);
        assert_that(seen.len()).is_equal_to(8 * 50);
    }

    #[test]
    fn mutex_exclusive_never_overlaps() {
        never_overlaps::<MutexExclusive<Vec<usize>>>();
    }

    #[test]
    fn fair_exclusive_never_overlaps() {
        never_overlaps::<FairExclusive<Vec<usize>>>();
    }

    #[test]
    fn fair_exclusive_serves_in_request_order() {
        let exclusion = Arc::new(FairExclusive::new(Vec::new()));

        // Hold the lock, then queue up waiters one after another.
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let holder = {
            let exclusion = exclusion.clone();
            std::thread::spawn(move || {
                exclusion.exclusive(|order: &mut Vec<usize>| {
                    order.push(0);
                    release_rx.recv().unwrap();
                })
            })
        };
        std::thread::sleep(Duration::from_millis(50));

        let mut waiters = Vec::new();
        for id in 1..=3 {
            let exclusion = exclusion.clone();
            waiters.push(std::thread::spawn(move || {
                exclusion.exclusive(|order| order.push(id));
            }));
            std::thread::sleep(Duration::from_millis(50));
        }

        release_tx.send(()).unwrap();
        holder.join().unwrap();
        for waiter in waiters {
            waiter.join().unwrap();
        }

        let order = exclusion.exclusive(std::mem::take);
        assert_that(order).is_equal_to(vec![0, 1, 2, 3]);
    }

    #[test]
    fn survives_a_panicking_closure() {
        let exclusion = Arc::new(FairExclusive::new(0_u32));

        let cloned = exclusion.clone();
        let result = std::thread::spawn(move || {
            cloned.exclusive(|_value| panic!("boom"));
        })
        .join();
        assert_that(result.is_err()).is_true();

        exclusion.exclusive(|value| *value += 1);
        assert_that(exclusion.exclusive(|value| *value)).is_equal_to(1);
    }
}
