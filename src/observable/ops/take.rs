use crate::disposable::Disposable;
use crate::observable::Observable;
use crate::observer::{BoxObserver, Observer};
use crate::signal::Signal;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

impl<T: Send + 'static> Observable<T> {
    /// Pass the first `count` values, then complete and cancel the source.
    pub fn take(&self, count: u64) -> Observable<T> {
        self.stage(move |upstream, mut downstream, token| {
            if count == 0 {
                downstream.on_subscribe(token.clone());
                downstream.on_complete();
                token.dispose();
                return;
            }
            upstream.subscribe_inner(
                Box::new(TakeObserver {
                    downstream,
                    remaining: count,
                    token: token.clone(),
                }),
                token,
            );
        })
    }

    /// Subscribe to the source `times` times in a row. `repeat(0)` is empty.
    pub fn repeat(&self, times: u64) -> Observable<T> {
        self.repeat_inner(Some(times))
    }

    /// Resubscribe every time the source completes, until disposed or an
    /// error arrives.
    pub fn repeat_forever(&self) -> Observable<T> {
        self.repeat_inner(None)
    }

    fn repeat_inner(&self, times: Option<u64>) -> Observable<T> {
        self.stage(move |upstream, mut downstream, token| {
            downstream.on_subscribe(token.clone());
            let repeat = Arc::new(Repeat {
                source: upstream.clone(),
                downstream: Mutex::new(downstream),
                remaining: AtomicU64::new(times.unwrap_or(u64::MAX)),
                forever: times.is_none(),
                wip: AtomicUsize::new(0),
                token,
            });
            repeat.next_round();
        })
    }
}

struct TakeObserver<T> {
    downstream: BoxObserver<T>,
    remaining: u64,
    token: Disposable,
}

impl<T: Send + 'static> Observer<T> for TakeObserver<T> {
    fn on_subscribe(&mut self, disposable: Disposable) {
        self.downstream.on_subscribe(disposable);
    }

    fn on_signal(&mut self, signal: Signal<T>) {
        if self.remaining == 0 {
            return;
        }
        match signal {
            Signal::Next(v) => {
                self.remaining -= 1;
                self.downstream.on_next(v);
                if self.remaining == 0 {
                    self.downstream.on_complete();
                    self.token.dispose();
                }
            }
            terminal => {
                self.remaining = 0;
                self.downstream.on_signal(terminal);
            }
        }
    }
}

struct Repeat<T> {
    source: Observable<T>,
    downstream: Mutex<BoxObserver<T>>,
    remaining: AtomicU64,
    forever: bool,
    wip: AtomicUsize,
    token: Disposable,
}

impl<T: Send + 'static> Repeat<T> {
    /// Start the next round. Rounds that complete synchronously are looped
    /// here rather than nested.
    fn next_round(self: &Arc<Self>) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        loop {
            if self.token.is_disposed() {
                return;
            }
            if !self.forever {
                if self.remaining.load(Ordering::Acquire) == 0 {
                    self.downstream.lock().on_complete();
                    self.token.dispose();
                    return;
                }
                self.remaining.fetch_sub(1, Ordering::AcqRel);
            }
            self.source.subscribe_inner(
                Box::new(RoundObserver {
                    repeat: self.clone(),
                }),
                self.token.child(),
            );
            if self.wip.fetch_sub(1, Ordering::AcqRel) == 1 {
                return;
            }
        }
    }
}

struct RoundObserver<T> {
    repeat: Arc<Repeat<T>>,
}

impl<T: Send + 'static> Observer<T> for RoundObserver<T> {
    fn on_signal(&mut self, signal: Signal<T>) {
        match signal {
            Signal::Next(v) => self.repeat.downstream.lock().on_next(v),
            Signal::Error(e) => {
                self.repeat.downstream.lock().on_error(e);
                self.repeat.token.dispose();
            }
            Signal::Complete => self.repeat.next_round(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::TestObserver;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(1);

    #[test]
    fn take_stops_the_source() {
        let to = TestObserver::new();
        Observable::range(0, i64::MAX as usize).take(3).subscribe_with(to.clone());
        assert_eq!(to.values(), vec![0, 1, 2]);
        assert_eq!(to.completions(), 1);
        assert_eq!(to.violations(), 0);
    }

    #[test]
    fn take_zero_completes_immediately() {
        assert!(Observable::range(0, 5).take(0).blocking_collect(WAIT).unwrap().is_empty());
    }

    #[test]
    fn repeat_resubscribes() {
        let out = Observable::from_iter(vec![1, 2]).repeat(3).blocking_collect(WAIT).unwrap();
        assert_eq!(out, vec![1, 2, 1, 2, 1, 2]);
        assert!(Observable::just(1).repeat(0).blocking_collect(WAIT).unwrap().is_empty());
    }

    #[test]
    fn repeat_forever_with_take() {
        let out = Observable::just(7).repeat_forever().take(5).blocking_collect(WAIT).unwrap();
        assert_eq!(out, vec![7; 5]);
    }
}
