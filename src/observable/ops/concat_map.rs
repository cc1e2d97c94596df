use crate::disposable::Disposable;
use crate::error::RxError;
use crate::observable::Observable;
use crate::observer::{Observer, Serialized};
use crate::signal::Signal;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

impl<T: Send + 'static> Observable<T> {
    /// Map every value to an inner stream and run the inner streams one
    /// after another in source order.
    ///
    /// Source values arriving while an inner stream runs are queued. The
    /// order holds no matter which scheduler an inner stream runs on.
    pub fn concat_map<R, F>(&self, f: F) -> Observable<R>
    where
        R: Send + 'static,
        F: Fn(T) -> Observable<R> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.stage(move |upstream, mut downstream, token| {
            downstream.on_subscribe(token.clone());
            let f = f.clone();
            let concat = Arc::new(ConcatState {
                out: Serialized::new(downstream),
                queue: Mutex::new(Pending {
                    items: VecDeque::new(),
                    active: false,
                    source_done: false,
                }),
                wip: AtomicUsize::new(0),
                done: AtomicBool::new(false),
                spawn: Box::new(move |v| f(v)),
                token: token.clone(),
            });
            upstream.subscribe_inner(Box::new(SourceObserver { concat }), token.child());
        })
    }
}

struct Pending<T> {
    items: VecDeque<T>,
    active: bool,
    source_done: bool,
}

enum Step<T> {
    Subscribe(T),
    Complete,
}

struct ConcatState<T, R> {
    out: Arc<Serialized<R>>,
    queue: Mutex<Pending<T>>,
    wip: AtomicUsize,
    done: AtomicBool,
    spawn: Box<dyn Fn(T) -> Observable<R> + Send + Sync + 'static>,
    token: Disposable,
}

impl<T: Send + 'static, R: Send + 'static> ConcatState<T, R> {
    /// Start the next inner stream if none is running. Inner streams that
    /// complete synchronously loop here instead of recursing.
    fn drain(self: &Arc<Self>) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }
        let mut missed = 1;
        loop {
            loop {
                if self.done.load(Ordering::Acquire) {
                    self.queue.lock().items.clear();
                    break;
                }
                let step = {
                    let mut q = self.queue.lock();
                    if q.active {
                        None
                    } else if let Some(v) = q.items.pop_front() {
                        q.active = true;
                        Some(Step::Subscribe(v))
                    } else if q.source_done {
                        Some(Step::Complete)
                    } else {
                        None
                    }
                };
                match step {
                    Some(Step::Subscribe(v)) => {
                        let inner = (self.spawn)(v);
                        inner.subscribe_inner(
                            Box::new(InnerObserver {
                                concat: self.clone(),
                            }),
                            self.token.child(),
                        );
                    }
                    Some(Step::Complete) => {
                        if !self.done.swap(true, Ordering::AcqRel) {
                            self.out.push(Signal::Complete);
                            self.token.dispose();
                        }
                        break;
                    }
                    None => break,
                }
            }

            let prev = self.wip.fetch_sub(missed, Ordering::AcqRel);
            missed = prev - missed;
            if missed == 0 {
                break;
            }
        }
    }

    fn fail(&self, err: RxError) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.out.push(Signal::Error(err));
            self.token.dispose();
        }
    }
}

struct SourceObserver<T, R> {
    concat: Arc<ConcatState<T, R>>,
}

impl<T: Send + 'static, R: Send + 'static> Observer<T> for SourceObserver<T, R> {
    fn on_signal(&mut self, signal: Signal<T>) {
        match signal {
            Signal::Next(v) => {
                self.concat.queue.lock().items.push_back(v);
                self.concat.drain();
            }
            Signal::Error(e) => self.concat.fail(e),
            Signal::Complete => {
                self.concat.queue.lock().source_done = true;
                self.concat.drain();
            }
        }
    }
}

struct InnerObserver<T, R> {
    concat: Arc<ConcatState<T, R>>,
}

impl<T: Send + 'static, R: Send + 'static> Observer<R> for InnerObserver<T, R> {
    fn on_signal(&mut self, signal: Signal<R>) {
        match signal {
            Signal::Next(v) => self.concat.out.push(Signal::Next(v)),
            Signal::Error(e) => self.concat.fail(e),
            Signal::Complete => {
                self.concat.queue.lock().active = false;
                self.concat.drain();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::TestObserver;
    use crate::scheduler::TestScheduler;
    use std::time::Duration;

    #[test]
    fn preserves_source_order_with_delayed_inners() {
        let sched = TestScheduler::new();
        let s = sched.clone();
        let to = TestObserver::new();
        // Earlier items get longer delays; order must still follow the source.
        Observable::from_iter(vec![3u64, 2, 1])
            .concat_map(move |v| {
                Observable::timer(Duration::from_millis(v * 10), Arc::new(s.clone())).map(move |_| v)
            })
            .subscribe_with(to.clone());

        sched.advance_by(Duration::from_secs(1));
        assert_eq!(to.values(), vec![3, 2, 1]);
        assert!(to.is_completed());
    }

    #[test]
    fn long_synchronous_chain_does_not_recurse() {
        let out = Observable::range(0, 50_000)
            .concat_map(Observable::just)
            .blocking_collect(Duration::from_secs(10))
            .unwrap();
        assert_eq!(out.len(), 50_000);
        assert_eq!(out.last(), Some(&49_999));
    }

    #[test]
    fn inner_error_stops_everything() {
        let to = TestObserver::new();
        Observable::range(1, 5)
            .concat_map(|v| {
                if v == 2 {
                    Observable::error(RxError::configuration("inner"))
                } else {
                    Observable::just(v)
                }
            })
            .subscribe_with(to.clone());
        assert_eq!(to.values(), vec![1]);
        assert!(to.error().is_some());
        assert_eq!(to.violations(), 0);
    }
}
