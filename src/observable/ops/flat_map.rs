use crate::disposable::Disposable;
use crate::error::RxError;
use crate::observable::Observable;
use crate::observer::{Observer, Serialized};
use crate::signal::Signal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

impl<T: Send + 'static> Observable<T> {
    /// Map every value to an inner stream and merge all inner streams as
    /// they emit.
    ///
    /// Completes once the source and every inner stream completed. The
    /// first error from any of them is forwarded and cancels the rest.
    pub fn flat_map<R, F>(&self, f: F) -> Observable<R>
    where
        R: Send + 'static,
        F: Fn(T) -> Observable<R> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.stage(move |upstream, mut downstream, token| {
            downstream.on_subscribe(token.clone());
            let merge = Arc::new(MergeState {
                out: Serialized::new(downstream),
                active: AtomicUsize::new(1),
                done: AtomicBool::new(false),
                token: token.clone(),
            });
            let f = f.clone();
            upstream.subscribe_inner(
                Box::new(OuterObserver {
                    merge,
                    spawn: Box::new(move |v| f(v)),
                }),
                token.child(),
            );
        })
    }
}

/// Shared by the outer observer and every inner one.
struct MergeState<R> {
    out: Arc<Serialized<R>>,
    /// Outer source plus running inners.
    active: AtomicUsize,
    done: AtomicBool,
    token: Disposable,
}

impl<R: Send + 'static> MergeState<R> {
    fn fail(&self, err: RxError) {
        if !self.done.swap(true, Ordering::AcqRel) {
            self.out.push(Signal::Error(err));
            self.token.dispose();
        }
    }

    fn complete_one(&self) {
        if self.active.fetch_sub(1, Ordering::AcqRel) == 1 && !self.done.swap(true, Ordering::AcqRel) {
            self.out.push(Signal::Complete);
            self.token.dispose();
        }
    }
}

struct OuterObserver<T, R> {
    merge: Arc<MergeState<R>>,
    spawn: Box<dyn Fn(T) -> Observable<R> + Send + 'static>,
}

impl<T: Send + 'static, R: Send + 'static> Observer<T> for OuterObserver<T, R> {
    fn on_signal(&mut self, signal: Signal<T>) {
        match signal {
            Signal::Next(v) => {
                if self.merge.done.load(Ordering::Acquire) {
                    return;
                }
                let inner = (self.spawn)(v);
                self.merge.active.fetch_add(1, Ordering::AcqRel);
                inner.subscribe_inner(
                    Box::new(InnerObserver {
                        merge: self.merge.clone(),
                    }),
                    self.merge.token.child(),
                );
            }
            Signal::Error(e) => self.merge.fail(e),
            Signal::Complete => self.merge.complete_one(),
        }
    }
}

struct InnerObserver<R> {
    merge: Arc<MergeState<R>>,
}

impl<R: Send + 'static> Observer<R> for InnerObserver<R> {
    fn on_signal(&mut self, signal: Signal<R>) {
        match signal {
            Signal::Next(v) => self.merge.out.push(Signal::Next(v)),
            Signal::Error(e) => self.merge.fail(e),
            Signal::Complete => self.merge.complete_one(),
        }
    }
}
