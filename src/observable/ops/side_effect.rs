use crate::disposable::Disposable;
use crate::error::RxError;
use crate::observable::Observable;
use crate::observer::{BoxObserver, Observer};
use crate::signal::Signal;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

type Hook<T> = Arc<dyn Fn(&Signal<T>) + Send + Sync + 'static>;

impl<T: Send + 'static> Observable<T> {
    /// Call `f` with each value before it is passed on.
    pub fn do_on_next<F>(&self, f: F) -> Observable<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.tap(
            Arc::new(move |s: &Signal<T>| {
                if let Signal::Next(v) = s {
                    f(v)
                }
            }),
        )
    }

    /// Call `f` with each value after downstream received it.
    pub fn do_after_next<F>(&self, f: F) -> Observable<T>
    where
        T: Clone,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.stage(move |upstream, downstream, token| {
            upstream.subscribe_inner(
                Box::new(AfterNext {
                    downstream,
                    f: f.clone(),
                }),
                token,
            );
        })
    }

    pub fn do_on_error<F>(&self, f: F) -> Observable<T>
    where
        F: Fn(&RxError) + Send + Sync + 'static,
    {
        self.tap(
            Arc::new(move |s: &Signal<T>| {
                if let Signal::Error(e) = s {
                    f(e)
                }
            }),
        )
    }

    pub fn do_on_complete<F>(&self, f: F) -> Observable<T>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.tap(
            Arc::new(move |s: &Signal<T>| {
                if let Signal::Complete = s {
                    f()
                }
            }),
        )
    }

    /// Call `f` with the subscription token when a subscriber arrives.
    pub fn do_on_subscribe<F>(&self, f: F) -> Observable<T>
    where
        F: Fn(&Disposable) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.stage(move |upstream, downstream, token| {
            f(&token);
            upstream.subscribe_inner(downstream, token);
        })
    }

    /// Call `f` when the subscription is disposed before it terminated.
    pub fn do_on_dispose<F>(&self, f: F) -> Observable<T>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.stage(move |upstream, downstream, token| {
            let terminated = Arc::new(AtomicBool::new(false));
            {
                let (f, terminated) = (f.clone(), terminated.clone());
                token.add_teardown(move || {
                    if !terminated.load(Ordering::Acquire) {
                        f();
                    }
                });
            }
            upstream.subscribe_inner(
                Box::new(Tap {
                    downstream,
                    hook: Arc::new(|_: &Signal<T>| {}),
                    terminated: Some(terminated),
                }),
                token,
            );
        })
    }

    fn tap(&self, hook: Hook<T>) -> Observable<T> {
        self.stage(move |upstream, downstream, token| {
            upstream.subscribe_inner(
                Box::new(Tap {
                    downstream,
                    hook: hook.clone(),
                    terminated: None,
                }),
                token,
            );
        })
    }
}

struct Tap<T> {
    downstream: BoxObserver<T>,
    hook: Hook<T>,
    terminated: Option<Arc<AtomicBool>>,
}

impl<T: Send + 'static> Observer<T> for Tap<T> {
    fn on_subscribe(&mut self, disposable: Disposable) {
        self.downstream.on_subscribe(disposable);
    }

    fn on_signal(&mut self, signal: Signal<T>) {
        (self.hook)(&signal);
        if signal.is_terminal()
            && let Some(flag) = &self.terminated
        {
            flag.store(true, Ordering::Release);
        }
        self.downstream.on_signal(signal);
    }
}

struct AfterNext<T, F> {
    downstream: BoxObserver<T>,
    f: Arc<F>,
}

impl<T, F> Observer<T> for AfterNext<T, F>
where
    T: Clone + Send + 'static,
    F: Fn(&T) + Send + Sync + 'static,
{
    fn on_subscribe(&mut self, disposable: Disposable) {
        self.downstream.on_subscribe(disposable);
    }

    fn on_signal(&mut self, signal: Signal<T>) {
        match signal {
            Signal::Next(v) => {
                self.downstream.on_next(v.clone());
                (self.f)(&v);
            }
            terminal => self.downstream.on_signal(terminal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::TestObserver;
    use parking_lot::Mutex;

    #[test]
    fn hooks_fire_in_order() {
        let log = Arc::new(Mutex::new(Vec::<String>::new()));
        let (a, b, c, d) = (log.clone(), log.clone(), log.clone(), log.clone());

        Observable::range(1, 2)
            .do_on_subscribe(move |_| a.lock().push("subscribe".into()))
            .do_on_next(move |v| b.lock().push(format!("before {v}")))
            .do_after_next(move |v| c.lock().push(format!("after {v}")))
            .do_on_complete(move || d.lock().push("complete".into()))
            .subscribe({
                let log = log.clone();
                move |v| log.lock().push(format!("got {v}"))
            });

        assert_eq!(
            *log.lock(),
            vec!["subscribe", "before 1", "got 1", "after 1", "before 2", "got 2", "after 2", "complete"]
        );
    }

    #[test]
    fn do_on_error_sees_the_error() {
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        let to = TestObserver::<i32>::new();
        Observable::error(RxError::Overflow)
            .do_on_error(move |e| *s.lock() = Some(e.kind()))
            .subscribe_with(to.clone());
        assert_eq!(*seen.lock(), Some(crate::error::ErrorKind::Overflow));
        assert!(to.error().is_some());
    }

    #[test]
    fn do_on_dispose_only_before_terminal() {
        let hits = Arc::new(Mutex::new(0));

        let h = hits.clone();
        Observable::range(0, 3)
            .do_on_dispose(move || *h.lock() += 1)
            .blocking_collect(std::time::Duration::from_secs(1))
            .unwrap();
        assert_eq!(*hits.lock(), 0);

        let h = hits.clone();
        let token = Observable::<i32>::never()
            .do_on_dispose(move || *h.lock() += 1)
            .subscribe(|_| {});
        token.dispose();
        token.dispose();
        assert_eq!(*hits.lock(), 1);
    }
}
