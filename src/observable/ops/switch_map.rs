use crate::disposable::Disposable;
use crate::error::RxError;
use crate::observable::Observable;
use crate::observer::{Observer, Serialized};
use crate::signal::Signal;
use parking_lot::Mutex;
use std::sync::Arc;

impl<T: Send + 'static> Observable<T> {
    /// Map every value to an inner stream, cancelling the previous inner
    /// stream first. Only the latest inner stream reaches downstream.
    pub fn switch_map<R, F>(&self, f: F) -> Observable<R>
    where
        R: Send + 'static,
        F: Fn(T) -> Observable<R> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.stage(move |upstream, mut downstream, token| {
            downstream.on_subscribe(token.clone());
            let f = f.clone();
            let switch = Arc::new(SwitchState {
                out: Serialized::new(downstream),
                current: Mutex::new(Current {
                    index: 0,
                    token: None,
                    inner_active: false,
                    source_done: false,
                    done: false,
                }),
                token: token.clone(),
            });
            upstream.subscribe_inner(
                Box::new(SourceObserver {
                    switch,
                    spawn: Box::new(move |v| f(v)),
                }),
                token.child(),
            );
        })
    }
}

struct Current {
    index: u64,
    token: Option<Disposable>,
    inner_active: bool,
    source_done: bool,
    done: bool,
}

struct SwitchState<R> {
    out: Arc<Serialized<R>>,
    current: Mutex<Current>,
    token: Disposable,
}

impl<R: Send + 'static> SwitchState<R> {
    fn fail(&self, err: RxError) {
        {
            let mut cur = self.current.lock();
            if cur.done {
                return;
            }
            cur.done = true;
            self.out.enqueue(Signal::Error(err));
        }
        self.out.drain();
        self.token.dispose();
    }
}

struct SourceObserver<T, R> {
    switch: Arc<SwitchState<R>>,
    spawn: Box<dyn Fn(T) -> Observable<R> + Send + 'static>,
}

impl<T: Send + 'static, R: Send + 'static> Observer<T> for SourceObserver<T, R> {
    fn on_signal(&mut self, signal: Signal<T>) {
        match signal {
            Signal::Next(v) => {
                let inner_token = self.switch.token.child();
                let (index, previous) = {
                    let mut cur = self.switch.current.lock();
                    if cur.done {
                        return;
                    }
                    cur.index += 1;
                    cur.inner_active = true;
                    (cur.index, cur.token.replace(inner_token.clone()))
                };
                if let Some(previous) = previous {
                    previous.dispose();
                }
                let inner = (self.spawn)(v);
                inner.subscribe_inner(
                    Box::new(InnerObserver {
                        switch: self.switch.clone(),
                        index,
                    }),
                    inner_token,
                );
            }
            Signal::Error(e) => self.switch.fail(e),
            Signal::Complete => {
                let finished = {
                    let mut cur = self.switch.current.lock();
                    cur.source_done = true;
                    if cur.inner_active || cur.done {
                        false
                    } else {
                        cur.done = true;
                        self.switch.out.enqueue(Signal::Complete);
                        true
                    }
                };
                if finished {
                    self.switch.out.drain();
                    self.switch.token.dispose();
                }
            }
        }
    }
}

struct InnerObserver<R> {
    switch: Arc<SwitchState<R>>,
    index: u64,
}

impl<R: Send + 'static> Observer<R> for InnerObserver<R> {
    fn on_signal(&mut self, signal: Signal<R>) {
        let finished = {
            let mut cur = self.switch.current.lock();
            // Enqueued under the lock so a superseded inner never gets through.
            if cur.index != self.index || cur.done {
                return;
            }
            match signal {
                Signal::Next(v) => {
                    self.switch.out.enqueue(Signal::Next(v));
                    false
                }
                Signal::Error(e) => {
                    cur.done = true;
                    self.switch.out.enqueue(Signal::Error(e));
                    true
                }
                Signal::Complete => {
                    cur.inner_active = false;
                    cur.token = None;
                    if cur.source_done {
                        cur.done = true;
                        self.switch.out.enqueue(Signal::Complete);
                        true
                    } else {
                        false
                    }
                }
            }
        };
        self.switch.out.drain();
        if finished {
            self.switch.token.dispose();
        }
    }
}
