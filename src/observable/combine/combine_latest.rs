use super::Pair;
use crate::disposable::Disposable;
use crate::error::RxError;
use crate::observable::Observable;
use crate::observer::{Observer, Serialized};
use crate::signal::Signal;
use parking_lot::Mutex;
use std::sync::Arc;

type Combiner<T, R> = Arc<dyn Fn(Vec<T>) -> R + Send + Sync + 'static>;

/// Emit the combination of the latest value of every source whenever any
/// source emits, once all of them have emitted at least once.
///
/// A source that completes without ever emitting completes the result
/// right away. Otherwise the result completes when every source has.
pub fn combine_latest<T, R, I, F>(sources: I, combiner: F) -> Observable<R>
where
    T: Clone + Send + 'static,
    R: Send + 'static,
    I: IntoIterator<Item = Observable<T>>,
    F: Fn(Vec<T>) -> R + Send + Sync + 'static,
{
    let sources: Arc<Vec<Observable<T>>> = Arc::new(sources.into_iter().collect());
    let combiner: Combiner<T, R> = Arc::new(combiner);

    Observable::from_fn(move |mut downstream, token| {
        downstream.on_subscribe(token.clone());
        let n = sources.len();
        if n == 0 {
            downstream.on_complete();
            token.dispose();
            return;
        }

        let state = Arc::new(LatestState {
            out: Serialized::new(downstream),
            latest: Mutex::new(Latest {
                values: vec![None; n],
                seen: 0,
                completed: 0,
                finished: false,
            }),
            combiner: combiner.clone(),
            token: token.clone(),
        });
        for (index, source) in sources.iter().enumerate() {
            if token.is_disposed() {
                break;
            }
            source.subscribe_inner(
                Box::new(LatestObserver {
                    state: state.clone(),
                    index,
                }),
                token.child(),
            );
        }
    })
}

impl<T: Clone + Send + 'static> Observable<T> {
    /// Binary `combine_latest` over two differently typed sources.
    pub fn combine_latest_with<U, R, F>(&self, other: &Observable<U>, combiner: F) -> Observable<R>
    where
        U: Clone + Send + 'static,
        R: Send + 'static,
        F: Fn(T, U) -> R + Send + Sync + 'static,
    {
        let left = self.map(Pair::Left);
        let right = other.map(Pair::Right);
        combine_latest([left, right], |row: Vec<Pair<T, U>>| {
            let mut row = row.into_iter();
            (row.next(), row.next())
        })
        .try_map(move |pair| match pair {
            (Some(Pair::Left(a)), Some(Pair::Right(b))) => Ok(combiner(a, b)),
            _ => Err(anyhow::anyhow!("combine_latest row out of shape")),
        })
    }
}

struct Latest<T> {
    values: Vec<Option<T>>,
    seen: usize,
    completed: usize,
    finished: bool,
}

struct LatestState<T, R> {
    out: Arc<Serialized<R>>,
    latest: Mutex<Latest<T>>,
    combiner: Combiner<T, R>,
    token: Disposable,
}

impl<T: Clone + Send + 'static, R: Send + 'static> LatestState<T, R> {
    fn on_next(&self, index: usize, value: T) {
        let mut latest = self.latest.lock();
        if latest.finished {
            return;
        }
        if latest.values[index].is_none() {
            latest.seen += 1;
        }
        latest.values[index] = Some(value);
        if latest.seen < latest.values.len() {
            return;
        }
        let row: Vec<T> = latest.values.iter().flatten().cloned().collect();
        // Enqueued under the lock so combinations leave in order.
        self.out.enqueue(Signal::Next((self.combiner)(row)));
        drop(latest);
        self.out.drain();
    }

    fn on_complete(&self, index: usize) {
        let mut latest = self.latest.lock();
        if latest.finished {
            return;
        }
        latest.completed += 1;
        if latest.values[index].is_none() || latest.completed == latest.values.len() {
            latest.finished = true;
            self.out.enqueue(Signal::Complete);
            drop(latest);
            self.out.drain();
            self.token.dispose();
        }
    }

    fn on_error(&self, err: RxError) {
        let mut latest = self.latest.lock();
        if latest.finished {
            return;
        }
        latest.finished = true;
        self.out.enqueue(Signal::Error(err));
        drop(latest);
        self.out.drain();
        self.token.dispose();
    }
}

struct LatestObserver<T, R> {
    state: Arc<LatestState<T, R>>,
    index: usize,
}

impl<T: Clone + Send + 'static, R: Send + 'static> Observer<T> for LatestObserver<T, R> {
    fn on_signal(&mut self, signal: Signal<T>) {
        match signal {
            Signal::Next(v) => self.state.on_next(self.index, v),
            Signal::Error(e) => self.state.on_error(e),
            Signal::Complete => self.state.on_complete(self.index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::observer::TestObserver;
    use crate::subject::PublishSubject;

    #[test]
    fn waits_for_every_source_then_tracks_latest() {
        let a = PublishSubject::new();
        let b = PublishSubject::new();
        let to = TestObserver::new();
        combine_latest([a.as_observable(), b.as_observable()], |row: Vec<i32>| row[0] * 10 + row[1])
            .subscribe_with(to.clone());

        a.on_next(1);
        a.on_next(2);
        assert_eq!(to.value_count(), 0);
        b.on_next(5);
        a.on_next(3);
        b.on_next(6);
        a.on_complete();
        assert!(!to.is_terminated());
        b.on_next(7);
        b.on_complete();

        assert_eq!(to.values(), vec![25, 35, 36, 37]);
        assert!(to.is_completed());
    }

    #[test]
    fn empty_source_completes_early() {
        let a = PublishSubject::<u8>::new();
        let to = TestObserver::new();
        combine_latest([a.as_observable(), Observable::empty()], |row| row.len())
            .subscribe_with(to.clone());

        assert!(to.is_completed());
        assert_eq!(to.value_count(), 0);
        assert!(!a.has_observers());
    }

    #[test]
    fn error_short_circuits() {
        let a = PublishSubject::new();
        let b = PublishSubject::new();
        let to = TestObserver::new();
        a.as_observable()
            .combine_latest_with(&b.as_observable(), |x: u8, y: &'static str| format!("{x}{y}"))
            .subscribe_with(to.clone());

        a.on_next(1);
        b.on_next("x");
        b.on_error(RxError::upstream(anyhow::anyhow!("boom")));
        a.on_next(2);

        assert_eq!(to.values(), vec!["1x".to_string()]);
        assert_eq!(to.error().unwrap().kind(), ErrorKind::Upstream);
        assert!(!a.has_observers());
        assert_eq!(to.violations(), 0);
    }

    #[test]
    fn downstream_may_emit_back_into_a_source() {
        let a = PublishSubject::<i32>::new();
        let b = PublishSubject::<i32>::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let feedback = a.clone();
        let sink = seen.clone();
        combine_latest([a.as_observable(), b.as_observable()], |row: Vec<i32>| row[0] + row[1])
            .subscribe(move |v| {
                sink.lock().push(v);
                if v < 100 {
                    feedback.on_next(v * 10);
                }
            });

        a.on_next(1);
        b.on_next(2);

        assert_eq!(*seen.lock(), vec![3, 32, 322]);
    }
}
