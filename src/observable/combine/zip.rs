use super::Pair;
use crate::disposable::Disposable;
use crate::error::RxError;
use crate::observable::Observable;
use crate::observer::{Observer, Serialized};
use crate::signal::Signal;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

type Combiner<T, R> = Arc<dyn Fn(Vec<T>) -> anyhow::Result<R> + Send + Sync + 'static>;

/// Combine the n-th value of every source into one output.
///
/// The result is as long as the shortest source: a source that completed
/// with nothing left queued completes the zip.
pub fn zip<T, R, I, F>(sources: I, combiner: F) -> Observable<R>
where
    T: Send + 'static,
    R: Send + 'static,
    I: IntoIterator<Item = Observable<T>>,
    F: Fn(Vec<T>) -> R + Send + Sync + 'static,
{
    try_zip(sources, move |row| Ok(combiner(row)))
}

/// `zip` with a fallible combiner; a failure terminates the stream with an
/// operator error.
pub fn try_zip<T, R, I, F>(sources: I, combiner: F) -> Observable<R>
where
    T: Send + 'static,
    R: Send + 'static,
    I: IntoIterator<Item = Observable<T>>,
    F: Fn(Vec<T>) -> anyhow::Result<R> + Send + Sync + 'static,
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

        let zip = Arc::new(ZipState {
            out: Serialized::new(downstream),
            rows: Mutex::new(Rows {
                queues: (0..n).map(|_| VecDeque::new()).collect(),
                completed: vec![false; n],
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
                Box::new(ZipObserver {
                    zip: zip.clone(),
                    index,
                }),
                token.child(),
            );
        }
    })
}

impl<T: Send + 'static> Observable<T> {
    /// Pair values of `self` and `other` by position.
    pub fn zip_with<U, R, F>(&self, other: &Observable<U>, combiner: F) -> Observable<R>
    where
        U: Send + 'static,
        R: Send + 'static,
        F: Fn(T, U) -> R + Send + Sync + 'static,
    {
        try_zip(
            [self.map(Pair::Left), other.map(Pair::Right)],
            move |mut row: Vec<Pair<T, U>>| match (row.pop(), row.pop()) {
                (Some(Pair::Right(b)), Some(Pair::Left(a))) => Ok(combiner(a, b)),
                _ => Err(anyhow::anyhow!("zip row out of shape")),
            },
        )
    }
}

struct Rows<T> {
    queues: Vec<VecDeque<T>>,
    completed: Vec<bool>,
    finished: bool,
}

impl<T> Rows<T> {
    fn exhausted(&self) -> bool {
        self.queues
            .iter()
            .zip(&self.completed)
            .any(|(queue, done)| *done && queue.is_empty())
    }
}

struct ZipState<T, R> {
    out: Arc<Serialized<R>>,
    rows: Mutex<Rows<T>>,
    combiner: Combiner<T, R>,
    token: Disposable,
}

impl<T: Send + 'static, R: Send + 'static> ZipState<T, R> {
    fn on_next(&self, index: usize, value: T) {
        let mut rows = self.rows.lock();
        if rows.finished {
            return;
        }
        rows.queues[index].push_back(value);

        // Enqueued under the lock so rows leave in order.
        while rows.queues.iter().all(|q| !q.is_empty()) {
            let row: Vec<T> = rows.queues.iter_mut().filter_map(VecDeque::pop_front).collect();
            match (self.combiner)(row) {
                Ok(out) => self.out.enqueue(Signal::Next(out)),
                Err(err) => {
                    rows.finished = true;
                    self.out.enqueue(Signal::Error(RxError::operator(err)));
                    break;
                }
            }
        }
        if !rows.finished && rows.exhausted() {
            rows.finished = true;
            self.out.enqueue(Signal::Complete);
        }

        let finished = rows.finished;
        drop(rows);
        self.out.drain();
        if finished {
            self.token.dispose();
        }
    }

    fn on_complete(&self, index: usize) {
        let mut rows = self.rows.lock();
        if rows.finished {
            return;
        }
        rows.completed[index] = true;
        if rows.queues[index].is_empty() {
            rows.finished = true;
            self.out.enqueue(Signal::Complete);
            drop(rows);
            self.out.drain();
            self.token.dispose();
        }
    }

    fn on_error(&self, err: RxError) {
        let mut rows = self.rows.lock();
        if rows.finished {
            return;
        }
        rows.finished = true;
        self.out.enqueue(Signal::Error(err));
        drop(rows);
        self.out.drain();
        self.token.dispose();
    }
}

struct ZipObserver<T, R> {
    zip: Arc<ZipState<T, R>>,
    index: usize,
}

impl<T: Send + 'static, R: Send + 'static> Observer<T> for ZipObserver<T, R> {
    fn on_signal(&mut self, signal: Signal<T>) {
        match signal {
            Signal::Next(v) => self.zip.on_next(self.index, v),
            Signal::Error(e) => self.zip.on_error(e),
            Signal::Complete => self.zip.on_complete(self.index),
        }
    }
}
