use crate::disposable::Disposable;
use crate::error::RxError;
use crate::observable::Observable;
use crate::observer::{BoxObserver, DisposeOnTerminal, Observer, Serialized};
use crate::signal::Signal;
use ahash::AHashMap;
use parking_lot::Mutex;
use std::fmt;
use std::hash::Hash;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const ERR_GROUP_RESUBSCRIBED: &str = "a group accepts a single subscriber";

/// A sub-stream of [`Observable::group_by`] holding every value that mapped
/// to `key`.
///
/// Values queue up until the group is subscribed. A group dropped without
/// ever being subscribed discards its values, and later values for its key
/// are dropped too.
pub struct GroupedObservable<K, T> {
    key: K,
    observable: Observable<T>,
}

impl<K: Clone, T> Clone for GroupedObservable<K, T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            observable: self.observable.clone(),
        }
    }
}

impl<K, T> GroupedObservable<K, T> {
    #[inline]
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn into_observable(self) -> Observable<T> {
        self.observable
    }
}

impl<K, T> Deref for GroupedObservable<K, T> {
    type Target = Observable<T>;

    fn deref(&self) -> &Observable<T> {
        &self.observable
    }
}

impl<K: fmt::Debug, T> fmt::Debug for GroupedObservable<K, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupedObservable").field("key", &self.key).finish()
    }
}

impl<T: Send + 'static> Observable<T> {
    pub fn group_by<K, F>(&self, key: F) -> Observable<GroupedObservable<K, T>>
    where
        K: Clone + Eq + Hash + Send + Sync + 'static,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        self.try_group_by(move |v| Ok(key(v)))
    }

    /// Split the stream by key. A failing key function terminates every
    /// open group and the outer stream with the same operator error.
    ///
    /// Disposing the outer subscription stops new groups from being
    /// emitted; the source keeps running while subscribed groups are alive.
    pub fn try_group_by<K, F>(&self, key: F) -> Observable<GroupedObservable<K, T>>
    where
        K: Clone + Eq + Hash + Send + Sync + 'static,
        F: Fn(&T) -> anyhow::Result<K> + Send + Sync + 'static,
    {
        let key_fn = Arc::new(key);
        self.stage(move |upstream, mut downstream, token| {
            downstream.on_subscribe(token.clone());

            let shared = Arc::new(Shared {
                groups: Mutex::new(AHashMap::new()),
                refs: AtomicUsize::new(1),
                upstream: Disposable::new(),
            });
            {
                let shared = shared.clone();
                token.add_teardown(move || shared.release());
            }

            let key_fn = key_fn.clone();
            let observer = GroupByObserver {
                downstream,
                key_fn: Box::new(move |v: &T| key_fn(v)),
                shared: shared.clone(),
                token,
                done: false,
            };
            upstream.subscribe_inner(Box::new(observer), shared.upstream.clone());
        })
    }
}

struct Group<T> {
    out: Arc<Serialized<T>>,
    subscribed: AtomicBool,
    released: AtomicBool,
}

struct Shared<K, T> {
    groups: Mutex<AHashMap<K, Arc<Group<T>>>>,
    /// The outer subscription plus every live group.
    refs: AtomicUsize,
    upstream: Disposable,
}

impl<K, T> Shared<K, T> {
    fn release(&self) {
        if self.refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            tracing::trace!("group_by: no consumers left, disposing source");
            self.upstream.dispose();
        }
    }

    fn release_group(&self, group: &Group<T>) {
        if !group.released.swap(true, Ordering::AcqRel) {
            self.release();
        }
    }
}

/// Keeps an unsubscribed group alive; dropping the last copy abandons it.
struct GroupHandle<K, T: 'static> {
    group: Arc<Group<T>>,
    shared: Arc<Shared<K, T>>,
}

impl<K, T: 'static> Drop for GroupHandle<K, T> {
    fn drop(&mut self) {
        if !self.group.subscribed.load(Ordering::Acquire) {
            self.group.out.discard();
            self.shared.release_group(&self.group);
        }
    }
}

fn group_observable<K, T>(handle: Arc<GroupHandle<K, T>>) -> Observable<T>
where
    K: Send + Sync + 'static,
    T: Send + 'static,
{
    Observable::from_fn(move |mut observer, token| {
        observer.on_subscribe(token.clone());
        let group = handle.group.clone();
        if group.subscribed.swap(true, Ordering::AcqRel) {
            observer.on_error(RxError::Protocol(ERR_GROUP_RESUBSCRIBED));
            token.dispose();
            return;
        }
        {
            let (group, shared) = (group.clone(), handle.shared.clone());
            token.add_teardown(move || {
                group.out.discard();
                shared.release_group(&group);
            });
        }
        group.out.attach(Box::new(DisposeOnTerminal {
            inner: observer,
            token,
        }));
    })
}

type KeyFn<T, K> = Box<dyn Fn(&T) -> anyhow::Result<K> + Send + 'static>;

struct GroupByObserver<K, T> {
    downstream: BoxObserver<GroupedObservable<K, T>>,
    key_fn: KeyFn<T, K>,
    shared: Arc<Shared<K, T>>,
    token: Disposable,
    done: bool,
}

impl<K, T> GroupByObserver<K, T>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    T: Send + 'static,
{
    fn on_value(&mut self, value: T) {
        let key = match (self.key_fn)(&value) {
            Ok(key) => key,
            Err(err) => {
                self.finish(Signal::Error(RxError::operator(err)));
                self.shared.upstream.dispose();
                return;
            }
        };

        let (group, created) = {
            let mut groups = self.shared.groups.lock();
            match groups.get(&key) {
                Some(group) => (group.clone(), false),
                None => {
                    if self.token.is_disposed() {
                        return;
                    }
                    let group = Arc::new(Group {
                        out: Serialized::detached(),
                        subscribed: AtomicBool::new(false),
                        released: AtomicBool::new(false),
                    });
                    groups.insert(key.clone(), group.clone());
                    self.shared.refs.fetch_add(1, Ordering::AcqRel);
                    (group, true)
                }
            }
        };

        if created {
            let handle = Arc::new(GroupHandle {
                group: group.clone(),
                shared: self.shared.clone(),
            });
            self.downstream.on_next(GroupedObservable {
                key,
                observable: group_observable(handle),
            });
        }
        group.out.push(Signal::Next(value));
    }

    fn finish(&mut self, terminal: Signal<GroupedObservable<K, T>>) {
        self.done = true;
        let groups: Vec<_> = self.shared.groups.lock().values().cloned().collect();
        for group in groups {
            let signal = match &terminal {
                Signal::Error(e) => Signal::Error(e.clone()),
                _ => Signal::Complete,
            };
            group.out.push(signal);
        }
        if !self.token.is_disposed() {
            self.downstream.on_signal(terminal);
        }
        self.token.dispose();
    }
}

impl<K, T> Observer<T> for GroupByObserver<K, T>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    T: Send + 'static,
{
    fn on_signal(&mut self, signal: Signal<T>) {
        if self.done {
            return;
        }
        match signal {
            Signal::Next(v) => self.on_value(v),
            Signal::Error(e) => self.finish(Signal::Error(e)),
            Signal::Complete => self.finish(Signal::Complete),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::observer::TestObserver;

    #[test]
    fn groups_preserve_per_key_order() {
        let evens = TestObserver::new();
        let odds = TestObserver::new();
        let keys = TestObserver::new();
        let (e, o, k) = (evens.clone(), odds.clone(), keys.clone());

        Observable::range(1, 10)
            .group_by(|v| v % 2 == 0)
            .subscribe(move |group| {
                k.clone().on_next(*group.key());
                if *group.key() {
                    group.subscribe_with(e.clone());
                } else {
                    group.subscribe_with(o.clone());
                }
            });

        assert_eq!(keys.values(), vec![false, true]);
        assert_eq!(evens.values(), vec![2, 4, 6, 8, 10]);
        assert_eq!(odds.values(), vec![1, 3, 5, 7, 9]);
        assert!(evens.is_completed() && odds.is_completed());
    }

    #[test]
    fn late_subscriber_gets_buffered_items() {
        let groups = Arc::new(Mutex::new(Vec::new()));
        let g = groups.clone();
        Observable::from_iter(vec!["apple", "avocado", "banana", "apricot"])
            .group_by(|s| s.chars().next())
            .subscribe(move |group| g.lock().push(group));

        let groups = groups.lock();
        assert_eq!(groups.len(), 2);
        let to = TestObserver::new();
        groups[0].subscribe_with(to.clone());
        assert_eq!(to.values(), vec!["apple", "avocado", "apricot"]);
        assert!(to.is_completed());
    }

    #[test]
    fn key_error_terminates_outer_and_groups() {
        let outer = TestObserver::new();
        let inner = TestObserver::new();
        let i = inner.clone();
        let o = outer.clone();

        Observable::range(1, 5)
            .try_group_by(|v| if *v == 3 { anyhow::bail!("no key for 3") } else { Ok(v % 2) })
            .subscribe_with(crate::observer::LambdaObserver::new(move |group: GroupedObservable<i64, i64>| {
                o.clone().on_next(*group.key());
                if *group.key() == 1 {
                    group.subscribe_with(i.clone());
                }
            }).with_error({
                let outer = outer.clone();
                move |e| outer.clone().on_error(e)
            }));

        assert_eq!(inner.values(), vec![1]);
        assert_eq!(inner.error().unwrap().kind(), ErrorKind::Operator);
        assert_eq!(outer.error().unwrap().kind(), ErrorKind::Operator);
    }

    #[test]
    fn second_group_subscriber_is_rejected() {
        let first = TestObserver::new();
        let second = TestObserver::new();
        let (f, s) = (first.clone(), second.clone());
        Observable::just(1)
            .group_by(|_| 0)
            .subscribe(move |group| {
                group.subscribe_with(f.clone());
                group.subscribe_with(s.clone());
            });
        assert_eq!(first.values(), vec![1]);
        assert_eq!(second.error().unwrap().kind(), ErrorKind::Protocol);
    }

    #[test]
    fn abandoned_group_drops_its_items() {
        let seen = TestObserver::new();
        let s = seen.clone();
        Observable::from_iter(vec![1, 2, 1, 2])
            .group_by(|v| *v)
            .subscribe(move |group| {
                if *group.key() == 2 {
                    group.subscribe_with(s.clone());
                }
            });
        assert_eq!(seen.values(), vec![2, 2]);
    }
}
