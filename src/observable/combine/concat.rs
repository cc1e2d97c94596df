use crate::observable::Observable;

/// Run the sources one after another, each starting once the previous
/// one completed.
pub fn concat<T, I>(sources: I) -> Observable<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = Observable<T>>,
{
    let sources: Vec<_> = sources.into_iter().collect();
    Observable::from_iter(sources).concat_map(|source| source)
}

impl<T: Send + 'static> Observable<T> {
    pub fn concat_with(&self, other: &Observable<T>) -> Observable<T> {
        concat([self.clone(), other.clone()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::TestObserver;
    use crate::scheduler::TestScheduler;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn preserves_order_and_count() {
        let parts = vec![vec![1, 2, 3], vec![], vec![4], vec![5, 6]];
        let sources: Vec<_> = parts.iter().cloned().map(Observable::from_iter).collect();
        let out = concat(sources).blocking_collect(Duration::from_secs(1)).unwrap();
        assert_eq!(out, parts.concat());
    }

    #[test]
    fn second_source_starts_after_first_completes() {
        let sched = TestScheduler::new();
        let s: crate::scheduler::SchedulerRef = Arc::new(sched.clone());
        let first = Observable::interval_range(0, 2, Duration::from_millis(10), Duration::from_millis(10), s.clone());
        let second = Observable::interval_range(100, 2, Duration::from_millis(1), Duration::from_millis(1), s);

        let to = TestObserver::new();
        first.concat_with(&second).subscribe_with(to.clone());
        sched.advance_by(Duration::from_millis(15));
        assert_eq!(to.values(), vec![0]);
        sched.advance_by(Duration::from_millis(10));
        assert_eq!(to.values(), vec![0, 1, 100, 101]);
        assert!(to.is_completed());
    }
}
