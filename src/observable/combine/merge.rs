use crate::observable::Observable;

/// Subscribe to every source at once and forward values as they arrive.
///
/// Completes when all sources completed; the first error cancels the
/// others.
pub fn merge<T, I>(sources: I) -> Observable<T>
where
    T: Send + 'static,
    I: IntoIterator<Item = Observable<T>>,
{
    let sources: Vec<_> = sources.into_iter().collect();
    Observable::from_iter(sources).flat_map(|source| source)
}

impl<T: Send + 'static> Observable<T> {
    pub fn merge_with(&self, other: &Observable<T>) -> Observable<T> {
        merge([self.clone(), other.clone()])
    }
}
