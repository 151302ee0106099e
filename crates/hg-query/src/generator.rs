use tracing::warn;

use hg_graph::{GraphError, GraphResult};

/// Lazy, single-pass sequence of values and in-band errors.
///
/// A failing element does not end the sequence: errors travel alongside
/// values until a consumer decides what to do with them, either failing
/// fast with [`destruct`](Generator::destruct) or skipping them with
/// [`values`](Generator::values).
pub struct Generator<T> {
    inner: Box<dyn Iterator<Item = GraphResult<T>>>,
}

impl<T: 'static> Generator<T> {
    pub fn new<I>(items: I) -> Self
    where
        I: IntoIterator<Item = GraphResult<T>>,
        I::IntoIter: 'static,
    {
        Self {
            inner: Box::new(items.into_iter()),
        }
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    pub fn once(value: T) -> Self {
        Self::new(std::iter::once(Ok(value)))
    }

    pub fn error(err: GraphError) -> Self {
        Self::new(std::iter::once(Err(err)))
    }

    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        I::IntoIter: 'static,
    {
        Self::new(values.into_iter().map(Ok))
    }

    /// One element per independent fetch, failures in-band and in order.
    pub fn from_results(results: Vec<GraphResult<T>>) -> Self {
        Self::new(results)
    }

    /// Build the sequence only when it is first polled.
    pub fn defer<F>(build: F) -> Self
    where
        F: FnOnce() -> Generator<T> + 'static,
    {
        let mut build = Some(build);
        let mut inner: Option<Generator<T>> = None;
        Self::new(std::iter::from_fn(move || {
            if let Some(build) = build.take() {
                inner = Some(build());
            }
            inner.as_mut()?.next()
        }))
    }

    pub fn map<U, F>(self, mut f: F) -> Generator<U>
    where
        U: 'static,
        F: FnMut(T) -> U + 'static,
    {
        Generator::new(self.inner.map(move |item| item.map(&mut f)))
    }

    /// Like [`map`](Generator::map) for fallible steps; a failure becomes
    /// an in-band error.
    pub fn and_then<U, F>(self, mut f: F) -> Generator<U>
    where
        U: 'static,
        F: FnMut(T) -> GraphResult<U> + 'static,
    {
        Generator::new(self.inner.map(move |item| item.and_then(&mut f)))
    }

    /// Replace every value by the elements of the generator `f` builds
    /// from it, keeping order.
    pub fn flat_map<U, F>(self, mut f: F) -> Generator<U>
    where
        U: 'static,
        F: FnMut(T) -> Generator<U> + 'static,
    {
        Generator::new(self.inner.flat_map(move |item| match item {
            Ok(value) => f(value),
            Err(e) => Generator::error(e),
        }))
    }

    pub fn filter<F>(self, mut keep: F) -> Self
    where
        F: FnMut(&T) -> bool + 'static,
    {
        Self::new(self.inner.filter(move |item| match item {
            Ok(value) => keep(value),
            Err(_) => true,
        }))
    }

    /// Filter with a fallible predicate; a failing check is passed on as
    /// an error in place of the value.
    pub fn try_filter<F>(self, mut keep: F) -> Self
    where
        F: FnMut(&T) -> GraphResult<bool> + 'static,
    {
        Self::new(self.inner.filter_map(move |item| match item {
            Ok(value) => match keep(&value) {
                Ok(true) => Some(Ok(value)),
                Ok(false) => None,
                Err(e) => Some(Err(e)),
            },
            Err(e) => Some(Err(e)),
        }))
    }

    pub fn chain(self, other: Generator<T>) -> Self {
        Self::new(self.inner.chain(other.inner))
    }

    /// All values, handing every error to `on_error`.
    ///
    /// This is the handler form of [`destruct`](Generator::destruct): errors
    /// are swallowed after `on_error` sees them.
    pub fn values<F>(self, mut on_error: F) -> Vec<T>
    where
        F: FnMut(GraphError),
    {
        let mut values = Vec::new();
        for item in self.inner {
            match item {
                Ok(value) => values.push(value),
                Err(e) => on_error(e),
            }
        }
        values
    }

    /// All values, logging and skipping errors.
    pub fn values_logged(self) -> Vec<T> {
        self.values(|e| warn!(error = %e, "dropping traversal error"))
    }

    /// All values, or the first error.
    ///
    /// To keep going past errors, use [`values`](Generator::values) or
    /// [`values_logged`](Generator::values_logged).
    pub fn destruct(self) -> GraphResult<Vec<T>> {
        self.inner.collect()
    }
}

impl<T> Iterator for Generator<T> {
    type Item = GraphResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

impl<T> std::fmt::Debug for Generator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn broken(msg: &str) -> GraphError {
        GraphError::Structural(msg.into())
    }

    fn mixed() -> Generator<u32> {
        Generator::from_results(vec![Ok(1), Err(broken("x")), Ok(2), Ok(3)])
    }

    #[test]
    fn errors_do_not_end_the_sequence() {
        let mut errors = 0;
        let values = mixed().map(|v| v * 10).values(|_| errors += 1);
        assert_eq!(values, vec![10, 20, 30]);
        assert_eq!(errors, 1);
    }

    #[test]
    fn destruct_fails_on_first_error() {
        assert!(matches!(mixed().destruct(), Err(GraphError::Structural(m)) if m == "x"));
        assert_eq!(
            Generator::from_values(vec![1, 2]).destruct().unwrap(),
            vec![1, 2]
        );
    }

    #[test]
    fn flat_map_flattens_in_order() {
        let out = Generator::from_values(vec![1u32, 2])
            .flat_map(|v| Generator::from_values(vec![v, v + 100]))
            .destruct()
            .unwrap();
        assert_eq!(out, vec![1, 101, 2, 102]);
    }

    #[test]
    fn filters_keep_errors() {
        let kept = mixed().filter(|v| *v > 1).values_logged();
        assert_eq!(kept, vec![2, 3]);

        let checked = Generator::from_values(vec![1u32, 2, 3])
            .try_filter(|v| {
                if *v == 2 {
                    Err(broken("two"))
                } else {
                    Ok(*v == 3)
                }
            })
            .collect::<Vec<_>>();
        assert_eq!(checked.len(), 2);
        assert!(checked[0].is_err());
        assert_eq!(*checked[1].as_ref().unwrap(), 3);
    }

    #[test]
    fn and_then_turns_failures_in_band() {
        let out: Vec<_> = Generator::from_values(vec![1u32, 0, 4])
            .and_then(|v| if v == 0 { Err(broken("zero")) } else { Ok(8 / v) })
            .collect();
        assert_eq!(out.len(), 3);
        assert!(out[1].is_err());
    }

    #[test]
    fn defer_is_lazy() {
        let built = Rc::new(Cell::new(false));
        let flag = Rc::clone(&built);
        let mut deferred = Generator::defer(move || {
            flag.set(true);
            Generator::from_values(vec![7u32])
        });
        assert!(!built.get());
        assert_eq!(deferred.next().unwrap().unwrap(), 7);
        assert!(built.get());
        assert!(deferred.next().is_none());
    }

    #[test]
    fn chain_and_once() {
        let out = Generator::once(1u32)
            .chain(Generator::error(broken("e")))
            .chain(Generator::empty())
            .collect::<Vec<_>>();
        assert_eq!(out.len(), 2);
    }
}
