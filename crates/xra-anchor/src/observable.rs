//! Synchronous notification channel.
//!
//! Observers run inline, in registration order, on the thread that calls
//! [`Observable::notify_observers`]. That is what lets the anchor system
//! promise cross-channel ordering (removals before additions) per frame.

/// Handle returned by [`Observable::add`]; pass it to [`Observable::remove`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

pub type Observer<T> = Box<dyn FnMut(&T) + Send>;

pub struct Observable<T> {
    observers: Vec<(ObserverId, Observer<T>)>,
    next_id: u64,
}

impl<T> Observable<T> {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
            next_id: 0,
        }
    }

    pub fn add<F>(&mut self, observer: F) -> ObserverId
    where
        F: FnMut(&T) + Send + 'static,
    {
        let id = ObserverId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Returns `true` if the observer was registered.
    pub fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(oid, _)| *oid != id);
        self.observers.len() < before
    }

    /// Drop every observer. Ids handed out earlier stay unique.
    pub fn clear(&mut self) {
        self.observers.clear();
    }

    pub fn notify_observers(&mut self, value: &T) {
        for (_, observer) in self.observers.iter_mut() {
            observer(value);
        }
    }

    pub fn has_observers(&self) -> bool {
        !self.observers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl<T> Default for Observable<T> {
    fn default() -> Self {
        Self::new()
    }
}
