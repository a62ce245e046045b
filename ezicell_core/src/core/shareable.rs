use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// # A piece of shareable state
/// This struct wraps the common
/// Arc<Mutex<Data>> pattern used
/// for internal mutability for
/// easier usage.
///
/// A poisoned lock is taken over as is: the data guarded
/// here are plain caches and maps, which stay consistent
/// even if a holder panicked.
pub struct Shareable<T>
{
    data: Arc<Mutex<T>>
}

impl<T> Shareable<T>
{
    pub fn new(data: T) -> Self
    {
        Shareable
        {
            data: Arc::new(Mutex::new(data))
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T>
    {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True if both handles guard the same data.
    pub fn ptr_eq(&self, other: &Shareable<T>) -> bool
    {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl<T> Clone for Shareable<T>
{
    fn clone(&self) -> Self
    {
        Shareable
        {
            data: self.data.clone()
        }
    }
}

impl<T: Default> Default for Shareable<T>
{
    fn default() -> Self
    {
        Shareable::new(T::default())
    }
}
