use parking_lot::Mutex;

use crate::{Error, Result};

/// Collects terminal errors from concurrent workers.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Mutex<Vec<Error>>,
}

impl ErrorCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, err: Error) {
        self.errors.lock().push(err);
    }

    pub fn len(&self) -> usize {
        self.errors.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.lock().is_empty()
    }

    /// Drain the collector: `Ok(())` when nothing was collected, the error
    /// itself when exactly one was, otherwise every error joined in
    /// collection order.
    pub fn combined(&self) -> Result<()> {
        let mut errors = std::mem::take(&mut *self.errors.lock());

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Error::Joined(errors)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combined() {
        assert!(ErrorCollector::new().combined().is_ok());

        let single = ErrorCollector::new();
        single.add(Error::Cancelled);
        assert!(matches!(single.combined(), Err(Error::Cancelled)));

        let many = ErrorCollector::new();
        many.add(Error::Storage("first".into()));
        many.add(Error::Storage("second".into()));

        let err = many.combined().unwrap_err();
        assert_eq!(err.to_string(), "Storage error: first\nStorage error: second");
    }
}
