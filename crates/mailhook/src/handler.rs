//! Ordered handler registry.

use crate::config::HandlerFailure;
use crate::error::{Error, Result};
use crate::record::EmailRecord;

/// Callback invoked once per new email.
pub type Handler = Box<dyn Fn(&EmailRecord) -> anyhow::Result<()> + Send + Sync>;

/// Handlers in registration order.
///
/// Registration appends; there is no removal and no de-duplication, so a
/// handler registered twice runs twice.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Handler>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a handler.
    pub fn register<F>(&mut self, handler: F)
    where
        F: Fn(&EmailRecord) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handlers.push(Box::new(handler));
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs every handler on `record`, in registration order.
    ///
    /// # Errors
    ///
    /// With [`HandlerFailure::Propagate`], the first failure stops dispatch
    /// and is returned as [`Error::Handler`]. With
    /// [`HandlerFailure::Isolate`], failures are logged and never returned.
    pub fn dispatch(&self, record: &EmailRecord, on_failure: HandlerFailure) -> Result<()> {
        for (index, handler) in self.handlers.iter().enumerate() {
            if let Err(source) = handler(record) {
                match on_failure {
                    HandlerFailure::Propagate => return Err(Error::Handler { index, source }),
                    HandlerFailure::Isolate => {
                        tracing::warn!(index, title = %record.title, "handler failed: {source:#}");
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn recording(log: &Arc<Mutex<Vec<String>>>, name: &'static str, fail: bool) -> Handler {
        let log = Arc::clone(log);
        Box::new(move |record: &EmailRecord| {
            log.lock().unwrap().push(format!("{name}:{}", record.title));
            if fail {
                anyhow::bail!("{name} refused");
            }
            Ok(())
        })
    }

    fn registry(log: &Arc<Mutex<Vec<String>>>) -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.handlers.push(recording(log, "first", false));
        registry.handlers.push(recording(log, "second", true));
        registry.handlers.push(recording(log, "third", false));
        registry
    }

    fn record() -> EmailRecord {
        EmailRecord {
            title: "hello".to_string(),
            ..EmailRecord::default()
        }
    }

    #[test]
    fn test_dispatch_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = HandlerRegistry::new();
        assert!(registry.is_empty());

        for _ in 0..2 {
            let log = Arc::clone(&log);
            registry.register(move |r| {
                log.lock().unwrap().push(r.title.clone());
                Ok(())
            });
        }
        assert_eq!(registry.len(), 2);

        registry.dispatch(&record(), HandlerFailure::Propagate).unwrap();
        assert_eq!(*log.lock().unwrap(), vec!["hello", "hello"]);
    }

    #[test]
    fn test_propagate_stops_at_first_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let err = registry(&log)
            .dispatch(&record(), HandlerFailure::Propagate)
            .unwrap_err();

        assert!(matches!(err, Error::Handler { index: 1, .. }));
        assert_eq!(*log.lock().unwrap(), vec!["first:hello", "second:hello"]);
    }

    #[test]
    fn test_isolate_runs_everything() {
        let log = Arc::new(Mutex::new(Vec::new()));
        registry(&log)
            .dispatch(&record(), HandlerFailure::Isolate)
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:hello", "second:hello", "third:hello"]
        );
    }
}
