//! Fixture events and the publisher they are delivered through.
//!
//! Fixture files are JSON objects mapping an event name to an event. Every
//! event carries its identifier at `meta.id`, which is what the identity
//! verifier later looks for in the store.

use crate::errors::{ErrorKind, StoreError, StoreResult};
use serde_json::{Map, Value as JsonValue};
use std::path::Path;

/// Delivers a serialized event into the pipeline under test.
pub trait EventPublisher {
    fn publish(&self, payload: &str) -> StoreResult<()>;
}

/// Named events loaded from a fixture file.
#[derive(Clone, Debug, Default)]
pub struct FixtureEvents {
    events: Map<String, JsonValue>,
}

impl FixtureEvents {
    pub fn from_file(path: impl AsRef<Path>) -> StoreResult<FixtureEvents> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            log::error!("Failed to read fixture file {}: {}", path.display(), e);
            StoreError::new(
                &format!("Failed to read fixture file {}", path.display()),
                ErrorKind::BadInputError,
            )
        })?;
        FixtureEvents::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(json: &str) -> StoreResult<FixtureEvents> {
        match serde_json::from_str::<JsonValue>(json)? {
            JsonValue::Object(events) => Ok(FixtureEvents { events }),
            other => {
                log::error!("Fixture root must be an object, found {}", other);
                Err(StoreError::new(
                    "Fixture root must be a JSON object of named events",
                    ErrorKind::BadInputError,
                ))
            }
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.events.keys()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The ids and serialized payloads of the named events, in the order the
    /// names are given.
    ///
    /// # Errors
    ///
    /// Returns a `BadInputError` for an unknown name or an event without a
    /// string `meta.id`.
    pub fn select(&self, names: &[&str]) -> StoreResult<(Vec<String>, Vec<String>)> {
        let mut ids = Vec::with_capacity(names.len());
        let mut payloads = Vec::with_capacity(names.len());
        for name in names {
            let event = self.events.get(*name).ok_or_else(|| {
                log::error!("Fixture has no event named {}", name);
                StoreError::new(
                    &format!("Unknown fixture event '{}'", name),
                    ErrorKind::BadInputError,
                )
            })?;
            let id = event
                .pointer("/meta/id")
                .and_then(JsonValue::as_str)
                .ok_or_else(|| {
                    log::error!("Fixture event {} has no meta.id", name);
                    StoreError::new(
                        &format!("Fixture event '{}' has no meta.id", name),
                        ErrorKind::BadInputError,
                    )
                })?;
            ids.push(id.to_string());
            payloads.push(event.to_string());
        }
        Ok((ids, payloads))
    }
}

/// Publishes the named fixture events and returns their ids.
///
/// Stops at the first failure; events published before it stay published.
pub fn send_events<P>(fixtures: &FixtureEvents, names: &[&str], publisher: &P) -> StoreResult<Vec<String>>
where
    P: EventPublisher + ?Sized,
{
    let (ids, payloads) = fixtures.select(names)?;
    for (id, payload) in ids.iter().zip(payloads.iter()) {
        publisher.publish(payload)?;
        log::debug!("Published fixture event {}", id);
    }
    Ok(ids)
}
