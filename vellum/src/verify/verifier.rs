use crate::client::DocumentClient;
use crate::common::{Document, DEFAULT_POLL_INTERVAL, DEFAULT_VERIFY_TIMEOUT};
use crate::verify::Matcher;
use std::time::{Duration, Instant};

/// Where the verifier reads the current documents from.
pub trait DocumentSource {
    /// A snapshot of every document; empty when the source cannot be read.
    fn documents(&self) -> Vec<Document>;
}

impl<F> DocumentSource for F
where
    F: Fn() -> Vec<Document>,
{
    fn documents(&self) -> Vec<Document> {
        self()
    }
}

/// A collection read through a [DocumentClient].
#[derive(Clone)]
pub struct CollectionTarget {
    client: DocumentClient,
    database: String,
    collection: String,
}

impl CollectionTarget {
    pub fn new(client: DocumentClient, database: &str, collection: &str) -> Self {
        CollectionTarget {
            client,
            database: database.to_string(),
            collection: collection.to_string(),
        }
    }
}

impl DocumentSource for CollectionTarget {
    fn documents(&self) -> Vec<Document> {
        self.client
            .find_all_documents(&self.database, &self.collection)
    }
}

/// Polling budget of a [ConsistencyVerifier].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VerifierConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        VerifierConfig {
            timeout: DEFAULT_VERIFY_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Waits for expected records to show up in a store.
///
/// The verifier keeps a checklist of expected items and removes an item only
/// once a fetched document matches it. It polls until the checklist is empty
/// or the deadline passes and returns whatever is left, so an empty result
/// means everything arrived and a non-empty one names exactly what did not.
/// A slow store can make an item look missing; a missing item never looks
/// present.
///
/// The verifier holds no store state: any number of verifications may run
/// concurrently.
///
/// # Examples
///
/// ```rust,ignore
/// let verifier = ConsistencyVerifier::default();
/// let target = CollectionTarget::new(client, "eiffel", "event_object_map");
/// let missing = verifier.verify(&target, &event_ids, &IdentityMatch);
/// assert!(missing.is_empty(), "events never arrived: {:?}", missing);
/// ```
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsistencyVerifier {
    config: VerifierConfig,
}

impl ConsistencyVerifier {
    pub fn new(config: VerifierConfig) -> Self {
        ConsistencyVerifier { config }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verifies within the configured timeout.
    pub fn verify<S, M>(&self, source: &S, expected: &[String], matcher: &M) -> Vec<String>
    where
        S: DocumentSource + ?Sized,
        M: Matcher + ?Sized,
    {
        self.verify_within(source, expected, matcher, self.config.timeout)
    }

    /// Polls `source` until every expected item is matched or `timeout`
    /// elapses, and returns the unmatched items in their original order.
    ///
    /// An empty `expected` returns at once without reading the source. The
    /// source is always read at least once, even with a zero timeout.
    pub fn verify_within<S, M>(
        &self,
        source: &S,
        expected: &[String],
        matcher: &M,
        timeout: Duration,
    ) -> Vec<String>
    where
        S: DocumentSource + ?Sized,
        M: Matcher + ?Sized,
    {
        let mut checklist = expected.to_vec();
        if checklist.is_empty() {
            return checklist;
        }

        let deadline = Instant::now() + timeout;
        loop {
            for document in source.documents() {
                checklist.retain(|item| !matcher.matches(&document, item));
                if checklist.is_empty() {
                    return checklist;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            log::debug!("{} items still missing, polling again", checklist.len());
            std::thread::sleep(self.config.poll_interval.min(deadline - now));
        }

        log::warn!("Verification timed out after {:?}, missing: {:?}", timeout, checklist);
        checklist
    }
}
