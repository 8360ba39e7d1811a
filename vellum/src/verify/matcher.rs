use crate::common::Document;

/// Decides whether an observed document satisfies one expected checklist item.
///
/// A matcher must only return `true` for a confirmed match; the verifier
/// removes every item a matcher accepts.
pub trait Matcher: Send + Sync {
    fn matches(&self, observed: &Document, expected: &str) -> bool;
}

impl<F> Matcher for F
where
    F: Fn(&Document, &str) -> bool + Send + Sync,
{
    fn matches(&self, observed: &Document, expected: &str) -> bool {
        self(observed, expected)
    }
}

/// Matches when the document's `_id` equals the expected identifier.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityMatch;

impl Matcher for IdentityMatch {
    fn matches(&self, observed: &Document, expected: &str) -> bool {
        observed
            .id()
            .is_some_and(|id| id.to_plain_string() == expected)
    }
}

/// Matches when the serialized document contains the expected text.
///
/// Useful for derived records whose exact shape the caller does not know.
#[derive(Clone, Copy, Debug, Default)]
pub struct ContainmentMatch;

impl Matcher for ContainmentMatch {
    fn matches(&self, observed: &Document, expected: &str) -> bool {
        observed.to_json().contains(expected)
    }
}
