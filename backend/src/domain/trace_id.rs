//! Correlation identifier carried through a request and its spawned work.
//!
//! The identifier lives in tokio task-local storage so log lines and error
//! envelopes can pick it up without threading it through every call.
//! Task-locals do not follow `tokio::spawn`; wrap detached work (for example
//! the idempotency persistence task) in [`TraceId::scope`] to keep the
//! correlation.

use std::future::Future;

use tokio::task_local;
use uuid::Uuid;

/// Response header echoing the request trace identifier.
pub const TRACE_ID_HEADER: &str = "Trace-Id";

task_local! {
    static TRACE_ID: TraceId;
}

/// Per-request trace identifier.
///
/// # Examples
/// ```
/// use mfi_backend::domain::TraceId;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let trace_id = TraceId::from_uuid(uuid::Uuid::nil());
/// let seen = TraceId::scope(trace_id, async { TraceId::current() }).await;
/// assert_eq!(seen, Some(trace_id));
/// # });
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceId(Uuid);

impl TraceId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Accept a client-supplied header value when it is a well-formed UUID.
    ///
    /// Anything else yields `None` so callers fall back to [`TraceId::generate`].
    #[must_use]
    pub fn from_header_value(value: &str) -> Option<Self> {
        Uuid::parse_str(value.trim()).ok().map(Self)
    }

    /// Identifier currently in scope, if any.
    #[must_use]
    pub fn current() -> Option<Self> {
        TRACE_ID.try_with(|id| *id).ok()
    }

    /// Borrow the inner UUID.
    #[must_use]
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Run `fut` with `trace_id` in scope.
    pub async fn scope<Fut>(trace_id: TraceId, fut: Fut) -> Fut::Output
    where
        Fut: Future,
    {
        TRACE_ID.scope(trace_id, fut).await
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TraceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[tokio::test]
    async fn scope_exposes_identifier() {
        let expected = TraceId::generate();
        let observed = TraceId::scope(expected, async { TraceId::current() }).await;
        assert_eq!(observed, Some(expected));
    }

    #[tokio::test]
    async fn nothing_in_scope_by_default() {
        assert!(TraceId::current().is_none());
    }

    #[tokio::test]
    async fn scope_does_not_leak_into_spawned_tasks() {
        let outer = TraceId::generate();
        let seen = TraceId::scope(outer, async {
            tokio::spawn(async { TraceId::current() })
                .await
                .expect("spawned task completes")
        })
        .await;
        assert!(seen.is_none());
    }

    #[rstest]
    #[case("00000000-0000-0000-0000-000000000000", true)]
    #[case(" 3fa85f64-5717-4562-b3fc-2c963f66afa6 ", true)]
    #[case("not-a-uuid", false)]
    #[case("", false)]
    fn header_values_are_parsed_leniently(#[case] raw: &str, #[case] accepted: bool) {
        assert_eq!(TraceId::from_header_value(raw).is_some(), accepted);
    }

    #[test]
    fn display_matches_uuid() {
        let uuid = Uuid::new_v4();
        assert_eq!(TraceId::from_uuid(uuid).to_string(), uuid.to_string());
    }
}
