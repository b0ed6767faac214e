#![deny(
    unreachable_pub,
    unsafe_code,
    missing_docs,
    missing_debug_implementations
)]
#![doc = include_str!("../README.md")]

use std::{backtrace::Backtrace, error::Error, fmt};

/// All the methods to render a [`DiagnosticContributor`]
pub mod render;
/// Incidents raised by relays
pub mod relay;

pub use render::{RenderConfig, RenderIncident};

/// Boxed cause of a failure, as accepted by [`DiagnosticFailure::with_cause`]
pub type BoxedCause = Box<dyn Error + Send + Sync + 'static>;

/// An error that can add its own diagnostic text ahead of its trace
///
/// Every concrete incident kind implements this trait. The renderers in [`render`] call
/// [`DiagnosticContributor::contribute_diagnostics`] exactly once per render, put the collected
/// text on its own line and then write the standard trace below it.
///
/// # Warning
///
/// A hook must not panic and must not have side effects beyond writing into the buffer. It runs
/// while a failure is being reported, there is nothing left to report its own failure to.
pub trait DiagnosticContributor: Error + Send + Sync + 'static {
    /// Append kind-specific context to `buf`
    ///
    /// Does nothing by default. A trailing line terminator is fine, the renderer strips one.
    fn contribute_diagnostics(&self, _buf: &mut String) {}

    /// The label written in front of the message in the trace
    fn kind(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Frames captured where this failure was raised, if any
    fn backtrace(&self) -> Option<&Backtrace> {
        None
    }
}

/// The base failure: a message and the failure that caused it
///
/// Once built a `DiagnosticFailure` never changes. Incident kinds usually embed one and delegate
/// [`Error::source`] and [`DiagnosticContributor::backtrace`] to it.
pub struct DiagnosticFailure {
    message: String,
    cause: Option<BoxedCause>,
    backtrace: Backtrace,
}

impl DiagnosticFailure {
    /// Create a failure without a cause
    pub fn new(message: impl Into<String>) -> Self {
        DiagnosticFailure {
            message: message.into(),
            cause: None,
            backtrace: Backtrace::capture(),
        }
    }

    /// Create a failure caused by `cause`
    ///
    /// The cause can be another [`DiagnosticFailure`], any other incident kind or a foreign
    /// [`std::error::Error`].
    pub fn with_cause(message: impl Into<String>, cause: impl Into<BoxedCause>) -> Self {
        DiagnosticFailure {
            message: message.into(),
            cause: Some(cause.into()),
            backtrace: Backtrace::capture(),
        }
    }

    /// What went wrong
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The failure that triggered this one
    pub fn cause(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        self.cause.as_deref()
    }
}

impl fmt::Debug for DiagnosticFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticFailure")
            .field("message", &self.message)
            .field("cause", &self.cause)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for DiagnosticFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for DiagnosticFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn Error + 'static))
    }
}

impl DiagnosticContributor for DiagnosticFailure {
    fn backtrace(&self) -> Option<&Backtrace> {
        Some(&self.backtrace)
    }
}

#[derive(Debug)]
/// An object that recognizes a type-erased error as a [`DiagnosticContributor`]
///
/// Causes are only reachable as `&dyn Error` through [`Error::source`]. Registering a view in
/// [`static@INCIDENT_VIEWS`] lets the trace renderer print a cause with its own kind and
/// diagnostics instead of only its message.
pub struct IncidentView {
    view: for<'a> fn(&'a (dyn Error + 'static)) -> Option<&'a dyn DiagnosticContributor>,
}

fn view<'a, T: DiagnosticContributor>(
    e: &'a (dyn Error + 'static),
) -> Option<&'a dyn DiagnosticContributor> {
    e.downcast_ref::<T>()
        .map(|incident| incident as &dyn DiagnosticContributor)
}

impl IncidentView {
    /// Create a view for a concrete incident kind
    pub const fn of<T: DiagnosticContributor>() -> Self {
        IncidentView { view: view::<T> }
    }

    /// Create a view from a custom lookup
    ///
    /// # Warning
    ///
    /// Only return [`Some`] for errors you actually recognize, the first matching view wins.
    pub const fn custom(
        f: for<'a> fn(&'a (dyn Error + 'static)) -> Option<&'a dyn DiagnosticContributor>,
    ) -> Self {
        IncidentView { view: f }
    }
}

/// The global slice of all known [`IncidentView`]s, consulted for every cause in a trace
#[linkme::distributed_slice]
pub static INCIDENT_VIEWS: [IncidentView] = [..];

#[linkme::distributed_slice(INCIDENT_VIEWS)]
#[allow(unsafe_code)]
static DIAGNOSTIC_FAILURE_VIEW: IncidentView = IncidentView::of::<DiagnosticFailure>();

/// Look an error up in [`static@INCIDENT_VIEWS`]
pub fn as_incident<'a>(e: &'a (dyn Error + 'static)) -> Option<&'a dyn DiagnosticContributor> {
    for known in INCIDENT_VIEWS {
        if let Some(incident) = (known.view)(e) {
            return Some(incident);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use crate::{as_incident, DiagnosticContributor, DiagnosticFailure, IncidentView};

    #[derive(Debug, thiserror::Error)]
    #[error("socket closed")]
    struct SocketClosed;

    #[test]
    fn new_failure_has_no_cause() {
        let failure = DiagnosticFailure::new("relay stopped");

        assert_eq!(failure.message(), "relay stopped");
        assert_eq!(failure.to_string(), "relay stopped");
        assert!(failure.cause().is_none());
        assert!(failure.source().is_none());
    }

    #[test]
    fn cause_is_reachable_through_source() {
        let failure = DiagnosticFailure::with_cause("B", DiagnosticFailure::new("A"));

        let source = failure.source().unwrap();
        assert_eq!(source.to_string(), "A");
        assert!(source.downcast_ref::<DiagnosticFailure>().is_some());
        assert_eq!(failure.cause().unwrap().to_string(), "A");
    }

    #[test]
    fn foreign_errors_can_be_causes() {
        let failure = DiagnosticFailure::with_cause("upload aborted", SocketClosed);

        assert!(failure.source().unwrap().is::<SocketClosed>());
    }

    #[test]
    fn default_hook_contributes_nothing() {
        let mut buf = String::new();
        DiagnosticFailure::new("x").contribute_diagnostics(&mut buf);

        assert!(buf.is_empty());
    }

    #[test]
    fn registered_kinds_are_found() {
        let failure = DiagnosticFailure::new("A");
        let erased: &(dyn Error + 'static) = &failure;

        let found = as_incident(erased).unwrap();
        assert_eq!(found.kind(), failure.kind());
        assert!(as_incident(&SocketClosed).is_none());
    }

    #[test]
    fn custom_views_decide_themselves() {
        let never = IncidentView::custom(|_| None);
        let failures = IncidentView::of::<DiagnosticFailure>();
        let failure = DiagnosticFailure::new("A");

        assert!((never.view)(&failure).is_none());
        assert!((failures.view)(&failure).is_some());
        assert!((failures.view)(&SocketClosed).is_none());
    }

    #[test]
    fn debug_shows_message_and_cause() {
        let failure = DiagnosticFailure::with_cause("B", DiagnosticFailure::new("A"));
        let debug = format!("{failure:?}");

        assert!(debug.contains("\"B\""));
        assert!(debug.contains("\"A\""));
    }
}
