use std::{backtrace::Backtrace, error::Error, fmt, fmt::Write as _};

use super::{BoxedCause, DiagnosticContributor, DiagnosticFailure, IncidentView, INCIDENT_VIEWS};

/// State of the connection a relay was serving when the incident happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// The handshake had not finished yet
    Connecting,
    /// The connection was established
    Connected,
    /// The peer went away
    Disconnected,
    /// The relay closed the connection itself
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Closed => "closed",
        })
    }
}

#[derive(Debug, Clone, Default, derive_setters::Setters)]
#[setters(strip_option)]
#[non_exhaustive]
/// What is known about the relay that raised an incident
///
/// Construct it with [`RelayContext::default`] and fill it in with the provided setters.
pub struct RelayContext {
    /// Identifier of the relay
    pub relay_id: String,
    /// Connection state at the time of the incident, if known
    pub state: Option<ConnectionState>,
    /// How often the operation was retried before giving up
    pub retries: u32,
}

/// An internal incident in a relay
#[derive(Debug)]
pub struct RelayIncident {
    context: RelayContext,
    failure: DiagnosticFailure,
}

impl RelayIncident {
    /// Create an incident without a cause
    pub fn new(context: RelayContext, message: impl Into<String>) -> Self {
        RelayIncident {
            context,
            failure: DiagnosticFailure::new(message),
        }
    }

    /// Create an incident caused by `cause`
    pub fn with_cause(
        context: RelayContext,
        message: impl Into<String>,
        cause: impl Into<BoxedCause>,
    ) -> Self {
        RelayIncident {
            context,
            failure: DiagnosticFailure::with_cause(message, cause),
        }
    }

    /// The relay this incident happened in
    pub fn context(&self) -> &RelayContext {
        &self.context
    }

    /// The underlying failure
    pub fn failure(&self) -> &DiagnosticFailure {
        &self.failure
    }
}

impl fmt::Display for RelayIncident {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.failure, f)
    }
}

impl Error for RelayIncident {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.failure.source()
    }
}

impl DiagnosticContributor for RelayIncident {
    fn contribute_diagnostics(&self, buf: &mut String) {
        if !self.context.relay_id.is_empty() {
            writeln!(buf, "relay: {}", self.context.relay_id).unwrap();
        }

        if let Some(state) = self.context.state {
            writeln!(buf, "connection state: {state}").unwrap();
        }

        if self.context.retries > 0 {
            writeln!(buf, "retries: {}", self.context.retries).unwrap();
        }
    }

    fn kind(&self) -> &str {
        "RelayIncident"
    }

    fn backtrace(&self) -> Option<&Backtrace> {
        DiagnosticContributor::backtrace(&self.failure)
    }
}

#[linkme::distributed_slice(INCIDENT_VIEWS)]
#[allow(unsafe_code)]
static RELAY_INCIDENT_VIEW: IncidentView = IncidentView::of::<RelayIncident>();

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::{ConnectionState, RelayContext, RelayIncident};
    use crate::{render::diagnostic_header, DiagnosticContributor};

    #[test]
    fn header_lists_known_context() {
        let incident = RelayIncident::new(
            RelayContext::default()
                .relay_id("eu-1".to_string())
                .state(ConnectionState::Disconnected)
                .retries(3),
            "lost peer",
        );

        assert_eq!(
            diagnostic_header(&incident),
            "relay: eu-1\nconnection state: disconnected\nretries: 3"
        );
    }

    #[test]
    fn header_skips_unknown_context() {
        let incident = RelayIncident::new(
            RelayContext::default().relay_id("eu-1".to_string()),
            "lost peer",
        );

        assert_eq!(diagnostic_header(&incident), "relay: eu-1");
    }

    #[test]
    fn empty_context_contributes_nothing() {
        let incident = RelayIncident::new(RelayContext::default().retries(0), "lost peer");

        assert_eq!(diagnostic_header(&incident), "");
    }

    #[test]
    fn kind_is_short_name() {
        let incident = RelayIncident::new(RelayContext::default(), "lost peer");

        assert_eq!(incident.kind(), "RelayIncident");
    }

    #[test]
    fn delegates_to_failure() {
        let incident = RelayIncident::with_cause(
            RelayContext::default(),
            "lost peer",
            crate::DiagnosticFailure::new("socket closed"),
        );

        assert_eq!(incident.to_string(), "lost peer");
        assert_eq!(incident.failure().message(), "lost peer");
        assert!(incident.backtrace().is_some());
        assert_eq!(
            std::error::Error::source(&incident).unwrap().to_string(),
            "socket closed"
        );
    }
}
