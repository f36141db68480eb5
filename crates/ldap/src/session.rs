use idbridge_domain::types::IdentityId;
use tokio_util::sync::CancellationToken;

/// Authorization level granted by a successful bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionScope {
    User,
    OrgAdmin,
    GlobalAdmin,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundIdentity {
    pub name: String,
    pub organization: String,
    pub scope: SessionScope,
}

impl BoundIdentity {
    pub fn identity_id(&self) -> IdentityId {
        IdentityId::new(&self.organization, &self.name)
    }

    pub fn is_org_admin(&self) -> bool {
        matches!(self.scope, SessionScope::OrgAdmin | SessionScope::GlobalAdmin)
    }

    pub fn is_global_admin(&self) -> bool {
        self.scope == SessionScope::GlobalAdmin
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connected,
    Bound,
    SearchInFlight,
    StreamingResults,
    Done,
}

/// Per-connection state, owned by the connection worker.
///
/// `cancellation` ends the whole session; `request_cancellation` only the
/// request being handled, and is always a child of the former.
#[derive(Debug)]
pub struct Session {
    bound: Option<BoundIdentity>,
    cancellation: CancellationToken,
    request_cancellation: CancellationToken,
    session_id: uuid::Uuid,
    state: SessionState,
}

impl Session {
    pub fn new(session_id: uuid::Uuid, cancellation: CancellationToken) -> Self {
        Self {
            bound: None,
            request_cancellation: cancellation.child_token(),
            cancellation,
            session_id,
            state: SessionState::Connected,
        }
    }

    pub fn session_id(&self) -> &uuid::Uuid {
        &self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn bound_identity(&self) -> Option<&BoundIdentity> {
        self.bound.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.bound.is_some()
    }

    pub fn is_org_admin(&self) -> bool {
        self.bound.as_ref().is_some_and(BoundIdentity::is_org_admin)
    }

    pub fn is_global_admin(&self) -> bool {
        self.bound.as_ref().is_some_and(BoundIdentity::is_global_admin)
    }

    /// Whether the current request was abandoned or the session ended.
    pub fn is_cancelled(&self) -> bool {
        self.request_cancellation.is_cancelled()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Starts a new request, cancelled along with `request_cancellation`.
    pub(crate) fn start_request(&mut self, request_cancellation: CancellationToken) {
        self.request_cancellation = request_cancellation;
    }

    pub(crate) fn bind(&mut self, identity: BoundIdentity) {
        self.bound = Some(identity);
        self.state = SessionState::Bound;
    }

    pub(crate) fn reset(&mut self) {
        self.bound = None;
        self.state = SessionState::Connected;
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }
}
