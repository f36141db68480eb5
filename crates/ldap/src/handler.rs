use crate::{
    bind,
    core::error::{LdapError, LdapResult},
    search::{self, make_search_error},
    session::{Session, SessionState},
};
use idbridge_domain_handlers::handler::BackendHandler;
use ldap3_proto::proto::{
    LdapBindRequest, LdapBindResponse, LdapExtendedRequest, LdapExtendedResponse, LdapOp,
    LdapResult as LdapResultOp, LdapResultCode, LdapSearchRequest, OID_WHOAMI,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

fn make_result(code: LdapResultCode, message: String) -> LdapResultOp {
    LdapResultOp {
        code,
        matcheddn: "".to_string(),
        message,
        referral: vec![],
    }
}

pub(crate) fn make_extended_response(code: LdapResultCode, message: String) -> LdapOp {
    LdapOp::ExtendedResponse(LdapExtendedResponse {
        res: make_result(code, message),
        name: None,
        value: None,
    })
}

pub(crate) fn make_bind_response(code: LdapResultCode, message: String) -> LdapOp {
    LdapOp::BindResponse(LdapBindResponse {
        res: make_result(code, message),
        saslcreds: None,
    })
}

/// Response to an operation this server does not implement, in the response
/// type the client waits for.
fn make_unsupported_response(op: &LdapOp) -> LdapOp {
    let code = LdapResultCode::UnwillingToPerform;
    match op {
        LdapOp::AddRequest(_) => {
            LdapOp::AddResponse(make_result(code, "Unsupported operation: add".to_string()))
        }
        LdapOp::DelRequest(_) => {
            LdapOp::DelResponse(make_result(code, "Unsupported operation: delete".to_string()))
        }
        LdapOp::ModifyRequest(_) => LdapOp::ModifyResponse(make_result(
            code,
            "Unsupported operation: modify".to_string(),
        )),
        LdapOp::ModifyDNRequest(_) => LdapOp::ModifyDNResponse(make_result(
            code,
            "Unsupported operation: modify DN".to_string(),
        )),
        LdapOp::CompareRequest(_) => LdapOp::CompareResult(make_result(
            code,
            "Unsupported operation: compare".to_string(),
        )),
        op => make_extended_response(code, format!("Unsupported operation: {op:#?}")),
    }
}

pub struct LdapHandler<Backend> {
    session: Session,
    backend_handler: Backend,
}

impl<Backend> LdapHandler<Backend> {
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_uuid(&self) -> &uuid::Uuid {
        self.session.session_id()
    }
}

impl<Backend: BackendHandler> LdapHandler<Backend> {
    pub fn new(
        backend_handler: Backend,
        session_uuid: uuid::Uuid,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            session: Session::new(session_uuid, cancellation),
            backend_handler,
        }
    }

    #[cfg(test)]
    pub fn new_for_tests(backend_handler: Backend) -> Self {
        Self::new(
            backend_handler,
            uuid::Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap(),
            CancellationToken::new(),
        )
    }

    /// A bind always replaces the current identity: a failed one leaves the
    /// session unauthenticated.
    #[instrument(skip_all, level = "debug", fields(dn = %request.dn))]
    pub async fn do_bind(&mut self, request: &LdapBindRequest) -> Vec<LdapOp> {
        let (code, message) = match bind::do_bind(&self.backend_handler, request).await {
            Ok(identity) => {
                self.session.bind(identity);
                (LdapResultCode::Success, "".to_string())
            }
            Err(err) => {
                self.session.reset();
                (err.code, err.message)
            }
        };
        vec![make_bind_response(code, message)]
    }

    #[instrument(skip_all, level = "debug")]
    pub async fn do_search(&mut self, request: &LdapSearchRequest) -> LdapResult<Vec<LdapOp>> {
        if !self.session.is_authenticated() {
            return Err(LdapError {
                code: LdapResultCode::UnwillingToPerform,
                message: "No user currently bound".to_string(),
            });
        }
        self.session.set_state(SessionState::SearchInFlight);
        let results = search::do_search(&self.backend_handler, &mut self.session, request).await;
        self.session.set_state(SessionState::Done);
        results
    }

    #[instrument(skip_all, level = "debug")]
    fn do_extended_request(&self, request: &LdapExtendedRequest) -> Vec<LdapOp> {
        match request.name.as_str() {
            OID_WHOAMI => {
                let authz_id = self
                    .session
                    .bound_identity()
                    .map(|identity| format!("dn:cn={},ou={}", identity.name, identity.organization))
                    .unwrap_or_default();
                vec![make_extended_response(LdapResultCode::Success, authz_id)]
            }
            _ => vec![make_extended_response(
                LdapResultCode::UnwillingToPerform,
                format!("Unsupported extended operation: {}", &request.name),
            )],
        }
    }

    /// Handles one request. Returns the responses to send, or `None` when
    /// the connection should be closed.
    pub async fn handle_ldap_message(&mut self, ldap_op: LdapOp) -> Option<Vec<LdapOp>> {
        let request_cancellation = self.session.cancellation_token().child_token();
        self.handle_cancellable_ldap_message(ldap_op, request_cancellation)
            .await
    }

    /// Same as [`Self::handle_ldap_message`], with a token that abandons only
    /// this request. It must be a child of the session's token.
    pub async fn handle_cancellable_ldap_message(
        &mut self,
        ldap_op: LdapOp,
        request_cancellation: CancellationToken,
    ) -> Option<Vec<LdapOp>> {
        self.session.start_request(request_cancellation);
        if self.session.state() == SessionState::Done {
            self.session.set_state(SessionState::Bound);
        }
        Some(match ldap_op {
            LdapOp::BindRequest(request) => self.do_bind(&request).await,
            LdapOp::SearchRequest(request) => self
                .do_search(&request)
                .await
                .unwrap_or_else(|e: LdapError| vec![make_search_error(e.code, e.message)]),
            LdapOp::UnbindRequest => {
                debug!(
                    "Unbind request for {}",
                    self.session
                        .bound_identity()
                        .map(|identity| identity.identity_id().into_string())
                        .unwrap_or_else(|| "<not bound>".to_string()),
                );
                self.session.reset();
                // No need to notify on unbind (per rfc4511)
                return None;
            }
            LdapOp::AbandonRequest(message_id) => {
                // The connection worker cancels in-flight requests, this one is already done.
                debug!("Abandon request for message {message_id}, nothing to abandon");
                Vec::new()
            }
            LdapOp::ExtendedRequest(request) => self.do_extended_request(&request),
            op => vec![make_unsupported_response(&op)],
        })
    }
}
