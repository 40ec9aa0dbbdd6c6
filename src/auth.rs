//! Authentication flow: composes a pluggable [`AuthHandler`] with the
//! connection state machine.
//!
//! Grounded on the `Authorizing`/`Opened` states and `authorize()` call in
//! `medea-jason`'s `rpc_session.rs` and `rpc/websocket/client.rs`,
//! generalized from the teacher's fixed `JoinRoom` command into a pluggable
//! trait per spec.md §6, with the periodic reauth poll modeled on the
//! teacher's `utils::resettable_delay` timer pattern.

use derive_more::Display;

use crate::{codec::Frame, error::ErrorKind};

/// Status of the authentication flow for the current logical session.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum AuthStatus {
    /// No authentication has been attempted yet.
    #[display(fmt = "unauthenticated")]
    Unauthenticated,
    /// An auth payload has been sent; awaiting a response.
    #[display(fmt = "authenticating")]
    Authenticating,
    /// The last auth attempt succeeded.
    #[display(fmt = "authenticated")]
    Authenticated,
    /// The last auth attempt failed.
    #[display(fmt = "failed")]
    Failed,
}

/// Auth-related state tracked on [`crate::connection::Connection`], per
/// spec.md §3's "Auth state" entity.
#[derive(Clone, Debug, Default)]
pub struct AuthState {
    /// Current status.
    pub status: Option<AuthStatus>,
    /// Token returned by the last successful authentication, if any.
    pub token: Option<String>,
    /// Unix-epoch seconds the current token expires at, if known.
    pub expires_at: Option<u64>,
    /// Unix-epoch seconds of the last successful authentication.
    pub last_authenticated_at: Option<u64>,
}

impl AuthState {
    /// A fresh, unauthenticated [`AuthState`].
    #[must_use]
    pub fn new() -> Self {
        Self { status: Some(AuthStatus::Unauthenticated), ..Self::default() }
    }
}

/// External collaborator supplying auth payload generation and response
/// interpretation, per spec.md §6's "Auth handler interface".
#[cfg_attr(feature = "mockable", mockall::automock)]
pub trait AuthHandler: Send {
    /// Produces the opaque credentials payload to encode into an auth
    /// frame.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason if the payload could not be
    /// generated.
    fn generate_auth_data(&mut self) -> Result<Vec<u8>, String>;

    /// Interprets an inbound message as an auth response.
    ///
    /// Returns `Ok(true)` if it indicates success, `Ok(false)` if it
    /// indicates rejection, or `Err` if `message` isn't an auth response at
    /// all.
    fn handle_auth_response(&mut self, message: &Frame) -> Result<bool, String>;

    /// Whether the current credentials need renewing.
    fn needs_reauthentication(&self) -> bool;
}

/// Composes an [`AuthHandler`] with [`AuthState`] transitions, per spec.md
/// §4.4.
pub struct AuthFlow<H: AuthHandler> {
    handler: H,
    state: AuthState,
    authenticated_once: bool,
}

impl<H: AuthHandler> AuthFlow<H> {
    /// Builds a fresh [`AuthFlow`] around the given handler.
    #[must_use]
    pub fn new(handler: H) -> Self {
        Self { handler, state: AuthState::new(), authenticated_once: false }
    }

    /// Current auth state.
    #[must_use]
    pub fn state(&self) -> &AuthState {
        &self.state
    }

    /// Produces raw auth credentials and transitions `status` to
    /// `authenticating`. The caller encodes the returned bytes into a
    /// [`Frame`] via [`crate::adapter::PlatformAdapter::encode_auth_request`]
    /// per spec.md §6's adapter interface.
    ///
    /// Per spec.md §4.4's invariant, this must be invoked exactly once per
    /// `upgrade_ok`; callers are responsible for calling it only from the
    /// runtime's `upgrade_ok` handler and routing all later activity
    /// through [`Self::check_reauthentication`].
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::EncodeError`] if the handler fails to produce a
    /// payload.
    pub fn authenticate(&mut self) -> Result<Vec<u8>, ErrorKind> {
        let payload = self.handler.generate_auth_data().map_err(|_| ErrorKind::EncodeError)?;
        self.state.status = Some(AuthStatus::Authenticating);
        self.authenticated_once = true;
        Ok(payload)
    }

    /// Delegates interpretation of an inbound message to the handler and
    /// updates `status` accordingly.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::AuthRejected`] if the handler reports rejection,
    /// propagating it so the policy engine can decide on reconnect.
    pub fn handle_auth_response(&mut self, message: &Frame) -> Result<(), ErrorKind> {
        match self.handler.handle_auth_response(message) {
            Ok(true) => {
                self.state.status = Some(AuthStatus::Authenticated);
                Ok(())
            }
            Ok(false) => {
                self.state.status = Some(AuthStatus::Failed);
                Err(ErrorKind::AuthRejected)
            }
            Err(_) => Err(ErrorKind::AuthRejected),
        }
    }

    /// Polled periodically by the runtime's reauth timer. If the handler
    /// reports a renewal is needed, issues a new auth frame without
    /// disturbing the transport.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::EncodeError`] if reauthentication was needed but
    /// the handler failed to produce a new payload.
    pub fn check_reauthentication(&mut self) -> Result<Option<Vec<u8>>, ErrorKind> {
        if !self.handler.needs_reauthentication() {
            return Ok(None);
        }
        let payload = self.authenticate()?;
        Ok(Some(payload))
    }

    /// Whether [`Self::authenticate`] has ever been called.
    #[must_use]
    pub fn has_authenticated_once(&self) -> bool {
        self.authenticated_once
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthFlow, AuthHandler, AuthStatus};
    use crate::codec::Frame;

    struct StubHandler {
        reauth: bool,
    }

    impl AuthHandler for StubHandler {
        fn generate_auth_data(&mut self) -> Result<Vec<u8>, String> {
            Ok(b"token".to_vec())
        }

        fn handle_auth_response(&mut self, _message: &Frame) -> Result<bool, String> {
            Ok(true)
        }

        fn needs_reauthentication(&self) -> bool {
            self.reauth
        }
    }

    #[test]
    fn authenticate_fires_once_and_sets_authenticating() {
        let mut flow = AuthFlow::new(StubHandler { reauth: false });
        assert!(!flow.has_authenticated_once());
        flow.authenticate().unwrap();
        assert_eq!(flow.state().status, Some(AuthStatus::Authenticating));
        assert!(flow.has_authenticated_once());
    }

    #[test]
    fn successful_response_marks_authenticated() {
        let mut flow = AuthFlow::new(StubHandler { reauth: false });
        flow.authenticate().unwrap();
        flow.handle_auth_response(&Frame::Text(b"ok".to_vec())).unwrap();
        assert_eq!(flow.state().status, Some(AuthStatus::Authenticated));
    }

    #[test]
    fn reauth_cycles_without_touching_transport_state() {
        let mut flow = AuthFlow::new(StubHandler { reauth: true });
        flow.authenticate().unwrap();
        flow.handle_auth_response(&Frame::Text(b"ok".to_vec())).unwrap();
        let frame = flow.check_reauthentication().unwrap();
        assert!(frame.is_some());
        assert_eq!(flow.state().status, Some(AuthStatus::Authenticating));
    }

    #[test]
    fn no_reauth_needed_is_a_no_op() {
        let mut flow = AuthFlow::new(StubHandler { reauth: false });
        flow.authenticate().unwrap();
        flow.handle_auth_response(&Frame::Text(b"ok".to_vec())).unwrap();
        assert!(flow.check_reauthentication().unwrap().is_none());
        assert_eq!(flow.state().status, Some(AuthStatus::Authenticated));
    }
}
