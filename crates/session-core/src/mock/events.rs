use sipmesh_infra_common::DispatchEvent;
use std::sync::Arc;

use crate::session::{Originator, Session};
use crate::uri::SipUri;

/// Endpoint-level events
#[derive(Debug, Clone)]
pub enum ServerEvent {
    Connected,
    Disconnected,
    Registered { expires: u32 },
    RegistrationFailed { cause: String },
    Unregistered,
    /// A call leg appeared, either placed locally or arriving from the network
    NewSession {
        session: Arc<Session>,
        from: SipUri,
        to: SipUri,
        originator: Originator,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServerEventKind {
    Connected,
    Disconnected,
    Registered,
    RegistrationFailed,
    Unregistered,
    NewSession,
}

impl DispatchEvent for ServerEvent {
    type Kind = ServerEventKind;

    fn kind(&self) -> ServerEventKind {
        match self {
            ServerEvent::Connected => ServerEventKind::Connected,
            ServerEvent::Disconnected => ServerEventKind::Disconnected,
            ServerEvent::Registered { .. } => ServerEventKind::Registered,
            ServerEvent::RegistrationFailed { .. } => ServerEventKind::RegistrationFailed,
            ServerEvent::Unregistered => ServerEventKind::Unregistered,
            ServerEvent::NewSession { .. } => ServerEventKind::NewSession,
        }
    }
}
