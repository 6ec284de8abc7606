use sipmesh_infra_common::DispatchEvent;

use super::types::Originator;

/// Events fired on a single session's dispatch table
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Provisional response (trying/ringing)
    Progress,
    /// Final 2xx; the session is now established
    Accepted,
    /// ACK exchanged
    Confirmed,
    Hold { originator: Originator },
    Unhold { originator: Originator },
    Refer { target: String },
    NewDtmf { tone: char, originator: Originator },
    /// Session could not be set up
    Failed { originator: Originator, cause: String },
    /// Established or ringing session torn down
    Ended { originator: Originator, cause: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    Progress,
    Accepted,
    Confirmed,
    Hold,
    Unhold,
    Refer,
    NewDtmf,
    Failed,
    Ended,
}

impl DispatchEvent for SessionEvent {
    type Kind = SessionEventKind;

    fn kind(&self) -> SessionEventKind {
        match self {
            SessionEvent::Progress => SessionEventKind::Progress,
            SessionEvent::Accepted => SessionEventKind::Accepted,
            SessionEvent::Confirmed => SessionEventKind::Confirmed,
            SessionEvent::Hold { .. } => SessionEventKind::Hold,
            SessionEvent::Unhold { .. } => SessionEventKind::Unhold,
            SessionEvent::Refer { .. } => SessionEventKind::Refer,
            SessionEvent::NewDtmf { .. } => SessionEventKind::NewDtmf,
            SessionEvent::Failed { .. } => SessionEventKind::Failed,
            SessionEvent::Ended { .. } => SessionEventKind::Ended,
        }
    }
}
