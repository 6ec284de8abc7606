//! DTMF tones and abortable tone sequences.
//!
//! A sequence is validated in full before the first tone goes out, so a bad
//! character anywhere means nothing is sent. Between tones the sender sleeps
//! for the gap and checks the abort signal both before each tone and while
//! sleeping.

use sipmesh_infra_common::sync::abort;
use sipmesh_infra_common::{AbortSignal, OperationGuard};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DtmfConfig;
use crate::errors::{ClientError, Result};
use crate::signaling::CallSession;

const OPERATION: &str = "DTMF";

/// Normalize and check one tone; lowercase `a`-`d` are accepted
pub fn validate_tone(tone: char) -> Result<char> {
    let tone = tone.to_ascii_uppercase();
    match tone {
        '0'..='9' | 'A'..='D' | '*' | '#' => Ok(tone),
        _ => Err(ClientError::InvalidDtmfTone { tone }),
    }
}

/// Check every tone of `tones`, failing on the first bad one
pub fn validate_sequence(tones: &str) -> Result<Vec<char>> {
    tones.chars().map(validate_tone).collect()
}

/// Send one already-validated tone. A transport without DTMF is a no-op.
pub(crate) async fn send_validated(session: &dyn CallSession, tone: char) -> Result<bool> {
    match session.dtmf_sender() {
        Some(sender) => {
            sender.send_tone(tone).await?;
            debug!("Sent DTMF '{}' on {}", tone, session.id());
            Ok(true)
        }
        None => {
            debug!("Call {} has no DTMF sender, dropping '{}'", session.id(), tone);
            Ok(false)
        }
    }
}

/// Tone sender bound to one call
pub struct DtmfSequencer {
    session: Arc<dyn CallSession>,
    config: DtmfConfig,
    guard: OperationGuard,
}

impl DtmfSequencer {
    pub fn new(session: Arc<dyn CallSession>, config: DtmfConfig) -> Self {
        Self {
            session,
            config,
            guard: OperationGuard::new(OPERATION),
        }
    }

    pub fn session(&self) -> &Arc<dyn CallSession> {
        &self.session
    }

    /// Whether a sequence is currently being sent
    pub fn is_busy(&self) -> bool {
        self.guard.is_busy()
    }

    /// Send a single tone
    pub async fn send_dtmf(&self, tone: char) -> Result<()> {
        let tone = validate_tone(tone)?;
        send_validated(self.session.as_ref(), tone).await?;
        Ok(())
    }

    /// Send `tones` one at a time, `gap` apart (the configured default when
    /// `None`). Returns the number of tones sent.
    ///
    /// A second sequence on the same call while one is running fails with
    /// "DTMF operation already in progress". An abort fails with
    /// [`ClientError::Aborted`] even if some tones already went out.
    pub async fn send_dtmf_sequence(
        &self,
        tones: &str,
        gap: Option<Duration>,
        signal: Option<&AbortSignal>,
    ) -> Result<usize> {
        let tones = validate_sequence(tones)?;
        let _permit = self.guard.try_acquire()?;
        let gap = gap.unwrap_or(self.config.default_gap);

        for (index, tone) in tones.iter().enumerate() {
            abort::check(signal, OPERATION)?;
            send_validated(self.session.as_ref(), *tone).await?;
            if index + 1 < tones.len() {
                abort::sleep(gap, signal, OPERATION).await?;
            }
        }
        info!("Sent DTMF sequence of {} tone(s) on {}", tones.len(), self.session.id());
        Ok(tones.len())
    }
}
