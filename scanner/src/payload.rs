//! Turning raw scanner input into redemption requests.
//!
//! QR codes carry a URL such as `https://host/scan?ticketId=T1&nonce=abc`.
//! Manual entries are a bare ticket id.

use crate::types::RedemptionRequest;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ledger message recorded for any QR payload that is not a usable ticket.
pub const INVALID_QR_MESSAGE: &str = "Invalid QR code format";

/// Why a QR payload could not become a request
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// The payload is not an absolute URL
    #[error("QR payload is not a URL")]
    NotAUrl,

    /// The URL has no (or an empty) `ticketId` parameter
    #[error("QR payload has no ticket id")]
    MissingTicketId,

    /// The URL has no nonce and the policy requires one
    #[error("QR payload for ticket {ticket_id} has no nonce")]
    MissingNonce {
        /// Ticket id that was found
        ticket_id: String,
    },
}

impl PayloadError {
    /// Ticket id to record in the ledger for this failure
    #[must_use]
    pub fn ledger_ticket_id(&self) -> &str {
        match self {
            Self::NotAUrl | Self::MissingTicketId => crate::types::INVALID_QR_TICKET_ID,
            Self::MissingNonce { ticket_id } => ticket_id,
        }
    }
}

/// What to do with a QR payload that has no `nonce` parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingNoncePolicy {
    /// Send the request with an empty nonce and let the service decide
    #[default]
    PassThrough,
    /// Refuse locally, without calling the service
    Reject,
}

impl std::str::FromStr for MissingNoncePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pass-through" | "passthrough" => Ok(Self::PassThrough),
            "reject" => Ok(Self::Reject),
            other => Err(format!("unknown missing-nonce policy '{other}'")),
        }
    }
}

/// Parse a decoded QR payload into a request.
///
/// Query parameters are percent-decoded; the first occurrence of a
/// parameter wins.
///
/// # Errors
///
/// - [`PayloadError::NotAUrl`] if the payload is not an absolute URL
/// - [`PayloadError::MissingTicketId`] if `ticketId` is absent or blank
/// - [`PayloadError::MissingNonce`] if `nonce` is absent or empty and the
///   policy is [`MissingNoncePolicy::Reject`]
pub fn parse_qr_payload(
    payload: &str,
    policy: MissingNoncePolicy,
) -> Result<RedemptionRequest, PayloadError> {
    let url = Url::parse(payload.trim()).map_err(|_| PayloadError::NotAUrl)?;

    let mut ticket_id = None;
    let mut nonce = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "ticketId" if ticket_id.is_none() => ticket_id = Some(value.trim().to_string()),
            "nonce" if nonce.is_none() => nonce = Some(value.into_owned()),
            _ => {},
        }
    }

    let ticket_id = ticket_id
        .filter(|id| !id.is_empty())
        .ok_or(PayloadError::MissingTicketId)?;

    let nonce = match (nonce.filter(|n| !n.is_empty()), policy) {
        (Some(nonce), _) => nonce,
        (None, MissingNoncePolicy::PassThrough) => String::new(),
        (None, MissingNoncePolicy::Reject) => {
            return Err(PayloadError::MissingNonce { ticket_id });
        },
    };

    Ok(RedemptionRequest::qr(ticket_id, nonce))
}

/// Parse a manual entry. Returns `None` for blank input.
#[must_use]
pub fn parse_manual_entry(input: &str) -> Option<RedemptionRequest> {
    let ticket_id = input.trim();
    if ticket_id.is_empty() {
        None
    } else {
        Some(RedemptionRequest::manual(ticket_id))
    }
}
