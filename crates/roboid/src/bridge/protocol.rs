//! Wire format between an in-app bridge client and its host.
//!
//! Frames are JSON objects, one per message:
//!
//! ```json
//! {"id": 7, "category": "roboidentities", "type": "robohash", "detail": "seed;256"}
//! {"id": 7, "status": "resolved", "detail": "<base64 png>"}
//! {"id": 7, "status": "rejected", "reason": "engine error"}
//! ```
//!
//! Image requests carry `seed;pixels` in `detail`, name requests the bare
//! seed. Responses are matched to requests by `id` only; their order is
//! unspecified.

use crate::{Error, Job, Size};
use core::fmt;
use serde::{Deserialize, Serialize};

/// Category tag carried by every identity request.
pub const CATEGORY: &str = "roboidentities";

/// Per-request identifier used to route a response back to its caller.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CorrelationId {
    Counter(u64),
    Uuid(String),
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationId::Counter(n) => write!(f, "{n}"),
            CorrelationId::Uuid(s) => f.write_str(s),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    Robohash,
    Roboname,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeRequest {
    pub id: CorrelationId,
    pub category: String,
    #[serde(rename = "type")]
    pub kind: RequestKind,
    pub detail: String,
}

impl BridgeRequest {
    /// Decodes one JSON request frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if `frame` is not a request object.
    pub fn from_frame(frame: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(frame)?)
    }

    pub fn to_frame(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn for_job(id: CorrelationId, job: &Job) -> Self {
        let (kind, detail) = match job {
            Job::Image { seed, size } => (RequestKind::Robohash, format!("{seed};{}", size.pixels())),
            Job::Name { seed } => (RequestKind::Roboname, seed.to_string()),
        };
        Self {
            id,
            category: CATEGORY.to_string(),
            kind,
            detail,
        }
    }

    /// Recovers the job described by this request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRequest`] for a foreign category, a missing
    /// pixel suffix or an unsupported pixel size.
    pub fn job(&self) -> crate::Result<Job> {
        if self.category != CATEGORY {
            return Err(Error::InvalidRequest {
                reason: format!("unsupported category `{}`", self.category),
            });
        }

        match self.kind {
            RequestKind::Roboname => Ok(Job::name(self.detail.as_str())),
            RequestKind::Robohash => {
                // Seeds may contain ';', the pixel size is always last.
                let (seed, px) = self.detail.rsplit_once(';').ok_or_else(|| {
                    Error::InvalidRequest {
                        reason: format!("expected `seed;pixels`, got `{}`", self.detail),
                    }
                })?;
                let size = px
                    .parse::<u32>()
                    .ok()
                    .and_then(Size::from_pixels)
                    .ok_or_else(|| Error::InvalidRequest {
                        reason: format!("unsupported pixel size `{px}`"),
                    })?;
                Ok(Job::image(seed, size))
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BridgeResponse {
    Resolved { id: CorrelationId, detail: String },
    Rejected { id: CorrelationId, reason: String },
}

impl BridgeResponse {
    /// Decodes one JSON response frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if `frame` is not a response object.
    pub fn from_frame(frame: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(frame)?)
    }

    pub fn to_frame(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, BridgeResponse::Rejected { .. })
    }

    pub fn id(&self) -> &CorrelationId {
        match self {
            BridgeResponse::Resolved { id, .. } | BridgeResponse::Rejected { id, .. } => id,
        }
    }
}
