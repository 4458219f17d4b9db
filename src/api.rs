//! Collaborator contract: the three game endpoints, their wire types, and the
//! sans-IO request envelope the session hands to its host.
//!
//! The session never performs I/O itself. It queues [`Request`]s; the host
//! sends them however it likes (browser `fetch`, a blocking client, a test
//! double) and feeds the outcome back through `Session::complete_*`. Hosts
//! with a blocking client can implement [`Backend`] and call
//! `Session::pump` instead.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::boosters::{BoosterKind, BoosterRegistry, BoosterState};
use crate::error::ApiError;
use crate::state::{League, Ledger, TapRecord};

pub const TAP_PATH: &str = "/api/tap";
pub const AUTOCLICKER_PATH: &str = "/api/autoclicker/process";
pub const EXPIRY_PATH: &str = "/api/boosters/check-expiry";

/// Header carrying the caller identity on every call.
pub const CREDENTIAL_HEADER: &str = "x-telegram-init-data";

/// Opaque caller identity. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(..)")
    }
}

/// Identifies one outstanding request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(pub(crate) u64);

/// Aggregate of a queue snapshot, sent as the body of `POST /api/tap`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SyncBatch {
    #[serde(rename = "taps")]
    pub total_taps: u64,
    #[serde(rename = "interval")]
    pub avg_interval_ms: f64,
}

impl SyncBatch {
    /// None for an empty snapshot.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a TapRecord>) -> Option<Self> {
        let mut len = 0u64;
        let mut total_taps = 0u64;
        let mut interval_sum = 0u64;
        for r in records {
            len += 1;
            total_taps += r.count as u64;
            interval_sum = interval_sum.saturating_add(r.interval_ms);
        }
        if len == 0 {
            return None;
        }
        Some(Self {
            total_taps,
            avg_interval_ms: interval_sum as f64 / len as f64,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallKind {
    SubmitTaps,
    PollAutoclicker,
    CheckBoosterExpiry,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    SubmitTaps(SyncBatch),
    PollAutoclicker,
    CheckBoosterExpiry,
}

impl Call {
    pub fn kind(&self) -> CallKind {
        match self {
            Call::SubmitTaps(_) => CallKind::SubmitTaps,
            Call::PollAutoclicker => CallKind::PollAutoclicker,
            Call::CheckBoosterExpiry => CallKind::CheckBoosterExpiry,
        }
    }

    pub fn method(&self) -> &'static str {
        match self {
            Call::SubmitTaps(_) | Call::PollAutoclicker => "POST",
            Call::CheckBoosterExpiry => "GET",
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Call::SubmitTaps(_) => TAP_PATH,
            Call::PollAutoclicker => AUTOCLICKER_PATH,
            Call::CheckBoosterExpiry => EXPIRY_PATH,
        }
    }

    /// JSON request body, if the method carries one.
    pub fn body(&self) -> Result<Option<String>, serde_json::Error> {
        match self {
            Call::SubmitTaps(batch) => serde_json::to_string(batch).map(Some),
            Call::PollAutoclicker => Ok(Some("{}".to_string())),
            Call::CheckBoosterExpiry => Ok(None),
        }
    }
}

/// One outgoing call, with the credential already attached.
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub ticket: Ticket,
    pub credential: Credential,
    pub call: Call,
}

/// Reply to `POST /api/tap`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TapReceipt {
    pub coins: u64,
    pub energy: u32,
    pub total_earned: u64,
    #[serde(default)]
    pub league: Option<League>,
}

impl TapReceipt {
    pub fn ledger(&self) -> Ledger {
        Ledger {
            coins: self.coins,
            energy: self.energy,
            total_earned: self.total_earned,
        }
    }
}

/// Reply to `POST /api/autoclicker/process`. Balances are only present while
/// the booster is still running.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoclickerTick {
    pub active: bool,
    #[serde(default)]
    pub coins: Option<u64>,
    #[serde(default)]
    pub energy: Option<u32>,
    #[serde(default)]
    pub total_earned: Option<u64>,
    #[serde(default)]
    pub coins_earned: u64,
}

impl AutoclickerTick {
    pub fn ledger(&self) -> Option<Ledger> {
        Some(Ledger {
            coins: self.coins?,
            energy: self.energy?,
            total_earned: self.total_earned?,
        })
    }
}

/// A near-expiry warning computed by the server.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiryWarning {
    #[serde(rename = "type")]
    pub kind: BoosterKind,
    pub minutes_left: u32,
    #[serde(default)]
    pub message: String,
}

/// Reply to `GET /api/boosters/check-expiry`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ExpiryReport {
    #[serde(default)]
    pub warnings: Vec<ExpiryWarning>,
}

/// Blocking collaborator.
pub trait Backend {
    fn submit_taps(
        &mut self,
        credential: &Credential,
        batch: &SyncBatch,
    ) -> Result<TapReceipt, ApiError>;

    fn poll_autoclicker(&mut self, credential: &Credential) -> Result<AutoclickerTick, ApiError>;

    fn check_booster_expiry(&mut self, credential: &Credential) -> Result<ExpiryReport, ApiError>;
}

/// Player record returned by `POST /api/auth/init` (the `user` object).
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    #[serde(default)]
    pub coins: u64,
    #[serde(default)]
    pub total_earned: u64,
    #[serde(default)]
    pub energy: u32,
    #[serde(default = "default_max_energy")]
    pub max_energy: u32,
    #[serde(default = "default_tap_power")]
    pub tap_power: u32,
    #[serde(default)]
    pub boosters: BoosterRegistry,
    #[serde(default)]
    pub league: Option<League>,
}

fn default_max_energy() -> u32 {
    1000
}

fn default_tap_power() -> u32 {
    1
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self {
            coins: 0,
            total_earned: 0,
            energy: default_max_energy(),
            max_energy: default_max_energy(),
            tap_power: default_tap_power(),
            boosters: BoosterRegistry::default(),
            league: None,
        }
    }
}

impl PlayerSnapshot {
    /// Accepts either the bare user object or the whole init reply
    /// (`{"user": {...}, ...}`).
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct InitReply {
            user: PlayerSnapshot,
        }

        let value: serde_json::Value = serde_json::from_str(json)?;
        if value.get("user").is_some() {
            serde_json::from_value::<InitReply>(value).map(|r| r.user)
        } else {
            serde_json::from_value(value)
        }
    }
}

/// Reply to a permanent upgrade purchase (tap power or stamina).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradeReceipt {
    pub coins: u64,
    #[serde(default)]
    pub tap_power: Option<u32>,
    #[serde(default)]
    pub max_energy: Option<u32>,
}

/// Reply to a booster activation: the full boosters map.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct BoosterActivation {
    pub boosters: BTreeMap<BoosterKind, BoosterState>,
}

/// `expiresAt` arrives as epoch milliseconds, an RFC 3339 string, or null.
pub(crate) mod timestamp {
    use serde::{de, Deserialize, Deserializer, Serializer};

    use crate::time::Millis;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Int(u64),
        Float(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &Millis, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Millis, D::Error> {
        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(0),
            Some(Raw::Int(ms)) => Ok(ms),
            Some(Raw::Float(ms)) => Ok(ms.max(0.0) as Millis),
            Some(Raw::Text(text)) => parse(&text).map_err(de::Error::custom),
        }
    }

    pub fn parse(text: &str) -> Result<Millis, chrono::ParseError> {
        let at = chrono::DateTime::parse_from_rfc3339(text)?;
        Ok(at.timestamp_millis().max(0) as Millis)
    }
}
