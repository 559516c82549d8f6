use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tablehold_shared::Masked;
use uuid::Uuid;

use crate::error::ReservationError;
use crate::time::Slot;

const LOCK_ID_PREFIX: &str = "hold_";

/// Caller-facing hold identifier. Independent of whatever key the store uses for the row.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockId(String);

impl LockId {
    pub fn generate() -> Self {
        Self(format!("{}{}", LOCK_ID_PREFIX, Uuid::new_v4().simple()))
    }

    pub fn parse(raw: &str) -> Result<Self, ReservationError> {
        let valid = raw
            .strip_prefix(LOCK_ID_PREFIX)
            .map(|hex| hex.len() == 32 && hex.chars().all(|c| c.is_ascii_hexdigit()))
            .unwrap_or(false);
        if !valid {
            return Err(ReservationError::validation(format!("malformed hold id: {}", raw)));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lock lifecycle. Only `Active` has outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    Active,
    Expired,
    Confirmed,
    Released,
}

impl LockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockStatus::Active => "active",
            LockStatus::Expired => "expired",
            LockStatus::Confirmed => "confirmed",
            LockStatus::Released => "released",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, LockStatus::Active)
    }

    pub fn can_transition_to(&self, next: LockStatus) -> bool {
        matches!(
            (self, next),
            (LockStatus::Active, LockStatus::Expired | LockStatus::Confirmed | LockStatus::Released)
        )
    }
}

impl fmt::Display for LockStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(LockStatus::Active),
            "expired" => Ok(LockStatus::Expired),
            "confirmed" => Ok(LockStatus::Confirmed),
            "released" => Ok(LockStatus::Released),
            other => Err(format!("unknown lock status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<Masked<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<Masked<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ContactDetails {
    /// Field-wise merge; anything set on `overrides` wins.
    pub fn merged_with(&self, overrides: &ContactDetails) -> ContactDetails {
        ContactDetails {
            name: overrides.name.clone().or_else(|| self.name.clone()),
            email: overrides.email.clone().or_else(|| self.email.clone()),
            phone: overrides.phone.clone().or_else(|| self.phone.clone()),
            notes: overrides.notes.clone().or_else(|| self.notes.clone()),
        }
    }
}

/// Price as quoted by the external pricing collaborator. Opaque to this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingSnapshot {
    pub amount_cents: i64,
    pub currency: String,
    pub captured_at: DateTime<Utc>,
    #[serde(default)]
    pub breakdown: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HoldMetadata {
    #[serde(default)]
    pub contact: ContactDetails,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<PricingSnapshot>,
}

/// A short-lived soft hold on a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lock {
    pub id: LockId,
    #[serde(flatten)]
    pub slot: Slot,
    pub user_id: String,
    pub guest_count: u16,
    pub status: LockStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub metadata: HoldMetadata,
}

impl Lock {
    pub fn new(
        slot: Slot,
        user_id: String,
        guest_count: u16,
        ttl: Duration,
        metadata: HoldMetadata,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LockId::generate(),
            slot,
            user_id,
            guest_count,
            status: LockStatus::Active,
            created_at: now,
            expires_at: now + ttl,
            confirmed_at: None,
            metadata,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Active and not yet past its TTL: the only state that occupies a slot.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.status == LockStatus::Active && !self.is_expired_at(now)
    }

    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        if self.is_live_at(now) {
            self.expires_at - now
        } else {
            Duration::zero()
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }
}
