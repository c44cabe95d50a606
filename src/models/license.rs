use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

pub const SECONDS_PER_HOUR: i64 = 3600;
pub const SECONDS_PER_DAY: i64 = 86400;

/// Trial licenses always last 48 hours.
pub const TRIAL_HOURS: i64 = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Plan {
    Trial,
    Monthly,
}

impl Plan {
    /// Validity window of a freshly issued license, in seconds.
    pub fn horizon_secs(self, billing_days: i64) -> i64 {
        match self {
            Plan::Trial => TRIAL_HOURS * SECONDS_PER_HOUR,
            Plan::Monthly => billing_days * SECONDS_PER_DAY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct License {
    pub key: String,
    pub plan: Plan,
    pub issued_at: i64,
    pub expires_at: i64,
    /// Admin-controlled switch, independent of expiry
    pub active: bool,
    pub revoked: bool,
    pub revoked_at: Option<i64>,
    pub revoke_reason: Option<String>,
    /// The one device allowed to use this license, set on first validation
    pub device_id: Option<String>,
    pub activated_at: Option<i64>,
}

/// Lifecycle position of a license, derived from its fields at a point in time.
///
/// Precedence: revoked > inactive > expired > bound/provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LicenseState {
    /// Usable, no device bound yet
    Provisioned,
    /// Usable, locked to a device
    Bound,
    Expired,
    Revoked,
    Inactive,
}

impl LicenseState {
    pub fn is_usable(self) -> bool {
        matches!(self, LicenseState::Provisioned | LicenseState::Bound)
    }
}

impl License {
    pub fn is_bound(&self) -> bool {
        self.device_id.as_deref().is_some_and(|d| !d.is_empty())
    }

    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }

    /// Revocation is checked before the `active` flag, so a revoked license
    /// reads as revoked whatever its flag or expiry says.
    pub fn state(&self, now: i64) -> LicenseState {
        if self.revoked {
            LicenseState::Revoked
        } else if !self.active {
            LicenseState::Inactive
        } else if self.is_expired(now) {
            LicenseState::Expired
        } else if self.is_bound() {
            LicenseState::Bound
        } else {
            LicenseState::Provisioned
        }
    }
}

/// License as returned by admin listings, with its derived state attached.
#[derive(Debug, Clone, Serialize)]
pub struct LicenseWithStatus {
    #[serde(flatten)]
    pub license: License,
    pub status: LicenseState,
}

impl LicenseWithStatus {
    pub fn at(license: License, now: i64) -> Self {
        let status = license.state(now);
        Self { license, status }
    }
}

/// Status filter accepted by the admin listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StatusFilter {
    /// Provisioned or bound
    Active,
    Expired,
    Trial,
    Revoked,
    Inactive,
}

impl StatusFilter {
    /// SQL predicate over the `licenses` table selecting the same rows as
    /// [`StatusFilter::matches`]. Uses the named parameter `:now`.
    pub fn sql_predicate(self) -> &'static str {
        match self {
            StatusFilter::Revoked => "revoked = 1",
            StatusFilter::Inactive => "revoked = 0 AND active = 0",
            StatusFilter::Expired => "revoked = 0 AND active = 1 AND expires_at <= :now",
            StatusFilter::Active => "revoked = 0 AND active = 1 AND expires_at > :now",
            StatusFilter::Trial => "plan = 'trial'",
        }
    }

    /// Whether the predicate binds `:now`.
    pub fn uses_now(self) -> bool {
        matches!(self, StatusFilter::Expired | StatusFilter::Active)
    }

    pub fn matches(self, license: &License, now: i64) -> bool {
        match self {
            StatusFilter::Trial => license.plan == Plan::Trial,
            StatusFilter::Active => license.state(now).is_usable(),
            StatusFilter::Expired => license.state(now) == LicenseState::Expired,
            StatusFilter::Revoked => license.state(now) == LicenseState::Revoked,
            StatusFilter::Inactive => license.state(now) == LicenseState::Inactive,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateLicense {
    pub plan: Plan,
    /// Caller-chosen key; blank or missing means generate one
    #[serde(default, alias = "license_key")]
    pub key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RevokeLicense {
    #[serde(default)]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn license(now: i64) -> License {
        License {
            key: "ABC123".into(),
            plan: Plan::Monthly,
            issued_at: now,
            expires_at: now + 10,
            active: true,
            revoked: false,
            revoked_at: None,
            revoke_reason: None,
            device_id: None,
            activated_at: None,
        }
    }

    #[test]
    fn test_state_precedence() {
        let now = 1_000;
        let mut l = license(now);
        assert_eq!(l.state(now), LicenseState::Provisioned);

        l.device_id = Some("device-001".into());
        assert_eq!(l.state(now), LicenseState::Bound);

        l.expires_at = now;
        assert_eq!(l.state(now), LicenseState::Expired);

        l.active = false;
        assert_eq!(l.state(now), LicenseState::Inactive);

        l.revoked = true;
        assert_eq!(l.state(now), LicenseState::Revoked);

        // Reactivating or extending does not undo revocation
        l.active = true;
        l.expires_at = now + 1_000_000;
        assert_eq!(l.state(now), LicenseState::Revoked);
    }

    #[test]
    fn test_empty_device_counts_as_unbound() {
        let now = 1_000;
        let mut l = license(now);
        l.device_id = Some(String::new());
        assert_eq!(l.state(now), LicenseState::Provisioned);
    }

    #[test]
    fn test_plan_horizons() {
        assert_eq!(Plan::Trial.horizon_secs(30), 48 * 3600);
        assert_eq!(Plan::Monthly.horizon_secs(30), 30 * 86400);
        assert_eq!(Plan::Monthly.horizon_secs(7), 7 * 86400);
    }

    #[test]
    fn test_plan_and_filter_parse() {
        assert_eq!("trial".parse::<Plan>().unwrap(), Plan::Trial);
        assert_eq!("monthly".parse::<Plan>().unwrap(), Plan::Monthly);
        assert!("yearly".parse::<Plan>().is_err());
        assert_eq!("expired".parse::<StatusFilter>().unwrap(), StatusFilter::Expired);
        assert_eq!(LicenseState::Bound.as_ref(), "bound");
    }
}
