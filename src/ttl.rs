//! Named freshness profiles
//!
//! A profile resolves to three windows measured from the moment a value is stored:
//! - `stale`: served as fresh without any backend check
//! - `revalidate`: past this age a background refresh is triggered while the old
//!   value is still served
//! - `expire`: hard cutoff, the value is a miss afterwards

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Concrete stale/revalidate/expire durations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlWindows {
    pub stale: Duration,
    pub revalidate: Duration,
    pub expire: Duration,
}

/// Freshness of a value of a given age against its windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Serve without touching the origin
    Fresh,
    /// Serve, but refresh in the background
    Stale,
    /// Must not be served
    Expired,
}

impl TtlWindows {
    /// Build windows, enforcing `stale <= revalidate <= expire`
    pub fn new(stale: Duration, revalidate: Duration, expire: Duration) -> Result<Self> {
        if stale > revalidate || revalidate > expire {
            return Err(CacheError::InvalidTtl(format!(
                "expected stale <= revalidate <= expire, got {:?} / {:?} / {:?}",
                stale, revalidate, expire
            )));
        }
        Ok(Self {
            stale,
            revalidate,
            expire,
        })
    }

    const fn secs(stale: u64, revalidate: u64, expire: u64) -> Self {
        Self {
            stale: Duration::from_secs(stale),
            revalidate: Duration::from_secs(revalidate),
            expire: Duration::from_secs(expire),
        }
    }

    /// Classify a value of the given age
    pub fn freshness(&self, age: Duration) -> Freshness {
        if age >= self.expire {
            Freshness::Expired
        } else if age >= self.revalidate {
            Freshness::Stale
        } else {
            Freshness::Fresh
        }
    }
}

/// Built-in profile tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtlProfile {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Max,
}

impl TtlProfile {
    pub const ALL: [TtlProfile; 6] = [
        TtlProfile::Seconds,
        TtlProfile::Minutes,
        TtlProfile::Hours,
        TtlProfile::Days,
        TtlProfile::Weeks,
        TtlProfile::Max,
    ];

    /// Windows of the built-in tier
    pub fn windows(&self) -> TtlWindows {
        match self {
            TtlProfile::Seconds => TtlWindows::secs(1, 1, MINUTE),
            TtlProfile::Minutes => TtlWindows::secs(30, MINUTE, HOUR),
            TtlProfile::Hours => TtlWindows::secs(5 * MINUTE, HOUR, DAY),
            TtlProfile::Days => TtlWindows::secs(5 * MINUTE, DAY, 7 * DAY),
            TtlProfile::Weeks => TtlWindows::secs(5 * MINUTE, 7 * DAY, 30 * DAY),
            TtlProfile::Max => TtlWindows::secs(5 * MINUTE, 30 * DAY, 365 * DAY),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TtlProfile::Seconds => "seconds",
            TtlProfile::Minutes => "minutes",
            TtlProfile::Hours => "hours",
            TtlProfile::Days => "days",
            TtlProfile::Weeks => "weeks",
            TtlProfile::Max => "max",
        }
    }
}

impl fmt::Display for TtlProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TtlProfile {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        TtlProfile::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| CacheError::UnknownProfile(s.to_string()))
    }
}

/// Registry of named profiles, built once at startup
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    profiles: HashMap<String, TtlWindows>,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        let profiles = TtlProfile::ALL
            .into_iter()
            .map(|p| (p.as_str().to_string(), p.windows()))
            .collect();
        Self { profiles }
    }
}

impl TtlPolicy {
    /// Policy holding only the built-in tiers
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an additional named profile (or replace a built-in one)
    pub fn register(mut self, name: impl Into<String>, windows: TtlWindows) -> Result<Self> {
        let windows = TtlWindows::new(windows.stale, windows.revalidate, windows.expire)?;
        self.profiles.insert(name.into(), windows);
        Ok(self)
    }

    /// Look up a named profile
    pub fn resolve(&self, name: &str) -> Result<TtlWindows> {
        self.profiles
            .get(name)
            .copied()
            .ok_or_else(|| CacheError::UnknownProfile(name.to_string()))
    }

    /// One-off windows that bypass the named profiles
    pub fn custom(stale: Duration, revalidate: Duration, expire: Duration) -> Result<TtlWindows> {
        TtlWindows::new(stale, revalidate, expire)
    }

    /// Registered profile names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}
