//! Action kinds and their `(limit, window)` descriptors.

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A named category of rate-limited operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    GetUser,
    GetSelfUser,
    EditSelfUser,
    ConfirmEmail,
    ConfirmEmailStart,
    AddConnection,
    RemoveConnection,
    CreateServer,
    GetServer,
    EditServer,
    DeleteServer,
    GetServerInvites,
    UserLogin,
    UserLoginMfa,
    UserRegister,
    GetSelfServers,
    LeaveServer,
    EnableMfa,
    DisableMfa,
    VerifyMfa,
    GetBackupCodes,
    ResetBackupCodes,
    GetInvite,
    UseInvite,
}

impl ActionKind {
    pub const ALL: [Self; 24] = [
        Self::GetUser,
        Self::GetSelfUser,
        Self::EditSelfUser,
        Self::ConfirmEmail,
        Self::ConfirmEmailStart,
        Self::AddConnection,
        Self::RemoveConnection,
        Self::CreateServer,
        Self::GetServer,
        Self::EditServer,
        Self::DeleteServer,
        Self::GetServerInvites,
        Self::UserLogin,
        Self::UserLoginMfa,
        Self::UserRegister,
        Self::GetSelfServers,
        Self::LeaveServer,
        Self::EnableMfa,
        Self::DisableMfa,
        Self::VerifyMfa,
        Self::GetBackupCodes,
        Self::ResetBackupCodes,
        Self::GetInvite,
        Self::UseInvite,
    ];

    /// Stable name, also used as the store key namespace.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GetUser => "get_user",
            Self::GetSelfUser => "get_self_user",
            Self::EditSelfUser => "edit_self_user",
            Self::ConfirmEmail => "confirm_email",
            Self::ConfirmEmailStart => "confirm_email_start",
            Self::AddConnection => "add_connection",
            Self::RemoveConnection => "remove_connection",
            Self::CreateServer => "create_server",
            Self::GetServer => "get_server",
            Self::EditServer => "edit_server",
            Self::DeleteServer => "delete_server",
            Self::GetServerInvites => "get_server_invites",
            Self::UserLogin => "user_login",
            Self::UserLoginMfa => "user_login_mfa",
            Self::UserRegister => "user_register",
            Self::GetSelfServers => "get_self_servers",
            Self::LeaveServer => "leave_server",
            Self::EnableMfa => "enable_mfa",
            Self::DisableMfa => "disable_mfa",
            Self::VerifyMfa => "verify_mfa",
            Self::GetBackupCodes => "get_backup_codes",
            Self::ResetBackupCodes => "reset_backup_codes",
            Self::GetInvite => "get_invite",
            Self::UseInvite => "use_invite",
        }
    }

    /// Parse a stable name. Accepts `UPPER_SNAKE` and `kebab-case` spellings too.
    #[must_use]
    pub fn from_name(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
    }

    /// Built-in `(limit, window seconds)` for this action.
    #[must_use]
    pub const fn default_descriptor(self) -> RateLimitDescriptor {
        let (limit, window_seconds) = match self {
            Self::GetUser => (10, 20),
            Self::GetSelfUser | Self::ConfirmEmail => (2, 10),
            Self::EditSelfUser
            | Self::GetServer
            | Self::EditServer
            | Self::LeaveServer
            | Self::GetInvite => (5, 30),
            Self::ConfirmEmailStart => (3, 3600),
            Self::AddConnection | Self::RemoveConnection => (5, 60),
            Self::CreateServer => (2, 300),
            Self::DeleteServer => (2, 60),
            Self::GetServerInvites | Self::UserLogin | Self::UserLoginMfa => (3, 30),
            Self::UserRegister => (2, 30),
            Self::GetSelfServers => (2, 15),
            Self::EnableMfa | Self::DisableMfa | Self::VerifyMfa => (3, 120),
            Self::GetBackupCodes | Self::ResetBackupCodes => (2, 120),
            Self::UseInvite => (3, 60),
        };
        RateLimitDescriptor {
            limit,
            window_seconds,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitDescriptor {
    pub limit: u64,
    pub window_seconds: u64,
}

impl RateLimitDescriptor {
    /// # Errors
    /// Returns an error if either value is zero.
    pub fn new(limit: u64, window_seconds: u64) -> Result<Self> {
        if limit == 0 {
            return Err(anyhow!("rate limit must be greater than zero"));
        }
        if window_seconds == 0 {
            return Err(anyhow!("rate limit window must be greater than zero"));
        }
        Ok(Self {
            limit,
            window_seconds,
        })
    }
}

/// Immutable action-kind → descriptor table, built once at start-up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RateLimits {
    descriptors: BTreeMap<ActionKind, RateLimitDescriptor>,
}

impl RateLimits {
    /// Table with every action kind at its built-in descriptor.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            descriptors: ActionKind::ALL
                .into_iter()
                .map(|kind| (kind, kind.default_descriptor()))
                .collect(),
        }
    }

    /// Built-in table with `overrides` applied.
    ///
    /// `overrides` is a comma separated list of `name=limit/window` entries,
    /// e.g. `user_login=5/60,use_invite=10/60`.
    ///
    /// # Errors
    /// Returns an error on unknown action names, malformed entries or zero values.
    pub fn with_overrides(overrides: &str) -> Result<Self> {
        let mut limits = Self::builtin();
        for entry in overrides.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, spec) = entry
                .split_once('=')
                .ok_or_else(|| anyhow!("invalid rate limit entry `{entry}`, expected name=limit/window"))?;
            let kind = ActionKind::from_name(name)
                .ok_or_else(|| anyhow!("unknown rate limit action `{}`", name.trim()))?;
            let (limit, window) = spec
                .split_once('/')
                .ok_or_else(|| anyhow!("invalid rate limit `{spec}` for {kind}, expected limit/window"))?;
            let limit = limit
                .trim()
                .parse::<u64>()
                .map_err(|err| anyhow!("invalid limit for {kind}: {err}"))?;
            let window = window
                .trim()
                .parse::<u64>()
                .map_err(|err| anyhow!("invalid window for {kind}: {err}"))?;
            let descriptor = RateLimitDescriptor::new(limit, window)
                .map_err(|err| anyhow!("{kind}: {err}"))?;
            limits.descriptors.insert(kind, descriptor);
        }
        Ok(limits)
    }

    #[must_use]
    pub fn get(&self, kind: ActionKind) -> RateLimitDescriptor {
        self.descriptors
            .get(&kind)
            .copied()
            .unwrap_or_else(|| kind.default_descriptor())
    }

    pub fn iter(&self) -> impl Iterator<Item = (ActionKind, RateLimitDescriptor)> + '_ {
        self.descriptors.iter().map(|(kind, descriptor)| (*kind, *descriptor))
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_for_every_kind() {
        for kind in ActionKind::ALL {
            assert_eq!(ActionKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(ActionKind::from_name("USER_LOGIN"), Some(ActionKind::UserLogin));
        assert_eq!(ActionKind::from_name("edit-self-user"), Some(ActionKind::EditSelfUser));
        assert_eq!(ActionKind::from_name("nope"), None);
    }

    #[test]
    fn builtin_table_matches_known_values() {
        let limits = RateLimits::builtin();
        assert_eq!(limits.iter().count(), ActionKind::ALL.len());
        assert_eq!(
            limits.get(ActionKind::UserLogin),
            RateLimitDescriptor {
                limit: 3,
                window_seconds: 30
            }
        );
        assert_eq!(limits.get(ActionKind::ConfirmEmailStart).window_seconds, 3600);
        assert_eq!(limits.get(ActionKind::GetBackupCodes).limit, 2);
    }

    #[test]
    fn overrides_replace_entries() {
        let limits = RateLimits::with_overrides(" user_login=5/60 , USE_INVITE=1/1").unwrap();
        assert_eq!(limits.get(ActionKind::UserLogin).limit, 5);
        assert_eq!(limits.get(ActionKind::UserLogin).window_seconds, 60);
        assert_eq!(limits.get(ActionKind::UseInvite).limit, 1);
        assert_eq!(limits.get(ActionKind::GetUser).limit, 10);
    }

    #[test]
    fn empty_overrides_keep_builtin() {
        assert_eq!(RateLimits::with_overrides("").unwrap(), RateLimits::builtin());
    }

    #[test]
    fn overrides_reject_bad_input() {
        assert!(RateLimits::with_overrides("user_login").is_err());
        assert!(RateLimits::with_overrides("user_login=5").is_err());
        assert!(RateLimits::with_overrides("user_login=0/30").is_err());
        assert!(RateLimits::with_overrides("user_login=3/0").is_err());
        assert!(RateLimits::with_overrides("user_login=x/30").is_err());
        assert!(RateLimits::with_overrides("teleport=3/30").is_err());
    }
}
