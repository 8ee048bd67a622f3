//! Provenance tags carried by change signals.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// Who produced a write to the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Origin {
    /// A user changed a preference on this device.
    UserEdit,
    /// First-run seeding of a never-written record.
    Bootstrap,
    /// Remote record accepted during the initial reconciling read.
    RemoteInit,
    /// Remote record delivered by a live subscription.
    RemoteLive,
    /// Remote record fetched by a pull (periodic or on foreground).
    RemotePoll,
}

impl Origin {
    /// All origins, in declaration order.
    pub const ALL: [Origin; 5] = [
        Origin::UserEdit,
        Origin::Bootstrap,
        Origin::RemoteInit,
        Origin::RemoteLive,
        Origin::RemotePoll,
    ];

    /// Stable tag used in logs and serialized signals.
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::UserEdit => "user-edit",
            Origin::Bootstrap => "bootstrap",
            Origin::RemoteInit => "remote-init",
            Origin::RemoteLive => "remote-live",
            Origin::RemotePoll => "remote-poll",
        }
    }

    /// True for writes that came from the remote side.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Origin::RemoteInit | Origin::RemoteLive | Origin::RemotePoll
        )
    }

    /// True for writes that should eventually be pushed to the remote.
    pub fn is_local(&self) -> bool {
        !self.is_remote()
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Origin {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Origin::ALL
            .into_iter()
            .find(|origin| origin.as_str() == s)
            .ok_or_else(|| TypesError::UnknownOrigin(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_local_origins_are_local() {
        assert!(Origin::UserEdit.is_local());
        assert!(Origin::Bootstrap.is_local());
        assert!(Origin::RemoteInit.is_remote());
        assert!(Origin::RemoteLive.is_remote());
        assert!(Origin::RemotePoll.is_remote());
    }

    #[test]
    fn tags_parse_back() {
        for origin in Origin::ALL {
            assert_eq!(origin.as_str().parse::<Origin>().unwrap(), origin);
        }
        assert!(matches!(
            "cloud".parse::<Origin>(),
            Err(TypesError::UnknownOrigin(tag)) if tag == "cloud"
        ));
    }

    #[test]
    fn serde_uses_kebab_tags() {
        let json = serde_json::to_string(&Origin::RemoteLive).unwrap();
        assert_eq!(json, "\"remote-live\"");
    }
}
