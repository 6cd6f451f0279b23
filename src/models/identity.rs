use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::router::rooms::RoomKey;

pub type ConnectionId = Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Driver,
    Rider,
    Admin,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Driver => "driver",
            UserType::Rider => "rider",
            UserType::Admin => "admin",
        }
    }
}

/// The authenticated party behind a real-time connection.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_type: UserType,
    pub user_id: u64,
}

impl Identity {
    pub fn driver(user_id: u64) -> Self {
        Self {
            user_type: UserType::Driver,
            user_id,
        }
    }

    pub fn rider(user_id: u64) -> Self {
        Self {
            user_type: UserType::Rider,
            user_id,
        }
    }

    pub fn admin(user_id: u64) -> Self {
        Self {
            user_type: UserType::Admin,
            user_id,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.user_type == UserType::Admin
    }

    /// Room every connection of this identity joins on connect.
    pub fn home_room(&self) -> RoomKey {
        match self.user_type {
            UserType::Driver => RoomKey::Driver(self.user_id),
            UserType::Rider => RoomKey::Rider(self.user_id),
            UserType::Admin => RoomKey::Dashboard,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.user_type.as_str(), self.user_id)
    }
}

impl FromStr for Identity {
    type Err = String;

    /// Parses `driver:7`, `rider:3` or `admin:1`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (kind, id) = raw
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("identity `{raw}` must look like kind:id"))?;

        let user_id = id
            .parse::<u64>()
            .map_err(|err| format!("identity `{raw}` has an invalid id: {err}"))?;

        let user_type = match kind {
            "driver" => UserType::Driver,
            "rider" => UserType::Rider,
            "admin" => UserType::Admin,
            other => return Err(format!("unknown identity kind `{other}`")),
        };

        Ok(Self { user_type, user_id })
    }
}
