use dashmap::DashMap;

use crate::common::timestamp_msecs;
use crate::ipc::interserver::GameServerPacket;

use super::LoginLink;

/// Accounts this game server refuses, with the time (in milliseconds since the
/// epoch) the ban runs out. The login server is told about every change so it
/// can stop handing out play pairs for us.
#[derive(Debug, Default)]
pub struct BanList {
    bans: DashMap<String, u64>,
}

impl BanList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ban(&self, account: &str, until: u64, link: &LoginLink) {
        let account = account.to_lowercase();
        tracing::info!("Banning {account} until {until}");

        self.bans.insert(account.clone(), until);
        if !link.send(GameServerPacket::RequestTempBan {
            account,
            ban_until: until,
        }) {
            tracing::warn!("Couldn't tell the login server about the ban");
        }
    }

    pub fn lift(&self, account: &str, link: &LoginLink) {
        let account = account.to_lowercase();
        if self.bans.remove(&account).is_none() {
            return;
        }

        tracing::info!("Lifted the ban on {account}");
        link.send(GameServerPacket::LiftBan { account });
    }

    pub fn is_banned(&self, account: &str) -> bool {
        let now = timestamp_msecs();
        // expired bans are dropped on the way
        self.bans.remove_if(account, |_, until| *until <= now);
        self.bans.contains_key(account)
    }
}
