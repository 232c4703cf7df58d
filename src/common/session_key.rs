use std::fmt;

use binrw::binrw;

/// The two key pairs a client collects on the login server. The login pair
/// comes with `LoginOk`, the play pair with `PlayOk` and stays zero until then.
///
/// Fields are in the order the inter-server channel sends them.
#[binrw]
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionKey {
    pub play1: u32,
    pub play2: u32,
    pub login1: u32,
    pub login2: u32,
}

// keys never end up in logs
impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKey")
            .field("has_play_pair", &self.has_play_pair())
            .finish_non_exhaustive()
    }
}

impl SessionKey {
    pub fn new(login1: u32, login2: u32, play1: u32, play2: u32) -> Self {
        Self {
            play1,
            play2,
            login1,
            login2,
        }
    }

    pub fn check_login_pair(&self, login1: u32, login2: u32) -> bool {
        self.login1 == login1 && self.login2 == login2
    }

    pub fn check_play_pair(&self, play1: u32, play2: u32) -> bool {
        self.play1 == play1 && self.play2 == play2
    }

    /// Whether `presented` may be used in place of this key on a game server.
    /// The login pair only counts when the client went through the license screen.
    pub fn matches(&self, presented: &SessionKey, show_license: bool) -> bool {
        if !self.has_play_pair() || !self.check_play_pair(presented.play1, presented.play2) {
            return false;
        }

        !show_license || self.check_login_pair(presented.login1, presented.login2)
    }

    pub fn has_play_pair(&self) -> bool {
        self.play1 != 0 || self.play2 != 0
    }
}
