/// A live connection profile, owned by the server's connection handling.
///
/// The rating engine only ever holds a `Weak` handle to one of these: when the
/// last strong reference goes away the player has left the server, and
/// `Ranking::cleanup` drops the matching entry.
#[derive(Debug)]
pub struct PlayerProfile {
    pub online_id: u32,
    pub username: String
}

impl PlayerProfile {
    pub fn new(online_id: u32, username: &str) -> PlayerProfile {
        PlayerProfile {
            online_id,
            username: username.to_owned()
        }
    }
}
