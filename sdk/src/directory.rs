use std::collections::HashMap;

use voicechat_protocol::{GroupState, PlayerState, Uuid};

/// Local view of the players and groups the server has announced.
///
/// Both maps are keyed by the canonical string form of the identifier.
#[derive(Debug, Default, Clone)]
pub struct PresenceDirectory {
    players: HashMap<String, PlayerState>,
    groups: HashMap<String, GroupState>,
}

impl PresenceDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces every known player with `players`.
    pub fn apply_snapshot(&mut self, players: Vec<PlayerState>) {
        self.players = players
            .into_iter()
            .map(|state| (state.player_uuid.to_string(), state))
            .collect();
    }

    pub fn upsert_player(&mut self, state: PlayerState) {
        self.players.insert(state.player_uuid.to_string(), state);
    }

    pub fn add_group(&mut self, group: GroupState) {
        self.groups.insert(group.id.to_string(), group);
    }

    /// Returns the removed group, if it was known.
    pub fn remove_group(&mut self, id: &Uuid) -> Option<GroupState> {
        self.groups.remove(&id.to_string())
    }

    #[must_use]
    pub fn resolve_name(&self, player: &Uuid) -> Option<&str> {
        self.players
            .get(&player.to_string())
            .map(|state| state.name.as_str())
    }

    /// First player with a matching display name.
    ///
    /// Iteration order is unspecified, so with duplicate names the result is
    /// not deterministic.
    #[must_use]
    pub fn find_player_id_by_name(&self, name: &str) -> Option<Uuid> {
        self.players
            .values()
            .find(|state| state.name == name)
            .map(|state| state.player_uuid)
    }

    #[must_use]
    pub fn find_group_by_name(&self, name: &str) -> Option<&GroupState> {
        self.groups.values().find(|group| group.name == name)
    }

    #[must_use]
    pub fn player(&self, id: &Uuid) -> Option<&PlayerState> {
        self.players.get(&id.to_string())
    }

    #[must_use]
    pub fn group(&self, id: &Uuid) -> Option<&GroupState> {
        self.groups.get(&id.to_string())
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.values()
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupState> {
        self.groups.values()
    }

    pub fn clear(&mut self) {
        self.players.clear();
        self.groups.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(n: i64, name: &str) -> PlayerState {
        PlayerState {
            disabled: false,
            disconnected: false,
            player_uuid: Uuid::new(n, -n),
            name: name.into(),
            group: None,
        }
    }

    fn group(n: i64, name: &str) -> GroupState {
        GroupState {
            id: Uuid::new(n, n),
            name: name.into(),
            has_password: false,
            persistent: false,
            hidden: false,
            group_type: 0,
        }
    }

    #[test]
    fn snapshot_replaces_wholesale() {
        let mut directory = PresenceDirectory::new();
        directory.apply_snapshot(vec![player(1, "alice"), player(2, "bob")]);
        assert_eq!(directory.players().count(), 2);

        directory.apply_snapshot(vec![player(3, "carol")]);
        assert_eq!(directory.players().count(), 1);
        assert_eq!(directory.resolve_name(&Uuid::new(3, -3)), Some("carol"));
        assert_eq!(directory.resolve_name(&Uuid::new(1, -1)), None);
    }

    #[test]
    fn upsert_adds_then_overwrites() {
        let mut directory = PresenceDirectory::new();
        directory.upsert_player(player(1, "alice"));
        assert_eq!(directory.players().count(), 1);

        let mut renamed = player(1, "alicia");
        renamed.disconnected = true;
        directory.upsert_player(renamed);
        assert_eq!(directory.players().count(), 1);
        assert_eq!(directory.resolve_name(&Uuid::new(1, -1)), Some("alicia"));
        assert!(directory.player(&Uuid::new(1, -1)).unwrap().disconnected);
    }

    #[test]
    fn remove_unknown_group_is_noop() {
        let mut directory = PresenceDirectory::new();
        directory.add_group(group(1, "builders"));
        assert!(directory.remove_group(&Uuid::new(9, 9)).is_none());
        assert_eq!(directory.groups().count(), 1);

        assert_eq!(
            directory.remove_group(&Uuid::new(1, 1)).map(|g| g.name),
            Some("builders".to_string())
        );
        assert_eq!(directory.groups().count(), 0);
    }

    #[test]
    fn lookups_by_name() {
        let mut directory = PresenceDirectory::new();
        directory.apply_snapshot(vec![player(1, "alice"), player(2, "bob")]);
        directory.add_group(group(5, "builders"));

        assert_eq!(
            directory.find_player_id_by_name("bob"),
            Some(Uuid::new(2, -2))
        );
        assert_eq!(directory.find_player_id_by_name("mallory"), None);
        assert_eq!(
            directory.find_group_by_name("builders").map(|g| g.id),
            Some(Uuid::new(5, 5))
        );
    }

    #[test]
    fn clear_empties_both_maps() {
        let mut directory = PresenceDirectory::new();
        directory.upsert_player(player(1, "alice"));
        directory.add_group(group(1, "builders"));
        directory.clear();
        assert_eq!(directory.players().count(), 0);
        assert!(directory.group(&Uuid::new(1, 1)).is_none());
    }
}
