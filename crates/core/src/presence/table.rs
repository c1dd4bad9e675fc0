// Presence Table
//
// Remote user id -> last time we heard from them and what they are editing.

use super::live::PresenceView;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub struct PresenceEntry {
    /// Last time any message was received from this user
    pub last_seen_at: Instant,
    /// Encoded field path the user is editing, `None` while idle
    pub focused_path: Option<String>,
}

#[derive(Debug, Default)]
pub struct PresenceTable {
    entries: HashMap<String, PresenceEntry>,
}

impl PresenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a fresh, unfocused entry for a user that just joined
    pub fn reset(&mut self, user_id: &str, now: Instant) {
        let last_seen_at = self
            .entries
            .get(user_id)
            .map_or(now, |entry| entry.last_seen_at.max(now));
        self.entries.insert(
            user_id.to_string(),
            PresenceEntry {
                last_seen_at,
                focused_path: None,
            },
        );
    }

    pub fn set_focus(&mut self, user_id: &str, path: &str, now: Instant) {
        let entry = self.touch(user_id, now);
        entry.focused_path = Some(path.to_string());
    }

    /// Refresh `last_seen_at`, creating an idle entry for unknown users
    pub fn touch(&mut self, user_id: &str, now: Instant) -> &mut PresenceEntry {
        let entry = self
            .entries
            .entry(user_id.to_string())
            .or_insert_with(|| PresenceEntry {
                last_seen_at: now,
                focused_path: None,
            });
        entry.last_seen_at = entry.last_seen_at.max(now);
        entry
    }

    /// Refresh `last_seen_at` of an existing entry only
    pub fn refresh(&mut self, user_id: &str, now: Instant) -> bool {
        match self.entries.get_mut(user_id) {
            Some(entry) => {
                entry.last_seen_at = entry.last_seen_at.max(now);
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, user_id: &str) -> bool {
        self.entries.remove(user_id).is_some()
    }

    /// Drop every entry silent for longer than `timeout`, returning their ids
    pub fn sweep(&mut self, now: Instant, timeout: Duration) -> Vec<String> {
        let mut expired = Vec::new();
        self.entries.retain(|user_id, entry| {
            let alive = now.saturating_duration_since(entry.last_seen_at) <= timeout;
            if !alive {
                expired.push(user_id.clone());
            }
            alive
        });
        expired.sort();
        expired
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn get(&self, user_id: &str) -> Option<&PresenceEntry> {
        self.entries.get(user_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of who is present and where, without timing data
    pub fn view(&self) -> PresenceView {
        PresenceView::from_entries(
            self.entries
                .iter()
                .map(|(user_id, entry)| (user_id.clone(), entry.focused_path.clone())),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_focus_creates_entry() {
        let now = Instant::now();
        let mut table = PresenceTable::new();
        table.set_focus("u2", "fields.a.en", now);

        let entry = table.get("u2").unwrap();
        assert_eq!(entry.focused_path.as_deref(), Some("fields.a.en"));
        assert_eq!(entry.last_seen_at, now);
    }

    #[test]
    fn test_reset_clears_focus() {
        let now = Instant::now();
        let mut table = PresenceTable::new();
        table.set_focus("u2", "fields.a.en", now);
        table.reset("u2", now + Duration::from_secs(1));

        let entry = table.get("u2").unwrap();
        assert_eq!(entry.focused_path, None);
        assert_eq!(entry.last_seen_at, now + Duration::from_secs(1));
    }

    #[test]
    fn test_last_seen_never_moves_backwards() {
        let now = Instant::now();
        let mut table = PresenceTable::new();
        table.touch("u2", now + Duration::from_secs(5));
        table.touch("u2", now);
        assert_eq!(table.get("u2").unwrap().last_seen_at, now + Duration::from_secs(5));
    }

    #[test]
    fn test_refresh_ignores_unknown_users() {
        let now = Instant::now();
        let mut table = PresenceTable::new();
        assert!(!table.refresh("ghost", now));
        assert!(table.is_empty());
    }

    #[test]
    fn test_sweep_removes_only_stale_entries() {
        let start = Instant::now();
        let timeout = Duration::from_secs(60);
        let mut table = PresenceTable::new();
        table.touch("stale", start);
        table.touch("edge", start + Duration::from_secs(10));
        table.touch("fresh", start + Duration::from_secs(50));

        let expired = table.sweep(start + Duration::from_secs(70), timeout);
        assert_eq!(expired, vec!["stale".to_string()]);
        assert!(table.get("edge").is_some());
        assert!(table.get("fresh").is_some());
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_view_excludes_timing() {
        let now = Instant::now();
        let mut table = PresenceTable::new();
        table.touch("u3", now);
        table.set_focus("u2", "fields.a.en", now);

        let view = table.view();
        assert_eq!(view.len(), 2);
        assert_eq!(view.focused_path("u2"), Some("fields.a.en"));
        assert_eq!(view.focused_path("u3"), None);
    }
}
