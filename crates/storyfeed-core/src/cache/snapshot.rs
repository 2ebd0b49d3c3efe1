use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Cursor, Story};

/// Consider the feed stale after 1 hour.
const CACHE_STALE_MINUTES: i64 = 60;

/// Everything one feed persists: its items in display order plus the cursor.
///
/// Snapshots are immutable once committed; the store swaps in a new `Arc`
/// on every commit, so a reader holding one always sees a consistent pair of
/// items and cursor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub items: Vec<Story>,
    pub cursor: Cursor,
    /// When remote data was last written, `None` if never
    pub cached_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub(crate) generation: u64,
}

impl FeedSnapshot {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Commit counter of the store this snapshot came from
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Copy out `limit` items starting at `offset`; short or empty past the end
    pub fn materialize(&self, offset: usize, limit: usize) -> Vec<Story> {
        self.items.iter().skip(offset).take(limit).cloned().collect()
    }

    /// Add `stories` after the tail. A story whose id is already cached
    /// replaces the cached row where it stands.
    pub(crate) fn append_dedup(&mut self, stories: Vec<Story>) {
        let mut index: HashMap<String, usize> = self
            .items
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();

        for story in stories {
            match index.get(&story.id) {
                Some(&pos) => self.items[pos] = story,
                None => {
                    index.insert(story.id.clone(), self.items.len());
                    self.items.push(story);
                }
            }
        }
    }

    /// Add `stories` before the head, keeping their order. Ids already cached
    /// are replaced where they stand instead.
    pub(crate) fn prepend_dedup(&mut self, stories: Vec<Story>) {
        let index: HashMap<String, usize> = self
            .items
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.clone(), i))
            .collect();

        let mut head: Vec<Story> = Vec::with_capacity(stories.len());
        let mut head_index: HashMap<String, usize> = HashMap::new();
        for story in stories {
            if let Some(&pos) = index.get(&story.id) {
                self.items[pos] = story;
            } else if let Some(&pos) = head_index.get(&story.id) {
                head[pos] = story;
            } else {
                head_index.insert(story.id.clone(), head.len());
                head.push(story);
            }
        }

        head.append(&mut self.items);
        self.items = head;
    }

    pub fn age_minutes(&self) -> Option<i64> {
        self.cached_at.map(|at| (Utc::now() - at).num_minutes())
    }

    pub fn age_display(&self) -> String {
        let minutes = match self.age_minutes() {
            Some(m) => m,
            None => return "never".to_string(),
        };
        if minutes < 1 {
            // Clock skew shows as negative; treat it as fresh
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }

    /// Never-fetched feeds count as stale
    pub fn is_stale(&self) -> bool {
        self.age_minutes()
            .map(|m| m > CACHE_STALE_MINUTES)
            .unwrap_or(true)
    }
}
