use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::sync::Arc;

use crate::clock::Clock;
use crate::post::{Post, PostMeta};

/// Ways to address an entry of the index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Position<'a> {
    Id(&'a str),
    /// Oldest post.
    First,
    /// Newest post.
    Last,
    /// Offset into the ascending order.
    Offset(usize),
}

/// In-memory metadata for every non-draft post, ordered by timestamp.
///
/// The index is a cache over the content directory: it can always be rebuilt
/// by scanning the directory again. Content bodies are never kept here.
pub struct PostIndex {
    docs: HashMap<String, PostMeta>,
    // ids, ascending by timestamp, ties in insertion order
    order: Vec<String>,
    tag_counts: HashMap<String, usize>,
    popular_tags: Vec<String>,
    generation: i64,
    clock: Arc<dyn Clock>,
}

impl PostIndex {
    pub fn new(clock: Arc<dyn Clock>) -> PostIndex {
        let generation = clock.now_millis();
        PostIndex {
            docs: Default::default(),
            order: Default::default(),
            tag_counts: Default::default(),
            popular_tags: Default::default(),
            generation,
            clock,
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.docs.contains_key(id)
    }

    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// Bumped whenever anything derivable from the index changes.
    pub fn generation(&self) -> i64 {
        self.generation
    }

    /// Tags in use, most used first.
    pub fn popular_tags(&self) -> &[String] {
        &self.popular_tags
    }

    pub fn tag_count(&self, tag: &str) -> usize {
        self.tag_counts.get(tag).copied().unwrap_or(0)
    }

    pub fn get(&self, position: Position) -> Option<&PostMeta> {
        let id = match position {
            Position::Id(id) => return self.docs.get(id),
            Position::First => self.order.first(),
            Position::Last => self.order.last(),
            Position::Offset(offset) => self.order.get(offset),
        }?;
        self.docs.get(id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|x| x == id)
    }

    /// Inserts or replaces the metadata for `meta.id`.
    pub fn set(&mut self, meta: PostMeta) {
        if self.insert(meta) {
            self.sort();
        }
        self.refresh_tags();
        self.touch();
    }

    pub fn remove(&mut self, id: &str) -> Option<PostMeta> {
        let meta = self.detach(id)?;
        self.refresh_tags();
        self.touch();
        Some(meta)
    }

    /// Brings a freshly read post into the index. Returns false when the
    /// indexed copy already carries the same `updated` time.
    pub fn sync(&mut self, post: &Post) -> bool {
        let meta = &post.meta;
        if let Some(stale) = self.docs.get(&meta.id) {
            if stale.updated == meta.updated && !meta.draft {
                return false;
            }
        }

        if meta.draft {
            return self.remove(&meta.id).is_some();
        }

        self.set(meta.clone());
        true
    }

    /// Applies the result of a directory scan in one go: ids that got indexed
    /// in the meantime are left alone, tags are refreshed once.
    pub fn apply_scan(&mut self, found: Vec<PostMeta>, missing: &[String]) -> (usize, usize) {
        let mut added = 0;
        let mut needs_sort = false;
        for meta in found {
            if meta.draft || self.docs.contains_key(&meta.id) {
                continue;
            }
            needs_sort |= self.insert(meta);
            added += 1;
        }

        let removed = missing.iter()
            .filter(|id| self.detach(id).is_some())
            .count();

        if needs_sort {
            self.sort();
        }
        self.refresh_tags();
        if added > 0 || removed > 0 {
            self.touch();
        }
        (added, removed)
    }

    pub fn ascending<F>(&self, mut visit: F)
        where F: FnMut(&PostMeta, usize) -> ControlFlow<()>
    {
        for (i, id) in self.order.iter().enumerate() {
            if let Some(meta) = self.docs.get(id) {
                if visit(meta, i).is_break() {
                    break;
                }
            }
        }
    }

    pub fn descending<F>(&self, mut visit: F)
        where F: FnMut(&PostMeta, usize) -> ControlFlow<()>
    {
        for (i, id) in self.order.iter().enumerate().rev() {
            if let Some(meta) = self.docs.get(id) {
                if visit(meta, i).is_break() {
                    break;
                }
            }
        }
    }

    /// Newest `count` posts, newest first.
    pub fn latest(&self, count: usize) -> Vec<PostMeta> {
        let mut items = Vec::with_capacity(count.min(self.len()));
        self.descending(|meta, _| {
            if items.len() == count {
                return ControlFlow::Break(());
            }
            items.push(meta.clone());
            ControlFlow::Continue(())
        });
        items
    }

    /// Newest post, optionally the newest carrying `tag`.
    pub fn last(&self, tag: Option<&str>) -> Option<&PostMeta> {
        match tag {
            None => self.get(Position::Last),
            Some(tag) => self.order.iter().rev()
                .filter_map(|id| self.docs.get(id))
                .find(|meta| meta.has_tag(tag)),
        }
    }

    pub fn by_tag(&self, tag: &str) -> Vec<PostMeta> {
        self.collect_desc(|meta| meta.has_tag(tag))
    }

    /// Case-insensitive substring match over the title and tags.
    pub fn search(&self, term: &str) -> Vec<PostMeta> {
        let term = term.to_lowercase();
        self.collect_desc(|meta| {
            let haystack = format!("{} {}", meta.title, meta.tags.join(" "));
            haystack.to_lowercase().contains(&term)
        })
    }

    /// Posts with `start <= timestamp < end`.
    pub fn range(&self, start: i64, end: i64) -> Vec<PostMeta> {
        self.collect_desc(|meta| meta.timestamp >= start && meta.timestamp < end)
    }

    /// Previous (older) and next (newer) posts around `id`, optionally only
    /// counting posts that carry `tag`.
    pub fn adjacent(&self, id: &str, tag: Option<&str>) -> (Option<PostMeta>, Option<PostMeta>) {
        let Some(index) = self.index_of(id) else {
            return (None, None);
        };

        let Some(tag) = tag else {
            let previous = index.checked_sub(1).and_then(|i| self.get(Position::Offset(i)));
            let next = self.get(Position::Offset(index + 1));
            return (previous.cloned(), next.cloned());
        };

        let previous = self.order[..index].iter().rev()
            .filter_map(|id| self.docs.get(id))
            .find(|meta| meta.has_tag(tag));
        let next = self.order[index + 1..].iter()
            .filter_map(|id| self.docs.get(id))
            .find(|meta| meta.has_tag(tag));
        (previous.cloned(), next.cloned())
    }

    fn collect_desc<F>(&self, pred: F) -> Vec<PostMeta>
        where F: Fn(&PostMeta) -> bool
    {
        let mut items = vec![];
        self.descending(|meta, _| {
            if pred(meta) {
                items.push(meta.clone());
            }
            ControlFlow::Continue(())
        });
        items
    }

    /// Stores `meta` and adjusts tag counts. Returns true when the order needs
    /// to be recomputed.
    fn insert(&mut self, meta: PostMeta) -> bool {
        let new_tags = unique_tags(&meta.tags);
        let (old_tags, needs_sort) = match self.docs.get(&meta.id) {
            Some(old) => (unique_tags(&old.tags), old.timestamp != meta.timestamp),
            None => {
                self.order.push(meta.id.clone());
                (HashSet::new(), true)
            }
        };

        for tag in new_tags.difference(&old_tags) {
            *self.tag_counts.entry(tag.clone()).or_insert(0) += 1;
        }
        for tag in old_tags.difference(&new_tags) {
            self.decrement_tag(tag);
        }

        self.docs.insert(meta.id.clone(), meta);
        needs_sort
    }

    /// Removes `id` from docs, order and tag counts without refreshing.
    fn detach(&mut self, id: &str) -> Option<PostMeta> {
        let meta = self.docs.remove(id)?;
        if let Some(pos) = self.index_of(id) {
            self.order.remove(pos);
        }
        for tag in unique_tags(&meta.tags) {
            self.decrement_tag(&tag);
        }
        Some(meta)
    }

    fn decrement_tag(&mut self, tag: &str) {
        if let Some(count) = self.tag_counts.get_mut(tag) {
            *count -= 1;
            if *count == 0 {
                self.tag_counts.remove(tag);
            }
        }
    }

    fn sort(&mut self) {
        let docs = &self.docs;
        // sort_by_key is stable, equal timestamps keep insertion order
        self.order.sort_by_key(|id| docs.get(id).map(|m| m.timestamp).unwrap_or(i64::MIN));
    }

    fn refresh_tags(&mut self) {
        let mut tags: Vec<(&String, &usize)> = self.tag_counts.iter().collect();
        tags.sort_by(|(ta, ca), (tb, cb)| cb.cmp(ca).then_with(|| ta.cmp(tb)));
        self.popular_tags = tags.into_iter().map(|(t, _)| t.clone()).collect();
    }

    fn touch(&mut self) {
        self.generation = self.clock.now_millis().max(self.generation + 1);
    }
}

fn unique_tags(tags: &[String]) -> HashSet<String> {
    tags.iter().cloned().collect()
}
