use std::io::ErrorKind;
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};
use spdlog::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{PostError, Result};
use crate::file_store::FileStore;
use crate::poller::{scan, ScanReport};
use crate::post::{merge_fields, parse_post, render_post, validate_id, Post, PostFields, PostMeta};
use crate::post_index::PostIndex;
use crate::text_utils::slugify;

const DATA_FILE: &str = "data.json";

/// Reads, writes and deletes posts on disk and keeps the [`PostIndex`] in step.
pub struct PostStore {
    files: Arc<dyn FileStore>,
    clock: Arc<dyn Clock>,
    index: RwLock<PostIndex>,
    extension: String,
    // serializes writers, readers go through the index lock only
    write_lock: Mutex<()>,
    scanning: AtomicBool,
}

impl PostStore {
    pub fn new(files: Arc<dyn FileStore>, clock: Arc<dyn Clock>, extension: &str) -> PostStore {
        PostStore {
            files,
            index: RwLock::new(PostIndex::new(clock.clone())),
            clock,
            extension: extension.to_string(),
            write_lock: Mutex::new(()),
            scanning: AtomicBool::new(false),
        }
    }

    pub fn index(&self) -> RwLockReadGuard<'_, PostIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn index_mut(&self) -> RwLockWriteGuard<'_, PostIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn files(&self) -> &dyn FileStore {
        self.files.as_ref()
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn now(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn file_name(&self, id: &str) -> String {
        format!("{}{}", id, self.extension)
    }

    /// Id of a content file name, if it carries the post extension.
    pub fn id_from_file<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        file_name.strip_suffix(self.extension.as_str()).filter(|id| !id.is_empty())
    }

    /// Runs a directory scan unless one is already in progress.
    pub fn try_scan(&self) -> Option<Result<ScanReport>> {
        if !self.begin_scan() {
            return None;
        }
        let res = scan(self);
        self.end_scan();
        Some(res)
    }

    fn begin_scan(&self) -> bool {
        self.scanning.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    fn end_scan(&self) {
        self.scanning.store(false, Ordering::Release);
    }

    fn writer(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reads a post from disk with its neighbours attached.
    ///
    /// A post without an `updated` time is treated as new: it is stamped and
    /// written back before being indexed. With `tag`, a post lacking the tag
    /// is reported as not found and the neighbours only count tagged posts.
    pub fn read_post(&self, id: &str, tag: Option<&str>) -> Result<Post> {
        validate_id(id)?;
        let (post, has_updated) = self.load(id)?;

        if let Some(tag) = tag {
            if !post.meta.has_tag(tag) {
                return Err(PostError::NotFound(id.to_string()));
            }
        }

        let post = if has_updated {
            self.index_mut().sync(&post);
            post
        } else {
            self.stamp(id)?
        };

        Ok(self.with_adjacency(post, tag))
    }

    /// Writes back a post found without `updated`. The file is read again
    /// under the writer lock so a write that landed meanwhile is kept.
    fn stamp(&self, id: &str) -> Result<Post> {
        let _writer = self.writer();
        let (post, has_updated) = self.load(id)?;
        if has_updated {
            self.index_mut().sync(&post);
            return Ok(post);
        }
        info!("Post {} has no updated time, stamping it", id);
        self.persist(post)
    }

    /// Merges `fields` onto the stored post (or a new one) and writes it.
    pub fn write_post(&self, id: &str, fields: PostFields) -> Result<Post> {
        validate_id(id)?;
        let _writer = self.writer();

        let mut post = match self.load(id) {
            Ok((post, _)) => post,
            Err(PostError::NotFound(_)) => {
                let mut post = Post::default();
                post.meta.id = id.to_string();
                post.meta.timestamp = self.now();
                post
            }
            Err(e) => return Err(e),
        };

        let has_content = fields.content.is_some() || self.files.exists(&self.file_name(id));
        if !has_content {
            return Err(PostError::MissingContent(id.to_string()));
        }
        merge_fields(&mut post, fields);
        self.persist(post)
    }

    /// Creates a post whose id is derived from its title.
    pub fn create_post(&self, fields: PostFields) -> Result<Post> {
        let title = fields.title.as_deref().unwrap_or_default();
        let id = slugify(title);
        self.write_post(&id, fields)
    }

    /// Deletes the post file, its asset directory and its index entry.
    pub fn remove_post(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        let _writer = self.writer();

        let indexed = self.index_mut().remove(id).is_some();
        match self.files.delete(&self.file_name(id)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if !indexed {
                    return Err(PostError::NotFound(id.to_string()));
                }
            }
            Err(e) => return Err(e.into()),
        }
        self.files.remove_assets(id)?;
        info!("Removed post {}", id);
        Ok(())
    }

    /// Small structured extras kept next to the post, outside its header.
    pub fn retrieve_data(&self, id: &str) -> Result<Map<String, Value>> {
        validate_id(id)?;
        let data = match self.files.read_asset(id, DATA_FILE) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&data).map_err(|e| PostError::parse(&format!("{}/{}", id, DATA_FILE), e))
    }

    pub fn store_data(&self, id: &str, key: &str, val: Value) -> Result<()> {
        let _writer = self.writer();
        let mut data = self.retrieve_data(id)?;
        data.insert(key.to_string(), val);
        let out = serde_json::to_string(&data).map_err(|e| PostError::parse(id, e))?;
        self.files.write_asset(id, DATA_FILE, &out)?;
        Ok(())
    }

    pub fn asset_path(&self, id: &str, file: &str) -> Result<PathBuf> {
        validate_id(id)?;
        validate_id(file)?;
        Ok(self.files.asset_path(id, file))
    }

    /// Newest post, or the newest one carrying `tag`.
    pub fn last_post(&self, tag: Option<&str>) -> Result<Post> {
        let id = {
            let index = self.index();
            match index.last(tag) {
                Some(meta) => meta.id.clone(),
                None => return Err(PostError::NotFound(tag.unwrap_or("latest post").to_string())),
            }
        };
        self.read_post(&id, tag)
    }

    pub fn latest(&self, count: usize) -> Vec<PostMeta> {
        self.index().latest(count)
    }

    /// Newest posts with their content. Posts that fail to load are skipped.
    pub fn latest_posts(&self, count: usize) -> Vec<Post> {
        self.latest(count)
            .into_iter()
            .filter_map(|meta| match self.read_post(&meta.id, None) {
                Ok(post) => Some(post),
                Err(e) => {
                    warn!("Skipping post {}: {}", meta.id, e);
                    None
                }
            })
            .collect()
    }

    pub fn by_tag(&self, tag: &str) -> Result<Vec<PostMeta>> {
        non_empty(self.index().by_tag(tag), || format!("tag {}", tag))
    }

    pub fn search(&self, term: &str) -> Result<Vec<PostMeta>> {
        non_empty(self.index().search(term), || format!("search {}", term))
    }

    pub fn range(&self, start: i64, end: i64) -> Result<Vec<PostMeta>> {
        non_empty(self.index().range(start, end), || format!("range {}..{}", start, end))
    }

    pub fn ascending<F>(&self, visit: F)
        where F: FnMut(&PostMeta, usize) -> ControlFlow<()>
    {
        self.index().ascending(visit)
    }

    pub fn descending<F>(&self, visit: F)
        where F: FnMut(&PostMeta, usize) -> ControlFlow<()>
    {
        self.index().descending(visit)
    }

    pub fn popular_tags(&self) -> Vec<String> {
        self.index().popular_tags().to_vec()
    }

    pub fn is_tag(&self, tag: &str) -> bool {
        self.index().tag_count(tag) > 0
    }

    pub fn generation(&self) -> i64 {
        self.index().generation()
    }

    pub fn len(&self) -> usize {
        self.index().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index().is_empty()
    }

    /// Reads and parses the backing file. A vanished file is dropped from the index.
    fn load(&self, id: &str) -> Result<(Post, bool)> {
        let data = match self.files.read(&self.file_name(id)) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if self.index_mut().remove(id).is_some() {
                    info!("Post {} disappeared from disk, dropped from index", id);
                }
                return Err(PostError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        parse_post(id, &data, self.now())
    }

    /// Stamps `updated`, writes the file and syncs the index. The writer
    /// lock must be held.
    fn persist(&self, mut post: Post) -> Result<Post> {
        post.meta.updated = self.now();
        post.previous = None;
        post.next = None;

        let out = render_post(&post)?;
        self.files.write(&self.file_name(&post.meta.id), &out)?;
        self.index_mut().sync(&post);
        debug!("Wrote post {}", post.meta.id);
        Ok(post)
    }

    fn with_adjacency(&self, mut post: Post, tag: Option<&str>) -> Post {
        let (previous, next) = self.index().adjacent(&post.meta.id, tag);
        post.previous = previous;
        post.next = next;
        post
    }
}

fn non_empty<F>(items: Vec<PostMeta>, describe: F) -> Result<Vec<PostMeta>>
    where F: FnOnce() -> String
{
    if items.is_empty() {
        return Err(PostError::EmptyResult(describe()));
    }
    Ok(items)
}
