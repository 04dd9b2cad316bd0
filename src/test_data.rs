#![cfg(test)]

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use crate::clock::ManualClock;
use crate::file_store::DirStore;
use crate::post_store::PostStore;

/// 2017-07-14T02:40:00Z, later than every sample post.
pub const NOW: i64 = 1_500_000_000_000;

pub const POST_A: &str = r#"{
  "title": "First post",
  "tags": ["x"],
  "timestamp": "2014-03-01T00:00:00.000Z",
  "updated": "2014-03-01T00:00:00.000Z"
}

Hello from **a**.

Second paragraph.
"#;

pub const POST_B: &str = r#"{
  "title": "Second post",
  "tags": ["x", "y"],
  "timestamp": "2014-03-01T00:00:01.000Z",
  "updated": "2014-03-02T00:00:00.000Z",
  "draft": false
}

## Heading in b

Body of b.
"#;

pub const POST_C_DRAFT: &str = r#"{
  "title": "Unfinished",
  "tags": ["x", "secret"],
  "timestamp": "2014-03-01T00:00:02.000Z",
  "draft": true
}

Not ready yet.
"#;

pub const POST_NO_UPDATED: &str = r#"{
  "title": "Fresh post",
  "tags": ["z"],
  "timestamp": "2015-06-01T12:00:00.000Z"
}

Just dropped into the directory.
"#;

pub const POST_BROKEN: &str = r#"{
  "title": "Broken",
  "tags": ["x"
}

The header above is not valid JSON.
"#;

/// Timestamps of POST_A and POST_B, in ms.
pub const T1: i64 = 1_393_632_000_000;
pub const T2: i64 = T1 + 1000;

/// Temporary content directory wired to a store with a manual clock.
pub struct TestBlog {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub store: PostStore,
}

impl TestBlog {
    pub fn new() -> Self {
        Self::with_files(&[])
    }

    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        for (name, data) in files {
            fs::write(dir.path().join(name), data).unwrap();
        }
        let clock = Arc::new(ManualClock::new(NOW));
        let store = PostStore::new(
            Arc::new(DirStore::new(dir.path(), ".md")),
            clock.clone(),
            ".md",
        );
        TestBlog { dir, clock, store }
    }

    /// The a/b/c scenario: two posts sharing tag x, plus a draft.
    pub fn scenario() -> Self {
        Self::with_files(&[("a.md", POST_A), ("b.md", POST_B), ("c.md", POST_C_DRAFT)])
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write_file(&self, name: &str, data: &str) {
        fs::write(self.path(name), data).unwrap();
    }

    pub fn read_file(&self, name: &str) -> String {
        fs::read_to_string(self.path(name)).unwrap()
    }
}
