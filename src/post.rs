use std::fmt;
use std::fmt::{Display, Formatter};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{PostError, Result};
use crate::text_utils::{iso_time, parse_time};

/// Header keys that are never written to disk.
const TRANSIENT_KEYS: [&str; 4] = ["id", "content", "previous", "next"];

/// Keys with a dedicated field in [`PostMeta`].
const KNOWN_KEYS: [&str; 5] = ["title", "tags", "timestamp", "updated", "draft"];

/// Index view of a post: everything except the body.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PostMeta {
    pub id: String,
    pub title: String,
    pub tags: Vec<String>,
    /// Creation time in ms, the sort key.
    pub timestamp: i64,
    /// Last modification in ms.
    pub updated: i64,
    pub draft: bool,
    /// Any other header fields, kept in file order.
    pub extra: Map<String, Value>,
}

impl PostMeta {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Post {
    pub meta: PostMeta,
    pub content: String,
    pub previous: Option<PostMeta>,
    pub next: Option<PostMeta>,
}

impl Display for Post {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "id={}, timestamp={}, tags={:?}\ntitle={}\ncontent:\n{}",
               self.meta.id,
               iso_time(self.meta.timestamp),
               self.meta.tags,
               self.meta.title,
               self.content
        )
    }
}

/// Fields a caller may set when writing a post. `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct PostFields {
    pub title: Option<String>,
    pub tags: Option<Vec<String>>,
    pub timestamp: Option<i64>,
    pub draft: Option<bool>,
    pub content: Option<String>,
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawHeader {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    updated: Option<Value>,
    #[serde(default)]
    draft: Option<bool>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Header as read from disk. `updated` stays `None` when the file has none,
/// so callers can decide how to default it.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub meta: PostMeta,
    pub has_updated: bool,
}

/// Parses a JSON front-matter block. A missing or unreadable `timestamp`
/// becomes `now`; a missing `updated` is reported through `has_updated`.
pub fn parse_header(id: &str, header: &str, now: i64) -> Result<Header> {
    let raw: RawHeader = serde_json::from_str(header)
        .map_err(|e| PostError::parse(id, e))?;

    let timestamp = raw.timestamp.as_ref().and_then(parse_time).unwrap_or(now);
    let updated = raw.updated.as_ref().and_then(parse_time);

    let mut extra = raw.extra;
    extra.retain(|key, _| !TRANSIENT_KEYS.contains(&key.as_str()));

    Ok(Header {
        meta: PostMeta {
            id: id.to_string(),
            title: raw.title.unwrap_or_default(),
            tags: raw.tags.unwrap_or_default(),
            timestamp,
            updated: updated.unwrap_or(now),
            draft: raw.draft.unwrap_or(false),
            extra,
        },
        has_updated: updated.is_some(),
    })
}

/// Splits a post file at the first blank line.
pub fn split_file(file: &str, data: &str) -> Result<(String, String)> {
    let data = data.replace("\r\n", "\n").replace('\r', "\n");
    match data.split_once("\n\n") {
        Some((header, body)) if !header.trim().is_empty() => Ok((header.to_string(), body.to_string())),
        _ => Err(PostError::parse(file, "missing header or blank line after it")),
    }
}

pub fn parse_post(id: &str, data: &str, now: i64) -> Result<(Post, bool)> {
    let (header, content) = split_file(id, data)?;
    let Header { meta, has_updated } = parse_header(id, &header, now)?;
    let post = Post {
        meta,
        content,
        previous: None,
        next: None,
    };
    Ok((post, has_updated))
}

/// Renders the on-disk form: pretty JSON header, blank line, raw body.
pub fn render_post(post: &Post) -> Result<String> {
    let meta = &post.meta;
    let mut header = Map::new();
    header.insert("title".to_string(), Value::String(meta.title.clone()));
    header.insert("tags".to_string(), Value::from(meta.tags.clone()));
    header.insert("timestamp".to_string(), Value::String(iso_time(meta.timestamp)));
    header.insert("updated".to_string(), Value::String(iso_time(meta.updated)));
    if meta.draft {
        header.insert("draft".to_string(), Value::Bool(true));
    }
    for (key, val) in meta.extra.iter() {
        if TRANSIENT_KEYS.contains(&key.as_str()) || KNOWN_KEYS.contains(&key.as_str()) {
            continue;
        }
        header.insert(key.clone(), val.clone());
    }

    let mut out = serde_json::to_string_pretty(&Value::Object(header))
        .map_err(|e| PostError::parse(&meta.id, e))?;
    out.push_str("\n\n");
    out.push_str(&post.content);
    Ok(out)
}

/// Applies caller-supplied fields on top of a post.
pub fn merge_fields(post: &mut Post, fields: PostFields) {
    let PostFields { title, tags, timestamp, draft, content, extra } = fields;
    if let Some(title) = title {
        post.meta.title = title;
    }
    if let Some(tags) = tags {
        post.meta.tags = tags;
    }
    if let Some(timestamp) = timestamp {
        post.meta.timestamp = timestamp;
    }
    if let Some(draft) = draft {
        post.meta.draft = draft;
    }
    if let Some(content) = content {
        post.content = content;
    }
    for (key, val) in extra {
        post.meta.extra.insert(key, val);
    }
}

/// Rejects ids that could escape the content directory.
pub fn validate_id(id: &str) -> Result<()> {
    let invalid = id.is_empty()
        || id.starts_with('.')
        || id.contains('/')
        || id.contains('\\')
        || id.contains("..")
        || id.contains('\0');
    if invalid {
        return Err(PostError::InvalidId(id.to_string()));
    }
    Ok(())
}

/// Splits a comma separated tag list, as typed in forms and on the command line.
pub fn split_tags(tags: &str) -> Vec<String> {
    tags.split(',')
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::test_data::{POST_A, POST_NO_UPDATED};

    use super::*;

    #[test]
    fn test_parse_post() {
        let (post, has_updated) = parse_post("a", POST_A, 0).unwrap();
        assert!(has_updated);
        assert_eq!(post.meta.id, "a");
        assert_eq!(post.meta.title, "First post");
        assert_eq!(post.meta.tags, ["x"]);
        assert_eq!(post.meta.timestamp, 1_393_632_000_000);
        assert_eq!(post.meta.updated, 1_393_632_000_000);
        assert!(!post.meta.draft);
        assert_eq!(post.content, "Hello from **a**.\n\nSecond paragraph.\n");
    }

    #[test]
    fn test_parse_without_updated() {
        let (post, has_updated) = parse_post("n", POST_NO_UPDATED, 777).unwrap();
        assert!(!has_updated);
        assert_eq!(post.meta.updated, 777);
    }

    #[test]
    fn test_crlf_is_normalized() {
        let data = POST_A.replace('\n', "\r\n");
        let (post, _) = parse_post("a", &data, 0).unwrap();
        assert_eq!(post.content, "Hello from **a**.\n\nSecond paragraph.\n");
    }

    #[test]
    fn test_missing_separator() {
        let err = parse_post("bad", "{\"title\": \"x\"}", 0).unwrap_err();
        assert!(matches!(err, PostError::Parse { .. }));
        let err = parse_post("bad", "\n\nbody only", 0).unwrap_err();
        assert!(matches!(err, PostError::Parse { .. }));
    }

    #[test]
    fn test_malformed_header() {
        let err = parse_post("bad", "{ title: oops\n\nbody", 0).unwrap_err();
        assert!(matches!(err, PostError::Parse { .. }));
    }

    #[test]
    fn test_missing_timestamp_defaults_to_now() {
        let header = parse_header("t", r#"{"title": "t", "timestamp": "garbage"}"#, 5_000).unwrap();
        assert_eq!(header.meta.timestamp, 5_000);
        assert!(header.meta.tags.is_empty());
    }

    #[test]
    fn test_extra_fields_survive() {
        let header = parse_header("t", r#"{"title": "t", "author": "me", "id": "other", "next": {}}"#, 0).unwrap();
        assert_eq!(header.meta.extra.get("author"), Some(&json!("me")));
        assert!(header.meta.extra.get("id").is_none());
        assert!(header.meta.extra.get("next").is_none());
    }

    #[test]
    fn test_render_post() {
        let mut post = Post::default();
        post.meta.id = "hello".to_string();
        post.meta.title = "Hello".to_string();
        post.meta.tags = vec!["x".to_string(), "y".to_string()];
        post.meta.timestamp = 0;
        post.meta.updated = 1_000;
        post.meta.extra.insert("author".to_string(), json!("me"));
        post.meta.extra.insert("previous".to_string(), json!("leak"));
        post.content = "Body\n".to_string();
        post.previous = Some(PostMeta::default());

        let out = render_post(&post).unwrap();
        assert_eq!(out, r#"{
  "title": "Hello",
  "tags": [
    "x",
    "y"
  ],
  "timestamp": "1970-01-01T00:00:00.000Z",
  "updated": "1970-01-01T00:00:01.000Z",
  "author": "me"
}

Body
"#);
    }

    #[test]
    fn test_render_then_parse() {
        let (post, _) = parse_post("a", POST_A, 0).unwrap();
        let out = render_post(&post).unwrap();
        let (back, has_updated) = parse_post("a", &out, 0).unwrap();
        assert!(has_updated);
        assert_eq!(back, post);
    }

    #[test]
    fn test_empty_body_round_trip() {
        let mut post = Post::default();
        post.meta.id = "empty".to_string();
        let out = render_post(&post).unwrap();
        let (back, _) = parse_post("empty", &out, 0).unwrap();
        assert_eq!(back.content, "");
    }

    #[test]
    fn test_merge_fields() {
        let (mut post, _) = parse_post("a", POST_A, 0).unwrap();
        merge_fields(&mut post, PostFields {
            tags: Some(vec!["z".to_string()]),
            content: Some("new".to_string()),
            ..Default::default()
        });
        assert_eq!(post.meta.title, "First post");
        assert_eq!(post.meta.tags, ["z"]);
        assert_eq!(post.content, "new");
    }

    #[test]
    fn test_validate_id() {
        assert!(validate_id("hello-world").is_ok());
        assert!(validate_id("2014_notes").is_ok());
        assert!(validate_id("").is_err());
        assert!(validate_id("../etc/passwd").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id(".hidden").is_err());
    }

    #[test]
    fn test_split_tags() {
        assert_eq!(split_tags("rust, web ,, blog"), ["rust", "web", "blog"]);
        assert!(split_tags("  ").is_empty());
    }
}
