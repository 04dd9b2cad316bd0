use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

use serde::Deserialize;

#[derive(Deserialize, Clone)]
pub struct Paths {
    pub content_dir: PathBuf,
    pub template_dir: PathBuf,
    pub public_dir: PathBuf,
}

#[derive(Deserialize, Clone)]
pub struct Site {
    /// Scheme and host used in feed and sitemap links, without a trailing slash.
    pub host: String,
    pub title: String,
    pub description: String,
}

#[derive(Deserialize, Clone)]
#[serde(default)]
pub struct Index {
    pub extension: String,
    pub poll_interval_secs: u64,
    pub feed_size: usize,
    pub tag_nav_size: usize,
    /// Keep the rendered feed and sitemap until the index changes. Turn off
    /// while editing templates.
    pub cache_feeds: bool,
}

impl Default for Index {
    fn default() -> Self {
        Index {
            extension: ".md".to_string(),
            poll_interval_secs: 300,
            feed_size: 10,
            tag_nav_size: 6,
            cache_feeds: true,
        }
    }
}

impl Index {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }
}

#[derive(Deserialize, Clone)]
pub struct Server {
    pub address: String,
    pub port: u16,
}

#[derive(Deserialize, Clone)]
pub struct Log {
    pub level: LogLevel,
    pub log_to_console: bool,
    pub location: Option<PathBuf>,
}

#[derive(Deserialize, Copy, Clone, Debug, PartialEq)]
pub enum LogLevel {
    Critical = 0,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Deserialize, Clone)]
pub struct Config {
    pub paths: Paths,
    pub site: Site,
    #[serde(default)]
    pub index: Index,
    pub server: Server,
    pub log: Option<Log>,
}

fn parse_path(path: PathBuf) -> PathBuf {
    if !path.starts_with("${exe_dir}") {
        return path;
    }
    let Some(exe_dir) = env::current_exe().ok().and_then(|p| p.parent().map(Path::to_path_buf)) else {
        return path;
    };
    let str_path = path.to_string_lossy();
    PathBuf::from(str_path.replace("${exe_dir}", &exe_dir.to_string_lossy()))
}

pub fn parse_config(cfg_content: &str) -> io::Result<Config> {
    let mut cfg = match toml::from_str::<Config>(cfg_content) {
        Ok(cfg) => cfg,
        Err(e) => return Err(io::Error::new(
            ErrorKind::InvalidData, format!("Error parsing configuration file: {}", e))),
    };

    cfg.paths = Paths {
        content_dir: parse_path(cfg.paths.content_dir),
        template_dir: parse_path(cfg.paths.template_dir),
        public_dir: parse_path(cfg.paths.public_dir),
    };
    if let Some(log) = cfg.log.as_mut() {
        log.location = log.location.take().map(parse_path);
    }

    Ok(cfg)
}

pub fn read_config(cfg_path: &Path) -> io::Result<Config> {
    let cfg_content = match fs::read_to_string(cfg_path) {
        Ok(content) => content,
        Err(e) => return Err(io::Error::new(e.kind(), format!("Error opening configuration file {}: {}", cfg_path.display(), e))),
    };
    parse_config(&cfg_content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[paths]
content_dir = "${exe_dir}/content"
template_dir = "template"
public_dir = "public"

[site]
host = "https://example.com"
title = "My blog"
description = "Things I write"

[index]
extension = ".txt"
poll_interval_secs = 60
cache_feeds = false

[server]
address = "127.0.0.1"
port = 8080

[log]
level = "Debug"
log_to_console = true
location = "${exe_dir}/logs/folio.log"
"#;

    #[test]
    fn test_parse_config() {
        let cfg = parse_config(FULL).unwrap();
        assert_eq!(cfg.site.host, "https://example.com");
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.index.extension, ".txt");
        assert_eq!(cfg.index.poll_interval(), Duration::from_secs(60));
        // unset keys in a present section fall back to defaults
        assert_eq!(cfg.index.feed_size, 10);
        assert_eq!(cfg.index.tag_nav_size, 6);
        assert!(!cfg.index.cache_feeds);

        let exe_dir = env::current_exe().unwrap().parent().unwrap().to_path_buf();
        assert_eq!(cfg.paths.content_dir, exe_dir.join("content"));
        assert_eq!(cfg.paths.template_dir, PathBuf::from("template"));

        let log = cfg.log.unwrap();
        assert_eq!(log.level, LogLevel::Debug);
        assert_eq!(log.location, Some(exe_dir.join("logs/folio.log")));
    }

    #[test]
    fn test_optional_sections() {
        let minimal = r#"
[paths]
content_dir = "content"
template_dir = "template"
public_dir = "public"

[site]
host = "http://localhost:8080"
title = "t"
description = "d"

[server]
address = "0.0.0.0"
port = 80
"#;
        let cfg = parse_config(minimal).unwrap();
        assert_eq!(cfg.index.extension, ".md");
        assert_eq!(cfg.index.poll_interval(), Duration::from_secs(300));
        assert!(cfg.index.cache_feeds);
        assert!(cfg.log.is_none());
    }

    #[test]
    fn test_invalid_config() {
        let err = parse_config("[paths]\ncontent_dir = 1\n").err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidData);

        let err = read_config(Path::new("/not/a/folio.toml")).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
