use std::io::ErrorKind;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;
use std::{fs, io};

use chrono::{DateTime, Datelike, Utc};
use ntex::http::header;
use ntex::web;
use ntex::web::HttpRequest;
use ntex_files::NamedFile;
use spdlog::{error, info};

use crate::clock::SystemClock;
use crate::config::Config;
use crate::error::PostError;
use crate::file_store::DirStore;
use crate::generation_cache::GenerationCache;
use crate::poller::Poller;
use crate::post::{Post, PostMeta};
use crate::post_store::PostStore;
use crate::query_string::QueryString;
use crate::text_utils::year_range;
use crate::view::list_renderer::{ListRenderer, ListView};
use crate::view::markdown_renderer::{demote_headings, render_markdown};
use crate::view::post_renderer::PostRenderer;
use crate::view::rss_renderer::{FeedEntry, RssChannel};
use crate::view::sitemap_renderer::Sitemap;

const POST_TEMPLATE: &str = "post.tpl";
const LIST_TEMPLATE: &str = "list.tpl";

const NO_ARTICLES: &str = "No articles found.";
const NO_SEARCH_TERM: &str = "Please enter a search term.";

pub struct AppState {
    store: Arc<PostStore>,
    config: Config,
    post_view: PostRenderer,
    list_view: ListRenderer,
    feeds: GenerationCache<Vec<u8>>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<PostStore>, post_tpl: String, list_tpl: String) -> io::Result<AppState> {
        let post_view = PostRenderer::new(post_tpl, &config.site.title)?;
        let list_view = ListRenderer::new(list_tpl, &config.site.title)?;
        let feeds = match config.index.cache_feeds {
            true => GenerationCache::new(),
            false => GenerationCache::non_caching(),
        };
        Ok(AppState {
            store,
            config,
            post_view,
            list_view,
            feeds,
        })
    }

    fn nav_tags(&self) -> Vec<String> {
        let mut tags = self.store.popular_tags();
        tags.truncate(self.config.index.tag_nav_size);
        tags
    }

    fn render_post(&self, post: &Post, tag: Option<&str>) -> io::Result<String> {
        let html = render_markdown(&post.content)?;
        Ok(self.post_view.render(post, &html, tag, &self.nav_tags()))
    }

    fn render_list(&self, view: &ListView, posts: &[PostMeta]) -> String {
        self.list_view.render(view, posts, &self.nav_tags())
    }

    fn render_rss(&self) -> io::Result<Vec<u8>> {
        let mut entries = vec![];
        for post in self.store.latest_posts(self.config.index.feed_size) {
            let html = demote_headings(&render_markdown(&post.content)?);
            entries.push(FeedEntry { meta: post.meta, html });
        }
        let channel = RssChannel {
            ch_title: &self.config.site.title,
            ch_link: &self.config.site.host,
            ch_desc: &self.config.site.description,
        };
        channel.render(&entries).map_err(|e| io::Error::new(ErrorKind::Other, e.to_string()))
    }

    fn render_sitemap(&self) -> io::Result<Vec<u8>> {
        let mut posts = vec![];
        self.store.descending(|meta, _| {
            posts.push(meta.clone());
            ControlFlow::Continue(())
        });
        Sitemap { host: &self.config.site.host }
            .render(&posts)
            .map_err(|e| io::Error::new(ErrorKind::Other, e.to_string()))
    }

    fn message_page(&self, title: &str, message: &str) -> String {
        self.list_view.render_message(title, message, &self.nav_tags())
    }

    fn error_response(&self, err: PostError) -> web::HttpResponse {
        match err {
            PostError::EmptyResult(_) => web::HttpResponse::NotFound()
                .content_type("text/html; charset=utf-8")
                .body(self.message_page("Nothing here", NO_ARTICLES)),
            e if e.is_not_found() => web::HttpResponse::NotFound()
                .content_type("text/html; charset=utf-8")
                .body(self.message_page("Not found", "The page you are looking for is not here.")),
            e => internal_error(e),
        }
    }
}

type AppData = web::types::State<Arc<AppState>>;

fn internal_error<E: std::fmt::Display>(e: E) -> web::HttpResponse {
    error!("Error serving request: {}", e);
    web::HttpResponse::InternalServerError()
        .body(format!("Internal error: {}", e))
}

fn etag(generation: i64) -> String {
    format!("\"{}\"", generation)
}

/// The client already holds what this generation would produce.
fn not_modified(req: &HttpRequest, generation: i64) -> bool {
    req.headers().get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().trim_start_matches("W/").trim_matches('"').parse::<i64>().ok())
        .is_some_and(|seen| seen >= generation)
}

fn not_modified_response(generation: i64) -> web::HttpResponse {
    web::HttpResponse::NotModified()
        .header(header::ETAG, etag(generation))
        .finish()
}

fn page(generation: i64, body: String) -> web::HttpResponse {
    web::HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .header(header::ETAG, etag(generation))
        .body(body)
}

fn post_page(state: &AppState, req: &HttpRequest, id: Option<&str>, tag: Option<&str>) -> web::HttpResponse {
    // reading first lets an edited file bump the generation before the check
    let post = match id {
        Some(id) => state.store.read_post(id, tag),
        None => state.store.last_post(tag),
    };
    let post = match post {
        Ok(post) if post.meta.draft => return state.error_response(PostError::NotFound(post.meta.id)),
        Ok(post) => post,
        Err(e) => return state.error_response(e),
    };

    let generation = state.store.generation();
    if not_modified(req, generation) {
        return not_modified_response(generation);
    }

    match state.render_post(&post, tag) {
        Ok(body) => page(generation, body),
        Err(e) => internal_error(e),
    }
}

fn redirect(location: String) -> web::HttpResponse {
    web::HttpResponse::TemporaryRedirect()
        .header("Location", location)
        .content_type("text/html; charset=utf-8")
        .finish()
}

// Begin: Redirect region --------
#[web::get("/view/{id}")]
async fn view_wo_slash(path: web::types::Path<String>) -> web::HttpResponse {
    redirect(format!("/view/{}/", path.into_inner()))
}

#[web::get("/tag/{tag}")]
async fn tag_wo_slash(path: web::types::Path<String>) -> web::HttpResponse {
    redirect(format!("/tag/{}/", path.into_inner()))
}
// End: Redirect region --------

#[web::get("/")]
async fn index(req: HttpRequest, state: AppData) -> web::HttpResponse {
    post_page(&state, &req, None, None)
}

#[web::get("/view/{id}/")]
async fn view_post(req: HttpRequest, path: web::types::Path<String>, state: AppData) -> web::HttpResponse {
    post_page(&state, &req, Some(&path.into_inner()), None)
}

#[web::get("/tag/{tag}/{id}/")]
async fn tag_view(req: HttpRequest, path: web::types::Path<(String, String)>, state: AppData) -> web::HttpResponse {
    let (tag, id) = path.into_inner();
    post_page(&state, &req, Some(&id), Some(&tag))
}

#[web::get("/tag/{tag}/")]
async fn tag_list(req: HttpRequest, path: web::types::Path<String>, state: AppData) -> web::HttpResponse {
    let generation = state.store.generation();
    if not_modified(&req, generation) {
        return not_modified_response(generation);
    }

    let tag = path.into_inner();
    match state.store.by_tag(&tag) {
        Ok(posts) => {
            let title = format!("Posts tagged {}", tag);
            let view = ListView {
                title: &title,
                tag: Some(&tag),
                ..Default::default()
            };
            page(generation, state.render_list(&view, &posts))
        }
        Err(e) => state.error_response(e),
    }
}

#[web::get("/search")]
async fn search(req: HttpRequest, state: AppData) -> web::HttpResponse {
    let query = QueryString::from(req.uri().query().unwrap_or_default());
    let Some(term) = query.get_search() else {
        return web::HttpResponse::NotFound()
            .content_type("text/html; charset=utf-8")
            .body(state.message_page("Search", NO_SEARCH_TERM));
    };

    let generation = state.store.generation();
    match state.store.search(term) {
        Ok(posts) => {
            let title = format!("Search: {}", term);
            let view = ListView {
                title: &title,
                ..Default::default()
            };
            page(generation, state.render_list(&view, &posts))
        }
        Err(e) => state.error_response(e),
    }
}

fn browse_year(req: &HttpRequest, state: &AppState, year: i32) -> web::HttpResponse {
    let generation = state.store.generation();
    if not_modified(req, generation) {
        return not_modified_response(generation);
    }

    let Some((start, end)) = year_range(year) else {
        return state.error_response(PostError::NotFound(year.to_string()));
    };
    match state.store.range(start, end) {
        Ok(posts) => {
            let title = format!("Posts from {}", year);
            let back_href = format!("/browse/{}/", year - 1);
            let back_title = (year - 1).to_string();
            let view = ListView {
                title: &title,
                back: Some((&back_href, &back_title)),
                ..Default::default()
            };
            page(generation, state.render_list(&view, &posts))
        }
        Err(e) => state.error_response(e),
    }
}

#[web::get("/browse/")]
async fn browse(req: HttpRequest, state: AppData) -> web::HttpResponse {
    let now = DateTime::<Utc>::from_timestamp_millis(state.store.now()).unwrap_or_default();
    browse_year(&req, &state, now.year())
}

#[web::get("/browse/{year}/")]
async fn browse_with_year(req: HttpRequest, path: web::types::Path<String>, state: AppData) -> web::HttpResponse {
    let year = path.into_inner();
    let year = match year.parse::<i32>() {
        Ok(x) if year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit()) => x,
        _ => return state.error_response(PostError::NotFound(year)),
    };
    browse_year(&req, &state, year)
}

fn cached_xml<F>(req: &HttpRequest, state: &AppState, key: &str, content_type: &str, render: F) -> web::HttpResponse
    where F: FnOnce() -> io::Result<Vec<u8>>
{
    let generation = state.store.generation();
    if not_modified(req, generation) {
        return not_modified_response(generation);
    }

    match state.feeds.get_or(key, generation, render) {
        Ok(xml) => web::HttpResponse::Ok()
            .content_type(content_type)
            .header(header::ETAG, etag(generation))
            .body(xml.as_ref().clone()),
        Err(e) => internal_error(e),
    }
}

#[web::get("/rss")]
async fn rss(req: HttpRequest, state: AppData) -> web::HttpResponse {
    cached_xml(&req, &state, "rss", "application/rss+xml; charset=utf-8", || state.render_rss())
}

#[web::get("/sitemap.xml")]
async fn sitemap(req: HttpRequest, state: AppData) -> web::HttpResponse {
    cached_xml(&req, &state, "sitemap", "application/xml; charset=utf-8", || state.render_sitemap())
}

#[web::get("/view/{id}/{file}")]
async fn post_files(path: web::types::Path<(String, String)>, state: AppData) -> Result<NamedFile, web::Error> {
    let (id, file) = path.into_inner();
    let file_path = match state.store.asset_path(&id, &file) {
        Ok(file_path) => file_path,
        Err(_) => return Err(web::error::ErrorNotFound("Not found").into()),
    };
    Ok(NamedFile::open(file_path)?)
}

#[web::get("/public/{file_name}")]
async fn public_files(path: web::types::Path<String>, state: AppData) -> Result<NamedFile, web::Error> {
    if path.contains("..") {
        return Err(web::error::ErrorUnauthorized("Access forbidden").into());
    }

    let file_path = state.config.paths.public_dir.join(path.into_inner());
    Ok(NamedFile::open(file_path)?)
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.service(index)
        .service(view_post)
        .service(view_wo_slash)
        .service(post_files)
        .service(tag_list)
        .service(tag_view)
        .service(tag_wo_slash)
        .service(search)
        .service(browse)
        .service(browse_with_year)
        .service(rss)
        .service(sitemap)
        .service(public_files);
}

fn read_template(template_dir: &Path, name: &str) -> io::Result<String> {
    let template_path = template_dir.join(name);
    match fs::read_to_string(&template_path) {
        Ok(src) => Ok(src),
        Err(e) => Err(io::Error::new(e.kind(), format!("Error reading template {}: {}", template_path.display(), e))),
    }
}

pub async fn server_run(config: Config) -> io::Result<()> {
    let content_dir = &config.paths.content_dir;
    fs::create_dir_all(content_dir)?;
    info!("Serving posts from {}", content_dir.display());

    let post_tpl = read_template(&config.paths.template_dir, POST_TEMPLATE)?;
    let list_tpl = read_template(&config.paths.template_dir, LIST_TEMPLATE)?;

    let files = Arc::new(DirStore::new(content_dir, &config.index.extension));
    let store = Arc::new(PostStore::new(files, Arc::new(SystemClock), &config.index.extension));
    let mut poller = Poller::start(store.clone(), config.index.poll_interval());

    let bind_addr = config.server.address.clone();
    let bind_port = config.server.port;
    let app_state = Arc::new(AppState::new(config, store, post_tpl, list_tpl)?);

    let res = web::HttpServer::new(move || {
        web::App::new()
            .state(app_state.clone())
            .configure(routes)
    })
        .bind((bind_addr, bind_port))?
        .run()
        .await;

    poller.stop();
    res
}

#[cfg(test)]
mod tests {
    use ntex::http::StatusCode;
    use ntex::web::test;
    use tempfile::TempDir;

    use crate::clock::ManualClock;
    use crate::config::parse_config;
    use crate::poller::scan;
    use crate::test_data::*;

    use super::*;

    const POST_TPL: &str = "{{post_title}}|{{{post_content}}}|{{#previous}}prev={{href}}{{/previous}}|{{#next}}next={{href}}{{/next}}";
    const LIST_TPL: &str = "{{page_title}}|{{#post_list}}{{href}};{{/post_list}}|{{message}}|{{#back}}{{href}}{{/back}}";

    fn state(dir: &TempDir) -> Arc<AppState> {
        state_with(dir, "")
    }

    fn state_with(dir: &TempDir, index_section: &str) -> Arc<AppState> {
        let config = parse_config(&format!(r#"
{1}
[paths]
content_dir = "{0}"
template_dir = "{0}"
public_dir = "{0}"

[site]
host = "https://example.com"
title = "My blog"
description = "Things I write"

[server]
address = "127.0.0.1"
port = 8080
"#, dir.path().display(), index_section)).unwrap();

        let store = PostStore::new(
            Arc::new(DirStore::new(dir.path(), ".md")),
            Arc::new(ManualClock::new(NOW)),
            ".md",
        );
        scan(&store).unwrap();
        Arc::new(AppState::new(config, Arc::new(store), POST_TPL.to_string(), LIST_TPL.to_string()).unwrap())
    }

    fn blog_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, data) in [("a.md", POST_A), ("b.md", POST_B), ("c.md", POST_C_DRAFT)] {
            fs::write(dir.path().join(name), data).unwrap();
        }
        dir
    }

    async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, String) {
        let app = test::init_service(web::App::new().state(state.clone()).configure(routes)).await;
        let req = test::TestRequest::with_uri(uri).to_request();
        let resp = test::call_service(&app, req).await;
        let status = resp.status();
        let body = test::read_body(resp).await;
        (status, String::from_utf8_lossy(&body).to_string())
    }

    #[ntex::test]
    async fn test_index_shows_latest() {
        let dir = blog_dir();
        let (status, body) = get(&state(&dir), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("Second post|<h2>Heading in b</h2>"), "{}", body);
        assert!(body.ends_with("|prev=/view/a/|"), "{}", body);
    }

    #[ntex::test]
    async fn test_view_and_tag_view() {
        let dir = blog_dir();
        let state = state(&dir);

        let (status, body) = get(&state, "/view/a/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.ends_with("||next=/view/b/"), "{}", body);

        let (status, body) = get(&state, "/tag/x/a/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.ends_with("||next=/tag/x/b/"), "{}", body);

        let (status, _) = get(&state, "/tag/y/a/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = get(&state, "/view/c/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get(&state, "/view/nope/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[ntex::test]
    async fn test_redirect() {
        let dir = blog_dir();
        let app = test::init_service(web::App::new().state(state(&dir)).configure(routes)).await;
        let req = test::TestRequest::with_uri("/view/a").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(resp.headers().get("Location").unwrap().to_str().unwrap(), "/view/a/");
    }

    #[ntex::test]
    async fn test_lists() {
        let dir = blog_dir();
        let state = state(&dir);

        let (status, body) = get(&state, "/tag/x/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Posts tagged x|/tag/x/b/;/tag/x/a/;||");

        let (status, body) = get(&state, "/tag/secret/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains(NO_ARTICLES));

        let (status, body) = get(&state, "/search?search=FIRST").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Search: FIRST|/view/a/;||");

        let (status, body) = get(&state, "/search?search=+").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains(NO_SEARCH_TERM));

        let (status, body) = get(&state, "/browse/2014/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Posts from 2014|/view/b/;/view/a/;||/browse/2013/");

        let (status, _) = get(&state, "/browse/2013/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = get(&state, "/browse/14/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[ntex::test]
    async fn test_feed_and_etag() {
        let dir = blog_dir();
        let state = state(&dir);
        let generation = state.store.generation();

        let app = test::init_service(web::App::new().state(state.clone()).configure(routes)).await;
        let req = test::TestRequest::with_uri("/rss").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get(header::ETAG).unwrap().to_str().unwrap(), etag(generation));
        let body = test::read_body(resp).await;
        let body = String::from_utf8_lossy(&body);
        assert!(body.contains("<![CDATA[<h1>Heading in b</h1>"), "{}", body);
        assert!(!body.contains("Unfinished"));

        let req = test::TestRequest::with_uri("/rss")
            .header(header::IF_NONE_MATCH, etag(generation))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);

        let req = test::TestRequest::with_uri("/sitemap.xml")
            .header(header::IF_NONE_MATCH, etag(generation - 1))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = test::read_body(resp).await;
        assert!(String::from_utf8_lossy(&body).contains("<loc>https://example.com/view/a/</loc>"));
    }

    #[ntex::test]
    async fn test_edited_post_is_not_served_from_client_cache() {
        let dir = blog_dir();
        let state = state(&dir);
        let generation = state.store.generation();
        let app = test::init_service(web::App::new().state(state.clone()).configure(routes)).await;

        let edited = POST_A
            .replace("\"updated\": \"2014-03-01T00:00:00.000Z\"", "\"updated\": \"2016-01-01T00:00:00.000Z\"")
            .replace("Hello from **a**.", "Edited on disk.");
        fs::write(dir.path().join("a.md"), edited).unwrap();

        let req = test::TestRequest::with_uri("/view/a/")
            .header(header::IF_NONE_MATCH, etag(generation))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let new_generation = state.store.generation();
        assert!(new_generation > generation);
        assert_eq!(resp.headers().get(header::ETAG).unwrap().to_str().unwrap(), etag(new_generation));
        let body = test::read_body(resp).await;
        assert!(String::from_utf8_lossy(&body).contains("<p>Edited on disk.</p>"));

        let req = test::TestRequest::with_uri("/view/a/")
            .header(header::IF_NONE_MATCH, etag(new_generation))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_MODIFIED);
    }

    #[ntex::test]
    async fn test_feed_cache_switch() {
        // same `updated`, so the edit leaves the generation alone
        let edited = POST_B.replace("Body of b.", "Body of b, edited.");

        let dir = blog_dir();
        let state = state(&dir);
        let (_, body) = get(&state, "/rss").await;
        assert!(body.contains("Body of b.</p>"), "{}", body);
        fs::write(dir.path().join("b.md"), &edited).unwrap();
        let (_, body) = get(&state, "/rss").await;
        assert!(body.contains("Body of b.</p>"), "{}", body);

        let dir = blog_dir();
        let state = state_with(&dir, "[index]\ncache_feeds = false");
        get(&state, "/rss").await;
        fs::write(dir.path().join("b.md"), &edited).unwrap();
        let (_, body) = get(&state, "/rss").await;
        assert!(body.contains("Body of b, edited.</p>"), "{}", body);
    }

    #[ntex::test]
    async fn test_empty_blog() {
        let dir = TempDir::new().unwrap();
        let (status, _) = get(&state(&dir), "/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
