use std::io;
use std::io::ErrorKind;

use ramhorns::Template;

use crate::post::{Post, PostMeta};
use crate::text_utils::{format_date_time, iso_time};
use crate::view::{post_link, ViewTag};

#[derive(ramhorns::Content)]
struct ViewLink {
    href: String,
    title: String,
}

#[derive(ramhorns::Content)]
struct ViewItem<'a> {
    site_title: &'a str,
    id: &'a str,
    permalink: String,
    post_title: &'a str,
    datetime: String,
    date: String,
    time: String,
    post_content: &'a str,
    tags: Vec<ViewTag<'a>>,
    has_filter: bool,
    filter: &'a str,
    previous: Option<ViewLink>,
    next: Option<ViewLink>,
    nav_tags: Vec<ViewTag<'a>>,
}

pub struct PostRenderer {
    pub template: Template<'static>,
    pub site_title: String,
}

impl PostRenderer {
    pub fn new(view_tpl_src: String, site_title: &str) -> io::Result<PostRenderer> {
        let template = match Template::new(view_tpl_src) {
            Ok(x) => x,
            Err(e) => {
                return Err(io::Error::new(ErrorKind::InvalidInput, format!("Error parsing post view template: {}", e)));
            }
        };

        Ok(PostRenderer {
            template,
            site_title: site_title.to_string(),
        })
    }

    /// Renders `post` with its already converted HTML body. With `filter`,
    /// links stay inside the tag.
    pub fn render(&self, post: &Post, html: &str, filter: Option<&str>, nav_tags: &[String]) -> String {
        let meta = &post.meta;
        let link = |meta: &PostMeta| ViewLink {
            href: post_link(&meta.id, filter),
            title: meta.title.clone(),
        };
        let (date, time) = format_date_time(meta.timestamp);

        self.template.render(&ViewItem {
            site_title: &self.site_title,
            id: &meta.id,
            permalink: post_link(&meta.id, None),
            post_title: &meta.title,
            datetime: iso_time(meta.timestamp),
            date,
            time,
            post_content: html,
            tags: ViewTag::list(&meta.tags, filter),
            has_filter: filter.is_some(),
            filter: filter.unwrap_or_default(),
            previous: post.previous.as_ref().map(link),
            next: post.next.as_ref().map(link),
            nav_tags: ViewTag::list(nav_tags, filter),
        })
    }
}
