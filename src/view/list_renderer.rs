use std::io;
use std::io::ErrorKind;

use ramhorns::Template;

use crate::post::PostMeta;
use crate::text_utils::{format_date_time, iso_time};
use crate::view::{post_link, ViewTag};

#[derive(ramhorns::Content)]
struct ListPage<'a> {
    site_title: &'a str,
    page_title: &'a str,
    post_list: Vec<PostItem<'a>>,
    message: &'a str,
    tags: Vec<ViewTag<'a>>,
    back: Option<BackLink<'a>>,
}

#[derive(ramhorns::Content)]
struct PostItem<'a> {
    href: String,
    title: &'a str,
    datetime: String,
    date: String,
    time: String,
}

#[derive(ramhorns::Content)]
struct BackLink<'a> {
    href: &'a str,
    title: &'a str,
}

/// What a list page shows besides the posts themselves.
#[derive(Default)]
pub struct ListView<'a> {
    pub title: &'a str,
    /// Items link inside this tag.
    pub tag: Option<&'a str>,
    /// Shown instead of, or next to, the list; used for empty results.
    pub message: &'a str,
    /// `(href, title)` of a link to a neighbouring list.
    pub back: Option<(&'a str, &'a str)>,
}

pub struct ListRenderer {
    pub template: Template<'static>,
    pub site_title: String,
}

impl ListRenderer {
    pub fn new(list_tpl_src: String, site_title: &str) -> io::Result<ListRenderer> {
        let template = match Template::new(list_tpl_src) {
            Ok(x) => x,
            Err(e) => {
                return Err(io::Error::new(ErrorKind::InvalidInput, format!("Error parsing list template: {}", e)));
            }
        };

        Ok(ListRenderer {
            template,
            site_title: site_title.to_string(),
        })
    }

    pub fn render(&self, view: &ListView, posts: &[PostMeta], nav_tags: &[String]) -> String {
        let post_list = posts.iter()
            .map(|meta| {
                let (date, time) = format_date_time(meta.timestamp);
                PostItem {
                    href: post_link(&meta.id, view.tag),
                    title: meta.title.as_str(),
                    datetime: iso_time(meta.timestamp),
                    date,
                    time,
                }
            })
            .collect();

        self.template.render(&ListPage {
            site_title: &self.site_title,
            page_title: view.title,
            post_list,
            message: view.message,
            tags: ViewTag::list(nav_tags, view.tag),
            back: view.back.map(|(href, title)| BackLink { href, title }),
        })
    }

    /// A page with a message and no posts, for errors and empty results.
    pub fn render_message(&self, title: &str, message: &str, nav_tags: &[String]) -> String {
        let view = ListView {
            title,
            message,
            ..Default::default()
        };
        self.render(&view, &[], nav_tags)
    }
}
