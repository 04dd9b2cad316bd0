pub mod list_renderer;
pub mod markdown_renderer;
pub mod post_renderer;
pub mod rss_renderer;
pub mod sitemap_renderer;

#[derive(ramhorns::Content)]
struct ViewTag<'a> {
    tag: &'a str,
    href: String,
    current: bool,
}

impl<'a> ViewTag<'a> {
    fn list(tags: &'a [String], current: Option<&str>) -> Vec<ViewTag<'a>> {
        tags.iter()
            .map(|tag| ViewTag {
                tag: tag.as_str(),
                href: tag_link(tag),
                current: current == Some(tag.as_str()),
            })
            .collect()
    }
}

/// Site-relative link to a post, kept inside `tag` when given.
pub fn post_link(id: &str, tag: Option<&str>) -> String {
    match tag {
        Some(tag) => format!("/tag/{}/{}/", tag, id),
        None => format!("/view/{}/", id),
    }
}

pub fn tag_link(tag: &str) -> String {
    format!("/tag/{}/", tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_links() {
        assert_eq!(post_link("hello", None), "/view/hello/");
        assert_eq!(post_link("hello", Some("rust")), "/tag/rust/hello/");
        assert_eq!(tag_link("rust"), "/tag/rust/");
    }
}
