use std::io::Cursor;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;

use crate::post::PostMeta;
use crate::text_utils::iso_time;
use crate::view::rss_renderer::{full_link, push_text};

const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

pub struct Sitemap<'a> {
    pub host: &'a str,
}

impl Sitemap<'_> {
    /// One `<url>` per post plus the site root, which gets the lowest priority.
    pub fn render(&self, posts: &[PostMeta]) -> quick_xml::Result<Vec<u8>> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut urlset = BytesStart::new("urlset");
        urlset.push_attribute(("xmlns", SITEMAP_NS));
        writer.write_event(Event::Start(urlset))?;

        for meta in posts {
            writer.write_event(Event::Start(BytesStart::new("url")))?;
            push_text(&mut writer, "loc", &full_link(self.host, &meta.id))?;
            push_text(&mut writer, "lastmod", &iso_time(meta.updated))?;
            push_text(&mut writer, "priority", "0.5")?;
            writer.write_event(Event::End(BytesEnd::new("url")))?;
        }

        writer.write_event(Event::Start(BytesStart::new("url")))?;
        push_text(&mut writer, "loc", &format!("{}/", self.host.trim_end_matches('/')))?;
        push_text(&mut writer, "priority", "0")?;
        writer.write_event(Event::End(BytesEnd::new("url")))?;

        writer.write_event(Event::End(BytesEnd::new("urlset")))?;
        Ok(writer.into_inner().into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::str;

    use super::*;

    #[test]
    fn render_sitemap() {
        let posts = vec![PostMeta {
            id: "b".to_string(),
            updated: 1_393_718_400_000,
            ..Default::default()
        }];
        let xml = Sitemap { host: "https://example.com" }.render(&posts).unwrap();
        assert_eq!(str::from_utf8(&xml).unwrap(), concat!(
            r#"<?xml version="1.0" encoding="UTF-8"?>"#,
            r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#,
            r#"<url><loc>https://example.com/view/b/</loc><lastmod>2014-03-02T00:00:00.000Z</lastmod><priority>0.5</priority></url>"#,
            r#"<url><loc>https://example.com/</loc><priority>0</priority></url>"#,
            r#"</urlset>"#,
        ));
    }
}
