use std::io::Cursor;

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::post::PostMeta;
use crate::view::post_link;

/* Example
<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
<channel>
  <title>My blog</title>
  <link>https://example.com</link>
  <description>Things I write</description>
  <item>
    <title>Second post</title>
    <link>https://example.com/view/b/</link>
    <guid isPermaLink="true">https://example.com/view/b/</guid>
    <description><![CDATA[<h1>Heading in b</h1>...]]></description>
    <pubDate>Sat, 1 Mar 2014 00:00:01 +0000</pubDate>
  </item>
</channel>
</rss>
*/

/// A post ready for the feed, body already rendered to HTML.
pub struct FeedEntry {
    pub meta: PostMeta,
    pub html: String,
}

pub struct RssChannel<'a> {
    pub ch_title: &'a str,
    pub ch_link: &'a str,
    pub ch_desc: &'a str,
}

impl<'a> RssChannel<'a> {
    pub fn render(&self, entries: &[FeedEntry]) -> quick_xml::Result<Vec<u8>> {
        let mut writer = Writer::new(Cursor::new(Vec::new()));

        let decl = Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None));
        writer.write_event(decl)?;

        let mut rss = BytesStart::new("rss");
        rss.push_attribute(("version", "2.0"));
        writer.write_event(Event::Start(rss))?;
        writer.write_event(Event::Start(BytesStart::new("channel")))?;

        push_text(&mut writer, "title", self.ch_title)?;
        push_text(&mut writer, "link", self.ch_link)?;
        push_text(&mut writer, "description", self.ch_desc)?;

        for entry in entries {
            let meta = &entry.meta;
            writer.write_event(Event::Start(BytesStart::new("item")))?;

            push_text(&mut writer, "title", &meta.title)?;

            let link = full_link(self.ch_link, &meta.id);
            push_text(&mut writer, "link", &link)?;

            let mut guid = BytesStart::new("guid");
            guid.push_attribute(("isPermaLink", "true"));
            writer.write_event(Event::Start(guid))?;
            writer.write_event(Event::Text(BytesText::new(&link)))?;
            writer.write_event(Event::End(BytesEnd::new("guid")))?;

            push_cdata(&mut writer, "description", &entry.html)?;

            let published = DateTime::<Utc>::from_timestamp_millis(meta.timestamp).unwrap_or_default();
            push_text(&mut writer, "pubDate", &published.to_rfc2822())?;

            writer.write_event(Event::End(BytesEnd::new("item")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("channel")))?;
        writer.write_event(Event::End(BytesEnd::new("rss")))?;

        Ok(writer.into_inner().into_inner())
    }
}

/// Absolute post link under `host`.
pub fn full_link(host: &str, id: &str) -> String {
    format!("{}{}", host.trim_end_matches('/'), post_link(id, None))
}

pub(crate) fn push_text(writer: &mut Writer<Cursor<Vec<u8>>>, tag: &str, text: &str) -> quick_xml::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

fn push_cdata(writer: &mut Writer<Cursor<Vec<u8>>>, tag: &str, text: &str) -> quick_xml::Result<()> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    if text.contains("]]>") {
        let new_text = text.replace("]]>", "]] >");
        writer.write_event(Event::CData(BytesCData::new(&new_text)))?;
    } else {
        writer.write_event(Event::CData(BytesCData::new(text)))?;
    }
    writer.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::str;

    use super::*;

    fn entry(id: &str, timestamp: i64, html: &str) -> FeedEntry {
        FeedEntry {
            meta: PostMeta {
                id: id.to_string(),
                title: format!("title & {}", id),
                timestamp,
                ..Default::default()
            },
            html: html.to_string(),
        }
    }

    #[test]
    fn render_xml() {
        let entries = vec![
            entry("b", 1_393_632_001_000, "<h1>b</h1>"),
            entry("a", 1_393_632_000_000, "a ]]> b"),
        ];
        let rss = RssChannel {
            ch_title: "my feed",
            ch_link: "https://example.com/",
            ch_desc: "My blog feed",
        };
        let xml = rss.render(&entries).unwrap();
        assert_eq!(str::from_utf8(&xml).unwrap(), EXPECTED);
    }

    #[test]
    fn render_empty_feed() {
        let rss = RssChannel {
            ch_title: "t",
            ch_link: "https://example.com",
            ch_desc: "d",
        };
        let xml = rss.render(&[]).unwrap();
        assert!(str::from_utf8(&xml).unwrap().ends_with("<description>d</description></channel></rss>"));
    }

    #[test]
    fn test_full_link() {
        assert_eq!(full_link("https://example.com", "a"), "https://example.com/view/a/");
        assert_eq!(full_link("https://example.com/", "a"), "https://example.com/view/a/");
    }

    const EXPECTED: &str = r##"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>my feed</title><link>https://example.com/</link><description>My blog feed</description><item><title>title &amp; b</title><link>https://example.com/view/b/</link><guid isPermaLink="true">https://example.com/view/b/</guid><description><![CDATA[<h1>b</h1>]]></description><pubDate>Sat, 1 Mar 2014 00:00:01 +0000</pubDate></item><item><title>title &amp; a</title><link>https://example.com/view/a/</link><guid isPermaLink="true">https://example.com/view/a/</guid><description><![CDATA[a ]] > b]]></description><pubDate>Sat, 1 Mar 2014 00:00:00 +0000</pubDate></item></channel></rss>"##;
}
