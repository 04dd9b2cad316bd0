use std::io;
use std::io::ErrorKind;

use lazy_static::lazy_static;
use markdown::Options;
use regex::{Captures, Regex};

/// Post body to HTML, GitHub flavoured.
pub fn render_markdown(md_text: &str) -> io::Result<String> {
    match markdown::to_html_with_options(md_text, &Options::gfm()) {
        Ok(x) => Ok(x),
        Err(e) => Err(io::Error::new(ErrorKind::InvalidInput, e.to_string())),
    }
}

/// Moves `h2`..`h6` one level up, so a post keeps a sane outline once it is
/// embedded in a feed.
pub fn demote_headings(html: &str) -> String {
    lazy_static! {
        static ref HEADING: Regex = Regex::new(r"(?i)(</?h)([2-6])([\s>/])").unwrap();
    }

    HEADING.replace_all(html, |caps: &Captures| {
        let level = caps[2].parse::<u8>().unwrap_or(2);
        format!("{}{}{}", &caps[1], level - 1, &caps[3])
    }).into_owned()
}
