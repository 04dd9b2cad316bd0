use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use folio::clock::SystemClock;
use folio::file_store::DirStore;
use folio::post_store::PostStore;

use crate::post::post_cmd;
use crate::scan::scan_cmd;

mod post;
mod scan;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
enum Args {
    /// Create a post in the content directory
    Post(PostArgs),
    /// Scan a content directory once and report what would be indexed
    Scan(ScanArgs),
}

#[derive(clap::Args, Debug)]
struct StoreArgs {
    /// Directory holding the post files
    #[arg(short, long, default_value = ".")]
    content_dir: PathBuf,

    /// Extension of post files
    #[arg(short, long, default_value = ".md")]
    extension: String,
}

impl StoreArgs {
    fn open(&self) -> PostStore {
        let files = Arc::new(DirStore::new(&self.content_dir, &self.extension));
        PostStore::new(files, Arc::new(SystemClock), &self.extension)
    }
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct PostArgs {
    /// Title of the post, also used to build its id
    #[arg(short, long)]
    title: String,

    /// Comma separated tags
    #[arg(long, default_value = "")]
    tags: String,

    /// Markdown file with the body. Reads stdin when missing
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Keep the post out of the index
    #[arg(short, long)]
    draft: bool,

    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct ScanArgs {
    #[command(flatten)]
    store: StoreArgs,
}

fn main() -> Result<()> {
    let args = Args::parse();

    match args {
        Args::Post(args) => post_cmd(args),
        Args::Scan(args) => scan_cmd(args),
    }
}
