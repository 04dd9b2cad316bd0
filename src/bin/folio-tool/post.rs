use std::fs;
use std::io::{self, Read};

use anyhow::{bail, Context, Result};

use folio::post::{split_tags, PostFields};

use crate::PostArgs;

fn read_body(args: &PostArgs) -> Result<String> {
    match args.file {
        Some(ref file) => fs::read_to_string(file)
            .with_context(|| format!("Error reading {}", file.display())),
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("Error reading stdin")?;
            Ok(buf)
        }
    }
}

pub(crate) fn post_cmd(args: PostArgs) -> Result<()> {
    if args.title.trim().is_empty() {
        bail!("A post needs a title");
    }

    let content = read_body(&args)?;
    let store = args.store.open();
    let fields = PostFields {
        title: Some(args.title.trim().to_string()),
        tags: Some(split_tags(&args.tags)),
        draft: args.draft.then_some(true),
        content: Some(content),
        ..Default::default()
    };

    let post = store.create_post(fields)?;
    println!("{}", post.meta.id);
    Ok(())
}
