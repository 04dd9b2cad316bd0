use anyhow::{Context, Result};

use folio::poller::scan;

use crate::ScanArgs;

pub(crate) fn scan_cmd(args: ScanArgs) -> Result<()> {
    let store = args.store.open();
    let report = scan(&store)
        .with_context(|| format!("Error scanning {}", args.store.content_dir.display()))?;

    println!("{}", report);
    for tag in store.popular_tags() {
        println!("{:>5} {}", store.index().tag_count(&tag), tag);
    }
    Ok(())
}
