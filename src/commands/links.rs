//! `links` command: print discovered links grouped by site.

use std::collections::HashMap;

use anyhow::Result;
use sitewatch_core::model::LinkEntry;
use sitewatch_core::store::Store;

pub async fn run_links_command(store: &Store, site_id: Option<i64>) -> Result<()> {
    if let Some(id) = site_id {
        // Unknown ids are an error rather than an empty listing.
        store.get_site(id).await?;
    }

    let names: HashMap<i64, String> = store
        .list_sites()
        .await?
        .into_iter()
        .map(|site| (site.resource.id, site.resource.name))
        .collect();
    let links = store.links(site_id).await?;

    let mut current_site = None;
    for link in &links {
        if current_site != Some(link.site_id) {
            current_site = Some(link.site_id);
            let name = names.get(&link.site_id).map_or("?", String::as_str);
            println!("{}: {name}", link.site_id);
        }
        for line in link_lines(link) {
            println!("{line}");
        }
    }
    Ok(())
}

/// Two lines per link: the title, then the indented href.
pub(crate) fn link_lines(link: &LinkEntry) -> [String; 2] {
    [format!("  {}", link.title), format!("    {}", link.href)]
}
