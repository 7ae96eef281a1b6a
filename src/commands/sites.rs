//! Site management commands: list, show, add, modify, remove.

use anyhow::{Result, bail};
use sitewatch_core::model::HeaderMap;
use sitewatch_core::store::{NewSite, SiteRecord, SiteUpdate, Store};
use tracing::info;

use crate::cli::{AddArgs, ListArgs, ModifyArgs};

pub async fn run_list_command(store: &Store, args: &ListArgs) -> Result<()> {
    for site in store.list_sites().await? {
        let lines = if args.long {
            site_detail_lines(&site)
        } else {
            vec![site_heading(&site)]
        };
        for line in lines {
            println!("{line}");
        }
    }
    Ok(())
}

pub async fn run_show_command(store: &Store, site_id: i64) -> Result<()> {
    let site = store.get_site(site_id).await?;
    for line in site_detail_lines(&site) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_add_command(store: &Store, args: AddArgs) -> Result<()> {
    let site = NewSite {
        name: args.name,
        url: args.url,
        css_selector: args.css_selector,
        headers: collect_headers(args.headers),
    };
    let id = store.add_site(&site).await?;
    info!(site_id = id, name = %site.name, "site added");
    println!("{id}: {}", site.name);
    Ok(())
}

pub async fn run_modify_command(store: &Store, args: ModifyArgs) -> Result<()> {
    let headers = if args.clear_headers {
        Some(HeaderMap::new())
    } else if args.headers.is_empty() {
        None
    } else {
        Some(collect_headers(args.headers))
    };
    let update = SiteUpdate {
        name: args.name,
        url: args.url,
        css_selector: args.css_selector,
        headers,
    };
    if update.is_empty() {
        bail!("Nothing to modify: pass --name, --url, --css-selector, --header or --clear-headers");
    }

    let site = store.update_site(args.site_id, update).await?;
    info!(site_id = site.resource.id, "site modified");
    println!("{}", site_heading(&site));
    Ok(())
}

pub async fn run_remove_command(store: &Store, site_id: i64) -> Result<()> {
    let site = store.get_site(site_id).await?;
    store.remove_site(site_id).await?;
    info!(site_id, "site removed");
    println!("removed {}", site_heading(&site));
    Ok(())
}

fn collect_headers(pairs: Vec<(String, String)>) -> HeaderMap {
    pairs.into_iter().collect()
}

fn site_heading(site: &SiteRecord) -> String {
    format!("{}: {}", site.resource.id, site.resource.name)
}

fn site_detail_lines(site: &SiteRecord) -> Vec<String> {
    let resource = &site.resource;
    let mut lines = vec![
        site_heading(site),
        format!("  url: {}", resource.url),
        format!("  css_selector: {}", resource.selector),
        format!("  created_at: {}", site.created_at.format("%Y-%m-%d %H:%M:%S UTC")),
    ];
    if !resource.headers.is_empty() {
        lines.push("  headers:".to_string());
        lines.extend(
            resource
                .headers
                .iter()
                .map(|(name, value)| format!("    {name}: {value}")),
        );
    }
    lines
}
