//! ls command - List containers or the virtual tree below one
//!
//! Lists the real containers when the address names an account only, or
//! builds and prints the virtual tree when it names a container or virtual
//! directory.

use std::fmt::Write as _;

use clap::Args;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, CellAlignment, Table};
use serde::Serialize;
use vcp_core::{AccountAddress, ContainerId, NamespaceMapper, NodeRef, VirtualTree};

use crate::alias::AliasManager;
use crate::backend::{self, CommandError};
use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig, ProgressBar};

/// List containers or a virtual tree
#[derive(Args, Debug)]
pub struct LsArgs {
    /// Address: s3://alias/ or s3://alias/container[/vdir...]/
    pub address: String,

    /// Resolve and show the backend URL of every blob
    #[arg(long)]
    pub urls: bool,

    /// Show totals only
    #[arg(long)]
    pub summarize: bool,
}

/// JSON output for a container listing
#[derive(Debug, Serialize)]
struct ContainersOutput {
    containers: Vec<String>,
}

/// JSON output for a tree listing
#[derive(Debug, Serialize)]
pub struct TreeOutput {
    pub address: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub blobs: Vec<BlobListing>,
    pub summary: Summary,
}

#[derive(Debug, Serialize)]
pub struct BlobListing {
    /// Path relative to the listed container
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub total_blobs: usize,
    pub total_size_bytes: u64,
    pub total_size_human: String,
}

/// Execute the ls command
pub async fn execute(args: LsArgs, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config.clone());
    match run(&args, &output_config, &formatter).await {
        Ok(()) => ExitCode::Success,
        Err(e) => e.report(&formatter),
    }
}

async fn run(
    args: &LsArgs,
    output_config: &OutputConfig,
    formatter: &Formatter,
) -> Result<(), CommandError> {
    let (account, path) = AccountAddress::split(&args.address)?;
    let aliases = AliasManager::new()?;
    let mapper = NamespaceMapper::new(backend::connect(&account, &aliases, 1).await?);
    let spinner = ProgressBar::spinner(output_config.clone(), "listing");

    if path.is_empty() {
        let names = list_containers(&mapper).await;
        spinner.finish_and_clear();
        print_containers(&names?, formatter);
    } else {
        let listed = list_tree(&mapper, &args.address, args.urls).await;
        spinner.finish_and_clear();
        let (tree, container) = listed?;
        let output = tree_output(&tree, container, &args.address, args.summarize);
        if formatter.is_json() {
            formatter.json(&output);
        } else {
            if !args.summarize {
                formatter.println(render_tree(&tree, container).trim_end());
            }
            print_summary(&output.summary, formatter);
        }
    }
    Ok(())
}

/// Names of the real containers
pub async fn list_containers(mapper: &NamespaceMapper) -> vcp_core::Result<Vec<String>> {
    let mut tree = mapper.new_tree();
    let ids = mapper.load_root(&mut tree).await?;
    Ok(ids
        .into_iter()
        .map(|id| tree.container(id).name.clone())
        .collect())
}

/// Build the populated tree below a container address
pub async fn list_tree(
    mapper: &NamespaceMapper,
    address: &str,
    urls: bool,
) -> vcp_core::Result<(VirtualTree, ContainerId)> {
    let mut tree = mapper.new_tree();
    let container = mapper.resolve_existing_container(&mut tree, address).await?;
    mapper.populate(&mut tree, container).await?;

    if urls {
        for (blob, _) in tree.blob_paths(container) {
            mapper.blob_url(&mut tree, blob).await?;
        }
    }
    Ok((tree, container))
}

/// Flatten a listed tree for JSON output
pub fn tree_output(
    tree: &VirtualTree,
    container: ContainerId,
    address: &str,
    summarize: bool,
) -> TreeOutput {
    let blobs: Vec<BlobListing> = tree
        .blob_paths(container)
        .into_iter()
        .map(|(id, path)| {
            let blob = tree.blob(id);
            BlobListing {
                path: path.join("/"),
                size: blob.size,
                url: blob.url.clone(),
            }
        })
        .collect();

    let total_size: u64 = blobs.iter().filter_map(|b| b.size).sum();
    TreeOutput {
        address: address.to_string(),
        summary: Summary {
            total_blobs: blobs.len(),
            total_size_bytes: total_size,
            total_size_human: humansize::format_size(total_size, humansize::BINARY),
        },
        blobs: if summarize { Vec::new() } else { blobs },
    }
}

/// Render the tree below `container` with box-drawing branches
pub fn render_tree(tree: &VirtualTree, container: ContainerId) -> String {
    let mut out = format!("{}/\n", tree.container(container).name);
    render_children(tree, container, "", &mut out);
    out
}

fn render_children(tree: &VirtualTree, container: ContainerId, indent: &str, out: &mut String) {
    let node = tree.container(container);
    let total = node.blobs().len() + node.containers().len();
    let children = node
        .blobs()
        .iter()
        .map(|b| NodeRef::from(*b))
        .chain(node.containers().iter().map(|c| NodeRef::from(*c)));

    for (i, child) in children.enumerate() {
        let last = i + 1 == total;
        let branch = if last { "└── " } else { "├── " };
        match child {
            NodeRef::Blob(id) => {
                let blob = tree.blob(id);
                let size = blob
                    .size
                    .map(|s| format!(" ({})", humansize::format_size(s, humansize::BINARY)))
                    .unwrap_or_default();
                let _ = writeln!(out, "{indent}{branch}{}{size}", blob.name);
                if let Some(url) = &blob.url {
                    let pad = if last { "    " } else { "│   " };
                    let _ = writeln!(out, "{indent}{pad}{url}");
                }
            }
            NodeRef::Container(id) => {
                let _ = writeln!(out, "{indent}{branch}{}/", tree.container(id).name);
                let next = format!("{indent}{}", if last { "    " } else { "│   " });
                render_children(tree, id, &next, out);
            }
        }
    }
}

fn print_containers(names: &[String], formatter: &Formatter) {
    if formatter.is_json() {
        formatter.json(&ContainersOutput {
            containers: names.to_vec(),
        });
        return;
    }
    if names.is_empty() {
        formatter.println("No containers.");
        return;
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Container"]);
    for name in names {
        table.add_row(vec![Cell::new(format!("{name}/"))]);
    }
    formatter.println(&table.to_string());
}

fn print_summary(summary: &Summary, formatter: &Formatter) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec!["Blobs", "Total size"]);
    table.add_row(vec![
        Cell::new(summary.total_blobs).set_alignment(CellAlignment::Right),
        Cell::new(&summary.total_size_human).set_alignment(CellAlignment::Right),
    ]);
    formatter.println(&table.to_string());
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use vcp_core::MemoryBackend;

    use super::*;

    fn scenario_mapper() -> NamespaceMapper {
        let backend = Arc::new(MemoryBackend::new());
        for key in ["blob4", "vdir1/blob2", "vdir1/vdir2/blob1", "vdir1/vdir3/blob3"] {
            backend.insert("container", key, key.as_bytes().to_vec());
        }
        backend.insert("other", "x", Vec::new());
        NamespaceMapper::new(backend)
    }

    #[tokio::test]
    async fn test_list_containers() {
        let names = list_containers(&scenario_mapper()).await.unwrap();
        assert_eq!(names, vec!["container", "other"]);
    }

    #[tokio::test]
    async fn test_render_scenario_tree() {
        let mapper = scenario_mapper();
        let (tree, c) = list_tree(&mapper, "mem://local/container/", false)
            .await
            .unwrap();

        insta::assert_snapshot!(render_tree(&tree, c).trim_end(), @r"
        container/
        ├── blob4 (5 B)
        └── vdir1/
            ├── blob2 (11 B)
            ├── vdir2/
            │   └── blob1 (17 B)
            └── vdir3/
                └── blob3 (17 B)
        ");
    }

    #[tokio::test]
    async fn test_render_virtual_directory_with_urls() {
        let mapper = scenario_mapper();
        let (tree, c) = list_tree(&mapper, "mem://local/container/vdir1/vdir2/", true)
            .await
            .unwrap();

        insta::assert_snapshot!(render_tree(&tree, c).trim_end(), @r"
        vdir2/
        └── blob1 (17 B)
            memory://local/container/vdir1/vdir2/blob1
        ");
    }

    #[tokio::test]
    async fn test_tree_output_summary() {
        let mapper = scenario_mapper();
        let (tree, c) = list_tree(&mapper, "mem://local/container/", false)
            .await
            .unwrap();

        let output = tree_output(&tree, c, "mem://local/container/", false);
        let paths: Vec<&str> = output.blobs.iter().map(|b| b.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["blob4", "vdir1/blob2", "vdir1/vdir2/blob1", "vdir1/vdir3/blob3"]
        );
        assert_eq!(output.summary.total_blobs, 4);
        assert_eq!(output.summary.total_size_bytes, 50);

        let summarized = tree_output(&tree, c, "mem://local/container/", true);
        assert!(summarized.blobs.is_empty());
        assert_eq!(summarized.summary.total_blobs, 4);
    }

    #[tokio::test]
    async fn test_list_missing_container_is_not_found() {
        let result = list_tree(&scenario_mapper(), "mem://local/absent/", false).await;
        assert!(matches!(result, Err(vcp_core::Error::NotFound(_))));
    }
}
