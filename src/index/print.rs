//! JSON dump of the tree for debugging

use serde::Serialize;

use crate::file::PageNum;
use crate::record::RecordId;

use super::error::{IndexError, IndexResult};
use super::key::IndexKey;
use super::node::Node;
use super::persistent_btree::PersistentBPlusTree;

#[derive(Debug, Serialize)]
struct NodeDump {
    keys: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    children: Vec<NodeDump>,
}

/// Render the tree rooted at the current root as pretty-printed JSON
///
/// Internal nodes list their separator keys and children in order. Leaves
/// list each distinct key with the record ids stored under it, as
/// `"key:[(page,slot),...]"`.
pub(crate) fn dump_tree(tree: &mut PersistentBPlusTree<'_>) -> IndexResult<String> {
    let root = tree.root_page();
    let dump = dump_node(tree, root, 0)?;
    Ok(serde_json::to_string_pretty(&dump)?)
}

fn dump_node(
    tree: &mut PersistentBPlusTree<'_>,
    page: PageNum,
    depth: usize,
) -> IndexResult<NodeDump> {
    if depth > tree.depth_limit()? as usize {
        return Err(IndexError::corrupted(page, "tree deeper than page count"));
    }

    let node = tree.read_node(page)?;
    if node.is_leaf() {
        return Ok(NodeDump {
            keys: leaf_keys(&node),
            children: Vec::new(),
        });
    }

    let keys = node.entries().iter().map(|e| e.key.to_string()).collect();
    let mut children = Vec::new();
    for child in node.children() {
        children.push(dump_node(tree, child, depth + 1)?);
    }
    Ok(NodeDump { keys, children })
}

fn leaf_keys(node: &Node) -> Vec<String> {
    let mut groups: Vec<(&IndexKey, Vec<RecordId>)> = Vec::new();
    for entry in node.entries() {
        if let Some((key, rids)) = groups.last_mut() {
            if key.compare(&entry.key).is_eq() {
                rids.push(entry.rid);
                continue;
            }
        }
        groups.push((&entry.key, vec![entry.rid]));
    }

    groups
        .into_iter()
        .map(|(key, rids)| {
            let rids: Vec<String> = rids.iter().map(RecordId::to_string).collect();
            format!("{}:[{}]", key, rids.join(","))
        })
        .collect()
}
