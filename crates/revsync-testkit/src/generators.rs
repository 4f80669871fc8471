//! Proptest generators for property-based testing.

use proptest::prelude::*;

use bytes::Bytes;
use revsync_core::{Annotation, Digest, Document};
use revsync_store::{Repository, RepositoryExt, Result};

/// Generate an entity key.
pub fn entity_key() -> impl Strategy<Value = String> {
    "[a-z]{1,6}/[0-9]{1,3}".prop_map(String::from)
}

/// Generate a document with up to `max_entities` entities.
pub fn document(max_entities: usize) -> impl Strategy<Value = Document> {
    prop::collection::btree_map(
        entity_key(),
        prop::collection::vec(any::<u8>(), 0..32),
        0..=max_entities,
    )
    .prop_map(|entities| {
        entities
            .into_iter()
            .map(|(k, v)| (k, Bytes::from(v)))
            .collect()
    })
}

/// Shape of a commit DAG.
///
/// Node 0 is the root. Every other node lists the indices of its parents,
/// all strictly smaller than its own index, so the shape is acyclic.
#[derive(Debug, Clone)]
pub struct DagShape {
    pub parents: Vec<Vec<usize>>,
}

impl DagShape {
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Nodes no other node lists as a parent.
    pub fn heads(&self) -> Vec<usize> {
        let mut is_parent = vec![false; self.len()];
        for parents in &self.parents {
            for &p in parents {
                is_parent[p] = true;
            }
        }
        (0..self.len()).filter(|&i| !is_parent[i]).collect()
    }
}

/// Generate a DAG with between 1 and `max_nodes` commits, with occasional
/// merge commits.
pub fn dag_shape(max_nodes: usize) -> impl Strategy<Value = DagShape> {
    prop::collection::vec((any::<usize>(), any::<Option<usize>>()), 0..max_nodes.max(1))
        .prop_map(|picks| {
            let mut parents = vec![Vec::new()];
            for (i, (first, second)) in picks.into_iter().enumerate() {
                let node = i + 1;
                let mut node_parents = vec![first % node];
                if let Some(second) = second {
                    let second = second % node;
                    if second != node_parents[0] {
                        node_parents.push(second);
                    }
                }
                parents.push(node_parents);
            }
            DagShape { parents }
        })
}

/// Commit a DAG into the repository. Node `i` records a document labelled
/// with `i`. Returns the commit hash of every node, by index.
pub async fn build_dag<R: Repository + ?Sized>(repo: &R, shape: &DagShape) -> Result<Vec<Digest>> {
    let mut hashes: Vec<Digest> = Vec::with_capacity(shape.len());
    for (i, parents) in shape.parents.iter().enumerate() {
        let mut document = Document::new();
        document.insert("node", Bytes::from(i.to_string()));
        let parents: Vec<Digest> = parents.iter().map(|&p| hashes[p]).collect();
        let hash = repo
            .commit(&document, &parents, Annotation::with_date("gen", format!("node {}", i), i as i64))
            .await?;
        hashes.push(hash);
    }
    Ok(hashes)
}
