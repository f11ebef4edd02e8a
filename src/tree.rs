use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;

use crate::fs::{FsError, FsResult};

#[derive(Debug)]
/// A tree contains a bunch of nodes.
pub(crate) struct Tree<K: Ord, D> {
    nodes: HashMap<u64, Node<K, D>>,
    node_id: u64,
}

/// id of the root node of the tree.
pub(crate) const ROOT_ID: u64 = 1;

#[derive(Debug)]
/// Node itself. "data" contains user-modifiable data.
pub(crate) struct Node<K: Ord, D> {
    pub data: D,
    parent_id: u64,
    // ordered, so that iteration over children is stable.
    children: BTreeMap<K, u64>,
}

impl<K: Ord + Debug + Clone, D: Debug> Tree<K, D> {
    /// Get new tree and initialize the root with 'data'.
    pub fn new(data: D) -> Tree<K, D> {
        let mut t = Tree {
            nodes: HashMap::new(),
            node_id: ROOT_ID,
        };
        t.new_node(0, data);
        t
    }

    fn new_node(&mut self, parent: u64, data: D) -> u64 {
        let id = self.node_id;
        self.node_id += 1;
        let node = Node {
            parent_id: parent,
            data,
            children: BTreeMap::new(),
        };
        self.nodes.insert(id, node);
        id
    }

    /// add a child node to an existing node.
    pub fn add_child(&mut self, parent: u64, key: K, data: D, overwrite: bool) -> FsResult<u64> {
        {
            let pnode = self.nodes.get(&parent).ok_or(FsError::NotFound)?;
            if let Some(&old) = pnode.children.get(&key) {
                if !overwrite {
                    return Err(FsError::Exists);
                }
                self.delete_subtree(old)?;
            }
        }
        let id = self.new_node(parent, data);
        let pnode = self.nodes.get_mut(&parent).ok_or(FsError::NotFound)?;
        pnode.children.insert(key, id);
        Ok(id)
    }

    /// Get a child node by key K.
    pub fn get_child<Q>(&self, parent: u64, key: &Q) -> FsResult<u64>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let pnode = self.nodes.get(&parent).ok_or(FsError::NotFound)?;
        let id = pnode.children.get(key).ok_or(FsError::NotFound)?;
        Ok(*id)
    }

    /// Get all children of this node, in key order.
    pub fn get_children(&self, parent: u64) -> FsResult<Vec<(K, u64)>> {
        let pnode = self.nodes.get(&parent).ok_or(FsError::NotFound)?;
        Ok(pnode.children.iter().map(|(k, i)| (k.clone(), *i)).collect())
    }

    /// Number of children of a node.
    pub fn num_children(&self, id: u64) -> FsResult<usize> {
        Ok(self.nodes.get(&id).ok_or(FsError::NotFound)?.children.len())
    }

    /// Id of the parent of a node.
    pub fn parent_of(&self, id: u64) -> FsResult<u64> {
        Ok(self.nodes.get(&id).ok_or(FsError::NotFound)?.parent_id)
    }

    /// Get reference to a node.
    pub fn get_node(&self, id: u64) -> FsResult<&D> {
        let n = self.nodes.get(&id).ok_or(FsError::NotFound)?;
        Ok(&n.data)
    }

    /// Get mutable reference to a node.
    pub fn get_node_mut(&mut self, id: u64) -> FsResult<&mut D> {
        let n = self.nodes.get_mut(&id).ok_or(FsError::NotFound)?;
        Ok(&mut n.data)
    }

    /// Iterate over all node data.
    pub fn values(&self) -> impl Iterator<Item = &D> {
        self.nodes.values().map(|n| &n.data)
    }

    fn delete_node_from_parent(&mut self, id: u64) -> FsResult<()> {
        let parent_id = self.nodes.get(&id).ok_or(FsError::NotFound)?.parent_id;
        let pnode = self.nodes.get_mut(&parent_id).ok_or(FsError::NotFound)?;
        pnode.children.retain(|_, i| *i != id);
        Ok(())
    }

    /// Delete a node. Fails if node has children. Returns node itself.
    pub fn delete_node(&mut self, id: u64) -> FsResult<Node<K, D>> {
        if id == ROOT_ID {
            return Err(FsError::Forbidden);
        }
        if self.num_children(id)? > 0 {
            return Err(FsError::Exists);
        }
        self.delete_node_from_parent(id)?;
        self.nodes.remove(&id).ok_or(FsError::NotFound)
    }

    /// Delete a subtree.
    pub fn delete_subtree(&mut self, id: u64) -> FsResult<()> {
        let children = {
            let n = self.nodes.get(&id).ok_or(FsError::NotFound)?;
            n.children.values().copied().collect::<Vec<u64>>()
        };
        for c in children.into_iter() {
            self.delete_subtree(c)?;
        }
        self.delete_node_from_parent(id)?;
        self.nodes.remove(&id);
        Ok(())
    }

    /// Move a node to a new position and new name in the tree.
    /// Fails if the destination name is already taken.
    pub fn move_node(&mut self, id: u64, new_parent: u64, new_name: K) -> FsResult<()> {
        {
            let pnode = self.nodes.get(&new_parent).ok_or(FsError::NotFound)?;
            if pnode.children.contains_key(&new_name) {
                return Err(FsError::Exists);
            }
        }
        // refuse to move a node into its own subtree.
        let mut p = new_parent;
        while p != 0 {
            if p == id {
                return Err(FsError::Forbidden);
            }
            p = self.parent_of(p)?;
        }
        self.delete_node_from_parent(id)?;
        self.nodes.get_mut(&id).ok_or(FsError::NotFound)?.parent_id = new_parent;
        let pnode = self.nodes.get_mut(&new_parent).ok_or(FsError::NotFound)?;
        pnode.children.insert(new_name, id);
        Ok(())
    }
}
