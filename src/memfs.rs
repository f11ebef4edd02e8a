//! Simple in-memory filesystem.
//!
//! This implementation has state, so if you create a
//! new instance in a handler(), it will be empty every time.
//!
//! This means you have to create the instance once, using `MemFs::new`, store
//! it in your handler struct, and clone() it every time you pass
//! it to the DavHandler. As a MemFs struct is just a handle, cloning is cheap.
//!
//! With `MemFsOptions::prune_empty_dirs` set, it behaves like the small
//! flash filesystems found on microcontrollers: a directory that loses
//! its last entry disappears along with it.
use std::io::SeekFrom;
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use futures_util::{FutureExt, future};
use parking_lot::Mutex;

use crate::davpath::DavPath;
use crate::fs::*;
use crate::tree;

type Tree = tree::Tree<Vec<u8>, MemFsNode>;

/// Options for `MemFs::with_options`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemFsOptions {
    /// Remove directories that become empty (cascading upwards).
    pub prune_empty_dirs: bool,
    /// Longest allowed name of a single path segment.
    pub max_name_len: Option<usize>,
    /// Size of the filesystem in bytes. Writes beyond it are short.
    pub capacity: Option<u64>,
}

/// Ephemeral in-memory filesystem.
#[derive(Debug, Clone)]
pub struct MemFs {
    tree: Arc<Mutex<Tree>>,
    opts: MemFsOptions,
}

#[derive(Debug, Clone)]
enum MemFsNode {
    Dir(MemFsDirNode),
    File(MemFsFileNode),
}

#[derive(Debug, Clone)]
struct MemFsDirNode {
    mtime: SystemTime,
    crtime: SystemTime,
}

#[derive(Debug, Clone)]
struct MemFsFileNode {
    mtime: SystemTime,
    crtime: SystemTime,
    data: Vec<u8>,
}

#[derive(Debug, Clone)]
struct MemFsDirEntry {
    mtime: SystemTime,
    crtime: SystemTime,
    is_dir: bool,
    name: Vec<u8>,
    size: u64,
}

#[derive(Debug)]
struct MemFsFile {
    tree: Arc<Mutex<Tree>>,
    node_id: u64,
    pos: usize,
    append: bool,
    capacity: Option<u64>,
}

impl MemFs {
    /// Create a new "memfs" filesystem.
    pub fn new() -> Box<MemFs> {
        MemFs::with_options(MemFsOptions::default())
    }

    /// Create a new "memfs" filesystem with non-default behaviour.
    pub fn with_options(opts: MemFsOptions) -> Box<MemFs> {
        let root = MemFsNode::new_dir();
        Box::new(MemFs {
            tree: Arc::new(Mutex::new(Tree::new(root))),
            opts,
        })
    }

    fn do_open(&self, tree: &mut Tree, path: &[u8], options: OpenOptions) -> FsResult<Box<dyn DavFile>> {
        let node_id = match tree.lookup(path) {
            Ok(n) => {
                if options.create_new {
                    return Err(FsError::Exists);
                }
                n
            },
            Err(FsError::NotFound) => {
                if !options.create {
                    return Err(FsError::NotFound);
                }
                let name = file_name(path);
                if self.opts.max_name_len.is_some_and(|max| name.len() > max) {
                    return Err(FsError::PathTooLong);
                }
                let parent_id = tree.lookup_parent(path)?;
                let id = tree.add_child(parent_id, name, MemFsNode::new_file(), false)?;
                tree.get_node_mut(parent_id)?.update_mtime(SystemTime::now());
                id
            },
            Err(e) => return Err(e),
        };
        let node = tree.get_node_mut(node_id)?;
        if node.is_dir() {
            return Err(FsError::Forbidden);
        }
        if options.truncate {
            node.as_file_mut()?.data.truncate(0);
            node.update_mtime(SystemTime::now());
        }
        Ok(Box::new(MemFsFile {
            tree: self.tree.clone(),
            node_id,
            pos: 0,
            append: options.append,
            capacity: self.opts.capacity,
        }))
    }

    // After removing an entry from `parent_id`, remove the directories
    // that are now empty, walking upwards. Never removes the root.
    fn prune(&self, tree: &mut Tree, mut parent_id: u64) -> FsResult<()> {
        if !self.opts.prune_empty_dirs {
            return Ok(());
        }
        while parent_id != tree::ROOT_ID && tree.num_children(parent_id)? == 0 {
            let up = tree.parent_of(parent_id)?;
            trace!("FS: pruning empty directory node {}", parent_id);
            tree.delete_node(parent_id)?;
            parent_id = up;
        }
        Ok(())
    }

    fn remove_node(&self, path: &DavPath, want_dir: bool) -> FsResult<()> {
        let tree = &mut *self.tree.lock();
        let parent_id = tree.lookup_parent(path.as_bytes())?;
        let node_id = tree.lookup(path.as_bytes())?;
        if tree.get_node(node_id)?.is_dir() != want_dir {
            return Err(FsError::Forbidden);
        }
        tree.delete_node(node_id)?;
        tree.get_node_mut(parent_id)?.update_mtime(SystemTime::now());
        self.prune(tree, parent_id)
    }
}

impl DavFileSystem for MemFs {
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        async move {
            let tree = &*self.tree.lock();
            let node_id = tree.lookup(path.as_bytes())?;
            let meta = tree.get_node(node_id)?.as_dirent(path.file_name());
            Ok(Box::new(meta) as Box<dyn DavMetaData>)
        }
        .boxed()
    }

    fn read_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>> {
        async move {
            let tree = &*self.tree.lock();
            let node_id = tree.lookup(path.as_bytes())?;
            if !tree.get_node(node_id)?.is_dir() {
                return Err(FsError::Forbidden);
            }
            let mut v: Vec<Box<dyn DavDirEntry>> = Vec::new();
            for (name, dnode_id) in tree.get_children(node_id)? {
                if let Ok(node) = tree.get_node(dnode_id) {
                    v.push(Box::new(node.as_dirent(&name)));
                }
            }
            let strm = futures_util::stream::iter(v);
            Ok(Box::pin(strm) as FsStream<Box<dyn DavDirEntry>>)
        }
        .boxed()
    }

    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions) -> FsFuture<'a, Box<dyn DavFile>> {
        async move {
            let tree = &mut *self.tree.lock();
            self.do_open(tree, path.as_bytes(), options)
        }
        .boxed()
    }

    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: create_dir {:?}", path);
            let tree = &mut *self.tree.lock();
            let path = path.as_bytes();
            let name = file_name(path);
            if name.is_empty() {
                return Err(FsError::Exists);
            }
            if self.opts.max_name_len.is_some_and(|max| name.len() > max) {
                return Err(FsError::PathTooLong);
            }
            let parent_id = tree.lookup_parent(path)?;
            tree.add_child(parent_id, name, MemFsNode::new_dir(), false)?;
            tree.get_node_mut(parent_id)?.update_mtime(SystemTime::now());
            Ok(())
        }
        .boxed()
    }

    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        async move { self.remove_node(path, false) }.boxed()
    }

    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        async move { self.remove_node(path, true) }.boxed()
    }

    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        async move {
            let tree = &mut *self.tree.lock();
            let node_id = tree.lookup(from.as_bytes())?;
            let parent_id = tree.lookup_parent(from.as_bytes())?;
            let dst_id = tree.lookup_parent(to.as_bytes())?;
            tree.move_node(node_id, dst_id, file_name(to.as_bytes()))?;
            tree.get_node_mut(parent_id)?.update_mtime(SystemTime::now());
            tree.get_node_mut(dst_id)?.update_mtime(SystemTime::now());
            self.prune(tree, parent_id)
        }
        .boxed()
    }

    fn get_quota(&self) -> FsFuture<'_, (u64, Option<u64>)> {
        async move {
            let tree = &*self.tree.lock();
            Ok((used_bytes(tree), self.opts.capacity))
        }
        .boxed()
    }

    fn max_name_len(&self) -> Option<usize> {
        self.opts.max_name_len
    }
}

fn used_bytes(tree: &Tree) -> u64 {
    tree.values()
        .map(|n| match n {
            MemFsNode::File(f) => f.data.len() as u64,
            MemFsNode::Dir(_) => 0,
        })
        .sum()
}

impl DavDirEntry for MemFsDirEntry {
    fn metadata(&self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        let meta = (*self).clone();
        future::ok(Box::new(meta) as Box<dyn DavMetaData>).boxed()
    }

    fn is_dir(&self) -> FsFuture<'_, bool> {
        future::ok(self.is_dir).boxed()
    }

    fn name(&self) -> Vec<u8> {
        self.name.clone()
    }
}

impl DavFile for MemFsFile {
    fn metadata(&mut self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        async move {
            let tree = &*self.tree.lock();
            let node = tree.get_node(self.node_id)?;
            let meta = node.as_dirent(b"");
            Ok(Box::new(meta) as Box<dyn DavMetaData>)
        }
        .boxed()
    }

    fn read_bytes(&mut self, count: usize) -> FsFuture<'_, Bytes> {
        async move {
            let tree = &*self.tree.lock();
            let node = tree.get_node(self.node_id)?;
            let file = node.as_file()?;
            let curlen = file.data.len();
            let start = self.pos.min(curlen);
            let end = self.pos.saturating_add(count).min(curlen);
            self.pos += end - start;
            Ok(Bytes::copy_from_slice(&file.data[start..end]))
        }
        .boxed()
    }

    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<'_, usize> {
        async move {
            let tree = &mut *self.tree.lock();
            let room = match self.capacity {
                Some(cap) => cap.saturating_sub(used_bytes(tree)) as usize,
                None => usize::MAX,
            };
            let node = tree.get_node_mut(self.node_id)?;
            let file = node.as_file_mut()?;
            if self.append {
                self.pos = file.data.len();
            }
            let mut count = buf.len();
            let end = self.pos + count;
            if end > file.data.len() {
                let grow = end - file.data.len();
                if grow > room {
                    // out of space: short write.
                    count -= grow - room;
                }
            }
            let end = self.pos + count;
            if end > file.data.len() {
                file.data.resize(end, 0);
            }
            file.data[self.pos..end].copy_from_slice(&buf[..count]);
            self.pos = end;
            node.update_mtime(SystemTime::now());
            Ok(count)
        }
        .boxed()
    }

    fn flush(&mut self) -> FsFuture<'_, ()> {
        future::ok(()).boxed()
    }

    fn seek(&mut self, pos: SeekFrom) -> FsFuture<'_, u64> {
        async move {
            let (start, offset): (u64, i64) = match pos {
                SeekFrom::Start(npos) => {
                    self.pos = npos as usize;
                    return Ok(npos);
                },
                SeekFrom::Current(npos) => (self.pos as u64, npos),
                SeekFrom::End(npos) => {
                    let tree = &*self.tree.lock();
                    let node = tree.get_node(self.node_id)?;
                    let curlen = node.as_file()?.data.len() as u64;
                    (curlen, npos)
                },
            };
            let npos = start.checked_add_signed(offset).ok_or(FsError::GeneralFailure)?;
            self.pos = npos as usize;
            Ok(npos)
        }
        .boxed()
    }
}

impl DavMetaData for MemFsDirEntry {
    fn len(&self) -> u64 {
        self.size
    }

    fn created(&self) -> FsResult<SystemTime> {
        Ok(self.crtime)
    }

    fn modified(&self) -> FsResult<SystemTime> {
        Ok(self.mtime)
    }

    fn is_dir(&self) -> bool {
        self.is_dir
    }
}

impl MemFsNode {
    fn new_dir() -> MemFsNode {
        MemFsNode::Dir(MemFsDirNode {
            crtime: SystemTime::now(),
            mtime: SystemTime::now(),
        })
    }

    fn new_file() -> MemFsNode {
        MemFsNode::File(MemFsFileNode {
            crtime: SystemTime::now(),
            mtime: SystemTime::now(),
            data: Vec::new(),
        })
    }

    // helper to create MemFsDirEntry from a node.
    fn as_dirent(&self, name: &[u8]) -> MemFsDirEntry {
        let (is_dir, size, mtime, crtime) = match self {
            MemFsNode::File(file) => (false, file.data.len() as u64, file.mtime, file.crtime),
            MemFsNode::Dir(dir) => (true, 0, dir.mtime, dir.crtime),
        };
        MemFsDirEntry {
            name: name.to_vec(),
            mtime,
            crtime,
            is_dir,
            size,
        }
    }

    fn update_mtime(&mut self, tm: SystemTime) {
        match self {
            MemFsNode::Dir(d) => d.mtime = tm,
            MemFsNode::File(f) => f.mtime = tm,
        }
    }

    fn is_dir(&self) -> bool {
        matches!(self, MemFsNode::Dir(_))
    }

    fn as_file(&self) -> FsResult<&MemFsFileNode> {
        match self {
            MemFsNode::File(n) => Ok(n),
            _ => Err(FsError::Forbidden),
        }
    }

    fn as_file_mut(&mut self) -> FsResult<&mut MemFsFileNode> {
        match self {
            MemFsNode::File(n) => Ok(n),
            _ => Err(FsError::Forbidden),
        }
    }
}

trait TreeExt {
    fn lookup_segs(&self, segs: Vec<&[u8]>) -> FsResult<u64>;
    fn lookup(&self, path: &[u8]) -> FsResult<u64>;
    fn lookup_parent(&self, path: &[u8]) -> FsResult<u64>;
}

impl TreeExt for Tree {
    fn lookup_segs(&self, segs: Vec<&[u8]>) -> FsResult<u64> {
        let mut node_id = tree::ROOT_ID;
        for seg in segs.into_iter() {
            if !self.get_node(node_id)?.is_dir() {
                return Err(FsError::NotFound);
            }
            node_id = self.get_child(node_id, seg)?;
        }
        Ok(node_id)
    }

    fn lookup(&self, path: &[u8]) -> FsResult<u64> {
        self.lookup_segs(path.split(|&c| c == b'/').filter(|s| !s.is_empty()).collect())
    }

    // pop the last segment off the path, do a lookup, then
    // check if the result is a directory.
    fn lookup_parent(&self, path: &[u8]) -> FsResult<u64> {
        let mut segs: Vec<&[u8]> = path.split(|&c| c == b'/').filter(|s| !s.is_empty()).collect();
        segs.pop();
        let node_id = self.lookup_segs(segs)?;
        if !self.get_node(node_id)?.is_dir() {
            return Err(FsError::Forbidden);
        }
        Ok(node_id)
    }
}

// helper
fn file_name(path: &[u8]) -> Vec<u8> {
    path.split(|&c| c == b'/')
        .rfind(|s| !s.is_empty())
        .unwrap_or(b"")
        .to_vec()
}
