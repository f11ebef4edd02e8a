//! Recursive directory traversal with a visitor.
//!
//! Directories get a pre-order `enter_dir` call and, after their
//! contents have been walked, a post-order `visit` call. Files only
//! get `visit`. The entries of a directory are read completely before
//! any of them is visited, so visitors may remove what they are shown.
use futures_util::StreamExt;
use futures_util::future::{BoxFuture, FutureExt};

use crate::davpath::DavPath;
use crate::fs::*;

/// What a visitor wants the walk to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Visit {
    /// Go on.
    Continue,
    /// Stop the whole walk.
    Abort,
}

pub(crate) trait Visitor: Send {
    /// Called before the contents of a directory are walked.
    fn enter_dir<'a>(&'a mut self, _depth: usize, _path: &'a DavPath) -> BoxFuture<'a, Visit> {
        futures_util::future::ready(Visit::Continue).boxed()
    }

    /// Called for every file, and for every directory after its contents.
    fn visit<'a>(&'a mut self, depth: usize, path: &'a DavPath, meta: &'a dyn DavMetaData) -> BoxFuture<'a, Visit>;
}

/// Walk the directory `path`. `max_depth` of `Some(0)` only visits
/// the direct children, `None` is unlimited. Returns `false` if a
/// visitor aborted the walk.
pub(crate) async fn walk(
    fs: &dyn DavFileSystem,
    path: &DavPath,
    max_depth: Option<usize>,
    visitor: &mut dyn Visitor,
) -> FsResult<bool> {
    let res = walk_dir(fs, path.clone(), 0, max_depth, visitor).await?;
    Ok(res != Visit::Abort)
}

fn walk_dir<'a>(
    fs: &'a dyn DavFileSystem,
    path: DavPath,
    depth: usize,
    max_depth: Option<usize>,
    visitor: &'a mut dyn Visitor,
) -> BoxFuture<'a, FsResult<Visit>> {
    async move {
        let mut entries = Vec::new();
        let mut strm = fs.read_dir(&path).await?;
        while let Some(dirent) = strm.next().await {
            let name = dirent.name();
            match dirent.metadata().await {
                Ok(meta) => entries.push((path.join(&name), meta)),
                Err(e) => debug!("walk: {:?}: metadata: {:?}", String::from_utf8_lossy(&name), e),
            }
        }
        drop(strm);

        for (child, meta) in entries {
            if meta.is_dir() {
                match visitor.enter_dir(depth, &child).await {
                    Visit::Abort => return Ok(Visit::Abort),
                    Visit::Continue => {},
                }
                if max_depth.is_none_or(|max| depth < max) {
                    if walk_dir(fs, child.clone(), depth + 1, max_depth, &mut *visitor).await? == Visit::Abort {
                        return Ok(Visit::Abort);
                    }
                }
            }
            if visitor.visit(depth, &child, &*meta).await == Visit::Abort {
                return Ok(Visit::Abort);
            }
        }
        Ok(Visit::Continue)
    }
    .boxed()
}

// Collects a listing of a tree.
struct TreeDump {
    out: String,
}

impl Visitor for TreeDump {
    fn enter_dir<'a>(&'a mut self, depth: usize, path: &'a DavPath) -> BoxFuture<'a, Visit> {
        self.out.push_str(&format!("{:indent$}[{}]\n", "", path, indent = 2 * depth));
        futures_util::future::ready(Visit::Continue).boxed()
    }

    fn visit<'a>(&'a mut self, depth: usize, path: &'a DavPath, meta: &'a dyn DavMetaData) -> BoxFuture<'a, Visit> {
        if !meta.is_dir() {
            self.out
                .push_str(&format!("{:indent$} {} {}\n", "", path, meta.len(), indent = 2 * depth));
        }
        futures_util::future::ready(Visit::Continue).boxed()
    }
}

/// Render a recursive listing of `path`: `[dir]` lines for directories,
/// ` file size` lines for files, indented by depth.
pub async fn dump_tree(fs: &dyn DavFileSystem, path: &DavPath) -> String {
    let mut dump = TreeDump {
        out: format!("[{}]\n", path),
    };
    if let Err(e) = walk(fs, path, None, &mut dump).await {
        dump.out.push_str(&format!("<{:?}>\n", e));
    }
    dump.out
}
