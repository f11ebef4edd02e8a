//! Local filesystem access.
//!
//! This implementation is stateless. So the easiest way to use it
//! is to create a new instance in your handler every time
//! you need one.
//!
use std::io::{self, ErrorKind, SeekFrom};
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use bytes::{Bytes, BytesMut};
use futures_util::{FutureExt, TryFutureExt, future};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::davpath::DavPath;
use crate::fs::*;

/// Local Filesystem implementation.
#[derive(Debug, Clone)]
pub struct LocalFs {
    basedir: PathBuf,
    public: bool,
}

#[derive(Debug, Clone)]
struct LocalFsMetaData(std::fs::Metadata);

#[derive(Debug)]
struct LocalFsFile(tokio::fs::File);

// Items from the readdir stream.
struct LocalFsDirEntry {
    name: Vec<u8>,
    meta: FsResult<std::fs::Metadata>,
}

impl LocalFs {
    /// Create a new LocalFs DavFileSystem, serving "base".
    ///
    /// If "public" is set to true, all files and directories created will be
    /// publically readable (mode 644/755), otherwise they will be private
    /// (mode 600/700). Umask still overrides this.
    pub fn new<P: AsRef<Path>>(base: P, public: bool) -> Box<LocalFs> {
        Box::new(LocalFs {
            basedir: base.as_ref().to_path_buf(),
            public,
        })
    }

    fn abs_path(&self, path: &DavPath) -> PathBuf {
        let mut pathbuf = self.basedir.clone();
        pathbuf.push(path.as_rel_ospath());
        pathbuf
    }
}

impl DavFileSystem for LocalFs {
    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        async move {
            let meta = tokio::fs::metadata(self.abs_path(path)).await?;
            Ok(Box::new(LocalFsMetaData(meta)) as Box<dyn DavMetaData>)
        }
        .boxed()
    }

    // The entries are collected and sorted by name, so that listings
    // come out in the same order every time.
    fn read_dir<'a>(&'a self, davpath: &'a DavPath) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>> {
        async move {
            trace!("FS: read_dir {:?}", davpath);
            let mut read_dir = tokio::fs::read_dir(self.abs_path(davpath)).await?;
            let mut entries = Vec::new();
            loop {
                match read_dir.next_entry().await {
                    Ok(Some(entry)) => {
                        let meta = entry.metadata().await.map_err(FsError::from);
                        entries.push(LocalFsDirEntry {
                            name: entry.file_name().into_vec(),
                            meta,
                        });
                    },
                    Ok(None) => break,
                    Err(e) => {
                        debug!("read_dir failed {}", e);
                        break;
                    },
                }
            }
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            let entries = entries.into_iter().map(|e| Box::new(e) as Box<dyn DavDirEntry>);
            Ok(Box::pin(futures_util::stream::iter(entries)) as FsStream<Box<dyn DavDirEntry>>)
        }
        .boxed()
    }

    fn open<'a>(&'a self, path: &'a DavPath, options: OpenOptions) -> FsFuture<'a, Box<dyn DavFile>> {
        async move {
            trace!("FS: open {:?}", path);
            let mut opt = tokio::fs::OpenOptions::new();
            opt.read(options.read)
                .write(options.write)
                .append(options.append)
                .truncate(options.truncate)
                .create(options.create)
                .create_new(options.create_new)
                .mode(if self.public { 0o644 } else { 0o600 });
            let file = opt.open(self.abs_path(path)).await?;
            Ok(Box::new(LocalFsFile(file)) as Box<dyn DavFile>)
        }
        .boxed()
    }

    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: create_dir {:?}", path);
            let mut dir = tokio::fs::DirBuilder::new();
            dir.mode(if self.public { 0o755 } else { 0o700 });
            Ok(dir.create(self.abs_path(path)).await?)
        }
        .boxed()
    }

    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: remove_dir {:?}", path);
            Ok(tokio::fs::remove_dir(self.abs_path(path)).await?)
        }
        .boxed()
    }

    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: remove_file {:?}", path);
            Ok(tokio::fs::remove_file(self.abs_path(path)).await?)
        }
        .boxed()
    }

    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        async move {
            trace!("FS: rename {:?} {:?}", from, to);
            let p_to = self.abs_path(to);
            // rename(2) silently replaces an existing file.
            if tokio::fs::symlink_metadata(&p_to).await.is_ok() {
                return Err(FsError::Exists);
            }
            Ok(tokio::fs::rename(self.abs_path(from), p_to).await?)
        }
        .boxed()
    }

    fn get_quota(&self) -> FsFuture<'_, (u64, Option<u64>)> {
        let path = self.basedir.clone();
        async move {
            let res = tokio::task::spawn_blocking(move || statvfs(&path))
                .await
                .map_err(|_| FsError::GeneralFailure)?;
            Ok(res?)
        }
        .boxed()
    }

    // NAME_MAX on all unix filesystems we care about.
    fn max_name_len(&self) -> Option<usize> {
        Some(255)
    }
}

fn statvfs(path: &Path) -> io::Result<(u64, Option<u64>)> {
    let cpath = std::ffi::CString::new(path.as_os_str().as_bytes()).map_err(io::Error::other)?;
    let mut buf = std::mem::MaybeUninit::<libc::statvfs>::uninit();
    // SAFETY: cpath is NUL-terminated, buf is only read after a successful call.
    let buf = unsafe {
        if libc::statvfs(cpath.as_ptr(), buf.as_mut_ptr()) != 0 {
            return Err(io::Error::last_os_error());
        }
        buf.assume_init()
    };
    let frsize = buf.f_frsize as u64;
    let total = buf.f_blocks as u64 * frsize;
    let used = (buf.f_blocks as u64).saturating_sub(buf.f_bfree as u64) * frsize;
    Ok((used, Some(total)))
}

impl DavDirEntry for LocalFsDirEntry {
    fn metadata(&self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        let m = match &self.meta {
            Ok(meta) => Ok(Box::new(LocalFsMetaData(meta.clone())) as Box<dyn DavMetaData>),
            Err(e) => Err(*e),
        };
        future::ready(m).boxed()
    }

    fn name(&self) -> Vec<u8> {
        self.name.clone()
    }

    fn is_dir(&self) -> FsFuture<'_, bool> {
        future::ready(self.meta.as_ref().map(|m| m.is_dir()).map_err(|e| *e)).boxed()
    }
}

impl DavFile for LocalFsFile {
    fn metadata(&mut self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        async move {
            let meta = self.0.metadata().await?;
            Ok(Box::new(LocalFsMetaData(meta)) as Box<dyn DavMetaData>)
        }
        .boxed()
    }

    // A write error after some data went out (typically ENOSPC) is
    // reported as a short write.
    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<'_, usize> {
        async move {
            let mut done = 0;
            while done < buf.len() {
                match self.0.write(&buf[done..]).await {
                    Ok(0) => break,
                    Ok(n) => done += n,
                    Err(e) if done > 0 => {
                        debug!("write failed after {} bytes: {}", done, e);
                        break;
                    },
                    Err(e) => return Err(e.into()),
                }
            }
            Ok(done)
        }
        .boxed()
    }

    fn read_bytes(&mut self, count: usize) -> FsFuture<'_, Bytes> {
        async move {
            let mut buf = BytesMut::with_capacity(count);
            let mut reader = (&mut self.0).take(count as u64);
            while reader.read_buf(&mut buf).await? > 0 {}
            Ok(buf.freeze())
        }
        .boxed()
    }

    fn seek(&mut self, pos: SeekFrom) -> FsFuture<'_, u64> {
        self.0.seek(pos).map_err(Into::into).boxed()
    }

    fn flush(&mut self) -> FsFuture<'_, ()> {
        self.0.flush().map_err(Into::into).boxed()
    }
}

impl DavMetaData for LocalFsMetaData {
    fn len(&self) -> u64 {
        self.0.len()
    }
    fn created(&self) -> FsResult<SystemTime> {
        self.0.created().map_err(|e| e.into())
    }
    fn modified(&self) -> FsResult<SystemTime> {
        self.0.modified().map_err(|e| e.into())
    }
    fn is_dir(&self) -> bool {
        self.0.is_dir()
    }
}

impl From<io::Error> for FsError {
    fn from(e: io::Error) -> Self {
        if let Some(errno) = e.raw_os_error() {
            // specific errors.
            match errno {
                libc::EMLINK | libc::ENOSPC | libc::EDQUOT => return FsError::InsufficientStorage,
                libc::EFBIG => return FsError::TooLarge,
                libc::EACCES | libc::EPERM => return FsError::Forbidden,
                libc::ENOTEMPTY | libc::EEXIST => return FsError::Exists,
                libc::ENAMETOOLONG => return FsError::PathTooLong,
                libc::ENOTDIR => return FsError::Forbidden,
                libc::EISDIR => return FsError::Forbidden,
                libc::EROFS => return FsError::Forbidden,
                libc::ENOENT => return FsError::NotFound,
                libc::ENOSYS => return FsError::NotImplemented,
                _ => {},
            }
        } else {
            // not an OS error - must be "not implemented"
            // (e.g. metadata().created() on systems without st_crtime)
            return FsError::NotImplemented;
        }
        // generic mappings for-whatever is left.
        match e.kind() {
            ErrorKind::NotFound => FsError::NotFound,
            ErrorKind::PermissionDenied => FsError::Forbidden,
            _ => FsError::GeneralFailure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    fn tempdir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wiredav-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn p(s: &str) -> DavPath {
        DavPath::new(s).unwrap()
    }

    #[tokio::test]
    async fn test_write_read() {
        let dir = tempdir("rw");
        let fs = LocalFs::new(&dir, false);
        let mut f = fs.open(&p("/f.txt"), OpenOptions::write()).await.unwrap();
        assert_eq!(f.write_bytes(Bytes::from_static(b"0123456789")).await.unwrap(), 10);
        f.flush().await.unwrap();
        drop(f);

        let mut f = fs.open(&p("/f.txt"), OpenOptions::read()).await.unwrap();
        f.seek(SeekFrom::Start(2)).await.unwrap();
        assert_eq!(f.read_bytes(3).await.unwrap(), Bytes::from_static(b"234"));
        assert_eq!(fs.metadata(&p("/f.txt")).await.unwrap().len(), 10);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_read_dir_sorted() {
        let dir = tempdir("rd");
        let fs = LocalFs::new(&dir, false);
        for name in ["c", "a", "b"] {
            fs.create_dir(&p(name)).await.unwrap();
        }
        let names: Vec<Vec<u8>> = fs.read_dir(&p("/")).await.unwrap().map(|e| e.name()).collect().await;
        assert_eq!(names, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
        assert_eq!(fs.remove_dir(&p("/zz")).await.unwrap_err(), FsError::NotFound);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_rename_no_clobber() {
        let dir = tempdir("mv");
        let fs = LocalFs::new(&dir, false);
        fs.open(&p("/a"), OpenOptions::write()).await.unwrap();
        fs.open(&p("/b"), OpenOptions::write()).await.unwrap();
        assert_eq!(fs.rename(&p("/a"), &p("/b")).await.unwrap_err(), FsError::Exists);
        fs.rename(&p("/a"), &p("/c")).await.unwrap();
        assert!(fs.metadata(&p("/c")).await.unwrap().is_file());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
