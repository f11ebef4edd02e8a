//! `Webdav` (RFC4918) is HTTP (GET/HEAD/PUT/DELETE) plus a bunch of extra methods.
//!
//! This crate implements a small WebDAV protocol engine that speaks
//! HTTP/1.1 directly over a byte stream. There is no HTTP server
//! framework underneath: you accept the connection, and hand the stream
//! (anything that is `AsyncRead + AsyncWrite`) to [`DavHandler::serve`],
//! which reads requests and writes responses until the connection is done.
//!
//! It has an interface similar to the Go x/net/webdav package:
//!
//! - the library contains a protocol handler
//! - you supply a "filesystem" for backend storage
//! - you can supply a "locksystem" that handles the webdav locks
//!
//! Supported are OPTIONS, PROPFIND (PROPPATCH is accepted but changes
//! nothing), GET and HEAD with single byte ranges, PUT, MKCOL, DELETE,
//! COPY, MOVE, and, when a locksystem is configured, LOCK and UNLOCK.
//! Locks are advisory, exclusive, and never time out.
//!
//! Included are two filesystems:
//!
//! - localfs: serves a directory on the local filesystem
//! - memfs: ephemeral in-memory filesystem.
//!
//! Also included are two locksystems:
//!
//! - memls: ephemeral in-memory locksystem.
//! - fakels: fake locksystem. Every lock is granted and forgotten.
//!
//! Example server that serves the /tmp directory in r/w mode.
//!
//! ```no_run
//! use wiredav::{DavHandler, localfs::LocalFs, memls::MemLs};
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let dav = DavHandler::builder()
//!         .filesystem(LocalFs::new("/tmp", false))
//!         .locksystem(MemLs::new())
//!         .build_handler();
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:4918").await?;
//!     loop {
//!         let (stream, _) = listener.accept().await?;
//!         let dav = dav.clone();
//!         tokio::spawn(async move { dav.serve(stream).await });
//!     }
//! }
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]

#[macro_use]
extern crate log;

mod davhandler;
mod davheaders;
mod errors;
mod handle_copymove;
mod handle_delete;
mod handle_gethead;
mod handle_lock;
mod handle_mkcol;
mod handle_options;
mod handle_props;
mod handle_put;
mod request;
mod response;
mod transfer;
#[cfg(feature = "memfs")]
mod tree;
mod util;
mod voidfs;
mod walk;

pub mod body;
pub mod davpath;
pub mod fakels;
pub mod fs;
#[cfg(all(unix, feature = "localfs"))]
#[cfg_attr(docsrs, doc(cfg(all(unix, feature = "localfs"))))]
pub mod localfs;
pub mod ls;
#[cfg(feature = "memfs")]
#[cfg_attr(docsrs, doc(cfg(feature = "memfs")))]
pub mod memfs;
pub mod memls;

pub(crate) use crate::davhandler::DavInner;
pub(crate) use crate::errors::{DavError, DavResult};

pub use crate::davhandler::{DavConfig, DavHandler};
pub use crate::transfer::ProgressFn;
pub use crate::walk::dump_tree;
