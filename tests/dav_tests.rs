use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use wiredav::memfs::{MemFs, MemFsOptions};
use wiredav::memls::MemLs;
use wiredav::{DavConfig, DavHandler};

#[derive(Debug)]
struct Resp {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Resp {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn count(&self, needle: &str) -> usize {
        self.text().matches(needle).count()
    }
}

fn req(method: &str, path: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut r = format!("{} {} HTTP/1.1\r\nHost: localhost\r\n", method, path);
    for (n, v) in headers {
        r.push_str(&format!("{}: {}\r\n", n, v));
    }
    if !body.is_empty() {
        r.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    r.push_str("\r\n");
    let mut r = r.into_bytes();
    r.extend_from_slice(body);
    r
}

fn find(hay: &[u8], needle: &[u8]) -> Option<usize> {
    hay.windows(needle.len()).position(|w| w == needle)
}

// Split a byte stream into responses. Not for HEAD.
fn parse_responses(mut data: &[u8]) -> Vec<Resp> {
    let mut out = Vec::new();
    while !data.is_empty() {
        let end = find(data, b"\r\n\r\n").expect("end of head");
        let head = std::str::from_utf8(&data[..end]).unwrap();
        data = &data[end + 4..];
        let mut lines = head.split("\r\n");
        let status = lines.next().unwrap().split(' ').nth(1).unwrap().parse().unwrap();
        let headers: Vec<(String, String)> = lines
            .map(|l| {
                let (n, v) = l.split_once(": ").unwrap();
                (n.to_ascii_lowercase(), v.to_string())
            })
            .collect();
        let mut body = Vec::new();
        if headers.iter().any(|(n, v)| n == "transfer-encoding" && v == "chunked") {
            loop {
                let eol = find(data, b"\r\n").unwrap();
                let len = usize::from_str_radix(std::str::from_utf8(&data[..eol]).unwrap(), 16).unwrap();
                data = &data[eol + 2..];
                if len == 0 {
                    data = &data[2..];
                    break;
                }
                body.extend_from_slice(&data[..len]);
                data = &data[len + 2..];
            }
        } else {
            let len: usize = headers
                .iter()
                .find(|(n, _)| n == "content-length")
                .map(|(_, v)| v.parse().unwrap())
                .unwrap_or(0);
            body.extend_from_slice(&data[..len]);
            data = &data[len..];
        }
        out.push(Resp { status, headers, body });
    }
    out
}

// Send all requests over one connection, then read until the server closes it.
async fn exchange(dav: &DavHandler, requests: Vec<Vec<u8>>) -> Vec<u8> {
    let (client, server) = tokio::io::duplex(1 << 20);
    let dav = dav.clone();
    let srv = tokio::spawn(async move { dav.serve(server).await });

    let (mut rd, mut wr) = tokio::io::split(client);
    let writer = tokio::spawn(async move {
        for r in requests {
            if wr.write_all(&r).await.is_err() {
                break;
            }
        }
        let _ = wr.shutdown().await;
    });
    let mut out = Vec::new();
    rd.read_to_end(&mut out).await.unwrap();
    writer.await.unwrap();
    srv.await.unwrap().unwrap();
    out
}

async fn run(dav: &DavHandler, requests: Vec<Vec<u8>>) -> Vec<Resp> {
    parse_responses(&exchange(dav, requests).await)
}

async fn one(dav: &DavHandler, request: Vec<u8>) -> Resp {
    let mut v = run(dav, vec![request]).await;
    assert_eq!(v.len(), 1);
    v.remove(0)
}

fn memfs_server() -> DavHandler {
    DavHandler::builder().filesystem(MemFs::new()).build_handler()
}

fn locking_server() -> DavHandler {
    DavHandler::builder()
        .filesystem(MemFs::new())
        .locksystem(MemLs::new())
        .build_handler()
}

const LOCKINFO: &[u8] = br#"<?xml version="1.0" encoding="utf-8"?><D:lockinfo xmlns:D="DAV:"><D:lockscope><D:exclusive/></D:lockscope><D:locktype><D:write/></D:locktype><D:owner>alice</D:owner></D:lockinfo>"#;

fn data(n: usize) -> Vec<u8> {
    (0..n).map(|i| b'a' + (i % 26) as u8).collect()
}

#[tokio::test]
async fn test_options() {
    let _ = env_logger::builder().is_test(true).try_init();
    let r = one(&memfs_server(), req("OPTIONS", "/", &[], b"")).await;
    assert_eq!(r.status, 200);
    assert_eq!(r.header("dav"), Some("1"));
    assert_eq!(r.header("accept-ranges"), Some("bytes"));
    assert_eq!(r.header("allow"), Some("PROPFIND,GET,DELETE,PUT,COPY,MOVE"));

    let r = one(&locking_server(), req("OPTIONS", "/", &[], b"")).await;
    assert_eq!(r.header("dav"), Some("1, 2"));
    assert_eq!(r.header("allow"), Some("PROPFIND,GET,DELETE,PUT,COPY,MOVE,LOCK,UNLOCK"));
}

#[tokio::test]
async fn test_put_get() {
    let dav = memfs_server();
    let body = data(100);
    let r = run(
        &dav,
        vec![
            req("PUT", "/f.txt", &[], &body),
            req("GET", "/f.txt", &[], b""),
            req("PUT", "/f.txt", &[], b"xyz"),
            req("GET", "/f.txt", &[], b""),
        ],
    )
    .await;
    assert_eq!(r[0].status, 201);
    assert_eq!(r[1].status, 200);
    assert_eq!(r[1].body, body);
    assert_eq!(r[1].header("content-length"), Some("100"));
    assert_eq!(r[1].header("content-type"), Some("text/plain"));
    assert_eq!(r[2].status, 200);
    assert_eq!(r[3].body, b"xyz");
}

#[tokio::test]
async fn test_put_empty() {
    let dav = memfs_server();
    let r = run(
        &dav,
        vec![req("PUT", "/empty", &[("Content-Length", "0")], b""), req("GET", "/empty", &[], b"")],
    )
    .await;
    assert_eq!(r[0].status, 201);
    assert_eq!(r[1].status, 200);
    assert_eq!(r[1].header("content-length"), Some("0"));
    assert!(r[1].body.is_empty());
}

#[tokio::test]
async fn test_put_into_missing_dir() {
    let r = one(&memfs_server(), req("PUT", "/nope/f", &[], b"abc")).await;
    assert_eq!(r.status, 500);
    assert!(r.text().starts_with("Unable to create a new file\n"));
}

#[tokio::test]
async fn test_range() {
    let dav = memfs_server();
    let body = data(100);
    let r = run(
        &dav,
        vec![
            req("PUT", "/f.bin", &[], &body),
            req("GET", "/f.bin", &[("Range", "bytes=0-999999")], b""),
            req("GET", "/f.bin", &[("Range", "bytes=10-19")], b""),
            req("GET", "/f.bin", &[("Range", "bytes=90-")], b""),
            req("GET", "/f.bin", &[], b""),
            req("GET", "/f.bin", &[("Range", "bytes=200-")], b""),
        ],
    )
    .await;
    assert_eq!(r[1].status, 206);
    assert_eq!(r[1].header("content-range"), Some("bytes 0-99/100"));
    assert_eq!(r[1].body, body);
    assert_eq!(r[2].status, 206);
    assert_eq!(r[2].header("content-range"), Some("bytes 10-19/100"));
    assert_eq!(r[2].body, &body[10..20]);
    assert_eq!(r[3].body, &body[90..]);
    assert_eq!(r[4].status, 200);
    assert_eq!(r[4].header("content-range"), None);
    assert_eq!(r[4].body.len(), 100);
    assert_eq!(r[5].status, 416);
    assert_eq!(r[5].header("content-range"), Some("bytes */100"));
}

#[tokio::test]
async fn test_head() {
    let dav = memfs_server();
    let out = exchange(
        &dav,
        vec![req("PUT", "/f.txt", &[], b"hello"), req("HEAD", "/f.txt", &[("Connection", "close")], b"")],
    )
    .await;
    let text = String::from_utf8(out).unwrap();
    let head = &text[text.find("HTTP/1.1 200").unwrap()..];
    assert!(head.contains("Content-Length: 5\r\n"));
    assert!(head.ends_with("\r\n\r\n"));
}

#[tokio::test]
async fn test_get_dir_and_missing() {
    let dav = memfs_server();
    let r = run(
        &dav,
        vec![
            req("MKCOL", "/d", &[], b""),
            req("GET", "/d", &[], b""),
            req("GET", "/nope", &[], b""),
        ],
    )
    .await;
    assert_eq!(r[1].status, 200);
    assert_eq!(r[1].header("content-type"), Some("text/plain"));
    assert_eq!(r[2].status, 404);
    assert_eq!(r[2].text(), "Not found\nURI: /nope Method: GET\n");
    assert_eq!(r[2].header("dav"), Some("1"));
    assert_eq!(r[2].header("accept-ranges"), Some("bytes"));
    assert_eq!(r[2].header("allow"), Some("PROPFIND,GET,DELETE,PUT,COPY,MOVE"));
}

#[tokio::test]
async fn test_gzip_encoding() {
    let dav = memfs_server();
    let r = run(&dav, vec![req("PUT", "/page.html.gz", &[], b"xx"), req("GET", "/page.html.gz", &[], b"")]).await;
    assert_eq!(r[1].header("content-type"), Some("text/html"));
    assert_eq!(r[1].header("content-encoding"), Some("gzip"));
}

#[tokio::test]
async fn test_propfind_depth() {
    let dav = memfs_server();
    let r = run(
        &dav,
        vec![
            req("MKCOL", "/d", &[], b""),
            req("MKCOL", "/d/sub", &[], b""),
            req("PUT", "/d/a", &[], b"a"),
            req("PUT", "/d/sub/b", &[], b"b"),
            req("PROPFIND", "/d", &[("Depth", "0")], b""),
            req("PROPFIND", "/d", &[("Depth", "1")], b""),
            req("PROPFIND", "/d", &[("Depth", "infinity")], b""),
            req("PROPFIND", "/d/a", &[("Depth", "1")], b""),
            req("PROPFIND", "/nope", &[], b""),
        ],
    )
    .await;
    assert_eq!(r[4].status, 207);
    assert_eq!(r[4].header("transfer-encoding"), Some("chunked"));
    assert_eq!(r[4].header("content-type"), Some("application/xml;charset=utf-8"));
    assert_eq!(r[4].count("<D:response>"), 1);
    assert_eq!(r[5].count("<D:response>"), 3);
    assert!(!r[5].text().contains("/d/sub/b"));
    assert_eq!(r[6].count("<D:response>"), 4);
    assert!(r[6].text().contains("<D:href>/d/sub/b</D:href>"));
    assert_eq!(r[7].count("<D:response>"), 1);
    assert!(r[7].text().contains("<D:getcontentlength>1</D:getcontentlength>"));
    assert_eq!(r[8].status, 404);
}

#[tokio::test]
async fn test_propfind_root_lists_version() {
    let dav = memfs_server();
    let r = run(
        &dav,
        vec![
            req("PROPFIND", "/", &[("Depth", "1")], b""),
            req("GET", "/.wiredav", &[], b""),
            req("DELETE", "/.wiredav", &[], b""),
        ],
    )
    .await;
    assert!(r[0].text().contains("<D:href>/.wiredav</D:href>"));
    assert!(r[0].text().contains("<D:collection>"));
    assert_eq!(r[1].status, 200);
    assert_eq!(r[1].text(), format!("wiredav {}", env!("CARGO_PKG_VERSION")));
    assert_eq!(r[2].status, 403);
}

#[tokio::test]
async fn test_propfind_quota() {
    let dav = DavHandler::builder()
        .filesystem(MemFs::with_options(MemFsOptions {
            capacity: Some(1000),
            ..MemFsOptions::default()
        }))
        .build_handler();
    let body = br#"<propfind xmlns="DAV:"><prop><quota-available-bytes/><quota-used-bytes/></prop></propfind>"#;
    let r = run(&dav, vec![req("PUT", "/f", &[], &data(10)), req("PROPFIND", "/f", &[], body)]).await;
    assert!(r[1].text().contains("<D:quota-available-bytes>990</D:quota-available-bytes>"));
    assert!(r[1].text().contains("<D:quota-used-bytes>10</D:quota-used-bytes>"));
}

#[tokio::test]
async fn test_put_over_capacity() {
    let dav = DavHandler::builder()
        .filesystem(MemFs::with_options(MemFsOptions {
            capacity: Some(10),
            ..MemFsOptions::default()
        }))
        .read_buf_size(4)
        .build_handler();
    let r = run(&dav, vec![req("PUT", "/f", &[], &data(20)), req("GET", "/f", &[], b"")]).await;
    assert_eq!(r[0].status, 500);
    assert!(r[0].text().starts_with("Write data failed\n"));
    // the rest of the body is skipped, and the connection stays usable.
    assert_eq!(r.len(), 2);
    assert_eq!(r[1].status, 404);
}

#[tokio::test]
async fn test_refused_put_keeps_connection() {
    let dav = memfs_server();
    let r = run(
        &dav,
        vec![
            req("PUT", "/nope/f", &[], &data(30)),
            req("PUT", "/f", &[], b"ok"),
            req("GET", "/f", &[], b""),
        ],
    )
    .await;
    assert_eq!(r.len(), 3);
    assert_eq!(r[0].status, 500);
    assert_eq!(r[0].header("connection"), Some("keep-alive"));
    assert_eq!(r[1].status, 201);
    assert_eq!(r[2].body, b"ok");
}

#[tokio::test]
async fn test_put_timeout() {
    let dav = DavHandler::builder()
        .filesystem(MemFs::new())
        .read_timeout(Duration::from_millis(100))
        .build_handler();

    let (client, server) = tokio::io::duplex(4096);
    let dav2 = dav.clone();
    let srv = tokio::spawn(async move { dav2.serve(server).await });
    let (mut rd, mut wr) = tokio::io::split(client);
    wr.write_all(b"PUT /p HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc")
        .await
        .unwrap();
    let mut out = Vec::new();
    rd.read_to_end(&mut out).await.unwrap();
    srv.await.unwrap().unwrap();
    let r = parse_responses(&out);
    assert_eq!(r.len(), 1);
    assert_eq!(r[0].status, 500);
    assert_eq!(r[0].header("connection"), Some("close"));
    assert!(r[0].text().starts_with("Timed out waiting for data\n"));

    // no partial file is left behind.
    let r = one(&dav, req("GET", "/p", &[], b"")).await;
    assert_eq!(r.status, 404);
}

#[tokio::test]
async fn test_mkcol() {
    let dav = memfs_server();
    let r = run(
        &dav,
        vec![
            req("MKCOL", "/a", &[], b""),
            req("MKCOL", "/a", &[], b""),
            req("MKCOL", "/x/y", &[], b""),
            req("MKCOL", "/b", &[], b"<x/>"),
        ],
    )
    .await;
    assert_eq!(r[0].status, 201);
    assert_eq!(r[0].header("allow"), Some("OPTIONS,MKCOL,LOCK,POST,PUT"));
    assert_eq!(r[1].status, 405);
    assert_eq!(r[2].status, 409);
    assert_eq!(r[3].status, 415);
}

#[tokio::test]
async fn test_delete_keeps_parent() {
    let dav = DavHandler::builder()
        .filesystem(MemFs::with_options(MemFsOptions {
            prune_empty_dirs: true,
            ..MemFsOptions::default()
        }))
        .build_handler();
    let r = run(
        &dav,
        vec![
            req("MKCOL", "/dir", &[], b""),
            req("PUT", "/dir/only.txt", &[], b"x"),
            req("DELETE", "/dir/only.txt", &[], b""),
            req("PROPFIND", "/dir", &[("Depth", "1")], b""),
            req("DELETE", "/dir/only.txt", &[], b""),
        ],
    )
    .await;
    assert_eq!(r[2].status, 200);
    assert_eq!(r[3].status, 207);
    assert_eq!(r[3].count("<D:response>"), 1);
    assert_eq!(r[4].status, 404);
}

#[tokio::test]
async fn test_delete_keeps_ancestors() {
    let dav = DavHandler::builder()
        .filesystem(MemFs::with_options(MemFsOptions {
            prune_empty_dirs: true,
            ..MemFsOptions::default()
        }))
        .build_handler();
    let r = run(
        &dav,
        vec![
            req("MKCOL", "/x", &[], b""),
            req("MKCOL", "/x/y", &[], b""),
            req("PUT", "/x/y/z.txt", &[], b"z"),
            req("DELETE", "/x/y/z.txt", &[], b""),
            req("PROPFIND", "/x/y", &[], b""),
            req("PROPFIND", "/x", &[("Depth", "1")], b""),
        ],
    )
    .await;
    assert_eq!(r[3].status, 200);
    assert_eq!(r[4].status, 207);
    assert_eq!(r[5].status, 207);
    assert!(r[5].text().contains("<D:href>/x/y</D:href>"));
}

#[tokio::test]
async fn test_delete_tree() {
    let dav = memfs_server();
    let r = run(
        &dav,
        vec![
            req("MKCOL", "/t", &[], b""),
            req("MKCOL", "/t/u", &[], b""),
            req("PUT", "/t/u/f", &[], b"1"),
            req("PUT", "/t/g", &[], b"2"),
            req("DELETE", "/t", &[], b""),
            req("PROPFIND", "/t", &[], b""),
            req("PROPFIND", "/", &[("Depth", "0")], b""),
        ],
    )
    .await;
    assert_eq!(r[4].status, 200);
    assert_eq!(r[5].status, 404);
    assert_eq!(r[6].status, 207);
}

#[tokio::test]
async fn test_copy() {
    let dav = memfs_server();
    let r = run(
        &dav,
        vec![
            req("PUT", "/x", &[], b"data"),
            req("COPY", "/x", &[("Destination", "http://localhost/nope/x")], b""),
            req("PROPFIND", "/nope", &[], b""),
            req("COPY", "/x", &[("Destination", "http://localhost/y")], b""),
            req("GET", "/y", &[], b""),
            req("COPY", "/x", &[("Destination", "http://localhost/y"), ("Overwrite", "F")], b""),
            req("MKCOL", "/d", &[], b""),
            req("COPY", "/x", &[("Destination", "http://localhost/d/")], b""),
            req("GET", "/d/x", &[], b""),
        ],
    )
    .await;
    assert_eq!(r[1].status, 409);
    assert_eq!(r[2].status, 404);
    assert_eq!(r[3].status, 201);
    assert_eq!(r[4].body, b"data");
    assert_eq!(r[5].status, 412);
    assert_eq!(r[7].status, 204);
    assert_eq!(r[8].body, b"data");
}

#[tokio::test]
async fn test_copy_tree() {
    let dav = memfs_server();
    let r = run(
        &dav,
        vec![
            req("MKCOL", "/src", &[], b""),
            req("MKCOL", "/src/sub", &[], b""),
            req("PUT", "/src/a", &[], b"A"),
            req("PUT", "/src/sub/b", &[], b"B"),
            req("COPY", "/src", &[("Destination", "http://localhost/dst"), ("Depth", "infinity")], b""),
            req("GET", "/dst/a", &[], b""),
            req("GET", "/dst/sub/b", &[], b""),
            req("GET", "/src/sub/b", &[], b""),
            req("COPY", "/src", &[("Destination", "http://localhost/src/sub/x"), ("Depth", "infinity")], b""),
        ],
    )
    .await;
    assert_eq!(r[4].status, 201);
    assert_eq!(r[5].body, b"A");
    assert_eq!(r[6].body, b"B");
    assert_eq!(r[7].body, b"B");
    assert_eq!(r[8].status, 403);
}

#[tokio::test]
async fn test_move() {
    let dav = memfs_server();
    let r = run(
        &dav,
        vec![
            req("MKCOL", "/b", &[], b""),
            req("PUT", "/a", &[], b"payload"),
            req("MOVE", "/a", &[("Destination", "http://localhost/b")], b""),
            req("GET", "/b/a", &[], b""),
            req("GET", "/a", &[], b""),
            req("PUT", "/c", &[], b"c"),
            req("PUT", "/e", &[], b"e"),
            req("MOVE", "/c", &[("Destination", "/e"), ("Overwrite", "F")], b""),
            req("MOVE", "/c", &[("Destination", "/e")], b""),
            req("GET", "/e", &[], b""),
            req("MOVE", "/nope", &[("Destination", "/z")], b""),
        ],
    )
    .await;
    assert_eq!(r[2].status, 204);
    assert_eq!(r[3].body, b"payload");
    assert_eq!(r[4].status, 404);
    assert_eq!(r[7].status, 412);
    assert_eq!(r[8].status, 201);
    assert_eq!(r[9].body, b"c");
    assert_eq!(r[10].status, 404);
}

fn lock_token(r: &Resp) -> String {
    let v = r.header("lock-token").expect("lock-token");
    v.trim_start_matches('<').trim_end_matches('>').to_string()
}

#[tokio::test]
async fn test_lock_unlock() {
    let dav = locking_server();
    let r = run(&dav, vec![req("PUT", "/f", &[], b"1"), req("LOCK", "/f", &[], LOCKINFO)]).await;
    assert_eq!(r[1].status, 200);
    assert_eq!(r[1].header("content-type"), Some("application/xml;charset=utf-8"));
    let token = lock_token(&r[1]);
    assert_eq!(token.len(), 16);
    assert!(r[1].text().contains(&format!("<D:href>{}</D:href>", token)));

    let iff = format!("(<{}>)", token);
    let lt = format!("<{}>", token);
    let r = run(
        &dav,
        vec![
            req("PUT", "/f", &[], b"2"),
            req("PUT", "/f", &[("If", iff.as_str())], b"3"),
            req("GET", "/f", &[], b""),
            req("LOCK", "/f", &[], LOCKINFO),
            req("LOCK", "/f", &[], br#"<D:lockinfo xmlns:D="DAV:"><D:owner>bob</D:owner></D:lockinfo>"#),
            req("UNLOCK", "/f", &[("Lock-Token", "<0000000000000001>")], b""),
            req("UNLOCK", "/f", &[("Lock-Token", lt.as_str())], b""),
            req("PUT", "/f", &[], b"4"),
            req("UNLOCK", "/f", &[("Lock-Token", lt.as_str())], b""),
        ],
    )
    .await;
    assert_eq!(r[0].status, 423);
    assert_eq!(r[1].status, 200);
    assert_eq!(r[2].body, b"3");
    assert_eq!(r[3].status, 200);
    assert_eq!(r[4].status, 423);
    assert_eq!(r[5].status, 423);
    assert_eq!(r[6].status, 204);
    assert_eq!(r[7].status, 200);
    assert_eq!(r[8].status, 423);
}

#[tokio::test]
async fn test_lock_ancestor() {
    let dav = locking_server();
    let r = run(
        &dav,
        vec![
            req("MKCOL", "/a", &[], b""),
            req("MKCOL", "/a/b", &[], b""),
            req("LOCK", "/a", &[], LOCKINFO),
        ],
    )
    .await;
    let iff = format!("(<{}>)", lock_token(&r[2]));
    let r = run(
        &dav,
        vec![
            req("PUT", "/a/b/c", &[], b"x"),
            req("PUT", "/a/b/c", &[("If", iff.as_str())], b"x"),
            req("DELETE", "/a/b/c", &[], b""),
            req("PROPFIND", "/a/b", &[], b""),
            req("PROPFIND", "/a/b", &[], br#"<propfind xmlns="DAV:"><prop><lockdiscovery/></prop></propfind>"#),
            req("COPY", "/a/b/c", &[("Destination", "/c2")], b""),
            req("MOVE", "/a/b/c", &[("Destination", "/c3")], b""),
        ],
    )
    .await;
    assert_eq!(r[0].status, 423);
    assert_eq!(r[1].status, 201);
    assert_eq!(r[2].status, 423);
    assert_eq!(r[3].status, 423);
    assert_eq!(r[4].status, 207);
    assert_eq!(r[5].status, 201);
    assert_eq!(r[6].status, 423);
}

#[tokio::test]
async fn test_lock_errors() {
    let dav = locking_server();
    let r = run(
        &dav,
        vec![
            req("LOCK", "/absent", &[], LOCKINFO),
            req("PUT", "/f", &[], b"1"),
            req("LOCK", "/f", &[], b"<lockinfo/>"),
        ],
    )
    .await;
    assert_eq!(r[0].status, 404);
    assert_eq!(r[2].status, 412);

    // without a locksystem, LOCK is an unknown method.
    let r = one(&memfs_server(), req("LOCK", "/", &[], LOCKINFO)).await;
    assert_eq!(r.status, 404);
}

#[tokio::test]
async fn test_unknown_method_keeps_connection() {
    let r = run(
        &memfs_server(),
        vec![req("BREW", "/pot", &[], b"coffee"), req("OPTIONS", "/", &[], b"")],
    )
    .await;
    assert_eq!(r.len(), 2);
    assert_eq!(r[0].status, 404);
    assert_eq!(r[0].text(), "Not Found\nURI: /pot Method: BREW\n");
    assert_eq!(r[1].status, 200);
}

#[tokio::test]
async fn test_connection_close() {
    let r = run(
        &memfs_server(),
        vec![
            req("OPTIONS", "/", &[("Connection", "close")], b""),
            req("OPTIONS", "/", &[], b""),
        ],
    )
    .await;
    assert_eq!(r.len(), 1);
    assert_eq!(r[0].header("connection"), Some("close"));
}

#[tokio::test]
async fn test_bad_request_line() {
    let out = exchange(&memfs_server(), vec![b"GARBAGE\r\n\r\nOPTIONS / HTTP/1.1\r\n\r\n".to_vec()]).await;
    let r = parse_responses(&out);
    assert_eq!(r.len(), 1);
    assert_eq!(r[0].status, 400);
}

#[tokio::test]
async fn test_no_filesystem() {
    let dav = DavConfig::new().build_handler();
    let r = run(&dav, vec![req("OPTIONS", "/", &[], b""), req("PROPFIND", "/", &[], b"")]).await;
    assert_eq!(r[0].status, 200);
    assert_eq!(r[1].status, 405);
    assert_eq!(r[1].header("connection"), Some("close"));
}

#[tokio::test]
async fn test_prefix() {
    let dav = DavHandler::builder()
        .filesystem(MemFs::new())
        .strip_prefix("/dav")
        .build_handler();
    assert!(dav.is_dav_path("/dav"));
    assert!(dav.is_dav_path("/dav/x/y"));
    assert!(!dav.is_dav_path("/other"));
    assert!(!dav.is_dav_path("/davx"));

    let r = run(
        &dav,
        vec![
            req("PUT", "/dav/my%20file.txt", &[], b"x"),
            req("PROPFIND", "/dav", &[("Depth", "1")], b""),
            req("GET", "/other", &[], b""),
        ],
    )
    .await;
    assert_eq!(r[0].status, 201);
    assert!(r[1].text().contains("<D:href>/dav</D:href>"));
    assert!(r[1].text().contains("<D:href>/dav/my%20file.txt</D:href>"));
    assert_eq!(r[2].status, 404);
}

#[tokio::test]
async fn test_slash_normalization() {
    let dav = memfs_server();
    let r = run(
        &dav,
        vec![
            req("MKCOL", "/a", &[], b""),
            req("PUT", "//a///f.txt", &[], b"x"),
            req("GET", "/a/f.txt/", &[], b""),
        ],
    )
    .await;
    assert_eq!(r[1].status, 201);
    assert_eq!(r[2].body, b"x");
}

#[tokio::test]
async fn test_body_timeout() {
    let dav = DavHandler::builder()
        .filesystem(MemFs::new())
        .read_timeout(Duration::from_millis(100))
        .build_handler();
    let (client, server) = tokio::io::duplex(4096);
    let srv = tokio::spawn(async move { dav.serve(server).await });
    let (mut rd, mut wr) = tokio::io::split(client);
    wr.write_all(b"PROPFIND / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc")
        .await
        .unwrap();
    let mut out = Vec::new();
    rd.read_to_end(&mut out).await.unwrap();
    srv.await.unwrap().unwrap();
    let r = parse_responses(&out);
    assert_eq!(r[0].status, 408);
}

#[tokio::test]
async fn test_reject() {
    let dav = memfs_server();
    let reject = |request: Vec<u8>| {
        let dav = dav.clone();
        async move {
            let (client, server) = tokio::io::duplex(1 << 16);
            let srv = tokio::spawn(async move { dav.reject(server, "server busy").await });
            let (mut rd, mut wr) = tokio::io::split(client);
            wr.write_all(&request).await.unwrap();
            let mut out = Vec::new();
            rd.read_to_end(&mut out).await.unwrap();
            srv.await.unwrap().unwrap();
            parse_responses(&out).remove(0)
        }
    };

    let r = reject(req("PROPFIND", "/", &[("Depth", "1")], b"")).await;
    assert_eq!(r.status, 207);
    assert_eq!(r.header("connection"), Some("close"));
    assert_eq!(r.count("<D:response>"), 2);
    assert!(r.text().contains("<D:href>/server%20busy</D:href>"));
    assert!(r.text().contains("Fri, 30 Nov 1979 00:00:00 GMT"));
    assert!(r.text().contains("Fri, 01 Apr 2016 16:07:40 GMT"));

    let r = reject(req("PROPFIND", "/", &[], b"")).await;
    assert_eq!(r.count("<D:response>"), 1);

    let r = reject(req("OPTIONS", "/", &[], b"")).await;
    assert_eq!(r.status, 200);

    let r = reject(req("GET", "/x", &[], b"")).await;
    assert_eq!(r.status, 404);
}

#[tokio::test]
async fn test_progress() {
    use std::sync::{Arc, Mutex};
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = seen.clone();
    let dav = DavHandler::builder()
        .filesystem(MemFs::new())
        .read_buf_size(50)
        .progress(move |name, pct, receive| seen2.lock().unwrap().push((name.to_string(), pct, receive)))
        .build_handler();
    run(&dav, vec![req("PUT", "/p", &[], &data(100)), req("GET", "/p", &[], b"")]).await;
    let seen = seen.lock().unwrap();
    assert_eq!(
        *seen,
        vec![
            ("p".to_string(), 50, true),
            ("p".to_string(), 100, true),
            ("p".to_string(), 50, false),
            ("p".to_string(), 100, false),
        ]
    );
}
