//
//  Sample application.
//
//  Listens on localhost:4918, plain http, no ssl.
//  Connect to http://localhost:4918/
//

use std::error::Error;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use wiredav::{DavHandler, fakels, localfs, memfs, memls};

#[derive(Debug, clap::Parser)]
#[clap(about, version)]
struct Cli {
    /// port to listen on
    #[clap(short = 'p', long, default_value = "4918")]
    port: u16,
    /// local directory to serve
    #[clap(short = 'd', long)]
    dir: Option<String>,
    /// mount the tree under this prefix
    #[clap(long, default_value = "")]
    prefix: String,
    /// use ephemeral memory locksystem
    #[clap(short = 'l', long)]
    memls: bool,
    /// use fake memory locksystem
    #[clap(short = 'f', long)]
    fakels: bool,
    /// refuse every request, showing this message to file browsers
    #[clap(short = 'r', long)]
    reject: Option<String>,
    /// seconds an idle connection is kept open
    #[clap(long, default_value = "5")]
    idle: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let args = Cli::parse();

    let mut config = DavHandler::builder()
        .strip_prefix(args.prefix.clone())
        .idle_timeout(Duration::from_secs(args.idle))
        .progress(|name, pct, receive| {
            log::debug!("{} {}: {}%", if receive { "receiving" } else { "sending" }, name, pct)
        });
    let name = match args.dir.as_ref() {
        Some(dir) => {
            config = config.filesystem(localfs::LocalFs::new(dir, true));
            dir.as_str()
        },
        None => {
            config = config.filesystem(memfs::MemFs::new());
            "memory filesystem"
        },
    };
    if args.fakels {
        config = config.locksystem(fakels::FakeLs::new());
    }
    if args.memls || args.dir.is_none() {
        config = config.locksystem(memls::MemLs::new());
    }
    let dav_server = config.build_handler();

    let addr = SocketAddr::from_str(&format!("0.0.0.0:{}", args.port))?;
    let listener = TcpListener::bind(addr).await?;
    println!("Serving {} on {}", name, args.port);

    loop {
        let (stream, peer) = listener.accept().await?;
        let dav_server = dav_server.clone();
        let reject = args.reject.clone();
        tokio::spawn(async move {
            log::debug!("connection from {}", peer);
            let res = match reject {
                Some(msg) => dav_server.reject(stream, &msg).await,
                None => dav_server.serve(stream).await,
            };
            if let Err(e) = res {
                eprintln!("{}: {}", peer, e);
            }
        });
    }
}
