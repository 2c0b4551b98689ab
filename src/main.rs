//! A SOCKS5 proxy server implemented in Rust
//!
//! ferryd is a SOCKS5 proxy built on ferry crate.
//!
use std::io;
use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use log::*;

use ferry as fr;

#[derive(Parser, Debug)]
#[command(name = "ferryd", version, about)]
struct Opt {
    /// Set port to listen on
    #[arg(short = 'p', long = "port", default_value = "1080")]
    port: u16,

    /// Set ipaddress to listen on
    #[arg(short = 'i', long = "ip", default_value = "0.0.0.0")]
    ipaddr: IpAddr,

    /// Set path to config file (format: yaml)
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,
}

fn set_handler(signals: &[i32], handler: impl Fn(i32) + Send + 'static) -> io::Result<()> {
    let mut signals = signal_hook::iterator::Signals::new(signals)?;
    std::thread::spawn(move || signals.forever().for_each(handler));
    Ok(())
}

fn main() {
    use signal_hook::consts::signal::*;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opt = Opt::parse();
    debug!("option: {:?}", opt);

    let config = match opt.config {
        Some(ref path) => fr::ServerConfig::with_file(opt.ipaddr, opt.port, path),
        None => Ok(fr::ServerConfig::new(opt.ipaddr, opt.port)),
    }
    .expect("server config");
    info!("config: {:?}", config);

    let (mut server, tx) = fr::Server::new(config);
    set_handler(&[SIGTERM, SIGINT, SIGQUIT], move |sig| {
        debug!("signal: {}", sig);
        tx.send(fr::ServerCommand::Terminate).ok();
    })
    .expect("setting signal handler");

    if let Err(err) = server.serve() {
        error!("server error: {}", err);
        std::process::exit(1);
    }
}
