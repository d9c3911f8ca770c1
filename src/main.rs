use clap::{Arg, Command};
use log::LevelFilter;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::os::unix::net::UnixListener;
use std::path::Path;
use std::process;
use std::thread;

use milter_proto::codec::{MILTER_VERSION, SMFIF_ADDHDRS};
use milter_proto::{
    serve, Action, Callbacks, Header, Mail, MacroStep, MilterError, Modification, OptNeg, Server,
};

fn main() {
    let matches = Command::new("milter-proto")
        .version("0.1.0")
        .about("Transparent milter server that logs every protocol event")
        .arg(
            Arg::new("listen")
                .short('l')
                .long("listen")
                .value_name("ADDR")
                .help("Listen address: unix:/path/to.sock or tcp:host:port")
                .default_value("unix:/var/run/milter-proto.sock"),
        )
        .arg(
            Arg::new("add-header")
                .short('a')
                .long("add-header")
                .value_name("NAME:VALUE")
                .help("Add this header to every message at end-of-body (repeatable)")
                .action(clap::ArgAction::Append),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let mut headers = Vec::new();
    if let Some(values) = matches.get_many::<String>("add-header") {
        for value in values {
            match value.split_once(':') {
                Some((name, val)) => headers.push(Header {
                    name: name.trim().to_string(),
                    value: val.trim().to_string(),
                }),
                None => {
                    eprintln!("invalid --add-header value {value:?}, expected NAME:VALUE");
                    process::exit(1);
                }
            }
        }
    }

    let listen = matches.get_one::<String>("listen").unwrap();
    if let Err(e) = run(listen, headers) {
        log::error!("milter error: {e}");
        process::exit(1);
    }
}

fn run(listen: &str, headers: Vec<Header>) -> anyhow::Result<()> {
    if let Some(path) = listen.strip_prefix("unix:") {
        run_unix(path, headers)
    } else if let Some(addr) = listen.strip_prefix("tcp:") {
        run_tcp(addr, headers)
    } else {
        anyhow::bail!("listen address {listen:?} must start with unix: or tcp:")
    }
}

fn run_unix(path: &str, headers: Vec<Header>) -> anyhow::Result<()> {
    // Remove a stale socket left by a previous run
    if Path::new(path).exists() {
        log::info!("removing existing socket file: {path}");
        std::fs::remove_file(path)?;
    }
    if let Some(parent) = Path::new(path).parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let listener = UnixListener::bind(path)
        .map_err(|e| anyhow::anyhow!("failed to bind to socket {path}: {e}"))?;

    // rw-rw---- so the MTA's group can reach the socket
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o660);
        std::fs::set_permissions(path, perms)?;
    }

    let socket_path = path.to_string();
    ctrlc::set_handler(move || {
        log::info!("received shutdown signal, cleaning up...");
        if let Err(e) = std::fs::remove_file(&socket_path) {
            log::error!("failed to remove socket file: {e}");
        }
        process::exit(0);
    })
    .map_err(|e| anyhow::anyhow!("error setting up signal handler: {e}"))?;

    log::info!("milter listening on unix socket {path}");
    loop {
        match listener.accept() {
            Ok((stream, _addr)) => {
                log::info!("accepted milter connection from mail server");
                spawn_session(stream, headers.clone());
            }
            Err(e) => {
                log::error!("error accepting connection: {e}");
                thread::sleep(std::time::Duration::from_secs(1));
            }
        }
    }
}

fn run_tcp(addr: &str, headers: Vec<Header>) -> anyhow::Result<()> {
    let listener =
        TcpListener::bind(addr).map_err(|e| anyhow::anyhow!("failed to bind to {addr}: {e}"))?;
    log::info!("milter listening on tcp {addr}");
    loop {
        match listener.accept() {
            Ok((stream, peer)) => {
                log::info!("accepted milter connection from {peer}");
                spawn_session(stream, headers.clone());
            }
            Err(e) => {
                log::error!("error accepting connection: {e}");
                thread::sleep(std::time::Duration::from_secs(1));
            }
        }
    }
}

fn spawn_session<S>(stream: S, headers: Vec<Header>)
where
    S: Read + Write + Send + 'static,
{
    thread::spawn(move || {
        let mut milter = DumpMilter { headers };
        serve(stream, &mut milter);
        log::debug!("milter session closed");
    });
}

/// Callback set that logs everything the MTA sends and accepts it all,
/// optionally tagging messages with extra headers at end-of-body.
struct DumpMilter {
    headers: Vec<Header>,
}

impl DumpMilter {
    fn dump_macros<S: Read + Write>(&self, srv: &Server<S>, step: MacroStep) {
        for m in srv.macros.for_step(step) {
            log::info!("  macro {}={:?}", m.name, m.value);
        }
    }
}

impl<S: Read + Write> Callbacks<S> for DumpMilter {
    fn on_optneg(&mut self, _srv: &mut Server<S>, optneg: OptNeg) -> anyhow::Result<OptNeg> {
        log::info!(
            "OPTNEG version={} actions=0x{:08x} protocol=0x{:08x}",
            optneg.version,
            optneg.actions,
            optneg.protocol
        );
        let actions = if self.headers.is_empty() {
            0
        } else {
            SMFIF_ADDHDRS
        };
        Ok(OptNeg {
            version: MILTER_VERSION,
            actions,
            protocol: 0,
        })
    }

    fn on_connect(
        &mut self,
        srv: &mut Server<S>,
        connect: milter_proto::Connect,
    ) -> anyhow::Result<Action> {
        log::info!(
            "CONNECT hostname={:?} port={} address={:?}",
            connect.hostname,
            connect.port,
            connect.address
        );
        self.dump_macros(srv, MacroStep::CONNECT);
        Ok(Action::Continue)
    }

    fn on_helo(&mut self, srv: &mut Server<S>, helo: String) -> anyhow::Result<Action> {
        log::info!("HELO {helo:?}");
        self.dump_macros(srv, MacroStep::HELO);
        Ok(Action::Continue)
    }

    fn on_mail(&mut self, srv: &mut Server<S>, mail: Mail) -> anyhow::Result<Action> {
        log::info!("MAIL from={:?} args={:?}", mail.address, mail.args);
        self.dump_macros(srv, MacroStep::MAIL);
        Ok(Action::Continue)
    }

    fn on_rcpt(&mut self, srv: &mut Server<S>, rcpt: Mail) -> anyhow::Result<Action> {
        log::info!("RCPT to={:?} args={:?}", rcpt.address, rcpt.args);
        self.dump_macros(srv, MacroStep::RCPT);
        Ok(Action::Continue)
    }

    fn on_header(&mut self, _srv: &mut Server<S>, header: Header) -> anyhow::Result<Action> {
        log::info!("HEADER {}: {}", header.name, header.value);
        Ok(Action::Continue)
    }

    fn on_eoh(&mut self, _srv: &mut Server<S>) -> anyhow::Result<Action> {
        log::info!("EOH");
        Ok(Action::Continue)
    }

    fn on_body(&mut self, _srv: &mut Server<S>, chunk: Vec<u8>) -> anyhow::Result<Action> {
        log::info!("BODY chunk of {} bytes", chunk.len());
        Ok(Action::Continue)
    }

    fn on_body_eob(
        &mut self,
        _srv: &mut Server<S>,
    ) -> anyhow::Result<(Vec<Modification>, Action)> {
        log::info!("BODYEOB, adding {} header(s)", self.headers.len());
        let modifications = self
            .headers
            .iter()
            .cloned()
            .map(Modification::AddHeader)
            .collect();
        Ok((modifications, Action::Continue))
    }

    fn on_abort(&mut self, _srv: &mut Server<S>) -> anyhow::Result<()> {
        log::info!("ABORT, message state reset");
        Ok(())
    }

    fn on_quit(&mut self, _srv: &mut Server<S>) -> anyhow::Result<()> {
        log::info!("QUIT");
        Ok(())
    }

    fn on_error(&mut self, _srv: &mut Server<S>, err: MilterError) {
        log::error!("session error: {err}");
    }
}
