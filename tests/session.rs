//! Full client/server sessions over loopback TCP, one thread per side.

use std::net::{TcpListener, TcpStream};
use std::thread;

use milter_proto::codec::{
    MILTER_VERSION, SMFIF_ADDHDRS, SMFIF_ADDRCPT, SMFIF_CHGHDRS, SMFIP_NOHDRS, SMFIP_NOHELO,
};
use milter_proto::{
    serve, Action, Callbacks, ChgHeader, Client, Connect, Family, Header, Mail, MacroStep,
    Modification, OptNeg, ReplyCode, Server,
};

fn connected_pair() -> (TcpStream, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let client = TcpStream::connect(addr).unwrap();
    let (server, _) = listener.accept().unwrap();
    (client, server)
}

/// Filter used for the full-session test: checks what arrives, tags the
/// message at end-of-body, and interleaves keep-alives in the burst.
struct TaggingFilter {
    connect_daemon_name: Option<String>,
    mail_queue_id: Option<String>,
    headers_seen: Vec<(String, String)>,
    body_bytes: usize,
}

impl Callbacks<TcpStream> for TaggingFilter {
    fn on_optneg(
        &mut self,
        _srv: &mut Server<TcpStream>,
        optneg: OptNeg,
    ) -> anyhow::Result<OptNeg> {
        assert_eq!(optneg.version, MILTER_VERSION);
        Ok(OptNeg {
            version: MILTER_VERSION,
            actions: SMFIF_ADDHDRS | SMFIF_CHGHDRS,
            protocol: 0,
        })
    }

    fn on_connect(
        &mut self,
        srv: &mut Server<TcpStream>,
        connect: Connect,
    ) -> anyhow::Result<Action> {
        assert_eq!(connect.family, Family::Inet);
        assert_eq!(connect.port, 25);
        self.connect_daemon_name = srv
            .macro_get("{daemon_name}")
            .map(|(_, value)| value.to_string());
        Ok(Action::Continue)
    }

    fn on_mail(&mut self, srv: &mut Server<TcpStream>, mail: Mail) -> anyhow::Result<Action> {
        assert_eq!(mail.address, "sender@example.com");
        assert_eq!(mail.args, ["SIZE=10"]);
        self.mail_queue_id = srv.macro_get("i").map(|(_, value)| value.to_string());
        Ok(Action::Continue)
    }

    fn on_header(
        &mut self,
        _srv: &mut Server<TcpStream>,
        header: Header,
    ) -> anyhow::Result<Action> {
        self.headers_seen.push((header.name, header.value));
        Ok(Action::Continue)
    }

    fn on_body(&mut self, _srv: &mut Server<TcpStream>, chunk: Vec<u8>) -> anyhow::Result<Action> {
        self.body_bytes += chunk.len();
        Ok(Action::Continue)
    }

    fn on_body_eob(
        &mut self,
        srv: &mut Server<TcpStream>,
    ) -> anyhow::Result<(Vec<Modification>, Action)> {
        // keep-alive before the burst; the client must never see it
        srv.send_progress()?;
        Ok((
            vec![
                Modification::AddHeader(Header {
                    name: "X-Scan".to_string(),
                    value: "ok".to_string(),
                }),
                Modification::ChgHeader(ChgHeader {
                    index: 1,
                    name: "Subject".to_string(),
                    value: "[ok] hi".to_string(),
                }),
            ],
            Action::Continue,
        ))
    }
}

#[test]
fn full_session_with_macros_and_modification_burst() {
    let (client_stream, server_stream) = connected_pair();

    let server = thread::spawn(move || {
        let mut filter = TaggingFilter {
            connect_daemon_name: None,
            mail_queue_id: None,
            headers_seen: Vec::new(),
            body_bytes: 0,
        };
        serve(server_stream, &mut filter);
        filter
    });

    let mut client = Client::new(client_stream);
    client.macro_add_canonical("{daemon_name}", "smtpd");
    client.macro_add(MacroStep::MAIL, "i", "A1B2C3");

    let offer = OptNeg {
        version: MILTER_VERSION,
        actions: SMFIF_ADDRCPT | SMFIF_CHGHDRS,
        protocol: SMFIP_NOHELO | SMFIP_NOHDRS,
    };
    let reply = client.exchange_optneg(&offer).unwrap();
    assert_eq!(reply.version, MILTER_VERSION);
    assert_eq!(reply.actions, SMFIF_ADDHDRS | SMFIF_CHGHDRS);

    let action = client
        .exchange_connect(&Connect {
            hostname: "mx.example.com".to_string(),
            family: Family::Inet,
            port: 25,
            address: "192.0.2.7".to_string(),
        })
        .unwrap();
    assert_eq!(action, Action::Continue);

    let action = client
        .exchange_mail(&Mail {
            address: "sender@example.com".to_string(),
            args: vec!["SIZE=10".to_string()],
        })
        .unwrap();
    assert_eq!(action, Action::Continue);

    let action = client
        .exchange_header(&Header {
            name: "Subject".to_string(),
            value: "hi".to_string(),
        })
        .unwrap();
    assert_eq!(action, Action::Continue);

    let action = client.exchange_body(b"Hello,\r\nworld\r\n").unwrap();
    assert_eq!(action, Action::Continue);

    let (modifications, action) = client.exchange_body_eob().unwrap();
    assert_eq!(action, Action::Continue);
    assert_eq!(modifications.len(), 2);
    assert_eq!(
        modifications[0],
        Modification::AddHeader(Header {
            name: "X-Scan".to_string(),
            value: "ok".to_string(),
        })
    );
    assert_eq!(
        modifications[1],
        Modification::ChgHeader(ChgHeader {
            index: 1,
            name: "Subject".to_string(),
            value: "[ok] hi".to_string(),
        })
    );

    client.send_quit().unwrap();

    let filter = server.join().unwrap();
    assert_eq!(filter.connect_daemon_name.as_deref(), Some("smtpd"));
    assert_eq!(filter.mail_queue_id.as_deref(), Some("A1B2C3"));
    assert_eq!(
        filter.headers_seen,
        [("Subject".to_string(), "hi".to_string())]
    );
    assert_eq!(filter.body_bytes, 15);
}

struct RejectingFilter;

impl Callbacks<TcpStream> for RejectingFilter {
    fn on_rcpt(&mut self, _srv: &mut Server<TcpStream>, rcpt: Mail) -> anyhow::Result<Action> {
        if rcpt.address.ends_with("@blocked.example") {
            return Ok(Action::ReplyCode(ReplyCode {
                code: 451,
                reason: "slow down".to_string(),
            }));
        }
        Ok(Action::Continue)
    }
}

#[test]
fn per_recipient_verdicts() {
    let (client_stream, server_stream) = connected_pair();

    let server = thread::spawn(move || {
        serve(server_stream, &mut RejectingFilter);
    });

    let mut client = Client::new(client_stream);
    client.exchange_optneg(&OptNeg::default()).unwrap();

    let action = client
        .exchange_rcpt(&Mail {
            address: "ok@example.com".to_string(),
            args: Vec::new(),
        })
        .unwrap();
    assert_eq!(action, Action::Continue);

    let action = client
        .exchange_rcpt(&Mail {
            address: "spamtrap@blocked.example".to_string(),
            args: Vec::new(),
        })
        .unwrap();
    assert_eq!(
        action,
        Action::ReplyCode(ReplyCode {
            code: 451,
            reason: "slow down".to_string(),
        })
    );

    client.send_quit().unwrap();
    server.join().unwrap();
}

#[test]
fn abort_resets_without_closing() {
    struct CountingFilter {
        mails: usize,
        aborts: usize,
    }
    impl Callbacks<TcpStream> for CountingFilter {
        fn on_mail(
            &mut self,
            _srv: &mut Server<TcpStream>,
            _mail: Mail,
        ) -> anyhow::Result<Action> {
            self.mails += 1;
            Ok(Action::Continue)
        }
        fn on_abort(&mut self, _srv: &mut Server<TcpStream>) -> anyhow::Result<()> {
            self.aborts += 1;
            Ok(())
        }
    }

    let (client_stream, server_stream) = connected_pair();
    let server = thread::spawn(move || {
        let mut filter = CountingFilter {
            mails: 0,
            aborts: 0,
        };
        serve(server_stream, &mut filter);
        filter
    });

    let mut client = Client::new(client_stream);
    client.exchange_optneg(&OptNeg::default()).unwrap();

    let mail = Mail {
        address: "a@b.c".to_string(),
        args: Vec::new(),
    };
    client.exchange_mail(&mail).unwrap();
    client.send_abort().unwrap();
    // session survives the abort, a fresh envelope follows
    client.exchange_mail(&mail).unwrap();
    client.send_quit().unwrap();

    let filter = server.join().unwrap();
    assert_eq!(filter.mails, 2);
    assert_eq!(filter.aborts, 1);
}
