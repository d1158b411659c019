//! Test-only helpers for constructing a [`Session`] backed by a real
//! loopback socket, since [`Transport`] only wraps `TcpStream`/`TlsStream`.

use tokio::net::{TcpListener, TcpStream};
use uuid::Uuid;

use crate::session::Session;
use crate::transport::Transport;

/// Binds a loopback listener, connects to it, and returns a [`Session`]
/// wired to the server half plus the client half for assertions.
pub async fn loopback_session(extranonce: &str) -> (Session, TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback listener");
    let addr = listener.local_addr().expect("local addr");
    let client = TcpStream::connect(addr).await.expect("connect loopback client");
    let (server, _) = listener.accept().await.expect("accept loopback connection");

    let transport = Transport::Plain(server);
    let (_read, write) = tokio::io::split(transport);
    let session = Session::new(Uuid::new_v4(), "127.0.0.1".into(), extranonce.to_string(), write);
    (session, client)
}
