//! Shared harness for spinning up a real gateway listener against a
//! loopback port and driving it with plain-text JSON lines, the way a real
//! miner would.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use stratum_gateway::job::BlockTemplate;
use stratum_gateway::listener::{self, ListenerConfig};
use stratum_gateway::policy::MemoryPolicy;
use stratum_gateway::registry::Registry;
use stratum_gateway::sharesink::MemoryShareSink;
use stratum_gateway::worksource::MemoryWorkSource;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

pub struct Gateway {
    pub addr: SocketAddr,
    pub registry: Arc<Registry>,
    pub work_source: Arc<MemoryWorkSource>,
    pub share_sink: Arc<MemoryShareSink>,
}

/// Reserves a loopback port, then spawns `listener::run` bound to it in the
/// background. Reserving first and rebinding is a race in theory; in
/// practice nothing else grabs a just-closed ephemeral port inside a test.
async fn reserve_port() -> u16 {
    let probe = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    probe.local_addr().expect("local addr").port()
}

pub async fn spawn_gateway(difficulty: u64, max_conn: usize) -> Gateway {
    let port = reserve_port().await;
    let addr: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();

    let registry = Arc::new(Registry::new());
    let policy = Arc::new(MemoryPolicy::default());
    let work_source = Arc::new(MemoryWorkSource::new());
    let share_sink = Arc::new(MemoryShareSink::new());

    let config = ListenerConfig {
        listen: addr,
        timeout: Duration::from_secs(30),
        max_conn,
        tls: false,
        cert_file: None,
        key_file: None,
    };

    tokio::spawn(listener::run(
        config,
        registry.clone(),
        policy,
        work_source.clone(),
        share_sink.clone(),
        difficulty,
    ));

    Gateway { addr, registry, work_source, share_sink }
}

pub async fn connect(addr: SocketAddr) -> TcpStream {
    for _ in 0..100 {
        if let Ok(stream) = TcpStream::connect(addr).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("could not connect to gateway at {addr}");
}

pub fn sample_template() -> BlockTemplate {
    BlockTemplate {
        header: "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa".into(),
        seed: "0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb".into(),
        height: "0x64".into(),
        current_difficulty_hex: "0x4".into(),
    }
}

/// A small line-oriented client over a split `TcpStream`.
pub struct Client {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl Client {
    pub fn new(stream: TcpStream) -> Self {
        let (read_half, writer) = stream.into_split();
        Self { reader: BufReader::new(read_half), writer }
    }

    pub async fn send(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.expect("write line");
        self.writer.write_all(b"\n").await.expect("write newline");
        self.writer.flush().await.expect("flush");
    }

    /// Reads one `\n`-terminated line, with a generous timeout so a bug
    /// that drops a push doesn't hang the test suite.
    pub async fn recv(&mut self) -> serde_json::Value {
        let mut line = String::new();
        let read = tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a reply")
            .expect("read line");
        assert!(read > 0, "connection closed before a reply arrived");
        serde_json::from_str(line.trim_end()).expect("reply was valid JSON")
    }

    /// Asserts the connection is closed (EOF) within the timeout.
    pub async fn expect_closed(&mut self) {
        let mut line = String::new();
        let read = tokio::time::timeout(Duration::from_secs(5), self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for close");
        match read {
            Ok(0) => {}
            Ok(_) => panic!("expected connection close, got more data: {line}"),
            Err(e) => panic!("unexpected read error waiting for close: {e}"),
        }
    }
}
