use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use codec_msgpack::MsgpackConfig;
use rmpv::Value;
use sink_pipeline::{Endpoint, PipelineError, SinkOutcome, spawn_record_sink};
use tokio_util::sync::CancellationToken;
use transport_tcp_server::{TcpServerConfig, TcpServerTransport};

/// Общий буфер вывода: тест читает его, пока sink пишет.
#[derive(Clone, Default)]
struct SharedOut(Arc<Mutex<Vec<u8>>>);

impl SharedOut {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    fn line_count(&self) -> usize {
        self.text().lines().count()
    }
}

impl Write for SharedOut {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn started_endpoint(token: &CancellationToken) -> (Endpoint, SocketAddr) {
    let tcp = TcpServerConfig { host: "127.0.0.1".into(), port: 0, poll_interval_ms: 10 };
    let codec = MsgpackConfig::default();
    let mut endpoint = Endpoint::new(
        "test",
        Box::new(TcpServerTransport::new(&tcp, token.clone())),
        Arc::new(codec.framing()),
        Arc::new(codec.codec()),
    );
    endpoint.start().unwrap();
    let addr = endpoint.local_addr().unwrap();
    (endpoint, addr)
}

fn record(tag: &str, time: i64, payload: Value) -> Vec<u8> {
    let mut buf = Vec::new();
    let v = Value::Array(vec![Value::from(tag), Value::from(time), payload]);
    rmpv::encode::write_value(&mut buf, &v).unwrap();
    buf
}

async fn wait_for_lines(out: &SharedOut, n: usize) {
    for _ in 0..500 {
        if out.line_count() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {n} lines, got: {:?}", out.text());
}

#[tokio::test]
async fn prints_every_message_until_peer_closes() {
    let token = CancellationToken::new();
    let (endpoint, addr) = started_endpoint(&token);
    let out = SharedOut::default();
    let handle = spawn_record_sink(endpoint, out.clone(), token);

    std::thread::spawn(move || {
        let mut s = TcpStream::connect(addr).unwrap();
        s.write_all(&record("tag.a", 1000, Value::Map(vec![(Value::from("x"), Value::from(1))])))
            .unwrap();
        s.write_all(&record("tag.a", 1001, Value::from("hello"))).unwrap();
        s.write_all(&record(
            "tag.b",
            1002,
            Value::Array(vec![Value::from(1), Value::from(2), Value::from(3)]),
        ))
        .unwrap();
    })
    .join()
    .unwrap();

    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome, SinkOutcome::Closed { messages: 3 });
    assert_eq!(
        out.text(),
        "tag.a 1000 {\"x\"=>1}\ntag.a 1001 hello\ntag.b 1002 [1, 2, 3]\n"
    );
}

#[tokio::test]
async fn malformed_bytes_are_fatal_after_printing_valid_ones() {
    let token = CancellationToken::new();
    let (endpoint, addr) = started_endpoint(&token);
    let out = SharedOut::default();
    let handle = spawn_record_sink(endpoint, out.clone(), token);

    std::thread::spawn(move || {
        let mut s = TcpStream::connect(addr).unwrap();
        s.write_all(&record("good", 1, Value::Nil)).unwrap();
        s.write_all(&record("good", 2, Value::Nil)).unwrap();
        s.write_all(&[0xc1, 0x00, 0x00]).unwrap();
    })
    .join()
    .unwrap();

    let err = handle.await.unwrap().unwrap_err();
    match err {
        PipelineError::Decode { index, source, .. } => {
            assert_eq!(index, 3);
            let offset = 2 * record("good", 1, Value::Nil).len();
            assert!(source.message().starts_with(&format!("frame at byte {offset}: reserved marker")));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(out.line_count(), 2);
}

#[tokio::test]
async fn interrupt_mid_stream_keeps_printed_lines() {
    let token = CancellationToken::new();
    let (endpoint, addr) = started_endpoint(&token);
    let out = SharedOut::default();
    let handle = spawn_record_sink(endpoint, out.clone(), token.clone());

    // клиент держит соединение открытым
    let mut client = TcpStream::connect(addr).unwrap();
    client.write_all(&record("first", 1, Value::from("x"))).unwrap();

    wait_for_lines(&out, 1).await;
    token.cancel();

    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome, SinkOutcome::Interrupted { messages: 1 });
    assert_eq!(out.text(), "first 1 x\n");
    drop(client);
}

#[tokio::test]
async fn interrupt_while_waiting_for_client() {
    let token = CancellationToken::new();
    let (endpoint, _addr) = started_endpoint(&token);
    let handle = spawn_record_sink(endpoint, SharedOut::default(), token.clone());

    tokio::time::sleep(Duration::from_millis(30)).await;
    token.cancel();

    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome, SinkOutcome::Interrupted { messages: 0 });
}

#[tokio::test]
async fn second_client_is_not_accepted() {
    let token = CancellationToken::new();
    let (endpoint, addr) = started_endpoint(&token);
    let out = SharedOut::default();
    let handle = spawn_record_sink(endpoint, out.clone(), token.clone());

    let mut first = TcpStream::connect(addr).unwrap();
    first.write_all(&record("first", 1, Value::Nil)).unwrap();
    wait_for_lines(&out, 1).await;

    // listener уже закрыт
    assert!(TcpStream::connect(addr).is_err());

    drop(first);
    let outcome = handle.await.unwrap().unwrap();
    assert_eq!(outcome.messages(), 1);
}
