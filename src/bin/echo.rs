use std::{
    collections::HashMap,
    io,
    net::{SocketAddr, UdpSocket},
    sync::{mpsc, Arc},
    thread,
    time::{Duration, Instant},
};

use fraglink::{
    layer::{Builder, CompletionResult, Engine, IHost},
    SendOutcome,
};
use tracing::{debug, info, warn};

const MAX_PACKET_SIZE: usize = 48;
const FLUSH_INTERVAL_MS: u64 = 1;
const STAT_INTERVAL_S: u64 = 1;
const LISTEN_ADDR: &str = "127.0.0.1:0";
/// Every n-th datagram leaving the client is damaged on purpose.
const CORRUPT_EVERY: u64 = 7;
const MESSAGES: usize = 8;
const RUN_LIMIT_S: u64 = 20;

fn main() -> io::Result<()> {
    tracing_subscriber::fmt::init();

    // sockets
    let server_socket = Arc::new(UdpSocket::bind(LISTEN_ADDR)?);
    let client_socket = Arc::new(UdpSocket::bind(LISTEN_ADDR)?);
    let server_addr = server_socket.local_addr()?;
    let client_addr = client_socket.local_addr()?;
    info!(%server_addr, %client_addr, "bound");

    // engines
    let builder = || Builder {
        max_packet_size: MAX_PACKET_SIZE,
        max_queued_packets: 64,
        max_awaiting_packets: 32,
        stream_timeout_ticks: 2000,
        recv_buf_len: MAX_PACKET_SIZE * 4,
        ..Default::default()
    };
    let server = builder().build().map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    let client = builder().build().map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    // channels
    let (server_tx, server_rx) = mpsc::channel();
    let (client_tx, client_rx) = mpsc::channel();
    let (echo_tx, echo_rx) = mpsc::channel();

    // spawn threads
    {
        let host = UdpHost::new(Arc::clone(&server_socket), client_addr, 0);
        thread::spawn(move || peer("server", server, host, server_rx, None));
    }
    {
        let host = UdpHost::new(Arc::clone(&client_socket), server_addr, CORRUPT_EVERY);
        thread::spawn(move || peer("client", client, host, client_rx, Some(echo_tx)));
    }
    {
        let tx = server_tx.clone();
        thread::spawn(move || socket_recving(server_socket, tx));
        let tx = client_tx.clone();
        thread::spawn(move || socket_recving(client_socket, tx));
    }
    {
        let txs = vec![server_tx.clone(), client_tx.clone()];
        thread::spawn(move || timer(txs));
    }

    let messages: Vec<Vec<u8>> = (0..MESSAGES)
        .map(|i| {
            let len = 5 + i * 23;
            (0..len).map(|x| (x + i) as u8).collect()
        })
        .collect();
    for message in &messages {
        if client_tx.send(Messaging::ToSend(message.clone())).is_err() {
            break;
        }
    }

    let start = Instant::now();
    let mut echoed = 0;
    while echoed < messages.len() {
        let remaining = Duration::from_secs(RUN_LIMIT_S).saturating_sub(start.elapsed());
        match echo_rx.recv_timeout(remaining) {
            Ok(echo) => {
                let matched = messages.iter().any(|m| *m == echo);
                info!(len = echo.len(), matched, "echo received");
                echoed += 1;
            }
            Err(_) => {
                warn!(echoed, expected = messages.len(), "gave up waiting for echoes");
                break;
            }
        }
    }
    let _ = client_tx.send(Messaging::PrintStat);
    let _ = server_tx.send(Messaging::PrintStat);
    thread::sleep(Duration::from_millis(100));
    Ok(())
}

struct UdpHost {
    socket: Arc<UdpSocket>,
    peer_addr: SocketAddr,
    datagrams: u64,
    corrupt_every: u64,
    partial: HashMap<u32, Vec<u8>>,
    inbox: Vec<Vec<u8>>,
}

impl UdpHost {
    fn new(socket: Arc<UdpSocket>, peer_addr: SocketAddr, corrupt_every: u64) -> Self {
        UdpHost {
            socket,
            peer_addr,
            datagrams: 0,
            corrupt_every,
            partial: HashMap::new(),
            inbox: Vec::new(),
        }
    }
}

impl IHost for UdpHost {
    fn transmit(&mut self, frame: &[u8]) -> bool {
        self.datagrams += 1;
        let sent = if self.corrupt_every != 0 && self.datagrams % self.corrupt_every == 0 {
            let mut damaged = frame.to_vec();
            let last = damaged.len() - 1;
            damaged[last] ^= 0x5a;
            debug!(len = frame.len(), "corrupting datagram");
            self.socket.send_to(&damaged, self.peer_addr)
        } else {
            self.socket.send_to(frame, self.peer_addr)
        };
        sent.is_ok()
    }

    fn on_data(&mut self, stream_id: u32, frag_index: u16, total_frags: u16, payload: &[u8]) -> bool {
        if stream_id == 0 {
            self.inbox.push(payload.to_vec());
            return true;
        }
        let message = self.partial.entry(stream_id).or_default();
        message.extend_from_slice(payload);
        if frag_index + 1 == total_frags {
            if let Some(message) = self.partial.remove(&stream_id) {
                self.inbox.push(message);
            }
        }
        true
    }

    fn on_complete(&mut self, stream_id: u32, result: CompletionResult) {
        debug!(stream_id, ?result, "complete");
        if result != CompletionResult::Success {
            self.partial.remove(&stream_id);
        }
    }
}

fn peer(
    name: &'static str,
    mut engine: Engine,
    mut host: UdpHost,
    messaging: mpsc::Receiver<Messaging>,
    echoes: Option<mpsc::Sender<Vec<u8>>>,
) {
    let mut old_stat = None;
    while let Ok(msg) = messaging.recv() {
        match msg {
            Messaging::ConnRecv(bytes) => {
                engine.data_received(&bytes, &mut host);
                for message in host.inbox.drain(..) {
                    match &echoes {
                        Some(echoes) => {
                            let _ = echoes.send(message);
                        }
                        None => {
                            let result = engine.send(&message);
                            if result.outcome != SendOutcome::Success {
                                warn!(name, ?result, "echo not queued");
                            }
                        }
                    }
                }
            }
            Messaging::Flush => engine.process(&mut host),
            Messaging::ToSend(message) => {
                let result = engine.send(&message);
                info!(name, len = message.len(), ?result, "sending");
            }
            Messaging::PrintStat => {
                let stat = engine.stat();
                if old_stat.as_ref() != Some(&stat) {
                    info!(name, ?stat, "stat");
                }
                old_stat = Some(stat);
            }
        }
    }
}

fn timer(txs: Vec<mpsc::Sender<Messaging>>) {
    let stat_every = STAT_INTERVAL_S * 1000 / FLUSH_INTERVAL_MS;
    let mut ticks = 0;
    loop {
        thread::sleep(Duration::from_millis(FLUSH_INTERVAL_MS));
        ticks += 1;
        for tx in &txs {
            if tx.send(Messaging::Flush).is_err() {
                return;
            }
            if ticks % stat_every == 0 && tx.send(Messaging::PrintStat).is_err() {
                return;
            }
        }
    }
}

fn socket_recving(socket: Arc<UdpSocket>, messaging: mpsc::Sender<Messaging>) {
    let mut buf = vec![0; MAX_PACKET_SIZE * 2];
    loop {
        let len = match socket.recv_from(&mut buf) {
            Ok((len, _)) => len,
            Err(e) => {
                warn!(?e, "recv failed");
                return;
            }
        };
        if messaging.send(Messaging::ConnRecv(buf[..len].to_vec())).is_err() {
            return;
        }
    }
}

enum Messaging {
    ConnRecv(Vec<u8>),
    Flush,
    ToSend(Vec<u8>),
    PrintStat,
}
