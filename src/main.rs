use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;

use eyre::Result;
use clap::Parser;
use tracing::{debug, info, warn};

use tls_sni::feedback::DecodeFeedback;
use tls_sni::flow::{Classification, Flow, Summary};
use tls_sni::handshake::SniOutcome;
use tls_sni::packet::{self, Connection};

#[derive(Parser)]
#[command(author, version, about, long_about = "show the TLS server names (SNI) clients ask for")]
struct Args {
  #[arg(help = "device", default_value = "any")]
  device: String,
  #[arg(short, long, value_name = "FILE", help = "read packets from a pcap file instead")]
  read: Option<PathBuf>,
  #[arg(short, long, default_value_t = 443, help = "TLS server port")]
  port: u16,
  #[arg(short, long, help = "BPF filter [default: tcp port <PORT>]")]
  filter: Option<String>,
  #[arg(long, help = "print per-host totals when the capture ends")]
  summary: bool,
}

#[derive(Default)]
struct MalformedCount(usize);

impl DecodeFeedback for MalformedCount {
  fn set_truncated(&mut self) {
    self.0 += 1;
  }
}

struct Processor {
  linktype: pcap::Linktype,
  port: u16,
  connections: HashMap<Connection, Flow>,
  summary: Summary,
  malformed: MalformedCount,
}

impl Processor {
  fn new(linktype: pcap::Linktype, port: u16) -> Self {
    Self {
      linktype,
      port,
      connections: HashMap::new(),
      summary: Summary::default(),
      malformed: MalformedCount::default(),
    }
  }

  fn process(&mut self, packet: &[u8]) -> Result<()> {
    let (conn, tcp) = match packet::tcp_from_packet(packet, self.linktype, self.port) {
      Ok(Some(r)) => r,
      Ok(None) => return Ok(()),
      Err(e) => {
        debug!("skipping packet: {}", e);
        return Ok(());
      }
    };
    let data = tcp.payload();
    debug!(
      ?conn, "data len={}{}{}{}", data.len(),
      if tcp.syn() { " SYN" } else { "" },
      if tcp.fin() { " FIN" } else { "" },
      if tcp.rst() { " RST" } else { "" },
    );
    // only the client's first payload opens a flow
    if !self.connections.contains_key(&conn) && (!conn.is_sent() || data.is_empty()) {
      return Ok(());
    }

    let flow = self.connections.entry(conn.clone()).or_default();
    if flow.incr(data, conn.is_sent(), tcp.fin() || tcp.rst(), &mut self.malformed) {
      report(&conn, flow)?;
    }
    if flow.is_last() {
      if let Some(flow) = self.connections.remove(&conn) {
        self.summary.add(&flow);
      }
    }
    Ok(())
  }

  fn finish(mut self, print_summary: bool) -> Result<()> {
    for (_, flow) in self.connections.drain() {
      self.summary.add(&flow);
    }
    if self.malformed.0 > 0 {
      warn!(count = self.malformed.0, "truncated or malformed ClientHello messages");
    }
    if !print_summary || self.summary.is_empty() {
      return Ok(());
    }

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{:40} {:>6} {:>12} {:>12}", "HOST", "CONNS", "SENT", "RECEIVED")?;
    for (host, stat) in self.summary.sorted() {
      let host = if host.is_empty() { "-" } else { host };
      writeln!(stdout, "{:40} {:>6} {:>12} {:>12}", host, stat.connections, stat.sent, stat.received)?;
    }
    Ok(())
  }
}

fn report(conn: &Connection, flow: &Flow) -> io::Result<()> {
  let outcome = match flow.classification() {
    Classification::Tls(outcome) => outcome,
    Classification::NotTls => {
      debug!(?conn, "not TLS");
      return Ok(());
    }
    Classification::Pending => return Ok(()),
  };
  if let SniOutcome::Malformed(e) = outcome {
    warn!(?conn, error = %e, "malformed ClientHello");
  }
  let hostname = outcome.server_name().unwrap_or("-");
  info!(%hostname, "new TLS");
  writeln!(io::stdout(), "{} -> {} {}", conn.client(), conn.server(), hostname)
}

fn run<T: pcap::Activated + ?Sized>(cap: &mut pcap::Capture<T>, args: &Args) -> Result<()> {
  let linktype = cap.get_datalink();
  packet::check_linktype(linktype)?;
  let mut processor = Processor::new(linktype, args.port);
  loop {
    match cap.next_packet() {
      Ok(packet) => processor.process(packet.data)?,
      Err(pcap::Error::TimeoutExpired) => { },
      Err(pcap::Error::NoMorePackets) => break,
      Err(e) => return Err(e.into()),
    }
  }
  processor.finish(args.summary)
}

fn main() -> Result<()> {
  let args = Args::parse();

  use tracing_subscriber::EnvFilter;
  use std::io::IsTerminal;

  // default RUST_LOG=warn
  let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::from("warn"));
  let isatty = std::io::stderr().is_terminal();
  let fmt = tracing_subscriber::fmt::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(filter)
    .with_ansi(isatty);
  if isatty {
    fmt.init();
  } else {
    fmt.without_time().init();
  }

  let bpf = args.filter.clone()
    .unwrap_or_else(|| format!("tcp port {}", args.port));

  if let Some(path) = &args.read {
    let mut cap = pcap::Capture::from_file(path)?;
    cap.filter(&bpf, true)?;
    run(&mut cap, &args)
  } else {
    let mut cap = pcap::Capture::from_device(args.device.as_str())?
      .immediate_mode(true).open()?;
    cap.filter(&bpf, true)?;
    if args.device == "any" {
      cap.set_datalink(pcap::Linktype::LINUX_SLL2)?;
    }
    run(&mut cap, &args)
  }
}
