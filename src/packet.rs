use std::net::{SocketAddr, IpAddr};
use std::hash::{Hash, Hasher};
use std::cmp::{PartialEq, Eq};
use std::io::Cursor;

use byteorder::{NetworkEndian, ReadBytesExt};
use eyre::{bail, eyre, Result};
use pcap::Linktype;
use smoltcp::wire::{
  EthernetFrame, EthernetProtocol,
  IpProtocol,
  Ipv4Packet,
  Ipv6Packet,
  TcpPacket,
};

const SLL_HEADER_LEN: usize = 16;
const SLL2_HEADER_LEN: usize = 20;

#[derive(Debug, Clone)]
pub struct Connection {
  client: SocketAddr,
  server: SocketAddr,
  is_sent: bool,
}

impl Connection {
  pub fn client(&self) -> SocketAddr {
    self.client
  }

  pub fn server(&self) -> SocketAddr {
    self.server
  }

  /// Whether the packet went from the client to the server.
  pub fn is_sent(&self) -> bool {
    self.is_sent
  }
}

impl Hash for Connection {
  fn hash<H>(&self, state: &mut H) where H: Hasher {
    self.client.hash(state);
    self.server.hash(state);
  }
}

impl PartialEq for Connection {
  fn eq(&self, other: &Self) -> bool {
    self.client == other.client
      && self.server == other.server
  }
}

impl Eq for Connection {}

pub fn check_linktype(linktype: Linktype) -> Result<()> {
  match linktype {
    Linktype::ETHERNET | Linktype::LINUX_SLL | Linktype::LINUX_SLL2 | Linktype::RAW => Ok(()),
    _ => bail!("unsupported datalink type: {:?}", linktype),
  }
}

/// Find the TCP segment in a captured frame. `Ok(None)` for anything that
/// is not TCP over IPv4/IPv6.
pub fn tcp_from_packet(
  packet: &[u8],
  linktype: Linktype,
  server_port: u16,
) -> Result<Option<(Connection, TcpPacket<&[u8]>)>> {
  let (payload, ethertype) = match linktype {
    Linktype::ETHERNET => {
      let ether = EthernetFrame::new_checked(packet)
        .map_err(|e| eyre!("bad ethernet frame: {}", e))?;
      (ether.payload(), ether.ethertype())
    }
    Linktype::LINUX_SLL => {
      cooked(packet, SLL_HEADER_LEN, SLL_HEADER_LEN - 2)?
    }
    Linktype::LINUX_SLL2 => {
      cooked(packet, SLL2_HEADER_LEN, 0)?
    }
    Linktype::RAW => {
      let ethertype = match packet.first().map(|b| b >> 4) {
        Some(4) => EthernetProtocol::Ipv4,
        Some(6) => EthernetProtocol::Ipv6,
        _ => return Ok(None),
      };
      (packet, ethertype)
    }
    _ => bail!("unsupported datalink type: {:?}", linktype),
  };
  ip_to_tcp(payload, ethertype, server_port)
}

/// Linux cooked capture: protocol type at `proto_at`, IP after `header_len`.
fn cooked(packet: &[u8], header_len: usize, proto_at: usize) -> Result<(&[u8], EthernetProtocol)> {
  if packet.len() < header_len {
    bail!("short cooked header: {} bytes", packet.len());
  }
  let proto = Cursor::new(&packet[proto_at..]).read_u16::<NetworkEndian>()?;
  Ok((&packet[header_len..], proto.into()))
}

fn ip_to_tcp(
  packet: &[u8],
  ethertype: EthernetProtocol,
  server_port: u16,
) -> Result<Option<(Connection, TcpPacket<&[u8]>)>> {
  let (src, dst, payload) = match ethertype {
    EthernetProtocol::Ipv4 => {
      let ip = Ipv4Packet::new_checked(packet)
        .map_err(|e| eyre!("bad ipv4 packet: {}", e))?;
      if ip.next_header() != IpProtocol::Tcp {
        return Ok(None);
      }
      let src = IpAddr::V4(ip.src_addr().into());
      let dst = IpAddr::V4(ip.dst_addr().into());
      (src, dst, ip.payload())
    },
    EthernetProtocol::Ipv6 => {
      let ip = Ipv6Packet::new_checked(packet)
        .map_err(|e| eyre!("bad ipv6 packet: {}", e))?;
      if ip.next_header() != IpProtocol::Tcp {
        return Ok(None);
      }
      let src = IpAddr::V6(ip.src_addr().into());
      let dst = IpAddr::V6(ip.dst_addr().into());
      (src, dst, ip.payload())
    },
    _ => return Ok(None),
  };
  let tcp = TcpPacket::new_checked(payload)
    .map_err(|e| eyre!("bad tcp segment: {}", e))?;
  let src = SocketAddr::new(src, tcp.src_port());
  let dst = SocketAddr::new(dst, tcp.dst_port());
  let conn = if tcp.dst_port() == server_port {
    Connection {
      client: src,
      server: dst,
      is_sent: true,
    }
  } else {
    Connection {
      client: dst,
      server: src,
      is_sent: false,
    }
  };
  Ok(Some((conn, tcp)))
}
