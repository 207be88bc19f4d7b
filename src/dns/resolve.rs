// Live DNS checks over the wire. Queries go to the zone-hosting server
// directly so answers reflect what the DC itself is serving.

use crate::debug::debug_log;
use std::io::{Read, Write};
use std::net::{Ipv4Addr, TcpStream, ToSocketAddrs, UdpSocket};
use std::time::Duration;

pub const QTYPE_A: u16 = 1;
pub const QTYPE_PTR: u16 = 12;

const FLAG_TRUNCATED: u16 = 0x0200;
const RCODE_NXDOMAIN: u16 = 3;
const MAX_POINTER_HOPS: usize = 16;
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);

struct DnsHeader {
    id: u16,
    flags: u16,
    qdcount: u16,
    ancount: u16,
    nscount: u16,
    arcount: u16,
}

impl DnsHeader {
    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&self.id.to_be_bytes());
        bytes.extend_from_slice(&self.flags.to_be_bytes());
        bytes.extend_from_slice(&self.qdcount.to_be_bytes());
        bytes.extend_from_slice(&self.ancount.to_be_bytes());
        bytes.extend_from_slice(&self.nscount.to_be_bytes());
        bytes.extend_from_slice(&self.arcount.to_be_bytes());
        bytes
    }
}

fn encode_dns_name(name: &str) -> Vec<u8> {
    let mut encoded = Vec::new();

    for label in name.split('.') {
        if label.is_empty() {
            continue;
        }
        encoded.push(label.len() as u8);
        encoded.extend_from_slice(label.as_bytes());
    }

    encoded.push(0);
    encoded
}

fn build_query(name: &str, qtype: u16) -> Vec<u8> {
    let mut packet = Vec::new();

    let header = DnsHeader {
        id: rand::random::<u16>(),
        flags: 0x0100,
        qdcount: 1,
        ancount: 0,
        nscount: 0,
        arcount: 0,
    };
    packet.extend_from_slice(&header.to_bytes());

    packet.extend_from_slice(&encode_dns_name(name));
    packet.extend_from_slice(&qtype.to_be_bytes());
    packet.extend_from_slice(&1u16.to_be_bytes());

    packet
}

/// Read a possibly-compressed name starting at `start`. Returns the name
/// and the offset just past it in the outer record, not the pointer
/// target.
fn decode_name(packet: &[u8], start: usize) -> Result<(String, usize), Box<dyn std::error::Error>> {
    let mut labels: Vec<String> = Vec::new();
    let mut pos = start;
    let mut resume = None;
    let mut hops = 0;

    loop {
        if pos >= packet.len() {
            return Err("DNS name runs past end of packet".into());
        }
        let len = packet[pos] as usize;

        if len == 0 {
            pos += 1;
            break;
        }

        if len & 0xC0 == 0xC0 {
            if pos + 1 >= packet.len() {
                return Err("Truncated compression pointer".into());
            }
            hops += 1;
            if hops > MAX_POINTER_HOPS {
                return Err("Too many DNS compression pointers".into());
            }
            let target = ((len & 0x3F) << 8) | packet[pos + 1] as usize;
            if resume.is_none() {
                resume = Some(pos + 2);
            }
            pos = target;
            continue;
        }

        if len & 0xC0 != 0 {
            return Err("Reserved DNS label type".into());
        }
        if pos + 1 + len > packet.len() {
            return Err("DNS label runs past end of packet".into());
        }
        labels.push(String::from_utf8_lossy(&packet[pos + 1..pos + 1 + len]).into_owned());
        pos += 1 + len;
    }

    Ok((labels.join("."), resume.unwrap_or(pos)))
}

/// Extract the RDATA of every answer matching `qtype`. NXDOMAIN is a
/// clean empty answer, not a failure.
fn parse_answers(response: &[u8], qtype: u16) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    if response.len() < 12 {
        return Err("Invalid DNS response: too short".into());
    }

    let flags = u16::from_be_bytes([response[2], response[3]]);
    let rcode = flags & 0x000F;

    if rcode == RCODE_NXDOMAIN {
        return Ok(Vec::new());
    }
    if rcode != 0 {
        let error_msg = match rcode {
            1 => "Format error",
            2 => "Server failure",
            4 => "Not implemented",
            5 => "Refused",
            _ => "Unknown error",
        };
        return Err(format!("DNS query failed: {} (rcode={})", error_msg, rcode).into());
    }

    let qdcount = u16::from_be_bytes([response[4], response[5]]);
    let ancount = u16::from_be_bytes([response[6], response[7]]);

    let mut offset = 12;
    for _ in 0..qdcount {
        let (_, next) = decode_name(response, offset)?;
        offset = next + 4;
    }

    let mut answers = Vec::new();
    for _ in 0..ancount {
        let (_, next) = decode_name(response, offset)?;
        offset = next;

        if offset + 10 > response.len() {
            return Err("Truncated answer record".into());
        }
        let record_type = u16::from_be_bytes([response[offset], response[offset + 1]]);
        let rdlength = u16::from_be_bytes([response[offset + 8], response[offset + 9]]) as usize;
        offset += 10;

        if offset + rdlength > response.len() {
            return Err("Answer RDATA runs past end of packet".into());
        }

        if record_type == qtype {
            match qtype {
                QTYPE_A if rdlength == 4 => answers.push(format!(
                    "{}.{}.{}.{}",
                    response[offset],
                    response[offset + 1],
                    response[offset + 2],
                    response[offset + 3]
                )),
                QTYPE_PTR => {
                    let (name, _) = decode_name(response, offset)?;
                    answers.push(name);
                }
                _ => {}
            }
        }

        offset += rdlength;
    }

    Ok(answers)
}

fn query_udp(server: &str, query: &[u8]) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.set_read_timeout(Some(QUERY_TIMEOUT))?;
    let addr = format!("{}:53", server)
        .to_socket_addrs()?
        .next()
        .ok_or("Failed to resolve DNS server address")?;

    debug_log(3, format!("Sending DNS query packet ({} bytes)", query.len()));
    socket.send_to(query, addr)?;

    let mut buffer = [0u8; 512];
    let (len, _) = socket.recv_from(&mut buffer)?;
    debug_log(3, format!("Received DNS response ({} bytes)", len));

    Ok(buffer[..len].to_vec())
}

fn query_tcp(server: &str, query: &[u8]) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let addr = format!("{}:53", server)
        .to_socket_addrs()?
        .next()
        .ok_or("Failed to resolve DNS server address")?;

    let mut stream = TcpStream::connect_timeout(&addr, QUERY_TIMEOUT)?;
    stream.set_read_timeout(Some(QUERY_TIMEOUT))?;
    stream.set_write_timeout(Some(QUERY_TIMEOUT))?;

    let mut tcp_query = Vec::new();
    tcp_query.extend_from_slice(&(query.len() as u16).to_be_bytes());
    tcp_query.extend_from_slice(query);

    debug_log(3, format!("Sending DNS query via TCP ({} bytes)", tcp_query.len()));
    stream.write_all(&tcp_query)?;

    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf)?;
    let response_len = u16::from_be_bytes(len_buf) as usize;

    let mut buffer = vec![0u8; response_len];
    stream.read_exact(&mut buffer)?;
    debug_log(3, format!("Received DNS response ({} bytes)", buffer.len()));

    Ok(buffer)
}

/// UDP first; switch to TCP when the answer is truncated or UDP itself
/// fails.
fn exchange(server: &str, query: &[u8]) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    match query_udp(server, query) {
        Ok(response) => {
            let flags = if response.len() >= 4 {
                u16::from_be_bytes([response[2], response[3]])
            } else {
                0
            };
            if flags & FLAG_TRUNCATED != 0 {
                debug_log(2, "UDP response truncated, retrying over TCP");
                query_tcp(server, query)
            } else {
                Ok(response)
            }
        }
        Err(udp_err) => {
            debug_log(2, format!("UDP DNS query failed ({}), retrying over TCP", udp_err));
            query_tcp(server, query)
        }
    }
}

/// A-record lookup. Empty result means the name does not resolve.
pub fn lookup_a(server: &str, fqdn: &str) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    debug_log(2, format!("A lookup for {} via {}", fqdn, server));
    let query = build_query(fqdn, QTYPE_A);
    let response = exchange(server, &query)?;
    parse_answers(&response, QTYPE_A)
}

/// PTR lookup for an address. Empty result means no reverse mapping.
pub fn lookup_ptr(server: &str, ip: Ipv4Addr) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let name = reverse_name(ip);
    debug_log(2, format!("PTR lookup for {} via {}", name, server));
    let query = build_query(&name, QTYPE_PTR);
    let response = exchange(server, &query)?;
    parse_answers(&response, QTYPE_PTR)
}

pub fn reverse_name(ip: Ipv4Addr) -> String {
    let o = ip.octets();
    format!("{}.{}.{}.{}.in-addr.arpa", o[3], o[2], o[1], o[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_u16(buf: &mut Vec<u8>, v: u16) {
        buf.extend_from_slice(&v.to_be_bytes());
    }

    fn response_header(flags: u16, qdcount: u16, ancount: u16) -> Vec<u8> {
        let mut buf = Vec::new();
        push_u16(&mut buf, 0x1234);
        push_u16(&mut buf, flags);
        push_u16(&mut buf, qdcount);
        push_u16(&mut buf, ancount);
        push_u16(&mut buf, 0);
        push_u16(&mut buf, 0);
        buf
    }

    #[test]
    fn query_packet_carries_name_and_qtype() {
        let packet = build_query("web01.corp.example.com", QTYPE_A);
        assert_eq!(packet.len(), 12 + 24 + 4);
        assert_eq!(packet[12], 5);
        assert_eq!(&packet[13..18], b"web01");
        // qtype A, qclass IN
        assert_eq!(&packet[packet.len() - 4..], &[0, 1, 0, 1]);
    }

    #[test]
    fn reverse_name_flips_octets() {
        assert_eq!(
            reverse_name(Ipv4Addr::new(192, 168, 100, 25)),
            "25.100.168.192.in-addr.arpa"
        );
    }

    #[test]
    fn decodes_plain_and_compressed_names() {
        let mut packet = vec![0u8; 12];
        packet.extend_from_slice(&encode_dns_name("host.example.com"));
        let pointer_at = packet.len();
        packet.extend_from_slice(&[0xC0, 12]);

        let (name, next) = decode_name(&packet, 12).unwrap();
        assert_eq!(name, "host.example.com");
        assert_eq!(next, pointer_at);

        let (name, next) = decode_name(&packet, pointer_at).unwrap();
        assert_eq!(name, "host.example.com");
        assert_eq!(next, pointer_at + 2);
    }

    #[test]
    fn pointer_loops_are_rejected() {
        let mut packet = vec![0u8; 12];
        packet.extend_from_slice(&[0xC0, 12]);
        assert!(decode_name(&packet, 12).is_err());
    }

    #[test]
    fn parses_a_answers() {
        let mut packet = response_header(0x8180, 1, 1);
        packet.extend_from_slice(&encode_dns_name("web01.corp.example.com"));
        push_u16(&mut packet, QTYPE_A);
        push_u16(&mut packet, 1);
        // answer: name pointer to question, type A, class IN, ttl, rdata
        packet.extend_from_slice(&[0xC0, 12]);
        push_u16(&mut packet, QTYPE_A);
        push_u16(&mut packet, 1);
        packet.extend_from_slice(&300u32.to_be_bytes());
        push_u16(&mut packet, 4);
        packet.extend_from_slice(&[10, 20, 30, 40]);

        let answers = parse_answers(&packet, QTYPE_A).unwrap();
        assert_eq!(answers, vec!["10.20.30.40".to_string()]);
    }

    #[test]
    fn parses_ptr_answer_with_compressed_target() {
        let mut packet = response_header(0x8180, 1, 1);
        packet.extend_from_slice(&encode_dns_name("25.100.168.192.in-addr.arpa"));
        push_u16(&mut packet, QTYPE_PTR);
        push_u16(&mut packet, 1);

        packet.extend_from_slice(&[0xC0, 12]);
        push_u16(&mut packet, QTYPE_PTR);
        push_u16(&mut packet, 1);
        packet.extend_from_slice(&600u32.to_be_bytes());

        // target "web01.corp.example.com" with "corp.example.com" spelled
        // out inline after a leading label
        let mut rdata = Vec::new();
        rdata.push(5);
        rdata.extend_from_slice(b"web01");
        rdata.extend_from_slice(&encode_dns_name("corp.example.com"));
        push_u16(&mut packet, rdata.len() as u16);
        packet.extend_from_slice(&rdata);

        let answers = parse_answers(&packet, QTYPE_PTR).unwrap();
        assert_eq!(answers, vec!["web01.corp.example.com".to_string()]);
    }

    #[test]
    fn nxdomain_is_an_empty_answer() {
        let packet = response_header(0x8183, 0, 0);
        assert!(parse_answers(&packet, QTYPE_A).unwrap().is_empty());
    }

    #[test]
    fn servfail_is_an_error() {
        let packet = response_header(0x8182, 0, 0);
        assert!(parse_answers(&packet, QTYPE_A).is_err());
    }

    #[test]
    fn mismatched_types_are_skipped() {
        let mut packet = response_header(0x8180, 1, 1);
        packet.extend_from_slice(&encode_dns_name("web01.corp.example.com"));
        push_u16(&mut packet, QTYPE_A);
        push_u16(&mut packet, 1);

        packet.extend_from_slice(&[0xC0, 12]);
        push_u16(&mut packet, 5); // CNAME
        push_u16(&mut packet, 1);
        packet.extend_from_slice(&300u32.to_be_bytes());
        let rdata = encode_dns_name("alias.corp.example.com");
        push_u16(&mut packet, rdata.len() as u16);
        packet.extend_from_slice(&rdata);

        assert!(parse_answers(&packet, QTYPE_A).unwrap().is_empty());
    }
}
