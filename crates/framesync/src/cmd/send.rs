use std::fs;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use bytes::Bytes;
use framesync_frame::{FieldKind, FieldValue, HeaderLayout, Protocol};
use framesync_session::{MessageQueue, Reactor, TransportSession};
use framesync_transport::{Transport, TransportError};
use serde::Serialize;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::cmd::SendArgs;
use crate::exit::{session_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_report, OutputFormat};

#[derive(Serialize)]
struct SendReport {
    destination: String,
    transport: &'static str,
    frame_size: usize,
    payload_size: usize,
}

pub fn run(args: SendArgs, protocol: Protocol, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    let fields = parse_fields(protocol.layout(), &args.fields)?;
    let field_refs: Vec<(&str, FieldValue)> = fields
        .iter()
        .map(|(name, value)| (name.as_str(), value.clone()))
        .collect();

    let reactor = Reactor::new("framesync-send").map_err(|err| session_error("reactor", err))?;
    let transport = open_transport(&reactor, args.addr, args.udp)?;

    let mut session = TransportSession::new(transport, protocol, MessageQueue::new());
    let task = session
        .start(reactor.handle())
        .map_err(|err| session_error("session start failed", err))?;

    let sent = session
        .write_frame(&field_refs, &payload)
        .and_then(|handle| handle.wait());
    session.stop();
    if let Err(err) = task.wait() {
        debug!(error = %err, "session ended before stop");
    }
    let frame_size = sent.map_err(|err| session_error("send failed", err))?;

    let report = SendReport {
        destination: args.addr.to_string(),
        transport: session.kind(),
        frame_size,
        payload_size: payload.len(),
    };
    let rows = [
        ("destination", report.destination.clone()),
        ("transport", report.transport.to_string()),
        ("frame_size", frame_size.to_string()),
        ("payload_size", report.payload_size.to_string()),
    ];
    print_report(&report, &rows, format);
    Ok(SUCCESS)
}

fn open_transport(reactor: &Reactor, addr: SocketAddr, udp: bool) -> CliResult<Transport> {
    let opened = if udp {
        let local: SocketAddr = if addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        reactor.run(async move {
            let socket = UdpSocket::bind(local)
                .await
                .map_err(|source| TransportError::Bind { addr: local, source })?;
            Ok::<_, TransportError>(Transport::udp(socket, Some(addr)))
        })
    } else {
        reactor.run(Transport::tcp_connect(addr))
    };
    opened
        .map_err(|err| session_error("reactor", err))?
        .map_err(|err| transport_error("connect failed", err))
}

fn resolve_payload(args: &SendArgs) -> CliResult<Bytes> {
    if let Some(data) = &args.data {
        return Ok(Bytes::copy_from_slice(data.as_bytes()));
    }
    if let Some(hex) = &args.hex {
        return decode_hex(hex).map(Bytes::from);
    }
    if let Some(path) = &args.file {
        return fs::read(path).map(Bytes::from).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Bytes::new())
}

/// Parse `NAME=VALUE` pairs against the header layout.
fn parse_fields(layout: &HeaderLayout, raw: &[String]) -> CliResult<Vec<(String, FieldValue)>> {
    raw.iter()
        .map(|pair| {
            let (name, value) = pair
                .split_once('=')
                .ok_or_else(|| CliError::new(USAGE, format!("--field expects NAME=VALUE, got '{pair}'")))?;
            let field = layout
                .field(name)
                .ok_or_else(|| CliError::new(USAGE, format!("unknown header field '{name}'")))?;
            let parsed = match field.kind() {
                FieldKind::Flag => FieldValue::Flag(parse_flag(value)?),
                FieldKind::Raw(_) => FieldValue::Raw(Bytes::from(decode_hex(value)?)),
                _ => FieldValue::Unsigned(parse_unsigned(value)?),
            };
            Ok((name.to_string(), parsed))
        })
        .collect()
}

fn parse_flag(value: &str) -> CliResult<bool> {
    match value {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(CliError::new(USAGE, format!("invalid flag value '{other}'"))),
    }
}

fn parse_unsigned(value: &str) -> CliResult<u64> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|_| CliError::new(USAGE, format!("invalid unsigned value '{value}'")))
}

fn decode_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect();
    if digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "hex input must have an even number of digits"));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| CliError::new(USAGE, format!("invalid hex byte '{}'", &digits[i..i + 2])))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use framesync_frame::Endian;

    use super::*;

    fn layout() -> HeaderLayout {
        HeaderLayout::builder()
            .field("urgent", FieldKind::Flag)
            .field("seq", FieldKind::U16(Endian::Big))
            .field("tag", FieldKind::Raw(2))
            .build()
            .unwrap()
    }

    #[test]
    fn parses_fields_by_kind() {
        let fields = parse_fields(
            &layout(),
            &["urgent=yes".to_string(), "seq=0x10".to_string(), "tag=beef".to_string()],
        )
        .unwrap();
        assert_eq!(fields[0], ("urgent".to_string(), FieldValue::Flag(true)));
        assert_eq!(fields[1], ("seq".to_string(), FieldValue::Unsigned(16)));
        assert_eq!(
            fields[2],
            ("tag".to_string(), FieldValue::Raw(Bytes::from_static(&[0xBE, 0xEF])))
        );
    }

    #[test]
    fn rejects_malformed_fields() {
        for bad in ["seq", "nope=1", "seq=-1", "urgent=maybe", "tag=abc"] {
            let err = parse_fields(&layout(), &[bad.to_string()]).unwrap_err();
            assert_eq!(err.code, USAGE, "{bad}");
        }
    }

    #[test]
    fn decodes_hex_with_separators() {
        assert_eq!(decode_hex("0x48 65:6c").unwrap(), b"Hel");
        assert!(decode_hex("zz").is_err());
    }
}
