use std::path::Path;

use framesync_frame::{PayloadLength, Protocol};
use framesync_transport::MAX_DATAGRAM_LEN;

use crate::cmd::{load_protocol, VersionArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::hex;

pub fn run(args: VersionArgs, protocol: Option<&Path>) -> CliResult<i32> {
    println!("framesync {}", env!("CARGO_PKG_VERSION"));
    if !args.extended {
        return Ok(SUCCESS);
    }

    println!(
        "build: {} ({})",
        option_env!("FRAMESYNC_BUILD_TARGET").unwrap_or("unknown"),
        option_env!("FRAMESYNC_BUILD_PROFILE").unwrap_or("unknown")
    );
    println!("transports: tcp, udp{}", if cfg!(unix) { ", serial" } else { "" });
    println!("max_datagram: {MAX_DATAGRAM_LEN}");

    let source = protocol.map_or_else(|| "built-in".to_string(), |p| p.display().to_string());
    let protocol = load_protocol(protocol)?;
    println!("protocol: {source}");
    for line in describe(&protocol) {
        println!("  {line}");
    }

    Ok(SUCCESS)
}

/// One line per protocol property, in wire order.
fn describe(protocol: &Protocol) -> Vec<String> {
    let fields: Vec<String> = protocol
        .layout()
        .fields()
        .iter()
        .map(|field| format!("{}:{}", field.name(), field.kind()))
        .collect();
    let length = match protocol.payload_length() {
        PayloadLength::Field { name, unit: 1 } => format!("field {name}"),
        PayloadLength::Field { name, unit } => format!("field {name} x{unit}"),
        PayloadLength::Fixed(n) => format!("fixed {n}"),
    };
    vec![
        format!("signature: {}", hex(protocol.signature().as_bytes())),
        format!("header: [{}] ({} bytes)", fields.join(", "), protocol.layout().width()),
        format!("payload_length: {length}"),
        format!("max_frame_size: {}", protocol.max_frame_size()),
    ]
}
