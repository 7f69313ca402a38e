use std::fs::File;
use std::io::{self, BufReader, Read};

use framesync_frame::{FrameError, FrameReader, Protocol};
use tracing::info;

use crate::cmd::DecodeArgs;
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: DecodeArgs, protocol: Protocol, format: OutputFormat) -> CliResult<i32> {
    let (input, source): (Box<dyn Read>, String) = if args.input == "-" {
        (Box::new(io::stdin().lock()), "stdin".to_string())
    } else {
        let file = File::open(&args.input)
            .map_err(|err| io_error(&format!("failed opening {}", args.input), err))?;
        (Box::new(BufReader::new(file)), format!("file:{}", args.input))
    };

    let mut reader = FrameReader::new(input, protocol);
    let mut decoded = 0usize;
    let mut truncated = 0usize;
    while args.count.is_none_or(|count| decoded < count) {
        match reader.read_frame() {
            Ok(frame) => {
                print_frame(&frame, &source, format);
                decoded += 1;
            }
            Err(FrameError::ConnectionClosed { discarded }) => {
                truncated = discarded;
                break;
            }
            Err(err) => return Err(frame_error("decode failed", err)),
        }
    }

    info!(
        source,
        frames = decoded,
        discarded = reader.discarded_bytes(),
        protocol_errors = reader.protocol_errors(),
        truncated,
        "decode finished"
    );
    Ok(SUCCESS)
}
