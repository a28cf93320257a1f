use std::fs::File;

use dltwire_frame::{DltId, FileReader, MessageWriter, WriterConfig};
use tracing::{debug, info};

use crate::cmd::ConvertArgs;
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::{MessagePrinter, OutputFormat};

pub fn run(args: ConvertArgs, format: OutputFormat) -> CliResult<i32> {
    let filter = args.filter.to_filter();
    let mut writer = match &args.output {
        Some(path) => {
            let file = File::create(path).map_err(|err| io_error("cannot create output", err))?;
            // Stored messages keep their own storage header.
            Some(MessageWriter::with_config(
                file,
                WriterConfig::storage(DltId::new("ECU1")),
            ))
        }
        None => None,
    };
    let mut printer = MessagePrinter::new(format);

    let mut matched = 0u64;
    'inputs: for input in &args.inputs {
        let file = File::open(input)
            .map_err(|err| io_error(&format!("cannot open {}", input.display()), err))?;
        let mut reader = FileReader::with_filter(file, filter.clone());

        while let Some(message) = reader
            .next_message()
            .map_err(|err| frame_error(&format!("cannot read {}", input.display()), err))?
        {
            match writer.as_mut() {
                Some(writer) => writer
                    .write_message(&message)
                    .map_err(|err| frame_error("write failed", err))?,
                None => printer.print(&message),
            }
            matched += 1;
            if args.count.is_some_and(|count| matched >= count) {
                break 'inputs;
            }
        }

        debug!(
            input = %input.display(),
            decoded = reader.messages(),
            skipped_bytes = reader.skipped_bytes(),
            "input read"
        );
    }

    printer.finish();
    if let Some(writer) = &writer {
        info!(messages = writer.messages_written(), "stored trace written");
    }
    Ok(SUCCESS)
}
