use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dltwire_frame::{
    decode_message, DecodeOptions, DltId, FrameError, MessageWriter, ReceiveMode, Receiver,
    WriterConfig, DEFAULT_RECEIVE_BUFFER,
};
use dltwire_transport::{connect_tcp, DltStream};
use tracing::{debug, info, warn};

use crate::cmd::{install_ctrlc_handler, parse_duration, ReceiveArgs};
use crate::exit::{frame_error, io_error, transport_error, CliResult, SUCCESS};
use crate::output::{MessagePrinter, OutputFormat};

/// How long a read blocks before the stop flag is checked again.
const READ_TICK: Duration = Duration::from_millis(200);

pub fn run(args: ReceiveArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let stream = connect_tcp(&args.addr, Some(timeout))
        .map_err(|err| transport_error("connect failed", err))?;
    stream
        .set_read_timeout(Some(READ_TICK))
        .map_err(|err| transport_error("connect failed", err))?;
    info!(addr = %args.addr, "connected to daemon");

    let mut writer = match &args.output {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|err| io_error("cannot open output", err))?;
            Some(MessageWriter::with_config(
                file,
                WriterConfig::storage(DltId::new(&args.ecu)),
            ))
        }
        None => None,
    };

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let options = if args.serial_header {
        DecodeOptions::serial()
    } else {
        DecodeOptions::default()
    };
    let filter = args.filter.to_filter();
    let mut receiver = Receiver::with_capacity(stream, DEFAULT_RECEIVE_BUFFER, ReceiveMode::Stream);
    let mut printer = MessagePrinter::new(format);

    let mut session = Session {
        options: &options,
        writer: writer.as_mut(),
        printer: &mut printer,
        count: args.count,
    };
    let outcome = session.pump(&mut receiver, &running, |message| filter.matches(message));
    printer.finish();
    outcome?;
    Ok(SUCCESS)
}

struct Session<'a> {
    options: &'a DecodeOptions,
    writer: Option<&'a mut MessageWriter<File>>,
    printer: &'a mut MessagePrinter,
    count: Option<u64>,
}

impl Session<'_> {
    fn done(&self) -> bool {
        self.count.is_some_and(|count| self.printer.printed() >= count)
    }

    fn pump(
        &mut self,
        receiver: &mut Receiver<DltStream>,
        running: &AtomicBool,
        accept: impl Fn(&dltwire_frame::Message) -> bool,
    ) -> CliResult<()> {
        while running.load(Ordering::SeqCst) && !self.done() {
            match receiver.receive() {
                Ok(0) => continue,
                Ok(_) => {}
                Err(FrameError::ConnectionClosed) => {
                    info!("daemon closed the connection");
                    return Ok(());
                }
                Err(FrameError::Io(err)) if err.kind() == ErrorKind::TimedOut => continue,
                Err(FrameError::ReceiverFull { capacity }) => {
                    warn!(capacity, "no complete message in a full buffer, dropping it");
                    receiver.clear();
                    continue;
                }
                Err(err) => return Err(frame_error("receive failed", err)),
            }

            while receiver.bytes_received() > 0 && !self.done() {
                match decode_message(receiver.window(), self.options) {
                    Ok(Some(decoded)) => {
                        receiver
                            .remove(decoded.consumed)
                            .map_err(|err| frame_error("receive failed", err))?;
                        let message = decoded.message;
                        if !accept(&message) {
                            continue;
                        }
                        if let Some(writer) = self.writer.as_mut() {
                            writer
                                .write_message(&message)
                                .map_err(|err| frame_error("write failed", err))?;
                        }
                        self.printer.print(&message);
                    }
                    Ok(None) => break,
                    Err(FrameError::MissingSerialMarker { discard }) => {
                        debug!(discard, "waiting for serial marker");
                        receiver
                            .remove(discard)
                            .map_err(|err| frame_error("receive failed", err))?;
                        break;
                    }
                    Err(err) => {
                        let skip = if self.options.resync {
                            1
                        } else {
                            receiver.bytes_received()
                        };
                        warn!(error = %err, skip, "dropping malformed message");
                        receiver
                            .remove(skip)
                            .map_err(|err| frame_error("receive failed", err))?;
                    }
                }
            }
            receiver.move_to_begin();
        }
        Ok(())
    }
}
