//! Run a relay worker until ^C.
//!
//! ```text
//! $ relay socketcan vcan0 blocked.csv IDs
//! ```
//!
//! Accepted frames are printed; lines typed on stdin in candump notation
//! (`123#DEADBEEF`) are queued for transmission.

use canrelay::{load_filter, CanFrame, ChannelParams, FrameQueue, IdFilter, InterfaceKind, RelayWorker};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use std::{env, io, thread};

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let kind: InterfaceKind = args
        .next()
        .unwrap_or_else(|| "socketcan".into())
        .parse()
        .map_err(anyhow::Error::msg)?;
    let channel = args.next().unwrap_or_else(|| "vcan0".into());
    let filter = match args.next() {
        Some(path) => {
            let column = args.next().unwrap_or_else(|| "IDs".into());
            load_filter(&path, &column).with_context(|| format!("Loading block-list from {}", path))?
        }
        None => IdFilter::allow_all(),
    };
    let (inbound, outbound) = FrameQueue::pair();
    let mut worker = RelayWorker::new(ChannelParams::new(kind, channel), filter, inbound, outbound);
    log::info!("relaying {}, blocking {} IDs", worker.connector(), worker.filter().len());
    worker.start().context("Starting relay")?;

    static QUIT: AtomicBool = AtomicBool::new(false);
    let stop = worker.stop_handle();
    ctrlc::set_handler(move || {
        QUIT.store(true, Ordering::Relaxed);
        stop.stop();
    })
    .context("Failed to set ^C handler")?;

    let tx = worker.outbound().clone();
    thread::spawn(move || {
        for line in io::stdin().lock().lines().map_while(Result::ok) {
            match line.parse::<CanFrame>() {
                Ok(frame) => tx.push(frame),
                Err(e) => log::warn!("ignoring '{}': {}", line, e),
            }
        }
    });

    while !QUIT.load(Ordering::Relaxed) {
        if let Some(frame) = worker.inbound().pop(Duration::from_millis(100)) {
            println!("{:#X}", frame);
        }
    }

    worker.stop();
    worker.join();
    let stale = worker.drain();
    let stats = worker.stats();
    log::info!("done: {} forwarded, {} blocked, {} sent, {} stale frames discarded",
               stats.forwarded,
               stats.dropped,
               stats.transmitted,
               stale);

    Ok(())
}
