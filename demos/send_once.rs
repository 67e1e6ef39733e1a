use canrelay::{CanFrame, ChannelParams, InterfaceKind, Transport};
use std::env;

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
    let frame: CanFrame = args
        .next()
        .unwrap_or_else(|| "07B#DEADBEEF".into())
        .parse()
        .context("Parsing frame")?;

    let params = ChannelParams::new(kind, channel);
    let mut bus = params.open().with_context(|| format!("Failed to open {}", params))?;

    match bus.transmit(&frame) {
        Ok(()) => log::info!("Frame Send Success: {:X}", frame),
        Err(e) => log::error!("Frame Send Error {}", e),
    }

    bus.close();
    Ok(())
}
