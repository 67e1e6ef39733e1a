use canrelay::{ChannelParams, InterfaceKind, Transport};
use std::env;
use std::time::Duration;

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let kind: InterfaceKind = env::args()
        .nth(1)
        .unwrap_or_else(|| "socketcan".into())
        .parse()
        .map_err(anyhow::Error::msg)?;
    let channel = env::args().nth(2).unwrap_or_else(|| "vcan0".into());

    let params = ChannelParams::new(kind, channel);
    let mut bus = params.open().with_context(|| format!("Failed to open {}", params))?;

    loop {
        match bus.receive(Duration::from_secs(1)) {
            Ok(Some(frame)) => log::info!("{:#X}", frame),
            Ok(None) => log::debug!("idle"),
            Err(e) => {
                log::error!("Error: {}", e);
                break;
            }
        }
    }

    bus.close();
    Ok(())
}
