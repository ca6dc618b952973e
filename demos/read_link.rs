//! Poll the link a few times and print the header fields a game client writes
//!
//! Run with `cargo run --example read_link -- [NAME]`.

use anyhow::Context;
use mumble_link::prelude::*;
use std::time::Duration;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("debug").init();

    let name = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_LINK_NAME.to_string());
    let session = LinkSession::open(name.as_str())
        .with_context(|| format!("failed to open {:?}", name))?;
    let action = match session.origin() {
        RegionOrigin::Attached => "attached to",
        RegionOrigin::Created => "created",
    };
    println!("{} link {:?}", action, session.name().as_str());

    let mut header = [0u8; 8];
    for _ in 0..5 {
        session.copy_to(0, &mut header)?;
        let version = u32::from_ne_bytes([header[0], header[1], header[2], header[3]]);
        let tick = u32::from_ne_bytes([header[4], header[5], header[6], header[7]]);
        println!("version {:>3}  tick {:>10}", version, tick);
        std::thread::sleep(Duration::from_millis(200));
    }

    session.close()?;
    Ok(())
}
