use anyhow::{Context, Result};
use clap::Parser;
use mumble_link_cli::{dump_length, hex_dump, load_config, origin_label, Cli, Command, LinkReport};
use mumble_link_shared_memory::LinkSession;
use std::sync::mpsc;
use tracing::info;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(&config.log_level)
        .init();

    let session = LinkSession::open(config.name.as_str())
        .with_context(|| format!("failed to open link {:?}", config.name))?;

    match &cli.command {
        Command::Inspect { json } => {
            let report = LinkReport::new(session.name().as_str(), session.origin(), session.view());
            session.close().context("link teardown failed")?;

            if *json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report);
                println!("teardown:      view unmapped, handle released");
            }
        }

        Command::Dump { offset, length } => {
            let mut buf = vec![0u8; dump_length(*offset, *length)?];
            let copied = session.copy_to(*offset, &mut buf);
            session.close().context("link teardown failed")?;
            copied.context("dump range rejected")?;

            print!("{}", hex_dump(*offset, &buf));
        }

        Command::Hold => {
            let (tx, rx) = mpsc::channel();
            ctrlc::set_handler(move || {
                let _ = tx.send(());
            })
            .context("failed to install Ctrl-C handler")?;

            println!(
                "holding {:?} ({}), press Ctrl-C to release",
                session.name().as_str(),
                origin_label(session.origin())
            );
            let _ = rx.recv();

            info!("releasing link");
            session.close().context("link teardown failed")?;
        }
    }

    Ok(())
}
