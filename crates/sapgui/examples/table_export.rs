//! Dump a table through SE16N as tab-separated text.
//!
//! Usage: table_export <connection description> <table name>
//!
//! Run with `RUST_LOG=sapgui=debug` to see every bridge command.

use anyhow::{bail, Context};
use sapgui::{BridgeConfig, Client, VKey};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(server), Some(table)) = (args.next(), args.next()) else {
        bail!("usage: table_export <connection description> <table name>");
    };

    let mut client = Client::new(BridgeConfig::from_env());
    let rows = client
        .with_session(&server, |session| {
            session.open_transaction("SE16N")?;
            session.update_field("GD-TAB", &table)?;
            session.send_key(VKey::ENTER)?;
            session.send_key(VKey::EXECUTE)?;
            session.get_table("shellcont/shell")
        })
        .with_context(|| format!("reading {table} on {server}"))?;

    for row in &rows {
        println!("{}", row.join("\t"));
    }
    eprintln!("{} rows", rows.len());

    client.shutdown()?;
    Ok(())
}
