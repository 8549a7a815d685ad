use std::{
    error::Error,
    io::{self, Write},
};

use clap::Parser;
use log::warn;
use opentick::{
    ClientError,
    cli::{Command, format_cell, prompt},
    connect,
};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server host name or address
    #[arg(default_value = "127.0.0.1")]
    host: String,
    /// Server port
    #[arg(default_value_t = 1116)]
    port: u16,
    /// Database to use after connecting
    #[arg(short, long, default_value = "")]
    database: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let mut conn = connect(&cli.host, cli.port, &cli.database)?;

    // Ctrl-C closes the socket, so a query stuck waiting for its result returns.
    let handle = conn.shutdown_handle()?;
    ctrlc::set_handler(move || {
        if let Err(e) = handle.shutdown() {
            warn!("failed to shut down connection: {e}");
        }
    })?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        let cmd = match prompt(stdin.lock(), stdout.lock()) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        let (sql, args) = match cmd {
            Command::Exit => break,
            Command::Statement { sql, .. } if sql.is_empty() => continue,
            Command::Statement { sql, args } => (sql, args),
        };

        match conn.execute(&sql, &args) {
            Ok(rows) => {
                for row in &rows {
                    let cells: Vec<String> = row.iter().map(format_cell).collect();
                    writeln!(stdout, "{}", cells.join("\t"))?;
                }
                writeln!(stdout, "({} rows)", rows.len())?;
            }
            Err(e @ ClientError::Server(_)) => eprintln!("query error: {e}"),
            Err(e) => {
                eprintln!("connection error: {e}");
                break;
            }
        }
    }

    conn.close();
    Ok(())
}
