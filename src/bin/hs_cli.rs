use std::{error::Error, io, time::Duration};

use clap::Parser;
use handlersocket::{
    ClientConfig, Command, DEFAULT_AUTH_KIND, HandlerSocket,
    cli::run,
    config::{DEFAULT_HOST, DEFAULT_READ_PORT},
    prompt,
};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// HandlerSocket host
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,
    /// Listener port; 9998 serves reads, 9999 serves writes
    #[arg(long, default_value_t = DEFAULT_READ_PORT)]
    port: u16,
    /// Connect, read and write timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
    /// Authenticate with this secret after connecting
    #[arg(long)]
    secret: Option<String>,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let mut config = ClientConfig::new(cli.host, cli.port);
    if let Some(secs) = cli.timeout {
        config = config.timeout(Duration::from_secs(secs));
    }

    let mut hs = HandlerSocket::connect(config)?;
    if let Some(secret) = cli.secret {
        hs.auth(&secret, DEFAULT_AUTH_KIND)?;
    }

    let stdin = io::stdin();
    let stdout = io::stdout();

    loop {
        let cmd = match prompt(stdin.lock(), stdout.lock()) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };

        let exit = cmd == Command::Exit;
        match run(&mut hs, cmd) {
            Ok(None) => {}
            Ok(Some(out)) => println!("{out}"),
            Err(e) if e.is_fatal() => {
                eprintln!("connection lost: {e}");
                break;
            }
            Err(e) => eprintln!("error: {e}"),
        }
        if exit {
            break;
        }
    }

    Ok(())
}
