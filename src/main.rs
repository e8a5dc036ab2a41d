use std::process::exit;

use collector::{Server, StdoutSink};

/// Validates `<prog> <port>`: exactly one argument, a port in 1..=65535.
fn parse_port(args: &[String]) -> Result<u16, String> {
    if args.len() != 2 {
        let prog = args.first().map(String::as_str).unwrap_or("collector");
        return Err(format!("Usage: {prog} <port>"));
    }

    match args[1].parse::<u32>() {
        Ok(port) if (1..=65535).contains(&port) => Ok(port as u16),
        _ => Err("Invalid port number. Please enter a value between 1 and 65535.".to_string()),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let port = match parse_port(&args) {
        Ok(port) => port,
        Err(usage) => {
            eprintln!("{usage}");
            exit(1);
        }
    };

    let server = match Server::bind(port, Box::new(StdoutSink)) {
        Ok(server) => server,
        Err(err) => {
            eprintln!("{err}");
            exit(1);
        }
    };

    if let Err(err) = server.serve() {
        eprintln!("{err}");
        exit(1);
    }
}
