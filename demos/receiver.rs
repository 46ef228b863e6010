use std::env;
use std::sync::Arc;

use osckit::server::{OscServer, ServerConfig};
use osckit::{qsc, OscPacket, ReplyEndpoint};

#[tokio::main]
async fn main() -> osckit::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    let port: u16 = args
        .get(1)
        .map(|p| p.parse().expect("PORT must be a number"))
        .unwrap_or(53000);

    let destination = Arc::new(|packet: OscPacket, reply: ReplyEndpoint| {
        println!("{} <- {}", reply.source(), qsc::render_packet(&packet));
    });

    let mut server = OscServer::new(
        ServerConfig {
            port,
            ..ServerConfig::default()
        },
        destination,
    );
    server.start_listening().await?;
    println!("listening on port {port}, ctrl-c to quit");

    std::future::pending::<()>().await;
    Ok(())
}
