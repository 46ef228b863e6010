use std::env;
use std::f32;
use std::time::Duration;

use osckit::{ClientConfig, OscClient, OscMessage, OscPacket, OscValue};

#[tokio::main]
async fn main() -> osckit::Result<()> {
    let args: Vec<String> = env::args().collect();
    let usage = format!("Usage: {} HOST PORT", &args[0]);
    if args.len() < 3 {
        panic!("{}", usage);
    }

    let mut client = OscClient::new(ClientConfig {
        host: args[1].clone(),
        port: args[2].parse().expect("PORT must be a number"),
        use_tcp: true,
        ..ClientConfig::default()
    });
    client.connect().await?;

    // switch view
    client.send_packet(&OscPacket::Message("/3".into())).await?;

    // trace a circle on the xy pad
    let steps = 128;
    let step_size: f32 = 2.0 * f32::consts::PI / steps as f32;
    for i in 0..1024 {
        let x = 0.5 + (step_size * (i % steps) as f32).sin() / 2.0;
        let y = 0.5 + (step_size * (i % steps) as f32).cos() / 2.0;
        client
            .send_packet(&OscPacket::Message(OscMessage {
                addr: "/3/xy1".to_string(),
                args: vec![OscValue::Float(x), OscValue::Float(y)],
            }))
            .await?;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    client.disconnect().await;
    Ok(())
}
