//! Sends a stream of control messages to an OSC peer through the
//! prioritized sender.
//!
//! Usage: send HOST_IP:HOST_PORT

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use osckit::{clock, encoder};
use osckit::{Osc10, OscMessage, OscPacket, PacketSender, SenderConfig, UdpLink};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} HOST_IP:HOST_PORT", &args[0]);
        std::process::exit(1);
    }
    let target = SocketAddr::from_str(&args[1]).expect("target address");

    let link = UdpLink::new();
    link.open_to_target(target, None).unwrap();

    let mut sender: PacketSender<Vec<u8>> = PacketSender::new(SenderConfig {
        cycle_wait: Duration::from_millis(2),
        ..SenderConfig::default()
    });
    sender.set_timetag_source(clock::now);
    sender.connect(link.clone()).unwrap();

    let steps = 128;
    let step = 2.0 * std::f32::consts::PI / steps as f32;
    for i in 0..1024 {
        let phase = step * (i % steps) as f32;
        let xy = OscPacket::Message(OscMessage::new(
            "/pad/xy",
            (0.5 + phase.sin() / 2.0, 0.5 + phase.cos() / 2.0),
        ));
        let beat = OscPacket::Message(OscMessage::new("/clock/beat", (i as i32,)));

        // Beats matter more than pad wiggles.
        sender
            .enqueue_tail(encoder::encode::<Osc10>(&beat).unwrap(), 0)
            .unwrap();
        sender
            .enqueue_tail(encoder::encode::<Osc10>(&xy).unwrap(), 1)
            .unwrap();
        thread::sleep(Duration::from_millis(20));
    }

    sender.disconnect();
    link.close();
}
