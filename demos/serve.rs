//! Listens for OSC traffic and routes it through an address space.
//!
//! Usage: serve PORT

use std::env;
use std::time::Duration;

use osckit::{AddressSpace, LinkSettings, OscReceiver, UdpLink};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} PORT", &args[0]);
        std::process::exit(1);
    }
    let port: u16 = args[1].parse().expect("port number");

    let link = UdpLink::new();
    link.set_settings(LinkSettings {
        poll_interval: Duration::from_millis(5),
        ..LinkSettings::default()
    });
    link.open_to_any(Some(port)).unwrap();
    println!("listening on {}", link.local_addr().unwrap());

    let mut receiver = OscReceiver::new();
    receiver.connect(link.clone()).unwrap();

    let space = AddressSpace::new();
    space.connect(&receiver);
    space
        .add_method("/clock/beat", |_, args| println!("beat {:?}", args))
        .unwrap();
    space
        .add_method("/pad/xy", |_, args| println!("pad {:?}", args))
        .unwrap();

    // Everything else is still visible on the raw events.
    link.events().bad_data.subscribe(|received| {
        eprintln!("{} bytes of junk from {}", received.packet.len(), received.from);
    });

    loop {
        std::thread::sleep(Duration::from_secs(60));
    }
}
