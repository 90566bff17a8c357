use std::io::{Read, Write};

use log::info;
use tcprs::Interface;

fn main() -> std::io::Result<()> {
    env_logger::init();

    let mut iface = Interface::new()?;
    let mut listener = iface.bind(9000)?;

    info!("listening on tun0:9000");

    loop {
        let mut stream = listener.accept()?;
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match stream.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if stream.write_all(&buf[..n]).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("read error: {}", e);
                        break;
                    }
                }
            }
        });
    }
}
