use braille_gio::{Descriptor, Registry};
use std::env;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// usage: probe <identifier> [descriptor.toml|descriptor.json]
fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
        .init();

    let mut args = env::args().skip(1);
    let identifier = args.next().unwrap_or_else(|| "null:".to_owned());
    let descriptor = args.next().map(|path| Descriptor::load(path).expect("load descriptor"));

    let registry = Registry::standard();
    let backends: Vec<String> = registry.resource_types().map(|t| t.to_string()).collect();
    println!("backends: {}", backends.join(", "));

    if let Some(descriptor) = &descriptor {
        println!("{}", serde_json::to_string_pretty(descriptor).expect("serialize descriptor"));
    }

    let mut endpoint = registry
        .connect(&identifier, descriptor.as_ref())
        .expect("connect");

    println!("type={} bps={}", endpoint.resource_type(), endpoint.bytes_per_second());
    match endpoint.resource_identifier() {
        Ok(id) => println!("identifier={id}"),
        Err(e) => println!("identifier: {e}"),
    }
    match endpoint.resource_name() {
        Ok(name) => println!("name={name}"),
        Err(e) => println!("name: {e}"),
    }

    for id in 0..=u8::MAX {
        match endpoint.hid_report_sizes(id) {
            Ok(sizes) if sizes != Default::default() => println!("report {id:#04x}: {sizes:?}"),
            Err(e) if e.is_unsupported() => break,
            _ => {}
        }
    }

    if endpoint.await_input(Duration::from_millis(500)).unwrap_or(false) {
        let mut buffer = [0u8; 64];
        let count = endpoint.read(&mut buffer, true).expect("read");
        println!("input: {:02X?}", &buffer[..count]);
    }

    endpoint.disconnect().expect("disconnect");
}
