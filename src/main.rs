//! Axis VAPIX transport
//! `vapix-probe`: query a camera from the command line
//!
//! ```text
//! vapix-probe <address> <user> <password> [params <group> | accounts | get <path> | soap <fragment>]
//! ```
//!
//! Set `VAPIX_TIMEOUT_SECS` to change the request deadline, `VAPIX_HTTPS=1`
//! to talk HTTPS, and `RUST_LOG=debug` to trace the exchange.

use anyhow::{ bail, Context, Result };
use log::info;
use std::time::Duration;

use axis_vapix::params::{ list_accounts, list_params };
use axis_vapix::{ Device, Protocol, ResponseBody, ResponseKind, Transport, TransportConfig };

const USAGE: &str =
    "usage: vapix-probe <address> <user> <password> [params <group> | accounts | get <path> | soap <fragment>]";

fn config_from_env() -> Result<TransportConfig> {
    let mut config = TransportConfig::default();
    if let Ok(secs) = std::env::var("VAPIX_TIMEOUT_SECS") {
        let secs: u64 = secs.parse().context("VAPIX_TIMEOUT_SECS must be a number of seconds")?;
        config.timeout = Duration::from_secs(secs);
    }
    Ok(config)
}

fn protocol_from_env() -> Protocol {
    match std::env::var("VAPIX_HTTPS").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => Protocol::Https,
        _ => Protocol::Http,
    }
}

fn print_body(body: &ResponseBody) -> Result<()> {
    match body {
        ResponseBody::Text(text) => println!("{}", text),
        ResponseBody::Json(value) => println!("{}", serde_json::to_string_pretty(value)?),
        ResponseBody::Binary(data) => println!("<{} bytes>", data.len()),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [address, user, password, rest @ ..] = args.as_slice() else {
        bail!(USAGE);
    };

    let device = Device::new(address.as_str(), user.as_str(), password.as_str(), protocol_from_env());
    let transport = Transport::with_config(config_from_env()?)?;
    info!("Probing {} as {}", device.address, device.user);

    match rest {
        [] => {
            let tree = list_params(&transport, &device, "Brand").await?;
            println!("{}", serde_json::to_string_pretty(&tree)?);
        }
        [command, group] if command == "params" => {
            let tree = list_params(&transport, &device, group).await?;
            println!("{}", serde_json::to_string_pretty(&tree)?);
        }
        [command] if command == "accounts" => {
            let accounts = list_accounts(&transport, &device).await?;
            println!("{}", serde_json::to_string_pretty(&accounts)?);
        }
        [command, path] if command == "get" => {
            let body = transport.get(&device, path, ResponseKind::Structured).await?;
            print_body(&body)?;
        }
        [command, fragment] if command == "soap" => {
            let body = transport.soap(&device, fragment).await?;
            print_body(&body)?;
        }
        _ => bail!(USAGE),
    }

    Ok(())
}
