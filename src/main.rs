/*!
A standalone OpenFlow 1.3 controller running the reactive forwarding core
with virtual gateways read from a CSV file.

Switches are served independently, so every switch forwards between its
own ports. You can use mininet as a test switch.
To spawn an instance with 4 ports you can run:

```sh
# mn --controller remote,port=6653 --topo single,4 --switch ovs,protocols=OpenFlow13
```
*/

#[macro_use]
extern crate clap;
#[macro_use]
extern crate log;
extern crate offorward;
extern crate simple_logger;

#[cfg(unix)]
extern crate libc;
#[cfg(unix)]
extern crate log_panics;
#[cfg(unix)]
extern crate syslog;

use offorward::conf;
use offorward::conf::DamperConfig;
use offorward::damper::MessageDamper;
use offorward::flowset::FlowsetRegistry;
use offorward::forwarding::{Forwarding, ForwardingConfig};
use offorward::gateway::GatewayStore;
use offorward::gateway::csv::CsvParser;
use offorward::gateway::handler::VirtualGateway;
use offorward::local::{LocalDevices, LocalRouting, LocalTopology};
use offorward::openflow;
use offorward::openflow::{Dispatcher, SwitchRegistry};
use offorward::openflow::messages::OfpType;
use offorward::reaper::Reaper;
use offorward::services::{PacketInListener, Services};

#[cfg(unix)]
use std::fs::File;
use std::io;
#[cfg(unix)]
use std::io::prelude::*;
use std::net;
use std::process::exit;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

fn init_logging(level: log::Level, use_syslog: bool) -> io::Result<()> {
    let to_io = |e: &dyn std::fmt::Display| {
        io::Error::new(io::ErrorKind::Other, format!("error on logging initialization: {}", e))
    };
    #[cfg(unix)]
    {
        if use_syslog {
            let app_name = Some(crate_name!());
            syslog::init(syslog::Facility::LOG_USER, level.to_level_filter(), app_name)
                .map_err(|e| to_io(&e))?;
            log_panics::init();
            return Ok(());
        }
    }
    #[cfg(not(unix))]
    let _ = use_syslog;
    simple_logger::init_with_level(level).map_err(|e| to_io(&e))
}

/// Builds the forwarding core around a fresh switch registry
fn build_dispatcher(
    fwd_conf: ForwardingConfig,
    damper_conf: &DamperConfig,
    gateways: &Arc<GatewayStore>,
) -> io::Result<Dispatcher> {
    let switches = Arc::new(SwitchRegistry::new());
    let devices = Arc::new(LocalDevices::new());
    let services = Services {
        switches: switches.clone(),
        devices: devices.clone(),
        topology: Arc::new(LocalTopology::new(switches.clone())),
        routing: Arc::new(LocalRouting),
    };
    let damper = Arc::new(MessageDamper::new(
        damper_conf.capacity,
        damper_conf.timeout,
        &[OfpType::FlowMod],
    ));
    let registry = Arc::new(FlowsetRegistry::new());

    let remove_flows = fwd_conf.remove_flows_on_link_or_port_down;
    let gateway = Arc::new(VirtualGateway::new(gateways.clone(), devices.clone()));
    let forwarding = Arc::new(Forwarding::new(
        fwd_conf,
        services,
        gateways.clone(),
        registry.clone(),
        damper.clone(),
    ));

    let mut dispatcher = Dispatcher::new(switches.clone());
    let listeners: [Arc<dyn PacketInListener>; 3] = [devices, gateway.clone(), forwarding.clone()];
    for listener in &listeners {
        dispatcher
            .packet_in
            .register(listener.clone())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    }
    info!("Packet-in listeners: {:?}", dispatcher.packet_in.names());

    dispatcher.switch_listeners.push(gateway);
    dispatcher.switch_listeners.push(forwarding);
    if remove_flows {
        dispatcher
            .link_listeners
            .push(Arc::new(Reaper::new(registry, switches, damper)));
    }
    Ok(dispatcher)
}

/// Reads command line arguments and calls the corresponding functions.
fn handle_cli_args() -> io::Result<()> {
    #[cfg(unix)]
    let unix_opts =
        "-p, --pid [file] 'Daemonizes the process and writes a PID file'
        -s, --syslog      'Logs via syslog'
        ";
    #[cfg(not(unix))]
    let unix_opts = "";

    let usage = &format!(
        "{}-v...          'Repeat to set the level of verbosity'
        -c, --conf [ini]  'The INI configuration file'
        <csv>             'The CSV file with the virtual gateways'"
    , unix_opts);
    let matches = app_from_crate!().args_from_usage(usage).get_matches();

    let log_lvl = match matches.occurrences_of("v") {
        0 => log::Level::Error,
        1 => log::Level::Warn,
        2 => log::Level::Info,
        3 => log::Level::Debug,
        _ => log::Level::Trace,
    };
    init_logging(log_lvl, matches.is_present("syslog"))?;

    let (conn, forwarding, damper) = match matches.value_of("conf") {
        Some(conf_path) => conf::parse_file(conf_path)?,
        None => Default::default(),
    };

    let csv_path = match matches.value_of("csv") {
        Some(p) => p.to_string(),
        None => return Err(io::Error::new(io::ErrorKind::InvalidInput, "missing CSV file")),
    };
    let csv_parser = CsvParser::new(csv_path);

    #[cfg(unix)] {
        if matches.is_present("pid") {
            let pid = unsafe { libc::fork() };
            if pid < 0 {
                return Err(io::Error::last_os_error());
            } else if pid > 0 {
                // exit the parent process
                exit(0);
            }
            if let Some(pid_path) = matches.value_of("pid") {
                let mut file = File::create(pid_path)?;
                write!(file, "{}", unsafe { libc::getpid() })?;
            }
        }
    }

    // first file read that terminates the program on errors
    let gateways = Arc::new(GatewayStore::with_gateways(csv_parser.parse_file()?));

    let dispatcher = Arc::new(build_dispatcher(forwarding, &damper, &gateways)?);

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || csv_parser.watch_file(&tx));
    let store = gateways.clone();
    thread::spawn(move || {
        for gws in rx {
            info!("Reloading {} gateways", gws.len());
            store.replace(gws);
        }
    });

    let listen_socket = net::TcpListener::bind(conn.socket)?;
    openflow::listen(&listen_socket, &dispatcher)
}

/// Entry function with top level error handling.
fn main() {
    if let Err(e) = handle_cli_args() {
        error!("{}", e);
        exit(1);
    }
}
