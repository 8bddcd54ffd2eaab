/*!
A parser for an INI file with the following structure:

```ini
[Connection]
uri=tcp:0.0.0.0:6653

[Forwarding]
hard-timeout=0
idle-timeout=5
table-id=0
priority=1
set-send-flow-rem-flag=false
match=in-port,vlan,mac,ip,transport,flag
detailed-match=src-mac,dst-mac,src-ip,dst-ip,src-transport,dst-transport
flood-arp=no
remove-flows-on-link-or-port-down=true

[Damper]
capacity=10000
timeout-ms=250
```

Every section is optional. Invalid forwarding values are reported
and leave the default in place.
*/

use forwarding::ForwardingConfig;
use matcher::MatchingConfig;
use openflow::messages::OFP_TCP_PORT;

use ini::Ini;
use ini::ini;

use std::error;
use std::fmt;
use std::io;
use std::net::*;
use std::num::ParseIntError;
use std::str::FromStr;
use std::time::Duration;

const CONN_SECTION: &str = "Connection";
const URI_KEY: &str = "uri";

const FWD_SECTION: &str = "Forwarding";
const HARD_TIMEOUT_KEY: &str = "hard-timeout";
const IDLE_TIMEOUT_KEY: &str = "idle-timeout";
const TABLE_ID_KEY: &str = "table-id";
const PRIORITY_KEY: &str = "priority";
const FLOW_REM_KEY: &str = "set-send-flow-rem-flag";
const MATCH_KEY: &str = "match";
const DETAILED_MATCH_KEY: &str = "detailed-match";
const FLOOD_ARP_KEY: &str = "flood-arp";
const REMOVE_FLOWS_KEY: &str = "remove-flows-on-link-or-port-down";

const DAMPER_SECTION: &str = "Damper";
const CAPACITY_KEY: &str = "capacity";
const TIMEOUT_KEY: &str = "timeout-ms";

/// Words that switch ARP flooding on
const AFFIRMATIVE: [&str; 5] = ["yes", "yep", "true", "ja", "stimmt"];

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    Ini(ini::Error),
    ParseDamper(&'static str, ParseIntError),
    InvalidUri,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref e) => write!(f, "{}", e),
            Error::Ini(ref e) => write!(f, "{}", e),
            Error::ParseDamper(k, ref e) => {
                write!(f, "Error on trying to parse the damper's '{}': {}", k, e)
            }
            Error::InvalidUri => write!(f, "The OpenFlow Connection URI from INI file is invalid"),
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        match e {
            Error::Io(ioe) => ioe,
            _ => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}
impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl error::Error for Error {
    fn description(&self) -> &str {
        "INI configuration parser error"
    }
}

trait Section {
    type S;

    fn from_ini(conf: &Ini) -> Result<Self::S, Error>;
}

/// The socket the controller listens on for switches
#[derive(Debug, PartialEq)]
pub struct OfConnection {
    pub socket: SocketAddr,
}

impl Section for OfConnection {
    type S = OfConnection;

    fn from_ini(conf: &Ini) -> Result<Self::S, Error> {
        debug!("Reading [{}] section", CONN_SECTION);

        match conf.section(Some(CONN_SECTION.to_owned())).and_then(|s| s.get(URI_KEY)) {
            Some(uri) => OfConnection::from_str(uri),
            _ => Ok(OfConnection::default()),
        }
    }
}

impl FromStr for OfConnection {
    type Err = Error;

    fn from_str(conn: &str) -> Result<OfConnection, Self::Err> {
        let def_port = OFP_TCP_PORT.to_string();
        let mut conn_split: Vec<_> = conn.split(':').collect();
        if conn_split.len() == 2 {
            conn_split.push(&def_port);
        }
        if conn_split.len() == 3 && conn_split[0] == "tcp" {
            let joined = &format!("{}:{}", conn_split[1], conn_split[2]);
            if let Ok(socket) = SocketAddr::from_str(joined) {
                let connection = OfConnection { socket };
                debug!("Got {:?}", connection);
                return Ok(connection);
            }
        }
        Err(Error::InvalidUri)
    }
}

impl Default for OfConnection {
    fn default() -> Self {
        let socket_v4 = SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), OFP_TCP_PORT);
        OfConnection {
            socket: SocketAddr::V4(socket_v4),
        }
    }
}

/// Parses decimal or 0x prefixed hexadecimal numbers
fn parse_int(value: &str) -> Result<u64, ParseIntError> {
    let value = value.trim();
    if value.starts_with("0x") || value.starts_with("0X") {
        u64::from_str_radix(&value[2..], 16)
    }
    else {
        value.parse()
    }
}

/// Reads an integer key that fits into `max`, warning on invalid values
fn int_value(section: &ini::Properties, key: &str, max: u64) -> Option<u64> {
    let value = section.get(key)?;
    match parse_int(value) {
        Ok(v) if v <= max => Some(v),
        Ok(v) => {
            warn!("[{}] {}={} is out of range, keeping the default", FWD_SECTION, key, v);
            None
        }
        Err(e) => {
            warn!("[{}] {}={} is invalid ({}), keeping the default", FWD_SECTION, key, value, e);
            None
        }
    }
}

fn bool_value(section: &ini::Properties, key: &str) -> Option<bool> {
    section.get(key).map(|v| v.trim().eq_ignore_ascii_case("true"))
}

fn tokens(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Applies `match` and `detailed-match`.
/// A list without any known token leaves the toggles untouched.
fn apply_matching(section: &ini::Properties, matching: &mut MatchingConfig) {
    if let Some(value) = section.get(MATCH_KEY) {
        let t = tokens(value);
        let has = |name: &str| t.iter().any(|x| x == name);
        let known = ["in-port", "vlan", "mac", "ip", "transport", "flag"];
        if known.iter().any(|k| has(*k)) {
            matching.in_port = has("in-port");
            matching.vlan = has("vlan");
            matching.mac = has("mac");
            matching.ip = has("ip");
            matching.transport = has("transport");
            matching.tcp_flag = has("flag");
        }
        else {
            warn!("[{}] {}={} names no field, keeping the default", FWD_SECTION, MATCH_KEY, value);
        }
    }
    if let Some(value) = section.get(DETAILED_MATCH_KEY) {
        let t = tokens(value);
        let has = |name: &str| t.iter().any(|x| x == name);
        let known = ["src-mac", "dst-mac", "src-ip", "dst-ip", "src-transport", "dst-transport"];
        if known.iter().any(|k| has(*k)) {
            matching.mac_src = has("src-mac");
            matching.mac_dst = has("dst-mac");
            matching.ip_src = has("src-ip");
            matching.ip_dst = has("dst-ip");
            matching.transport_src = has("src-transport");
            matching.transport_dst = has("dst-transport");
        }
        else {
            warn!(
                "[{}] {}={} names no field, keeping the default",
                FWD_SECTION, DETAILED_MATCH_KEY, value
            );
        }
    }
}

impl Section for ForwardingConfig {
    type S = ForwardingConfig;

    fn from_ini(conf: &Ini) -> Result<Self::S, Error> {
        debug!("Reading [{}] section", FWD_SECTION);

        let mut config = ForwardingConfig::default();
        let section = match conf.section(Some(FWD_SECTION.to_owned())) {
            Some(s) => s,
            None => return Ok(config),
        };

        if let Some(v) = int_value(section, HARD_TIMEOUT_KEY, u64::from(u16::max_value())) {
            config.hard_timeout = v as u16;
        }
        if let Some(v) = int_value(section, IDLE_TIMEOUT_KEY, u64::from(u16::max_value())) {
            config.idle_timeout = v as u16;
        }
        if let Some(v) = int_value(section, TABLE_ID_KEY, u64::from(u8::max_value())) {
            config.table_id = v as u8;
        }
        match int_value(section, PRIORITY_KEY, u64::from(u16::max_value())) {
            Some(0) => warn!(
                "[{}] {}=0 is reserved for the table-miss flow, keeping the default",
                FWD_SECTION, PRIORITY_KEY
            ),
            Some(v) => config.priority = v as u16,
            None => {}
        }
        if let Some(b) = bool_value(section, FLOW_REM_KEY) {
            config.send_flow_rem = b;
        }
        apply_matching(section, &mut config.matching);
        if let Some(v) = section.get(FLOOD_ARP_KEY) {
            let v = v.to_lowercase();
            config.flood_arp = AFFIRMATIVE.iter().any(|w| v.contains(w));
        }
        if let Some(b) = bool_value(section, REMOVE_FLOWS_KEY) {
            config.remove_flows_on_link_or_port_down = b;
        }

        info!("Using {:?}", config);
        Ok(config)
    }
}

/// Sizing of the flow-mod damper
#[derive(Debug, Clone, PartialEq)]
pub struct DamperConfig {
    pub capacity: usize,
    pub timeout: Duration,
}

impl Default for DamperConfig {
    fn default() -> Self {
        DamperConfig {
            capacity: 10_000,
            timeout: Duration::from_millis(250),
        }
    }
}

impl Section for DamperConfig {
    type S = DamperConfig;

    fn from_ini(conf: &Ini) -> Result<Self::S, Error> {
        debug!("Reading [{}] section", DAMPER_SECTION);

        let mut config = DamperConfig::default();
        if let Some(section) = conf.section(Some(DAMPER_SECTION.to_owned())) {
            if let Some(v) = section.get(CAPACITY_KEY) {
                config.capacity =
                    parse_int(v).map_err(|e| Error::ParseDamper(CAPACITY_KEY, e))? as usize;
            }
            if let Some(v) = section.get(TIMEOUT_KEY) {
                let ms = parse_int(v).map_err(|e| Error::ParseDamper(TIMEOUT_KEY, e))?;
                config.timeout = Duration::from_millis(ms);
            }
        }

        debug!("Got {:?}", config);
        Ok(config)
    }
}

fn parse_ini(conf: &Ini) -> Result<(OfConnection, ForwardingConfig, DamperConfig), Error> {
    Ok((
        OfConnection::from_ini(conf)?,
        ForwardingConfig::from_ini(conf)?,
        DamperConfig::from_ini(conf)?,
    ))
}

pub fn parse_file(path: &str) -> Result<(OfConnection, ForwardingConfig, DamperConfig), Error> {
    info!("Reading INI file {}", path);

    let conf = match Ini::load_from_file(path) {
        Ok(i) => i,
        Err(e) => {
            return Err(Error::Ini(e));
        }
    };
    parse_ini(&conf)
}
