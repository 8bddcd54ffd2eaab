/*!
A CSV parser for files with gateway definitions.

# Syntax

The CSV is separated by semicolons.
Empty lines and lines beginning with `#` are ignored.
Whitespaces surrounding the values are ignored.

Each line describes one gateway on one switch, e.g.

```csv
# switch               ;ip           ;network         ;mac              ;forwarding_port;device_port
00:00:08:00:27:1b:a2:7c;192.168.126.1;192.168.126.0/24;08:00:27:1b:a2:7c;5              ;5
```

The network has to be given in IPv4 CIDR suffix notation
and has to contain the gateway IP.
*/

use super::Gateway;

use ipnetwork::{IpNetworkError, Ipv4Network};

use notify;
use notify::{DebouncedEvent, RecursiveMode, Watcher};

use openflow::messages::OFPP_MAX;
use types::{DatapathId, MacAddr};

use std::error;
use std::fmt;
use std::fs::File;
use std::io;
use std::io::prelude::*;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::mpsc;
use std::sync::mpsc::{Receiver, Sender};
use std::time::Duration;

/// The polling frequency
const NOTIFY_SECONDS: u64 = 1;

/// The CSV delimiter.
const DELIMITER: char = ';';

/// The char introducing a line comment.
const COMMENT: char = '#';

const VALUE_COUNT: usize = 6;

/// Represents all errors that can occur while
/// parsing a CSV file with gateway definitions
#[derive(Debug, PartialEq)]
pub enum Error {
    /// A line does not have exactly 6 values
    ValueCount(String),
    /// A line does have an empty value
    EmptyValue(String),
    /// A switch is not given as colon separated hex
    InvalidDatapathId(String),
    /// A gateway IP is not an IPv4 address
    InvalidIp(String),
    /// An invalid CIDR form occured
    InvalidCidr(IpNetworkError, String),
    /// A MAC address is invalid
    InvalidMac(String),
    /// A switch port number is invalid
    InvalidPortNumber(String),
    /// The gateway IP is not part of the gateway network
    IpOutsideNetwork(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::ValueCount(ref s) => {
                write!(f, "The following line does not have exactly 6 values: {}", s)
            }
            Error::EmptyValue(ref s) => write!(f, "The following line has an empty value: {}", s),
            Error::InvalidDatapathId(ref s) => write!(f, "{} is an invalid datapath id.", s),
            Error::InvalidIp(ref s) => write!(f, "{} is an invalid IPv4 address.", s),
            Error::InvalidCidr(ref e, ref s) => write!(f, "{} -- Violating line: {}", e, s),
            Error::InvalidMac(ref s) => write!(f, "{} is an invalid MAC address.", s),
            Error::InvalidPortNumber(ref p) => write!(f, "{} is an invalid switch port number.", p),
            Error::IpOutsideNetwork(ref s) => {
                write!(f, "The following line has a gateway IP outside of its network: {}", s)
            }
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, e)
    }
}

impl error::Error for Error {
    fn description(&self) -> &str {
        "gateway CSV parser error"
    }
}

fn parse_port_number(ps: &str) -> Result<u32, Error> {
    match ps.parse::<u32>() {
        Ok(port) if port != 0 && port <= OFPP_MAX => Ok(port),
        _ => Err(Error::InvalidPortNumber(ps.to_string())),
    }
}

/// The line oriented parser for CSV gateway definitions
pub struct CsvParser {
    path: String,
}

impl CsvParser {
    /// Gets the path of the file that this parser operates on
    pub fn path(&self) -> &str {
        &self.path
    }
    /// Constructs a new `CsvParser`
    pub fn new(path: String) -> CsvParser {
        CsvParser { path }
    }

    /// Parses one CSV line and validates it semantically.
    fn parse_line(&self, line: &str) -> Result<Option<Gateway>, Error> {
        let line = line.trim();
        if line.is_empty() || line.starts_with(COMMENT) {
            return Ok(None);
        }

        let mut csv_elems = vec![];
        for item in line.split(DELIMITER) {
            let trimmed = item.trim();
            if trimmed.is_empty() {
                return Err(Error::EmptyValue(line.to_string()));
            }
            csv_elems.push(trimmed);
        }

        if csv_elems.len() != VALUE_COUNT {
            return Err(Error::ValueCount(line.to_string()));
        }

        let switch = DatapathId::from_str(csv_elems[0])
            .map_err(|_| Error::InvalidDatapathId(csv_elems[0].to_string()))?;
        let ip = Ipv4Addr::from_str(csv_elems[1])
            .map_err(|_| Error::InvalidIp(csv_elems[1].to_string()))?;
        let network = Ipv4Network::from_str(csv_elems[2])
            .map_err(|e| Error::InvalidCidr(e, line.to_string()))?;
        let mac = MacAddr::from_str(csv_elems[3])
            .map_err(|_| Error::InvalidMac(csv_elems[3].to_string()))?;
        let forwarding_port = parse_port_number(csv_elems[4])?;
        let device_port = parse_port_number(csv_elems[5])?;

        if !network.contains(ip) {
            return Err(Error::IpOutsideNetwork(line.to_string()));
        }

        let gw = Gateway::new(switch, ip, network, mac, forwarding_port, device_port);
        debug!("Got {:?}", gw);
        Ok(Some(gw))
    }

    /// Parses a CSV file and returns its gateways
    pub fn parse_file(&self) -> io::Result<Vec<Gateway>> {
        info!("Reading CSV file {}", self.path);

        let file = File::open(&self.path).map_err(|e| {
            io::Error::new(e.kind(), format!("Unable to open `{:?}`: {}", self.path, e))
        })?;
        let reader = io::BufReader::new(file);

        let mut gateways = vec![];
        for line_res in reader.lines() {
            let line = line_res?;
            if let Some(gw) = self.parse_line(&line)? {
                gateways.push(gw);
            }
        }

        Ok(gateways)
    }

    /// Registers a file as notify target.
    /// If the registering fails, the file is tried to be reregistered
    /// until nobody listens for gateways anymore.
    pub fn watch_file(&self, gateway_tx: &Sender<Vec<Gateway>>) {
        loop {
            let (tx, rx) = mpsc::channel();
            if let Ok(mut watcher) = notify::watcher(tx, Duration::from_secs(NOTIFY_SECONDS)) {
                if watcher
                    .watch(&self.path(), RecursiveMode::NonRecursive)
                    .is_ok()
                {
                    info!("Watching file {}", self.path());
                    match self.handle_file_events(&rx, gateway_tx) {
                        Ok(true) => warn!("file watch removed"),
                        Ok(false) => return,
                        Err(e) => error!("{}", e),
                    }
                }
            }
            thread_sleep();
        }
    }

    /// Reads inode events and parses the corresponding file.
    /// Returns `Ok(true)` if the inode is removed, so that it is registered again,
    /// and `Ok(false)` if one side of the communication went away.
    fn handle_file_events(
        &self,
        rx: &Receiver<DebouncedEvent>,
        tx: &Sender<Vec<Gateway>>,
    ) -> notify::Result<bool> {
        loop {
            let event = match rx.recv() {
                Ok(event) => event,
                Err(_) => return Ok(false),
            };
            match event {
                DebouncedEvent::NoticeRemove(_) | DebouncedEvent::Remove(_) => {
                    return Ok(true);
                }
                DebouncedEvent::Error(error, _) => {
                    return Err(error);
                }
                DebouncedEvent::Rescan | DebouncedEvent::NoticeWrite(_) | DebouncedEvent::Chmod(_) => {}
                _ => match self.parse_file() {
                    Ok(gws) => {
                        if tx.send(gws).is_err() {
                            return Ok(false);
                        }
                    }
                    Err(io_err) => {
                        return Err(notify::Error::Io(io_err));
                    }
                },
            }
        }
    }
}

fn thread_sleep() {
    ::std::thread::sleep(Duration::from_secs(NOTIFY_SECONDS));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_parser() -> CsvParser {
        CsvParser::new("".to_string())
    }

    const LINE: &str = "00:00:08:00:27:1b:a2:7c;192.168.126.1;192.168.126.0/24;08:00:27:1b:a2:7c;5;4";

    #[test]
    fn valid_line() {
        let gw = test_parser().parse_line(LINE).unwrap().unwrap();
        assert_eq!(gw.switch(), DatapathId(0x0800_271b_a27c));
        assert_eq!(gw.ip(), Ipv4Addr::new(192, 168, 126, 1));
        assert_eq!(gw.mac(), MacAddr::from_str("08:00:27:1b:a2:7c").unwrap());
        assert_eq!(gw.forwarding_port(), 5);
        assert_eq!(gw.device_port(), 4);
    }

    #[test]
    fn surrounding_whitespace() {
        let line = " 00:00:08:00:27:1b:a2:7c ; 192.168.126.1;192.168.126.0/24 ;08:00:27:1b:a2:7c;5 ; 4 ";
        assert!(test_parser().parse_line(line).unwrap().is_some());
    }

    #[test]
    fn wrong_value_count() {
        let testee = test_parser().parse_line("a");
        assert_eq!(Error::ValueCount("a".to_string()), testee.unwrap_err());
    }

    #[test]
    fn empty_value() {
        let testee = test_parser().parse_line("a;b;c;d;e;");
        let expected = Error::EmptyValue("a;b;c;d;e;".to_string());
        assert_eq!(expected, testee.unwrap_err());
    }

    #[test]
    fn invalid_datapath_id() {
        let line = "zz;192.168.126.1;192.168.126.0/24;08:00:27:1b:a2:7c;5;4";
        let expected = Error::InvalidDatapathId("zz".to_string());
        assert_eq!(expected, test_parser().parse_line(line).unwrap_err());
    }

    #[test]
    fn invalid_cidr() {
        let line = "00:00:08:00:27:1b:a2:7c;192.168.126.1;192.168.126.0/50;08:00:27:1b:a2:7c;5;4";
        let expected = Error::InvalidCidr(IpNetworkError::InvalidPrefix, line.to_string());
        assert_eq!(expected, test_parser().parse_line(line).unwrap_err());
    }

    #[test]
    fn port_zero() {
        let line = "00:00:08:00:27:1b:a2:7c;192.168.126.1;192.168.126.0/24;08:00:27:1b:a2:7c;0;4";
        let expected = Error::InvalidPortNumber("0".to_string());
        assert_eq!(expected, test_parser().parse_line(line).unwrap_err());
    }

    #[test]
    fn ip_outside_network() {
        let line = "00:00:08:00:27:1b:a2:7c;10.0.0.1;192.168.126.0/24;08:00:27:1b:a2:7c;5;4";
        let expected = Error::IpOutsideNetwork(line.to_string());
        assert_eq!(expected, test_parser().parse_line(line).unwrap_err());
    }

    #[test]
    fn comment() {
        assert!(test_parser().parse_line("# comment").unwrap().is_none());
    }

    #[test]
    fn empty() {
        assert!(test_parser().parse_line("").unwrap().is_none());
    }
}
