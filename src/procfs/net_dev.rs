//! This module contains a sampling parser for /proc/net/dev
//!
//! The file starts with a two-line table header, followed by one line per
//! network interface:
//!
//! ```text
//! Inter-|   Receive                                                |  Transmit
//!  face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
//!     lo: 14098911    1120    0    0    0     0          0         0 14098911    1120    0    0    0     0       0          0
//! ```
//!
//! The interface name is followed by 8 receive counters and 8 transmit
//! counters, all monotonic. Large counters may eat up the space after the
//! colon ("eth0:1234567"), which the delimiter set takes care of.

use crate::clock::ClockTicks;
use crate::delta::{counter_delta, elapsed, match_entities, DeltaComputer,
                   Ratio};
use crate::error::{Error, Partial};
use crate::parser::PseudoFileParser;
use crate::snapshot::Snapshot;
use crate::splitter::{Delimiters, SplitLines};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use super::parse_counters;


/// Number of header lines at the top of /proc/net/dev
const HEADER_LINES: usize = 2;


/// Parser for /proc/net/dev
#[derive(Debug, Default)]
pub struct NetDevParser {
    /// Number of interfaces in the last parsed sample
    interfaces: usize,
}
//
impl PseudoFileParser for NetDevParser {
    type Data = NetDev;

    const PATH: &'static str = "net/dev";

    fn parse(&mut self, contents: &[u8], errors: &mut Vec<Error>) -> NetDev {
        let mut net_dev = NetDev {
            interfaces: Vec::with_capacity(self.interfaces),
        };
        for line in SplitLines::new(contents, Delimiters::NET_DEV)
                               .skip_while(|line| line.number() < HEADER_LINES)
        {
            let mut columns = line.columns();
            let name = match columns.next() {
                Some(name) => name.to_owned_string(),
                None => continue,
            };
            let mut interface = NetInterface { name, ..Default::default() };
            parse_counters(&interface.name, &mut columns, &mut [
                ("rx_bytes", &mut interface.received.bytes),
                ("rx_packets", &mut interface.received.packets),
                ("rx_errors", &mut interface.received.errors),
                ("rx_drops", &mut interface.received.drops),
                ("rx_fifo", &mut interface.received.fifo),
                ("rx_frame", &mut interface.received.frame),
                ("rx_compressed", &mut interface.received.compressed),
                ("rx_multicast", &mut interface.received.multicast),
                ("tx_bytes", &mut interface.transmitted.bytes),
                ("tx_packets", &mut interface.transmitted.packets),
                ("tx_errors", &mut interface.transmitted.errors),
                ("tx_drops", &mut interface.transmitted.drops),
                ("tx_fifo", &mut interface.transmitted.fifo),
                ("tx_collisions", &mut interface.transmitted.collisions),
                ("tx_carrier", &mut interface.transmitted.carrier),
                ("tx_compressed", &mut interface.transmitted.compressed),
            ], errors);
            net_dev.interfaces.push(interface);
        }
        self.interfaces = net_dev.interfaces.len();
        net_dev
    }
}


/// Contents of /proc/net/dev
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetDev {
    /// Network interfaces, in file order
    pub interfaces: Vec<NetInterface>,
}
//
impl NetDev {
    /// Look up an interface by name
    pub fn interface(&self, name: &str) -> Option<&NetInterface> {
        self.interfaces.iter().find(|interface| interface.name == name)
    }
}


/// Traffic statistics of one network interface
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetInterface {
    /// Interface name
    pub name: String,

    /// Receive-side counters
    pub received: ReceiveCounters,

    /// Transmit-side counters
    pub transmitted: TransmitCounters,
}


/// Receive-side counters of a network interface
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveCounters {
    /// Bytes received
    pub bytes: u64,

    /// Packets received
    pub packets: u64,

    /// Receive errors detected by the driver
    pub errors: u64,

    /// Packets dropped
    pub drops: u64,

    /// FIFO buffer errors
    pub fifo: u64,

    /// Packet framing errors
    pub frame: u64,

    /// Compressed packets received
    pub compressed: u64,

    /// Multicast frames received
    pub multicast: u64,
}
//
impl ReceiveCounters {
    fn delta(interface: &str, prior: &Self, current: &Self)
        -> Result<Self, Error>
    {
        let delta = |counter: &str, old, new| {
            counter_delta(&format!("{}.rx_{}", interface, counter), old, new)
        };
        Ok(Self {
            bytes: delta("bytes", prior.bytes, current.bytes)?,
            packets: delta("packets", prior.packets, current.packets)?,
            errors: delta("errors", prior.errors, current.errors)?,
            drops: delta("drops", prior.drops, current.drops)?,
            fifo: delta("fifo", prior.fifo, current.fifo)?,
            frame: delta("frame", prior.frame, current.frame)?,
            compressed: delta("compressed", prior.compressed,
                              current.compressed)?,
            multicast: delta("multicast", prior.multicast,
                             current.multicast)?,
        })
    }
}


/// Transmit-side counters of a network interface
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmitCounters {
    /// Bytes transmitted
    pub bytes: u64,

    /// Packets transmitted
    pub packets: u64,

    /// Transmit errors detected by the driver
    pub errors: u64,

    /// Packets dropped
    pub drops: u64,

    /// FIFO buffer errors
    pub fifo: u64,

    /// Collisions detected on the interface
    pub collisions: u64,

    /// Carrier losses detected by the driver
    pub carrier: u64,

    /// Compressed packets transmitted
    pub compressed: u64,
}
//
impl TransmitCounters {
    fn delta(interface: &str, prior: &Self, current: &Self)
        -> Result<Self, Error>
    {
        let delta = |counter: &str, old, new| {
            counter_delta(&format!("{}.tx_{}", interface, counter), old, new)
        };
        Ok(Self {
            bytes: delta("bytes", prior.bytes, current.bytes)?,
            packets: delta("packets", prior.packets, current.packets)?,
            errors: delta("errors", prior.errors, current.errors)?,
            drops: delta("drops", prior.drops, current.drops)?,
            fifo: delta("fifo", prior.fifo, current.fifo)?,
            collisions: delta("collisions", prior.collisions,
                              current.collisions)?,
            carrier: delta("carrier", prior.carrier, current.carrier)?,
            compressed: delta("compressed", prior.compressed,
                              current.compressed)?,
        })
    }
}


impl DeltaComputer for NetDev {
    type Delta = NetDevDelta;

    fn delta(prior: &Snapshot<Self>,
             current: &Snapshot<Self>,
             _clock: ClockTicks) -> Result<Partial<NetDevDelta>, Error> {
        let time_delta = elapsed(prior, current)?;
        let mut errors = Vec::new();
        let interfaces = match_entities(&prior.interfaces,
                                        &current.interfaces,
                                        &mut errors,
                                        |old, new| {
            InterfaceUsage::new(old, new, time_delta)
        })?;
        Ok(Partial::with_errors(NetDevDelta { time_delta, interfaces },
                                errors))
    }
}


/// Network activity between two snapshots of /proc/net/dev
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetDevDelta {
    /// Time elapsed between the two snapshots
    pub time_delta: Duration,

    /// Activity of each interface that is present in both snapshots
    pub interfaces: Vec<InterfaceUsage>,
}


/// Activity of one network interface between two snapshots
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterfaceUsage {
    /// Interface name
    pub name: String,

    /// What was received
    pub received: ReceiveCounters,

    /// What was transmitted
    pub transmitted: TransmitCounters,

    /// Bytes received per second
    pub rx_byte_rate: Ratio,

    /// Packets received per second
    pub rx_packet_rate: Ratio,

    /// Bytes transmitted per second
    pub tx_byte_rate: Ratio,

    /// Packets transmitted per second
    pub tx_packet_rate: Ratio,
}
//
impl InterfaceUsage {
    /// Compare two readouts of the same interface, taken `elapsed` apart.
    /// Return None if the interfaces differ.
    fn new(prior: &NetInterface, current: &NetInterface, elapsed: Duration)
        -> Result<Option<Self>, Error>
    {
        if prior.name != current.name { return Ok(None); }
        let received = ReceiveCounters::delta(&current.name, &prior.received,
                                              &current.received)?;
        let transmitted = TransmitCounters::delta(&current.name,
                                                  &prior.transmitted,
                                                  &current.transmitted)?;
        Ok(Some(Self {
            name: current.name.clone(),
            rx_byte_rate: Ratio::rate(received.bytes, elapsed),
            rx_packet_rate: Ratio::rate(received.packets, elapsed),
            tx_byte_rate: Ratio::rate(transmitted.bytes, elapsed),
            tx_packet_rate: Ratio::rate(transmitted.packets, elapsed),
            received,
            transmitted,
        }))
    }
}


/// Unit tests
#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use crate::clock::ClockTicks;
    use crate::delta::{DeltaComputer, Ratio};
    use crate::error::{Error, ParseCause};
    use crate::parser::PseudoFileParser;
    use crate::snapshot::Snapshot;
    use std::time::Duration;
    use super::{NetDev, NetDevParser};

    /// Table header of /proc/net/dev
    const HEADER: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
";

    /// INTERNAL: Parse some /proc/net/dev records, adding the header
    fn parse(records: &str) -> (NetDev, Vec<Error>) {
        let contents = format!("{}{}", HEADER, records);
        let mut errors = Vec::new();
        let net_dev = NetDevParser::default().parse(contents.as_bytes(),
                                                    &mut errors);
        (net_dev, errors)
    }

    /// INTERNAL: Snapshot of some /proc/net/dev records at some time
    fn snapshot(records: &str, secs: i64) -> Snapshot<NetDev> {
        let (net_dev, errors) = parse(records);
        assert!(errors.is_empty(), "Unexpected errors {:?}", errors);
        Snapshot::new(Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
                      net_dev)
    }

    /// Check that interfaces are parsed correctly
    #[test]
    fn parse_interfaces() {
        let (net_dev, errors) = parse("\
    lo: 14098911    1120    0    0    0     0          0         0 14098911    1120    0    0    0     0       0          0
  eth0:123456789012 2 3 4 5 6 7 8 9 10 11 12 13 14 15 16
");
        assert!(errors.is_empty());
        assert_eq!(net_dev.interfaces.len(), 2);

        let lo = net_dev.interface("lo").unwrap();
        assert_eq!(lo.received.bytes, 14098911);
        assert_eq!(lo.transmitted.packets, 1120);

        let eth0 = net_dev.interface("eth0").unwrap();
        assert_eq!(eth0.received.bytes, 123456789012);
        assert_eq!(eth0.received.multicast, 8);
        assert_eq!(eth0.transmitted.bytes, 9);
        assert_eq!(eth0.transmitted.collisions, 14);
        assert_eq!(eth0.transmitted.compressed, 16);
    }

    /// Check that an empty table (no interface) is fine
    #[test]
    fn no_interfaces() {
        let (net_dev, errors) = parse("");
        assert!(errors.is_empty());
        assert!(net_dev.interfaces.is_empty());
    }

    /// Check that broken records are reported
    #[test]
    fn malformed_records() {
        let (net_dev, errors) = parse("eth0: 1 2 abc 4 5 6 7 8 9 10 11 12 13 \
                                       14 15 16\nwlan0: 1 2 3\n");
        assert_eq!(net_dev.interfaces.len(), 2);
        assert_eq!(net_dev.interfaces[0].received.errors, 0);
        assert_eq!(net_dev.interfaces[0].transmitted.compressed, 16);
        assert_eq!(net_dev.interfaces[1].received.errors, 3);
        match &errors[..] {
            [Error::Parse { field: broken, .. },
             Error::Parse { field: truncated,
                            cause: ParseCause::MissingField }] => {
                assert_eq!(broken, "eth0.rx_errors");
                assert_eq!(truncated, "wlan0.rx_drops");
            },
            other => panic!("Unexpected errors {:?}", other),
        }
    }

    /// Check that network activity is measured correctly
    #[test]
    fn interface_activity() {
        let prior = snapshot("eth0: 1000 10 0 0 0 0 0 0 500 5 0 0 0 0 0 0\n", 0);
        let current = snapshot("eth0: 5000 30 1 0 0 0 0 0 2500 9 0 0 0 1 0 0\n",
                               4);
        let delta = NetDev::delta(&prior, &current, ClockTicks::from_hz(100))
                           .unwrap()
                           .into_result()
                           .unwrap();
        assert_eq!(delta.time_delta, Duration::from_secs(4));
        let eth0 = &delta.interfaces[0];
        assert_eq!(eth0.received.bytes, 4000);
        assert_eq!(eth0.received.errors, 1);
        assert_eq!(eth0.transmitted.collisions, 1);
        assert_eq!(eth0.rx_byte_rate, Ratio::Value(1000.0));
        assert_eq!(eth0.rx_packet_rate, Ratio::Value(5.0));
        assert_eq!(eth0.tx_byte_rate, Ratio::Value(500.0));
        assert_eq!(eth0.tx_packet_rate, Ratio::Value(1.0));

        // Comparing a snapshot with itself yields no rate
        let same = NetDev::delta(&current, &current, ClockTicks::from_hz(100))
                          .unwrap()
                          .value;
        assert_eq!(same.time_delta, Duration::ZERO);
        assert!(same.interfaces[0].rx_byte_rate.is_indeterminate());
        assert!(same.interfaces[0].tx_packet_rate.is_indeterminate());
    }

    /// Check that interface set changes are detected and handled
    #[test]
    fn interface_changes() {
        let clock = ClockTicks::from_hz(100);
        let prior = snapshot("lo: 1 1 0 0 0 0 0 0 1 1 0 0 0 0 0 0\n\
                              eth0: 1 1 0 0 0 0 0 0 1 1 0 0 0 0 0 0\n", 0);
        let renamed = snapshot("lo: 2 2 0 0 0 0 0 0 2 2 0 0 0 0 0 0\n\
                                eth1: 2 2 0 0 0 0 0 0 2 2 0 0 0 0 0 0\n", 1);
        let delta = NetDev::delta(&prior, &renamed, clock).unwrap();
        assert_eq!(delta.value.interfaces.len(), 1);
        assert_eq!(delta.value.interfaces[0].name, "lo");
        assert!(matches!(delta.errors[..],
                         [Error::EntitySetChanged { prior: 2, current: 2 }]));

        // Counter resets (e.g. driver reload) are rejected
        let reset = snapshot("lo: 1 1 0 0 0 0 0 0 1 1 0 0 0 0 0 0\n\
                              eth1: 2 2 0 0 0 0 0 0 2 2 0 0 0 0 0 0\n", 2);
        match NetDev::delta(&renamed, &reset, clock) {
            Err(Error::CounterRegression { field, prior, current }) => {
                assert_eq!((field.as_str(), prior, current),
                           ("lo.rx_bytes", 2, 1));
            },
            other => panic!("Unexpected outcome {:?}", other),
        }
    }
}
