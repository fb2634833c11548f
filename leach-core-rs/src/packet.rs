//! Wire format for every frame type
//!
//! All integers are little-endian, addresses are [`ADDR_LEN`] raw bytes.
//! The first byte is always the type tag.
//!
//! ```text
//! HELLO        tag (1) || src_master (8) || hop_count (1) || sequence (2)
//! REPORT       tag (1) || src (8) || no_entries (1) || no_entries x entry (21)
//!   entry      dest (8) || next_hop (8) || hop_count (1) || metric (2) || sequence (2)
//! SENSOR_DATA  tag (1) || source (8) || battery_mv (4) || temperature (4)
//!              || light_lux (4) || distance (4)
//! ADVERTISE    tag (1) || dest (8) || assigned_head (8) || next_hop (8)
//!              || hop_count (1) || sequence (1) || route_len (1)
//!              || route_len x relay (8)
//! HEARTBEAT    tag (1) || src (8) || dest (8)
//! NEW_NODE     tag (1) || src (8)
//! ```
//!
//! Lengths are checked against the tag before any field is read.

use heapless::Vec;

use crate::routing::RoutingEntry;
use crate::types::*;

// ============================================================================
// Frame Types
// ============================================================================

/// Type tag carried in the first payload byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Master discovery flood
    Hello = 0x01,
    /// Routing table snapshot toward the master
    Report = 0x02,
    /// Averaged sensor readings
    SensorData = 0x03,
    /// Head and uplink assignment
    Advertise = 0x04,
    /// Member liveness
    Heartbeat = 0x05,
    /// Join announcement
    NewNode = 0x06,
}

impl TryFrom<u8> for FrameType {
    type Error = Error;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            0x01 => Ok(Self::Hello),
            0x02 => Ok(Self::Report),
            0x03 => Ok(Self::SensorData),
            0x04 => Ok(Self::Advertise),
            0x05 => Ok(Self::Heartbeat),
            0x06 => Ok(Self::NewNode),
            other => Err(Error::UnknownType(other)),
        }
    }
}

/// Encoded HELLO length
pub const HELLO_LEN: usize = 1 + ADDR_LEN + 1 + 2;
/// REPORT header length (tag, src, count)
pub const REPORT_HEADER_LEN: usize = 1 + ADDR_LEN + 1;
/// Encoded routing entry length inside a REPORT
pub const REPORT_ENTRY_LEN: usize = 2 * ADDR_LEN + 1 + 2 + 2;
/// Encoded SENSOR_DATA length
pub const SENSOR_DATA_LEN: usize = 1 + ADDR_LEN + 4 * 4;
/// ADVERTISE length without relays
pub const ADVERTISE_HEADER_LEN: usize = 1 + 3 * ADDR_LEN + 1 + 1 + 1;
/// Encoded HEARTBEAT length
pub const HEARTBEAT_LEN: usize = 1 + 2 * ADDR_LEN;
/// Encoded NEW_NODE length
pub const NEW_NODE_LEN: usize = 1 + ADDR_LEN;
/// Largest frame on the air (full REPORT)
pub const MAX_FRAME_LEN: usize = REPORT_HEADER_LEN + MAX_NODES * REPORT_ENTRY_LEN;

/// Length a frame must have, given its bytes
pub fn expected_len(bytes: &[u8]) -> Result<usize> {
    let Some(&tag) = bytes.first() else {
        return Err(Error::Malformed { expected: 1, actual: 0 });
    };
    let expected = match FrameType::try_from(tag)? {
        FrameType::Hello => HELLO_LEN,
        FrameType::SensorData => SENSOR_DATA_LEN,
        FrameType::Advertise => {
            let Some(&count) = bytes.get(ADVERTISE_HEADER_LEN - 1) else {
                return Err(Error::Malformed {
                    expected: ADVERTISE_HEADER_LEN,
                    actual: bytes.len(),
                });
            };
            if count as usize > MAX_ROUTE_LEN {
                return Err(Error::Malformed {
                    expected: ADVERTISE_HEADER_LEN + MAX_ROUTE_LEN * ADDR_LEN,
                    actual: bytes.len(),
                });
            }
            ADVERTISE_HEADER_LEN + count as usize * ADDR_LEN
        }
        FrameType::Heartbeat => HEARTBEAT_LEN,
        FrameType::NewNode => NEW_NODE_LEN,
        FrameType::Report => {
            let Some(&count) = bytes.get(REPORT_HEADER_LEN - 1) else {
                return Err(Error::Malformed {
                    expected: REPORT_HEADER_LEN,
                    actual: bytes.len(),
                });
            };
            if count as usize > MAX_NODES {
                return Err(Error::Malformed {
                    expected: REPORT_HEADER_LEN + MAX_NODES * REPORT_ENTRY_LEN,
                    actual: bytes.len(),
                });
            }
            REPORT_HEADER_LEN + count as usize * REPORT_ENTRY_LEN
        }
    };
    Ok(expected)
}

// ============================================================================
// Reader / Writer
// ============================================================================

/// Cursor over a received payload
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Create a reader over a byte slice
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not yet consumed
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if self.pos + len > self.buf.len() {
            return Err(Error::Malformed {
                expected: self.pos + len,
                actual: self.buf.len(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Read one byte
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Read a little-endian u16
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian i16
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    /// Read a little-endian i32
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// Read a node address
    pub fn read_addr(&mut self) -> Result<NodeAddress> {
        Ok(NodeAddress(self.read_array()?))
    }
}

/// Growable output buffer
#[derive(Default)]
pub struct Writer {
    buf: std::vec::Vec<u8>,
}

impl Writer {
    /// Create an empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Write one byte
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Write a little-endian u16
    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a little-endian i16
    pub fn write_i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a little-endian i32
    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a node address
    pub fn write_addr(&mut self, addr: &NodeAddress) {
        self.buf.extend_from_slice(addr.as_bytes());
    }

    /// Consume the writer
    pub fn finish(self) -> std::vec::Vec<u8> {
        self.buf
    }
}

// ============================================================================
// Frame Bodies
// ============================================================================

/// Body codec shared by every frame type
pub trait Wire: Sized {
    /// Tag written before the body
    const TYPE: FrameType;

    /// Encode the body (tag excluded)
    fn encode_body(&self, w: &mut Writer);

    /// Decode the body (tag already consumed)
    fn decode_body(r: &mut Reader<'_>) -> Result<Self>;

    /// Tag plus body
    fn to_bytes(&self) -> std::vec::Vec<u8> {
        let mut w = Writer::new();
        w.write_u8(Self::TYPE as u8);
        self.encode_body(&mut w);
        w.finish()
    }
}

/// Master discovery flood
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hello {
    /// Originating master
    pub src_master: NodeAddress,
    /// Hops travelled so far
    pub hop_count: u8,
    /// Round sequence
    pub sequence: Sequence,
}

impl Wire for Hello {
    const TYPE: FrameType = FrameType::Hello;

    fn encode_body(&self, w: &mut Writer) {
        w.write_addr(&self.src_master);
        w.write_u8(self.hop_count);
        w.write_u16(self.sequence);
    }

    fn decode_body(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            src_master: r.read_addr()?,
            hop_count: r.read_u8()?,
            sequence: r.read_u16()?,
        })
    }
}

/// Routing table snapshot sent toward the master
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Node whose table this is
    pub src: NodeAddress,
    /// Table rows
    pub entries: Vec<RoutingEntry, MAX_NODES>,
}

impl Report {
    /// Newest sequence among the rows
    pub fn sequence(&self) -> Sequence {
        self.entries.iter().map(|e| e.sequence).max().unwrap_or(0)
    }

    /// Row for `dest`
    pub fn entry(&self, dest: &NodeAddress) -> Option<&RoutingEntry> {
        self.entries.iter().find(|e| e.dest == *dest)
    }
}

impl Wire for Report {
    const TYPE: FrameType = FrameType::Report;

    fn encode_body(&self, w: &mut Writer) {
        w.write_addr(&self.src);
        w.write_u8(self.entries.len() as u8);
        for e in self.entries.iter() {
            w.write_addr(&e.dest);
            w.write_addr(&e.next_hop);
            w.write_u8(e.hop_count);
            w.write_i16(e.metric);
            w.write_u16(e.sequence);
        }
    }

    fn decode_body(r: &mut Reader<'_>) -> Result<Self> {
        let src = r.read_addr()?;
        let count = r.read_u8()? as usize;
        let mut entries = Vec::new();
        for _ in 0..count {
            let entry = RoutingEntry::new(
                r.read_addr()?,
                r.read_addr()?,
                r.read_u8()?,
                r.read_i16()?,
                r.read_u16()?,
            );
            entries.push(entry).map_err(|_| Error::Malformed {
                expected: REPORT_HEADER_LEN + MAX_NODES * REPORT_ENTRY_LEN,
                actual: REPORT_HEADER_LEN + count * REPORT_ENTRY_LEN,
            })?;
        }
        Ok(Self { src, entries })
    }
}

/// Averaged sensor readings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorData {
    /// Measuring node
    pub source: NodeAddress,
    /// Battery voltage (mV)
    pub battery_mv: i32,
    /// Temperature (degrees C)
    pub temperature: i32,
    /// Illuminance (lux)
    pub light_lux: i32,
    /// Distance (cm)
    pub distance: i32,
}

impl Wire for SensorData {
    const TYPE: FrameType = FrameType::SensorData;

    fn encode_body(&self, w: &mut Writer) {
        w.write_addr(&self.source);
        w.write_i32(self.battery_mv);
        w.write_i32(self.temperature);
        w.write_i32(self.light_lux);
        w.write_i32(self.distance);
    }

    fn decode_body(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            source: r.read_addr()?,
            battery_mv: r.read_i32()?,
            temperature: r.read_i32()?,
            light_lux: r.read_i32()?,
            distance: r.read_i32()?,
        })
    }
}

/// Head and uplink assignment for one node
///
/// Travels source-routed: `route` lists the relays from the master's
/// neighbour down to the destination's uplink, and each relay hands the
/// frame to the entry after its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertise {
    /// Node being told its role
    pub dest: NodeAddress,
    /// Its cluster head (itself when elected)
    pub assigned_head: NodeAddress,
    /// Uplink the destination installs toward the master
    pub next_hop: NodeAddress,
    /// Destination's hops from the master
    pub hop_count: u8,
    /// Election epoch
    pub sequence: u8,
    /// Relays between the master and `dest`, master side first
    pub route: Vec<NodeAddress, MAX_ROUTE_LEN>,
}

impl Advertise {
    /// Address this frame goes to after `relay`
    ///
    /// `None` when `relay` is not on the route.
    pub fn after(&self, relay: &NodeAddress) -> Option<NodeAddress> {
        let pos = self.route.iter().position(|r| r == relay)?;
        Some(self.route.get(pos + 1).copied().unwrap_or(self.dest))
    }

    /// First address the master sends to
    pub fn first_hop(&self) -> NodeAddress {
        self.route.first().copied().unwrap_or(self.dest)
    }
}

impl Wire for Advertise {
    const TYPE: FrameType = FrameType::Advertise;

    fn encode_body(&self, w: &mut Writer) {
        w.write_addr(&self.dest);
        w.write_addr(&self.assigned_head);
        w.write_addr(&self.next_hop);
        w.write_u8(self.hop_count);
        w.write_u8(self.sequence);
        w.write_u8(self.route.len() as u8);
        for relay in self.route.iter() {
            w.write_addr(relay);
        }
    }

    fn decode_body(r: &mut Reader<'_>) -> Result<Self> {
        let dest = r.read_addr()?;
        let assigned_head = r.read_addr()?;
        let next_hop = r.read_addr()?;
        let hop_count = r.read_u8()?;
        let sequence = r.read_u8()?;
        let count = r.read_u8()? as usize;
        let mut route = Vec::new();
        for _ in 0..count {
            route.push(r.read_addr()?).map_err(|_| Error::Malformed {
                expected: ADVERTISE_HEADER_LEN + MAX_ROUTE_LEN * ADDR_LEN,
                actual: ADVERTISE_HEADER_LEN + count * ADDR_LEN,
            })?;
        }
        Ok(Self {
            dest,
            assigned_head,
            next_hop,
            hop_count,
            sequence,
            route,
        })
    }
}

/// Member liveness beacon
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    /// Sending member
    pub src: NodeAddress,
    /// Master
    pub dest: NodeAddress,
}

impl Wire for Heartbeat {
    const TYPE: FrameType = FrameType::Heartbeat;

    fn encode_body(&self, w: &mut Writer) {
        w.write_addr(&self.src);
        w.write_addr(&self.dest);
    }

    fn decode_body(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            src: r.read_addr()?,
            dest: r.read_addr()?,
        })
    }
}

/// Join announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewNode {
    /// Joining node
    pub src: NodeAddress,
}

impl Wire for NewNode {
    const TYPE: FrameType = FrameType::NewNode;

    fn encode_body(&self, w: &mut Writer) {
        w.write_addr(&self.src);
    }

    fn decode_body(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self { src: r.read_addr()? })
    }
}

// ============================================================================
// Frame
// ============================================================================

/// Any decoded frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// HELLO
    Hello(Hello),
    /// REPORT
    Report(Report),
    /// SENSOR_DATA
    SensorData(SensorData),
    /// ADVERTISE
    Advertise(Advertise),
    /// HEARTBEAT
    Heartbeat(Heartbeat),
    /// NEW_NODE
    NewNode(NewNode),
}

impl Frame {
    /// Type tag of this frame
    pub fn frame_type(&self) -> FrameType {
        match self {
            Self::Hello(_) => FrameType::Hello,
            Self::Report(_) => FrameType::Report,
            Self::SensorData(_) => FrameType::SensorData,
            Self::Advertise(_) => FrameType::Advertise,
            Self::Heartbeat(_) => FrameType::Heartbeat,
            Self::NewNode(_) => FrameType::NewNode,
        }
    }

    /// Encode with the leading tag
    pub fn to_bytes(&self) -> std::vec::Vec<u8> {
        match self {
            Self::Hello(f) => f.to_bytes(),
            Self::Report(f) => f.to_bytes(),
            Self::SensorData(f) => f.to_bytes(),
            Self::Advertise(f) => f.to_bytes(),
            Self::Heartbeat(f) => f.to_bytes(),
            Self::NewNode(f) => f.to_bytes(),
        }
    }

    /// Validate the length for the tag, then decode
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let expected = expected_len(bytes)?;
        if bytes.len() != expected {
            return Err(Error::Malformed {
                expected,
                actual: bytes.len(),
            });
        }
        let mut r = Reader::new(bytes);
        let frame_type = FrameType::try_from(r.read_u8()?)?;
        let frame = match frame_type {
            FrameType::Hello => Self::Hello(Hello::decode_body(&mut r)?),
            FrameType::Report => Self::Report(Report::decode_body(&mut r)?),
            FrameType::SensorData => Self::SensorData(SensorData::decode_body(&mut r)?),
            FrameType::Advertise => Self::Advertise(Advertise::decode_body(&mut r)?),
            FrameType::Heartbeat => Self::Heartbeat(Heartbeat::decode_body(&mut r)?),
            FrameType::NewNode => Self::NewNode(NewNode::decode_body(&mut r)?),
        };
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(id: u16) -> NodeAddress {
        NodeAddress::from_node_id(id)
    }

    #[test]
    fn test_hello_layout() {
        let hello = Hello { src_master: addr(1), hop_count: 2, sequence: 0x0304 };
        let bytes = hello.to_bytes();
        assert_eq!(bytes.len(), HELLO_LEN);
        assert_eq!(bytes[0], FrameType::Hello as u8);
        assert_eq!(&bytes[1..9], addr(1).as_bytes());
        assert_eq!(bytes[9], 2);
        // little-endian sequence
        assert_eq!(&bytes[10..12], &[0x04, 0x03]);
        assert_eq!(Frame::decode(&bytes), Ok(Frame::Hello(hello)));
    }

    #[test]
    fn test_report_with_entries() {
        let mut entries = Vec::new();
        entries.push(RoutingEntry::own(addr(3))).unwrap();
        entries.push(RoutingEntry::new(addr(1), addr(2), 2, -61, 4)).unwrap();
        let report = Report { src: addr(3), entries };
        let bytes = report.to_bytes();
        assert_eq!(bytes.len(), REPORT_HEADER_LEN + 2 * REPORT_ENTRY_LEN);
        assert_eq!(bytes[9], 2);

        let Frame::Report(decoded) = Frame::decode(&bytes).unwrap() else {
            panic!("not a report");
        };
        assert_eq!(decoded, report);
        assert_eq!(decoded.sequence(), 4);
        assert_eq!(decoded.entry(&addr(1)).unwrap().metric, -61);
    }

    #[test]
    fn test_empty_report() {
        let report = Report { src: addr(3), entries: Vec::new() };
        let bytes = report.to_bytes();
        assert_eq!(bytes.len(), REPORT_HEADER_LEN);
        assert_eq!(Frame::decode(&bytes), Ok(Frame::Report(report)));
    }

    #[test]
    fn test_report_length_mismatch() {
        let mut entries = Vec::new();
        entries.push(RoutingEntry::own(addr(3))).unwrap();
        let mut bytes = Report { src: addr(3), entries }.to_bytes();
        bytes.pop();
        assert_eq!(
            Frame::decode(&bytes),
            Err(Error::Malformed {
                expected: REPORT_HEADER_LEN + REPORT_ENTRY_LEN,
                actual: REPORT_HEADER_LEN + REPORT_ENTRY_LEN - 1,
            })
        );
    }

    #[test]
    fn test_report_too_many_rows() {
        let count = MAX_NODES + 1;
        let mut bytes = std::vec![FrameType::Report as u8];
        bytes.extend_from_slice(addr(3).as_bytes());
        bytes.push(count as u8);
        bytes.resize(REPORT_HEADER_LEN + count * REPORT_ENTRY_LEN, 0);
        assert!(matches!(Frame::decode(&bytes), Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_fixed_lengths() {
        let sensor = SensorData {
            source: addr(4),
            battery_mv: 3300,
            temperature: -5,
            light_lux: 420,
            distance: 37,
        };
        let advertise = Advertise {
            dest: addr(4),
            assigned_head: addr(2),
            next_hop: addr(2),
            hop_count: 2,
            sequence: 1,
            route: Vec::from_slice(&[addr(2)]).unwrap(),
        };
        let heartbeat = Heartbeat { src: addr(4), dest: addr(1) };
        let new_node = NewNode { src: addr(9) };

        assert_eq!(sensor.to_bytes().len(), SENSOR_DATA_LEN);
        assert_eq!(advertise.to_bytes().len(), ADVERTISE_HEADER_LEN + ADDR_LEN);
        assert_eq!(heartbeat.to_bytes().len(), HEARTBEAT_LEN);
        assert_eq!(new_node.to_bytes().len(), NEW_NODE_LEN);

        let frame = Frame::decode(&sensor.to_bytes()).unwrap();
        assert_eq!(frame.frame_type(), FrameType::SensorData);
        assert_eq!(frame, Frame::SensorData(sensor));
        assert_eq!(frame.to_bytes(), sensor.to_bytes());
    }

    #[test]
    fn test_advertise_route() {
        let adv = Advertise {
            dest: addr(7),
            assigned_head: addr(3),
            next_hop: addr(5),
            hop_count: 4,
            sequence: 2,
            route: Vec::from_slice(&[addr(2), addr(3), addr(5)]).unwrap(),
        };
        let bytes = adv.to_bytes();
        assert_eq!(bytes.len(), ADVERTISE_HEADER_LEN + 3 * ADDR_LEN);
        assert_eq!(bytes[ADVERTISE_HEADER_LEN - 1], 3);
        assert_eq!(Frame::decode(&bytes), Ok(Frame::Advertise(adv.clone())));

        assert_eq!(adv.first_hop(), addr(2));
        assert_eq!(adv.after(&addr(2)), Some(addr(3)));
        assert_eq!(adv.after(&addr(5)), Some(addr(7)));
        assert_eq!(adv.after(&addr(9)), None);

        let direct = Advertise { route: Vec::new(), ..adv };
        assert_eq!(direct.first_hop(), addr(7));
        assert_eq!(direct.to_bytes().len(), ADVERTISE_HEADER_LEN);
    }

    #[test]
    fn test_advertise_route_bounds() {
        let mut bytes = Advertise {
            dest: addr(7),
            assigned_head: addr(3),
            next_hop: addr(5),
            hop_count: 2,
            sequence: 1,
            route: Vec::from_slice(&[addr(5)]).unwrap(),
        }
        .to_bytes();
        bytes.truncate(ADVERTISE_HEADER_LEN + 4);
        assert_eq!(
            Frame::decode(&bytes),
            Err(Error::Malformed {
                expected: ADVERTISE_HEADER_LEN + ADDR_LEN,
                actual: ADVERTISE_HEADER_LEN + 4,
            })
        );

        bytes.truncate(ADVERTISE_HEADER_LEN);
        bytes[ADVERTISE_HEADER_LEN - 1] = (MAX_ROUTE_LEN + 1) as u8;
        assert!(matches!(Frame::decode(&bytes), Err(Error::Malformed { .. })));
    }

    #[test]
    fn test_wrong_length_rejected_before_parse() {
        let mut bytes = Heartbeat { src: addr(4), dest: addr(1) }.to_bytes();
        bytes.push(0);
        assert_eq!(
            Frame::decode(&bytes),
            Err(Error::Malformed { expected: HEARTBEAT_LEN, actual: HEARTBEAT_LEN + 1 })
        );
        assert_eq!(
            Frame::decode(&[FrameType::Hello as u8, 1, 2]),
            Err(Error::Malformed { expected: HELLO_LEN, actual: 3 })
        );
    }

    #[test]
    fn test_unknown_and_empty() {
        assert_eq!(Frame::decode(&[0x7f, 0, 0]), Err(Error::UnknownType(0x7f)));
        assert_eq!(Frame::decode(&[]), Err(Error::Malformed { expected: 1, actual: 0 }));
    }

    #[test]
    fn test_max_frame_len() {
        assert_eq!(REPORT_ENTRY_LEN, 21);
        assert_eq!(ADVERTISE_HEADER_LEN, 28);
        assert_eq!(MAX_FRAME_LEN, 10 + 21 * MAX_NODES);
    }
}
