//! Wire header parsing and encoding.
//!
//! Mirrors the 64-byte packed header the device emits at the start of every
//! packet: a 16-bit magic, packet type, sizing/sequencing fields, two
//! timestamps, scan geometry, and a trailing I/Q telemetry block.

/// Magic bytes that must open every packet, little-endian on the wire.
pub const MAGIC: u16 = 0x5CA2;

/// Minimum valid `header_size`. The device defaults to 60.
pub const MIN_HEADER_SIZE: u16 = 60;

/// The fixed-size prefix of the header this implementation always reads
/// (magic through `angular_increment`); the I/Q telemetry fields beyond this
/// are read only when the declared `header_size`/`packet_size` leave room.
pub const CORE_HEADER_LEN: usize = 52;

/// Packet type codes recognised by the extractor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    A,
    B,
    C,
}

impl PacketType {
    fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0041 => Some(PacketType::A),
            0x0042 => Some(PacketType::B),
            0x0043 => Some(PacketType::C),
            _ => None,
        }
    }

    fn to_u16(self) -> u16 {
        match self {
            PacketType::A => 0x0041,
            PacketType::B => 0x0042,
            PacketType::C => 0x0043,
        }
    }
}

/// One packet header, decoded from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u16,
    pub packet_type: u16,
    pub packet_size: u32,
    pub header_size: u16,
    pub scan_number: u16,
    pub packet_number: u16,
    pub timestamp_raw: u64,
    pub timestamp_sync: u64,
    pub status_flags: u32,
    pub scan_frequency: u32,
    pub num_points_scan: u16,
    pub num_points_packet: u16,
    pub first_index: u16,
    pub first_angle: i32,
    pub angular_increment: i32,
    pub iq_input: u32,
    pub iq_overload: u32,
    pub iq_timestamp_raw: u64,
    pub iq_timestamp_sync: u64,
}

impl Header {
    /// Parse a header from `data`. Returns `None` if there are not enough
    /// bytes for the core fields, the magic doesn't match, the packet type
    /// is unrecognised, or the declared sizes are inconsistent.
    ///
    /// The trailing I/Q timestamp fields are best-effort: they decode to
    /// zero when `data` is too short to hold them, since some firmware
    /// truncates the header before that point.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < CORE_HEADER_LEN {
            return None;
        }

        let magic = u16::from_le_bytes([data[0], data[1]]);
        if magic != MAGIC {
            return None;
        }

        let packet_type = u16::from_le_bytes([data[2], data[3]]);
        PacketType::from_u16(packet_type)?;

        let packet_size = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let header_size = u16::from_le_bytes([data[8], data[9]]);
        if header_size < MIN_HEADER_SIZE || packet_size < header_size as u32 {
            return None;
        }

        let scan_number = u16::from_le_bytes([data[10], data[11]]);
        let packet_number = u16::from_le_bytes([data[12], data[13]]);
        let timestamp_raw = u64::from_le_bytes(data[14..22].try_into().ok()?);
        let timestamp_sync = u64::from_le_bytes(data[22..30].try_into().ok()?);
        let status_flags = u32::from_le_bytes(data[30..34].try_into().ok()?);
        let scan_frequency = u32::from_le_bytes(data[34..38].try_into().ok()?);
        let num_points_scan = u16::from_le_bytes([data[38], data[39]]);
        let num_points_packet = u16::from_le_bytes([data[40], data[41]]);
        if num_points_packet == 0 {
            return None;
        }
        let first_index = u16::from_le_bytes([data[42], data[43]]);
        let first_angle = i32::from_le_bytes(data[44..48].try_into().ok()?);
        let angular_increment = i32::from_le_bytes(data[48..52].try_into().ok()?);

        let (iq_input, iq_overload, iq_timestamp_raw, iq_timestamp_sync) =
            if data.len() >= 76 {
                (
                    u32::from_le_bytes(data[52..56].try_into().ok()?),
                    u32::from_le_bytes(data[56..60].try_into().ok()?),
                    u64::from_le_bytes(data[60..68].try_into().ok()?),
                    u64::from_le_bytes(data[68..76].try_into().ok()?),
                )
            } else {
                (0, 0, 0, 0)
            };

        Some(Header {
            magic,
            packet_type,
            packet_size,
            header_size,
            scan_number,
            packet_number,
            timestamp_raw,
            timestamp_sync,
            status_flags,
            scan_frequency,
            num_points_scan,
            num_points_packet,
            first_index,
            first_angle,
            angular_increment,
            iq_input,
            iq_overload,
            iq_timestamp_raw,
            iq_timestamp_sync,
        })
    }

    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::from_u16(self.packet_type)
    }

    /// Number of payload bytes this header declares, i.e. `packet_size -
    /// header_size`.
    pub fn payload_len(&self) -> usize {
        (self.packet_size - self.header_size as u32) as usize
    }

    /// Encode the header back into `buffer`, writing exactly
    /// `self.header_size` bytes (the core fields, plus the I/Q fields that
    /// fall within the declared header size). Returns the number of bytes
    /// written, which always equals `self.header_size` and therefore agrees
    /// with what [`Self::parse`] and [`crate::packet::PacketExtractor`]
    /// expect `packet_size`/`header_size` to describe.
    pub fn encode(&self, buffer: &mut [u8]) -> usize {
        let len = self.header_size as usize;
        assert!(len >= CORE_HEADER_LEN);
        assert!(buffer.len() >= len);
        buffer[0..2].copy_from_slice(&self.magic.to_le_bytes());
        buffer[2..4].copy_from_slice(&self.packet_type.to_le_bytes());
        buffer[4..8].copy_from_slice(&self.packet_size.to_le_bytes());
        buffer[8..10].copy_from_slice(&self.header_size.to_le_bytes());
        buffer[10..12].copy_from_slice(&self.scan_number.to_le_bytes());
        buffer[12..14].copy_from_slice(&self.packet_number.to_le_bytes());
        buffer[14..22].copy_from_slice(&self.timestamp_raw.to_le_bytes());
        buffer[22..30].copy_from_slice(&self.timestamp_sync.to_le_bytes());
        buffer[30..34].copy_from_slice(&self.status_flags.to_le_bytes());
        buffer[34..38].copy_from_slice(&self.scan_frequency.to_le_bytes());
        buffer[38..40].copy_from_slice(&self.num_points_scan.to_le_bytes());
        buffer[40..42].copy_from_slice(&self.num_points_packet.to_le_bytes());
        buffer[42..44].copy_from_slice(&self.first_index.to_le_bytes());
        buffer[44..48].copy_from_slice(&self.first_angle.to_le_bytes());
        buffer[48..52].copy_from_slice(&self.angular_increment.to_le_bytes());
        if len >= 60 {
            buffer[52..56].copy_from_slice(&self.iq_input.to_le_bytes());
            buffer[56..60].copy_from_slice(&self.iq_overload.to_le_bytes());
        }
        if len >= 76 {
            buffer[60..68].copy_from_slice(&self.iq_timestamp_raw.to_le_bytes());
            buffer[68..76].copy_from_slice(&self.iq_timestamp_sync.to_le_bytes());
        }
        len
    }
}

/// Test-only builder for constructing headers without naming every field at
/// each call site.
#[cfg(test)]
pub struct HeaderBuilder {
    header: Header,
}

#[cfg(test)]
impl HeaderBuilder {
    pub fn new(packet_type: PacketType, scan_number: u16, packet_number: u16) -> Self {
        Self {
            header: Header {
                magic: MAGIC,
                packet_type: packet_type.to_u16(),
                packet_size: MIN_HEADER_SIZE as u32,
                header_size: MIN_HEADER_SIZE,
                scan_number,
                packet_number,
                timestamp_raw: 0,
                timestamp_sync: 0,
                status_flags: 0,
                scan_frequency: 0,
                num_points_scan: 0,
                num_points_packet: 0,
                first_index: 0,
                first_angle: 0,
                angular_increment: 0,
                iq_input: 0,
                iq_overload: 0,
                iq_timestamp_raw: 0,
                iq_timestamp_sync: 0,
            },
        }
    }

    pub fn num_points_scan(mut self, n: u16) -> Self {
        self.header.num_points_scan = n;
        self
    }

    pub fn num_points_packet(mut self, n: u16) -> Self {
        self.header.num_points_packet = n;
        self.header.packet_size = MIN_HEADER_SIZE as u32 + n as u32 * 4;
        self
    }

    pub fn build(self) -> Header {
        self.header
    }
}
