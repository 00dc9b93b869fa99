//! Scan assembly: folding successive packets of one rotation into a [`Scan`].

use std::time::Instant;

use crate::header::Header;

/// One fully- or partially-assembled rotation of range/amplitude samples.
#[derive(Debug, Clone)]
pub struct Scan {
    distances: Vec<u32>,
    amplitudes: Vec<u32>,
    headers: Vec<Header>,
    timestamp: Instant,
}

impl Scan {
    fn new() -> Self {
        Self {
            distances: Vec::new(),
            amplitudes: Vec::new(),
            headers: Vec::new(),
            timestamp: Instant::now(),
        }
    }

    pub fn distances(&self) -> &[u32] {
        &self.distances
    }

    pub fn amplitudes(&self) -> &[u32] {
        &self.amplitudes
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    pub fn timestamp(&self) -> Instant {
        self.timestamp
    }

    pub fn empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        !self.empty() && self.distances.len() >= self.headers[0].num_points_scan as usize
    }
}

/// Decode one packet's sample words into (distance, amplitude) pairs.
///
/// Each sample is a little-endian 32-bit word: low 16 bits are the distance
/// in millimetres, high 16 bits are the amplitude (values below 32 mean
/// undefined/invalid, per the device's own convention, not an error here).
fn decode_samples(payload: &[u8]) -> impl Iterator<Item = (u32, u32)> + '_ {
    payload.chunks_exact(4).map(|chunk| {
        let word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        (word & 0xFFFF, (word >> 16) & 0xFFFF)
    })
}

/// Stateful aggregator turning a stream of validated (header, payload) pairs
/// into complete scans.
///
/// A scan starts on the first packet seen in the `Empty` state. Packets are
/// only appended while `scan_number` matches and `packet_number` continues
/// the existing prefix; any mismatch discards the in-progress scan and
/// starts a fresh one from the packet that broke the sequence. This is a
/// silent recovery path, not a reported error: packet loss happens and the
/// assembler's job is to never emit a scan invariant violation.
pub struct ScanAssembler {
    current: Option<Scan>,
}

impl Default for ScanAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanAssembler {
    pub fn new() -> Self {
        Self { current: None }
    }

    /// Feed one validated packet into the assembler.
    pub fn push(&mut self, header: Header, payload: &[u8]) {
        let starts_new_scan = match &self.current {
            None => true,
            Some(scan) => {
                let expected_packet_number = scan.headers.len() as u16 + 1;
                header.scan_number != scan.headers[0].scan_number
                    || header.packet_number != expected_packet_number
            }
        };

        if starts_new_scan {
            if header.packet_number != 1 {
                // Mid-scan desync with no viable scan start; drop the
                // packet and wait for the next scan boundary.
                self.current = None;
                return;
            }
            let mut scan = Scan::new();
            scan.distances.reserve(header.num_points_scan as usize);
            scan.amplitudes.reserve(header.num_points_scan as usize);
            self.current = Some(scan);
        }

        let scan = self.current.as_mut().expect("scan initialised above");
        for (distance, amplitude) in decode_samples(payload) {
            scan.distances.push(distance);
            scan.amplitudes.push(amplitude);
        }
        scan.headers.push(header);
    }

    pub fn is_complete(&self) -> bool {
        self.current.as_ref().is_some_and(Scan::is_complete)
    }

    /// Take the completed scan, resetting the assembler to `Empty`.
    ///
    /// Panics if called when `is_complete()` is `false`; callers must check
    /// first, mirroring `ScanAssembler::push`'s own invariant checks.
    pub fn take(&mut self) -> Scan {
        assert!(self.is_complete(), "take() called on an incomplete scan");
        self.current.take().expect("checked complete above")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{HeaderBuilder, PacketType};

    fn packet(scan_number: u16, packet_number: u16, num_points_scan: u16, samples: &[(u16, u16)]) -> (Header, Vec<u8>) {
        let header = HeaderBuilder::new(PacketType::C, scan_number, packet_number)
            .num_points_scan(num_points_scan)
            .num_points_packet(samples.len() as u16)
            .build();
        let mut payload = Vec::with_capacity(samples.len() * 4);
        for (distance, amplitude) in samples {
            let word = (*distance as u32) | ((*amplitude as u32) << 16);
            payload.extend_from_slice(&word.to_le_bytes());
        }
        (header, payload)
    }

    #[test]
    fn single_scan_assembly() {
        let mut assembler = ScanAssembler::new();
        let (h1, p1) = packet(7, 1, 4, &[(1, 50), (2, 50)]);
        let (h2, p2) = packet(7, 2, 4, &[(3, 50), (4, 50)]);
        assembler.push(h1, &p1);
        assert!(!assembler.is_complete());
        assembler.push(h2, &p2);
        assert!(assembler.is_complete());

        let scan = assembler.take();
        assert_eq!(scan.distances(), &[1, 2, 3, 4]);
        assert_eq!(scan.amplitudes(), &[50, 50, 50, 50]);
        assert_eq!(scan.headers().len(), 2);
        assert!(scan.headers().iter().all(|h| h.scan_number == 7));
    }

    #[test]
    fn cross_scan_discard() {
        let mut assembler = ScanAssembler::new();
        let (h1, p1) = packet(7, 1, 4, &[(1, 50)]);
        let (h2, p2) = packet(8, 1, 4, &[(9, 50)]);
        assembler.push(h1, &p1);
        assembler.push(h2, &p2);
        assert!(!assembler.is_complete());
        // In-progress scan now tracks scan 8, not the discarded scan 7.
        assembler.push_and_check_scan_number(8);
    }

    impl ScanAssembler {
        fn push_and_check_scan_number(&self, expected: u16) {
            let scan = self.current.as_ref().expect("scan in progress");
            assert_eq!(scan.headers()[0].scan_number, expected);
        }
    }

    #[test]
    fn out_of_order_packet_number_discards() {
        let mut assembler = ScanAssembler::new();
        let (h1, p1) = packet(1, 1, 4, &[(1, 50)]);
        let (h3, p3) = packet(1, 3, 4, &[(3, 50)]);
        assembler.push(h1, &p1);
        assembler.push(h3, &p3);
        assert!(!assembler.is_complete());
    }

    #[test]
    fn scan_number_wraparound_starts_fresh_scan() {
        let mut assembler = ScanAssembler::new();
        let (h1, p1) = packet(65535, 1, 2, &[(1, 50), (2, 50)]);
        assembler.push(h1, &p1);
        let scan = assembler.take();
        assert_eq!(scan.headers()[0].scan_number, 65535);

        let (h2, p2) = packet(0, 1, 2, &[(3, 50), (4, 50)]);
        assembler.push(h2, &p2);
        assert!(!assembler.is_complete());
    }
}
