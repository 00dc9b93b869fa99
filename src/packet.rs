//! Stateless extraction of validated packets from a rolling byte buffer.
//!
//! The magic search below scans byte-by-byte rather than only at 32-bit
//! boundaries: after garbage of arbitrary length the next real packet is
//! not guaranteed to start on a 4-byte boundary relative to the buffer, so
//! a byte-granular search is the safer reading of "resync on the next
//! magic" and costs nothing extra once a valid header is found (the cursor
//! still jumps a whole `packet_size` on every successful parse).

use crate::header::{Header, CORE_HEADER_LEN, MAGIC, MIN_HEADER_SIZE};
use crate::scan::ScanAssembler;

/// Outcome of one [`PacketExtractor::extract`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOutcome {
    /// `true` if at least one full packet was consumed.
    pub had_enough_bytes: bool,
    /// Index into the input buffer past the last fully-consumed byte.
    /// Bytes at and after this index must be retained by the caller for the
    /// next call.
    pub new_start: usize,
    /// Additional bytes needed before the next call can make progress, or
    /// `0` if the caller should just feed whatever it has.
    pub bytes_needed: usize,
}

/// Stateless packet parser. Holds no data between calls; all state lives in
/// the caller's buffer and the [`ScanAssembler`] it feeds.
pub struct PacketExtractor;

impl PacketExtractor {
    /// Scan `buffer` for validated packets, feeding each one to `assembler`.
    ///
    /// Invariant: every byte is either inside a packet that was fully
    /// validated (magic, type, sizes all consistent) or left untouched in
    /// the buffer for a future call, the cursor never advances past bytes
    /// that were not validated as described above.
    pub fn extract(buffer: &[u8], assembler: &mut ScanAssembler) -> ExtractOutcome {
        let mut cursor = 0usize;
        let mut had_enough_bytes = false;

        loop {
            let Some(magic_at) = find_magic(&buffer[cursor..]) else {
                // No magic anywhere in the remainder; keep the whole tail
                // in case the magic is split across reads.
                return ExtractOutcome {
                    had_enough_bytes,
                    new_start: buffer.len(),
                    bytes_needed: 0,
                };
            };
            cursor += magic_at;

            let remaining = &buffer[cursor..];
            if remaining.len() < CORE_HEADER_LEN {
                return ExtractOutcome {
                    had_enough_bytes,
                    new_start: cursor,
                    bytes_needed: CORE_HEADER_LEN - remaining.len(),
                };
            }

            let Some(header) = Header::parse(remaining) else {
                // Not a real header: skip past the magic bytes and keep
                // searching. Guarantees progress on garbage input.
                cursor += 2;
                continue;
            };

            let packet_size = header.packet_size as usize;
            if remaining.len() < packet_size {
                return ExtractOutcome {
                    had_enough_bytes,
                    new_start: cursor,
                    bytes_needed: packet_size - remaining.len(),
                };
            }

            let payload_start = header.header_size as usize;
            let payload = &remaining[payload_start..packet_size];
            assembler.push(header, payload);
            had_enough_bytes = true;
            cursor += packet_size;

            if assembler.is_complete() {
                // Hand control back the instant a scan completes so the
                // caller can drain and publish it before the next packet
                // (possibly the first packet of the following scan) has a
                // chance to discard it from inside `ScanAssembler::push`.
                return ExtractOutcome {
                    had_enough_bytes,
                    new_start: cursor,
                    bytes_needed: 0,
                };
            }
        }
    }
}

fn find_magic(data: &[u8]) -> Option<usize> {
    if data.len() < 2 {
        return None;
    }
    data.windows(2)
        .position(|w| u16::from_le_bytes([w[0], w[1]]) == MAGIC)
}

/// Sanity helper kept for documentation purposes: the smallest buffer that
/// can ever hold a complete header.
pub const MIN_DETECTABLE_HEADER: usize = MIN_HEADER_SIZE as usize;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::{HeaderBuilder, PacketType};

    fn encode_packet(scan_number: u16, packet_number: u16, num_points_scan: u16, samples: &[(u16, u16)]) -> Vec<u8> {
        let header = HeaderBuilder::new(PacketType::C, scan_number, packet_number)
            .num_points_scan(num_points_scan)
            .num_points_packet(samples.len() as u16)
            .build();
        let mut buf = vec![0u8; header.header_size as usize];
        header.encode(&mut buf);
        for (distance, amplitude) in samples {
            let word = (*distance as u32) | ((*amplitude as u32) << 16);
            buf.extend_from_slice(&word.to_le_bytes());
        }
        buf
    }

    #[test]
    fn extracts_single_scan_across_two_packets() {
        let mut buffer = encode_packet(7, 1, 4, &[(1, 50), (2, 50)]);
        buffer.extend(encode_packet(7, 2, 4, &[(3, 50), (4, 50)]));

        let mut assembler = ScanAssembler::new();
        let outcome = PacketExtractor::extract(&buffer, &mut assembler);

        assert!(outcome.had_enough_bytes);
        assert_eq!(outcome.new_start, buffer.len());
        assert!(assembler.is_complete());
        let scan = assembler.take();
        assert_eq!(scan.distances(), &[1, 2, 3, 4]);
    }

    #[test]
    fn resyncs_past_leading_noise() {
        let mut buffer = vec![0xFFu8; 37];
        buffer.extend(encode_packet(7, 1, 2, &[(1, 50), (2, 50)]));

        let mut assembler = ScanAssembler::new();
        let outcome = PacketExtractor::extract(&buffer, &mut assembler);

        assert!(outcome.had_enough_bytes);
        assert!(assembler.is_complete());
        let scan = assembler.take();
        assert_eq!(scan.distances(), &[1, 2]);
    }

    #[test]
    fn reports_bytes_needed_for_partial_payload() {
        let full = encode_packet(1, 1, 4, &[(1, 50), (2, 50)]);
        let truncated = &full[..full.len() - 2];

        let mut assembler = ScanAssembler::new();
        let outcome = PacketExtractor::extract(truncated, &mut assembler);

        assert!(!outcome.had_enough_bytes);
        assert_eq!(outcome.new_start, 0);
        assert_eq!(outcome.bytes_needed, 2);
    }

    #[test]
    fn reports_bytes_needed_for_partial_header() {
        let full = encode_packet(1, 1, 4, &[(1, 50)]);
        let truncated = &full[..CORE_HEADER_LEN - 5];

        let mut assembler = ScanAssembler::new();
        let outcome = PacketExtractor::extract(truncated, &mut assembler);

        assert!(!outcome.had_enough_bytes);
        assert_eq!(outcome.bytes_needed, 5);
    }

    #[test]
    fn streaming_idempotence_across_arbitrary_splits() {
        let mut buffer = encode_packet(3, 1, 4, &[(1, 1), (2, 2)]);
        buffer.extend(encode_packet(3, 2, 4, &[(3, 3), (4, 4)]));

        // Whole-buffer baseline.
        let mut whole = ScanAssembler::new();
        PacketExtractor::extract(&buffer, &mut whole);
        let baseline = whole.take();

        // Feed the same bytes split at every possible boundary and confirm
        // the same scan comes out, accumulating leftover bytes as a real
        // caller would.
        for split in 0..=buffer.len() {
            let mut assembler = ScanAssembler::new();
            let mut pending = Vec::new();

            pending.extend_from_slice(&buffer[..split]);
            let outcome = PacketExtractor::extract(&pending, &mut assembler);
            pending.drain(..outcome.new_start);

            pending.extend_from_slice(&buffer[split..]);
            PacketExtractor::extract(&pending, &mut assembler);

            assert!(assembler.is_complete(), "split at {split} failed to complete");
            let scan = assembler.take();
            assert_eq!(scan.distances(), baseline.distances(), "split at {split}");
            assert_eq!(scan.amplitudes(), baseline.amplitudes(), "split at {split}");
        }
    }

    #[test]
    fn garbage_header_only_costs_two_bytes() {
        let mut buffer = vec![0x00u8; 2];
        buffer[0..2].copy_from_slice(&MAGIC.to_le_bytes());
        buffer.extend(vec![0u8; 10]); // not a valid header past the magic
        buffer.extend(encode_packet(1, 1, 2, &[(5, 50), (6, 50)]));

        let mut assembler = ScanAssembler::new();
        let outcome = PacketExtractor::extract(&buffer, &mut assembler);
        assert!(outcome.had_enough_bytes);
        assert!(assembler.is_complete());
    }

    #[test]
    fn stops_at_scan_boundary_instead_of_overwriting_completed_scan() {
        // One full scan (2 packets) immediately followed by the first
        // packet of the next scan, all delivered in a single buffer, as a
        // fast device might hand over in one read/datagram.
        let mut buffer = encode_packet(1, 1, 4, &[(1, 50), (2, 50)]);
        buffer.extend(encode_packet(1, 2, 4, &[(3, 50), (4, 50)]));
        let next_scan_start = buffer.len();
        buffer.extend(encode_packet(2, 1, 4, &[(9, 50), (10, 50)]));

        let mut assembler = ScanAssembler::new();
        let outcome = PacketExtractor::extract(&buffer, &mut assembler);

        // Extraction must stop right after scan 1 completes, not run on
        // into scan 2's first packet and silently discard scan 1.
        assert!(assembler.is_complete());
        assert_eq!(outcome.new_start, next_scan_start);
        let scan = assembler.take();
        assert_eq!(scan.distances(), &[1, 2, 3, 4]);

        // The caller resumes from `new_start` and the next scan assembles
        // normally from there instead of starting from a scan that was
        // already silently dropped.
        let remaining = &buffer[outcome.new_start..];
        let outcome = PacketExtractor::extract(remaining, &mut assembler);
        assert!(outcome.had_enough_bytes);
        assert!(!assembler.is_complete());
    }
}
