//! Byte-stream integrity checks.
//!
//! Command and reply frames carry an additive 8-bit checksum; telemetry
//! packets carry a CRC-8 (Dallas/Maxim: reflected polynomial 0x8C, init 0).
//! The two are not interchangeable.

/// Wrapping sum of every byte.
pub fn additive(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// CRC-8, LSB first, polynomial 0x8C, initial value 0.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;
    for &byte in data {
        let mut inbyte = byte;
        for _ in 0..8 {
            let mix = (crc ^ inbyte) & 0x01;
            crc >>= 1;
            if mix != 0 {
                crc ^= 0x8C;
            }
            inbyte >>= 1;
        }
    }
    crc
}
