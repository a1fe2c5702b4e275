//! # Frame Checksums
//!
//! Two table-driven error-detecting codes protect every air frame:
//!
//! - **CRC-8/DVB-S2** over the short Tx frame prefix (header + first
//!   channels), so those fields survive a corrupted payload.
//!   Polynomial 0xD5, initial value 0x00.
//! - **CRC-16/MCRF4XX** over the whole frame, stored as the trailer.
//!   Reflected polynomial 0x8408 (0x1021), initial value 0xFFFF.

/// CRC-8-DVB-S2 polynomial
const CRC8_POLY: u8 = 0xD5;

/// CRC-16/MCRF4XX polynomial, bit-reversed form of 0x1021
const CRC16_POLY_REFLECTED: u16 = 0x8408;

/// CRC-16 initial value
pub const CRC16_INIT: u16 = 0xFFFF;

/// Precomputed CRC8 lookup table for fast calculation
const CRC8_TABLE: [u8; 256] = generate_crc8_table();

/// Precomputed CRC16 lookup table
const CRC16_TABLE: [u16; 256] = generate_crc16_table();

/// Generate CRC8 lookup table at compile time
const fn generate_crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u8;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ CRC8_POLY;
            } else {
                crc <<= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Generate CRC16 lookup table at compile time
const fn generate_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;

    while i < 256 {
        let mut crc = i as u16;
        let mut j = 0;

        while j < 8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ CRC16_POLY_REFLECTED;
            } else {
                crc >>= 1;
            }
            j += 1;
        }

        table[i] = crc;
        i += 1;
    }

    table
}

/// Calculate CRC8-DVB-S2 checksum using lookup table
///
/// # Examples
///
/// ```
/// use hoplink::frame::crc::crc8_dvb_s2;
///
/// assert_eq!(crc8_dvb_s2(b"123456789"), 0xBC);
/// ```
pub fn crc8_dvb_s2(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;

    for &byte in data {
        crc = CRC8_TABLE[(crc ^ byte) as usize];
    }

    crc
}

/// Calculate CRC-16/MCRF4XX over `data`
///
/// # Examples
///
/// ```
/// use hoplink::frame::crc::crc16;
///
/// assert_eq!(crc16(b"123456789"), 0x6F91);
/// ```
pub fn crc16(data: &[u8]) -> u16 {
    crc16_accumulate(CRC16_INIT, data)
}

/// Continue a CRC-16 calculation from a previous value
pub fn crc16_accumulate(mut crc: u16, data: &[u8]) -> u16 {
    for &byte in data {
        crc = (crc >> 8) ^ CRC16_TABLE[((crc ^ byte as u16) & 0x00FF) as usize];
    }

    crc
}

/// Bitwise CRC8, used to verify the lookup table
#[cfg(test)]
fn crc8_dvb_s2_slow(data: &[u8]) -> u8 {
    let mut crc: u8 = 0;

    for &byte in data {
        crc ^= byte;

        for _ in 0..8 {
            if (crc & 0x80) != 0 {
                crc = (crc << 1) ^ CRC8_POLY;
            } else {
                crc <<= 1;
            }
        }
    }

    crc
}

/// Bitwise CRC16, used to verify the lookup table
#[cfg(test)]
fn crc16_slow(data: &[u8]) -> u16 {
    let mut crc = CRC16_INIT;

    for &byte in data {
        crc ^= byte as u16;

        for _ in 0..8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ CRC16_POLY_REFLECTED;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc8_empty() {
        assert_eq!(crc8_dvb_s2(&[]), 0x00);
    }

    #[test]
    fn test_crc8_check_value() {
        assert_eq!(crc8_dvb_s2(b"123456789"), 0xBC);
    }

    #[test]
    fn test_crc16_check_value() {
        assert_eq!(crc16(b"123456789"), 0x6F91);
        assert_eq!(crc16(&[]), CRC16_INIT);
    }

    #[test]
    fn test_lookup_tables_match_slow() {
        let test_data = [
            vec![0x01, 0x02, 0x03],
            vec![0xFF, 0xFE, 0xFD],
            vec![0x7A, 0x4C, 0x11, 0x00, 0x32],
            vec![0x00; 24],
            vec![0xFF; 91],
        ];

        for data in test_data.iter() {
            assert_eq!(crc8_dvb_s2(data), crc8_dvb_s2_slow(data), "CRC8 mismatch for {:?}", data);
            assert_eq!(crc16(data), crc16_slow(data), "CRC16 mismatch for {:?}", data);
        }
    }

    #[test]
    fn test_crc16_accumulate_is_incremental() {
        let data = b"frequency hopping";
        let split = crc16_accumulate(crc16(&data[..7]), &data[7..]);
        assert_eq!(split, crc16(data));
    }

    #[test]
    fn test_crc_changes_with_data() {
        let data1 = [0x18, 0x16, 0x00, 0x04];
        let data2 = [0x18, 0x16, 0x00, 0x05];

        assert_ne!(crc8_dvb_s2(&data1), crc8_dvb_s2(&data2));
        assert_ne!(crc16(&data1), crc16(&data2));
    }
}
