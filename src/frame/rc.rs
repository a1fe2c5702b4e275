//! # RC Channel Data
//!
//! 16 RC channels with 11-bit resolution, packed LSB first as a continuous
//! bitstream (same packing as CRSF RC-channels payloads):
//!
//! ```text
//! Byte 0: Ch1[0:7]
//! Byte 1: Ch1[8:10] | Ch2[0:4]
//! Byte 2: Ch2[5:10] | Ch3[0:1]
//! ...
//! ```

/// Number of RC channels
pub const RC_NUM_CHANNELS: usize = 16;

/// Channels carried in the crc1-protected block (channels 1-4)
pub const RC1_NUM_CHANNELS: usize = 4;

/// Channel value range (11-bit: 0-2047)
pub const RC_CHANNEL_VALUE_MIN: u16 = 0;
pub const RC_CHANNEL_VALUE_MAX: u16 = 2047;
pub const RC_CHANNEL_VALUE_CENTER: u16 = 1024;

/// RC channel values as carried over the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RcData {
    pub ch: [u16; RC_NUM_CHANNELS],
}

impl Default for RcData {
    fn default() -> Self {
        Self {
            ch: [RC_CHANNEL_VALUE_CENTER; RC_NUM_CHANNELS],
        }
    }
}

impl RcData {
    /// Channels 1-4
    pub fn rc1(&self) -> &[u16] {
        &self.ch[..RC1_NUM_CHANNELS]
    }

    /// Channels 5-16
    pub fn rc2(&self) -> &[u16] {
        &self.ch[RC1_NUM_CHANNELS..]
    }
}

/// Clamp a channel value to the 11-bit range
pub fn clamp_channel_value(value: u16) -> u16 {
    value.min(RC_CHANNEL_VALUE_MAX)
}

/// Pack channels as 11-bit values into `out`
///
/// # Arguments
///
/// * `channels` - Channel values, clamped to 0-2047
/// * `out` - Destination, must hold `ceil(channels.len() * 11 / 8)` bytes
pub fn pack_channels(channels: &[u16], out: &mut [u8]) {
    out.iter_mut().for_each(|b| *b = 0);
    let mut bit_index = 0;

    for &channel in channels {
        let value = clamp_channel_value(channel);

        for bit in 0..11 {
            if (value >> bit) & 1 == 1 {
                out[bit_index / 8] |= 1 << (bit_index % 8);
            }
            bit_index += 1;
        }
    }
}

/// Unpack 11-bit channel values from `data` into `channels`
pub fn unpack_channels(data: &[u8], channels: &mut [u16]) {
    let mut bit_index = 0;

    for channel in channels.iter_mut() {
        let mut value = 0u16;

        for bit in 0..11 {
            if (data[bit_index / 8] >> (bit_index % 8)) & 1 == 1 {
                value |= 1 << bit;
            }
            bit_index += 1;
        }

        *channel = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_all_max() {
        let channels = [RC_CHANNEL_VALUE_MAX; 16];
        let mut out = [0u8; 22];
        pack_channels(&channels, &mut out);
        assert_eq!(out, [0xFFu8; 22]);
    }

    #[test]
    fn test_pack_single_channel() {
        let mut channels = [0u16; 4];
        channels[0] = 0x7FF;
        let mut out = [0u8; 6];
        pack_channels(&channels, &mut out);
        assert_eq!(out[0], 0xFF);
        assert_eq!(out[1], 0x07);
        assert!(out[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_pack_clamps_and_unpacks() {
        let channels = [5000u16, 0, 1024, 1500];
        let mut out = [0u8; 6];
        pack_channels(&channels, &mut out);

        let mut decoded = [0u16; 4];
        unpack_channels(&out, &mut decoded);
        assert_eq!(decoded, [2047, 0, 1024, 1500]);
    }

    #[test]
    fn test_pack_overwrites_destination() {
        let mut out = [0xAAu8; 6];
        pack_channels(&[0, 0, 0, 0], &mut out);
        assert_eq!(out, [0u8; 6], "Stale bytes must not leak into the packed block");
    }

    #[test]
    fn test_rc_groups() {
        let rc = RcData::default();
        assert_eq!(rc.rc1().len(), 4);
        assert_eq!(rc.rc2().len(), 12);
    }
}
