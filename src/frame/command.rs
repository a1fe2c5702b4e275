//! # Command Payloads
//!
//! Command frames reuse the normal frame shape; the header type tag is
//! `FrameType::Command` and the payload starts with a command id.
//!
//! | Id | Command | Direction | Body |
//! |----|---------|-----------|------|
//! | 1 | GetSetupData | Tx -> Rx | - |
//! | 2 | SetParams | Tx -> Rx | `RxParams` |
//! | 3 | StoreParams | Tx -> Rx | - |
//! | 4 | GetSetupDataWithReload | Tx -> Rx | - |
//! | 5 | SetupData | Rx -> Tx | `SetupData` |

/// Receiver parameters that can be changed over the air
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RxParams {
    pub channel_order: u8,
    pub out_mode: u8,
    pub failsafe_mode: u8,
    pub buzzer: u8,
    pub power_dbm: i8,
}

impl RxParams {
    /// Encoded length
    pub const LEN: usize = 5;

    fn write(&self, out: &mut Vec<u8>) {
        out.push(self.channel_order);
        out.push(self.out_mode);
        out.push(self.failsafe_mode);
        out.push(self.buzzer);
        out.push(self.power_dbm as u8);
    }

    fn read(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN {
            return None;
        }
        Some(Self {
            channel_order: data[0],
            out_mode: data[1],
            failsafe_mode: data[2],
            buzzer: data[3],
            power_dbm: data[4] as i8,
        })
    }
}

/// Receiver description sent in response to setup requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SetupData {
    pub firmware_version: u32,
    pub device_id: u16,
    /// Output power the radio actually runs at
    pub actual_power_dbm: i8,
    pub params: RxParams,
}

impl SetupData {
    /// Encoded length
    pub const LEN: usize = 7 + RxParams::LEN;
}

/// Command ids
pub const CMD_GET_SETUP_DATA: u8 = 1;
pub const CMD_SET_PARAMS: u8 = 2;
pub const CMD_STORE_PARAMS: u8 = 3;
pub const CMD_GET_SETUP_DATA_WITH_RELOAD: u8 = 4;
pub const CMD_SETUP_DATA: u8 = 5;

/// A decoded command payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    GetSetupData,
    SetParams(RxParams),
    StoreParams,
    GetSetupDataWithReload,
    SetupData(SetupData),
}

impl Command {
    /// Command id byte
    pub fn id(&self) -> u8 {
        match self {
            Command::GetSetupData => CMD_GET_SETUP_DATA,
            Command::SetParams(_) => CMD_SET_PARAMS,
            Command::StoreParams => CMD_STORE_PARAMS,
            Command::GetSetupDataWithReload => CMD_GET_SETUP_DATA_WITH_RELOAD,
            Command::SetupData(_) => CMD_SETUP_DATA,
        }
    }

    /// Encode into a frame payload
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + SetupData::LEN);
        out.push(self.id());

        match self {
            Command::SetParams(params) => params.write(&mut out),
            Command::SetupData(setup) => {
                out.extend_from_slice(&setup.firmware_version.to_le_bytes());
                out.extend_from_slice(&setup.device_id.to_le_bytes());
                out.push(setup.actual_power_dbm as u8);
                setup.params.write(&mut out);
            }
            Command::GetSetupData | Command::StoreParams | Command::GetSetupDataWithReload => {}
        }

        out
    }

    /// Decode a frame payload
    ///
    /// # Returns
    ///
    /// * `Option<Command>` - `None` for unknown ids or truncated bodies
    pub fn decode(payload: &[u8]) -> Option<Self> {
        let (&id, body) = payload.split_first()?;

        match id {
            CMD_GET_SETUP_DATA => Some(Command::GetSetupData),
            CMD_SET_PARAMS => RxParams::read(body).map(Command::SetParams),
            CMD_STORE_PARAMS => Some(Command::StoreParams),
            CMD_GET_SETUP_DATA_WITH_RELOAD => Some(Command::GetSetupDataWithReload),
            CMD_SETUP_DATA => {
                if body.len() < SetupData::LEN {
                    return None;
                }
                let params = RxParams::read(&body[7..])?;
                Some(Command::SetupData(SetupData {
                    firmware_version: u32::from_le_bytes([body[0], body[1], body[2], body[3]]),
                    device_id: u16::from_le_bytes([body[4], body[5]]),
                    actual_power_dbm: body[6] as i8,
                    params,
                }))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::protocol::{FRAME_RX_PAYLOAD_LEN, FRAME_TX_PAYLOAD_LEN};

    fn sample_params() -> RxParams {
        RxParams {
            channel_order: 1,
            out_mode: 0,
            failsafe_mode: 2,
            buzzer: 1,
            power_dbm: -3,
        }
    }

    #[test]
    fn test_simple_commands() {
        assert_eq!(Command::GetSetupData.encode(), vec![CMD_GET_SETUP_DATA]);
        assert_eq!(Command::decode(&[CMD_STORE_PARAMS]), Some(Command::StoreParams));
        assert_eq!(
            Command::decode(&[CMD_GET_SETUP_DATA_WITH_RELOAD, 0xAA]),
            Some(Command::GetSetupDataWithReload),
            "Trailing bytes are ignored"
        );
    }

    #[test]
    fn test_set_params_body() {
        let encoded = Command::SetParams(sample_params()).encode();
        assert_eq!(encoded.len(), 1 + RxParams::LEN);
        assert_eq!(encoded[5], 0xFD, "Negative power is sent as two's complement");
        assert_eq!(Command::decode(&encoded), Some(Command::SetParams(sample_params())));
    }

    #[test]
    fn test_setup_data_body() {
        let setup = SetupData {
            firmware_version: 0x0001_0203,
            device_id: 0x4242,
            actual_power_dbm: 20,
            params: sample_params(),
        };
        let encoded = Command::SetupData(setup).encode();
        assert_eq!(encoded.len(), 1 + SetupData::LEN);
        assert_eq!(&encoded[1..5], &[0x03, 0x02, 0x01, 0x00]);
        assert_eq!(Command::decode(&encoded), Some(Command::SetupData(setup)));
    }

    #[test]
    fn test_truncated_and_unknown() {
        assert_eq!(Command::decode(&[]), None);
        assert_eq!(Command::decode(&[CMD_SET_PARAMS, 1, 2]), None);
        assert_eq!(Command::decode(&[0x7F]), None);
    }

    #[test]
    fn test_commands_fit_payloads() {
        assert!(1 + RxParams::LEN <= FRAME_TX_PAYLOAD_LEN);
        assert!(1 + SetupData::LEN <= FRAME_RX_PAYLOAD_LEN);
    }
}
