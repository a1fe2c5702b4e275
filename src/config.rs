//! # Configuration Module
//!
//! Handles loading, validating and storing the persisted setup (TOML), and
//! resolving it once at startup into the immutable runtime `LinkConfig`.

use serde::de::Error;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{LinkError, Result};
use crate::fhss::{FhssConfig, FrequencyBand};
use crate::frame::command::RxParams;
use crate::frame::crc::{crc16, crc16_accumulate};
use crate::frame::protocol::FRAME_LEN;
use crate::radio::RadioConfig;

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub link: LinkSection,
    #[serde(default)]
    pub fhss: FhssSection,
    #[serde(default)]
    pub radio: RadioSection,
    #[serde(default)]
    pub rx: RxSection,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub sim: SimConfig,
}

/// Link timing and connection configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LinkSection {
    #[serde(default = "default_frame_rate_ms")]
    pub frame_rate_ms: u16,

    #[serde(default = "default_bind_phrase")]
    pub bind_phrase: String,

    #[serde(default = "default_lq_averaging_ms")]
    pub lq_averaging_ms: u32,

    /// Consecutive valid frames needed to go from Sync to Connected
    #[serde(default = "default_connect_sync_cnt")]
    pub connect_sync_cnt: u8,

    /// Time without a valid frame before the link drops to Listen
    #[serde(default = "default_connect_tmo_ms")]
    pub connect_tmo_ms: u32,

    /// Cycles per hop while listening, derived from the channel count if unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listen_hop_cnt: Option<u16>,

    /// Header-only valid frames advance Sync and refresh the timeout
    #[serde(default = "default_crc1_counts_for_sync")]
    pub crc1_counts_for_sync: bool,

    #[serde(default = "default_send_frame_tmo_ms")]
    pub send_frame_tmo_ms: u16,
}

/// Hopping configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct FhssSection {
    #[serde(default = "default_band")]
    pub band: FrequencyBand,

    #[serde(default = "default_num_channels")]
    pub num_channels: u8,

    #[serde(default = "default_bind_bands")]
    pub bind_bands: Vec<FrequencyBand>,
}

/// Antenna usage
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AntennaMode {
    /// Both radios, diversity decides
    Diversity,
    Antenna1,
    Antenna2,
}

impl AntennaMode {
    pub fn uses_antenna1(self) -> bool {
        self != AntennaMode::Antenna2
    }

    pub fn uses_antenna2(self) -> bool {
        self != AntennaMode::Antenna1
    }
}

/// Radio configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RadioSection {
    #[serde(default = "default_antenna_mode")]
    pub antenna: AntennaMode,

    #[serde(default = "default_antenna_mode")]
    pub transmit_antenna: AntennaMode,

    #[serde(default = "default_power_dbm")]
    pub power_dbm: i8,
}

/// Channel order of the RC output
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChannelOrder {
    Aetr,
    Taer,
    Etar,
}

/// RC output protocol
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OutMode {
    Sbus,
    Crsf,
    SbusInverted,
}

/// What the RC output does after the link is lost
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailsafeMode {
    NoSignal,
    LowThrottle,
    AsConfigured,
    LowThrottleElseCenter,
}

/// Buzzer usage
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BuzzerMode {
    Off,
    Beep,
    LostPackets,
}

macro_rules! impl_u8_mapping {
    ($ty:ty, $($variant:path => $value:expr),+ $(,)?) => {
        impl $ty {
            /// Over-the-air representation
            pub fn to_u8(self) -> u8 {
                match self {
                    $($variant => $value,)+
                }
            }

            /// Parse the over-the-air representation
            pub fn from_u8(value: u8) -> Option<Self> {
                match value {
                    $($value => Some($variant),)+
                    _ => None,
                }
            }
        }
    };
}

impl_u8_mapping!(ChannelOrder, ChannelOrder::Aetr => 0, ChannelOrder::Taer => 1, ChannelOrder::Etar => 2);
impl_u8_mapping!(OutMode, OutMode::Sbus => 0, OutMode::Crsf => 1, OutMode::SbusInverted => 2);
impl_u8_mapping!(
    FailsafeMode,
    FailsafeMode::NoSignal => 0,
    FailsafeMode::LowThrottle => 1,
    FailsafeMode::AsConfigured => 2,
    FailsafeMode::LowThrottleElseCenter => 3,
);
impl_u8_mapping!(BuzzerMode, BuzzerMode::Off => 0, BuzzerMode::Beep => 1, BuzzerMode::LostPackets => 2);

/// Receiver configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RxSection {
    #[serde(default = "default_channel_order")]
    pub channel_order: ChannelOrder,

    #[serde(default = "default_out_mode")]
    pub out_mode: OutMode,

    #[serde(default = "default_failsafe_mode")]
    pub failsafe_mode: FailsafeMode,

    #[serde(default = "default_buzzer")]
    pub buzzer: BuzzerMode,

    #[serde(default = "default_auto_bind")]
    pub auto_bind: bool,

    #[serde(default = "default_auto_bind_timeout_s")]
    pub auto_bind_timeout_s: u32,

    #[serde(default)]
    pub device_id: u16,
}

/// Stats logging configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,

    #[serde(default = "default_log_interval_ms")]
    pub log_interval_ms: u64,

    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Channel model of the host simulator
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SimConfig {
    #[serde(default = "default_sim_rssi_a1")]
    pub rssi_a1: i8,

    #[serde(default = "default_sim_rssi_a2")]
    pub rssi_a2: i8,

    #[serde(default = "default_sim_snr")]
    pub snr: i8,

    /// Frames lost per 100, per antenna
    #[serde(default)]
    pub loss_percent: u8,

    /// Frames with a corrupted payload per 100, per antenna
    #[serde(default)]
    pub corrupt_percent: u8,

    /// 0 runs until Ctrl+C
    #[serde(default)]
    pub run_time_s: u64,
}

// Default value functions
fn default_frame_rate_ms() -> u16 { 20 }
fn default_bind_phrase() -> String { "mlrs.0".to_string() }
fn default_lq_averaging_ms() -> u32 { 1000 }
fn default_connect_sync_cnt() -> u8 { 5 }
fn default_connect_tmo_ms() -> u32 { 500 }
fn default_crc1_counts_for_sync() -> bool { true }
fn default_send_frame_tmo_ms() -> u16 { 10 }

fn default_band() -> FrequencyBand { FrequencyBand::Ism2400 }
fn default_num_channels() -> u8 { 24 }
fn default_bind_bands() -> Vec<FrequencyBand> { vec![FrequencyBand::Ism2400] }

fn default_antenna_mode() -> AntennaMode { AntennaMode::Diversity }
fn default_power_dbm() -> i8 { 10 }

fn default_channel_order() -> ChannelOrder { ChannelOrder::Aetr }
fn default_out_mode() -> OutMode { OutMode::Crsf }
fn default_failsafe_mode() -> FailsafeMode { FailsafeMode::NoSignal }
fn default_buzzer() -> BuzzerMode { BuzzerMode::Off }
fn default_auto_bind() -> bool { true }
fn default_auto_bind_timeout_s() -> u32 { 60 }

fn default_telemetry_enabled() -> bool { false }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }
fn default_log_interval_ms() -> u64 { 1000 }
fn default_log_format() -> String { "jsonl".to_string() }

fn default_sim_rssi_a1() -> i8 { -70 }
fn default_sim_rssi_a2() -> i8 { -78 }
fn default_sim_snr() -> i8 { 8 }

impl Default for LinkSection {
    fn default() -> Self {
        Self {
            frame_rate_ms: default_frame_rate_ms(),
            bind_phrase: default_bind_phrase(),
            lq_averaging_ms: default_lq_averaging_ms(),
            connect_sync_cnt: default_connect_sync_cnt(),
            connect_tmo_ms: default_connect_tmo_ms(),
            listen_hop_cnt: None,
            crc1_counts_for_sync: default_crc1_counts_for_sync(),
            send_frame_tmo_ms: default_send_frame_tmo_ms(),
        }
    }
}

impl Default for FhssSection {
    fn default() -> Self {
        Self {
            band: default_band(),
            num_channels: default_num_channels(),
            bind_bands: default_bind_bands(),
        }
    }
}

impl Default for RadioSection {
    fn default() -> Self {
        Self {
            antenna: default_antenna_mode(),
            transmit_antenna: default_antenna_mode(),
            power_dbm: default_power_dbm(),
        }
    }
}

impl Default for RxSection {
    fn default() -> Self {
        Self {
            channel_order: default_channel_order(),
            out_mode: default_out_mode(),
            failsafe_mode: default_failsafe_mode(),
            buzzer: default_buzzer(),
            auto_bind: default_auto_bind(),
            auto_bind_timeout_s: default_auto_bind_timeout_s(),
            device_id: 0,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
            log_interval_ms: default_log_interval_ms(),
            format: default_log_format(),
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            rssi_a1: default_sim_rssi_a1(),
            rssi_a2: default_sim_rssi_a2(),
            snr: default_sim_snr(),
            loss_percent: 0,
            corrupt_percent: 0,
            run_time_s: 0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            link: LinkSection::default(),
            fhss: FhssSection::default(),
            radio: RadioSection::default(),
            rx: RxSection::default(),
            telemetry: TelemetryConfig::default(),
            sim: SimConfig::default(),
        }
    }
}

fn invalid<T: std::fmt::Display>(msg: T) -> LinkError {
    LinkError::Config(toml::de::Error::custom(msg))
}

/// Characters allowed in a bind phrase
pub fn is_bind_phrase_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || "#-._".contains(c)
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use hoplink::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as TOML
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid or the file cannot be written
    pub fn store<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;
        let contents = toml::to_string(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        let link = &self.link;

        if link.frame_rate_ms < 5 || link.frame_rate_ms > 200 {
            return Err(invalid("frame_rate_ms must be between 5 and 200"));
        }

        if link.bind_phrase.len() != 6 || !link.bind_phrase.chars().all(is_bind_phrase_char) {
            return Err(invalid("bind_phrase must be 6 characters of a-z, 0-9, #, -, ., _"));
        }

        if link.lq_averaging_ms < link.frame_rate_ms as u32 || link.lq_averaging_ms > 10000 {
            return Err(invalid("lq_averaging_ms must be between frame_rate_ms and 10000"));
        }

        if link.connect_sync_cnt == 0 || link.connect_sync_cnt > 50 {
            return Err(invalid("connect_sync_cnt must be between 1 and 50"));
        }

        if link.connect_tmo_ms < 2 * link.frame_rate_ms as u32 || link.connect_tmo_ms > 10000 {
            return Err(invalid("connect_tmo_ms must be between 2 frame periods and 10000"));
        }

        if let Some(cnt) = link.listen_hop_cnt {
            if cnt == 0 || cnt > 1000 {
                return Err(invalid("listen_hop_cnt must be between 1 and 1000"));
            }
        }

        if link.send_frame_tmo_ms == 0 || link.send_frame_tmo_ms >= link.frame_rate_ms {
            return Err(invalid("send_frame_tmo_ms must be between 1 and frame_rate_ms"));
        }

        // Validate hopping
        let available = self.fhss.band.channel_count() - 1;
        if self.fhss.num_channels < 2 || self.fhss.num_channels > available {
            return Err(invalid(format!(
                "num_channels must be between 2 and {} for {:?}",
                available, self.fhss.band
            )));
        }

        if self.fhss.bind_bands.is_empty() {
            return Err(invalid("bind_bands cannot be empty"));
        }

        if self.radio.power_dbm < -10 || self.radio.power_dbm > 30 {
            return Err(invalid("power_dbm must be between -10 and 30"));
        }

        if self.rx.auto_bind_timeout_s == 0 || self.rx.auto_bind_timeout_s > 3600 {
            return Err(invalid("auto_bind_timeout_s must be between 1 and 3600"));
        }

        // Validate telemetry
        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.log_interval_ms == 0 || self.telemetry.log_interval_ms > 60000 {
            return Err(invalid("log_interval_ms must be between 1 and 60000"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if self.telemetry.format != "jsonl" {
            return Err(invalid("log format must be 'jsonl' (only supported format)"));
        }

        if self.sim.loss_percent > 100 || self.sim.corrupt_percent > 100 {
            return Err(invalid("sim loss_percent and corrupt_percent must be at most 100"));
        }

        Ok(())
    }

    /// Receiver parameters as carried in command frames
    pub fn rx_params(&self) -> RxParams {
        RxParams {
            channel_order: self.rx.channel_order.to_u8(),
            out_mode: self.rx.out_mode.to_u8(),
            failsafe_mode: self.rx.failsafe_mode.to_u8(),
            buzzer: self.rx.buzzer.to_u8(),
            power_dbm: self.radio.power_dbm,
        }
    }

    /// Apply parameters received in a SetParams command.
    ///
    /// Unknown values keep the current setting.
    pub fn apply_rx_params(&mut self, params: &RxParams) {
        if let Some(order) = ChannelOrder::from_u8(params.channel_order) {
            self.rx.channel_order = order;
        }
        if let Some(mode) = OutMode::from_u8(params.out_mode) {
            self.rx.out_mode = mode;
        }
        if let Some(mode) = FailsafeMode::from_u8(params.failsafe_mode) {
            self.rx.failsafe_mode = mode;
        }
        if let Some(buzzer) = BuzzerMode::from_u8(params.buzzer) {
            self.rx.buzzer = buzzer;
        }
        if (-10..=30).contains(&params.power_dbm) {
            self.radio.power_dbm = params.power_dbm;
        }
    }

    /// Resolve the runtime configuration
    pub fn resolve(&self) -> LinkConfig {
        let link = &self.link;
        let (sync_word, seed) = derive_session_ids(&link.bind_phrase);
        let frame_rate_ms = link.frame_rate_ms.max(1);

        let listen_hop_cnt = link
            .listen_hop_cnt
            .unwrap_or((self.fhss.num_channels as u16 * 3).div_ceil(2))
            .max(1);

        LinkConfig {
            frame_rate_ms,
            frame_rate_hz: (1000 / frame_rate_ms).max(1),
            sync_word,
            fhss: FhssConfig {
                band: self.fhss.band,
                seed,
                num_channels: self.fhss.num_channels,
                bind_bands: self.fhss.bind_bands.clone(),
            },
            lq_averaging_period: (link.lq_averaging_ms / frame_rate_ms as u32).max(1) as usize,
            connect_sync_cnt: link.connect_sync_cnt,
            connect_tmo_systicks: link.connect_tmo_ms,
            connect_listen_hop_cnt: listen_hop_cnt,
            receive_antenna: self.radio.antenna,
            transmit_antenna: self.radio.transmit_antenna,
            crc1_counts_for_sync: link.crc1_counts_for_sync,
            send_frame_tmo_ms: link.send_frame_tmo_ms,
            radio: RadioConfig {
                power_dbm: self.radio.power_dbm,
                frame_len: FRAME_LEN as u8,
            },
            rx_params: self.rx_params(),
            buzzer: self.rx.buzzer,
            auto_bind_tmo_ms: self.rx.auto_bind.then_some(self.rx.auto_bind_timeout_s * 1000),
            device_id: self.rx.device_id,
        }
    }
}

/// Sync word and hop seed derived from the bind phrase
pub fn derive_session_ids(bind_phrase: &str) -> (u16, u32) {
    let bytes = bind_phrase.as_bytes();
    let low = crc16(bytes);
    let high = crc16_accumulate(!low, bytes);
    let seed = ((high as u32) << 16) | low as u32;
    (low, seed)
}

/// Runtime configuration resolved once at startup
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    pub frame_rate_ms: u16,
    pub frame_rate_hz: u16,
    pub sync_word: u16,
    pub fhss: FhssConfig,
    /// LQ averaging period in frames
    pub lq_averaging_period: usize,
    pub connect_sync_cnt: u8,
    /// Systicks (ms) without a valid frame before dropping to Listen
    pub connect_tmo_systicks: u32,
    /// Cycles per hop while listening
    pub connect_listen_hop_cnt: u16,
    pub receive_antenna: AntennaMode,
    pub transmit_antenna: AntennaMode,
    pub crc1_counts_for_sync: bool,
    pub send_frame_tmo_ms: u16,
    pub radio: RadioConfig,
    pub rx_params: RxParams,
    pub buzzer: BuzzerMode,
    /// `None` when auto bind is disabled
    pub auto_bind_tmo_ms: Option<u32>,
    pub device_id: u16,
}

impl LinkConfig {
    /// A second radio is required by the antenna setup
    pub fn needs_antenna2(&self) -> bool {
        self.receive_antenna.uses_antenna2() || self.transmit_antenna.uses_antenna2()
    }

    /// The primary radio is required by the antenna setup
    pub fn needs_antenna1(&self) -> bool {
        self.receive_antenna.uses_antenna1() || self.transmit_antenna.uses_antenna1()
    }
}
