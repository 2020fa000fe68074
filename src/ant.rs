use crate::{
    error::{ErgcastError, Result},
    types::{AntChannelConfig, FeState, MetricsSnapshot, SessionStatus},
};
use bytes::{BufMut, Bytes, BytesMut};
use std::borrow::Cow;
use tracing::{debug, error};

/// Lap toggle, bit 7 of the capability byte
pub const LAP_BIT: u8 = 0b1000_0000;

/// Page 16 capability flags: no heart rate, distance sent, speed is real
pub const PAGE_16_FLAGS: u8 = 0b0100;

/// Page 22 capability flags: stroke count sent
pub const PAGE_22_FLAGS: u8 = 0b0001;

/// Equipment type field of page 16: rower
pub const EQUIPMENT_TYPE_ROWER: u8 = 0x16;

/// ANT serial sync byte
pub const ANT_SYNC: u8 = 0xA4;

/// Broadcast page rotation mandated for FE-C rowers
///
/// Pages 16 and 22 go out at roughly 2 Hz and 1 Hz, page 17 at 1 Hz, and the
/// common pages 80 and 81 about twice a minute at a 4 Hz channel period.
pub const PAGE_ROTATION: [u8; 132] = [
    16, 16, 22, 17, 16, 16, 17, 22, 16, 16, 22, 17, 16, 16, 17, 22, 16, 16, 22, 17, 16, 16, 17,
    22, 16, 16, 22, 17, 16, 16, 17, 22, 16, 16, 22, 17, 16, 16, 17, 22, 16, 16, 22, 17, 16, 16,
    17, 22, 16, 16, 22, 17, 16, 16, 17, 22, 16, 16, 22, 17, 16, 16, 17, 22, 80, 80, 16, 16, 22,
    17, 16, 16, 17, 22, 16, 16, 22, 17, 16, 16, 17, 22, 16, 16, 22, 17, 16, 16, 17, 22, 16, 16,
    22, 17, 16, 16, 17, 22, 16, 16, 22, 17, 16, 16, 17, 22, 16, 16, 22, 17, 16, 16, 17, 22, 16,
    16, 22, 17, 16, 16, 17, 22, 16, 16, 22, 17, 16, 16, 17, 22, 81, 81,
];

/// FE-C data pages produced by the encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    /// General FE data
    GeneralFe = 0x10,
    /// General settings
    Settings = 0x11,
    /// Rower specific data
    RowerSpecific = 0x16,
    /// Common page: manufacturer identification
    ManufacturerId = 0x50,
    /// Common page: product information
    ProductInfo = 0x51,
}

impl TryFrom<u8> for PageType {
    type Error = ErgcastError;

    fn try_from(page: u8) -> Result<Self> {
        match page {
            0x10 => Ok(Self::GeneralFe),
            0x11 => Ok(Self::Settings),
            0x16 => Ok(Self::RowerSpecific),
            0x50 => Ok(Self::ManufacturerId),
            0x51 => Ok(Self::ProductInfo),
            _ => Err(ErgcastError::UnknownPage { page }),
        }
    }
}

/// Operating state and lap toggle announced in every page
///
/// The state changes only through [`SessionState::apply`], which must run once
/// per metrics update. A status different from the previous one flips the lap
/// bit exactly once; repeating a status leaves it alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionState {
    status: SessionStatus,
    fe_state: FeState,
    lap: u8,
}

impl SessionState {
    /// Ready, lap bit clear, waiting for a session
    #[must_use]
    pub const fn new() -> Self {
        Self {
            status: SessionStatus::WaitingForStart,
            fe_state: FeState::Ready,
            lap: 0,
        }
    }

    /// Fold a new session status into the state
    pub fn apply(&mut self, status: SessionStatus) {
        // the lap bit is flipped before it is combined with the new state
        let mut lap = self.capability_byte() & LAP_BIT;
        if self.status != status {
            lap ^= LAP_BIT;
            debug!("Lap bit flipped: {} -> {}", self.status, status);
        }

        if status == SessionStatus::Unrecognized {
            error!("No valid FE state for session status {}, using Ready", status);
        }

        self.fe_state = FeState::from(status);
        self.lap = lap;
        self.status = status;
    }

    /// Return to Ready as if a lap had completed
    pub fn reset(&mut self) {
        self.lap ^= LAP_BIT;
        self.fe_state = FeState::Ready;
        self.status = SessionStatus::WaitingForStart;
    }

    /// Last applied status
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Current FE state
    #[must_use]
    pub const fn fe_state(&self) -> FeState {
        self.fe_state
    }

    /// Whether the lap bit is set
    #[must_use]
    pub const fn lap(&self) -> bool {
        self.lap != 0
    }

    /// FE state bits combined with the lap bit
    #[must_use]
    pub const fn capability_byte(&self) -> u8 {
        self.fe_state.bits() | self.lap
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics converted to FE-C units
///
/// Rollover fields wrap modulo 256, other fields saturate at their width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageFields {
    /// Elapsed time in 0.25 s, rolls over
    pub elapsed_time: u8,
    /// Distance in meters, rolls over
    pub distance: u8,
    /// Stroke count, rolls over
    pub strokes: u8,
    /// Speed in 0.001 m/s
    pub speed: u16,
    /// Stroke rate in strokes per minute
    pub stroke_rate: u8,
    /// Power in watts
    pub power: u16,
    /// Stroke length in 0.01 m
    pub stroke_length: u8,
    /// Drag factor as resistance, 0.5 % per unit
    pub resistance: u8,
}

impl From<&MetricsSnapshot> for PageFields {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn from(metrics: &MetricsSnapshot) -> Self {
        Self {
            elapsed_time: rollover((metrics.total_moving_time * 4.0).trunc() as u64),
            distance: rollover(metrics.total_linear_distance.trunc() as u64),
            strokes: rollover(metrics.total_number_of_strokes),
            speed: (metrics.cycle_linear_velocity * 1000.0).round() as u16,
            stroke_rate: metrics.cycle_stroke_rate.round() as u8,
            power: metrics.cycle_power.round() as u16,
            stroke_length: (metrics.drive_length * 100.0).round() as u8,
            resistance: (metrics.drag_factor - 50.0).round() as u8,
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn rollover(value: u64) -> u8 {
    (value & 0xFF) as u8
}

/// One broadcast page: channel number followed by 8 data bytes
pub type AntPage = [u8; 9];

/// Encode one FE-C page
#[must_use]
pub fn encode_page(
    page: PageType,
    channel: u8,
    fields: &PageFields,
    session: &SessionState,
) -> AntPage {
    let caps = session.capability_byte();

    match page {
        PageType::GeneralFe => {
            let [speed_lo, speed_hi] = fields.speed.to_le_bytes();
            [
                channel,
                page as u8,
                EQUIPMENT_TYPE_ROWER,
                fields.elapsed_time,
                fields.distance,
                speed_lo,
                speed_hi,
                0xFF, // no heart rate
                caps | PAGE_16_FLAGS,
            ]
        }
        PageType::Settings => [
            channel,
            page as u8,
            0xFF,
            0xFF,
            fields.stroke_length,
            0xFF, // incline 0x7FFF: not used
            0x7F,
            fields.resistance,
            caps,
        ],
        PageType::RowerSpecific => {
            let [power_lo, power_hi] = fields.power.to_le_bytes();
            [
                channel,
                page as u8,
                0xFF,
                0xFF,
                fields.strokes,
                fields.stroke_rate,
                power_lo,
                power_hi,
                caps | PAGE_22_FLAGS,
            ]
        }
        // hardware revision 1, manufacturer 255 (development), model 1
        PageType::ManufacturerId => [channel, page as u8, 0xFF, 0xFF, 0x01, 0xFF, 0x00, 0x01, 0x00],
        // software version 10, no serial number
        PageType::ProductInfo => [channel, page as u8, 0xFF, 0xFF, 0x0A, 0xFF, 0xFF, 0xFF, 0xFF],
    }
}

/// Position in the page rotation
#[derive(Debug, Clone)]
pub struct BroadcastCycle {
    table: Cow<'static, [u8]>,
    index: usize,
}

impl BroadcastCycle {
    /// Cycle over [`PAGE_ROTATION`]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            table: Cow::Borrowed(&PAGE_ROTATION),
            index: 0,
        }
    }

    /// Cycle over a custom table of page ids
    ///
    /// Page ids are not checked here; an unknown id fails the tick that selects it.
    ///
    /// # Errors
    ///
    /// Returns [`ErgcastError::EmptyRotation`] if `table` is empty.
    pub fn with_table(table: impl Into<Cow<'static, [u8]>>) -> Result<Self> {
        let table = table.into();
        if table.is_empty() {
            return Err(ErgcastError::EmptyRotation);
        }
        Ok(Self { table, index: 0 })
    }

    /// Page id selected for the current tick
    #[must_use]
    pub fn current(&self) -> u8 {
        self.table[self.index]
    }

    /// Current index, always below [`Self::len`]
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Table length
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Always false, tables are never empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Move to the next entry, wrapping at the end of the table
    pub fn advance(&mut self) {
        self.index = (self.index + 1) % self.table.len();
    }

    /// Back to the first entry
    pub fn reset(&mut self) {
        self.index = 0;
    }
}

impl Default for BroadcastCycle {
    fn default() -> Self {
        Self::new()
    }
}

/// ANT serial message ids used by the broadcaster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageId {
    /// Unassign channel
    UnassignChannel = 0x41,
    /// Assign channel
    AssignChannel = 0x42,
    /// Channel period
    ChannelPeriod = 0x43,
    /// Channel RF frequency
    ChannelRfFrequency = 0x45,
    /// Open channel
    OpenChannel = 0x4B,
    /// Close channel
    CloseChannel = 0x4C,
    /// Broadcast data
    BroadcastData = 0x4E,
    /// Channel id
    ChannelId = 0x51,
}

/// Channel type for a bidirectional master (transmit) channel
const CHANNEL_TYPE_TRANSMIT: u8 = 0x10;

/// ANT serial message: sync, length, id, content, XOR checksum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AntMessage {
    /// Message id
    pub id: MessageId,
    /// Message content
    pub content: Vec<u8>,
}

impl AntMessage {
    /// Create a message
    #[must_use]
    pub const fn new(id: MessageId, content: Vec<u8>) -> Self {
        Self { id, content }
    }

    /// Broadcast a data page
    #[must_use]
    pub fn broadcast_data(page: &AntPage) -> Self {
        Self::new(MessageId::BroadcastData, page.to_vec())
    }

    /// Messages that configure and open the broadcast channel
    #[must_use]
    pub fn channel_setup(config: &AntChannelConfig) -> Vec<Self> {
        let ch = config.channel;
        let [num_lo, num_hi] = config.device_number.to_le_bytes();
        let [period_lo, period_hi] = config.period.to_le_bytes();

        vec![
            Self::new(MessageId::AssignChannel, vec![ch, CHANNEL_TYPE_TRANSMIT, 0x00]),
            Self::new(
                MessageId::ChannelId,
                vec![ch, num_lo, num_hi, config.device_type, config.transmission_type],
            ),
            Self::new(MessageId::ChannelRfFrequency, vec![ch, config.rf_frequency]),
            Self::new(MessageId::ChannelPeriod, vec![ch, period_lo, period_hi]),
            Self::new(MessageId::OpenChannel, vec![ch]),
        ]
    }

    /// Messages that close and release the broadcast channel
    #[must_use]
    pub fn channel_teardown(config: &AntChannelConfig) -> Vec<Self> {
        vec![
            Self::new(MessageId::CloseChannel, vec![config.channel]),
            Self::new(MessageId::UnassignChannel, vec![config.channel]),
        ]
    }

    /// Serialize to the serial wire format
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.content.len() + 4);

        buf.put_u8(ANT_SYNC);
        buf.put_u8(self.content.len() as u8);
        buf.put_u8(self.id as u8);
        buf.extend_from_slice(&self.content);

        let checksum = buf.iter().fold(0, |acc, byte| acc ^ byte);
        buf.put_u8(checksum);

        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rowing_metrics() -> MetricsSnapshot {
        MetricsSnapshot {
            status: SessionStatus::Rowing,
            total_moving_time: 10.0,
            total_number_of_strokes: 5,
            total_linear_distance: 50.0,
            cycle_stroke_rate: 24.0,
            cycle_linear_velocity: 3.2,
            cycle_power: 150.0,
            drag_factor: 130.0,
            drive_length: 1.2,
        }
    }

    #[test]
    fn test_initial_session_state() {
        let session = SessionState::new();
        assert_eq!(session.status(), SessionStatus::WaitingForStart);
        assert_eq!(session.fe_state(), FeState::Ready);
        assert!(!session.lap());
        assert_eq!(session.capability_byte(), 0x20);
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (SessionStatus::Rowing, FeState::InUse),
            (SessionStatus::WaitingForStart, FeState::Ready),
            (SessionStatus::Paused, FeState::Finished),
            (SessionStatus::Stopped, FeState::Finished),
            (SessionStatus::Unrecognized, FeState::Ready),
        ];

        for (status, expected) in cases {
            let mut session = SessionState::new();
            session.apply(status);
            assert_eq!(session.fe_state(), expected, "status {status}");
        }
    }

    #[test]
    fn test_lap_bit_flips_once_per_transition() {
        use SessionStatus::{Paused, Rowing, Stopped, WaitingForStart};

        let sequence = [
            WaitingForStart,
            WaitingForStart,
            Rowing,
            Rowing,
            Rowing,
            Paused,
            Rowing,
            Rowing,
            Stopped,
            Stopped,
            WaitingForStart,
        ];

        let mut session = SessionState::new();
        let mut previous = SessionStatus::WaitingForStart;
        let mut flips = 0;

        for status in sequence {
            let lap_before = session.lap();
            session.apply(status);

            let flipped = lap_before != session.lap();
            assert_eq!(flipped, previous != status, "{previous} -> {status}");
            if flipped {
                flips += 1;
            }
            previous = status;
        }

        assert_eq!(flips, 5);
        assert!(session.lap());
    }

    #[test]
    fn test_capability_byte_combines_lap_and_state() {
        let mut session = SessionState::new();

        session.apply(SessionStatus::Rowing);
        assert_eq!(session.capability_byte(), 0x80 | 0x30);

        session.apply(SessionStatus::Paused);
        assert_eq!(session.capability_byte(), 0x50);

        session.apply(SessionStatus::Paused);
        assert_eq!(session.capability_byte(), 0x50);
    }

    #[test]
    fn test_reset_counts_as_lap() {
        let mut session = SessionState::new();
        session.apply(SessionStatus::Rowing);
        assert!(session.lap());

        session.reset();
        assert!(!session.lap());
        assert_eq!(session.fe_state(), FeState::Ready);
        assert_eq!(session.status(), SessionStatus::WaitingForStart);

        // the reset already moved to WaitingForStart, so no second flip
        session.apply(SessionStatus::WaitingForStart);
        assert!(!session.lap());
    }

    #[test]
    fn test_page_fields_units() {
        let fields = PageFields::from(&rowing_metrics());

        assert_eq!(fields.elapsed_time, 40);
        assert_eq!(fields.distance, 50);
        assert_eq!(fields.strokes, 5);
        assert_eq!(fields.speed, 3200);
        assert_eq!(fields.stroke_rate, 24);
        assert_eq!(fields.power, 150);
        assert_eq!(fields.stroke_length, 120);
        assert_eq!(fields.resistance, 80);
    }

    #[test]
    fn test_rollover_fields_wrap_modulo_256() {
        for raw in [0u64, 1, 255, 256, 257, 1_000, 65_535, 1_000_003] {
            let metrics = MetricsSnapshot {
                total_moving_time: raw as f64 / 4.0,
                total_linear_distance: raw as f64 + 0.9,
                total_number_of_strokes: raw,
                ..MetricsSnapshot::default()
            };
            let fields = PageFields::from(&metrics);
            let expected = (raw % 256) as u8;

            assert_eq!(fields.elapsed_time, expected, "time {raw}");
            assert_eq!(fields.distance, expected, "distance {raw}");
            assert_eq!(fields.strokes, expected, "strokes {raw}");
        }
    }

    #[test]
    fn test_elapsed_time_truncates_quarter_seconds() {
        let metrics = MetricsSnapshot {
            total_moving_time: 10.99,
            ..MetricsSnapshot::default()
        };
        assert_eq!(PageFields::from(&metrics).elapsed_time, 43);
    }

    #[test]
    fn test_out_of_range_fields_saturate() {
        let metrics = MetricsSnapshot {
            drag_factor: 20.0,
            drive_length: 4.0,
            cycle_linear_velocity: 100.0,
            ..MetricsSnapshot::default()
        };
        let fields = PageFields::from(&metrics);

        assert_eq!(fields.resistance, 0);
        assert_eq!(fields.stroke_length, 255);
        assert_eq!(fields.speed, u16::MAX);
    }

    #[test]
    fn test_general_fe_page_for_rowing_metrics() {
        let metrics = rowing_metrics();
        let mut session = SessionState::new();
        session.apply(metrics.status);

        let page = encode_page(PageType::GeneralFe, 1, &PageFields::from(&metrics), &session);
        // 3200 mm/s = 0x0C80; Ready -> Rowing flipped the lap bit: 0x80 | 0x30 | 0x04
        assert_eq!(page, [1, 0x10, 0x16, 0x28, 0x32, 0x80, 0x0C, 0xFF, 0xB4]);
    }

    #[test]
    fn test_settings_page() {
        let metrics = rowing_metrics();
        let mut session = SessionState::new();
        session.apply(metrics.status);

        let page = encode_page(PageType::Settings, 1, &PageFields::from(&metrics), &session);
        assert_eq!(page, [1, 0x11, 0xFF, 0xFF, 120, 0xFF, 0x7F, 80, 0xB0]);
    }

    #[test]
    fn test_rower_specific_page() {
        let metrics = MetricsSnapshot {
            cycle_power: 300.4,
            total_number_of_strokes: 261,
            ..rowing_metrics()
        };
        let mut session = SessionState::new();
        session.apply(metrics.status);

        let page = encode_page(
            PageType::RowerSpecific,
            2,
            &PageFields::from(&metrics),
            &session,
        );
        assert_eq!(page, [2, 0x16, 0xFF, 0xFF, 5, 24, 0x2C, 0x01, 0xB1]);
    }

    #[test]
    fn test_common_pages_are_constant() {
        let session = SessionState::new();
        let fields = PageFields::from(&rowing_metrics());

        assert_eq!(
            encode_page(PageType::ManufacturerId, 1, &fields, &session),
            [1, 0x50, 0xFF, 0xFF, 0x01, 0xFF, 0x00, 0x01, 0x00]
        );
        assert_eq!(
            encode_page(PageType::ProductInfo, 1, &fields, &session),
            [1, 0x51, 0xFF, 0xFF, 0x0A, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn test_page_type_from_u8() {
        assert_eq!(PageType::try_from(16).unwrap(), PageType::GeneralFe);
        assert_eq!(PageType::try_from(17).unwrap(), PageType::Settings);
        assert_eq!(PageType::try_from(22).unwrap(), PageType::RowerSpecific);
        assert_eq!(PageType::try_from(80).unwrap(), PageType::ManufacturerId);
        assert_eq!(PageType::try_from(81).unwrap(), PageType::ProductInfo);
        assert!(matches!(
            PageType::try_from(25),
            Err(ErgcastError::UnknownPage { page: 25 })
        ));
    }

    #[test]
    fn test_rotation_table_contents() {
        assert_eq!(PAGE_ROTATION.len(), 132);
        assert!(PAGE_ROTATION.iter().all(|&p| PageType::try_from(p).is_ok()));

        let count = |page: u8| PAGE_ROTATION.iter().filter(|&&p| p == page).count();
        assert_eq!(count(16), 64);
        assert_eq!(count(17), 32);
        assert_eq!(count(22), 32);
        assert_eq!(count(80), 2);
        assert_eq!(count(81), 2);

        assert_eq!(&PAGE_ROTATION[64..66], &[80, 80]);
        assert_eq!(&PAGE_ROTATION[130..], &[81, 81]);
    }

    #[test]
    fn test_rotation_is_periodic() {
        let mut cycle = BroadcastCycle::new();
        let len = cycle.len();

        for _ in 0..7 {
            cycle.advance();
        }

        let mut first = Vec::with_capacity(len);
        for _ in 0..len {
            assert!(cycle.index() < len);
            first.push(cycle.current());
            cycle.advance();
        }

        let mut second = Vec::with_capacity(len);
        for _ in 0..len {
            second.push(cycle.current());
            cycle.advance();
        }

        assert_eq!(first, second);
    }

    #[test]
    fn test_cycle_wraps_and_resets() {
        let mut cycle = BroadcastCycle::with_table(vec![16, 22]).unwrap();
        assert_eq!(cycle.current(), 16);
        cycle.advance();
        assert_eq!(cycle.current(), 22);
        cycle.advance();
        assert_eq!(cycle.index(), 0);

        cycle.advance();
        cycle.reset();
        assert_eq!(cycle.index(), 0);

        assert!(matches!(
            BroadcastCycle::with_table(Vec::<u8>::new()),
            Err(ErgcastError::EmptyRotation)
        ));
    }

    #[test]
    fn test_broadcast_message_wire_format() {
        let page = [1, 0x10, 0x16, 0x28, 0x32, 0x80, 0x0C, 0xFF, 0xB4];
        let bytes = AntMessage::broadcast_data(&page).to_bytes();

        assert_eq!(bytes.len(), 13);
        assert_eq!(&bytes[..3], &[0xA4, 9, 0x4E]);
        assert_eq!(&bytes[3..12], &page);
        assert_eq!(bytes.iter().fold(0u8, |acc, b| acc ^ b), 0);
    }

    #[test]
    fn test_channel_setup_messages() {
        let config = AntChannelConfig::default();
        let setup: Vec<Bytes> = AntMessage::channel_setup(&config)
            .iter()
            .map(AntMessage::to_bytes)
            .collect();

        assert_eq!(setup.len(), 5);
        assert_eq!(&setup[0][..6], &[0xA4, 3, 0x42, 1, 0x10, 0x00]);
        // device number 11234 = 0x2BE2
        assert_eq!(&setup[1][..8], &[0xA4, 5, 0x51, 1, 0xE2, 0x2B, 0x11, 0x01]);
        assert_eq!(&setup[2][..5], &[0xA4, 2, 0x45, 1, 57]);
        assert_eq!(&setup[3][..6], &[0xA4, 3, 0x43, 1, 0x00, 0x20]);
        assert_eq!(&setup[4][..4], &[0xA4, 1, 0x4B, 1]);

        let teardown: Vec<MessageId> = AntMessage::channel_teardown(&config)
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(
            teardown,
            vec![MessageId::CloseChannel, MessageId::UnassignChannel]
        );
    }
}
