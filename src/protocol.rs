use crate::{
    error::{CyclingError, Result},
    physics::{DEFAULT_CRR, RHO},
    types::{BikeType, SimulationParameters, UpdateRequest},
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use uuid::Uuid;

/// Fitness Machine Service
pub const FTMS_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1826_0000_1000_8000_0080_5f9b_34fb);

/// Fitness Machine Control Point characteristic
pub const FTMS_CONTROL_POINT_UUID: Uuid = Uuid::from_u128(0x0000_2ad9_0000_1000_8000_0080_5f9b_34fb);

/// Indoor Bike Data characteristic
pub const INDOOR_BIKE_DATA_UUID: Uuid = Uuid::from_u128(0x0000_2ad2_0000_1000_8000_0080_5f9b_34fb);

/// Control point opcodes used when driving a trainer
///
/// Only the subset needed to forward a normalized [`UpdateRequest`] is modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ControlOpcode {
    /// Take control of the machine
    RequestControl = 0x00,
    /// Reset the machine to its idle state
    Reset = 0x01,
    /// Hold a target power (ERG)
    SetTargetPower = 0x05,
    /// Start or resume a session
    StartOrResume = 0x07,
    /// Wind, grade, rolling resistance and wind resistance
    SetIndoorBikeSimulation = 0x11,
    /// Indication sent back by the machine
    ResponseCode = 0x80,
}

impl ControlOpcode {
    /// Convert from u8
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::RequestControl),
            0x01 => Some(Self::Reset),
            0x05 => Some(Self::SetTargetPower),
            0x07 => Some(Self::StartOrResume),
            0x11 => Some(Self::SetIndoorBikeSimulation),
            0x80 => Some(Self::ResponseCode),
            _ => None,
        }
    }
}

/// Result codes carried in a control point indication
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResultCode {
    /// Command accepted
    Success = 0x01,
    /// Opcode not supported by the machine
    NotSupported = 0x02,
    /// Parameter out of range
    InvalidParameter = 0x03,
    /// Machine failed to execute the command
    OperationFailed = 0x04,
    /// Control was not requested first
    ControlNotPermitted = 0x05,
}

impl ResultCode {
    /// Convert from u8
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Success),
            0x02 => Some(Self::NotSupported),
            0x03 => Some(Self::InvalidParameter),
            0x04 => Some(Self::OperationFailed),
            0x05 => Some(Self::ControlNotPermitted),
            _ => None,
        }
    }
}

/// A single control point write
///
/// Frames are variable length: one opcode byte followed by little-endian
/// parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlPointCommand {
    /// Opcode
    pub opcode: ControlOpcode,
    /// Encoded parameters
    pub payload: Vec<u8>,
}

impl ControlPointCommand {
    /// Command without parameters
    #[must_use]
    pub const fn new(opcode: ControlOpcode) -> Self {
        Self {
            opcode,
            payload: Vec::new(),
        }
    }

    /// Request control of the machine
    #[must_use]
    pub const fn request_control() -> Self {
        Self::new(ControlOpcode::RequestControl)
    }

    /// Reset the machine
    #[must_use]
    pub const fn reset() -> Self {
        Self::new(ControlOpcode::Reset)
    }

    /// Start or resume
    #[must_use]
    pub const fn start() -> Self {
        Self::new(ControlOpcode::StartOrResume)
    }

    /// Set target power in watts (sint16, 1 W resolution)
    #[must_use]
    pub fn set_target_power(watts: f64) -> Self {
        let mut payload = BytesMut::with_capacity(2);
        payload.put_i16_le(scaled_i16(watts, 1.0));
        Self {
            opcode: ControlOpcode::SetTargetPower,
            payload: payload.to_vec(),
        }
    }

    /// Set indoor bike simulation parameters
    ///
    /// Wind is sint16 in 0.001 m/s, grade sint16 in 0.01 %, crr uint8 in
    /// 0.0001 and cw uint8 in 0.01 kg/m. The machine does not receive weight
    /// through this opcode.
    #[must_use]
    pub fn set_simulation(params: &SimulationParameters) -> Self {
        let mut payload = BytesMut::with_capacity(6);
        payload.put_i16_le(scaled_i16(params.wind_speed, 1000.0));
        payload.put_i16_le(scaled_i16(params.slope, 100.0));
        payload.put_u8(scaled_u8(params.crr, 10_000.0));
        payload.put_u8(scaled_u8(params.cw, 100.0));
        Self {
            opcode: ControlOpcode::SetIndoorBikeSimulation,
            payload: payload.to_vec(),
        }
    }

    /// Serialize to bytes
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + self.payload.len());
        buf.put_u8(self.opcode as u8);
        buf.extend_from_slice(&self.payload);
        buf.freeze()
    }

    /// Parse from bytes
    ///
    /// # Errors
    ///
    /// Returns [`CyclingError::CommandFailed`] for an empty frame or an
    /// unknown opcode.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut buf = data;
        if !buf.has_remaining() {
            return Err(CyclingError::CommandFailed("empty control point frame".to_string()));
        }
        let raw = buf.get_u8();
        let opcode = ControlOpcode::from_u8(raw)
            .ok_or_else(|| CyclingError::CommandFailed(format!("Unknown opcode: {raw:02X}")))?;
        Ok(Self {
            opcode,
            payload: buf.to_vec(),
        })
    }
}

/// Indication returned by the machine after a control point write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPointResponse {
    /// Opcode the machine is answering
    pub request: ControlOpcode,
    /// Outcome
    pub result: ResultCode,
}

impl ControlPointResponse {
    /// Parse a `0x80 <request> <result>` indication
    ///
    /// # Errors
    ///
    /// Returns [`CyclingError::CommandFailed`] if the frame is short, is not a
    /// response or carries unknown codes.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < 3 {
            return Err(CyclingError::CommandFailed(format!(
                "Response too short: {} bytes, expected 3",
                data.len()
            )));
        }

        let mut buf = data;
        let code = buf.get_u8();
        if code != ControlOpcode::ResponseCode as u8 {
            return Err(CyclingError::CommandFailed(format!(
                "Not a response frame: {code:02X}"
            )));
        }
        let request = buf.get_u8();
        let result = buf.get_u8();

        Ok(Self {
            request: ControlOpcode::from_u8(request).ok_or_else(|| {
                CyclingError::CommandFailed(format!("Unknown request opcode: {request:02X}"))
            })?,
            result: ResultCode::from_u8(result).ok_or_else(|| {
                CyclingError::CommandFailed(format!("Unknown result code: {result:02X}"))
            })?,
        })
    }

    /// Turn a non-success indication into an error
    ///
    /// # Errors
    ///
    /// Returns [`CyclingError::CommandFailed`] unless the result is
    /// [`ResultCode::Success`].
    pub fn into_result(self) -> Result<()> {
        match self.result {
            ResultCode::Success => Ok(()),
            other => Err(CyclingError::CommandFailed(format!(
                "{:?} rejected: {other:?}",
                self.request
            ))),
        }
    }
}

/// Simulation parameters used when a plain slope has to be sent
#[must_use]
pub fn default_simulation(slope: f64) -> SimulationParameters {
    SimulationParameters {
        weight: 0.0,
        crr: DEFAULT_CRR,
        cw: 0.5 * RHO * BikeType::Race.cw_a(),
        wind_speed: 0.0,
        slope,
    }
}

/// Translate a normalized request into control point commands
///
/// Reset wins over everything else. A target power produces a single
/// `SetTargetPower`; otherwise a slope becomes a simulation command, using
/// `simulation` when the mode provides full parameters. An empty request
/// produces no commands.
#[must_use]
pub fn encode_request(
    request: &UpdateRequest,
    simulation: Option<&SimulationParameters>,
) -> Vec<ControlPointCommand> {
    if request.reset {
        return vec![ControlPointCommand::reset()];
    }
    if let Some(target) = request.target_power {
        return vec![ControlPointCommand::set_target_power(target)];
    }
    if let Some(slope) = request.slope {
        let params = simulation.map_or_else(
            || default_simulation(slope),
            |params| SimulationParameters {
                slope,
                ..*params
            },
        );
        return vec![ControlPointCommand::set_simulation(&params)];
    }
    Vec::new()
}

#[allow(clippy::cast_possible_truncation)]
fn scaled_i16(value: f64, scale: f64) -> i16 {
    (value * scale)
        .round()
        .clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scaled_u8(value: f64, scale: f64) -> u8 {
    (value * scale).round().clamp(0.0, f64::from(u8::MAX)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_power_frame() {
        let frame = ControlPointCommand::set_target_power(200.0).to_bytes();
        assert_eq!(frame.as_ref(), &[0x05, 0xC8, 0x00]);
    }

    #[test]
    fn test_simulation_frame() {
        let frame = ControlPointCommand::set_simulation(&default_simulation(5.0)).to_bytes();
        assert_eq!(frame.as_ref(), &[0x11, 0x00, 0x00, 0xF4, 0x01, 0x24, 0x15]);
    }

    #[test]
    fn test_negative_grade_and_tail_wind() {
        let params = SimulationParameters {
            wind_speed: -2.5,
            ..default_simulation(-3.0)
        };
        let command = ControlPointCommand::set_simulation(&params);
        let mut payload = command.payload.as_slice();
        assert_eq!(payload.get_i16_le(), -2500);
        assert_eq!(payload.get_i16_le(), -300);
    }

    #[test]
    fn test_values_saturate() {
        let command = ControlPointCommand::set_target_power(1.0e6);
        assert_eq!(command.payload, i16::MAX.to_le_bytes().to_vec());

        let params = SimulationParameters {
            crr: 0.5,
            ..default_simulation(0.0)
        };
        assert_eq!(ControlPointCommand::set_simulation(&params).payload[4], u8::MAX);
    }

    #[test]
    fn test_command_parsing() {
        let command = ControlPointCommand::from_bytes(&[0x05, 0x64, 0x00]).unwrap();
        assert_eq!(command, ControlPointCommand::set_target_power(100.0));
        assert!(ControlPointCommand::from_bytes(&[]).is_err());
        assert!(ControlPointCommand::from_bytes(&[0x42]).is_err());
    }

    #[test]
    fn test_response_parsing() {
        let ok = ControlPointResponse::from_bytes(&[0x80, 0x05, 0x01]).unwrap();
        assert_eq!(ok.request, ControlOpcode::SetTargetPower);
        assert!(ok.into_result().is_ok());

        let rejected = ControlPointResponse::from_bytes(&[0x80, 0x11, 0x03]).unwrap();
        assert_eq!(rejected.result, ResultCode::InvalidParameter);
        assert!(rejected.into_result().is_err());

        assert!(ControlPointResponse::from_bytes(&[0x80, 0x05]).is_err());
        assert!(ControlPointResponse::from_bytes(&[0x05, 0x05, 0x01]).is_err());
    }

    #[test]
    fn test_encode_request() {
        assert_eq!(
            encode_request(&UpdateRequest::reset(), None),
            vec![ControlPointCommand::reset()]
        );
        assert!(encode_request(&UpdateRequest::default(), None).is_empty());

        let request = UpdateRequest {
            slope: Some(2.0),
            target_power: Some(150.0),
            ..UpdateRequest::default()
        };
        let commands = encode_request(&request, None);
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].opcode, ControlOpcode::SetTargetPower);
    }

    #[test]
    fn test_encode_slope_uses_simulation_parameters() {
        let params = SimulationParameters {
            weight: 80.0,
            crr: 0.005,
            cw: 0.3,
            wind_speed: 1.0,
            slope: 0.0,
        };
        let commands = encode_request(&UpdateRequest::slope(4.0), Some(&params));
        assert_eq!(commands[0].payload, vec![0xE8, 0x03, 0x90, 0x01, 50, 30]);
    }

    #[test]
    fn test_uuids() {
        assert_eq!(
            FTMS_CONTROL_POINT_UUID.to_string(),
            "00002ad9-0000-1000-8000-00805f9b34fb"
        );
        assert_ne!(FTMS_SERVICE_UUID, INDOOR_BIKE_DATA_UUID);
    }
}
